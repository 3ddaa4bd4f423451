/// Histogram panel
///
/// Shows a binned intensity histogram of the current sub-image and owns the
/// level controls (black point, white point, transfer function, gamma,
/// invert). Every edit is written back to the ControlImage, which re-renders
/// its bitmap; the frame window then refreshes the other panels.

use std::cell::RefCell;
use std::rc::{Rc, Weak};
use std::thread;

use super::{Field, ImagePanel, PanelId};
use crate::astro::TransferFunction;
use crate::error::{Error, Result};
use crate::state::{keys, ControlImage, ImageHandle, SettingsStore};

/// Value shown for empty bins; the count axis is logarithmic
pub const LOG_FLOOR: f64 = 0.5;

/// Count pixel values into `bins` equal-width bins spanning `[min, max]`
///
/// The rows are split into `min(height, max_threads)` contiguous slices
/// counted on their own threads; the per-slice bins are summed once
/// every worker has finished. Non-finite pixels are not counted.
///
/// A value falling outside the bins means `min`/`max` do not describe the
/// pixels, which is reported as an internal error.
pub fn compute_histogram(
    pixels: &[f32],
    width: usize,
    height: usize,
    min: f32,
    max: f32,
    bins: usize,
    max_threads: usize,
) -> Result<Vec<u64>> {
    if bins < 2 {
        return Err(Error::Internal(format!("histogram needs at least 2 bins, got {}", bins)));
    }
    if pixels.len() != width * height || pixels.is_empty() {
        return Err(Error::Internal(format!(
            "histogram of {}x{} given {} pixels",
            width,
            height,
            pixels.len()
        )));
    }

    let bin_size = (max as f64 - min as f64) / (bins - 1) as f64;

    let partials: Vec<Result<Vec<u64>>> = thread::scope(|scope| {
        let workers: Vec<_> = row_slices(height, max_threads)
            .map(|(first, last)| {
                let slice = &pixels[first * width..last * width];
                scope.spawn(move || count_slice(slice, min, bin_size, bins))
            })
            .collect();

        workers
            .into_iter()
            .map(|worker| {
                worker
                    .join()
                    .unwrap_or_else(|_| Err(Error::Internal("histogram worker panicked".into())))
            })
            .collect()
    });

    let mut total = vec![0u64; bins];
    for partial in partials {
        for (sum, count) in total.iter_mut().zip(partial?) {
            *sum += count;
        }
    }
    Ok(total)
}

/// Row ranges `[first, last)` of `min(height, max_threads)` slices
///
/// Slice sizes differ by at most one row and none is empty.
fn row_slices(height: usize, max_threads: usize) -> impl Iterator<Item = (usize, usize)> {
    let slices = height.min(max_threads).max(1);
    (0..slices).map(move |i| (i * height / slices, (i + 1) * height / slices))
}

/// Bins of one slice, owned by the worker that fills them
fn count_slice(slice: &[f32], min: f32, bin_size: f64, bins: usize) -> Result<Vec<u64>> {
    let mut counts = vec![0u64; bins];
    for &value in slice.iter().filter(|v| v.is_finite()) {
        let offset = value as f64 - min as f64;
        let index = if bin_size > 0.0 {
            (offset / bin_size).floor()
        } else {
            // Flat plane: everything equal to min lands in the first bin
            if offset == 0.0 { 0.0 } else { f64::NAN }
        };

        if !(index >= 0.0 && index < bins as f64) {
            return Err(Error::Internal(format!(
                "pixel {} outside histogram range starting at {} (bin size {})",
                value, min, bin_size
            )));
        }
        counts[index as usize] += 1;
    }
    Ok(counts)
}

pub struct HistogramPanel {
    bins: usize,
    max_threads: usize,
    enabled: bool,
    image: Weak<RefCell<ControlImage>>,
    counts: Vec<u64>,
    range: Option<(f32, f32)>,
    black: Field<f32>,
    white: Field<f32>,
    transfer: Field<TransferFunction>,
    gamma: Field<f32>,
    invert: Field<bool>,
}

impl HistogramPanel {
    pub fn new(settings: &dyn SettingsStore) -> Self {
        let bins = settings
            .get(keys::HISTOGRAM_BINS, keys::DEFAULT_HISTOGRAM_BINS)
            .max(2);
        let max_threads = settings
            .get(keys::HISTOGRAM_MAX_THREADS, keys::DEFAULT_HISTOGRAM_MAX_THREADS)
            .max(1);

        Self {
            bins,
            max_threads,
            enabled: true,
            image: Weak::new(),
            counts: Vec::new(),
            range: None,
            black: Field::default(),
            white: Field::default(),
            transfer: Field::default(),
            gamma: Field::default(),
            invert: Field::default(),
        }
    }

    pub fn counts(&self) -> &[u64] {
        &self.counts
    }

    /// Counts as plotted, with empty bins raised to the log floor
    pub fn display_counts(&self) -> Vec<f64> {
        self.counts
            .iter()
            .map(|&c| if c == 0 { LOG_FLOOR } else { c as f64 })
            .collect()
    }

    /// Pixel value at the lower edge of a bin
    pub fn bin_value(&self, index: usize) -> Option<f32> {
        let (min, max) = self.range?;
        let bin_size = (max - min) / (self.bins - 1) as f32;
        Some(min + bin_size * index.min(self.bins - 1) as f32)
    }

    pub fn range(&self) -> Option<(f32, f32)> {
        self.range
    }

    pub fn black_point(&self) -> Option<f32> {
        self.black.get()
    }

    pub fn white_point(&self) -> Option<f32> {
        self.white.get()
    }

    pub fn transfer_function(&self) -> Option<TransferFunction> {
        self.transfer.get()
    }

    pub fn gamma(&self) -> Option<f32> {
        self.gamma.get()
    }

    pub fn invert(&self) -> Option<bool> {
        self.invert.get()
    }

    /// Whether the level controls accept input
    pub fn controls_enabled(&self) -> bool {
        self.black.is_enabled()
    }

    /// Raise or lower the black point; the white point follows if crossed
    pub fn set_black_point(&mut self, value: f32) -> Result<()> {
        let white = self.white.get().unwrap_or(value).max(value);
        self.apply(|image| image.set_levels(value, white))?;
        self.black.set(value);
        self.white.set(white);
        Ok(())
    }

    /// Raise or lower the white point; the black point follows if crossed
    pub fn set_white_point(&mut self, value: f32) -> Result<()> {
        let black = self.black.get().unwrap_or(value).min(value);
        self.apply(|image| image.set_levels(black, value))?;
        self.black.set(black);
        self.white.set(value);
        Ok(())
    }

    /// Slider variant of `set_black_point`, in bin positions
    pub fn set_black_bin(&mut self, index: usize) -> Result<()> {
        let value = self.bin_value(index).ok_or(Error::NoImage)?;
        self.set_black_point(value)
    }

    /// Slider variant of `set_white_point`, in bin positions
    pub fn set_white_bin(&mut self, index: usize) -> Result<()> {
        let value = self.bin_value(index).ok_or(Error::NoImage)?;
        self.set_white_point(value)
    }

    pub fn set_transfer_function(&mut self, transfer: TransferFunction) -> Result<()> {
        self.apply(|image| image.set_transfer(transfer))?;
        self.transfer.set(transfer);
        Ok(())
    }

    pub fn set_gamma(&mut self, gamma: f32) -> Result<()> {
        if !(gamma > 0.0 && gamma.is_finite()) {
            return Err(Error::Unsupported(format!("gamma must be positive, got {}", gamma)));
        }
        self.apply(|image| image.set_gamma(gamma))?;
        self.gamma.set(gamma);
        Ok(())
    }

    pub fn set_invert(&mut self, invert: bool) -> Result<()> {
        self.apply(|image| image.set_invert(invert))?;
        self.invert.set(invert);
        Ok(())
    }

    /// Write an edit into the image, re-render it and mark the file dirty
    fn apply(&mut self, edit: impl FnOnce(&mut ControlImage)) -> Result<()> {
        let handle = self.image.upgrade().ok_or(Error::NoImage)?;
        if !self.controls_enabled() {
            return Err(Error::Disabled(PanelId::Histogram));
        }
        let mut image = handle.borrow_mut();
        image.edit(edit)?;
        image.mark_dirty();
        Ok(())
    }

    fn load(&mut self, handle: &ImageHandle) -> Result<()> {
        let image = handle.borrow();
        let file = image.file().borrow();
        let sub = image.sub_image();

        let (width, height) = file.dimensions(sub)?;
        let stats = file.stats(sub)?;
        let counts = compute_histogram(
            file.pixels(sub)?,
            width as usize,
            height as usize,
            stats.min,
            stats.max,
            self.bins,
            self.max_threads,
        )?;

        self.counts = counts;
        self.range = Some((stats.min, stats.max));
        self.black.set(image.black_point().unwrap_or(stats.min));
        self.white.set(image.white_point().unwrap_or(stats.max));
        self.transfer.set(image.transfer());
        self.gamma.set(image.gamma());
        self.invert.set(image.invert());
        self.image = Rc::downgrade(handle);
        self.set_controls_enabled(self.enabled);
        Ok(())
    }

    fn clear(&mut self) {
        self.image = Weak::new();
        self.counts.clear();
        self.range = None;
        self.black.clear();
        self.white.clear();
        self.transfer.clear();
        self.gamma.clear();
        self.invert.clear();
    }

    fn set_controls_enabled(&mut self, enabled: bool) {
        let enabled = enabled && self.image.upgrade().is_some();
        self.black.set_enabled(enabled);
        self.white.set_enabled(enabled);
        self.transfer.set_enabled(enabled);
        self.gamma.set_enabled(enabled);
        self.invert.set_enabled(enabled);
    }
}

impl ImagePanel for HistogramPanel {
    fn id(&self) -> PanelId {
        PanelId::Histogram
    }

    fn image_changed(&mut self, current: Option<&ImageHandle>) {
        let Some(handle) = current else {
            self.clear();
            return;
        };

        if let Err(e) = self.load(handle) {
            log::error!("Histogram refresh failed: {}", e);
            self.clear();
        }
    }

    fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
        self.set_controls_enabled(enabled);
    }

    fn is_enabled(&self) -> bool {
        self.enabled
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::astro::plane::testing::plane;
    use crate::astro::{AstroFile, PlaneFile, SharedFile};
    use crate::state::MemorySettings;
    use crate::windows::WindowId;

    const RAMP: [f32; 16] = [
        0.0, 0.0, 0.0, 0.0, 1.0, 1.0, 1.0, 1.0, 2.0, 2.0, 2.0, 2.0, 3.0, 3.0, 3.0, 3.0,
    ];

    #[test]
    fn test_four_by_four_ramp() {
        for threads in [1, 2, 4] {
            let counts = compute_histogram(&RAMP, 4, 4, 0.0, 3.0, 4, threads).unwrap();
            assert_eq!(counts, vec![4, 4, 4, 4], "threads = {}", threads);
        }
    }

    #[test]
    fn test_thread_count_does_not_change_result() {
        let width = 37;
        let height = 23;
        let pixels: Vec<f32> = (0..width * height)
            .map(|i| ((i * 7919) % 1000) as f32 * 0.37 - 12.0)
            .collect();
        let min = pixels.iter().copied().fold(f32::INFINITY, f32::min);
        let max = pixels.iter().copied().fold(f32::NEG_INFINITY, f32::max);

        let single = compute_histogram(&pixels, width, height, min, max, 128, 1).unwrap();
        assert_eq!(single.iter().sum::<u64>(), (width * height) as u64);
        for threads in 2..=height + 3 {
            let multi = compute_histogram(&pixels, width, height, min, max, 128, threads).unwrap();
            assert_eq!(single, multi, "threads = {}", threads);
        }
    }

    #[test]
    fn test_range_mismatch_is_internal_error() {
        let result = compute_histogram(&RAMP, 4, 4, 0.0, 2.0, 4, 2);
        assert!(matches!(result, Err(Error::Internal(_))));
    }

    #[test]
    fn test_flat_plane_fills_first_bin() {
        let pixels = [5.0; 6];
        let counts = compute_histogram(&pixels, 3, 2, 5.0, 5.0, 4, 2).unwrap();
        assert_eq!(counts, vec![6, 0, 0, 0]);
    }

    #[test]
    fn test_nan_pixels_are_skipped() {
        let pixels = [0.0, f32::NAN, 1.0, 1.0];
        let counts = compute_histogram(&pixels, 2, 2, 0.0, 1.0, 2, 2).unwrap();
        assert_eq!(counts, vec![1, 2]);
    }

    fn ramp_image() -> ImageHandle {
        let file: SharedFile = Rc::new(RefCell::new(
            PlaneFile::from_planes("ramp", vec![plane(4, 4, &RAMP)]).unwrap(),
        ));
        ControlImage::new(WindowId(1), file, TransferFunction::Linear, 1.0)
            .unwrap()
            .into_handle()
    }

    fn panel_with_bins(bins: usize) -> HistogramPanel {
        let mut store = MemorySettings::new();
        let settings: &mut dyn SettingsStore = &mut store;
        settings.set(keys::HISTOGRAM_BINS, &bins).unwrap();
        HistogramPanel::new(settings)
    }

    #[test]
    fn test_panel_mirrors_image() {
        let image = ramp_image();
        let mut panel = panel_with_bins(4);
        panel.image_changed(Some(&image));

        assert_eq!(panel.counts(), &[4, 4, 4, 4]);
        assert_eq!(panel.black_point(), Some(0.0));
        assert_eq!(panel.white_point(), Some(3.0));
        assert_eq!(panel.transfer_function(), Some(TransferFunction::Linear));
        assert!(panel.controls_enabled());
    }

    #[test]
    fn test_clear_on_none() {
        let image = ramp_image();
        let mut panel = panel_with_bins(4);
        panel.image_changed(Some(&image));
        panel.image_changed(None);

        assert!(panel.counts().is_empty());
        assert!(panel.black_point().is_none());
        assert!(panel.white_point().is_none());
        assert!(panel.gamma().is_none());
        assert!(!panel.controls_enabled());
        assert!(matches!(panel.set_black_point(1.0), Err(Error::NoImage)));
    }

    #[test]
    fn test_levels_stay_ordered() {
        let image = ramp_image();
        let mut panel = panel_with_bins(4);
        panel.image_changed(Some(&image));

        let edits: [(bool, f32); 8] = [
            (true, 2.5),
            (true, 3.5),
            (false, 1.0),
            (false, 0.5),
            (true, 0.7),
            (false, -1.0),
            (true, 2.0),
            (false, 2.0),
        ];
        for (is_black, value) in edits {
            if is_black {
                panel.set_black_point(value).unwrap();
            } else {
                panel.set_white_point(value).unwrap();
            }
            let (black, white) = (panel.black_point().unwrap(), panel.white_point().unwrap());
            assert!(black <= white, "{} > {}", black, white);

            let stored = image.borrow();
            assert_eq!(stored.black_point(), Some(black));
            assert_eq!(stored.white_point(), Some(white));
        }
    }

    #[test]
    fn test_edit_redraws_and_dirties() {
        let image = ramp_image();
        let mut panel = panel_with_bins(4);
        panel.image_changed(Some(&image));
        let before = image.borrow().bitmap().unwrap();

        panel.set_invert(true).unwrap();

        let after = image.borrow().bitmap().unwrap();
        assert!(!Rc::ptr_eq(&before, &after));
        assert_eq!(after.get_pixel(0, 0).0[0], 255);
        assert!(image.borrow().file().borrow().is_dirty());
    }

    #[test]
    fn test_slider_positions_map_to_levels() {
        let image = ramp_image();
        let mut panel = panel_with_bins(4);
        panel.image_changed(Some(&image));

        panel.set_white_bin(1).unwrap();
        assert_eq!(panel.white_point(), Some(1.0));
        panel.set_black_bin(3).unwrap();
        assert_eq!(panel.black_point(), Some(3.0));
        assert_eq!(panel.white_point(), Some(3.0));
    }

    #[test]
    fn test_display_uses_log_floor() {
        let image = ramp_image();
        let mut panel = panel_with_bins(7);
        panel.image_changed(Some(&image));

        let shown = panel.display_counts();
        assert_eq!(shown.len(), 7);
        assert!(shown.iter().all(|&v| v >= LOG_FLOOR));
        assert!(shown.contains(&LOG_FLOOR));
    }

    #[test]
    fn test_disable_keeps_data() {
        let image = ramp_image();
        let mut panel = panel_with_bins(4);
        panel.image_changed(Some(&image));

        panel.set_enabled(false);
        assert!(!panel.controls_enabled());
        assert_eq!(panel.counts(), &[4, 4, 4, 4]);

        panel.set_enabled(true);
        assert!(panel.controls_enabled());
        assert_eq!(panel.black_point(), Some(0.0));
    }

    #[test]
    fn test_disabled_panel_rejects_edits() {
        let image = ramp_image();
        let mut panel = panel_with_bins(4);
        panel.image_changed(Some(&image));
        panel.set_enabled(false);

        assert!(matches!(
            panel.set_black_point(2.0),
            Err(Error::Disabled(PanelId::Histogram))
        ));
        assert!(panel.set_invert(true).is_err());
        assert_eq!(panel.black_point(), Some(0.0));
        assert_eq!(image.borrow().black_point(), Some(0.0));
        assert!(!image.borrow().invert());
        assert!(!image.borrow().file().borrow().is_dirty());
    }

    #[test]
    fn test_row_slices_use_every_thread() {
        let slices: Vec<_> = row_slices(5, 4).collect();
        assert_eq!(slices, vec![(0, 1), (1, 2), (2, 3), (3, 5)]);

        assert_eq!(row_slices(2, 8).count(), 2);
        assert_eq!(row_slices(1, 1).collect::<Vec<_>>(), vec![(0, 1)]);
    }

    #[test]
    fn test_single_column_plane() {
        let pixels = [0.0, 1.0, 2.0, 3.0, 3.0];
        let counts = compute_histogram(&pixels, 1, 5, 0.0, 3.0, 4, 4).unwrap();
        assert_eq!(counts, vec![1, 1, 1, 2]);
    }

    #[test]
    fn test_rejects_bad_gamma() {
        let image = ramp_image();
        let mut panel = panel_with_bins(4);
        panel.image_changed(Some(&image));
        assert!(panel.set_gamma(0.0).is_err());
        assert!(panel.set_gamma(2.2).is_ok());
        assert_eq!(image.borrow().gamma(), 2.2);
    }
}
