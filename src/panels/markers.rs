/// Astrometry and photometry panels
///
/// Both panels list the markers of their kind on the current image and let
/// the user place, highlight and remove them. They differ only in what a
/// marker carries: photometry markers also get aperture measurements.
///
/// Placing a marker:
/// 1. The click (already in image coordinates) is refined to a centroid
/// 2. No centroid: the add is abandoned with an informational error
/// 3. A marker already within the proximity radius: silently ignored
/// 4. Otherwise the marker is auto-named, measured, stored, highlighted and
///    recorded into the file (which marks it dirty)

use std::cell::RefCell;
use std::rc::{Rc, Weak};

use super::{ImagePanel, PanelId};
use crate::astro::Apertures;
use crate::error::{Error, Result};
use crate::geometry::{PixelPoint, SkyCoord};
use crate::state::{
    keys, ControlImage, ImageHandle, IndicatorLayer, IndicatorTheme, Marker, MarkerKind,
    SettingsStore,
};

/// Result of a marker add that did not fail
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MarkerOutcome {
    Added(String),
    /// A marker already sits within the proximity radius
    AlreadyMarked,
}

/// Tunables of the placement algorithm
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Placement {
    pub search_radius: u32,
    pub sensitivity: u32,
    pub proximity: f64,
    pub apertures: Apertures,
}

impl Placement {
    pub fn from_settings(settings: &dyn SettingsStore) -> Self {
        Self {
            search_radius: settings.get(keys::CENTROID_RADIUS, keys::DEFAULT_CENTROID_RADIUS),
            sensitivity: settings.get(keys::CENTROID_SENSITIVITY, keys::DEFAULT_CENTROID_SENSITIVITY),
            proximity: settings.get(keys::MARKER_PROXIMITY, keys::DEFAULT_MARKER_PROXIMITY),
            apertures: settings.get(keys::PHOTOMETRY_APERTURES, keys::default_apertures()),
        }
    }
}

/// Indicator look from settings
pub fn theme_from_settings(settings: &dyn SettingsStore) -> IndicatorTheme {
    IndicatorTheme {
        style: settings.get(keys::MARKER_STYLE, keys::DEFAULT_MARKER_STYLE),
        size: settings.get(keys::MARKER_SIZE, keys::DEFAULT_MARKER_SIZE),
        normal: settings.get(keys::MARKER_COLOR_NORMAL, keys::DEFAULT_MARKER_COLOR_NORMAL),
        highlight: settings.get(keys::MARKER_COLOR_HIGHLIGHT, keys::DEFAULT_MARKER_COLOR_HIGHLIGHT),
    }
}

/// Place a marker near `click` on `image`
pub fn place_marker(
    image: &mut ControlImage,
    kind: MarkerKind,
    click: PixelPoint,
    placement: &Placement,
    layer: &IndicatorLayer,
    theme: &IndicatorTheme,
) -> Result<MarkerOutcome> {
    let centroid = image
        .file()
        .borrow()
        .find_centroid(image.sub_image(), click, placement.search_radius, placement.sensitivity)
        .ok_or(Error::NoCentroid)?;

    if image.markers(kind).find_near(centroid, placement.proximity).is_some() {
        log::debug!("Marker near ({:.1}, {:.1}) already present", centroid.x, centroid.y);
        return Ok(MarkerOutcome::AlreadyMarked);
    }

    let name = image.markers(kind).next_name(kind);
    store_marker(image, kind, &name, centroid, placement, layer, theme);
    Ok(MarkerOutcome::Added(name))
}

/// Best-effort copy of a marker onto the other image of a comparison pair
///
/// `point` is the already transformed position. It is refined to a
/// centroid when one is found; the marker keeps its name. Returns whether
/// a marker was stored.
pub fn mirror_marker(
    image: &mut ControlImage,
    kind: MarkerKind,
    name: &str,
    point: PixelPoint,
    placement: &Placement,
    layer: &IndicatorLayer,
    theme: &IndicatorTheme,
) -> bool {
    let refined = image
        .file()
        .borrow()
        .find_centroid(image.sub_image(), point, placement.search_radius, placement.sensitivity)
        .unwrap_or(point);

    let blocked = image
        .markers(kind)
        .find_near(refined, placement.proximity)
        .is_some_and(|m| m.name != name);
    if blocked {
        return false;
    }

    store_marker(image, kind, name, refined, placement, layer, theme);
    true
}

fn store_marker(
    image: &mut ControlImage,
    kind: MarkerKind,
    name: &str,
    pixel: PixelPoint,
    placement: &Placement,
    layer: &IndicatorLayer,
    theme: &IndicatorTheme,
) {
    let mut marker = Marker::new(name, pixel);
    {
        let file = image.file().borrow();
        // No coordinate solution just leaves the sky position empty
        marker.sky = file.pixel_to_sky(pixel);
        if kind == MarkerKind::Photometry {
            marker.apertures = Some(placement.apertures);
            marker.photometry = file.photometry(image.sub_image(), pixel, placement.apertures);
        }
    }

    let record = marker.to_record();
    image.markers_mut(kind).add_selected(marker, layer, theme);
    image.file().borrow_mut().record_observation(record);

    log::info!("Placed marker {} at ({:.2}, {:.2})", name, pixel.x, pixel.y);
}

/// One line of the marker table
#[derive(Debug, Clone, PartialEq)]
pub struct MarkerRow {
    pub name: String,
    pub x: f64,
    pub y: f64,
    pub sky: Option<SkyCoord>,
    pub magnitude: Option<f64>,
    pub selected: bool,
}

pub struct MarkerPanel {
    kind: MarkerKind,
    enabled: bool,
    layer: IndicatorLayer,
    theme: IndicatorTheme,
    placement: Placement,
    image: Weak<RefCell<ControlImage>>,
    rows: Vec<MarkerRow>,
}

impl MarkerPanel {
    pub fn new(kind: MarkerKind, layer: IndicatorLayer, settings: &dyn SettingsStore) -> Self {
        Self {
            kind,
            enabled: true,
            layer,
            theme: theme_from_settings(settings),
            placement: Placement::from_settings(settings),
            image: Weak::new(),
            rows: Vec::new(),
        }
    }

    pub fn astrometry(layer: IndicatorLayer, settings: &dyn SettingsStore) -> Self {
        Self::new(MarkerKind::Astrometry, layer, settings)
    }

    pub fn photometry(layer: IndicatorLayer, settings: &dyn SettingsStore) -> Self {
        Self::new(MarkerKind::Photometry, layer, settings)
    }

    pub fn kind(&self) -> MarkerKind {
        self.kind
    }

    pub fn rows(&self) -> &[MarkerRow] {
        &self.rows
    }

    pub fn selected(&self) -> Option<&str> {
        self.rows.iter().find(|r| r.selected).map(|r| r.name.as_str())
    }

    pub fn placement(&self) -> &Placement {
        &self.placement
    }

    pub fn theme(&self) -> &IndicatorTheme {
        &self.theme
    }

    pub fn layer(&self) -> &IndicatorLayer {
        &self.layer
    }

    /// Whether placing, selecting and removing markers is possible
    pub fn controls_enabled(&self) -> bool {
        self.enabled && self.image.upgrade().is_some()
    }

    /// The current image, if the panel accepts edits
    fn editable_image(&self) -> Result<ImageHandle> {
        let handle = self.image.upgrade().ok_or(Error::NoImage)?;
        if !self.enabled {
            return Err(Error::Disabled(self.id()));
        }
        Ok(handle)
    }

    /// Place a marker on the current image
    pub fn add_marker(&mut self, click: PixelPoint) -> Result<MarkerOutcome> {
        let handle = self.editable_image()?;
        let outcome = place_marker(
            &mut handle.borrow_mut(),
            self.kind,
            click,
            &self.placement,
            &self.layer,
            &self.theme,
        )?;
        self.sync_rows(&handle);
        Ok(outcome)
    }

    /// Copy a marker onto another image (the other half of a comparison)
    pub fn mirror_onto(&self, handle: &ImageHandle, name: &str, point: PixelPoint) -> bool {
        mirror_marker(
            &mut handle.borrow_mut(),
            self.kind,
            name,
            point,
            &self.placement,
            &self.layer,
            &self.theme,
        )
    }

    /// Highlight a marker (table row click)
    pub fn select(&mut self, name: &str) -> Result<bool> {
        let handle = self.editable_image()?;
        let changed = handle
            .borrow_mut()
            .markers_mut(self.kind)
            .select(name, &self.layer, &self.theme);
        self.sync_rows(&handle);
        Ok(changed)
    }

    /// Delete the highlighted marker; returns its name
    pub fn remove_selected(&mut self) -> Result<Option<String>> {
        let handle = self.editable_image()?;
        let removed = {
            let mut image = handle.borrow_mut();
            let Some(name) = image.markers(self.kind).selected().map(str::to_string) else {
                return Ok(None);
            };
            image.markers_mut(self.kind).remove(&name);
            image.file().borrow_mut().remove_observation(&name);
            name
        };
        self.sync_rows(&handle);
        Ok(Some(removed))
    }

    fn sync_rows(&mut self, handle: &ImageHandle) {
        let image = handle.borrow();
        let set = image.markers(self.kind);
        self.rows = set
            .markers()
            .iter()
            .map(|m| MarkerRow {
                name: m.name.clone(),
                x: m.pixel.x,
                y: m.pixel.y,
                sky: m.sky,
                magnitude: m.photometry.and_then(|p| p.magnitude),
                selected: set.selected() == Some(m.name.as_str()),
            })
            .collect();
    }
}

impl ImagePanel for MarkerPanel {
    fn id(&self) -> PanelId {
        match self.kind {
            MarkerKind::Astrometry => PanelId::Astrometry,
            MarkerKind::Photometry => PanelId::Photometry,
        }
    }

    fn image_changed(&mut self, current: Option<&ImageHandle>) {
        let Some(handle) = current else {
            self.image = Weak::new();
            self.rows.clear();
            return;
        };

        match handle.try_borrow_mut() {
            Ok(mut image) => image
                .markers_mut(self.kind)
                .rebuild_indicators(&self.layer, &self.theme),
            Err(_) => log::error!("Image busy while refreshing {:?} markers", self.kind),
        }

        self.image = Rc::downgrade(handle);
        self.sync_rows(handle);
    }

    fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    fn is_enabled(&self) -> bool {
        self.enabled
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::astro::plane::testing::star_file;
    use crate::astro::{LinearWcs, TransferFunction};
    use crate::state::MemorySettings;
    use crate::windows::WindowId;
    use cgmath::Point2;

    const STARS: [(f64, f64, f64); 3] = [(20.0, 20.0, 200.0), (60.0, 25.0, 150.0), (40.0, 60.0, 100.0)];

    fn image_with_wcs(wcs: bool) -> ImageHandle {
        let mut file = star_file("field.png", 80, 80, &STARS);
        if wcs {
            file = file.with_wcs(LinearWcs {
                reference_pixel: (40.0, 40.0),
                reference_sky: SkyCoord { ra: 83.8, dec: -5.4 },
                scale: 1.0 / 3600.0,
                rotation: 0.0,
            });
        }
        ControlImage::new(WindowId(1), Rc::new(RefCell::new(file)), TransferFunction::Linear, 1.0)
            .unwrap()
            .into_handle()
    }

    fn panel(kind: MarkerKind) -> MarkerPanel {
        MarkerPanel::new(kind, IndicatorLayer::new(), &MemorySettings::new())
    }

    #[test]
    fn test_add_marker_refines_and_names() {
        let image = image_with_wcs(true);
        let mut panel = panel(MarkerKind::Astrometry);
        panel.image_changed(Some(&image));

        let outcome = panel.add_marker(Point2::new(23.0, 18.0)).unwrap();
        assert_eq!(outcome, MarkerOutcome::Added("A:1".into()));

        let row = &panel.rows()[0];
        assert!((row.x - 20.0).abs() < 0.2 && (row.y - 20.0).abs() < 0.2);
        assert!(row.sky.is_some());
        assert!(row.selected);
        assert!(image.borrow().is_dirty());
        assert_eq!(image.borrow().file().borrow().name(), "field.png");
    }

    #[test]
    fn test_nearby_click_is_deduplicated() {
        let image = image_with_wcs(false);
        let mut panel = panel(MarkerKind::Astrometry);
        panel.image_changed(Some(&image));

        panel.add_marker(Point2::new(20.0, 20.0)).unwrap();
        let second = panel.add_marker(Point2::new(22.0, 21.0)).unwrap();

        assert_eq!(second, MarkerOutcome::AlreadyMarked);
        assert_eq!(image.borrow().markers(MarkerKind::Astrometry).len(), 1);
    }

    #[test]
    fn test_no_centroid_leaves_state_unchanged() {
        let image = image_with_wcs(false);
        let mut panel = panel(MarkerKind::Astrometry);
        panel.image_changed(Some(&image));

        // Empty sky far from every star
        let result = panel.add_marker(Point2::new(75.0, 75.0));
        assert!(matches!(result, Err(Error::NoCentroid)));
        assert!(panel.rows().is_empty());
        assert!(!image.borrow().is_dirty());
    }

    #[test]
    fn test_disabled_panel_rejects_edits() {
        let image = image_with_wcs(false);
        let mut panel = panel(MarkerKind::Astrometry);
        panel.image_changed(Some(&image));
        panel.add_marker(Point2::new(20.0, 20.0)).unwrap();

        panel.set_enabled(false);
        assert!(!panel.controls_enabled());
        assert!(matches!(
            panel.add_marker(Point2::new(60.0, 25.0)),
            Err(Error::Disabled(PanelId::Astrometry))
        ));
        assert!(panel.select("A:1").is_err());
        assert!(panel.remove_selected().is_err());
        assert_eq!(image.borrow().markers(MarkerKind::Astrometry).len(), 1);
        assert_eq!(panel.rows().len(), 1);

        panel.set_enabled(true);
        assert_eq!(panel.remove_selected().unwrap(), Some("A:1".to_string()));
    }

    #[test]
    fn test_reopened_file_keeps_saved_markers() {
        let image = image_with_wcs(false);
        let mut panel = panel(MarkerKind::Astrometry);
        panel.image_changed(Some(&image));
        panel.add_marker(Point2::new(20.0, 20.0)).unwrap();

        // A second window on the same file starts from what was recorded
        let file = Rc::clone(image.borrow().file());
        let reopened = ControlImage::new(WindowId(2), file, TransferFunction::Linear, 1.0)
            .unwrap()
            .into_handle();
        panel.image_changed(Some(&reopened));
        assert_eq!(panel.rows().len(), 1);

        let outcome = panel.add_marker(Point2::new(60.0, 25.0)).unwrap();
        assert_eq!(outcome, MarkerOutcome::Added("A:2".into()));
        let names: Vec<String> = reopened
            .borrow()
            .file()
            .borrow()
            .observations()
            .iter()
            .map(|o| o.name.clone())
            .collect();
        assert_eq!(names, vec!["A:1", "A:2"]);
    }

    #[test]
    fn test_without_solution_sky_is_empty() {
        let image = image_with_wcs(false);
        let mut panel = panel(MarkerKind::Astrometry);
        panel.image_changed(Some(&image));
        panel.add_marker(Point2::new(60.0, 25.0)).unwrap();
        assert!(panel.rows()[0].sky.is_none());
    }

    #[test]
    fn test_photometry_marker_is_measured() {
        let image = image_with_wcs(false);
        let mut panel = panel(MarkerKind::Photometry);
        panel.image_changed(Some(&image));

        let outcome = panel.add_marker(Point2::new(40.0, 61.0)).unwrap();
        assert_eq!(outcome, MarkerOutcome::Added("P:1".into()));
        assert!(panel.rows()[0].magnitude.is_some());

        let stored = image.borrow();
        let marker = stored.markers(MarkerKind::Photometry).get("P:1").unwrap();
        assert_eq!(marker.apertures, Some(Apertures::default()));
        assert!(marker.photometry.unwrap().flux > 0.0);
        // Photometry markers do not show up in the astrometry list
        assert!(stored.markers(MarkerKind::Astrometry).is_empty());
    }

    #[test]
    fn test_highlight_follows_selection() {
        let image = image_with_wcs(false);
        let mut panel = panel(MarkerKind::Astrometry);
        panel.image_changed(Some(&image));
        for (x, y, _) in STARS {
            panel.add_marker(Point2::new(x, y)).unwrap();
        }
        assert_eq!(panel.selected(), Some("A:3"));

        assert!(panel.select("A:1").unwrap());
        assert!(!panel.select("A:1").unwrap());

        let stored = image.borrow();
        let highlighted: Vec<&str> = stored
            .markers(MarkerKind::Astrometry)
            .markers()
            .iter()
            .filter(|m| m.is_highlighted())
            .map(|m| m.name.as_str())
            .collect();
        assert_eq!(highlighted, vec!["A:1"]);
        assert_eq!(panel.selected(), Some("A:1"));
    }

    #[test]
    fn test_refresh_is_idempotent() {
        let image = image_with_wcs(false);
        let mut panel = panel(MarkerKind::Astrometry);
        panel.image_changed(Some(&image));
        panel.add_marker(Point2::new(20.0, 20.0)).unwrap();
        panel.add_marker(Point2::new(60.0, 25.0)).unwrap();

        panel.image_changed(Some(&image));
        let rows = panel.rows().to_vec();
        panel.image_changed(Some(&image));

        assert_eq!(panel.rows(), rows.as_slice());
        assert_eq!(panel.layer().live_count(), 2);
    }

    #[test]
    fn test_remove_selected() {
        let image = image_with_wcs(false);
        let mut panel = panel(MarkerKind::Astrometry);
        panel.image_changed(Some(&image));
        panel.add_marker(Point2::new(20.0, 20.0)).unwrap();

        assert_eq!(panel.remove_selected().unwrap(), Some("A:1".into()));
        assert!(panel.rows().is_empty());
        assert_eq!(panel.layer().live_count(), 0);
        assert_eq!(panel.remove_selected().unwrap(), None);
    }

    #[test]
    fn test_clear_on_none() {
        let image = image_with_wcs(false);
        let mut panel = panel(MarkerKind::Astrometry);
        panel.image_changed(Some(&image));
        panel.add_marker(Point2::new(20.0, 20.0)).unwrap();

        panel.image_changed(None);
        assert!(panel.rows().is_empty());
        assert!(matches!(panel.add_marker(Point2::new(20.0, 20.0)), Err(Error::NoImage)));
    }
}
