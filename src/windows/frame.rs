/// Frame window
///
/// The frame owns the MDI windows, the dockable panels, the selection
/// registry and the settings. It is the boundary to the host UI: every
/// public operation here is driven by a user action and never fails.
/// Errors are logged and queued as notices for the host to show.

use std::cell::{Ref, RefCell};
use std::collections::BTreeMap;
use std::rc::Rc;

use super::sub_window::{Side, SubWindow, Viewport, WindowKind};
use super::WindowId;
use crate::astro::{SharedFile, TransferFunction};
use crate::error::{Error, Notice, Result, Severity};
use crate::geometry::{Alignment, PixelPoint, Rect, SkyCoord};
use crate::panels::{
    HistogramPanel, ImageControlPanel, ImagePanel, MagnifierPanel, MarkerOutcome, MarkerPanel,
    NavigatorPanel, PanelId,
};
use crate::state::{
    keys, ControlImage, ImageHandle, IndicatorLayer, MarkerKind, PanelHandle, SelectionRegistry,
    SettingsStore,
};

pub struct FrameWindow {
    settings: Box<dyn SettingsStore>,
    registry: SelectionRegistry,
    layer: IndicatorLayer,
    histogram: Rc<RefCell<HistogramPanel>>,
    image_control: Rc<RefCell<ImageControlPanel>>,
    magnifier: Rc<RefCell<MagnifierPanel>>,
    navigator: Rc<RefCell<NavigatorPanel>>,
    astrometry: Rc<RefCell<MarkerPanel>>,
    photometry: Rc<RefCell<MarkerPanel>>,
    windows: BTreeMap<WindowId, SubWindow>,
    active: Option<WindowId>,
    next_id: u64,
    notices: Vec<Notice>,
}

impl FrameWindow {
    pub fn new(settings: Box<dyn SettingsStore>) -> Self {
        let layer = IndicatorLayer::new();
        let histogram = Rc::new(RefCell::new(HistogramPanel::new(settings.as_ref())));
        let image_control = Rc::new(RefCell::new(ImageControlPanel::new()));
        let magnifier = Rc::new(RefCell::new(MagnifierPanel::new(settings.as_ref())));
        let navigator = Rc::new(RefCell::new(NavigatorPanel::new()));
        let astrometry = Rc::new(RefCell::new(MarkerPanel::astrometry(
            layer.clone(),
            settings.as_ref(),
        )));
        let photometry = Rc::new(RefCell::new(MarkerPanel::photometry(
            layer.clone(),
            settings.as_ref(),
        )));

        let mut registry = SelectionRegistry::new();
        registry.subscribe(histogram.clone());
        registry.subscribe(image_control.clone());
        registry.subscribe(magnifier.clone());
        registry.subscribe(navigator.clone());
        registry.subscribe(astrometry.clone());
        registry.subscribe(photometry.clone());
        // Panels start out cleared
        registry.refresh();

        Self {
            settings,
            registry,
            layer,
            histogram,
            image_control,
            magnifier,
            navigator,
            astrometry,
            photometry,
            windows: BTreeMap::new(),
            active: None,
            next_id: 1,
            notices: Vec::new(),
        }
    }

    // ---- accessors ----

    pub fn settings(&self) -> &dyn SettingsStore {
        self.settings.as_ref()
    }

    pub fn settings_mut(&mut self) -> &mut dyn SettingsStore {
        self.settings.as_mut()
    }

    pub fn registry(&self) -> &SelectionRegistry {
        &self.registry
    }

    pub fn current_image(&self) -> Option<&ImageHandle> {
        self.registry.current()
    }

    pub fn layer(&self) -> &IndicatorLayer {
        &self.layer
    }

    pub fn histogram(&self) -> Ref<'_, HistogramPanel> {
        self.histogram.borrow()
    }

    pub fn image_control(&self) -> Ref<'_, ImageControlPanel> {
        self.image_control.borrow()
    }

    pub fn magnifier(&self) -> Ref<'_, MagnifierPanel> {
        self.magnifier.borrow()
    }

    pub fn navigator(&self) -> Ref<'_, NavigatorPanel> {
        self.navigator.borrow()
    }

    pub fn marker_panel(&self, kind: MarkerKind) -> Ref<'_, MarkerPanel> {
        self.markers(kind).borrow()
    }

    /// Look up a panel by id
    pub fn panel(&self, id: PanelId) -> PanelHandle {
        match id {
            PanelId::Histogram => self.histogram.clone(),
            PanelId::ImageControl => self.image_control.clone(),
            PanelId::Magnifier => self.magnifier.clone(),
            PanelId::Navigator => self.navigator.clone(),
            PanelId::Astrometry => self.astrometry.clone(),
            PanelId::Photometry => self.photometry.clone(),
        }
    }

    pub fn windows(&self) -> impl Iterator<Item = &SubWindow> {
        self.windows.values()
    }

    pub fn window(&self, id: WindowId) -> Option<&SubWindow> {
        self.windows.get(&id)
    }

    pub fn window_mut(&mut self, id: WindowId) -> Option<&mut SubWindow> {
        self.windows.get_mut(&id)
    }

    pub fn active(&self) -> Option<WindowId> {
        self.active
    }

    pub fn active_window(&self) -> Option<&SubWindow> {
        self.windows.get(&self.active?)
    }

    /// Drain the queued notices
    pub fn take_notices(&mut self) -> Vec<Notice> {
        std::mem::take(&mut self.notices)
    }

    // ---- windows ----

    /// Open a window showing `file` and make it active
    pub fn open_image(&mut self, file: SharedFile) -> Option<WindowId> {
        let id = self.allocate_id();
        let image = match self.create_image(id, file) {
            Ok(image) => image,
            Err(e) => {
                self.report("Open image", e);
                return None;
            }
        };

        log::info!("Opened image window {} ({})", id, image.borrow().name());
        self.windows.insert(id, SubWindow::image(id, image));
        self.activate(id);
        Some(id)
    }

    /// Open a comparison window over two files related by `alignment`
    pub fn open_comparison(
        &mut self,
        input: SharedFile,
        output: SharedFile,
        alignment: Alignment,
    ) -> Option<WindowId> {
        let id = self.allocate_id();
        let images = self
            .create_image(id, input)
            .and_then(|input| Ok((input, self.create_image(id, output)?)));
        let (input, output) = match images {
            Ok(images) => images,
            Err(e) => {
                self.report("Open comparison", e);
                return None;
            }
        };

        log::info!("Opened comparison window {}", id);
        self.windows
            .insert(id, SubWindow::comparison(id, input, output, alignment));
        self.activate(id);
        Some(id)
    }

    pub fn open_julian_calculator(&mut self) -> WindowId {
        let id = self.allocate_id();
        self.windows.insert(id, SubWindow::julian_date(id));
        self.activate(id);
        id
    }

    /// Give a window focus and make its image current
    ///
    /// A window without an image (the calculator) clears the selection.
    pub fn activate(&mut self, id: WindowId) {
        let Some(window) = self.windows.get(&id) else {
            log::warn!("Activation of unknown window {}", id);
            return;
        };
        let candidate = window.current_image();

        if self.active != Some(id) && self.active.is_some() {
            self.for_each_panel(|panel| panel.image_deactivating());
        }
        self.active = Some(id);

        let has_image = candidate.is_some();
        self.registry.set_current(candidate);
        if has_image {
            self.for_each_panel(|panel| panel.image_activating());
        }
    }

    /// Switch the focused half of the active comparison window
    pub fn focus_side(&mut self, side: Side) {
        let Some(window) = self.active.and_then(|id| self.windows.get_mut(&id)) else {
            return;
        };
        let WindowKind::Comparison(pair) = &mut window.kind else {
            return;
        };
        if pair.focus == side {
            return;
        }
        pair.focus = side;
        let focused = Rc::clone(pair.focused());
        self.registry.set_current(Some(focused));
    }

    /// Close a window; its images are deselected before they are dropped
    pub fn close(&mut self, id: WindowId) {
        let Some(window) = self.windows.get(&id) else {
            return;
        };

        let shows_current = window
            .images()
            .iter()
            .any(|image| self.registry.is_current(image));
        if shows_current {
            self.registry.set_current(None);
        }
        if self.active == Some(id) {
            self.for_each_panel(|panel| panel.image_deactivating());
            self.active = None;
        }

        if let Some(window) = self.windows.remove(&id) {
            if window.is_dirty() {
                log::warn!("Closed {} with unsaved changes", window.title());
            }
            log::info!("Closed window {}", id);
        }
    }

    /// Close a window and, if it had focus, activate the newest remaining one
    pub fn close_and_focus_next(&mut self, id: WindowId) {
        let had_focus = self.active == Some(id);
        self.close(id);
        if had_focus {
            if let Some(&next) = self.windows.keys().next_back() {
                self.activate(next);
            }
        }
    }

    /// Window title, with a `*` when a shown file has unsaved changes
    pub fn window_title(&self, id: WindowId) -> Option<String> {
        let window = self.windows.get(&id)?;
        let title = window.title();
        Some(if window.is_dirty() {
            format!("{}*", title)
        } else {
            title
        })
    }

    // ---- histogram edits ----

    pub fn set_black_point(&mut self, value: f32) {
        let result = self.histogram.borrow_mut().set_black_point(value);
        self.after_histogram_edit("Black point", result);
    }

    pub fn set_white_point(&mut self, value: f32) {
        let result = self.histogram.borrow_mut().set_white_point(value);
        self.after_histogram_edit("White point", result);
    }

    pub fn set_transfer_function(&mut self, transfer: TransferFunction) {
        let result = self.histogram.borrow_mut().set_transfer_function(transfer);
        if result.is_ok() {
            self.persist(keys::TRANSFER_FUNCTION, &transfer);
        }
        self.after_histogram_edit("Transfer function", result);
    }

    pub fn set_gamma(&mut self, gamma: f32) {
        let result = self.histogram.borrow_mut().set_gamma(gamma);
        if result.is_ok() {
            self.persist(keys::GAMMA, &gamma);
        }
        self.after_histogram_edit("Gamma", result);
    }

    pub fn set_invert(&mut self, invert: bool) {
        let result = self.histogram.borrow_mut().set_invert(invert);
        self.after_histogram_edit("Invert", result);
    }

    fn after_histogram_edit(&mut self, title: &str, result: Result<()>) {
        match result {
            Ok(()) => self.registry.refresh_except(PanelId::Histogram),
            Err(e) => self.report(title, e),
        }
    }

    // ---- image edits ----

    pub fn set_sub_image(&mut self, index: usize) {
        let result = self.image_control.borrow_mut().select_sub_image(index);
        match result {
            Ok(()) => self.registry.refresh(),
            Err(e) => self.report("Sub-image", e),
        }
    }

    /// Place a marker on the current image at an image position
    ///
    /// On a comparison window the marker is mirrored onto the other image.
    pub fn add_marker(&mut self, kind: MarkerKind, point: PixelPoint) -> Option<MarkerOutcome> {
        let result = self.markers(kind).borrow_mut().add_marker(point);
        let outcome = match result {
            Ok(outcome) => outcome,
            Err(e) => {
                self.report("Add marker", e);
                return None;
            }
        };

        if let MarkerOutcome::Added(name) = &outcome {
            self.mirror_marker(kind, name);
            self.registry.refresh_except(marker_panel_id(kind));
        }
        Some(outcome)
    }

    fn mirror_marker(&self, kind: MarkerKind, name: &str) {
        let Some(WindowKind::Comparison(pair)) = self.active_window().map(|w| &w.kind) else {
            return;
        };

        let placed = pair
            .focused()
            .borrow()
            .markers(kind)
            .get(name)
            .map(|marker| marker.pixel);
        let Some(target) = placed.and_then(|pixel| pair.map_to_other(pixel)) else {
            log::warn!("Cannot map marker {} onto the other image", name);
            return;
        };

        let mirrored = self
            .markers(kind)
            .borrow()
            .mirror_onto(pair.unfocused(), name, target);
        if !mirrored {
            log::info!("Marker {} not mirrored, position already taken", name);
        }
    }

    /// Highlight a marker (table row click)
    pub fn select_marker(&mut self, kind: MarkerKind, name: &str) -> bool {
        let result = self.markers(kind).borrow_mut().select(name);
        match result {
            Ok(changed) => changed,
            Err(e) => {
                self.report("Select marker", e);
                false
            }
        }
    }

    pub fn remove_selected_marker(&mut self, kind: MarkerKind) -> Option<String> {
        let result = self.markers(kind).borrow_mut().remove_selected();
        match result {
            Ok(removed) => {
                if removed.is_some() {
                    self.registry.refresh_except(marker_panel_id(kind));
                }
                removed
            }
            Err(e) => {
                self.report("Remove marker", e);
                None
            }
        }
    }

    // ---- view tracking ----

    /// The cursor moved over the image view
    pub fn cursor_moved(&mut self, point: PixelPoint) {
        self.magnifier.borrow_mut().update_center(point);
    }

    /// Sky position under the cursor, for the status line
    pub fn sky_at(&self, point: PixelPoint) -> Result<SkyCoord> {
        let image = self.registry.current().ok_or(Error::NoImage)?;
        let image = image.borrow();
        let sky = image.file().borrow().pixel_to_sky(point);
        sky.ok_or(Error::NoCoordinateSolution)
    }

    /// The main view now shows `limits` (image coordinates)
    pub fn viewport_changed(&mut self, limits: Rect) {
        self.navigator.borrow_mut().update_limits(limits);
    }

    /// Store a new pan/zoom for the active window's image view
    pub fn set_viewport(&mut self, viewport: Viewport) {
        let Some(window) = self.active.and_then(|id| self.windows.get_mut(&id)) else {
            return;
        };
        if let Some(stored) = window.viewport_mut() {
            *stored = viewport;
            self.viewport_changed(viewport.visible_rect());
        }
    }

    // ---- saving ----

    /// The active window can save and has something to save
    pub fn save_enabled(&self) -> bool {
        self.active_window()
            .is_some_and(|window| window.can_save() && window.is_dirty())
    }

    /// Save every modified file of the active window
    pub fn save_active(&mut self) {
        let Some(window) = self.active_window() else {
            return;
        };
        if !window.can_save() {
            return;
        }

        let mut saved: Vec<SharedFile> = Vec::new();
        let mut failure = None;
        for image in window.images() {
            let file = Rc::clone(image.borrow().file());
            // Both halves of a comparison may share one file
            if saved.iter().any(|done| Rc::ptr_eq(done, &file)) || !file.borrow().is_dirty() {
                continue;
            }
            if let Err(e) = file.borrow_mut().save() {
                failure = Some(e);
                break;
            }
            saved.push(file);
        }

        if let Some(e) = failure {
            self.report("Save", e);
        }
        if !saved.is_empty() {
            self.registry.refresh();
        }
    }

    // ---- internals ----

    fn allocate_id(&mut self) -> WindowId {
        let id = WindowId(self.next_id);
        self.next_id += 1;
        id
    }

    fn create_image(&self, window: WindowId, file: SharedFile) -> Result<ImageHandle> {
        let transfer = self
            .settings()
            .get(keys::TRANSFER_FUNCTION, keys::DEFAULT_TRANSFER_FUNCTION);
        let gamma = self.settings().get(keys::GAMMA, keys::DEFAULT_GAMMA);
        Ok(ControlImage::new(window, file, transfer, gamma)?.into_handle())
    }

    fn markers(&self, kind: MarkerKind) -> &Rc<RefCell<MarkerPanel>> {
        match kind {
            MarkerKind::Astrometry => &self.astrometry,
            MarkerKind::Photometry => &self.photometry,
        }
    }

    fn for_each_panel(&self, mut f: impl FnMut(&mut dyn ImagePanel)) {
        for id in [
            PanelId::Histogram,
            PanelId::ImageControl,
            PanelId::Magnifier,
            PanelId::Navigator,
            PanelId::Astrometry,
            PanelId::Photometry,
        ] {
            let panel = self.panel(id);
            let mut panel = panel.borrow_mut();
            f(&mut *panel);
        }
    }

    fn persist<T: serde::Serialize>(&mut self, key: &str, value: &T) {
        if let Err(e) = self.settings.set(key, value) {
            log::warn!("Failed to store setting {}: {}", key, e);
        }
    }

    /// Log an error and queue it for the user
    fn report(&mut self, title: &str, error: Error) {
        let notice = error.to_notice(title);
        match notice.severity {
            Severity::Info => log::info!("{}: {}", title, error),
            Severity::Warning => log::warn!("{}: {}", title, error),
            Severity::InternalError => log::error!("{}: {}", title, error),
        }
        self.notices.push(notice);
    }
}

fn marker_panel_id(kind: MarkerKind) -> PanelId {
    match kind {
        MarkerKind::Astrometry => PanelId::Astrometry,
        MarkerKind::Photometry => PanelId::Photometry,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::astro::plane::testing::star_file;
    use crate::astro::{ObservationRecord, PlaneFile};
    use crate::state::MemorySettings;
    use cgmath::{Point2, Vector2};

    const STARS: [(f64, f64, f64); 2] = [(20.0, 20.0, 200.0), (45.0, 30.0, 150.0)];

    fn frame() -> FrameWindow {
        FrameWindow::new(Box::new(MemorySettings::new()))
    }

    fn file(name: &str) -> SharedFile {
        Rc::new(RefCell::new(star_file(name, 64, 48, &STARS)))
    }

    fn image_of(frame: &FrameWindow, id: WindowId) -> ImageHandle {
        frame.window(id).unwrap().current_image().unwrap()
    }

    #[test]
    fn test_selection_follows_activation() {
        let mut frame = frame();
        let a = frame.open_image(file("a.png")).unwrap();
        let image_a = image_of(&frame, a);
        assert!(image_a.borrow().is_active());

        let b = frame.open_image(file("b.png")).unwrap();
        let image_b = image_of(&frame, b);
        assert!(!image_a.borrow().is_active());
        assert!(image_b.borrow().is_active());
        assert_eq!(frame.image_control().name(), Some("b.png"));

        frame.close(b);
        assert!(frame.current_image().is_none());
        assert!(frame.image_control().is_clear());
        assert!(frame.histogram().counts().is_empty());
        drop(image_b);

        frame.activate(a);
        assert!(image_a.borrow().is_active());
        assert!(frame.registry().is_current(&image_a));
        assert_eq!(frame.image_control().name(), Some("a.png"));
    }

    #[test]
    fn test_calculator_clears_selection() {
        let mut frame = frame();
        let a = frame.open_image(file("a.png")).unwrap();
        let image_a = image_of(&frame, a);

        frame.open_julian_calculator();
        assert!(frame.current_image().is_none());
        assert!(!image_a.borrow().is_active());
        assert!(frame.navigator().thumbnail().is_none());
        assert!(!frame.save_enabled());
    }

    #[test]
    fn test_histogram_edit_marks_dirty_and_refreshes() {
        let mut frame = frame();
        let a = frame.open_image(file("a.png")).unwrap();
        assert_eq!(frame.window_title(a).unwrap(), "a.png");
        assert!(!frame.save_enabled());

        let before = frame.magnifier().bitmap().cloned().unwrap();
        frame.set_black_point(50.0);

        assert_eq!(frame.window_title(a).unwrap(), "a.png*");
        assert!(frame.save_enabled());
        assert_eq!(frame.image_control().is_dirty(), Some(true));
        assert_eq!(frame.image_control().levels().map(|l| l.0), Some(50.0));
        assert!(!Rc::ptr_eq(&before, frame.magnifier().bitmap().unwrap()));
    }

    #[test]
    fn test_transfer_preference_is_persisted() {
        let mut frame = frame();
        frame.open_image(file("a.png"));
        frame.set_transfer_function(TransferFunction::Asinh);
        assert_eq!(
            frame
                .settings()
                .get(keys::TRANSFER_FUNCTION, TransferFunction::Linear),
            TransferFunction::Asinh
        );

        // New windows pick up the stored preference
        let b = frame.open_image(file("b.png")).unwrap();
        assert_eq!(image_of(&frame, b).borrow().transfer(), TransferFunction::Asinh);
    }

    #[test]
    fn test_errors_become_notices() {
        let mut frame = frame();
        frame.set_gamma(2.0);
        assert!(frame.add_marker(MarkerKind::Astrometry, Point2::new(1.0, 1.0)).is_none());

        let notices = frame.take_notices();
        assert_eq!(notices.len(), 2);
        assert!(notices.iter().all(|n| n.severity == Severity::Info));
        assert!(frame.take_notices().is_empty());

        frame.open_image(file("a.png"));
        frame.set_gamma(-1.0);
        assert_eq!(frame.take_notices()[0].severity, Severity::Warning);
    }

    #[test]
    fn test_markers_on_image_window() {
        let mut frame = frame();
        let a = frame.open_image(file("a.png")).unwrap();

        let outcome = frame.add_marker(MarkerKind::Astrometry, Point2::new(21.0, 19.0));
        assert_eq!(outcome, Some(MarkerOutcome::Added("A:1".into())));
        let again = frame.add_marker(MarkerKind::Astrometry, Point2::new(20.0, 21.0));
        assert_eq!(again, Some(MarkerOutcome::AlreadyMarked));

        frame.add_marker(MarkerKind::Astrometry, Point2::new(45.0, 30.0));
        assert!(frame.select_marker(MarkerKind::Astrometry, "A:1"));
        assert_eq!(frame.marker_panel(MarkerKind::Astrometry).selected(), Some("A:1"));
        assert_eq!(frame.image_control().is_dirty(), Some(true));
        assert_eq!(frame.window_title(a).unwrap(), "a.png*");

        assert_eq!(frame.remove_selected_marker(MarkerKind::Astrometry), Some("A:1".into()));
        assert_eq!(frame.layer().live_count(), 1);

        frame.close(a);
        assert_eq!(frame.layer().live_count(), 0);
        assert!(frame.marker_panel(MarkerKind::Astrometry).rows().is_empty());
    }

    #[test]
    fn test_closing_focused_window_activates_newest() {
        let mut frame = frame();
        let a = frame.open_image(file("a.png")).unwrap();
        let b = frame.open_image(file("b.png")).unwrap();
        let c = frame.open_image(file("c.png")).unwrap();

        frame.close_and_focus_next(c);
        assert_eq!(frame.active(), Some(b));
        assert_eq!(frame.image_control().name(), Some("b.png"));
        assert!(frame.image_control().selector_enabled());

        // Closing a background window leaves the focus alone
        frame.close_and_focus_next(a);
        assert_eq!(frame.active(), Some(b));

        frame.close_and_focus_next(b);
        assert_eq!(frame.active(), None);
        assert!(frame.current_image().is_none());
    }

    #[test]
    fn test_closing_last_window_releases_file() {
        let mut frame = frame();
        let shared = file("a.png");
        let weak = Rc::downgrade(&shared);
        let a = frame.open_image(shared).unwrap();
        let b = frame.open_comparison(
            weak.upgrade().unwrap(),
            file("b.png"),
            Alignment::identity(),
        );
        assert!(weak.upgrade().is_some());

        frame.close(a);
        assert!(weak.upgrade().is_some());
        frame.close(b.unwrap());
        assert!(weak.upgrade().is_none());
    }

    #[test]
    fn test_reopened_file_appends_to_saved_observations() {
        let mut frame = frame();
        let shared = file("a.png");
        shared.borrow_mut().record_observation(ObservationRecord {
            name: "A:1".into(),
            x: 45.0,
            y: 30.0,
            sky: None,
            photometry: None,
        });
        frame.open_image(Rc::clone(&shared));
        assert_eq!(frame.marker_panel(MarkerKind::Astrometry).rows().len(), 1);

        let outcome = frame.add_marker(MarkerKind::Astrometry, Point2::new(20.0, 20.0));
        assert_eq!(outcome, Some(MarkerOutcome::Added("A:2".into())));

        let file = shared.borrow();
        let saved: Vec<(&str, f64)> = file
            .observations()
            .iter()
            .map(|o| (o.name.as_str(), o.x))
            .collect();
        assert_eq!(saved.len(), 2);
        assert_eq!(saved[0], ("A:1", 45.0));
        assert_eq!(saved[1].0, "A:2");
    }

    #[test]
    fn test_disabled_panels_ignore_edits() {
        let mut frame = frame();
        frame.open_image(file("a.png"));
        frame.panel(PanelId::Astrometry).borrow_mut().set_enabled(false);
        frame.panel(PanelId::Histogram).borrow_mut().set_enabled(false);
        let black = frame.histogram().black_point();

        assert!(frame.add_marker(MarkerKind::Astrometry, Point2::new(20.0, 20.0)).is_none());
        frame.set_black_point(50.0);

        assert_eq!(frame.histogram().black_point(), black);
        assert_eq!(frame.current_image().unwrap().borrow().black_point(), black);
        assert!(frame.marker_panel(MarkerKind::Astrometry).rows().is_empty());
        assert!(!frame.save_enabled());
        let notices = frame.take_notices();
        assert_eq!(notices.len(), 2);
        assert!(notices.iter().all(|n| n.severity == Severity::Info));
    }

    #[test]
    fn test_switching_images_swaps_marker_rows() {
        let mut frame = frame();
        let a = frame.open_image(file("a.png")).unwrap();
        frame.add_marker(MarkerKind::Photometry, Point2::new(20.0, 20.0));
        let b = frame.open_image(file("b.png")).unwrap();
        assert!(frame.marker_panel(MarkerKind::Photometry).rows().is_empty());

        frame.activate(a);
        assert_eq!(frame.marker_panel(MarkerKind::Photometry).rows().len(), 1);
        frame.activate(b);
        frame.activate(a);
        // Rebuilding on every switch does not pile up indicators
        assert_eq!(frame.layer().live_count(), 1);
    }

    #[test]
    fn test_comparison_mirrors_markers() {
        let mut frame = frame();
        let input = file("in.png");
        let output: SharedFile = Rc::new(RefCell::new(star_file(
            "out.png",
            64,
            48,
            &[(25.0, 17.0, 200.0), (50.0, 27.0, 150.0)],
        )));
        let shift = Alignment::from_parameters(0.0, 1.0, Vector2::new(5.0, -3.0));
        let id = frame.open_comparison(input, output, shift).unwrap();

        frame.add_marker(MarkerKind::Astrometry, Point2::new(20.0, 20.0));

        let window = frame.window(id).unwrap();
        let WindowKind::Comparison(pair) = &window.kind else {
            panic!("not a comparison window");
        };
        let mirrored = pair.output.borrow();
        let marker = mirrored.markers(MarkerKind::Astrometry).get("A:1").unwrap();
        assert!((marker.pixel.x - 25.0).abs() < 0.2);
        assert!((marker.pixel.y - 17.0).abs() < 0.2);
        drop(mirrored);

        // Focusing the output makes it current and shows its marker
        frame.focus_side(Side::Output);
        assert!(frame.registry().is_current(&image_of(&frame, id)));
        assert_eq!(frame.marker_panel(MarkerKind::Astrometry).rows()[0].name, "A:1");
    }

    #[test]
    fn test_save_active_writes_sidecar() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.png");
        let plane_file = star_file("a.png", 64, 48, &STARS).with_path(&path);
        let shared: SharedFile = Rc::new(RefCell::new(plane_file));

        let mut frame = frame();
        let a = frame.open_image(Rc::clone(&shared)).unwrap();
        frame.add_marker(MarkerKind::Astrometry, Point2::new(20.0, 20.0));
        assert!(frame.save_enabled());

        frame.save_active();
        assert!(frame.take_notices().is_empty());
        assert!(!shared.borrow().is_dirty());
        assert_eq!(frame.window_title(a).unwrap(), "a.png");
        assert!(PlaneFile::sidecar_path(&path).exists());
        assert!(!frame.save_enabled());
    }

    #[test]
    fn test_save_without_location_reports() {
        let mut frame = frame();
        frame.open_image(file("a.png"));
        frame.set_invert(true);
        frame.save_active();

        let notices = frame.take_notices();
        assert_eq!(notices.len(), 1);
        assert_eq!(notices[0].severity, Severity::Warning);
        assert!(frame.save_enabled());
    }

    #[test]
    fn test_view_tracking() {
        let mut frame = frame();
        frame.open_image(file("a.png"));

        frame.cursor_moved(Point2::new(10.0, 12.0));
        assert_eq!(frame.magnifier().center(), Some(Point2::new(10.0, 12.0)));

        frame.set_viewport(Viewport {
            zoom: 2.0,
            offset: Point2::new(4.0, 4.0),
            size: (40.0, 20.0),
        });
        let scale = frame.navigator().scale().unwrap();
        assert_eq!(
            frame.navigator().outline(),
            Some(Rect::new(4.0, 4.0, 20.0, 10.0).scaled(scale))
        );
    }

    #[test]
    fn test_sky_at_needs_solution() {
        let mut frame = frame();
        assert!(matches!(frame.sky_at(Point2::new(1.0, 1.0)), Err(Error::NoImage)));

        frame.open_image(file("a.png"));
        assert!(matches!(
            frame.sky_at(Point2::new(1.0, 1.0)),
            Err(Error::NoCoordinateSolution)
        ));

        let solved = star_file("b.png", 64, 48, &STARS).with_wcs(crate::astro::LinearWcs {
            reference_pixel: (32.0, 24.0),
            reference_sky: SkyCoord { ra: 10.0, dec: 20.0 },
            scale: 1.0 / 3600.0,
            rotation: 0.0,
        });
        frame.open_image(Rc::new(RefCell::new(solved)));
        let sky = frame.sky_at(Point2::new(32.0, 24.0)).unwrap();
        assert!((sky.ra - 10.0).abs() < 1e-9 && (sky.dec - 20.0).abs() < 1e-9);
    }

    #[test]
    fn test_sub_image_switch_refreshes_panels() {
        let planes = vec![
            crate::astro::plane::testing::plane(2, 2, &[0.0, 1.0, 2.0, 3.0]),
            crate::astro::plane::testing::plane(2, 2, &[10.0, 20.0, 30.0, 40.0]),
        ];
        let shared: SharedFile =
            Rc::new(RefCell::new(PlaneFile::from_planes("cube", planes).unwrap()));

        let mut frame = frame();
        frame.open_image(shared);
        frame.set_sub_image(1);
        assert_eq!(frame.histogram().range(), Some((10.0, 40.0)));
        assert_eq!(frame.image_control().sub_image(), Some(1));

        frame.set_sub_image(7);
        assert_eq!(frame.take_notices().len(), 1);
    }
}
