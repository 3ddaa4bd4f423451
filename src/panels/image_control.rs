/// Image-control (info) panel
///
/// Read-out of the current image: name, sub-image selector, dimensions,
/// plane statistics, display levels, dirty state and whether a coordinate
/// solution is available. The sub-image selector is only live while the
/// window owning the image has focus.

use std::cell::RefCell;
use std::rc::{Rc, Weak};

use super::{Field, ImagePanel, PanelId};
use crate::astro::PlaneStats;
use crate::error::{Error, Result};
use crate::state::{ControlImage, ImageHandle};

#[derive(Default)]
pub struct ImageControlPanel {
    enabled: bool,
    window_focused: bool,
    image: Weak<RefCell<ControlImage>>,
    name: Field<String>,
    sub_image: Field<usize>,
    sub_image_count: Field<usize>,
    dimensions: Field<(u32, u32)>,
    stats: Field<PlaneStats>,
    levels: Field<(f32, f32)>,
    has_solution: Field<bool>,
    dirty: Field<bool>,
}

impl ImageControlPanel {
    pub fn new() -> Self {
        Self {
            enabled: true,
            window_focused: true,
            ..Self::default()
        }
    }

    pub fn name(&self) -> Option<&str> {
        self.name.value().map(String::as_str)
    }

    pub fn sub_image(&self) -> Option<usize> {
        self.sub_image.get()
    }

    pub fn sub_image_count(&self) -> Option<usize> {
        self.sub_image_count.get()
    }

    pub fn dimensions(&self) -> Option<(u32, u32)> {
        self.dimensions.get()
    }

    pub fn stats(&self) -> Option<PlaneStats> {
        self.stats.get()
    }

    pub fn levels(&self) -> Option<(f32, f32)> {
        self.levels.get()
    }

    pub fn has_solution(&self) -> Option<bool> {
        self.has_solution.get()
    }

    pub fn is_dirty(&self) -> Option<bool> {
        self.dirty.get()
    }

    /// Whether the sub-image selector accepts input
    pub fn selector_enabled(&self) -> bool {
        self.sub_image.is_enabled()
    }

    /// Every displayed field is blank
    pub fn is_clear(&self) -> bool {
        self.name.is_clear()
            && self.sub_image.is_clear()
            && self.sub_image_count.is_clear()
            && self.dimensions.is_clear()
            && self.stats.is_clear()
            && self.levels.is_clear()
            && self.has_solution.is_clear()
            && self.dirty.is_clear()
    }

    /// Show another plane of the current image
    pub fn select_sub_image(&mut self, index: usize) -> Result<()> {
        let handle = self.image.upgrade().ok_or(Error::NoImage)?;
        if !self.selector_enabled() {
            return Err(Error::Disabled(PanelId::ImageControl));
        }
        handle.borrow_mut().set_sub_image(index)?;
        self.load(&handle)
    }

    fn load(&mut self, handle: &ImageHandle) -> Result<()> {
        let image = handle.borrow();
        let file = image.file().borrow();
        let sub = image.sub_image();

        self.name.set(file.name().to_string());
        self.sub_image.set(sub);
        self.sub_image_count.set(file.sub_image_count());
        self.dimensions.set(file.dimensions(sub)?);
        self.stats.set(file.stats(sub)?);
        if let (Some(black), Some(white)) = (image.black_point(), image.white_point()) {
            self.levels.set((black, white));
        }
        self.has_solution.set(file.has_coordinate_solution());
        self.dirty.set(file.is_dirty());

        self.image = Rc::downgrade(handle);
        self.update_enabled();
        Ok(())
    }

    fn clear(&mut self) {
        self.image = Weak::new();
        self.name.clear();
        self.sub_image.clear();
        self.sub_image_count.clear();
        self.dimensions.clear();
        self.stats.clear();
        self.levels.clear();
        self.has_solution.clear();
        self.dirty.clear();
    }

    fn update_enabled(&mut self) {
        let live = self.enabled && self.image.upgrade().is_some();
        self.sub_image.set_enabled(live && self.window_focused);
        self.name.set_enabled(live);
        self.sub_image_count.set_enabled(live);
        self.dimensions.set_enabled(live);
        self.stats.set_enabled(live);
        self.levels.set_enabled(live);
        self.has_solution.set_enabled(live);
        self.dirty.set_enabled(live);
    }
}

impl ImagePanel for ImageControlPanel {
    fn id(&self) -> PanelId {
        PanelId::ImageControl
    }

    fn image_changed(&mut self, current: Option<&ImageHandle>) {
        let Some(handle) = current else {
            self.clear();
            return;
        };

        if let Err(e) = self.load(handle) {
            log::error!("Image info refresh failed: {}", e);
            self.clear();
        }
    }

    fn image_activating(&mut self) {
        self.window_focused = true;
        self.update_enabled();
    }

    fn image_deactivating(&mut self) {
        self.window_focused = false;
        self.update_enabled();
    }

    fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
        self.update_enabled();
    }

    fn is_enabled(&self) -> bool {
        self.enabled
    }
}
