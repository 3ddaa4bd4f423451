/// Navigator panel
///
/// A scaled-down thumbnail of the whole current image with one outline
/// showing which part the main view currently displays.

use std::cell::RefCell;
use std::rc::{Rc, Weak};

use image::GrayImage;

use super::{ImagePanel, PanelId};
use crate::geometry::Rect;
use crate::state::{ControlImage, ImageHandle};

pub struct NavigatorPanel {
    enabled: bool,
    viewport: (f64, f64),
    image: Weak<RefCell<ControlImage>>,
    thumbnail: Option<Rc<GrayImage>>,
    scale: Option<f64>,
    /// Visible region of the main view, in image coordinates
    limits: Option<Rect>,
}

impl Default for NavigatorPanel {
    fn default() -> Self {
        Self::new()
    }
}

impl NavigatorPanel {
    pub fn new() -> Self {
        Self {
            enabled: true,
            viewport: (200.0, 150.0),
            image: Weak::new(),
            thumbnail: None,
            scale: None,
            limits: None,
        }
    }

    pub fn thumbnail(&self) -> Option<&Rc<GrayImage>> {
        self.thumbnail.as_ref()
    }

    /// Thumbnail pixels per image pixel
    pub fn scale(&self) -> Option<f64> {
        self.scale
    }

    /// Widget size in screen pixels; the scale follows
    pub fn set_viewport(&mut self, width: f64, height: f64) {
        self.viewport = (width.max(1.0), height.max(1.0));
        self.scale = self.thumbnail.as_ref().map(|t| self.fit_scale(t));
    }

    /// Replace the outline with the main view's visible region
    pub fn update_limits(&mut self, limits: Rect) {
        if self.thumbnail.is_some() {
            self.limits = Some(limits);
        }
    }

    /// The outline in thumbnail coordinates
    pub fn outline(&self) -> Option<Rect> {
        Some(self.limits?.scaled(self.scale?))
    }

    fn fit_scale(&self, thumbnail: &GrayImage) -> f64 {
        let width = thumbnail.width().max(1) as f64;
        let height = thumbnail.height().max(1) as f64;
        (self.viewport.0 / width).min(self.viewport.1 / height)
    }
}

impl ImagePanel for NavigatorPanel {
    fn id(&self) -> PanelId {
        PanelId::Navigator
    }

    fn image_changed(&mut self, current: Option<&ImageHandle>) {
        self.thumbnail = None;
        self.scale = None;

        let (Some(handle), Some(bitmap)) = (current, current.and_then(|i| i.borrow().bitmap()))
        else {
            self.image = Weak::new();
            self.limits = None;
            return;
        };

        // The outline only survives a refresh of the same image
        let same_image = self
            .image
            .upgrade()
            .is_some_and(|previous| Rc::ptr_eq(&previous, handle));
        if !same_image {
            self.limits = None;
        }

        self.scale = Some(self.fit_scale(&bitmap));
        self.thumbnail = Some(bitmap);
        self.image = Rc::downgrade(handle);
    }

    fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    fn is_enabled(&self) -> bool {
        self.enabled
    }
}
