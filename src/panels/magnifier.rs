/// Magnifier panel
///
/// Shows the full current bitmap under a fixed zoom, centered on the last
/// cursor position reported by the image view. The zoom is a view
/// transform; the bitmap itself is never cropped.

use std::rc::Rc;

use cgmath::Point2;
use image::GrayImage;

use super::{ImagePanel, PanelId};
use crate::geometry::{PixelPoint, Rect};
use crate::state::{keys, ImageHandle, SettingsStore};

pub struct MagnifierPanel {
    enabled: bool,
    zoom: f64,
    viewport: (f64, f64),
    bitmap: Option<Rc<GrayImage>>,
    center: Option<PixelPoint>,
}

impl MagnifierPanel {
    pub fn new(settings: &dyn SettingsStore) -> Self {
        let zoom = settings.get(keys::MAGNIFIER_ZOOM, keys::DEFAULT_MAGNIFIER_ZOOM);
        Self {
            enabled: true,
            zoom: if zoom > 0.0 { zoom } else { keys::DEFAULT_MAGNIFIER_ZOOM },
            viewport: (160.0, 160.0),
            bitmap: None,
            center: None,
        }
    }

    pub fn bitmap(&self) -> Option<&Rc<GrayImage>> {
        self.bitmap.as_ref()
    }

    pub fn zoom(&self) -> f64 {
        self.zoom
    }

    pub fn center(&self) -> Option<PixelPoint> {
        self.center
    }

    /// Widget size in screen pixels
    pub fn set_viewport(&mut self, width: f64, height: f64) {
        self.viewport = (width.max(1.0), height.max(1.0));
    }

    /// Recenter on an image position (driven by cursor movement)
    pub fn update_center(&mut self, point: PixelPoint) {
        if self.bitmap.is_some() {
            self.center = Some(self.clamp_to_image(point));
        }
    }

    /// Image region currently visible in the magnifier
    pub fn visible_region(&self) -> Option<Rect> {
        let center = self.center?;
        Some(Rect::centered(
            center,
            self.viewport.0 / self.zoom,
            self.viewport.1 / self.zoom,
        ))
    }

    fn clamp_to_image(&self, point: PixelPoint) -> PixelPoint {
        match &self.bitmap {
            Some(bitmap) => Point2::new(
                point.x.clamp(0.0, bitmap.width().saturating_sub(1) as f64),
                point.y.clamp(0.0, bitmap.height().saturating_sub(1) as f64),
            ),
            None => point,
        }
    }
}

impl ImagePanel for MagnifierPanel {
    fn id(&self) -> PanelId {
        PanelId::Magnifier
    }

    fn image_changed(&mut self, current: Option<&ImageHandle>) {
        self.bitmap = None;

        let Some(bitmap) = current.and_then(|image| image.borrow().bitmap()) else {
            self.center = None;
            return;
        };

        let fallback = Point2::new(bitmap.width() as f64 / 2.0, bitmap.height() as f64 / 2.0);
        self.bitmap = Some(bitmap);
        let center = self.center.unwrap_or(fallback);
        self.center = Some(self.clamp_to_image(center));
    }

    fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    fn is_enabled(&self) -> bool {
        self.enabled
    }
}
