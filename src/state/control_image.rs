/// Per-window image state
///
/// A `ControlImage` pairs an astronomy file with everything the UI needs to
/// show it: the selected sub-image, display levels and tone curve, the
/// cached bitmap and the markers placed on it. It is the single source of
/// truth for those values; panels only mirror them.

use std::cell::RefCell;
use std::rc::Rc;

use image::GrayImage;

use super::marker::{Marker, MarkerKind, MarkerSet};
use crate::astro::{RenderParams, SharedFile, TransferFunction};
use crate::error::{Error, Result};
use crate::windows::WindowId;

/// Shared handle to a ControlImage; identity is `Rc::ptr_eq`
pub type ImageHandle = Rc<RefCell<ControlImage>>;

#[derive(Debug)]
pub struct ControlImage {
    /// Window displaying this image (back-reference, not ownership)
    window: WindowId,
    file: SharedFile,
    sub_image: usize,
    black_point: Option<f32>,
    white_point: Option<f32>,
    transfer: TransferFunction,
    gamma: f32,
    invert: bool,
    /// Rendered bitmap, replaced wholesale on every redraw
    bitmap: Option<Rc<GrayImage>>,
    is_active: bool,
    astrometry: MarkerSet,
    photometry: MarkerSet,
}

impl ControlImage {
    /// Create the image state for a window and render the first bitmap
    ///
    /// Measurements already recorded in the file come back as markers, so
    /// new markers never reuse their names.
    pub fn new(
        window: WindowId,
        file: SharedFile,
        transfer: TransferFunction,
        gamma: f32,
    ) -> Result<Self> {
        let mut astrometry = MarkerSet::new();
        let mut photometry = MarkerSet::new();
        for record in file.borrow().observations() {
            let set = match MarkerKind::of_record(record) {
                MarkerKind::Astrometry => &mut astrometry,
                MarkerKind::Photometry => &mut photometry,
            };
            set.insert(Marker::from_record(record));
        }

        let mut image = Self {
            window,
            file,
            sub_image: 0,
            black_point: None,
            white_point: None,
            transfer,
            gamma,
            invert: false,
            bitmap: None,
            is_active: false,
            astrometry,
            photometry,
        };
        image.redraw()?;
        Ok(image)
    }

    /// Wrap into a shared handle
    pub fn into_handle(self) -> ImageHandle {
        Rc::new(RefCell::new(self))
    }

    pub fn window(&self) -> WindowId {
        self.window
    }

    pub fn file(&self) -> &SharedFile {
        &self.file
    }

    pub fn name(&self) -> String {
        self.file.borrow().name().to_string()
    }

    pub fn sub_image(&self) -> usize {
        self.sub_image
    }

    pub fn black_point(&self) -> Option<f32> {
        self.black_point
    }

    pub fn white_point(&self) -> Option<f32> {
        self.white_point
    }

    pub fn transfer(&self) -> TransferFunction {
        self.transfer
    }

    pub fn gamma(&self) -> f32 {
        self.gamma
    }

    pub fn invert(&self) -> bool {
        self.invert
    }

    pub fn bitmap(&self) -> Option<Rc<GrayImage>> {
        self.bitmap.clone()
    }

    pub fn is_active(&self) -> bool {
        self.is_active
    }

    /// Only the selection registry flips this
    pub(crate) fn set_active(&mut self, active: bool) {
        self.is_active = active;
    }

    pub fn markers(&self, kind: MarkerKind) -> &MarkerSet {
        match kind {
            MarkerKind::Astrometry => &self.astrometry,
            MarkerKind::Photometry => &self.photometry,
        }
    }

    pub fn markers_mut(&mut self, kind: MarkerKind) -> &mut MarkerSet {
        match kind {
            MarkerKind::Astrometry => &mut self.astrometry,
            MarkerKind::Photometry => &mut self.photometry,
        }
    }

    /// Switch the displayed plane; levels are recomputed for the new plane
    pub fn set_sub_image(&mut self, index: usize) -> Result<()> {
        let count = self.file.borrow().sub_image_count();
        if index >= count {
            return Err(Error::SubImageOutOfRange { index, count });
        }
        if index == self.sub_image {
            return Ok(());
        }

        self.edit(|image| {
            image.sub_image = index;
            image.black_point = None;
            image.white_point = None;
        })
    }

    /// Apply a display change and re-render
    ///
    /// If the render fails the change is undone and the old bitmap stays.
    pub fn edit(&mut self, change: impl FnOnce(&mut Self)) -> Result<()> {
        let saved = (
            self.sub_image,
            self.black_point,
            self.white_point,
            self.transfer,
            self.gamma,
            self.invert,
        );
        change(self);
        if let Err(e) = self.redraw() {
            (
                self.sub_image,
                self.black_point,
                self.white_point,
                self.transfer,
                self.gamma,
                self.invert,
            ) = saved;
            return Err(e);
        }
        Ok(())
    }

    pub fn set_levels(&mut self, black: f32, white: f32) {
        self.black_point = Some(black);
        self.white_point = Some(white);
    }

    pub fn set_transfer(&mut self, transfer: TransferFunction) {
        self.transfer = transfer;
    }

    pub fn set_gamma(&mut self, gamma: f32) {
        self.gamma = gamma;
    }

    pub fn set_invert(&mut self, invert: bool) {
        self.invert = invert;
    }

    /// Parameters of the next render; unset levels default to the plane range
    pub fn render_params(&self) -> Result<RenderParams> {
        let stats = self.file.borrow().stats(self.sub_image)?;
        Ok(RenderParams {
            black: self.black_point.unwrap_or(stats.min),
            white: self.white_point.unwrap_or(stats.max),
            transfer: self.transfer,
            gamma: self.gamma,
            invert: self.invert,
        })
    }

    /// Render a fresh bitmap and drop the old one
    pub fn redraw(&mut self) -> Result<()> {
        let params = self.render_params()?;
        let bitmap = self.file.borrow().render(self.sub_image, &params)?;

        self.black_point = Some(params.black);
        self.white_point = Some(params.white);
        self.bitmap = Some(Rc::new(bitmap));
        Ok(())
    }

    pub fn mark_dirty(&self) {
        self.file.borrow_mut().set_dirty();
    }

    pub fn is_dirty(&self) -> bool {
        self.file.borrow().is_dirty()
    }
}
