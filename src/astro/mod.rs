/// Astronomy-file seam
///
/// The viewer core never touches pixels directly except through the
/// `AstroFile` trait. This module provides:
/// - `AstroFile`, the black-box interface the panels and windows call into
/// - `PlaneFile`, an in-memory implementation backed by `f32` planes (plane.rs)
/// - Bitmap rendering with transfer functions (render.rs)
/// - Centroid search and aperture photometry (measure.rs)
/// - Loading planes from image files on disk (loader.rs)

pub mod loader;
pub mod measure;
pub mod plane;
pub mod render;

use std::cell::RefCell;
use std::rc::Rc;

use image::GrayImage;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::geometry::{PixelPoint, SkyCoord};

pub use plane::{LinearWcs, PlaneFile};
pub use render::{RenderParams, TransferFunction};

/// Shared handle to an astronomy file
///
/// A file can be referenced by more than one ControlImage, e.g. the input
/// and output halves of a comparison window.
pub type SharedFile = Rc<RefCell<dyn AstroFile>>;

/// Basic statistics of one sub-image
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlaneStats {
    pub min: f32,
    pub max: f32,
    pub mean: f32,
}

/// Photometry aperture radii in pixels
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct Apertures {
    /// Radius of the star aperture
    pub star: f64,
    /// Inner radius of the sky annulus
    pub sky_inner: f64,
    /// Outer radius of the sky annulus
    pub sky_outer: f64,
}

impl Default for Apertures {
    fn default() -> Self {
        Self {
            star: 5.0,
            sky_inner: 8.0,
            sky_outer: 12.0,
        }
    }
}

/// Derived photometric quantities for one star
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct PhotometryResult {
    /// Background-subtracted flux inside the star aperture (ADU)
    pub flux: f64,
    /// Median sky level per pixel in the annulus (ADU)
    pub sky: f64,
    /// Instrumental magnitude, `None` when the flux is not positive
    pub magnitude: Option<f64>,
    /// Signal to noise ratio estimate
    pub snr: f64,
}

/// A marker measurement recorded into the file (saved with it)
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ObservationRecord {
    pub name: String,
    pub x: f64,
    pub y: f64,
    pub sky: Option<SkyCoord>,
    pub photometry: Option<PhotometryResult>,
}

/// The operations the viewer needs from an astronomy file
///
/// Absent results (no centroid, no sky solution) are `None`, not errors.
pub trait AstroFile: std::fmt::Debug {
    /// Display name, usually the file name
    fn name(&self) -> &str;

    /// Number of selectable image planes
    fn sub_image_count(&self) -> usize;

    /// Width and height of a sub-image
    fn dimensions(&self, sub: usize) -> Result<(u32, u32)>;

    /// Row-major pixel values of a sub-image
    fn pixels(&self, sub: usize) -> Result<&[f32]>;

    fn stats(&self, sub: usize) -> Result<PlaneStats>;

    /// Render a sub-image into a fresh 8-bit bitmap
    fn render(&self, sub: usize, params: &RenderParams) -> Result<GrayImage>;

    /// Convert a pixel position to sky coordinates if the file has a solution
    fn pixel_to_sky(&self, point: PixelPoint) -> Option<SkyCoord>;

    /// Whether `pixel_to_sky` can ever succeed
    fn has_coordinate_solution(&self) -> bool;

    /// Refine a click into a star centroid
    fn find_centroid(
        &self,
        sub: usize,
        near: PixelPoint,
        radius: u32,
        sensitivity: u32,
    ) -> Option<PixelPoint>;

    /// Aperture photometry around a position
    fn photometry(
        &self,
        sub: usize,
        center: PixelPoint,
        apertures: Apertures,
    ) -> Option<PhotometryResult>;

    /// Measurements recorded so far, including those restored from disk
    fn observations(&self) -> &[ObservationRecord];

    /// Store a measurement with the file; marks it dirty
    fn record_observation(&mut self, record: ObservationRecord);

    /// Forget a recorded measurement; marks the file dirty if one was removed
    fn remove_observation(&mut self, name: &str);

    fn set_dirty(&mut self);

    fn is_dirty(&self) -> bool;

    /// Persist the file; clears the dirty flag only on success
    fn save(&mut self) -> Result<()>;
}
