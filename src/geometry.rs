/// Image-space and sky-space geometry
///
/// Pixel positions use cgmath points with `x` to the right and `y` down.
/// Integer coordinates are pixel centers.

use cgmath::{InnerSpace, Matrix3, Point2, SquareMatrix, Vector2, Vector3};
use serde::{Deserialize, Serialize};

/// A position in image pixel coordinates
pub type PixelPoint = Point2<f64>;

/// An equatorial sky position in degrees
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct SkyCoord {
    /// Right ascension in degrees, 0..360
    pub ra: f64,
    /// Declination in degrees, -90..90
    pub dec: f64,
}

/// An axis-aligned rectangle in image (or widget) coordinates
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self { x, y, width, height }
    }

    /// Rectangle of the given size centered on `center`
    pub fn centered(center: PixelPoint, width: f64, height: f64) -> Self {
        Self::new(center.x - width / 2.0, center.y - height / 2.0, width, height)
    }

    pub fn center(&self) -> PixelPoint {
        Point2::new(self.x + self.width / 2.0, self.y + self.height / 2.0)
    }

    /// Uniformly scale position and size
    pub fn scaled(&self, factor: f64) -> Self {
        Self::new(
            self.x * factor,
            self.y * factor,
            self.width * factor,
            self.height * factor,
        )
    }
}

/// Euclidean distance between two pixel positions
pub fn distance(a: PixelPoint, b: PixelPoint) -> f64 {
    (b - a).magnitude()
}

/// Affine mapping between the two images of a comparison pair
///
/// Stored as a homogeneous 3x3 matrix taking input-image pixels to
/// output-image pixels. The reverse direction uses the inverse.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Alignment {
    forward: Matrix3<f64>,
}

impl Default for Alignment {
    fn default() -> Self {
        Self::identity()
    }
}

impl Alignment {
    pub fn identity() -> Self {
        Self {
            forward: Matrix3::identity(),
        }
    }

    /// Rotation (radians, about the origin), uniform scale, then translation
    pub fn from_parameters(rotation: f64, scale: f64, translation: Vector2<f64>) -> Self {
        let (sin, cos) = rotation.sin_cos();
        // cgmath matrices are column-major
        let forward = Matrix3::from_cols(
            Vector3::new(scale * cos, scale * sin, 0.0),
            Vector3::new(-scale * sin, scale * cos, 0.0),
            Vector3::new(translation.x, translation.y, 1.0),
        );
        Self { forward }
    }

    /// Map an input-image position onto the output image
    pub fn forward(&self, point: PixelPoint) -> PixelPoint {
        apply(&self.forward, point)
    }

    /// Map an output-image position back onto the input image
    ///
    /// Returns `None` when the alignment is degenerate (zero scale).
    pub fn reverse(&self, point: PixelPoint) -> Option<PixelPoint> {
        self.forward.invert().map(|inverse| apply(&inverse, point))
    }
}

fn apply(matrix: &Matrix3<f64>, point: PixelPoint) -> PixelPoint {
    let v = matrix * Vector3::new(point.x, point.y, 1.0);
    Point2::new(v.x / v.z, v.y / v.z)
}
