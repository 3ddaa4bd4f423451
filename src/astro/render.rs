/// Bitmap rendering of image planes
///
/// Maps floating point pixel values onto an 8-bit gray bitmap:
/// 1. Normalize against the black/white points and clamp to [0, 1]
/// 2. Apply the transfer function (tone curve)
/// 3. Optionally invert
/// 4. Scale to 0..255

use image::{GrayImage, Luma};
use serde::{Deserialize, Serialize};

/// Tone-mapping curve applied when rendering
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransferFunction {
    #[default]
    Linear,
    /// Power law using the render gamma
    Gamma,
    Log,
    Sqrt,
    Asinh,
}

impl TransferFunction {
    pub const ALL: [TransferFunction; 5] = [
        TransferFunction::Linear,
        TransferFunction::Gamma,
        TransferFunction::Log,
        TransferFunction::Sqrt,
        TransferFunction::Asinh,
    ];

    /// Apply the curve to a normalized value in [0, 1]
    pub fn apply(self, t: f32, gamma: f32) -> f32 {
        match self {
            TransferFunction::Linear => t,
            TransferFunction::Gamma => {
                if gamma > 0.0 {
                    t.powf(1.0 / gamma)
                } else {
                    t
                }
            }
            // log10(1 + 9t) maps [0, 1] onto [0, 1]
            TransferFunction::Log => (1.0 + 9.0 * t).log10(),
            TransferFunction::Sqrt => t.sqrt(),
            TransferFunction::Asinh => (10.0 * t).asinh() / 10f32.asinh(),
        }
    }
}

impl std::fmt::Display for TransferFunction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            TransferFunction::Linear => "Linear",
            TransferFunction::Gamma => "Gamma",
            TransferFunction::Log => "Logarithmic",
            TransferFunction::Sqrt => "Square root",
            TransferFunction::Asinh => "Asinh",
        };
        f.write_str(label)
    }
}

/// Everything that determines a rendered bitmap besides the pixels
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderParams {
    pub black: f32,
    pub white: f32,
    pub transfer: TransferFunction,
    pub gamma: f32,
    pub invert: bool,
}

/// Render a row-major plane into a gray bitmap
pub fn render_plane(pixels: &[f32], width: u32, height: u32, params: &RenderParams) -> GrayImage {
    let range = params.white - params.black;

    GrayImage::from_fn(width, height, |x, y| {
        let value = pixels[(y * width + x) as usize];

        // Equal black and white points degrade to a hard threshold
        let t = if range > 0.0 {
            ((value - params.black) / range).clamp(0.0, 1.0)
        } else if value > params.black {
            1.0
        } else {
            0.0
        };

        let mut t = params.transfer.apply(t, params.gamma).clamp(0.0, 1.0);
        if params.invert {
            t = 1.0 - t;
        }

        Luma([(t * 255.0).round() as u8])
    })
}
