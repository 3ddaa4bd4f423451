/// Star measurements on a single plane
///
/// Both helpers work on a row-major `f32` plane and use robust statistics
/// (median background, MAD noise) of the pixels around the target.

use cgmath::Point2;

use super::{Apertures, PhotometryResult};
use crate::geometry::PixelPoint;

/// Scale factor turning a median absolute deviation into a gaussian sigma
const MAD_TO_SIGMA: f64 = 1.4826;

/// Find the intensity-weighted centroid of the star nearest `near`
///
/// Only pixels inside a circle of `radius` around `near` are considered.
/// A pixel contributes when it is more than `sensitivity` noise sigmas above
/// the local background. Returns `None` when nothing stands out.
pub fn find_centroid(
    pixels: &[f32],
    width: u32,
    height: u32,
    near: PixelPoint,
    radius: u32,
    sensitivity: u32,
) -> Option<PixelPoint> {
    let window = circle_samples(pixels, width, height, near, 0.0, radius as f64);
    if window.is_empty() {
        return None;
    }

    let values: Vec<f64> = window.iter().map(|s| s.value).collect();
    let (background, noise) = robust_background(&values);
    let threshold = background + sensitivity as f64 * noise;

    let (mut sum_w, mut sum_x, mut sum_y) = (0.0, 0.0, 0.0);
    for sample in window.iter().filter(|s| s.value > threshold) {
        let weight = sample.value - background;
        sum_w += weight;
        sum_x += weight * sample.x;
        sum_y += weight * sample.y;
    }

    if sum_w <= 0.0 {
        return None;
    }

    Some(Point2::new(sum_x / sum_w, sum_y / sum_w))
}

/// Aperture photometry with a sky annulus
pub fn aperture_photometry(
    pixels: &[f32],
    width: u32,
    height: u32,
    center: PixelPoint,
    apertures: Apertures,
) -> Option<PhotometryResult> {
    let star = circle_samples(pixels, width, height, center, 0.0, apertures.star);
    let sky = circle_samples(
        pixels,
        width,
        height,
        center,
        apertures.sky_inner,
        apertures.sky_outer,
    );
    if star.is_empty() || sky.is_empty() {
        return None;
    }

    let sky_values: Vec<f64> = sky.iter().map(|s| s.value).collect();
    let (sky_level, noise) = robust_background(&sky_values);

    let flux: f64 = star.iter().map(|s| s.value - sky_level).sum();
    let magnitude = (flux > 0.0).then(|| -2.5 * flux.log10());

    let variance = flux.max(0.0) + star.len() as f64 * noise * noise;
    let snr = if variance > 0.0 { flux / variance.sqrt() } else { 0.0 };

    Some(PhotometryResult {
        flux,
        sky: sky_level,
        magnitude,
        snr,
    })
}

struct Sample {
    x: f64,
    y: f64,
    value: f64,
}

/// Pixels whose centers lie in the ring `inner <= d <= outer` around `center`
///
/// Integer coordinates are pixel centers.
fn circle_samples(
    pixels: &[f32],
    width: u32,
    height: u32,
    center: PixelPoint,
    inner: f64,
    outer: f64,
) -> Vec<Sample> {
    let x0 = (center.x - outer).floor().max(0.0) as i64;
    let y0 = (center.y - outer).floor().max(0.0) as i64;
    let x1 = (center.x + outer).ceil().min(width as f64 - 1.0) as i64;
    let y1 = (center.y + outer).ceil().min(height as f64 - 1.0) as i64;

    let mut samples = Vec::new();
    for y in y0..=y1 {
        for x in x0..=x1 {
            let dx = x as f64 - center.x;
            let dy = y as f64 - center.y;
            let d = (dx * dx + dy * dy).sqrt();
            if d < inner || d > outer {
                continue;
            }
            let value = pixels[(y as usize) * width as usize + x as usize] as f64;
            samples.push(Sample {
                x: x as f64,
                y: y as f64,
                value,
            });
        }
    }
    samples
}

/// Median and MAD-based sigma of a sample
fn robust_background(values: &[f64]) -> (f64, f64) {
    let center = median(values.to_vec());
    let deviations: Vec<f64> = values.iter().map(|v| (v - center).abs()).collect();
    (center, median(deviations) * MAD_TO_SIGMA)
}

fn median(mut values: Vec<f64>) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.sort_by(|a, b| a.total_cmp(b));
    let mid = values.len() / 2;
    if values.len() % 2 == 0 {
        (values[mid - 1] + values[mid]) / 2.0
    } else {
        values[mid]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::astro::plane::testing::star_field;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_centroid_on_gaussian_star() {
        let (pixels, width, height) = star_field(40, 30, &[(20.0, 15.0, 100.0)]);
        let centroid =
            find_centroid(&pixels, width, height, Point2::new(22.0, 14.0), 10, 3).unwrap();
        assert_abs_diff_eq!(centroid.x, 20.0, epsilon = 0.1);
        assert_abs_diff_eq!(centroid.y, 15.0, epsilon = 0.1);
    }

    #[test]
    fn test_flat_plane_has_no_centroid() {
        let pixels = vec![10.0; 400];
        assert!(find_centroid(&pixels, 20, 20, Point2::new(10.0, 10.0), 5, 3).is_none());
    }

    #[test]
    fn test_window_outside_image() {
        let pixels = vec![10.0; 400];
        assert!(find_centroid(&pixels, 20, 20, Point2::new(100.0, 100.0), 5, 3).is_none());
    }

    #[test]
    fn test_photometry_flux() {
        let (pixels, width, height) = star_field(40, 40, &[(20.0, 20.0, 100.0)]);
        let result =
            aperture_photometry(&pixels, width, height, Point2::new(20.0, 20.0), Apertures::default())
                .unwrap();

        // Gaussian volume 2*pi*sigma^2*A with sigma = 1.5
        let expected = 2.0 * std::f64::consts::PI * 1.5 * 1.5 * 100.0;
        assert_abs_diff_eq!(result.sky, 10.0, epsilon = 1e-3);
        assert_abs_diff_eq!(result.flux, expected, epsilon = expected * 0.02);
        assert!(result.magnitude.unwrap() < 0.0);
        assert!(result.snr > 0.0);
    }

    #[test]
    fn test_median() {
        assert_eq!(median(vec![3.0, 1.0, 2.0]), 2.0);
        assert_eq!(median(vec![4.0, 1.0, 2.0, 3.0]), 2.5);
        assert_eq!(median(Vec::new()), 0.0);
    }
}
