/// In-memory astronomy file
///
/// A `PlaneFile` holds one or more `f32` image planes of equal or differing
/// sizes, an optional linear coordinate solution and a header keyword map.
/// Measurements recorded into the file are saved next to it as a JSON
/// sidecar (`<file>.json`).

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use cgmath::Vector2;
use image::GrayImage;
use serde::{Deserialize, Serialize};

use super::measure::{aperture_photometry, find_centroid};
use super::render::render_plane;
use super::{Apertures, AstroFile, ObservationRecord, PhotometryResult, PlaneStats, RenderParams};
use crate::error::{Error, Result};
use crate::geometry::{PixelPoint, SkyCoord};

/// One image plane (sub-image)
#[derive(Debug, Clone)]
pub struct Plane {
    pub width: u32,
    pub height: u32,
    pub data: Vec<f32>,
    stats: PlaneStats,
}

impl Plane {
    pub fn new(width: u32, height: u32, data: Vec<f32>) -> Result<Self> {
        if data.len() != (width as usize) * (height as usize) || data.is_empty() {
            return Err(Error::Unsupported(format!(
                "plane of {}x{} cannot hold {} pixels",
                width,
                height,
                data.len()
            )));
        }

        let mut min = f32::INFINITY;
        let mut max = f32::NEG_INFINITY;
        let mut sum = 0.0f64;
        let mut count = 0usize;
        for &v in data.iter().filter(|v| v.is_finite()) {
            min = min.min(v);
            max = max.max(v);
            sum += v as f64;
            count += 1;
        }
        // An all-NaN plane reports a zero range
        let stats = if count == 0 {
            PlaneStats { min: 0.0, max: 0.0, mean: 0.0 }
        } else {
            PlaneStats {
                min,
                max,
                mean: (sum / count as f64) as f32,
            }
        };

        Ok(Self {
            width,
            height,
            data,
            stats,
        })
    }
}

/// Linear (tangent-plane free) pixel to sky mapping
///
/// Adequate for the small fields the viewer deals with; `scale` is degrees
/// per pixel and `rotation` is the position angle of the pixel y axis.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct LinearWcs {
    pub reference_pixel: (f64, f64),
    pub reference_sky: SkyCoord,
    pub scale: f64,
    pub rotation: f64,
}

impl LinearWcs {
    pub fn pixel_to_sky(&self, point: PixelPoint) -> SkyCoord {
        let offset = Vector2::new(
            point.x - self.reference_pixel.0,
            point.y - self.reference_pixel.1,
        );
        let (sin, cos) = self.rotation.to_radians().sin_cos();

        // RA grows to the left (east) on a north-up image
        let east = -(offset.x * cos - offset.y * sin) * self.scale;
        let north = -(offset.x * sin + offset.y * cos) * self.scale;

        let dec = (self.reference_sky.dec + north).clamp(-90.0, 90.0);
        let cos_dec = self.reference_sky.dec.to_radians().cos().max(1e-9);
        let ra = (self.reference_sky.ra + east / cos_dec).rem_euclid(360.0);

        SkyCoord { ra, dec }
    }
}

/// Sidecar document written by `save`
#[derive(Serialize, Deserialize, Debug, Default)]
struct Sidecar {
    header: BTreeMap<String, String>,
    observations: Vec<ObservationRecord>,
}

/// An astronomy file held entirely in memory
#[derive(Debug)]
pub struct PlaneFile {
    name: String,
    path: Option<PathBuf>,
    planes: Vec<Plane>,
    wcs: Option<LinearWcs>,
    header: BTreeMap<String, String>,
    observations: Vec<ObservationRecord>,
    dirty: bool,
}

impl PlaneFile {
    /// Build a file from ready planes
    pub fn from_planes(name: impl Into<String>, planes: Vec<Plane>) -> Result<Self> {
        if planes.is_empty() {
            return Err(Error::Unsupported("a file needs at least one plane".into()));
        }
        Ok(Self {
            name: name.into(),
            path: None,
            planes,
            wcs: None,
            header: BTreeMap::new(),
            observations: Vec::new(),
            dirty: false,
        })
    }

    /// Remember where the file came from so it can be saved
    pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn with_wcs(mut self, wcs: LinearWcs) -> Self {
        self.wcs = Some(wcs);
        self
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn header(&self) -> &BTreeMap<String, String> {
        &self.header
    }

    /// Set a header keyword (e.g. weather values); marks the file dirty
    pub fn set_keyword(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.header.insert(key.into(), value.into());
        self.dirty = true;
    }

    /// Location of the sidecar for a data file
    pub fn sidecar_path(path: &Path) -> PathBuf {
        let mut name = path.as_os_str().to_owned();
        name.push(".json");
        PathBuf::from(name)
    }

    fn plane(&self, sub: usize) -> Result<&Plane> {
        self.planes.get(sub).ok_or(Error::SubImageOutOfRange {
            index: sub,
            count: self.planes.len(),
        })
    }
}

impl AstroFile for PlaneFile {
    fn name(&self) -> &str {
        &self.name
    }

    fn sub_image_count(&self) -> usize {
        self.planes.len()
    }

    fn dimensions(&self, sub: usize) -> Result<(u32, u32)> {
        let plane = self.plane(sub)?;
        Ok((plane.width, plane.height))
    }

    fn pixels(&self, sub: usize) -> Result<&[f32]> {
        Ok(&self.plane(sub)?.data)
    }

    fn stats(&self, sub: usize) -> Result<PlaneStats> {
        Ok(self.plane(sub)?.stats)
    }

    fn render(&self, sub: usize, params: &RenderParams) -> Result<GrayImage> {
        let plane = self.plane(sub)?;
        Ok(render_plane(&plane.data, plane.width, plane.height, params))
    }

    fn pixel_to_sky(&self, point: PixelPoint) -> Option<SkyCoord> {
        self.wcs.map(|wcs| wcs.pixel_to_sky(point))
    }

    fn has_coordinate_solution(&self) -> bool {
        self.wcs.is_some()
    }

    fn find_centroid(
        &self,
        sub: usize,
        near: PixelPoint,
        radius: u32,
        sensitivity: u32,
    ) -> Option<PixelPoint> {
        let plane = self.plane(sub).ok()?;
        find_centroid(&plane.data, plane.width, plane.height, near, radius, sensitivity)
    }

    fn photometry(
        &self,
        sub: usize,
        center: PixelPoint,
        apertures: Apertures,
    ) -> Option<PhotometryResult> {
        let plane = self.plane(sub).ok()?;
        aperture_photometry(&plane.data, plane.width, plane.height, center, apertures)
    }

    fn observations(&self) -> &[ObservationRecord] {
        &self.observations
    }

    fn record_observation(&mut self, record: ObservationRecord) {
        self.observations.retain(|o| o.name != record.name);
        self.observations.push(record);
        self.dirty = true;
    }

    fn remove_observation(&mut self, name: &str) {
        let before = self.observations.len();
        self.observations.retain(|o| o.name != name);
        if self.observations.len() != before {
            self.dirty = true;
        }
    }

    fn set_dirty(&mut self) {
        self.dirty = true;
    }

    fn is_dirty(&self) -> bool {
        self.dirty
    }

    fn save(&mut self) -> Result<()> {
        let path = self
            .path
            .as_deref()
            .ok_or_else(|| Error::Unsupported(format!("{} has no location on disk", self.name)))?;

        let sidecar = Sidecar {
            header: self.header.clone(),
            observations: self.observations.clone(),
        };
        let json = serde_json::to_string_pretty(&sidecar)?;
        let sidecar_path = Self::sidecar_path(path);
        fs::write(&sidecar_path, json)?;

        log::info!("Saved {} to {}", self.name, sidecar_path.display());
        self.dirty = false;
        Ok(())
    }
}

/// Load a previously saved sidecar into a file (header and observations)
pub fn load_sidecar(file: &mut PlaneFile) -> Result<bool> {
    let Some(path) = file.path.as_deref() else {
        return Ok(false);
    };
    let sidecar_path = PlaneFile::sidecar_path(path);
    if !sidecar_path.exists() {
        return Ok(false);
    }

    let sidecar: Sidecar = serde_json::from_str(&fs::read_to_string(&sidecar_path)?)?;
    file.header = sidecar.header;
    file.observations = sidecar.observations;
    Ok(true)
}


#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;
    use approx::assert_relative_eq;
    use cgmath::Point2;

    #[test]
    fn test_plane_stats() {
        let plane = plane(2, 2, &[1.0, 2.0, 3.0, 6.0]);
        assert_eq!(plane.stats.min, 1.0);
        assert_eq!(plane.stats.max, 6.0);
        assert_eq!(plane.stats.mean, 3.0);
    }

    #[test]
    fn test_plane_size_mismatch() {
        assert!(Plane::new(3, 3, vec![0.0; 8]).is_err());
    }

    #[test]
    fn test_sub_image_out_of_range() {
        let file = PlaneFile::from_planes("a", vec![plane(1, 1, &[0.0])]).unwrap();
        match file.stats(3) {
            Err(Error::SubImageOutOfRange { index, count }) => {
                assert_eq!(index, 3);
                assert_eq!(count, 1);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_wcs_reference_pixel() {
        let wcs = LinearWcs {
            reference_pixel: (50.0, 50.0),
            reference_sky: SkyCoord { ra: 180.0, dec: 0.0 },
            scale: 1.0 / 3600.0,
            rotation: 0.0,
        };
        let at_ref = wcs.pixel_to_sky(Point2::new(50.0, 50.0));
        assert_relative_eq!(at_ref.ra, 180.0);
        assert_relative_eq!(at_ref.dec, 0.0);

        // One pixel up is one arcsecond north
        let north = wcs.pixel_to_sky(Point2::new(50.0, 49.0));
        assert_relative_eq!(north.dec, 1.0 / 3600.0, epsilon = 1e-12);
    }

    #[test]
    fn test_observation_replaces_same_name() {
        let mut file = star_file("f", 10, 10, &[]);
        let record = ObservationRecord {
            name: "A:1".into(),
            x: 1.0,
            y: 2.0,
            sky: None,
            photometry: None,
        };
        file.record_observation(record.clone());
        file.record_observation(ObservationRecord { x: 5.0, ..record });
        assert_eq!(file.observations().len(), 1);
        assert_eq!(file.observations()[0].x, 5.0);
        assert!(file.is_dirty());
    }

    #[test]
    fn test_save_without_path_keeps_dirty() {
        let mut file = star_file("f", 10, 10, &[]);
        file.set_dirty();
        assert!(file.save().is_err());
        assert!(file.is_dirty());
    }

    #[test]
    fn test_save_and_reload_sidecar() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("m42.png");

        let mut file = star_file("m42.png", 10, 10, &[]).with_path(&path);
        file.set_keyword("AMBTEMP", "-3.5");
        file.record_observation(ObservationRecord {
            name: "P:1".into(),
            x: 4.0,
            y: 4.0,
            sky: None,
            photometry: None,
        });
        file.save().unwrap();
        assert!(!file.is_dirty());
        assert!(PlaneFile::sidecar_path(&path).exists());

        let mut reloaded = star_file("m42.png", 10, 10, &[]).with_path(&path);
        assert!(load_sidecar(&mut reloaded).unwrap());
        assert_eq!(reloaded.header().get("AMBTEMP").map(String::as_str), Some("-3.5"));
        assert_eq!(reloaded.observations().len(), 1);
        assert!(!reloaded.is_dirty());
    }
}
