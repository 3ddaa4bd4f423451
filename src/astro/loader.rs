/// Plane loader
///
/// Decodes ordinary image files into `PlaneFile`s: one plane per color
/// channel, or a single plane for gray images. 16-bit data keeps its full
/// range. A saved sidecar next to the file is picked up automatically.

use std::path::{Path, PathBuf};

use image::DynamicImage;
use tokio::task;
use walkdir::WalkDir;

use super::plane::{load_sidecar, Plane, PlaneFile};
use crate::error::{Error, Result};

/// File extensions the loader understands
pub const SUPPORTED_EXTENSIONS: [&str; 6] = ["png", "tif", "tiff", "jpg", "jpeg", "pnm"];

/// Load a file off the UI thread
pub async fn load_planes(path: PathBuf) -> std::result::Result<PlaneFile, String> {
    // Decoding is CPU-bound, keep it off the async executor
    task::spawn_blocking(move || load_planes_blocking(&path).map_err(|e| e.to_string()))
        .await
        .map_err(|e| format!("Task join error: {}", e))?
}

/// Blocking implementation of plane loading
pub fn load_planes_blocking(path: &Path) -> Result<PlaneFile> {
    if !path.exists() {
        return Err(Error::Io(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("File not found: {}", path.display()),
        )));
    }

    let decoded = image::open(path)?;
    let planes = split_planes(decoded)?;

    let name = path
        .file_name()
        .unwrap_or_default()
        .to_string_lossy()
        .to_string();

    let mut file = PlaneFile::from_planes(name, planes)?.with_path(path);
    if load_sidecar(&mut file)? {
        log::debug!("Loaded sidecar for {}", path.display());
    }

    log::info!(
        "Loaded {} with {} sub-image(s)",
        path.display(),
        crate::astro::AstroFile::sub_image_count(&file)
    );
    Ok(file)
}

/// Split a decoded image into per-channel planes
fn split_planes(decoded: DynamicImage) -> Result<Vec<Plane>> {
    let width = decoded.width();
    let height = decoded.height();

    match decoded {
        DynamicImage::ImageLuma8(_) | DynamicImage::ImageLumaA8(_) => {
            let luma = decoded.to_luma8();
            let data = luma.as_raw().iter().map(|&v| v as f32).collect();
            Ok(vec![Plane::new(width, height, data)?])
        }
        DynamicImage::ImageLuma16(_) | DynamicImage::ImageLumaA16(_) => {
            let luma = decoded.to_luma16();
            let data = luma.as_raw().iter().map(|&v| v as f32).collect();
            Ok(vec![Plane::new(width, height, data)?])
        }
        _ => {
            // Color data: one plane per RGB channel at 16-bit precision
            let rgb = decoded.to_rgb16();
            let raw = rgb.as_raw();
            (0..3)
                .map(|channel| {
                    let data = raw.iter().skip(channel).step_by(3).map(|&v| v as f32).collect();
                    Plane::new(width, height, data)
                })
                .collect()
        }
    }
}

/// Whether a path has one of the supported extensions
pub fn is_supported(path: &Path) -> bool {
    path.extension()
        .map(|ext| ext.to_string_lossy().to_lowercase())
        .is_some_and(|ext| SUPPORTED_EXTENSIONS.contains(&ext.as_str()))
}

/// Collect every supported image under a folder, sorted by path
pub fn scan_folder(folder: &Path) -> Vec<PathBuf> {
    let mut found: Vec<PathBuf> = WalkDir::new(folder)
        .follow_links(true)
        .into_iter()
        .filter_map(|e| e.ok())
        .map(|e| e.into_path())
        .filter(|p| p.is_file() && is_supported(p))
        .collect();
    found.sort();

    log::info!("Found {} image(s) in {}", found.len(), folder.display());
    found
}
