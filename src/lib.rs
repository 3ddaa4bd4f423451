//! Astro Viewer core
//!
//! A multi-window viewer for astronomical image planes. One image is
//! "current" at any time; dockable panels (histogram, image info,
//! magnifier, navigator, astrometry and photometry markers) follow it.
//!
//! - `astro`: the astronomy-file interface and its in-memory implementation
//! - `state`: per-window image state, markers, selection and settings
//! - `panels`: the panels observing the current image
//! - `windows`: MDI window kinds and the frame window orchestrating them

pub mod astro;
pub mod error;
pub mod geometry;
pub mod logging;
pub mod panels;
pub mod state;
pub mod windows;

pub use error::{Error, Notice, Result, Severity};
