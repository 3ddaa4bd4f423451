/// State management module
///
/// This module handles the state shared between windows and panels:
/// - Per-window image state and its bitmap cache (control_image.rs)
/// - Astrometry/photometry markers and their indicators (marker.rs)
/// - The current-image selection and panel notification (selection.rs)
/// - The key-value settings store (settings.rs)

pub mod control_image;
pub mod marker;
pub mod selection;
pub mod settings;

pub use control_image::{ControlImage, ImageHandle};
pub use marker::{IndicatorLayer, IndicatorStyle, IndicatorTheme, Marker, MarkerKind, MarkerSet};
pub use selection::{PanelHandle, SelectionRegistry};
pub use settings::{keys, MemorySettings, SettingsStore, SqliteSettings};
