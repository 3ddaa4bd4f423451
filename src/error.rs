/// Error types and user-facing notices
///
/// Every fallible operation in the crate returns `Result<T>`. Errors never
/// cross a UI callback boundary: the frame window turns them into a
/// `Notice` (the dialog the user sees) and logs them instead.

use thiserror::Error;

use crate::panels::PanelId;

/// Crate-wide result type
pub type Result<T> = std::result::Result<T, Error>;

/// Everything that can go wrong in the viewer core
#[derive(Debug, Error)]
pub enum Error {
    /// A broken internal invariant (programming error, never user-caused)
    #[error("internal error: {0}")]
    Internal(String),

    /// An operation needed a current image but none is selected
    #[error("no image is selected")]
    NoImage,

    /// The centroid search found no star near the click
    #[error("no star found near the selected position")]
    NoCentroid,

    /// The image has no pixel-to-sky solution
    #[error("the image has no coordinate solution")]
    NoCoordinateSolution,

    /// Requested sub-image does not exist in the file
    #[error("sub-image {index} is out of range (file has {count})")]
    SubImageOutOfRange { index: usize, count: usize },

    /// The panel owning the control is disabled
    #[error("the {0:?} panel is disabled")]
    Disabled(PanelId),

    /// The operation is not available for this file or window
    #[error("{0}")]
    Unsupported(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("settings database error: {0}")]
    Settings(#[from] rusqlite::Error),

    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("logger setup failed: {0}")]
    Logging(#[from] flexi_logger::FlexiLoggerError),
}

/// How loudly a notice should be presented
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Absence of something the user asked for (no star, no solution)
    Info,
    /// A library or environment failure; the operation was abandoned
    Warning,
    /// A programming error surfaced as a generic message
    InternalError,
}

/// A message for the user, the headless equivalent of a modal dialog
#[derive(Debug, Clone, PartialEq)]
pub struct Notice {
    pub severity: Severity,
    pub title: String,
    pub message: String,
}

impl Notice {
    pub fn info(title: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Info,
            title: title.into(),
            message: message.into(),
        }
    }

    pub fn warning(title: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Warning,
            title: title.into(),
            message: message.into(),
        }
    }
}

impl Error {
    /// Map an error to the notice shown to the user
    ///
    /// Absence conditions are informational, internal errors get a generic
    /// message, everything else is a warning carrying the error text.
    pub fn to_notice(&self, title: &str) -> Notice {
        match self {
            Error::NoImage
            | Error::NoCentroid
            | Error::NoCoordinateSolution
            | Error::Disabled(_) => {
                Notice::info(title, self.to_string())
            }
            Error::Internal(_) => Notice {
                severity: Severity::InternalError,
                title: title.to_string(),
                message: "An internal error occurred. See the log for details.".to_string(),
            },
            _ => Notice::warning(title, self.to_string()),
        }
    }
}
