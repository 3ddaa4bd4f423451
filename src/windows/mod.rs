/// MDI windows
///
/// - The sub-window kinds hosted by the frame (sub_window.rs)
/// - The frame window tying windows, panels and the selection together (frame.rs)

pub mod frame;
pub mod sub_window;

use std::fmt;

pub use frame::FrameWindow;
pub use sub_window::{
    ComparisonWindow, ImageWindow, JulianDateCalculator, Side, SubWindow, Viewport, WindowKind,
};

/// Identifies an MDI window for the lifetime of the frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct WindowId(pub u64);

impl fmt::Display for WindowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}
