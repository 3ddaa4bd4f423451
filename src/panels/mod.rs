/// Dockable image panels
///
/// Every panel that cares about "the current image" implements `ImagePanel`
/// and subscribes to the selection registry. Panels mirror ControlImage
/// values in their own controls (`Field`s) and resynchronize them from
/// scratch on every notification.

pub mod histogram;
pub mod image_control;
pub mod magnifier;
pub mod markers;
pub mod navigator;

use crate::state::ImageHandle;

pub use histogram::HistogramPanel;
pub use image_control::ImageControlPanel;
pub use magnifier::MagnifierPanel;
pub use markers::{MarkerOutcome, MarkerPanel};
pub use navigator::NavigatorPanel;

/// Identifies a panel for lookups and targeted notifications
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PanelId {
    Histogram,
    ImageControl,
    Magnifier,
    Navigator,
    Astrometry,
    Photometry,
}

/// The notification contract of an image-aware panel
///
/// None of these may fail: a missing image is a valid, cleared state.
pub trait ImagePanel {
    fn id(&self) -> PanelId;

    /// Resynchronize everything from the current image (or clear on `None`)
    ///
    /// Must be idempotent: calling it twice shows the same thing and leaves
    /// no stale indicators behind.
    fn image_changed(&mut self, current: Option<&ImageHandle>);

    /// The window owning the current image gained focus
    fn image_activating(&mut self) {}

    /// The window owning the current image lost focus
    fn image_deactivating(&mut self) {}

    /// Enable or disable every interactive control without clearing data
    fn set_enabled(&mut self, enabled: bool);

    fn is_enabled(&self) -> bool;
}

/// A displayed value and whether the user can interact with it
#[derive(Debug, Clone, PartialEq)]
pub struct Field<T> {
    value: Option<T>,
    enabled: bool,
}

impl<T> Default for Field<T> {
    fn default() -> Self {
        Self {
            value: None,
            enabled: false,
        }
    }
}

impl<T> Field<T> {
    pub fn value(&self) -> Option<&T> {
        self.value.as_ref()
    }

    pub fn set(&mut self, value: T) {
        self.value = Some(value);
    }

    /// Blank the field and make it inert
    pub fn clear(&mut self) {
        self.value = None;
        self.enabled = false;
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    pub fn is_clear(&self) -> bool {
        self.value.is_none()
    }
}

impl<T: Copy> Field<T> {
    pub fn get(&self) -> Option<T> {
        self.value
    }
}
