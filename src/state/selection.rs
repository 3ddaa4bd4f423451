/// The current-image selection
///
/// `SelectionRegistry` is the only authority on which ControlImage is
/// current. Panels subscribe to it once; every selection change flips the
/// `is_active` flags and then notifies all subscribers in one step, so no
/// caller can forget the notification.

use std::cell::RefCell;
use std::rc::Rc;

use super::control_image::ImageHandle;
use crate::panels::{ImagePanel, PanelId};

/// Panel handle as stored in the subscription list
pub type PanelHandle = Rc<RefCell<dyn ImagePanel>>;

#[derive(Default)]
pub struct SelectionRegistry {
    current: Option<ImageHandle>,
    subscribers: Vec<PanelHandle>,
}

impl SelectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a panel for change notifications
    pub fn subscribe(&mut self, panel: PanelHandle) {
        self.subscribers.push(panel);
    }

    pub fn current(&self) -> Option<&ImageHandle> {
        self.current.as_ref()
    }

    pub fn is_current(&self, image: &ImageHandle) -> bool {
        self.current
            .as_ref()
            .is_some_and(|current| Rc::ptr_eq(current, image))
    }

    /// Make `candidate` the current image and notify every panel
    ///
    /// Re-selecting the current image just re-asserts its active flag.
    /// Otherwise the previous image is deactivated before the new one is
    /// activated, so at most one image is ever active.
    pub fn set_current(&mut self, candidate: Option<ImageHandle>) {
        self.switch(candidate);
        self.refresh();
    }

    fn switch(&mut self, candidate: Option<ImageHandle>) {
        if let (Some(current), Some(candidate)) = (&self.current, &candidate) {
            if Rc::ptr_eq(current, candidate) {
                current.borrow_mut().set_active(true);
                return;
            }
        }

        if let Some(previous) = self.current.take() {
            previous.borrow_mut().set_active(false);
        }
        if let Some(next) = &candidate {
            next.borrow_mut().set_active(true);
            log::debug!("Current image is now {}", next.borrow().name());
        } else {
            log::debug!("No current image");
        }
        self.current = candidate;
    }

    /// Re-notify every panel without changing the selection
    pub fn refresh(&self) {
        self.notify(|_| true);
    }

    /// Re-notify every panel except the one that caused the change
    pub fn refresh_except(&self, origin: PanelId) {
        self.notify(|id| id != origin);
    }

    fn notify(&self, wanted: impl Fn(PanelId) -> bool) {
        for panel in &self.subscribers {
            // A panel that is mid-update cannot be re-entered; skip it
            let Ok(mut panel) = panel.try_borrow_mut() else {
                log::error!("Skipping notification of a panel that is already borrowed");
                continue;
            };
            if wanted(panel.id()) {
                panel.image_changed(self.current.as_ref());
            }
        }
    }
}

impl std::fmt::Debug for SelectionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SelectionRegistry")
            .field("has_current", &self.current.is_some())
            .field("subscribers", &self.subscribers.len())
            .finish()
    }
}
