//! Watch coordinator.
//!
//! One watched folder per picker: the folder of the active tab. Also holds
//! the paused flag that gates every mutating interaction while the
//! execution engine runs.

use tracing::debug;

use crate::dispatch::Dispatch;

#[derive(Debug, Default)]
pub struct WatchCoordinator {
    active_folder: String,
    paused: bool,
}

impl WatchCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Watch `folder`, unwatching the previously active one if different.
    ///
    /// An empty folder only drops the previous watch.
    pub fn activate(&mut self, folder: &str, dispatch: &dyn Dispatch) {
        if folder == self.active_folder {
            return;
        }

        if !self.active_folder.is_empty() {
            dispatch.unwatch(&self.active_folder);
        }
        if !folder.is_empty() {
            dispatch.watch(folder);
        }
        debug!(from = %self.active_folder, to = folder, "Switched watched folder");
        self.active_folder = folder.to_string();
    }

    pub fn pause(&mut self, dispatch: &dyn Dispatch) {
        if !self.paused {
            self.paused = true;
            dispatch.pause();
            debug!("Interactions paused");
        }
    }

    pub fn resume(&mut self, dispatch: &dyn Dispatch) {
        if self.paused {
            self.paused = false;
            dispatch.resume();
            debug!("Interactions resumed");
        }
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn active_folder(&self) -> &str {
        &self.active_folder
    }
}
