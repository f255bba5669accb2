//! Canvas host collaborator.
//!
//! The picker draws nothing itself; it tells the host when to redraw, when
//! a tab's chosen output changed and when to block interaction.

use tracing::{debug, info, warn};

/// Callbacks into the embedding canvas.
pub trait CanvasHost {
    fn request_redraw(&self);
    /// The chosen filename of `source` changed.
    fn output_changed(&self, source: usize, filename: &str);
    /// Show or hide the blocking overlay drawn while paused.
    fn show_overlay(&self, visible: bool);
    /// Surface a non-fatal failure to the user.
    fn report_error(&self, message: &str);
}

/// Host that only logs, for headless runs.
#[derive(Debug, Default)]
pub struct LoggingHost;

impl CanvasHost for LoggingHost {
    fn request_redraw(&self) {
        debug!("Redraw requested");
    }

    fn output_changed(&self, source: usize, filename: &str) {
        info!(source, filename, "Output changed");
    }

    fn show_overlay(&self, visible: bool) {
        info!(visible, "Execution overlay");
    }

    fn report_error(&self, message: &str) {
        warn!(message, "Picker error");
    }
}
