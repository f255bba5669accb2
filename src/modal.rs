//! Process-wide modal presenter.
//!
//! Only one modal (image preview or delete confirmation) is visible at a
//! time, whatever picker opened it.

use once_cell::sync::Lazy;
use parking_lot::Mutex;
use tracing::debug;

use crate::thumbnails::ImageHandle;

/// What the modal shows.
#[derive(Debug, Clone, PartialEq)]
pub enum ModalContent {
    /// Full-resolution preview.
    Preview {
        source: usize,
        filename: String,
        handle: ImageHandle,
    },
    /// Confirmation before deleting `filename` from `folder`.
    ConfirmDelete {
        source: usize,
        folder: String,
        filename: String,
        prior_index: Option<usize>,
    },
}

/// Open/closed modal state.
#[derive(Debug, Default)]
pub struct ModalPresenter {
    current: Option<ModalContent>,
}

impl ModalPresenter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Show `content`, replacing whatever was open.
    pub fn show(&mut self, content: ModalContent) {
        debug!(?content, "Showing modal");
        self.current = Some(content);
    }

    /// Close the modal, returning what it showed.
    pub fn hide(&mut self) -> Option<ModalContent> {
        self.current.take()
    }

    pub fn is_open(&self) -> bool {
        self.current.is_some()
    }

    pub fn current(&self) -> Option<&ModalContent> {
        self.current.as_ref()
    }
}

static PRESENTER: Lazy<Mutex<ModalPresenter>> = Lazy::new(|| Mutex::new(ModalPresenter::new()));

/// The presenter shared by every picker in the process.
pub fn presenter() -> &'static Mutex<ModalPresenter> {
    &PRESENTER
}
