//! Error types for backend requests.
//!
//! Nothing in the picker is fatal: every failure here degrades to an empty
//! listing, an error marker, or an unchanged state plus a logged cause.

use thiserror::Error;

/// Failure reported by a [`FileService`](crate::service::FileService) request.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("no folder specified")]
    InvalidRequest,

    #[error("invalid folder path: {0}")]
    InvalidFolder(String),

    #[error("path escapes the listed folder")]
    InvalidPath,

    #[error("not found: {0}")]
    NotFound(String),

    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("request failed: {0}")]
    Transport(String),

    #[error("failed to decode image: {0}")]
    Decode(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// How a failure is surfaced to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Listing, thumbnail or full-image request failed; retryable, shown as empty.
    TransientFetch,
    /// Deletion was refused; reported to the host, state unchanged.
    Deletion,
    /// The target folder is inaccessible; listing becomes empty.
    Navigation,
}

impl ServiceError {
    /// Classifies a failure of a listing request.
    pub fn listing_class(&self) -> ErrorClass {
        match self {
            Self::InvalidFolder(_) | Self::PermissionDenied(_) | Self::NotFound(_) => {
                ErrorClass::Navigation
            }
            _ => ErrorClass::TransientFetch,
        }
    }

    /// Classifies a failure of a delete request.
    ///
    /// Refusals by the file store are deletion failures; a broken request
    /// is a transient one the user can retry.
    pub fn delete_class(&self) -> ErrorClass {
        match self {
            Self::Transport(_) => ErrorClass::TransientFetch,
            _ => ErrorClass::Deletion,
        }
    }

    /// Maps an I/O error on `path` onto the matching variant.
    pub fn from_io(err: std::io::Error, path: &str) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => Self::NotFound(path.to_string()),
            std::io::ErrorKind::PermissionDenied => Self::PermissionDenied(path.to_string()),
            _ => Self::Io(err),
        }
    }
}
