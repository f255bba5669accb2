//! imgpick - a multi-tab image folder picker.
//!
//! The picker core ([`ImageFolderPicker`]) is a single-threaded state
//! machine. Backend work goes through [`Dispatch`] and comes back as
//! [`PickerEvent`]s; [`LocalFileService`] serves folders from disk.

pub mod config;
pub mod dispatch;
pub mod error;
pub mod host;
pub mod image_loader;
pub mod layout;
pub mod listing;
pub mod modal;
pub mod models;
pub mod notifier;
pub mod output;
pub mod picker;
pub mod prompt;
pub mod resolve;
pub mod service;
pub mod source;
pub mod store;
pub mod thumbnails;
pub mod watch;
pub mod watcher;

pub use config::PickerConfig;
pub use dispatch::{event_channel, Dispatch, PickerEvent, TokioDispatcher};
pub use error::{ErrorClass, ServiceError};
pub use host::{CanvasHost, LoggingHost};
pub use picker::{ImageFolderPicker, PickerSnapshot};
pub use service::{FileService, LocalFileService};
pub use source::{SourceSnapshot, SourceState};
pub use store::SessionStore;
pub use watcher::FolderWatcher;
