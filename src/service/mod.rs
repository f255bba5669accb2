//! Backend file service.
//!
//! - `FileService` - the query/command surface the picker talks to
//! - `LocalFileService` - implementation over the local filesystem

pub mod local;

use std::future::Future;

use crate::error::ServiceError;
use crate::models::{BrowseListing, FolderListing, RefreshSummary, SortOrder};

pub use local::LocalFileService;

/// Thumbnail sizes the backend renders; other requests fall back to the first.
pub const THUMBNAIL_SIZES: [u32; 5] = [128, 256, 346, 478, 512];

/// Snap a requested thumbnail size to an allowed one.
pub fn allowed_thumbnail_size(size: u32) -> u32 {
    if THUMBNAIL_SIZES.contains(&size) {
        size
    } else {
        THUMBNAIL_SIZES[0]
    }
}

/// Requests served by the backend file store.
///
/// Every method is a pure request/response; callers never block on them
/// from the event loop.
pub trait FileService: Send + Sync + 'static {
    /// List images, subfolders and the parent of `folder`.
    fn list(
        &self,
        folder: &str,
        sort: SortOrder,
    ) -> impl Future<Output = Result<FolderListing, ServiceError>> + Send;

    /// Encoded thumbnail bytes of `filename` at `size`.
    fn thumbnail(
        &self,
        folder: &str,
        filename: &str,
        size: u32,
    ) -> impl Future<Output = Result<Vec<u8>, ServiceError>> + Send;

    /// Encoded bytes of the original image.
    fn full_image(
        &self,
        folder: &str,
        filename: &str,
    ) -> impl Future<Output = Result<Vec<u8>, ServiceError>> + Send;

    /// Delete `filename` from `folder`.
    fn delete(
        &self,
        folder: &str,
        filename: &str,
    ) -> impl Future<Output = Result<(), ServiceError>> + Send;

    /// Re-render the thumbnails of every image in `folder` at `size`.
    fn refresh(
        &self,
        folder: &str,
        size: u32,
    ) -> impl Future<Output = Result<RefreshSummary, ServiceError>> + Send;

    /// Folders below `path`, for choosing where to pick from.
    ///
    /// An empty path lists the filesystem roots.
    fn browse(&self, path: &str) -> impl Future<Output = Result<BrowseListing, ServiceError>> + Send;

    /// Start watching `folder` for changes. Best effort.
    fn watch(&self, folder: &str) -> impl Future<Output = Result<(), ServiceError>> + Send;

    /// Stop watching `folder`. Best effort.
    fn unwatch(&self, folder: &str) -> impl Future<Output = Result<(), ServiceError>> + Send;

    /// Hold change notifications while an execution runs.
    fn pause(&self) -> impl Future<Output = Result<(), ServiceError>> + Send;

    /// Release held change notifications.
    fn resume(&self) -> impl Future<Output = Result<(), ServiceError>> + Send;
}
