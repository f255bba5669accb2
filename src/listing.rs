//! Folder listing client.
//!
//! Wraps the backend `list` request and normalizes its result: images in the
//! requested order, subfolders by name, one entry per filename.

use std::collections::HashSet;
use std::sync::Arc;

use tracing::debug;

use crate::error::ServiceError;
use crate::models::{sort_folders, sort_images, FolderListing, SortOrder};
use crate::service::FileService;

/// Fetches and normalizes folder listings.
pub struct FolderListingClient<S> {
    service: Arc<S>,
}

impl<S> Clone for FolderListingClient<S> {
    fn clone(&self) -> Self {
        Self {
            service: Arc::clone(&self.service),
        }
    }
}

impl<S: FileService> FolderListingClient<S> {
    pub fn new(service: Arc<S>) -> Self {
        Self { service }
    }

    /// List `folder` in `sort` order.
    ///
    /// An empty path short-circuits to an empty listing without a request.
    pub async fn list(&self, folder: &str, sort: SortOrder) -> Result<FolderListing, ServiceError> {
        if folder.trim().is_empty() {
            return Ok(FolderListing::empty());
        }

        let mut listing = self.service.list(folder, sort).await?;
        normalize_listing(&mut listing, sort);
        debug!(
            folder,
            %sort,
            images = listing.images.len(),
            subfolders = listing.subfolders.len(),
            "Listed folder"
        );
        Ok(listing)
    }
}

/// Put a backend listing into canonical form.
pub fn normalize_listing(listing: &mut FolderListing, sort: SortOrder) {
    let mut seen = HashSet::with_capacity(listing.images.len());
    listing
        .images
        .retain(|img| !img.filename.is_empty() && seen.insert(img.filename.clone()));
    sort_images(&mut listing.images, sort);

    listing.subfolders.retain(|f| !f.path.is_empty());
    sort_folders(&mut listing.subfolders);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{FolderEntry, ImageEntry};
    use crate::service::testing::StaticService;

    fn raw_listing() -> FolderListing {
        FolderListing {
            images: vec![
                ImageEntry::new("b.png").with_modified(3.0),
                ImageEntry::new("a.png").with_modified(5.0),
                ImageEntry::new("b.png").with_modified(3.0),
                ImageEntry::new("C.png").with_modified(1.0),
            ],
            subfolders: vec![
                FolderEntry::new("zeta", "/r/zeta"),
                FolderEntry::new("Alpha", "/r/Alpha"),
            ],
            parent: "/".to_string(),
        }
    }

    #[test]
    fn test_normalize_listing() {
        let mut listing = raw_listing();
        normalize_listing(&mut listing, SortOrder::DateDesc);
        let names: Vec<_> = listing.images.iter().map(|i| i.filename.as_str()).collect();
        assert_eq!(names, ["a.png", "b.png", "C.png"]);
        assert_eq!(listing.subfolders[0].name, "Alpha");
    }

    #[tokio::test]
    async fn test_empty_path_short_circuits() {
        let service = Arc::new(StaticService::default());
        let client = FolderListingClient::new(service);
        let listing = client.list("", SortOrder::Name).await.unwrap();
        assert!(listing.is_empty());
        assert!(listing.parent.is_empty());
    }

    #[tokio::test]
    async fn test_list_sorts_result() {
        let service = Arc::new(StaticService::default().with_listing("/r", raw_listing()));
        let client = FolderListingClient::new(service);
        let listing = client.list("/r", SortOrder::Name).await.unwrap();
        let names: Vec<_> = listing.images.iter().map(|i| i.filename.as_str()).collect();
        assert_eq!(names, ["a.png", "b.png", "C.png"]);
        assert_eq!(listing.parent, "/");
    }

    #[tokio::test]
    async fn test_failure_is_reported() {
        let client = FolderListingClient::new(Arc::new(StaticService::default()));
        assert!(matches!(
            client.list("/missing", SortOrder::Name).await,
            Err(ServiceError::InvalidFolder(_))
        ));
    }
}
