//! `FileService` over the local filesystem.
//!
//! Directory scans, decoding and thumbnail rendering run on the blocking
//! pool; watch requests go straight to the [`FolderWatcher`].

use std::num::NonZeroUsize;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use std::time::UNIX_EPOCH;

use lru::LruCache;
use parking_lot::Mutex;
use tokio::task;
use tracing::{debug, info, trace, warn};
use walkdir::{DirEntry, WalkDir};
use xxhash_rust::xxh3::xxh3_64;

use super::{allowed_thumbnail_size, FileService};
use crate::error::ServiceError;
use crate::image_loader::read_dimensions;
use crate::models::{
    is_image_path, sort_folders, sort_images, BrowseEntry, BrowseKind, BrowseListing, FolderEntry,
    FolderListing, ImageEntry, RefreshSummary, SortOrder,
};
use crate::thumbnails::ThumbnailGenerator;
use crate::watcher::{normalize_folder, FolderWatcher};

/// Default number of memoised image dimensions.
pub const DEFAULT_DIMENSION_CACHE: usize = 4096;

type DimensionCache = Arc<Mutex<LruCache<u64, (u32, u32)>>>;

/// Serves listings, thumbnails and deletions from local folders.
pub struct LocalFileService {
    watcher: FolderWatcher,
    dimensions: DimensionCache,
}

impl LocalFileService {
    pub fn new(watcher: FolderWatcher, dimension_cache_entries: usize) -> Self {
        let capacity = NonZeroUsize::new(dimension_cache_entries).unwrap_or(NonZeroUsize::MIN);
        Self {
            watcher,
            dimensions: Arc::new(Mutex::new(LruCache::new(capacity))),
        }
    }

    pub fn watcher(&self) -> &FolderWatcher {
        &self.watcher
    }

    /// Check that `folder` names an existing directory.
    fn checked_dir(folder: &str) -> Result<(), ServiceError> {
        if folder.trim().is_empty() {
            return Err(ServiceError::InvalidRequest);
        }

        let metadata = std::fs::metadata(folder).map_err(|e| match e.kind() {
            std::io::ErrorKind::PermissionDenied => ServiceError::PermissionDenied(folder.to_string()),
            _ => ServiceError::InvalidFolder(folder.to_string()),
        })?;
        if !metadata.is_dir() {
            return Err(ServiceError::InvalidFolder(folder.to_string()));
        }
        Ok(())
    }

    /// Direct children of `dir`. Unreadable children are skipped.
    fn children(dir: &Path, folder: &str) -> Result<Vec<DirEntry>, ServiceError> {
        let mut children = Vec::new();
        for entry in WalkDir::new(dir).min_depth(1).max_depth(1) {
            match entry {
                Ok(entry) => children.push(entry),
                Err(e) if e.depth() == 0 => {
                    return Err(match e.into_io_error() {
                        Some(io) => ServiceError::from_io(io, folder),
                        None => ServiceError::InvalidFolder(folder.to_string()),
                    });
                }
                Err(e) => trace!(error = %e, "Skipping unreadable entry"),
            }
        }
        Ok(children)
    }

    /// Scan `folder` one level deep.
    fn list_sync(
        folder: &str,
        sort: SortOrder,
        dimensions: &DimensionCache,
    ) -> Result<FolderListing, ServiceError> {
        Self::checked_dir(folder)?;
        let dir = std::fs::canonicalize(folder).unwrap_or_else(|_| PathBuf::from(folder));

        let mut listing = FolderListing {
            parent: dir
                .parent()
                .map(|p| p.to_string_lossy().into_owned())
                .unwrap_or_default(),
            ..FolderListing::default()
        };

        for entry in Self::children(&dir, folder)? {
            let name = entry.file_name().to_string_lossy().into_owned();
            let path = entry.path();

            if path.is_dir() {
                if !name.starts_with('.') {
                    listing
                        .subfolders
                        .push(FolderEntry::new(&name, path.to_string_lossy().into_owned()));
                }
                continue;
            }

            if !is_image_path(path) {
                continue;
            }

            let Ok(meta) = entry.metadata() else {
                trace!(?path, "Skipping image without metadata");
                continue;
            };
            let size = meta.len();
            let modified = meta
                .modified()
                .ok()
                .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
                .map(|d| d.as_secs_f64())
                .unwrap_or(0.0);
            let (width, height) = Self::cached_dimensions(path, modified, size, dimensions);

            let mut image = ImageEntry::new(&name).with_dimensions(width, height);
            image.modified = Some(modified);
            image.size = Some(size);
            listing.images.push(image);
        }

        sort_images(&mut listing.images, sort);
        sort_folders(&mut listing.subfolders);
        debug!(
            ?dir,
            images = listing.images.len(),
            subfolders = listing.subfolders.len(),
            "Scanned folder"
        );
        Ok(listing)
    }

    /// Re-render the thumbnail of every image in `folder`.
    fn refresh_sync(folder: &str, size: u32) -> Result<RefreshSummary, ServiceError> {
        Self::checked_dir(folder)?;
        let dir = std::fs::canonicalize(folder).map_err(|e| ServiceError::from_io(e, folder))?;
        let size = allowed_thumbnail_size(size);

        let mut summary = RefreshSummary::default();
        for entry in Self::children(&dir, folder)? {
            let path = entry.path();
            if !path.is_file() || !is_image_path(path) {
                continue;
            }
            let filename = entry.file_name().to_string_lossy();
            match ThumbnailGenerator::regenerate(&dir, &filename, size) {
                Ok(()) => summary.regenerated += 1,
                Err(e) => {
                    debug!(?path, error = %e, "Thumbnail regeneration failed");
                    summary.errors += 1;
                }
            }
        }

        info!(
            ?dir,
            size,
            regenerated = summary.regenerated,
            errors = summary.errors,
            "Refreshed thumbnails"
        );
        Ok(summary)
    }

    /// Visible subfolders of `path` and how many images it holds.
    fn browse_sync(path: &str) -> Result<BrowseListing, ServiceError> {
        if path.trim().is_empty() {
            #[cfg(windows)]
            return Ok(Self::drives());
            #[cfg(not(windows))]
            return Self::browse_sync("/");
        }

        Self::checked_dir(path)?;
        let dir = normalize_folder(path);
        let mut listing = BrowseListing {
            current: dir.to_string_lossy().into_owned(),
            parent: dir
                .parent()
                .map(|p| p.to_string_lossy().into_owned())
                .unwrap_or_default(),
            ..BrowseListing::default()
        };

        for entry in Self::children(&dir, path)? {
            let child = entry.path();
            if child.is_dir() {
                let name = entry.file_name().to_string_lossy().into_owned();
                if !name.starts_with('.') {
                    listing.folders.push(BrowseEntry {
                        name,
                        path: child.to_string_lossy().into_owned(),
                        kind: BrowseKind::Folder,
                    });
                }
            } else if is_image_path(child) {
                listing.image_count += 1;
            }
        }
        listing.folders.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(listing)
    }

    /// Drive roots that exist.
    #[cfg(windows)]
    fn drives() -> BrowseListing {
        let folders = (b'A'..=b'Z')
            .map(|letter| format!("{}:\\", letter as char))
            .filter(|drive| Path::new(drive).exists())
            .map(|drive| BrowseEntry {
                name: drive.clone(),
                path: drive,
                kind: BrowseKind::Drive,
            })
            .collect();
        BrowseListing {
            folders,
            ..BrowseListing::default()
        }
    }

    /// Pixel dimensions, decoded once per (path, mtime, size).
    fn cached_dimensions(
        path: &Path,
        modified: f64,
        size: u64,
        dimensions: &DimensionCache,
    ) -> (u32, u32) {
        let key = xxh3_64(format!("{}:{}:{}", path.display(), modified, size).as_bytes());
        if let Some(dims) = dimensions.lock().get(&key) {
            return *dims;
        }

        let dims = read_dimensions(path).unwrap_or_else(|e| {
            debug!(?path, error = %e, "Unreadable image dimensions");
            (0, 0)
        });
        dimensions.lock().put(key, dims);
        dims
    }

    /// Resolve `filename` inside `folder`, refusing anything that escapes it.
    ///
    /// Returns the canonical folder and the canonical file path.
    fn resolve_file(folder: &str, filename: &str) -> Result<(PathBuf, PathBuf), ServiceError> {
        if folder.trim().is_empty() || filename.is_empty() {
            return Err(ServiceError::InvalidRequest);
        }

        let mut components = Path::new(filename).components();
        if !matches!(
            (components.next(), components.next()),
            (Some(Component::Normal(_)), None)
        ) {
            return Err(ServiceError::InvalidPath);
        }

        let dir = std::fs::canonicalize(folder).map_err(|e| ServiceError::from_io(e, folder))?;
        let file = std::fs::canonicalize(dir.join(filename))
            .map_err(|e| ServiceError::from_io(e, filename))?;
        if !file.starts_with(&dir) {
            return Err(ServiceError::InvalidPath);
        }
        Ok((dir, file))
    }
}

/// Run blocking filesystem work off the async runtime.
async fn blocking<T, F>(f: F) -> Result<T, ServiceError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, ServiceError> + Send + 'static,
{
    task::spawn_blocking(f)
        .await
        .map_err(|e| ServiceError::Transport(format!("blocking task failed: {}", e)))?
}

impl FileService for LocalFileService {
    async fn list(&self, folder: &str, sort: SortOrder) -> Result<FolderListing, ServiceError> {
        let folder = folder.to_string();
        let dimensions = Arc::clone(&self.dimensions);
        blocking(move || Self::list_sync(&folder, sort, &dimensions)).await
    }

    async fn thumbnail(
        &self,
        folder: &str,
        filename: &str,
        size: u32,
    ) -> Result<Vec<u8>, ServiceError> {
        let size = allowed_thumbnail_size(size);
        let folder = folder.to_string();
        let filename = filename.to_string();
        blocking(move || {
            let (dir, _) = Self::resolve_file(&folder, &filename)?;
            ThumbnailGenerator::get_or_generate(&dir, &filename, size)
                .map_err(|e| ServiceError::Decode(format!("{:#}", e)))
        })
        .await
    }

    async fn full_image(&self, folder: &str, filename: &str) -> Result<Vec<u8>, ServiceError> {
        let folder = folder.to_string();
        let filename = filename.to_string();
        blocking(move || {
            let (_, file) = Self::resolve_file(&folder, &filename)?;
            std::fs::read(&file).map_err(|e| ServiceError::from_io(e, &filename))
        })
        .await
    }

    async fn delete(&self, folder: &str, filename: &str) -> Result<(), ServiceError> {
        let folder = folder.to_string();
        let filename = filename.to_string();
        blocking(move || {
            let (dir, file) = Self::resolve_file(&folder, &filename)?;
            std::fs::remove_file(&file).map_err(|e| ServiceError::from_io(e, &filename))?;
            ThumbnailGenerator::remove_all(&dir, &filename);
            info!(?file, "Deleted image");
            Ok(())
        })
        .await
    }

    async fn refresh(&self, folder: &str, size: u32) -> Result<RefreshSummary, ServiceError> {
        let folder = folder.to_string();
        blocking(move || Self::refresh_sync(&folder, size)).await
    }

    async fn browse(&self, path: &str) -> Result<BrowseListing, ServiceError> {
        let path = path.to_string();
        blocking(move || Self::browse_sync(&path)).await
    }

    async fn watch(&self, folder: &str) -> Result<(), ServiceError> {
        self.watcher.watch(folder)
    }

    async fn unwatch(&self, folder: &str) -> Result<(), ServiceError> {
        if !self.watcher.is_watching(folder) {
            warn!(folder, "Unwatch of a folder that is not watched");
        }
        self.watcher.unwatch(folder);
        Ok(())
    }

    async fn pause(&self) -> Result<(), ServiceError> {
        self.watcher.pause();
        Ok(())
    }

    async fn resume(&self) -> Result<(), ServiceError> {
        self.watcher.resume();
        Ok(())
    }
}
