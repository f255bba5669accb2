//! Per-source thumbnail state.
//!
//! - One cache per source, keyed by filename
//! - Entries move `Pending -> Loaded | Failed` exactly once; failures are not retried
//! - Reloads replace the cache wholesale, size changes clear it
//!
//! Completions are matched against the (folder, size) the fetch was issued
//! for, so results of superseded fetches are absorbed without effect.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use tracing::trace;

use crate::dispatch::{Dispatch, ThumbnailRequest};

/// Loaded image (thumbnail or full resolution) handed to the host for drawing.
#[derive(Clone, PartialEq, Eq)]
pub struct ImageHandle {
    /// Encoded image bytes as returned by the backend.
    pub bytes: Arc<[u8]>,
    /// Natural width in pixels.
    pub width: u32,
    /// Natural height in pixels.
    pub height: u32,
}

impl ImageHandle {
    pub fn new(bytes: impl Into<Arc<[u8]>>, width: u32, height: u32) -> Self {
        Self {
            bytes: bytes.into(),
            width,
            height,
        }
    }
}

impl fmt::Debug for ImageHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImageHandle")
            .field("bytes", &self.bytes.len())
            .field("width", &self.width)
            .field("height", &self.height)
            .finish()
    }
}

/// Cache state of a single filename.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ThumbState {
    /// A fetch is in flight for this folder and size.
    Pending { folder: String, size: u32 },
    Loaded(ImageHandle),
    /// The fetch failed; drawn as an error placeholder.
    Failed,
}

/// Thumbnail cache for one source.
#[derive(Debug, Default)]
pub struct ThumbnailCache {
    entries: HashMap<String, ThumbState>,
}

impl ThumbnailCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make sure a thumbnail for `filename` is cached or on its way.
    ///
    /// No-op when any entry (pending, loaded or failed) already exists.
    /// Otherwise records a pending marker and issues one fetch.
    /// Returns true if a fetch was issued.
    pub fn ensure(
        &mut self,
        source: usize,
        folder: &str,
        filename: &str,
        size: u32,
        dispatch: &dyn Dispatch,
    ) -> bool {
        if self.entries.contains_key(filename) {
            return false;
        }

        self.entries.insert(
            filename.to_string(),
            ThumbState::Pending {
                folder: folder.to_string(),
                size,
            },
        );
        trace!(source, folder, filename, size, "Requesting thumbnail");
        dispatch.fetch_thumbnail(ThumbnailRequest {
            source,
            folder: folder.to_string(),
            filename: filename.to_string(),
            size,
        });
        true
    }

    /// Apply a finished fetch. Returns true if the cache changed.
    ///
    /// `None` records an error marker.
    pub fn complete(
        &mut self,
        folder: &str,
        filename: &str,
        size: u32,
        handle: Option<ImageHandle>,
    ) -> bool {
        let Some(entry) = self.entries.get_mut(filename) else {
            trace!(folder, filename, "Dropping thumbnail for unlisted file");
            return false;
        };

        let awaited = matches!(
            &*entry,
            ThumbState::Pending { folder: f, size: s } if f.as_str() == folder && *s == size
        );
        if !awaited {
            trace!(folder, filename, size, "Dropping superseded thumbnail");
            return false;
        }

        *entry = match handle {
            Some(handle) => ThumbState::Loaded(handle),
            None => ThumbState::Failed,
        };
        true
    }

    /// Drop every entry.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Get the state of a filename.
    pub fn get(&self, filename: &str) -> Option<&ThumbState> {
        self.entries.get(filename)
    }

    /// Number of entries in any state.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of fetches still in flight.
    pub fn pending_count(&self) -> usize {
        self.entries
            .values()
            .filter(|s| matches!(s, ThumbState::Pending { .. }))
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::testing::RecordingDispatch;

    fn handle() -> ImageHandle {
        ImageHandle::new(vec![1u8, 2, 3], 128, 96)
    }

    #[test]
    fn test_ensure_is_idempotent() {
        let dispatch = RecordingDispatch::default();
        let mut cache = ThumbnailCache::new();

        assert!(cache.ensure(0, "/a", "x.png", 128, &dispatch));
        assert!(!cache.ensure(0, "/a", "x.png", 128, &dispatch));
        assert_eq!(dispatch.thumbnails().len(), 1);
        assert_eq!(cache.pending_count(), 1);
    }

    #[test]
    fn test_complete_loaded_and_failed() {
        let dispatch = RecordingDispatch::default();
        let mut cache = ThumbnailCache::new();
        cache.ensure(0, "/a", "ok.png", 128, &dispatch);
        cache.ensure(0, "/a", "bad.png", 128, &dispatch);

        assert!(cache.complete("/a", "ok.png", 128, Some(handle())));
        assert!(cache.complete("/a", "bad.png", 128, None));

        assert!(matches!(cache.get("ok.png"), Some(ThumbState::Loaded(h)) if h.width == 128));
        assert_eq!(cache.get("bad.png"), Some(&ThumbState::Failed));

        // Errors are never retried automatically.
        assert!(!cache.ensure(0, "/a", "bad.png", 128, &dispatch));
        assert_eq!(dispatch.thumbnails().len(), 2);
    }

    #[test]
    fn test_stale_completion_is_absorbed() {
        let dispatch = RecordingDispatch::default();
        let mut cache = ThumbnailCache::new();
        cache.ensure(0, "/a", "x.png", 256, &dispatch);

        // Result of an older fetch at another size or folder.
        assert!(!cache.complete("/a", "x.png", 128, Some(handle())));
        assert!(!cache.complete("/b", "x.png", 256, Some(handle())));
        // Result for a file that is no longer listed.
        assert!(!cache.complete("/a", "gone.png", 256, Some(handle())));
        assert_eq!(cache.pending_count(), 1);

        assert!(cache.complete("/a", "x.png", 256, Some(handle())));
        // A duplicate completion does not overwrite.
        assert!(!cache.complete("/a", "x.png", 256, None));
    }

    #[test]
    fn test_clear_allows_refetch() {
        let dispatch = RecordingDispatch::default();
        let mut cache = ThumbnailCache::new();
        cache.ensure(0, "/a", "x.png", 128, &dispatch);
        cache.clear();
        assert!(cache.is_empty());
        assert!(cache.ensure(0, "/a", "x.png", 256, &dispatch));
        assert_eq!(dispatch.thumbnails()[1].size, 256);
    }
}
