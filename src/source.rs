//! Per-tab browsing state.
//!
//! A `SourceState` owns the listing of one folder, the selection, the page
//! and the thumbnail cache of one tab. Listings are replaced wholesale on
//! every reload; selection, page, sort order and folder override persist.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::dispatch::{Dispatch, ListingRequest};
use crate::error::ServiceError;
use crate::layout::GalleryLayout;
use crate::models::{FolderEntry, FolderListing, ImageEntry, SortOrder};
use crate::resolve::LinkRef;
use crate::thumbnails::ThumbnailCache;

/// Persisted part of a source.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceSnapshot {
    pub selected_index: Option<usize>,
    pub current_page: usize,
    pub sort_order: SortOrder,
    pub folder_override: String,
    pub selected_filename: String,
}

/// What occupies a gallery cell.
#[derive(Debug, Clone, PartialEq)]
pub enum CellItem {
    Folder(FolderEntry),
    /// Image at `index` in the source's image list.
    Image { index: usize, filename: String },
}

/// One cell of the current page with its grid placement.
#[derive(Debug, Clone, PartialEq)]
pub struct GalleryCell {
    pub col: usize,
    pub row: usize,
    pub item: CellItem,
}

/// State of one tab.
#[derive(Debug)]
pub struct SourceState {
    pub index: usize,
    pub images: Vec<ImageEntry>,
    pub subfolders: Vec<FolderEntry>,
    /// Empty when there is nowhere to navigate up to.
    pub parent: String,
    /// Always `None` or a valid index into `images`.
    pub selected_index: Option<usize>,
    /// The chosen output; survives reloads that drop `selected_index`.
    pub selected_filename: String,
    pub current_page: usize,
    pub sort_order: SortOrder,
    pub folder_override: String,
    /// Externally configured folder.
    pub default_folder: String,
    /// Externally bound input connection, if any.
    pub input: Option<LinkRef>,
    pub cache: ThumbnailCache,
    pub is_loading: bool,
    /// Folder the current listing came from.
    folder: String,
    generation: u64,
}

impl SourceState {
    pub fn new(index: usize) -> Self {
        Self {
            index,
            images: Vec::new(),
            subfolders: Vec::new(),
            parent: String::new(),
            selected_index: None,
            selected_filename: String::new(),
            current_page: 0,
            sort_order: SortOrder::default(),
            folder_override: String::new(),
            default_folder: String::new(),
            input: None,
            cache: ThumbnailCache::new(),
            is_loading: false,
            folder: String::new(),
            generation: 0,
        }
    }

    /// Folder of the listing currently shown.
    pub fn folder(&self) -> &str {
        &self.folder
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Number of gallery items: subfolders (when shown) followed by images.
    pub fn item_count(&self, folders_visible: bool) -> usize {
        self.folder_offset(folders_visible) + self.images.len()
    }

    fn folder_offset(&self, folders_visible: bool) -> usize {
        if folders_visible {
            self.subfolders.len()
        } else {
            0
        }
    }

    /// Index of `filename` in the image list.
    pub fn image_position(&self, filename: &str) -> Option<usize> {
        self.images.iter().position(|img| img.filename == filename)
    }

    /// Select the image at `index`. Returns the chosen filename.
    pub fn select(&mut self, index: usize) -> Option<&str> {
        let filename = self.images.get(index)?.filename.clone();
        debug!(source = self.index, index, %filename, "Selected image");
        self.selected_index = Some(index);
        self.selected_filename = filename;
        Some(self.selected_filename.as_str())
    }

    pub fn clear_selection(&mut self) {
        self.selected_index = None;
        self.selected_filename.clear();
    }

    /// Move to the page holding the selection, if any.
    pub fn jump_to_selected(&mut self, layout: &GalleryLayout, folders_visible: bool) {
        if let Some(index) = self.selected_index {
            self.current_page = layout.page_of(self.folder_offset(folders_visible) + index);
        }
    }

    /// Keep `current_page` inside the layout.
    pub fn clamp_page(&mut self, layout: &GalleryLayout) {
        self.current_page = layout.clamp_page(self.current_page);
    }

    /// Browse into `path`. The caller reloads.
    pub fn navigate_into(&mut self, path: &str) {
        debug!(source = self.index, path, "Navigating into folder");
        self.folder_override = path.to_string();
        self.clear_selection();
        self.current_page = 0;
    }

    /// Browse to the parent folder. Returns false when there is none.
    pub fn navigate_up(&mut self) -> bool {
        if self.parent.is_empty() {
            return false;
        }
        let parent = self.parent.clone();
        self.navigate_into(&parent);
        true
    }

    /// Start a reload of `folder`.
    ///
    /// An empty folder is applied immediately as an empty listing. Returns
    /// true if a listing request was issued.
    pub fn begin_reload(&mut self, folder: &str, dispatch: &dyn Dispatch) -> bool {
        self.generation += 1;

        if folder.trim().is_empty() {
            self.apply_listing(self.generation, folder, Ok(FolderListing::empty()));
            return false;
        }

        self.is_loading = true;
        debug!(source = self.index, folder, generation = self.generation, "Reloading");
        dispatch.list(ListingRequest {
            source: self.index,
            generation: self.generation,
            folder: folder.to_string(),
            sort: self.sort_order,
        });
        true
    }

    /// Apply a listing result. Returns false for results of superseded reloads.
    ///
    /// The caller recomputes the page afterwards with [`Self::settle_page`].
    pub fn apply_listing(
        &mut self,
        generation: u64,
        folder: &str,
        result: Result<FolderListing, ServiceError>,
    ) -> bool {
        if generation != self.generation {
            debug!(
                source = self.index,
                generation,
                current = self.generation,
                "Discarding stale listing"
            );
            return false;
        }

        let listing = result.unwrap_or_else(|e| {
            warn!(
                source = self.index,
                folder,
                error = %e,
                class = ?e.listing_class(),
                "Listing failed, showing empty folder"
            );
            FolderListing::empty()
        });

        self.images = listing.images;
        self.subfolders = listing.subfolders;
        self.parent = listing.parent;
        self.folder = folder.to_string();
        self.cache = ThumbnailCache::new();
        self.is_loading = false;

        self.selected_index = if self.selected_filename.is_empty() {
            None
        } else {
            self.image_position(&self.selected_filename)
        };
        true
    }

    /// Page after a reload: the selection's page, else the first.
    pub fn settle_page(&mut self, layout: &GalleryLayout, folders_visible: bool) {
        self.current_page = 0;
        self.jump_to_selected(layout, folders_visible);
        self.clamp_page(layout);
    }

    /// Ensure thumbnails for every listed image. Returns the number of fetches issued.
    pub fn ensure_thumbnails(&mut self, size: u32, dispatch: &dyn Dispatch) -> usize {
        let mut issued = 0;
        for image in &self.images {
            if self
                .cache
                .ensure(self.index, &self.folder, &image.filename, size, dispatch)
            {
                issued += 1;
            }
        }
        issued
    }

    /// Keep the selection on the same logical item after `filename` was deleted.
    pub fn apply_delete(&mut self, filename: &str, prior_index: Option<usize>) {
        let Some(selected) = self.selected_index else {
            if self.selected_filename == filename {
                self.selected_filename.clear();
            }
            return;
        };

        if self.selected_filename == filename || prior_index == Some(selected) {
            self.clear_selection();
        } else if prior_index.is_some_and(|prior| prior < selected) {
            self.selected_index = Some(selected - 1);
        }
    }

    /// Cells of the current page, folders first.
    pub fn page_items(&self, layout: &GalleryLayout, folders_visible: bool) -> Vec<GalleryCell> {
        let offset = self.folder_offset(folders_visible);
        let range = layout.page_range(self.current_page, self.item_count(folders_visible));
        let start = range.start;

        range
            .map(|i| {
                let (col, row) = layout.cell_position(i - start);
                let item = if i < offset {
                    CellItem::Folder(self.subfolders[i].clone())
                } else {
                    CellItem::Image {
                        index: i - offset,
                        filename: self.images[i - offset].filename.clone(),
                    }
                };
                GalleryCell { col, row, item }
            })
            .collect()
    }

    pub fn snapshot(&self) -> SourceSnapshot {
        SourceSnapshot {
            selected_index: self.selected_index,
            current_page: self.current_page,
            sort_order: self.sort_order,
            folder_override: self.folder_override.clone(),
            selected_filename: self.selected_filename.clone(),
        }
    }

    /// Restore persisted state. The selection is re-resolved on the next reload.
    pub fn restore(&mut self, snapshot: &SourceSnapshot) {
        self.selected_index = snapshot.selected_index.filter(|i| *i < self.images.len());
        self.current_page = snapshot.current_page;
        self.sort_order = snapshot.sort_order;
        self.folder_override = snapshot.folder_override.clone();
        self.selected_filename = snapshot.selected_filename.clone();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::testing::RecordingDispatch;
    use crate::layout::GalleryPager;

    fn listing(names: &[&str]) -> FolderListing {
        FolderListing {
            images: names.iter().map(|n| ImageEntry::new(*n)).collect(),
            subfolders: vec![FolderEntry::new("sub", "/pics/sub")],
            parent: "/".to_string(),
        }
    }

    fn loaded(names: &[&str]) -> SourceState {
        let mut source = SourceState::new(0);
        let dispatch = RecordingDispatch::default();
        source.begin_reload("/pics", &dispatch);
        source.apply_listing(source.generation(), "/pics", Ok(listing(names)));
        source
    }

    #[test]
    fn test_select_only_images() {
        let mut source = loaded(&["a.png", "b.png"]);
        assert_eq!(source.select(1), Some("b.png"));
        assert_eq!(source.selected_index, Some(1));
        assert_eq!(source.select(5), None);
        assert_eq!(source.selected_index, Some(1));
    }

    #[test]
    fn test_reload_reresolves_selection_by_filename() {
        let mut source = loaded(&["a.png", "b.png", "c.png"]);
        source.select(2);

        let dispatch = RecordingDispatch::default();
        source.begin_reload("/pics", &dispatch);
        assert!(source.is_loading);
        source.apply_listing(source.generation(), "/pics", Ok(listing(&["c.png", "z.png"])));
        assert_eq!(source.selected_index, Some(0));

        source.begin_reload("/pics", &dispatch);
        source.apply_listing(source.generation(), "/pics", Ok(listing(&["z.png"])));
        assert_eq!(source.selected_index, None);
        assert_eq!(source.selected_filename, "c.png");

        // The chosen file reappears.
        source.begin_reload("/pics", &dispatch);
        source.apply_listing(source.generation(), "/pics", Ok(listing(&["c.png"])));
        assert_eq!(source.selected_index, Some(0));
    }

    #[test]
    fn test_stale_listing_discarded() {
        let mut source = SourceState::new(0);
        let dispatch = RecordingDispatch::default();
        source.begin_reload("/old", &dispatch);
        let stale = source.generation();
        source.begin_reload("/new", &dispatch);

        assert!(!source.apply_listing(stale, "/old", Ok(listing(&["old.png"]))));
        assert!(source.images.is_empty());
        assert!(source.is_loading);

        assert!(source.apply_listing(source.generation(), "/new", Ok(listing(&["new.png"]))));
        assert_eq!(source.folder(), "/new");
        assert!(!source.is_loading);
    }

    #[test]
    fn test_failed_listing_is_empty() {
        let mut source = loaded(&["a.png"]);
        let dispatch = RecordingDispatch::default();
        source.begin_reload("/gone", &dispatch);
        source.apply_listing(
            source.generation(),
            "/gone",
            Err(ServiceError::InvalidFolder("/gone".into())),
        );
        assert!(source.images.is_empty());
        assert!(source.subfolders.is_empty());
        assert!(source.parent.is_empty());
        assert_eq!(source.selected_index, None);
    }

    #[test]
    fn test_empty_folder_skips_request() {
        let mut source = SourceState::new(0);
        let dispatch = RecordingDispatch::default();
        assert!(!source.begin_reload("", &dispatch));
        assert!(dispatch.lists().is_empty());
        assert!(!source.is_loading);
        assert_eq!(source.ensure_thumbnails(128, &dispatch), 0);
    }

    #[test]
    fn test_jump_to_selected_counts_folders() {
        let names: Vec<String> = (0..250).map(|i| format!("img{:03}.png", i)).collect();
        let refs: Vec<&str> = names.iter().map(String::as_str).collect();
        let mut source = loaded(&refs);
        let layout = GalleryPager::new(0.0, 0.0).compute_layout(600.0, 400.0, 100, 250);
        assert_eq!(layout.per_page, 24);

        source.select(200);
        source.jump_to_selected(&layout, false);
        assert_eq!(source.current_page, 8);

        // One subfolder shifts image 191 onto the next page.
        source.select(191);
        source.jump_to_selected(&layout, true);
        assert_eq!(source.current_page, 8);
        source.jump_to_selected(&layout, false);
        assert_eq!(source.current_page, 7);
    }

    #[test]
    fn test_navigation() {
        let mut source = loaded(&["a.png"]);
        source.select(0);
        source.current_page = 3;

        source.navigate_into("/pics/sub");
        assert_eq!(source.folder_override, "/pics/sub");
        assert_eq!(source.selected_index, None);
        assert!(source.selected_filename.is_empty());
        assert_eq!(source.current_page, 0);

        assert!(source.navigate_up());
        assert_eq!(source.folder_override, "/");

        source.parent.clear();
        assert!(!source.navigate_up());
    }

    #[test]
    fn test_apply_delete_adjusts_selection() {
        let mut source = loaded(&["a.png", "b.png", "c.png", "d.png"]);

        source.select(2);
        source.apply_delete("d.png", Some(3));
        assert_eq!(source.selected_index, Some(2));

        source.apply_delete("a.png", Some(0));
        assert_eq!(source.selected_index, Some(1));
        assert_eq!(source.selected_filename, "c.png");

        source.apply_delete("c.png", Some(1));
        assert_eq!(source.selected_index, None);
        assert!(source.selected_filename.is_empty());
    }

    #[test]
    fn test_page_items_folders_first() {
        let source = loaded(&["a.png", "b.png", "c.png"]);
        let layout = GalleryLayout {
            cols: 2,
            rows: 1,
            per_page: 2,
            page_count: 2,
        };

        let cells = source.page_items(&layout, true);
        assert_eq!(cells.len(), 2);
        assert!(matches!(cells[0].item, CellItem::Folder(_)));
        assert_eq!((cells[1].col, cells[1].row), (1, 0));
        assert_eq!(
            cells[1].item,
            CellItem::Image {
                index: 0,
                filename: "a.png".into()
            }
        );

        let cells = source.page_items(&layout, false);
        assert_eq!(
            cells[1].item,
            CellItem::Image {
                index: 1,
                filename: "b.png".into()
            }
        );
    }

    #[test]
    fn test_snapshot_restore() {
        let mut source = loaded(&["a.png", "b.png"]);
        source.select(1);
        source.sort_order = SortOrder::DateAsc;
        source.folder_override = "/pics".into();

        let snapshot = source.snapshot();
        let mut fresh = SourceState::new(0);
        fresh.restore(&snapshot);
        assert_eq!(fresh.selected_index, None);
        assert_eq!(fresh.selected_filename, "b.png");
        assert_eq!(fresh.sort_order, SortOrder::DateAsc);
        assert_eq!(fresh.snapshot().folder_override, "/pics");
    }

    #[test]
    fn test_restored_page_beyond_listing_shows_nothing() {
        let mut source = loaded(&["a.png", "b.png"]);
        source.restore(&SourceSnapshot {
            current_page: usize::MAX,
            ..SourceSnapshot::default()
        });
        let layout = GalleryPager::new(0.0, 0.0).compute_layout(600.0, 400.0, 100, 3);
        assert!(source.page_items(&layout, true).is_empty());

        source.settle_page(&layout, true);
        assert_eq!(source.current_page, 0);
        assert_eq!(source.page_items(&layout, true).len(), 3);
    }
}
