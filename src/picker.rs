//! The image folder picker node.
//!
//! `ImageFolderPicker` owns one [`SourceState`] per tab and reacts to two
//! kinds of input:
//! - interactions from the host (select, navigate, page, sort, delete, ...)
//! - [`PickerEvent`]s delivered by the dispatcher, the folder watcher and
//!   the execution engine
//!
//! Every method runs to completion without blocking. While an execution is
//! running the picker is paused and rejects mutating interactions.

use serde::{Deserialize, Serialize};
use tracing::{debug, info, trace, warn};

use crate::config::PickerConfig;
use crate::dispatch::{DeleteRequest, Dispatch, FullImageRequest, PickerEvent, RefreshRequest};
use crate::error::ServiceError;
use crate::host::CanvasHost;
use crate::layout::{GalleryLayout, GalleryPager};
use crate::modal::{presenter, ModalContent};
use crate::models::SortOrder;
use crate::notifier::matching_sources;
use crate::resolve::{InputResolver, LinkRef, NoInputs};
use crate::service::allowed_thumbnail_size;
use crate::source::{CellItem, GalleryCell, SourceSnapshot, SourceState};
use crate::watch::WatchCoordinator;

/// Persisted state of a picker node.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PickerSnapshot {
    pub active_source: usize,
    pub thumbnail_size: u32,
    pub sources: Vec<SourceSnapshot>,
}

/// A multi-tab image picker.
pub struct ImageFolderPicker<D, H> {
    config: PickerConfig,
    pager: GalleryPager,
    sources: Vec<SourceState>,
    active: usize,
    thumbnail_size: u32,
    viewport: (f32, f32),
    watch: WatchCoordinator,
    /// Bumped on every tab switch; only the latest settled switch reloads.
    switch_generation: u64,
    dispatch: D,
    host: H,
    resolver: Box<dyn InputResolver>,
}

impl<D: Dispatch, H: CanvasHost> ImageFolderPicker<D, H> {
    pub fn new(config: PickerConfig, dispatch: D, host: H) -> Self {
        let sources = (0..config.tab_count.max(1)).map(SourceState::new).collect();
        Self {
            pager: config.pager(),
            thumbnail_size: allowed_thumbnail_size(config.thumbnail_size),
            config,
            sources,
            active: 0,
            viewport: (0.0, 0.0),
            watch: WatchCoordinator::new(),
            switch_generation: 0,
            dispatch,
            host,
            resolver: Box::new(NoInputs),
        }
    }

    /// Use `resolver` for bound inputs.
    pub fn with_resolver(mut self, resolver: Box<dyn InputResolver>) -> Self {
        self.resolver = resolver;
        self
    }

    pub fn dispatch(&self) -> &D {
        &self.dispatch
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    pub fn sources(&self) -> &[SourceState] {
        &self.sources
    }

    pub fn source(&self, index: usize) -> Option<&SourceState> {
        self.sources.get(index)
    }

    pub fn active_source(&self) -> usize {
        self.active
    }

    pub fn thumbnail_size(&self) -> u32 {
        self.thumbnail_size
    }

    pub fn is_paused(&self) -> bool {
        self.watch.is_paused()
    }

    pub fn watched_folder(&self) -> &str {
        self.watch.active_folder()
    }

    /// Folder and filename chosen on `source`, if any.
    pub fn chosen(&self, source: usize) -> Option<(&str, &str)> {
        let state = self.sources.get(source)?;
        if state.selected_filename.is_empty() {
            return None;
        }
        Some((state.folder(), state.selected_filename.as_str()))
    }

    /// Folder a source lists: override, else bound input, else its default.
    pub fn effective_folder(&self, source: usize) -> String {
        let Some(state) = self.sources.get(source) else {
            return String::new();
        };
        if !state.folder_override.is_empty() {
            return state.folder_override.clone();
        }
        if let Some(folder) = state
            .input
            .as_ref()
            .and_then(|link| self.resolver.resolve(link))
        {
            return folder;
        }
        state.default_folder.clone()
    }

    /// Gallery grid of `source` in the current viewport.
    pub fn layout(&self, source: usize) -> GalleryLayout {
        let items = self
            .sources
            .get(source)
            .map_or(0, |s| s.item_count(self.config.show_folders));
        self.pager
            .compute_layout(self.viewport.0, self.viewport.1, self.thumbnail_size, items)
    }

    /// Load every tab.
    pub fn start(&mut self) {
        info!(tabs = self.sources.len(), active = self.active, "Starting picker");
        for source in 0..self.sources.len() {
            self.reload(source);
        }
    }

    /// Reload `source` from its effective folder.
    pub fn reload(&mut self, source: usize) {
        if source >= self.sources.len() {
            return;
        }
        let folder = self.effective_folder(source);
        if !self.sources[source].begin_reload(&folder, &self.dispatch) {
            self.finish_reload(source);
        }
    }

    /// User-driven reload.
    pub fn refresh(&mut self, source: usize) {
        debug!(source, "Refreshing");
        self.reload(source);
    }

    /// Re-render every thumbnail of the folder `source` shows.
    pub fn regenerate_thumbnails(&mut self, source: usize) -> bool {
        if self.rejected_while_paused("regenerate thumbnails") {
            return false;
        }
        let Some(state) = self.sources.get(source) else {
            return false;
        };
        if state.folder().is_empty() {
            return false;
        }
        self.dispatch.refresh_thumbnails(RefreshRequest {
            source,
            folder: state.folder().to_string(),
            size: self.thumbnail_size,
        });
        true
    }

    fn finish_reload(&mut self, source: usize) {
        let layout = self.layout(source);
        let show_folders = self.config.show_folders;
        let size = self.thumbnail_size;

        let state = &mut self.sources[source];
        state.settle_page(&layout, show_folders);
        let issued = state.ensure_thumbnails(size, &self.dispatch);
        debug!(
            source,
            folder = state.folder(),
            images = state.images.len(),
            thumbnails = issued,
            "Listing applied"
        );

        if source == self.active {
            let folder = state.folder().to_string();
            self.watch.activate(&folder, &self.dispatch);
        }
        self.host.request_redraw();
    }

    /// Process one event from the dispatcher, watcher or execution engine.
    pub fn handle_event(&mut self, event: PickerEvent) {
        match event {
            PickerEvent::ListingLoaded {
                source,
                generation,
                folder,
                result,
            } => {
                let Some(state) = self.sources.get_mut(source) else {
                    return;
                };
                if state.apply_listing(generation, &folder, result) {
                    self.finish_reload(source);
                }
            }
            PickerEvent::ThumbnailLoaded {
                source,
                folder,
                filename,
                size,
                result,
            } => {
                let Some(state) = self.sources.get_mut(source) else {
                    return;
                };
                if state.cache.complete(&folder, &filename, size, result.ok()) {
                    self.host.request_redraw();
                }
            }
            PickerEvent::FullImageLoaded {
                source,
                filename,
                result,
                ..
            } => match result {
                Ok(handle) => {
                    presenter().lock().show(ModalContent::Preview {
                        source,
                        filename,
                        handle,
                    });
                    self.host.request_redraw();
                }
                Err(e) => {
                    warn!(source, %filename, error = %e, "Preview failed");
                    self.host
                        .report_error(&format!("Could not open {}: {}", filename, e));
                }
            },
            PickerEvent::DeleteFinished {
                source,
                folder,
                filename,
                prior_index,
                result,
            } => self.finish_delete(source, &folder, &filename, prior_index, result),
            PickerEvent::ThumbnailsRefreshed {
                source,
                folder,
                result,
            } => match result {
                Ok(summary) => {
                    let size = self.thumbnail_size;
                    let Some(state) = self.sources.get_mut(source) else {
                        return;
                    };
                    info!(
                        source,
                        %folder,
                        regenerated = summary.regenerated,
                        errors = summary.errors,
                        "Thumbnails regenerated"
                    );
                    if state.folder() != folder {
                        return;
                    }
                    state.cache.clear();
                    state.ensure_thumbnails(size, &self.dispatch);
                    self.host.request_redraw();
                }
                Err(e) => {
                    warn!(source, %folder, error = %e, "Thumbnail regeneration failed");
                    self.host
                        .report_error(&format!("Could not regenerate thumbnails: {}", e));
                }
            },
            PickerEvent::FolderChanged { folder } => {
                let folders: Vec<String> =
                    (0..self.sources.len()).map(|i| self.effective_folder(i)).collect();
                let matched = matching_sources(&folder, folders.iter().map(String::as_str));
                debug!(%folder, ?matched, "Folder changed");
                for source in matched {
                    self.reload(source);
                }
            }
            PickerEvent::ExecutionStarted => {
                self.watch.pause(&self.dispatch);
                self.host.show_overlay(true);
            }
            PickerEvent::Executing { node: Some(node) } => {
                trace!(%node, "Execution progressing");
            }
            PickerEvent::Executing { node: None } => {
                self.watch.resume(&self.dispatch);
                self.host.show_overlay(false);
            }
            PickerEvent::SwitchSettled { generation } => {
                if generation == self.switch_generation {
                    debug!(source = self.active, "Tab switch settled");
                    self.reload(self.active);
                } else {
                    trace!(generation, "Superseded tab switch");
                }
            }
        }
    }

    /// Set the viewport size in pixels.
    pub fn resize(&mut self, width: f32, height: f32) {
        self.viewport = (width, height);
        for source in 0..self.sources.len() {
            let layout = self.layout(source);
            self.sources[source].clamp_page(&layout);
        }
        self.host.request_redraw();
    }

    /// Switch tabs. The new tab reloads once switching stops.
    pub fn set_active_source(&mut self, source: usize) {
        if source >= self.sources.len() || source == self.active {
            return;
        }
        self.active = source;
        self.switch_generation += 1;
        self.dispatch
            .schedule_switch(self.switch_generation, self.config.switch_debounce());
        self.host.request_redraw();
    }

    /// Change the thumbnail size of every tab.
    pub fn set_thumbnail_size(&mut self, size: u32) {
        let size = allowed_thumbnail_size(size);
        if size == self.thumbnail_size {
            return;
        }
        info!(from = self.thumbnail_size, to = size, "Thumbnail size changed");
        self.thumbnail_size = size;

        for source in 0..self.sources.len() {
            let layout = self.layout(source);
            let state = &mut self.sources[source];
            state.cache.clear();
            state.ensure_thumbnails(size, &self.dispatch);
            state.clamp_page(&layout);
        }
        self.host.request_redraw();
    }

    fn rejected_while_paused(&self, action: &str) -> bool {
        if self.watch.is_paused() {
            debug!(action, "Ignored while paused");
            return true;
        }
        false
    }

    /// Select the image at `index`. Returns true if the selection changed.
    pub fn select(&mut self, source: usize, index: usize) -> bool {
        if self.rejected_while_paused("select") {
            return false;
        }
        let Some(state) = self.sources.get_mut(source) else {
            return false;
        };
        let Some(filename) = state.select(index) else {
            return false;
        };
        self.host.output_changed(source, filename);
        self.host.request_redraw();
        true
    }

    /// Show the page holding the selection.
    pub fn jump_to_selected(&mut self, source: usize) {
        let layout = self.layout(source);
        if let Some(state) = self.sources.get_mut(source) {
            state.jump_to_selected(&layout, self.config.show_folders);
            state.clamp_page(&layout);
        }
    }

    pub fn navigate_into(&mut self, source: usize, path: &str) -> bool {
        if self.rejected_while_paused("navigate") || source >= self.sources.len() {
            return false;
        }
        self.sources[source].navigate_into(path);
        self.host.output_changed(source, "");
        self.reload(source);
        true
    }

    pub fn navigate_up(&mut self, source: usize) -> bool {
        if self.rejected_while_paused("navigate") {
            return false;
        }
        let Some(state) = self.sources.get_mut(source) else {
            return false;
        };
        if !state.navigate_up() {
            return false;
        }
        self.host.output_changed(source, "");
        self.reload(source);
        true
    }

    pub fn set_sort_order(&mut self, source: usize, order: SortOrder) -> bool {
        if self.rejected_while_paused("sort") {
            return false;
        }
        let Some(state) = self.sources.get_mut(source) else {
            return false;
        };
        if state.sort_order == order {
            return false;
        }
        state.sort_order = order;
        self.reload(source);
        true
    }

    /// Configure the default folder of `source` at startup.
    ///
    /// Keeps any navigation override and does not reload; call
    /// [`start`](Self::start) afterwards.
    pub fn bind_default_folder(&mut self, source: usize, path: &str) {
        if let Some(state) = self.sources.get_mut(source) {
            state.default_folder = path.to_string();
        }
    }

    /// Replace the externally configured folder of `source`.
    pub fn set_default_folder(&mut self, source: usize, path: &str) -> bool {
        if self.rejected_while_paused("set folder") {
            return false;
        }
        let Some(state) = self.sources.get_mut(source) else {
            return false;
        };
        state.default_folder = path.to_string();
        state.folder_override.clear();
        self.reload(source);
        true
    }

    /// Bind `source` to an input connection, or unbind it.
    pub fn bind_input(&mut self, source: usize, link: Option<LinkRef>) -> bool {
        if self.rejected_while_paused("bind input") {
            return false;
        }
        let Some(state) = self.sources.get_mut(source) else {
            return false;
        };
        state.input = link;
        self.reload(source);
        true
    }

    pub fn set_page(&mut self, source: usize, page: usize) {
        let layout = self.layout(source);
        if let Some(state) = self.sources.get_mut(source) {
            state.current_page = layout.clamp_page(page);
            self.host.request_redraw();
        }
    }

    pub fn next_page(&mut self, source: usize) {
        if let Some(page) = self.sources.get(source).map(|s| s.current_page) {
            self.set_page(source, page + 1);
        }
    }

    pub fn prev_page(&mut self, source: usize) {
        if let Some(page) = self.sources.get(source).map(|s| s.current_page) {
            self.set_page(source, page.saturating_sub(1));
        }
    }

    /// Cells of the current page of `source`.
    pub fn page_items(&self, source: usize) -> Vec<GalleryCell> {
        let layout = self.layout(source);
        self.sources
            .get(source)
            .map(|s| s.page_items(&layout, self.config.show_folders))
            .unwrap_or_default()
    }

    /// Click on a gallery cell: folders are entered, images selected.
    pub fn activate(&mut self, source: usize, item: &CellItem) -> bool {
        match item {
            CellItem::Folder(folder) => self.navigate_into(source, &folder.path),
            CellItem::Image { index, .. } => self.select(source, *index),
        }
    }

    /// Ask for confirmation before deleting `filename`.
    pub fn request_delete(&mut self, source: usize, filename: &str) -> bool {
        if self.rejected_while_paused("delete") {
            return false;
        }
        let Some(state) = self.sources.get(source) else {
            return false;
        };
        let prior_index = state.image_position(filename);
        presenter().lock().show(ModalContent::ConfirmDelete {
            source,
            folder: state.folder().to_string(),
            filename: filename.to_string(),
            prior_index,
        });
        self.host.request_redraw();
        true
    }

    /// Delete `filename` without confirmation.
    pub fn delete(&mut self, source: usize, filename: &str) -> bool {
        if self.rejected_while_paused("delete") {
            return false;
        }
        let Some(state) = self.sources.get(source) else {
            return false;
        };
        let prior_index = state.image_position(filename);
        self.dispatch.delete(DeleteRequest {
            source,
            folder: state.folder().to_string(),
            filename: filename.to_string(),
            prior_index,
        });
        true
    }

    /// Accept the open modal. Confirms a pending deletion.
    pub fn confirm_modal(&mut self) -> bool {
        if self.rejected_while_paused("confirm") {
            return false;
        }
        let content = presenter().lock().hide();
        self.host.request_redraw();
        match content {
            Some(ModalContent::ConfirmDelete {
                source,
                folder,
                filename,
                prior_index,
            }) => {
                self.dispatch.delete(DeleteRequest {
                    source,
                    folder,
                    filename,
                    prior_index,
                });
                true
            }
            _ => false,
        }
    }

    pub fn dismiss_modal(&mut self) {
        if presenter().lock().hide().is_some() {
            self.host.request_redraw();
        }
    }

    /// Fetch the image at `index` in full resolution for the preview modal.
    pub fn open_preview(&mut self, source: usize, index: usize) -> bool {
        let Some(state) = self.sources.get(source) else {
            return false;
        };
        let Some(image) = state.images.get(index) else {
            return false;
        };
        self.dispatch.fetch_full_image(FullImageRequest {
            source,
            folder: state.folder().to_string(),
            filename: image.filename.clone(),
        });
        true
    }

    fn finish_delete(
        &mut self,
        source: usize,
        folder: &str,
        filename: &str,
        prior_index: Option<usize>,
        result: Result<(), ServiceError>,
    ) {
        if let Err(e) = result {
            warn!(
                source,
                folder,
                filename,
                error = %e,
                class = ?e.delete_class(),
                "Delete failed"
            );
            self.host
                .report_error(&format!("Could not delete {}: {}", filename, e));
            return;
        }

        let Some(state) = self.sources.get_mut(source) else {
            return;
        };
        let was_chosen = state.selected_filename == filename;
        state.apply_delete(filename, prior_index);
        info!(source, folder, filename, "Deleted");
        if was_chosen {
            self.host.output_changed(source, "");
        }
        self.reload(source);
    }

    /// Persisted state of the node.
    pub fn snapshot(&self) -> PickerSnapshot {
        PickerSnapshot {
            active_source: self.active,
            thumbnail_size: self.thumbnail_size,
            sources: self.sources.iter().map(SourceState::snapshot).collect(),
        }
    }

    /// Restore persisted state. Call [`start`](Self::start) afterwards to list.
    pub fn restore(&mut self, snapshot: &PickerSnapshot) {
        self.active = snapshot.active_source.min(self.sources.len() - 1);
        self.thumbnail_size = allowed_thumbnail_size(snapshot.thumbnail_size);
        for (state, saved) in self.sources.iter_mut().zip(&snapshot.sources) {
            state.restore(saved);
        }
        debug!(active = self.active, size = self.thumbnail_size, "Restored picker state");
    }
}
