//! Request dispatch between the picker core and the backend.
//!
//! The picker is a single-threaded state machine. It never awaits: it hands
//! requests to a [`Dispatch`] implementation and later receives the outcome
//! as a [`PickerEvent`] through a flume channel, one event at a time.
//!
//! - `TokioDispatcher` runs each request as a tokio task against a `FileService`
//! - Requests are never cancelled; stale results are filtered by the receiver

use std::sync::Arc;
use std::time::Duration;

use flume::{Receiver, Sender};
use tokio::runtime::Handle;
use tracing::{debug, trace, warn};

use crate::error::ServiceError;
use crate::image_loader::dimensions_from_bytes;
use crate::listing::FolderListingClient;
use crate::models::{FolderListing, RefreshSummary, SortOrder};
use crate::service::FileService;
use crate::thumbnails::ImageHandle;

/// A folder listing for one source.
#[derive(Debug, Clone, PartialEq)]
pub struct ListingRequest {
    pub source: usize,
    /// Reload generation of the source when the request was issued.
    pub generation: u64,
    pub folder: String,
    pub sort: SortOrder,
}

/// A thumbnail fetch for one source.
#[derive(Debug, Clone, PartialEq)]
pub struct ThumbnailRequest {
    pub source: usize,
    pub folder: String,
    pub filename: String,
    pub size: u32,
}

/// A full-resolution fetch for the preview modal.
#[derive(Debug, Clone, PartialEq)]
pub struct FullImageRequest {
    pub source: usize,
    pub folder: String,
    pub filename: String,
}

/// A file deletion.
#[derive(Debug, Clone, PartialEq)]
pub struct DeleteRequest {
    pub source: usize,
    pub folder: String,
    pub filename: String,
    /// Index of the file in the source's image list when deletion was requested.
    pub prior_index: Option<usize>,
}

/// Regeneration of every thumbnail in a source's folder.
#[derive(Debug, Clone, PartialEq)]
pub struct RefreshRequest {
    pub source: usize,
    pub folder: String,
    pub size: u32,
}

/// Everything the picker reacts to.
#[derive(Debug)]
pub enum PickerEvent {
    ListingLoaded {
        source: usize,
        generation: u64,
        folder: String,
        result: Result<FolderListing, ServiceError>,
    },
    ThumbnailLoaded {
        source: usize,
        folder: String,
        filename: String,
        size: u32,
        result: Result<ImageHandle, ServiceError>,
    },
    FullImageLoaded {
        source: usize,
        folder: String,
        filename: String,
        result: Result<ImageHandle, ServiceError>,
    },
    DeleteFinished {
        source: usize,
        folder: String,
        filename: String,
        prior_index: Option<usize>,
        result: Result<(), ServiceError>,
    },
    ThumbnailsRefreshed {
        source: usize,
        folder: String,
        result: Result<RefreshSummary, ServiceError>,
    },
    /// A watched folder changed on disk.
    FolderChanged { folder: String },
    /// The execution engine started running a graph.
    ExecutionStarted,
    /// The "currently executing" indicator changed; `None` means finished.
    Executing { node: Option<String> },
    /// The debounce delay after a tab switch elapsed.
    SwitchSettled { generation: u64 },
}

/// Outbound request surface of the picker.
///
/// Implementations must not call back into the picker synchronously;
/// outcomes are delivered later as [`PickerEvent`]s.
pub trait Dispatch {
    fn list(&self, req: ListingRequest);
    fn fetch_thumbnail(&self, req: ThumbnailRequest);
    fn fetch_full_image(&self, req: FullImageRequest);
    fn delete(&self, req: DeleteRequest);
    fn refresh_thumbnails(&self, req: RefreshRequest);
    /// Fire-and-forget; failures are tolerated.
    fn watch(&self, folder: &str);
    /// Fire-and-forget; failures are tolerated.
    fn unwatch(&self, folder: &str);
    fn pause(&self);
    fn resume(&self);
    /// Deliver `SwitchSettled { generation }` after `delay`.
    fn schedule_switch(&self, generation: u64, delay: Duration);
}

/// Create the event channel shared by dispatchers, watchers and the host.
pub fn event_channel() -> (Sender<PickerEvent>, Receiver<PickerEvent>) {
    flume::unbounded()
}

/// Dispatcher that runs every request as a task on a tokio runtime.
pub struct TokioDispatcher<S> {
    service: Arc<S>,
    client: FolderListingClient<S>,
    events: Sender<PickerEvent>,
    runtime: Handle,
}

impl<S: FileService> TokioDispatcher<S> {
    /// Create a dispatcher on the current tokio runtime.
    ///
    /// Panics when called outside a runtime, like `tokio::spawn`.
    pub fn new(service: Arc<S>, events: Sender<PickerEvent>) -> Self {
        Self::with_runtime(service, events, Handle::current())
    }

    pub fn with_runtime(service: Arc<S>, events: Sender<PickerEvent>, runtime: Handle) -> Self {
        Self {
            client: FolderListingClient::new(Arc::clone(&service)),
            service,
            events,
            runtime,
        }
    }

    fn send(events: &Sender<PickerEvent>, event: PickerEvent) {
        if events.send(event).is_err() {
            trace!("Picker event channel closed, dropping result");
        }
    }
}

/// Attach natural dimensions to fetched image bytes.
fn into_handle(bytes: Vec<u8>) -> Result<ImageHandle, ServiceError> {
    let (width, height) =
        dimensions_from_bytes(&bytes).map_err(|e| ServiceError::Decode(e.to_string()))?;
    Ok(ImageHandle::new(bytes, width, height))
}

impl<S: FileService> Dispatch for TokioDispatcher<S> {
    fn list(&self, req: ListingRequest) {
        let client = self.client.clone();
        let events = self.events.clone();
        self.runtime.spawn(async move {
            let result = client.list(&req.folder, req.sort).await;
            Self::send(
                &events,
                PickerEvent::ListingLoaded {
                    source: req.source,
                    generation: req.generation,
                    folder: req.folder,
                    result,
                },
            );
        });
    }

    fn fetch_thumbnail(&self, req: ThumbnailRequest) {
        let service = Arc::clone(&self.service);
        let events = self.events.clone();
        self.runtime.spawn(async move {
            let result = service
                .thumbnail(&req.folder, &req.filename, req.size)
                .await
                .and_then(into_handle);
            if let Err(e) = &result {
                warn!(folder = %req.folder, filename = %req.filename, error = %e, "Thumbnail fetch failed");
            }
            Self::send(
                &events,
                PickerEvent::ThumbnailLoaded {
                    source: req.source,
                    folder: req.folder,
                    filename: req.filename,
                    size: req.size,
                    result,
                },
            );
        });
    }

    fn fetch_full_image(&self, req: FullImageRequest) {
        let service = Arc::clone(&self.service);
        let events = self.events.clone();
        self.runtime.spawn(async move {
            let result = service
                .full_image(&req.folder, &req.filename)
                .await
                .and_then(into_handle);
            Self::send(
                &events,
                PickerEvent::FullImageLoaded {
                    source: req.source,
                    folder: req.folder,
                    filename: req.filename,
                    result,
                },
            );
        });
    }

    fn delete(&self, req: DeleteRequest) {
        let service = Arc::clone(&self.service);
        let events = self.events.clone();
        self.runtime.spawn(async move {
            let result = service.delete(&req.folder, &req.filename).await;
            Self::send(
                &events,
                PickerEvent::DeleteFinished {
                    source: req.source,
                    folder: req.folder,
                    filename: req.filename,
                    prior_index: req.prior_index,
                    result,
                },
            );
        });
    }

    fn refresh_thumbnails(&self, req: RefreshRequest) {
        let service = Arc::clone(&self.service);
        let events = self.events.clone();
        self.runtime.spawn(async move {
            let result = service.refresh(&req.folder, req.size).await;
            Self::send(
                &events,
                PickerEvent::ThumbnailsRefreshed {
                    source: req.source,
                    folder: req.folder,
                    result,
                },
            );
        });
    }

    fn watch(&self, folder: &str) {
        let service = Arc::clone(&self.service);
        let folder = folder.to_string();
        self.runtime.spawn(async move {
            if let Err(e) = service.watch(&folder).await {
                debug!(%folder, error = %e, "Watch request failed");
            }
        });
    }

    fn unwatch(&self, folder: &str) {
        let service = Arc::clone(&self.service);
        let folder = folder.to_string();
        self.runtime.spawn(async move {
            if let Err(e) = service.unwatch(&folder).await {
                debug!(%folder, error = %e, "Unwatch request failed");
            }
        });
    }

    fn pause(&self) {
        let service = Arc::clone(&self.service);
        self.runtime.spawn(async move {
            if let Err(e) = service.pause().await {
                debug!(error = %e, "Pause request failed");
            }
        });
    }

    fn resume(&self) {
        let service = Arc::clone(&self.service);
        self.runtime.spawn(async move {
            if let Err(e) = service.resume().await {
                debug!(error = %e, "Resume request failed");
            }
        });
    }

    fn schedule_switch(&self, generation: u64, delay: Duration) {
        let events = self.events.clone();
        self.runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            Self::send(&events, PickerEvent::SwitchSettled { generation });
        });
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::time::Duration;

    use parking_lot::Mutex;

    use super::*;

    /// Dispatcher that only records what was requested.
    #[derive(Default)]
    pub(crate) struct RecordingDispatch {
        pub lists: Mutex<Vec<ListingRequest>>,
        pub thumbs: Mutex<Vec<ThumbnailRequest>>,
        pub full_images: Mutex<Vec<FullImageRequest>>,
        pub deletes: Mutex<Vec<DeleteRequest>>,
        pub refreshes: Mutex<Vec<RefreshRequest>>,
        pub watches: Mutex<Vec<String>>,
        pub unwatches: Mutex<Vec<String>>,
        pub pauses: Mutex<usize>,
        pub resumes: Mutex<usize>,
        pub switches: Mutex<Vec<u64>>,
    }

    impl RecordingDispatch {
        pub fn lists(&self) -> Vec<ListingRequest> {
            self.lists.lock().clone()
        }

        pub fn thumbnails(&self) -> Vec<ThumbnailRequest> {
            self.thumbs.lock().clone()
        }

        pub fn deletes(&self) -> Vec<DeleteRequest> {
            self.deletes.lock().clone()
        }

        pub fn clear(&self) {
            self.lists.lock().clear();
            self.thumbs.lock().clear();
            self.full_images.lock().clear();
            self.deletes.lock().clear();
            self.refreshes.lock().clear();
            self.watches.lock().clear();
            self.unwatches.lock().clear();
            self.switches.lock().clear();
        }
    }

    impl Dispatch for RecordingDispatch {
        fn list(&self, req: ListingRequest) {
            self.lists.lock().push(req);
        }

        fn fetch_thumbnail(&self, req: ThumbnailRequest) {
            self.thumbs.lock().push(req);
        }

        fn fetch_full_image(&self, req: FullImageRequest) {
            self.full_images.lock().push(req);
        }

        fn delete(&self, req: DeleteRequest) {
            self.deletes.lock().push(req);
        }

        fn refresh_thumbnails(&self, req: RefreshRequest) {
            self.refreshes.lock().push(req);
        }

        fn watch(&self, folder: &str) {
            self.watches.lock().push(folder.to_string());
        }

        fn unwatch(&self, folder: &str) {
            self.unwatches.lock().push(folder.to_string());
        }

        fn pause(&self) {
            *self.pauses.lock() += 1;
        }

        fn resume(&self) {
            *self.resumes.lock() += 1;
        }

        fn schedule_switch(&self, generation: u64, _delay: Duration) {
            self.switches.lock().push(generation);
        }
    }
}
