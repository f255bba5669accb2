//! Folder watching for change notifications.
//!
//! - One non-recursive OS watch per folder, reference counted
//! - Folders are keyed by their lexically normalised absolute path; symlinks
//!   are not resolved, and notifications name the folder as it was watched
//! - Only directory entries and image files are considered
//! - Bursts are thinned (events closer than `event_gap` are dropped) and
//!   coalesced (one notification per folder once `debounce` passes quietly)
//! - While paused, changed folders are held and flushed on resume
//!
//! Notifications are delivered as [`PickerEvent::FolderChanged`].

use std::collections::{BTreeSet, HashMap};
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use flume::{Receiver, RecvTimeoutError, Sender};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use parking_lot::Mutex;
use tracing::{debug, info, trace, warn};

use crate::dispatch::PickerEvent;
use crate::error::ServiceError;
use crate::models::is_image_path;

/// Timing of change notifications.
#[derive(Debug, Clone, Copy)]
pub struct WatchSettings {
    /// Quiet period before pending folders are announced.
    pub debounce: Duration,
    /// Minimum spacing between accepted raw events of one folder.
    pub event_gap: Duration,
}

impl Default for WatchSettings {
    fn default() -> Self {
        Self {
            debounce: Duration::from_millis(500),
            event_gap: Duration::from_millis(300),
        }
    }
}

/// Messages for the notification worker.
#[derive(Debug)]
enum Control {
    Changed(String),
    Pause,
    Resume,
    Shutdown,
}

/// A watched folder.
#[derive(Debug)]
struct WatchRef {
    count: usize,
    /// The folder as the first caller named it.
    folder: String,
}

type RefCounts = Arc<Mutex<HashMap<PathBuf, WatchRef>>>;

/// Reference-counted folder watcher.
pub struct FolderWatcher {
    /// `None` when the platform watcher could not be created.
    watcher: Mutex<Option<RecommendedWatcher>>,
    refs: RefCounts,
    control: Sender<Control>,
    worker: Option<JoinHandle<()>>,
}

impl FolderWatcher {
    /// Start the notification worker and the platform watcher.
    ///
    /// A platform watcher that fails to start leaves watching disabled
    /// rather than failing; notifications are best effort.
    pub fn new(events: Sender<PickerEvent>, settings: WatchSettings) -> Result<Self> {
        let (control_tx, control_rx) = flume::unbounded();
        let refs: RefCounts = Arc::new(Mutex::new(HashMap::new()));

        let debounce = settings.debounce;
        let worker = thread::Builder::new()
            .name("folder-watch".to_string())
            .spawn(move || notify_loop(control_rx, events, debounce))
            .context("Failed to spawn folder watch worker")?;

        let watcher = match Self::platform_watcher(Arc::clone(&refs), control_tx.clone(), settings)
        {
            Ok(w) => Some(w),
            Err(e) => {
                warn!(error = %e, "Folder watching unavailable");
                None
            }
        };

        Ok(Self {
            watcher: Mutex::new(watcher),
            refs,
            control: control_tx,
            worker: Some(worker),
        })
    }

    fn platform_watcher(
        refs: RefCounts,
        control: Sender<Control>,
        settings: WatchSettings,
    ) -> notify::Result<RecommendedWatcher> {
        let mut last_accepted: HashMap<String, Instant> = HashMap::new();

        notify::recommended_watcher(move |res: notify::Result<Event>| {
            let event = match res {
                Ok(event) => event,
                Err(e) => {
                    warn!(error = %e, "Folder watch error");
                    return;
                }
            };
            if !matches!(
                event.kind,
                EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_) | EventKind::Any
            ) {
                return;
            }

            let Some(folder) = event_folder(&event.paths, &refs.lock()) else {
                return;
            };

            let now = Instant::now();
            if let Some(last) = last_accepted.get(&folder) {
                if now.duration_since(*last) < settings.event_gap {
                    trace!(?folder, "Dropping burst event");
                    return;
                }
            }
            last_accepted.insert(folder.clone(), now);
            let _ = control.send(Control::Changed(folder));
        })
    }

    /// Start watching `folder`, or add a reference to an existing watch.
    pub fn watch(&self, folder: &str) -> Result<(), ServiceError> {
        let path = normalize_folder(folder);
        if !path.is_dir() {
            return Err(ServiceError::InvalidFolder(folder.to_string()));
        }

        // The event handler takes `refs`; never hold it across a platform call.
        let mut watcher = self.watcher.lock();
        if let Some(entry) = self.refs.lock().get_mut(&path) {
            entry.count += 1;
            trace!(?path, count = entry.count, "Added watch reference");
            return Ok(());
        }

        let Some(watcher) = watcher.as_mut() else {
            return Err(ServiceError::Transport("folder watching unavailable".to_string()));
        };
        watcher
            .watch(&path, RecursiveMode::NonRecursive)
            .map_err(|e| ServiceError::Transport(e.to_string()))?;
        self.refs.lock().insert(
            path.clone(),
            WatchRef {
                count: 1,
                folder: folder.to_string(),
            },
        );
        info!(?path, "Watching folder");
        Ok(())
    }

    /// Drop one reference; the OS watch is removed with the last one.
    ///
    /// Returns true while other references keep the folder watched.
    pub fn unwatch(&self, folder: &str) -> bool {
        let path = normalize_folder(folder);
        let mut watcher = self.watcher.lock();
        {
            let mut refs = self.refs.lock();
            let Some(entry) = refs.get_mut(&path) else {
                return false;
            };
            entry.count -= 1;
            if entry.count > 0 {
                return true;
            }
            refs.remove(&path);
        }

        if let Some(watcher) = watcher.as_mut() {
            if let Err(e) = watcher.unwatch(&path) {
                warn!(?path, error = %e, "Failed to unwatch folder");
            }
        }
        info!(?path, "Stopped watching folder");
        false
    }

    pub fn is_watching(&self, folder: &str) -> bool {
        self.refs.lock().contains_key(&normalize_folder(folder))
    }

    /// All currently watched folders.
    pub fn watched_folders(&self) -> Vec<PathBuf> {
        let mut folders: Vec<_> = self.refs.lock().keys().cloned().collect();
        folders.sort();
        folders
    }

    /// Hold notifications until [`resume`](Self::resume).
    pub fn pause(&self) {
        let _ = self.control.send(Control::Pause);
    }

    /// Release held notifications.
    pub fn resume(&self) {
        let _ = self.control.send(Control::Resume);
    }

    #[cfg(test)]
    fn notify_changed(&self, folder: &str) {
        let _ = self.control.send(Control::Changed(folder.to_string()));
    }
}

impl Drop for FolderWatcher {
    fn drop(&mut self) {
        self.watcher.lock().take();
        let _ = self.control.send(Control::Shutdown);
        if let Some(handle) = self.worker.take() {
            let _ = handle.join();
        }
    }
}

/// Absolute form of a folder path with `.` and `..` resolved lexically.
///
/// Symlinks are kept, so a folder reached through a link stays distinct
/// from its target.
pub fn normalize_folder(folder: &str) -> PathBuf {
    lexical_normalize(Path::new(folder))
}

fn lexical_normalize(path: &Path) -> PathBuf {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .map(|cwd| cwd.join(path))
            .unwrap_or_else(|_| path.to_path_buf())
    };

    let mut normalized = PathBuf::new();
    for component in absolute.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if normalized.parent().is_some() {
                    normalized.pop();
                }
            }
            other => normalized.push(other.as_os_str()),
        }
    }
    normalized
}

/// Whether a changed path can affect a listing.
fn is_relevant_path(path: &Path) -> bool {
    let hidden = path
        .file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| n.starts_with('.'));
    if hidden {
        return false;
    }
    // Removed directories no longer answer `is_dir`; extensionless names count as folders.
    is_image_path(path) || path.is_dir() || path.extension().is_none()
}

/// The watched folder a raw event belongs to, as it was watched.
fn event_folder(paths: &[PathBuf], watched: &HashMap<PathBuf, WatchRef>) -> Option<String> {
    paths.iter().filter(|p| is_relevant_path(p)).find_map(|p| {
        let parent = lexical_normalize(p.parent()?);
        watched.get(&parent).map(|entry| entry.folder.clone())
    })
}

/// Worker: coalesces changed folders and emits one notification per folder.
fn notify_loop(rx: Receiver<Control>, events: Sender<PickerEvent>, debounce: Duration) {
    debug!("Folder watch worker started");
    let mut pending: BTreeSet<String> = BTreeSet::new();
    let mut deadline: Option<Instant> = None;
    let mut paused = false;

    loop {
        let msg = match deadline {
            Some(at) => rx.recv_deadline(at),
            None => rx.recv().map_err(|_| RecvTimeoutError::Disconnected),
        };

        match msg {
            Ok(Control::Changed(folder)) => {
                pending.insert(folder);
                deadline = Some(Instant::now() + debounce);
            }
            Ok(Control::Pause) => {
                paused = true;
            }
            Ok(Control::Resume) => {
                paused = false;
                if !pending.is_empty() {
                    deadline = Some(Instant::now());
                }
            }
            Ok(Control::Shutdown) | Err(RecvTimeoutError::Disconnected) => break,
            Err(RecvTimeoutError::Timeout) => {
                deadline = None;
                if paused {
                    continue;
                }
                for folder in std::mem::take(&mut pending) {
                    debug!(%folder, "Folder changed");
                    let event = PickerEvent::FolderChanged { folder };
                    if events.send(event).is_err() {
                        return;
                    }
                }
            }
        }
    }

    debug!("Folder watch worker stopped");
}
