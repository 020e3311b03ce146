//! Filesystem watcher for the databag directory.
//!
//! Bridges notify's callback thread into a tokio channel so the store can
//! consume changes serially from the async event loop. Events are
//! normalized to the four kinds the store distinguishes; everything else
//! (access notifications, metadata churn) is dropped at the source.

use std::path::{Path, PathBuf};

use notify::event::{ModifyKind, RenameMode};
use notify::{EventKind as NotifyKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;

use crate::errors::{Error, Result};

/// What happened to a watched path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Create,
    Modify,
    /// A rename; the path is the old name and may no longer exist.
    Move,
    Delete,
}

/// One normalized change under the databag directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchEvent {
    pub kind: EventKind,
    pub path: PathBuf,
}

impl WatchEvent {
    pub fn new(kind: EventKind, path: impl Into<PathBuf>) -> Self {
        Self { kind, path: path.into() }
    }
}

/// Flatten one raw notify event into normalized events.
///
/// Renames need per-path handling: the old name is a removal but the new
/// name carries fresh content to compile (a file renamed into the tree,
/// or an atomic save overwriting a tracked path, arrives as `To`).
fn normalize(event: notify::Event) -> Vec<WatchEvent> {
    let kind = match event.kind {
        NotifyKind::Create(_) => EventKind::Create,
        NotifyKind::Modify(ModifyKind::Name(RenameMode::To)) => EventKind::Create,
        NotifyKind::Modify(ModifyKind::Name(RenameMode::Both)) => {
            // paths[0] is the old name, paths[1] the new one.
            let mut paths = event.paths.into_iter();
            let mut events = Vec::with_capacity(2);
            if let Some(from) = paths.next() {
                events.push(WatchEvent::new(EventKind::Move, from));
            }
            if let Some(to) = paths.next() {
                events.push(WatchEvent::new(EventKind::Create, to));
            }
            return events;
        }
        NotifyKind::Modify(ModifyKind::Name(_)) => EventKind::Move,
        NotifyKind::Modify(_) => EventKind::Modify,
        NotifyKind::Remove(_) => EventKind::Delete,
        _ => return Vec::new(),
    };
    event.paths.into_iter().map(|path| WatchEvent::new(kind, path)).collect()
}

/// Watches one directory tree and forwards normalized events.
pub struct DirectoryWatcher {
    directory: PathBuf,
    event_tx: mpsc::UnboundedSender<WatchEvent>,
}

impl DirectoryWatcher {
    /// Create a watcher for `directory` and the receiving half the event
    /// loop consumes.
    pub fn new(directory: &Path) -> (Self, mpsc::UnboundedReceiver<WatchEvent>) {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        (Self { directory: directory.to_path_buf(), event_tx }, event_rx)
    }

    /// Start watching recursively.
    ///
    /// The returned handle owns the notify backend; dropping it stops the
    /// watch, so the caller keeps it alive for the process lifetime.
    pub fn run(self) -> Result<RecommendedWatcher> {
        let tx = self.event_tx.clone();

        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<notify::Event>| match res {
                Ok(event) => {
                    for event in normalize(event) {
                        // Receiver gone means shutdown is in progress.
                        let _ = tx.send(event);
                    }
                }
                Err(err) => tracing::error!(error = %err, "filesystem watch error"),
            },
            notify::Config::default(),
        )
        .map_err(|err| Error::config(format!("failed to create watcher: {err}")))?;

        watcher
            .watch(&self.directory, RecursiveMode::Recursive)
            .map_err(|err| {
                Error::config(format!("failed to watch {}: {err}", self.directory.display()))
            })?;

        tracing::info!(directory = %self.directory.display(), "databag watcher started");
        Ok(watcher)
    }
}
