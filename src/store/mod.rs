//! Incremental databag store.
//!
//! Tracks one compiled partial model per source file. Every filesystem
//! event mutates the table (recompile on create/modify, drop on
//! delete/move), then the global model is rebuilt from scratch from the
//! surviving partials and handed to the publisher. Rebuilding instead of
//! patching keeps the global view independent of event ordering.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::config::ListenerSettings;
use crate::databag::Databag;
use crate::errors::Result;
use crate::model::{merge_configs, Config};
use crate::translator;
use crate::watcher::{EventKind, WatchEvent};
use crate::xds::SnapshotPublisher;

pub struct ConfigStore {
    path_configs: BTreeMap<PathBuf, Config>,
    listeners: ListenerSettings,
    publisher: SnapshotPublisher,
}

/// Enumerate every file under `root` with an explicit worklist.
fn collect_files(root: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    let mut pending = vec![root.to_path_buf()];

    while let Some(dir) = pending.pop() {
        for entry in fs::read_dir(&dir)? {
            let entry = entry?;
            let path = entry.path();
            if entry.file_type()?.is_dir() {
                pending.push(path);
            } else {
                files.push(path);
            }
        }
    }

    files.sort();
    Ok(files)
}

impl ConfigStore {
    pub fn new(listeners: ListenerSettings, publisher: SnapshotPublisher) -> Self {
        Self { path_configs: BTreeMap::new(), listeners, publisher }
    }

    pub fn tracked_files(&self) -> usize {
        self.path_configs.len()
    }

    /// Apply one filesystem event and republish. Returns the snapshot
    /// version installed for it.
    pub fn apply(&mut self, event: &WatchEvent) -> Result<u64> {
        match event.kind {
            EventKind::Delete | EventKind::Move => self.remove_path(&event.path),
            EventKind::Create | EventKind::Modify => self.compile_path(&event.path, event.kind)?,
        }
        self.republish()
    }

    /// Drop every tracked file and publish the resulting empty topology.
    pub fn clear(&mut self) -> Result<u64> {
        self.path_configs.clear();
        self.republish()
    }

    /// Remove the exact entry, or the whole subtree when the path was a
    /// directory (its entries are keyed by the files underneath it).
    fn remove_path(&mut self, path: &Path) {
        if self.path_configs.remove(path).is_some() {
            info!(path = %path.display(), "databag removed");
            return;
        }

        let before = self.path_configs.len();
        self.path_configs.retain(|key, _| !key.starts_with(path));
        let removed = before - self.path_configs.len();
        if removed > 0 {
            info!(path = %path.display(), removed, "databag directory removed");
        }
    }

    fn compile_path(&mut self, path: &Path, kind: EventKind) -> Result<()> {
        let files = if path.is_dir() { collect_files(path)? } else { vec![path.to_path_buf()] };

        for file in files {
            self.compile_file(&file, kind);
        }
        Ok(())
    }

    /// Recompile one file. A file that fails to parse or translate keeps
    /// no entry: its previous partial must not outlive its contents.
    fn compile_file(&mut self, path: &Path, kind: EventKind) {
        if kind == EventKind::Modify {
            self.path_configs.remove(path);
        }

        let bag = match Databag::from_file(path) {
            Ok(bag) => bag,
            Err(err) => {
                warn!(path = %path.display(), error = %err, "skipping unreadable databag");
                return;
            }
        };

        match translator::translate(std::slice::from_ref(&bag), &self.listeners) {
            Ok(partial) => {
                info!(path = %path.display(), id = %bag.id, "databag compiled");
                self.path_configs.insert(path.to_path_buf(), partial);
            }
            Err(err) => {
                warn!(path = %path.display(), error = %err, "skipping invalid databag");
            }
        }
    }

    fn republish(&mut self) -> Result<u64> {
        let merged = merge_configs(&self.path_configs, &self.listeners)?;
        self.publisher.publish(&merged)
    }
}
