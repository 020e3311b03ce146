//! Shared xDS server state.
//!
//! Holds the current resource snapshot behind a lock together with a
//! monotonically increasing version counter. A snapshot is replaced as a
//! whole, never patched, so ADS streams always observe a consistent set
//! of collections under a single version.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;

use tokio::sync::broadcast;
use tracing::debug;

use crate::xds::resources::BuiltResource;

#[derive(Debug)]
pub struct XdsState {
    pub node_id: String,
    version: AtomicU64,
    snapshot: RwLock<HashMap<String, Vec<BuiltResource>>>,
    update_tx: broadcast::Sender<u64>,
}

impl XdsState {
    pub fn new(node_id: impl Into<String>) -> Self {
        let (update_tx, _) = broadcast::channel(128);
        Self {
            node_id: node_id.into(),
            version: AtomicU64::new(0),
            snapshot: RwLock::new(HashMap::new()),
            update_tx,
        }
    }

    pub fn get_version(&self) -> u64 {
        self.version.load(Ordering::Relaxed)
    }

    pub fn version_info(&self) -> String {
        self.get_version().to_string()
    }

    /// Replace the whole snapshot, bump the version and notify streams.
    ///
    /// Every type URL is swapped in one critical section; a reader never
    /// sees listeners from one publish and clusters from another.
    pub fn set_snapshot(&self, resources: HashMap<String, Vec<BuiltResource>>) -> u64 {
        let new_version = {
            let mut snapshot = self.snapshot.write().expect("snapshot lock poisoned");
            *snapshot = resources;
            self.version.fetch_add(1, Ordering::Relaxed) + 1
        };

        debug!(version = new_version, "snapshot replaced");
        // No receivers means no Envoy connected yet; that is fine.
        let _ = self.update_tx.send(new_version);
        new_version
    }

    pub fn resources_for(&self, type_url: &str) -> Vec<BuiltResource> {
        let snapshot = self.snapshot.read().expect("snapshot lock poisoned");
        snapshot.get(type_url).cloned().unwrap_or_default()
    }

    pub fn subscribe_updates(&self) -> broadcast::Receiver<u64> {
        self.update_tx.subscribe()
    }
}
