//! OverlayBootstrapper: loads and persists a JSON snapshot of contact nodes
//! used to seed the routing table and fresh lookups (spec.md §3, §4.1.1,
//! §4.1.2, §7).

use crate::error::DhtResult;
use crate::identifier::NodeId;
use crate::node::Node;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

#[derive(Debug, Serialize, Deserialize)]
struct SnapshotEntry {
    addr: SocketAddr,
    id: NodeId,
}

/// Owns the bootstrap snapshot file and hands out fallback contacts when the
/// routing table is empty.
pub struct OverlayBootstrapper {
    path: PathBuf,
    contacts: Vec<Node>,
}

impl OverlayBootstrapper {
    /// Load the snapshot at `path`. A missing file is not an error — the
    /// node simply starts with no fallback contacts (spec.md §7).
    pub fn load(path: PathBuf) -> DhtResult<Self> {
        let contacts = match std::fs::read_to_string(&path) {
            Ok(body) => {
                let entries: Vec<SnapshotEntry> = serde_json::from_str(&body)?;
                entries
                    .into_iter()
                    .map(|e| Node::new(e.addr, e.id))
                    .collect()
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!("no bootstrap snapshot at {:?}, starting empty", path);
                Vec::new()
            }
            Err(e) => return Err(e.into()),
        };
        Ok(OverlayBootstrapper { path, contacts })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The fallback contacts a fresh lookup seeds from when the routing
    /// table has nothing closer to offer (spec.md §4.1.2).
    pub fn fallback_contacts(&self) -> Vec<Node> {
        self.contacts.clone()
    }

    /// Replace the snapshot with the routing table's current known-good
    /// contacts, to be persisted on the next `save_to_file`.
    pub fn remember(&mut self, contacts: Vec<Node>) {
        self.contacts = contacts;
    }

    /// Persist the snapshot. Failures are logged, not propagated — losing
    /// the snapshot on shutdown degrades the next boot's bootstrap speed,
    /// it does not corrupt anything (spec.md §7).
    pub fn save_to_file(&self) {
        let entries: Vec<SnapshotEntry> = self
            .contacts
            .iter()
            .map(|n| SnapshotEntry { addr: n.addr, id: n.id })
            .collect();
        match serde_json::to_string_pretty(&entries) {
            Ok(body) => {
                if let Err(e) = std::fs::write(&self.path, body) {
                    tracing::warn!("failed to write bootstrap snapshot to {:?}: {}", self.path, e);
                }
            }
            Err(e) => tracing::warn!("failed to serialize bootstrap snapshot: {}", e),
        }
    }
}
