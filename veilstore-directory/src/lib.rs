//! Peer directory for Veilstore nodes
//!
//! A flat, locally merged table mapping peer identities to network
//! addresses. This is deliberately not a routed DHT: entries arrive from
//! bootstrap lists and directory merges, and are never silently
//! overwritten once stored.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;

/// Identity and network address of one peer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerInfo {
    /// Unique peer identifier
    pub peer_id: String,
    /// Hostname or IP address
    pub host: String,
    /// Listener port
    pub port: u16,
    /// When this entry was inserted locally
    pub added_at: DateTime<Utc>,
}

impl PeerInfo {
    /// Create a new entry stamped with the current time
    pub fn new(peer_id: impl Into<String>, host: impl Into<String>, port: u16) -> Self {
        Self {
            peer_id: peer_id.into(),
            host: host.into(),
            port,
            added_at: Utc::now(),
        }
    }

    /// `host:port` form suitable for dialing
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Thread-safe mapping of peer id to peer info.
///
/// `add` is insert-if-absent and `merge` never overwrites local entries;
/// a stored entry changes only through explicit removal.
#[derive(Debug, Default)]
pub struct PeerDirectory {
    peers: RwLock<HashMap<String, PeerInfo>>,
}

impl PeerDirectory {
    /// Create an empty directory
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a peer if its id is not already present.
    ///
    /// Returns `true` when inserted, `false` when the id already exists
    /// (the existing entry is left untouched).
    pub fn add(&self, peer_id: impl Into<String>, host: impl Into<String>, port: u16) -> bool {
        let info = PeerInfo::new(peer_id, host, port);
        self.insert(info)
    }

    /// Insert a prebuilt entry if its id is not already present
    pub fn insert(&self, info: PeerInfo) -> bool {
        let mut peers = self.peers.write();
        if peers.contains_key(&info.peer_id) {
            return false;
        }
        peers.insert(info.peer_id.clone(), info);
        true
    }

    /// Union another directory's entries into this one.
    ///
    /// Ids already known locally keep their local data; conflicts are
    /// logged, not treated as errors.
    pub fn merge(&self, entries: impl IntoIterator<Item = PeerInfo>) {
        let mut peers = self.peers.write();
        for info in entries {
            if peers.contains_key(&info.peer_id) {
                debug!(peer_id = %info.peer_id, "peer already in directory, keeping local entry");
            } else {
                peers.insert(info.peer_id.clone(), info);
            }
        }
    }

    /// Remove a peer by id; returns the removed entry if it existed
    pub fn remove(&self, peer_id: &str) -> Option<PeerInfo> {
        self.peers.write().remove(peer_id)
    }

    /// Look up one peer by id
    pub fn get(&self, peer_id: &str) -> Option<PeerInfo> {
        self.peers.read().get(peer_id).cloned()
    }

    /// Whether a peer id is known
    pub fn contains(&self, peer_id: &str) -> bool {
        self.peers.read().contains_key(peer_id)
    }

    /// Number of known peers
    pub fn len(&self) -> usize {
        self.peers.read().len()
    }

    /// Whether the directory is empty
    pub fn is_empty(&self) -> bool {
        self.peers.read().is_empty()
    }

    /// A read-only copy of all entries, sorted by peer id.
    ///
    /// Safe to iterate while the directory is mutated elsewhere; upload
    /// and download walk this fixed order.
    pub fn snapshot(&self) -> Vec<PeerInfo> {
        let mut entries: Vec<PeerInfo> = self.peers.read().values().cloned().collect();
        entries.sort_by(|a, b| a.peer_id.cmp(&b.peer_id));
        entries
    }
}
