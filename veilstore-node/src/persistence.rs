//! Persistence seam for node state
//!
//! The core deliberately persists nothing; a node holds its keypair,
//! directory and upload ledger in memory only. Embedders that want
//! restarts to keep identity and contacts implement [`NodePersistence`]
//! and shuttle a [`PersistedState`] in and out around the node's
//! lifecycle.

use crate::node::{FileDescriptor, Node};
use serde::{Deserialize, Serialize};
use veilstore_core::KeyMaterial;
use veilstore_directory::PeerInfo;

/// Snapshot of the state worth carrying across restarts
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistedState {
    /// Exported Paillier key material (contains the private half)
    pub key_material: KeyMaterial,
    /// Known peers at snapshot time
    pub peers: Vec<PeerInfo>,
    /// Descriptors of files this node has uploaded
    pub uploads: Vec<FileDescriptor>,
}

/// Storage collaborator for node state.
///
/// Implementations own the medium and its failure modes; the node never
/// touches disk itself.
pub trait NodePersistence {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Load previously stored state, if any
    fn load(&self) -> Result<Option<PersistedState>, Self::Error>;

    /// Store the given state, replacing any previous snapshot
    fn store(&self, state: &PersistedState) -> Result<(), Self::Error>;
}

impl Node {
    /// Capture the state a persistence collaborator should store
    pub fn persisted_state(&self) -> PersistedState {
        PersistedState {
            key_material: self.key_material(),
            peers: self.directory().snapshot(),
            uploads: self.uploaded_files(),
        }
    }

    /// Restore directory entries and the upload ledger from a snapshot.
    ///
    /// The keypair is not restored here; pass
    /// `PaillierKeyPair::from_material` to [`Node::with_keypair`] when
    /// constructing the node.
    pub fn restore(&self, state: PersistedState) {
        self.merge_directory(state.peers);
        self.restore_ledger(state.uploads);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::NodeConfig;
    use parking_lot::Mutex;
    use std::convert::Infallible;
    use veilstore_core::PaillierKeyPair;

    struct MemoryPersistence {
        slot: Mutex<Option<PersistedState>>,
    }

    impl NodePersistence for MemoryPersistence {
        type Error = Infallible;

        fn load(&self) -> Result<Option<PersistedState>, Infallible> {
            Ok(self.slot.lock().clone())
        }

        fn store(&self, state: &PersistedState) -> Result<(), Infallible> {
            *self.slot.lock() = Some(state.clone());
            Ok(())
        }
    }

    fn test_config() -> NodeConfig {
        let mut config = NodeConfig::default();
        config.crypto.key_bits = 128;
        config.storage.block_size = 64;
        config.storage.sub_chunk_size = 8;
        config
    }

    #[test]
    fn test_state_survives_a_restart() {
        let node = Node::new(test_config()).unwrap();
        node.add_peer("peer-a", "127.0.0.1", 7000);

        let persistence = MemoryPersistence {
            slot: Mutex::new(None),
        };
        persistence.store(&node.persisted_state()).unwrap();

        let state = persistence.load().unwrap().unwrap();
        let keypair = PaillierKeyPair::from_material(&state.key_material).unwrap();
        let restored = Node::with_keypair(test_config(), keypair).unwrap();
        restored.restore(state);

        assert!(restored.directory().contains("peer-a"));
        assert_eq!(restored.public_key_bytes(), node.public_key_bytes());
    }
}
