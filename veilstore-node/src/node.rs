//! Node orchestration
//!
//! A node owns a keypair, a peer directory, a private share store served
//! over the transport, and the two multi-peer workflows: `upload` divides
//! a file into `n` erasure-coded shares and places one per peer;
//! `download` privately retrieves shares peer by peer until enough are
//! recovered to reconstruct.

use crate::config::NodeConfig;
use bytes::Bytes;
use parking_lot::Mutex;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, instrument, warn};
use veilstore_core::{ErasureCoder, KeyMaterial, PaillierKeyPair, VeilstoreError};
use veilstore_directory::{PeerDirectory, PeerInfo};
use veilstore_network::{share_name, NetworkError, PeerClient, PeerServer, ServerHandle};
use veilstore_store::{PrivateStore, StoreError};

/// Result type alias for node operations
pub type Result<T> = std::result::Result<T, NodeError>;

/// Errors surfaced by the node workflows
#[derive(Error, Debug)]
pub enum NodeError {
    #[error("Not enough peers: have {available}, need {required}")]
    InsufficientPeers { available: usize, required: usize },

    #[error("Upload incomplete: placed {placed} of {total} shares")]
    UploadIncomplete { placed: usize, total: usize },

    #[error("Listener already running")]
    AlreadyRunning,

    #[error(transparent)]
    Core(#[from] VeilstoreError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Network(#[from] NetworkError),
}

/// Client-side description of an uploaded file.
///
/// Ephemeral: the node keeps a ledger of descriptors it produced, but
/// nothing is persisted by the core. `original_size` is mandatory;
/// without it a reconstruction would carry trailing zero-padding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileDescriptor {
    /// File name, the stem of every share name
    pub name: String,
    /// Total shares produced
    pub n: usize,
    /// Minimum shares needed to reconstruct
    pub k: usize,
    /// Share block size in bytes
    pub block_size: usize,
    /// Exact byte length of the original file
    pub original_size: usize,
}

/// One peer in the Veilstore network
pub struct Node {
    config: NodeConfig,
    keypair: Arc<PaillierKeyPair>,
    directory: Arc<PeerDirectory>,
    store: Arc<PrivateStore>,
    client: PeerClient,
    server: Mutex<Option<ServerHandle>>,
    ledger: Mutex<Vec<FileDescriptor>>,
}

impl Node {
    /// Create a node with a freshly generated keypair
    pub fn new(config: NodeConfig) -> Result<Self> {
        let keypair = PaillierKeyPair::generate(config.crypto.key_bits)?;
        Self::with_keypair(config, keypair)
    }

    /// Create a node around an existing keypair (e.g. one recovered
    /// through a persistence collaborator)
    pub fn with_keypair(config: NodeConfig, keypair: PaillierKeyPair) -> Result<Self> {
        let store = Arc::new(PrivateStore::new(config.store_config())?);
        let directory = Arc::new(PeerDirectory::new());
        for peer in &config.peers {
            directory.add(peer.peer_id.clone(), peer.host.clone(), peer.port);
        }
        let client = PeerClient::new(config.transport_config());
        Ok(Self {
            config,
            keypair: Arc::new(keypair),
            directory,
            store,
            client,
            server: Mutex::new(None),
            ledger: Mutex::new(Vec::new()),
        })
    }

    /// This node's peer id
    pub fn peer_id(&self) -> &str {
        &self.config.node.peer_id
    }

    /// The node's public key, exported for out-of-band exchange
    pub fn public_key_bytes(&self) -> Vec<u8> {
        self.keypair.public_key().to_bytes()
    }

    /// The peer directory
    pub fn directory(&self) -> &PeerDirectory {
        &self.directory
    }

    /// The local share store
    pub fn store(&self) -> &PrivateStore {
        &self.store
    }

    /// Names of shares held locally for other peers
    pub fn local_files(&self) -> Vec<String> {
        self.store.list_names()
    }

    /// Descriptors of files this node has uploaded
    pub fn uploaded_files(&self) -> Vec<FileDescriptor> {
        self.ledger.lock().clone()
    }

    /// Export the keypair for a persistence collaborator
    pub fn key_material(&self) -> KeyMaterial {
        self.keypair.to_material()
    }

    pub(crate) fn restore_ledger(&self, descriptors: Vec<FileDescriptor>) {
        self.ledger.lock().extend(descriptors);
    }

    /// Add one peer to the directory; no-op if the id is known
    pub fn add_peer(
        &self,
        peer_id: impl Into<String>,
        host: impl Into<String>,
        port: u16,
    ) -> bool {
        self.directory.add(peer_id, host, port)
    }

    /// Merge another directory's entries, keeping local data on conflict
    pub fn merge_directory(&self, entries: impl IntoIterator<Item = PeerInfo>) {
        self.directory.merge(entries);
    }

    /// Start the listener serving this node's store
    pub async fn start(&self) -> Result<SocketAddr> {
        if self.server.lock().is_some() {
            return Err(NodeError::AlreadyRunning);
        }
        let handle = PeerServer::new(self.store.clone(), self.config.transport_config())
            .bind(&self.config.listen_address())
            .await?;
        let local_addr = handle.local_addr();
        info!(peer_id = %self.peer_id(), %local_addr, "node listening");
        *self.server.lock() = Some(handle);
        Ok(local_addr)
    }

    /// Stop accepting connections and drain in-flight work
    pub async fn shutdown(&self) {
        let handle = self.server.lock().take();
        if let Some(handle) = handle {
            handle.shutdown().await;
            info!(peer_id = %self.peer_id(), "node stopped");
        }
    }

    /// Upload a file to the network.
    ///
    /// Divides it into `n = max(1, round(share_factor * len / block_size))`
    /// shares and places `"<name>_part<i>"` on one peer each, walking the
    /// directory snapshot in its fixed order. Fails fast when the
    /// directory holds fewer than `n * safety_margin` candidates, and
    /// with `UploadIncomplete` when candidates exhaust before `n`
    /// placements succeed.
    #[instrument(skip(self, data), fields(peer_id = %self.peer_id(), size = data.len()))]
    pub async fn upload(&self, name: &str, data: Bytes) -> Result<FileDescriptor> {
        let block_size = self.config.storage.block_size;
        let factor = self.config.transfer.share_factor;
        let n = ((factor * data.len() as f64 / block_size as f64).round() as usize).max(1);
        let (shares, k) = ErasureCoder::divide(&data, block_size, n)?;

        let peers = self.directory.snapshot();
        let required = n * self.config.transfer.safety_margin;
        if peers.len() < required {
            return Err(NodeError::InsufficientPeers {
                available: peers.len(),
                required,
            });
        }

        let mut placed = 0;
        for peer in &peers {
            if placed == n {
                break;
            }
            let share = &shares[placed];
            let part_name = share_name(name, share.index);
            match self
                .client
                .upload_share(&peer.address(), &part_name, share.data.clone())
                .await
            {
                Ok(()) => {
                    debug!(peer_id = %peer.peer_id, part = share.index, "share placed");
                    placed += 1;
                }
                Err(e) => {
                    warn!(peer_id = %peer.peer_id, error = %e, "upload failed, trying next peer");
                }
            }
        }

        if placed < n {
            return Err(NodeError::UploadIncomplete { placed, total: n });
        }

        let descriptor = FileDescriptor {
            name: name.to_string(),
            n,
            k,
            block_size,
            original_size: data.len(),
        };
        info!(n, k, "file uploaded");
        self.ledger.lock().push(descriptor.clone());
        Ok(descriptor)
    }

    /// Download and reconstruct a previously uploaded file.
    ///
    /// Walks the directory running the private-lookup flow per peer,
    /// collecting distinct parts until `k` plus a random security slack
    /// are recovered; the slack keeps an observer from inferring from
    /// stop-timing exactly when `k` was reached. Recovered share buffers
    /// live only in memory and drop on both the success and failure
    /// paths.
    #[instrument(skip(self, descriptor), fields(peer_id = %self.peer_id(), name = %descriptor.name))]
    pub async fn download(&self, descriptor: &FileDescriptor) -> Result<Bytes> {
        let FileDescriptor { name, n, k, .. } = descriptor;
        let slack_bound = (n - k) / 2;
        let slack = if slack_bound > 0 {
            rand::thread_rng().gen_range(0..slack_bound)
        } else {
            0
        };
        let target = k + slack;
        debug!(target, slack, "collecting shares");

        let mut recovered: BTreeMap<u32, Bytes> = BTreeMap::new();
        for peer in self.directory.snapshot() {
            if recovered.len() >= target {
                break;
            }
            let wanted: Vec<u32> = (0..*n as u32)
                .filter(|part| !recovered.contains_key(part))
                .collect();
            match self
                .client
                .fetch_share(&peer.address(), self.keypair.as_ref(), name, &wanted)
                .await
            {
                Ok(Some((part, data))) => {
                    debug!(peer_id = %peer.peer_id, part, "share recovered");
                    recovered.insert(part, data);
                }
                Ok(None) => {
                    debug!(peer_id = %peer.peer_id, "peer holds no share of this file");
                }
                Err(e) => {
                    warn!(peer_id = %peer.peer_id, error = %e, "lookup failed, trying next peer");
                }
            }
        }

        let data = ErasureCoder::combine(&recovered, *n, *k, descriptor.original_size)?;
        info!(shares = recovered.len(), "file reconstructed");
        Ok(data)
    }
}
