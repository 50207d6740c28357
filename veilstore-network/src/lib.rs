//! Veilstore peer transport
//!
//! The wire protocol and its two request/response flows:
//! - the upload handshake (approval, share transfer, result, bounded
//!   retries), and
//! - the private-lookup handshake (name list, encrypted selector,
//!   accumulated ciphertext response).
//!
//! The server side runs one semaphore-bounded accept loop per node; the
//! client side treats every per-peer failure as recoverable.

pub mod client;
pub mod error;
pub mod framing;
pub mod protocol;
pub mod retry;
pub mod server;

pub use client::PeerClient;
pub use error::{NetworkError, Result};
pub use protocol::{share_name, Message};
pub use retry::RetryPolicy;
pub use server::{PeerServer, ServerHandle};

use std::time::Duration;

/// Default bound on upload approval/result attempts
pub const MAX_UPLOAD_TRIES: u32 = 4;

/// Transport tuning, injected by the node configuration
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Dial timeout for outbound connections
    pub connect_timeout: Duration,
    /// Per-read timeout on every socket
    pub read_timeout: Duration,
    /// Upper bound on one frame's size
    pub max_frame_length: usize,
    /// Concurrent inbound connection limit
    pub max_connections: usize,
    /// Attempt budget for the upload flow
    pub upload_retries: u32,
    /// Delay between upload attempts
    pub retry_backoff: Duration,
    /// Bound on draining in-flight connections at shutdown
    pub drain_timeout: Duration,
    /// Share size in bytes; must match the peers' stores
    pub block_size: usize,
    /// Private-lookup sub-chunk size; must divide `block_size`
    pub sub_chunk_size: usize,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(5),
            read_timeout: Duration::from_secs(10),
            max_frame_length: 32 * 1024 * 1024,
            max_connections: 64,
            upload_retries: MAX_UPLOAD_TRIES,
            retry_backoff: Duration::from_millis(100),
            drain_timeout: Duration::from_secs(5),
            block_size: veilstore_core::DEFAULT_BLOCK_SIZE,
            sub_chunk_size: veilstore_core::DEFAULT_SUB_CHUNK_SIZE,
        }
    }
}
