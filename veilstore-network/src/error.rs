//! Network error types

use thiserror::Error;
use veilstore_core::VeilstoreError;

/// Result type alias for transport operations
pub type Result<T> = std::result::Result<T, NetworkError>;

/// Errors raised by the wire protocol and its flows.
///
/// Everything here is recoverable per peer: callers log and advance to
/// the next candidate rather than aborting the whole workflow.
#[derive(Error, Debug)]
pub enum NetworkError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Timed out waiting for {operation}")]
    Timeout { operation: &'static str },

    #[error("Connection closed by peer")]
    ConnectionClosed,

    #[error("Malformed frame: {0}")]
    MalformedFrame(String),

    #[error("Unexpected message: expected {expected}, got {got}")]
    UnexpectedMessage {
        expected: &'static str,
        got: &'static str,
    },

    #[error("Upload denied by peer")]
    UploadDenied,

    #[error("Upload rejected by peer store")]
    UploadFailed,

    #[error("Retries exhausted after {attempts} attempts")]
    RetriesExhausted { attempts: u32 },

    #[error("Query rejected by peer: {0}")]
    QueryRejected(String),

    #[error(transparent)]
    Crypto(#[from] VeilstoreError),
}
