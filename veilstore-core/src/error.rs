//! Error types for Veilstore
//!
//! Provides a unified error type for the core erasure and crypto operations.

use thiserror::Error;

/// Result type alias for core operations
pub type Result<T> = std::result::Result<T, VeilstoreError>;

/// Unified error type for the core crate
#[derive(Error, Debug)]
pub enum VeilstoreError {
    // ===== Erasure Coding Errors =====
    #[error("Erasure coding error: {0}")]
    ErasureCoding(String),

    #[error("Insufficient shares: have {available}, need {required}")]
    InsufficientShares { available: usize, required: usize },

    #[error("Share size mismatch: expected {expected}, got {actual}")]
    ShareSizeMismatch { expected: usize, actual: usize },

    #[error("Invalid share index: {index} (max: {max})")]
    InvalidShareIndex { index: usize, max: usize },

    #[error("Too many shares requested: {requested} (max: {max})")]
    TooManyShares { requested: usize, max: usize },

    // ===== Cryptography Errors =====
    #[error("Encryption error: {0}")]
    Encryption(String),

    #[error("Decryption error: {0}")]
    Decryption(String),

    #[error("Invalid ciphertext: {0}")]
    InvalidCiphertext(String),

    #[error("Invalid public key: {0}")]
    InvalidPublicKey(String),

    // ===== Configuration Errors =====
    #[error("Configuration error: {0}")]
    Configuration(String),

    // ===== Generic Errors =====
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<reed_solomon_erasure::Error> for VeilstoreError {
    fn from(err: reed_solomon_erasure::Error) -> Self {
        VeilstoreError::ErasureCoding(err.to_string())
    }
}
