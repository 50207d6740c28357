//! Veilstore Core Library
//!
//! Core abstractions for the Veilstore private storage network:
//! - Reed-Solomon erasure coding of files into `(n, k)` shares
//! - Paillier additively homomorphic encryption for private lookups
//! - The `AsymmetricKeyPair` / `EncryptionCodec` capability seams
//! - Common types and error handling

pub mod crypto;
pub mod erasure;
pub mod error;

pub use crypto::{
    AsymmetricKeyPair, Ciphertext, EncryptionCodec, KeyMaterial, PaillierKeyPair,
    PaillierPublicKey,
};
pub use erasure::{ErasureCoder, Share, MAX_TOTAL_SHARES};
pub use error::{Result, VeilstoreError};

/// Default file block size in bytes; overridable per node via config
pub const DEFAULT_BLOCK_SIZE: usize = 1024;

/// Default private-lookup sub-chunk size in bytes.
///
/// Each stored share is processed in sub-chunks of this size; the integer
/// value of a sub-chunk must stay below the Paillier modulus, so
/// `sub_chunk_size * 8` must be strictly less than the key size in bits.
pub const DEFAULT_SUB_CHUNK_SIZE: usize = 128;

/// Default Paillier modulus size in bits
pub const DEFAULT_KEY_BITS: u64 = 2048;
