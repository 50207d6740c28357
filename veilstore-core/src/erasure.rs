//! Reed-Solomon erasure coding for file shares
//!
//! A file is divided into `k` data blocks of `block_size` bytes (the last
//! block zero-padded) and encoded into `n >= k` shares. Any `k` distinct
//! shares reconstruct the original buffer byte-for-byte.
//!
//! The caller supplies `n`; `k` is derived as `ceil(len / block_size)`.

use crate::error::{Result, VeilstoreError};
use bytes::Bytes;
use reed_solomon_erasure::galois_8::ReedSolomon;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Maximum total shares supported by the GF(2^8) codec
pub const MAX_TOTAL_SHARES: usize = 256;

/// A single erasure-coded share of a file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Share {
    /// Positional index (0 to n-1), required for decode
    pub index: u32,
    /// Share payload, exactly `block_size` bytes
    pub data: Bytes,
}

impl Share {
    /// Create a new share
    pub fn new(index: u32, data: Bytes) -> Self {
        Self { index, data }
    }

    /// Get share size
    pub fn size(&self) -> usize {
        self.data.len()
    }
}

/// Stateless erasure encoder/decoder
///
/// `(n, k)` vary per file, so the Reed-Solomon matrix is built per call.
pub struct ErasureCoder;

impl ErasureCoder {
    /// Divide `data` into `n` shares of `block_size` bytes each.
    ///
    /// Returns the shares together with `k`, the minimum number of shares
    /// needed to reconstruct. Encoding is deterministic for a given
    /// `(data, block_size, n)`.
    pub fn divide(data: &[u8], block_size: usize, n: usize) -> Result<(Vec<Share>, usize)> {
        if block_size == 0 {
            return Err(VeilstoreError::Configuration(
                "block_size must be > 0".to_string(),
            ));
        }
        if data.is_empty() {
            return Err(VeilstoreError::Configuration(
                "cannot divide an empty buffer".to_string(),
            ));
        }

        let k = data.len().div_ceil(block_size);
        if n < k {
            return Err(VeilstoreError::Configuration(format!(
                "n ({n}) must be >= k ({k})"
            )));
        }
        if n > MAX_TOTAL_SHARES {
            return Err(VeilstoreError::TooManyShares {
                requested: n,
                max: MAX_TOTAL_SHARES,
            });
        }

        // Split into k blocks, zero-padding the last one
        let mut blocks: Vec<Vec<u8>> = data.chunks(block_size).map(|c| c.to_vec()).collect();
        if let Some(last) = blocks.last_mut() {
            last.resize(block_size, 0);
        }

        // n == k carries no parity; the shares are the data blocks themselves
        if n > k {
            let encoder = ReedSolomon::new(k, n - k)?;
            for _ in 0..(n - k) {
                blocks.push(vec![0u8; block_size]);
            }
            encoder.encode(&mut blocks)?;
        }

        let shares = blocks
            .into_iter()
            .enumerate()
            .map(|(i, block)| Share::new(i as u32, Bytes::from(block)))
            .collect();

        Ok((shares, k))
    }

    /// Reconstruct the original buffer from any `k` of the `n` shares.
    ///
    /// Shares with an out-of-range index or an inconsistent size are
    /// ignored. Fails with `InsufficientShares` when fewer than `k` valid
    /// shares remain. The output is truncated to `original_size`; the
    /// caller must track and supply it, otherwise trailing zero-padding
    /// would leak into the result.
    pub fn combine(
        shares: &BTreeMap<u32, Bytes>,
        n: usize,
        k: usize,
        original_size: usize,
    ) -> Result<Bytes> {
        if k == 0 || n < k {
            return Err(VeilstoreError::Configuration(format!(
                "invalid share counts: n={n}, k={k}"
            )));
        }
        if n > MAX_TOTAL_SHARES {
            return Err(VeilstoreError::TooManyShares {
                requested: n,
                max: MAX_TOTAL_SHARES,
            });
        }

        let block_size = shares
            .iter()
            .find(|(index, _)| (**index as usize) < n)
            .map(|(_, data)| data.len())
            .ok_or(VeilstoreError::InsufficientShares {
                available: 0,
                required: k,
            })?;

        let mut slots: Vec<Option<Vec<u8>>> = vec![None; n];
        for (&index, data) in shares {
            if (index as usize) < n && data.len() == block_size {
                slots[index as usize] = Some(data.to_vec());
            }
        }

        let available = slots.iter().filter(|s| s.is_some()).count();
        if available < k {
            return Err(VeilstoreError::InsufficientShares {
                available,
                required: k,
            });
        }

        if n > k {
            let decoder = ReedSolomon::new(k, n - k)?;
            decoder.reconstruct(&mut slots)?;
        }

        let mut result = Vec::with_capacity(block_size * k);
        for slot in slots.iter().take(k) {
            match slot {
                Some(block) => result.extend_from_slice(block),
                None => {
                    return Err(VeilstoreError::Internal(
                        "reconstruction left a missing data block".to_string(),
                    ))
                }
            }
        }

        result.truncate(original_size);
        Ok(Bytes::from(result))
    }
}
