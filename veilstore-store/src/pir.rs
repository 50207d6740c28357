//! Private-lookup query engine
//!
//! Answers "fetch the share at position `i`" without learning `i`. The
//! requester sends one opaque ciphertext per stored share, encoding a
//! one-hot vector (or an all-zero vector when the target is absent) under
//! its own key. For every sub-chunk of the share size the engine computes
//!
//! ```text
//! acc[c] = PROD_p selector[p] ^ int(share[p].chunk[c])   (mod n^2)
//! ```
//!
//! i.e. scalar-multiplies each opaque selector ciphertext by the known
//! plaintext sub-chunk value and folds the results with homomorphic
//! addition. If the selector is one-hot at `i`, `acc[c]` decrypts to
//! share `i`'s sub-chunk `c`; every other contribution cancels to the
//! additive identity. The engine never decrypts anything.

use crate::{Result, StoreError};
use bytes::Bytes;
use num_bigint::BigUint;
use num_traits::Zero;
use tracing::debug;
use veilstore_core::{Ciphertext, PaillierPublicKey};

/// An immutable view of the store taken at the start of a lookup round.
///
/// The name list handed to the requester and the shares queried against
/// are guaranteed to be the same state, regardless of concurrent uploads.
#[derive(Debug, Clone)]
pub struct StoreSnapshot {
    names: Vec<String>,
    shares: Vec<Bytes>,
    block_size: usize,
    sub_chunk_size: usize,
}

impl StoreSnapshot {
    pub(crate) fn new(
        names: Vec<String>,
        shares: Vec<Bytes>,
        block_size: usize,
        sub_chunk_size: usize,
    ) -> Self {
        debug_assert_eq!(names.len(), shares.len());
        Self {
            names,
            shares,
            block_size,
            sub_chunk_size,
        }
    }

    /// Stored names in their stable order; positions are lookup indices
    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Number of shares in this view
    pub fn share_count(&self) -> usize {
        self.shares.len()
    }

    /// Number of sub-chunks each share is processed in
    pub fn sub_chunk_count(&self) -> usize {
        self.block_size / self.sub_chunk_size
    }

    /// Run the private lookup against this snapshot.
    ///
    /// `selector` carries the requester's opaque ciphertexts, one per
    /// stored share in snapshot order. Fails with `VectorSizeMismatch`
    /// when the length differs from this snapshot's share count, and with
    /// a crypto error when a ciphertext is malformed. Returns one
    /// accumulated ciphertext per sub-chunk for the requester to decrypt
    /// locally.
    pub fn query(
        &self,
        selector: &[Vec<u8>],
        requester_key: &PaillierPublicKey,
    ) -> Result<Vec<Ciphertext>> {
        if selector.len() != self.shares.len() {
            return Err(StoreError::VectorSizeMismatch {
                expected: self.shares.len(),
                actual: selector.len(),
            });
        }

        let ciphertexts: Vec<Ciphertext> = selector
            .iter()
            .map(|bytes| requester_key.ciphertext_from_bytes(bytes))
            .collect::<veilstore_core::Result<_>>()?;

        debug!(
            shares = self.shares.len(),
            sub_chunks = self.sub_chunk_count(),
            "running private lookup"
        );

        let mut response = Vec::with_capacity(self.sub_chunk_count());
        for chunk_index in 0..self.sub_chunk_count() {
            let offset = chunk_index * self.sub_chunk_size;
            let mut acc = Ciphertext::zero();
            for (cipher, share) in ciphertexts.iter().zip(&self.shares) {
                let value =
                    BigUint::from_bytes_be(&share[offset..offset + self.sub_chunk_size]);
                // A zero sub-chunk scales to the identity; skip the modpow
                if value.is_zero() {
                    continue;
                }
                acc = acc.add(&cipher.scale(&value, requester_key), requester_key);
            }
            response.push(acc);
        }
        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{PrivateStore, StoreConfig};
    use num_traits::One;
    use veilstore_core::PaillierKeyPair;

    const BLOCK: usize = 32;
    const SUB_CHUNK: usize = 16;

    fn populated_store(shares: &[(&str, u8)]) -> PrivateStore {
        let store = PrivateStore::new(StoreConfig {
            capacity: 16,
            block_size: BLOCK,
            sub_chunk_size: SUB_CHUNK,
            uploads_enabled: true,
        })
        .unwrap();
        for &(name, fill) in shares {
            let mut data = vec![fill; BLOCK];
            // Make the two sub-chunks distinct
            data[BLOCK - 1] = fill.wrapping_add(1);
            store.add(name, Bytes::from(data)).unwrap();
        }
        store
    }

    fn one_hot_selector(keypair: &PaillierKeyPair, len: usize, hot: Option<usize>) -> Vec<Vec<u8>> {
        (0..len)
            .map(|i| {
                let bit = if Some(i) == hot {
                    BigUint::one()
                } else {
                    BigUint::zero()
                };
                keypair.encrypt(&bit).unwrap().to_bytes()
            })
            .collect()
    }

    fn decrypt_share(keypair: &PaillierKeyPair, response: &[Ciphertext]) -> Vec<u8> {
        let mut share = Vec::with_capacity(BLOCK);
        for cipher in response {
            let value = keypair.decrypt(cipher).unwrap();
            let bytes = value.to_bytes_be();
            assert!(bytes.len() <= SUB_CHUNK);
            share.extend(std::iter::repeat(0u8).take(SUB_CHUNK - bytes.len()));
            share.extend_from_slice(&bytes);
        }
        share
    }

    #[test]
    fn test_one_hot_recovers_every_position() {
        let keypair = PaillierKeyPair::generate(256).unwrap();
        let store = populated_store(&[("a_part0", 11), ("b_part0", 22), ("c_part0", 33)]);
        let snapshot = store.snapshot();

        for target in 0..snapshot.share_count() {
            let selector = one_hot_selector(&keypair, snapshot.share_count(), Some(target));
            let response = snapshot.query(&selector, keypair.public_key()).unwrap();
            assert_eq!(response.len(), snapshot.sub_chunk_count());

            let recovered = decrypt_share(&keypair, &response);
            let name = &snapshot.names()[target];
            let expected = store.snapshot().shares[target].to_vec();
            assert_eq!(recovered, expected, "mismatch recovering {name}");
        }
    }

    #[test]
    fn test_all_zero_selector_yields_zeros() {
        let keypair = PaillierKeyPair::generate(256).unwrap();
        let store = populated_store(&[("a_part0", 5), ("b_part0", 6)]);
        let snapshot = store.snapshot();

        let selector = one_hot_selector(&keypair, snapshot.share_count(), None);
        let response = snapshot.query(&selector, keypair.public_key()).unwrap();

        let recovered = decrypt_share(&keypair, &response);
        assert!(recovered.iter().all(|&b| b == 0));
    }

    #[test]
    fn test_vector_size_mismatch_rejected() {
        let keypair = PaillierKeyPair::generate(256).unwrap();
        let store = populated_store(&[("a_part0", 1), ("b_part0", 2)]);
        let snapshot = store.snapshot();

        for wrong_len in [0, 1, 3, 7] {
            let selector = one_hot_selector(&keypair, wrong_len, None);
            let result = snapshot.query(&selector, keypair.public_key());
            if wrong_len == snapshot.share_count() {
                assert!(result.is_ok());
            } else {
                assert!(matches!(
                    result,
                    Err(StoreError::VectorSizeMismatch { expected: 2, .. })
                ));
            }
        }
    }

    #[test]
    fn test_malformed_ciphertext_rejected() {
        let keypair = PaillierKeyPair::generate(256).unwrap();
        let store = populated_store(&[("a_part0", 1)]);
        let snapshot = store.snapshot();

        let selector = vec![vec![0u8; 4]];
        assert!(matches!(
            snapshot.query(&selector, keypair.public_key()),
            Err(StoreError::Crypto(_))
        ));
    }

    #[test]
    fn test_query_against_stale_snapshot_still_consistent() {
        // A round that listed before a concurrent upload keeps querying
        // the pre-upload state instead of failing on drift.
        let keypair = PaillierKeyPair::generate(256).unwrap();
        let store = populated_store(&[("a_part0", 9)]);
        let snapshot = store.snapshot();

        store.add("b_part0", Bytes::from(vec![7u8; BLOCK])).unwrap();

        let selector = one_hot_selector(&keypair, 1, Some(0));
        let response = snapshot.query(&selector, keypair.public_key()).unwrap();
        let recovered = decrypt_share(&keypair, &response);
        assert_eq!(recovered[0], 9);
    }

    #[test]
    fn test_empty_store_round_completes() {
        let store = PrivateStore::new(StoreConfig {
            capacity: 4,
            block_size: BLOCK,
            sub_chunk_size: SUB_CHUNK,
            uploads_enabled: true,
        })
        .unwrap();
        let keypair = PaillierKeyPair::generate(256).unwrap();
        let snapshot = store.snapshot();

        let response = snapshot.query(&[], keypair.public_key()).unwrap();
        assert_eq!(response.len(), snapshot.sub_chunk_count());
        let recovered = decrypt_share(&keypair, &response);
        assert!(recovered.iter().all(|&b| b == 0));
    }
}
