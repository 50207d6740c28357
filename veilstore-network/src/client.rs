//! Outbound peer flows
//!
//! The requester side of the upload and private-lookup handshakes. Both
//! flows treat connection errors and timeouts as per-peer, recoverable
//! failures; the caller logs them and moves to the next candidate peer.

use crate::error::{NetworkError, Result};
use crate::framing::MessageStream;
use crate::protocol::{share_name, Message, PirQueryPayload, SharePayload};
use crate::retry::RetryPolicy;
use crate::TransportConfig;
use bytes::Bytes;
use num_bigint::BigUint;
use rayon::prelude::*;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::{debug, instrument, warn};
use veilstore_core::{AsymmetricKeyPair, PaillierPublicKey};

/// Requester-side transport for the upload and lookup flows
#[derive(Debug, Clone)]
pub struct PeerClient {
    config: TransportConfig,
}

impl PeerClient {
    /// Create a client from transport configuration
    pub fn new(config: TransportConfig) -> Self {
        Self { config }
    }

    fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.config.upload_retries, self.config.retry_backoff)
    }

    async fn connect(&self, address: &str) -> Result<MessageStream> {
        let stream = timeout(self.config.connect_timeout, TcpStream::connect(address))
            .await
            .map_err(|_| NetworkError::Timeout {
                operation: "connect",
            })??;
        Ok(MessageStream::new(stream, &self.config))
    }

    /// Run the upload flow against one peer.
    ///
    /// Requests approval (retrying ambiguous replies), streams the share,
    /// and resends it on a failed or ambiguous result, all within the
    /// configured attempt budget.
    #[instrument(skip(self, data), fields(size = data.len()))]
    pub async fn upload_share(&self, address: &str, name: &str, data: Bytes) -> Result<()> {
        let policy = self.retry_policy();
        let mut stream = self.connect(address).await?;
        stream.send(&Message::RequestUpload).await?;

        // Await approval; denial is definitive, silence is retried
        let mut approved = false;
        for attempt in policy.attempts() {
            match stream.recv().await {
                Ok(Message::UploadApproved) => {
                    approved = true;
                    break;
                }
                Ok(Message::UploadDenied) => return Err(NetworkError::UploadDenied),
                Ok(other) => {
                    debug!(attempt, got = other.token(), "ambiguous approval reply");
                }
                Err(NetworkError::Timeout { .. }) => {
                    debug!(attempt, "no approval reply yet");
                }
                Err(e) => return Err(e),
            }
            if !policy.is_last(attempt) {
                policy.pause().await;
            }
        }
        if !approved {
            return Err(NetworkError::RetriesExhausted {
                attempts: policy.max_attempts,
            });
        }

        let share = Message::ShareData(SharePayload {
            name: name.to_string(),
            data: data.to_vec(),
        });
        stream.send(&share).await?;

        for attempt in policy.attempts() {
            match stream.recv().await {
                Ok(Message::UploadedSuccess) => return Ok(()),
                Ok(Message::UploadedFailed) => {
                    debug!(attempt, "peer store rejected the share");
                }
                Ok(other) => {
                    debug!(attempt, got = other.token(), "ambiguous upload result");
                }
                Err(NetworkError::Timeout { .. }) => {
                    debug!(attempt, "no upload result yet");
                }
                Err(e) => return Err(e),
            }
            if policy.is_last(attempt) {
                break;
            }
            // Resend the same share and ask again
            policy.pause().await;
            stream.send(&share).await?;
        }
        Err(NetworkError::RetriesExhausted {
            attempts: policy.max_attempts,
        })
    }

    /// Run the private-lookup flow against one peer.
    ///
    /// Fetches the peer's name list, binary-searches it for the first
    /// still-wanted part of `stem`, and retrieves that share without the
    /// peer learning which name was selected. When no wanted part is
    /// listed, the round still runs to completion with an all-zero
    /// selector (so absence is not signalled by early termination) and
    /// resolves to `Ok(None)`.
    #[instrument(skip(self, keypair, wanted_parts))]
    pub async fn fetch_share(
        &self,
        address: &str,
        keypair: &dyn AsymmetricKeyPair,
        stem: &str,
        wanted_parts: &[u32],
    ) -> Result<Option<(u32, Bytes)>> {
        let mut stream = self.connect(address).await?;
        stream.send(&Message::RequestFile).await?;

        let names = match stream.recv().await? {
            Message::FileList(payload) => payload.names,
            other => {
                return Err(NetworkError::UnexpectedMessage {
                    expected: crate::protocol::FILE_LIST,
                    got: other.token(),
                })
            }
        };

        // Exact match over the sorted list for each part still needed
        let mut target: Option<(usize, u32)> = None;
        for &part in wanted_parts {
            if let Ok(position) = names.binary_search(&share_name(stem, part)) {
                target = Some((position, part));
                break;
            }
        }
        let hot = target.map(|(position, _)| position);

        // Element-wise encryption dominates the round; parallelize it
        let selector = (0..names.len())
            .into_par_iter()
            .map(|i| {
                let bit = BigUint::from(u64::from(Some(i) == hot));
                keypair.encrypt_value(&bit).map(|c| c.to_bytes())
            })
            .collect::<veilstore_core::Result<Vec<Vec<u8>>>>()?;

        stream
            .send(&Message::PirQuery(PirQueryPayload {
                selector,
                public_key: keypair.public_key_bytes(),
            }))
            .await?;

        let chunks = match stream.recv().await? {
            Message::PirResponse(payload) => payload.chunks,
            Message::QueryRejected(reason) => return Err(NetworkError::QueryRejected(reason)),
            other => {
                return Err(NetworkError::UnexpectedMessage {
                    expected: crate::protocol::PIR_RESPONSE,
                    got: other.token(),
                })
            }
        };

        let share = self.decrypt_share(keypair, &chunks)?;
        match target {
            Some((_, part)) => {
                debug!(part, "share recovered");
                Ok(Some((part, share)))
            }
            None => {
                // Decryption above ran anyway; discard the zeros
                debug!("no wanted share on this peer");
                Ok(None)
            }
        }
    }

    /// Decrypt the per-sub-chunk ciphertexts and reassemble one share
    fn decrypt_share(
        &self,
        keypair: &dyn AsymmetricKeyPair,
        chunks: &[Vec<u8>],
    ) -> Result<Bytes> {
        let expected = self.config.block_size / self.config.sub_chunk_size;
        if chunks.len() != expected {
            return Err(NetworkError::MalformedFrame(format!(
                "expected {expected} response chunks, got {}",
                chunks.len()
            )));
        }

        let own_key = PaillierPublicKey::from_bytes(&keypair.public_key_bytes())?;
        let mut share = Vec::with_capacity(self.config.block_size);
        for chunk in chunks {
            let value = keypair.decrypt_value(&own_key.ciphertext_from_bytes(chunk)?)?;
            let bytes = value.to_bytes_be();
            if bytes.len() > self.config.sub_chunk_size {
                warn!(len = bytes.len(), "oversized sub-chunk in response");
                return Err(NetworkError::MalformedFrame(
                    "sub-chunk exceeds the configured size".to_string(),
                ));
            }
            // Left-pad: leading zero bytes vanish in the integer form
            share.extend(std::iter::repeat(0u8).take(self.config.sub_chunk_size - bytes.len()));
            share.extend_from_slice(&bytes);
        }
        Ok(Bytes::from(share))
    }
}
