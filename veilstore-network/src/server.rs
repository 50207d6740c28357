//! Inbound connection listener
//!
//! One accept loop per node; each accepted connection is handled on its
//! own task holding a semaphore permit, so concurrency stays bounded
//! instead of thread-per-connection. Malformed or unexpected traffic is
//! logged and dropped without disturbing the listener.

use crate::error::{NetworkError, Result};
use crate::framing::MessageStream;
use crate::protocol::{FileListPayload, Message, PirResponsePayload};
use crate::TransportConfig;
use bytes::Bytes;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{watch, Semaphore};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, instrument, warn};
use veilstore_core::PaillierPublicKey;
use veilstore_store::PrivateStore;

/// Accepts connections and serves the upload and private-lookup flows
/// against a shared [`PrivateStore`].
pub struct PeerServer {
    store: Arc<PrivateStore>,
    config: TransportConfig,
}

impl PeerServer {
    /// Create a server over the given store
    pub fn new(store: Arc<PrivateStore>, config: TransportConfig) -> Self {
        Self { store, config }
    }

    /// Bind the listener and spawn the accept loop.
    ///
    /// Returns a handle carrying the bound address and the shutdown
    /// control.
    pub async fn bind(self, address: &str) -> Result<ServerHandle> {
        let listener = TcpListener::bind(address).await?;
        let local_addr = listener.local_addr()?;
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let tracker = TaskTracker::new();
        let limiter = Arc::new(Semaphore::new(self.config.max_connections));

        info!(%local_addr, "listener started");

        let store = self.store;
        let config = self.config.clone();
        let worker_tracker = tracker.clone();
        let accept_task = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = shutdown_rx.changed() => {
                        info!(%local_addr, "listener stopping");
                        break;
                    }
                    accepted = listener.accept() => {
                        let (stream, remote) = match accepted {
                            Ok(pair) => pair,
                            Err(e) => {
                                warn!(error = %e, "accept failed");
                                continue;
                            }
                        };
                        // Back-pressure: wait for a free worker slot
                        let permit = match limiter.clone().acquire_owned().await {
                            Ok(permit) => permit,
                            Err(_) => break,
                        };
                        let store = store.clone();
                        let config = config.clone();
                        worker_tracker.spawn(async move {
                            let _permit = permit;
                            if let Err(e) = handle_connection(stream, store, &config).await {
                                warn!(%remote, error = %e, "connection handler failed");
                            }
                        });
                    }
                }
            }
        });

        Ok(ServerHandle {
            local_addr,
            shutdown: shutdown_tx,
            accept_task,
            tracker,
            drain_timeout: self.config.drain_timeout,
        })
    }
}

/// Control handle for a running listener
pub struct ServerHandle {
    local_addr: SocketAddr,
    shutdown: watch::Sender<bool>,
    accept_task: JoinHandle<()>,
    tracker: TaskTracker,
    drain_timeout: std::time::Duration,
}

impl ServerHandle {
    /// The bound listener address
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Stop accepting, then drain in-flight connections with a bound
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        let _ = self.accept_task.await;
        self.tracker.close();
        if timeout(self.drain_timeout, self.tracker.wait()).await.is_err() {
            warn!(
                local_addr = %self.local_addr,
                "drain timed out with connections still in flight"
            );
        }
    }
}

/// Dispatch one accepted connection by its opening message
async fn handle_connection(
    stream: TcpStream,
    store: Arc<PrivateStore>,
    config: &TransportConfig,
) -> Result<()> {
    let mut stream = MessageStream::new(stream, config);
    match stream.recv().await {
        Ok(Message::RequestUpload) => handle_upload(&mut stream, &store, config).await,
        Ok(Message::RequestFile) => handle_lookup(&mut stream, &store).await,
        Ok(other) => {
            warn!(got = other.token(), "unexpected opening message");
            Ok(())
        }
        // Bad frames are rejected here; the listener keeps running
        Err(NetworkError::MalformedFrame(reason)) => {
            warn!(%reason, "rejecting malformed frame");
            Ok(())
        }
        Err(NetworkError::ConnectionClosed) => Ok(()),
        Err(e) => Err(e),
    }
}

/// Responder side of the upload flow
#[instrument(skip_all, fields(remote = ?stream.peer_addr()))]
async fn handle_upload(
    stream: &mut MessageStream,
    store: &PrivateStore,
    config: &TransportConfig,
) -> Result<()> {
    // Advisory check; add() re-validates atomically under the store lock
    if !store.accepting() {
        debug!("denying upload");
        stream.send(&Message::UploadDenied).await?;
        return Ok(());
    }
    stream.send(&Message::UploadApproved).await?;

    // The requester may resend after a failed attempt; keep answering
    // within its retry budget.
    for _ in 0..config.upload_retries.max(1) {
        let payload = match stream.recv().await {
            Ok(Message::ShareData(payload)) => payload,
            Ok(other) => {
                warn!(got = other.token(), "expected share data");
                return Ok(());
            }
            Err(NetworkError::ConnectionClosed) | Err(NetworkError::Timeout { .. }) => {
                return Ok(())
            }
            Err(e) => return Err(e),
        };
        match store.add(payload.name.clone(), Bytes::from(payload.data)) {
            Ok(()) => {
                info!(name = %payload.name, "share stored");
                stream.send(&Message::UploadedSuccess).await?;
                return Ok(());
            }
            Err(e) => {
                warn!(name = %payload.name, error = %e, "share rejected");
                stream.send(&Message::UploadedFailed).await?;
            }
        }
    }
    Ok(())
}

/// Responder side of the private-lookup flow.
///
/// The name list and the queried shares come from one snapshot, so the
/// ordering the requester selected against cannot drift mid-round.
#[instrument(skip_all, fields(remote = ?stream.peer_addr()))]
async fn handle_lookup(stream: &mut MessageStream, store: &PrivateStore) -> Result<()> {
    let snapshot = store.snapshot();
    stream
        .send(&Message::FileList(FileListPayload {
            names: snapshot.names().to_vec(),
        }))
        .await?;

    let query = match stream.recv().await {
        Ok(Message::PirQuery(query)) => query,
        Ok(other) => {
            warn!(got = other.token(), "expected a lookup query");
            return Ok(());
        }
        Err(NetworkError::ConnectionClosed) | Err(NetworkError::Timeout { .. }) => return Ok(()),
        Err(e) => return Err(e),
    };

    let requester_key = match PaillierPublicKey::from_bytes(&query.public_key) {
        Ok(key) => key,
        Err(e) => {
            warn!(error = %e, "rejecting query with a bad public key");
            stream.send(&Message::QueryRejected(e.to_string())).await?;
            return Ok(());
        }
    };

    match snapshot.query(&query.selector, &requester_key) {
        Ok(response) => {
            debug!(chunks = response.len(), "lookup answered");
            stream
                .send(&Message::PirResponse(PirResponsePayload {
                    chunks: response.iter().map(|c| c.to_bytes()).collect(),
                }))
                .await?;
        }
        Err(e) => {
            // Size mismatches and bad ciphertexts are the requester's
            // problem; reply with an error token and keep serving
            warn!(error = %e, "rejecting lookup");
            stream.send(&Message::QueryRejected(e.to_string())).await?;
        }
    }
    Ok(())
}
