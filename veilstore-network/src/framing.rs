//! Length-delimited message framing
//!
//! Wraps a TCP stream so whole [`Message`] frames go in and out; every
//! frame declares its length up front and every read is bounded by the
//! configured timeout. A timeout is a recoverable per-attempt failure,
//! never fatal to the connection's owner.

use crate::error::{NetworkError, Result};
use crate::protocol::Message;
use crate::TransportConfig;
use futures::{SinkExt, StreamExt};
use std::net::SocketAddr;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_util::codec::{Framed, LengthDelimitedCodec};

/// A framed, timeout-bounded message channel over one connection
pub struct MessageStream {
    framed: Framed<TcpStream, LengthDelimitedCodec>,
    read_timeout: std::time::Duration,
}

impl MessageStream {
    /// Wrap an established connection
    pub fn new(stream: TcpStream, config: &TransportConfig) -> Self {
        let codec = LengthDelimitedCodec::builder()
            .max_frame_length(config.max_frame_length)
            .new_codec();
        Self {
            framed: Framed::new(stream, codec),
            read_timeout: config.read_timeout,
        }
    }

    /// The remote endpoint, when still known
    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.framed.get_ref().peer_addr().ok()
    }

    /// Send one message as a single length-delimited frame
    pub async fn send(&mut self, message: &Message) -> Result<()> {
        let frame = message.encode()?;
        self.framed.send(frame).await?;
        Ok(())
    }

    /// Receive one message, bounded by the read timeout
    pub async fn recv(&mut self) -> Result<Message> {
        let frame = timeout(self.read_timeout, self.framed.next())
            .await
            .map_err(|_| NetworkError::Timeout {
                operation: "message frame",
            })?
            .ok_or(NetworkError::ConnectionClosed)??;
        Message::decode(&frame)
    }
}
