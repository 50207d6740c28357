//! Veilstore peer daemon
//!
//! Binds the core crates into one node: configuration, the keypair, the
//! peer directory, the local share store with its listener, and the
//! upload/download workflows over the transport.

pub mod config;
pub mod node;
pub mod persistence;

pub use config::{ConfigError, NodeConfig};
pub use node::{FileDescriptor, Node, NodeError};
pub use persistence::{NodePersistence, PersistedState};
