//! Client library for bitcoin-style peer-to-peer networks.
//!
//! The crate speaks the wire protocol (message framing, all standard
//! payloads), maintains peer sessions over tokio TCP with the
//! version/verack handshake, builds and signs standard transactions, and
//! derives BIP 32 hierarchical deterministic key trees.

pub mod address;
pub mod block;
pub mod bloom;
pub mod buffer;
pub mod builder;
pub mod error;
pub mod hashes;
pub mod hdkeychain;
pub mod keys;
pub mod merkle;
pub mod network;
pub mod peer;
pub mod script;
pub mod tx;
pub mod wire_protocol;

pub use error::{Error, Result};
pub use hashes::Hash256;
pub use network::Network;
