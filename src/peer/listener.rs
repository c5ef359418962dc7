use async_trait::async_trait;

use crate::block::Block;
use crate::peer::Peer;
use crate::tx::Transaction;
use crate::wire_protocol::messages::{
    AddrMessage, BlockLocator, HeadersMessage, Inventory, VersionMessage,
};

/// Inbound message callbacks, one per command. Every method defaults to a
/// no-op; implement the ones the application cares about.
///
/// Delivery discipline depends on the session's [crate::peer::DispatchMode]:
/// serial mode invokes handlers inline from the reader loop, concurrent mode
/// runs each invocation as its own task while still serializing `on_tx` and
/// `on_block` relative to each other.
#[allow(unused_variables)]
#[async_trait]
pub trait MessageListener: Send + Sync {
    async fn on_version(&self, peer: &Peer, message: &VersionMessage) {}

    async fn on_verack(&self, peer: &Peer) {}

    async fn on_addr(&self, peer: &Peer, message: &AddrMessage) {}

    async fn on_inv(&self, peer: &Peer, inventory: &Inventory) {}

    async fn on_get_data(&self, peer: &Peer, inventory: &Inventory) {}

    async fn on_get_blocks(&self, peer: &Peer, locator: &BlockLocator) {}

    async fn on_get_headers(&self, peer: &Peer, locator: &BlockLocator) {}

    async fn on_tx(&self, peer: &Peer, tx: &Transaction) {}

    async fn on_block(&self, peer: &Peer, block: &Block) {}

    async fn on_headers(&self, peer: &Peer, message: &HeadersMessage) {}

    async fn on_get_addr(&self, peer: &Peer) {}

    async fn on_mempool(&self, peer: &Peer) {}

    /// The session ended: 0 for a clean close by the remote side, the OS
    /// error code otherwise. Invoked exactly once per session.
    async fn on_socket_closed(&self, code: i32) {}
}

/// Listener that ignores everything.
pub struct NullListener;

#[async_trait]
impl MessageListener for NullListener {}
