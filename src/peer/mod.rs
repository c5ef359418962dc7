mod listener;

pub use listener::{MessageListener, NullListener};

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use rand::Rng;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;

use crate::buffer::IOBuffer;
use crate::error::{Error, Result};
use crate::hashes::Hash256;
use crate::network::{Network, NetworkAddress, NodeService, NodeServiceSet};
use crate::wire_protocol::messages::{BlockLocator, Inventory, InventoryItem, VersionMessage};
use crate::wire_protocol::{try_consume_message, Message, MessageParseOutcome};

pub const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(5);

/// Description of the local node, sent in our `version` message.
#[derive(Clone, Debug)]
pub struct NodeDesc {
    pub network: Network,
    pub protocol_version: i32,
    pub services: NodeServiceSet,
    pub user_agent: String,
    pub start_height: i32,
    pub relay: bool,
    /// Reply to every `inv` with a `getdata` for all announced items.
    pub auto_get_data: bool,
}

impl NodeDesc {
    pub fn new(network: Network) -> Self {
        NodeDesc {
            network,
            protocol_version: 70001,
            services: NodeServiceSet(vec![NodeService::NodeNetwork]),
            user_agent: concat!("/coinnet:", env!("CARGO_PKG_VERSION"), "/").to_string(),
            start_height: 0,
            relay: true,
            auto_get_data: true,
        }
    }
}

/// How inbound messages reach the listener.
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum DispatchMode {
    /// The reader loop invokes the listener inline; the next frame is not
    /// read until the handler returns. Delivery order equals peer send
    /// order.
    Serial,
    /// Every delivery runs as its own task. `on_tx` and `on_block` hold a
    /// shared lock for their full handler bodies and so stay mutually
    /// serialized; everything else runs freely.
    Concurrent,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum SessionState {
    Connecting = 0,
    Handshaking = 1,
    Established = 2,
    Closed = 3,
}

impl SessionState {
    fn from_u8(value: u8) -> SessionState {
        match value {
            0 => SessionState::Connecting,
            1 => SessionState::Handshaking,
            2 => SessionState::Established,
            _ => SessionState::Closed,
        }
    }
}

struct PeerShared {
    desc: NodeDesc,
    remote_addr: SocketAddr,
    mode: DispatchMode,
    listener: Arc<dyn MessageListener>,
    writer: Mutex<OwnedWriteHalf>,
    state: AtomicU8,
    handshake_tx: watch::Sender<bool>,
    handshake_rx: watch::Receiver<bool>,
    closed_reported: AtomicBool,
    /// Serializes tx/block handler bodies in concurrent mode.
    tx_block_lock: Mutex<()>,
    reader_task: std::sync::Mutex<Option<JoinHandle<()>>>,
}

/// One session with one remote node. Cheap to clone; all clones drive the
/// same connection.
#[derive(Clone)]
pub struct Peer {
    shared: Arc<PeerShared>,
}

impl Peer {
    /// Opens the TCP connection, starts the reader task and sends our
    /// `version` message. Await [Self::wait_on_handshake_complete] before
    /// relying on the session.
    pub async fn connect(
        remote_addr: SocketAddr,
        desc: NodeDesc,
        listener: Arc<dyn MessageListener>,
        mode: DispatchMode,
    ) -> Result<Peer> {
        let socket = TcpStream::connect(remote_addr).await?;
        let (read_half, write_half) = socket.into_split();

        let (handshake_tx, handshake_rx) = watch::channel(false);
        let peer = Peer {
            shared: Arc::new(PeerShared {
                desc,
                remote_addr,
                mode,
                listener,
                writer: Mutex::new(write_half),
                state: AtomicU8::new(SessionState::Connecting as u8),
                handshake_tx,
                handshake_rx,
                closed_reported: AtomicBool::new(false),
                tx_block_lock: Mutex::new(()),
                reader_task: std::sync::Mutex::new(None),
            }),
        };

        let reader = tokio::spawn(reader_loop(peer.clone(), read_half));
        *peer.shared.reader_task.lock().unwrap() = Some(reader);

        peer.set_state(SessionState::Handshaking);
        peer.send(&Message::Version(peer.local_version_message())).await?;

        Ok(peer)
    }

    fn local_version_message(&self) -> VersionMessage {
        let desc = &self.shared.desc;
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|duration| duration.as_secs() as i64)
            .unwrap_or_default();
        VersionMessage {
            version: desc.protocol_version,
            services: desc.services.as_bitmask(),
            timestamp,
            recipient_address: NetworkAddress::new(
                desc.services.as_bitmask(),
                self.shared.remote_addr,
            ),
            sender_address: NetworkAddress::unspecified(),
            nonce: rand::thread_rng().gen(),
            user_agent: desc.user_agent.clone(),
            start_height: desc.start_height,
            relay: desc.relay,
        }
    }

    pub fn remote_addr(&self) -> SocketAddr {
        self.shared.remote_addr
    }

    pub fn network(&self) -> Network {
        self.shared.desc.network
    }

    pub fn state(&self) -> SessionState {
        SessionState::from_u8(self.shared.state.load(Ordering::Acquire))
    }

    fn set_state(&self, state: SessionState) {
        self.shared.state.store(state as u8, Ordering::Release);
    }

    /// Blocks until the first `verack` arrives, for at most
    /// [HANDSHAKE_TIMEOUT]. On timeout the session is closed.
    pub async fn wait_on_handshake_complete(&self) -> Result<()> {
        self.wait_on_handshake_complete_within(HANDSHAKE_TIMEOUT).await
    }

    pub async fn wait_on_handshake_complete_within(&self, timeout: Duration) -> Result<()> {
        let mut handshake_rx = self.shared.handshake_rx.clone();
        let result = tokio::time::timeout(timeout, handshake_rx.wait_for(|complete| *complete))
            .await
            .map(|inner| inner.map(|_| ()));
        match result {
            Ok(Ok(())) => Ok(()),
            Ok(Err(_)) | Err(_) => {
                self.close().await;
                Err(Error::HandshakeTimeout)
            }
        }
    }

    /// Serializes and writes a message. Any number of tasks may send
    /// concurrently; writes are serialized per session.
    pub async fn send(&self, message: &Message) -> Result<()> {
        if self.state() == SessionState::Closed {
            return Err(Error::ConnectionClosed(0));
        }
        log::debug!("sending {} to {}", message.command().as_str(), self.shared.remote_addr);
        let bytes = message.to_bytes(self.shared.desc.network);
        let mut writer = self.shared.writer.lock().await;
        writer.write_all(&bytes).await?;
        Ok(())
    }

    pub async fn ask_for_block(&self, hash: &Hash256) -> Result<()> {
        let inventory = Inventory { items: vec![InventoryItem::block(*hash)] };
        self.send(&Message::GetData(inventory)).await
    }

    pub async fn ask_for_tx(&self, hash: &Hash256) -> Result<()> {
        let inventory = Inventory { items: vec![InventoryItem::tx(*hash)] };
        self.send(&Message::GetData(inventory)).await
    }

    pub async fn ask_for_peers(&self) -> Result<()> {
        self.send(&Message::GetAddr).await
    }

    pub async fn ask_for_blocks(&self, locator: BlockLocator) -> Result<()> {
        self.send(&Message::GetBlocks(locator)).await
    }

    pub async fn ask_for_headers(&self, locator: BlockLocator) -> Result<()> {
        self.send(&Message::GetHeaders(locator)).await
    }

    pub async fn ask_for_mempool(&self) -> Result<()> {
        self.send(&Message::Mempool).await
    }

    /// Tears the session down. The listener's close callback only fires for
    /// remote closes and socket errors, not for this.
    pub async fn close(&self) {
        self.set_state(SessionState::Closed);
        if let Some(task) = self.shared.reader_task.lock().unwrap().take() {
            task.abort();
        }
        let mut writer = self.shared.writer.lock().await;
        let _ = writer.shutdown().await;
    }
}

async fn reader_loop(peer: Peer, mut read_half: OwnedReadHalf) {
    let network = peer.shared.desc.network;
    let mut buffer = IOBuffer::default();

    loop {
        match read_half.read(buffer.expose_writable_part()).await {
            Ok(0) => {
                report_closed(&peer, 0).await;
                return;
            }
            Ok(n) => {
                buffer.register_added_content(n);
                loop {
                    match try_consume_message(&mut buffer, network) {
                        MessageParseOutcome::Message(message) => dispatch(&peer, message).await,
                        MessageParseOutcome::Skipped(err) => {
                            log::warn!(
                                "ignoring undecodable message from {}: {}",
                                peer.shared.remote_addr,
                                err
                            );
                        }
                        MessageParseOutcome::NoMessage => break,
                    }
                }
            }
            Err(err) => {
                let code = err.raw_os_error().unwrap_or(-1);
                report_closed(&peer, code).await;
                return;
            }
        }
    }
}

async fn report_closed(peer: &Peer, code: i32) {
    peer.set_state(SessionState::Closed);
    if !peer.shared.closed_reported.swap(true, Ordering::AcqRel) {
        peer.shared.listener.on_socket_closed(code).await;
    }
}

async fn dispatch(peer: &Peer, message: Message) {
    log::debug!(
        "received {} from {}",
        message.command().as_str(),
        peer.shared.remote_addr
    );

    // protocol obligations handled by the session itself
    match &message {
        Message::Verack => {
            if peer.state() == SessionState::Handshaking {
                peer.set_state(SessionState::Established);
            }
            peer.shared.handshake_tx.send_replace(true);
        }
        Message::Version(_) => {
            if let Err(err) = peer.send(&Message::Verack).await {
                log::warn!("verack reply failed: {err}");
            }
        }
        Message::Inv(inventory) if peer.shared.desc.auto_get_data => {
            if let Err(err) = peer.send(&Message::GetData(inventory.clone())).await {
                log::warn!("getdata reply failed: {err}");
            }
        }
        _ => {}
    }

    match peer.shared.mode {
        DispatchMode::Serial => deliver(peer.clone(), message).await,
        DispatchMode::Concurrent => {
            let peer = peer.clone();
            tokio::spawn(async move {
                if matches!(message, Message::Tx(_) | Message::Block(_)) {
                    let _serialized = peer.shared.tx_block_lock.lock().await;
                    deliver(peer.clone(), message).await;
                } else {
                    deliver(peer.clone(), message).await;
                }
            });
        }
    }
}

async fn deliver(peer: Peer, message: Message) {
    let listener = peer.shared.listener.clone();
    match &message {
        Message::Version(m) => listener.on_version(&peer, m).await,
        Message::Verack => listener.on_verack(&peer).await,
        Message::Addr(m) => listener.on_addr(&peer, m).await,
        Message::Inv(m) => listener.on_inv(&peer, m).await,
        Message::GetData(m) => listener.on_get_data(&peer, m).await,
        Message::GetBlocks(m) => listener.on_get_blocks(&peer, m).await,
        Message::GetHeaders(m) => listener.on_get_headers(&peer, m).await,
        Message::Tx(m) => listener.on_tx(&peer, m).await,
        Message::Block(m) => listener.on_block(&peer, m).await,
        Message::Headers(m) => listener.on_headers(&peer, m).await,
        Message::GetAddr => listener.on_get_addr(&peer).await,
        Message::Mempool => listener.on_mempool(&peer).await,
    }
}
