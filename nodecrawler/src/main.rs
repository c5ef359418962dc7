use std::collections::{HashMap, HashSet};
use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use clap::Parser;
use log::LevelFilter;
use simple_logger::SimpleLogger;
use tokio::sync::{mpsc, Mutex};

use coinnet::network::Network;
use coinnet::peer::{DispatchMode, MessageListener, NodeDesc, Peer};
use coinnet::wire_protocol::messages::AddrMessage;

#[derive(Parser, Debug)]
#[command(version, about = "Asks a node for its peers and fans out over the network", long_about = None)]
struct Args {
    /// Hostname or IP address of the first node. E.g. 127.0.0.1
    hostname: String,
    /// TCP port of the first node. E.g. 8333
    port: u16,
}

fn init_logging() {
    SimpleLogger::new()
        .with_colors(true)
        .with_level(LevelFilter::Info)
        .with_local_timestamps()
        .init()
        .unwrap();
}

/// Feeds every IPv4 address record a session receives back to the crawl
/// loop.
struct CrawlListener {
    name: SocketAddr,
    discovered: mpsc::UnboundedSender<SocketAddr>,
}

#[async_trait]
impl MessageListener for CrawlListener {
    async fn on_addr(&self, _peer: &Peer, message: &AddrMessage) {
        log::info!("received addr message with {} records from {}", message.addr_list.len(), self.name);
        for record in &message.addr_list {
            // only look at ipv4 nodes
            if record.is_ipv4() {
                let _ = self.discovered.send(record.socket_addr);
            }
        }
    }

    async fn on_socket_closed(&self, code: i32) {
        log::info!("closed connection to {} with code {}", self.name, code);
    }
}

async fn open_session(
    addr: SocketAddr,
    discovered: mpsc::UnboundedSender<SocketAddr>,
) -> coinnet::Result<Peer> {
    let listener = Arc::new(CrawlListener { name: addr, discovered });
    let peer = Peer::connect(
        addr,
        NodeDesc::new(Network::Mainnet),
        listener,
        DispatchMode::Concurrent,
    )
    .await?;
    peer.wait_on_handshake_complete().await?;
    peer.ask_for_peers().await?;
    Ok(peer)
}

#[tokio::main]
async fn main() {
    init_logging();
    let args = Args::parse();

    let first_addr = match tokio::net::lookup_host((args.hostname.as_str(), args.port)).await {
        Ok(mut addrs) => match addrs.next() {
            Some(addr) => addr,
            None => {
                log::error!("{} did not resolve to any address", args.hostname);
                std::process::exit(1);
            }
        },
        Err(err) => {
            log::error!("could not resolve {}: {}", args.hostname, err);
            std::process::exit(1);
        }
    };

    let (discovered_tx, mut discovered_rx) = mpsc::unbounded_channel();
    let connections: Arc<Mutex<HashMap<SocketAddr, Peer>>> = Arc::new(Mutex::new(HashMap::new()));
    let mut attempted: HashSet<SocketAddr> = HashSet::new();

    log::info!("starting crawl at {first_addr}");
    match open_session(first_addr, discovered_tx.clone()).await {
        Ok(peer) => {
            attempted.insert(first_addr);
            connections.lock().await.insert(first_addr, peer);
        }
        Err(err) => {
            log::error!("connection to {first_addr} failed: {err}");
            std::process::exit(1);
        }
    }

    while let Some(addr) = discovered_rx.recv().await {
        if !attempted.insert(addr) {
            continue;
        }
        let discovered_tx = discovered_tx.clone();
        let connections = connections.clone();
        tokio::spawn(async move {
            log::info!("opening connection to {addr}");
            match open_session(addr, discovered_tx).await {
                Ok(peer) => {
                    let known = {
                        let mut connections = connections.lock().await;
                        connections.insert(addr, peer);
                        connections.len()
                    };
                    log::info!("connected to {addr} ({known} sessions)");
                }
                Err(err) => {
                    log::warn!("connection attempt to {addr} failed: {err}");
                }
            }
        });
    }
}
