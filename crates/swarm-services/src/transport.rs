//! Encrypted UDP transport.
//!
//! The listener turns datagrams into [`PeerPacket`]s: decrypt, decode,
//! checksum, dedup. The send worker does the reverse for everything the
//! handlers queue on [`Outbound`](crate::Outbound).

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use tokio::net::UdpSocket;
use tokio::sync::{broadcast, mpsc};

use swarm_core::crypto::{self, SharedKey};
use swarm_core::wire::{MAX_PACKET_SIZE, WireError};
use swarm_core::{Node, Packet, PeerPacket};

use crate::dedup::DedupHistory;
use crate::outbound::OutboundReceivers;
use crate::roster::PeerRoster;

/// Room for the largest packet plus AEAD overhead.
const RECV_BUFFER_SIZE: usize = MAX_PACKET_SIZE + 64;

// ── Receive ───────────────────────────────────────────────────────────────────

/// Why a datagram never reached a handler.
#[derive(Debug)]
enum Rejected {
    Undecryptable(crypto::CryptoError),
    Undecodable(WireError),
    BadChecksum,
    Duplicate,
}

/// Decrypt, decode, verify and dedup one datagram.
fn accept_datagram(
    key: &SharedKey,
    dedup: &DedupHistory,
    datagram: &[u8],
) -> std::result::Result<Packet, Rejected> {
    let plain = crypto::decrypt_packet(key, datagram).map_err(Rejected::Undecryptable)?;
    let packet = Packet::decode(&plain).map_err(Rejected::Undecodable)?;
    if !packet.is_valid() {
        return Err(Rejected::BadChecksum);
    }
    if !dedup.check_and_record(packet.checksum()) {
        return Err(Rejected::Duplicate);
    }
    Ok(packet)
}

/// Receive datagrams and forward accepted packets to the dispatcher.
///
/// Returns when shutdown fires or the inbound channel closes.
pub async fn listener_loop(
    socket: Arc<UdpSocket>,
    key: SharedKey,
    dedup: DedupHistory,
    inbound: mpsc::Sender<PeerPacket>,
    mut shutdown: broadcast::Receiver<()>,
) -> Result<()> {
    let mut buf = vec![0u8; RECV_BUFFER_SIZE];

    tracing::info!(addr = ?socket.local_addr().ok(), "packet listener starting");

    loop {
        let (len, from) = tokio::select! {
            _ = shutdown.recv() => {
                tracing::info!("packet listener shutting down");
                return Ok(());
            }
            r = socket.recv_from(&mut buf) => match r {
                Ok(r) => r,
                Err(e) => {
                    tracing::warn!(error = %e, "recv_from failed");
                    continue;
                }
            },
        };

        let source = Node::from_socket_addr(from);
        let packet = match accept_datagram(&key, &dedup, &buf[..len]) {
            Ok(p) => p,
            Err(Rejected::Duplicate) => {
                tracing::trace!(peer = %source, "duplicate packet dropped");
                continue;
            }
            Err(Rejected::Undecodable(e @ WireError::UnknownType(_))) => {
                tracing::warn!(peer = %source, error = %e, "discarding packet");
                continue;
            }
            Err(Rejected::Undecodable(e)) => {
                tracing::debug!(peer = %source, error = %e, "malformed packet dropped");
                continue;
            }
            Err(Rejected::Undecryptable(e)) => {
                tracing::warn!(peer = %source, error = %e, "could not decrypt datagram");
                continue;
            }
            Err(Rejected::BadChecksum) => {
                tracing::debug!(peer = %source, "checksum mismatch, packet dropped");
                continue;
            }
        };

        tracing::trace!(peer = %source, %packet, "received");
        if inbound.send(PeerPacket { packet, source }).await.is_err() {
            tracing::info!("inbound receiver dropped, packet listener exiting");
            return Ok(());
        }
    }
}

// ── Send ──────────────────────────────────────────────────────────────────────

/// Drains the outbound queues onto the socket.
pub struct SendWorker {
    socket: Arc<UdpSocket>,
    key: SharedKey,
    roster: PeerRoster,
    broadcast_rx: mpsc::Receiver<Packet>,
    directed_rx: mpsc::Receiver<PeerPacket>,
    shutdown: broadcast::Receiver<()>,
}

impl SendWorker {
    pub fn new(
        socket: Arc<UdpSocket>,
        key: SharedKey,
        roster: PeerRoster,
        outbound: OutboundReceivers,
        shutdown: broadcast::Receiver<()>,
    ) -> Self {
        Self {
            socket,
            key,
            roster,
            broadcast_rx: outbound.broadcast,
            directed_rx: outbound.directed,
            shutdown,
        }
    }

    pub async fn run(mut self) -> Result<()> {
        loop {
            tokio::select! {
                _ = self.shutdown.recv() => {
                    tracing::info!("send worker shutting down");
                    return Ok(());
                }

                msg = self.broadcast_rx.recv() => {
                    let Some(packet) = msg else {
                        tracing::info!("broadcast sender dropped, send worker exiting");
                        return Ok(());
                    };
                    self.broadcast(&packet).await;
                }

                msg = self.directed_rx.recv() => {
                    let Some(PeerPacket { packet, source: dest }) = msg else {
                        tracing::info!("directed sender dropped, send worker exiting");
                        return Ok(());
                    };
                    match packet.encode() {
                        Ok(bytes) => self.send_encoded(&dest, &bytes).await,
                        Err(e) => tracing::warn!(%packet, error = %e, "failed to encode packet"),
                    }
                }
            }
        }
    }

    async fn broadcast(&self, packet: &Packet) {
        let bytes = match packet.encode() {
            Ok(b) => b,
            Err(e) => {
                tracing::warn!(%packet, error = %e, "failed to encode packet");
                return;
            }
        };
        let peers = self.roster.snapshot();
        if peers.is_empty() {
            tracing::debug!(%packet, "no peers to broadcast to");
            return;
        }
        for peer in &peers {
            self.send_encoded(peer, &bytes).await;
        }
    }

    /// Encrypt and send. Failures are logged and otherwise ignored.
    async fn send_encoded(&self, dest: &Node, bytes: &[u8]) {
        let sealed = match crypto::encrypt_packet(&self.key, bytes) {
            Ok(s) => s,
            Err(e) => {
                tracing::warn!(peer = %dest, error = %e, "failed to encrypt packet");
                return;
            }
        };
        let addr = match resolve(dest).await {
            Ok(a) => a,
            Err(e) => {
                tracing::warn!(peer = %dest, error = %e, "failed to resolve peer");
                return;
            }
        };
        if let Err(e) = self.socket.send_to(&sealed, addr).await {
            tracing::warn!(peer = %dest, error = %e, "send_to failed");
        }
    }
}

/// Resolve a node to a socket address. IP literals skip DNS.
pub async fn resolve(node: &Node) -> std::io::Result<SocketAddr> {
    if let Some(addr) = node.socket_addr() {
        return Ok(addr);
    }
    tokio::net::lookup_host((node.address.as_str(), node.port))
        .await?
        .next()
        .ok_or_else(|| {
            std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("no addresses for {node}"),
            )
        })
}

/// Encrypt and send one packet from an ad hoc socket. Used by tools that
/// sit outside the send worker.
pub async fn send_packet(
    socket: &UdpSocket,
    key: &SharedKey,
    dest: SocketAddr,
    packet: &Packet,
) -> Result<()> {
    let bytes = packet.encode()?;
    let sealed = crypto::encrypt_packet(key, &bytes)?;
    socket.send_to(&sealed, dest).await?;
    Ok(())
}
