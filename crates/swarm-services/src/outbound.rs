//! Outbound packet channels.
//!
//! Handlers never touch the socket. They hand packets to the send worker
//! through one of two queues: broadcast (every roster peer) or directed
//! (one endpoint).

use swarm_core::{Node, Packet, PeerPacket};
use tokio::sync::mpsc;

/// Sender half, cloned into every task that emits packets.
#[derive(Clone)]
pub struct Outbound {
    broadcast_tx: mpsc::Sender<Packet>,
    directed_tx: mpsc::Sender<PeerPacket>,
}

/// Receiver half, owned by the send worker.
pub struct OutboundReceivers {
    pub broadcast: mpsc::Receiver<Packet>,
    /// `source` holds the destination.
    pub directed: mpsc::Receiver<PeerPacket>,
}

impl Outbound {
    pub fn channel(capacity: usize) -> (Self, OutboundReceivers) {
        let (broadcast_tx, broadcast) = mpsc::channel(capacity);
        let (directed_tx, directed) = mpsc::channel(capacity);
        (
            Self {
                broadcast_tx,
                directed_tx,
            },
            OutboundReceivers {
                broadcast,
                directed,
            },
        )
    }

    /// Queue a packet for every roster peer.
    pub async fn broadcast(&self, packet: Packet) {
        if self.broadcast_tx.send(packet).await.is_err() {
            tracing::debug!("send worker gone, broadcast dropped");
        }
    }

    /// Queue a packet for one endpoint.
    pub async fn send_to(&self, dest: Node, packet: Packet) {
        let directed = PeerPacket {
            packet,
            source: dest,
        };
        if self.directed_tx.send(directed).await.is_err() {
            tracing::debug!("send worker gone, directed packet dropped");
        }
    }
}
