//! Inbound packet router.
//!
//! The listener hands every accepted datagram here. Membership traffic goes
//! to the gossip task, file traffic to the file share. Connection requests
//! and control messages that need no state beyond the roster are answered
//! in place.

use anyhow::Result;
use tokio::sync::{broadcast, mpsc};

use swarm_core::wire::{ConnectionShare, Payload};
use swarm_core::{ControlMessage, Node, Packet, PeerPacket};

use crate::outbound::Outbound;
use crate::roster::PeerRoster;

/// A source that is not a peer and sits on this machine.
///
/// Controllers such as `swarm-ctl` talk to the node from an ephemeral port
/// on loopback or on the node's own address.
pub fn is_local_controller(source: &Node, roster: &PeerRoster, self_node: &Node) -> bool {
    !roster.contains(source) && (source.is_loopback() || source.address == self_node.address)
}

pub struct Dispatcher {
    inbound: mpsc::Receiver<PeerPacket>,
    gossip_tx: mpsc::Sender<PeerPacket>,
    files_tx: mpsc::Sender<PeerPacket>,
    roster: PeerRoster,
    self_node: Node,
    outbound: Outbound,
    shutdown: broadcast::Receiver<()>,
}

impl Dispatcher {
    pub fn new(
        inbound: mpsc::Receiver<PeerPacket>,
        gossip_tx: mpsc::Sender<PeerPacket>,
        files_tx: mpsc::Sender<PeerPacket>,
        roster: PeerRoster,
        self_node: Node,
        outbound: Outbound,
        shutdown: broadcast::Receiver<()>,
    ) -> Self {
        Self {
            inbound,
            gossip_tx,
            files_tx,
            roster,
            self_node,
            outbound,
            shutdown,
        }
    }

    pub async fn run(mut self) -> Result<()> {
        loop {
            tokio::select! {
                _ = self.shutdown.recv() => {
                    tracing::info!("dispatcher shutting down");
                    break;
                }

                msg = self.inbound.recv() => {
                    let Some(pp) = msg else {
                        tracing::info!("listener dropped, dispatcher exiting");
                        break;
                    };
                    self.dispatch(pp).await;
                }
            }
        }
        Ok(())
    }

    pub async fn dispatch(&mut self, pp: PeerPacket) {
        match &pp.packet.payload {
            Payload::ConnectionRequest(request) => {
                // Turned into a share addressed to ourselves, so gossip
                // applies one rule to first-hand and relayed requests.
                tracing::debug!(peer = %pp.source, threshold = request.threshold, "connection request");
                let share = ConnectionShare {
                    requester: pp.source.clone(),
                    threshold: request.threshold,
                };
                self.outbound
                    .send_to(self.self_node.clone(), Packet::new(Payload::ConnectionShare(share)))
                    .await;
            }
            Payload::ConnectionShare(_) | Payload::ConnectionAck => {
                forward(&self.gossip_tx, pp, "gossip").await
            }
            Payload::Message(text) => {
                let message = ControlMessage::parse(text);
                self.on_message(message, pp).await;
            }
            Payload::Manifest(_)
            | Payload::FileDigest(_)
            | Payload::FilePart(_)
            | Payload::FilePartRequest(_)
            | Payload::FileRequest(_)
            | Payload::Deployment(_) => forward(&self.files_tx, pp, "file share").await,
        }
    }

    async fn on_message(&mut self, message: ControlMessage, pp: PeerPacket) {
        let source = pp.source.clone();
        match message {
            ControlMessage::PingReq | ControlMessage::PingAck => {
                forward(&self.gossip_tx, pp, "gossip").await
            }
            ControlMessage::ListPeers => {
                let reply = ControlMessage::ListResponse(self.roster.snapshot());
                self.outbound
                    .send_to(source, Packet::message(reply.to_text()))
                    .await;
            }
            ControlMessage::Signal { target, action } => {
                tracing::info!(peer = %source, %target, %action, "module signal");
                self.outbound
                    .broadcast(Packet::with_nonce(pp.packet.nonce, pp.packet.payload))
                    .await;
                if is_local_controller(&source, &self.roster, &self.self_node) {
                    self.reply(source, ControlMessage::DeployAck).await;
                }
            }
            ControlMessage::BadSignal(rest) => {
                tracing::warn!(peer = %source, signal = %rest, "malformed module signal");
                if is_local_controller(&source, &self.roster, &self.self_node) {
                    self.reply(source, ControlMessage::DeployError).await;
                }
            }
            ControlMessage::ListResponse(peers) => {
                tracing::info!(peer = %source, count = peers.len(), "peer list received")
            }
            ControlMessage::DeployAck => tracing::info!(peer = %source, "deploy acknowledged"),
            ControlMessage::DeployError => tracing::warn!(peer = %source, "deploy rejected"),
            ControlMessage::Text(text) => tracing::info!(peer = %source, %text, "message"),
        }
    }

    async fn reply(&self, dest: Node, message: ControlMessage) {
        self.outbound
            .send_to(dest, Packet::message(message.to_text()))
            .await;
    }
}

async fn forward(tx: &mpsc::Sender<PeerPacket>, pp: PeerPacket, task: &str) {
    if tx.send(pp).await.is_err() {
        tracing::debug!(task, "handler gone, packet dropped");
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
