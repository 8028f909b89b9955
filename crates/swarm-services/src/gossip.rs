//! Membership manager: bootstrap, liveness and connection sharing.
//!
//! Runs three single-shot timers that re-arm themselves after firing:
//!
//!   bootstrap: ask the bootstrap node for peers while below the threshold,
//!              backing off as the roster fills
//!   liveness:  ping every peer, evict those that missed three in a row
//!   status:    log the roster size
//!
//! and reacts to ConnectionShare, ConnectionAck and ping messages routed
//! here by the dispatcher.

use std::time::Duration;

use anyhow::Result;
use rand::Rng;
use tokio::sync::{broadcast, mpsc};
use tokio::time::Instant;

use swarm_core::wire::{ConnectionRequest, ConnectionShare, Nonce, Payload};
use swarm_core::{ControlMessage, Node, Packet, PeerPacket};

use crate::outbound::Outbound;
use crate::roster::PeerRoster;

/// Threshold after a successful round, and the cap on forwarded shares.
pub const MIN_THRESHOLD: u8 = 2;
/// The threshold stops growing here.
pub const MAX_THRESHOLD: u8 = 10;

// ── Timing ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct GossipTiming {
    /// Bootstrap re-arm when the roster met the threshold.
    pub bootstrap_satisfied: Duration,
    /// Bootstrap re-arm when the roster is non-empty but short.
    pub bootstrap_partial: Duration,
    /// Bootstrap re-arm when the roster is empty.
    pub bootstrap_idle: Duration,
    pub first_ping: Duration,
    /// Later pings are spread uniformly over [ping_min, ping_max).
    pub ping_min: Duration,
    pub ping_max: Duration,
    pub status: Duration,
}

impl Default for GossipTiming {
    fn default() -> Self {
        Self {
            bootstrap_satisfied: Duration::from_secs(120),
            bootstrap_partial: Duration::from_secs(30),
            bootstrap_idle: Duration::from_secs(10),
            first_ping: Duration::from_secs(120),
            ping_min: Duration::from_secs(90),
            ping_max: Duration::from_secs(150),
            status: Duration::from_secs(60),
        }
    }
}

impl GossipTiming {
    fn next_ping(&self) -> Duration {
        if self.ping_max <= self.ping_min {
            return self.ping_min;
        }
        rand::thread_rng().gen_range(self.ping_min..self.ping_max)
    }
}

// ── Bootstrap policy ──────────────────────────────────────────────────────────

/// What one bootstrap timer fire should do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BootstrapStep {
    /// Threshold to put in a ConnectionRequest, if one should be sent.
    pub request: Option<u8>,
    pub rearm: Duration,
}

/// Expanding-ring threshold: ask for more peers the longer nobody answers.
#[derive(Debug, Clone)]
pub struct BootstrapPolicy {
    threshold: u8,
}

impl Default for BootstrapPolicy {
    fn default() -> Self {
        Self {
            threshold: MIN_THRESHOLD,
        }
    }
}

impl BootstrapPolicy {
    pub fn threshold(&self) -> u8 {
        self.threshold
    }

    pub fn tick(&mut self, peers: usize, has_bootstrap: bool, timing: &GossipTiming) -> BootstrapStep {
        let request = (has_bootstrap && peers < self.threshold as usize).then_some(self.threshold);

        let rearm = if peers >= self.threshold as usize {
            self.threshold = MIN_THRESHOLD;
            timing.bootstrap_satisfied
        } else if peers > 0 {
            self.threshold = MIN_THRESHOLD;
            timing.bootstrap_partial
        } else {
            self.threshold = (self.threshold + 1).min(MAX_THRESHOLD);
            timing.bootstrap_idle
        };

        BootstrapStep { request, rearm }
    }
}

// ── Manager ───────────────────────────────────────────────────────────────────

pub struct MembershipManager {
    roster: PeerRoster,
    self_node: Node,
    bootstrap: Option<Node>,
    outbound: Outbound,
    inbound: mpsc::Receiver<PeerPacket>,
    timing: GossipTiming,
    policy: BootstrapPolicy,
    shutdown: broadcast::Receiver<()>,
}

impl MembershipManager {
    pub fn new(
        roster: PeerRoster,
        self_node: Node,
        bootstrap: Option<Node>,
        outbound: Outbound,
        inbound: mpsc::Receiver<PeerPacket>,
        timing: GossipTiming,
        shutdown: broadcast::Receiver<()>,
    ) -> Self {
        Self {
            roster,
            self_node,
            bootstrap,
            outbound,
            inbound,
            timing,
            policy: BootstrapPolicy::default(),
            shutdown,
        }
    }

    pub async fn run(mut self) -> Result<()> {
        tracing::info!(node = %self.self_node, bootstrap = ?self.bootstrap, "membership manager starting");

        let bootstrap = tokio::time::sleep(Duration::ZERO);
        let ping = tokio::time::sleep(self.timing.first_ping);
        let status = tokio::time::sleep(self.timing.status);
        tokio::pin!(bootstrap, ping, status);

        loop {
            tokio::select! {
                _ = self.shutdown.recv() => {
                    tracing::info!("membership manager shutting down");
                    return Ok(());
                }

                msg = self.inbound.recv() => {
                    let Some(pp) = msg else {
                        tracing::info!("gossip sender dropped, membership manager exiting");
                        return Ok(());
                    };
                    self.handle(pp).await;
                }

                () = &mut bootstrap => {
                    let rearm = self.bootstrap_tick().await;
                    bootstrap.as_mut().reset(Instant::now() + rearm);
                }

                () = &mut ping => {
                    self.ping_tick().await;
                    ping.as_mut().reset(Instant::now() + self.timing.next_ping());
                }

                () = &mut status => {
                    tracing::info!(peers = self.roster.len(), "status");
                    status.as_mut().reset(Instant::now() + self.timing.status);
                }
            }
        }
    }

    async fn bootstrap_tick(&mut self) -> Duration {
        let step = self
            .policy
            .tick(self.roster.len(), self.bootstrap.is_some(), &self.timing);
        if let (Some(threshold), Some(bootstrap)) = (step.request, &self.bootstrap) {
            tracing::debug!(%bootstrap, threshold, peers = self.roster.len(), "requesting peers");
            let request = Payload::ConnectionRequest(ConnectionRequest { threshold });
            self.outbound
                .send_to(bootstrap.clone(), Packet::new(request))
                .await;
        }
        step.rearm
    }

    async fn ping_tick(&mut self) {
        let cycle = self.roster.ping_cycle();
        for peer in &cycle.evicted {
            tracing::info!(%peer, "peer stopped answering, evicted");
        }
        for peer in cycle.to_ping {
            self.outbound
                .send_to(peer, Packet::message(ControlMessage::PingReq.to_text()))
                .await;
        }
    }

    /// React to one gossip packet.
    pub async fn handle(&mut self, pp: PeerPacket) {
        let PeerPacket { packet, source } = pp;
        let nonce = packet.nonce;
        match packet.payload {
            Payload::ConnectionShare(share) => self.on_share(nonce, share).await,
            Payload::ConnectionAck => {
                if self.roster.register(source.clone()) {
                    tracing::info!(peer = %source, "peer accepted our request");
                }
            }
            Payload::Message(text) => match ControlMessage::parse(&text) {
                ControlMessage::PingReq => {
                    self.outbound
                        .send_to(source, Packet::message(ControlMessage::PingAck.to_text()))
                        .await;
                }
                ControlMessage::PingAck => self.roster.reset(source),
                other => tracing::debug!(peer = %source, ?other, "unexpected message for gossip"),
            },
            other => {
                tracing::debug!(peer = %source, kind = ?other.packet_type(), "unexpected packet for gossip")
            }
        }
    }

    /// Ack the requester if there is room, then pass the share on.
    async fn on_share(&mut self, nonce: Nonce, mut share: ConnectionShare) {
        if self.roster.len() < share.threshold as usize {
            let requester = share.requester.clone();
            let known = self.roster.contains(&requester);
            if known || requester != self.self_node {
                self.outbound
                    .send_to(requester.clone(), Packet::new(Payload::ConnectionAck))
                    .await;
                if !known {
                    tracing::info!(peer = %requester, "accepting new peer");
                    self.roster.register(requester);
                }
                share.threshold = share.threshold.min(MIN_THRESHOLD);
            }
        }

        if share.threshold > 0 {
            self.outbound
                .broadcast(Packet::with_nonce(nonce, Payload::ConnectionShare(share)))
                .await;
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
