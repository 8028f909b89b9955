//! swarm integration test harness.
//!
//! Every test runs whole nodes in-process on 127.0.0.1 with ephemeral
//! ports, temporary storage and shortened timers. No root or network
//! setup is needed:
//!
//!   cargo test --test integration

mod control;
mod deploy;
mod gossip;

use std::future::Future;
use std::net::SocketAddr;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use tempfile::TempDir;
use tokio::net::UdpSocket;

use swarm_core::crypto::{self, make_key, SharedKey};
use swarm_core::wire::MAX_PACKET_SIZE;
use swarm_core::{ControlMessage, Node, Packet, Payload};
use swarm_services::runtime::{self, NodeSettings, RunningNode};
use swarm_services::transport::send_packet;
use swarm_services::GossipTiming;

// ── Harness ───────────────────────────────────────────────────────────────────

pub const PASSPHRASE: &str = "integration";

/// Gossip timers scaled down from minutes to fractions of a second.
pub fn fast_timing() -> GossipTiming {
    GossipTiming {
        bootstrap_satisfied: Duration::from_secs(2),
        bootstrap_partial: Duration::from_millis(300),
        bootstrap_idle: Duration::from_millis(200),
        first_ping: Duration::from_millis(500),
        ping_min: Duration::from_millis(300),
        ping_max: Duration::from_millis(600),
        status: Duration::from_secs(5),
    }
}

pub struct TestNode {
    pub node: RunningNode,
    pub dir: TempDir,
}

impl TestNode {
    pub fn addr(&self) -> SocketAddr {
        self.node.local_addr
    }

    pub fn id(&self) -> Node {
        self.node.self_node.clone()
    }

    pub fn share_dir(&self) -> std::path::PathBuf {
        self.dir.path().join("share")
    }

    pub async fn stop(self) {
        self.node.shutdown();
        self.node.join().await;
    }
}

/// Start a node, optionally seeded with files and pointed at a bootstrap.
pub async fn spawn_node(
    passphrase: &str,
    bootstrap: Option<&TestNode>,
    files: &[(&str, &[u8])],
) -> Result<TestNode> {
    let dir = tempfile::tempdir()?;
    let share = dir.path().join("share");
    for (name, data) in files {
        let path = share.join(name);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&path, data)?;
    }

    let mut settings = NodeSettings::new(
        "127.0.0.1:0".parse()?,
        make_key(passphrase),
        share,
        dir.path().join("parts"),
    );
    settings.bootstrap = bootstrap.map(TestNode::id);
    settings.gossip = fast_timing();
    settings.stall_timeout = Duration::from_millis(500);
    settings.dedup_window = Duration::from_secs(2);

    let node = runtime::start(settings).await?;
    Ok(TestNode { node, dir })
}

/// Poll `check` every 50 ms until it holds or `timeout` passes.
pub async fn wait_for<F, Fut>(timeout: Duration, mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if check().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    false
}

/// Stand-in for swarm-ctl: a bare encrypted socket on loopback.
pub struct Controller {
    socket: UdpSocket,
    key: SharedKey,
}

impl Controller {
    pub async fn new(passphrase: &str) -> Result<Self> {
        Ok(Self {
            socket: UdpSocket::bind("127.0.0.1:0").await?,
            key: make_key(passphrase),
        })
    }

    pub async fn send(&self, dest: SocketAddr, payload: Payload) -> Result<()> {
        send_packet(&self.socket, &self.key, dest, &Packet::new(payload)).await
    }

    pub async fn recv_message(&self) -> Result<ControlMessage> {
        let mut buf = vec![0u8; MAX_PACKET_SIZE + 64];
        let len = tokio::time::timeout(Duration::from_secs(5), self.socket.recv(&mut buf))
            .await
            .context("no reply within 5s")??;
        let plain = crypto::decrypt_packet(&self.key, &buf[..len])?;
        match Packet::decode(&plain)?.payload {
            Payload::Message(text) => Ok(ControlMessage::parse(&text)),
            other => bail!("unexpected {:?} reply", other.packet_type()),
        }
    }

    /// Send one control message and wait for the answer.
    pub async fn request(&self, dest: SocketAddr, message: ControlMessage) -> Result<ControlMessage> {
        self.send(dest, Payload::Message(message.to_text())).await?;
        self.recv_message().await
    }
}
