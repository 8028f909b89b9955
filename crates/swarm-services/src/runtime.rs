//! Node assembly.
//!
//! Binds the socket and spawns every task: dedup sweep, listener,
//! dispatcher, membership manager, file share and send worker. They share
//! one shutdown broadcast.

use std::collections::HashMap;
use std::future::Future;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::net::UdpSocket;
use tokio::sync::{broadcast, mpsc};
use tokio::task::{Id, JoinSet};

use swarm_core::crypto::SharedKey;
use swarm_core::Node;

use crate::dedup::{DedupHistory, DEDUP_WINDOW};
use crate::dispatch::Dispatcher;
use crate::downloader::{DownloadSettings, MAX_STALLS, STALL_TIMEOUT};
use crate::fileshare::FileShare;
use crate::gossip::{GossipTiming, MembershipManager};
use crate::outbound::Outbound;
use crate::roster::PeerRoster;
use crate::transport::{listener_loop, SendWorker};

const INBOUND_QUEUE: usize = 256;
const GOSSIP_QUEUE: usize = 64;
const FILES_QUEUE: usize = 256;
const OUTBOUND_QUEUE: usize = 256;

/// Everything a node needs to start.
#[derive(Debug, Clone)]
pub struct NodeSettings {
    pub listen: SocketAddr,
    /// Address peers should use. Empty means the bound IP.
    pub advertise_address: String,
    pub bootstrap: Option<Node>,
    pub key: SharedKey,
    pub share_dir: PathBuf,
    pub parts_dir: PathBuf,
    pub gossip: GossipTiming,
    pub stall_timeout: Duration,
    pub max_stalls: u32,
    pub dedup_window: Duration,
}

impl NodeSettings {
    pub fn new(listen: SocketAddr, key: SharedKey, share_dir: PathBuf, parts_dir: PathBuf) -> Self {
        Self {
            listen,
            advertise_address: String::new(),
            bootstrap: None,
            key,
            share_dir,
            parts_dir,
            gossip: GossipTiming::default(),
            stall_timeout: STALL_TIMEOUT,
            max_stalls: MAX_STALLS,
            dedup_window: DEDUP_WINDOW,
        }
    }
}

/// Named node tasks, joined in completion order.
#[derive(Default)]
struct TaskSet {
    set: JoinSet<Result<()>>,
    names: HashMap<Id, &'static str>,
}

impl TaskSet {
    fn spawn<F>(&mut self, name: &'static str, task: F)
    where
        F: Future<Output = Result<()>> + Send + 'static,
    {
        let handle = self.set.spawn(task);
        self.names.insert(handle.id(), name);
    }

    /// Wait for the next task to end and log how it ended. None once all
    /// tasks are done.
    async fn join_next(&mut self) -> Option<&'static str> {
        let (id, outcome) = match self.set.join_next_with_id().await? {
            Ok((id, result)) => (id, result.map_err(|e| e.to_string())),
            Err(e) => (e.id(), Err(format!("panicked: {e}"))),
        };
        let name = self.names.remove(&id).unwrap_or("unknown");
        match outcome {
            Ok(()) => tracing::debug!(task = name, "task finished"),
            Err(error) => tracing::error!(task = name, %error, "task failed"),
        }
        Some(name)
    }
}

/// A started node. Dropping it does not stop the tasks; call
/// [`shutdown`](Self::shutdown) then [`join`](Self::join).
pub struct RunningNode {
    pub self_node: Node,
    pub local_addr: SocketAddr,
    pub roster: PeerRoster,
    shutdown_tx: broadcast::Sender<()>,
    tasks: TaskSet,
}

impl RunningNode {
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
    }

    /// Wait for every remaining task.
    pub async fn join(mut self) {
        while self.tasks.join_next().await.is_some() {}
    }

    /// Resolves with the name of the first task to exit. None if no task
    /// is left.
    pub async fn any_exited(&mut self) -> Option<&'static str> {
        self.tasks.join_next().await
    }
}

/// Bind and spawn a node.
pub async fn start(settings: NodeSettings) -> Result<RunningNode> {
    for dir in [&settings.share_dir, &settings.parts_dir] {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("failed to create {}", dir.display()))?;
    }

    let socket = Arc::new(
        UdpSocket::bind(settings.listen)
            .await
            .with_context(|| format!("failed to bind {}", settings.listen))?,
    );
    let local_addr = socket.local_addr()?;

    let advertise = if settings.advertise_address.is_empty() {
        local_addr.ip().to_canonical().to_string()
    } else {
        settings.advertise_address.clone()
    };
    let self_node = Node::new(advertise, local_addr.port());
    tracing::info!(node = %self_node, listen = %local_addr, "node starting");

    let roster = PeerRoster::new();
    let dedup = DedupHistory::new(settings.dedup_window);
    let (shutdown_tx, _) = broadcast::channel::<()>(1);
    let (outbound, outbound_rx) = Outbound::channel(OUTBOUND_QUEUE);
    let (inbound_tx, inbound_rx) = mpsc::channel(INBOUND_QUEUE);
    let (gossip_tx, gossip_rx) = mpsc::channel(GOSSIP_QUEUE);
    let (files_tx, files_rx) = mpsc::channel(FILES_QUEUE);

    let mut tasks = TaskSet::default();

    let sweep_shutdown = shutdown_tx.subscribe();
    let sweeper = dedup.clone();
    tasks.spawn("dedup sweep", async move {
        sweeper.sweep_loop(sweep_shutdown).await;
        Ok(())
    });

    tasks.spawn(
        "listener",
        listener_loop(
            socket.clone(),
            settings.key.clone(),
            dedup,
            inbound_tx,
            shutdown_tx.subscribe(),
        ),
    );

    let dispatcher = Dispatcher::new(
        inbound_rx,
        gossip_tx,
        files_tx,
        roster.clone(),
        self_node.clone(),
        outbound.clone(),
        shutdown_tx.subscribe(),
    );
    tasks.spawn("dispatcher", dispatcher.run());

    let membership = MembershipManager::new(
        roster.clone(),
        self_node.clone(),
        settings.bootstrap.clone(),
        outbound.clone(),
        gossip_rx,
        settings.gossip.clone(),
        shutdown_tx.subscribe(),
    );
    tasks.spawn("membership", membership.run());

    let mut downloads = DownloadSettings::new(
        settings.share_dir.clone(),
        settings.parts_dir.clone(),
        self_node.clone(),
    );
    downloads.stall_timeout = settings.stall_timeout;
    downloads.max_stalls = settings.max_stalls;
    let share = FileShare::new(
        downloads,
        roster.clone(),
        outbound,
        files_rx,
        shutdown_tx.subscribe(),
    );
    tasks.spawn("file share", share.run());

    let sender = SendWorker::new(
        socket,
        settings.key,
        roster.clone(),
        outbound_rx,
        shutdown_tx.subscribe(),
    );
    tasks.spawn("send worker", sender.run());

    Ok(RunningNode {
        self_node,
        local_addr,
        roster,
        shutdown_tx,
        tasks,
    })
}
