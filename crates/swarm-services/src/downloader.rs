//! Per-file swarm downloader.
//!
//! One task per in-flight file. It pulls parts from whichever peers
//! answered the FileRequest, one outstanding request per contributing peer:
//! each part that arrives triggers a request for the next needed index to
//! the same sender. Parts are staged on disk and assembled once none remain.

use std::collections::HashSet;
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use swarm_core::wire::{FileDigest, FileHash, FilePart, FilePartRequest, FileRequest, Payload};
use swarm_core::{Node, Packet};

use crate::manifest::safe_relative_path;
use crate::outbound::Outbound;
use crate::parts::{expected_part_len, num_parts, PartStore};

/// Idle time before a download re-announces itself.
pub const STALL_TIMEOUT: Duration = Duration::from_secs(10);
/// Consecutive idle periods before a download gives up.
pub const MAX_STALLS: u32 = 30;
/// Part indices are u16 on the wire.
pub const MAX_PARTS: u64 = u16::MAX as u64 + 1;

const PART_QUEUE: usize = 32;
const PEER_QUEUE: usize = 16;

// ── State ─────────────────────────────────────────────────────────────────────

/// Which parts are still missing, and where the circular scan resumes.
#[derive(Debug, Clone)]
pub struct DownloadState {
    needed: Vec<bool>,
    remaining: usize,
    cursor: usize,
}

impl DownloadState {
    pub fn new(num_parts: usize) -> Self {
        Self {
            needed: vec![true; num_parts],
            remaining: num_parts,
            cursor: num_parts.saturating_sub(1),
        }
    }

    pub fn num_parts(&self) -> usize {
        self.needed.len()
    }

    pub fn remaining(&self) -> usize {
        self.remaining
    }

    pub fn is_complete(&self) -> bool {
        self.remaining == 0
    }

    pub fn is_needed(&self, part: u16) -> bool {
        self.needed.get(part as usize).copied().unwrap_or(false)
    }

    /// Mark a part received. Returns false if it was not needed.
    pub fn accept(&mut self, part: u16) -> bool {
        match self.needed.get_mut(part as usize) {
            Some(slot) if *slot => {
                *slot = false;
                self.remaining -= 1;
                true
            }
            _ => false,
        }
    }

    /// Scan the ring from `cursor + 1`, ending on the cursor itself, for a
    /// part still needed. The cursor moves to whatever is found.
    pub fn next_needed(&mut self) -> Option<u16> {
        let n = self.needed.len();
        if self.remaining == 0 {
            return None;
        }
        for step in 1..=n {
            let index = (self.cursor + step) % n;
            if self.needed[index] {
                self.cursor = index;
                return Some(index as u16);
            }
        }
        None
    }
}

// ── Outcome ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DownloadOutcome {
    Completed { hash: FileHash, path: PathBuf },
    Failed { hash: FileHash, reason: String },
    Abandoned { hash: FileHash },
}

impl DownloadOutcome {
    pub fn hash(&self) -> &FileHash {
        match self {
            DownloadOutcome::Completed { hash, .. }
            | DownloadOutcome::Failed { hash, .. }
            | DownloadOutcome::Abandoned { hash } => hash,
        }
    }
}

// ── Handle ────────────────────────────────────────────────────────────────────

/// Where downloads stage and land, and how patient they are.
#[derive(Debug, Clone)]
pub struct DownloadSettings {
    pub share_dir: PathBuf,
    pub parts_dir: PathBuf,
    /// Advertised in re-broadcast FileRequests.
    pub self_node: Node,
    pub stall_timeout: Duration,
    pub max_stalls: u32,
}

impl DownloadSettings {
    pub fn new(share_dir: PathBuf, parts_dir: PathBuf, self_node: Node) -> Self {
        Self {
            share_dir,
            parts_dir,
            self_node,
            stall_timeout: STALL_TIMEOUT,
            max_stalls: MAX_STALLS,
        }
    }
}

/// The file share's grip on a running download.
pub struct DownloadHandle {
    parts_tx: mpsc::Sender<(Node, FilePart)>,
    peers_tx: mpsc::Sender<Node>,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl DownloadHandle {
    /// Hand over a part without waiting. Returns false if it was dropped.
    pub fn offer_part(&self, source: Node, part: FilePart) -> bool {
        self.parts_tx.try_send((source, part)).is_ok()
    }

    /// Suggest a peer that holds the file. Returns false if it was dropped.
    pub fn offer_peer(&self, peer: Node) -> bool {
        self.peers_tx.try_send(peer).is_ok()
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

// ── Task ──────────────────────────────────────────────────────────────────────

pub struct Downloader {
    digest: FileDigest,
    state: DownloadState,
    store: PartStore,
    dest: PathBuf,
    settings: DownloadSettings,
    outbound: Outbound,
    parts_rx: mpsc::Receiver<(Node, FilePart)>,
    peers_rx: mpsc::Receiver<Node>,
    finished: mpsc::Sender<DownloadOutcome>,
    cancel: CancellationToken,
    contributors: HashSet<Node>,
}

impl Downloader {
    /// Validate the digest, prepare staging, and start the task.
    pub fn spawn(
        digest: FileDigest,
        settings: &DownloadSettings,
        outbound: Outbound,
        finished: mpsc::Sender<DownloadOutcome>,
    ) -> Result<DownloadHandle> {
        let relative = safe_relative_path(&digest.name)
            .with_context(|| format!("refusing unsafe file name {:?}", digest.name))?;
        let parts = num_parts(digest.size as u64);
        if parts > MAX_PARTS {
            bail!("{} bytes needs {parts} parts, more than the wire can index", digest.size);
        }
        let store = PartStore::open(&settings.parts_dir, &digest.hash)?;

        let (parts_tx, parts_rx) = mpsc::channel(PART_QUEUE);
        let (peers_tx, peers_rx) = mpsc::channel(PEER_QUEUE);
        let cancel = CancellationToken::new();

        let downloader = Downloader {
            state: DownloadState::new(parts as usize),
            dest: settings.share_dir.join(relative),
            digest,
            store,
            settings: settings.clone(),
            outbound,
            parts_rx,
            peers_rx,
            finished,
            cancel: cancel.clone(),
            contributors: HashSet::new(),
        };
        let task = tokio::spawn(downloader.run());

        Ok(DownloadHandle {
            parts_tx,
            peers_tx,
            cancel,
            task,
        })
    }

    async fn run(mut self) {
        let hash = hex::encode(self.digest.hash);
        tracing::info!(
            %hash,
            name = %self.digest.name,
            size = self.digest.size,
            parts = self.state.num_parts(),
            "download starting"
        );

        let outcome = match self.pull().await {
            Some(true) => self.finish(),
            Some(false) => {
                self.discard();
                tracing::warn!(%hash, missing = self.state.remaining(), "download abandoned");
                DownloadOutcome::Abandoned {
                    hash: self.digest.hash,
                }
            }
            None => {
                tracing::debug!(%hash, "download cancelled");
                return;
            }
        };
        let _ = self.finished.send(outcome).await;
    }

    /// Drive requests until every part is in. Some(true) when complete,
    /// Some(false) when the swarm went quiet for too long, None when
    /// cancelled or orphaned.
    async fn pull(&mut self) -> Option<bool> {
        if self.state.is_complete() {
            return Some(true);
        }

        let timeout = self.settings.stall_timeout;
        let stall = tokio::time::sleep(timeout);
        tokio::pin!(stall);
        let mut stalls = 0u32;

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => return None,

                msg = self.parts_rx.recv() => {
                    let (source, part) = msg?;
                    self.on_part(source, part).await;
                    if self.state.is_complete() {
                        return Some(true);
                    }
                    stalls = 0;
                }

                msg = self.peers_rx.recv() => {
                    let peer = msg?;
                    self.on_peer(peer).await;
                    stalls = 0;
                }

                () = &mut stall => {
                    stalls += 1;
                    if stalls >= self.settings.max_stalls {
                        return Some(false);
                    }
                    self.on_stall().await;
                }
            }
            stall.as_mut().reset(Instant::now() + timeout);
        }
    }

    async fn on_part(&mut self, source: Node, part: FilePart) {
        let index = part.part;
        match expected_part_len(self.digest.size as u64, index as u64) {
            Some(len) if len == part.data.len() => {}
            _ => {
                tracing::debug!(peer = %source, part = index, len = part.data.len(), "part does not fit file, dropped");
                return;
            }
        }

        if self.state.is_needed(index) {
            if let Err(e) = self.store.write_part(index, &part.data) {
                tracing::warn!(error = %e, part = index, "failed to store part");
                return;
            }
            self.state.accept(index);
            tracing::trace!(peer = %source, part = index, remaining = self.state.remaining(), "part stored");
        }

        self.contributors.insert(source.clone());
        if let Some(next) = self.state.next_needed() {
            self.request(source, next).await;
        }
    }

    async fn on_peer(&mut self, peer: Node) {
        if self.contributors.contains(&peer) {
            return;
        }
        if let Some(next) = self.state.next_needed() {
            tracing::debug!(peer = %peer, part = next, "new source for download");
            self.request(peer, next).await;
        }
    }

    async fn on_stall(&mut self) {
        tracing::debug!(
            hash = %hex::encode(self.digest.hash),
            remaining = self.state.remaining(),
            "download stalled, asking again"
        );
        let request = FileRequest {
            hash: self.digest.hash,
            requester: self.settings.self_node.clone(),
        };
        self.outbound
            .broadcast(Packet::new(Payload::FileRequest(request)))
            .await;

        let mut peers: Vec<Node> = self.contributors.iter().cloned().collect();
        peers.sort();
        for peer in peers {
            if let Some(next) = self.state.next_needed() {
                self.request(peer, next).await;
            }
        }
    }

    async fn request(&self, peer: Node, part: u16) {
        let request = FilePartRequest {
            hash: self.digest.hash,
            part,
        };
        self.outbound
            .send_to(peer, Packet::new(Payload::FilePartRequest(request)))
            .await;
    }

    fn finish(&self) -> DownloadOutcome {
        let hash = self.digest.hash;
        let outcome = match self.assemble() {
            Ok(path) => {
                tracing::info!(hash = %hex::encode(hash), path = %path.display(), "download complete");
                DownloadOutcome::Completed { hash, path }
            }
            Err(e) => {
                tracing::warn!(hash = %hex::encode(hash), error = %e, "download failed");
                DownloadOutcome::Failed {
                    hash,
                    reason: e.to_string(),
                }
            }
        };
        self.discard();
        outcome
    }

    /// Concatenate, verify, and move into the share directory.
    fn assemble(&self) -> Result<PathBuf> {
        let assembled = self.store.assemble(self.state.num_parts() as u64)?;
        if assembled.hash != self.digest.hash {
            bail!(
                "content hash mismatch: expected {}, got {}",
                hex::encode(self.digest.hash),
                hex::encode(assembled.hash)
            );
        }
        if let Some(parent) = self.dest.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        fs::rename(&assembled.path, &self.dest)
            .with_context(|| format!("failed to move file into {}", self.dest.display()))?;
        Ok(self.dest.clone())
    }

    fn discard(&self) {
        if let Err(e) = self.store.remove() {
            tracing::warn!(error = %e, "failed to clean up parts");
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
