//! File share: answers file queries and supervises downloads.
//!
//! Owns the local manifest and a registry of downloads keyed by content
//! hash. A Deployment for an unknown hash provisions a slot and asks the
//! swarm who has it; the first FileDigest answer starts the download task,
//! and later answers add sources to it.

use std::collections::HashMap;

use anyhow::Result;
use tokio::sync::{broadcast, mpsc};
use tokio::time::Instant;

use swarm_core::wire::{
    Deployment, FileDigest, FileHash, FilePart, FilePartRequest, FileRequest, Nonce, Payload,
};
use swarm_core::{ControlMessage, Node, Packet, PeerPacket};

use crate::dispatch::is_local_controller;
use crate::downloader::{DownloadHandle, DownloadOutcome, DownloadSettings, Downloader};
use crate::manifest::FileManifest;
use crate::outbound::Outbound;
use crate::parts::read_part;
use crate::roster::PeerRoster;

enum DownloadSlot {
    /// Asked the swarm at `asked`, waiting for the first FileDigest.
    Provisioned { asked: Instant },
    Running(DownloadHandle),
}

pub struct FileShare {
    settings: DownloadSettings,
    roster: PeerRoster,
    outbound: Outbound,
    manifest: FileManifest,
    downloads: HashMap<FileHash, DownloadSlot>,
    inbound: mpsc::Receiver<PeerPacket>,
    finished_tx: mpsc::Sender<DownloadOutcome>,
    finished_rx: mpsc::Receiver<DownloadOutcome>,
    shutdown: broadcast::Receiver<()>,
}

impl FileShare {
    pub fn new(
        settings: DownloadSettings,
        roster: PeerRoster,
        outbound: Outbound,
        inbound: mpsc::Receiver<PeerPacket>,
        shutdown: broadcast::Receiver<()>,
    ) -> Self {
        let manifest = FileManifest::scan(&settings.share_dir);
        let (finished_tx, finished_rx) = mpsc::channel(8);
        Self {
            settings,
            roster,
            outbound,
            manifest,
            downloads: HashMap::new(),
            inbound,
            finished_tx,
            finished_rx,
            shutdown,
        }
    }

    pub fn manifest(&self) -> &FileManifest {
        &self.manifest
    }

    pub async fn run(mut self) -> Result<()> {
        tracing::info!(
            share = %self.settings.share_dir.display(),
            files = self.manifest.len(),
            "file share starting"
        );

        let mut expiry = tokio::time::interval(self.settings.stall_timeout);
        loop {
            tokio::select! {
                _ = self.shutdown.recv() => {
                    tracing::info!("file share shutting down");
                    break;
                }

                _ = expiry.tick() => self.expire_provisioned(),

                msg = self.inbound.recv() => {
                    let Some(pp) = msg else {
                        tracing::info!("file sender dropped, file share exiting");
                        break;
                    };
                    self.handle(pp).await;
                }

                Some(outcome) = self.finished_rx.recv() => self.on_finished(outcome),
            }
        }

        for slot in self.downloads.values() {
            if let DownloadSlot::Running(handle) = slot {
                handle.cancel();
            }
        }
        Ok(())
    }

    fn rescan(&mut self) {
        self.manifest = FileManifest::scan(&self.settings.share_dir);
    }

    /// React to one file packet.
    pub async fn handle(&mut self, pp: PeerPacket) {
        let PeerPacket { packet, source } = pp;
        let nonce = packet.nonce;
        match packet.payload {
            Payload::Deployment(d) => self.on_deployment(nonce, d, source).await,
            Payload::FileRequest(r) => self.on_file_request(nonce, r).await,
            Payload::FileDigest(d) => self.on_digest(d, source),
            Payload::FilePart(p) => self.on_part(p, source),
            Payload::FilePartRequest(r) => self.on_part_request(r, source).await,
            Payload::Manifest(hashes) => {
                let missing = self.manifest.count_missing(&hashes);
                tracing::info!(peer = %source, files = hashes.len(), missing, "peer manifest received");
            }
            other => {
                tracing::debug!(peer = %source, kind = ?other.packet_type(), "unexpected packet for file share")
            }
        }
    }

    async fn on_deployment(&mut self, nonce: Nonce, deployment: Deployment, source: Node) {
        let hash = deployment.hash;
        self.outbound
            .broadcast(Packet::with_nonce(nonce, Payload::Deployment(deployment)))
            .await;

        self.rescan();
        let have = self.manifest.contains(&hash);

        if is_local_controller(&source, &self.roster, &self.settings.self_node) {
            let reply = if have {
                ControlMessage::DeployAck
            } else {
                ControlMessage::DeployError
            };
            self.outbound
                .send_to(source, Packet::message(reply.to_text()))
                .await;
        }

        if have {
            return;
        }

        let stall_timeout = self.settings.stall_timeout;
        match self.downloads.get_mut(&hash) {
            Some(DownloadSlot::Running(_)) => return,
            Some(DownloadSlot::Provisioned { asked }) => {
                if asked.elapsed() < stall_timeout {
                    return;
                }
                tracing::debug!(hash = %hex::encode(hash), "nobody answered yet, asking again");
                *asked = Instant::now();
            }
            None => {
                tracing::info!(hash = %hex::encode(hash), "deployment announced, locating file");
                self.downloads.insert(
                    hash,
                    DownloadSlot::Provisioned {
                        asked: Instant::now(),
                    },
                );
            }
        }
        self.request_file(hash).await;
    }

    async fn request_file(&self, hash: FileHash) {
        let request = FileRequest {
            hash,
            requester: self.settings.self_node.clone(),
        };
        self.outbound
            .broadcast(Packet::new(Payload::FileRequest(request)))
            .await;
    }

    /// Drop provisioned slots nobody answered within `max_stalls` stall
    /// periods, so a later deployment starts over.
    fn expire_provisioned(&mut self) {
        let limit = self.settings.stall_timeout * self.settings.max_stalls;
        self.downloads.retain(|hash, slot| match slot {
            DownloadSlot::Provisioned { asked } if asked.elapsed() >= limit => {
                tracing::warn!(hash = %hex::encode(hash), "no peer holds the file, giving up");
                false
            }
            _ => true,
        });
    }

    async fn on_file_request(&mut self, nonce: Nonce, request: FileRequest) {
        let FileRequest { hash, requester } = request.clone();
        self.outbound
            .broadcast(Packet::with_nonce(nonce, Payload::FileRequest(request)))
            .await;

        if requester == self.settings.self_node {
            return;
        }

        self.rescan();
        let Some(entry) = self.manifest.get(&hash) else {
            return;
        };
        let digest = FileDigest {
            hash,
            size: entry.size,
            name: entry.wire_name(),
        };
        tracing::debug!(peer = %requester, name = %digest.name, "offering file");
        self.outbound
            .send_to(requester, Packet::new(Payload::FileDigest(digest)))
            .await;
    }

    fn on_digest(&mut self, digest: FileDigest, source: Node) {
        let hash = digest.hash;
        let Some(slot) = self.downloads.get_mut(&hash) else {
            tracing::trace!(peer = %source, hash = %hex::encode(hash), "digest for untracked file");
            return;
        };

        if let DownloadSlot::Provisioned { .. } = slot {
            match Downloader::spawn(
                digest,
                &self.settings,
                self.outbound.clone(),
                self.finished_tx.clone(),
            ) {
                Ok(handle) => *slot = DownloadSlot::Running(handle),
                Err(e) => {
                    tracing::warn!(hash = %hex::encode(hash), error = %e, "cannot start download");
                    self.downloads.remove(&hash);
                    return;
                }
            }
        }

        if let DownloadSlot::Running(handle) = slot {
            if !handle.offer_peer(source.clone()) {
                tracing::trace!(peer = %source, "download busy, source dropped");
            }
        }
    }

    fn on_part(&mut self, part: FilePart, source: Node) {
        match self.downloads.get(&part.hash) {
            Some(DownloadSlot::Running(handle)) => {
                if !handle.offer_part(source, part) {
                    tracing::trace!("download queue full, part dropped");
                }
            }
            _ => tracing::trace!(peer = %source, "part for untracked file dropped"),
        }
    }

    async fn on_part_request(&mut self, request: FilePartRequest, source: Node) {
        let Some(entry) = self.manifest.get(&request.hash) else {
            return;
        };
        let path = self.manifest.path_of(entry);
        let data = match read_part(&path, request.part) {
            Ok(d) if d.is_empty() => {
                tracing::debug!(peer = %source, part = request.part, "part past end of file");
                return;
            }
            Ok(d) => d,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "failed to read part");
                return;
            }
        };
        let part = FilePart {
            hash: request.hash,
            part: request.part,
            data,
        };
        self.outbound
            .send_to(source, Packet::new(Payload::FilePart(part)))
            .await;
    }

    fn on_finished(&mut self, outcome: DownloadOutcome) {
        self.downloads.remove(outcome.hash());
        self.rescan();
        match &outcome {
            DownloadOutcome::Completed { path, .. } => {
                tracing::info!(path = %path.display(), files = self.manifest.len(), "file added to share")
            }
            DownloadOutcome::Failed { hash, reason } => {
                tracing::warn!(hash = %hex::encode(hash), %reason, "download failed")
            }
            DownloadOutcome::Abandoned { hash } => {
                tracing::warn!(hash = %hex::encode(hash), "download abandoned")
            }
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
