//! swarm-services: the node's moving parts.
//!
//! Each role runs as its own task and talks to the others only through
//! channels, plus the shared peer roster.

pub mod dedup;
pub mod dispatch;
pub mod downloader;
pub mod fileshare;
pub mod gossip;
pub mod manifest;
pub mod outbound;
pub mod parts;
pub mod roster;
pub mod runtime;
pub mod transport;

pub use dedup::DedupHistory;
pub use dispatch::Dispatcher;
pub use downloader::{DownloadOutcome, DownloadState, Downloader};
pub use fileshare::FileShare;
pub use gossip::{BootstrapPolicy, GossipTiming, MembershipManager};
pub use manifest::{FileManifest, ManifestEntry};
pub use outbound::{Outbound, OutboundReceivers};
pub use parts::PartStore;
pub use roster::PeerRoster;
pub use runtime::{NodeSettings, RunningNode};
