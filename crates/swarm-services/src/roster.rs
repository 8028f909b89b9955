//! Peer roster: who this node gossips with and how many pings each has missed.

use std::sync::Arc;

use dashmap::DashMap;
use swarm_core::Node;

/// A peer that has missed this many pings in a row is evicted on the next
/// liveness cycle.
pub const MAX_MISSED_PINGS: u8 = 3;

/// Result of one liveness cycle.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct PingCycle {
    /// Peers that must be pinged now. Their miss counts were incremented.
    pub to_ping: Vec<Node>,
    /// Peers removed because they had exhausted their misses.
    pub evicted: Vec<Node>,
}

/// The shared peer roster.
///
/// Written by the gossip manager, read by the send worker for broadcast
/// fan-out and by the dispatcher for peer listing. Cloning shares the map.
#[derive(Clone, Default)]
pub struct PeerRoster {
    peers: Arc<DashMap<Node, u8>>,
}

impl PeerRoster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a peer with a clean miss count. Returns true if it was new.
    pub fn register(&self, node: Node) -> bool {
        self.peers.insert(node, 0).is_none()
    }

    /// Reset (or create) a peer's miss count after it answered a ping.
    pub fn reset(&self, node: Node) {
        self.peers.insert(node, 0);
    }

    pub fn remove(&self, node: &Node) -> bool {
        self.peers.remove(node).is_some()
    }

    pub fn contains(&self, node: &Node) -> bool {
        self.peers.contains_key(node)
    }

    pub fn missed_pings(&self, node: &Node) -> Option<u8> {
        self.peers.get(node).map(|e| *e.value())
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }

    /// Point-in-time copy of the peer set, sorted for stable output.
    pub fn snapshot(&self) -> Vec<Node> {
        let mut nodes: Vec<Node> = self.peers.iter().map(|e| e.key().clone()).collect();
        nodes.sort();
        nodes
    }

    /// Evict peers that have missed too many pings, then charge every
    /// survivor one miss and return them for pinging.
    pub fn ping_cycle(&self) -> PingCycle {
        let mut cycle = PingCycle::default();
        self.peers.retain(|node, missed| {
            if *missed >= MAX_MISSED_PINGS {
                cycle.evicted.push(node.clone());
                false
            } else {
                true
            }
        });
        for mut entry in self.peers.iter_mut() {
            *entry.value_mut() += 1;
            cycle.to_ping.push(entry.key().clone());
        }
        cycle.to_ping.sort();
        cycle.evicted.sort();
        cycle
    }
}
