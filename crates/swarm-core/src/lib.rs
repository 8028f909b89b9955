//! swarm-core: shared types, wire format, and cryptographic primitives.
//! All other swarm crates depend on this one.

pub mod config;
pub mod control;
pub mod crypto;
pub mod node;
pub mod wire;

pub use control::{ControlMessage, ModuleAction};
pub use node::Node;
pub use wire::{Packet, PacketType, Payload, PeerPacket};
