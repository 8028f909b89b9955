//! Swarm wire format: on-wire types for all node-to-node communication.
//!
//! Every packet is a 27-byte envelope followed by a type-specific payload:
//!
//! ```text
//! [length:2][type:1][nonce:20][checksum:4][payload...]
//! ```
//!
//! All integers are big-endian. `length` counts the whole packet, envelope
//! included. The checksum is CRC-32 (IEEE) over the whole packet with the
//! four checksum bytes zeroed, so it doubles as the dedup key: the random
//! nonce makes two sends of identical content distinct, while re-flooding
//! a received packet unchanged reproduces the same checksum.

use std::fmt;

use bytes::{Buf, BufMut};
use static_assertions::assert_eq_size;
use thiserror::Error;
use zerocopy::byteorder::{BigEndian, U16, U32};
use zerocopy::{AsBytes, FromBytes, FromZeroes};

use crate::crypto;
use crate::node::Node;

pub const NONCE_SIZE: usize = 20;
pub const CHECKSUM_SIZE: usize = 4;
pub const ENVELOPE_SIZE: usize = 27;
pub const CHECKSUM_OFFSET: usize = ENVELOPE_SIZE - CHECKSUM_SIZE;
pub const HASH_SIZE: usize = 16;
/// Data bytes carried by one FilePart.
pub const PART_SIZE: usize = 1024;
/// No encoder output exceeds this; receivers size their buffers to it.
pub const MAX_PACKET_SIZE: usize = 2048;

pub type Nonce = [u8; NONCE_SIZE];

/// Content hash identifying a shared file.
pub type FileHash = [u8; HASH_SIZE];

// ── Envelope ──────────────────────────────────────────────────────────────────

/// Common header present at the start of every packet.
///
/// Wire size: 27 bytes.
#[derive(Debug, Clone, Copy, AsBytes, FromBytes, FromZeroes)]
#[repr(C, packed)]
pub struct Envelope {
    /// Total packet length including this envelope.
    pub length: U16<BigEndian>,
    /// Discriminant, see [`PacketType`].
    pub packet_type: u8,
    /// Random per send. Independent of the transport AEAD nonce.
    pub nonce: Nonce,
    /// CRC-32 over the packet with this field zeroed.
    pub checksum: U32<BigEndian>,
}

// Compile-time size guard. If this fails, the wire format has silently changed.
assert_eq_size!(Envelope, [u8; ENVELOPE_SIZE]);

// ── Packet Type ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum PacketType {
    Message = 1,
    Manifest = 2,
    FileDigest = 3,
    FilePart = 4,
    FilePartRequest = 5,
    FileRequest = 6,
    Deployment = 7,
    ConnectionRequest = 8,
    ConnectionShare = 9,
    ConnectionAck = 10,
}

impl TryFrom<u8> for PacketType {
    type Error = WireError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Self::Message),
            2 => Ok(Self::Manifest),
            3 => Ok(Self::FileDigest),
            4 => Ok(Self::FilePart),
            5 => Ok(Self::FilePartRequest),
            6 => Ok(Self::FileRequest),
            7 => Ok(Self::Deployment),
            8 => Ok(Self::ConnectionRequest),
            9 => Ok(Self::ConnectionShare),
            10 => Ok(Self::ConnectionAck),
            other => Err(WireError::UnknownType(other)),
        }
    }
}

impl From<PacketType> for u8 {
    fn from(t: PacketType) -> u8 {
        t as u8
    }
}

// ── Payloads ──────────────────────────────────────────────────────────────────

/// Announces a file's size and share-relative name to a requester.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileDigest {
    pub hash: FileHash,
    pub size: u32,
    /// Share-relative path, `/`-separated.
    pub name: String,
}

/// One 1024-byte slice of a file. Only the final part is shorter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilePart {
    pub hash: FileHash,
    pub part: u16,
    pub data: Vec<u8>,
}

impl FilePart {
    /// Bytes short of a full part. Sent on the wire ahead of the data.
    pub fn padding(&self) -> u16 {
        PART_SIZE.saturating_sub(self.data.len()) as u16
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FilePartRequest {
    pub hash: FileHash,
    pub part: u16,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileRequest {
    pub hash: FileHash,
    /// Where the FileDigest answer should go.
    pub requester: Node,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Deployment {
    pub hash: FileHash,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionRequest {
    /// Number of peers the requester wants.
    pub threshold: u8,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionShare {
    pub requester: Node,
    pub threshold: u8,
}

/// Packet body. One variant per [`PacketType`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    Message(String),
    Manifest(Vec<FileHash>),
    FileDigest(FileDigest),
    FilePart(FilePart),
    FilePartRequest(FilePartRequest),
    FileRequest(FileRequest),
    Deployment(Deployment),
    ConnectionRequest(ConnectionRequest),
    ConnectionShare(ConnectionShare),
    ConnectionAck,
}

impl Payload {
    pub fn packet_type(&self) -> PacketType {
        match self {
            Payload::Message(_) => PacketType::Message,
            Payload::Manifest(_) => PacketType::Manifest,
            Payload::FileDigest(_) => PacketType::FileDigest,
            Payload::FilePart(_) => PacketType::FilePart,
            Payload::FilePartRequest(_) => PacketType::FilePartRequest,
            Payload::FileRequest(_) => PacketType::FileRequest,
            Payload::Deployment(_) => PacketType::Deployment,
            Payload::ConnectionRequest(_) => PacketType::ConnectionRequest,
            Payload::ConnectionShare(_) => PacketType::ConnectionShare,
            Payload::ConnectionAck => PacketType::ConnectionAck,
        }
    }

    fn write_to(&self, buf: &mut Vec<u8>) -> Result<(), WireError> {
        match self {
            Payload::Message(text) => buf.put_slice(text.as_bytes()),
            Payload::Manifest(hashes) => {
                for hash in hashes {
                    buf.put_slice(hash);
                }
            }
            Payload::FileDigest(d) => {
                buf.put_slice(&d.hash);
                buf.put_u32(d.size);
                buf.put_slice(d.name.as_bytes());
            }
            Payload::FilePart(p) => {
                if p.data.len() > PART_SIZE {
                    return Err(WireError::FieldTooLong("part data"));
                }
                buf.put_slice(&p.hash);
                buf.put_u16(p.part);
                buf.put_u16(p.padding());
                buf.put_slice(&p.data);
            }
            Payload::FilePartRequest(r) => {
                buf.put_slice(&r.hash);
                buf.put_u16(r.part);
            }
            Payload::FileRequest(r) => {
                buf.put_slice(&r.hash);
                put_node(buf, &r.requester)?;
            }
            Payload::Deployment(d) => buf.put_slice(&d.hash),
            Payload::ConnectionRequest(r) => buf.put_u8(r.threshold),
            Payload::ConnectionShare(s) => {
                put_node(buf, &s.requester)?;
                buf.put_u8(s.threshold);
            }
            Payload::ConnectionAck => {}
        }
        Ok(())
    }

    fn read_from(packet_type: PacketType, mut body: &[u8]) -> Result<Self, WireError> {
        let buf = &mut body;
        let payload = match packet_type {
            PacketType::Message => Payload::Message(String::from_utf8_lossy(buf).into_owned()),
            PacketType::Manifest => Payload::Manifest(
                buf.chunks_exact(HASH_SIZE)
                    .map(|c| {
                        let mut hash = [0u8; HASH_SIZE];
                        hash.copy_from_slice(c);
                        hash
                    })
                    .collect(),
            ),
            PacketType::FileDigest => {
                let hash = take_hash(buf, packet_type)?;
                let size = take_u32(buf, packet_type)?;
                let name = String::from_utf8(buf.to_vec()).map_err(|_| WireError::Malformed {
                    packet_type,
                    reason: "file name is not UTF-8",
                })?;
                Payload::FileDigest(FileDigest { hash, size, name })
            }
            PacketType::FilePart => {
                let hash = take_hash(buf, packet_type)?;
                let part = take_u16(buf, packet_type)?;
                let padding = take_u16(buf, packet_type)? as usize;
                let expected = PART_SIZE.checked_sub(padding).ok_or(WireError::Malformed {
                    packet_type,
                    reason: "padding exceeds part size",
                })?;
                if buf.len() != expected {
                    return Err(WireError::Malformed {
                        packet_type,
                        reason: "data length disagrees with padding",
                    });
                }
                Payload::FilePart(FilePart {
                    hash,
                    part,
                    data: buf.to_vec(),
                })
            }
            PacketType::FilePartRequest => Payload::FilePartRequest(FilePartRequest {
                hash: take_hash(buf, packet_type)?,
                part: take_u16(buf, packet_type)?,
            }),
            PacketType::FileRequest => Payload::FileRequest(FileRequest {
                hash: take_hash(buf, packet_type)?,
                requester: take_node(buf, packet_type)?,
            }),
            PacketType::Deployment => Payload::Deployment(Deployment {
                hash: take_hash(buf, packet_type)?,
            }),
            PacketType::ConnectionRequest => Payload::ConnectionRequest(ConnectionRequest {
                threshold: take_u8(buf, packet_type)?,
            }),
            PacketType::ConnectionShare => Payload::ConnectionShare(ConnectionShare {
                requester: take_node(buf, packet_type)?,
                threshold: take_u8(buf, packet_type)?,
            }),
            PacketType::ConnectionAck => Payload::ConnectionAck,
        };
        Ok(payload)
    }
}

// ── Field helpers ─────────────────────────────────────────────────────────────

fn need(buf: &&[u8], n: usize, packet_type: PacketType) -> Result<(), WireError> {
    if buf.remaining() < n {
        return Err(WireError::Malformed {
            packet_type,
            reason: "payload ends early",
        });
    }
    Ok(())
}

fn take_u8(buf: &mut &[u8], packet_type: PacketType) -> Result<u8, WireError> {
    need(buf, 1, packet_type)?;
    Ok(buf.get_u8())
}

fn take_u16(buf: &mut &[u8], packet_type: PacketType) -> Result<u16, WireError> {
    need(buf, 2, packet_type)?;
    Ok(buf.get_u16())
}

fn take_u32(buf: &mut &[u8], packet_type: PacketType) -> Result<u32, WireError> {
    need(buf, 4, packet_type)?;
    Ok(buf.get_u32())
}

fn take_hash(buf: &mut &[u8], packet_type: PacketType) -> Result<FileHash, WireError> {
    need(buf, HASH_SIZE, packet_type)?;
    let mut hash = [0u8; HASH_SIZE];
    buf.copy_to_slice(&mut hash);
    Ok(hash)
}

/// `addrLen:2 | addr | port:2`
fn take_node(buf: &mut &[u8], packet_type: PacketType) -> Result<Node, WireError> {
    let len = take_u16(buf, packet_type)? as usize;
    need(buf, len, packet_type)?;
    let address = std::str::from_utf8(&buf[..len])
        .map_err(|_| WireError::Malformed {
            packet_type,
            reason: "address is not UTF-8",
        })?
        .to_string();
    buf.advance(len);
    let port = take_u16(buf, packet_type)?;
    Ok(Node { address, port })
}

fn put_node(buf: &mut Vec<u8>, node: &Node) -> Result<(), WireError> {
    let len = u16::try_from(node.address.len()).map_err(|_| WireError::FieldTooLong("address"))?;
    buf.put_u16(len);
    buf.put_slice(node.address.as_bytes());
    buf.put_u16(node.port);
    Ok(())
}

// ── Checksum ──────────────────────────────────────────────────────────────────

/// CRC-32 of `packet` as if its checksum field were zero.
/// `packet` must be at least [`ENVELOPE_SIZE`] bytes.
fn compute_checksum(packet: &[u8]) -> u32 {
    let mut hasher = crc32fast::Hasher::new();
    hasher.update(&packet[..CHECKSUM_OFFSET]);
    hasher.update(&[0u8; CHECKSUM_SIZE]);
    hasher.update(&packet[ENVELOPE_SIZE..]);
    hasher.finalize()
}

/// Check the envelope checksum of a serialized packet. Bytes past the
/// declared length are ignored.
pub fn verify_checksum(bytes: &[u8]) -> bool {
    let Some(envelope) = Envelope::read_from_prefix(bytes) else {
        return false;
    };
    let length = envelope.length.get() as usize;
    if length < ENVELOPE_SIZE || length > bytes.len() {
        return false;
    }
    compute_checksum(&bytes[..length]) == envelope.checksum.get()
}

// ── Packet ────────────────────────────────────────────────────────────────────

/// A decoded or to-be-sent packet.
#[derive(Debug, Clone)]
pub struct Packet {
    pub nonce: Nonce,
    pub payload: Payload,
    checksum: u32,
    valid: bool,
}

impl Packet {
    /// A fresh packet with a random nonce.
    pub fn new(payload: Payload) -> Self {
        Self::with_nonce(crypto::generate_nonce(), payload)
    }

    pub fn with_nonce(nonce: Nonce, payload: Payload) -> Self {
        Self {
            nonce,
            payload,
            checksum: 0,
            valid: true,
        }
    }

    pub fn message(text: impl Into<String>) -> Self {
        Self::new(Payload::Message(text.into()))
    }

    pub fn packet_type(&self) -> PacketType {
        self.payload.packet_type()
    }

    /// Checksum read off the wire. Zero for locally built packets.
    pub fn checksum(&self) -> u32 {
        self.checksum
    }

    /// Whether the wire checksum matched. Always true for locally built packets.
    pub fn is_valid(&self) -> bool {
        self.valid
    }

    /// Serialize. Fields are written with the checksum zeroed, then the CRC
    /// over the finished buffer is patched into place.
    pub fn encode(&self) -> Result<Vec<u8>, WireError> {
        let mut buf = Vec::with_capacity(ENVELOPE_SIZE + 64);
        buf.resize(ENVELOPE_SIZE, 0);
        self.payload.write_to(&mut buf)?;
        if buf.len() > MAX_PACKET_SIZE {
            return Err(WireError::TooLarge(buf.len()));
        }

        let envelope = Envelope {
            length: U16::new(buf.len() as u16),
            packet_type: self.packet_type().into(),
            nonce: self.nonce,
            checksum: U32::new(0),
        };
        buf[..ENVELOPE_SIZE].copy_from_slice(envelope.as_bytes());

        let checksum = compute_checksum(&buf);
        buf[CHECKSUM_OFFSET..ENVELOPE_SIZE].copy_from_slice(&checksum.to_be_bytes());
        Ok(buf)
    }

    /// Parse a serialized packet. A checksum mismatch is not an error here;
    /// it is reported through [`Packet::is_valid`].
    pub fn decode(bytes: &[u8]) -> Result<Self, WireError> {
        let envelope = Envelope::read_from_prefix(bytes).ok_or(WireError::TooShort(bytes.len()))?;
        let length = envelope.length.get() as usize;
        if length < ENVELOPE_SIZE {
            return Err(WireError::BadLength(length));
        }
        if length > bytes.len() {
            return Err(WireError::Truncated {
                declared: length,
                actual: bytes.len(),
            });
        }

        let packet = &bytes[..length];
        let packet_type = PacketType::try_from(envelope.packet_type)?;
        let checksum = envelope.checksum.get();
        let payload = Payload::read_from(packet_type, &packet[ENVELOPE_SIZE..])?;

        Ok(Self {
            nonce: envelope.nonce,
            payload,
            checksum,
            valid: compute_checksum(packet) == checksum,
        })
    }
}

impl fmt::Display for Packet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.payload {
            Payload::Message(text) => write!(f, "Message[{text}]"),
            Payload::Manifest(hashes) => write!(f, "Manifest[{} files]", hashes.len()),
            Payload::FileDigest(d) => write!(
                f,
                "FileDigest[{} {} bytes {}]",
                hex::encode(d.hash),
                d.size,
                d.name
            ),
            Payload::FilePart(p) => write!(
                f,
                "FilePart[{} #{} {} bytes]",
                hex::encode(p.hash),
                p.part,
                p.data.len()
            ),
            Payload::FilePartRequest(r) => {
                write!(f, "FilePartRequest[{} #{}]", hex::encode(r.hash), r.part)
            }
            Payload::FileRequest(r) => {
                write!(f, "FileRequest[{} for {}]", hex::encode(r.hash), r.requester)
            }
            Payload::Deployment(d) => write!(f, "Deployment[{}]", hex::encode(d.hash)),
            Payload::ConnectionRequest(r) => write!(f, "ConnectionRequest[{}]", r.threshold),
            Payload::ConnectionShare(s) => {
                write!(f, "ConnectionShare[{} wants {}]", s.requester, s.threshold)
            }
            Payload::ConnectionAck => write!(f, "ConnectionAck"),
        }
    }
}

/// A decoded packet tagged with the endpoint it arrived from.
#[derive(Debug, Clone)]
pub struct PeerPacket {
    pub packet: Packet,
    pub source: Node,
}

// ── Errors ────────────────────────────────────────────────────────────────────

#[derive(Debug, Error, PartialEq, Eq)]
pub enum WireError {
    #[error("packet too short: {0} bytes, envelope needs 27")]
    TooShort(usize),

    #[error("declared length {0} is shorter than the envelope")]
    BadLength(usize),

    #[error("declared length {declared} exceeds datagram size {actual}")]
    Truncated { declared: usize, actual: usize },

    #[error("unknown packet type: {0}")]
    UnknownType(u8),

    #[error("malformed {packet_type:?} payload: {reason}")]
    Malformed {
        packet_type: PacketType,
        reason: &'static str,
    },

    #[error("encoded packet is {0} bytes, limit is 2048")]
    TooLarge(usize),

    #[error("{0} does not fit its wire field")]
    FieldTooLong(&'static str),
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    const HASH: FileHash = [0xab; HASH_SIZE];

    fn every_variant() -> Vec<Payload> {
        vec![
            Payload::Message("__PING_REQ".into()),
            Payload::Manifest(vec![HASH, [0x01; HASH_SIZE]]),
            Payload::FileDigest(FileDigest {
                hash: HASH,
                size: 2500,
                name: "modules/web.swm".into(),
            }),
            Payload::FilePart(FilePart {
                hash: HASH,
                part: 2,
                data: vec![7u8; 452],
            }),
            Payload::FilePartRequest(FilePartRequest { hash: HASH, part: 9 }),
            Payload::FileRequest(FileRequest {
                hash: HASH,
                requester: Node::new("10.1.2.3", 51234),
            }),
            Payload::Deployment(Deployment { hash: HASH }),
            Payload::ConnectionRequest(ConnectionRequest { threshold: 4 }),
            Payload::ConnectionShare(ConnectionShare {
                requester: Node::new("fe80::1", 6000),
                threshold: 2,
            }),
            Payload::ConnectionAck,
        ]
    }

    #[test]
    fn envelope_is_27_bytes() {
        assert_eq!(std::mem::size_of::<Envelope>(), 27);
        let bytes = Packet::new(Payload::ConnectionAck).encode().unwrap();
        assert_eq!(bytes.len(), ENVELOPE_SIZE);
        assert_eq!(&bytes[..2], &[0, 27]);
        assert_eq!(bytes[2], 10);
    }

    #[test]
    fn every_variant_round_trips() {
        for payload in every_variant() {
            let packet = Packet::new(payload.clone());
            let bytes = packet.encode().unwrap();
            let decoded = Packet::decode(&bytes).unwrap();
            assert!(decoded.is_valid(), "{payload:?}");
            assert_eq!(decoded.nonce, packet.nonce);
            assert_eq!(decoded.payload, payload);
            assert_eq!(decoded.packet_type(), payload.packet_type());
            assert!(verify_checksum(&bytes));
        }
    }

    #[test]
    fn connection_request_payload_is_one_byte() {
        let bytes = Packet::new(Payload::ConnectionRequest(ConnectionRequest { threshold: 3 }))
            .encode()
            .unwrap();
        assert_eq!(bytes.len(), ENVELOPE_SIZE + 1);
        assert_eq!(bytes[ENVELOPE_SIZE], 3);
    }

    #[test]
    fn file_part_layout() {
        // 2500-byte file: part 2 carries the last 452 bytes.
        let part = FilePart {
            hash: HASH,
            part: 2,
            data: vec![1u8; 452],
        };
        assert_eq!(part.padding(), 572);
        let bytes = Packet::new(Payload::FilePart(part)).encode().unwrap();
        let body = &bytes[ENVELOPE_SIZE..];
        assert_eq!(&body[16..18], &[0, 2]);
        assert_eq!(u16::from_be_bytes([body[18], body[19]]), 572);
        assert_eq!(body.len(), 16 + 2 + 2 + 452);
    }

    #[test]
    fn file_part_with_wrong_padding_is_rejected() {
        let mut bytes = Packet::new(Payload::FilePart(FilePart {
            hash: HASH,
            part: 0,
            data: vec![0u8; 100],
        }))
        .encode()
        .unwrap();
        // Claim a full part while carrying only 100 bytes.
        bytes[ENVELOPE_SIZE + 18] = 0;
        bytes[ENVELOPE_SIZE + 19] = 0;
        assert!(matches!(
            Packet::decode(&bytes),
            Err(WireError::Malformed {
                packet_type: PacketType::FilePart,
                ..
            })
        ));
    }

    #[test]
    fn oversized_part_data_is_refused() {
        let packet = Packet::new(Payload::FilePart(FilePart {
            hash: HASH,
            part: 0,
            data: vec![0u8; PART_SIZE + 1],
        }));
        assert_eq!(packet.encode(), Err(WireError::FieldTooLong("part data")));
    }

    #[test]
    fn encode_refuses_packets_over_limit() {
        let packet = Packet::message("x".repeat(MAX_PACKET_SIZE));
        assert!(matches!(packet.encode(), Err(WireError::TooLarge(_))));
    }

    #[test]
    fn single_bit_flip_breaks_checksum() {
        let bytes = Packet::new(Payload::FileDigest(FileDigest {
            hash: HASH,
            size: 1234,
            name: "a.bin".into(),
        }))
        .encode()
        .unwrap();

        for i in ENVELOPE_SIZE..bytes.len() {
            for bit in 0..8 {
                let mut corrupt = bytes.clone();
                corrupt[i] ^= 1 << bit;
                assert!(!verify_checksum(&corrupt), "byte {i} bit {bit}");
            }
        }
    }

    #[test]
    fn corrupt_message_decodes_but_is_invalid() {
        let mut bytes = Packet::message("hello").encode().unwrap();
        bytes[ENVELOPE_SIZE] ^= 0x20;
        let decoded = Packet::decode(&bytes).unwrap();
        assert!(!decoded.is_valid());
    }

    #[test]
    fn same_nonce_and_payload_give_same_checksum() {
        let nonce = [9u8; NONCE_SIZE];
        let a = Packet::with_nonce(nonce, Payload::ConnectionAck).encode().unwrap();
        let b = Packet::with_nonce(nonce, Payload::ConnectionAck).encode().unwrap();
        assert_eq!(a, b);

        let c = Packet::new(Payload::ConnectionAck).encode().unwrap();
        assert_ne!(a[CHECKSUM_OFFSET..ENVELOPE_SIZE], c[CHECKSUM_OFFSET..ENVELOPE_SIZE]);
    }

    #[test]
    fn short_buffer_is_rejected() {
        assert!(matches!(Packet::decode(&[0u8; 26]), Err(WireError::TooShort(26))));
        assert!(!verify_checksum(&[0u8; 10]));
    }

    #[test]
    fn declared_length_beyond_buffer_is_rejected() {
        let mut bytes = Packet::message("hi").encode().unwrap();
        bytes[1] = 200;
        assert!(matches!(
            Packet::decode(&bytes),
            Err(WireError::Truncated { declared: 200, .. })
        ));
    }

    #[test]
    fn trailing_bytes_past_length_are_ignored() {
        let mut bytes = Packet::message("hi").encode().unwrap();
        bytes.extend_from_slice(&[0xff; 40]);
        let decoded = Packet::decode(&bytes).unwrap();
        assert!(decoded.is_valid());
        assert_eq!(decoded.payload, Payload::Message("hi".into()));
    }

    #[test]
    fn unknown_type_is_distinct_error() {
        let mut bytes = Packet::new(Payload::ConnectionAck).encode().unwrap();
        bytes[2] = 42;
        assert!(matches!(Packet::decode(&bytes), Err(WireError::UnknownType(42))));
    }

    #[test]
    fn packet_type_round_trip() {
        for tag in 1u8..=10 {
            let t = PacketType::try_from(tag).unwrap();
            assert_eq!(u8::from(t), tag);
        }
        assert!(PacketType::try_from(0).is_err());
        assert!(PacketType::try_from(11).is_err());
    }

    #[test]
    fn display_names_the_variant() {
        let p = Packet::new(Payload::FilePartRequest(FilePartRequest { hash: HASH, part: 3 }));
        let text = p.to_string();
        assert!(text.starts_with("FilePartRequest["));
        assert!(text.ends_with("#3]"));
    }
}
