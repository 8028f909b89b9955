//! Cryptographic primitives for the swarm.
//!
//! Provides three things:
//!   1. Shared-key derivation from the operator passphrase
//!   2. Datagram encryption, ChaCha20-Poly1305 with a random nonce prefix
//!   3. BLAKE3 content hashes identifying shared files
//!
//! Key material derives ZeroizeOnDrop and is wiped from memory when dropped.
//! There is no unsafe code in this module.

use chacha20poly1305::aead::{Aead, KeyInit};
use chacha20poly1305::{ChaCha20Poly1305, Key, Nonce as AeadNonce};
use rand::RngCore;
use thiserror::Error;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::wire::{FileHash, Nonce, HASH_SIZE, NONCE_SIZE};

/// Bytes of AEAD nonce prepended to each ciphertext.
pub const AEAD_NONCE_SIZE: usize = 12;
/// Poly1305 tag length.
pub const AEAD_TAG_SIZE: usize = 16;

const KEY_CONTEXT: &str = "swarmd 2024-01-01 shared packet key";

// ── Shared Key ────────────────────────────────────────────────────────────────

/// The 256-bit symmetric key every node in a swarm shares.
///
/// Derived once at startup and never transmitted.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SharedKey([u8; 32]);

impl SharedKey {
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    fn cipher(&self) -> ChaCha20Poly1305 {
        ChaCha20Poly1305::new(Key::from_slice(&self.0))
    }
}

impl std::fmt::Debug for SharedKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SharedKey(..)")
    }
}

/// Derive the shared key from a passphrase. One-way and deterministic,
/// so every node configured with the same passphrase agrees on the key.
pub fn make_key(passphrase: &str) -> SharedKey {
    SharedKey(blake3::derive_key(KEY_CONTEXT, passphrase.as_bytes()))
}

// ── AEAD ──────────────────────────────────────────────────────────────────────

/// Encrypt a serialized packet. Output is `nonce(12) || ciphertext || tag(16)`.
pub fn encrypt_packet(key: &SharedKey, plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
    let mut nonce = [0u8; AEAD_NONCE_SIZE];
    rand::thread_rng().fill_bytes(&mut nonce);

    let sealed = key
        .cipher()
        .encrypt(AeadNonce::from_slice(&nonce), plaintext)
        .map_err(|_| CryptoError::Encrypt)?;

    let mut out = Vec::with_capacity(AEAD_NONCE_SIZE + sealed.len());
    out.extend_from_slice(&nonce);
    out.extend_from_slice(&sealed);
    Ok(out)
}

/// Reverse [`encrypt_packet`]. Fails on truncation or tag mismatch, which
/// is what a datagram sealed under a different passphrase looks like.
pub fn decrypt_packet(key: &SharedKey, ciphertext: &[u8]) -> Result<Vec<u8>, CryptoError> {
    if ciphertext.len() < AEAD_NONCE_SIZE + AEAD_TAG_SIZE {
        return Err(CryptoError::TooShort(ciphertext.len()));
    }
    let (nonce, sealed) = ciphertext.split_at(AEAD_NONCE_SIZE);
    key.cipher()
        .decrypt(AeadNonce::from_slice(nonce), sealed)
        .map_err(|_| CryptoError::Decrypt)
}

// ── Content Hashes ────────────────────────────────────────────────────────────

/// Hash file contents, truncated to the 16-byte wire hash.
pub fn content_hash(data: &[u8]) -> FileHash {
    truncate(blake3::hash(data))
}

fn truncate(digest: blake3::Hash) -> FileHash {
    let mut out = [0u8; HASH_SIZE];
    out.copy_from_slice(&digest.as_bytes()[..HASH_SIZE]);
    out
}

/// Incremental hasher for files read in pieces.
///
/// # Example
/// ```
/// use swarm_core::crypto::Hasher;
/// let mut h = Hasher::new();
/// h.update(b"hello ");
/// h.update(b"world");
/// assert_eq!(h.finalize(), swarm_core::crypto::content_hash(b"hello world"));
/// ```
pub struct Hasher(blake3::Hasher);

impl Hasher {
    pub fn new() -> Self {
        Self(blake3::Hasher::new())
    }

    pub fn update(&mut self, data: &[u8]) {
        self.0.update(data);
    }

    pub fn finalize(self) -> FileHash {
        truncate(self.0.finalize())
    }
}

impl Default for Hasher {
    fn default() -> Self {
        Self::new()
    }
}

/// Generate a random packet nonce.
pub fn generate_nonce() -> Nonce {
    let mut nonce = [0u8; NONCE_SIZE];
    rand::thread_rng().fill_bytes(&mut nonce);
    nonce
}

// ── Errors ────────────────────────────────────────────────────────────────────

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CryptoError {
    #[error("ciphertext too short: {0} bytes (need at least 28: 12 nonce + 16 tag)")]
    TooShort(usize),

    #[error("encryption failed")]
    Encrypt,

    #[error("decryption failed: wrong key or corrupted datagram")]
    Decrypt,
}

// ── Tests ─────────────────────────────────────────────────────────────────────
