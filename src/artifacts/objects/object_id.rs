//! Object identifiers and the store-wide hash configuration
//!
//! An object id is the content hash of `"<type> <length>\0<content>"`.
//! A store is configured for exactly one hash algorithm; SHA-1 and SHA-256
//! ids are never mixed within one store.
//!
//! ## Format
//!
//! - SHA-1: 20 bytes, 40 lowercase hex characters
//! - SHA-256: 32 bytes, 64 lowercase hex characters
//!
//! ## Storage
//!
//! Loose objects live at `<first-2-hex-chars>/<remaining-hex-chars>` under
//! the objects root; the split is exposed here via [`ObjectId::to_path`].

use crate::errors::{Error, Result};
use sha1::{Digest, Sha1};
use sha2::Sha256;
use std::cmp::Ordering;
use std::path::PathBuf;

/// Widest id the store supports (SHA-256).
pub const MAX_OID_LEN: usize = 32;

/// Store-wide content hash algorithm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HashAlgorithm {
    #[default]
    Sha1,
    Sha256,
}

impl HashAlgorithm {
    /// Id width in bytes.
    pub fn oid_len(self) -> usize {
        match self {
            HashAlgorithm::Sha1 => 20,
            HashAlgorithm::Sha256 => 32,
        }
    }

    /// Id width in hex characters.
    pub fn hex_len(self) -> usize {
        self.oid_len() * 2
    }

    /// Hash a sequence of byte slices as one message.
    pub fn digest(self, parts: &[&[u8]]) -> ObjectId {
        let mut hasher = self.hasher();
        for part in parts {
            hasher.update(part);
        }
        hasher.finalize()
    }

    /// Start an incremental hash, used by streaming checksums over index
    /// and pack files.
    pub fn hasher(self) -> Hasher {
        match self {
            HashAlgorithm::Sha1 => Hasher::Sha1(Sha1::new()),
            HashAlgorithm::Sha256 => Hasher::Sha256(Sha256::new()),
        }
    }
}

/// Incremental hash over either supported algorithm.
#[derive(Debug, Clone)]
pub enum Hasher {
    Sha1(Sha1),
    Sha256(Sha256),
}

impl Hasher {
    pub fn update(&mut self, data: &[u8]) {
        match self {
            Hasher::Sha1(h) => h.update(data),
            Hasher::Sha256(h) => h.update(data),
        }
    }

    pub fn finalize(self) -> ObjectId {
        match self {
            Hasher::Sha1(h) => ObjectId::from_digest(&h.finalize()),
            Hasher::Sha256(h) => ObjectId::from_digest(&h.finalize()),
        }
    }
}

/// Content hash identifying a stored object.
///
/// Fixed-width byte array (20 or 32 bytes depending on the store's
/// algorithm). Equality and ordering are byte-wise; the hex form is
/// lowercase and exactly twice the byte length.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObjectId {
    len: u8,
    bytes: [u8; MAX_OID_LEN],
}

impl ObjectId {
    /// Parse and validate an id from its hex form.
    ///
    /// Fails with `InvalidFormat` when the length is neither 40 nor 64
    /// characters or a non-hex character is present.
    pub fn from_hex(hex_str: &str) -> Result<Self> {
        if hex_str.len() != 40 && hex_str.len() != 64 {
            return Err(Error::InvalidFormat(format!(
                "object id must be 40 or 64 hex characters, got {}",
                hex_str.len()
            )));
        }

        let decoded = hex::decode(hex_str)
            .map_err(|_| Error::InvalidFormat(format!("invalid hex in object id {hex_str:?}")))?;

        Self::from_bytes(&decoded)
    }

    /// Build an id from its raw byte form.
    ///
    /// Fails with `InvalidFormat` unless the slice is exactly 20 or 32
    /// bytes wide.
    pub fn from_bytes(raw: &[u8]) -> Result<Self> {
        if raw.len() != 20 && raw.len() != 32 {
            return Err(Error::InvalidFormat(format!(
                "object id must be 20 or 32 bytes, got {}",
                raw.len()
            )));
        }

        let mut bytes = [0u8; MAX_OID_LEN];
        bytes[..raw.len()].copy_from_slice(raw);

        Ok(ObjectId {
            len: raw.len() as u8,
            bytes,
        })
    }

    fn from_digest(digest: &[u8]) -> Self {
        let mut bytes = [0u8; MAX_OID_LEN];
        bytes[..digest.len()].copy_from_slice(digest);
        ObjectId {
            len: digest.len() as u8,
            bytes,
        }
    }

    /// The all-zero id of the given algorithm, used as a sentinel.
    pub fn zero(algorithm: HashAlgorithm) -> Self {
        ObjectId {
            len: algorithm.oid_len() as u8,
            bytes: [0u8; MAX_OID_LEN],
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes[..self.len as usize]
    }

    pub fn oid_len(&self) -> usize {
        self.len as usize
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.as_bytes())
    }

    pub fn is_zero(&self) -> bool {
        self.as_bytes().iter().all(|&b| b == 0)
    }

    /// Loose storage layout: first two hex characters form the directory,
    /// the remainder the file name.
    pub fn to_path(&self) -> PathBuf {
        let hex = self.to_hex();
        let (dir, file) = hex.split_at(2);
        PathBuf::from(dir).join(file)
    }

    /// Standard short form (first 7 hex characters).
    pub fn to_short_hex(&self) -> String {
        self.to_hex()[..7].to_string()
    }

    /// Whether the hex form of this id starts with the given prefix.
    pub fn starts_with_hex(&self, prefix: &str) -> bool {
        self.to_hex().starts_with(prefix)
    }
}

impl PartialOrd for ObjectId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ObjectId {
    fn cmp(&self, other: &Self) -> Ordering {
        self.as_bytes().cmp(other.as_bytes())
    }
}

impl std::fmt::Display for ObjectId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl std::fmt::Debug for ObjectId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ObjectId({})", self.to_hex())
    }
}
