//! Index entry representation
//!
//! Each entry records a staged file: its path, content id, conflict
//! stage and the stat metadata used for fast change detection.
//!
//! ## Entry Format
//!
//! Ten big-endian u32 stat fields, the raw object id, a 16-bit flag word
//! (assume-valid bit, extended bit, stage in bits 12-13, path length in
//! the low 12 bits), then the NUL-terminated path, padded with NULs to
//! 8-byte alignment.

use crate::artifacts::index::ENTRY_BLOCK;
use crate::artifacts::objects::entry_mode::EntryMode;
use crate::artifacts::objects::object_id::{HashAlgorithm, ObjectId};
use crate::errors::{Error, Result};
use bitflags::bitflags;
use byteorder::{ByteOrder, NetworkEndian, WriteBytesExt};
use bytes::Bytes;
use derive_new::new;
use is_executable::IsExecutable;
use std::cmp::min;
use std::fs::Metadata;
use std::io::Write;
use std::os::unix::prelude::MetadataExt;
use std::path::Path;

/// Longest path length representable in the flag word.
pub const MAX_PATH_SIZE: usize = 0x0fff;

bitflags! {
    /// The 16-bit per-entry flag word.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct EntryFlags: u16 {
        const ASSUME_VALID = 0x8000;
        const EXTENDED = 0x4000;
        const STAGE_MASK = 0x3000;
        const PATH_LEN_MASK = 0x0fff;
    }
}

const STAGE_SHIFT: u16 = 12;

/// A staged file.
///
/// Stage 0 is the normal case; stages 1-3 (ancestor, ours, theirs) only
/// appear while a merge conflict is unresolved.
#[derive(Debug, Clone, new)]
pub struct IndexEntry {
    /// File path relative to the repository root, `/`-separated.
    pub path: String,
    /// Content id of the staged blob.
    pub oid: ObjectId,
    /// Conflict stage, 0 through 3.
    pub stage: u8,
    /// Stat metadata for change detection.
    pub metadata: EntryMetadata,
}

impl IndexEntry {
    /// Stage-0 entry with the given mode, the common staging path.
    pub fn staged(path: impl Into<String>, oid: ObjectId, mode: EntryMode) -> Self {
        IndexEntry {
            path: path.into(),
            oid,
            stage: 0,
            metadata: EntryMetadata {
                mode,
                ..EntryMetadata::default()
            },
        }
    }

    /// Ordering key: byte-wise path order, then stage.
    pub fn key(&self) -> (String, u8) {
        (self.path.clone(), self.stage)
    }

    /// Parent directory paths from outermost to innermost, excluding the
    /// root itself.
    pub fn parent_dirs(&self) -> Vec<&str> {
        let mut dirs = Vec::new();
        for (i, c) in self.path.char_indices() {
            if c == '/' && i > 0 {
                dirs.push(&self.path[..i]);
            }
        }
        dirs
    }

    /// Fixed byte length before the path: ten u32 stat fields, the id,
    /// and the flag word.
    pub fn fixed_size(algorithm: HashAlgorithm) -> usize {
        40 + algorithm.oid_len() + 2
    }

    fn flags(&self) -> u16 {
        let stage_bits = ((self.stage as u16) << STAGE_SHIFT) & EntryFlags::STAGE_MASK.bits();
        stage_bits | min(self.path.len(), MAX_PATH_SIZE) as u16
    }

    /// Serialize into the on-disk entry form, NUL-padded to alignment.
    pub fn serialize(&self) -> Result<Bytes> {
        if self.path.is_empty() || self.path.contains('\0') {
            return Err(Error::InvalidFormat(format!(
                "invalid index entry path {:?}",
                self.path
            )));
        }
        if self.stage > 3 {
            return Err(Error::InvalidFormat(format!(
                "invalid conflict stage {}",
                self.stage
            )));
        }

        let mut bytes = Vec::new();
        bytes.write_u32::<NetworkEndian>(self.metadata.ctime as u32)?;
        bytes.write_u32::<NetworkEndian>(self.metadata.ctime_nsec as u32)?;
        bytes.write_u32::<NetworkEndian>(self.metadata.mtime as u32)?;
        bytes.write_u32::<NetworkEndian>(self.metadata.mtime_nsec as u32)?;
        bytes.write_u32::<NetworkEndian>(self.metadata.dev as u32)?;
        bytes.write_u32::<NetworkEndian>(self.metadata.ino as u32)?;
        bytes.write_u32::<NetworkEndian>(self.metadata.mode.as_u32())?;
        bytes.write_u32::<NetworkEndian>(self.metadata.uid)?;
        bytes.write_u32::<NetworkEndian>(self.metadata.gid)?;
        bytes.write_u32::<NetworkEndian>(self.metadata.size as u32)?;
        bytes.write_all(self.oid.as_bytes())?;
        bytes.write_u16::<NetworkEndian>(self.flags())?;
        bytes.write_all(self.path.as_bytes())?;

        // At least one NUL terminator, then pad to the alignment block.
        bytes.push(0);
        while bytes.len() % ENTRY_BLOCK != 0 {
            bytes.push(0);
        }

        Ok(Bytes::from(bytes))
    }

    /// Parse one aligned entry record.
    pub fn deserialize(bytes: &[u8], algorithm: HashAlgorithm) -> Result<Self> {
        let fixed = Self::fixed_size(algorithm);
        if bytes.len() < fixed + 1 {
            return Err(Error::corrupt("index file", "truncated entry"));
        }

        let ctime = NetworkEndian::read_u32(&bytes[0..4]) as i64;
        let ctime_nsec = NetworkEndian::read_u32(&bytes[4..8]) as i64;
        let mtime = NetworkEndian::read_u32(&bytes[8..12]) as i64;
        let mtime_nsec = NetworkEndian::read_u32(&bytes[12..16]) as i64;
        let dev = NetworkEndian::read_u32(&bytes[16..20]) as u64;
        let ino = NetworkEndian::read_u32(&bytes[20..24]) as u64;
        let mode = EntryMode::from_u32(NetworkEndian::read_u32(&bytes[24..28]))
            .map_err(|_| Error::corrupt("index file", "invalid entry mode"))?;
        let uid = NetworkEndian::read_u32(&bytes[28..32]);
        let gid = NetworkEndian::read_u32(&bytes[32..36]);
        let size = NetworkEndian::read_u32(&bytes[36..40]) as u64;

        let oid_len = algorithm.oid_len();
        let oid = ObjectId::from_bytes(&bytes[40..40 + oid_len])?;
        let flags = NetworkEndian::read_u16(&bytes[40 + oid_len..fixed]);
        let stage = ((flags & EntryFlags::STAGE_MASK.bits()) >> STAGE_SHIFT) as u8;

        let path_region = &bytes[fixed..];
        let path_end = path_region
            .iter()
            .position(|&b| b == 0)
            .ok_or_else(|| Error::corrupt("index file", "entry path missing NUL terminator"))?;
        let path = std::str::from_utf8(&path_region[..path_end])
            .map_err(|_| Error::corrupt("index file", "entry path is not valid UTF-8"))?
            .to_string();
        if path.is_empty() {
            return Err(Error::corrupt("index file", "empty entry path"));
        }

        Ok(IndexEntry {
            path,
            oid,
            stage,
            metadata: EntryMetadata {
                ctime,
                ctime_nsec,
                mtime,
                mtime_nsec,
                dev,
                ino,
                mode,
                uid,
                gid,
                size,
            },
        })
    }
}

/// Stat metadata stored alongside each entry.
///
/// Comparing these fields against a fresh `stat` detects workspace
/// changes without reading file content.
#[derive(Debug, Clone, Default)]
pub struct EntryMetadata {
    pub ctime: i64,
    pub ctime_nsec: i64,
    pub mtime: i64,
    pub mtime_nsec: i64,
    pub dev: u64,
    pub ino: u64,
    pub mode: EntryMode,
    pub uid: u32,
    pub gid: u32,
    pub size: u64,
}

impl EntryMetadata {
    pub fn stat_match(&self, other: &EntryMetadata) -> bool {
        (self.size == 0 || self.size == other.size) && self.mode == other.mode
    }

    pub fn times_match(&self, other: &EntryMetadata) -> bool {
        self.ctime == other.ctime
            && self.ctime_nsec == other.ctime_nsec
            && self.mtime == other.mtime
            && self.mtime_nsec == other.mtime_nsec
    }
}

impl From<(&Path, &Metadata)> for EntryMetadata {
    fn from((file_path, metadata): (&Path, &Metadata)) -> Self {
        let mode = if metadata.file_type().is_symlink() {
            EntryMode::Symlink
        } else if file_path.is_executable() {
            EntryMode::Executable
        } else {
            EntryMode::Regular
        };

        EntryMetadata {
            ctime: metadata.ctime(),
            ctime_nsec: metadata.ctime_nsec(),
            mtime: metadata.mtime(),
            mtime_nsec: metadata.mtime_nsec(),
            dev: metadata.dev(),
            ino: metadata.ino(),
            mode,
            uid: metadata.uid(),
            gid: metadata.gid(),
            size: metadata.size(),
        }
    }
}
