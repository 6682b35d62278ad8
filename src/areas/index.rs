//! The staging area
//!
//! Tracks the files destined for the next commit, keyed by (path,
//! conflict stage). Stage 0 is a normally staged file; stages 1-3 hold
//! the ancestor/ours/theirs sides of an unresolved merge conflict.
//!
//! ## On disk
//!
//! The `DIRC` v2 format: header, sorted entries, optional extensions,
//! trailing checksum. Reads take a shared lock on the index file; writes
//! go through a git-style `index.lock` created with create-new semantics
//! and renamed over the index, so a held lock surfaces as `Locked`
//! instead of blocking.
//!
//! ## Data Structures
//!
//! - `entries`: (path, stage) -> entry, in byte-wise path order
//! - `children`: directory path -> entry paths beneath it, for
//!   file/directory conflict eviction

use crate::areas::database::Database;
use crate::artifacts::index::checksum::Checksum;
use crate::artifacts::index::index_entry::{EntryMetadata, IndexEntry};
use crate::artifacts::index::index_header::IndexHeader;
use crate::artifacts::index::{ENTRY_BLOCK, EXTENSION_HEADER_SIZE, HEADER_SIZE};
use crate::artifacts::objects::entry_mode::EntryMode;
use crate::artifacts::objects::object_id::{HashAlgorithm, ObjectId};
use crate::artifacts::trees::update::{self, TreeUpdate};
use crate::errors::{Error, Result};
use byteorder::{ByteOrder, NetworkEndian};
use std::collections::{BTreeMap, BTreeSet};
use std::io::Read;
use std::ops::DerefMut;
use std::path::Path;

/// The three conflict sides installed by [`Index::add_conflict`], in
/// stage order: ancestor, ours, theirs.
pub type ConflictSides = [Option<(ObjectId, EntryMode)>; 3];

/// The staging area, in memory.
#[derive(Debug, Clone)]
pub struct Index {
    /// Path to the index file (typically `.git/index`)
    path: Box<Path>,
    algorithm: HashAlgorithm,
    /// Staged entries by (path, stage)
    entries: BTreeMap<(String, u8), IndexEntry>,
    /// Directory hierarchy for file/directory conflict eviction
    children: BTreeMap<String, BTreeSet<String>>,
    header: IndexHeader,
    /// Set when the in-memory state has diverged from disk
    changed: bool,
}

impl Index {
    /// Create a new empty index bound to a file path.
    pub fn new(path: impl AsRef<Path>, algorithm: HashAlgorithm) -> Self {
        Index {
            path: path.as_ref().to_path_buf().into_boxed_path(),
            algorithm,
            entries: BTreeMap::new(),
            children: BTreeMap::new(),
            header: IndexHeader::empty(),
            changed: false,
        }
    }

    /// Load an index file from disk, verifying its checksum.
    pub fn load_from(path: impl AsRef<Path>, algorithm: HashAlgorithm) -> Result<Self> {
        let mut index = Index::new(path, algorithm);
        index.rehydrate()?;
        Ok(index)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn algorithm(&self) -> HashAlgorithm {
        self.algorithm
    }

    fn clear(&mut self) {
        self.entries.clear();
        self.children.clear();
        self.header = IndexHeader::empty();
        self.changed = false;
    }

    /// Re-read the index file, replacing all in-memory state.
    ///
    /// A missing or empty file is an empty index. Holds a shared lock on
    /// the file for the duration of the read.
    pub fn rehydrate(&mut self) -> Result<()> {
        self.clear();
        if !self.path.exists() {
            return Ok(());
        }

        let mut file = std::fs::OpenOptions::new().read(true).open(&self.path)?;
        let len = file.metadata()?.len();
        if len == 0 {
            return Ok(());
        }

        let mut lock = file_guard::lock(&mut file, file_guard::Lock::Shared, 0, 1)?;
        self.parse_from(lock.deref_mut(), len)
    }

    /// Parse an index image from a byte buffer, verifying its checksum.
    pub fn read(&mut self, bytes: &[u8]) -> Result<()> {
        self.clear();
        if bytes.is_empty() {
            return Ok(());
        }
        self.parse_from(bytes, bytes.len() as u64)
    }

    fn parse_from(&mut self, source: impl Read, total_len: u64) -> Result<()> {
        let oid_len = self.algorithm.oid_len() as u64;
        if total_len < HEADER_SIZE as u64 + oid_len {
            return Err(Error::corrupt("index file", "file too small"));
        }

        let mut reader = Checksum::new(source, self.algorithm);
        let mut consumed = 0u64;

        let header_bytes = reader.read(HEADER_SIZE)?;
        consumed += HEADER_SIZE as u64;
        let header = IndexHeader::deserialize(&header_bytes)?;

        consumed += self.parse_entries(header.entries_count, &mut reader)?;
        let remaining = (total_len - oid_len)
            .checked_sub(consumed)
            .ok_or_else(|| Error::corrupt("index file", "entries run past trailer"))?;
        self.skip_extensions(&mut reader, remaining)?;

        self.header = header;
        reader.verify()
    }

    /// Parse all entries, handling variable-length paths with 8-byte
    /// alignment. Returns the byte count consumed.
    fn parse_entries(
        &mut self,
        entries_count: u32,
        reader: &mut Checksum<impl Read>,
    ) -> Result<u64> {
        // Smallest record: fixed part + one-byte path + terminator,
        // rounded up to the alignment block.
        let min_size =
            (IndexEntry::fixed_size(self.algorithm) + 2).next_multiple_of(ENTRY_BLOCK);
        let mut consumed = 0u64;

        for _ in 0..entries_count {
            let mut entry_bytes = reader.read(min_size)?.to_vec();
            while entry_bytes[entry_bytes.len() - 1] != 0 {
                entry_bytes.extend_from_slice(&reader.read(ENTRY_BLOCK)?);
            }
            consumed += entry_bytes.len() as u64;

            let entry = IndexEntry::deserialize(&entry_bytes, self.algorithm)?;
            self.store_entry(entry);
        }

        Ok(consumed)
    }

    /// Skip over trailing extensions. Optional extensions (signature
    /// starting with an ASCII uppercase letter) are ignored; anything
    /// else is a mandatory extension this implementation cannot honor.
    fn skip_extensions(
        &self,
        reader: &mut Checksum<impl Read>,
        mut remaining: u64,
    ) -> Result<()> {
        while remaining > 0 {
            if remaining < EXTENSION_HEADER_SIZE as u64 {
                return Err(Error::corrupt("index file", "truncated extension header"));
            }
            let header = reader.read(EXTENSION_HEADER_SIZE)?;
            let payload_len = NetworkEndian::read_u32(&header[4..8]) as u64;

            if !header[0].is_ascii_uppercase() {
                return Err(Error::corrupt(
                    "index file",
                    format!(
                        "unsupported mandatory extension {:?}",
                        String::from_utf8_lossy(&header[..4])
                    ),
                ));
            }
            if payload_len > remaining - EXTENSION_HEADER_SIZE as u64 {
                return Err(Error::corrupt("index file", "extension runs past trailer"));
            }
            reader.read(payload_len as usize)?;
            remaining -= EXTENSION_HEADER_SIZE as u64 + payload_len;
        }
        Ok(())
    }

    /// Look up the entry at (path, stage).
    pub fn entry(&self, path: &str, stage: u8) -> Option<&IndexEntry> {
        self.entries.get(&(path.to_string(), stage))
    }

    /// Whether any unresolved conflict stage is present.
    pub fn has_conflicts(&self) -> bool {
        self.entries.keys().any(|(_, stage)| *stage != 0)
    }

    /// Whether the in-memory state differs from what was last loaded or
    /// written.
    pub fn is_changed(&self) -> bool {
        self.changed
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Snapshot iteration: the returned iterator owns a copy of the
    /// ordered entry list and is unaffected by later mutation.
    pub fn entries(&self) -> impl Iterator<Item = IndexEntry> + use<> {
        self.entries.values().cloned().collect::<Vec<_>>().into_iter()
    }

    /// Remove entries that conflict with `path` on the file/directory
    /// axis: parent directories staged as files, and staged files living
    /// beneath `path` if it was previously a directory.
    fn discard_conflicts(&mut self, entry: &IndexEntry) {
        for parent in entry.parent_dirs() {
            self.remove_all_stages(parent);
        }
        self.remove_children(&entry.path);
    }

    fn store_entry(&mut self, entry: IndexEntry) {
        for parent in entry.parent_dirs() {
            self.children
                .entry(parent.to_string())
                .or_default()
                .insert(entry.path.clone());
        }
        self.entries.insert(entry.key(), entry);
    }

    fn remove_children(&mut self, path: &str) {
        if let Some(children) = self.children.remove(path) {
            for child in children {
                self.remove_all_stages(&child);
            }
        }
    }

    /// Drop every stage of `path` and unlink it from its parents.
    fn remove_all_stages(&mut self, path: &str) {
        let mut removed = None;
        for stage in 0..=3u8 {
            if let Some(entry) = self.entries.remove(&(path.to_string(), stage)) {
                removed = Some(entry);
            }
        }
        if let Some(entry) = removed {
            self.unlink_from_parents(&entry);
        }
    }

    fn unlink_from_parents(&mut self, entry: &IndexEntry) {
        for parent in entry.parent_dirs() {
            if let Some(children) = self.children.get_mut(parent) {
                children.remove(&entry.path);
                if children.is_empty() {
                    self.children.remove(parent);
                }
            }
        }
    }

    /// Stage a file at stage 0.
    ///
    /// Replaces any existing stage-0 entry and drops stages 1-3 for the
    /// path: staging a resolution ends the conflict.
    pub fn add(&mut self, path: impl Into<String>, oid: ObjectId, metadata: EntryMetadata) {
        let path = path.into();
        let entry = IndexEntry::new(path, oid, 0, metadata);

        self.discard_conflicts(&entry);
        self.remove_all_stages(&entry.path);
        self.store_entry(entry);

        self.header.entries_count = self.entries.len() as u32;
        self.changed = true;
    }

    /// Record an unresolved merge conflict for `path`.
    ///
    /// Installs the given sides at stages 1-3 and removes any stage-0
    /// entry: a path is either cleanly staged or conflicted, never both.
    pub fn add_conflict(&mut self, path: impl Into<String>, sides: ConflictSides) {
        let path = path.into();
        let probe = IndexEntry::staged(path.clone(), ObjectId::zero(self.algorithm), EntryMode::Regular);
        self.discard_conflicts(&probe);
        self.remove_all_stages(&path);

        for (i, side) in sides.iter().enumerate() {
            if let Some((oid, mode)) = side {
                let metadata = EntryMetadata {
                    mode: *mode,
                    ..EntryMetadata::default()
                };
                self.store_entry(IndexEntry::new(path.clone(), *oid, (i + 1) as u8, metadata));
            }
        }

        self.header.entries_count = self.entries.len() as u32;
        self.changed = true;
    }

    /// Remove the entry at (path, stage); `NotFound` when absent.
    pub fn remove(&mut self, path: &str, stage: u8) -> Result<()> {
        let entry = self
            .entries
            .remove(&(path.to_string(), stage))
            .ok_or_else(|| Error::NotFound(format!("{path} (stage {stage})")))?;

        // The path may survive at other stages; only unlink when gone.
        let gone = (0..=3u8).all(|s| !self.entries.contains_key(&(path.to_string(), s)));
        if gone {
            self.unlink_from_parents(&entry);
        }

        self.header.entries_count = self.entries.len() as u32;
        self.changed = true;
        Ok(())
    }

    /// Persist the index through the lockfile protocol.
    ///
    /// Creates `<index>.lock` with create-new semantics, failing with
    /// `Locked` (not blocking) when another writer holds it, then writes
    /// the full image and renames it over the index file.
    pub fn write_updates(&mut self) -> Result<()> {
        let lock_path = self.lock_path();
        let lock_file = match std::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&lock_path)
        {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                return Err(Error::Locked(lock_path));
            }
            Err(e) => return Err(e.into()),
        };

        match self.write_image(lock_file) {
            Ok(()) => {
                std::fs::rename(&lock_path, &self.path)?;
                self.changed = false;
                Ok(())
            }
            Err(e) => {
                let _ = std::fs::remove_file(&lock_path);
                Err(e)
            }
        }
    }

    fn write_image(&mut self, file: std::fs::File) -> Result<()> {
        let mut writer = Checksum::new(file, self.algorithm);

        self.header = IndexHeader {
            entries_count: self.entries.len() as u32,
            ..self.header.clone()
        };
        writer.write(&self.header.serialize()?)?;

        for entry in self.entries.values() {
            writer.write(&entry.serialize()?)?;
        }

        writer.write_checksum()?;
        Ok(())
    }

    fn lock_path(&self) -> std::path::PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".lock");
        self.path.with_file_name(name)
    }

    /// Write the staged state as a hierarchy of tree objects, returning
    /// the root tree id.
    ///
    /// Fails with `Unmerged` before writing anything when any conflict
    /// stage is present, leaving the database untouched.
    pub fn write_tree(&self, db: &Database) -> Result<ObjectId> {
        if let Some((path, _)) = self.entries.keys().find(|(_, stage)| *stage != 0) {
            return Err(Error::Unmerged(path.clone()));
        }

        let updates: Vec<TreeUpdate> = self
            .entries
            .values()
            .map(|entry| TreeUpdate::put(entry.path.clone(), entry.metadata.mode, entry.oid))
            .collect();

        update::create_updated(db, None, &updates)
    }
}
