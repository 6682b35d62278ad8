//! Object database: loose and pack backends behind one lookup surface
//!
//! A database owns an objects directory of loose objects plus every
//! `pack/*.idx` + `pack/*.pack` pair found under it. Reads probe packs
//! first (the common case for history), then loose; writes always land
//! in the loose backend as atomically renamed temp files.
//!
//! Failure containment: a corrupt or missing pack only affects lookups
//! that it alone could answer; a stale `.idx` whose `.pack` is gone
//! yields `NotFound` for its objects, never a database-wide failure.

use crate::artifacts::objects::object::{self, Object};
use crate::artifacts::objects::object_id::{HashAlgorithm, ObjectId};
use crate::artifacts::objects::object_type::ObjectType;
use crate::artifacts::pack::index::PackIndex;
use crate::artifacts::pack::reader::{MAX_DELTA_DEPTH, PackFile};
use crate::errors::{Error, Result};
use bytes::Bytes;
use derive_new::new;
use std::collections::BTreeSet;
use std::io::Write;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Store-wide configuration handed to [`Database::open`].
#[derive(Debug, Clone, new)]
pub struct StoreConfig {
    /// Root of the objects directory (`.git/objects` in a standard layout).
    pub objects_dir: PathBuf,
    /// Hash algorithm for every id in this store; never mixed.
    pub algorithm: HashAlgorithm,
    /// Recompute and compare object ids on every read.
    pub verify_on_read: bool,
}

impl StoreConfig {
    /// SHA-1 store without read-time verification, the common setup.
    pub fn sha1(objects_dir: impl Into<PathBuf>) -> Self {
        StoreConfig::new(objects_dir.into(), HashAlgorithm::Sha1, false)
    }
}

/// One `.idx`/`.pack` pair. `pack` is `None` when the `.pack` file has
/// gone missing; such a backend answers nothing, so its ids never
/// surface through reads, prefix resolution or iteration.
#[derive(Debug)]
struct PackBackend {
    name: String,
    index: PackIndex,
    pack: Option<PackFile>,
}

/// Content-addressed object database.
#[derive(Debug)]
pub struct Database {
    path: Box<Path>,
    algorithm: HashAlgorithm,
    verify_on_read: bool,
    packs: Vec<PackBackend>,
    /// Backends that failed to load at open, kept for diagnostics.
    skipped: Vec<(PathBuf, String)>,
}

impl Database {
    /// Open a database over an objects directory, discovering every pack
    /// under `pack/`. Backends that fail to parse are skipped and
    /// recorded rather than failing the whole store.
    pub fn open(config: StoreConfig) -> Result<Self> {
        let mut database = Database {
            path: config.objects_dir.into_boxed_path(),
            algorithm: config.algorithm,
            verify_on_read: config.verify_on_read,
            packs: Vec::new(),
            skipped: Vec::new(),
        };

        std::fs::create_dir_all(database.pack_dir())?;
        database.load_packs()?;

        Ok(database)
    }

    /// Release the database and its backend buffers.
    ///
    /// Dropping has the same effect; this exists so callers can make the
    /// end of the store's lifetime explicit.
    pub fn close(self) {}

    pub fn objects_path(&self) -> &Path {
        &self.path
    }

    pub fn algorithm(&self) -> HashAlgorithm {
        self.algorithm
    }

    /// Backends skipped at open time, as (path, reason) pairs.
    pub fn skipped_backends(&self) -> &[(PathBuf, String)] {
        &self.skipped
    }

    fn pack_dir(&self) -> PathBuf {
        self.path.join("pack")
    }

    fn load_packs(&mut self) -> Result<()> {
        let mut idx_paths: Vec<PathBuf> = std::fs::read_dir(self.pack_dir())?
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| path.extension().is_some_and(|ext| ext == "idx"))
            .collect();
        idx_paths.sort();

        for idx_path in idx_paths {
            match self.load_pack(&idx_path) {
                Ok(backend) => self.packs.push(backend),
                Err(e) => self.skipped.push((idx_path, e.to_string())),
            }
        }

        Ok(())
    }

    fn load_pack(&self, idx_path: &Path) -> Result<PackBackend> {
        let idx_bytes = std::fs::read(idx_path)?;
        let index = PackIndex::parse(idx_bytes, self.algorithm)?;

        let pack_path = idx_path.with_extension("pack");
        let pack = if pack_path.exists() {
            Some(PackFile::parse(std::fs::read(&pack_path)?, self.algorithm)?)
        } else {
            // Stale index: keep it, its objects just read as NotFound.
            None
        };

        Ok(PackBackend {
            name: idx_path
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_default(),
            index,
            pack,
        })
    }

    /// Read an object by its full id. `NotFound` on miss; `Corrupt` only
    /// when the backend that held the object cannot produce it.
    pub fn read(&self, oid: &ObjectId) -> Result<Object> {
        self.read_with_depth(oid, 0)
    }

    fn read_with_depth(&self, oid: &ObjectId, depth: usize) -> Result<Object> {
        if depth > MAX_DELTA_DEPTH {
            return Err(Error::DeltaChainTooDeep(MAX_DELTA_DEPTH));
        }

        let mut deferred: Option<Error> = None;

        for backend in &self.packs {
            match self.read_from_pack(backend, oid, depth) {
                Ok(Some(object)) => return Ok(object),
                Ok(None) => {}
                // Remember the failure but let another backend answer.
                Err(e) => deferred = Some(deferred.unwrap_or(e)),
            }
        }

        match self.read_loose(oid) {
            Ok(Some(object)) => Ok(object),
            Ok(None) => Err(deferred.unwrap_or_else(|| Error::NotFound(oid.to_hex()))),
            Err(e) => Err(e),
        }
    }

    fn read_from_pack(
        &self,
        backend: &PackBackend,
        oid: &ObjectId,
        depth: usize,
    ) -> Result<Option<Object>> {
        let Some(offset) = backend.index.lookup(oid)? else {
            return Ok(None);
        };
        let Some(pack) = &backend.pack else {
            return Ok(None);
        };

        let resolver =
            |base_oid: &ObjectId, base_depth: usize| self.read_with_depth(base_oid, base_depth);
        let object = pack
            .read_at_depth(offset, depth, &resolver)
            .map_err(|e| match e {
                Error::Corrupt { detail, .. } => Error::corrupt(
                    format!("pack {}", backend.name),
                    format!("object {oid} at offset {offset}: {detail}"),
                ),
                other => other,
            })?;

        if self.verify_on_read {
            self.check_integrity(oid, &object, &format!("pack {}", backend.name))?;
        }
        Ok(Some(object))
    }

    fn read_loose(&self, oid: &ObjectId) -> Result<Option<Object>> {
        let object_path = self.path.join(oid.to_path());
        if !object_path.exists() {
            return Ok(None);
        }

        let compressed = std::fs::read(&object_path)?;
        let object = object::decode_loose(&compressed).map_err(|e| match e {
            Error::Corrupt { detail, .. } => Error::corrupt(format!("loose object {oid}"), detail),
            other => other,
        })?;

        if self.verify_on_read {
            self.check_integrity(oid, &object, "loose backend")?;
        }
        Ok(Some(object))
    }

    fn check_integrity(&self, oid: &ObjectId, object: &Object, context: &str) -> Result<()> {
        let actual = object.id(self.algorithm);
        if actual != *oid {
            return Err(Error::corrupt(
                context.to_string(),
                format!("object {oid} hashes to {actual}"),
            ));
        }
        Ok(())
    }

    /// Read an object and require a specific type.
    pub fn read_typed(&self, oid: &ObjectId, expected: ObjectType) -> Result<Object> {
        let object = self.read(oid)?;
        if object.object_type != expected {
            return Err(Error::TypeMismatch {
                oid: *oid,
                expected,
                actual: object.object_type,
            });
        }
        Ok(object)
    }

    /// Membership probe without decoding any payload.
    pub fn exists(&self, oid: &ObjectId) -> bool {
        for backend in &self.packs {
            if backend.pack.is_some() && matches!(backend.index.lookup(oid), Ok(Some(_))) {
                return true;
            }
        }
        self.path.join(oid.to_path()).exists()
    }

    /// Write an object into the loose backend, returning its derived id.
    ///
    /// Content-addressed dedup: writing bytes that already exist anywhere
    /// in the store is a no-op success. The on-disk write goes through a
    /// temp file and an atomic rename.
    pub fn write(&self, object_type: ObjectType, data: &[u8]) -> Result<ObjectId> {
        let (oid, compressed) = object::encode_loose(self.algorithm, object_type, data)?;

        if self.exists(&oid) {
            return Ok(oid);
        }

        let object_path = self.path.join(oid.to_path());
        let object_dir = object_path
            .parent()
            .ok_or_else(|| Error::InvalidFormat(format!("invalid object path for {oid}")))?;
        std::fs::create_dir_all(object_dir)?;

        let temp_path = object_dir.join(Self::temp_name());
        let mut file = std::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&temp_path)?;
        file.write_all(&compressed)?;
        file.sync_all()?;
        drop(file);

        std::fs::rename(&temp_path, &object_path)?;
        Ok(oid)
    }

    fn temp_name() -> String {
        let nanos = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.subsec_nanos())
            .unwrap_or(0);
        format!("tmp-obj-{}-{nanos}", std::process::id())
    }

    /// Resolve a short hex prefix to the unique id it abbreviates.
    ///
    /// Zero matches is `NotFound`; two or more distinct matches is
    /// `Ambiguous` carrying the sorted candidate list.
    pub fn resolve_prefix(&self, prefix: &str) -> Result<ObjectId> {
        if prefix.is_empty()
            || prefix.len() > self.algorithm.hex_len()
            || !prefix.chars().all(|c| c.is_ascii_hexdigit())
        {
            return Err(Error::InvalidFormat(format!(
                "invalid object id prefix {prefix:?}"
            )));
        }
        let prefix = prefix.to_ascii_lowercase();

        let mut matches = BTreeSet::new();
        for backend in &self.packs {
            if backend.pack.is_none() {
                continue;
            }
            matches.extend(backend.index.oids_with_prefix(&prefix)?);
        }
        self.loose_oids_with_prefix(&prefix, &mut matches)?;

        let mut candidates: Vec<ObjectId> = matches.into_iter().collect();
        match candidates.len() {
            0 => Err(Error::NotFound(prefix)),
            1 => Ok(candidates.remove(0)),
            _ => Err(Error::Ambiguous {
                prefix,
                candidates,
            }),
        }
    }

    /// Read an object through a short-id prefix.
    pub fn read_prefix(&self, prefix: &str) -> Result<Object> {
        let oid = self.resolve_prefix(prefix)?;
        self.read(&oid)
    }

    fn loose_oids_with_prefix(
        &self,
        prefix: &str,
        matches: &mut BTreeSet<ObjectId>,
    ) -> Result<()> {
        // Prefixes of two or more characters pin down the fan directory.
        let root = if prefix.len() >= 2 {
            self.path.join(&prefix[..2])
        } else {
            self.path.to_path_buf()
        };
        if !root.exists() {
            return Ok(());
        }

        for entry in WalkDir::new(&root)
            .min_depth(1)
            .max_depth(if prefix.len() >= 2 { 1 } else { 2 })
            .into_iter()
            .filter_map(|entry| entry.ok())
        {
            if !entry.file_type().is_file() {
                continue;
            }
            let Some(hex) = Self::loose_hex_name(self.path.as_ref(), entry.path()) else {
                continue;
            };
            if hex.len() == self.algorithm.hex_len() && hex.starts_with(prefix) {
                if let Ok(oid) = ObjectId::from_hex(&hex) {
                    matches.insert(oid);
                }
            }
        }
        Ok(())
    }

    /// Reassemble `xx/yyyy...` into a full hex id, skipping non-object
    /// files such as the pack directory.
    fn loose_hex_name(objects_root: &Path, path: &Path) -> Option<String> {
        let relative = path.strip_prefix(objects_root).ok()?;
        let mut components = relative.components();
        let dir = components.next()?.as_os_str().to_str()?;
        let file = components.next()?.as_os_str().to_str()?;
        if components.next().is_some() || dir.len() != 2 {
            return None;
        }
        if !dir.chars().all(|c| c.is_ascii_hexdigit()) {
            return None;
        }
        Some(format!("{dir}{file}"))
    }

    /// Snapshot of every id in the store (packs and loose), sorted and
    /// de-duplicated. The returned iterator is independent of later
    /// writes.
    pub fn object_ids(&self) -> Result<impl Iterator<Item = ObjectId> + use<>> {
        let mut ids = BTreeSet::new();
        for backend in &self.packs {
            if backend.pack.is_none() {
                continue;
            }
            for oid in backend.index.oids() {
                ids.insert(oid?);
            }
        }
        self.loose_oids_with_prefix("", &mut ids)?;
        Ok(ids.into_iter())
    }

    /// Number of objects currently visible in the store.
    pub fn object_count(&self) -> Result<usize> {
        Ok(self.object_ids()?.count())
    }

    /// Store a blob, the most common write path.
    pub fn write_blob(&self, data: &[u8]) -> Result<ObjectId> {
        self.write(ObjectType::Blob, data)
    }

    /// Store an encoded tree payload.
    pub fn write_tree_bytes(&self, data: Bytes) -> Result<ObjectId> {
        self.write(ObjectType::Tree, &data)
    }
}
