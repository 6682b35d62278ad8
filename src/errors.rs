//! Error taxonomy for the object store
//!
//! Every failure the store can produce is a distinct, inspectable variant.
//! `NotFound` and `Ambiguous` are ordinary control-flow outcomes that callers
//! routinely branch on; everything else is a genuine failure.

use crate::artifacts::objects::object_id::ObjectId;
use crate::artifacts::objects::object_type::ObjectType;
use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// Lookup miss; expected in normal flows.
    #[error("object not found: {0}")]
    NotFound(String),

    /// A short id matched more than one object. The caller must supply a
    /// longer prefix or pick one of the candidates.
    #[error("short object id {prefix} is ambiguous ({} candidates)", candidates.len())]
    Ambiguous {
        prefix: String,
        candidates: Vec<ObjectId>,
    },

    /// Checksum, format or structural violation; never silently repaired.
    #[error("corrupt {context}: {detail}")]
    Corrupt { context: String, detail: String },

    /// Caller supplied malformed input (bad hex, bad mode, bad path).
    #[error("invalid format: {0}")]
    InvalidFormat(String),

    /// Tree entries were not sorted by git name order, or contained duplicates.
    #[error("tree entries out of order near {0:?}")]
    InvalidOrder(String),

    /// The on-disk lock is already held by another writer.
    #[error("lock file {0} is already held")]
    Locked(PathBuf),

    /// Tree write attempted while unresolved conflict stages are present.
    #[error("index has unmerged entries at {0:?}")]
    Unmerged(String),

    /// The object exists but is not of the requested type.
    #[error("object {oid} is a {actual}, expected {expected}")]
    TypeMismatch {
        oid: ObjectId,
        expected: ObjectType,
        actual: ObjectType,
    },

    /// Guard against runaway or cyclic pack delta chains.
    #[error("delta chain exceeds maximum depth of {0}")]
    DeltaChainTooDeep(usize),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Corruption error scoped to a named artifact (a pack, an index, an
    /// object) so callers can tell which file to inspect.
    pub fn corrupt(context: impl Into<String>, detail: impl Into<String>) -> Self {
        Error::Corrupt {
            context: context.into(),
            detail: detail.into(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound(_))
    }

    pub fn is_ambiguous(&self) -> bool {
        matches!(self, Error::Ambiguous { .. })
    }
}
