//! Tree objects: directory snapshots
//!
//! ## Format
//!
//! A tree is a concatenation of entries, each
//! `"<octal-mode> <name>\0<raw-oid-bytes>"`, sorted by git's name
//! ordering rule: directory names compare as if suffixed with `/`.
//! That sort order is both the on-disk encoding and the lookup key.
//!
//! The encoder treats ordering as a hard invariant: out-of-order or
//! duplicate entries are rejected with `InvalidOrder` before any bytes
//! are produced.

use crate::artifacts::objects::entry_mode::EntryMode;
use crate::artifacts::objects::object_id::{HashAlgorithm, ObjectId};
use crate::errors::{Error, Result};
use bytes::Bytes;
use derive_new::new;
use std::cmp::Ordering;
use std::io::Write;

/// One (mode, name, oid) record of a directory snapshot.
#[derive(Debug, Clone, PartialEq, Eq, new)]
pub struct TreeEntry {
    pub mode: EntryMode,
    pub name: String,
    pub oid: ObjectId,
}

impl TreeEntry {
    pub fn is_tree(&self) -> bool {
        self.mode.is_tree()
    }
}

/// Compare two entry names by git's tree ordering.
///
/// Directories sort as if their name carried a trailing `/`, so
/// `foo.txt < foo/ < foo0` holds regardless of entry kind.
pub fn tree_name_cmp(a: &str, a_is_tree: bool, b: &str, b_is_tree: bool) -> Ordering {
    let a_bytes = a.as_bytes();
    let b_bytes = b.as_bytes();
    let len = a_bytes.len().min(b_bytes.len());

    match a_bytes[..len].cmp(&b_bytes[..len]) {
        Ordering::Equal => {}
        other => return other,
    }

    // Shared prefix exhausted: the shorter name continues with a virtual
    // '/' when it is a directory, or ends outright when it is a file.
    let a_next = a_bytes.get(len).copied().or(if a_is_tree { Some(b'/') } else { None });
    let b_next = b_bytes.get(len).copied().or(if b_is_tree { Some(b'/') } else { None });

    match (a_next, b_next) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(x), Some(y)) => x.cmp(&y),
    }
}

fn entry_cmp(a: &TreeEntry, b: &TreeEntry) -> Ordering {
    tree_name_cmp(&a.name, a.is_tree(), &b.name, b.is_tree())
}

fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(Error::InvalidFormat("empty tree entry name".to_string()));
    }
    if name.bytes().any(|b| b == 0 || b == b'/') {
        return Err(Error::InvalidFormat(format!(
            "tree entry name {name:?} contains NUL or '/'"
        )));
    }
    Ok(())
}

/// Encode a sorted entry sequence into tree object bytes.
///
/// The caller supplies entries pre-sorted by [`tree_name_cmp`]; violations
/// (including duplicate names) fail with `InvalidOrder`, names with NUL or
/// `/` with `InvalidFormat`. A validly sorted decode/encode pair is
/// byte-identical to its input.
pub fn encode(entries: &[TreeEntry]) -> Result<Bytes> {
    let mut bytes = Vec::new();

    for (i, entry) in entries.iter().enumerate() {
        validate_name(&entry.name)?;

        if i > 0 && entry_cmp(&entries[i - 1], entry) != Ordering::Less {
            return Err(Error::InvalidOrder(entry.name.clone()));
        }

        write!(bytes, "{} {}", entry.mode.as_octal_str(), entry.name)?;
        bytes.push(0);
        bytes.write_all(entry.oid.as_bytes())?;
    }

    Ok(Bytes::from(bytes))
}

/// Decode tree object bytes into its entry sequence.
///
/// Fails with `Corrupt` on truncated records, malformed modes, or names
/// containing NUL or `/`.
pub fn decode(bytes: &[u8], algorithm: HashAlgorithm) -> Result<Vec<TreeEntry>> {
    let oid_len = algorithm.oid_len();
    let mut entries = Vec::new();
    let mut pos = 0;

    while pos < bytes.len() {
        let space = bytes[pos..]
            .iter()
            .position(|&b| b == b' ')
            .ok_or_else(|| Error::corrupt("tree object", "unexpected end of mode field"))?;
        let mode_str = std::str::from_utf8(&bytes[pos..pos + space])
            .map_err(|_| Error::corrupt("tree object", "mode is not valid UTF-8"))?;
        let mode = EntryMode::from_octal_str(mode_str)
            .map_err(|_| Error::corrupt("tree object", format!("bad mode {mode_str:?}")))?;
        pos += space + 1;

        let nul = bytes[pos..]
            .iter()
            .position(|&b| b == 0)
            .ok_or_else(|| Error::corrupt("tree object", "unexpected end of name field"))?;
        let name = std::str::from_utf8(&bytes[pos..pos + nul])
            .map_err(|_| Error::corrupt("tree object", "name is not valid UTF-8"))?
            .to_owned();
        validate_name(&name)
            .map_err(|_| Error::corrupt("tree object", format!("bad entry name {name:?}")))?;
        pos += nul + 1;

        if pos + oid_len > bytes.len() {
            return Err(Error::corrupt("tree object", "truncated object id"));
        }
        let oid = ObjectId::from_bytes(&bytes[pos..pos + oid_len])?;
        pos += oid_len;

        entries.push(TreeEntry::new(mode, name, oid));
    }

    Ok(entries)
}

/// Binary-search a sorted entry slice for a name.
///
/// Tries the name both as a file and as a directory, since the orderings
/// differ only past the shared prefix.
pub fn lookup<'a>(entries: &'a [TreeEntry], name: &str) -> Option<&'a TreeEntry> {
    for as_tree in [false, true] {
        let found = entries
            .binary_search_by(|entry| {
                tree_name_cmp(&entry.name, entry.is_tree(), name, as_tree)
            })
            .ok();
        if let Some(i) = found {
            if entries[i].name == name {
                return Some(&entries[i]);
            }
        }
    }
    None
}
