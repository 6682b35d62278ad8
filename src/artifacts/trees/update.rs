//! Batch tree rewrites
//!
//! Applies a set of inserts, replacements and deletions against a
//! baseline tree, rebuilding only the subtrees on the touched paths.
//! Untouched siblings keep their existing ids and are never re-read.

use crate::areas::database::Database;
use crate::artifacts::objects::entry_mode::EntryMode;
use crate::artifacts::objects::object_id::ObjectId;
use crate::artifacts::objects::object_type::ObjectType;
use crate::artifacts::objects::tree::{self, TreeEntry, tree_name_cmp};
use crate::errors::{Error, Result};
use std::collections::BTreeMap;

/// One change to apply against the baseline.
#[derive(Debug, Clone)]
pub enum TreeUpdate {
    /// Insert or replace the entry at `path`.
    Put {
        path: String,
        mode: EntryMode,
        oid: ObjectId,
    },
    /// Remove the entry at `path`; `NotFound` if no such entry exists.
    Delete { path: String },
}

impl TreeUpdate {
    pub fn put(path: impl Into<String>, mode: EntryMode, oid: ObjectId) -> Self {
        TreeUpdate::Put {
            path: path.into(),
            mode,
            oid,
        }
    }

    pub fn delete(path: impl Into<String>) -> Self {
        TreeUpdate::Delete { path: path.into() }
    }

    fn path(&self) -> &str {
        match self {
            TreeUpdate::Put { path, .. } | TreeUpdate::Delete { path } => path,
        }
    }
}

/// Apply `updates` against the tree at `baseline` (or an empty tree when
/// `None`), writing every rebuilt tree object and returning the new root
/// id. Subtrees left empty by deletions are pruned from their parent;
/// the root tree is written even when empty.
///
/// Updates are applied in order; conflicting duplicate paths are the
/// caller's responsibility, the later update wins.
pub fn create_updated(
    db: &Database,
    baseline: Option<&ObjectId>,
    updates: &[TreeUpdate],
) -> Result<ObjectId> {
    let mut grouped: Vec<(Vec<String>, TreeUpdate)> = Vec::with_capacity(updates.len());
    for update in updates {
        grouped.push((split_path(update.path())?, update.clone()));
    }

    let entries = rebuild(db, baseline, "", grouped)?;
    write_tree(db, entries)
}

fn split_path(path: &str) -> Result<Vec<String>> {
    let components: Vec<String> = path.split('/').map(str::to_string).collect();
    if path.is_empty() || components.iter().any(String::is_empty) {
        return Err(Error::InvalidFormat(format!("invalid tree path {path:?}")));
    }
    Ok(components)
}

fn load_entries(db: &Database, oid: Option<&ObjectId>) -> Result<BTreeMap<String, TreeEntry>> {
    let Some(oid) = oid else {
        return Ok(BTreeMap::new());
    };
    let object = db.read_typed(oid, ObjectType::Tree)?;
    let entries = tree::decode(&object.data, db.algorithm())?;
    Ok(entries
        .into_iter()
        .map(|entry| (entry.name.clone(), entry))
        .collect())
}

fn write_tree(db: &Database, entries: BTreeMap<String, TreeEntry>) -> Result<ObjectId> {
    let mut sorted: Vec<TreeEntry> = entries.into_values().collect();
    sorted.sort_by(|a, b| tree_name_cmp(&a.name, a.is_tree(), &b.name, b.is_tree()));
    let bytes = tree::encode(&sorted)?;
    db.write(ObjectType::Tree, &bytes)
}

/// Rebuild one directory level, recursing into children that carry
/// updates. Returns the level's final entry map.
fn rebuild(
    db: &Database,
    baseline: Option<&ObjectId>,
    prefix: &str,
    updates: Vec<(Vec<String>, TreeUpdate)>,
) -> Result<BTreeMap<String, TreeEntry>> {
    let mut entries = load_entries(db, baseline)?;

    // Partition updates by their leading component, preserving order.
    let mut by_child: BTreeMap<String, Vec<(Vec<String>, TreeUpdate)>> = BTreeMap::new();
    for (components, update) in updates {
        let Some((head, rest)) = components
            .split_first()
            .map(|(head, rest)| (head.clone(), rest.to_vec()))
        else {
            continue;
        };

        if rest.is_empty() {
            // A leaf op supersedes earlier-queued updates inside `head`.
            by_child.remove(&head);
            match update {
                TreeUpdate::Put { mode, oid, .. } => {
                    entries.insert(head.clone(), TreeEntry::new(mode, head, oid));
                }
                TreeUpdate::Delete { path } => {
                    if entries.remove(&head).is_none() {
                        return Err(Error::NotFound(path));
                    }
                }
            }
        } else {
            by_child.entry(head).or_default().push((rest, update));
        }
    }

    for (name, child_updates) in by_child {
        let child_prefix = if prefix.is_empty() {
            name.clone()
        } else {
            format!("{prefix}/{name}")
        };

        // An existing subtree is the child baseline; a file entry (or no
        // entry) means the subtree is built from scratch.
        let child_baseline = entries
            .get(&name)
            .filter(|entry| entry.is_tree())
            .map(|entry| entry.oid);

        let child_entries = rebuild(db, child_baseline.as_ref(), &child_prefix, child_updates)?;

        if child_entries.is_empty() {
            entries.remove(&name);
        } else {
            let child_oid = write_tree(db, child_entries)?;
            entries.insert(
                name.clone(),
                TreeEntry::new(EntryMode::Directory, name, child_oid),
            );
        }
    }

    Ok(entries)
}
