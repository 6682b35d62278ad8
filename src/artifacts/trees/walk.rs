//! Recursive traversal over stored trees
//!
//! The visitor sees every entry with its full path from the root. In
//! preorder it can prune a subtree before it is loaded; in either order
//! it can abort the walk, which unwinds without visiting further
//! entries.

use crate::areas::database::Database;
use crate::artifacts::objects::object_id::ObjectId;
use crate::artifacts::objects::object_type::ObjectType;
use crate::artifacts::objects::tree::{self, TreeEntry};
use crate::errors::Result;

/// When the visitor sees a directory entry relative to its children.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WalkOrder {
    /// Parents before children.
    Pre,
    /// Children before parents.
    Post,
}

/// Visitor verdict for the entry just seen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visit {
    Continue,
    /// Do not descend into this directory. Only meaningful in preorder;
    /// in postorder the children have already been visited.
    SkipSubtree,
    /// Stop the whole walk.
    Abort,
}

enum Control {
    Continue,
    Abort,
}

/// Walk the tree rooted at `root`, calling `visitor` with each entry's
/// `/`-joined path. Returns `false` when the visitor aborted.
pub fn walk<V>(db: &Database, root: &ObjectId, order: WalkOrder, visitor: &mut V) -> Result<bool>
where
    V: FnMut(&str, &TreeEntry) -> Result<Visit>,
{
    match walk_tree(db, root, "", order, visitor)? {
        Control::Continue => Ok(true),
        Control::Abort => Ok(false),
    }
}

fn walk_tree<V>(
    db: &Database,
    oid: &ObjectId,
    prefix: &str,
    order: WalkOrder,
    visitor: &mut V,
) -> Result<Control>
where
    V: FnMut(&str, &TreeEntry) -> Result<Visit>,
{
    let object = db.read_typed(oid, ObjectType::Tree)?;
    let entries = tree::decode(&object.data, db.algorithm())?;

    for entry in &entries {
        let path = if prefix.is_empty() {
            entry.name.clone()
        } else {
            format!("{prefix}/{}", entry.name)
        };

        let mut descend = entry.is_tree();
        if order == WalkOrder::Pre {
            match visitor(&path, entry)? {
                Visit::Continue => {}
                Visit::SkipSubtree => descend = false,
                Visit::Abort => return Ok(Control::Abort),
            }
        }

        if descend {
            if let Control::Abort = walk_tree(db, &entry.oid, &path, order, visitor)? {
                return Ok(Control::Abort);
            }
        }

        if order == WalkOrder::Post {
            match visitor(&path, entry)? {
                Visit::Continue | Visit::SkipSubtree => {}
                Visit::Abort => return Ok(Control::Abort),
            }
        }
    }

    Ok(Control::Continue)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::areas::database::StoreConfig;
    use crate::artifacts::objects::entry_mode::EntryMode;
    use assert_fs::TempDir;
    use pretty_assertions::assert_eq;
    use rstest::{fixture, rstest};

    /// Builds:
    /// ```text
    /// root
    /// ├── a.txt
    /// └── sub/
    ///     └── b.txt
    /// ```
    fn sample_tree(db: &Database) -> ObjectId {
        let a = db.write_blob(b"a").unwrap();
        let b = db.write_blob(b"b").unwrap();

        let sub_bytes =
            tree::encode(&[TreeEntry::new(EntryMode::Regular, "b.txt".into(), b)]).unwrap();
        let sub = db.write_tree_bytes(sub_bytes).unwrap();

        let root_bytes = tree::encode(&[
            TreeEntry::new(EntryMode::Regular, "a.txt".into(), a),
            TreeEntry::new(EntryMode::Directory, "sub".into(), sub),
        ])
        .unwrap();
        db.write_tree_bytes(root_bytes).unwrap()
    }

    #[fixture]
    fn db() -> (TempDir, Database) {
        let dir = TempDir::new().unwrap();
        let db = Database::open(StoreConfig::sha1(dir.path().join("objects"))).unwrap();
        (dir, db)
    }

    #[rstest]
    fn preorder_visits_parents_first(db: (TempDir, Database)) {
        let (_dir, db) = db;
        let root = sample_tree(&db);

        let mut seen = Vec::new();
        let completed = walk(&db, &root, WalkOrder::Pre, &mut |path, _entry| {
            seen.push(path.to_string());
            Ok(Visit::Continue)
        })
        .unwrap();

        assert!(completed);
        assert_eq!(seen, vec!["a.txt", "sub", "sub/b.txt"]);
    }

    #[rstest]
    fn postorder_visits_children_first(db: (TempDir, Database)) {
        let (_dir, db) = db;
        let root = sample_tree(&db);

        let mut seen = Vec::new();
        walk(&db, &root, WalkOrder::Post, &mut |path, _entry| {
            seen.push(path.to_string());
            Ok(Visit::Continue)
        })
        .unwrap();

        assert_eq!(seen, vec!["a.txt", "sub/b.txt", "sub"]);
    }

    #[rstest]
    fn skip_subtree_prunes_descent(db: (TempDir, Database)) {
        let (_dir, db) = db;
        let root = sample_tree(&db);

        let mut seen = Vec::new();
        walk(&db, &root, WalkOrder::Pre, &mut |path, entry| {
            seen.push(path.to_string());
            if entry.is_tree() {
                Ok(Visit::SkipSubtree)
            } else {
                Ok(Visit::Continue)
            }
        })
        .unwrap();

        assert_eq!(seen, vec!["a.txt", "sub"]);
    }

    #[rstest]
    fn abort_unwinds_cleanly(db: (TempDir, Database)) {
        let (_dir, db) = db;
        let root = sample_tree(&db);

        let mut seen = Vec::new();
        let completed = walk(&db, &root, WalkOrder::Pre, &mut |path, _entry| {
            seen.push(path.to_string());
            Ok(Visit::Abort)
        })
        .unwrap();

        assert!(!completed);
        assert_eq!(seen, vec!["a.txt"]);
    }

    #[rstest]
    fn visitor_errors_propagate(db: (TempDir, Database)) {
        let (_dir, db) = db;
        let root = sample_tree(&db);

        let result = walk(&db, &root, WalkOrder::Pre, &mut |_path, _entry| {
            Err(crate::errors::Error::InvalidFormat("visitor failure".into()))
        });
        assert!(result.is_err());
    }
}
