//! End-to-end scenarios across the database, pack backends, trees and
//! the staging area.

mod common;

use assert_fs::TempDir;
use cask::artifacts::index::index_entry::EntryMetadata;
use cask::artifacts::objects::entry_mode::EntryMode;
use cask::artifacts::objects::object::Object;
use cask::artifacts::objects::tree;
use cask::{Database, Error, HashAlgorithm, Index, ObjectId, ObjectType, StoreConfig};
use common::{PackBuilder, build_idx, copy_all_delta, install_pack};
use pretty_assertions::assert_eq;

fn open_db(dir: &TempDir) -> Database {
    Database::open(StoreConfig::sha1(dir.path().join("objects"))).unwrap()
}

fn metadata() -> EntryMetadata {
    EntryMetadata {
        mode: EntryMode::Regular,
        ..EntryMetadata::default()
    }
}

fn blob_id(data: &[u8]) -> ObjectId {
    Object::new(ObjectType::Blob, data.to_vec()).id(HashAlgorithm::Sha1)
}

#[test]
fn staging_conflict_and_write_tree_end_to_end() {
    let dir = TempDir::new().unwrap();
    let db = open_db(&dir);
    let mut index = Index::new(dir.path().join("index"), HashAlgorithm::Sha1);

    let a = db.write_blob(b"alpha\n").unwrap();
    let b = db.write_blob(b"beta\n").unwrap();
    index.add("a.txt", a, metadata());
    index.add("sub/b.txt", b, metadata());

    // A merge left clash.txt unresolved.
    let ours = db.write_blob(b"ours\n").unwrap();
    let theirs = db.write_blob(b"theirs\n").unwrap();
    index.add_conflict(
        "clash.txt",
        [
            None,
            Some((ours, EntryMode::Regular)),
            Some((theirs, EntryMode::Regular)),
        ],
    );

    // Unmerged entries block the tree write and leave the store as-is.
    let before = db.object_count().unwrap();
    let err = index.write_tree(&db).unwrap_err();
    assert!(matches!(err, Error::Unmerged(_)));
    assert_eq!(db.object_count().unwrap(), before);

    // Staging a resolution clears stages 1-3.
    index.add("clash.txt", ours, metadata());
    let root = index.write_tree(&db).unwrap();

    let object = db.read_typed(&root, ObjectType::Tree).unwrap();
    let entries = tree::decode(&object.data, HashAlgorithm::Sha1).unwrap();
    let names: Vec<&str> = entries.iter().map(|e| e.name.as_str()).collect();
    assert_eq!(names, vec!["a.txt", "clash.txt", "sub"]);

    let sub = tree::lookup(&entries, "sub").unwrap();
    let sub_object = db.read_typed(&sub.oid, ObjectType::Tree).unwrap();
    let sub_entries = tree::decode(&sub_object.data, HashAlgorithm::Sha1).unwrap();
    assert_eq!(sub_entries[0].name, "b.txt");
    assert_eq!(sub_entries[0].oid, b);

    // The index file round-trips through disk with its checksum.
    index.write_updates().unwrap();
    let reloaded = Index::load_from(index.path(), HashAlgorithm::Sha1).unwrap();
    assert_eq!(reloaded.len(), 3);
    assert!(!reloaded.has_conflicts());
}

#[test]
fn delta_chains_resolve_through_the_database() {
    let dir = TempDir::new().unwrap();
    let db = open_db(&dir);

    // A ref-delta base living in the loose backend.
    let loose_base = db.write_blob(b"loose base").unwrap();

    let mut builder = PackBuilder::new(HashAlgorithm::Sha1);
    let base_offset = builder.add_plain(ObjectType::Blob, b"base");
    let mid_offset = builder.add_ofs_delta(base_offset, &copy_all_delta(b"base", b"+mid"));
    let tip_offset = builder.add_ofs_delta(mid_offset, &copy_all_delta(b"base+mid", b"+tip"));
    let deep_offset =
        builder.add_ofs_delta(tip_offset, &copy_all_delta(b"base+mid+tip", b"+deep"));
    let ref_offset =
        builder.add_ref_delta(&loose_base, &copy_all_delta(b"loose base", b" extended"));

    // A ref-delta stacked on the ofs chain's tip mixes both delta kinds
    // in one chain.
    let deep_id = blob_id(b"base+mid+tip+deep");
    let mixed_offset =
        builder.add_ref_delta(&deep_id, &copy_all_delta(b"base+mid+tip+deep", b"+mixed"));
    let pack = builder.build();

    let ref_id = blob_id(b"loose base extended");
    let mixed_id = blob_id(b"base+mid+tip+deep+mixed");
    let table = vec![
        (blob_id(b"base"), base_offset),
        (blob_id(b"base+mid"), mid_offset),
        (blob_id(b"base+mid+tip"), tip_offset),
        (deep_id, deep_offset),
        (ref_id, ref_offset),
        (mixed_id, mixed_offset),
    ];
    let pack_checksum = ObjectId::from_bytes(&pack[pack.len() - 20..]).unwrap();
    let idx = build_idx(HashAlgorithm::Sha1, &table, &pack_checksum);
    install_pack(&dir.path().join("objects"), "pack-chains", &pack, &idx);

    // Reopen so the new pack is discovered.
    let db = open_db(&dir);

    // Depth-3 ofs chain.
    let deep = db.read(&deep_id).unwrap();
    assert_eq!(deep.data.as_ref(), b"base+mid+tip+deep");
    assert_eq!(deep.object_type, ObjectType::Blob);

    // Ref-delta whose base is resolved from the loose backend.
    let extended = db.read(&ref_id).unwrap();
    assert_eq!(extended.data.as_ref(), b"loose base extended");

    // Mixed chain: ref-delta on top of the ofs chain, resolved through
    // the database's base resolver back into the same pack.
    let mixed = db.read(&mixed_id).unwrap();
    assert_eq!(mixed.data.as_ref(), b"base+mid+tip+deep+mixed");
}

#[test]
fn stale_index_yields_not_found_without_poisoning_the_store() {
    let dir = TempDir::new().unwrap();
    let db = open_db(&dir);
    let loose = db.write_blob(b"survives").unwrap();

    // An idx whose .pack has gone missing.
    let ghost = ObjectId::from_bytes(&[0x42; 20]).unwrap();
    let idx = build_idx(
        HashAlgorithm::Sha1,
        &[(ghost, 12)],
        &ObjectId::from_bytes(&[0xee; 20]).unwrap(),
    );
    let pack_dir = dir.path().join("objects").join("pack");
    std::fs::create_dir_all(&pack_dir).unwrap();
    std::fs::write(pack_dir.join("pack-stale.idx"), &idx).unwrap();

    let db = open_db(&dir);
    assert!(db.read(&ghost).unwrap_err().is_not_found());
    assert!(!db.exists(&ghost));
    assert_eq!(db.read(&loose).unwrap().data.as_ref(), b"survives");

    // Ghost ids stay invisible to prefix resolution and iteration too,
    // so a resolvable id always reads back.
    assert!(db.resolve_prefix(&ghost.to_hex()).unwrap_err().is_not_found());
    let ids: Vec<ObjectId> = db.object_ids().unwrap().collect();
    assert_eq!(ids, vec![loose]);
    assert_eq!(db.object_count().unwrap(), 1);
}

#[test]
fn payload_corruption_is_contained_to_the_damaged_object() {
    let dir = TempDir::new().unwrap();

    let mut builder = PackBuilder::new(HashAlgorithm::Sha1);
    let bad_offset = builder.add_plain(ObjectType::Blob, b"will be damaged");
    let good_offset = builder.add_plain(ObjectType::Blob, b"stays intact");
    let mut pack = builder.build();

    let bad_id = blob_id(b"will be damaged");
    let good_id = blob_id(b"stays intact");
    let pack_checksum = ObjectId::from_bytes(&pack[pack.len() - 20..]).unwrap();
    let idx = build_idx(
        HashAlgorithm::Sha1,
        &[(bad_id, bad_offset), (good_id, good_offset)],
        &pack_checksum,
    );

    // Damage a byte inside the first entry's compressed payload.
    pack[bad_offset as usize + 4] ^= 0xff;
    install_pack(&dir.path().join("objects"), "pack-damaged", &pack, &idx);

    let config = StoreConfig::new(
        dir.path().join("objects"),
        HashAlgorithm::Sha1,
        true,
    );
    let db = Database::open(config).unwrap();

    let err = db.read(&bad_id).unwrap_err();
    assert!(matches!(err, Error::Corrupt { .. }));
    assert_eq!(db.read(&good_id).unwrap().data.as_ref(), b"stays intact");
}

#[test]
fn prefix_resolution_reports_ambiguity() {
    let dir = TempDir::new().unwrap();
    let db = open_db(&dir);
    let written = db.write_blob(b"some unique content").unwrap();

    // Two pack-indexed ids sharing the prefix "abab".
    let mut twin_a = [0xab; 20];
    twin_a[2] = 0x01;
    let mut twin_b = [0xab; 20];
    twin_b[2] = 0x02;
    let twin_a = ObjectId::from_bytes(&twin_a).unwrap();
    let twin_b = ObjectId::from_bytes(&twin_b).unwrap();
    let mut builder = PackBuilder::new(HashAlgorithm::Sha1);
    let offset = builder.add_plain(ObjectType::Blob, b"twin payload");
    let pack = builder.build();
    let pack_checksum = ObjectId::from_bytes(&pack[pack.len() - 20..]).unwrap();
    let idx = build_idx(
        HashAlgorithm::Sha1,
        &[(twin_a, offset), (twin_b, offset)],
        &pack_checksum,
    );
    install_pack(&dir.path().join("objects"), "pack-twins", &pack, &idx);

    let db = open_db(&dir);

    // A unique prefix resolves to the loose object.
    let prefix = &written.to_hex()[..8];
    assert_eq!(db.resolve_prefix(prefix).unwrap(), written);

    // The shared prefix is ambiguous and lists both candidates.
    match db.resolve_prefix("abab").unwrap_err() {
        Error::Ambiguous { prefix, candidates } => {
            assert_eq!(prefix, "abab");
            assert_eq!(candidates, vec![twin_a, twin_b]);
        }
        other => panic!("expected Ambiguous, got {other:?}"),
    }

    // No match at all is NotFound.
    assert!(db.resolve_prefix("0123456789").unwrap_err().is_not_found());
}

#[test]
fn object_ids_snapshot_covers_packs_and_loose() {
    let dir = TempDir::new().unwrap();
    let db = open_db(&dir);
    let loose = db.write_blob(b"a loose one").unwrap();

    let mut builder = PackBuilder::new(HashAlgorithm::Sha1);
    let offset = builder.add_plain(ObjectType::Blob, b"a packed one");
    let pack = builder.build();
    let packed = blob_id(b"a packed one");
    let pack_checksum = ObjectId::from_bytes(&pack[pack.len() - 20..]).unwrap();
    let idx = build_idx(HashAlgorithm::Sha1, &[(packed, offset)], &pack_checksum);
    install_pack(&dir.path().join("objects"), "pack-mixed", &pack, &idx);

    let db = open_db(&dir);
    let ids: Vec<ObjectId> = db.object_ids().unwrap().collect();
    assert_eq!(ids.len(), 2);
    assert!(ids.contains(&loose));
    assert!(ids.contains(&packed));
    assert!(ids.windows(2).all(|w| w[0] < w[1]));
}
