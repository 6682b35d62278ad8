//! CLI behavior through the compiled binary.

mod common;

use assert_cmd::Command;
use assert_fs::TempDir;
use assert_fs::prelude::*;
use cask::artifacts::objects::object::Object;
use cask::{HashAlgorithm, ObjectId, ObjectType};
use common::{PackBuilder, build_idx, install_pack};
use predicates::prelude::*;

fn cask(dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("cask").unwrap();
    cmd.current_dir(dir.path());
    cmd
}

fn init_store(dir: &TempDir) {
    cask(dir).arg("init").assert().success();
}

#[test]
fn init_creates_the_objects_layout() {
    let dir = TempDir::new().unwrap();
    cask(&dir)
        .arg("init")
        .assert()
        .success()
        .stdout(predicate::str::contains("Initialized empty cask store"));

    assert!(dir.path().join(".git/objects/pack").is_dir());
}

#[test]
fn hash_object_prints_the_git_id_without_a_store() {
    let dir = TempDir::new().unwrap();
    dir.child("file.txt").write_str("test content\n").unwrap();

    // `echo 'test content' | git hash-object --stdin`
    cask(&dir)
        .args(["hash-object", "file.txt"])
        .assert()
        .success()
        .stdout(predicate::str::contains(
            "d670460b4b4aece5915caf5c68d12f560a9fe3e4",
        ));
}

#[test]
fn hash_object_write_then_cat_file_round_trips() {
    let dir = TempDir::new().unwrap();
    init_store(&dir);
    dir.child("note.txt").write_str("remember this\n").unwrap();

    let output = cask(&dir)
        .args(["hash-object", "-w", "note.txt"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let oid = String::from_utf8(output).unwrap().trim().to_string();

    cask(&dir)
        .args(["cat-file", "-p", &oid])
        .assert()
        .success()
        .stdout("remember this\n");

    // Without -p the type is printed instead.
    cask(&dir)
        .args(["cat-file", &oid])
        .assert()
        .success()
        .stdout("blob\n");

    // A short unambiguous prefix works too.
    cask(&dir)
        .args(["cat-file", "-p", &oid[..8]])
        .assert()
        .success()
        .stdout("remember this\n");
}

#[test]
fn cat_file_reports_missing_objects() {
    let dir = TempDir::new().unwrap();
    init_store(&dir);

    cask(&dir)
        .args(["cat-file", "-p", "0123456789abcdef0123456789abcdef01234567"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("not found"));
}

#[test]
fn add_write_tree_and_ls_tree() {
    let dir = TempDir::new().unwrap();
    init_store(&dir);
    dir.child("a.txt").write_str("alpha\n").unwrap();
    dir.child("sub/b.txt").write_str("beta\n").unwrap();

    cask(&dir)
        .args(["add", "a.txt", "sub/b.txt"])
        .assert()
        .success();

    let output = cask(&dir)
        .arg("write-tree")
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let root = String::from_utf8(output).unwrap().trim().to_string();

    cask(&dir)
        .args(["ls-tree", &root])
        .assert()
        .success()
        .stdout(
            predicate::str::contains("100644 blob")
                .and(predicate::str::contains("a.txt"))
                .and(predicate::str::contains("040000 tree"))
                .and(predicate::str::contains("sub")),
        );
}

#[test]
fn write_tree_is_stable_across_runs() {
    let dir = TempDir::new().unwrap();
    init_store(&dir);
    dir.child("same.txt").write_str("content\n").unwrap();
    cask(&dir).args(["add", "same.txt"]).assert().success();

    let first = cask(&dir).arg("write-tree").assert().success().get_output().stdout.clone();
    let second = cask(&dir).arg("write-tree").assert().success().get_output().stdout.clone();
    assert_eq!(first, second);
}

#[test]
fn verify_pack_accepts_a_valid_pair_and_rejects_damage() {
    let dir = TempDir::new().unwrap();
    init_store(&dir);

    let mut builder = PackBuilder::new(HashAlgorithm::Sha1);
    let offset = builder.add_plain(ObjectType::Blob, b"packed content");
    let pack = builder.build();
    let oid = Object::new(ObjectType::Blob, b"packed content".to_vec()).id(HashAlgorithm::Sha1);
    let pack_checksum = ObjectId::from_bytes(&pack[pack.len() - 20..]).unwrap();
    let idx = build_idx(HashAlgorithm::Sha1, &[(oid, offset)], &pack_checksum);
    install_pack(&dir.path().join(".git/objects"), "pack-ok", &pack, &idx);

    cask(&dir)
        .args(["verify-pack", ".git/objects/pack/pack-ok.pack"])
        .assert()
        .success()
        .stdout(predicate::str::contains("ok, 1 objects"));

    // Flip a byte in the pack body; the trailing checksum no longer matches.
    let mut damaged = pack.clone();
    damaged[14] ^= 0x01;
    install_pack(&dir.path().join(".git/objects"), "pack-bad", &damaged, &idx);

    cask(&dir)
        .args(["verify-pack", ".git/objects/pack/pack-bad.pack"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("corrupt"));
}
