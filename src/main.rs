use anyhow::{Context, Result, bail};
use cask::artifacts::index::index_entry::EntryMetadata;
use cask::artifacts::objects::tree;
use cask::artifacts::pack::index::PackIndex;
use cask::artifacts::pack::reader::PackFile;
use cask::{Database, HashAlgorithm, Index, Object, ObjectType, StoreConfig};
use clap::{Parser, Subcommand};
use std::io::Write;
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(
    name = "cask",
    version = "0.1.0",
    about = "A content-addressable object store",
    long_about = "Plumbing for a git-compatible object store: loose objects, \
    pack files, trees and the staging area, bit-exact with git's on-disk formats."
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(
        name = "init",
        about = "Initialize an empty object store",
        long_about = "This command creates the .git/objects layout in the current directory or at the specified path."
    )]
    Init {
        #[arg(index = 1, help = "The path to the repository")]
        path: Option<String>,
    },
    #[command(
        name = "hash-object",
        about = "Hash a file and optionally write it to the object database"
    )]
    HashObject {
        #[arg(short, long, required = false, help = "Write the object to the object database")]
        write: bool,
        #[arg(index = 1)]
        file: String,
    },
    #[command(
        name = "cat-file",
        about = "Print the content or type of an object",
        long_about = "This command prints an object from the database. Short id prefixes \
        are resolved as long as they are unambiguous."
    )]
    CatFile {
        #[arg(short = 'p', help = "Pretty-print the object content")]
        pretty: bool,
        #[arg(index = 1, help = "The object id, or a unique prefix of it")]
        object: String,
    },
    #[command(name = "ls-tree", about = "List the entries of a tree object")]
    LsTree {
        #[arg(index = 1, help = "The tree id, or a unique prefix of it")]
        object: String,
    },
    #[command(name = "add", about = "Stage files for the next tree")]
    Add {
        #[arg(index = 1, required = true, help = "Files to stage")]
        files: Vec<String>,
    },
    #[command(
        name = "write-tree",
        about = "Write the staged state as tree objects and print the root id"
    )]
    WriteTree,
    #[command(
        name = "verify-pack",
        about = "Verify the checksums of a pack file and its index"
    )]
    VerifyPack {
        #[arg(index = 1, help = "Path to the .pack file")]
        pack: String,
    },
}

struct Store {
    git_path: PathBuf,
    algorithm: HashAlgorithm,
}

impl Store {
    fn discover() -> Result<Self> {
        let git_path = std::env::current_dir()?.join(".git");
        if !git_path.is_dir() {
            bail!("not a repository: {} does not exist", git_path.display());
        }
        Ok(Store {
            git_path,
            algorithm: HashAlgorithm::Sha1,
        })
    }

    fn database(&self) -> Result<Database> {
        let config = StoreConfig::new(self.git_path.join("objects"), self.algorithm, false);
        Ok(Database::open(config)?)
    }

    fn index(&self) -> Result<Index> {
        Ok(Index::load_from(self.git_path.join("index"), self.algorithm)?)
    }
}

fn init(path: Option<String>) -> Result<()> {
    let root = match path {
        Some(path) => PathBuf::from(path),
        None => std::env::current_dir()?,
    };
    let git_path = root.join(".git");
    std::fs::create_dir_all(git_path.join("objects").join("pack"))?;

    println!("Initialized empty cask store in {}", git_path.display());
    Ok(())
}

fn hash_object(write: bool, file: &str) -> Result<()> {
    let data = std::fs::read(file).with_context(|| format!("cannot read {file}"))?;

    let oid = if write {
        let store = Store::discover()?;
        store.database()?.write(ObjectType::Blob, &data)?
    } else {
        Object::new(ObjectType::Blob, data).id(HashAlgorithm::Sha1)
    };

    println!("{oid}");
    Ok(())
}

fn cat_file(pretty: bool, name: &str) -> Result<()> {
    let store = Store::discover()?;
    let db = store.database()?;
    let object = db.read_prefix(name)?;

    if pretty {
        std::io::stdout().write_all(&object.data)?;
    } else {
        println!("{}", object.object_type);
    }
    Ok(())
}

fn ls_tree(name: &str) -> Result<()> {
    let store = Store::discover()?;
    let db = store.database()?;
    let oid = db.resolve_prefix(name)?;
    let object = db.read_typed(&oid, ObjectType::Tree)?;

    for entry in tree::decode(&object.data, store.algorithm)? {
        let object_type = if entry.is_tree() { "tree" } else { "blob" };
        println!(
            "{:0>6} {} {}\t{}",
            entry.mode.as_octal_str(),
            object_type,
            entry.oid,
            entry.name
        );
    }
    Ok(())
}

fn add(files: &[String]) -> Result<()> {
    let store = Store::discover()?;
    let db = store.database()?;
    let mut index = store.index()?;

    for file in files {
        let path = Path::new(file);
        let data = std::fs::read(path).with_context(|| format!("cannot stage {file}"))?;
        let metadata = std::fs::symlink_metadata(path)?;

        let oid = db.write(ObjectType::Blob, &data)?;
        index.add(file.clone(), oid, EntryMetadata::from((path, &metadata)));
    }

    index.write_updates()?;
    Ok(())
}

fn write_tree() -> Result<()> {
    let store = Store::discover()?;
    let db = store.database()?;
    let index = store.index()?;

    let root = index.write_tree(&db)?;
    println!("{root}");
    Ok(())
}

fn verify_pack(pack_path: &str) -> Result<()> {
    let pack_path = Path::new(pack_path);
    let idx_path = pack_path.with_extension("idx");

    let pack = PackFile::parse(std::fs::read(pack_path)?, HashAlgorithm::Sha1)?;
    pack.verify_checksum()?;

    let idx = PackIndex::parse(std::fs::read(&idx_path)?, HashAlgorithm::Sha1)?;
    idx.verify_checksum()?;

    if idx.pack_checksum()? != pack.stored_checksum()? {
        bail!(
            "index {} does not belong to pack {}",
            idx_path.display(),
            pack_path.display()
        );
    }
    if idx.object_count() != pack.object_count() {
        bail!(
            "index lists {} objects, pack header says {}",
            idx.object_count(),
            pack.object_count()
        );
    }

    println!("{}: ok, {} objects", pack_path.display(), pack.object_count());
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match &cli.command {
        Commands::Init { path } => init(path.clone())?,
        Commands::HashObject { write, file } => hash_object(*write, file)?,
        Commands::CatFile { pretty, object } => cat_file(*pretty, object)?,
        Commands::LsTree { object } => ls_tree(object)?,
        Commands::Add { files } => add(files)?,
        Commands::WriteTree => write_tree()?,
        Commands::VerifyPack { pack } => verify_pack(pack)?,
    }

    Ok(())
}
