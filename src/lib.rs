//! Content-addressable object store of a git-compatible version control
//! system: loose objects, pack files with delta resolution, trees and
//! the staging area, all bit-exact with git's on-disk formats.

pub mod areas;
pub mod artifacts;
pub mod errors;

pub use areas::database::{Database, StoreConfig};
pub use areas::index::Index;
pub use artifacts::objects::object::Object;
pub use artifacts::objects::object_id::{HashAlgorithm, ObjectId};
pub use artifacts::objects::object_type::ObjectType;
pub use errors::{Error, Result};
