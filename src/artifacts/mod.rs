//! Storage engine data structures and codecs
//!
//! - `objects`: object ids, loose object codec, tree codec
//! - `pack`: pack file reader, pack index, delta application
//! - `index`: the staging area's on-disk format
//! - `trees`: database-backed tree traversal and batch updates

pub mod index;
pub mod objects;
pub mod pack;
pub mod trees;
