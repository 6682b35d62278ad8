//! Pack storage: many objects in one file, some delta-compressed
//!
//! - `index`: the `.idx` companion mapping ids to pack offsets
//! - `reader`: the `.pack` record parser and delta chain resolver
//! - `delta`: the copy/insert delta stream codec

pub mod delta;
pub mod index;
pub mod reader;
