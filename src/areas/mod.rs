//! Core store components
//!
//! - `database`: object database over loose and pack backends
//! - `index`: the staging area and its on-disk codec

pub mod database;
pub mod index;
