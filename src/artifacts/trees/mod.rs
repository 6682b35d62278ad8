//! Database-backed tree operations
//!
//! - `walk`: recursive pre/postorder traversal over stored trees
//! - `update`: batch rewrite of a baseline tree, touched subtrees only

pub mod update;
pub mod walk;
