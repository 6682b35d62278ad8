//! Object model: ids, type tags, the loose codec and trees

pub mod entry_mode;
pub mod object;
pub mod object_id;
pub mod object_type;
pub mod tree;
