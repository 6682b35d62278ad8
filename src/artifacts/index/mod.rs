//! Index (staging area) file format
//!
//! ## File Format (Version 2)
//!
//! ```text
//! Header (12 bytes):
//!   - Signature: "DIRC" (4 bytes)
//!   - Version: 2 (4 bytes)
//!   - Entry count (4 bytes)
//!
//! Entries (variable length):
//!   - Fixed stat/id/flags part, then the NUL-terminated path
//!   - Each entry padded to 8-byte alignment
//!
//! Extensions (optional):
//!   - 4-byte signature + big-endian u32 payload length each
//!
//! Checksum:
//!   - Hash of all preceding bytes (20 or 32 depending on algorithm)
//! ```

pub mod checksum;
pub mod index_entry;
pub mod index_header;

/// Magic signature identifying index files
pub const SIGNATURE: [u8; 4] = *b"DIRC";

/// Index file format version
pub const VERSION: u32 = 2;

/// Size of index header in bytes
pub const HEADER_SIZE: usize = 12; // 4 bytes signature, 4 version, 4 entry count

/// Block size for entry alignment (8 bytes)
pub const ENTRY_BLOCK: usize = 8;

/// Size of an extension header: 4-byte signature + u32 payload length
pub const EXTENSION_HEADER_SIZE: usize = 8;
