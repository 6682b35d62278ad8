//! Pack index (`.idx` v2) parsing and lookup
//!
//! ## Layout
//!
//! ```text
//! magic 0xff 't' 'O' 'c' | version 2
//! fan-out: 256 big-endian u32 cumulative counts (fanout[255] = N)
//! oid table: N ids, sorted ascending
//! crc table: N u32
//! offset table: N u32 (MSB set = index into the large offset table)
//! large offsets: M u64 (only for pack offsets >= 2^31)
//! trailer: pack checksum, then index checksum
//! ```
//!
//! Lookup is fan-out bucket selection followed by binary search within
//! the bucket.

use crate::artifacts::objects::object_id::{HashAlgorithm, ObjectId};
use crate::errors::{Error, Result};
use byteorder::{BigEndian, ByteOrder};
use bytes::Bytes;

/// Magic bytes opening a v2 pack index.
pub const IDX_MAGIC: [u8; 4] = [0xff, b't', b'O', b'c'];
/// The only supported index version.
pub const IDX_VERSION: u32 = 2;
const FANOUT_ENTRIES: usize = 256;
const FANOUT_SIZE: usize = FANOUT_ENTRIES * 4;
const HEADER_SIZE: usize = 8;
/// MSB of a 4-byte offset marks an indirection into the 8-byte table.
const LARGE_OFFSET_FLAG: u32 = 0x8000_0000;

/// Parsed pack index, holding its own copy of the file bytes.
#[derive(Debug, Clone)]
pub struct PackIndex {
    algorithm: HashAlgorithm,
    data: Bytes,
    object_count: u32,
    oid_table: usize,
    offset_table: usize,
    large_offsets: Option<(usize, usize)>,
}

impl PackIndex {
    /// Parse a `.idx` v2 buffer, validating the header, fan-out
    /// monotonicity and table bounds.
    pub fn parse(data: impl Into<Bytes>, algorithm: HashAlgorithm) -> Result<Self> {
        let data: Bytes = data.into();
        let oid_len = algorithm.oid_len();

        let min_size = HEADER_SIZE + FANOUT_SIZE + 2 * oid_len;
        if data.len() < min_size {
            return Err(Error::corrupt("pack index", "file too small"));
        }
        if data[..4] != IDX_MAGIC {
            return Err(Error::corrupt("pack index", "bad magic"));
        }
        let version = BigEndian::read_u32(&data[4..8]);
        if version != IDX_VERSION {
            return Err(Error::corrupt(
                "pack index",
                format!("unsupported version {version}"),
            ));
        }

        let fanout = &data[HEADER_SIZE..HEADER_SIZE + FANOUT_SIZE];
        let mut prev = 0u32;
        for i in 0..FANOUT_ENTRIES {
            let value = BigEndian::read_u32(&fanout[i * 4..]);
            if value < prev {
                return Err(Error::corrupt("pack index", "fan-out not monotonic"));
            }
            prev = value;
        }
        let object_count = prev;

        let n = object_count as usize;
        let oid_table = HEADER_SIZE + FANOUT_SIZE;
        let crc_table = oid_table + n * oid_len;
        let offset_table = crc_table + n * 4;
        let offset_table_end = offset_table + n * 4;
        let trailer = data.len() - 2 * oid_len;

        if offset_table_end > trailer {
            return Err(Error::corrupt("pack index", "tables run past trailer"));
        }

        let large_offsets = if trailer > offset_table_end {
            let len = trailer - offset_table_end;
            if len % 8 != 0 {
                return Err(Error::corrupt(
                    "pack index",
                    "large offset table not a multiple of 8 bytes",
                ));
            }
            Some((offset_table_end, len))
        } else {
            None
        };

        Ok(PackIndex {
            algorithm,
            data,
            object_count,
            oid_table,
            offset_table,
            large_offsets,
        })
    }

    pub fn object_count(&self) -> u32 {
        self.object_count
    }

    pub fn algorithm(&self) -> HashAlgorithm {
        self.algorithm
    }

    /// Checksum of the companion `.pack` file, from the trailer.
    pub fn pack_checksum(&self) -> Result<ObjectId> {
        let oid_len = self.algorithm.oid_len();
        let start = self.data.len() - 2 * oid_len;
        ObjectId::from_bytes(&self.data[start..start + oid_len])
    }

    /// Recompute the trailing index checksum; `Corrupt` on mismatch.
    pub fn verify_checksum(&self) -> Result<()> {
        let oid_len = self.algorithm.oid_len();
        let body_end = self.data.len() - oid_len;

        let mut hasher = self.algorithm.hasher();
        hasher.update(&self.data[..body_end]);
        let actual = hasher.finalize();
        let stored = ObjectId::from_bytes(&self.data[body_end..])?;

        if actual != stored {
            return Err(Error::corrupt(
                "pack index",
                format!("checksum mismatch: stored {stored}, computed {actual}"),
            ));
        }
        Ok(())
    }

    fn fanout(&self, first_byte: u8) -> u32 {
        BigEndian::read_u32(&self.data[HEADER_SIZE + first_byte as usize * 4..])
    }

    /// Id at a table position (positions run in sorted id order).
    pub fn oid_at(&self, position: u32) -> Result<ObjectId> {
        let oid_len = self.algorithm.oid_len();
        let start = self.oid_table + position as usize * oid_len;
        ObjectId::from_bytes(&self.data[start..start + oid_len])
    }

    /// Pack byte offset of the object at a table position, following the
    /// large-offset indirection where flagged.
    pub fn offset_at(&self, position: u32) -> Result<u64> {
        let raw = BigEndian::read_u32(&self.data[self.offset_table + position as usize * 4..]);

        if raw & LARGE_OFFSET_FLAG == 0 {
            return Ok(raw as u64);
        }

        let (table_start, table_len) = self.large_offsets.ok_or_else(|| {
            Error::corrupt("pack index", "large offset flag but no large offset table")
        })?;
        let index = (raw & !LARGE_OFFSET_FLAG) as usize;
        if index * 8 + 8 > table_len {
            return Err(Error::corrupt(
                "pack index",
                format!("large offset index {index} out of bounds"),
            ));
        }
        Ok(BigEndian::read_u64(&self.data[table_start + index * 8..]))
    }

    /// Fan-out bucket + binary search; `None` when the id is not packed here.
    pub fn lookup(&self, oid: &ObjectId) -> Result<Option<u64>> {
        let first = oid.as_bytes()[0];
        let mut lo = if first == 0 { 0 } else { self.fanout(first - 1) };
        let mut hi = self.fanout(first);

        while lo < hi {
            let mid = lo + (hi - lo) / 2;
            match self.oid_at(mid)?.cmp(oid) {
                std::cmp::Ordering::Less => lo = mid + 1,
                std::cmp::Ordering::Greater => hi = mid,
                std::cmp::Ordering::Equal => return Ok(Some(self.offset_at(mid)?)),
            }
        }
        Ok(None)
    }

    /// All ids in this index whose hex form starts with `prefix`.
    ///
    /// Prefixes of two or more characters are confined to one fan-out
    /// bucket; shorter ones scan the whole table.
    pub fn oids_with_prefix(&self, prefix: &str) -> Result<Vec<ObjectId>> {
        let (mut lo, mut hi) = (0u32, self.object_count);
        if prefix.len() >= 2 {
            if let Ok(first) = u8::from_str_radix(&prefix[..2], 16) {
                lo = if first == 0 { 0 } else { self.fanout(first - 1) };
                hi = self.fanout(first);
            }
        }

        let mut matches = Vec::new();
        for position in lo..hi {
            let oid = self.oid_at(position)?;
            if oid.starts_with_hex(prefix) {
                matches.push(oid);
            }
        }
        Ok(matches)
    }

    /// Sorted iteration over every id in the index.
    pub fn oids(&self) -> impl Iterator<Item = Result<ObjectId>> + '_ {
        (0..self.object_count).map(|position| self.oid_at(position))
    }
}
