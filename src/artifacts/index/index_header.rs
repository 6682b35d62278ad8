use crate::artifacts::index::{HEADER_SIZE, SIGNATURE, VERSION};
use crate::errors::{Error, Result};
use byteorder::{ByteOrder, NetworkEndian, WriteBytesExt};
use bytes::Bytes;
use derive_new::new;
use std::io::Write;

/// Fixed 12-byte index file header.
#[derive(Debug, Clone, new)]
pub struct IndexHeader {
    pub(crate) signature: [u8; 4],
    pub(crate) version: u32,
    pub(crate) entries_count: u32,
}

impl IndexHeader {
    pub(crate) fn empty() -> Self {
        IndexHeader {
            signature: SIGNATURE,
            version: VERSION,
            entries_count: 0,
        }
    }

    pub(crate) fn serialize(&self) -> Result<Bytes> {
        let mut bytes = Vec::with_capacity(HEADER_SIZE);
        bytes.write_all(&self.signature)?;
        bytes.write_u32::<NetworkEndian>(self.version)?;
        bytes.write_u32::<NetworkEndian>(self.entries_count)?;

        Ok(Bytes::from(bytes))
    }

    /// Parse and validate the header; `Corrupt` on a foreign signature or
    /// unsupported version.
    pub(crate) fn deserialize(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < HEADER_SIZE {
            return Err(Error::corrupt("index file", "truncated header"));
        }

        let mut signature = [0u8; 4];
        signature.copy_from_slice(&bytes[0..4]);
        if signature != SIGNATURE {
            return Err(Error::corrupt("index file", "invalid signature"));
        }

        let version = NetworkEndian::read_u32(&bytes[4..8]);
        if version != VERSION {
            return Err(Error::corrupt(
                "index file",
                format!("unsupported version {version}"),
            ));
        }

        let entries_count = NetworkEndian::read_u32(&bytes[8..12]);

        Ok(IndexHeader {
            signature,
            version,
            entries_count,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn serialize_round_trips() {
        let header = IndexHeader::new(SIGNATURE, VERSION, 7);
        let bytes = header.serialize().unwrap();
        assert_eq!(bytes.len(), HEADER_SIZE);

        let parsed = IndexHeader::deserialize(&bytes).unwrap();
        assert_eq!(parsed.entries_count, 7);
        assert_eq!(parsed.version, VERSION);
    }

    #[test]
    fn rejects_foreign_signature() {
        let header = IndexHeader::new(*b"JUNK", VERSION, 0);
        let bytes = header.serialize().unwrap();
        let err = IndexHeader::deserialize(&bytes).unwrap_err();
        assert!(matches!(err, Error::Corrupt { .. }));
    }

    #[test]
    fn rejects_unsupported_version() {
        let header = IndexHeader::new(SIGNATURE, 9, 0);
        let bytes = header.serialize().unwrap();
        let err = IndexHeader::deserialize(&bytes).unwrap_err();
        assert!(matches!(err, Error::Corrupt { .. }));
    }
}
