//! Objects and the loose object codec
//!
//! A loose object is the zlib-compressed bytes of
//! `"<type> <decimal-length>\0<content>"`. The object's id is the store
//! hash of that same uncompressed buffer, so ids are always derived from
//! content; callers never supply one on write.

use crate::artifacts::objects::object_id::{HashAlgorithm, ObjectId};
use crate::artifacts::objects::object_type::ObjectType;
use crate::errors::{Error, Result};
use bytes::Bytes;
use std::io::{Read, Write};

/// A decoded object: its type tag plus the raw uncompressed payload.
///
/// Objects own their bytes independently of whichever backend produced
/// them, so nothing aliases into a pack buffer after the read returns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Object {
    pub object_type: ObjectType,
    pub data: Bytes,
}

impl Object {
    pub fn new(object_type: ObjectType, data: impl Into<Bytes>) -> Self {
        Object {
            object_type,
            data: data.into(),
        }
    }

    /// The id this object hashes to under the given algorithm.
    pub fn id(&self, algorithm: HashAlgorithm) -> ObjectId {
        algorithm.digest(&[&loose_header(self.object_type, self.data.len()), &self.data])
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

fn loose_header(object_type: ObjectType, len: usize) -> Vec<u8> {
    format!("{} {}\0", object_type.as_str(), len).into_bytes()
}

/// Encode an object for loose storage.
///
/// Returns the derived id together with the compressed on-disk bytes.
pub fn encode_loose(
    algorithm: HashAlgorithm,
    object_type: ObjectType,
    data: &[u8],
) -> Result<(ObjectId, Bytes)> {
    let header = loose_header(object_type, data.len());
    let oid = algorithm.digest(&[&header, data]);

    let mut encoder = flate2::write::ZlibEncoder::new(
        Vec::with_capacity(header.len() + data.len() / 2),
        flate2::Compression::default(),
    );
    encoder.write_all(&header)?;
    encoder.write_all(data)?;
    let compressed = encoder.finish()?;

    Ok((oid, Bytes::from(compressed)))
}

/// Decode a loose object from its compressed on-disk bytes.
///
/// Fails with `Corrupt` when inflation fails, the header does not parse,
/// or the declared length disagrees with the remaining bytes.
pub fn decode_loose(compressed: &[u8]) -> Result<Object> {
    let mut decoder = flate2::read::ZlibDecoder::new(compressed);
    let mut inflated = Vec::new();
    decoder
        .read_to_end(&mut inflated)
        .map_err(|e| Error::corrupt("loose object", format!("zlib inflate failed: {e}")))?;

    let nul = inflated
        .iter()
        .position(|&b| b == 0)
        .ok_or_else(|| Error::corrupt("loose object", "missing NUL after header"))?;

    let header = std::str::from_utf8(&inflated[..nul])
        .map_err(|_| Error::corrupt("loose object", "header is not valid UTF-8"))?;
    let (type_str, len_str) = header
        .split_once(' ')
        .ok_or_else(|| Error::corrupt("loose object", format!("malformed header {header:?}")))?;

    let object_type = ObjectType::try_from(type_str)
        .map_err(|_| Error::corrupt("loose object", format!("unknown type {type_str:?}")))?;
    let declared_len: usize = len_str
        .parse()
        .map_err(|_| Error::corrupt("loose object", format!("bad length {len_str:?}")))?;

    let content = &inflated[nul + 1..];
    if content.len() != declared_len {
        return Err(Error::corrupt(
            "loose object",
            format!(
                "declared length {declared_len} but found {} content bytes",
                content.len()
            ),
        ));
    }

    Ok(Object::new(object_type, content.to_vec()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;
    use rstest::rstest;

    #[rstest]
    #[case(ObjectType::Blob, b"hello world\n".to_vec())]
    #[case(ObjectType::Tree, vec![])]
    #[case(ObjectType::Commit, b"tree 0000\n".to_vec())]
    #[case(ObjectType::Tag, b"object 0000\n".to_vec())]
    fn encode_decode_round_trip(#[case] object_type: ObjectType, #[case] data: Vec<u8>) {
        let (oid, compressed) = encode_loose(HashAlgorithm::Sha1, object_type, &data).unwrap();

        let decoded = decode_loose(&compressed).unwrap();
        assert_eq!(decoded.object_type, object_type);
        assert_eq!(decoded.data.as_ref(), data.as_slice());
        assert_eq!(decoded.id(HashAlgorithm::Sha1), oid);
    }

    #[test]
    fn known_git_blob_id() {
        // `echo 'test content' | git hash-object --stdin`
        let (oid, _) =
            encode_loose(HashAlgorithm::Sha1, ObjectType::Blob, b"test content\n").unwrap();
        assert_eq!(oid.to_hex(), "d670460b4b4aece5915caf5c68d12f560a9fe3e4");
    }

    #[test]
    fn decode_rejects_garbage() {
        let err = decode_loose(b"not zlib at all").unwrap_err();
        assert!(matches!(err, Error::Corrupt { .. }));
    }

    #[test]
    fn decode_rejects_length_mismatch() {
        // Compress a buffer whose header lies about the content length.
        let mut encoder =
            flate2::write::ZlibEncoder::new(Vec::new(), flate2::Compression::default());
        encoder.write_all(b"blob 99\0short").unwrap();
        let compressed = encoder.finish().unwrap();

        let err = decode_loose(&compressed).unwrap_err();
        assert!(matches!(err, Error::Corrupt { .. }));
    }

    #[test]
    fn decode_rejects_missing_header_nul() {
        let mut encoder =
            flate2::write::ZlibEncoder::new(Vec::new(), flate2::Compression::default());
        encoder.write_all(b"blob 4 abcd").unwrap();
        let compressed = encoder.finish().unwrap();

        let err = decode_loose(&compressed).unwrap_err();
        assert!(matches!(err, Error::Corrupt { .. }));
    }

    proptest! {
        #[test]
        fn round_trip_arbitrary_blobs(data in proptest::collection::vec(any::<u8>(), 0..2048)) {
            let (oid, compressed) =
                encode_loose(HashAlgorithm::Sha1, ObjectType::Blob, &data).unwrap();
            let decoded = decode_loose(&compressed).unwrap();

            prop_assert_eq!(decoded.object_type, ObjectType::Blob);
            prop_assert_eq!(decoded.data.as_ref(), data.as_slice());
            prop_assert_eq!(decoded.id(HashAlgorithm::Sha1), oid);
        }
    }
}
