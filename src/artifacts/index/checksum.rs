//! Hashing pass-through for index file reads and writes
//!
//! Every byte that crosses the stream is folded into a running digest so
//! the trailing checksum can be verified (reads) or appended (writes)
//! without a second pass over the file.

use crate::artifacts::objects::object_id::{HashAlgorithm, Hasher, ObjectId};
use crate::errors::{Error, Result};
use bytes::Bytes;
use std::io::{Read, Write};

#[derive(Debug)]
pub struct Checksum<S> {
    stream: S,
    algorithm: HashAlgorithm,
    digest: Hasher,
}

impl<S> Checksum<S> {
    pub fn new(stream: S, algorithm: HashAlgorithm) -> Self {
        Checksum {
            stream,
            algorithm,
            digest: algorithm.hasher(),
        }
    }
}

impl<S: Read> Checksum<S> {
    /// Read exactly `size` bytes, feeding them to the digest.
    pub fn read(&mut self, size: usize) -> Result<Bytes> {
        let mut buffer = vec![0; size];
        self.stream
            .read_exact(&mut buffer)
            .map_err(|_| Error::corrupt("index file", "unexpected end of file"))?;

        self.digest.update(&buffer);
        Ok(Bytes::from(buffer))
    }

    /// Read the trailing checksum and compare it against the digest of
    /// everything read so far.
    pub fn verify(mut self) -> Result<()> {
        let mut stored = vec![0u8; self.algorithm.oid_len()];
        self.stream
            .read_exact(&mut stored)
            .map_err(|_| Error::corrupt("index file", "missing trailing checksum"))?;

        let actual = self.digest.finalize();
        if stored != actual.as_bytes() {
            return Err(Error::corrupt(
                "index file",
                "checksum does not match value stored on disk",
            ));
        }
        Ok(())
    }
}

impl<S: Write> Checksum<S> {
    /// Write `data`, feeding it to the digest.
    pub fn write(&mut self, data: &[u8]) -> Result<()> {
        self.stream.write_all(data)?;
        self.digest.update(data);
        Ok(())
    }

    /// Append the digest of everything written so far as the trailer.
    pub fn write_checksum(mut self) -> Result<ObjectId> {
        let checksum = self.digest.finalize();
        self.stream.write_all(checksum.as_bytes())?;
        self.stream.flush()?;
        Ok(checksum)
    }
}
