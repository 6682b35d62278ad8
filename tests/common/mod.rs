//! Shared fixtures for integration tests: a minimal pack/index writer
//! built on the public codec surface.

use cask::artifacts::pack::delta::write_size_varint;
use cask::artifacts::pack::index::{IDX_MAGIC, IDX_VERSION};
use cask::artifacts::pack::reader::{PACK_HEADER_SIZE, PACK_MAGIC};
use cask::{HashAlgorithm, ObjectId, ObjectType};
use std::io::Write;
use std::path::Path;

/// Incremental pack writer producing a well-formed `.pack` image.
pub struct PackBuilder {
    algorithm: HashAlgorithm,
    body: Vec<u8>,
    count: u32,
}

impl PackBuilder {
    pub fn new(algorithm: HashAlgorithm) -> Self {
        PackBuilder {
            algorithm,
            body: Vec::new(),
            count: 0,
        }
    }

    fn deflate(data: &[u8]) -> Vec<u8> {
        let mut encoder =
            flate2::write::ZlibEncoder::new(Vec::new(), flate2::Compression::default());
        encoder.write_all(data).unwrap();
        encoder.finish().unwrap()
    }

    fn entry_header(&mut self, type_code: u8, size: usize) {
        let mut size = size as u64;
        let mut byte = (type_code << 4) | (size & 0x0f) as u8;
        size >>= 4;
        while size > 0 {
            self.body.push(byte | 0x80);
            byte = (size & 0x7f) as u8;
            size >>= 7;
        }
        self.body.push(byte);
    }

    pub fn add_plain(&mut self, object_type: ObjectType, data: &[u8]) -> u64 {
        let offset = PACK_HEADER_SIZE as u64 + self.body.len() as u64;
        self.entry_header(object_type.pack_code(), data.len());
        self.body.extend_from_slice(&Self::deflate(data));
        self.count += 1;
        offset
    }

    pub fn add_ofs_delta(&mut self, base_offset: u64, delta: &[u8]) -> u64 {
        let offset = PACK_HEADER_SIZE as u64 + self.body.len() as u64;
        self.entry_header(6, delta.len());

        let mut distance = offset - base_offset;
        let mut encoded = vec![(distance & 0x7f) as u8];
        distance >>= 7;
        while distance > 0 {
            distance -= 1;
            encoded.push(0x80 | (distance & 0x7f) as u8);
            distance >>= 7;
        }
        encoded.reverse();
        self.body.extend_from_slice(&encoded);

        self.body.extend_from_slice(&Self::deflate(delta));
        self.count += 1;
        offset
    }

    pub fn add_ref_delta(&mut self, base_oid: &ObjectId, delta: &[u8]) -> u64 {
        let offset = PACK_HEADER_SIZE as u64 + self.body.len() as u64;
        self.entry_header(7, delta.len());
        self.body.extend_from_slice(base_oid.as_bytes());
        self.body.extend_from_slice(&Self::deflate(delta));
        self.count += 1;
        offset
    }

    pub fn build(self) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&PACK_MAGIC);
        out.extend_from_slice(&2u32.to_be_bytes());
        out.extend_from_slice(&self.count.to_be_bytes());
        out.extend_from_slice(&self.body);

        let checksum = self.algorithm.digest(&[out.as_slice()]);
        out.extend_from_slice(checksum.as_bytes());
        out
    }
}

/// Assemble a `.idx` v2 image for the given (id, offset) table.
pub fn build_idx(
    algorithm: HashAlgorithm,
    objects: &[(ObjectId, u64)],
    pack_checksum: &ObjectId,
) -> Vec<u8> {
    let mut sorted: Vec<_> = objects.to_vec();
    sorted.sort_by(|a, b| a.0.cmp(&b.0));

    let mut fanout = [0u32; 256];
    for (oid, _) in &sorted {
        fanout[oid.as_bytes()[0] as usize] += 1;
    }

    let mut out = Vec::new();
    out.extend_from_slice(&IDX_MAGIC);
    out.extend_from_slice(&IDX_VERSION.to_be_bytes());
    let mut running = 0u32;
    for count in fanout {
        running += count;
        out.extend_from_slice(&running.to_be_bytes());
    }
    for (oid, _) in &sorted {
        out.extend_from_slice(oid.as_bytes());
    }
    for _ in &sorted {
        out.extend_from_slice(&0u32.to_be_bytes());
    }
    for (_, offset) in &sorted {
        out.extend_from_slice(&(*offset as u32).to_be_bytes());
    }
    out.extend_from_slice(pack_checksum.as_bytes());

    let idx_checksum = algorithm.digest(&[out.as_slice()]);
    out.extend_from_slice(idx_checksum.as_bytes());
    out
}

/// A delta stream that copies the whole base and appends `extra`.
pub fn copy_all_delta(base: &[u8], extra: &[u8]) -> Vec<u8> {
    let mut delta = Vec::new();
    write_size_varint(base.len() as u64, &mut delta);
    write_size_varint((base.len() + extra.len()) as u64, &mut delta);
    delta.push(0x91); // copy with offset byte and one size byte
    delta.push(0);
    delta.push(base.len() as u8);
    delta.push(extra.len() as u8);
    delta.extend_from_slice(extra);
    delta
}

/// Write a pack and its index under `objects/pack/` with the given stem.
pub fn install_pack(objects_dir: &Path, stem: &str, pack: &[u8], idx: &[u8]) {
    let pack_dir = objects_dir.join("pack");
    std::fs::create_dir_all(&pack_dir).unwrap();
    std::fs::write(pack_dir.join(format!("{stem}.pack")), pack).unwrap();
    std::fs::write(pack_dir.join(format!("{stem}.idx")), idx).unwrap();
}
