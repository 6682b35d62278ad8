//! Delta stream application
//!
//! A delta encodes an object as edits against a base: two varint sizes
//! (base length, result length) followed by copy-from-base and
//! insert-literal commands. The result length is a hard contract; any
//! disagreement is corruption, never truncated output.

use crate::errors::{Error, Result};

fn corrupt(detail: impl Into<String>) -> Error {
    Error::corrupt("pack delta", detail)
}

/// Read the size varint used by delta headers (little-endian base-128).
pub fn read_size_varint(data: &[u8], pos: &mut usize) -> Result<u64> {
    let mut shift: u32 = 0;
    let mut value: u64 = 0;

    loop {
        let byte = *data
            .get(*pos)
            .ok_or_else(|| corrupt("truncated size varint"))?;
        *pos += 1;

        value |= ((byte & 0x7f) as u64) << shift;
        if byte & 0x80 == 0 {
            return Ok(value);
        }
        shift += 7;
        if shift > 63 {
            return Err(corrupt("size varint overflows 64 bits"));
        }
    }
}

/// Parse just the (base size, result size) header of a delta stream.
pub fn delta_sizes(delta: &[u8]) -> Result<(usize, usize)> {
    let mut pos = 0;
    let base_size = read_size_varint(delta, &mut pos)? as usize;
    let result_size = read_size_varint(delta, &mut pos)? as usize;
    Ok((base_size, result_size))
}

/// Apply a delta stream to its base, returning the reconstructed object
/// bytes.
///
/// Fails with `Corrupt` when the declared base size disagrees with the
/// actual base, a copy command reaches outside the base, a literal runs
/// past the stream, or the accumulated output length does not equal the
/// declared result length.
pub fn apply(base: &[u8], delta: &[u8]) -> Result<Vec<u8>> {
    let mut pos = 0;
    let base_size = read_size_varint(delta, &mut pos)? as usize;
    let result_size = read_size_varint(delta, &mut pos)? as usize;

    if base_size != base.len() {
        return Err(corrupt(format!(
            "base size {} does not match actual base of {} bytes",
            base_size,
            base.len()
        )));
    }

    let mut out = Vec::with_capacity(result_size);

    while pos < delta.len() {
        let command = delta[pos];
        pos += 1;

        if command & 0x80 != 0 {
            let (offset, size) = read_copy_params(delta, &mut pos, command)?;
            let end = offset
                .checked_add(size)
                .filter(|&end| end <= base.len())
                .ok_or_else(|| corrupt("copy command reaches outside base object"))?;
            if out.len() + size > result_size {
                return Err(corrupt("copy command overruns declared result size"));
            }
            out.extend_from_slice(&base[offset..end]);
        } else if command != 0 {
            let size = command as usize;
            if pos + size > delta.len() {
                return Err(corrupt("literal insert runs past end of delta"));
            }
            if out.len() + size > result_size {
                return Err(corrupt("literal insert overruns declared result size"));
            }
            out.extend_from_slice(&delta[pos..pos + size]);
            pos += size;
        } else {
            // Command byte zero is reserved.
            return Err(corrupt("reserved zero command byte"));
        }
    }

    if out.len() != result_size {
        return Err(corrupt(format!(
            "delta produced {} bytes, header declared {result_size}",
            out.len()
        )));
    }

    Ok(out)
}

/// Decode the offset/size operands of a copy command. Set bits in the
/// command byte select which little-endian operand bytes are present;
/// a zero size encodes 0x10000.
fn read_copy_params(delta: &[u8], pos: &mut usize, command: u8) -> Result<(usize, usize)> {
    let mut next = |label: &'static str| -> Result<usize> {
        let byte = *delta
            .get(*pos)
            .ok_or_else(|| corrupt(format!("truncated {label} operand")))?;
        *pos += 1;
        Ok(byte as usize)
    };

    let mut offset = 0usize;
    for (bit, shift) in [(0x01u8, 0), (0x02, 8), (0x04, 16), (0x08, 24)] {
        if command & bit != 0 {
            offset |= next("copy offset")? << shift;
        }
    }

    let mut size = 0usize;
    for (bit, shift) in [(0x10u8, 0), (0x20, 8), (0x40, 16)] {
        if command & bit != 0 {
            size |= next("copy size")? << shift;
        }
    }

    if size == 0 {
        size = 0x10000;
    }

    Ok((offset, size))
}

/// Build the varint form of a size, used when constructing delta streams.
pub fn write_size_varint(mut value: u64, out: &mut Vec<u8>) {
    loop {
        let mut byte = (value & 0x7f) as u8;
        value >>= 7;
        if value != 0 {
            byte |= 0x80;
        }
        out.push(byte);
        if value == 0 {
            break;
        }
    }
}
