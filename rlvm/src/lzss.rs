//! LZSS decompression for scenario payloads and 32-bit-per-pixel assets.
//!
//! Grounded on `original_source/src/base/compression.cpp`: both variants
//! frame a flag-byte/back-reference stream behind an
//! `[archive_size][original_size]` little-endian header. Pure functions
//! over bytes; no state survives a call.

use rlvm_types::{Error, Result};

use crate::bytes::ByteReader;

/// Decompress a standard (byte-oriented) LZSS stream.
///
/// `data` must begin with the 8-byte header `[u32 archive_size][u32
/// original_size]`. `archive_size` must equal `data.len()` exactly;
/// decoding stops the instant `original_size` bytes have been produced,
/// even mid flag-byte.
pub fn decompress(data: &[u8]) -> Result<Vec<u8>> {
    if data.is_empty() {
        return Ok(Vec::new());
    }
    decompress_framed(data, |reader, out, original_size| {
        while out.len() < original_size {
            let flags = reader.pop_as_u8()?;
            decode_flag_byte(flags, reader, out, original_size, false)?;
        }
        Ok(())
    })
}

/// Decompress the 32-bit-per-pixel LZSS variant used for some image data.
///
/// Each literal expands to 4 bytes (3 input bytes plus a constant `0xff`
/// alpha byte); back-references copy 4-byte chunks at an offset packed as
/// `(word >> 2) & !0b11`, with a chunk count of `1 + (word & 0xf)`.
pub fn decompress32(data: &[u8]) -> Result<Vec<u8>> {
    if data.is_empty() {
        return Ok(Vec::new());
    }
    decompress_framed(data, |reader, out, original_size| {
        while out.len() < original_size {
            let flags = reader.pop_as_u8()?;
            decode_flag_byte(flags, reader, out, original_size, true)?;
        }
        Ok(())
    })
}

fn decompress_framed(
    data: &[u8],
    body: impl Fn(&mut ByteReader, &mut Vec<u8>, usize) -> Result<()>,
) -> Result<Vec<u8>> {
    if data.len() < 8 {
        return Err(Error::BadFormat(
            "LZSS input shorter than the 8-byte header".into(),
        ));
    }

    let mut reader = ByteReader::new(data);
    let archive_size = reader.pop_as::<u32>(4)? as usize;
    let original_size = reader.pop_as::<u32>(4)? as usize;

    if archive_size != data.len() {
        return Err(Error::BadFormat(format!(
            "declared archive size {archive_size} does not match input length {}",
            data.len()
        )));
    }

    let mut out = Vec::with_capacity(original_size);
    body(&mut reader, &mut out, original_size)?;

    if out.len() != original_size {
        return Err(Error::Truncated(format!(
            "expected {original_size} decompressed bytes, got {}",
            out.len()
        )));
    }
    Ok(out)
}

fn decode_flag_byte(
    mut flags: u8,
    reader: &mut ByteReader,
    out: &mut Vec<u8>,
    original_size: usize,
    wide: bool,
) -> Result<()> {
    for _ in 0..8 {
        if out.len() >= original_size {
            break;
        }

        if flags & 1 != 0 {
            if wide {
                out.push(reader.pop_as_u8()?);
                out.push(reader.pop_as_u8()?);
                out.push(reader.pop_as_u8()?);
                out.push(0xff);
            } else {
                out.push(reader.pop_as_u8()?);
            }
        } else {
            let word = reader.pop_as::<u16>(2)?;
            if wide {
                let chunk_size = (1 + (word & 0x0f)) as usize * 4;
                let offset = ((word >> 2) & !0b11) as usize;
                copy_backref(out, offset, chunk_size)?;
            } else {
                let chunk_size = (2 + (word & 0x0f)) as usize;
                let offset = (word >> 4) as usize;
                copy_backref(out, offset, chunk_size)?;
            }
        }

        flags >>= 1;
    }
    Ok(())
}

/// Copies `length` bytes one at a time from `out.len() - offset`,
/// appending as it goes. Overlapping source/destination ranges are
/// intentional: this is how LZSS expresses runs longer than `offset`.
fn copy_backref(out: &mut Vec<u8>, offset: usize, length: usize) -> Result<()> {
    let start = out
        .len()
        .checked_sub(offset)
        .ok_or_else(|| Error::BadFormat("back-reference offset precedes start of output".into()))?;
    for i in 0..length {
        let byte = *out
            .get(start + i)
            .ok_or_else(|| Error::BadFormat("back-reference reads past produced output".into()))?;
        out.push(byte);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header(archive_size: u32, original_size: u32) -> Vec<u8> {
        let mut v = archive_size.to_le_bytes().to_vec();
        v.extend_from_slice(&original_size.to_le_bytes());
        v
    }

    #[test]
    fn literal_frame_round_trips() {
        // spec.md §8 scenario 1, frame A.
        let mut input = header(0x0d, 4);
        input.push(0x0f);
        input.extend_from_slice(b"ABCD");
        assert_eq!(decompress(&input).unwrap(), b"ABCD");
    }

    #[test]
    fn backreference_repeats_a_run() {
        // spec.md §8 scenario 1, frame B: "ABC" then a 3-byte copy of it.
        let mut input = header(0x0e, 6);
        input.push(0x07);
        input.extend_from_slice(b"ABC");
        input.extend_from_slice(&[0x31, 0x00]);
        assert_eq!(decompress(&input).unwrap(), b"ABCABC");
    }

    #[test]
    fn rejects_short_input() {
        assert!(matches!(decompress(&[1, 2, 3]), Err(Error::BadFormat(_))));
    }

    #[test]
    fn rejects_archive_size_mismatch() {
        let mut input = header(100, 4);
        input.push(0x0f);
        input.extend_from_slice(b"ABCD");
        assert!(matches!(decompress(&input), Err(Error::BadFormat(_))));
    }

    #[test]
    fn truncated_stream_is_reported() {
        let input = header(9, 10);
        assert!(matches!(decompress(&input), Err(Error::Truncated(_))));
    }

    #[test]
    fn empty_input_is_empty_output() {
        assert_eq!(decompress(&[]).unwrap(), Vec::<u8>::new());
    }

    #[test]
    fn lzss32_literal_expands_to_four_bytes_with_alpha() {
        let mut input = header(12, 4);
        input.push(0x01);
        input.extend_from_slice(&[1, 2, 3]);
        assert_eq!(decompress32(&input).unwrap(), vec![1, 2, 3, 0xff]);
    }
}
