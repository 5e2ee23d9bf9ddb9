//! Little-endian scalar reads over a byte slice.
//!
//! Grounded on `original_source/src/utilities/byte_reader.cpp`: bounded
//! `pop`/`read` of 1..8-byte little-endian integers, plus an explicit
//! seek. All bounds violations become [`Error::OutOfRange`].

use rlvm_types::{Error, Result};

/// A cursor over a borrowed byte slice supporting bounded little-endian
/// scalar reads.
pub struct ByteReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    /// Wrap `data` with the cursor positioned at the start.
    pub fn new(data: &'a [u8]) -> Self {
        ByteReader { data, pos: 0 }
    }

    /// Total length of the underlying slice.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether the underlying slice is empty.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Current read position.
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Move the cursor to an absolute byte offset.
    pub fn seek(&mut self, loc: usize) -> Result<()> {
        if loc > self.data.len() {
            return Err(Error::OutOfRange(format!(
                "seek to {loc} is past end of {}-byte buffer",
                self.data.len()
            )));
        }
        self.pos = loc;
        Ok(())
    }

    /// Advance the cursor by `count` bytes without reading.
    pub fn proceed(&mut self, count: usize) -> Result<()> {
        self.seek(self.pos + count)
    }

    /// Read `count` (1..=8) little-endian bytes as a `u64` without
    /// advancing the cursor.
    pub fn read_bytes(&self, count: usize) -> Result<u64> {
        if count == 0 || count > 8 {
            return Err(Error::OutOfRange(format!(
                "byte read count {count} must be between 1 and 8"
            )));
        }
        let end = self.pos.checked_add(count).ok_or_else(|| {
            Error::OutOfRange("byte read count overflowed cursor position".into())
        })?;
        let slice = self
            .data
            .get(self.pos..end)
            .ok_or_else(|| Error::OutOfRange("read beyond end of byte stream".into()))?;
        let mut result = 0u64;
        for (i, &b) in slice.iter().enumerate() {
            result |= (b as u64) << (8 * i);
        }
        Ok(result)
    }

    /// Read `count` bytes and advance the cursor.
    pub fn pop_bytes(&mut self, count: usize) -> Result<u64> {
        let v = self.read_bytes(count)?;
        self.pos += count;
        Ok(v)
    }

    /// Pop a single byte as `u8`.
    pub fn pop_as_u8(&mut self) -> Result<u8> {
        Ok(self.pop_bytes(1)? as u8)
    }

    /// Pop `count` bytes and narrow to `T`. `T` is expected to be an
    /// unsigned integer type at least as wide as `count` bytes; callers
    /// cast down explicitly for signed reads (see [`Self::pop_i32`]).
    pub fn pop_as<T: TryFromU64>(&mut self, count: usize) -> Result<T> {
        T::try_from_u64(self.pop_bytes(count)?)
    }

    /// Pop a little-endian `i32`.
    pub fn pop_i32(&mut self) -> Result<i32> {
        Ok(self.pop_bytes(4)? as u32 as i32)
    }

    /// Pop a little-endian `u16`.
    pub fn pop_u16(&mut self) -> Result<u16> {
        Ok(self.pop_bytes(2)? as u16)
    }

    /// Pop a little-endian `u32`.
    pub fn pop_u32(&mut self) -> Result<u32> {
        Ok(self.pop_bytes(4)? as u32)
    }

    /// The remaining, unread bytes.
    pub fn remaining(&self) -> &'a [u8] {
        &self.data[self.pos..]
    }
}

/// Narrowing conversion used by [`ByteReader::pop_as`].
pub trait TryFromU64: Sized {
    /// Narrow a `u64` (already masked to the requested byte count) to
    /// `Self`.
    fn try_from_u64(v: u64) -> Result<Self>;
}

impl TryFromU64 for u32 {
    fn try_from_u64(v: u64) -> Result<Self> {
        Ok(v as u32)
    }
}

impl TryFromU64 for u16 {
    fn try_from_u64(v: u64) -> Result<Self> {
        Ok(v as u16)
    }
}

impl TryFromU64 for u64 {
    fn try_from_u64(v: u64) -> Result<Self> {
        Ok(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pop_u32_reads_little_endian() {
        let mut r = ByteReader::new(&[0x78, 0x56, 0x34, 0x12]);
        assert_eq!(r.pop_u32().unwrap(), 0x1234_5678);
        assert_eq!(r.position(), 4);
    }

    #[test]
    fn read_does_not_advance() {
        let mut r = ByteReader::new(&[1, 0, 0, 0]);
        assert_eq!(r.read_bytes(4).unwrap(), 1);
        assert_eq!(r.position(), 0);
        r.proceed(4).unwrap();
        assert_eq!(r.position(), 4);
    }

    #[test]
    fn out_of_range_read_errors() {
        let mut r = ByteReader::new(&[1, 2]);
        assert!(matches!(r.pop_u32(), Err(Error::OutOfRange(_))));
    }

    #[test]
    fn seek_past_end_errors() {
        let mut r = ByteReader::new(&[1, 2]);
        assert!(matches!(r.seek(10), Err(Error::OutOfRange(_))));
    }
}
