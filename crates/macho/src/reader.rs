//! Bounds-checked cursor over a raw byte buffer

use crate::error::{ParseError, ParseResult};
use byteorder::{ByteOrder, LittleEndian};

/// Little-endian cursor reader over an immutable byte slice.
///
/// Every read is bounds-checked and fails with
/// [`ParseError::TruncatedInput`] instead of panicking. The cursor position
/// can be saved and restored explicitly; the symbol-table decoder relies on
/// that for its detour into the string pool.
pub struct BinaryReader<'a> {
    data: &'a [u8],
    offset: usize,
}

impl<'a> BinaryReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, offset: 0 }
    }

    pub fn new_at(data: &'a [u8], offset: usize) -> Self {
        Self { data, offset }
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn set_offset(&mut self, offset: usize) {
        self.offset = offset;
    }

    pub fn remaining(&self) -> usize {
        self.data.len().saturating_sub(self.offset)
    }

    fn check(&self, count: usize) -> ParseResult<()> {
        if self.remaining() < count {
            return Err(ParseError::TruncatedInput {
                expected: count,
                actual: self.remaining(),
            });
        }
        Ok(())
    }

    pub fn read_u8(&mut self) -> ParseResult<u8> {
        self.check(1)?;
        let value = self.data[self.offset];
        self.offset += 1;
        Ok(value)
    }

    pub fn read_u16(&mut self) -> ParseResult<u16> {
        self.check(2)?;
        let value = LittleEndian::read_u16(&self.data[self.offset..]);
        self.offset += 2;
        Ok(value)
    }

    pub fn read_u32(&mut self) -> ParseResult<u32> {
        self.check(4)?;
        let value = LittleEndian::read_u32(&self.data[self.offset..]);
        self.offset += 4;
        Ok(value)
    }

    pub fn read_i32(&mut self) -> ParseResult<i32> {
        Ok(self.read_u32()? as i32)
    }

    pub fn read_u64(&mut self) -> ParseResult<u64> {
        self.check(8)?;
        let value = LittleEndian::read_u64(&self.data[self.offset..]);
        self.offset += 8;
        Ok(value)
    }

    pub fn read_bytes(&mut self, count: usize) -> ParseResult<&'a [u8]> {
        self.check(count)?;
        let bytes = &self.data[self.offset..self.offset + count];
        self.offset += count;
        Ok(bytes)
    }

    pub fn read_array<const N: usize>(&mut self) -> ParseResult<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.read_bytes(N)?);
        Ok(out)
    }

    pub fn skip(&mut self, count: usize) -> ParseResult<()> {
        self.check(count)?;
        self.offset += count;
        Ok(())
    }
}
