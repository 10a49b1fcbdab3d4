//! Sequential little-endian reader over a borrowed buffer.

use byteorder::{ByteOrder, LittleEndian};

use crate::error::{Error, Result};
use crate::opcode::IntWidth;

#[derive(Debug, Clone)]
pub struct Cursor<'a> {
    buffer: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    pub fn new(buffer: &'a [u8]) -> Self {
        Self { buffer, pos: 0 }
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn seek(&mut self, pos: usize) -> Result<()> {
        if pos > self.buffer.len() {
            return Err(self.truncated_at(pos, 0));
        }
        self.pos = pos;
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn remaining(&self) -> usize {
        self.buffer.len() - self.pos
    }

    pub fn at_end(&self) -> bool {
        self.pos >= self.buffer.len()
    }

    fn truncated_at(&self, offset: usize, wanted: usize) -> Error {
        Error::TruncatedStream { offset, wanted, len: self.buffer.len() }
    }

    pub fn read_bytes(&mut self, n: usize) -> Result<&'a [u8]> {
        if n > self.remaining() {
            return Err(self.truncated_at(self.pos, n));
        }
        let start = self.pos;
        self.pos += n;
        Ok(&self.buffer[start..self.pos])
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        Ok(self.read_bytes(1)?[0])
    }

    pub fn read_u16(&mut self) -> Result<u16> {
        Ok(LittleEndian::read_u16(self.read_bytes(2)?))
    }

    pub fn read_u32(&mut self) -> Result<u32> {
        Ok(LittleEndian::read_u32(self.read_bytes(4)?))
    }

    pub fn read_f32(&mut self) -> Result<f32> {
        Ok(LittleEndian::read_f32(self.read_bytes(4)?))
    }

    /// Unsigned integer of 1, 2 or 4 bytes, widened to `u32`.
    pub fn read_fixed_int(&mut self, width: IntWidth) -> Result<u32> {
        match width {
            IntWidth::Byte => self.read_u8().map(u32::from),
            IntWidth::Word => self.read_u16().map(u32::from),
            IntWidth::Dword => self.read_u32(),
        }
    }

    /// Reads a `u8` count and calls `element` that many times.
    pub fn read_count_prefixed_list<T>(
        &mut self,
        mut element: impl FnMut(&mut Self) -> Result<T>,
    ) -> Result<Vec<T>> {
        let count = self.read_u8()? as usize;
        let mut items = Vec::with_capacity(count);
        for _ in 0..count {
            items.push(element(self)?);
        }
        Ok(items)
    }

    /// Reads UTF-16LE code units up to a `0x0000` terminator.
    ///
    /// Hitting the end of the buffer also ends the string, matching the engine's
    /// own reader, but a dangling half code unit is a truncation.
    pub fn read_wide_cstr(&mut self) -> Result<String> {
        let start = self.pos;
        let mut units = Vec::new();
        while !self.at_end() {
            let unit = self.read_u16()?;
            if unit == 0 {
                break;
            }
            units.push(unit);
        }
        String::from_utf16(&units).map_err(|_| Error::InvalidWideString { offset: start })
    }
}
