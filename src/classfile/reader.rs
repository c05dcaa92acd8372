//! Big-endian cursor over a class-file byte stream
//!
//! Every multi-byte quantity in the class-file format is big-endian; this
//! cursor is the read-side mirror of the `to_be_bytes` serialization used
//! when class files are written. Running past the end of the stream is a
//! format error, never a panic.

use crate::error::{Error, Result};

pub struct ClassReader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> ClassReader<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    /// Current offset into the stream, for diagnostics
    pub fn position(&self) -> usize {
        self.pos
    }

    fn take(&mut self, count: usize) -> Result<&'a [u8]> {
        if self.pos + count > self.bytes.len() {
            return Err(Error::format_error(format!(
                "truncated class file: need {} bytes at offset {}, have {}",
                count,
                self.pos,
                self.bytes.len() - self.pos
            )));
        }
        let slice = &self.bytes[self.pos..self.pos + count];
        self.pos += count;
        Ok(slice)
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    pub fn read_u16(&mut self) -> Result<u16> {
        let b = self.take(2)?;
        Ok(u16::from_be_bytes([b[0], b[1]]))
    }

    pub fn read_u32(&mut self) -> Result<u32> {
        let b = self.take(4)?;
        Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    pub fn read_i32(&mut self) -> Result<i32> {
        Ok(self.read_u32()? as i32)
    }

    pub fn read_u64(&mut self) -> Result<u64> {
        let b = self.take(8)?;
        Ok(u64::from_be_bytes([
            b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7],
        ]))
    }

    pub fn read_bytes(&mut self, count: usize) -> Result<Vec<u8>> {
        Ok(self.take(count)?.to_vec())
    }

    pub fn read_utf8(&mut self, length: usize) -> Result<String> {
        let bytes = self.take(length)?;
        // Class files use modified UTF-8; plain UTF-8 covers everything the
        // interpreter needs short of embedded NULs and surrogate pairs.
        String::from_utf8(bytes.to_vec())
            .map_err(|_| Error::format_error("malformed UTF8 constant"))
    }

    pub fn skip(&mut self, count: usize) -> Result<()> {
        self.take(count)?;
        Ok(())
    }
}
