//! Length-prefixed packing of integers and byte strings.
//!
//! [`Packer`] appends, [`Unpacker`] reads back from a borrowed slice and
//! reports truncation as a serialisation error.

use crate::error::{QuarryError, Result};
use crate::util::varint;

/// Appends varints and length-prefixed byte strings to a buffer.
#[derive(Debug, Default)]
pub struct Packer {
    buf: Vec<u8>,
}

impl Packer {
    pub fn new() -> Self {
        Packer { buf: Vec::new() }
    }

    pub fn with_buffer(buf: Vec<u8>) -> Self {
        Packer { buf }
    }

    pub fn u8(&mut self, value: u8) -> &mut Self {
        self.buf.push(value);
        self
    }

    pub fn uint(&mut self, value: u64) -> &mut Self {
        varint::encode_u64(&mut self.buf, value);
        self
    }

    pub fn bytes(&mut self, value: &[u8]) -> &mut Self {
        varint::encode_u64(&mut self.buf, value.len() as u64);
        self.buf.extend_from_slice(value);
        self
    }

    /// IEEE bits, little endian.
    pub fn f64(&mut self, value: f64) -> &mut Self {
        self.buf.extend_from_slice(&value.to_bits().to_le_bytes());
        self
    }

    pub fn raw(&mut self, value: &[u8]) -> &mut Self {
        self.buf.extend_from_slice(value);
        self
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn into_inner(self) -> Vec<u8> {
        self.buf
    }
}

/// Reads values written by [`Packer`].
#[derive(Debug, Clone)]
pub struct Unpacker<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Unpacker<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Unpacker { data, pos: 0 }
    }

    pub fn is_empty(&self) -> bool {
        self.pos >= self.data.len()
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn remaining(&self) -> &'a [u8] {
        &self.data[self.pos.min(self.data.len())..]
    }

    pub fn u8(&mut self) -> Result<u8> {
        let byte = *self
            .data
            .get(self.pos)
            .ok_or_else(|| QuarryError::serialisation("Not enough data"))?;
        self.pos += 1;
        Ok(byte)
    }

    pub fn peek(&self) -> Option<u8> {
        self.data.get(self.pos).copied()
    }

    pub fn uint(&mut self) -> Result<u64> {
        let (value, used) = varint::decode_u64(self.remaining())?;
        self.pos += used;
        Ok(value)
    }

    pub fn u32(&mut self) -> Result<u32> {
        let value = self.uint()?;
        u32::try_from(value)
            .map_err(|_| QuarryError::serialisation(format!("value {value} out of range")))
    }

    pub fn bytes(&mut self) -> Result<&'a [u8]> {
        let len = self.uint()? as usize;
        self.raw(len)
    }

    pub fn f64(&mut self) -> Result<f64> {
        let raw = self.raw(8)?;
        let mut bits = [0u8; 8];
        bits.copy_from_slice(raw);
        Ok(f64::from_bits(u64::from_le_bytes(bits)))
    }

    pub fn raw(&mut self, len: usize) -> Result<&'a [u8]> {
        let end = self
            .pos
            .checked_add(len)
            .filter(|end| *end <= self.data.len())
            .ok_or_else(|| QuarryError::serialisation("Not enough data"))?;
        let slice = &self.data[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    /// Fail unless every byte has been consumed.
    pub fn finish(&self) -> Result<()> {
        if self.pos == self.data.len() {
            Ok(())
        } else {
            Err(QuarryError::serialisation(format!(
                "{} bytes of junk after serialised data",
                self.data.len() - self.pos
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mixed_values() {
        let mut packer = Packer::new();
        packer.uint(300).bytes(b"a\0b").f64(1.5).u8(7);
        let buf = packer.into_inner();

        let mut unpacker = Unpacker::new(&buf);
        assert_eq!(unpacker.uint().unwrap(), 300);
        assert_eq!(unpacker.bytes().unwrap(), b"a\0b");
        assert_eq!(unpacker.f64().unwrap(), 1.5);
        assert_eq!(unpacker.u8().unwrap(), 7);
        assert!(unpacker.finish().is_ok());
    }

    #[test]
    fn test_truncated_bytes() {
        let mut packer = Packer::new();
        packer.bytes(b"hello");
        let buf = packer.into_inner();

        let mut unpacker = Unpacker::new(&buf[..3]);
        assert!(unpacker.bytes().is_err());
    }

    #[test]
    fn test_trailing_junk() {
        let buf = [1u8, 2u8];
        let mut unpacker = Unpacker::new(&buf);
        unpacker.u8().unwrap();
        assert!(unpacker.finish().is_err());
    }
}
