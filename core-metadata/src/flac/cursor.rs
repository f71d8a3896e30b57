//! Bounds-checked reads over a block payload.

use crate::error::{MetadataError, Result};

/// Forward-only reader over one block's payload.
///
/// Every read is bounds checked; running past the end yields
/// [`MetadataError::TruncatedBlock`] tagged with the block name so callers can
/// tell a short block apart from a stream that is not FLAC at all.
#[derive(Debug, Clone)]
pub struct ByteCursor<'a> {
    data: &'a [u8],
    pos: usize,
    block: &'static str,
}

impl<'a> ByteCursor<'a> {
    pub fn new(data: &'a [u8], block: &'static str) -> Self {
        Self {
            data,
            pos: 0,
            block,
        }
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    pub fn take(&mut self, len: usize) -> Result<&'a [u8]> {
        if len > self.remaining() {
            return Err(MetadataError::TruncatedBlock {
                block: self.block,
                needed: len,
                remaining: self.remaining(),
            });
        }
        let slice = &self.data[self.pos..self.pos + len];
        self.pos += len;
        Ok(slice)
    }

    pub fn skip(&mut self, len: usize) -> Result<()> {
        self.take(len).map(|_| ())
    }

    pub fn read_array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    /// Everything not yet read.
    pub fn rest(&mut self) -> &'a [u8] {
        let slice = &self.data[self.pos..];
        self.pos = self.data.len();
        slice
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    pub fn read_u16_be(&mut self) -> Result<u16> {
        Ok(u16::from_be_bytes(self.read_array()?))
    }

    /// Three bytes assembled individually; there is no 24-bit load.
    pub fn read_u24_be(&mut self) -> Result<u32> {
        let [b0, b1, b2] = self.read_array::<3>()?;
        Ok(u24_be(b0, b1, b2))
    }

    pub fn read_u32_be(&mut self) -> Result<u32> {
        Ok(u32::from_be_bytes(self.read_array()?))
    }

    pub fn read_u64_be(&mut self) -> Result<u64> {
        Ok(u64::from_be_bytes(self.read_array()?))
    }

    pub fn read_u32_le(&mut self) -> Result<u32> {
        Ok(u32::from_le_bytes(self.read_array()?))
    }

    /// `len` bytes as text; invalid UTF-8 sequences become U+FFFD.
    pub fn read_string_lossy(&mut self, len: usize) -> Result<String> {
        Ok(String::from_utf8_lossy(self.take(len)?).into_owned())
    }
}

pub(crate) fn u24_be(b0: u8, b1: u8, b2: u8) -> u32 {
    (u32::from(b0) << 16) | (u32::from(b1) << 8) | u32::from(b2)
}
