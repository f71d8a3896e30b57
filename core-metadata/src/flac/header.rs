//! Metadata block header decoding.
//!
//! | Bits | Field |
//! |-----:|-------|
//! | 1    | last-metadata-block flag |
//! | 7    | block type |
//! | 24   | payload length, big-endian |

use serde::{Deserialize, Serialize};

use super::cursor::u24_be;
use crate::error::{MetadataError, Result};

/// Metadata block type, by its 7-bit wire code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BlockType {
    StreamInfo,
    Padding,
    Application,
    SeekTable,
    VorbisComment,
    CueSheet,
    Picture,
    /// Codes 7 through 126.
    Reserved(u8),
    /// Code 127.
    Invalid,
}

impl BlockType {
    pub fn from_code(code: u8) -> Self {
        match code & 0x7F {
            0 => BlockType::StreamInfo,
            1 => BlockType::Padding,
            2 => BlockType::Application,
            3 => BlockType::SeekTable,
            4 => BlockType::VorbisComment,
            5 => BlockType::CueSheet,
            6 => BlockType::Picture,
            127 => BlockType::Invalid,
            other => BlockType::Reserved(other),
        }
    }

    pub fn code(self) -> u8 {
        match self {
            BlockType::StreamInfo => 0,
            BlockType::Padding => 1,
            BlockType::Application => 2,
            BlockType::SeekTable => 3,
            BlockType::VorbisComment => 4,
            BlockType::CueSheet => 5,
            BlockType::Picture => 6,
            BlockType::Reserved(code) => code,
            BlockType::Invalid => 127,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            BlockType::StreamInfo => "STREAMINFO",
            BlockType::Padding => "PADDING",
            BlockType::Application => "APPLICATION",
            BlockType::SeekTable => "SEEKTABLE",
            BlockType::VorbisComment => "VORBIS_COMMENT",
            BlockType::CueSheet => "CUESHEET",
            BlockType::Picture => "PICTURE",
            BlockType::Reserved(_) => "RESERVED",
            BlockType::Invalid => "INVALID",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockHeader {
    pub is_last: bool,
    pub block_type: BlockType,
    /// Payload length in bytes, header excluded.
    pub length: u32,
}

impl BlockHeader {
    pub const SIZE: usize = 4;

    pub fn decode(bytes: [u8; 4]) -> Self {
        Self {
            is_last: bytes[0] & 0x80 != 0,
            block_type: BlockType::from_code(bytes[0] & 0x7F),
            length: u24_be(bytes[1], bytes[2], bytes[3]),
        }
    }

    /// Decode the header at the start of `buf`.
    pub fn parse(buf: &[u8]) -> Result<Self> {
        match buf.get(..Self::SIZE) {
            Some(&[b0, b1, b2, b3]) => Ok(Self::decode([b0, b1, b2, b3])),
            _ => Err(MetadataError::NeedMoreData {
                needed: Self::SIZE,
                available: buf.len(),
            }),
        }
    }

    pub fn encode(&self) -> [u8; 4] {
        let flag = if self.is_last { 0x80 } else { 0x00 };
        let [_, b1, b2, b3] = self.length.to_be_bytes();
        [flag | (self.block_type.code() & 0x7F), b1, b2, b3]
    }

    pub fn total_len(&self) -> usize {
        Self::SIZE + self.length as usize
    }
}
