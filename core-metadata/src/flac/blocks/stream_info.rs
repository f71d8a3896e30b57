use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::Result;
use crate::flac::cursor::ByteCursor;

/// STREAMINFO: the one mandatory block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamInfo {
    pub min_block_size: u16,
    pub max_block_size: u16,
    /// 0 when unknown.
    pub min_frame_size: u32,
    /// 0 when unknown.
    pub max_frame_size: u32,
    pub sample_rate: u32,
    pub channels: u8,
    pub bits_per_sample: u8,
    /// 0 when unknown.
    pub total_samples: u64,
    /// Lowercase hex of the unencoded audio MD5.
    pub md5_signature: String,
}

impl StreamInfo {
    pub const LENGTH: usize = 34;

    pub fn decode(payload: &[u8]) -> Result<Self> {
        let mut cursor = ByteCursor::new(payload, "STREAMINFO");

        let min_block_size = cursor.read_u16_be()?;
        let max_block_size = cursor.read_u16_be()?;
        let min_frame_size = cursor.read_u24_be()?;
        let max_frame_size = cursor.read_u24_be()?;

        // 20 bits rate | 3 bits channels-1 | 5 bits bps-1 | 36 bits samples
        let packed = cursor.read_array::<8>()?;
        let sample_rate = (u32::from(packed[0]) << 12)
            | (u32::from(packed[1]) << 4)
            | (u32::from(packed[2]) >> 4);
        let channels = ((packed[2] >> 1) & 0x07) + 1;
        let bits_per_sample = (((packed[2] & 0x01) << 4) | (packed[3] >> 4)) + 1;
        let total_samples = (u64::from(packed[3] & 0x0F) << 32)
            | (u64::from(packed[4]) << 24)
            | (u64::from(packed[5]) << 16)
            | (u64::from(packed[6]) << 8)
            | u64::from(packed[7]);

        let md5_signature = hex::encode(cursor.take(16)?);

        Ok(Self {
            min_block_size,
            max_block_size,
            min_frame_size,
            max_frame_size,
            sample_rate,
            channels,
            bits_per_sample,
            total_samples,
            md5_signature,
        })
    }

    /// Playback length, when both the sample count and rate are known.
    pub fn duration(&self) -> Option<Duration> {
        if self.sample_rate == 0 || self.total_samples == 0 {
            return None;
        }
        let rate = u64::from(self.sample_rate);
        let secs = self.total_samples / rate;
        let nanos = (self.total_samples % rate) * 1_000_000_000 / rate;
        Some(Duration::new(secs, nanos as u32))
    }
}
