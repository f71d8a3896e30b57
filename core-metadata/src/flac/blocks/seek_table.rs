use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::Result;
use crate::flac::cursor::ByteCursor;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeekPoint {
    pub sample_number: u64,
    /// Offset from the first frame header.
    pub byte_offset: u64,
    pub frame_samples: u16,
}

impl SeekPoint {
    pub const LENGTH: usize = 18;
    pub const PLACEHOLDER: u64 = u64::MAX;

    pub fn is_placeholder(&self) -> bool {
        self.sample_number == Self::PLACEHOLDER
    }
}

/// SEEKTABLE block. Placeholder points are kept in position.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeekTable {
    pub points: Vec<SeekPoint>,
}

impl SeekTable {
    pub fn decode(payload: &[u8]) -> Result<Self> {
        let count = payload.len() / SeekPoint::LENGTH;
        let leftover = payload.len() % SeekPoint::LENGTH;
        if leftover != 0 {
            debug!(leftover, "Ignoring trailing bytes after last seek point");
        }

        let mut cursor = ByteCursor::new(payload, "SEEKTABLE");
        let mut points = Vec::with_capacity(count);
        for _ in 0..count {
            points.push(SeekPoint {
                sample_number: cursor.read_u64_be()?,
                byte_offset: cursor.read_u64_be()?,
                frame_samples: cursor.read_u16_be()?,
            });
        }

        Ok(Self { points })
    }

    /// Points that actually locate a frame.
    pub fn seek_points(&self) -> impl Iterator<Item = &SeekPoint> {
        self.points.iter().filter(|p| !p.is_placeholder())
    }
}
