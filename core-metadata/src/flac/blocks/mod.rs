//! Typed decoders, one per metadata block type.
//!
//! Each decoder receives exactly the block payload (header excluded) and
//! fails with `TruncatedBlock` if an internal length runs past it.

mod cue_sheet;
mod picture;
mod seek_table;
mod stream_info;
mod vorbis_comment;

pub use cue_sheet::{CueSheet, CueSheetIndex, CueSheetTrack};
pub use picture::{Picture, PictureType};
pub use seek_table::{SeekPoint, SeekTable};
pub use stream_info::StreamInfo;
pub use vorbis_comment::{VorbisComment, VorbisField};

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::flac::cursor::ByteCursor;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Application {
    /// Registered four-character application id.
    pub id: String,
    pub data: Bytes,
}

impl Application {
    pub fn decode(payload: &[u8]) -> Result<Self> {
        let mut cursor = ByteCursor::new(payload, "APPLICATION");
        let id = cursor.read_string_lossy(4)?;
        let data = Bytes::copy_from_slice(cursor.rest());
        Ok(Self { id, data })
    }
}

/// PADDING carries no information beyond its size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Padding {
    pub length: u32,
}
