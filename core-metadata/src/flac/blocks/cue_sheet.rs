use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::flac::cursor::ByteCursor;

const CATALOG_LEN: usize = 128;
/// The is-CD flag byte carries 7 reserved bits; 258 fully reserved bytes follow.
const HEADER_RESERVED_LEN: usize = 258;
const ISRC_LEN: usize = 12;
/// Follows the track flag byte.
const TRACK_RESERVED_LEN: usize = 13;
const INDEX_RESERVED_LEN: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CueSheetIndex {
    /// Samples, relative to the track offset.
    pub offset: u64,
    pub number: u8,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CueSheetTrack {
    pub offset: u64,
    pub number: u8,
    pub isrc: String,
    pub is_audio: bool,
    pub pre_emphasis: bool,
    pub indices: Vec<CueSheetIndex>,
}

impl CueSheetTrack {
    /// Track 170 (CD) or 255 (non-CD) marks the lead-out.
    pub fn is_lead_out(&self) -> bool {
        self.number == 170 || self.number == 255
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CueSheet {
    pub media_catalog_number: String,
    pub lead_in_samples: u64,
    pub is_cd: bool,
    pub tracks: Vec<CueSheetTrack>,
}

impl CueSheet {
    pub fn decode(payload: &[u8]) -> Result<Self> {
        let mut cursor = ByteCursor::new(payload, "CUESHEET");

        let media_catalog_number = nul_trimmed(cursor.take(CATALOG_LEN)?);
        let lead_in_samples = cursor.read_u64_be()?;
        let is_cd = cursor.read_u8()? & 0x80 != 0;
        cursor.skip(HEADER_RESERVED_LEN)?;

        let track_count = cursor.read_u8()?;
        let mut tracks = Vec::with_capacity(usize::from(track_count));
        for _ in 0..track_count {
            tracks.push(Self::decode_track(&mut cursor)?);
        }

        Ok(Self {
            media_catalog_number,
            lead_in_samples,
            is_cd,
            tracks,
        })
    }

    fn decode_track(cursor: &mut ByteCursor<'_>) -> Result<CueSheetTrack> {
        let offset = cursor.read_u64_be()?;
        let number = cursor.read_u8()?;
        let isrc = nul_trimmed(cursor.take(ISRC_LEN)?);

        let flags = cursor.read_u8()?;
        cursor.skip(TRACK_RESERVED_LEN)?;

        let index_count = cursor.read_u8()?;
        let mut indices = Vec::with_capacity(usize::from(index_count));
        for _ in 0..index_count {
            let offset = cursor.read_u64_be()?;
            let number = cursor.read_u8()?;
            cursor.skip(INDEX_RESERVED_LEN)?;
            indices.push(CueSheetIndex { offset, number });
        }

        Ok(CueSheetTrack {
            offset,
            number,
            isrc,
            is_audio: flags & 0x80 == 0,
            pre_emphasis: flags & 0x40 != 0,
            indices,
        })
    }
}

fn nul_trimmed(raw: &[u8]) -> String {
    let end = raw.iter().position(|&b| b == 0).unwrap_or(raw.len());
    String::from_utf8_lossy(&raw[..end]).into_owned()
}
