//! # FLAC Metadata
//!
//! Decodes the metadata blocks at the head of a FLAC stream without touching
//! the audio frames.
//!
//! ## Layout
//!
//! ```text
//! "fLaC" | header | payload | header | payload | ... (last-block flag set)
//! ```
//!
//! | Block | Decoder |
//! |-------|---------|
//! | STREAMINFO (required) | [`StreamInfo`] |
//! | PADDING | [`Padding`] |
//! | APPLICATION | [`Application`] |
//! | SEEKTABLE | [`SeekTable`] |
//! | VORBIS_COMMENT | [`VorbisComment`] |
//! | CUESHEET | [`CueSheet`] |
//! | PICTURE | [`Picture`] |
//!
//! Integers are big-endian everywhere except the length prefixes inside
//! VORBIS_COMMENT, which are little-endian.
//!
//! ## Usage
//!
//! ```ignore
//! use core_metadata::flac::{parse_flac_metadata, read_flac_metadata};
//!
//! // Whole file in memory
//! let metadata = parse_flac_metadata(&bytes)?;
//!
//! // Network stream, stops reading after the last metadata block
//! let metadata = read_flac_metadata(&mut reader, 16 * 1024, 16 << 20).await?;
//! ```

pub mod blocks;
pub mod cursor;
pub mod header;
pub mod parser;
pub mod streaming;

pub use blocks::{
    Application, CueSheet, CueSheetIndex, CueSheetTrack, Padding, Picture, PictureType,
    SeekPoint, SeekTable, StreamInfo, VorbisComment, VorbisField,
};
pub use cursor::ByteCursor;
pub use header::{BlockHeader, BlockType};
pub use parser::{is_flac, parse_flac_metadata, FlacParser, ParserState, FLAC_MARKER};
pub use streaming::{read_flac_metadata, FlacStreamParser, ParseProgress};

use serde::{Deserialize, Serialize};

/// Everything decoded from one stream's metadata section.
///
/// Single-instance blocks keep the last occurrence; padding blocks accumulate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlacMetadata {
    pub stream_info: StreamInfo,
    pub vorbis_comment: Option<VorbisComment>,
    pub picture: Option<Picture>,
    pub seek_table: Option<SeekTable>,
    pub cue_sheet: Option<CueSheet>,
    pub application: Option<Application>,
    pub padding: Vec<Padding>,
}

impl FlacMetadata {
    pub fn comment(&self, field: VorbisField) -> Option<&str> {
        self.vorbis_comment.as_ref().and_then(|c| c.get(field))
    }
}
