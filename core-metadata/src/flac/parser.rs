//! Block-walking state machine.
//!
//! ```text
//! ExpectMarker --"fLaC"--> ReadingBlocks --last block--> Done
//!       \                        |
//!        +------ error ----------+------> Failed
//! ```
//!
//! `NeedMoreData` is not a failure: the parser stays where it was and the
//! caller retries with the unconsumed bytes plus whatever arrived since.

use tracing::{debug, trace, warn};

use super::blocks::{
    Application, CueSheet, Padding, Picture, SeekTable, StreamInfo, VorbisComment,
};
use super::header::{BlockHeader, BlockType};
use super::FlacMetadata;
use crate::error::{MetadataError, Result};

pub const FLAC_MARKER: &[u8; 4] = b"fLaC";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParserState {
    ExpectMarker,
    ReadingBlocks,
    Done,
    Failed,
}

#[derive(Debug, Default)]
struct PartialMetadata {
    stream_info: Option<StreamInfo>,
    vorbis_comment: Option<VorbisComment>,
    picture: Option<Picture>,
    seek_table: Option<SeekTable>,
    cue_sheet: Option<CueSheet>,
    application: Option<Application>,
    padding: Vec<Padding>,
}

impl PartialMetadata {
    fn apply(&mut self, header: BlockHeader, payload: &[u8], offset: usize) -> Result<()> {
        match header.block_type {
            BlockType::StreamInfo => self.stream_info = Some(StreamInfo::decode(payload)?),
            BlockType::VorbisComment => {
                self.vorbis_comment = Some(VorbisComment::decode(payload)?)
            }
            BlockType::Picture => self.picture = Some(Picture::decode(payload)?),
            BlockType::SeekTable => self.seek_table = Some(SeekTable::decode(payload)?),
            BlockType::CueSheet => self.cue_sheet = Some(CueSheet::decode(payload)?),
            BlockType::Application => self.application = Some(Application::decode(payload)?),
            BlockType::Padding => self.padding.push(Padding {
                length: header.length,
            }),
            BlockType::Reserved(code) => {
                warn!(code, offset, length = header.length, "Skipping reserved metadata block");
            }
            BlockType::Invalid => {
                warn!(offset, length = header.length, "Skipping invalid metadata block");
            }
        }
        Ok(())
    }

    fn finish(self) -> Result<FlacMetadata> {
        let stream_info = self.stream_info.ok_or(MetadataError::MissingStreamInfo)?;
        Ok(FlacMetadata {
            stream_info,
            vorbis_comment: self.vorbis_comment,
            picture: self.picture,
            seek_table: self.seek_table,
            cue_sheet: self.cue_sheet,
            application: self.application,
            padding: self.padding,
        })
    }
}

/// Incremental FLAC metadata parser.
///
/// Each call to [`advance`](Self::advance) receives the bytes the previous
/// call did not consume, followed by any new ones. Blocks already decoded are
/// never decoded again.
#[derive(Debug)]
pub struct FlacParser {
    state: ParserState,
    partial: PartialMetadata,
    result: Option<FlacMetadata>,
    consumed: usize,
    position: usize,
}

impl FlacParser {
    pub fn new() -> Self {
        Self {
            state: ParserState::ExpectMarker,
            partial: PartialMetadata::default(),
            result: None,
            consumed: 0,
            position: 0,
        }
    }

    pub fn state(&self) -> ParserState {
        self.state
    }

    /// Bytes of the most recent `advance` input that were fully decoded.
    pub fn consumed(&self) -> usize {
        self.consumed
    }

    /// Absolute stream offset of the next undecoded byte.
    pub fn position(&self) -> usize {
        self.position
    }

    pub fn advance(&mut self, input: &[u8]) -> Result<FlacMetadata> {
        self.consumed = 0;
        match self.run(input) {
            Ok(metadata) => Ok(metadata),
            Err(err @ MetadataError::NeedMoreData { .. }) => Err(err),
            Err(err) => {
                if self.state != ParserState::Failed {
                    debug!(position = self.position, error = %err, "FLAC parse failed");
                }
                self.state = ParserState::Failed;
                Err(err)
            }
        }
    }

    fn run(&mut self, input: &[u8]) -> Result<FlacMetadata> {
        loop {
            match self.state {
                ParserState::ExpectMarker => {
                    if input.len() < FLAC_MARKER.len() {
                        if FLAC_MARKER.starts_with(input) {
                            return Err(MetadataError::NeedMoreData {
                                needed: FLAC_MARKER.len(),
                                available: input.len(),
                            });
                        }
                        return Err(MetadataError::NotFlac);
                    }
                    if &input[..FLAC_MARKER.len()] != FLAC_MARKER {
                        return Err(MetadataError::NotFlac);
                    }
                    self.consume(FLAC_MARKER.len());
                    self.state = ParserState::ReadingBlocks;
                }
                ParserState::ReadingBlocks => {
                    let rest = &input[self.consumed..];
                    let header = BlockHeader::parse(rest)?;
                    let total = header.total_len();
                    if rest.len() < total {
                        return Err(MetadataError::NeedMoreData {
                            needed: total,
                            available: rest.len(),
                        });
                    }

                    trace!(
                        block = header.block_type.name(),
                        length = header.length,
                        last = header.is_last,
                        offset = self.position,
                        "Decoding metadata block"
                    );
                    self.partial
                        .apply(header, &rest[BlockHeader::SIZE..total], self.position)?;
                    self.consume(total);

                    if header.is_last {
                        let metadata = std::mem::take(&mut self.partial).finish()?;
                        self.result = Some(metadata);
                        self.state = ParserState::Done;
                    }
                }
                ParserState::Done => {
                    return self.result.clone().ok_or(MetadataError::ParserFailed);
                }
                ParserState::Failed => return Err(MetadataError::ParserFailed),
            }
        }
    }

    fn consume(&mut self, len: usize) {
        self.consumed += len;
        self.position += len;
    }
}

impl Default for FlacParser {
    fn default() -> Self {
        Self::new()
    }
}

/// Parse metadata from a buffer that holds everything the source will ever
/// provide. A short buffer is reported as `TruncatedBlock`.
pub fn parse_flac_metadata(data: &[u8]) -> Result<FlacMetadata> {
    FlacParser::new().advance(data).map_err(|err| match err {
        MetadataError::NeedMoreData { needed, available } => MetadataError::TruncatedBlock {
            block: "metadata",
            needed,
            remaining: available,
        },
        other => other,
    })
}

/// Cheap magic-number sniff.
pub fn is_flac(prefix: &[u8]) -> bool {
    prefix.starts_with(FLAC_MARKER)
}
