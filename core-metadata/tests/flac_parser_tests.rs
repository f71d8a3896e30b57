//! End-to-end tests for FLAC metadata parsing over in-code byte fixtures.

use core_metadata::flac::{
    parse_flac_metadata, read_flac_metadata, FlacParser, FlacStreamParser, ParseProgress,
    ParserState, VorbisField,
};
use core_metadata::{MetadataError, SongTags};

const STREAMINFO: u8 = 0;
const PADDING: u8 = 1;
const VORBIS_COMMENT: u8 = 4;

/// Builds a FLAC metadata section block by block.
struct FlacFixture {
    blocks: Vec<(u8, Vec<u8>)>,
    audio: Vec<u8>,
}

impl FlacFixture {
    fn new() -> Self {
        Self {
            blocks: Vec::new(),
            audio: Vec::new(),
        }
    }

    fn stream_info(self, sample_rate: u32, channels: u8, bits: u8, samples: u64) -> Self {
        let mut payload = Vec::with_capacity(34);
        payload.extend_from_slice(&4096u16.to_be_bytes());
        payload.extend_from_slice(&4096u16.to_be_bytes());
        payload.extend_from_slice(&[0, 0, 14]);
        payload.extend_from_slice(&[0, 0x3A, 0x98]);
        let packed = (u64::from(sample_rate) << 44)
            | (u64::from(channels - 1) << 41)
            | (u64::from(bits - 1) << 36)
            | samples;
        payload.extend_from_slice(&packed.to_be_bytes());
        payload.extend_from_slice(&[0xAB; 16]);
        self.block(STREAMINFO, payload)
    }

    fn cd_stream_info(self) -> Self {
        self.stream_info(44_100, 2, 16, 441_000)
    }

    fn comments(self, entries: &[&str]) -> Self {
        let vendor = b"reference libFLAC 1.4.3";
        let mut payload = Vec::new();
        payload.extend_from_slice(&(vendor.len() as u32).to_le_bytes());
        payload.extend_from_slice(vendor);
        payload.extend_from_slice(&(entries.len() as u32).to_le_bytes());
        for entry in entries {
            payload.extend_from_slice(&(entry.len() as u32).to_le_bytes());
            payload.extend_from_slice(entry.as_bytes());
        }
        self.block(VORBIS_COMMENT, payload)
    }

    fn padding(self, length: usize) -> Self {
        self.block(PADDING, vec![0; length])
    }

    fn block(mut self, block_type: u8, payload: Vec<u8>) -> Self {
        self.blocks.push((block_type, payload));
        self
    }

    fn audio(mut self, length: usize) -> Self {
        self.audio = (0..length).map(|i| (i % 251) as u8).collect();
        self
    }

    fn build(&self) -> Vec<u8> {
        let mut out = b"fLaC".to_vec();
        let last = self.blocks.len().saturating_sub(1);
        for (index, (block_type, payload)) in self.blocks.iter().enumerate() {
            let flag = if index == last { 0x80 } else { 0 };
            let len = payload.len() as u32;
            out.push(flag | block_type);
            out.extend_from_slice(&len.to_be_bytes()[1..]);
            out.extend_from_slice(payload);
        }
        out.extend_from_slice(&self.audio);
        out
    }
}

#[test]
fn minimal_stream_has_only_stream_info() {
    let bytes = FlacFixture::new().cd_stream_info().build();
    let metadata = parse_flac_metadata(&bytes).unwrap();

    assert_eq!(metadata.stream_info.sample_rate, 44_100);
    assert_eq!(metadata.stream_info.channels, 2);
    assert_eq!(metadata.stream_info.bits_per_sample, 16);
    assert_eq!(metadata.stream_info.total_samples, 441_000);
    assert_eq!(metadata.stream_info.md5_signature, "ab".repeat(16));
    assert!(metadata.vorbis_comment.is_none());
    assert!(metadata.picture.is_none());
    assert!(metadata.seek_table.is_none());
    assert!(metadata.cue_sheet.is_none());
    assert!(metadata.padding.is_empty());
}

#[test]
fn parsing_is_deterministic() {
    let bytes = FlacFixture::new()
        .cd_stream_info()
        .comments(&["TITLE=So What", "ARTIST=Miles Davis"])
        .padding(64)
        .build();

    assert_eq!(
        parse_flac_metadata(&bytes).unwrap(),
        parse_flac_metadata(&bytes).unwrap()
    );
}

#[test]
fn chunking_does_not_change_the_result() {
    let bytes = FlacFixture::new()
        .cd_stream_info()
        .comments(&["TITLE=Freddie Freeloader", "TRACKNUMBER=2/5"])
        .padding(300)
        .build();
    let whole = parse_flac_metadata(&bytes).unwrap();

    for chunk_size in [1, 3, 7, 42, 4096] {
        let mut parser = FlacStreamParser::new();
        let mut result = None;
        for chunk in bytes.chunks(chunk_size) {
            if let ParseProgress::Done(metadata) = parser.push(chunk).unwrap() {
                result = Some(*metadata);
                break;
            }
        }
        assert_eq!(result.as_ref(), Some(&whole), "chunk size {}", chunk_size);
    }
}

#[tokio::test]
async fn reader_stops_after_last_metadata_block() {
    let bytes = FlacFixture::new()
        .cd_stream_info()
        .comments(&["ALBUM=Kind of Blue"])
        .audio(10_000)
        .build();

    let mut reader: &[u8] = &bytes;
    let metadata = read_flac_metadata(&mut reader, 16, 1 << 20).await.unwrap();

    assert_eq!(metadata.comment(VorbisField::Album), Some("Kind of Blue"));
    assert!(reader.len() > 9_900, "audio frames should stay unread");
}

#[tokio::test]
async fn reader_reports_truncation_at_end_of_stream() {
    let bytes = FlacFixture::new().cd_stream_info().build();
    let mut reader: &[u8] = &bytes[..20];

    let err = read_flac_metadata(&mut reader, 8, 1 << 20).await.unwrap_err();
    assert!(matches!(err, MetadataError::TruncatedBlock { .. }));
}

#[test]
fn wrong_marker_is_not_flac() {
    let err = parse_flac_metadata(b"ID3\x04\x00\x00\x00\x00").unwrap_err();
    assert!(matches!(err, MetadataError::NotFlac));
    assert!(!err.is_retryable());
}

#[test]
fn stream_info_is_required() {
    let bytes = FlacFixture::new().padding(8).build();
    assert!(matches!(
        parse_flac_metadata(&bytes),
        Err(MetadataError::MissingStreamInfo)
    ));
}

#[test]
fn reserved_blocks_are_skipped() {
    let bytes = FlacFixture::new()
        .cd_stream_info()
        .block(42, vec![1, 2, 3, 4, 5])
        .comments(&["GENRE=Jazz"])
        .build();

    let metadata = parse_flac_metadata(&bytes).unwrap();
    assert_eq!(metadata.comment(VorbisField::Genre), Some("Jazz"));
}

#[test]
fn padding_blocks_accumulate() {
    let bytes = FlacFixture::new()
        .padding(10)
        .cd_stream_info()
        .padding(0)
        .padding(1024)
        .build();

    let metadata = parse_flac_metadata(&bytes).unwrap();
    let lengths: Vec<u32> = metadata.padding.iter().map(|p| p.length).collect();
    assert_eq!(lengths, vec![10, 0, 1024]);
}

#[test]
fn short_buffer_is_truncated_not_invalid() {
    let bytes = FlacFixture::new()
        .cd_stream_info()
        .comments(&["TITLE=All Blues"])
        .build();

    let err = parse_flac_metadata(&bytes[..bytes.len() - 4]).unwrap_err();
    assert!(matches!(err, MetadataError::TruncatedBlock { .. }));
    assert!(err.is_retryable());
}

#[test]
fn incremental_parser_waits_then_resumes() {
    let bytes = FlacFixture::new()
        .cd_stream_info()
        .comments(&["TITLE=Flamenco Sketches"])
        .build();
    let split = 30;

    let mut parser = FlacParser::new();
    let err = parser.advance(&bytes[..split]).unwrap_err();
    assert!(matches!(err, MetadataError::NeedMoreData { .. }));
    assert_eq!(parser.state(), ParserState::ReadingBlocks);

    let consumed = parser.consumed();
    assert_eq!(consumed, 4);
    let metadata = parser.advance(&bytes[consumed..]).unwrap();
    assert_eq!(parser.state(), ParserState::Done);
    assert_eq!(metadata.comment(VorbisField::Title), Some("Flamenco Sketches"));
}

#[test]
fn malformed_block_fails_the_parser() {
    // Comment count claims two entries but the block holds one.
    let mut payload = Vec::new();
    payload.extend_from_slice(&0u32.to_le_bytes());
    payload.extend_from_slice(&2u32.to_le_bytes());
    payload.extend_from_slice(&5u32.to_le_bytes());
    payload.extend_from_slice(b"A=bcd");
    let bytes = FlacFixture::new()
        .cd_stream_info()
        .block(VORBIS_COMMENT, payload)
        .build();

    let mut parser = FlacParser::new();
    let err = parser.advance(&bytes).unwrap_err();
    assert!(matches!(err, MetadataError::TruncatedBlock { .. }));
    assert_eq!(parser.state(), ParserState::Failed);
    assert!(matches!(
        parser.advance(&bytes),
        Err(MetadataError::ParserFailed)
    ));
}

#[test]
fn oversized_metadata_is_rejected() {
    let bytes = FlacFixture::new()
        .cd_stream_info()
        .padding(4096)
        .comments(&["TITLE=x"])
        .build();

    let mut parser = FlacStreamParser::with_limit(1024);
    let mut outcome = Ok(ParseProgress::NeedMoreData);
    for chunk in bytes.chunks(256) {
        outcome = parser.push(chunk);
        if !matches!(outcome, Ok(ParseProgress::NeedMoreData)) {
            break;
        }
    }
    assert!(matches!(
        outcome,
        Err(MetadataError::HeaderTooLarge { limit: 1024 })
    ));
}

#[test]
fn tags_follow_the_parsed_comments() {
    let bytes = FlacFixture::new()
        .stream_info(48_000, 2, 24, 48_000 * 90)
        .comments(&[
            "TITLE=Blue in Green",
            "ARTIST=Miles Davis; Bill Evans",
            "DATE=1959",
            "TRACKNUMBER=3",
            "title=ignored lowercase key",
        ])
        .build();

    let tags = SongTags::from_flac(&parse_flac_metadata(&bytes).unwrap());
    assert_eq!(tags.title.as_deref(), Some("Blue in Green"));
    assert_eq!(tags.artist.as_deref(), Some("Miles Davis; Bill Evans"));
    assert_eq!(tags.year, Some(1959));
    assert_eq!(tags.track_number, Some(3));
    assert_eq!(tags.duration_ms, Some(90_000));
}
