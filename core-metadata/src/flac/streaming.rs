//! Incremental parsing over a byte stream.
//!
//! Network sources deliver FLAC files in arbitrary chunks. The stream parser
//! buffers only the bytes of the block currently being received and stops
//! asking for input the moment the last metadata block is decoded; the audio
//! frames that follow are never read.

use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::debug;

use super::parser::FlacParser;
use super::FlacMetadata;
use crate::error::{MetadataError, Result};

pub const DEFAULT_CHUNK_SIZE: usize = 16 * 1024;
pub const DEFAULT_MAX_METADATA_BYTES: usize = 16 * 1024 * 1024;

#[derive(Debug, Clone, PartialEq)]
pub enum ParseProgress {
    NeedMoreData,
    Done(Box<FlacMetadata>),
}

/// Push-style wrapper around [`FlacParser`] that owns the pending bytes.
#[derive(Debug)]
pub struct FlacStreamParser {
    parser: FlacParser,
    pending: Vec<u8>,
    received: usize,
    max_bytes: usize,
}

impl FlacStreamParser {
    pub fn new() -> Self {
        Self::with_limit(DEFAULT_MAX_METADATA_BYTES)
    }

    /// Fail once more than `max_bytes` have been pushed without finishing.
    pub fn with_limit(max_bytes: usize) -> Self {
        Self {
            parser: FlacParser::new(),
            pending: Vec::new(),
            received: 0,
            max_bytes,
        }
    }

    pub fn bytes_received(&self) -> usize {
        self.received
    }

    pub fn push(&mut self, chunk: &[u8]) -> Result<ParseProgress> {
        self.received += chunk.len();
        self.pending.extend_from_slice(chunk);

        match self.parser.advance(&self.pending) {
            Ok(metadata) => {
                self.pending.clear();
                Ok(ParseProgress::Done(Box::new(metadata)))
            }
            Err(MetadataError::NeedMoreData { .. }) => {
                let consumed = self.parser.consumed();
                self.pending.drain(..consumed);
                if self.received > self.max_bytes {
                    return Err(MetadataError::HeaderTooLarge {
                        limit: self.max_bytes,
                    });
                }
                Ok(ParseProgress::NeedMoreData)
            }
            Err(err) => Err(err),
        }
    }

    /// The source is exhausted; whatever is still incomplete is truncated.
    pub fn finish(mut self) -> Result<FlacMetadata> {
        match self.parser.advance(&self.pending) {
            Ok(metadata) => Ok(metadata),
            Err(MetadataError::NeedMoreData { needed, available }) => {
                Err(MetadataError::TruncatedBlock {
                    block: "metadata",
                    needed,
                    remaining: available,
                })
            }
            Err(err) => Err(err),
        }
    }
}

impl Default for FlacStreamParser {
    fn default() -> Self {
        Self::new()
    }
}

/// Read just enough of `reader` to decode the metadata blocks.
///
/// Returns as soon as the last block is decoded, leaving the rest of the
/// stream unread; dropping the reader afterwards cancels the transfer.
pub async fn read_flac_metadata<R>(
    reader: &mut R,
    chunk_size: usize,
    max_bytes: usize,
) -> Result<FlacMetadata>
where
    R: AsyncRead + Unpin + ?Sized,
{
    let mut parser = FlacStreamParser::with_limit(max_bytes);
    let mut chunk = vec![0u8; chunk_size.max(1)];

    loop {
        let read = reader.read(&mut chunk).await?;
        if read == 0 {
            return parser.finish();
        }
        if let ParseProgress::Done(metadata) = parser.push(&chunk[..read])? {
            debug!(
                bytes_read = parser.bytes_received(),
                "FLAC metadata complete, stopping read"
            );
            return Ok(*metadata);
        }
    }
}
