use thiserror::Error;

#[derive(Error, Debug)]
pub enum MetadataError {
    #[error("Not a FLAC stream: missing fLaC marker")]
    NotFlac,

    /// The buffer ends before the next block is complete. More bytes from the
    /// same source will let the parse continue.
    #[error("Need more data: {needed} bytes required, {available} available")]
    NeedMoreData { needed: usize, available: usize },

    #[error("Truncated {block} block: needed {needed} bytes, {remaining} remaining")]
    TruncatedBlock {
        block: &'static str,
        needed: usize,
        remaining: usize,
    },

    #[error("Reached the last metadata block without a STREAMINFO block")]
    MissingStreamInfo,

    #[error("FLAC metadata exceeds the {limit} byte limit")]
    HeaderTooLarge { limit: usize },

    #[error("Parser already failed; start a new parse")]
    ParserFailed,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl MetadataError {
    /// Whether feeding more bytes of the same stream could turn this into a
    /// successful parse.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            MetadataError::NeedMoreData { .. } | MetadataError::TruncatedBlock { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, MetadataError>;
