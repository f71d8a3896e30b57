use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    /// A host capability was neither injected nor available as a default.
    #[error("Capability missing: {capability} - {message}")]
    CapabilityMissing {
        capability: &'static str,
        message: String,
    },

    #[error("Logging already initialised or invalid: {0}")]
    Logging(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, Error>;
