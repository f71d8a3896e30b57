use thiserror::Error;

#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("Bridge capability not available: {0}")]
    NotAvailable(String),

    #[error("Bridge operation failed: {0}")]
    OperationFailed(String),

    #[error("Path not found: {0}")]
    NotFound(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl BridgeError {
    /// True when retrying the same operation later could succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            BridgeError::OperationFailed(_) => true,
            BridgeError::Io(err) => matches!(
                err.kind(),
                std::io::ErrorKind::TimedOut
                    | std::io::ErrorKind::Interrupted
                    | std::io::ErrorKind::ConnectionReset
                    | std::io::ErrorKind::ConnectionAborted
            ),
            BridgeError::NotAvailable(_) | BridgeError::NotFound(_) => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, BridgeError>;
