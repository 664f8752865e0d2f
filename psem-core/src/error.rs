use crate::codes::ResponseCode;
use thiserror::Error;

/// Main error type for PSEM operations
///
/// Negative but well-formed device answers (a rejection code, a negative
/// procedure result) are not errors; they travel back to the caller as
/// values. This type covers the cases where no usable answer exists.
#[derive(Error, Debug)]
pub enum PsemError {
    #[error("Connection error: {0}")]
    Connection(#[from] std::io::Error),

    #[error("Timeout")]
    Timeout,

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Service rejected: {0}")]
    Rejected(ResponseCode),

    #[error("Security error: {0}")]
    Security(String),

    #[error("Invalid data: {0}")]
    InvalidData(String),
}

/// Result type alias for PSEM operations
pub type PsemResult<T> = Result<T, PsemError>;
