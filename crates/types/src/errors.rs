//! Error types for the data model

use thiserror::Error;

/// Result type alias for data model operations
pub type Result<T> = std::result::Result<T, TypesError>;

/// Errors raised while constructing or parsing records
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TypesError {
    /// The source timestamp does not follow `yyyy-MM-ddTHH:mm:ss`
    #[error("malformed timestamp '{value}': {reason}")]
    MalformedTimestamp { value: String, reason: String },

    /// Station identifiers must be non-empty
    #[error("observation has an empty station identifier")]
    EmptyStation,

    /// Window bounds must be strictly increasing
    #[error("invalid window: start {start} is not before end {end}")]
    InvalidWindow { start: i64, end: i64 },
}
