//! Protocol error types

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    #[error("{field} length {value} exceeds encodable maximum {max}")]
    EncodingRange {
        field: &'static str,
        value: usize,
        max: usize,
    },
}

pub type Result<T> = std::result::Result<T, ProtocolError>;
