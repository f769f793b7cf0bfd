//! Codec error types

use thiserror::Error;

/// Result type for codec operations
pub type Result<T> = std::result::Result<T, CodecError>;

/// Errors raised while encoding or decoding protocol units.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CodecError {
    /// Buffer too short to hold the unit it claims to contain
    #[error("Truncated frame: need {needed} bytes, have {available}")]
    Truncated { needed: usize, available: usize },

    /// A discriminant field holds a value outside the known set
    #[error("Invalid {field}: {value}")]
    InvalidField { field: &'static str, value: u32 },

    /// A length or count field violates protocol bounds
    #[error("Out of bounds {field}: {value}")]
    OutOfBounds { field: &'static str, value: u32 },

    /// Checksum mismatch
    #[error("CRC mismatch: provided {provided:#010x}, calculated {calculated:#010x}")]
    CrcMismatch { provided: u32, calculated: u32 },
}

impl CodecError {
    pub fn invalid(field: &'static str, value: u32) -> Self {
        CodecError::InvalidField { field, value }
    }

    pub fn bounds(field: &'static str, value: u32) -> Self {
        CodecError::OutOfBounds { field, value }
    }
}
