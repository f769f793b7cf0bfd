//! Transport error types

use thiserror::Error;

/// Result type for transport operations
pub type Result<T> = std::result::Result<T, TransportError>;

/// Errors raised by transport capabilities and channels.
///
/// Timeouts are deliberately not represented here: a timed-out read or write
/// returns `Ok(0)` so callers can treat it as a recoverable stall. `Err` is
/// reserved for conditions that retrying cannot fix.
#[derive(Debug, Error, Clone)]
pub enum TransportError {
    /// The peer end of a channel or device is gone
    #[error("Channel closed: {0}")]
    Closed(String),

    /// A whole-message read was attempted with a buffer smaller than the
    /// head message
    #[error("Receive buffer too small: need {needed} bytes, have {available}")]
    BufferTooSmall { needed: usize, available: usize },

    /// A message exceeds what the channel can ever hold
    #[error("Message of {size} bytes exceeds channel capacity {capacity}")]
    MessageTooLarge { size: usize, capacity: usize },

    /// Device-level IO failure (serial port and friends)
    #[error("IO error: {0}")]
    Io(String),

    /// Programmer error (impossible state reached)
    #[error("Internal error: {0}")]
    Internal(String),
}

impl TransportError {
    pub fn closed(msg: impl Into<String>) -> Self {
        TransportError::Closed(msg.into())
    }

    pub fn io(msg: impl Into<String>) -> Self {
        TransportError::Io(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        TransportError::Internal(msg.into())
    }
}

impl From<std::io::Error> for TransportError {
    fn from(err: std::io::Error) -> Self {
        TransportError::Io(err.to_string())
    }
}
