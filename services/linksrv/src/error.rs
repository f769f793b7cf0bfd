//! Error handling for the link service

use thiserror::Error;

/// Result type alias for link service operations
pub type Result<T> = std::result::Result<T, LinkSrvError>;

/// Link service error type
#[derive(Debug, Error, Clone)]
pub enum LinkSrvError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Serial device and other IO errors
    #[error("IO error: {0}")]
    Io(String),

    /// Wire protocol errors (packet framing, Modbus encoding)
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Channel and transport plumbing errors
    #[error("Transport error: {0}")]
    Transport(String),

    /// Internal errors (impossible states, wiring mistakes)
    #[error("Internal error: {0}")]
    Internal(String),
}

impl LinkSrvError {
    pub fn config(msg: impl Into<String>) -> Self {
        LinkSrvError::Config(msg.into())
    }

    pub fn io(msg: impl Into<String>) -> Self {
        LinkSrvError::Io(msg.into())
    }

    pub fn protocol(msg: impl Into<String>) -> Self {
        LinkSrvError::Protocol(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        LinkSrvError::Internal(msg.into())
    }
}

impl From<std::io::Error> for LinkSrvError {
    fn from(err: std::io::Error) -> Self {
        LinkSrvError::Io(err.to_string())
    }
}

impl From<drivelink_transport::TransportError> for LinkSrvError {
    fn from(err: drivelink_transport::TransportError) -> Self {
        LinkSrvError::Transport(err.to_string())
    }
}

impl From<drivelink_protocols::CodecError> for LinkSrvError {
    fn from(err: drivelink_protocols::CodecError) -> Self {
        LinkSrvError::Protocol(err.to_string())
    }
}

impl From<figment::Error> for LinkSrvError {
    fn from(err: figment::Error) -> Self {
        LinkSrvError::Config(err.to_string())
    }
}

impl From<tokio_serial::Error> for LinkSrvError {
    fn from(err: tokio_serial::Error) -> Self {
        LinkSrvError::Io(err.to_string())
    }
}
