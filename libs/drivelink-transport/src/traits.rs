//! Core transport capabilities
//!
//! These two traits are the seam between every pipeline stage. The timeout
//! contract is uniform: a finite timeout may return `Ok(0)`, and the caller
//! must treat that as a recoverable stall (kick the watchdog and retry).

use std::time::Duration;

use async_trait::async_trait;

use crate::error::Result;

/// Capability to accept bytes.
#[async_trait]
pub trait Writable: Send + Sync {
    /// Attempt to write all of `buf` within `timeout`.
    ///
    /// Returns the number of bytes written: the full `buf.len()` on success,
    /// `0` on timeout. Partial counts are only possible when the timeout
    /// expires midway through a byte-stream write.
    async fn write(&self, buf: &[u8], timeout: Duration) -> Result<usize>;
}

/// Capability to produce bytes.
#[async_trait]
pub trait Readable: Send + Sync {
    /// Attempt to read up to `buf.len()` bytes within `timeout`.
    ///
    /// Returns the number of bytes read: `0` on timeout, at least 1
    /// otherwise. Short reads are normal; message-framed implementations
    /// return exactly one whole message per call.
    async fn read(&self, buf: &mut [u8], timeout: Duration) -> Result<usize>;
}
