//! Byte transport layer for DriveLink
//!
//! Everything that moves bytes between tasks or devices implements one of two
//! capabilities: [`Readable`] or [`Writable`]. Pipeline stages hold these
//! capabilities as trait objects, so any two endpoints compose without caring
//! whether the other side is a serial port, an in-process channel, or another
//! task.
//!
//! Two channel flavors back the capabilities:
//!
//! - [`StreamChannel`]: a bounded byte FIFO. Reads drain whatever is queued
//!   (at least one byte); writes block until every byte is accepted or the
//!   timeout expires.
//! - [`MessageChannel`]: a bounded message-framed buffer. Writes are atomic
//!   per message; reads return exactly one whole message.

pub mod error;
mod message;
mod stream;
mod traits;

pub use error::{Result, TransportError};
pub use message::MessageChannel;
pub use stream::StreamChannel;
pub use traits::{Readable, Writable};
