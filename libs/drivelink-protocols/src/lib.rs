//! Wire protocols for DriveLink
//!
//! Two protocols live here:
//!
//! - [`packet`]: the framed host-link protocol. Little-endian packets wrapped
//!   in a magic word and a CRC-32, with sequence numbering, per-byte
//!   resynchronization after corruption, and in-band error reporting.
//! - [`modbus`]: Modbus RTU encoding for the drive bus. Big-endian fields,
//!   CRC-16 trailer, request/response length prediction and exception
//!   detection.

pub mod crc;
pub mod error;
pub mod modbus;
pub mod packet;

pub use error::{CodecError, Result};
