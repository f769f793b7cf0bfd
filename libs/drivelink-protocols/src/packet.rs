//! Framed host-link packet protocol
//!
//! The on-wire unit is a [`wire::WrappedPacket`] frame: a 32-bit magic start
//! word, a CRC-32 over the inner packet bytes, then the inner packet itself.
//! The inner packet carries a fixed 16-byte header (length, sequence number,
//! origin, id) followed by a variant body selected by the id. All fields are
//! little-endian.
//!
//! The magic word exists for resynchronization: after corruption the parser
//! advances one byte at a time until it lands on a frame whose magic, length,
//! id and CRC all check out, reporting what it skipped as in-band error
//! packets along the way.

pub mod body;
pub mod parser;
pub mod sequencer;
pub mod wire;

pub use body::{ModbusErrorDetail, ModbusErrorKind, ModbusErrorReport, PacketBody, VfdStatus};
pub use parser::PacketParser;
pub use sequencer::PacketSequencer;
pub use wire::{peek_id, wrap, Packet};

/// Start-of-frame marker for the outer wrapper.
pub const MAGIC_START: u32 = 0xFEED_ABBE;

/// Outer wrapper: magic word + CRC-32.
pub const WRAPPER_LEN: usize = 8;

/// Fixed inner header: length + sequence + origin + id, each 32 bits.
pub const FIXED_HEADER_LEN: usize = 16;

/// Maximum text carried by a LogMessage body.
pub const MAX_LOG_TEXT: usize = 256;

/// Task names in WatchdogTimeout bodies are fixed-width.
pub const TASK_NAME_LEN: usize = 16;

/// The largest body is a full LogMessage: its own length word plus text.
pub const MAX_BODY_LEN: usize = 4 + MAX_LOG_TEXT;

pub const MIN_PACKET_LEN: usize = FIXED_HEADER_LEN;
pub const MAX_PACKET_LEN: usize = FIXED_HEADER_LEN + MAX_BODY_LEN;
pub const MIN_WRAPPED_LEN: usize = WRAPPER_LEN + MIN_PACKET_LEN;
pub const MAX_WRAPPED_LEN: usize = WRAPPER_LEN + MAX_PACKET_LEN;

/// Packet discriminant. The wire value is the variant index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum PacketId {
    LogMessage = 0,
    Heartbeat = 1,
    ParsingErrorInvalidLength = 2,
    ParsingErrorInvalidCrc = 3,
    ParsingErrorInvalidId = 4,
    ParsingErrorInvalidSequence = 5,
    ParsingErrorDroppedBytes = 6,
    WatchdogTimeout = 7,
    VfdSetFrequency = 8,
    VfdStatus = 9,
    ModbusError = 10,
    DummyPacket = 11,
}

/// Number of known packet ids; any wire value at or above this is invalid.
pub const NUM_PACKET_IDS: u32 = 12;

impl PacketId {
    pub fn from_u32(value: u32) -> Option<Self> {
        Some(match value {
            0 => PacketId::LogMessage,
            1 => PacketId::Heartbeat,
            2 => PacketId::ParsingErrorInvalidLength,
            3 => PacketId::ParsingErrorInvalidCrc,
            4 => PacketId::ParsingErrorInvalidId,
            5 => PacketId::ParsingErrorInvalidSequence,
            6 => PacketId::ParsingErrorDroppedBytes,
            7 => PacketId::WatchdogTimeout,
            8 => PacketId::VfdSetFrequency,
            9 => PacketId::VfdStatus,
            10 => PacketId::ModbusError,
            11 => PacketId::DummyPacket,
            _ => return None,
        })
    }

    /// Size of this id's body region. For LogMessage this is the maximum;
    /// shorter encodings are legal on the wire.
    pub fn body_len(self) -> usize {
        match self {
            PacketId::LogMessage => MAX_BODY_LEN,
            PacketId::Heartbeat => 0,
            PacketId::ParsingErrorInvalidLength => 4,
            PacketId::ParsingErrorInvalidCrc => 8,
            PacketId::ParsingErrorInvalidId => 4,
            PacketId::ParsingErrorInvalidSequence => 8,
            PacketId::ParsingErrorDroppedBytes => 4,
            PacketId::WatchdogTimeout => 4 + TASK_NAME_LEN,
            PacketId::VfdSetFrequency => 4,
            PacketId::VfdStatus => 17,
            PacketId::ModbusError => 12,
            PacketId::DummyPacket => 68,
        }
    }

    /// Inner packet size for this id: fixed header plus body.
    pub fn packet_len(self) -> u32 {
        (FIXED_HEADER_LEN + self.body_len()) as u32
    }

    pub fn name(self) -> &'static str {
        match self {
            PacketId::LogMessage => "LogMessage",
            PacketId::Heartbeat => "Heartbeat",
            PacketId::ParsingErrorInvalidLength => "ParsingErrorInvalidLength",
            PacketId::ParsingErrorInvalidCrc => "ParsingErrorInvalidCrc",
            PacketId::ParsingErrorInvalidId => "ParsingErrorInvalidId",
            PacketId::ParsingErrorInvalidSequence => "ParsingErrorInvalidSequence",
            PacketId::ParsingErrorDroppedBytes => "ParsingErrorDroppedBytes",
            PacketId::WatchdogTimeout => "WatchdogTimeout",
            PacketId::VfdSetFrequency => "VfdSetFrequency",
            PacketId::VfdStatus => "VfdStatus",
            PacketId::ModbusError => "ModbusError",
            PacketId::DummyPacket => "DummyPacket",
        }
    }
}

/// Logical producer of a packet. `Internal` is reserved for parser-generated
/// error packets, which also carry sequence number 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u32)]
pub enum PacketOrigin {
    #[default]
    Internal = 0,
    HostToTarget = 1,
    TargetToHost = 2,
    HostToMonitor = 3,
    MonitorToAscii = 4,
    UnitTest = 5,
    TargetTest = 6,
}

/// Number of known origins; any wire value at or above this is invalid.
pub const NUM_ORIGINS: u32 = 7;

impl PacketOrigin {
    pub fn from_u32(value: u32) -> Option<Self> {
        Some(match value {
            0 => PacketOrigin::Internal,
            1 => PacketOrigin::HostToTarget,
            2 => PacketOrigin::TargetToHost,
            3 => PacketOrigin::HostToMonitor,
            4 => PacketOrigin::MonitorToAscii,
            5 => PacketOrigin::UnitTest,
            6 => PacketOrigin::TargetTest,
            _ => return None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn id_round_trips_through_wire_value() {
        for raw in 0..NUM_PACKET_IDS {
            let id = PacketId::from_u32(raw).expect("known id");
            assert_eq!(id as u32, raw);
        }
        assert_eq!(PacketId::from_u32(NUM_PACKET_IDS), None);
    }

    #[test]
    fn size_constants_are_consistent() {
        assert_eq!(MIN_WRAPPED_LEN, 24);
        assert_eq!(MAX_PACKET_LEN, 276);
        assert_eq!(MAX_WRAPPED_LEN, 284);
        assert_eq!(PacketId::VfdSetFrequency.packet_len(), 20);
        assert_eq!(PacketId::VfdStatus.packet_len(), 33);
        assert_eq!(PacketId::ModbusError.packet_len(), 28);
        assert_eq!(PacketId::WatchdogTimeout.packet_len(), 36);
        assert_eq!(PacketId::Heartbeat.packet_len(), 16);
    }
}
