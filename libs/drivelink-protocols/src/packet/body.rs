//! Packet body variants and their byte layouts
//!
//! Bodies mirror the layout of the firmware structs they travel to and from:
//! little-endian fields, and one padding byte inside VfdSetFrequency where
//! natural alignment would place it. VfdStatus and ModbusError are packed.

use super::{PacketId, MAX_LOG_TEXT, TASK_NAME_LEN};

/// Contents of the drive status register block (8 registers starting at the
/// status base address) plus the responding node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct VfdStatus {
    pub error: u16,
    pub state: u16,
    pub freq_cmd: u16,
    pub freq_out: u16,
    pub current_out: u16,
    pub dc_bus_voltage: u16,
    pub motor_output_voltage: u16,
    pub rpm: u16,
    pub node_address: u8,
}

/// What went wrong during a Modbus exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum ModbusErrorKind {
    BadEchoNotEnoughBytes = 0,
    BadEchoMismatchedContents = 1,
    BadResponseNotEnoughBytes = 2,
    BadResponseMalformedPacket = 3,
    ResponseException = 4,
    ExtraBytes = 5,
}

impl ModbusErrorKind {
    pub fn from_u16(value: u16) -> Option<Self> {
        Some(match value {
            0 => ModbusErrorKind::BadEchoNotEnoughBytes,
            1 => ModbusErrorKind::BadEchoMismatchedContents,
            2 => ModbusErrorKind::BadResponseNotEnoughBytes,
            3 => ModbusErrorKind::BadResponseMalformedPacket,
            4 => ModbusErrorKind::ResponseException,
            5 => ModbusErrorKind::ExtraBytes,
            _ => return None,
        })
    }
}

/// Kind-specific payload of a [`ModbusErrorReport`]. Occupies a fixed 8-byte
/// region on the wire regardless of variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModbusErrorDetail {
    /// Kinds that carry no extra data
    None,
    /// Byte-count mismatches
    Bytes { actual: u32, expected: u32 },
    /// Exception responses carry the server's exception code
    Exception(u8),
}

/// In-band report of a failed Modbus exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModbusErrorReport {
    pub kind: ModbusErrorKind,
    pub node: u8,
    /// Raw function code of the request that failed
    pub function: u8,
    pub detail: ModbusErrorDetail,
}

/// The variant payload of a packet. The discriminant is the [`PacketId`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PacketBody {
    /// Free-form diagnostic text, up to [`MAX_LOG_TEXT`] bytes
    LogMessage(Vec<u8>),
    Heartbeat,
    InvalidLength {
        invalid_length: u32,
    },
    InvalidCrc {
        provided: u32,
        calculated: u32,
    },
    InvalidId {
        invalid_id: u32,
    },
    InvalidSequence {
        provided: u32,
        expected: u32,
    },
    DroppedBytes {
        dropped_bytes: u32,
    },
    WatchdogTimeout {
        unresponsive_ticks: u32,
        name: [u8; TASK_NAME_LEN],
    },
    VfdSetFrequency {
        node: u8,
        frequency: u16,
    },
    VfdStatus(VfdStatus),
    ModbusError(ModbusErrorReport),
    Dummy {
        out_id: u32,
        payload: [u8; 64],
    },
}

impl PacketBody {
    pub fn id(&self) -> PacketId {
        match self {
            PacketBody::LogMessage(_) => PacketId::LogMessage,
            PacketBody::Heartbeat => PacketId::Heartbeat,
            PacketBody::InvalidLength { .. } => PacketId::ParsingErrorInvalidLength,
            PacketBody::InvalidCrc { .. } => PacketId::ParsingErrorInvalidCrc,
            PacketBody::InvalidId { .. } => PacketId::ParsingErrorInvalidId,
            PacketBody::InvalidSequence { .. } => PacketId::ParsingErrorInvalidSequence,
            PacketBody::DroppedBytes { .. } => PacketId::ParsingErrorDroppedBytes,
            PacketBody::WatchdogTimeout { .. } => PacketId::WatchdogTimeout,
            PacketBody::VfdSetFrequency { .. } => PacketId::VfdSetFrequency,
            PacketBody::VfdStatus(_) => PacketId::VfdStatus,
            PacketBody::ModbusError(_) => PacketId::ModbusError,
            PacketBody::Dummy { .. } => PacketId::DummyPacket,
        }
    }

    /// Encoded size of this body. Fixed per id except for LogMessage, which
    /// carries only as much text as it holds.
    pub fn wire_len(&self) -> usize {
        match self {
            PacketBody::LogMessage(text) => 4 + text.len().min(MAX_LOG_TEXT),
            other => other.id().body_len(),
        }
    }

    pub(crate) fn encode_into(&self, out: &mut Vec<u8>) {
        match self {
            PacketBody::LogMessage(text) => {
                let text = &text[..text.len().min(MAX_LOG_TEXT)];
                out.extend_from_slice(&(text.len() as u32).to_le_bytes());
                out.extend_from_slice(text);
            }
            PacketBody::Heartbeat => {}
            PacketBody::InvalidLength { invalid_length } => {
                out.extend_from_slice(&invalid_length.to_le_bytes());
            }
            PacketBody::InvalidCrc {
                provided,
                calculated,
            } => {
                out.extend_from_slice(&provided.to_le_bytes());
                out.extend_from_slice(&calculated.to_le_bytes());
            }
            PacketBody::InvalidId { invalid_id } => {
                out.extend_from_slice(&invalid_id.to_le_bytes());
            }
            PacketBody::InvalidSequence { provided, expected } => {
                out.extend_from_slice(&provided.to_le_bytes());
                out.extend_from_slice(&expected.to_le_bytes());
            }
            PacketBody::DroppedBytes { dropped_bytes } => {
                out.extend_from_slice(&dropped_bytes.to_le_bytes());
            }
            PacketBody::WatchdogTimeout {
                unresponsive_ticks,
                name,
            } => {
                out.extend_from_slice(&unresponsive_ticks.to_le_bytes());
                out.extend_from_slice(name);
            }
            PacketBody::VfdSetFrequency { node, frequency } => {
                // One alignment padding byte between node and frequency.
                out.push(*node);
                out.push(0);
                out.extend_from_slice(&frequency.to_le_bytes());
            }
            PacketBody::VfdStatus(status) => {
                out.extend_from_slice(&status.error.to_le_bytes());
                out.extend_from_slice(&status.state.to_le_bytes());
                out.extend_from_slice(&status.freq_cmd.to_le_bytes());
                out.extend_from_slice(&status.freq_out.to_le_bytes());
                out.extend_from_slice(&status.current_out.to_le_bytes());
                out.extend_from_slice(&status.dc_bus_voltage.to_le_bytes());
                out.extend_from_slice(&status.motor_output_voltage.to_le_bytes());
                out.extend_from_slice(&status.rpm.to_le_bytes());
                out.push(status.node_address);
            }
            PacketBody::ModbusError(report) => {
                out.extend_from_slice(&(report.kind as u16).to_le_bytes());
                out.push(report.node);
                out.push(report.function);
                let mut detail = [0u8; 8];
                match report.detail {
                    ModbusErrorDetail::None => {}
                    ModbusErrorDetail::Bytes { actual, expected } => {
                        detail[..4].copy_from_slice(&actual.to_le_bytes());
                        detail[4..].copy_from_slice(&expected.to_le_bytes());
                    }
                    ModbusErrorDetail::Exception(code) => detail[0] = code,
                }
                out.extend_from_slice(&detail);
            }
            PacketBody::Dummy { out_id, payload } => {
                out.extend_from_slice(&out_id.to_le_bytes());
                out.extend_from_slice(payload);
            }
        }
    }

    /// Decode a body region for a known id. Regions shorter than the id's
    /// full body are zero-extended, matching how the firmware reads a
    /// partially-filled fixed union.
    pub(crate) fn decode(id: PacketId, bytes: &[u8]) -> Self {
        let mut region = [0u8; super::MAX_BODY_LEN];
        let n = bytes.len().min(region.len());
        region[..n].copy_from_slice(&bytes[..n]);
        let b = &region;

        match id {
            PacketId::LogMessage => {
                let declared = u32_at(b, 0) as usize;
                let available = n.saturating_sub(4);
                let len = declared.min(available).min(MAX_LOG_TEXT);
                PacketBody::LogMessage(b[4..4 + len].to_vec())
            }
            PacketId::Heartbeat => PacketBody::Heartbeat,
            PacketId::ParsingErrorInvalidLength => PacketBody::InvalidLength {
                invalid_length: u32_at(b, 0),
            },
            PacketId::ParsingErrorInvalidCrc => PacketBody::InvalidCrc {
                provided: u32_at(b, 0),
                calculated: u32_at(b, 4),
            },
            PacketId::ParsingErrorInvalidId => PacketBody::InvalidId {
                invalid_id: u32_at(b, 0),
            },
            PacketId::ParsingErrorInvalidSequence => PacketBody::InvalidSequence {
                provided: u32_at(b, 0),
                expected: u32_at(b, 4),
            },
            PacketId::ParsingErrorDroppedBytes => PacketBody::DroppedBytes {
                dropped_bytes: u32_at(b, 0),
            },
            PacketId::WatchdogTimeout => {
                let mut name = [0u8; TASK_NAME_LEN];
                name.copy_from_slice(&b[4..4 + TASK_NAME_LEN]);
                PacketBody::WatchdogTimeout {
                    unresponsive_ticks: u32_at(b, 0),
                    name,
                }
            }
            PacketId::VfdSetFrequency => PacketBody::VfdSetFrequency {
                node: b[0],
                frequency: u16_at(b, 2),
            },
            PacketId::VfdStatus => PacketBody::VfdStatus(VfdStatus {
                error: u16_at(b, 0),
                state: u16_at(b, 2),
                freq_cmd: u16_at(b, 4),
                freq_out: u16_at(b, 6),
                current_out: u16_at(b, 8),
                dc_bus_voltage: u16_at(b, 10),
                motor_output_voltage: u16_at(b, 12),
                rpm: u16_at(b, 14),
                node_address: b[16],
            }),
            PacketId::ModbusError => {
                let kind_raw = u16_at(b, 0);
                let kind = ModbusErrorKind::from_u16(kind_raw)
                    .unwrap_or(ModbusErrorKind::BadResponseMalformedPacket);
                let detail = match kind {
                    ModbusErrorKind::BadEchoNotEnoughBytes
                    | ModbusErrorKind::BadResponseNotEnoughBytes
                    | ModbusErrorKind::ExtraBytes => ModbusErrorDetail::Bytes {
                        actual: u32_at(b, 4),
                        expected: u32_at(b, 8),
                    },
                    ModbusErrorKind::ResponseException => ModbusErrorDetail::Exception(b[4]),
                    ModbusErrorKind::BadEchoMismatchedContents
                    | ModbusErrorKind::BadResponseMalformedPacket => ModbusErrorDetail::None,
                };
                PacketBody::ModbusError(ModbusErrorReport {
                    kind,
                    node: b[2],
                    function: b[3],
                    detail,
                })
            }
            PacketId::DummyPacket => {
                let mut payload = [0u8; 64];
                payload.copy_from_slice(&b[4..68]);
                PacketBody::Dummy {
                    out_id: u32_at(b, 0),
                    payload,
                }
            }
        }
    }
}

fn u16_at(bytes: &[u8], offset: usize) -> u16 {
    u16::from_le_bytes([bytes[offset], bytes[offset + 1]])
}

fn u32_at(bytes: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes([
        bytes[offset],
        bytes[offset + 1],
        bytes[offset + 2],
        bytes[offset + 3],
    ])
}
