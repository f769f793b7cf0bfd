//! Inner packet and outer frame encoding

use crate::crc::crc32;
use crate::error::{CodecError, Result};

use super::body::PacketBody;
use super::{
    PacketId, PacketOrigin, FIXED_HEADER_LEN, MAGIC_START, MAX_PACKET_LEN, MIN_PACKET_LEN,
    WRAPPER_LEN,
};

/// The inner packet: fixed header plus variant body.
///
/// `length` is carried explicitly rather than derived so that a packet
/// travels through channels and re-encodes byte-identically; constructors
/// keep it consistent with the body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    /// Total inner packet size in bytes, header included
    pub length: u32,
    /// Monotonic per-direction counter; 0 marks internally-generated packets
    pub sequence_num: u32,
    pub origin: PacketOrigin,
    pub body: PacketBody,
}

impl Packet {
    /// Build a packet with a correct length field for its body.
    pub fn new(origin: PacketOrigin, body: PacketBody) -> Self {
        Self {
            length: (FIXED_HEADER_LEN + body.wire_len()) as u32,
            sequence_num: 0,
            origin,
            body,
        }
    }

    /// Build an internally-generated packet (parser errors, watchdog
    /// reports): origin Internal, sequence number 0.
    pub fn internal(body: PacketBody) -> Self {
        Self::new(PacketOrigin::Internal, body)
    }

    pub fn with_sequence(mut self, sequence_num: u32) -> Self {
        self.sequence_num = sequence_num;
        self
    }

    pub fn id(&self) -> PacketId {
        self.body.id()
    }

    /// Encode the inner packet to exactly `self.length` bytes.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.length as usize);
        self.encode_into(&mut out);
        out
    }

    pub fn encode_into(&self, out: &mut Vec<u8>) {
        let start = out.len();
        out.extend_from_slice(&self.length.to_le_bytes());
        out.extend_from_slice(&self.sequence_num.to_le_bytes());
        out.extend_from_slice(&(self.origin as u32).to_le_bytes());
        out.extend_from_slice(&(self.id() as u32).to_le_bytes());
        self.body.encode_into(out);
        debug_assert_eq!(out.len() - start, self.length as usize);
    }

    /// Decode one inner packet from a whole-message buffer (as produced by
    /// `encode`). Used on the far side of message channels; wire-level
    /// validation belongs to the parser.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < FIXED_HEADER_LEN {
            return Err(CodecError::Truncated {
                needed: FIXED_HEADER_LEN,
                available: bytes.len(),
            });
        }

        let length = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
        if (length as usize) < MIN_PACKET_LEN || length as usize > MAX_PACKET_LEN {
            return Err(CodecError::bounds("length", length));
        }
        if length as usize > bytes.len() {
            return Err(CodecError::Truncated {
                needed: length as usize,
                available: bytes.len(),
            });
        }

        let sequence_num = u32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]);
        let origin_raw = u32::from_le_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]);
        let origin =
            PacketOrigin::from_u32(origin_raw).ok_or(CodecError::invalid("origin", origin_raw))?;
        let id_raw = u32::from_le_bytes([bytes[12], bytes[13], bytes[14], bytes[15]]);
        let id = PacketId::from_u32(id_raw).ok_or(CodecError::invalid("id", id_raw))?;

        let body = PacketBody::decode(id, &bytes[FIXED_HEADER_LEN..length as usize]);
        Ok(Self {
            length,
            sequence_num,
            origin,
            body,
        })
    }
}

/// Read just the id discriminant out of an encoded inner packet, for routing
/// without a full decode.
pub fn peek_id(bytes: &[u8]) -> Option<PacketId> {
    if bytes.len() < FIXED_HEADER_LEN {
        return None;
    }
    PacketId::from_u32(u32::from_le_bytes([
        bytes[12], bytes[13], bytes[14], bytes[15],
    ]))
}

/// Wrap an inner packet in the outer frame: magic start word, CRC-32 over
/// the inner bytes, then the inner packet.
pub fn wrap(packet: &Packet) -> Vec<u8> {
    let mut out = Vec::with_capacity(WRAPPER_LEN + packet.length as usize);
    out.extend_from_slice(&MAGIC_START.to_le_bytes());
    let inner = packet.encode();
    out.extend_from_slice(&crc32(&inner).to_le_bytes());
    out.extend_from_slice(&inner);
    out
}
