//! Outgoing sequence numbering

use super::wire::{wrap, Packet};

/// Owns the sequence counter for one transmit direction.
///
/// Numbers start at 1; 0 stays reserved for internally-generated packets, so
/// a receiver can always tell a parser report from traffic.
#[derive(Debug)]
pub struct PacketSequencer {
    next: u32,
}

impl Default for PacketSequencer {
    fn default() -> Self {
        Self { next: 1 }
    }
}

impl PacketSequencer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stamp the packet with the next sequence number and re-encode the
    /// whole frame (the CRC covers the sequence field, so wrapping must
    /// follow stamping).
    pub fn rewrap(&mut self, packet: &mut Packet) -> Vec<u8> {
        packet.sequence_num = self.next;
        self.next = self.next.wrapping_add(1);
        wrap(packet)
    }
}
