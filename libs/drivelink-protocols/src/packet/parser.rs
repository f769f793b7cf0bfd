//! Sliding-window frame extraction
//!
//! The parser walks a byte window one candidate offset at a time. A frame is
//! accepted only when magic word, length bounds, id range and CRC-32 all
//! hold; any rejection advances the cursor a single byte so that a frame
//! boundary is never missed inside corrupted data. Everything the parser has
//! to say about bad input is said in-band, as error packets with origin
//! Internal and sequence number 0, delivered through the same callback as
//! real packets and in wire order.

use tracing::trace;

use crate::crc::crc32;

use super::body::PacketBody;
use super::wire::Packet;
use super::{
    PacketId, PacketOrigin, MAGIC_START, MAX_PACKET_LEN, MIN_PACKET_LEN, MIN_WRAPPED_LEN,
    NUM_ORIGINS, NUM_PACKET_IDS, WRAPPER_LEN,
};

/// Stateful extractor for one receive direction.
///
/// Tracks the last accepted sequence number so gaps and reorderings surface
/// as `InvalidSequence` reports. The provided number always becomes the new
/// baseline, so a single dropped packet produces a single report.
#[derive(Debug, Default)]
pub struct PacketParser {
    last_seq: u32,
}

impl PacketParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Scan `buf[..len]` for complete frames, delivering every recognized
    /// packet and every parse error to `process` in wire order. Unconsumed
    /// trailing bytes are shifted to the front of `buf`; returns how many
    /// remain.
    pub fn extract(&mut self, buf: &mut [u8], len: usize, process: &mut dyn FnMut(Packet)) -> usize {
        let mut offset = 0usize;
        let mut skipped = 0u32;

        while len >= offset + MIN_WRAPPED_LEN {
            let frame = &buf[offset..];

            let magic = u32_at(frame, 0);
            if magic != MAGIC_START {
                offset += 1;
                skipped += 1;
                continue;
            }

            let crc_field = u32_at(frame, 4);
            let length = u32_at(frame, 8);
            if (length as usize) < MIN_PACKET_LEN || length as usize > MAX_PACKET_LEN {
                process(Packet::internal(PacketBody::InvalidLength {
                    invalid_length: length,
                }));
                offset += 1;
                skipped += 1;
                continue;
            }

            let id_raw = u32_at(frame, 20);
            if id_raw >= NUM_PACKET_IDS {
                process(Packet::internal(PacketBody::InvalidId { invalid_id: id_raw }));
                offset += 1;
                skipped += 1;
                continue;
            }

            // Incomplete frame: wait for more data before deciding anything.
            if len < offset + WRAPPER_LEN + length as usize {
                break;
            }

            let inner = &frame[WRAPPER_LEN..WRAPPER_LEN + length as usize];
            let calculated = crc32(inner);
            if calculated != crc_field {
                trace!(provided = crc_field, calculated, "frame crc mismatch");
                process(Packet::internal(PacketBody::InvalidCrc {
                    provided: crc_field,
                    calculated,
                }));
                offset += 1;
                skipped += 1;
                continue;
            }

            // CRC-valid frame with an origin outside the known set can only
            // come from a broken peer; resync past it like any other
            // corruption and let the dropped-byte count cover it.
            let origin_raw = u32_at(frame, 16);
            if origin_raw >= NUM_ORIGINS {
                offset += 1;
                skipped += 1;
                continue;
            }

            let sequence_num = u32_at(frame, 12);
            let packet = Packet {
                length,
                sequence_num,
                origin: PacketOrigin::from_u32(origin_raw).unwrap_or_default(),
                body: PacketBody::decode(
                    PacketId::from_u32(id_raw).unwrap_or(PacketId::Heartbeat),
                    &inner[super::FIXED_HEADER_LEN..],
                ),
            };

            // A valid packet closes out any run of skipped bytes first.
            if skipped > 0 {
                process(Packet::internal(PacketBody::DroppedBytes {
                    dropped_bytes: skipped,
                }));
                skipped = 0;
            }

            if sequence_num != self.last_seq.wrapping_add(1) {
                process(Packet::internal(PacketBody::InvalidSequence {
                    provided: sequence_num,
                    expected: self.last_seq.wrapping_add(1),
                }));
            }
            self.last_seq = sequence_num;

            process(packet);

            offset += WRAPPER_LEN + length as usize;
        }

        if skipped > 0 {
            trace!(skipped, "unframed bytes at buffer tail");
            process(Packet::internal(PacketBody::DroppedBytes {
                dropped_bytes: skipped,
            }));
        }

        let remaining = len - offset;
        if offset > 0 {
            buf.copy_within(offset..len, 0);
        }
        remaining
    }
}

fn u32_at(bytes: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes([
        bytes[offset],
        bytes[offset + 1],
        bytes[offset + 2],
        bytes[offset + 3],
    ])
}

#[cfg(test)]
mod tests {
    use super::super::wire::wrap;
    use super::*;

    fn freq_packet(seq: u32, node: u8, frequency: u16) -> Packet {
        Packet::internal(PacketBody::VfdSetFrequency { node, frequency }).with_sequence(seq)
    }

    fn run_parser(parser: &mut PacketParser, input: &[u8]) -> (Vec<Packet>, usize) {
        let mut window = input.to_vec();
        window.resize(input.len().max(super::super::MAX_WRAPPED_LEN * 2), 0);
        let mut seen = Vec::new();
        let remaining = parser.extract(&mut window, input.len(), &mut |p| seen.push(p));
        (seen, remaining)
    }

    #[test]
    fn single_valid_packet_is_delivered_and_consumed() {
        let packet = freq_packet(1, 3, 25);
        let (seen, remaining) = run_parser(&mut PacketParser::new(), &wrap(&packet));

        assert_eq!(remaining, 0);
        assert_eq!(seen, vec![packet]);
    }

    #[test]
    fn incomplete_frame_is_left_in_the_window() {
        let frame = wrap(&freq_packet(1, 3, 25));
        let partial = &frame[..frame.len() - 3];
        let (seen, remaining) = run_parser(&mut PacketParser::new(), partial);

        assert!(seen.is_empty());
        assert_eq!(remaining, partial.len());
    }

    #[test]
    fn parser_resumes_across_split_input() {
        let frame = wrap(&freq_packet(1, 3, 25));
        let mut window = vec![0u8; 128];
        let mut parser = PacketParser::new();
        let mut seen = Vec::new();

        let split = 10;
        window[..split].copy_from_slice(&frame[..split]);
        let mut len = parser.extract(&mut window, split, &mut |p| seen.push(p));
        assert_eq!(len, split);

        window[len..len + frame.len() - split].copy_from_slice(&frame[split..]);
        len += frame.len() - split;
        let remaining = parser.extract(&mut window, len, &mut |p| seen.push(p));

        assert_eq!(remaining, 0);
        assert_eq!(seen.len(), 1);
    }

    #[test]
    fn sequence_gap_reports_then_rebaselines() {
        let mut input = Vec::new();
        for seq in [1u32, 2, 7] {
            input.extend_from_slice(&wrap(&freq_packet(seq, 3, 50)));
        }
        let (seen, remaining) = run_parser(&mut PacketParser::new(), &input);

        assert_eq!(remaining, 0);
        assert_eq!(seen.len(), 4);
        assert_eq!(seen[0].sequence_num, 1);
        assert_eq!(seen[1].sequence_num, 2);
        assert_eq!(
            seen[2].body,
            PacketBody::InvalidSequence {
                provided: 7,
                expected: 3
            }
        );
        assert_eq!(seen[3].sequence_num, 7);
    }

    #[test]
    fn out_of_order_sequence_reports_each_step() {
        let mut input = Vec::new();
        for seq in [1u32, 2, 4, 3, 5, 6] {
            input.extend_from_slice(&wrap(&freq_packet(seq, 3, 50)));
        }
        let (seen, _) = run_parser(&mut PacketParser::new(), &input);

        let errors: Vec<_> = seen
            .iter()
            .filter_map(|p| match p.body {
                PacketBody::InvalidSequence { provided, expected } => Some((provided, expected)),
                _ => None,
            })
            .collect();
        assert_eq!(errors, vec![(4, 3), (3, 5), (5, 4)]);
    }

    #[test]
    fn corrupted_crc_is_reported_and_resynced() {
        let mut frame = wrap(&freq_packet(1, 3, 25));
        let good_crc = u32::from_le_bytes([frame[4], frame[5], frame[6], frame[7]]);
        frame[4] ^= 0xFF;
        let mut input = frame.clone();
        input.extend_from_slice(&wrap(&freq_packet(2, 3, 50)));

        let (seen, _) = run_parser(&mut PacketParser::new(), &input);

        assert_eq!(
            seen[0].body,
            PacketBody::InvalidCrc {
                provided: good_crc ^ 0xFF,
                calculated: good_crc
            }
        );
        // The corrupt frame's 28 bytes are skipped byte-by-byte.
        assert_eq!(
            seen[1].body,
            PacketBody::DroppedBytes { dropped_bytes: 28 }
        );
        // A sequence report follows: the corrupted seq=1 never arrived.
        assert_eq!(
            seen[2].body,
            PacketBody::InvalidSequence {
                provided: 2,
                expected: 1
            }
        );
        assert_eq!(seen[3].sequence_num, 2);
    }

    #[test]
    fn trailing_garbage_is_reported_once_at_the_end() {
        let mut input = wrap(&freq_packet(1, 3, 25));
        input.extend_from_slice(&[0u8; 40]);

        let (seen, remaining) = run_parser(&mut PacketParser::new(), &input);

        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0].sequence_num, 1);
        // The last MIN_WRAPPED_LEN - 1 bytes stay buffered awaiting more data.
        assert_eq!(
            seen[1].body,
            PacketBody::DroppedBytes {
                dropped_bytes: (40 - remaining) as u32
            }
        );
        assert_eq!(remaining, MIN_WRAPPED_LEN - 1);
    }

    #[test]
    fn error_packets_carry_internal_origin_and_zero_sequence() {
        let mut input = wrap(&freq_packet(5, 3, 25));
        input[4] ^= 0x01;

        let (seen, _) = run_parser(&mut PacketParser::new(), &input);
        let error = &seen[0];
        assert_eq!(error.origin, PacketOrigin::Internal);
        assert_eq!(error.sequence_num, 0);
        assert_eq!(error.length, PacketId::ParsingErrorInvalidCrc.packet_len());
    }
}
