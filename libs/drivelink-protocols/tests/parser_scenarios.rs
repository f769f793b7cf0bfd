//! End-to-end parser scenarios over a simulated corrupted wire
//!
//! Builds one long receive buffer the way a flaky link would: leading
//! garbage, a stray magic word, corrupted length fields, a bad id, a bad
//! CRC, and good frames sprinkled between. The parser must deliver every
//! good packet and every error report in wire order.

use drivelink_protocols::packet::{
    wrap, Packet, PacketBody, PacketParser, MAGIC_START, MAX_PACKET_LEN, MAX_WRAPPED_LEN,
    MIN_WRAPPED_LEN, NUM_PACKET_IDS,
};

fn freq_packet(seq: u32, node: u8, frequency: u16) -> Packet {
    Packet::internal(PacketBody::VfdSetFrequency { node, frequency }).with_sequence(seq)
}

fn extract_all(input: &[u8]) -> (Vec<Packet>, usize) {
    let mut window = input.to_vec();
    window.resize(input.len() + MAX_WRAPPED_LEN, 0);
    let mut seen = Vec::new();
    let remaining = PacketParser::new().extract(&mut window, input.len(), &mut |p| seen.push(p));
    (seen, remaining)
}

const GARBAGE: [u8; 30] = [
    1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15, 16, 17, 18, 19, 20, 21, 22, 23, 24, 25, 26,
    27, 28, 29, 30,
];

#[test]
fn leading_garbage_with_stray_magic_word() {
    // Garbage, a bare magic word, more garbage, then two good frames. The
    // bare magic word picks up garbage as its length field (bytes 5..8 of
    // the following garbage run, little-endian).
    let mut input = Vec::new();
    input.extend_from_slice(&GARBAGE);
    input.extend_from_slice(&MAGIC_START.to_le_bytes());
    input.extend_from_slice(&GARBAGE);
    input.extend_from_slice(&wrap(&freq_packet(1, 3, 25)));
    input.extend_from_slice(&wrap(&freq_packet(2, 3, 50)));

    let (seen, remaining) = extract_all(&input);

    assert_eq!(remaining, 0);
    assert_eq!(seen.len(), 4);
    assert_eq!(
        seen[0].body,
        PacketBody::InvalidLength {
            invalid_length: 0x08070605
        }
    );
    assert_eq!(
        seen[1].body,
        PacketBody::DroppedBytes { dropped_bytes: 64 }
    );
    assert_eq!(seen[2].sequence_num, 1);
    assert_eq!(seen[3].sequence_num, 2);
}

#[test]
fn corrupted_length_fields_never_reach_the_callback_as_packets() {
    // Two otherwise-valid frames whose length fields were stomped: one too
    // small, one beyond the largest possible packet.
    let mut small = wrap(&freq_packet(1, 3, 50));
    small[8..12].copy_from_slice(&1u32.to_le_bytes());
    let mut big = wrap(&freq_packet(2, 3, 50));
    big[8..12].copy_from_slice(&((MAX_PACKET_LEN as u32) + 40).to_le_bytes());

    let mut input = small;
    input.extend_from_slice(&big);

    let (seen, _) = extract_all(&input);

    let lengths: Vec<_> = seen
        .iter()
        .filter_map(|p| match p.body {
            PacketBody::InvalidLength { invalid_length } => Some(invalid_length),
            _ => None,
        })
        .collect();
    assert_eq!(lengths, vec![1, MAX_PACKET_LEN as u32 + 40]);
    assert!(!seen
        .iter()
        .any(|p| matches!(p.body, PacketBody::VfdSetFrequency { .. })));
}

#[test]
fn full_gauntlet_delivers_packets_and_errors_in_wire_order() {
    let good1 = wrap(&freq_packet(1, 3, 25));
    let good2 = wrap(&freq_packet(2, 3, 50));
    let good3 = wrap(&freq_packet(7, 3, 50));
    let good4 = wrap(&freq_packet(8, 3, 50));

    let mut bad_small_length = wrap(&freq_packet(2, 3, 50));
    bad_small_length[8..12].copy_from_slice(&1u32.to_le_bytes());

    let mut bad_big_length = wrap(&freq_packet(2, 3, 50));
    bad_big_length[8..12].copy_from_slice(&((MAX_PACKET_LEN as u32) + 40).to_le_bytes());

    let mut bad_id = wrap(&freq_packet(5, 3, 50));
    bad_id[20..24].copy_from_slice(&NUM_PACKET_IDS.to_le_bytes());

    let mut bad_crc = wrap(&freq_packet(6, 3, 50));
    let bad_crc_calculated = u32::from_le_bytes([bad_crc[4], bad_crc[5], bad_crc[6], bad_crc[7]]);
    bad_crc[4..8].copy_from_slice(&1234u32.to_le_bytes());

    let mut input = Vec::new();
    input.extend_from_slice(&GARBAGE);
    input.extend_from_slice(&MAGIC_START.to_le_bytes());
    input.extend_from_slice(&GARBAGE);
    input.extend_from_slice(&good1);
    input.extend_from_slice(&good2);
    input.extend_from_slice(&bad_small_length);
    input.extend_from_slice(&bad_big_length);
    input.extend_from_slice(&bad_id);
    input.extend_from_slice(&bad_crc);
    input.extend_from_slice(&good3);
    input.extend_from_slice(&good4);
    input.extend_from_slice(&GARBAGE);

    let (seen, remaining) = extract_all(&input);

    let frame_len = good1.len() as u32;
    let expected: Vec<PacketBody> = vec![
        // Stray magic word picks garbage up as a length field.
        PacketBody::InvalidLength {
            invalid_length: 0x08070605,
        },
        PacketBody::DroppedBytes { dropped_bytes: 64 },
        PacketBody::VfdSetFrequency {
            node: 3,
            frequency: 25,
        },
        PacketBody::VfdSetFrequency {
            node: 3,
            frequency: 50,
        },
        // Each corrupted frame reports once, then is skipped byte-by-byte.
        PacketBody::InvalidLength { invalid_length: 1 },
        PacketBody::InvalidLength {
            invalid_length: MAX_PACKET_LEN as u32 + 40,
        },
        PacketBody::InvalidId {
            invalid_id: NUM_PACKET_IDS,
        },
        PacketBody::InvalidCrc {
            provided: 1234,
            calculated: bad_crc_calculated,
        },
        PacketBody::DroppedBytes {
            dropped_bytes: 4 * frame_len,
        },
        PacketBody::InvalidSequence {
            provided: 7,
            expected: 3,
        },
        PacketBody::VfdSetFrequency {
            node: 3,
            frequency: 50,
        },
        PacketBody::VfdSetFrequency {
            node: 3,
            frequency: 50,
        },
        // Trailing garbage, less what still fits a minimal frame.
        PacketBody::DroppedBytes {
            dropped_bytes: GARBAGE.len() as u32 - (MIN_WRAPPED_LEN as u32 - 1),
        },
    ];

    let bodies: Vec<PacketBody> = seen.iter().map(|p| p.body.clone()).collect();
    assert_eq!(bodies, expected);

    // Good packets keep their wire sequence numbers.
    assert_eq!(seen[2].sequence_num, 1);
    assert_eq!(seen[3].sequence_num, 2);
    assert_eq!(seen[10].sequence_num, 7);
    assert_eq!(seen[11].sequence_num, 8);

    assert_eq!(remaining, MIN_WRAPPED_LEN - 1);
}

#[test]
fn parser_makes_progress_whenever_a_complete_frame_is_present() {
    use rand::{Rng, SeedableRng};
    let mut rng = rand::rngs::StdRng::seed_from_u64(0xABBE);

    for round in 0..200 {
        let lead = rng.gen_range(0..64);
        let trail = rng.gen_range(0..64);
        let mut input: Vec<u8> = (0..lead).map(|_| rng.gen()).collect();
        input.extend_from_slice(&wrap(&freq_packet(round + 1, 3, 25)));
        input.extend((0..trail).map(|_| rng.gen::<u8>()));

        let (seen, remaining) = extract_all(&input);
        assert!(
            remaining < input.len() || !seen.is_empty(),
            "no progress on round {round}"
        );
        // The embedded frame itself always comes out.
        assert!(
            seen.iter()
                .any(|p| matches!(p.body, PacketBody::VfdSetFrequency { frequency: 25, .. })),
            "frame lost on round {round}"
        );
    }
}
