//! Bitwise CRC implementations
//!
//! Both checksums use the reflected (LSB-first) form, so the inner loop
//! shifts right and conditionally xors the reversed polynomial.

/// CRC-16/Modbus: poly 0x8005 reflected to 0xA001, init 0xFFFF, no xorout.
pub fn crc16(data: &[u8]) -> u16 {
    let mut reg: u16 = 0xFFFF;

    for &byte in data {
        reg ^= u16::from(byte);
        for _ in 0..8 {
            let lsb = reg & 0x01;
            reg >>= 1;
            if lsb != 0 {
                reg ^= 0xA001;
            }
        }
    }
    reg
}

/// CRC-32/ISO-HDLC: poly 0x04C11DB7 reflected to 0xEDB88320, init 0xFFFFFFFF,
/// xorout 0xFFFFFFFF.
pub fn crc32(data: &[u8]) -> u32 {
    let mut reg: u32 = 0xFFFF_FFFF;

    for &byte in data {
        reg ^= u32::from(byte);
        for _ in 0..8 {
            let lsb = reg & 0x01;
            reg >>= 1;
            if lsb != 0 {
                reg ^= 0xEDB8_8320;
            }
        }
    }
    !reg
}
