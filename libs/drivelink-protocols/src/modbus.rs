//! Modbus RTU encoding for the drive bus
//!
//! Covers the three function codes the drives speak plus exception
//! responses. Fields are big-endian on the wire per the Modbus spec; the
//! CRC-16 trailer is little-endian. Frames carry no length field: boundaries
//! come from idle-line timing, so receivers predict response lengths from
//! the request they sent.

pub mod codec;
pub mod frame;

pub use codec::{
    decode_exception, decode_request, decode_response, encode_exception, encode_request,
    encode_response, expected_response_len, request_frame_len, valid_crc,
};
pub use frame::{FunctionCode, ModbusRequest, ModbusResponse};

/// Node address 0 addresses every server; no response follows.
pub const BROADCAST_ADDRESS: u8 = 0;

/// Node address and function code.
pub const HEADER_LEN: usize = 2;

/// CRC-16 trailer.
pub const CRC_LEN: usize = 2;

pub const HEADER_AND_CRC_LEN: usize = HEADER_LEN + CRC_LEN;

/// Exception frames are fixed-size: header, exception code, CRC.
pub const EXCEPTION_FRAME_LEN: usize = 5;

/// Set in the function code byte of an exception response.
pub const EXCEPTION_BIT: u8 = 0x80;

pub const MIN_READ_REGISTERS: u16 = 1;
pub const MAX_READ_REGISTERS: u16 = 125;
pub const MIN_WRITE_REGISTERS: u16 = 1;
pub const MAX_WRITE_REGISTERS: u16 = 123;

/// Largest ADU on the bus (write-multiple request with a full payload).
pub const MAX_ADU_LEN: usize = 256;

/// Standard exception codes the drives can return.
pub mod exception {
    pub const ILLEGAL_FUNCTION: u8 = 0x01;
    pub const ILLEGAL_DATA_ADDRESS: u8 = 0x02;
    pub const ILLEGAL_DATA_VALUE: u8 = 0x03;
    pub const SLAVE_DEVICE_FAILURE: u8 = 0x04;
    pub const ACKNOWLEDGE: u8 = 0x05;
}

/// Human-readable exception code description.
pub fn exception_description(code: u8) -> &'static str {
    match code {
        exception::ILLEGAL_FUNCTION => "Illegal Function",
        exception::ILLEGAL_DATA_ADDRESS => "Illegal Data Address",
        exception::ILLEGAL_DATA_VALUE => "Illegal Data Value",
        exception::SLAVE_DEVICE_FAILURE => "Slave Device Failure",
        exception::ACKNOWLEDGE => "Acknowledge",
        _ => "Unknown Exception",
    }
}
