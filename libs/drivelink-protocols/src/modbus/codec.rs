//! Modbus RTU frame encoding and decoding

use tracing::debug;

use crate::crc::crc16;
use crate::error::{CodecError, Result};

use super::frame::{FunctionCode, ModbusRequest, ModbusResponse};
use super::{
    CRC_LEN, EXCEPTION_BIT, EXCEPTION_FRAME_LEN, HEADER_AND_CRC_LEN, HEADER_LEN,
    MAX_READ_REGISTERS, MAX_WRITE_REGISTERS,
};

pub use super::frame::expected_response_len;

fn push_u16_be(out: &mut Vec<u8>, value: u16) {
    out.extend_from_slice(&value.to_be_bytes());
}

fn u16_be_at(bytes: &[u8], offset: usize) -> u16 {
    u16::from_be_bytes([bytes[offset], bytes[offset + 1]])
}

fn append_crc(mut frame: Vec<u8>) -> Vec<u8> {
    let crc = crc16(&frame);
    frame.extend_from_slice(&crc.to_le_bytes());
    frame
}

/// Validate the CRC-16 trailer over a whole frame.
pub fn valid_crc(frame: &[u8]) -> bool {
    if frame.len() < HEADER_AND_CRC_LEN {
        return false;
    }
    let body = &frame[..frame.len() - CRC_LEN];
    let provided = u16::from_le_bytes([frame[frame.len() - 2], frame[frame.len() - 1]]);
    crc16(body) == provided
}

/// Encode a request ADU: node, function, big-endian fields, CRC.
pub fn encode_request(node: u8, request: &ModbusRequest) -> Result<Vec<u8>> {
    if request.out_of_bounds() {
        return Err(CodecError::bounds(
            "num_registers",
            match request {
                ModbusRequest::ReadMultipleRegisters { num_registers, .. } => *num_registers as u32,
                ModbusRequest::WriteSingleRegister { .. } => 0,
                ModbusRequest::WriteMultipleRegisters { registers, .. } => registers.len() as u32,
            },
        ));
    }

    let mut frame = Vec::with_capacity(super::MAX_ADU_LEN);
    frame.push(node);
    frame.push(request.function() as u8);

    match request {
        ModbusRequest::ReadMultipleRegisters {
            starting_address,
            num_registers,
        } => {
            push_u16_be(&mut frame, *starting_address);
            push_u16_be(&mut frame, *num_registers);
        }
        ModbusRequest::WriteSingleRegister {
            register_address,
            data,
        } => {
            push_u16_be(&mut frame, *register_address);
            push_u16_be(&mut frame, *data);
        }
        ModbusRequest::WriteMultipleRegisters {
            starting_address,
            registers,
        } => {
            push_u16_be(&mut frame, *starting_address);
            push_u16_be(&mut frame, registers.len() as u16);
            frame.push((registers.len() * 2) as u8);
            for register in registers {
                push_u16_be(&mut frame, *register);
            }
        }
    }

    Ok(append_crc(frame))
}

/// Encode a response ADU.
pub fn encode_response(node: u8, response: &ModbusResponse) -> Result<Vec<u8>> {
    let mut frame = Vec::with_capacity(super::MAX_ADU_LEN);
    frame.push(node);
    frame.push(response.function() as u8);

    match response {
        ModbusResponse::ReadMultipleRegisters { registers } => {
            if registers.is_empty() || registers.len() > MAX_READ_REGISTERS as usize {
                return Err(CodecError::bounds("num_registers", registers.len() as u32));
            }
            frame.push((registers.len() * 2) as u8);
            for register in registers {
                push_u16_be(&mut frame, *register);
            }
        }
        ModbusResponse::WriteSingleRegister {
            register_address,
            data,
        } => {
            push_u16_be(&mut frame, *register_address);
            push_u16_be(&mut frame, *data);
        }
        ModbusResponse::WriteMultipleRegisters {
            starting_address,
            num_registers,
        } => {
            push_u16_be(&mut frame, *starting_address);
            push_u16_be(&mut frame, *num_registers);
        }
    }

    Ok(append_crc(frame))
}

/// Encode an exception response for a request function code.
pub fn encode_exception(node: u8, function: u8, exception_code: u8) -> Vec<u8> {
    let frame = vec![node, function | EXCEPTION_BIT, exception_code];
    append_crc(frame)
}

/// Detect an exception frame: node, flagged function code, exception code,
/// CRC. Returns (node, original function code, exception code).
pub fn decode_exception(frame: &[u8]) -> Option<(u8, u8, u8)> {
    if frame.len() < EXCEPTION_FRAME_LEN {
        return None;
    }
    let frame = &frame[..EXCEPTION_FRAME_LEN];
    if frame[1] & EXCEPTION_BIT == 0 || !valid_crc(frame) {
        return None;
    }
    Some((frame[0], frame[1] & !EXCEPTION_BIT, frame[2]))
}

/// How many bytes the request frame starting at `bytes[0]` occupies.
///
/// Returns `Ok(None)` when more bytes are needed to decide, and an error for
/// a function code or count no request can carry. Used by servers, which
/// cannot predict lengths the way a client can.
pub fn request_frame_len(bytes: &[u8]) -> Result<Option<usize>> {
    if bytes.len() < HEADER_LEN {
        return Ok(None);
    }
    let function = FunctionCode::from_u8(bytes[1])
        .ok_or(CodecError::invalid("function", bytes[1] as u32))?;

    match function {
        FunctionCode::ReadMultipleRegisters | FunctionCode::WriteSingleRegister => {
            Ok(Some(HEADER_AND_CRC_LEN + 4))
        }
        FunctionCode::WriteMultipleRegisters => {
            // Header, address, count, byte-count field.
            if bytes.len() < HEADER_LEN + 5 {
                return Ok(None);
            }
            let num_bytes = bytes[HEADER_LEN + 4] as usize;
            if num_bytes < 2 || num_bytes > 2 * MAX_WRITE_REGISTERS as usize || num_bytes % 2 != 0 {
                return Err(CodecError::bounds("num_bytes", num_bytes as u32));
            }
            Ok(Some(HEADER_AND_CRC_LEN + 5 + num_bytes))
        }
    }
}

/// Decode a complete request frame (as sized by [`request_frame_len`]).
/// Validates the CRC and the write byte-count consistency.
pub fn decode_request(frame: &[u8]) -> Result<(u8, ModbusRequest)> {
    if frame.len() < HEADER_AND_CRC_LEN {
        return Err(CodecError::Truncated {
            needed: HEADER_AND_CRC_LEN,
            available: frame.len(),
        });
    }
    if !valid_crc(frame) {
        let provided = u16::from_le_bytes([frame[frame.len() - 2], frame[frame.len() - 1]]);
        let calculated = crc16(&frame[..frame.len() - CRC_LEN]);
        debug!(provided, calculated, "request crc mismatch");
        return Err(CodecError::CrcMismatch {
            provided: provided as u32,
            calculated: calculated as u32,
        });
    }

    let node = frame[0];
    let function =
        FunctionCode::from_u8(frame[1]).ok_or(CodecError::invalid("function", frame[1] as u32))?;
    let body = &frame[HEADER_LEN..frame.len() - CRC_LEN];

    let request = match function {
        FunctionCode::ReadMultipleRegisters => {
            let request = ModbusRequest::ReadMultipleRegisters {
                starting_address: u16_be_at(body, 0),
                num_registers: u16_be_at(body, 2),
            };
            if request.out_of_bounds() {
                return Err(CodecError::bounds("num_registers", u16_be_at(body, 2) as u32));
            }
            request
        }
        FunctionCode::WriteSingleRegister => ModbusRequest::WriteSingleRegister {
            register_address: u16_be_at(body, 0),
            data: u16_be_at(body, 2),
        },
        FunctionCode::WriteMultipleRegisters => {
            let num_registers = u16_be_at(body, 2) as usize;
            let num_bytes = body[4] as usize;
            if num_registers == 0
                || num_registers > MAX_WRITE_REGISTERS as usize
                || num_bytes != 2 * num_registers
            {
                return Err(CodecError::bounds("num_registers", num_registers as u32));
            }
            let payload = &body[5..];
            if payload.len() != num_bytes {
                return Err(CodecError::Truncated {
                    needed: num_bytes,
                    available: payload.len(),
                });
            }
            ModbusRequest::WriteMultipleRegisters {
                starting_address: u16_be_at(body, 0),
                registers: (0..num_registers).map(|i| u16_be_at(payload, i * 2)).collect(),
            }
        }
    };

    Ok((node, request))
}

/// Decode a complete, CRC-valid response frame of exactly the predicted
/// length. Node and function matching against the request is the caller's
/// responsibility; structure and bounds are validated here.
pub fn decode_response(frame: &[u8], request: &ModbusRequest) -> Result<ModbusResponse> {
    let expected = expected_response_len(request);
    if frame.len() != expected {
        return Err(CodecError::Truncated {
            needed: expected,
            available: frame.len(),
        });
    }
    let body = &frame[HEADER_LEN..frame.len() - CRC_LEN];

    match request.function() {
        FunctionCode::ReadMultipleRegisters => {
            let num_bytes = body[0] as usize;
            if num_bytes < 2 || num_bytes > 2 * MAX_READ_REGISTERS as usize || num_bytes % 2 != 0 {
                return Err(CodecError::bounds("num_bytes", num_bytes as u32));
            }
            if num_bytes != body.len() - 1 {
                return Err(CodecError::bounds("num_bytes", num_bytes as u32));
            }
            let payload = &body[1..];
            Ok(ModbusResponse::ReadMultipleRegisters {
                registers: (0..num_bytes / 2).map(|i| u16_be_at(payload, i * 2)).collect(),
            })
        }
        FunctionCode::WriteSingleRegister => Ok(ModbusResponse::WriteSingleRegister {
            register_address: u16_be_at(body, 0),
            data: u16_be_at(body, 2),
        }),
        FunctionCode::WriteMultipleRegisters => Ok(ModbusResponse::WriteMultipleRegisters {
            starting_address: u16_be_at(body, 0),
            num_registers: u16_be_at(body, 2),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Write-multiple sample from the GS3 drive manual, page 5-68: write
    // registers 0x2000..0x2001 on node 1 with values 0x0002, 0x0258.
    const MANUAL_WRITE_FRAME: [u8; 13] = [
        0x01, 0x10, 0x20, 0x00, 0x00, 0x02, 0x04, 0x00, 0x02, 0x02, 0x58, 0xCB, 0x34,
    ];

    fn manual_write_request() -> ModbusRequest {
        ModbusRequest::WriteMultipleRegisters {
            starting_address: 0x2000,
            registers: vec![0x0002, 0x0258],
        }
    }

    #[test]
    fn write_multiple_request_matches_manual_sample() {
        let frame = encode_request(1, &manual_write_request()).unwrap();
        assert_eq!(frame, MANUAL_WRITE_FRAME);
        assert!(valid_crc(&frame));
    }

    #[test]
    fn request_decode_is_the_inverse_of_encode() {
        let requests = [
            ModbusRequest::ReadMultipleRegisters {
                starting_address: 0x2100,
                num_registers: 8,
            },
            ModbusRequest::WriteSingleRegister {
                register_address: 0x091A,
                data: 100,
            },
            manual_write_request(),
        ];

        for request in requests {
            let frame = encode_request(2, &request).unwrap();
            let frame_len = request_frame_len(&frame).unwrap().unwrap();
            assert_eq!(frame_len, frame.len());
            let (node, decoded) = decode_request(&frame).unwrap();
            assert_eq!(node, 2);
            assert_eq!(decoded, request);
        }
    }

    #[test]
    fn response_decode_is_the_inverse_of_encode() {
        let pairs = [
            (
                ModbusRequest::ReadMultipleRegisters {
                    starting_address: 0x2100,
                    num_registers: 3,
                },
                ModbusResponse::ReadMultipleRegisters {
                    registers: vec![0x0001, 0xFFFF, 0x1234],
                },
            ),
            (
                ModbusRequest::WriteSingleRegister {
                    register_address: 0x091A,
                    data: 100,
                },
                ModbusResponse::WriteSingleRegister {
                    register_address: 0x091A,
                    data: 100,
                },
            ),
            (
                manual_write_request(),
                ModbusResponse::WriteMultipleRegisters {
                    starting_address: 0x2000,
                    num_registers: 2,
                },
            ),
        ];

        for (request, response) in pairs {
            let frame = encode_response(1, &response).unwrap();
            assert_eq!(frame.len(), expected_response_len(&request));
            assert!(valid_crc(&frame));
            assert_eq!(decode_response(&frame, &request).unwrap(), response);
        }
    }

    #[test]
    fn exception_frames_round_trip() {
        let frame = encode_exception(1, 0x03, super::super::exception::ILLEGAL_DATA_ADDRESS);
        assert_eq!(frame.len(), EXCEPTION_FRAME_LEN);
        assert_eq!(decode_exception(&frame), Some((1, 0x03, 0x02)));

        // Normal responses are not exceptions.
        let normal = encode_response(
            1,
            &ModbusResponse::WriteSingleRegister {
                register_address: 0,
                data: 0,
            },
        )
        .unwrap();
        assert_eq!(decode_exception(&normal), None);

        // A flipped bit breaks the exception CRC.
        let mut corrupt = encode_exception(1, 0x03, 0x02);
        corrupt[2] ^= 0x10;
        assert_eq!(decode_exception(&corrupt), None);
    }

    #[test]
    fn bounds_violations_refuse_to_encode() {
        let too_many = ModbusRequest::WriteMultipleRegisters {
            starting_address: 0,
            registers: vec![0; 124],
        };
        assert!(encode_request(1, &too_many).is_err());

        let zero_read = ModbusRequest::ReadMultipleRegisters {
            starting_address: 0,
            num_registers: 0,
        };
        assert!(encode_request(1, &zero_read).is_err());
    }

    #[test]
    fn read_response_with_odd_byte_count_is_malformed() {
        let request = ModbusRequest::ReadMultipleRegisters {
            starting_address: 0,
            num_registers: 1,
        };
        let mut frame = encode_response(
            1,
            &ModbusResponse::ReadMultipleRegisters {
                registers: vec![7],
            },
        )
        .unwrap();
        frame[2] = 3; // byte count no read can produce
        assert!(decode_response(&frame, &request).is_err());
    }

    #[test]
    fn server_side_framing_waits_for_the_byte_count() {
        let frame = encode_request(1, &manual_write_request()).unwrap();
        assert_eq!(request_frame_len(&frame[..4]).unwrap(), None);
        assert_eq!(request_frame_len(&frame).unwrap(), Some(frame.len()));
        assert!(request_frame_len(&[0x01, 0x55]).is_err());
    }

    #[test]
    fn corrupted_request_crc_is_rejected() {
        let mut frame = encode_request(1, &manual_write_request()).unwrap();
        frame[5] ^= 0x01;
        assert!(matches!(
            decode_request(&frame),
            Err(CodecError::CrcMismatch { .. })
        ));
    }
}
