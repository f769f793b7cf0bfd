//! Typed Modbus requests and responses

use super::{HEADER_AND_CRC_LEN, MAX_READ_REGISTERS, MAX_WRITE_REGISTERS};

/// The function codes in use on the drive bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum FunctionCode {
    ReadMultipleRegisters = 0x03,
    WriteSingleRegister = 0x06,
    WriteMultipleRegisters = 0x10,
}

impl FunctionCode {
    pub fn from_u8(value: u8) -> Option<Self> {
        Some(match value {
            0x03 => FunctionCode::ReadMultipleRegisters,
            0x06 => FunctionCode::WriteSingleRegister,
            0x10 => FunctionCode::WriteMultipleRegisters,
            _ => return None,
        })
    }
}

/// A request PDU, before node addressing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModbusRequest {
    ReadMultipleRegisters {
        starting_address: u16,
        /// 1 to 125
        num_registers: u16,
    },
    WriteSingleRegister {
        register_address: u16,
        data: u16,
    },
    WriteMultipleRegisters {
        starting_address: u16,
        /// 1 to 123 registers
        registers: Vec<u16>,
    },
}

impl ModbusRequest {
    pub fn function(&self) -> FunctionCode {
        match self {
            ModbusRequest::ReadMultipleRegisters { .. } => FunctionCode::ReadMultipleRegisters,
            ModbusRequest::WriteSingleRegister { .. } => FunctionCode::WriteSingleRegister,
            ModbusRequest::WriteMultipleRegisters { .. } => FunctionCode::WriteMultipleRegisters,
        }
    }

    /// True if the request violates register-count bounds.
    pub fn out_of_bounds(&self) -> bool {
        match self {
            ModbusRequest::ReadMultipleRegisters { num_registers, .. } => {
                *num_registers == 0 || *num_registers > MAX_READ_REGISTERS
            }
            ModbusRequest::WriteSingleRegister { .. } => false,
            ModbusRequest::WriteMultipleRegisters { registers, .. } => {
                registers.is_empty() || registers.len() > MAX_WRITE_REGISTERS as usize
            }
        }
    }
}

/// A response PDU, before node addressing. Exception responses are detected
/// separately since they can follow any request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModbusResponse {
    ReadMultipleRegisters {
        registers: Vec<u16>,
    },
    WriteSingleRegister {
        register_address: u16,
        data: u16,
    },
    WriteMultipleRegisters {
        starting_address: u16,
        num_registers: u16,
    },
}

impl ModbusResponse {
    pub fn function(&self) -> FunctionCode {
        match self {
            ModbusResponse::ReadMultipleRegisters { .. } => FunctionCode::ReadMultipleRegisters,
            ModbusResponse::WriteSingleRegister { .. } => FunctionCode::WriteSingleRegister,
            ModbusResponse::WriteMultipleRegisters { .. } => FunctionCode::WriteMultipleRegisters,
        }
    }
}

/// Predict the response frame length for a request, CRC included. Knowing
/// this ahead of transmission sizes the read deadline and tells the receive
/// loop when to stop waiting.
pub fn expected_response_len(request: &ModbusRequest) -> usize {
    match request {
        ModbusRequest::ReadMultipleRegisters { num_registers, .. } => {
            // Byte-count field plus two bytes per register.
            HEADER_AND_CRC_LEN + 1 + 2 * *num_registers as usize
        }
        ModbusRequest::WriteSingleRegister { .. } => HEADER_AND_CRC_LEN + 4,
        ModbusRequest::WriteMultipleRegisters { .. } => HEADER_AND_CRC_LEN + 4,
    }
}
