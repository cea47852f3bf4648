//! Bytecode instruction set for the STAK VM
//!
//! This is a stack-based VM with calls, multi-value returns and relative jumps.
//! Core opcodes live below 0x80; every byte from 0x80 upwards names a built-in
//! (see `builtins`), so the built-in id *is* the opcode.

use crate::error::VmErrorKind;
use crate::value::{from_le, Value};

/// First opcode byte reserved for built-ins
pub const BUILTIN_BASE: u8 = 0x80;

/// Opcodes are single bytes (u8) for compact representation
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Opcode {
    // Stack operations
    /// Push an inline literal
    /// Operand: i16 (little-endian immediate)
    PushConst = 0x00,

    /// Push 0
    Zero = 0x01,

    /// Pop top value from stack and discard
    Drop = 0x02,

    // Variable operations
    /// Operand: u8 (global index)
    GetGlobal = 0x03,
    /// Operand: u8 (global index)
    SetGlobal = 0x04,
    /// Operand: u8 (slot relative to the frame pointer)
    GetLocal = 0x05,
    /// Operand: u8 (slot relative to the frame pointer)
    SetLocal = 0x06,

    // Function calls
    /// Call a bytecode function; its arguments are already on the stack
    /// Operand: u8 (function id)
    CallFunc = 0x0A,

    /// Return from the current function
    /// Operand: u8 (number of values returned)
    Ret = 0x0D,

    // Control flow
    /// Operand: i16 (displacement relative to the next instruction)
    Jmp = 0x14,

    /// Pop; branch if zero
    /// Operand: i16 (displacement relative to the next instruction)
    Jz = 0x15,
}

impl Opcode {
    /// Try to parse a u8 into a core Opcode
    pub fn from_u8(byte: u8) -> Result<Self, VmErrorKind> {
        match byte {
            0x00 => Ok(Opcode::PushConst),
            0x01 => Ok(Opcode::Zero),
            0x02 => Ok(Opcode::Drop),
            0x03 => Ok(Opcode::GetGlobal),
            0x04 => Ok(Opcode::SetGlobal),
            0x05 => Ok(Opcode::GetLocal),
            0x06 => Ok(Opcode::SetLocal),
            0x0A => Ok(Opcode::CallFunc),
            0x0D => Ok(Opcode::Ret),
            0x14 => Ok(Opcode::Jmp),
            0x15 => Ok(Opcode::Jz),
            _ => Err(VmErrorKind::UnknownOpcode(byte)),
        }
    }

    /// Returns the number of operand bytes this opcode requires
    pub fn operand_size(&self) -> usize {
        match self {
            Opcode::PushConst | Opcode::Jmp | Opcode::Jz => 2,

            Opcode::GetGlobal
            | Opcode::SetGlobal
            | Opcode::GetLocal
            | Opcode::SetLocal
            | Opcode::CallFunc
            | Opcode::Ret => 1,

            Opcode::Zero | Opcode::Drop => 0,
        }
    }

    /// Assembler mnemonic, as printed by the disassembler and the instruction trace
    pub fn mnemonic(&self) -> &'static str {
        match self {
            Opcode::PushConst => "pushconst",
            Opcode::Zero => "zero",
            Opcode::Drop => "drop",
            Opcode::GetGlobal => "getglobal",
            Opcode::SetGlobal => "setglobal",
            Opcode::GetLocal => "getlocal",
            Opcode::SetLocal => "setlocal",
            Opcode::CallFunc => "call",
            Opcode::Ret => "ret",
            Opcode::Jmp => "jmp",
            Opcode::Jz => "jz",
        }
    }
}

/// Helper to read a u8 operand; `code` is already cut to the valid bytecode length
#[inline]
pub fn read_u8(code: &[u8], offset: usize) -> Result<u8, VmErrorKind> {
    code.get(offset).copied().ok_or(VmErrorKind::PcOverflow)
}

/// Helper to read a little-endian i16 operand
#[inline]
pub fn read_i16(code: &[u8], offset: usize) -> Result<Value, VmErrorKind> {
    match code.get(offset..offset + 2) {
        Some(&[lo, hi]) => Ok(from_le(lo, hi)),
        _ => Err(VmErrorKind::PcOverflow),
    }
}
