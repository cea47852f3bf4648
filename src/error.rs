//! Error types for the VM, the module loader and the debug protocol

use std::fmt;

use thiserror::Error;

/// Result type for engine operations
pub type VmResult<T> = Result<T, VmError>;

/// A fixed-capacity resource the engine can run out of
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resource {
    OperandStack,
    CallFrames,
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Resource::OperandStack => write!(f, "operand stack"),
            Resource::CallFrames => write!(f, "call-frame stack"),
        }
    }
}

/// What went wrong while executing an instruction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum VmErrorKind {
    #[error("pc overflow")]
    PcOverflow,

    #[error("unknown opcode 0x{0:02x}")]
    UnknownOpcode(u8),

    #[error("function {func} expects {expected} argument(s), call site provides {provided}")]
    ArityMismatch {
        func: usize,
        expected: usize,
        provided: usize,
    },

    #[error("unknown function {0}")]
    UnknownFunction(usize),

    #[error("stack underflow")]
    StackUnderflow,

    #[error("{resource} exhausted (attempted depth {attempted}, capacity {capacity})")]
    ResourceExhausted {
        resource: Resource,
        attempted: usize,
        capacity: usize,
    },

    #[error("local {index} outside frame of {frame_size} slot(s)")]
    LocalOutOfRange { index: usize, frame_size: usize },

    #[error("global {index} out of range ({count} global(s))")]
    GlobalOutOfRange { index: usize, count: usize },

    #[error("jump target {0} outside bytecode")]
    JumpOutOfRange(isize),

    #[error("division by zero")]
    DivisionByZero,

    #[error("thread has no active function")]
    NoActiveFunction,
}

/// Fatal program error with diagnostic payload
///
/// `pc` is the address of the faulting opcode and `sp` the stack depth before it
/// ran; the instruction has not been partially applied.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind} at pc {pc:#06x} (opcode {}, sp {sp})", opcode_label(.opcode))]
pub struct VmError {
    pub kind: VmErrorKind,
    pub pc: usize,
    pub opcode: Option<u8>,
    pub sp: usize,
}

fn opcode_label(opcode: &Option<u8>) -> String {
    match opcode {
        Some(op) => format!("0x{:02x}", op),
        None => "-".to_string(),
    }
}

/// Errors raised while loading a module image
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to read module: {0}")]
    Io(#[from] std::io::Error),

    #[error("module truncated in {section}: need {expected} bytes, have {actual}")]
    Truncated {
        section: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("main function {main} out of range ({count} function(s))")]
    MainOutOfRange { main: usize, count: usize },

    #[error("function {func} starts at {offset}, past the end of bytecode ({length} bytes)")]
    FunctionOutOfBounds {
        func: usize,
        offset: usize,
        length: usize,
    },
}

/// Debug protocol command failures, reported back to the debugger in an error reply
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ProtocolError {
    #[error("invalid memory segment {0}")]
    InvalidSegment(u8),

    #[error("write of {len} byte(s) at offset {offset} exceeds segment of {capacity} byte(s)")]
    OutOfBounds {
        offset: usize,
        len: usize,
        capacity: usize,
    },

    #[error("write payload longer than the announced {0} byte(s)")]
    PayloadTooLong(usize),

    #[error("unknown function {0}")]
    UnknownFunction(usize),

    #[error("function {func} takes {expected} argument(s), got {provided}")]
    ArgumentCount {
        func: usize,
        expected: usize,
        provided: usize,
    },
}

impl ProtocolError {
    /// Wire code carried in the error reply
    pub fn code(&self) -> u8 {
        match self {
            ProtocolError::InvalidSegment(_) => 1,
            ProtocolError::OutOfBounds { .. } => 2,
            ProtocolError::PayloadTooLong(_) => 3,
            ProtocolError::UnknownFunction(_) => 4,
            ProtocolError::ArgumentCount { .. } => 5,
        }
    }
}
