use crate::error::ProtocolError;
use crate::value::Value;

use super::framing::{encode_frame, FRAME_DELIMITER};

pub const OP_HELLO: u8 = b'h';
pub const OP_RESET: u8 = b'r';
pub const OP_BEGIN_EXEC: u8 = b'x';
pub const OP_WRITE_MEM: u8 = b'w';

/// Reply opcodes that have no command counterpart
pub const REPLY_ERROR: u8 = b'e';
pub const REPLY_COMPLETED: u8 = b'c';

/// Capacity of the command buffer
pub const COMMAND_BUFFER_SIZE: usize = 32;

pub const BEGIN_EXEC_SIZE: usize = 3;
pub const WRITE_MEM_HEADER_SIZE: usize = 6;

/// A decoded debugger command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Hello,
    Reset,
    BeginExec { func: u8, nargs: u8 },
    WriteMem { segment: u8, offset: u16, nbytes: u16 },
}

impl Command {
    /// Whether `op` starts a known command
    pub fn is_known(op: u8) -> bool {
        matches!(op, OP_HELLO | OP_RESET | OP_BEGIN_EXEC | OP_WRITE_MEM)
    }

    /// Decode a complete frame body; `None` if the length does not match the command
    pub fn parse(body: &[u8]) -> Option<Command> {
        match *body {
            [OP_HELLO] => Some(Command::Hello),
            [OP_RESET] => Some(Command::Reset),
            [OP_BEGIN_EXEC, func, nargs] => Some(Command::BeginExec { func, nargs }),
            [OP_WRITE_MEM, segment, o0, o1, n0, n1] => Some(Command::WriteMem {
                segment,
                offset: u16::from_le_bytes([o0, o1]),
                nbytes: u16::from_le_bytes([n0, n1]),
            }),
            _ => None,
        }
    }

    pub fn opcode(&self) -> u8 {
        match self {
            Command::Hello => OP_HELLO,
            Command::Reset => OP_RESET,
            Command::BeginExec { .. } => OP_BEGIN_EXEC,
            Command::WriteMem { .. } => OP_WRITE_MEM,
        }
    }

    /// Encode as a frame, as a debugger would send it
    pub fn encode(&self) -> Vec<u8> {
        let body = match *self {
            Command::Hello | Command::Reset => vec![self.opcode()],
            Command::BeginExec { func, nargs } => vec![OP_BEGIN_EXEC, func, nargs],
            Command::WriteMem {
                segment,
                offset,
                nbytes,
            } => {
                let mut body = vec![OP_WRITE_MEM, segment];
                body.extend_from_slice(&offset.to_le_bytes());
                body.extend_from_slice(&nbytes.to_le_bytes());
                body
            }
        };
        encode_frame(&body)
    }
}

/// `7E 'h' 'S' 'T' 'A' 'K' 7E`
pub fn hello_reply() -> Vec<u8> {
    encode_frame(&[OP_HELLO, b'S', b'T', b'A', b'K'])
}

/// Short acknowledgement: the command opcode followed by a delimiter
pub fn ack(op: u8) -> Vec<u8> {
    vec![op, FRAME_DELIMITER]
}

pub fn error_reply(op: u8, error: &ProtocolError) -> Vec<u8> {
    encode_frame(&[REPLY_ERROR, op, error.code()])
}

/// Return values of the entry function, reported when a debugged program finishes
pub fn completion_reply(results: &[Value]) -> Vec<u8> {
    let mut body = Vec::with_capacity(2 + results.len() * 2);
    body.push(REPLY_COMPLETED);
    body.push(results.len() as u8);
    for value in results {
        body.extend_from_slice(&value.to_le_bytes());
    }
    encode_frame(&body)
}
