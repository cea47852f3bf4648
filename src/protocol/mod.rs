//! Remote debug protocol
//!
//! Two nested state machines consume the transport one byte at a time: the
//! framing layer removes byte-stuffing, the command layer below collects command
//! bytes, applies them to the module and thread, and produces replies.
//!
//! | Command | Body | Effect | Reply |
//! |---|---|---|---|
//! | `h` HELLO | `h` | none | `7E h S T A K 7E` |
//! | `r` RESET | `r` | thread terminated | `r 7E` |
//! | `x` BEGIN_EXEC | `x func nargs` | thread executing at `func`; `nargs` must equal the function's `argc` | `x 7E` |
//! | `w` WRITE_MEM | `w segment offset:u16 nbytes:u16 data...` | copy `data` into the segment | `w 7E` at end-of-frame |
//!
//! A rejected command is answered with `7E e <op> <code> 7E` (see
//! [`ProtocolError::code`](crate::error::ProtocolError::code)). BEGIN_EXEC with an
//! `nargs` different from the target's `argc` is rejected with code 5 and leaves
//! the thread untouched; debuggers must send the exact argument count.

pub mod command;
pub mod framing;

use std::io;

use tracing::{debug, warn};

use crate::error::ProtocolError;
use crate::module::{Module, Segment};
use crate::thread::Thread;
use crate::transport::Transport;
use crate::value::Value;

use command::{
    ack, completion_reply, error_reply, hello_reply, Command, COMMAND_BUFFER_SIZE, OP_WRITE_MEM,
    WRITE_MEM_HEADER_SIZE,
};
use framing::{FrameDecoder, FrameEvent};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CommandState {
    Idle,
    Receiving,
    WritingMemory {
        segment: Segment,
        cursor: usize,
        end: usize,
        nbytes: usize,
        excess: usize,
    },
    /// Rest of the frame is dropped; an error reply goes out at end-of-frame
    Rejected { op: u8, error: ProtocolError },
    /// Rest of the frame is dropped silently
    Discarding,
}

/// Debug protocol state for one VM
pub struct DebugSession {
    decoder: FrameDecoder,
    state: CommandState,
    buf: [u8; COMMAND_BUFFER_SIZE],
    buf_used: usize,
}

impl DebugSession {
    pub fn new() -> Self {
        DebugSession {
            decoder: FrameDecoder::new(),
            state: CommandState::Idle,
            buf: [0; COMMAND_BUFFER_SIZE],
            buf_used: 0,
        }
    }

    /// Feed every byte the transport has available right now
    ///
    /// Returns the number of bytes consumed. Only a failed reply send is an error;
    /// malformed input is handled by the state machines.
    pub fn poll<T: Transport + ?Sized>(
        &mut self,
        transport: &mut T,
        module: &mut Module,
        thread: &mut Thread,
    ) -> io::Result<usize> {
        let mut consumed = 0;
        while let Some(byte) = transport.poll_byte() {
            consumed += 1;
            if let Some(reply) = self.feed(byte, module, thread) {
                transport.send(&reply)?;
            }
        }
        Ok(consumed)
    }

    /// Report the return values of a finished program to the debugger
    pub fn report_completion<T: Transport + ?Sized>(
        &mut self,
        transport: &mut T,
        results: &[Value],
    ) -> io::Result<()> {
        debug!(retc = results.len(), "reporting completion");
        transport.send(&completion_reply(results))
    }

    /// Process one received byte, returning the reply to send, if any
    pub fn feed(&mut self, byte: u8, module: &mut Module, thread: &mut Thread) -> Option<Vec<u8>> {
        match self.decoder.push(byte) {
            FrameEvent::None => None,
            FrameEvent::Byte(b) => self.on_byte(b, module),
            FrameEvent::EndOfFrame => self.on_end_of_frame(module, thread),
            FrameEvent::Aborted => {
                if self.state != CommandState::Idle {
                    warn!("frame aborted by escaped delimiter");
                }
                self.state = CommandState::Idle;
                None
            }
        }
    }

    fn on_byte(&mut self, byte: u8, module: &mut Module) -> Option<Vec<u8>> {
        match self.state {
            CommandState::Idle => {
                if Command::is_known(byte) {
                    self.buf[0] = byte;
                    self.buf_used = 1;
                    self.state = CommandState::Receiving;
                } else {
                    debug!(op = byte, "unrecognized command, discarding frame");
                    self.state = CommandState::Discarding;
                }
            }

            CommandState::Receiving => {
                if self.buf_used >= COMMAND_BUFFER_SIZE {
                    warn!(size = COMMAND_BUFFER_SIZE, "command buffer overflow");
                    self.decoder.reset();
                    self.state = CommandState::Idle;
                    self.buf_used = 0;
                    return None;
                }

                self.buf[self.buf_used] = byte;
                self.buf_used += 1;

                if self.buf[0] == OP_WRITE_MEM && self.buf_used == WRITE_MEM_HEADER_SIZE {
                    self.begin_write(module);
                }
            }

            CommandState::WritingMemory {
                segment,
                cursor,
                end,
                nbytes,
                excess,
            } => {
                if cursor < end {
                    match module.segment_mut(segment, cursor, 1) {
                        Ok(slot) => slot[0] = byte,
                        Err(error) => {
                            self.state = CommandState::Rejected {
                                op: OP_WRITE_MEM,
                                error,
                            };
                            return None;
                        }
                    }
                    self.state = CommandState::WritingMemory {
                        segment,
                        cursor: cursor + 1,
                        end,
                        nbytes,
                        excess,
                    };
                } else {
                    self.state = CommandState::WritingMemory {
                        segment,
                        cursor,
                        end,
                        nbytes,
                        excess: excess + 1,
                    };
                }
            }

            CommandState::Rejected { .. } | CommandState::Discarding => {}
        }

        None
    }

    /// Resolve the WRITE_MEM target once its header is complete
    fn begin_write(&mut self, module: &mut Module) {
        let Some(Command::WriteMem {
            segment,
            offset,
            nbytes,
        }) = Command::parse(&self.buf[..self.buf_used])
        else {
            self.state = CommandState::Discarding;
            return;
        };

        let (offset, nbytes) = (offset as usize, nbytes as usize);
        debug!(segment, offset, nbytes, "WRITE_MEM");

        let target = Segment::from_u8(segment)
            .and_then(|segment| module.segment_mut(segment, offset, nbytes).map(|_| segment));

        self.state = match target {
            Ok(segment) => CommandState::WritingMemory {
                segment,
                cursor: offset,
                end: offset + nbytes,
                nbytes,
                excess: 0,
            },
            Err(error) => {
                warn!(%error, "WRITE_MEM rejected");
                CommandState::Rejected {
                    op: OP_WRITE_MEM,
                    error,
                }
            }
        };
    }

    fn on_end_of_frame(&mut self, module: &mut Module, thread: &mut Thread) -> Option<Vec<u8>> {
        let state = std::mem::replace(&mut self.state, CommandState::Idle);

        match state {
            CommandState::Idle | CommandState::Discarding => None,

            CommandState::Receiving => self.dispatch(module, thread),

            CommandState::WritingMemory {
                cursor, nbytes, excess, ..
            } => {
                if excess > 0 {
                    let error = ProtocolError::PayloadTooLong(nbytes);
                    warn!(%error, excess, "WRITE_MEM payload truncated");
                    return Some(error_reply(OP_WRITE_MEM, &error));
                }
                debug!(end = cursor, "WRITE_MEM done");
                Some(ack(OP_WRITE_MEM))
            }

            CommandState::Rejected { op, error } => Some(error_reply(op, &error)),
        }
    }

    fn dispatch(&self, module: &mut Module, thread: &mut Thread) -> Option<Vec<u8>> {
        let body = &self.buf[..self.buf_used];
        let Some(command) = Command::parse(body) else {
            debug!(op = body[0], len = body.len(), "unrecognized command");
            return None;
        };

        match command {
            Command::Hello => {
                debug!("HELLO");
                Some(hello_reply())
            }
            Command::Reset => {
                debug!("RESET");
                thread.reset();
                Some(ack(command.opcode()))
            }
            Command::BeginExec { func, nargs } => {
                debug!(func, nargs, "BEGIN_EXEC");
                match begin_exec(module, thread, func as usize, nargs as usize) {
                    Ok(()) => Some(ack(command.opcode())),
                    Err(error) => {
                        warn!(%error, "BEGIN_EXEC rejected");
                        Some(error_reply(command.opcode(), &error))
                    }
                }
            }
            // a header without payload ends in WritingMemory, never here
            Command::WriteMem { .. } => None,
        }
    }
}

impl Default for DebugSession {
    fn default() -> Self {
        Self::new()
    }
}

/// Position the thread at `func`; `nargs` must match its declared `argc`
fn begin_exec(
    module: &Module,
    thread: &mut Thread,
    func: usize,
    nargs: usize,
) -> Result<(), ProtocolError> {
    let record = module.func(func).ok_or(ProtocolError::UnknownFunction(func))?;
    if record.argc as usize != nargs {
        return Err(ProtocolError::ArgumentCount {
            func,
            expected: record.argc as usize,
            provided: nargs,
        });
    }
    thread.enter(module, func)
}
