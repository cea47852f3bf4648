//! Byte-stuffed framing of the debug stream
//!
//! Frames are delimited by `0x7E`. Inside a frame `0x7D` escapes the next byte,
//! which is XORed with `0x20`.

pub const FRAME_DELIMITER: u8 = 0x7E;
pub const ESCAPE_MARKER: u8 = 0x7D;
pub const ESCAPE_XOR: u8 = 0x20;

/// What the framing layer produced for one input byte
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameEvent {
    /// Consumed without output (delimiter search, escape marker)
    None,
    /// One de-stuffed payload byte
    Byte(u8),
    EndOfFrame,
    /// Delimiter received right after an escape marker
    Aborted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FrameState {
    Idle,
    InFrame,
    Escaped,
}

/// Incremental frame decoder, one byte at a time
///
/// A delimiter both ends a frame and opens the next one, so after the first
/// delimiter the decoder never returns to delimiter search until `reset`.
#[derive(Debug)]
pub struct FrameDecoder {
    state: FrameState,
}

impl FrameDecoder {
    pub fn new() -> Self {
        FrameDecoder {
            state: FrameState::Idle,
        }
    }

    /// Go back to searching for a delimiter
    pub fn reset(&mut self) {
        self.state = FrameState::Idle;
    }

    pub fn push(&mut self, byte: u8) -> FrameEvent {
        match self.state {
            FrameState::Idle => {
                if byte == FRAME_DELIMITER {
                    self.state = FrameState::InFrame;
                }
                FrameEvent::None
            }
            FrameState::InFrame => match byte {
                ESCAPE_MARKER => {
                    self.state = FrameState::Escaped;
                    FrameEvent::None
                }
                FRAME_DELIMITER => FrameEvent::EndOfFrame,
                _ => FrameEvent::Byte(byte),
            },
            FrameState::Escaped => {
                self.state = FrameState::InFrame;
                if byte == FRAME_DELIMITER {
                    FrameEvent::Aborted
                } else {
                    FrameEvent::Byte(byte ^ ESCAPE_XOR)
                }
            }
        }
    }
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new()
    }
}

/// Wrap `payload` in delimiters, escaping reserved bytes
pub fn encode_frame(payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(payload.len() + 2);
    out.push(FRAME_DELIMITER);
    for &byte in payload {
        if byte == FRAME_DELIMITER || byte == ESCAPE_MARKER {
            out.push(ESCAPE_MARKER);
            out.push(byte ^ ESCAPE_XOR);
        } else {
            out.push(byte);
        }
    }
    out.push(FRAME_DELIMITER);
    out
}
