use std::path::Path;

use crate::error::{LoadError, ProtocolError};
use crate::value::Value;

/// Size of an encoded function record in the function-table segment
pub const FUNC_RECORD_SIZE: usize = 4;

/// Size of the module file header
pub const HEADER_SIZE: usize = 8;

/// Backing storage of a module that is filled in by the debugger
pub const DEBUG_FUNCTIONS_CAPACITY: usize = 1024;
pub const DEBUG_GLOBALS_CAPACITY: usize = 1024;
pub const DEBUG_BYTECODE_CAPACITY: usize = 16384;

/// Function metadata
///
/// `argc + num_locals` stack slots belong to an activation: the arguments occupy
/// the low slots, locals the rest.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Func {
    pub argc: u8,
    pub num_locals: u8,
    pub bytecode_offset: u16,
}

impl Func {
    /// Number of operand-stack slots owned by an activation of this function
    pub fn frame_size(&self) -> usize {
        self.argc as usize + self.num_locals as usize
    }

    fn decode(record: &[u8]) -> Self {
        Func {
            argc: record[0],
            num_locals: record[1],
            bytecode_offset: u16::from_le_bytes([record[2], record[3]]),
        }
    }

    /// Encode as a function-table record
    pub fn encode(&self) -> [u8; FUNC_RECORD_SIZE] {
        let [lo, hi] = self.bytecode_offset.to_le_bytes();
        [self.argc, self.num_locals, lo, hi]
    }
}

/// One of the byte-addressable regions of a module, as named by the debugger
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Segment {
    Bytecode = 0,
    Functions = 1,
    Globals = 2,
}

impl Segment {
    /// Decode the segment id used on the wire
    pub fn from_u8(id: u8) -> Result<Self, ProtocolError> {
        match id {
            0 => Ok(Segment::Bytecode),
            1 => Ok(Segment::Functions),
            2 => Ok(Segment::Globals),
            other => Err(ProtocolError::InvalidSegment(other)),
        }
    }
}

/// A loaded STAK program image
///
/// The function table and the globals are kept in their encoded byte form so the
/// debugger can patch them by byte offset; typed accessors decode on access.
/// `bytecode_length` is the executable prefix of the bytecode buffer.
#[derive(Debug, Clone)]
pub struct Module {
    functions: Vec<u8>,
    globals: Vec<u8>,
    bytecode: Vec<u8>,
    bytecode_length: usize,
    main: usize,
}

impl Module {
    /// Build a module from its parts
    pub fn new(functions: &[Func], globals: &[Value], bytecode: Vec<u8>, main: usize) -> Self {
        Module {
            functions: functions.iter().flat_map(Func::encode).collect(),
            globals: globals.iter().flat_map(|g| g.to_le_bytes()).collect(),
            bytecode_length: bytecode.len(),
            bytecode,
            main,
        }
    }

    /// An empty module with the fixed backing storage a debugger loads code into
    pub fn with_debug_capacity() -> Self {
        Module {
            functions: vec![0; DEBUG_FUNCTIONS_CAPACITY],
            globals: vec![0; DEBUG_GLOBALS_CAPACITY],
            bytecode: vec![0; DEBUG_BYTECODE_CAPACITY],
            bytecode_length: 0,
            main: 0,
        }
    }

    /// Load a module image from a file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, LoadError> {
        let bytes = std::fs::read(path)?;
        Self::from_bytes(&bytes)
    }

    /// Parse a module image
    ///
    /// Layout (little-endian): `bytecode_length: u16, num_functions: u8,
    /// num_globals: u8, main_func_idx: u8, pad[3]`, then the function table,
    /// the initial globals and the bytecode.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, LoadError> {
        let header = take(bytes, 0, HEADER_SIZE, "header")?;
        let bytecode_length = u16::from_le_bytes([header[0], header[1]]) as usize;
        let num_functions = header[2] as usize;
        let num_globals = header[3] as usize;
        let main = header[4] as usize;

        let mut offset = HEADER_SIZE;
        let functions = take(bytes, offset, num_functions * FUNC_RECORD_SIZE, "function table")?;
        offset += functions.len();
        let globals = take(bytes, offset, num_globals * 2, "globals")?;
        offset += globals.len();
        let bytecode = take(bytes, offset, bytecode_length, "bytecode")?;

        if main >= num_functions {
            return Err(LoadError::MainOutOfRange {
                main,
                count: num_functions,
            });
        }

        let module = Module {
            functions: functions.to_vec(),
            globals: globals.to_vec(),
            bytecode: bytecode.to_vec(),
            bytecode_length,
            main,
        };

        for (func, record) in module.functions.chunks_exact(FUNC_RECORD_SIZE).enumerate() {
            let offset = Func::decode(record).bytecode_offset as usize;
            if offset >= bytecode_length {
                return Err(LoadError::FunctionOutOfBounds {
                    func,
                    offset,
                    length: bytecode_length,
                });
            }
        }

        Ok(module)
    }

    /// Serialize back into the file format
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(
            HEADER_SIZE + self.functions.len() + self.globals.len() + self.bytecode_length,
        );
        out.extend_from_slice(&(self.bytecode_length as u16).to_le_bytes());
        out.push(self.num_functions() as u8);
        out.push(self.num_globals() as u8);
        out.push(self.main as u8);
        out.extend_from_slice(&[0; 3]);
        out.extend_from_slice(&self.functions);
        out.extend_from_slice(&self.globals);
        out.extend_from_slice(self.code());
        out
    }

    /// Look up a function record by id
    pub fn func(&self, index: usize) -> Option<Func> {
        let start = index.checked_mul(FUNC_RECORD_SIZE)?;
        self.functions
            .get(start..start.checked_add(FUNC_RECORD_SIZE)?)
            .map(Func::decode)
    }

    /// Number of function records the table can hold
    pub fn num_functions(&self) -> usize {
        self.functions.len() / FUNC_RECORD_SIZE
    }

    /// Designated entry function
    pub fn main(&self) -> usize {
        self.main
    }

    pub fn num_globals(&self) -> usize {
        self.globals.len() / 2
    }

    pub fn global(&self, index: usize) -> Option<Value> {
        let start = index.checked_mul(2)?;
        match self.globals.get(start..start.checked_add(2)?) {
            Some(&[lo, hi]) => Some(Value::from_le_bytes([lo, hi])),
            _ => None,
        }
    }

    /// Overwrite a global; returns false if the index is out of range
    pub fn set_global(&mut self, index: usize, value: Value) -> bool {
        let Some(start) = index.checked_mul(2).filter(|s| *s < usize::MAX - 1) else {
            return false;
        };
        match self.globals.get_mut(start..start + 2) {
            Some(slot) => {
                slot.copy_from_slice(&value.to_le_bytes());
                true
            }
            None => false,
        }
    }

    /// The executable bytecode, `bytecode[..bytecode_length]`
    pub fn code(&self) -> &[u8] {
        &self.bytecode[..self.bytecode_length]
    }

    pub fn bytecode_length(&self) -> usize {
        self.bytecode_length
    }

    /// Resolve a bounds-checked write window into one of the segments
    ///
    /// Writing into the bytecode segment past the current length grows
    /// `bytecode_length` to cover the window.
    pub fn segment_mut(
        &mut self,
        segment: Segment,
        offset: usize,
        len: usize,
    ) -> Result<&mut [u8], ProtocolError> {
        let backing = match segment {
            Segment::Bytecode => &mut self.bytecode,
            Segment::Functions => &mut self.functions,
            Segment::Globals => &mut self.globals,
        };

        let capacity = backing.len();
        let end = offset
            .checked_add(len)
            .filter(|end| *end <= capacity)
            .ok_or(ProtocolError::OutOfBounds {
                offset,
                len,
                capacity,
            })?;

        if segment == Segment::Bytecode && self.bytecode_length < end {
            self.bytecode_length = end;
        }

        let backing = match segment {
            Segment::Bytecode => &mut self.bytecode,
            Segment::Functions => &mut self.functions,
            Segment::Globals => &mut self.globals,
        };
        Ok(&mut backing[offset..end])
    }
}

fn take<'a>(
    bytes: &'a [u8],
    offset: usize,
    len: usize,
    section: &'static str,
) -> Result<&'a [u8], LoadError> {
    bytes
        .get(offset..offset + len)
        .ok_or(LoadError::Truncated {
            section,
            expected: len,
            actual: bytes.len().saturating_sub(offset),
        })
}
