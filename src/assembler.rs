//! Bytecode assembler and disassembler
//!
//! The assembler is the programmatic way to build modules (tests, fuzzing seeds,
//! the Python bindings); the disassembler backs `stak --disasm` and trace output.

use crate::builtins;
use crate::module::{Func, Module};
use crate::opcodes::{Opcode, BUILTIN_BASE};
use crate::value::Value;

/// Location of a jump displacement that still has to be patched
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Patch(usize);

/// Builds a module function by function
///
/// Emitters stay chainable; the first operand that does not fit its encoding is
/// recorded and reported by `finish`.
#[derive(Debug, Default)]
pub struct Assembler {
    bytecode: Vec<u8>,
    functions: Vec<Func>,
    globals: Vec<Value>,
    error: Option<String>,
}

impl Assembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a new function at the current position and return its id
    pub fn function(&mut self, argc: u8, num_locals: u8) -> usize {
        let offset = self.bytecode.len();
        let bytecode_offset = self.encode(u16::try_from(offset), || {
            format!("Function starts at offset {} beyond the 16-bit address space", offset)
        });
        self.functions.push(Func {
            argc,
            num_locals,
            bytecode_offset,
        });
        self.functions.len() - 1
    }

    /// Declare a global with its initial value and return its index
    pub fn global(&mut self, initial: Value) -> u8 {
        self.globals.push(initial);
        let index = self.globals.len() - 1;
        self.encode(u8::try_from(index), || format!("Global {} does not fit a u8 operand", index))
    }

    fn encode<V: Default, E>(&mut self, converted: Result<V, E>, message: impl FnOnce() -> String) -> V {
        converted.unwrap_or_else(|_| {
            self.error.get_or_insert_with(message);
            V::default()
        })
    }

    /// Current bytecode offset, usable as a jump target
    pub fn here(&self) -> usize {
        self.bytecode.len()
    }

    fn emit(&mut self, opcode: Opcode) -> &mut Self {
        self.bytecode.push(opcode as u8);
        self
    }

    fn emit_u8(&mut self, opcode: Opcode, operand: u8) -> &mut Self {
        self.bytecode.push(opcode as u8);
        self.bytecode.push(operand);
        self
    }

    fn emit_i16(&mut self, opcode: Opcode, operand: Value) -> &mut Self {
        self.bytecode.push(opcode as u8);
        self.bytecode.extend_from_slice(&operand.to_le_bytes());
        self
    }

    pub fn push_const(&mut self, value: Value) -> &mut Self {
        self.emit_i16(Opcode::PushConst, value)
    }

    pub fn zero(&mut self) -> &mut Self {
        self.emit(Opcode::Zero)
    }

    pub fn drop_top(&mut self) -> &mut Self {
        self.emit(Opcode::Drop)
    }

    pub fn get_global(&mut self, index: u8) -> &mut Self {
        self.emit_u8(Opcode::GetGlobal, index)
    }

    pub fn set_global(&mut self, index: u8) -> &mut Self {
        self.emit_u8(Opcode::SetGlobal, index)
    }

    pub fn get_local(&mut self, index: u8) -> &mut Self {
        self.emit_u8(Opcode::GetLocal, index)
    }

    pub fn set_local(&mut self, index: u8) -> &mut Self {
        self.emit_u8(Opcode::SetLocal, index)
    }

    pub fn call(&mut self, func: usize) -> &mut Self {
        let id = self.encode(u8::try_from(func), || format!("Function {} does not fit a u8 operand", func));
        self.emit_u8(Opcode::CallFunc, id)
    }

    pub fn ret(&mut self, retc: u8) -> &mut Self {
        self.emit_u8(Opcode::Ret, retc)
    }

    /// Emit a built-in by name (`"+"`, `"fill-rect"`, ...)
    pub fn builtin(&mut self, name: &str) -> Result<&mut Self, String> {
        let builtin = builtins::by_name(name).ok_or_else(|| format!("Unknown built-in: {}", name))?;
        self.bytecode.push(builtin.id);
        Ok(self)
    }

    /// Emit a jump to a known target
    pub fn jmp_to(&mut self, target: usize) -> &mut Self {
        let patch = self.jmp();
        self.patch(patch, target);
        self
    }

    pub fn jz_to(&mut self, target: usize) -> &mut Self {
        let patch = self.jz();
        self.patch(patch, target);
        self
    }

    /// Emit a forward jump whose target is patched later
    pub fn jmp(&mut self) -> Patch {
        self.emit_i16(Opcode::Jmp, 0);
        Patch(self.bytecode.len() - 2)
    }

    pub fn jz(&mut self) -> Patch {
        self.emit_i16(Opcode::Jz, 0);
        Patch(self.bytecode.len() - 2)
    }

    /// Point a previously emitted jump at `target`
    pub fn patch(&mut self, patch: Patch, target: usize) {
        // displacement is relative to the byte after the operand
        let displacement = target as isize - (patch.0 as isize + 2);
        let value = self.encode(Value::try_from(displacement), || {
            format!("Jump at {} to {} is out of 16-bit range", patch.0 - 1, target)
        });
        self.bytecode[patch.0..patch.0 + 2].copy_from_slice(&value.to_le_bytes());
    }

    /// Raw bytecode emitted so far
    pub fn bytecode(&self) -> &[u8] {
        &self.bytecode
    }

    /// Finish the module with `main` as its entry function
    ///
    /// Fails if any operand emitted so far overflowed its encoding.
    pub fn finish(self, main: usize) -> Result<Module, String> {
        if let Some(error) = self.error {
            return Err(error);
        }
        if self.functions.len() > usize::from(u8::MAX) + 1 {
            return Err(format!("{} functions exceed the 256-entry table", self.functions.len()));
        }
        Ok(Module::new(&self.functions, &self.globals, self.bytecode, main))
    }
}

/// Disassemble bytecode into `(offset, text)` lines
///
/// Decoding stops at the first byte that is not a valid instruction.
pub fn disassemble(code: &[u8]) -> Vec<(usize, String)> {
    let mut lines = Vec::new();
    let mut pc = 0;

    while pc < code.len() {
        let byte = code[pc];

        if byte >= BUILTIN_BASE {
            match builtins::lookup(byte) {
                Some(builtin) => lines.push((pc, format!("{} ({})", builtin.name, builtin.arity))),
                None => {
                    lines.push((pc, format!(".byte 0x{:02x}", byte)));
                    break;
                }
            }
            pc += 1;
            continue;
        }

        let opcode = match Opcode::from_u8(byte) {
            Ok(opcode) => opcode,
            Err(_) => {
                lines.push((pc, format!(".byte 0x{:02x}", byte)));
                break;
            }
        };

        let size = opcode.operand_size();
        let Some(operands) = code.get(pc + 1..pc + 1 + size) else {
            lines.push((pc, format!("{} <truncated>", opcode.mnemonic())));
            break;
        };

        let text = match (opcode, operands) {
            (Opcode::Jmp | Opcode::Jz, &[lo, hi]) => {
                let displacement = Value::from_le_bytes([lo, hi]);
                let target = (pc + 3) as isize + displacement as isize;
                format!("{} {:+} ; -> {:04x}", opcode.mnemonic(), displacement, target)
            }
            (_, &[lo, hi]) => format!("{} {}", opcode.mnemonic(), Value::from_le_bytes([lo, hi])),
            (_, &[operand]) => format!("{} {}", opcode.mnemonic(), operand),
            _ => opcode.mnemonic().to_string(),
        };
        lines.push((pc, text));
        pc += 1 + size;
    }

    lines
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_emit_operands() {
        let mut asm = Assembler::new();
        asm.push_const(0x1234).get_local(3).ret(1);
        assert_eq!(
            asm.bytecode(),
            &[Opcode::PushConst as u8, 0x34, 0x12, Opcode::GetLocal as u8, 3, Opcode::Ret as u8, 1]
        );
    }

    #[test]
    fn test_builtin_by_name() {
        let mut asm = Assembler::new();
        asm.builtin("+").unwrap();
        assert_eq!(asm.bytecode(), &[128]);
        assert!(asm.builtin("frobnicate").is_err());
    }

    #[test]
    fn test_jump_patching() {
        let mut asm = Assembler::new();
        let top = asm.here();
        let exit = asm.jz();
        asm.jmp_to(top);
        let end = asm.here();
        asm.patch(exit, end);

        // jz +3 skips the backward jmp; jmp -6 lands on offset 0
        assert_eq!(asm.bytecode(), &[0x15, 3, 0, 0x14, 0xFA, 0xFF]);
    }

    #[test]
    fn test_functions_and_globals() {
        let mut asm = Assembler::new();
        let g = asm.global(7);
        let main = asm.function(0, 1);
        asm.get_global(g).ret(1);
        let helper = asm.function(2, 0);
        asm.ret(0);

        let module = asm.finish(main).unwrap();
        assert_eq!(module.global(0), Some(7));
        assert_eq!(module.func(helper).map(|f| f.bytecode_offset), Some(4));
        assert_eq!(module.func(helper).map(|f| f.argc), Some(2));
    }

    #[test]
    fn test_disassemble() {
        let mut asm = Assembler::new();
        asm.push_const(-5).builtin("fill-rect").unwrap();
        asm.jmp_to(0);
        let mut code = asm.bytecode().to_vec();
        code.push(0x7F);

        let lines = disassemble(&code);
        assert_eq!(
            lines,
            vec![
                (0, "pushconst -5".to_string()),
                (3, "fill-rect (5)".to_string()),
                (4, "jmp -7 ; -> 0000".to_string()),
                (7, ".byte 0x7f".to_string()),
            ]
        );
    }

    #[test]
    fn test_operand_overflow_fails_finish() {
        let mut asm = Assembler::new();
        let main = asm.function(0, 0);
        asm.call(256).ret(0);
        assert!(asm.finish(main).unwrap_err().contains("Function 256"));

        let mut asm = Assembler::new();
        for value in 0..=256 {
            asm.global(value);
        }
        let main = asm.function(0, 0);
        asm.ret(0);
        assert!(asm.finish(main).unwrap_err().contains("Global 256"));
    }

    #[test]
    fn test_jump_out_of_range_fails_finish() {
        let mut asm = Assembler::new();
        let main = asm.function(0, 0);
        let exit = asm.jmp();
        for _ in 0..11_000 {
            asm.push_const(0);
        }
        let end = asm.here();
        asm.patch(exit, end);
        asm.ret(0);

        // the displacement is left zeroed
        assert_eq!(&asm.bytecode()[1..3], &[0, 0]);
        assert!(asm.finish(main).unwrap_err().contains("out of 16-bit range"));
    }
}
