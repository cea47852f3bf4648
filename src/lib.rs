//! STAK Bytecode VM
//!
//! A stack-based virtual machine for small interactive programs on 16-bit class
//! hardware, plus the remote debug protocol used to load and start code in a
//! running VM.
//!
//! # Architecture
//!
//! - **Bytecode**: one-byte opcodes with inline operands; built-ins are opcodes >= 128
//! - **Module**: function table, globals and bytecode as byte-addressable segments
//! - **Thread**: operand stack, call frames and the suspend/resume state
//! - **Peripherals**: platform-specific built-ins (drawing, keyboard, random)
//! - **Debug protocol**: byte-stuffed frames over a polled transport
//!
//! # Example Usage
//!
//! ```
//! use stak::{Assembler, Executor, HeadlessPeripherals, RunOutcome, Thread};
//!
//! let mut asm = Assembler::new();
//! let main = asm.function(0, 0);
//! asm.push_const(40).push_const(2).builtin("+").unwrap();
//! asm.ret(1);
//!
//! let mut module = asm.finish(main).unwrap();
//! let mut thread = Thread::for_module(&module).unwrap();
//! let mut periph = HeadlessPeripherals::new();
//!
//! let outcome = Executor::new(&mut module, &mut thread, &mut periph).run().unwrap();
//! assert_eq!(outcome, RunOutcome::Terminated { results: vec![42] });
//! ```

// Core modules
pub mod builtins;
pub mod error;
pub mod executor;
pub mod fixed;
pub mod module;
pub mod opcodes;
pub mod thread;
pub mod value;

// Platform interfaces
pub mod peripherals;
pub mod transport;

// Debugging and hosting
pub mod assembler;
pub mod host;
pub mod protocol;

#[cfg(feature = "python")]
mod python_bindings;

// Re-export main types for convenience
pub use assembler::Assembler;
pub use error::{LoadError, ProtocolError, VmError, VmErrorKind, VmResult};
pub use executor::{Executor, RunOutcome};
pub use host::Machine;
pub use module::{Func, Module, Segment};
pub use opcodes::Opcode;
pub use peripherals::{HeadlessPeripherals, Peripherals};
pub use protocol::DebugSession;
pub use thread::{Thread, ThreadState};
pub use transport::{Loopback, SocketListener, Transport};
pub use value::Value;

#[cfg(test)]
mod integration_tests {
    use super::*;

    /// Module image: `main` draws a rectangle per frame for 3 frames and returns
    /// the frame counter
    fn animation_image() -> Vec<u8> {
        let mut asm = Assembler::new();
        let frame = asm.global(0);
        let main = asm.function(0, 0);

        let top = asm.here();
        asm.get_global(frame).push_const(3).builtin("<").unwrap();
        let done = asm.jz();
        asm.push_const(15).get_global(frame).zero().push_const(8).push_const(8);
        asm.builtin("fill-rect").unwrap();
        asm.drop_top();
        asm.get_global(frame).push_const(1).builtin("+").unwrap();
        asm.set_global(frame);
        asm.push_const(1).builtin("pause-frames").unwrap();
        asm.drop_top();
        asm.jmp_to(top);
        let end = asm.here();
        asm.patch(done, end);
        asm.get_global(frame).ret(1);

        asm.finish(main).unwrap().to_bytes()
    }

    #[test]
    fn test_file_image_runs_across_frames() {
        let module = Module::from_bytes(&animation_image()).unwrap();
        let mut machine: Machine<HeadlessPeripherals> =
            Machine::new(module, HeadlessPeripherals::new()).unwrap();

        let mut results = None;
        for _ in 0..10 {
            if let RunOutcome::Terminated { results: r } = machine.tick().unwrap() {
                results = Some(r);
                break;
            }
        }

        assert_eq!(results, Some(vec![3]));
        assert_eq!(machine.peripherals().draw_calls, 3);
        assert_eq!(machine.ticks(), 4);
        assert!(machine.is_finished());
    }

    #[test]
    fn test_image_loaded_through_debugger() {
        let image = Module::from_bytes(&animation_image()).unwrap();
        let mut machine = Machine::debug(HeadlessPeripherals::new(), Loopback::new());

        let mut stream = Vec::new();
        for (segment, bytes) in [
            (Segment::Functions, Func::encode(&image.func(0).unwrap()).to_vec()),
            (Segment::Globals, image.global(0).unwrap().to_le_bytes().to_vec()),
            (Segment::Bytecode, image.code().to_vec()),
        ] {
            let mut body = vec![b'w', segment as u8];
            body.extend_from_slice(&0u16.to_le_bytes());
            body.extend_from_slice(&(bytes.len() as u16).to_le_bytes());
            body.extend_from_slice(&bytes);
            stream.extend(protocol::framing::encode_frame(&body));
        }
        stream.extend(protocol::framing::encode_frame(&[b'x', 0, 0]));
        machine.transport_mut().unwrap().push_incoming(&stream);

        machine.tick().unwrap();
        assert!(machine.thread().is_executing());
        assert_eq!(machine.module().bytecode_length(), image.bytecode_length());

        let mut ticks = 0;
        while machine.results().is_none() && ticks < 10 {
            machine.tick().unwrap();
            ticks += 1;
        }
        assert_eq!(machine.results(), Some(&[3][..]));
        assert!(machine.thread().is_terminated());
        assert!(!machine.is_finished());
    }
}
