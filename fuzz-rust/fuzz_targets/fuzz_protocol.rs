#![no_main]

use libfuzzer_sys::fuzz_target;
use stak::module::{DEBUG_BYTECODE_CAPACITY, DEBUG_FUNCTIONS_CAPACITY};
use stak::{DebugSession, Module, Thread};

fuzz_target!(|data: &[u8]| {
    // Arbitrary debugger traffic must never panic or write outside the segments
    let mut session = DebugSession::new();
    let mut module = Module::with_debug_capacity();
    let mut thread = Thread::new();

    for &byte in data {
        if let Some(reply) = session.feed(byte, &mut module, &mut thread) {
            // Property: every reply ends with a delimiter
            assert_eq!(reply.last(), Some(&0x7E));
        }

        // Property: bytecode never grows past its backing storage
        assert!(module.bytecode_length() <= DEBUG_BYTECODE_CAPACITY);

        // Property: a started thread always points at a known function
        if let Some(func) = thread.func_index {
            assert!(func < DEBUG_FUNCTIONS_CAPACITY / 4);
        }
    }
});
