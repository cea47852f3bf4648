#![no_main]

use libfuzzer_sys::fuzz_target;
use stak::Module;

fuzz_target!(|data: &[u8]| {
    // Loading may fail with LoadError, but should never panic
    if let Ok(module) = Module::from_bytes(data) {
        // Property: main and every function entry are inside the module
        assert!(module.main() < module.num_functions());
        for i in 0..module.num_functions() {
            let func = module.func(i).unwrap();
            assert!((func.bytecode_offset as usize) < module.bytecode_length());
        }

        // Property: re-encoding a loaded image yields an equivalent image
        let reloaded = Module::from_bytes(&module.to_bytes()).unwrap();
        assert_eq!(reloaded.code(), module.code());
        assert_eq!(reloaded.num_globals(), module.num_globals());
    }
});
