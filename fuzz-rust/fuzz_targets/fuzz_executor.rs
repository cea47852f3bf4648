#![no_main]

use libfuzzer_sys::fuzz_target;
use stak::{Executor, HeadlessPeripherals, Module, RunOutcome, Thread, ThreadState};

/// Upper bound on instructions per input, to keep infinite loops cheap
const MAX_STEPS: usize = 100_000;

fuzz_target!(|data: &[u8]| {
    let Ok(mut module) = Module::from_bytes(data) else {
        return;
    };
    let Ok(mut thread) = Thread::for_module(&module) else {
        return;
    };
    let mut periph = HeadlessPeripherals::new();

    for _ in 0..MAX_STEPS {
        let before = thread.clone();
        let mut exec = Executor::new(&mut module, &mut thread, &mut periph);

        match exec.step() {
            Ok(RunOutcome::Running) => {}
            Ok(RunOutcome::Suspended) => {
                while thread.state == ThreadState::Suspended {
                    thread.tick();
                }
            }
            Ok(RunOutcome::Terminated { .. }) | Ok(RunOutcome::Idle) => break,
            Err(err) => {
                // Property: a faulting instruction leaves the thread untouched
                assert_eq!(err.pc, before.pc);
                assert_eq!(thread.pc, before.pc);
                assert_eq!(thread.sp, before.sp);
                assert_eq!(thread.frame, before.frame);
                assert_eq!(thread.stack(), before.stack());
                break;
            }
        }

        // Property: registers stay inside their fixed capacities
        assert!(thread.sp <= stak::thread::STACK_SIZE);
        assert!(thread.frame <= stak::thread::MAX_FRAMES);
        assert!(thread.fp <= thread.sp);
    }
});
