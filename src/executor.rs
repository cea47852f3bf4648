use tracing::trace;

use crate::builtins::{self, Builtin, MAX_ARITY};
use crate::error::{Resource, VmError, VmErrorKind, VmResult};
use crate::module::{Func, Module};
use crate::opcodes::{read_i16, read_u8, Opcode, BUILTIN_BASE};
use crate::peripherals::Peripherals;
use crate::thread::{Frame, Thread, ThreadState, MAX_FRAMES, STACK_SIZE};
use crate::value::Value;

/// How a call into the engine ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// The thread was not executing, nothing ran
    Idle,
    /// Only returned by `step`: the instruction completed and the thread keeps executing
    Running,
    /// `pause-frames` yielded to the host's frame clock
    Suspended,
    /// The entry function returned these values
    Terminated { results: Vec<Value> },
}

/// Bytecode executor for the STAK VM
///
/// Executes instructions of `module` on `thread` until the thread stops executing,
/// either by suspension or by returning from its outermost frame. Built-ins are
/// routed to the peripherals through the built-in table.
///
/// Every instruction checks all of its preconditions before it touches the thread
/// or the globals, so a returned error leaves the thread exactly as it was before
/// the faulting instruction.
pub struct Executor<'a, P: Peripherals> {
    /// Program image; only globals are written during execution
    module: &'a mut Module,

    /// Execution state, operand stack and call frames
    thread: &'a mut Thread,

    /// Platform-specific built-in backend
    peripherals: &'a mut P,
}

impl<'a, P: Peripherals> Executor<'a, P> {
    /// Create a new executor
    pub fn new(module: &'a mut Module, thread: &'a mut Thread, peripherals: &'a mut P) -> Self {
        Executor {
            module,
            thread,
            peripherals,
        }
    }

    /// Run until the thread is no longer executing
    ///
    /// Never blocks: returns `Suspended` at the first `pause-frames` with a
    /// positive count, and `Terminated` when the entry function returns.
    pub fn run(&mut self) -> VmResult<RunOutcome> {
        if !self.thread.is_executing() {
            return Ok(RunOutcome::Idle);
        }

        loop {
            match self.step()? {
                RunOutcome::Running => continue,
                outcome => return Ok(outcome),
            }
        }
    }

    /// Execute exactly one instruction
    pub fn step(&mut self) -> VmResult<RunOutcome> {
        if !self.thread.is_executing() {
            return Ok(RunOutcome::Idle);
        }

        let pc = self.thread.pc;
        let sp = self.thread.sp;

        let Some(&opcode) = self.module.code().get(pc) else {
            return Err(VmError {
                kind: VmErrorKind::PcOverflow,
                pc,
                opcode: None,
                sp,
            });
        };

        self.execute(opcode).map_err(|kind| VmError {
            kind,
            pc,
            opcode: Some(opcode),
            sp,
        })
    }

    fn execute(&mut self, opcode: u8) -> Result<RunOutcome, VmErrorKind> {
        let pc = self.thread.pc;

        if opcode >= BUILTIN_BASE {
            let builtin = builtins::lookup(opcode).ok_or(VmErrorKind::UnknownOpcode(opcode))?;
            trace!(pc, sp = self.thread.sp, fp = self.thread.fp, op = builtin.name, "exec");
            return self.call_builtin(builtin, pc + 1);
        }

        let op = Opcode::from_u8(opcode)?;
        let next = pc + 1 + op.operand_size();
        trace!(pc, sp = self.thread.sp, fp = self.thread.fp, op = op.mnemonic(), "exec");

        match op {
            Opcode::PushConst => {
                let value = read_i16(self.module.code(), pc + 1)?;
                self.push(value)?;
            }

            Opcode::Zero => {
                self.push(0)?;
            }

            Opcode::Drop => {
                self.ensure_pop(1)?;
                self.thread.sp -= 1;
            }

            Opcode::GetGlobal => {
                let index = read_u8(self.module.code(), pc + 1)? as usize;
                let value = self.module.global(index).ok_or(VmErrorKind::GlobalOutOfRange {
                    index,
                    count: self.module.num_globals(),
                })?;
                self.push(value)?;
            }

            Opcode::SetGlobal => {
                let index = read_u8(self.module.code(), pc + 1)? as usize;
                self.ensure_pop(1)?;
                let value = self.thread.stack[self.thread.sp - 1];
                if !self.module.set_global(index, value) {
                    return Err(VmErrorKind::GlobalOutOfRange {
                        index,
                        count: self.module.num_globals(),
                    });
                }
                self.thread.sp -= 1;
            }

            Opcode::GetLocal => {
                let index = read_u8(self.module.code(), pc + 1)? as usize;
                let slot = self.local_slot(index)?;
                let value = self.thread.stack[slot];
                self.push(value)?;
            }

            Opcode::SetLocal => {
                let index = read_u8(self.module.code(), pc + 1)? as usize;
                let slot = self.local_slot(index)?;
                self.ensure_pop(1)?;
                self.thread.sp -= 1;
                self.thread.stack[slot] = self.thread.stack[self.thread.sp];
            }

            Opcode::CallFunc => {
                let callee = read_u8(self.module.code(), pc + 1)? as usize;
                return self.call_function(callee, next);
            }

            Opcode::Ret => {
                let retc = read_u8(self.module.code(), pc + 1)? as usize;
                return self.ret(retc);
            }

            Opcode::Jmp => {
                let displacement = read_i16(self.module.code(), pc + 1)?;
                self.thread.pc = jump_target(next, displacement)?;
                return Ok(RunOutcome::Running);
            }

            Opcode::Jz => {
                let displacement = read_i16(self.module.code(), pc + 1)?;
                self.ensure_pop(1)?;
                let target = jump_target(next, displacement)?;
                self.thread.sp -= 1;
                self.thread.pc = if self.thread.stack[self.thread.sp] == 0 {
                    target
                } else {
                    next
                };
                return Ok(RunOutcome::Running);
            }
        }

        self.thread.pc = next;
        Ok(RunOutcome::Running)
    }

    fn call_function(&mut self, callee_index: usize, next: usize) -> Result<RunOutcome, VmErrorKind> {
        let callee = self
            .module
            .func(callee_index)
            .ok_or(VmErrorKind::UnknownFunction(callee_index))?;
        let caller_index = self.thread.func_index.ok_or(VmErrorKind::NoActiveFunction)?;
        let caller = self.current_func()?;

        let thread = &mut *self.thread;
        let argc = callee.argc as usize;

        // arguments must sit above the caller's own arguments and locals
        let provided = thread.sp.saturating_sub(thread.fp + caller.frame_size());
        if provided < argc {
            return Err(VmErrorKind::ArityMismatch {
                func: callee_index,
                expected: argc,
                provided,
            });
        }

        if thread.frame >= MAX_FRAMES {
            return Err(VmErrorKind::ResourceExhausted {
                resource: Resource::CallFrames,
                attempted: thread.frame + 1,
                capacity: MAX_FRAMES,
            });
        }

        let new_sp = thread.sp + callee.num_locals as usize;
        if new_sp > STACK_SIZE {
            return Err(VmErrorKind::ResourceExhausted {
                resource: Resource::OperandStack,
                attempted: new_sp,
                capacity: STACK_SIZE,
            });
        }

        thread.frames[thread.frame] = Frame {
            func_index: caller_index,
            pc: next,
            fp: thread.fp,
        };
        thread.frame += 1;

        thread.func_index = Some(callee_index);
        thread.pc = callee.bytecode_offset as usize;
        thread.fp = thread.sp - argc;
        thread.sp = new_sp;

        trace!(func = callee_index, depth = thread.frame, "call");
        Ok(RunOutcome::Running)
    }

    fn ret(&mut self, retc: usize) -> Result<RunOutcome, VmErrorKind> {
        let func = self.current_func()?;
        self.ensure_pop(retc)?;

        let thread = &mut *self.thread;
        let sp = thread.sp;
        let values = sp - retc;

        // the activation's own slots must still be below the return values
        if values < thread.fp + func.frame_size() {
            return Err(VmErrorKind::StackUnderflow);
        }
        let base = values - func.frame_size();

        thread.stack.copy_within(values..sp, base);
        thread.sp = base + retc;

        if thread.frame == 0 {
            let results = thread.stack[base..thread.sp].to_vec();
            trace!(retc, sp = thread.sp, "return from entry function");
            thread.state = ThreadState::Terminated;
            return Ok(RunOutcome::Terminated { results });
        }

        thread.frame -= 1;
        let frame = thread.frames[thread.frame];
        thread.fp = frame.fp;
        thread.pc = frame.pc;
        thread.func_index = Some(frame.func_index);
        Ok(RunOutcome::Running)
    }

    fn call_builtin(&mut self, builtin: &Builtin, next: usize) -> Result<RunOutcome, VmErrorKind> {
        let arity = builtin.arity;
        self.ensure_pop(arity)?;

        let base = self.thread.sp - arity;
        if base + 1 > STACK_SIZE {
            return Err(VmErrorKind::ResourceExhausted {
                resource: Resource::OperandStack,
                attempted: base + 1,
                capacity: STACK_SIZE,
            });
        }

        let mut args = [0; MAX_ARITY];
        args[..arity].copy_from_slice(&self.thread.stack[base..self.thread.sp]);

        let result = builtins::invoke(builtin.op, &args[..arity], self.thread, self.peripherals)?;

        self.thread.stack[base] = result;
        self.thread.sp = base + 1;
        self.thread.pc = next;

        Ok(match self.thread.state {
            ThreadState::Suspended => RunOutcome::Suspended,
            _ => RunOutcome::Running,
        })
    }

    fn current_func(&self) -> Result<Func, VmErrorKind> {
        let index = self.thread.func_index.ok_or(VmErrorKind::NoActiveFunction)?;
        self.module
            .func(index)
            .ok_or(VmErrorKind::UnknownFunction(index))
    }

    /// Stack slot of local `index`, checked against the current activation
    fn local_slot(&self, index: usize) -> Result<usize, VmErrorKind> {
        let frame_size = self.current_func()?.frame_size();
        let slot = self.thread.fp + index;
        if index >= frame_size || slot >= STACK_SIZE {
            return Err(VmErrorKind::LocalOutOfRange { index, frame_size });
        }
        Ok(slot)
    }

    /// Check that `count` values can be popped without dropping below the frame pointer
    fn ensure_pop(&self, count: usize) -> Result<(), VmErrorKind> {
        if self.thread.sp < self.thread.fp + count {
            return Err(VmErrorKind::StackUnderflow);
        }
        Ok(())
    }

    fn push(&mut self, value: Value) -> Result<(), VmErrorKind> {
        let sp = self.thread.sp;
        if sp >= STACK_SIZE {
            return Err(VmErrorKind::ResourceExhausted {
                resource: Resource::OperandStack,
                attempted: sp + 1,
                capacity: STACK_SIZE,
            });
        }
        self.thread.stack[sp] = value;
        self.thread.sp = sp + 1;
        Ok(())
    }
}

fn jump_target(next: usize, displacement: Value) -> Result<usize, VmErrorKind> {
    let target = next as isize + displacement as isize;
    usize::try_from(target).map_err(|_| VmErrorKind::JumpOutOfRange(target))
}

/// Run `thread` on `module` until it stops executing
pub fn run<P: Peripherals>(
    module: &mut Module,
    thread: &mut Thread,
    peripherals: &mut P,
) -> VmResult<RunOutcome> {
    Executor::new(module, thread, peripherals).run()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assembler::Assembler;
    use crate::builtins::BUILTINS;
    use crate::peripherals::HeadlessPeripherals;

    fn start(module: &Module) -> Thread {
        Thread::for_module(module).unwrap()
    }

    fn run_module(module: &mut Module) -> (VmResult<RunOutcome>, Thread) {
        let mut thread = start(module);
        let mut periph = HeadlessPeripherals::new();
        let outcome = run(module, &mut thread, &mut periph);
        (outcome, thread)
    }

    fn terminated(results: &[Value]) -> VmResult<RunOutcome> {
        Ok(RunOutcome::Terminated {
            results: results.to_vec(),
        })
    }

    #[test]
    fn test_simple_arithmetic() {
        let mut asm = Assembler::new();
        let main = asm.function(0, 0);
        asm.push_const(2).push_const(3).builtin("+").unwrap();
        asm.ret(1);

        let mut module = asm.finish(main).unwrap();
        let (outcome, thread) = run_module(&mut module);
        assert_eq!(outcome, terminated(&[5]));
        assert!(thread.is_terminated());
    }

    #[test]
    fn test_call_and_return() {
        let mut asm = Assembler::new();
        let main = asm.function(0, 0);
        asm.push_const(4).push_const(5).call(1).ret(1);

        // f(a, b) { let d = a - b; d }
        let f = asm.function(2, 1);
        asm.get_local(0).get_local(1).builtin("-").unwrap();
        asm.set_local(2).get_local(2).ret(1);
        assert_eq!(f, 1);

        let mut module = asm.finish(main).unwrap();
        let (outcome, thread) = run_module(&mut module);
        assert_eq!(outcome, terminated(&[-1]));
        assert_eq!(thread.frame, 0);
    }

    #[test]
    fn test_multi_value_return_from_nested_call() {
        let mut asm = Assembler::new();
        let main = asm.function(0, 1);
        asm.push_const(100).push_const(7).push_const(8).call(1).ret(3);

        // f(a, b) with two locals returns (b, a, 99)
        asm.function(2, 2);
        asm.get_local(1).get_local(0).push_const(99).ret(3);

        let mut module = asm.finish(main).unwrap();
        let mut thread = start(&module);
        let mut periph = HeadlessPeripherals::new();
        let mut exec = Executor::new(&mut module, &mut thread, &mut periph);

        for _ in 0..8 {
            assert_eq!(exec.step(), Ok(RunOutcome::Running));
        }
        // args and locals of f are replaced by its results
        assert_eq!(exec.thread.frame, 0);
        assert_eq!(exec.thread.fp, 0);
        assert_eq!(exec.thread.sp, 5);
        assert_eq!(exec.thread.stack(), &[0, 100, 8, 7, 99]);

        assert_eq!(exec.run(), terminated(&[8, 7, 99]));
    }

    #[test]
    fn test_recursion_up_to_frame_capacity() {
        let mut asm = Assembler::new();
        let main = asm.function(0, 0);
        asm.push_const((MAX_FRAMES - 1) as Value).call(1).ret(1);

        // f(n) = n == 0 ? 0 : f(n - 1) + 1
        let f = asm.function(1, 0);
        asm.get_local(0);
        let base = asm.jz();
        asm.get_local(0).push_const(1).builtin("-").unwrap();
        asm.call(f).push_const(1).builtin("+").unwrap();
        asm.ret(1);
        let target = asm.here();
        asm.patch(base, target);
        asm.zero().ret(1);

        let mut module = asm.finish(main).unwrap();
        let mut thread = start(&module);
        let mut periph = HeadlessPeripherals::new();
        let mut exec = Executor::new(&mut module, &mut thread, &mut periph);

        let mut deepest = 0;
        let results = loop {
            match exec.step().unwrap() {
                RunOutcome::Terminated { results } => break results,
                _ => deepest = deepest.max(exec.thread.frame),
            }
        };

        assert_eq!(deepest, MAX_FRAMES);
        assert_eq!(results, vec![(MAX_FRAMES - 1) as Value]);
        assert_eq!(exec.thread.frame, 0);
        assert_eq!(exec.thread.fp, 0);
        assert_eq!(exec.thread.sp, 1);
    }

    #[test]
    fn test_frame_balance() {
        let mut asm = Assembler::new();
        let main = asm.function(0, 2);
        asm.push_const(9).call(1).drop_top().ret(0);
        asm.function(1, 3);
        asm.get_local(0).ret(1);

        let mut module = asm.finish(main).unwrap();
        let mut thread = start(&module);
        let mut periph = HeadlessPeripherals::new();
        let mut exec = Executor::new(&mut module, &mut thread, &mut periph);

        // pushconst, callfunc
        exec.step().unwrap();
        exec.step().unwrap();
        assert_eq!(exec.thread.frame, 1);
        assert_eq!(exec.thread.fp, 2);
        assert_eq!(exec.thread.sp, 6);

        // getlocal, ret
        exec.step().unwrap();
        exec.step().unwrap();
        assert_eq!(exec.thread.frame, 0);
        assert_eq!(exec.thread.fp, 0);
        assert_eq!(exec.thread.sp, 3);
        assert_eq!(exec.thread.stack(), &[0, 0, 9]);
        assert_eq!(exec.thread.func_index, Some(0));
    }

    #[test]
    fn test_builtin_stack_effect() {
        for builtin in BUILTINS {
            let mut asm = Assembler::new();
            let main = asm.function(0, 0);
            for _ in 0..builtin.arity {
                asm.push_const(1);
            }
            asm.builtin(builtin.name).unwrap();
            asm.ret(1);

            let mut module = asm.finish(main).unwrap();
            let mut thread = start(&module);
            let mut periph = HeadlessPeripherals::new();
            let mut exec = Executor::new(&mut module, &mut thread, &mut periph);
            for _ in 0..builtin.arity {
                exec.step().unwrap();
            }

            let before = exec.thread.sp as isize;
            exec.step().unwrap();
            let after = exec.thread.sp as isize;
            assert_eq!(after - before, builtin.stack_effect(), "{}", builtin.name);
        }
    }

    #[test]
    fn test_countdown_loop() {
        let mut asm = Assembler::new();
        let counter = asm.global(3);
        let acc = asm.global(0);
        let main = asm.function(0, 0);

        let top = asm.here();
        asm.get_global(counter);
        let exit = asm.jz();
        asm.get_global(acc).get_global(counter).builtin("+").unwrap();
        asm.set_global(acc);
        asm.get_global(counter).push_const(1).builtin("-").unwrap();
        asm.set_global(counter);
        asm.jmp_to(top);
        let end = asm.here();
        asm.patch(exit, end);
        asm.get_global(acc).ret(1);

        let mut module = asm.finish(main).unwrap();
        let (outcome, _) = run_module(&mut module);
        assert_eq!(outcome, terminated(&[6]));
        assert_eq!(module.global(counter as usize), Some(0));
        assert_eq!(module.global(acc as usize), Some(6));
    }

    #[test]
    fn test_jz_falls_through_on_non_zero() {
        let mut asm = Assembler::new();
        let main = asm.function(0, 0);
        asm.push_const(-1);
        let skip = asm.jz();
        asm.push_const(10).ret(1);
        let target = asm.here();
        asm.patch(skip, target);
        asm.push_const(20).ret(1);

        let mut module = asm.finish(main).unwrap();
        let (outcome, _) = run_module(&mut module);
        assert_eq!(outcome, terminated(&[10]));
    }

    #[test]
    fn test_pause_frames_suspends_for_exact_ticks() {
        let mut asm = Assembler::new();
        let main = asm.function(0, 0);
        asm.push_const(2).builtin("pause-frames").unwrap();
        asm.drop_top().push_const(7).ret(1);

        let mut module = asm.finish(main).unwrap();
        let mut thread = start(&module);
        let mut periph = HeadlessPeripherals::new();

        let outcome = run(&mut module, &mut thread, &mut periph);
        assert_eq!(outcome, Ok(RunOutcome::Suspended));
        assert_eq!(thread.frames_paused, 2);
        assert_eq!(thread.stack(), &[0]);
        let resume_pc = thread.pc;

        // a suspended thread does not run
        assert_eq!(run(&mut module, &mut thread, &mut periph), Ok(RunOutcome::Idle));
        assert_eq!(thread.pc, resume_pc);

        thread.tick();
        assert_eq!(thread.state, ThreadState::Suspended);
        assert_eq!(thread.pc, resume_pc);
        thread.tick();
        assert_eq!(thread.state, ThreadState::Executing);
        assert_eq!(thread.pc, resume_pc);

        assert_eq!(run(&mut module, &mut thread, &mut periph), terminated(&[7]));
    }

    #[test]
    fn test_pause_zero_frames_keeps_running() {
        let mut asm = Assembler::new();
        let main = asm.function(0, 0);
        asm.zero().builtin("pause-frames").unwrap();
        asm.ret(1);

        let mut module = asm.finish(main).unwrap();
        let (outcome, _) = run_module(&mut module);
        assert_eq!(outcome, terminated(&[0]));
    }

    #[test]
    fn test_terminated_thread_is_idle() {
        let mut module = Assembler::new().finish(0).unwrap();
        let mut thread = Thread::new();
        let mut periph = HeadlessPeripherals::new();
        assert_eq!(run(&mut module, &mut thread, &mut periph), Ok(RunOutcome::Idle));
    }

    #[test]
    fn test_error_leaves_thread_unchanged() {
        let mut asm = Assembler::new();
        let main = asm.function(0, 0);
        asm.push_const(1).zero().builtin("/").unwrap();
        asm.ret(1);

        let mut module = asm.finish(main).unwrap();
        let mut thread = start(&module);
        let mut periph = HeadlessPeripherals::new();
        let mut exec = Executor::new(&mut module, &mut thread, &mut periph);
        exec.step().unwrap();
        exec.step().unwrap();

        let err = exec.step().unwrap_err();
        assert_eq!(err.kind, VmErrorKind::DivisionByZero);
        assert_eq!(err.pc, 4);
        assert_eq!(err.opcode, Some(131));
        assert_eq!(err.sp, 2);

        assert_eq!(exec.thread.pc, 4);
        assert_eq!(exec.thread.stack(), &[1, 0]);
    }

    #[test]
    fn test_stack_underflow() {
        let mut asm = Assembler::new();
        let main = asm.function(1, 0);
        asm.drop_top().drop_top().ret(0);

        let mut module = asm.finish(main).unwrap();
        let mut thread = Thread::new();
        thread.enter(&module, main).unwrap();
        let mut periph = HeadlessPeripherals::new();

        let err = run(&mut module, &mut thread, &mut periph).unwrap_err();
        // the argument itself may be dropped, nothing below the frame may
        assert_eq!(err.kind, VmErrorKind::StackUnderflow);
        assert_eq!(err.pc, 1);
        assert_eq!(thread.sp, 0);
    }

    #[test]
    fn test_unknown_opcodes() {
        let func = Func {
            argc: 0,
            num_locals: 0,
            bytecode_offset: 0,
        };

        let mut module = Module::new(&[func], &[], vec![0x7f], 0);
        let (outcome, _) = run_module(&mut module);
        assert_eq!(outcome.unwrap_err().kind, VmErrorKind::UnknownOpcode(0x7f));

        // gap in the built-in table
        let mut module = Module::new(&[func], &[], vec![138], 0);
        let (outcome, _) = run_module(&mut module);
        assert_eq!(outcome.unwrap_err().kind, VmErrorKind::UnknownOpcode(138));
    }

    #[test]
    fn test_pc_overflow() {
        let mut asm = Assembler::new();
        let main = asm.function(0, 0);
        asm.push_const(1);

        let mut module = asm.finish(main).unwrap();
        let (outcome, thread) = run_module(&mut module);
        let err = outcome.unwrap_err();
        assert_eq!(err.kind, VmErrorKind::PcOverflow);
        assert_eq!(err.opcode, None);
        assert_eq!(err.pc, 3);
        assert_eq!(thread.stack(), &[1]);
    }

    #[test]
    fn test_truncated_operand() {
        let func = Func {
            argc: 0,
            num_locals: 0,
            bytecode_offset: 0,
        };
        let mut module = Module::new(&[func], &[], vec![Opcode::PushConst as u8, 0x01], 0);

        let err = run_module(&mut module).0.unwrap_err();
        assert_eq!(err.kind, VmErrorKind::PcOverflow);
        assert_eq!(err.opcode, Some(Opcode::PushConst as u8));
    }

    #[test]
    fn test_operand_stack_exhaustion() {
        let mut asm = Assembler::new();
        let main = asm.function(0, 0);
        let top = asm.here();
        asm.zero().jmp_to(top);

        let mut module = asm.finish(main).unwrap();
        let (outcome, thread) = run_module(&mut module);
        assert_eq!(
            outcome.unwrap_err().kind,
            VmErrorKind::ResourceExhausted {
                resource: Resource::OperandStack,
                attempted: STACK_SIZE + 1,
                capacity: STACK_SIZE,
            }
        );
        assert_eq!(thread.sp, STACK_SIZE);
    }

    #[test]
    fn test_call_frame_exhaustion() {
        let mut asm = Assembler::new();
        let main = asm.function(0, 0);
        asm.call(main).ret(0);

        let mut module = asm.finish(main).unwrap();
        let (outcome, thread) = run_module(&mut module);
        assert_eq!(
            outcome.unwrap_err().kind,
            VmErrorKind::ResourceExhausted {
                resource: Resource::CallFrames,
                attempted: MAX_FRAMES + 1,
                capacity: MAX_FRAMES,
            }
        );
        assert_eq!(thread.frame, MAX_FRAMES);
    }

    #[test]
    fn test_arity_excludes_caller_locals() {
        let mut asm = Assembler::new();
        let main = asm.function(0, 2);
        asm.push_const(1).call(1).ret(0);
        asm.function(2, 0);
        asm.ret(0);

        let mut module = asm.finish(main).unwrap();
        let (outcome, thread) = run_module(&mut module);
        assert_eq!(
            outcome.unwrap_err().kind,
            VmErrorKind::ArityMismatch {
                func: 1,
                expected: 2,
                provided: 1,
            }
        );
        assert_eq!(thread.frame, 0);
    }

    #[test]
    fn test_unknown_callee() {
        let mut asm = Assembler::new();
        let main = asm.function(0, 0);
        asm.call(5).ret(0);

        let mut module = asm.finish(main).unwrap();
        let err = run_module(&mut module).0.unwrap_err();
        assert_eq!(err.kind, VmErrorKind::UnknownFunction(5));
    }

    #[test]
    fn test_local_and_global_ranges() {
        let mut asm = Assembler::new();
        let main = asm.function(0, 1);
        asm.get_local(1).ret(1);
        let mut module = asm.finish(main).unwrap();
        assert_eq!(
            run_module(&mut module).0.unwrap_err().kind,
            VmErrorKind::LocalOutOfRange {
                index: 1,
                frame_size: 1,
            }
        );

        let mut asm = Assembler::new();
        let main = asm.function(0, 0);
        asm.zero().set_global(0).ret(0);
        let mut module = asm.finish(main).unwrap();
        let (outcome, thread) = run_module(&mut module);
        assert_eq!(
            outcome.unwrap_err().kind,
            VmErrorKind::GlobalOutOfRange { index: 0, count: 0 }
        );
        assert_eq!(thread.sp, 1);
    }

    #[test]
    fn test_jump_before_start() {
        let func = Func {
            argc: 0,
            num_locals: 0,
            bytecode_offset: 0,
        };
        let mut module = Module::new(&[func], &[], vec![Opcode::Jmp as u8, 0xF6, 0xFF], 0);

        let err = run_module(&mut module).0.unwrap_err();
        assert_eq!(err.kind, VmErrorKind::JumpOutOfRange(-7));
    }
}
