use crate::error::ProtocolError;
use crate::module::Module;
use crate::value::Value;

/// Capacity of the call-frame stack
pub const MAX_FRAMES: usize = 64;

/// Capacity of the operand stack, in values
pub const STACK_SIZE: usize = 1024;

/// Execution state of a thread
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThreadState {
    Terminated,
    Executing,
    Suspended,
}

/// Saved caller continuation, pushed on call and popped on return
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Frame {
    pub func_index: usize,
    pub pc: usize,
    pub fp: usize,
}

/// The single mutable execution context of a VM
///
/// Owns the operand stack and the call-frame stack. `pc` is only meaningful while
/// the thread is not terminated.
#[derive(Debug, Clone)]
pub struct Thread {
    pub state: ThreadState,
    pub frames_paused: u16,
    pub func_index: Option<usize>,
    pub pc: usize,
    pub sp: usize,
    pub fp: usize,
    pub frame: usize,
    pub frames: [Frame; MAX_FRAMES],
    pub stack: Box<[Value]>,
}

impl Thread {
    /// A terminated thread with no code to run
    pub fn new() -> Self {
        Thread {
            state: ThreadState::Terminated,
            frames_paused: 0,
            func_index: None,
            pc: 0,
            sp: 0,
            fp: 0,
            frame: 0,
            frames: [Frame::default(); MAX_FRAMES],
            stack: vec![0; STACK_SIZE].into_boxed_slice(),
        }
    }

    /// A thread positioned at the module's entry function
    pub fn for_module(module: &Module) -> Result<Self, ProtocolError> {
        let mut thread = Thread::new();
        thread.enter(module, module.main())?;
        Ok(thread)
    }

    /// (Re-)initialize the thread and make it execute `func_index` from its entry
    ///
    /// The stack depth is set to the function's `argc + num_locals`; slot contents
    /// are left as they are.
    pub fn enter(&mut self, module: &Module, func_index: usize) -> Result<(), ProtocolError> {
        let func = module
            .func(func_index)
            .ok_or(ProtocolError::UnknownFunction(func_index))?;

        self.frames_paused = 0;
        self.fp = 0;
        self.frame = 0;
        self.state = ThreadState::Executing;
        self.func_index = Some(func_index);
        self.pc = func.bytecode_offset as usize;
        self.sp = func.frame_size();
        Ok(())
    }

    /// Force the thread into the terminated state with an empty stack
    pub fn reset(&mut self) {
        self.frames_paused = 0;
        self.fp = 0;
        self.frame = 0;
        self.state = ThreadState::Terminated;
        self.func_index = None;
        self.pc = 0;
        self.sp = 0;
    }

    /// Stop after a fatal program error, leaving registers for inspection
    pub fn stop(&mut self) {
        self.state = ThreadState::Terminated;
        self.frames_paused = 0;
    }

    /// Suspend for `count` frame ticks; non-positive counts are ignored
    pub fn pause_frames(&mut self, count: Value) {
        if count > 0 {
            self.state = ThreadState::Suspended;
            self.frames_paused = count as u16;
        }
    }

    /// One frame tick: count down a pending pause and resume when it runs out
    pub fn tick(&mut self) {
        if self.frames_paused > 0 {
            self.frames_paused -= 1;

            if self.frames_paused == 0 && self.state == ThreadState::Suspended {
                self.state = ThreadState::Executing;
            }
        }
    }

    pub fn is_executing(&self) -> bool {
        self.state == ThreadState::Executing
    }

    pub fn is_terminated(&self) -> bool {
        self.state == ThreadState::Terminated
    }

    /// Live portion of the operand stack
    pub fn stack(&self) -> &[Value] {
        &self.stack[..self.sp]
    }
}

impl Default for Thread {
    fn default() -> Self {
        Self::new()
    }
}
