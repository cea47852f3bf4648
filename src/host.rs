//! Frame-tick driver tying the engine, the peripherals and the debugger together

use std::io;

use tracing::{error, info, warn};

use crate::error::{ProtocolError, VmResult};
use crate::executor::{run, RunOutcome};
use crate::module::Module;
use crate::peripherals::Peripherals;
use crate::protocol::DebugSession;
use crate::thread::Thread;
use crate::transport::{Loopback, Transport};
use crate::value::Value;

struct Debugger<T> {
    session: DebugSession,
    transport: T,
}

/// One VM instance: module, thread, peripherals and, in debug mode, a debugger link
///
/// Protocol processing and execution strictly alternate within a tick, so the
/// debugger never writes into the module while the engine runs.
pub struct Machine<P: Peripherals, T: Transport = Loopback> {
    module: Module,
    thread: Thread,
    peripherals: P,
    debugger: Option<Debugger<T>>,
    results: Option<Vec<Value>>,
    ticks: u64,
}

impl<P: Peripherals, T: Transport> Machine<P, T> {
    /// A machine that runs `module` from its entry function
    pub fn new(module: Module, peripherals: P) -> Result<Self, ProtocolError> {
        let thread = Thread::for_module(&module)?;
        Ok(Machine {
            module,
            thread,
            peripherals,
            debugger: None,
            results: None,
            ticks: 0,
        })
    }

    /// A machine with an empty module, waiting for a debugger to load code
    pub fn debug(peripherals: P, transport: T) -> Self {
        Machine {
            module: Module::with_debug_capacity(),
            thread: Thread::new(),
            peripherals,
            debugger: Some(Debugger {
                session: DebugSession::new(),
                transport,
            }),
            results: None,
            ticks: 0,
        }
    }

    /// Run one frame tick
    ///
    /// Order: `frame_start`, pause countdown, engine, `frame_end`, then (debug mode)
    /// the transport is drained into the protocol. A program error is logged and
    /// stops the thread; the debugger is still serviced in that tick.
    pub fn tick(&mut self) -> VmResult<RunOutcome> {
        self.ticks += 1;

        self.peripherals.frame_start();
        self.thread.tick();
        let outcome = run(&mut self.module, &mut self.thread, &mut self.peripherals);
        self.peripherals.frame_end();

        match &outcome {
            Ok(RunOutcome::Terminated { results }) => {
                info!(tick = self.ticks, ?results, "program finished");
                self.results = Some(results.clone());
                if let Some(debugger) = self.debugger.as_mut() {
                    if let Err(e) = debugger.session.report_completion(&mut debugger.transport, results) {
                        warn!(error = %e, "could not report completion to debugger");
                    }
                }
            }
            Err(e) => {
                error!(tick = self.ticks, error = %e, "program error, thread stopped");
                self.thread.stop();
            }
            Ok(_) => {}
        }

        if let Err(e) = self.service_debugger() {
            warn!(error = %e, "debugger reply failed");
        }

        outcome
    }

    /// Feed everything the debugger sent so far into the protocol
    ///
    /// Returns the number of bytes consumed; always 0 outside debug mode.
    pub fn service_debugger(&mut self) -> io::Result<usize> {
        match self.debugger.as_mut() {
            Some(debugger) => {
                debugger
                    .session
                    .poll(&mut debugger.transport, &mut self.module, &mut self.thread)
            }
            None => Ok(0),
        }
    }

    pub fn is_debugging(&self) -> bool {
        self.debugger.is_some()
    }

    /// Whether the frame loop should stop: never in debug mode, otherwise once the
    /// thread has terminated
    pub fn is_finished(&self) -> bool {
        !self.is_debugging() && self.thread.is_terminated()
    }

    /// Return values of the most recent completed run
    pub fn results(&self) -> Option<&[Value]> {
        self.results.as_deref()
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    pub fn module(&self) -> &Module {
        &self.module
    }

    pub fn thread(&self) -> &Thread {
        &self.thread
    }

    pub fn peripherals(&self) -> &P {
        &self.peripherals
    }

    pub fn peripherals_mut(&mut self) -> &mut P {
        &mut self.peripherals
    }

    pub fn transport_mut(&mut self) -> Option<&mut T> {
        self.debugger.as_mut().map(|d| &mut d.transport)
    }
}
