//! Python bindings for the STAK VM
//!
//! This module exposes a headless machine to Python using PyO3.

use pyo3::exceptions::{PyIndexError, PyRuntimeError, PyValueError};
use pyo3::prelude::*;
use pyo3::types::PyBytes;

use crate::assembler::disassemble;
use crate::executor::RunOutcome;
use crate::host;
use crate::module::Module;
use crate::peripherals::{HeadlessPeripherals, KEY_MAX};
use crate::thread::ThreadState;
use crate::transport::Loopback;

type HeadlessMachine = host::Machine<HeadlessPeripherals, Loopback>;

/// A headless STAK machine
///
/// Example:
///     >>> m = Machine.load(open("demo.stak", "rb").read())
///     >>> while m.state != "terminated":
///     ...     m.tick()
///     >>> m.results
///     [0]
#[pyclass(name = "Machine")]
struct PyMachine {
    inner: HeadlessMachine,
}

#[pymethods]
impl PyMachine {
    /// Load a module image and position the thread at its entry function
    ///
    /// Raises:
    ///     ValueError: If the image is malformed
    #[staticmethod]
    fn load(data: &[u8]) -> PyResult<Self> {
        let module = Module::from_bytes(data)
            .map_err(|e| PyValueError::new_err(format!("Invalid module: {}", e)))?;
        let inner = HeadlessMachine::new(module, HeadlessPeripherals::new())
            .map_err(|e| PyValueError::new_err(format!("Invalid module: {}", e)))?;
        Ok(PyMachine { inner })
    }

    /// An empty machine driven through the debug protocol (see `feed`)
    #[staticmethod]
    fn debug() -> Self {
        PyMachine {
            inner: HeadlessMachine::debug(HeadlessPeripherals::new(), Loopback::new()),
        }
    }

    /// Run one frame tick
    ///
    /// Returns:
    ///     list[int] or None: Return values if the program finished in this tick
    ///
    /// Raises:
    ///     RuntimeError: On a program error; the thread is stopped
    fn tick(&mut self) -> PyResult<Option<Vec<i16>>> {
        match self.inner.tick() {
            Ok(RunOutcome::Terminated { results }) => Ok(Some(results)),
            Ok(_) => Ok(None),
            Err(e) => Err(PyRuntimeError::new_err(e.to_string())),
        }
    }

    /// Send raw bytes to the debug protocol and return the raw replies
    ///
    /// Raises:
    ///     RuntimeError: If the machine was not created with `Machine.debug()`
    fn feed<'py>(&mut self, py: Python<'py>, data: &[u8]) -> PyResult<Bound<'py, PyBytes>> {
        let link = self
            .inner
            .transport_mut()
            .ok_or_else(|| PyRuntimeError::new_err("Machine is not in debug mode"))?;
        link.push_incoming(data);

        self.inner
            .service_debugger()
            .map_err(|e| PyRuntimeError::new_err(e.to_string()))?;

        let replies = self
            .inner
            .transport_mut()
            .map(|link| link.take_outgoing())
            .unwrap_or_default();
        Ok(PyBytes::new(py, &replies))
    }

    /// Set the held state of a key (0 = up, 1 = down, 2 = left, 3 = right, 4 = ctrl)
    fn set_key(&mut self, index: usize, down: bool) -> PyResult<()> {
        if index >= KEY_MAX {
            return Err(PyIndexError::new_err(format!("No key {}", index)));
        }
        self.inner.peripherals_mut().set_key(index, down);
        Ok(())
    }

    fn global(&self, index: usize) -> PyResult<i16> {
        self.inner
            .module()
            .global(index)
            .ok_or_else(|| PyIndexError::new_err(format!("No global {}", index)))
    }

    /// Disassembly of the loaded bytecode, one instruction per line
    fn disassemble(&self) -> Vec<String> {
        disassemble(self.inner.module().code())
            .into_iter()
            .map(|(offset, text)| format!("{:04x}  {}", offset, text))
            .collect()
    }

    #[getter]
    fn state(&self) -> &'static str {
        match self.inner.thread().state {
            ThreadState::Terminated => "terminated",
            ThreadState::Executing => "executing",
            ThreadState::Suspended => "suspended",
        }
    }

    #[getter]
    fn pc(&self) -> usize {
        self.inner.thread().pc
    }

    /// Live operand stack, bottom first
    #[getter]
    fn stack(&self) -> Vec<i16> {
        self.inner.thread().stack().to_vec()
    }

    #[getter]
    fn results(&self) -> Option<Vec<i16>> {
        self.inner.results().map(<[i16]>::to_vec)
    }

    #[getter]
    fn ticks(&self) -> u64 {
        self.inner.ticks()
    }

    #[getter]
    fn draw_calls(&self) -> usize {
        self.inner.peripherals().draw_calls
    }

    fn __repr__(&self) -> String {
        format!(
            "<Machine state='{}' pc={} sp={} ticks={}>",
            self.state(),
            self.inner.thread().pc,
            self.inner.thread().sp,
            self.inner.ticks()
        )
    }
}

/// Python module definition
#[pymodule]
fn _stak(m: &Bound<'_, pyo3::types::PyModule>) -> PyResult<()> {
    m.add_class::<PyMachine>()?;
    m.add("DEFAULT_PORT", crate::transport::DEFAULT_PORT)?;
    Ok(())
}
