//! STAK VM host
//!
//! Runs a module file headless, or waits for a debugger (`-g`) to load and start
//! code over TCP.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use stak::assembler::disassemble;
use stak::host::Machine;
use stak::module::Module;
use stak::peripherals::HeadlessPeripherals;
use stak::transport::{SocketListener, Transport, DEFAULT_PORT};

#[derive(Parser, Debug)]
#[command(name = "stak")]
#[command(about = "Run STAK bytecode, or serve a remote debugger")]
struct Cli {
    /// Module file to run
    #[arg(required_unless_present = "debug", conflicts_with = "debug")]
    file: Option<PathBuf>,

    /// Start with an empty module and wait for a debugger
    #[arg(short = 'g', long = "debug")]
    debug: bool,

    /// TCP port of the debug listener
    #[arg(long, default_value_t = DEFAULT_PORT)]
    port: u16,

    /// Stop after this many frame ticks (0 = no limit)
    #[arg(long, default_value = "0")]
    ticks: u64,

    /// Frame period in milliseconds
    #[arg(long, default_value = "16")]
    tick_ms: u64,

    /// Print the module's bytecode instead of running it
    #[arg(long, requires = "file")]
    disasm: bool,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    if cli.debug {
        let listener = match SocketListener::bind(cli.port) {
            Ok(listener) => listener,
            Err(e) => {
                error!(port = cli.port, "Failed to start debug listener: {}", e);
                return ExitCode::FAILURE;
            }
        };

        let mut machine = Machine::debug(HeadlessPeripherals::new(), listener);
        return drive(&mut machine, &cli);
    }

    let Some(path) = cli.file.as_deref() else {
        error!("No module file given");
        return ExitCode::FAILURE;
    };

    let module = match load(path) {
        Some(module) => module,
        None => return ExitCode::FAILURE,
    };

    if cli.disasm {
        for (offset, text) in disassemble(module.code()) {
            println!("{:04x}  {}", offset, text);
        }
        return ExitCode::SUCCESS;
    }

    let mut machine: Machine<HeadlessPeripherals> = match Machine::new(module, HeadlessPeripherals::new()) {
        Ok(machine) => machine,
        Err(e) => {
            error!("Cannot start module: {}", e);
            return ExitCode::FAILURE;
        }
    };
    drive(&mut machine, &cli)
}

fn load(path: &Path) -> Option<Module> {
    info!("Loading module from: {}", path.display());
    match Module::from_file(path) {
        Ok(module) => {
            info!(
                functions = module.num_functions(),
                globals = module.num_globals(),
                bytecode = module.bytecode_length(),
                "module loaded"
            );
            Some(module)
        }
        Err(e) => {
            error!("Failed to load module: {}", e);
            None
        }
    }
}

/// The frame loop
fn drive<T: Transport>(machine: &mut Machine<HeadlessPeripherals, T>, cli: &Cli) -> ExitCode {
    let period = Duration::from_millis(cli.tick_ms);

    while !machine.is_finished() {
        if cli.ticks > 0 && machine.ticks() >= cli.ticks {
            info!(ticks = machine.ticks(), "tick limit reached");
            break;
        }

        // errors are already logged by the machine; only a standalone run gives up
        if machine.tick().is_err() && !machine.is_debugging() {
            return ExitCode::FAILURE;
        }

        std::thread::sleep(period);
    }

    if let Some(results) = machine.results() {
        info!(?results, draw_calls = machine.peripherals().draw_calls, "done");
    }
    ExitCode::SUCCESS
}
