//! percolar CLI
//!
//! Single entry point: parse flags, build the registry, dispatch exactly
//! one command and forward its status as the process exit code.
//!
//! # Usage
//!
//! ```bash
//! # Train against a solver description
//! percolar train --solver solver.cfg
//!
//! # Resume from a checkpoint across two devices
//! percolar train --solver solver.cfg --snapshot state.bin --device 0,1
//!
//! # Detection evaluation
//! percolar test --model net.cfg --weights trained.bin --detection
//!
//! # Per-layer benchmark
//! percolar time --model net.cfg --layer-timings
//! ```

use clap::Parser;
use std::process::ExitCode;

use percolar::commands::build_registry;
use percolar::config::Cli;
use percolar::engine::memory::MemoryEngine;
use percolar::output::Output;
use percolar::registry::{CommandContext, FALLBACK_COMMAND};

fn main() -> ExitCode {
    let cli = Cli::parse();
    let out = Output::from_flags(cli.quiet, cli.verbose);
    let command = cli
        .command
        .clone()
        .unwrap_or_else(|| FALLBACK_COMMAND.to_string());

    // The reference backend; a deployment wires its real engine here.
    let backend = Box::new(MemoryEngine::new());
    let registry = build_registry();
    let mut ctx = CommandContext::new(cli, out.clone(), backend);

    match registry.dispatch(&command, &mut ctx) {
        Ok(0) => ExitCode::SUCCESS,
        Ok(status) => {
            out.error(&format!("Command '{command}' exited with status {status}"));
            ExitCode::FAILURE
        }
        Err(e) => {
            out.error(&e.to_string());
            ExitCode::FAILURE
        }
    }
}
