//! `rlvm`: launches the VM over a game directory.
//!
//! With no opcode modules wired in (those are excluded from this core;
//! see `rlvm::machine::OpcodeRegistry`) and no renderer attached, this
//! binary's job is a smoke test: load the archive and Gameexe, build a
//! [`rlvm::Machine`], and tick it, reporting what it reaches before
//! halting, running dry, or hitting the step cap.

use std::path::PathBuf;
use std::process::ExitCode;
use std::rc::Rc;

use clap::Parser;
use rlvm::machine::Machine;
use rlvm::scriptor::{ScenarioConfig, Scriptor};
use rlvm::{OpcodeRegistry, TextEncoding};

/// A safety bound on ticks run with no renderer to ever signal input;
/// without it a scenario that opens on a `Pause` would spin forever.
const MAX_STEPS: u64 = 200_000;

#[derive(Parser, Debug)]
#[command(about = "Launch the RLVM machine over a game directory", long_about = None)]
struct Args {
    /// Directory containing SEEN.TXT and Gameexe.ini.
    #[arg(value_name = "GAME_DIRECTORY")]
    game_directory: PathBuf,

    /// Emit debug-level tracing.
    #[arg(short, long)]
    verbose: bool,

    /// Scenario to start from instead of the archive's lowest-numbered
    /// scenario.
    #[arg(long, value_name = "N")]
    scenario: Option<u32>,
}

fn run(args: Args) -> rlvm_types::Result<()> {
    let archive = rlvm_cli::open_archive(&args.game_directory)?;
    let _gameexe = rlvm_cli::open_gameexe(&args.game_directory);

    let start_scenario = match args.scenario {
        Some(n) => n,
        None => archive.first_scenario()?.scenario_number,
    };

    let scenario_config = ScenarioConfig {
        text_encoding: TextEncoding::Cp932,
        enable_message_savepoint: true,
        enable_selcom_savepoint: true,
        enable_seentop_savepoint: true,
    };
    let scriptor = Scriptor::new(&archive, scenario_config);
    let registry = Rc::new(OpcodeRegistry::new());
    if registry.is_empty() {
        tracing::warn!("opcode registry is empty; every Command will log as undefined");
    }

    let mut machine = Machine::new(scriptor, registry, start_scenario)?;
    let mut steps = 0u64;
    while !machine.halted() && steps < MAX_STEPS {
        machine.step()?;
        steps += 1;
    }

    if machine.halted() {
        tracing::info!(steps, scenario = machine.current_scenario(), "machine halted");
    } else {
        tracing::warn!(steps, "hit the step cap before the machine halted");
    }
    Ok(())
}

fn main() -> ExitCode {
    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(e) => {
            use clap::error::ErrorKind;
            match e.kind() {
                ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => {
                    print!("{e}");
                    return ExitCode::SUCCESS;
                }
                _ => {
                    eprint!("{e}");
                    return ExitCode::from(1);
                }
            }
        }
    };
    rlvm_cli::init_tracing(args.verbose);
    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!(%err, "fatal");
            ExitCode::from(rlvm_cli::exit_code_for_error(&err) as u8)
        }
    }
}
