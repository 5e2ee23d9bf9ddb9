//! `rlkp`: dumps a human-readable disassembly of a game's scenarios.

use std::fs;
use std::io::{self, Write};
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use rlvm::scriptor::{ScenarioConfig, Scriptor};
use rlvm::TextEncoding;

#[derive(Parser, Debug)]
#[command(about = "Dump a human-readable disassembly of SEEN.TXT scenarios", long_about = None)]
struct Args {
    /// Directory containing SEEN.TXT.
    #[arg(value_name = "DIRECTORY")]
    directory: PathBuf,

    /// Where to write the dump: a directory (one file per scenario) or
    /// `stdout`.
    #[arg(long, value_name = "DIR|stdout", default_value = "stdout")]
    output: String,

    /// Scenario number to disassemble; repeatable. Omitted means every
    /// scenario in the archive.
    #[arg(long = "scenario", value_name = "N")]
    scenarios: Vec<u32>,
}

fn default_scenario_config() -> ScenarioConfig {
    ScenarioConfig {
        text_encoding: TextEncoding::Cp932,
        enable_message_savepoint: true,
        enable_selcom_savepoint: true,
        enable_seentop_savepoint: true,
    }
}

/// Render every instruction in `scenario_number` as one line per element.
fn disassemble(scriptor: &Scriptor<'_>, scenario_number: u32) -> rlvm_types::Result<String> {
    let mut out = String::new();
    let mut cursor = scriptor.load_start(scenario_number)?;
    while scriptor.has_next(cursor)? {
        let instruction = scriptor.resolve(cursor)?;
        out.push_str(&format!("{:>6}: {:?}\n", cursor.index, instruction));
        cursor = scriptor.next(cursor);
    }
    Ok(out)
}

fn run(args: Args) -> rlvm_types::Result<()> {
    let archive = rlvm_cli::open_archive(&args.directory)?;
    let scriptor = Scriptor::new(&archive, default_scenario_config());

    let targets: Vec<u32> = if args.scenarios.is_empty() {
        archive.scenario_numbers().collect()
    } else {
        args.scenarios.clone()
    };

    if args.output.eq_ignore_ascii_case("stdout") {
        let stdout = io::stdout();
        let mut handle = stdout.lock();
        for number in targets {
            let _ = writeln!(handle, "; scenario {number}");
            let _ = write!(handle, "{}", disassemble(&scriptor, number)?);
        }
    } else {
        let out_dir = PathBuf::from(&args.output);
        fs::create_dir_all(&out_dir).map_err(|e| {
            rlvm_types::Error::NotFound(format!("cannot create {}: {e}", out_dir.display()))
        })?;
        for number in targets {
            let text = disassemble(&scriptor, number)?;
            let path = out_dir.join(format!("SEEN{number:04}.txt"));
            fs::write(&path, text).map_err(|e| {
                rlvm_types::Error::NotFound(format!("cannot write {}: {e}", path.display()))
            })?;
        }
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
    rlvm_cli::init_tracing(false);
    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!(%err, "fatal");
            ExitCode::from(rlvm_cli::exit_code_for_error(&err) as u8)
        }
    }
}
