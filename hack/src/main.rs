mod cli;
mod manifest;
mod sink;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

use engine::exit_codes;

#[derive(Parser)]
#[command(
    name = "hack",
    version,
    about = "Differential stress tester for contest submissions"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Stress-test every candidate in a manifest against its reference.
    Run {
        manifest: PathBuf,
        /// Engine config (default: `hack.toml` in the current directory).
        #[arg(long)]
        config: Option<PathBuf>,
        /// Verdict log (default: `<contest>_hack.log` next to the manifest).
        #[arg(long)]
        sink: Option<PathBuf>,
        /// Per-candidate budget, overriding manifest and config.
        #[arg(long)]
        timeout_secs: Option<u64>,
    },
    /// Print the generated input for one seed.
    Generate {
        generator: String,
        #[arg(long, default_value_t = 1)]
        seed: u64,
    },
    /// List registered languages.
    Languages {
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// List built-in generators.
    Generators,
}

fn main() {
    engine::logging::init();
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("{err:#}");
            std::process::exit(exit_codes::INVALID);
        }
    }
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    match cli.command {
        Command::Run {
            manifest,
            config,
            sink,
            timeout_secs,
        } => cli::run_manifest(&cli::RunArgs {
            manifest,
            config,
            sink,
            timeout_secs,
        }),
        Command::Generate { generator, seed } => {
            cli::generate(&generator, seed)?;
            Ok(exit_codes::OK)
        }
        Command::Languages { config } => {
            cli::list_languages(config.as_deref())?;
            Ok(exit_codes::OK)
        }
        Command::Generators => {
            cli::list_generators();
            Ok(exit_codes::OK)
        }
    }
}
