//! sdnfuzz command line.
//!
//! Offline tooling for superlogs, the ordered event logs recorded by the
//! fuzzer.
//!
//! # Quick Start
//!
//! ```bash
//! # What is in this trace?
//! sdnfuzz show superlog.json
//!
//! # Does every record decode?
//! sdnfuzz validate superlog.json
//!
//! # Drop two input events, refusing if anything depends on them
//! sdnfuzz prune superlog.json --drop e4,e9 -o minimized.json
//!
//! # Walk the trace against a permissive stand-in network
//! sdnfuzz dry-run minimized.json
//! ```

mod commands;

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::{Parser, Subcommand};
use sdnfuzz_config::SdnfuzzConfig;
use sdnfuzz_replay::ReplayError;
use tracing_subscriber::EnvFilter;

/// sdnfuzz - inspect, minimize and replay SDN fault-injection traces.
#[derive(Parser)]
#[command(name = "sdnfuzz")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Directory holding sdnfuzz.toml / sdnfuzz.local.toml.
    #[arg(long, global = true, default_value = ".")]
    project: PathBuf,

    /// Read configuration from this file only, ignoring every other source.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Summarize a superlog.
    Show {
        /// Path to the superlog.
        superlog: PathBuf,

        /// List every event, not just the counts.
        #[arg(long)]
        events: bool,

        /// Print the summary as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Decode every record and report the first malformed line.
    Validate {
        /// Path to the superlog.
        superlog: PathBuf,
    },

    /// Drop input events, refusing any that other events depend on.
    Prune {
        /// Path to the superlog.
        superlog: PathBuf,

        /// Labels of the input events to drop (comma separated).
        #[arg(short, long, value_delimiter = ',', required = true)]
        drop: Vec<String>,

        /// Where to write the pruned superlog.
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Replay a superlog against a stand-in network that accepts everything.
    DryRun {
        /// Path to the superlog.
        superlog: PathBuf,

        /// Fail on any correctness violation regardless of `fail_on_error`.
        #[arg(long)]
        strict: bool,

        /// Give up on an event after this many attempts (0 retries forever).
        #[arg(long)]
        max_attempts: Option<u32>,
    },

    /// Print the effective configuration.
    Config {
        /// Output format (toml, json).
        #[arg(short, long, default_value = "toml")]
        format: String,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("Error: {err:#}");
            let code = err
                .downcast_ref::<ReplayError>()
                .map_or(1, ReplayError::exit_code);
            ExitCode::from(code)
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    let config = load_config(&cli)?;
    init_logging(&config);

    match cli.command {
        Commands::Show {
            superlog,
            events,
            json,
        } => commands::show::run(&superlog, events, json),
        Commands::Validate { superlog } => commands::validate::run(&superlog),
        Commands::Prune {
            superlog,
            drop,
            output,
        } => commands::prune::run(&superlog, &drop, &output),
        Commands::DryRun {
            superlog,
            strict,
            max_attempts,
        } => commands::dry_run::run(&superlog, &config, strict, max_attempts),
        Commands::Config { format } => commands::config::show(&config, &format),
    }
}

fn load_config(cli: &Cli) -> Result<SdnfuzzConfig> {
    match &cli.config {
        Some(file) => Ok(sdnfuzz_config::load_file(file)?),
        None => SdnfuzzConfig::load_from_dir(&cli.project),
    }
}

/// `RUST_LOG` wins over the configured filter. Logs go to stderr so that
/// `--json` output stays parseable.
fn init_logging(config: &SdnfuzzConfig) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.logging.filter))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn drop_accepts_comma_separated_labels() {
        let cli = Cli::try_parse_from([
            "sdnfuzz", "prune", "log.json", "--drop", "e1,e4", "--drop", "e7", "-o", "out.json",
        ])
        .unwrap();
        match cli.command {
            Commands::Prune { drop, output, .. } => {
                assert_eq!(drop, ["e1", "e4", "e7"]);
                assert_eq!(output, PathBuf::from("out.json"));
            }
            _ => panic!("expected prune"),
        }
    }

    #[test]
    fn global_options_follow_the_subcommand() {
        let cli =
            Cli::try_parse_from(["sdnfuzz", "config", "--project", "/tmp/trace"]).unwrap();
        assert_eq!(cli.project, PathBuf::from("/tmp/trace"));
        assert!(cli.config.is_none());
    }
}
