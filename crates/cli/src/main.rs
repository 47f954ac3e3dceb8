// migcheck CLI - migration reconciliation of two tabular snapshots

mod exit_codes;
mod export;
mod recon;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{ArgAction, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use exit_codes::EXIT_SUCCESS;

#[derive(Parser)]
#[command(name = "migcheck")]
#[command(about = "Certify that a data migration preserved the source of record")]
#[command(long_version = long_version())]
#[command(version)]
struct Cli {
    /// More log output (-v info, -vv debug). RUST_LOG overrides.
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Reconcile a target snapshot against its source of record
    #[command(after_help = "\
Examples:
  migcheck run orders.recon.toml
  migcheck run orders.recon.toml --out-dir results/
  migcheck run orders.recon.toml --target gcp.csv --source edw.csv --json
  migcheck run orders.recon.toml --output result.json -v

Exit codes: 0 match, 1 differences, 2 usage, 3 invalid config, 4 runtime failure")]
    Run {
        /// Path to the .recon.toml config file
        config: PathBuf,

        /// Target (migrated) CSV; overrides inputs.target
        #[arg(long, env = "MIGCHECK_TARGET")]
        target: Option<PathBuf>,

        /// Source-of-record CSV; overrides inputs.source
        #[arg(long, env = "MIGCHECK_SOURCE")]
        source: Option<PathBuf>,

        /// Write every output table as <DIR>/<table>.csv
        #[arg(long, value_name = "DIR")]
        out_dir: Option<PathBuf>,

        /// Print the full report as JSON to stdout
        #[arg(long)]
        json: bool,

        /// Write the full report as JSON to a file
        #[arg(long, short = 'o')]
        output: Option<PathBuf>,
    },

    /// Parse and validate a config without running
    Validate {
        /// Path to the .recon.toml config file
        config: PathBuf,
    },

    /// Show the roles discovered for two CSV files
    #[command(after_help = "\
Examples:
  migcheck roles gcp.csv edw.csv
  migcheck roles gcp.csv edw.csv --json")]
    Roles {
        target: PathBuf,
        source: PathBuf,

        /// Print the shared schema as JSON
        #[arg(long)]
        json: bool,
    },
}

fn long_version() -> &'static str {
    concat!(
        env!("CARGO_PKG_VERSION"),
        " (", env!("GIT_COMMIT_HASH"), ")",
        "\nengine:  migcheck-recon ", env!("CARGO_PKG_VERSION"),
        "\ntarget:  ", env!("TARGET"),
    )
}

/// Logs go to stderr so `--json` stdout stays a single document.
fn init_tracing(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let result = match cli.command {
        None => {
            eprintln!("Usage: migcheck <command> [options]");
            eprintln!("       migcheck --help for more information");
            Ok(())
        }
        Some(Commands::Run { config, target, source, out_dir, json, output }) => {
            recon::cmd_run(recon::RunArgs { config, target, source, out_dir, json, output })
        }
        Some(Commands::Validate { config }) => recon::cmd_validate(config),
        Some(Commands::Roles { target, source, json }) => recon::cmd_roles(target, source, json),
    };

    match result {
        Ok(()) => ExitCode::from(EXIT_SUCCESS),
        Err(CliError { code, message, hint }) => {
            if !message.is_empty() {
                eprintln!("error: {}", message);
            }
            if let Some(hint) = hint {
                eprintln!("hint:  {}", hint);
            }
            ExitCode::from(code)
        }
    }
}

#[derive(Debug)]
pub struct CliError {
    pub code: u8,
    pub message: String,
    pub hint: Option<String>,
}
