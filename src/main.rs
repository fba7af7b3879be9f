//! tiny-shell entry point.
//!
//! Usage:
//!   tiny-shell                  # Interactive REPL
//!   tiny-shell -c <line>        # Run one line and exit with its status
//!   tiny-shell -f shell.toml    # REPL with a config file

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use argh::FromArgs;
use tiny_shell::{Config, Interpreter};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[derive(FromArgs)]
/// A tiny shell: pipelines, redirects and a handful of builtins.
struct Args {
    #[argh(option, short = 'f')]
    /// configuration file to load before the first prompt.
    config: Option<PathBuf>,

    #[argh(option, short = 'c')]
    /// run one line non-interactively and exit with its status.
    command: Option<String>,

    #[argh(switch, short = 'v')]
    /// print the version and exit.
    version: bool,
}

fn main() -> ExitCode {
    // Initialize tracing (respects RUST_LOG env var, warnings by default)
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .init();

    let args: Args = argh::from_env();
    match run(args) {
        Ok(code) => ExitCode::from(code as u8),
        Err(e) => {
            eprintln!("{e:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(args: Args) -> Result<i32> {
    if args.version {
        println!("tiny-shell {}", env!("CARGO_PKG_VERSION"));
        return Ok(0);
    }

    let config = match &args.config {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };
    let mut shell = Interpreter::default().with_config(config);

    if let Some(line) = &args.command {
        let status = shell.run_line(line);
        shell.report_finished_jobs();
        return Ok(status);
    }

    Ok(shell.repl()?)
}
