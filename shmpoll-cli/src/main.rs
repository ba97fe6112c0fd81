//! ## shmpoll-cli
//! **Operator entry point for the epoll emulation**
//!
//! - `probe`: one wait over a socket pair and in-memory sessions
//! - `config`: print the effective layered configuration

use anyhow::Context;
use clap::Parser;
use shmpoll_telemetry::EventLogger;

mod commands;
mod error;

use commands::{Cli, Commands};

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = commands::load_config(cli.config.as_deref()).context("loading configuration")?;
    EventLogger::init(&config.telemetry.log_level);

    match cli.command {
        Commands::Probe(args) => {
            let report = commands::run_probe(&args, &config).context("running probe")?;
            print!("{report}");
        }
        Commands::Config => {
            print!("{}", commands::render_config(&config)?);
        }
    }
    Ok(())
}
