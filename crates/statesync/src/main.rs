#![allow(clippy::future_not_send)]

mod cli;
mod commands;
mod error;
mod output;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use statesync_config::{Config, LogSettings};

use crate::cli::{Cli, Command};
use crate::error::CliError;

// Adapters are `!Send`; everything runs on one thread.
#[tokio::main(flavor = "current_thread")]
async fn main() {
    let cli = Cli::parse();

    if let Err(err) = run(cli).await {
        let code = err.exit_code();
        eprintln!("{:?}", miette::Report::new(err));
        std::process::exit(code);
    }
}

fn init_tracing(verbosity: u8, log: &LogSettings) {
    let filter = match verbosity {
        0 => log.level.as_str(),
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    let builder = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(std::io::stderr)
        .with_target(false);
    if log.json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn load_config(global: &cli::GlobalOpts) -> Result<Config, CliError> {
    let config = match &global.config {
        Some(path) => statesync_config::load_config_from(path)?,
        None => statesync_config::load_config()?,
    };
    Ok(config)
}

async fn run(cli: Cli) -> Result<(), CliError> {
    // Completions must work even with a broken config file
    if let Command::Completions(args) = &cli.command {
        use clap::CommandFactory;
        use clap_complete::generate;

        let mut cmd = Cli::command();
        generate(args.shell, &mut cmd, "statesync", &mut std::io::stdout());
        return Ok(());
    }

    let config = match load_config(&cli.global) {
        Ok(config) => config,
        Err(err) => {
            init_tracing(cli.global.verbose, &LogSettings::default());
            return Err(err);
        }
    };
    init_tracing(cli.global.verbose, &config.log);

    tracing::debug!(command = ?cli.command, "dispatching command");
    commands::dispatch(cli.command, &cli.global, &config).await
}
