//! Command handlers, one module per subcommand.

pub mod config_cmd;
pub mod get;
pub mod replay;

use std::sync::Arc;

use statesync_config::Config;
use statesync_core::{Connection, MemoryStore, Path};

use crate::cli::{Command, GlobalOpts};
use crate::error::CliError;

pub async fn dispatch(cmd: Command, global: &GlobalOpts, config: &Config) -> Result<(), CliError> {
    match cmd {
        Command::Get(args) => get::handle(args, global, config).await,
        Command::Replay(args) => replay::handle(args, global, config).await,
        Command::Config(args) => config_cmd::handle(args, global, config),
        // Handled before the config is loaded
        Command::Completions(_) => Ok(()),
    }
}

/// Seed the in-process store and open a connection with flag overrides
/// applied on top of the config file.
pub fn connect(global: &GlobalOpts, config: &Config) -> Result<Connection, CliError> {
    let store = match global.seed.as_ref().or(config.store.seed.as_ref()) {
        Some(seed) => MemoryStore::load(seed).map_err(|err| CliError::Seed {
            path: seed.display().to_string(),
            reason: err.to_string(),
        })?,
        None => MemoryStore::new(),
    };

    let mut settings = config.connection_config()?;
    if let Some(namespace) = &global.namespace {
        settings.namespace = Some(parse_path("namespace", namespace)?);
    }
    tracing::debug!(namespace = ?settings.namespace, "connecting to in-process store");
    Ok(Connection::new(Arc::new(store), settings))
}

pub fn parse_path(field: &str, raw: &str) -> Result<Path, CliError> {
    Path::parse(raw).map_err(|err| CliError::Validation {
        field: field.into(),
        reason: err.to_string(),
    })
}
