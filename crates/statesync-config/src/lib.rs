//! Shared configuration for statesync tools.
//!
//! Layers built-in defaults, a TOML file under the platform config directory
//! and `STATESYNC_*` environment variables, then translates the result into a
//! `statesync_core::ConnectionConfig`.

use std::path::{Path as FsPath, PathBuf};

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use statesync_core::{ConnectionConfig, Path};

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("failed to serialize config: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

// ── TOML config structs ─────────────────────────────────────────────

/// Top-level TOML configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct Config {
    /// Where adapters read and write.
    #[serde(default)]
    pub store: StoreSettings,

    /// Diagnostics output.
    #[serde(default)]
    pub log: LogSettings,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct StoreSettings {
    /// Path prefix for every adapter, e.g. `games/g1`.
    pub namespace: Option<String>,

    /// JSON document used to seed the in-process store.
    pub seed: Option<PathBuf>,

    /// Undelivered-event count that triggers a backlog warning.
    #[serde(default = "default_backlog")]
    pub backlog: usize,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            namespace: None,
            seed: None,
            backlog: default_backlog(),
        }
    }
}

fn default_backlog() -> usize {
    ConnectionConfig::default().channel_warn_depth
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct LogSettings {
    /// Default filter when `RUST_LOG` is unset.
    #[serde(default = "default_level")]
    pub level: String,

    /// Emit JSON lines instead of human-readable logs.
    #[serde(default)]
    pub json: bool,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            level: default_level(),
            json: false,
        }
    }
}

fn default_level() -> String {
    "warn".into()
}

impl Config {
    /// Check every field that can be wrong in a way serde cannot see.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.namespace()?;
        if self.store.backlog == 0 {
            return Err(ConfigError::Validation {
                field: "store.backlog".into(),
                reason: "must be greater than zero".into(),
            });
        }
        if !LOG_LEVELS.contains(&self.log.level.as_str()) {
            return Err(ConfigError::Validation {
                field: "log.level".into(),
                reason: format!(
                    "expected one of {}, got '{}'",
                    LOG_LEVELS.join(", "),
                    self.log.level
                ),
            });
        }
        Ok(())
    }

    /// The parsed namespace, if one is configured.
    pub fn namespace(&self) -> Result<Option<Path>, ConfigError> {
        self.store
            .namespace
            .as_deref()
            .map(|raw| {
                Path::parse(raw).map_err(|err| ConfigError::Validation {
                    field: "store.namespace".into(),
                    reason: err.to_string(),
                })
            })
            .transpose()
    }

    /// Translate into the runtime settings a `Connection` is built with.
    pub fn connection_config(&self) -> Result<ConnectionConfig, ConfigError> {
        self.validate()?;
        Ok(ConnectionConfig {
            namespace: self.namespace()?,
            channel_warn_depth: self.store.backlog,
        })
    }
}

// ── Config file path ────────────────────────────────────────────────

/// Resolve the config file path via XDG / platform conventions.
pub fn config_path() -> PathBuf {
    ProjectDirs::from("dev", "statesync", "statesync").map_or_else(
        || {
            let mut p = dirs_fallback();
            p.push("config.toml");
            p
        },
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

fn dirs_fallback() -> PathBuf {
    let mut p = PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()));
    p.push(".config");
    p.push("statesync");
    p
}

// ── Config loading ──────────────────────────────────────────────────

/// Load the full Config from the canonical file plus environment.
pub fn load_config() -> Result<Config, ConfigError> {
    load_config_from(&config_path())
}

/// Load from an explicit file. A missing file contributes nothing.
pub fn load_config_from(path: &FsPath) -> Result<Config, ConfigError> {
    let figment = Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed("STATESYNC_").split("_"));

    let config: Config = figment.extract()?;
    config.validate()?;
    Ok(config)
}

// ── Config saving ───────────────────────────────────────────────────

/// Serialize config to TOML and write to the canonical config path.
pub fn save_config(cfg: &Config) -> Result<PathBuf, ConfigError> {
    let path = config_path();
    save_config_to(cfg, &path)?;
    Ok(path)
}

pub fn save_config_to(cfg: &Config, path: &FsPath) -> Result<(), ConfigError> {
    cfg.validate()?;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let toml_str = toml::to_string_pretty(cfg)?;
    std::fs::write(path, toml_str)?;
    Ok(())
}
