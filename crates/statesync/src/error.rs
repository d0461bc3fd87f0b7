//! CLI error types with miette diagnostics.
//!
//! Maps `CoreError` and `ConfigError` into user-facing errors with
//! actionable help text.

use miette::Diagnostic;
use thiserror::Error;

use statesync_config::ConfigError;
use statesync_core::CoreError;

pub mod exit_code {
    pub const GENERAL: i32 = 1;
    pub const USAGE: i32 = 2;
    pub const NOT_FOUND: i32 = 4;
    pub const CONNECTION: i32 = 7;
}

#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    // ── Store ────────────────────────────────────────────────────────
    #[error("Remote store error: {message}")]
    #[diagnostic(
        code(statesync::store),
        help("The store could not complete the request. Re-run with -v for details.")
    )]
    Store { message: String },

    #[error("Could not load seed document {path}: {reason}")]
    #[diagnostic(
        code(statesync::seed),
        help("The seed must be a single JSON document whose keys are valid path segments.")
    )]
    Seed { path: String, reason: String },

    #[error("Nothing stored at {path}")]
    #[diagnostic(
        code(statesync::not_found),
        help("Check --namespace and the seed document.")
    )]
    NotFound { path: String },

    #[error("Adapter closed before '{operation}' could run")]
    #[diagnostic(code(statesync::closed))]
    Closed { operation: &'static str },

    #[error("Cannot decode '{key}': {reason}")]
    #[diagnostic(code(statesync::decode))]
    Decode { key: String, reason: String },

    // ── Validation ───────────────────────────────────────────────────
    #[error("Invalid value for {field}: {reason}")]
    #[diagnostic(code(statesync::validation))]
    Validation { field: String, reason: String },

    #[error("Invalid script line {line}: {reason}")]
    #[diagnostic(
        code(statesync::script),
        help(
            "Each line must be a JSON object with either \"key\" (relative to the\n\
             collection) or \"path\" (relative to the namespace), plus an optional\n\
             \"value\". A missing or null value deletes."
        )
    )]
    Script { line: usize, reason: String },

    // ── Configuration ────────────────────────────────────────────────
    #[error("Configuration file already exists at {path}")]
    #[diagnostic(
        code(statesync::config_exists),
        help("Use --force to overwrite it.")
    )]
    ConfigExists { path: String },

    #[error(transparent)]
    #[diagnostic(code(statesync::config))]
    Config(#[from] ConfigError),

    // ── IO / Serialization ───────────────────────────────────────────
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("JSON serialization failed: {0}")]
    #[diagnostic(code(statesync::json))]
    Json(#[from] serde_json::Error),

    #[error("YAML serialization failed: {0}")]
    #[diagnostic(code(statesync::yaml))]
    Yaml(#[from] serde_yaml::Error),

    #[error("TOML serialization failed: {0}")]
    #[diagnostic(code(statesync::toml))]
    Toml(#[from] toml::ser::Error),
}

impl CliError {
    /// Map this error to an exit code for process termination.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Store { .. } => exit_code::CONNECTION,
            Self::NotFound { .. } => exit_code::NOT_FOUND,
            Self::Validation { .. }
            | Self::Script { .. }
            | Self::Config(ConfigError::Validation { .. }) => exit_code::USAGE,
            _ => exit_code::GENERAL,
        }
    }
}

// ── CoreError → CliError mapping ─────────────────────────────────────

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::Transport { message, .. } => CliError::Store { message },
            CoreError::Closed { operation } => CliError::Closed { operation },
            CoreError::Decode { key, reason } => CliError::Decode { key, reason },
            CoreError::InvalidKey { key, reason } => CliError::Validation {
                field: format!("key '{key}'"),
                reason,
            },
            CoreError::Encode { reason } => CliError::Validation {
                field: "value".into(),
                reason,
            },
            CoreError::Config { message } => CliError::Validation {
                field: "path".into(),
                reason: message,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transport_failures_exit_with_connection_code() {
        let err = CliError::from(CoreError::Transport {
            message: "offline".into(),
            transient: true,
        });
        assert_eq!(err.exit_code(), exit_code::CONNECTION);
    }

    #[test]
    fn bad_keys_are_usage_errors() {
        let err = CliError::from(CoreError::InvalidKey {
            key: "a.b".into(),
            reason: "segment contains '.'".into(),
        });
        assert_eq!(err.exit_code(), exit_code::USAGE);
        assert_eq!(
            err.to_string(),
            "Invalid value for key 'a.b': segment contains '.'"
        );
    }

    #[test]
    fn config_validation_is_a_usage_error() {
        let err = CliError::from(ConfigError::Validation {
            field: "log.level".into(),
            reason: "nope".into(),
        });
        assert_eq!(err.exit_code(), exit_code::USAGE);
        assert_eq!(
            CliError::NotFound { path: "/x".into() }.exit_code(),
            exit_code::NOT_FOUND
        );
    }
}
