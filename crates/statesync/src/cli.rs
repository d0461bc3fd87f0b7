//! Clap derive structures for the `statesync` CLI.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

// ── Top-Level CLI ────────────────────────────────────────────────────

/// statesync -- inspect and replay changes against a tree store
#[derive(Debug, Parser)]
#[command(
    name = "statesync",
    version,
    about = "Inspect and replay changes against a statesync tree store",
    long_about = "Loads a JSON seed document into an in-process tree store and drives the\n\
        statesync adapters against it: read single documents, or replay a script\n\
        of writes and watch the change callbacks a collection adapter dispatches.",
    propagate_version = true,
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalOpts,

    #[command(subcommand)]
    pub command: Command,
}

// ── Global Options ───────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct GlobalOpts {
    /// Config file (defaults to the platform config directory)
    #[arg(long, env = "STATESYNC_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// JSON document to seed the store with (overrides config)
    #[arg(long, global = true)]
    pub seed: Option<PathBuf>,

    /// Path prefix for every adapter (overrides config)
    #[arg(long, short = 'n', global = true)]
    pub namespace: Option<String>,

    /// Output format
    #[arg(
        long,
        short = 'o',
        env = "STATESYNC_OUTPUT",
        default_value = "table",
        global = true
    )]
    pub output: OutputFormat,

    /// When to use color output
    #[arg(long, default_value = "auto", global = true)]
    pub color: ColorMode,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(long, short = 'v', action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(long, short = 'q', global = true)]
    pub quiet: bool,
}

// ── Output & Color Enums ─────────────────────────────────────────────

#[derive(Debug, Clone, ValueEnum)]
pub enum OutputFormat {
    /// Pretty table (default, interactive)
    Table,
    /// Pretty-printed JSON
    Json,
    /// Compact single-line JSON
    JsonCompact,
    /// YAML
    Yaml,
    /// Plain text, one value per line (scripting)
    Plain,
}

#[derive(Debug, Clone, ValueEnum)]
pub enum ColorMode {
    /// Auto-detect (color if terminal is interactive)
    Auto,
    /// Always emit color codes
    Always,
    /// Never emit color codes
    Never,
}

// ── Top-Level Command Enum ───────────────────────────────────────────

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Print the document stored at a path
    Get(GetArgs),

    /// Apply a script of writes and print every dispatched change
    #[command(alias = "r")]
    Replay(ReplayArgs),

    /// Manage CLI configuration
    Config(ConfigArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

// ── Get ──────────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct GetArgs {
    /// Document path, relative to the namespace (e.g. "settings")
    pub path: String,
}

// ── Replay ───────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct ReplayArgs {
    /// JSON-lines script; each line is {"key"|"path": .., "value": ..}
    pub script: PathBuf,

    /// Collection the adapter is bound to, relative to the namespace
    #[arg(long, short = 'c')]
    pub collection: String,

    /// Order the final items by this value field ("/a/b" for nested fields)
    #[arg(long, short = 's')]
    pub sort: Option<String>,

    /// Sort descending
    #[arg(long, requires = "sort")]
    pub desc: bool,

    /// How the ordered view is maintained
    #[arg(long, default_value = "incremental")]
    pub mode: ModeArg,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum ModeArg {
    /// Re-sort the whole collection on every change
    Rebuild,
    /// Patch only the affected entry
    Incremental,
}

// ── Config ───────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Write a config file with default settings
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// Display current resolved configuration
    Show,

    /// Print the config file location
    Path,
}

// ── Completions ──────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    pub shell: clap_complete::Shell,
}
