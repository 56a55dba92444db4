use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// contextd — context-management sidecar for long-running AI coding assistants.
#[derive(Debug, Parser)]
#[command(name = "contextd", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,

    /// Path to the TOML config file. Missing file falls back to defaults.
    #[arg(long, global = true, default_value = "contextd.toml")]
    pub config: PathBuf,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Start the sidecar server (default when no subcommand is given).
    Serve,
    /// Print the resolved configuration as TOML and exit.
    Config,
    /// Print version information.
    Version,
}
