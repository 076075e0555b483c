//! `agentctl` command surface — illustrative, not the core of this
//! workspace. Mirrors the shape of the gateway's own `Cli`/`Command` pair,
//! scoped down to the three things this binary actually drives: one-shot
//! runs, the HTTP façade, and config file management.

use clap::{Parser, Subcommand};

/// agentctl — run and serve agents built on this runtime.
#[derive(Debug, Parser)]
#[command(name = "agentctl", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Send a single task to the agent and print the response.
    Run {
        /// The task to run.
        task: String,
        /// Session id (a fresh one is generated if omitted).
        #[arg(long)]
        session: Option<String>,
        /// Model override (unused by the bundled echo model; for embedders).
        #[arg(long)]
        model: Option<String>,
        /// Print each event as it arrives instead of only the final answer.
        #[arg(long)]
        stream: bool,
        /// Comma-separated tool whitelist; omit for "all", pass an empty
        /// string for "none".
        #[arg(long)]
        tools: Option<String>,
    },
    /// Start the HTTP façade (`/api/run`, `/api/run/stream`, `/health`).
    Serve {
        #[arg(long, default_value = "127.0.0.1")]
        host: String,
        #[arg(long, default_value_t = 8085)]
        port: u16,
    },
    /// Configuration utilities.
    #[command(subcommand)]
    Config(ConfigCommand),
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Write a default config file if one does not already exist.
    Init,
    /// Set a single config key.
    Set { key: String, value: String },
    /// Print a single config value.
    Get { key: String },
    /// List every known config key and its current value.
    List,
}

/// Parses `--tools` into the orchestrator's whitelist semantics: `None`
/// (flag absent) means every registered tool, `Some(vec![])` (flag given
/// empty) means none, `Some(names)` means only those names.
pub fn parse_tool_whitelist(tools: Option<String>) -> Option<Vec<String>> {
    tools.map(|raw| raw.split(',').map(str::trim).filter(|s| !s.is_empty()).map(String::from).collect())
}
