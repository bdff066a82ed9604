//! # CLI Interface
//!
//! Command-line structure for `chainlite-node`, built with `clap` derive.
//! Every flag of `run` can also be set from the environment.

use clap::{Parser, Subcommand};

use chainlite_ledger::config::DEFAULT_LEDGER_NAME;

use crate::logging::LogFormat;

/// chainlite ledger node.
///
/// Serves an append-only block ledger over a small JSON HTTP API and
/// exposes Prometheus metrics on a separate listener.
#[derive(Parser, Debug)]
#[command(
    name = "chainlite-node",
    about = "HTTP facade over an append-only block ledger",
    version,
    propagate_version = true
)]
pub struct NodeCli {
    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level subcommands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Open the ledger and serve the HTTP API until interrupted.
    Run(RunArgs),
    /// Check the hash chain of an on-disk ledger and exit.
    Verify(VerifyArgs),
    /// Print version information and exit.
    Version,
}

/// Arguments for the `run` subcommand.
#[derive(Parser, Debug)]
pub struct RunArgs {
    /// Ledger name. For the persistent ledger this is the data directory,
    /// created on first run.
    #[arg(long, short = 'n', env = "CHAINLITE_NAME", default_value = DEFAULT_LEDGER_NAME)]
    pub name: String,

    /// Address the block API listens on.
    #[arg(long, short = 'l', env = "CHAINLITE_LISTEN", default_value = "127.0.0.1:8080")]
    pub listen: String,

    /// Address the Prometheus `/metrics` endpoint listens on.
    #[arg(long, env = "CHAINLITE_METRICS_LISTEN", default_value = "127.0.0.1:9090")]
    pub metrics_listen: String,

    /// Keep blocks in memory only. Nothing is written to disk and the
    /// chain is gone when the process exits.
    #[arg(long, env = "CHAINLITE_IN_MEMORY")]
    pub in_memory: bool,

    /// Seconds `stop` waits for in-flight requests before giving up on them.
    #[arg(long, env = "CHAINLITE_SHUTDOWN_GRACE_SECS", default_value_t = 5)]
    pub shutdown_grace_secs: u64,

    /// Log output format.
    #[arg(long, env = "CHAINLITE_LOG_FORMAT", value_enum, default_value_t = LogFormat::Pretty)]
    pub log_format: LogFormat,
}

/// Arguments for the `verify` subcommand.
#[derive(Parser, Debug)]
pub struct VerifyArgs {
    /// Ledger data directory to check.
    #[arg(long, short = 'n', env = "CHAINLITE_NAME", default_value = DEFAULT_LEDGER_NAME)]
    pub name: String,
}
