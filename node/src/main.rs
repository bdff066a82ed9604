// Copyright (c) 2026 ALAS Technology. MIT License.
// See LICENSE for details.

//! # chainlite Node
//!
//! Entry point for the `chainlite-node` binary. Parses CLI arguments,
//! initializes logging and metrics, opens the ledger, and serves the block
//! API until SIGINT/SIGTERM.
//!
//! Subcommands:
//!
//! - `run`: serve the HTTP API
//! - `verify`: check an on-disk chain and exit
//! - `version`: print build version information

mod api;
mod cli;
mod logging;
mod metrics;
mod server;

use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Arc;
use tokio::signal;

use chainlite_ledger::{Ledger, MemoryLedger, SledLedger};

use cli::{Commands, NodeCli};
use logging::LogFormat;
use metrics::NodeMetrics;
use server::Server;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = NodeCli::parse();

    match cli.command {
        Commands::Run(args) => run_node(args).await,
        Commands::Verify(args) => verify_ledger(args),
        Commands::Version => {
            print_version();
            Ok(())
        }
    }
}

/// Opens the ledger and serves the API and metrics listeners until a
/// shutdown signal arrives.
async fn run_node(args: cli::RunArgs) -> Result<()> {
    logging::init_logging(logging::DEFAULT_LOG_FILTER, args.log_format);

    tracing::info!(
        name = %args.name,
        listen = %args.listen,
        metrics_listen = %args.metrics_listen,
        in_memory = args.in_memory,
        "starting chainlite-node"
    );

    let node_metrics = Arc::new(NodeMetrics::new());

    // --- Metrics server ---
    let metrics_listener = tokio::net::TcpListener::bind(&args.metrics_listen)
        .await
        .with_context(|| format!("failed to bind metrics listener on {}", args.metrics_listen))?;
    tracing::info!("metrics server listening on {}", args.metrics_listen);
    let metrics_app = metrics::metrics_router(Arc::clone(&node_metrics));
    let metrics_task = tokio::spawn(async move {
        if let Err(e) = axum::serve(metrics_listener, metrics_app).await {
            tracing::error!("metrics server error: {}", e);
        }
    });

    // --- Ledger + API server ---
    let grace_period = std::time::Duration::from_secs(args.shutdown_grace_secs);
    let result = if args.in_memory {
        let server = Server::<MemoryLedger>::open(&args.name, Arc::clone(&node_metrics))
            .context("failed to open in-memory ledger")?;
        serve_until_signal(server.with_grace_period(grace_period), &args.listen).await
    } else {
        let ledger = SledLedger::open(&args.name)
            .with_context(|| format!("failed to open ledger at {}", args.name))?;
        let blocks = ledger
            .verify()
            .with_context(|| format!("ledger at {} failed its integrity check", args.name))?;
        tracing::info!(blocks, "ledger integrity verified");
        let server = Server::with_ledger(ledger, node_metrics).with_grace_period(grace_period);
        serve_until_signal(server, &args.listen).await
    };

    metrics_task.abort();
    result
}

/// Starts `server` on `listen`, waits for SIGINT/SIGTERM, then stops it.
async fn serve_until_signal<L: Ledger>(mut server: Server<L>, listen: &str) -> Result<()> {
    let addr = server
        .start(listen)
        .await
        .context("failed to start API server")?;
    tracing::info!(%addr, "accepting block requests");

    shutdown_signal().await;
    tracing::info!("shutdown signal received, draining connections");

    server.stop().await.context("graceful shutdown failed")?;
    tracing::info!("chainlite-node stopped");
    Ok(())
}

/// Checks the hash chain of an on-disk ledger and prints the block count.
fn verify_ledger(args: cli::VerifyArgs) -> Result<()> {
    logging::init_logging("chainlite_node=info,chainlite_ledger=info", LogFormat::Pretty);

    let ledger = SledLedger::open(&args.name)
        .with_context(|| format!("failed to open ledger at {}", args.name))?;
    let blocks = ledger
        .verify()
        .with_context(|| format!("ledger at {} is corrupted", args.name))?;
    ledger.close()?;

    println!("Ledger verified.");
    println!("  Path   : {}", args.name);
    println!("  Blocks : {}", blocks);
    Ok(())
}

/// Prints version information to stdout.
fn print_version() {
    println!("chainlite-node   {}", env!("CARGO_PKG_VERSION"));
    println!("chainlite-ledger {}", chainlite_ledger::config::LEDGER_VERSION);
}

/// Resolves on SIGINT (Ctrl+C) or SIGTERM, whichever comes first.
///
/// On non-Unix platforms, only Ctrl+C is supported.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!("failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
