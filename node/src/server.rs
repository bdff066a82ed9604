//! # API Server Lifecycle
//!
//! Owns the one ledger handle and, while running, the listener task.
//!
//! ```text
//! open / with_ledger ──▶ Created ──start()──▶ Running ──stop()──▶ Stopped
//! ```
//!
//! `start` returns as soon as the socket is bound; serving happens on a
//! background task. `stop` closes the ledger first, then asks axum to drain
//! in-flight requests and waits at most the grace period for it.

use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use chainlite_ledger::{Ledger, LedgerError};

use crate::api::{create_router, AppState, LedgerHandle};
use crate::metrics::SharedMetrics;

/// How long `stop` waits for in-flight requests before giving up on them.
pub const SHUTDOWN_GRACE_PERIOD: Duration = Duration::from_secs(5);

/// Errors surfaced by the server lifecycle.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error("failed to bind listener on {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("server is already listening on {0}")]
    AlreadyRunning(SocketAddr),

    #[error("in-flight requests did not finish within {0:?}")]
    ShutdownTimeout(Duration),

    #[error("serve task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// The listener half of a running server.
struct Listening {
    local_addr: SocketAddr,
    shutdown_tx: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

/// HTTP facade over a single [`Ledger`].
pub struct Server<L: Ledger> {
    state: AppState<L>,
    listening: Option<Listening>,
    grace_period: Duration,
}

impl<L: Ledger> Server<L> {
    /// Open the ledger called `name` and wrap it in a server. Nothing is
    /// kept if the ledger fails to open.
    pub fn open(name: &str, metrics: SharedMetrics) -> Result<Self, ServerError> {
        let ledger = L::open(name)?;
        Ok(Self::with_ledger(ledger, metrics))
    }

    /// Wrap an already-open ledger.
    pub fn with_ledger(ledger: L, metrics: SharedMetrics) -> Self {
        Self {
            state: AppState {
                ledger: LedgerHandle::new(ledger),
                metrics,
            },
            listening: None,
            grace_period: SHUTDOWN_GRACE_PERIOD,
        }
    }

    /// Override the shutdown grace period.
    pub fn with_grace_period(mut self, grace_period: Duration) -> Self {
        self.grace_period = grace_period;
        self
    }

    /// Bind `addr`, register the block routes, and start serving in the
    /// background. Returns the bound address.
    ///
    /// A serve-loop failure that was not requested by [`Server::stop`]
    /// terminates the process.
    pub async fn start(&mut self, addr: &str) -> Result<SocketAddr, ServerError> {
        if let Some(listening) = &self.listening {
            return Err(ServerError::AlreadyRunning(listening.local_addr));
        }

        let bind_err = |source| ServerError::Bind {
            addr: addr.to_string(),
            source,
        };
        let listener = TcpListener::bind(addr).await.map_err(bind_err)?;
        let local_addr = listener.local_addr().map_err(bind_err)?;

        let router = create_router(self.state.clone());
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

        let task = tokio::spawn(async move {
            let serve = axum::serve(listener, router).with_graceful_shutdown(async move {
                // Fires on an explicit stop and when the sender is dropped.
                let _ = shutdown_rx.await;
            });
            if let Err(e) = serve.await {
                tracing::error!(%local_addr, error = %e, "API listener failed");
                std::process::exit(1);
            }
            tracing::debug!(%local_addr, "API listener drained");
        });

        tracing::info!(%local_addr, "API server listening");
        self.listening = Some(Listening {
            local_addr,
            shutdown_tx,
            task,
        });
        Ok(local_addr)
    }

    /// Close the ledger, then shut the listener down gracefully.
    ///
    /// Consumes the server, so the ledger is closed exactly once. If the
    /// grace period ends first, the serve loop is aborted and
    /// [`ServerError::ShutdownTimeout`] is returned. axum runs each
    /// connection on its own task, so connections still open at that point
    /// are detached rather than cancelled: they finish on the runtime, and
    /// any ledger call they make fails with `ledger is closed`.
    pub async fn stop(self) -> Result<(), ServerError> {
        tracing::info!("stopping server");

        let closed = self.state.ledger.close();
        if let Err(e) = &closed {
            tracing::error!(error = %e, "failed to close ledger");
        }

        if let Some(listening) = self.listening {
            let _ = listening.shutdown_tx.send(());
            let mut task = listening.task;
            match tokio::time::timeout(self.grace_period, &mut task).await {
                Ok(joined) => joined?,
                Err(_) => {
                    task.abort();
                    tracing::warn!(
                        grace_period = ?self.grace_period,
                        "graceful shutdown timed out, detaching open connections"
                    );
                    return Err(ServerError::ShutdownTimeout(self.grace_period));
                }
            }
        }

        closed?;
        tracing::info!("server stopped");
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
