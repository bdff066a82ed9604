//! # Block API
//!
//! Builds the axum router that exposes the ledger over HTTP. Every response,
//! success or failure, is the same JSON envelope:
//!
//! ```text
//! {"code": <status>, "data"?: <any>, "error"?: <string>}
//! ```
//!
//! `code` always equals the HTTP status of the response.
//!
//! ## Endpoints
//!
//! | Method | Path              | Success               | Failure            |
//! |--------|-------------------|-----------------------|--------------------|
//! | POST   | `/blocks`         | 201, confirmation     | 400 bad JSON, 500  |
//! | GET    | `/blocks/latest`  | 200, tip block        | 404 empty, 500     |
//! | GET    | `/blocks/history` | 200, blocks (oldest first) | 500           |
//!
//! Unknown paths get a 404 envelope and unsupported methods on these paths
//! a 405 envelope. Request bodies are not size limited.

use axum::{
    body::Bytes,
    extract::{rejection::BytesRejection, DefaultBodyLimit, State},
    http::{Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use chainlite_ledger::{Ledger, LedgerError, LedgerResult, Payload};

use crate::metrics::SharedMetrics;

/// `data` of a successful `POST /blocks`.
pub const BLOCK_ADDED: &str = "Block added successfully";

/// `error` of `GET /blocks/latest` on an empty ledger.
pub const NO_BLOCKS_FOUND: &str = "No blocks found";

// ---------------------------------------------------------------------------
// Application State
// ---------------------------------------------------------------------------

/// The single ledger handle shared by every request task.
///
/// Closing goes through the handle: once [`LedgerHandle::close`] has run,
/// handlers get [`LedgerError::Closed`] without the ledger being called.
pub struct LedgerHandle<L> {
    ledger: Arc<L>,
    closed: Arc<AtomicBool>,
}

impl<L> Clone for LedgerHandle<L> {
    fn clone(&self) -> Self {
        Self {
            ledger: Arc::clone(&self.ledger),
            closed: Arc::clone(&self.closed),
        }
    }
}

impl<L: Ledger> LedgerHandle<L> {
    pub fn new(ledger: L) -> Self {
        Self {
            ledger: Arc::new(ledger),
            closed: Arc::new(AtomicBool::new(false)),
        }
    }

    /// The ledger, unless the handle has been closed.
    pub fn get(&self) -> LedgerResult<&L> {
        if self.is_closed() {
            return Err(LedgerError::Closed);
        }
        Ok(&self.ledger)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Close the ledger. Only the first call reaches the ledger; later calls
    /// return `Ok(false)`.
    pub fn close(&self) -> LedgerResult<bool> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(false);
        }
        self.ledger.close()?;
        Ok(true)
    }
}

/// State handed to every handler. Cheap to clone.
pub struct AppState<L> {
    pub ledger: LedgerHandle<L>,
    pub metrics: SharedMetrics,
}

impl<L> Clone for AppState<L> {
    fn clone(&self) -> Self {
        Self {
            ledger: self.ledger.clone(),
            metrics: Arc::clone(&self.metrics),
        }
    }
}

// ---------------------------------------------------------------------------
// Response Envelope
// ---------------------------------------------------------------------------

/// The JSON body of every API response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// Mirrors the HTTP status code.
    pub code: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// A status code plus the envelope that goes with it.
///
/// Building the envelope from the status is the only way to construct one,
/// so `code` cannot drift from the status line.
#[derive(Debug)]
pub struct ApiResponse {
    status: StatusCode,
    envelope: Envelope,
}

impl ApiResponse {
    pub fn data<T: Serialize>(status: StatusCode, data: &T) -> Self {
        match serde_json::to_value(data) {
            Ok(value) => Self::build(status, Some(value), None),
            Err(e) => {
                tracing::error!(error = %e, "failed to serialize response data");
                Self::error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
            }
        }
    }

    pub fn error(status: StatusCode, message: impl Into<String>) -> Self {
        Self::build(status, None, Some(message.into()))
    }

    fn build(status: StatusCode, data: Option<serde_json::Value>, error: Option<String>) -> Self {
        Self {
            status,
            envelope: Envelope {
                code: status.as_u16(),
                data,
                error,
            },
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl IntoResponse for ApiResponse {
    fn into_response(self) -> Response {
        (self.status, Json(self.envelope)).into_response()
    }
}

// ---------------------------------------------------------------------------
// Router Construction
// ---------------------------------------------------------------------------

/// Builds the axum [`Router`] with the block routes, CORS, and tracing.
pub fn create_router<L: Ledger>(state: AppState<L>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any);

    Router::new()
        .route(
            "/blocks",
            post(add_block_handler::<L>).fallback(method_not_allowed_handler),
        )
        .route(
            "/blocks/latest",
            get(latest_block_handler::<L>).fallback(method_not_allowed_handler),
        )
        .route(
            "/blocks/history",
            get(block_history_handler::<L>).fallback(method_not_allowed_handler),
        )
        .fallback(not_found_handler)
        // Payloads are opaque; any valid JSON body is accepted whatever its size.
        .layer(DefaultBodyLimit::disable())
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// `POST /blocks`: append the request body as a new block.
///
/// The body is parsed from raw bytes, so no `Content-Type` header is
/// required. Malformed JSON never reaches the ledger.
async fn add_block_handler<L: Ledger>(
    State(state): State<AppState<L>>,
    body: Result<Bytes, BytesRejection>,
) -> ApiResponse {
    let _timer = state.metrics.request_latency_seconds.start_timer();

    let response = match body
        .map_err(|rejection| rejection.body_text())
        .and_then(|bytes| Payload::from_slice(&bytes).map_err(|e| e.to_string()))
    {
        Err(message) => {
            state.metrics.rejected_payloads_total.inc();
            tracing::debug!(error = %message, "rejected malformed block payload");
            ApiResponse::error(StatusCode::BAD_REQUEST, message)
        }
        Ok(payload) => match state.ledger.get().and_then(|ledger| ledger.append(payload)) {
            Ok(()) => {
                state.metrics.blocks_appended_total.inc();
                ApiResponse::data(StatusCode::CREATED, &BLOCK_ADDED)
            }
            Err(e) => {
                state.metrics.append_failures_total.inc();
                tracing::error!(error = %e, "failed to append block");
                ApiResponse::error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
            }
        },
    };

    state.metrics.record_request("/blocks", response.status());
    response
}

/// `GET /blocks/latest`: the most recent block.
///
/// An empty ledger is a 404, not a failure.
async fn latest_block_handler<L: Ledger>(State(state): State<AppState<L>>) -> ApiResponse {
    let _timer = state.metrics.request_latency_seconds.start_timer();

    let response = match state.ledger.get().and_then(|ledger| ledger.latest()) {
        Ok(Some(block)) => ApiResponse::data(StatusCode::OK, &block),
        Ok(None) => {
            tracing::debug!("latest block requested on an empty ledger");
            ApiResponse::error(StatusCode::NOT_FOUND, NO_BLOCKS_FOUND)
        }
        Err(e) => {
            state.metrics.read_failures_total.inc();
            tracing::error!(error = %e, "failed to read latest block");
            ApiResponse::error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
    };

    state.metrics.record_request("/blocks/latest", response.status());
    response
}

/// `GET /blocks/history`: every block, oldest first. Zero blocks is an
/// empty list.
async fn block_history_handler<L: Ledger>(State(state): State<AppState<L>>) -> ApiResponse {
    let _timer = state.metrics.request_latency_seconds.start_timer();

    let response = match state.ledger.get().and_then(|ledger| ledger.history()) {
        Ok(blocks) => ApiResponse::data(StatusCode::OK, &blocks),
        Err(e) => {
            state.metrics.read_failures_total.inc();
            tracing::error!(error = %e, "failed to read block history");
            ApiResponse::error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
    };

    state.metrics.record_request("/blocks/history", response.status());
    response
}

/// Anything outside the block routes.
async fn not_found_handler() -> ApiResponse {
    ApiResponse::error(StatusCode::NOT_FOUND, "route not found")
}

/// A block route hit with a method it does not serve.
async fn method_not_allowed_handler() -> ApiResponse {
    ApiResponse::error(StatusCode::METHOD_NOT_ALLOWED, "method not allowed")
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
