//! # Prometheus Metrics
//!
//! Operational counters for the block API, scraped from `/metrics` on the
//! metrics listener. Everything is registered in a dedicated
//! [`prometheus::Registry`] prefixed with `chainlite`.

use axum::http::StatusCode;
use axum::response::IntoResponse;
use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, Opts, Registry, TextEncoder,
};
use std::sync::Arc;

/// Metric handles for the node. Handles are cheap to clone.
#[derive(Clone)]
pub struct NodeMetrics {
    registry: Registry,
    /// Blocks the ledger accepted.
    pub blocks_appended_total: IntCounter,
    /// Appends the ledger refused or failed.
    pub append_failures_total: IntCounter,
    /// Failed `latest` / `history` lookups.
    pub read_failures_total: IntCounter,
    /// Request bodies that were not valid JSON.
    pub rejected_payloads_total: IntCounter,
    /// Requests served, labelled by route and status code.
    pub requests_total: IntCounterVec,
    /// Handler latency in seconds, ledger call included.
    pub request_latency_seconds: Histogram,
}

impl NodeMetrics {
    /// Creates and registers all metrics. Call once at startup.
    pub fn new() -> Self {
        let registry = Registry::new_custom(Some("chainlite".into()), None)
            .expect("failed to create prometheus registry");

        let blocks_appended_total =
            IntCounter::new("blocks_appended_total", "Total number of blocks appended")
                .expect("metric creation");
        registry
            .register(Box::new(blocks_appended_total.clone()))
            .expect("metric registration");

        let append_failures_total = IntCounter::new(
            "append_failures_total",
            "Total number of append requests the ledger failed",
        )
        .expect("metric creation");
        registry
            .register(Box::new(append_failures_total.clone()))
            .expect("metric registration");

        let read_failures_total = IntCounter::new(
            "read_failures_total",
            "Total number of failed latest/history lookups",
        )
        .expect("metric creation");
        registry
            .register(Box::new(read_failures_total.clone()))
            .expect("metric registration");

        let rejected_payloads_total = IntCounter::new(
            "rejected_payloads_total",
            "Total number of request bodies rejected as malformed JSON",
        )
        .expect("metric creation");
        registry
            .register(Box::new(rejected_payloads_total.clone()))
            .expect("metric registration");

        let requests_total = IntCounterVec::new(
            Opts::new("requests_total", "Total number of API requests served"),
            &["route", "status"],
        )
        .expect("metric creation");
        registry
            .register(Box::new(requests_total.clone()))
            .expect("metric registration");

        let request_latency_seconds = Histogram::with_opts(
            HistogramOpts::new(
                "request_latency_seconds",
                "API request handling latency in seconds",
            )
            .buckets(vec![
                0.0005, 0.001, 0.0025, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0,
            ]),
        )
        .expect("metric creation");
        registry
            .register(Box::new(request_latency_seconds.clone()))
            .expect("metric registration");

        Self {
            registry,
            blocks_appended_total,
            append_failures_total,
            read_failures_total,
            rejected_payloads_total,
            requests_total,
            request_latency_seconds,
        }
    }

    /// Count one served request.
    pub fn record_request(&self, route: &str, status: StatusCode) {
        self.requests_total
            .with_label_values(&[route, status.as_str()])
            .inc();
    }

    /// Encodes all registered metrics into the Prometheus text exposition format.
    pub fn encode(&self) -> Result<String, prometheus::Error> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}

impl Default for NodeMetrics {
    fn default() -> Self {
        Self::new()
    }
}

pub type SharedMetrics = Arc<NodeMetrics>;

/// Builds the router served on the metrics listener.
pub fn metrics_router(metrics: SharedMetrics) -> axum::Router {
    axum::Router::new()
        .route("/metrics", axum::routing::get(metrics_handler))
        .with_state(metrics)
}

/// `GET /metrics` in Prometheus text format.
async fn metrics_handler(
    axum::extract::State(metrics): axum::extract::State<SharedMetrics>,
) -> impl IntoResponse {
    match metrics.encode() {
        Ok(body) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
            body,
        )
            .into_response(),
        Err(e) => {
            tracing::error!("failed to encode metrics: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "metrics encoding failed").into_response()
        }
    }
}
