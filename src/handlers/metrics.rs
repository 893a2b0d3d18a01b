//! Metrics endpoint handler for Prometheus scraping.
//!
//! Every request triggers one fresh scrape of each configured endpoint. The
//! exporters are awaited in configuration order; each one serializes its own
//! scrape, so concurrent requests never see a partially updated endpoint.

use axum::{extract::State, http::StatusCode, response::IntoResponse};
use prometheus::{Encoder, TextEncoder};
use std::time::Instant;
use tracing::{debug, error, instrument};

use crate::state::SharedState;

/// Buffer capacity for metrics encoding.
const BUFFER_CAP: usize = 64 * 1024;

/// Error type for metrics endpoint failures.
#[derive(Debug)]
pub enum MetricsError {
    EncodingFailed,
}

impl IntoResponse for MetricsError {
    fn into_response(self) -> axum::response::Response {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            "Failed to encode metrics",
        )
            .into_response()
    }
}

/// Handler for the /metrics endpoint.
#[instrument(skip(state))]
pub async fn metrics_handler(State(state): State<SharedState>) -> Result<String, MetricsError> {
    let start = Instant::now();
    debug!("Processing /metrics request");

    let mut families = Vec::new();
    for (index, exporter) in state.exporters.iter().enumerate() {
        let collection = exporter.collect().await;
        debug!(
            "Scraped {} in {:.3}ms: {}",
            exporter.endpoint().path(),
            collection.duration.as_secs_f64() * 1000.0,
            collection.outcome
        );
        state
            .health_stats
            .record_scrape(index, collection.outcome, collection.duration);
        families.extend(collection.families);
    }

    let time_series_count = families.iter().map(|f| f.get_metric().len()).sum::<usize>();
    state.metrics_exposed.set(time_series_count as f64);
    state
        .health_stats
        .record_total_time_series(time_series_count as u64);

    // Telemetry reflects the previous request's duration; this one is still running.
    if state.config.enable_telemetry.unwrap_or(true) {
        families.extend(state.registry.gather());
    }

    let mut buffer = Vec::with_capacity(BUFFER_CAP);
    let encoder = TextEncoder::new();

    if encoder.encode(&families, &mut buffer).is_err() {
        error!("Failed to encode Prometheus metrics");
        return Err(MetricsError::EncodingFailed);
    }

    let request_duration_ms = start.elapsed().as_secs_f64() * 1000.0;
    state.health_stats.record_metrics_endpoint_call();
    state
        .health_stats
        .record_request_duration(request_duration_ms);
    state.health_stats.record_http_request();

    state.scrape_duration.set(start.elapsed().as_secs_f64());

    debug!(
        "Metrics request completed: {} endpoints, {} time series, {} bytes, {:.3}ms",
        state.exporters.len(),
        time_series_count,
        buffer.len(),
        request_duration_ms
    );

    String::from_utf8(buffer).map_err(|_| MetricsError::EncodingFailed)
}
