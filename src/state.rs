//! Application state management for the exporter.
//!
//! This module defines the shared application state that is passed
//! to HTTP handlers, and builds the exporters it holds.

use anyhow::Context;
use generic_json_exporter::{Endpoint, EndpointStats, HealthStats, JsonExporter, ReqwestSource};
use prometheus::{Gauge, Registry};
use reqwest::Url;
use std::sync::Arc;
use std::time::Instant;
use tracing::info;

use crate::config::Config;

/// Type alias for shared application state.
pub type SharedState = Arc<AppState>;

/// Global application state shared across requests.
pub struct AppState {
    /// Internal json_exporter_* telemetry.
    pub registry: Registry,
    pub scrape_duration: Gauge,
    pub metrics_exposed: Gauge,
    /// One exporter per configured path, in configuration order.
    pub exporters: Vec<JsonExporter<ReqwestSource>>,
    pub health_stats: Arc<HealthStats>,
    pub config: Arc<Config>,
    /// Server start time for uptime calculation.
    pub start_time: Instant,
}

/// Builds one exporter per configured path, all sharing a single HTTP client.
///
/// Each exporter discovers the cluster name from the service root before it
/// is returned; a failed discovery only leaves the `cluster` label empty.
pub async fn build_exporters(config: &Config) -> anyhow::Result<Vec<JsonExporter<ReqwestSource>>> {
    let base = Url::parse(config.uri()).with_context(|| format!("invalid uri '{}'", config.uri()))?;
    let source = ReqwestSource::new(&config.client_options())
        .context("failed to build HTTP client for the polled service")?;
    let options = config.exporter_options();

    let mut exporters = Vec::new();
    for path in config.paths() {
        let endpoint = Endpoint::new(base.clone(), path.as_str());
        let exporter = JsonExporter::new(source.clone(), endpoint, &options)
            .await
            .with_context(|| format!("failed to create metrics for path '{}'", path))?;
        info!(
            "Polling {} as subsystem '{}' (cluster '{}')",
            exporter.endpoint().target_url(),
            exporter.subsystem(),
            exporter.cluster_name()
        );
        exporters.push(exporter);
    }

    Ok(exporters)
}

/// Health statistics with one entry per exporter, in the same order.
pub fn endpoint_health_stats(exporters: &[JsonExporter<ReqwestSource>]) -> HealthStats {
    HealthStats::new(
        exporters
            .iter()
            .map(|e| EndpointStats::new(e.endpoint().path(), e.subsystem(), e.cluster_name()))
            .collect(),
    )
}
