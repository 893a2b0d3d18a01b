//! Scrape orchestration for a single polled JSON endpoint.
//!
//! A [`JsonExporter`] owns the gauges discovered in its endpoint's documents
//! plus three fixed metrics: `up`, `total_scrapes` and `json_parse_failures`.
//! Every call to [`JsonExporter::collect`] performs exactly one fresh fetch;
//! the whole fetch-decode-flatten-upsert-snapshot cycle runs under one async
//! mutex, so concurrent collections of the same endpoint are serialized and
//! never observe a half-written metric set.

use prometheus::core::{Collector, Desc};
use prometheus::proto::MetricFamily;
use prometheus::{Counter, Gauge, Opts};
use reqwest::Url;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::collections::HashSet;
use std::fmt;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::flatten::{FlattenError, Flattener, Leaf, DEFAULT_MAX_DEPTH};
use crate::normalize::derive_subsystem;
use crate::registry::MetricRegistry;
use crate::source::{FetchError, JsonSource};

/// Namespace used when none is configured.
pub const DEFAULT_NAMESPACE: &str = "elasticsearch";

/// Names of the fixed per-endpoint metrics. Document leaves with these
/// names are not exported.
pub const RESERVED_METRIC_NAMES: [&str; 3] = ["up", "total_scrapes", "json_parse_failures"];

/// What to poll: an HTTP origin plus a request path (with optional query).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    base: Url,
    path: String,
}

impl Endpoint {
    pub fn new(base: Url, path: impl Into<String>) -> Self {
        Self {
            base,
            path: path.into(),
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn base(&self) -> &Url {
        &self.base
    }

    /// URL of the document to flatten.
    pub fn target_url(&self) -> Url {
        let mut url = self.base.clone();
        let (path, query) = match self.path.split_once('?') {
            Some((path, query)) => (path, Some(query)),
            None => (self.path.as_str(), None),
        };
        url.set_path(path);
        url.set_query(query);
        url
    }

    /// URL of the service root, used for cluster name discovery.
    pub fn root_url(&self) -> Url {
        let mut url = self.base.clone();
        url.set_path("/");
        url.set_query(None);
        url
    }
}

/// Per-exporter settings that are not part of the endpoint itself.
#[derive(Debug, Clone)]
pub struct ExporterOptions {
    pub namespace: String,
    pub max_depth: usize,
    /// Remove gauges that a successful scrape no longer reports.
    pub evict_stale: bool,
}

impl Default for ExporterOptions {
    fn default() -> Self {
        Self {
            namespace: DEFAULT_NAMESPACE.to_string(),
            max_depth: DEFAULT_MAX_DEPTH,
            evict_stale: false,
        }
    }
}

/// Everything that can go wrong in one scrape.
#[derive(Debug, Error)]
pub enum ScrapeError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error("{url} returned HTTP status {status}")]
    Status { url: String, status: u16 },

    #[error("failed to decode JSON document: {0}")]
    Decode(#[from] serde_json::Error),

    #[error(transparent)]
    Flatten(#[from] FlattenError),
}

impl ScrapeError {
    /// Whether the document arrived but could not be turned into metrics.
    pub fn is_parse_failure(&self) -> bool {
        matches!(self, ScrapeError::Decode(_) | ScrapeError::Flatten(_))
    }
}

/// Result class of one scrape.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScrapeOutcome {
    Success { metrics: usize },
    TransportFailure,
    ParseFailure,
}

impl ScrapeOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, ScrapeOutcome::Success { .. })
    }
}

impl fmt::Display for ScrapeOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScrapeOutcome::Success { metrics } => write!(f, "ok ({metrics} metrics)"),
            ScrapeOutcome::TransportFailure => write!(f, "transport failure"),
            ScrapeOutcome::ParseFailure => write!(f, "parse failure"),
        }
    }
}

/// Families produced by one collection, with its bookkeeping.
#[derive(Debug)]
pub struct Collection {
    pub outcome: ScrapeOutcome,
    pub duration: Duration,
    pub families: Vec<MetricFamily>,
}

/// Shared mutable state, only touched while the scrape lock is held.
struct ScrapeState {
    registry: MetricRegistry,
    up: Gauge,
    total_scrapes: Counter,
    json_parse_failures: Counter,
}

#[derive(Deserialize)]
struct ClusterInfo {
    #[serde(default)]
    cluster_name: String,
}

/// Exporter for one endpoint.
pub struct JsonExporter<S> {
    source: S,
    endpoint: Endpoint,
    subsystem: String,
    cluster_name: String,
    flattener: Flattener,
    evict_stale: bool,
    state: Mutex<ScrapeState>,
}

impl<S: JsonSource> JsonExporter<S> {
    /// Builds an exporter and discovers the cluster name from the service root.
    ///
    /// A failed discovery is logged and leaves the `cluster` label empty.
    pub async fn new(
        source: S,
        endpoint: Endpoint,
        options: &ExporterOptions,
    ) -> prometheus::Result<Self> {
        let cluster_name = match fetch_cluster_name(&source, &endpoint).await {
            Ok(name) => {
                debug!("Discovered cluster name '{}' for {}", name, endpoint.path());
                name
            }
            Err(e) => {
                warn!("Failed to fetch and decode cluster name: {}", e);
                String::new()
            }
        };

        Self::with_cluster_name(source, endpoint, options, cluster_name)
    }

    /// Builds an exporter with a known cluster name, without any I/O.
    pub fn with_cluster_name(
        source: S,
        endpoint: Endpoint,
        options: &ExporterOptions,
        cluster_name: impl Into<String>,
    ) -> prometheus::Result<Self> {
        let subsystem = derive_subsystem(endpoint.path());
        let cluster_name = cluster_name.into();
        let namespace = options.namespace.as_str();

        let up = Gauge::with_opts(
            Opts::new(
                "up",
                format!("Was the last scrape of the {} endpoint successful.", endpoint.path()),
            )
            .namespace(namespace)
            .subsystem(subsystem.as_str()),
        )?;
        let total_scrapes = Counter::with_opts(
            Opts::new(
                "total_scrapes",
                format!("Current total scrapes of the {} endpoint.", endpoint.path()),
            )
            .namespace(namespace)
            .subsystem(subsystem.as_str()),
        )?;
        let json_parse_failures = Counter::with_opts(
            Opts::new("json_parse_failures", "Number of errors while parsing JSON.")
                .namespace(namespace)
                .subsystem(subsystem.as_str()),
        )?;

        let registry = MetricRegistry::new(namespace, subsystem.as_str(), cluster_name.as_str());

        Ok(Self {
            source,
            endpoint,
            subsystem,
            cluster_name,
            flattener: Flattener::new(options.max_depth),
            evict_stale: options.evict_stale,
            state: Mutex::new(ScrapeState {
                registry,
                up,
                total_scrapes,
                json_parse_failures,
            }),
        })
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    pub fn subsystem(&self) -> &str {
        &self.subsystem
    }

    pub fn cluster_name(&self) -> &str {
        &self.cluster_name
    }

    /// Performs one scrape and updates the registry, without exposing anything.
    pub async fn scrape(&self) -> ScrapeOutcome {
        let mut state = self.state.lock().await;
        self.scrape_locked(&mut state).await
    }

    /// Performs one scrape and returns the fixed metrics plus every known gauge.
    pub async fn collect(&self) -> Collection {
        let start = Instant::now();
        let mut state = self.state.lock().await;
        let outcome = self.scrape_locked(&mut state).await;

        let mut families = Vec::with_capacity(state.registry.len() + 3);
        families.extend(state.up.collect());
        families.extend(state.total_scrapes.collect());
        families.extend(state.json_parse_failures.collect());
        families.extend(state.registry.snapshot_all());

        Collection {
            outcome,
            duration: start.elapsed(),
            families,
        }
    }

    /// Descriptors of the fixed metrics and of every gauge seen so far.
    pub async fn describe(&self) -> Vec<Desc> {
        let state = self.state.lock().await;
        let mut descs: Vec<Desc> = Vec::with_capacity(state.registry.len() + 3);
        descs.extend(state.up.desc().into_iter().cloned());
        descs.extend(state.total_scrapes.desc().into_iter().cloned());
        descs.extend(state.json_parse_failures.desc().into_iter().cloned());
        descs.extend(state.registry.describe_all());
        descs
    }

    /// Current value of a flattened gauge, if it has been seen.
    pub async fn gauge_value(&self, name: &str) -> Option<f64> {
        self.state.lock().await.registry.value(name)
    }

    async fn scrape_locked(&self, state: &mut ScrapeState) -> ScrapeOutcome {
        state.total_scrapes.inc();

        let leaves = match self.fetch_leaves().await {
            Ok(leaves) => leaves,
            Err(e) if e.is_parse_failure() => {
                warn!("Failed to process JSON from {}: {}", self.endpoint.path(), e);
                state.up.set(0.0);
                state.json_parse_failures.inc();
                return ScrapeOutcome::ParseFailure;
            }
            Err(e) => {
                warn!("Error while querying JSON endpoint {}: {}", self.endpoint.path(), e);
                state.up.set(0.0);
                return ScrapeOutcome::TransportFailure;
            }
        };

        state.up.set(1.0);

        let mut seen = HashSet::with_capacity(leaves.len());
        for leaf in leaves {
            if leaf.name.is_empty() {
                debug!("Skipping leaf with empty name at {}", self.endpoint.path());
                continue;
            }
            if RESERVED_METRIC_NAMES.contains(&leaf.name.as_str()) {
                warn!(
                    "Skipping '{}' from {}: name is reserved for a fixed metric",
                    leaf.name,
                    self.endpoint.path()
                );
                continue;
            }
            if let Err(e) = state.registry.upsert(&leaf.name, leaf.value) {
                warn!("Cannot export '{}' from {}: {}", leaf.name, self.endpoint.path(), e);
                continue;
            }
            seen.insert(leaf.name);
        }

        if self.evict_stale {
            let evicted = state.registry.retain_only(&seen);
            if evicted > 0 {
                debug!("Evicted {} stale gauges for {}", evicted, self.endpoint.path());
            }
        }

        ScrapeOutcome::Success {
            metrics: seen.len(),
        }
    }

    async fn fetch_leaves(&self) -> Result<Vec<Leaf>, ScrapeError> {
        let url = self.endpoint.target_url();
        let response = self.source.get(&url).await?;
        if !response.is_success() {
            return Err(ScrapeError::Status {
                url: url.to_string(),
                status: response.status,
            });
        }

        let document: Map<String, Value> = serde_json::from_slice(&response.body)?;
        Ok(self.flattener.flatten_document(&document)?)
    }
}

async fn fetch_cluster_name<S: JsonSource>(
    source: &S,
    endpoint: &Endpoint,
) -> Result<String, ScrapeError> {
    let url = endpoint.root_url();
    let response = source.get(&url).await?;
    if !response.is_success() {
        return Err(ScrapeError::Status {
            url: url.to_string(),
            status: response.status,
        });
    }

    let info: ClusterInfo = serde_json::from_slice(&response.body)?;
    Ok(info.cluster_name)
}
