//! Generic JSON Exporter Library
//!
//! This library turns any JSON document served over HTTP into Prometheus
//! gauges. Every number or boolean found anywhere in the document becomes one
//! metric named after its key-path, prefixed with a configured namespace and
//! a subsystem derived from the request path.
//!
//! # Features
//!
//! - **Recursive Flattening**: objects, arrays and JSON-encoded string fields
//! - **Deterministic Naming**: lowercase `[a-z0-9_]` names, lexicographic collision order
//! - **Serialized Scrapes**: one fetch-flatten-publish cycle at a time per endpoint
//! - **Pluggable Transport**: exporters only depend on the [`JsonSource`] trait
//!
//! # Usage
//!
//! ```no_run
//! use generic_json_exporter::{
//!     ClientOptions, Endpoint, ExporterOptions, JsonExporter, ReqwestSource,
//! };
//! use reqwest::Url;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let source = ReqwestSource::new(&ClientOptions::default())?;
//! let endpoint = Endpoint::new(Url::parse("http://localhost:9200")?, "/_cluster/health");
//! let exporter = JsonExporter::new(source, endpoint, &ExporterOptions::default()).await?;
//!
//! let collection = exporter.collect().await;
//! println!("{}: {} families", collection.outcome, collection.families.len());
//! # Ok(())
//! # }
//! ```

pub mod exporter;
pub mod flatten;
pub mod health_stats;
pub mod normalize;
pub mod registry;
pub mod source;

// Re-export main types for convenience
pub use exporter::{
    Collection, Endpoint, ExporterOptions, JsonExporter, ScrapeError, ScrapeOutcome,
    DEFAULT_NAMESPACE, RESERVED_METRIC_NAMES,
};
pub use flatten::{FlattenError, Flattener, JsonKind, Leaf, DEFAULT_MAX_DEPTH};
pub use health_stats::{EndpointStats, HealthStats};
pub use registry::MetricRegistry;
pub use source::{ClientError, ClientOptions, FetchError, HttpResponse, JsonSource, ReqwestSource};
