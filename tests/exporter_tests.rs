//! Exporter behavior with a scripted source.
//!
//! Covers failure accounting, stale gauge handling, the depth ceiling and
//! serialization of concurrent collections.

use generic_json_exporter::{
    Endpoint, ExporterOptions, FetchError, HttpResponse, JsonExporter, JsonSource, ScrapeOutcome,
};
use prometheus::proto::MetricFamily;
use prometheus::{Encoder, TextEncoder};
use reqwest::Url;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Replies with queued responses; the last one repeats forever.
struct ScriptedSource {
    replies: Mutex<VecDeque<Result<HttpResponse, FetchError>>>,
}

impl ScriptedSource {
    fn new(replies: Vec<Result<HttpResponse, FetchError>>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
        }
    }
}

impl JsonSource for ScriptedSource {
    async fn get(&self, _url: &Url) -> Result<HttpResponse, FetchError> {
        let mut replies = self.replies.lock().unwrap();
        if replies.len() > 1 {
            replies.pop_front().unwrap()
        } else {
            replies.front().cloned().unwrap()
        }
    }
}

fn ok(body: &str) -> Result<HttpResponse, FetchError> {
    Ok(HttpResponse::new(200, body))
}

fn refused() -> Result<HttpResponse, FetchError> {
    Err(FetchError::Transport {
        url: "http://localhost:9200/_cluster/health".into(),
        message: "connection refused".into(),
    })
}

fn exporter<S: JsonSource>(source: S, options: &ExporterOptions) -> JsonExporter<S> {
    let base = Url::parse("http://localhost:9200").unwrap();
    JsonExporter::with_cluster_name(source, Endpoint::new(base, "/_cluster/health"), options, "es")
        .unwrap()
}

fn encode(families: &[MetricFamily]) -> String {
    let mut buffer = Vec::new();
    TextEncoder::new().encode(families, &mut buffer).unwrap();
    String::from_utf8(buffer).unwrap()
}

fn sample(text: &str, series: &str) -> Option<f64> {
    text.lines()
        .filter(|l| !l.starts_with('#'))
        .find_map(|l| l.strip_prefix(series)?.strip_prefix(' ')?.parse().ok())
}

const UP: &str = "elasticsearch_cluster_health_up";
const TOTAL: &str = "elasticsearch_cluster_health_total_scrapes";
const PARSE_FAILURES: &str = "elasticsearch_cluster_health_json_parse_failures";

#[tokio::test]
async fn test_transport_failure_accounting() {
    let source = ScriptedSource::new(vec![ok(r#"{"nodes": 3}"#), refused()]);
    let exporter = exporter(source, &ExporterOptions::default());

    let first = encode(&exporter.collect().await.families);
    assert_eq!(sample(&first, UP), Some(1.0));

    let collection = exporter.collect().await;
    assert_eq!(collection.outcome, ScrapeOutcome::TransportFailure);

    let text = encode(&collection.families);
    assert_eq!(sample(&text, UP), Some(0.0));
    assert_eq!(sample(&text, TOTAL), Some(2.0));
    assert_eq!(sample(&text, PARSE_FAILURES), Some(0.0));
    // Last known value is still exposed
    assert_eq!(
        sample(&text, "elasticsearch_cluster_health_nodes{cluster=\"es\"}"),
        Some(3.0)
    );
}

#[tokio::test]
async fn test_parse_failure_keeps_previous_values() {
    let source = ScriptedSource::new(vec![ok(r#"{"nodes": 3}"#), ok("{\"nodes\": ")]);
    let exporter = exporter(source, &ExporterOptions::default());

    assert!(exporter.scrape().await.is_success());
    assert_eq!(exporter.scrape().await, ScrapeOutcome::ParseFailure);
    assert_eq!(exporter.scrape().await, ScrapeOutcome::ParseFailure);

    let text = encode(&exporter.collect().await.families);
    assert_eq!(sample(&text, UP), Some(0.0));
    assert_eq!(sample(&text, TOTAL), Some(4.0));
    assert_eq!(sample(&text, PARSE_FAILURES), Some(3.0));
    assert_eq!(exporter.gauge_value("nodes").await, Some(3.0));
}

#[tokio::test]
async fn test_recovers_after_failure() {
    let source = ScriptedSource::new(vec![refused(), ok(r#"{"nodes": 4}"#)]);
    let exporter = exporter(source, &ExporterOptions::default());

    assert_eq!(exporter.scrape().await, ScrapeOutcome::TransportFailure);
    let text = encode(&exporter.collect().await.families);
    assert_eq!(sample(&text, UP), Some(1.0));
    assert_eq!(exporter.gauge_value("nodes").await, Some(4.0));
}

#[tokio::test]
async fn test_stale_gauges_are_kept_by_default() {
    let source = ScriptedSource::new(vec![ok(r#"{"a": 1, "b": 2}"#), ok(r#"{"a": 5}"#)]);
    let exporter = exporter(source, &ExporterOptions::default());

    exporter.scrape().await;
    assert_eq!(exporter.scrape().await, ScrapeOutcome::Success { metrics: 1 });

    assert_eq!(exporter.gauge_value("a").await, Some(5.0));
    assert_eq!(exporter.gauge_value("b").await, Some(2.0));
}

#[tokio::test]
async fn test_stale_gauges_can_be_evicted() {
    let source = ScriptedSource::new(vec![ok(r#"{"a": 1, "b": 2}"#), ok(r#"{"a": 5}"#)]);
    let options = ExporterOptions {
        evict_stale: true,
        ..ExporterOptions::default()
    };
    let exporter = exporter(source, &options);

    exporter.scrape().await;
    exporter.scrape().await;

    assert_eq!(exporter.gauge_value("a").await, Some(5.0));
    assert_eq!(exporter.gauge_value("b").await, None);

    let text = encode(&exporter.collect().await.families);
    assert!(!text.contains("elasticsearch_cluster_health_b{"));
}

#[tokio::test]
async fn test_depth_ceiling_rejects_whole_document() {
    let source = ScriptedSource::new(vec![ok(r#"{"top": 1, "a": {"b": {"c": {"d": 1}}}}"#)]);
    let options = ExporterOptions {
        max_depth: 2,
        ..ExporterOptions::default()
    };
    let exporter = exporter(source, &options);

    assert_eq!(exporter.scrape().await, ScrapeOutcome::ParseFailure);
    assert_eq!(exporter.gauge_value("top").await, None);
}

#[tokio::test]
async fn test_leaves_named_like_fixed_metrics_are_skipped() {
    let source = ScriptedSource::new(vec![ok(
        r#"{"up": 5, "total_scrapes": 9, "json_parse_failures": 2, "nodes": 3}"#,
    )]);
    let exporter = exporter(source, &ExporterOptions::default());

    let collection = exporter.collect().await;
    assert_eq!(collection.outcome, ScrapeOutcome::Success { metrics: 1 });

    let text = encode(&collection.families);
    for name in [UP, TOTAL, PARSE_FAILURES] {
        let type_lines = text
            .lines()
            .filter(|l| l.starts_with(&format!("# TYPE {name} ")))
            .count();
        assert_eq!(type_lines, 1, "family {name} declared more than once:\n{text}");
    }

    assert_eq!(sample(&text, UP), Some(1.0));
    assert_eq!(sample(&text, TOTAL), Some(1.0));
    assert_eq!(sample(&text, PARSE_FAILURES), Some(0.0));
    assert_eq!(exporter.gauge_value("up").await, None);
    assert_eq!(exporter.gauge_value("nodes").await, Some(3.0));
}

#[tokio::test]
async fn test_describe_lists_fixed_and_discovered_metrics() {
    let source = ScriptedSource::new(vec![ok(r#"{"nodes": 3, "shards": {"active": 9}}"#)]);
    let exporter = exporter(source, &ExporterOptions::default());

    assert_eq!(exporter.describe().await.len(), 3);
    exporter.scrape().await;

    let names: Vec<String> = exporter
        .describe()
        .await
        .into_iter()
        .map(|d| d.fq_name)
        .collect();
    assert!(names.contains(&UP.to_string()));
    assert!(names.contains(&"elasticsearch_cluster_health_nodes".to_string()));
    assert!(names.contains(&"elasticsearch_cluster_health_shards_active".to_string()));
}

/// Every reply carries the same counter value in two fields.
struct CountingSource {
    calls: AtomicU64,
}

impl JsonSource for CountingSource {
    async fn get(&self, _url: &Url) -> Result<HttpResponse, FetchError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        tokio::time::sleep(Duration::from_millis(5)).await;
        Ok(HttpResponse::new(200, format!(r#"{{"first": {n}, "second": {n}}}"#)))
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_collections_are_serialized() {
    let source = CountingSource {
        calls: AtomicU64::new(0),
    };
    let exporter = Arc::new(exporter(source, &ExporterOptions::default()));

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let exporter = Arc::clone(&exporter);
            tokio::spawn(async move { encode(&exporter.collect().await.families) })
        })
        .collect();

    let mut totals = Vec::new();
    for handle in handles {
        let text = handle.await.unwrap();
        let first = sample(&text, "elasticsearch_cluster_health_first{cluster=\"es\"}");
        let second = sample(&text, "elasticsearch_cluster_health_second{cluster=\"es\"}");
        assert!(first.is_some());
        assert_eq!(first, second);
        // The counter matches the fetch that produced these values
        assert_eq!(sample(&text, TOTAL), first);
        totals.push(sample(&text, TOTAL).unwrap() as u64);
    }

    totals.sort_unstable();
    assert_eq!(totals, (1..=8).collect::<Vec<u64>>());
}
