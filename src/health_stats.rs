//! Health statistics and monitoring for the exporter.
//!
//! This module tracks scrape results per polled endpoint together with
//! `/metrics` request statistics, and renders them as the plain-text table
//! served by `/health`.

use std::collections::VecDeque;
use std::fmt::Write as FmtWrite;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::exporter::ScrapeOutcome;

/// Running statistics for a single metric.
#[derive(Clone, Copy, Default)]
pub struct RunningStat {
    count: u64,
    sum: f64,
    min: f64,
    max: f64,
    last: f64,
}

impl RunningStat {
    pub fn add(&mut self, value: f64) {
        if self.count == 0 {
            self.min = value;
            self.max = value;
            self.last = value;
            self.sum = value;
            self.count = 1;
            return;
        }
        self.count += 1;
        self.sum += value;
        self.last = value;
        if value < self.min {
            self.min = value;
        }
        if value > self.max {
            self.max = value;
        }
    }

    pub fn avg(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.sum / (self.count as f64)
        }
    }
}

/// Thread-safe wrapper for running statistics.
#[derive(Default)]
pub struct Stat {
    inner: Mutex<RunningStat>,
}

impl Stat {
    pub fn add_sample(&self, value: f64) {
        if let Ok(mut s) = self.inner.lock() {
            s.add(value);
        }
    }

    /// Returns `(last, avg, max, min, count)`.
    pub fn snapshot(&self) -> (f64, f64, f64, f64, u64) {
        if let Ok(s) = self.inner.lock() {
            (s.last, s.avg(), s.max, s.min, s.count)
        } else {
            (0.0, 0.0, 0.0, 0.0, 0)
        }
    }
}

/// Thread-safe circular buffer for tracking HTTP request timestamps.
pub struct RequestTimestamps {
    inner: Mutex<VecDeque<Instant>>,
}

impl Default for RequestTimestamps {
    fn default() -> Self {
        Self {
            inner: Mutex::new(VecDeque::with_capacity(1024)),
        }
    }
}

impl RequestTimestamps {
    pub fn record(&self) {
        if let Ok(mut guard) = self.inner.lock() {
            let now = Instant::now();
            guard.push_back(now);
            // Keep only last 10 minutes of timestamps to avoid unbounded growth
            while guard
                .front()
                .is_some_and(|&t| now.duration_since(t) > Duration::from_secs(600))
            {
                guard.pop_front();
            }
        }
    }

    pub fn count_last_minute(&self) -> u64 {
        if let Ok(guard) = self.inner.lock() {
            let now = Instant::now();
            guard
                .iter()
                .filter(|&&t| now.duration_since(t) <= Duration::from_secs(60))
                .count() as u64
        } else {
            0
        }
    }
}

/// Scrape statistics of one polled endpoint.
pub struct EndpointStats {
    pub path: String,
    pub subsystem: String,
    pub cluster: String,
    pub scrapes: AtomicU64,
    pub successes: AtomicU64,
    pub transport_failures: AtomicU64,
    pub parse_failures: AtomicU64,
    pub scrape_duration_ms: Stat,
    pub exported_metrics: Stat,
    last_outcome: Mutex<Option<ScrapeOutcome>>,
}

impl EndpointStats {
    pub fn new(
        path: impl Into<String>,
        subsystem: impl Into<String>,
        cluster: impl Into<String>,
    ) -> Self {
        Self {
            path: path.into(),
            subsystem: subsystem.into(),
            cluster: cluster.into(),
            scrapes: AtomicU64::new(0),
            successes: AtomicU64::new(0),
            transport_failures: AtomicU64::new(0),
            parse_failures: AtomicU64::new(0),
            scrape_duration_ms: Stat::default(),
            exported_metrics: Stat::default(),
            last_outcome: Mutex::new(None),
        }
    }

    pub fn record(&self, outcome: ScrapeOutcome, duration: Duration) {
        self.scrapes.fetch_add(1, Ordering::Relaxed);
        match outcome {
            ScrapeOutcome::Success { metrics } => {
                self.successes.fetch_add(1, Ordering::Relaxed);
                self.exported_metrics.add_sample(metrics as f64);
            }
            ScrapeOutcome::TransportFailure => {
                self.transport_failures.fetch_add(1, Ordering::Relaxed);
            }
            ScrapeOutcome::ParseFailure => {
                self.parse_failures.fetch_add(1, Ordering::Relaxed);
            }
        }
        self.scrape_duration_ms
            .add_sample(duration.as_secs_f64() * 1000.0);
        if let Ok(mut guard) = self.last_outcome.lock() {
            *guard = Some(outcome);
        }
    }

    pub fn last_outcome(&self) -> Option<ScrapeOutcome> {
        self.last_outcome.lock().ok().and_then(|guard| *guard)
    }

    /// An endpoint that was never scraped counts as healthy.
    pub fn is_healthy(&self) -> bool {
        self.last_outcome().map_or(true, |o| o.is_success())
    }
}

/// Health statistics for the whole exporter.
pub struct HealthStats {
    pub endpoints: Vec<EndpointStats>,
    pub http_request_timestamps: RequestTimestamps,
    pub metrics_endpoint_calls: AtomicU64,
    pub request_duration_ms: Stat,
    pub total_time_series: Stat,
    pub start_time: Instant,
}

impl HealthStats {
    pub fn new(endpoints: Vec<EndpointStats>) -> Self {
        Self {
            endpoints,
            http_request_timestamps: RequestTimestamps::default(),
            metrics_endpoint_calls: AtomicU64::new(0),
            request_duration_ms: Stat::default(),
            total_time_series: Stat::default(),
            start_time: Instant::now(),
        }
    }

    /// Records a scrape result for the endpoint at `index`.
    pub fn record_scrape(&self, index: usize, outcome: ScrapeOutcome, duration: Duration) {
        if let Some(endpoint) = self.endpoints.get(index) {
            endpoint.record(outcome, duration);
        }
    }

    pub fn record_http_request(&self) {
        self.http_request_timestamps.record();
    }

    pub fn record_metrics_endpoint_call(&self) {
        self.metrics_endpoint_calls.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_request_duration(&self, duration_ms: f64) {
        self.request_duration_ms.add_sample(duration_ms);
    }

    pub fn record_total_time_series(&self, count: u64) {
        self.total_time_series.add_sample(count as f64);
    }

    pub fn all_healthy(&self) -> bool {
        self.endpoints.iter().all(EndpointStats::is_healthy)
    }

    pub fn get_uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    pub fn render_table(&self) -> String {
        let mut out = String::new();

        writeln!(out, "HEALTH ENDPOINT - EXPORTER INTERNAL STATS").ok();
        writeln!(out, "==========================================").ok();
        writeln!(out).ok();

        writeln!(
            out,
            "{:30} | {:24} | {:16} | {:>8} | {:>8} | {:>9} | {:>7} | {}",
            "Endpoint",
            "Subsystem",
            "Cluster",
            "Scrapes",
            "Success",
            "Transport",
            "Parse",
            "Last outcome"
        )
        .ok();
        writeln!(out, "{}", "-".repeat(137)).ok();

        for ep in &self.endpoints {
            let last = ep
                .last_outcome()
                .map_or_else(|| "never scraped".to_string(), |o| o.to_string());
            writeln!(
                out,
                "{:30} | {:24} | {:16} | {:>8} | {:>8} | {:>9} | {:>7} | {}",
                ep.path,
                ep.subsystem,
                ep.cluster,
                ep.scrapes.load(Ordering::Relaxed),
                ep.successes.load(Ordering::Relaxed),
                ep.transport_failures.load(Ordering::Relaxed),
                ep.parse_failures.load(Ordering::Relaxed),
                last
            )
            .ok();
        }
        writeln!(out).ok();

        let left_col = 26usize;
        let col_w = 12usize;

        writeln!(
            out,
            "{:left$} | {:^col$} | {:^col$} | {:^col$} | {:^col$}",
            "",
            "current",
            "average",
            "max",
            "min",
            left = left_col,
            col = col_w
        )
        .ok();
        writeln!(out, "{}", "-".repeat(left_col + 4 * (col_w + 3))).ok();

        for ep in &self.endpoints {
            let (cur, avg, max, min, _) = ep.scrape_duration_ms.snapshot();
            let label = format!("{} (ms)", ep.subsystem);
            write_stat_row(&mut out, &label, cur, avg, max, min, left_col, col_w);
        }

        let (cur, avg, max, min, _) = self.request_duration_ms.snapshot();
        write_stat_row(&mut out, "/metrics duration (ms)", cur, avg, max, min, left_col, col_w);
        let (cur, avg, max, min, _) = self.total_time_series.snapshot();
        write_stat_row(&mut out, "time series", cur, avg, max, min, left_col, col_w);

        writeln!(out).ok();
        writeln!(
            out,
            "/metrics calls total: {}",
            self.metrics_endpoint_calls.load(Ordering::Relaxed)
        )
        .ok();
        writeln!(
            out,
            "HTTP requests last minute: {}",
            self.http_request_timestamps.count_last_minute()
        )
        .ok();

        out
    }
}

#[allow(clippy::too_many_arguments)]
fn write_stat_row(
    out: &mut String,
    label: &str,
    cur: f64,
    avg: f64,
    max: f64,
    min: f64,
    left_col: usize,
    col_w: usize,
) {
    writeln!(
        out,
        "{:left$} | {:>col$.2} | {:>col$.2} | {:>col$.2} | {:>col$.2}",
        label,
        cur,
        avg,
        max,
        min,
        left = left_col,
        col = col_w
    )
    .ok();
}
