//! Registry of dynamically discovered gauges for one polled endpoint.
//!
//! Each flattened leaf name maps to a `GaugeVec` with a single `cluster`
//! label. Gauges are created on first sight and overwritten on every later
//! observation. The registry itself is not synchronized; the owning
//! exporter keeps it behind its scrape lock.

use prometheus::core::{Collector, Desc};
use prometheus::proto::MetricFamily;
use prometheus::{GaugeVec, Opts};
use std::collections::{BTreeMap, HashSet};
use tracing::debug;

/// Label attached to every flattened metric.
pub const CLUSTER_LABEL: &str = "cluster";

pub struct MetricRegistry {
    namespace: String,
    subsystem: String,
    cluster: String,
    gauges: BTreeMap<String, GaugeVec>,
}

impl MetricRegistry {
    pub fn new(
        namespace: impl Into<String>,
        subsystem: impl Into<String>,
        cluster: impl Into<String>,
    ) -> Self {
        Self {
            namespace: namespace.into(),
            subsystem: subsystem.into(),
            cluster: cluster.into(),
            gauges: BTreeMap::new(),
        }
    }

    /// Sets the value of `name`, creating the gauge if it was never seen.
    ///
    /// The help text of a new gauge is its own name.
    pub fn upsert(&mut self, name: &str, value: f64) -> prometheus::Result<()> {
        if let Some(gauge) = self.gauges.get(name) {
            gauge.with_label_values(&[self.cluster.as_str()]).set(value);
            return Ok(());
        }

        let opts = Opts::new(name, name)
            .namespace(self.namespace.as_str())
            .subsystem(self.subsystem.as_str());
        let gauge = GaugeVec::new(opts, &[CLUSTER_LABEL])?;
        gauge.with_label_values(&[self.cluster.as_str()]).set(value);

        debug!("Registered new gauge '{}' in subsystem '{}'", name, self.subsystem);
        self.gauges.insert(name.to_string(), gauge);
        Ok(())
    }

    /// Current families with values, ordered by metric name.
    pub fn snapshot_all(&self) -> Vec<MetricFamily> {
        self.gauges.values().flat_map(|g| g.collect()).collect()
    }

    /// Descriptors of every known gauge, without values.
    pub fn describe_all(&self) -> Vec<Desc> {
        self.gauges
            .values()
            .flat_map(|g| g.desc().into_iter().cloned())
            .collect()
    }

    /// Drops every gauge whose name is not in `keep`. Returns how many went away.
    pub fn retain_only(&mut self, keep: &HashSet<String>) -> usize {
        let before = self.gauges.len();
        self.gauges.retain(|name, _| keep.contains(name));
        before - self.gauges.len()
    }

    /// Current value of a gauge, mostly useful for diagnostics and tests.
    pub fn value(&self, name: &str) -> Option<f64> {
        self.gauges
            .get(name)
            .map(|g| g.with_label_values(&[self.cluster.as_str()]).get())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.gauges.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.gauges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.gauges.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> MetricRegistry {
        MetricRegistry::new("elasticsearch", "cluster_health", "prod")
    }

    #[test]
    fn test_upsert_creates_and_overwrites() {
        let mut reg = registry();
        reg.upsert("number_of_nodes", 3.0).unwrap();
        assert_eq!(reg.value("number_of_nodes"), Some(3.0));

        reg.upsert("number_of_nodes", 5.0).unwrap();
        assert_eq!(reg.value("number_of_nodes"), Some(5.0));
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn test_describe_uses_fq_name_and_name_as_help() {
        let mut reg = registry();
        reg.upsert("shards_total", 3.0).unwrap();

        let descs = reg.describe_all();
        assert_eq!(descs.len(), 1);
        assert_eq!(descs[0].fq_name, "elasticsearch_cluster_health_shards_total");
        assert_eq!(descs[0].help, "shards_total");
        assert_eq!(descs[0].variable_labels, vec![CLUSTER_LABEL.to_string()]);
    }

    #[test]
    fn test_snapshot_contains_every_gauge() {
        let mut reg = registry();
        reg.upsert("b", 2.0).unwrap();
        reg.upsert("a", 1.0).unwrap();

        let families = reg.snapshot_all();
        assert_eq!(families.len(), 2);
    }

    #[test]
    fn test_entries_persist_until_retained_away() {
        let mut reg = registry();
        reg.upsert("old", 1.0).unwrap();
        reg.upsert("new", 2.0).unwrap();

        let keep: HashSet<String> = ["new".to_string()].into_iter().collect();
        assert_eq!(reg.retain_only(&keep), 1);
        assert!(!reg.contains("old"));
        assert!(reg.contains("new"));
    }

    #[test]
    fn test_invalid_name_is_rejected() {
        let mut reg = MetricRegistry::new("", "", "prod");
        assert!(reg.upsert("0abc", 1.0).is_err());
        assert!(reg.is_empty());
    }
}
