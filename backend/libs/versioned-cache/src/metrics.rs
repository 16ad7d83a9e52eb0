//! Cache metrics for observability
//!
//! Counters are labelled by prefix, the caller's group name, which keeps the
//! label set bounded (physical keys are digests and useless as labels).

use prometheus::{CounterVec, Opts, Registry};
use std::sync::OnceLock;

static METRICS: OnceLock<CacheMetricsInner> = OnceLock::new();

struct CacheMetricsInner {
    hits: CounterVec,
    misses: CounterVec,
    writes: CounterVec,
    deletes: CounterVec,
    version_bumps: CounterVec,
    errors: CounterVec,
}

fn counter(name: &str, help: &str, labels: &[&str]) -> CounterVec {
    CounterVec::new(Opts::new(name, help), labels).expect("valid metric definition")
}

impl CacheMetricsInner {
    fn new() -> Self {
        Self {
            hits: counter("versioned_cache_hits_total", "Total cache hits", &["prefix"]),
            misses: counter(
                "versioned_cache_misses_total",
                "Total cache misses, including unreadable payloads",
                &["prefix"],
            ),
            writes: counter(
                "versioned_cache_writes_total",
                "Total cache writes",
                &["prefix"],
            ),
            deletes: counter(
                "versioned_cache_deletes_total",
                "Total cache entries removed by delete",
                &["prefix"],
            ),
            version_bumps: counter(
                "versioned_cache_version_bumps_total",
                "Total version counter increments",
                &["prefix"],
            ),
            errors: counter(
                "versioned_cache_errors_total",
                "Total cache errors",
                &["prefix", "error_type"],
            ),
        }
    }

    fn register(&self, registry: &Registry) -> Result<(), prometheus::Error> {
        registry.register(Box::new(self.hits.clone()))?;
        registry.register(Box::new(self.misses.clone()))?;
        registry.register(Box::new(self.writes.clone()))?;
        registry.register(Box::new(self.deletes.clone()))?;
        registry.register(Box::new(self.version_bumps.clone()))?;
        registry.register(Box::new(self.errors.clone()))?;
        Ok(())
    }
}

fn get_metrics() -> &'static CacheMetricsInner {
    METRICS.get_or_init(CacheMetricsInner::new)
}

/// Cache metrics wrapper
#[derive(Clone, Default)]
pub struct CacheMetrics;

impl CacheMetrics {
    pub fn new() -> Self {
        Self
    }

    /// Register metrics with a Prometheus registry
    pub fn register(registry: &Registry) -> Result<(), prometheus::Error> {
        get_metrics().register(registry)
    }

    pub fn record_hit(&self, prefix: &str) {
        get_metrics().hits.with_label_values(&[prefix]).inc();
    }

    pub fn record_miss(&self, prefix: &str) {
        get_metrics().misses.with_label_values(&[prefix]).inc();
    }

    pub fn record_write(&self, prefix: &str) {
        get_metrics().writes.with_label_values(&[prefix]).inc();
    }

    pub fn record_delete(&self, prefix: &str) {
        get_metrics().deletes.with_label_values(&[prefix]).inc();
    }

    pub fn record_version_bump(&self, prefix: &str) {
        get_metrics()
            .version_bumps
            .with_label_values(&[prefix])
            .inc();
    }

    pub fn record_error(&self, prefix: &str, error_type: &str) {
        get_metrics()
            .errors
            .with_label_values(&[prefix, error_type])
            .inc();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_increment() {
        let metrics = CacheMetrics::new();
        let before = get_metrics()
            .hits
            .with_label_values(&["metrics_test"])
            .get();

        metrics.record_hit("metrics_test");
        metrics.record_hit("metrics_test");

        let after = get_metrics()
            .hits
            .with_label_values(&["metrics_test"])
            .get();
        assert_eq!(after - before, 2.0);
    }

    #[test]
    fn test_register_once_per_registry() {
        let registry = Registry::new();
        CacheMetrics::register(&registry).unwrap();
        // Same collectors twice in one registry is a duplicate
        assert!(CacheMetrics::register(&registry).is_err());
    }
}
