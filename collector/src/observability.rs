//! Prometheus self-observability metrics for the collector.

use prometheus::{
    IntCounterVec, IntGauge, register_int_counter_vec, register_int_gauge,
};
use std::sync::OnceLock;
use thiserror::Error;

/// Global metrics instance.
static METRICS: OnceLock<Metrics> = OnceLock::new();

/// Metrics registration error.
#[derive(Error, Debug)]
#[error("metrics registration failed: {0}")]
pub struct MetricsError(String);

/// Collector self-metrics.
pub struct Metrics {
    // ─────────────────────────────────────────────────────────────────────
    // Scrape ingestion
    // ─────────────────────────────────────────────────────────────────────
    /// Timeseries accepted per scrape commit (by receiver)
    pub timeseries_received: IntCounterVec,

    /// Timeseries dropped during building/adjustment (by receiver)
    pub timeseries_dropped: IntCounterVec,

    // ─────────────────────────────────────────────────────────────────────
    // Fan-out delivery
    // ─────────────────────────────────────────────────────────────────────
    /// Batches delivered to a downstream (by signal)
    pub fanout_delivered: IntCounterVec,

    /// Downstream delivery failures (by signal)
    pub fanout_failed: IntCounterVec,

    // ─────────────────────────────────────────────────────────────────────
    // Lifecycle
    // ─────────────────────────────────────────────────────────────────────
    /// Components currently running
    pub components_running: IntGauge,
}

impl Metrics {
    /// Register all metrics with the default prometheus registry.
    /// Idempotent: a second call returns the already-initialised instance.
    pub fn init() -> Result<&'static Metrics, MetricsError> {
        if let Some(metrics) = METRICS.get() {
            return Ok(metrics);
        }
        let metrics = Metrics::register()?;
        Ok(METRICS.get_or_init(|| metrics))
    }

    /// Get the metrics instance if initialised.
    pub fn get() -> Option<&'static Metrics> {
        METRICS.get()
    }

    fn register() -> Result<Metrics, MetricsError> {
        Ok(Metrics {
            timeseries_received: register_int_counter_vec!(
                "virta_timeseries_received_total",
                "Timeseries accepted per scrape commit",
                &["receiver"]
            )
            .map_err(|e| MetricsError(e.to_string()))?,
            timeseries_dropped: register_int_counter_vec!(
                "virta_timeseries_dropped_total",
                "Timeseries dropped during building or staleness adjustment",
                &["receiver"]
            )
            .map_err(|e| MetricsError(e.to_string()))?,
            fanout_delivered: register_int_counter_vec!(
                "virta_fanout_delivered_total",
                "Batches delivered to a downstream consumer",
                &["signal"]
            )
            .map_err(|e| MetricsError(e.to_string()))?,
            fanout_failed: register_int_counter_vec!(
                "virta_fanout_failed_total",
                "Downstream delivery failures",
                &["signal"]
            )
            .map_err(|e| MetricsError(e.to_string()))?,
            components_running: register_int_gauge!(
                "virta_components_running",
                "Components currently running"
            )
            .map_err(|e| MetricsError(e.to_string()))?,
        })
    }

    /// Record one scrape commit's kept/dropped timeseries counts.
    pub fn record_scrape(&self, receiver: &str, kept: u64, dropped: u64) {
        self.timeseries_received
            .with_label_values(&[receiver])
            .inc_by(kept);
        if dropped > 0 {
            self.timeseries_dropped
                .with_label_values(&[receiver])
                .inc_by(dropped);
        }
    }
}
