//! Logging exporter: writes batch summaries to the collector's own log.
//! Useful for debugging pipelines without a backend.

use async_trait::async_trait;
use serde_yaml::Value;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio_util::sync::CancellationToken;
use tracing::info;
use virta_core::{
    ComponentConfig, ComponentError, ConsumeError, DecodeError, ExporterFactory, FactoryError,
    MetricsConsumer, MetricsData, MetricsExporter, Settings, TraceConsumer, TraceData,
    TraceExporter, decode_with_defaults, downcast_config,
};

const TYPE_STR: &str = "logging";

/// Logging exporter configuration.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct LoggingExporterConfig {
    /// Common settings.
    #[serde(flatten)]
    pub settings: Settings,
    /// Log individual spans and samples rather than batch summaries.
    #[serde(default)]
    pub verbose: bool,
}

virta_core::impl_component_config!(LoggingExporterConfig, TYPE_STR);

impl Default for LoggingExporterConfig {
    fn default() -> Self {
        Self {
            settings: Settings::named(TYPE_STR),
            verbose: false,
        }
    }
}

/// Factory for the logging exporter. Supports both signals.
pub struct LoggingExporterFactory;

impl ExporterFactory for LoggingExporterFactory {
    fn type_str(&self) -> &'static str {
        TYPE_STR
    }

    fn default_config(&self) -> Box<dyn ComponentConfig> {
        Box::new(LoggingExporterConfig::default())
    }

    fn load_config(&self, subtree: &Value) -> Result<Box<dyn ComponentConfig>, DecodeError> {
        Ok(Box::new(decode_with_defaults(
            &LoggingExporterConfig::default(),
            subtree,
        )?))
    }

    fn create_trace_exporter(
        &self,
        cfg: &dyn ComponentConfig,
    ) -> Result<Arc<dyn TraceExporter>, FactoryError> {
        let cfg = downcast_config::<LoggingExporterConfig>(cfg, TYPE_STR)?;
        Ok(Arc::new(LoggingExporter::new(cfg)))
    }

    fn create_metrics_exporter(
        &self,
        cfg: &dyn ComponentConfig,
    ) -> Result<Arc<dyn MetricsExporter>, FactoryError> {
        let cfg = downcast_config::<LoggingExporterConfig>(cfg, TYPE_STR)?;
        Ok(Arc::new(LoggingExporter::new(cfg)))
    }
}

struct LoggingExporter {
    name: String,
    verbose: bool,
    batches: AtomicU64,
}

impl LoggingExporter {
    fn new(cfg: &LoggingExporterConfig) -> Self {
        Self {
            name: cfg.name().to_string(),
            verbose: cfg.verbose,
            batches: AtomicU64::new(0),
        }
    }
}

#[async_trait]
impl TraceConsumer for LoggingExporter {
    async fn consume_traces(
        &self,
        cancel: &CancellationToken,
        batch: &TraceData,
    ) -> Result<(), ConsumeError> {
        if cancel.is_cancelled() {
            return Err(ConsumeError::Cancelled);
        }
        self.batches.fetch_add(1, Ordering::Relaxed);
        info!(
            exporter = %self.name,
            service = %batch.node.service_name,
            spans = batch.spans.len(),
            "trace batch"
        );
        if self.verbose {
            for span in &batch.spans {
                info!(exporter = %self.name, span = %span.name, attributes = ?span.attributes);
            }
        }
        Ok(())
    }
}

#[async_trait]
impl MetricsConsumer for LoggingExporter {
    async fn consume_metrics(
        &self,
        cancel: &CancellationToken,
        batch: &MetricsData,
    ) -> Result<(), ConsumeError> {
        if cancel.is_cancelled() {
            return Err(ConsumeError::Cancelled);
        }
        self.batches.fetch_add(1, Ordering::Relaxed);
        info!(
            exporter = %self.name,
            service = %batch.node.service_name,
            families = batch.metrics.len(),
            "metrics batch"
        );
        if self.verbose {
            for family in &batch.metrics {
                info!(
                    exporter = %self.name,
                    family = %family.name,
                    samples = family.samples.len()
                );
            }
        }
        Ok(())
    }
}

#[async_trait]
impl TraceExporter for LoggingExporter {
    fn name(&self) -> &str {
        &self.name
    }

    async fn shutdown(&self) -> Result<(), ComponentError> {
        info!(
            exporter = %self.name,
            batches = self.batches.load(Ordering::Relaxed),
            "logging exporter stopped"
        );
        Ok(())
    }
}

#[async_trait]
impl MetricsExporter for LoggingExporter {
    fn name(&self) -> &str {
        &self.name
    }

    async fn shutdown(&self) -> Result<(), ComponentError> {
        TraceExporter::shutdown(self).await
    }
}
