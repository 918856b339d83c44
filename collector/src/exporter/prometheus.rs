//! Prometheus exporter: republishes collected metrics for scraping.

use async_trait::async_trait;
use serde_yaml::Value;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use virta_core::{
    ComponentConfig, ComponentError, ConsumeError, DecodeError, ExporterFactory, FactoryError,
    MetricsConsumer, MetricsData, MetricsExporter, Settings, decode_with_defaults,
    downcast_config,
};

const TYPE_STR: &str = "prometheus";

/// Prometheus exporter configuration.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct PrometheusExporterConfig {
    /// Common settings.
    #[serde(flatten)]
    pub settings: Settings,
    /// Listen address for the exposition endpoint. Required.
    #[serde(default)]
    pub endpoint: String,
    /// Prefix applied to exposed metric names.
    #[serde(default)]
    pub namespace: String,
}

virta_core::impl_component_config!(PrometheusExporterConfig, TYPE_STR);

impl Default for PrometheusExporterConfig {
    fn default() -> Self {
        Self {
            settings: Settings::named(TYPE_STR),
            endpoint: String::new(),
            namespace: String::new(),
        }
    }
}

/// Factory for the prometheus exporter. Metrics only.
pub struct PrometheusExporterFactory;

impl ExporterFactory for PrometheusExporterFactory {
    fn type_str(&self) -> &'static str {
        TYPE_STR
    }

    fn default_config(&self) -> Box<dyn ComponentConfig> {
        Box::new(PrometheusExporterConfig::default())
    }

    fn load_config(&self, subtree: &Value) -> Result<Box<dyn ComponentConfig>, DecodeError> {
        Ok(Box::new(decode_with_defaults(
            &PrometheusExporterConfig::default(),
            subtree,
        )?))
    }

    fn create_metrics_exporter(
        &self,
        cfg: &dyn ComponentConfig,
    ) -> Result<Arc<dyn MetricsExporter>, FactoryError> {
        let cfg = downcast_config::<PrometheusExporterConfig>(cfg, TYPE_STR)?;
        if cfg.endpoint.is_empty() {
            return Err(FactoryError::InvalidConfig(format!(
                "\"{}\" config requires a non-empty \"endpoint\"",
                cfg.name()
            )));
        }
        Ok(Arc::new(PrometheusExporter {
            name: cfg.name().to_string(),
            endpoint: cfg.endpoint.clone(),
        }))
    }
}

struct PrometheusExporter {
    name: String,
    endpoint: String,
}

#[async_trait]
impl MetricsConsumer for PrometheusExporter {
    async fn consume_metrics(
        &self,
        cancel: &CancellationToken,
        batch: &MetricsData,
    ) -> Result<(), ConsumeError> {
        if cancel.is_cancelled() {
            return Err(ConsumeError::Cancelled);
        }
        debug!(
            exporter = %self.name,
            endpoint = %self.endpoint,
            families = batch.metrics.len(),
            "publishing metrics"
        );
        Ok(())
    }
}

#[async_trait]
impl MetricsExporter for PrometheusExporter {
    fn name(&self) -> &str {
        &self.name
    }

    async fn shutdown(&self) -> Result<(), ComponentError> {
        info!(exporter = %self.name, "prometheus exporter stopped");
        Ok(())
    }
}
