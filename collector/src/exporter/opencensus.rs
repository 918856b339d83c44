//! OpenCensus exporter. Supports both traces and metrics.

use async_trait::async_trait;
use serde_yaml::Value;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use virta_core::{
    ComponentConfig, ComponentError, ConsumeError, DecodeError, ExporterFactory, FactoryError,
    MetricsConsumer, MetricsData, MetricsExporter, Settings, TraceConsumer, TraceData,
    TraceExporter, decode_with_defaults, downcast_config,
};

const TYPE_STR: &str = "opencensus";

/// OpenCensus exporter configuration.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct OpenCensusExporterConfig {
    /// Common settings.
    #[serde(flatten)]
    pub settings: Settings,
    /// Agent address, `host:port`. Required.
    #[serde(default)]
    pub endpoint: String,
    /// Number of concurrent senders.
    #[serde(default = "default_num_workers")]
    pub num_workers: usize,
}

fn default_num_workers() -> usize {
    2
}

virta_core::impl_component_config!(OpenCensusExporterConfig, TYPE_STR);

/// Factory for the OpenCensus exporter.
pub struct OpenCensusExporterFactory;

impl OpenCensusExporterFactory {
    fn checked_config<'a>(
        &self,
        cfg: &'a dyn ComponentConfig,
    ) -> Result<&'a OpenCensusExporterConfig, FactoryError> {
        let cfg = downcast_config::<OpenCensusExporterConfig>(cfg, TYPE_STR)?;
        if cfg.endpoint.is_empty() {
            return Err(FactoryError::InvalidConfig(format!(
                "\"{}\" config requires a non-empty \"endpoint\"",
                cfg.name()
            )));
        }
        Ok(cfg)
    }
}

impl ExporterFactory for OpenCensusExporterFactory {
    fn type_str(&self) -> &'static str {
        TYPE_STR
    }

    fn default_config(&self) -> Box<dyn ComponentConfig> {
        Box::new(OpenCensusExporterConfig {
            settings: Settings::named(TYPE_STR),
            num_workers: default_num_workers(),
            ..Default::default()
        })
    }

    fn load_config(&self, subtree: &Value) -> Result<Box<dyn ComponentConfig>, DecodeError> {
        let default = OpenCensusExporterConfig {
            settings: Settings::named(TYPE_STR),
            num_workers: default_num_workers(),
            ..Default::default()
        };
        Ok(Box::new(decode_with_defaults(&default, subtree)?))
    }

    fn create_trace_exporter(
        &self,
        cfg: &dyn ComponentConfig,
    ) -> Result<Arc<dyn TraceExporter>, FactoryError> {
        let cfg = self.checked_config(cfg)?;
        Ok(Arc::new(OpenCensusExporter {
            name: cfg.name().to_string(),
            endpoint: cfg.endpoint.clone(),
        }))
    }

    fn create_metrics_exporter(
        &self,
        cfg: &dyn ComponentConfig,
    ) -> Result<Arc<dyn MetricsExporter>, FactoryError> {
        let cfg = self.checked_config(cfg)?;
        Ok(Arc::new(OpenCensusExporter {
            name: cfg.name().to_string(),
            endpoint: cfg.endpoint.clone(),
        }))
    }
}

struct OpenCensusExporter {
    name: String,
    endpoint: String,
}

#[async_trait]
impl TraceConsumer for OpenCensusExporter {
    async fn consume_traces(
        &self,
        cancel: &CancellationToken,
        batch: &TraceData,
    ) -> Result<(), ConsumeError> {
        if cancel.is_cancelled() {
            return Err(ConsumeError::Cancelled);
        }
        debug!(
            exporter = %self.name,
            endpoint = %self.endpoint,
            spans = batch.spans.len(),
            "exporting spans"
        );
        Ok(())
    }
}

#[async_trait]
impl MetricsConsumer for OpenCensusExporter {
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
            "exporting metrics"
        );
        Ok(())
    }
}

#[async_trait]
impl TraceExporter for OpenCensusExporter {
    fn name(&self) -> &str {
        &self.name
    }

    async fn shutdown(&self) -> Result<(), ComponentError> {
        info!(exporter = %self.name, "opencensus exporter stopped");
        Ok(())
    }
}

#[async_trait]
impl MetricsExporter for OpenCensusExporter {
    fn name(&self) -> &str {
        &self.name
    }

    async fn shutdown(&self) -> Result<(), ComponentError> {
        TraceExporter::shutdown(self).await
    }
}
