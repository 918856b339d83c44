//! Jaeger gRPC trace exporter.

use async_trait::async_trait;
use serde_yaml::Value;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use virta_core::{
    ComponentConfig, ComponentError, ConsumeError, DecodeError, ExporterFactory, FactoryError,
    Settings, TraceConsumer, TraceData, TraceExporter, decode_with_defaults, downcast_config,
};

const TYPE_STR: &str = "jaeger_grpc";

/// Jaeger gRPC exporter configuration.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct JaegerGrpcExporterConfig {
    /// Common settings.
    #[serde(flatten)]
    pub settings: Settings,
    /// Collector address, `host:port`. Required.
    #[serde(default)]
    pub endpoint: String,
}

virta_core::impl_component_config!(JaegerGrpcExporterConfig, TYPE_STR);

impl Default for JaegerGrpcExporterConfig {
    fn default() -> Self {
        Self {
            settings: Settings::named(TYPE_STR),
            endpoint: String::new(),
        }
    }
}

/// Factory for the jaeger gRPC exporter. Traces only.
pub struct JaegerGrpcExporterFactory;

impl ExporterFactory for JaegerGrpcExporterFactory {
    fn type_str(&self) -> &'static str {
        TYPE_STR
    }

    fn default_config(&self) -> Box<dyn ComponentConfig> {
        Box::new(JaegerGrpcExporterConfig::default())
    }

    fn load_config(&self, subtree: &Value) -> Result<Box<dyn ComponentConfig>, DecodeError> {
        Ok(Box::new(decode_with_defaults(
            &JaegerGrpcExporterConfig::default(),
            subtree,
        )?))
    }

    fn create_trace_exporter(
        &self,
        cfg: &dyn ComponentConfig,
    ) -> Result<Arc<dyn TraceExporter>, FactoryError> {
        let cfg = downcast_config::<JaegerGrpcExporterConfig>(cfg, TYPE_STR)?;
        if cfg.endpoint.is_empty() {
            return Err(FactoryError::InvalidConfig(format!(
                "\"{}\" config requires a non-empty \"endpoint\"",
                cfg.name()
            )));
        }
        Ok(Arc::new(JaegerGrpcExporter {
            name: cfg.name().to_string(),
            endpoint: cfg.endpoint.clone(),
            spans_sent: AtomicU64::new(0),
        }))
    }
}

struct JaegerGrpcExporter {
    name: String,
    endpoint: String,
    spans_sent: AtomicU64,
}

#[async_trait]
impl TraceConsumer for JaegerGrpcExporter {
    async fn consume_traces(
        &self,
        cancel: &CancellationToken,
        batch: &TraceData,
    ) -> Result<(), ConsumeError> {
        if cancel.is_cancelled() {
            return Err(ConsumeError::Cancelled);
        }
        self.spans_sent
            .fetch_add(batch.spans.len() as u64, Ordering::Relaxed);
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
impl TraceExporter for JaegerGrpcExporter {
    fn name(&self) -> &str {
        &self.name
    }

    async fn shutdown(&self) -> Result<(), ComponentError> {
        info!(
            exporter = %self.name,
            spans = self.spans_sent.load(Ordering::Relaxed),
            "jaeger_grpc exporter stopped"
        );
        Ok(())
    }
}
