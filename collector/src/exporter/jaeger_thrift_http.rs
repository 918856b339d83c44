//! Jaeger thrift-over-HTTP trace exporter.

use async_trait::async_trait;
use serde_yaml::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use virta_core::{
    ComponentConfig, ComponentError, ConsumeError, DecodeError, ExporterFactory, FactoryError,
    Settings, TraceConsumer, TraceData, TraceExporter, decode_with_defaults, downcast_config,
};

const TYPE_STR: &str = "jaeger_thrift_http";

/// Jaeger thrift HTTP exporter configuration.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct JaegerThriftHttpExporterConfig {
    /// Common settings.
    #[serde(flatten)]
    pub settings: Settings,
    /// Collector URL. Required.
    #[serde(default)]
    pub url: String,
    /// Extra HTTP headers sent with every submission.
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    /// Request timeout in seconds.
    #[serde(default)]
    pub timeout_secs: u64,
}

virta_core::impl_component_config!(JaegerThriftHttpExporterConfig, TYPE_STR);

/// Factory for the jaeger thrift HTTP exporter. Traces only.
pub struct JaegerThriftHttpExporterFactory;

impl ExporterFactory for JaegerThriftHttpExporterFactory {
    fn type_str(&self) -> &'static str {
        TYPE_STR
    }

    fn default_config(&self) -> Box<dyn ComponentConfig> {
        Box::new(JaegerThriftHttpExporterConfig {
            settings: Settings::named(TYPE_STR),
            ..Default::default()
        })
    }

    fn load_config(&self, subtree: &Value) -> Result<Box<dyn ComponentConfig>, DecodeError> {
        let default = JaegerThriftHttpExporterConfig {
            settings: Settings::named(TYPE_STR),
            ..Default::default()
        };
        Ok(Box::new(decode_with_defaults(&default, subtree)?))
    }

    fn create_trace_exporter(
        &self,
        cfg: &dyn ComponentConfig,
    ) -> Result<Arc<dyn TraceExporter>, FactoryError> {
        let cfg = downcast_config::<JaegerThriftHttpExporterConfig>(cfg, TYPE_STR)?;
        if cfg.url.is_empty() {
            return Err(FactoryError::InvalidConfig(format!(
                "\"{}\" config requires a non-empty \"url\"",
                cfg.name()
            )));
        }
        Ok(Arc::new(JaegerThriftHttpExporter {
            name: cfg.name().to_string(),
            url: cfg.url.clone(),
        }))
    }
}

struct JaegerThriftHttpExporter {
    name: String,
    url: String,
}

#[async_trait]
impl TraceConsumer for JaegerThriftHttpExporter {
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
            url = %self.url,
            spans = batch.spans.len(),
            "submitting spans"
        );
        Ok(())
    }
}

#[async_trait]
impl TraceExporter for JaegerThriftHttpExporter {
    fn name(&self) -> &str {
        &self.name
    }

    async fn shutdown(&self) -> Result<(), ComponentError> {
        info!(exporter = %self.name, "jaeger_thrift_http exporter stopped");
        Ok(())
    }
}
