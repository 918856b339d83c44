//! Zipkin trace exporter.

use async_trait::async_trait;
use serde_yaml::Value;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use virta_core::{
    ComponentConfig, ComponentError, ConsumeError, DecodeError, ExporterFactory, FactoryError,
    Settings, TraceConsumer, TraceData, TraceExporter, decode_with_defaults, downcast_config,
};

const TYPE_STR: &str = "zipkin";

/// Zipkin exporter configuration.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ZipkinExporterConfig {
    /// Common settings.
    #[serde(flatten)]
    pub settings: Settings,
    /// Zipkin API URL. Required.
    #[serde(default)]
    pub url: String,
}

virta_core::impl_component_config!(ZipkinExporterConfig, TYPE_STR);

/// Factory for the zipkin exporter. Traces only.
pub struct ZipkinExporterFactory;

impl ExporterFactory for ZipkinExporterFactory {
    fn type_str(&self) -> &'static str {
        TYPE_STR
    }

    fn default_config(&self) -> Box<dyn ComponentConfig> {
        Box::new(ZipkinExporterConfig {
            settings: Settings::named(TYPE_STR),
            ..Default::default()
        })
    }

    fn load_config(&self, subtree: &Value) -> Result<Box<dyn ComponentConfig>, DecodeError> {
        let default = ZipkinExporterConfig {
            settings: Settings::named(TYPE_STR),
            ..Default::default()
        };
        Ok(Box::new(decode_with_defaults(&default, subtree)?))
    }

    fn create_trace_exporter(
        &self,
        cfg: &dyn ComponentConfig,
    ) -> Result<Arc<dyn TraceExporter>, FactoryError> {
        let cfg = downcast_config::<ZipkinExporterConfig>(cfg, TYPE_STR)?;
        if cfg.url.is_empty() {
            return Err(FactoryError::InvalidConfig(format!(
                "\"{}\" config requires a non-empty \"url\"",
                cfg.name()
            )));
        }
        Ok(Arc::new(ZipkinExporter {
            name: cfg.name().to_string(),
            url: cfg.url.clone(),
        }))
    }
}

struct ZipkinExporter {
    name: String,
    url: String,
}

#[async_trait]
impl TraceConsumer for ZipkinExporter {
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
            "posting spans"
        );
        Ok(())
    }
}

#[async_trait]
impl TraceExporter for ZipkinExporter {
    fn name(&self) -> &str {
        &self.name
    }

    async fn shutdown(&self) -> Result<(), ComponentError> {
        info!(exporter = %self.name, "zipkin exporter stopped");
        Ok(())
    }
}
