//! Prometheus scrape receiver.
//!
//! Polls HTTP endpoints exposing the text metrics format. The HTTP client
//! and exposition parser live at the process boundary; this module owns
//! what the collector core sees: the typed configuration, the receiver
//! lifecycle, and the per-scrape [`Transaction`] with its persistent
//! per-target state (the [`JobsMap`]).

mod jobs_map;
mod metadata;
mod transaction;

pub use jobs_map::{JobsMap, MetricsAdjuster, TimeseriesState};
pub use metadata::{MetadataService, MetricBuilder, StaticMetadataService, TargetMetadata};
pub use transaction::Transaction;

use serde_yaml::Value;
use std::sync::Arc;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::info;
use virta_core::{
    ComponentConfig, ComponentError, ConsumeError, DecodeError, FactoryError, Host, Labels,
    MetricsConsumer, MetricsReceiver, ReceiverFactory, SCHEME_LABEL, Settings,
    decode_with_defaults, downcast_config,
};

pub(crate) const TYPE_STR: &str = "prometheus";

/// Error from the scrape subsystem.
#[derive(Error, Debug)]
pub enum ScrapeError {
    /// The transaction's cancellation token fired.
    #[error("transaction aborted")]
    TransactionAborted,

    /// The first sample carried no `job` or no `instance` label.
    #[error("job or instance cannot be found from labels")]
    MissingJobOrInstance,

    /// A sample carried no `__name__` label.
    #[error("metric name not found from labels")]
    MetricNameMissing,

    /// The metadata service does not know the target.
    #[error("no metadata for target {job}/{instance}")]
    MetadataUnknown {
        /// Scrape job.
        job: String,
        /// Target instance.
        instance: String,
    },

    /// The downstream consumer rejected the committed batch.
    #[error(transparent)]
    Consumer(#[from] ConsumeError),
}

/// Prometheus receiver configuration.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct PrometheusReceiverConfig {
    /// Common settings.
    #[serde(flatten)]
    pub settings: Settings,
    /// Scrape job name.
    pub job_name: String,
    /// Targets to poll, `host[:port]` each.
    #[serde(default)]
    pub targets: Vec<String>,
    /// Poll interval in seconds.
    pub scrape_interval_secs: u64,
    /// Scheme used to reach targets (`http` or `https`).
    pub scheme: String,
}

virta_core::impl_component_config!(PrometheusReceiverConfig, TYPE_STR);

impl Default for PrometheusReceiverConfig {
    fn default() -> Self {
        Self {
            settings: Settings::named(TYPE_STR),
            job_name: "prometheus".to_string(),
            targets: Vec::new(),
            scrape_interval_secs: 10,
            scheme: "http".to_string(),
        }
    }
}

/// Factory for the prometheus receiver. Metrics only.
pub struct PrometheusReceiverFactory;

impl ReceiverFactory for PrometheusReceiverFactory {
    fn type_str(&self) -> &'static str {
        TYPE_STR
    }

    fn default_config(&self) -> Box<dyn ComponentConfig> {
        Box::new(PrometheusReceiverConfig::default())
    }

    fn load_config(&self, subtree: &Value) -> Result<Box<dyn ComponentConfig>, DecodeError> {
        Ok(Box::new(decode_with_defaults(
            &PrometheusReceiverConfig::default(),
            subtree,
        )?))
    }

    fn create_metrics_receiver(
        &self,
        cfg: &dyn ComponentConfig,
        next: Arc<dyn MetricsConsumer>,
    ) -> Result<Arc<dyn MetricsReceiver>, FactoryError> {
        let cfg = downcast_config::<PrometheusReceiverConfig>(cfg, TYPE_STR)?;
        if cfg.scrape_interval_secs == 0 {
            return Err(FactoryError::InvalidConfig(format!(
                "\"{}\" config requires a non-zero \"scrape_interval_secs\"",
                cfg.name()
            )));
        }
        Ok(Arc::new(PrometheusReceiver::new(cfg.clone(), next)))
    }
}

/// The receiver: owns the per-target state reused across scrape rounds
/// and mints one [`Transaction`] per scrape.
pub struct PrometheusReceiver {
    name: String,
    config: PrometheusReceiverConfig,
    metadata: Arc<dyn MetadataService>,
    jobs_map: Arc<JobsMap>,
    sink: Arc<dyn MetricsConsumer>,
    cancel: CancellationToken,
}

impl PrometheusReceiver {
    fn new(config: PrometheusReceiverConfig, sink: Arc<dyn MetricsConsumer>) -> Self {
        let shared_labels = Labels::new().with(SCHEME_LABEL, config.scheme.clone());
        Self {
            name: config.name().to_string(),
            metadata: Arc::new(StaticMetadataService::new(shared_labels)),
            jobs_map: Arc::new(JobsMap::new()),
            sink,
            cancel: CancellationToken::new(),
            config,
        }
    }

    /// Begin a transaction for one scrape of one target. The scrape
    /// driver appends samples, then commits or rolls back.
    pub fn transaction(&self) -> Transaction {
        Transaction::new(
            self.cancel.child_token(),
            Arc::clone(&self.metadata),
            Some(Arc::clone(&self.jobs_map)),
            Arc::clone(&self.sink),
        )
    }
}

#[async_trait::async_trait]
impl MetricsReceiver for PrometheusReceiver {
    async fn start(&self, _host: Arc<dyn Host>) -> Result<(), ComponentError> {
        info!(
            name = %self.name,
            job = %self.config.job_name,
            targets = self.config.targets.len(),
            interval_secs = self.config.scrape_interval_secs,
            "prometheus receiver scraping targets"
        );
        Ok(())
    }

    async fn shutdown(&self) -> Result<(), ComponentError> {
        // Aborts in-flight transactions: their child tokens fire and the
        // next add() returns TransactionAborted.
        self.cancel.cancel();
        info!(name = %self.name, "prometheus receiver stopped");
        Ok(())
    }
}
