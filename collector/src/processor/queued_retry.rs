//! Queued retry processor: a bounded queue decoupling receivers from
//! slow exporters, with exponential-backoff retry on delivery failure.
//!
//! Drop policy: when the queue is full, the incoming batch is rejected
//! and the error propagates back to the caller (reject-newest). A batch
//! that exhausts its retry budget is dropped with an error log.

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_yaml::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, warn};
use virta_core::{
    ComponentConfig, ComponentError, ConsumeError, DecodeError, FactoryError, Host,
    ProcessorFactory, Settings, TraceConsumer, TraceData, TraceProcessor, decode_with_defaults,
    downcast_config,
};

const TYPE_STR: &str = "queued_retry";

/// Queued retry processor configuration.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct QueuedRetryConfig {
    /// Common settings.
    #[serde(flatten)]
    pub settings: Settings,
    /// Maximum queued batches before new ones are rejected.
    pub queue_size: usize,
    /// Delivery attempts per batch (1 = no retry).
    pub max_attempts: u32,
    /// Delay before the first retry; doubles per attempt.
    pub initial_backoff_ms: u64,
}

virta_core::impl_component_config!(QueuedRetryConfig, TYPE_STR);

impl Default for QueuedRetryConfig {
    fn default() -> Self {
        Self {
            settings: Settings::named(TYPE_STR),
            queue_size: 5000,
            max_attempts: 3,
            initial_backoff_ms: 100,
        }
    }
}

/// Factory for the queued retry processor. Traces only.
pub struct QueuedRetryProcessorFactory;

impl ProcessorFactory for QueuedRetryProcessorFactory {
    fn type_str(&self) -> &'static str {
        TYPE_STR
    }

    fn default_config(&self) -> Box<dyn ComponentConfig> {
        Box::new(QueuedRetryConfig::default())
    }

    fn load_config(&self, subtree: &Value) -> Result<Box<dyn ComponentConfig>, DecodeError> {
        Ok(Box::new(decode_with_defaults(
            &QueuedRetryConfig::default(),
            subtree,
        )?))
    }

    fn create_trace_processor(
        &self,
        cfg: &dyn ComponentConfig,
        next: Arc<dyn TraceConsumer>,
    ) -> Result<Arc<dyn TraceProcessor>, FactoryError> {
        let cfg = downcast_config::<QueuedRetryConfig>(cfg, TYPE_STR)?;
        if cfg.queue_size == 0 {
            return Err(FactoryError::InvalidConfig(format!(
                "\"{}\" requires a non-zero \"queue_size\"",
                cfg.name()
            )));
        }
        if cfg.max_attempts == 0 {
            return Err(FactoryError::InvalidConfig(format!(
                "\"{}\" requires a non-zero \"max_attempts\"",
                cfg.name()
            )));
        }

        let (tx, rx) = mpsc::channel(cfg.queue_size);
        Ok(Arc::new(QueuedRetryProcessor {
            name: cfg.name().to_string(),
            tx: Mutex::new(Some(tx)),
            rx: Mutex::new(Some(rx)),
            worker: Mutex::new(None),
            next,
            max_attempts: cfg.max_attempts,
            initial_backoff_ms: cfg.initial_backoff_ms,
        }))
    }
}

struct QueuedRetryProcessor {
    name: String,
    tx: Mutex<Option<mpsc::Sender<TraceData>>>,
    rx: Mutex<Option<mpsc::Receiver<TraceData>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
    next: Arc<dyn TraceConsumer>,
    max_attempts: u32,
    initial_backoff_ms: u64,
}

#[async_trait]
impl TraceConsumer for QueuedRetryProcessor {
    async fn consume_traces(
        &self,
        cancel: &CancellationToken,
        batch: &TraceData,
    ) -> Result<(), ConsumeError> {
        if cancel.is_cancelled() {
            return Err(ConsumeError::Cancelled);
        }
        let tx = self
            .tx
            .lock()
            .clone()
            .ok_or_else(|| ConsumeError::component(&self.name, "processor is shut down"))?;
        tx.try_send(batch.clone()).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => {
                warn!(name = %self.name, "queue full, rejecting batch");
                ConsumeError::component(&self.name, "queue full, batch rejected")
            }
            mpsc::error::TrySendError::Closed(_) => {
                ConsumeError::component(&self.name, "processor is shut down")
            }
        })
    }
}

#[async_trait]
impl TraceProcessor for QueuedRetryProcessor {
    fn name(&self) -> &str {
        &self.name
    }

    async fn start(&self, _host: Arc<dyn Host>) -> Result<(), ComponentError> {
        let mut rx = self
            .rx
            .lock()
            .take()
            .ok_or_else(|| ComponentError::Start("already started".to_string()))?;
        let next = Arc::clone(&self.next);
        let name = self.name.clone();
        let max_attempts = self.max_attempts;
        let initial_backoff_ms = self.initial_backoff_ms;

        let handle = tokio::spawn(async move {
            let cancel = CancellationToken::new();
            while let Some(batch) = rx.recv().await {
                let mut backoff = Duration::from_millis(initial_backoff_ms);
                for attempt in 1..=max_attempts {
                    match next.consume_traces(&cancel, &batch).await {
                        Ok(()) => break,
                        Err(e) if attempt == max_attempts => {
                            error!(
                                name = %name,
                                error = %e,
                                attempts = max_attempts,
                                "delivery failed, dropping batch"
                            );
                        }
                        Err(e) => {
                            warn!(
                                name = %name,
                                error = %e,
                                attempt,
                                backoff_ms = backoff.as_millis() as u64,
                                "delivery failed, retrying"
                            );
                            tokio::time::sleep(backoff).await;
                            backoff *= 2;
                        }
                    }
                }
            }
        });
        *self.worker.lock() = Some(handle);
        Ok(())
    }

    async fn shutdown(&self) -> Result<(), ComponentError> {
        // Close the queue; the worker drains what is already enqueued.
        self.tx.lock().take();
        let worker = self.worker.lock().take();
        if let Some(handle) = worker {
            handle
                .await
                .map_err(|e| ComponentError::Shutdown(e.to_string()))?;
        }
        Ok(())
    }
}
