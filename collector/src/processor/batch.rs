//! Batch processor: groups small incoming batches into larger downstream
//! calls.
//!
//! Spans accumulate per source node. A flush happens inline the moment
//! the buffered span count reaches `send_batch_size`, and a timer flush
//! bounds the latency of partial batches. Shutdown drains the buffer
//! before returning.

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_yaml::Value;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use virta_core::{
    ComponentConfig, ComponentError, ConsumeError, DecodeError, FactoryError, Host, Node,
    ProcessorFactory, Settings, Span, TraceConsumer, TraceData, TraceProcessor,
    decode_with_defaults, downcast_config,
};

const TYPE_STR: &str = "batch";

/// Batch processor configuration.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct BatchProcessorConfig {
    /// Common settings.
    #[serde(flatten)]
    pub settings: Settings,
    /// Span count that triggers an inline flush.
    pub send_batch_size: usize,
    /// Upper bound on how long a partial batch may wait, in milliseconds.
    pub timeout_ms: u64,
}

virta_core::impl_component_config!(BatchProcessorConfig, TYPE_STR);

impl Default for BatchProcessorConfig {
    fn default() -> Self {
        Self {
            settings: Settings::named(TYPE_STR),
            send_batch_size: 8192,
            timeout_ms: 1000,
        }
    }
}

/// Factory for the batch processor. Traces only.
pub struct BatchProcessorFactory;

impl ProcessorFactory for BatchProcessorFactory {
    fn type_str(&self) -> &'static str {
        TYPE_STR
    }

    fn default_config(&self) -> Box<dyn ComponentConfig> {
        Box::new(BatchProcessorConfig::default())
    }

    fn load_config(&self, subtree: &Value) -> Result<Box<dyn ComponentConfig>, DecodeError> {
        Ok(Box::new(decode_with_defaults(
            &BatchProcessorConfig::default(),
            subtree,
        )?))
    }

    fn create_trace_processor(
        &self,
        cfg: &dyn ComponentConfig,
        next: Arc<dyn TraceConsumer>,
    ) -> Result<Arc<dyn TraceProcessor>, FactoryError> {
        let cfg = downcast_config::<BatchProcessorConfig>(cfg, TYPE_STR)?;
        if cfg.send_batch_size == 0 {
            return Err(FactoryError::InvalidConfig(format!(
                "\"{}\" requires a non-zero \"send_batch_size\"",
                cfg.name()
            )));
        }
        Ok(Arc::new(BatchProcessor {
            name: cfg.name().to_string(),
            inner: Arc::new(Inner {
                next,
                buffer: Mutex::new(Vec::new()),
                send_batch_size: cfg.send_batch_size,
                flush_cancel: CancellationToken::new(),
            }),
            timeout_ms: cfg.timeout_ms,
            shutdown_tx: Mutex::new(None),
            flusher: Mutex::new(None),
        }))
    }
}

struct Inner {
    next: Arc<dyn TraceConsumer>,
    /// Buffered batches grouped at flush time; span count is derived.
    buffer: Mutex<Vec<TraceData>>,
    send_batch_size: usize,
    /// Token passed downstream on timer and shutdown flushes, which have
    /// no ambient call to inherit one from.
    flush_cancel: CancellationToken,
}

impl Inner {
    fn buffered_spans(&self) -> usize {
        self.buffer.lock().iter().map(|b| b.spans.len()).sum()
    }

    /// Drain the buffer and forward one merged batch per source node.
    async fn flush(&self, cancel: &CancellationToken) {
        let drained = std::mem::take(&mut *self.buffer.lock());
        if drained.is_empty() {
            return;
        }

        let mut grouped: Vec<(Node, Vec<Span>)> = Vec::new();
        for batch in drained {
            match grouped.iter().position(|(node, _)| *node == batch.node) {
                Some(i) => grouped[i].1.extend(batch.spans),
                None => grouped.push((batch.node, batch.spans)),
            }
        }

        for (node, spans) in grouped {
            let merged = TraceData { node, spans };
            if let Err(e) = self.next.consume_traces(cancel, &merged).await {
                warn!(error = %e, "batch flush delivery failed");
            }
        }
    }
}

/// See module docs.
struct BatchProcessor {
    name: String,
    inner: Arc<Inner>,
    timeout_ms: u64,
    shutdown_tx: Mutex<Option<watch::Sender<bool>>>,
    flusher: Mutex<Option<JoinHandle<()>>>,
}

#[async_trait]
impl TraceConsumer for BatchProcessor {
    async fn consume_traces(
        &self,
        cancel: &CancellationToken,
        batch: &TraceData,
    ) -> Result<(), ConsumeError> {
        if cancel.is_cancelled() {
            return Err(ConsumeError::Cancelled);
        }
        self.inner.buffer.lock().push(batch.clone());

        if self.inner.buffered_spans() >= self.inner.send_batch_size {
            debug!(name = %self.name, "inline flush at batch size");
            self.inner.flush(cancel).await;
        }
        Ok(())
    }
}

#[async_trait]
impl TraceProcessor for BatchProcessor {
    fn name(&self) -> &str {
        &self.name
    }

    async fn start(&self, _host: Arc<dyn Host>) -> Result<(), ComponentError> {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        *self.shutdown_tx.lock() = Some(shutdown_tx);

        let inner = Arc::clone(&self.inner);
        let timeout_ms = self.timeout_ms;
        let handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = tokio::time::sleep(tokio::time::Duration::from_millis(timeout_ms)) => {}
                    _ = shutdown_rx.changed() => {}
                }
                let flush_cancel = inner.flush_cancel.clone();
                inner.flush(&flush_cancel).await;
                if *shutdown_rx.borrow() {
                    break;
                }
            }
        });
        *self.flusher.lock() = Some(handle);
        Ok(())
    }

    async fn shutdown(&self) -> Result<(), ComponentError> {
        let shutdown_tx = self.shutdown_tx.lock().take();
        let flusher = self.flusher.lock().take();
        match (shutdown_tx, flusher) {
            (Some(tx), Some(handle)) => {
                let _ = tx.send(true);
                handle
                    .await
                    .map_err(|e| ComponentError::Shutdown(e.to_string()))?;
            }
            // Never started: drain synchronously so nothing is lost.
            _ => {
                let flush_cancel = self.inner.flush_cancel.clone();
                self.inner.flush(&flush_cancel).await;
            }
        }
        Ok(())
    }
}
