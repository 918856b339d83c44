//! Tail sampling processor: buffers spans per trace and decides whether
//! to keep a trace only after it has had time to complete.
//!
//! Spans accumulate per trace id. A decision ticker evaluates traces
//! whose decision wait has elapsed against the configured policy and
//! forwards the kept ones, one batch per trace. Shutdown decides every
//! pending trace before returning.

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use serde_yaml::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use virta_core::{
    ComponentConfig, ComponentError, ConsumeError, DecodeError, FactoryError, Host, Node,
    ProcessorFactory, Settings, Span, TraceConsumer, TraceData, TraceProcessor,
    decode_with_defaults, downcast_config,
};

const TYPE_STR: &str = "tail_sampling";

/// Sampling policy evaluated per trace at decision time.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyConfig {
    /// Keep every trace.
    AlwaysSample,
    /// Keep traces up to a span budget per decision interval.
    RateLimiting {
        /// Span budget per second, averaged over the decision interval.
        spans_per_second: u64,
    },
}

/// Tail sampling processor configuration.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct TailSamplingConfig {
    /// Common settings.
    #[serde(flatten)]
    pub settings: Settings,
    /// How long a trace may accumulate spans before the decision.
    pub decision_wait_secs: u64,
    /// The policy deciding which traces to keep.
    pub policy: PolicyConfig,
}

virta_core::impl_component_config!(TailSamplingConfig, TYPE_STR);

impl Default for TailSamplingConfig {
    fn default() -> Self {
        Self {
            settings: Settings::named(TYPE_STR),
            decision_wait_secs: 30,
            policy: PolicyConfig::AlwaysSample,
        }
    }
}

/// Factory for the tail sampling processor. Traces only.
pub struct TailSamplingProcessorFactory;

impl ProcessorFactory for TailSamplingProcessorFactory {
    fn type_str(&self) -> &'static str {
        TYPE_STR
    }

    fn default_config(&self) -> Box<dyn ComponentConfig> {
        Box::new(TailSamplingConfig::default())
    }

    fn load_config(&self, subtree: &Value) -> Result<Box<dyn ComponentConfig>, DecodeError> {
        Ok(Box::new(decode_with_defaults(
            &TailSamplingConfig::default(),
            subtree,
        )?))
    }

    fn create_trace_processor(
        &self,
        cfg: &dyn ComponentConfig,
        next: Arc<dyn TraceConsumer>,
    ) -> Result<Arc<dyn TraceProcessor>, FactoryError> {
        let cfg = downcast_config::<TailSamplingConfig>(cfg, TYPE_STR)?;
        if cfg.decision_wait_secs == 0 {
            return Err(FactoryError::InvalidConfig(format!(
                "\"{}\" requires a non-zero \"decision_wait_secs\"",
                cfg.name()
            )));
        }
        Ok(Arc::new(TailSamplingProcessor {
            name: cfg.name().to_string(),
            inner: Arc::new(Inner {
                next,
                pending: Mutex::new(HashMap::new()),
                policy: cfg.policy.clone(),
                decision_wait_secs: cfg.decision_wait_secs,
                flush_cancel: CancellationToken::new(),
            }),
            shutdown_tx: Mutex::new(None),
            ticker: Mutex::new(None),
        }))
    }
}

struct PendingTrace {
    node: Node,
    spans: Vec<Span>,
    first_seen: Instant,
}

struct Inner {
    next: Arc<dyn TraceConsumer>,
    pending: Mutex<HashMap<Bytes, PendingTrace>>,
    policy: PolicyConfig,
    decision_wait_secs: u64,
    flush_cancel: CancellationToken,
}

impl Inner {
    /// Decide traces whose wait elapsed (or everything, on `drain`).
    async fn decide(&self, drain: bool) {
        let due: Vec<PendingTrace> = {
            let mut pending = self.pending.lock();
            let now = Instant::now();
            let due_ids: Vec<Bytes> = pending
                .iter()
                .filter(|(_, trace)| {
                    drain || now.duration_since(trace.first_seen).as_secs() >= self.decision_wait_secs
                })
                .map(|(id, _)| id.clone())
                .collect();
            due_ids
                .into_iter()
                .filter_map(|id| pending.remove(&id))
                .collect()
        };
        if due.is_empty() {
            return;
        }

        let mut span_budget = match self.policy {
            PolicyConfig::AlwaysSample => u64::MAX,
            PolicyConfig::RateLimiting { spans_per_second } => {
                spans_per_second * self.decision_wait_secs
            }
        };

        for trace in due {
            let span_count = trace.spans.len() as u64;
            if span_count > span_budget {
                debug!(spans = span_count, "tail sampling dropped trace over budget");
                continue;
            }
            span_budget -= span_count;
            let batch = TraceData {
                node: trace.node,
                spans: trace.spans,
            };
            if let Err(e) = self.next.consume_traces(&self.flush_cancel, &batch).await {
                warn!(error = %e, "tail sampling delivery failed");
            }
        }
    }
}

struct TailSamplingProcessor {
    name: String,
    inner: Arc<Inner>,
    shutdown_tx: Mutex<Option<watch::Sender<bool>>>,
    ticker: Mutex<Option<JoinHandle<()>>>,
}

#[async_trait]
impl TraceConsumer for TailSamplingProcessor {
    async fn consume_traces(
        &self,
        cancel: &CancellationToken,
        batch: &TraceData,
    ) -> Result<(), ConsumeError> {
        if cancel.is_cancelled() {
            return Err(ConsumeError::Cancelled);
        }
        let mut pending = self.inner.pending.lock();
        for span in &batch.spans {
            let trace = pending
                .entry(span.trace_id.clone())
                .or_insert_with(|| PendingTrace {
                    node: batch.node.clone(),
                    spans: Vec::new(),
                    first_seen: Instant::now(),
                });
            trace.spans.push(span.clone());
        }
        Ok(())
    }
}

#[async_trait]
impl TraceProcessor for TailSamplingProcessor {
    fn name(&self) -> &str {
        &self.name
    }

    async fn start(&self, _host: Arc<dyn Host>) -> Result<(), ComponentError> {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        *self.shutdown_tx.lock() = Some(shutdown_tx);

        let inner = Arc::clone(&self.inner);
        let tick = tokio::time::Duration::from_secs(inner.decision_wait_secs);
        let handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = tokio::time::sleep(tick) => {}
                    _ = shutdown_rx.changed() => {}
                }
                let drain = *shutdown_rx.borrow();
                inner.decide(drain).await;
                if drain {
                    break;
                }
            }
        });
        *self.ticker.lock() = Some(handle);
        Ok(())
    }

    async fn shutdown(&self) -> Result<(), ComponentError> {
        let shutdown_tx = self.shutdown_tx.lock().take();
        let ticker = self.ticker.lock().take();
        match (shutdown_tx, ticker) {
            (Some(tx), Some(handle)) => {
                let _ = tx.send(true);
                handle
                    .await
                    .map_err(|e| ComponentError::Shutdown(e.to_string()))?;
            }
            _ => self.inner.decide(true).await,
        }
        Ok(())
    }
}
