//! Probabilistic sampler: keeps a configurable percentage of traces.
//!
//! Sampling is deterministic per trace id, so every span of a trace gets
//! the same verdict regardless of which batch carried it.

use async_trait::async_trait;
use serde_yaml::Value;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use virta_core::{
    ComponentConfig, ConsumeError, DecodeError, FactoryError, ProcessorFactory, Settings,
    TraceConsumer, TraceData, TraceProcessor, decode_with_defaults, downcast_config,
};

const TYPE_STR: &str = "probabilistic_sampler";

/// Probabilistic sampler configuration.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ProbabilisticSamplerConfig {
    /// Common settings.
    #[serde(flatten)]
    pub settings: Settings,
    /// Percentage of traces to keep, 0.0 to 100.0.
    pub sampling_percentage: f64,
}

virta_core::impl_component_config!(ProbabilisticSamplerConfig, TYPE_STR);

impl Default for ProbabilisticSamplerConfig {
    fn default() -> Self {
        Self {
            settings: Settings::named(TYPE_STR),
            sampling_percentage: 100.0,
        }
    }
}

/// Factory for the probabilistic sampler. Traces only.
pub struct ProbabilisticSamplerFactory;

impl ProcessorFactory for ProbabilisticSamplerFactory {
    fn type_str(&self) -> &'static str {
        TYPE_STR
    }

    fn default_config(&self) -> Box<dyn ComponentConfig> {
        Box::new(ProbabilisticSamplerConfig::default())
    }

    fn load_config(&self, subtree: &Value) -> Result<Box<dyn ComponentConfig>, DecodeError> {
        Ok(Box::new(decode_with_defaults(
            &ProbabilisticSamplerConfig::default(),
            subtree,
        )?))
    }

    fn create_trace_processor(
        &self,
        cfg: &dyn ComponentConfig,
        next: Arc<dyn TraceConsumer>,
    ) -> Result<Arc<dyn TraceProcessor>, FactoryError> {
        let cfg = downcast_config::<ProbabilisticSamplerConfig>(cfg, TYPE_STR)?;
        if !(0.0..=100.0).contains(&cfg.sampling_percentage) {
            return Err(FactoryError::InvalidConfig(format!(
                "\"{}\" requires \"sampling_percentage\" between 0 and 100",
                cfg.name()
            )));
        }
        Ok(Arc::new(ProbabilisticSampler {
            name: cfg.name().to_string(),
            threshold: threshold_for(cfg.sampling_percentage),
            next,
        }))
    }
}

/// Map a percentage to a threshold over the hash range.
fn threshold_for(percentage: f64) -> u64 {
    if percentage >= 100.0 {
        u64::MAX
    } else if percentage <= 0.0 {
        0
    } else {
        (percentage / 100.0 * u64::MAX as f64) as u64
    }
}

/// FNV-1a over the trace id. Stable across restarts, so the same trace
/// always lands on the same side of the threshold.
fn hash_trace_id(trace_id: &[u8]) -> u64 {
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for byte in trace_id {
        hash ^= u64::from(*byte);
        hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
    }
    hash
}

struct ProbabilisticSampler {
    name: String,
    threshold: u64,
    next: Arc<dyn TraceConsumer>,
}

#[async_trait]
impl TraceConsumer for ProbabilisticSampler {
    async fn consume_traces(
        &self,
        cancel: &CancellationToken,
        batch: &TraceData,
    ) -> Result<(), ConsumeError> {
        if self.threshold == u64::MAX {
            return self.next.consume_traces(cancel, batch).await;
        }

        let kept: Vec<_> = batch
            .spans
            .iter()
            .filter(|span| hash_trace_id(&span.trace_id) <= self.threshold)
            .cloned()
            .collect();

        if kept.is_empty() {
            return Ok(());
        }
        if kept.len() == batch.spans.len() {
            return self.next.consume_traces(cancel, batch).await;
        }
        let sampled = TraceData {
            node: batch.node.clone(),
            spans: kept,
        };
        self.next.consume_traces(cancel, &sampled).await
    }
}

#[async_trait]
impl TraceProcessor for ProbabilisticSampler {
    fn name(&self) -> &str {
        &self.name
    }
}
