//! Attributes processor: upserts a fixed set of span attributes.

use async_trait::async_trait;
use serde_yaml::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use virta_core::{
    ComponentConfig, ConsumeError, DecodeError, FactoryError, ProcessorFactory, Settings,
    TraceConsumer, TraceData, TraceProcessor, decode_with_defaults, downcast_config,
};

const TYPE_STR: &str = "attributes";

/// Attributes processor configuration.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct AttributesProcessorConfig {
    /// Common settings.
    #[serde(flatten)]
    pub settings: Settings,
    /// Attributes inserted into (or overwritten on) every span.
    #[serde(default)]
    pub values: BTreeMap<String, String>,
}

virta_core::impl_component_config!(AttributesProcessorConfig, TYPE_STR);

/// Factory for the attributes processor. Traces only.
pub struct AttributesProcessorFactory;

impl ProcessorFactory for AttributesProcessorFactory {
    fn type_str(&self) -> &'static str {
        TYPE_STR
    }

    fn default_config(&self) -> Box<dyn ComponentConfig> {
        Box::new(AttributesProcessorConfig {
            settings: Settings::named(TYPE_STR),
            ..Default::default()
        })
    }

    fn load_config(&self, subtree: &Value) -> Result<Box<dyn ComponentConfig>, DecodeError> {
        let default = AttributesProcessorConfig {
            settings: Settings::named(TYPE_STR),
            ..Default::default()
        };
        Ok(Box::new(decode_with_defaults(&default, subtree)?))
    }

    fn create_trace_processor(
        &self,
        cfg: &dyn ComponentConfig,
        next: Arc<dyn TraceConsumer>,
    ) -> Result<Arc<dyn TraceProcessor>, FactoryError> {
        let cfg = downcast_config::<AttributesProcessorConfig>(cfg, TYPE_STR)?;
        Ok(Arc::new(AttributesProcessor {
            name: cfg.name().to_string(),
            values: cfg.values.clone(),
            next,
        }))
    }
}

struct AttributesProcessor {
    name: String,
    values: BTreeMap<String, String>,
    next: Arc<dyn TraceConsumer>,
}

#[async_trait]
impl TraceConsumer for AttributesProcessor {
    async fn consume_traces(
        &self,
        cancel: &CancellationToken,
        batch: &TraceData,
    ) -> Result<(), ConsumeError> {
        if self.values.is_empty() {
            return self.next.consume_traces(cancel, batch).await;
        }

        // Modified batches are new batches; the incoming one stays shared.
        let mut modified = batch.clone();
        for span in &mut modified.spans {
            for (key, value) in &self.values {
                span.attributes.insert(key.clone(), value.clone());
            }
        }
        self.next.consume_traces(cancel, &modified).await
    }
}

#[async_trait]
impl TraceProcessor for AttributesProcessor {
    fn name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use virta_core::Span;

    #[derive(Default)]
    struct CaptureSink(Mutex<Vec<TraceData>>);

    #[async_trait]
    impl TraceConsumer for CaptureSink {
        async fn consume_traces(
            &self,
            _cancel: &CancellationToken,
            batch: &TraceData,
        ) -> Result<(), ConsumeError> {
            self.0.lock().push(batch.clone());
            Ok(())
        }
    }

    #[tokio::test]
    async fn upserts_attributes_on_every_span() {
        let sink = Arc::new(CaptureSink::default());
        let factory = AttributesProcessorFactory;
        let subtree: Value =
            serde_yaml::from_str("values:\n  env: prod\n  region: eu\n").unwrap();
        let cfg = factory.load_config(&subtree).unwrap();
        let processor = factory
            .create_trace_processor(cfg.as_ref(), sink.clone())
            .unwrap();

        let mut span = Span::default();
        span.attributes.insert("env".to_string(), "dev".to_string());
        let batch = TraceData {
            spans: vec![span, Span::default()],
            ..Default::default()
        };
        processor
            .consume_traces(&CancellationToken::new(), &batch)
            .await
            .unwrap();

        let captured = sink.0.lock();
        for span in &captured[0].spans {
            assert_eq!(span.attributes.get("env").map(String::as_str), Some("prod"));
            assert_eq!(span.attributes.get("region").map(String::as_str), Some("eu"));
        }
        // The original batch is untouched.
        assert_eq!(
            batch.spans[0].attributes.get("env").map(String::as_str),
            Some("dev")
        );
    }

    #[tokio::test]
    async fn empty_values_forward_unchanged() {
        let sink = Arc::new(CaptureSink::default());
        let factory = AttributesProcessorFactory;
        let cfg = factory.default_config();
        let processor = factory
            .create_trace_processor(cfg.as_ref(), sink.clone())
            .unwrap();

        let batch = TraceData {
            spans: vec![Span::default()],
            ..Default::default()
        };
        processor
            .consume_traces(&CancellationToken::new(), &batch)
            .await
            .unwrap();
        assert_eq!(sink.0.lock()[0], batch);
    }

    #[test]
    fn metrics_unsupported() {
        struct Sink;
        #[async_trait]
        impl virta_core::MetricsConsumer for Sink {
            async fn consume_metrics(
                &self,
                _cancel: &CancellationToken,
                _batch: &virta_core::MetricsData,
            ) -> Result<(), ConsumeError> {
                Ok(())
            }
        }

        let factory = AttributesProcessorFactory;
        let cfg = factory.default_config();
        assert!(matches!(
            factory.create_metrics_processor(cfg.as_ref(), Arc::new(Sink)),
            Err(FactoryError::DataTypeUnsupported)
        ));
    }
}
