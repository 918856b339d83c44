//! Fan-out consumers.
//!
//! A fan-out wraps an ordered list of downstream consumers and hands every
//! incoming batch to each of them, in list order, with the same shared
//! reference. Batches are immutable by convention, so no copies are made.
//! Errors are collected rather than short-circuiting: every downstream is
//! invoked exactly once per call, successful deliveries are never rolled
//! back, and the combined error lists all failures.

use crate::observability::Metrics;
use async_trait::async_trait;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::error;
use virta_core::{
    ConsumeError, FanOutErrors, MetricsConsumer, MetricsData, TraceConsumer, TraceData,
};

/// Fan-out for trace batches.
pub struct TraceFanOut {
    downstreams: Vec<Arc<dyn TraceConsumer>>,
}

impl TraceFanOut {
    /// Create a fan-out over the given downstreams, invoked in order.
    pub fn new(downstreams: Vec<Arc<dyn TraceConsumer>>) -> Self {
        Self { downstreams }
    }

    /// Wrap a downstream list, skipping the fan-out indirection for a
    /// single target.
    pub fn wrap(mut downstreams: Vec<Arc<dyn TraceConsumer>>) -> Arc<dyn TraceConsumer> {
        if downstreams.len() == 1 {
            downstreams.remove(0)
        } else {
            Arc::new(Self::new(downstreams))
        }
    }
}

#[async_trait]
impl TraceConsumer for TraceFanOut {
    async fn consume_traces(
        &self,
        cancel: &CancellationToken,
        batch: &TraceData,
    ) -> Result<(), ConsumeError> {
        let mut failures = Vec::new();
        for downstream in &self.downstreams {
            match downstream.consume_traces(cancel, batch).await {
                Ok(()) => {
                    if let Some(m) = Metrics::get() {
                        m.fanout_delivered.with_label_values(&["traces"]).inc();
                    }
                }
                Err(e) => {
                    error!(error = %e, "trace fan-out downstream failed");
                    if let Some(m) = Metrics::get() {
                        m.fanout_failed.with_label_values(&["traces"]).inc();
                    }
                    failures.push(e);
                }
            }
        }
        if failures.is_empty() {
            Ok(())
        } else {
            Err(ConsumeError::FanOut(FanOutErrors(failures)))
        }
    }
}

/// Fan-out for metrics batches. Same semantics as [`TraceFanOut`].
pub struct MetricsFanOut {
    downstreams: Vec<Arc<dyn MetricsConsumer>>,
}

impl MetricsFanOut {
    /// Create a fan-out over the given downstreams, invoked in order.
    pub fn new(downstreams: Vec<Arc<dyn MetricsConsumer>>) -> Self {
        Self { downstreams }
    }

    /// Wrap a downstream list, skipping the fan-out indirection for a
    /// single target.
    pub fn wrap(mut downstreams: Vec<Arc<dyn MetricsConsumer>>) -> Arc<dyn MetricsConsumer> {
        if downstreams.len() == 1 {
            downstreams.remove(0)
        } else {
            Arc::new(Self::new(downstreams))
        }
    }
}

#[async_trait]
impl MetricsConsumer for MetricsFanOut {
    async fn consume_metrics(
        &self,
        cancel: &CancellationToken,
        batch: &MetricsData,
    ) -> Result<(), ConsumeError> {
        let mut failures = Vec::new();
        for downstream in &self.downstreams {
            match downstream.consume_metrics(cancel, batch).await {
                Ok(()) => {
                    if let Some(m) = Metrics::get() {
                        m.fanout_delivered.with_label_values(&["metrics"]).inc();
                    }
                }
                Err(e) => {
                    error!(error = %e, "metrics fan-out downstream failed");
                    if let Some(m) = Metrics::get() {
                        m.fanout_failed.with_label_values(&["metrics"]).inc();
                    }
                    failures.push(e);
                }
            }
        }
        if failures.is_empty() {
            Ok(())
        } else {
            Err(ConsumeError::FanOut(FanOutErrors(failures)))
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicU64, Ordering};
    use virta_core::Span;

    /// Records call order into a shared log; optionally fails.
    struct RecordingConsumer {
        tag: &'static str,
        log: Arc<Mutex<Vec<&'static str>>>,
        calls: AtomicU64,
        fail: bool,
    }

    impl RecordingConsumer {
        fn new(tag: &'static str, log: Arc<Mutex<Vec<&'static str>>>, fail: bool) -> Arc<Self> {
            Arc::new(Self {
                tag,
                log,
                calls: AtomicU64::new(0),
                fail,
            })
        }
    }

    #[async_trait]
    impl TraceConsumer for RecordingConsumer {
        async fn consume_traces(
            &self,
            _cancel: &CancellationToken,
            _batch: &TraceData,
        ) -> Result<(), ConsumeError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.log.lock().push(self.tag);
            if self.fail {
                Err(ConsumeError::component(self.tag, "intentional failure"))
            } else {
                Ok(())
            }
        }
    }

    fn batch() -> TraceData {
        TraceData {
            spans: vec![Span::default()],
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn every_downstream_invoked_once_in_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let a = RecordingConsumer::new("a", Arc::clone(&log), false);
        let b = RecordingConsumer::new("b", Arc::clone(&log), false);
        let c = RecordingConsumer::new("c", Arc::clone(&log), false);

        let fanout = TraceFanOut::new(vec![a.clone(), b.clone(), c.clone()]);
        fanout
            .consume_traces(&CancellationToken::new(), &batch())
            .await
            .unwrap();

        assert_eq!(*log.lock(), vec!["a", "b", "c"]);
        assert_eq!(a.calls.load(Ordering::SeqCst), 1);
        assert_eq!(b.calls.load(Ordering::SeqCst), 1);
        assert_eq!(c.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failures_do_not_stop_later_downstreams() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let a = RecordingConsumer::new("a", Arc::clone(&log), true);
        let b = RecordingConsumer::new("b", Arc::clone(&log), false);

        let fanout = TraceFanOut::new(vec![a, b.clone()]);
        let err = fanout
            .consume_traces(&CancellationToken::new(), &batch())
            .await
            .unwrap_err();

        // The successful downstream was still invoked.
        assert_eq!(b.calls.load(Ordering::SeqCst), 1);
        // The combined error names the failure.
        assert!(err.to_string().contains("'a'"));
    }

    #[tokio::test]
    async fn aggregated_error_lists_all_failures() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let a = RecordingConsumer::new("a", Arc::clone(&log), true);
        let b = RecordingConsumer::new("b", Arc::clone(&log), true);
        let c = RecordingConsumer::new("c", Arc::clone(&log), false);

        let fanout = TraceFanOut::new(vec![a, b, c]);
        let err = fanout
            .consume_traces(&CancellationToken::new(), &batch())
            .await
            .unwrap_err();

        match err {
            ConsumeError::FanOut(FanOutErrors(failures)) => assert_eq!(failures.len(), 2),
            other => panic!("expected fan-out error, got {other}"),
        }
    }

    #[tokio::test]
    async fn wrap_single_downstream_is_direct() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let only = RecordingConsumer::new("only", Arc::clone(&log), false);
        let wrapped = TraceFanOut::wrap(vec![only.clone()]);

        wrapped
            .consume_traces(&CancellationToken::new(), &batch())
            .await
            .unwrap();
        assert_eq!(only.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn empty_fanout_succeeds() {
        let fanout = TraceFanOut::new(vec![]);
        fanout
            .consume_traces(&CancellationToken::new(), &batch())
            .await
            .unwrap();
    }
}
