//! The scrape transaction.
//!
//! One transaction corresponds to one scrape of one target. The scrape
//! driver appends samples with [`Transaction::add`] and then either
//! commits (flush to the downstream consumer) or rolls back (discard).
//! Binding to a target happens lazily on the first sample: the `job` and
//! `instance` reserved labels identify the target, metadata is resolved,
//! and the per-target metric builder plus node descriptor are created.
//!
//! Commit and rollback consume the transaction, so the committed,
//! rolled-back, and aborted states are terminal by construction; an abort
//! surfaces as [`ScrapeError::TransactionAborted`] from `add` once the
//! cancellation token fires, after which the driver rolls back.

use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use virta_core::{
    INSTANCE_LABEL, JOB_LABEL, Labels, MetricsConsumer, MetricsData, Node, PORT_ATTR, SCHEME_ATTR,
    SCHEME_LABEL,
};

use super::jobs_map::{JobsMap, MetricsAdjuster};
use super::metadata::{MetadataService, MetricBuilder};
use super::{ScrapeError, TYPE_STR};
use crate::observability::Metrics;

/// Handle returned by [`Transaction::add`] for a fast-path re-append.
/// Always zero, like a remote store: the scrape driver treats it as
/// opaque and nothing keys off it.
const FAST_PATH_HANDLE: u64 = 0;

enum State {
    New,
    Bound(Bound),
}

struct Bound {
    job: String,
    instance: String,
    node: Node,
    builder: MetricBuilder,
}

/// Appender for one scrape of one target.
pub struct Transaction {
    state: State,
    cancel: CancellationToken,
    metadata: Arc<dyn MetadataService>,
    jobs_map: Option<Arc<JobsMap>>,
    sink: Arc<dyn MetricsConsumer>,
}

impl Transaction {
    /// Create a transaction. `jobs_map` enables stale-sample adjustment
    /// with state persisted across this target's scrape rounds.
    pub fn new(
        cancel: CancellationToken,
        metadata: Arc<dyn MetadataService>,
        jobs_map: Option<Arc<JobsMap>>,
        sink: Arc<dyn MetricsConsumer>,
    ) -> Self {
        Self {
            state: State::New,
            cancel,
            metadata,
            jobs_map,
            sink,
        }
    }

    /// Append one sample.
    ///
    /// NaN values are silently dropped and report success: when a scrape
    /// fails, the driver may still feed samples from its internal cache,
    /// and those are not data we want.
    pub fn add(
        &mut self,
        labels: &Labels,
        timestamp_ms: i64,
        value: f64,
    ) -> Result<u64, ScrapeError> {
        if value.is_nan() {
            return Ok(FAST_PATH_HANDLE);
        }
        if self.cancel.is_cancelled() {
            return Err(ScrapeError::TransactionAborted);
        }
        if matches!(self.state, State::New) {
            self.state = State::Bound(self.bind_target(labels)?);
        }
        if let State::Bound(bound) = &mut self.state {
            bound.builder.add_sample(labels, timestamp_ms, value)?;
        }
        Ok(FAST_PATH_HANDLE)
    }

    /// Resolve the target identity from the first sample's reserved
    /// labels.
    fn bind_target(&self, labels: &Labels) -> Result<Bound, ScrapeError> {
        let job = labels.get(JOB_LABEL);
        let instance = labels.get(INSTANCE_LABEL);
        if job.is_empty() || instance.is_empty() {
            return Err(ScrapeError::MissingJobOrInstance);
        }
        let metadata = self.metadata.get(job, instance)?;
        let node = build_node(job, instance, metadata.shared_labels.get(SCHEME_LABEL));
        Ok(Bound {
            job: job.to_string(),
            instance: instance.to_string(),
            node,
            builder: MetricBuilder::new(metadata),
        })
    }

    /// Finalise and deliver the batch downstream.
    ///
    /// A transaction that never bound (the scrape returned no data, for
    /// instance because the target was unreachable) commits as a no-op.
    pub async fn commit(self) -> Result<(), ScrapeError> {
        let bound = match self.state {
            State::New => return Ok(()),
            State::Bound(bound) => bound,
        };

        let (families, kept, dropped) = bound.builder.build();
        if let Some(metrics) = Metrics::get() {
            metrics.record_scrape(TYPE_STR, kept, dropped);
        }

        let families = match &self.jobs_map {
            Some(jobs_map) => {
                MetricsAdjuster::new(jobs_map.get(&bound.job, &bound.instance)).adjust(families)
            }
            None => families,
        };
        // Adjustment can leave nothing behind; check before delivering.
        if families.is_empty() {
            return Ok(());
        }

        let batch = MetricsData {
            node: bound.node,
            metrics: families,
        };
        self.sink.consume_metrics(&self.cancel, &batch).await?;
        Ok(())
    }

    /// Discard everything appended so far.
    pub fn rollback(self) {}
}

/// Node descriptor for a scrape target: service name from the job, host
/// and port from `instance` (`host[:port]`, port defaulting to `"80"`),
/// scheme from the target's shared labels.
fn build_node(job: &str, instance: &str, scheme: &str) -> Node {
    let mut parts = instance.split(':');
    let host = parts.next().unwrap_or(instance);
    let port = parts.next().unwrap_or("80");
    Node::new(job, host)
        .with_attribute(PORT_ATTR, port)
        .with_attribute(SCHEME_ATTR, scheme)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::super::metadata::StaticMetadataService;
    use super::*;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicU64, Ordering};
    use virta_core::{ConsumeError, METRIC_NAME_LABEL};

    // ======================================================================
    // Test sink capturing delivered batches
    // ======================================================================

    #[derive(Default)]
    struct CaptureSink {
        batches: Mutex<Vec<MetricsData>>,
        calls: AtomicU64,
    }

    #[async_trait]
    impl MetricsConsumer for CaptureSink {
        async fn consume_metrics(
            &self,
            _cancel: &CancellationToken,
            batch: &MetricsData,
        ) -> Result<(), ConsumeError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.batches.lock().push(batch.clone());
            Ok(())
        }
    }

    fn metadata_with_scheme(scheme: &str) -> Arc<dyn MetadataService> {
        Arc::new(StaticMetadataService::new(
            Labels::new().with(SCHEME_LABEL, scheme),
        ))
    }

    fn sample_labels() -> Labels {
        Labels::new()
            .with(METRIC_NAME_LABEL, "m")
            .with(JOB_LABEL, "j")
            .with(INSTANCE_LABEL, "h:9090")
    }

    fn transaction(sink: Arc<CaptureSink>, jobs_map: Option<Arc<JobsMap>>) -> Transaction {
        Transaction::new(
            CancellationToken::new(),
            metadata_with_scheme("http"),
            jobs_map,
            sink,
        )
    }

    // ======================================================================
    // Happy path
    // ======================================================================

    #[tokio::test]
    async fn committed_batch_carries_target_node() {
        let sink = Arc::new(CaptureSink::default());
        let mut tx = transaction(Arc::clone(&sink), None);

        let handle = tx.add(&sample_labels(), 1, 1.0).unwrap();
        assert_eq!(handle, 0);
        tx.commit().await.unwrap();

        let batches = sink.batches.lock();
        assert_eq!(batches.len(), 1);
        let node = &batches[0].node;
        assert_eq!(node.service_name, "j");
        assert_eq!(node.host_name, "h");
        assert_eq!(node.attributes.get(PORT_ATTR).map(String::as_str), Some("9090"));
        assert_eq!(node.attributes.get(SCHEME_ATTR).map(String::as_str), Some("http"));
        assert_eq!(batches[0].metrics[0].name, "m");
    }

    #[tokio::test]
    async fn instance_without_port_defaults_to_80() {
        let sink = Arc::new(CaptureSink::default());
        let mut tx = transaction(Arc::clone(&sink), None);

        let labels = Labels::new()
            .with(METRIC_NAME_LABEL, "m")
            .with(JOB_LABEL, "j")
            .with(INSTANCE_LABEL, "bare-host");
        tx.add(&labels, 1, 1.0).unwrap();
        tx.commit().await.unwrap();

        let batches = sink.batches.lock();
        assert_eq!(batches[0].node.host_name, "bare-host");
        assert_eq!(
            batches[0].node.attributes.get(PORT_ATTR).map(String::as_str),
            Some("80")
        );
    }

    // ======================================================================
    // Empty and discarded transactions
    // ======================================================================

    #[tokio::test]
    async fn commit_without_samples_is_a_no_op() {
        let sink = Arc::new(CaptureSink::default());
        let tx = transaction(Arc::clone(&sink), None);

        tx.commit().await.unwrap();
        assert_eq!(sink.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn rollback_discards_appended_samples() {
        let sink = Arc::new(CaptureSink::default());
        let mut tx = transaction(Arc::clone(&sink), None);

        tx.add(&sample_labels(), 1, 1.0).unwrap();
        tx.rollback();
        assert_eq!(sink.calls.load(Ordering::SeqCst), 0);
    }

    // ======================================================================
    // add() edge cases
    // ======================================================================

    #[tokio::test]
    async fn nan_samples_silently_dropped() {
        let sink = Arc::new(CaptureSink::default());
        let mut tx = transaction(Arc::clone(&sink), None);

        tx.add(&sample_labels(), 1, f64::NAN).unwrap();
        // The NaN never bound the transaction, so commit is a no-op.
        tx.commit().await.unwrap();
        assert_eq!(sink.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn missing_job_or_instance_rejected() {
        let sink = Arc::new(CaptureSink::default());
        let mut tx = transaction(sink, None);

        let labels = Labels::new().with(METRIC_NAME_LABEL, "m").with(JOB_LABEL, "j");
        assert!(matches!(
            tx.add(&labels, 1, 1.0),
            Err(ScrapeError::MissingJobOrInstance)
        ));
    }

    #[tokio::test]
    async fn cancelled_transaction_aborts() {
        let sink = Arc::new(CaptureSink::default());
        let cancel = CancellationToken::new();
        let mut tx = Transaction::new(
            cancel.clone(),
            metadata_with_scheme("http"),
            None,
            sink,
        );

        cancel.cancel();
        assert!(matches!(
            tx.add(&sample_labels(), 1, 1.0),
            Err(ScrapeError::TransactionAborted)
        ));
    }

    #[tokio::test]
    async fn unknown_target_metadata_surfaces() {
        struct NoMetadata;

        impl MetadataService for NoMetadata {
            fn get(
                &self,
                job: &str,
                instance: &str,
            ) -> Result<Arc<super::super::metadata::TargetMetadata>, ScrapeError> {
                Err(ScrapeError::MetadataUnknown {
                    job: job.to_string(),
                    instance: instance.to_string(),
                })
            }
        }

        let sink = Arc::new(CaptureSink::default());
        let mut tx = Transaction::new(
            CancellationToken::new(),
            Arc::new(NoMetadata),
            None,
            sink,
        );
        assert!(matches!(
            tx.add(&sample_labels(), 1, 1.0),
            Err(ScrapeError::MetadataUnknown { .. })
        ));
    }

    // ======================================================================
    // Staleness adjustment across rounds
    // ======================================================================

    #[tokio::test]
    async fn repeated_round_with_same_timestamp_delivers_nothing() {
        let sink = Arc::new(CaptureSink::default());
        let jobs_map = Arc::new(JobsMap::new());

        let mut first = transaction(Arc::clone(&sink), Some(Arc::clone(&jobs_map)));
        first.add(&sample_labels(), 10, 1.0).unwrap();
        first.commit().await.unwrap();
        assert_eq!(sink.calls.load(Ordering::SeqCst), 1);

        // Same timestamp again: everything is adjusted away, and the
        // empty batch is not delivered.
        let mut second = transaction(Arc::clone(&sink), Some(jobs_map));
        second.add(&sample_labels(), 10, 1.0).unwrap();
        second.commit().await.unwrap();
        assert_eq!(sink.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn advancing_round_keeps_first_start_timestamp() {
        let sink = Arc::new(CaptureSink::default());
        let jobs_map = Arc::new(JobsMap::new());

        let mut first = transaction(Arc::clone(&sink), Some(Arc::clone(&jobs_map)));
        first.add(&sample_labels(), 10, 1.0).unwrap();
        first.commit().await.unwrap();

        let mut second = transaction(Arc::clone(&sink), Some(jobs_map));
        second.add(&sample_labels(), 20, 5.0).unwrap();
        second.commit().await.unwrap();

        let batches = sink.batches.lock();
        assert_eq!(batches.len(), 2);
        assert_eq!(batches[1].metrics[0].samples[0].start_timestamp_ms, Some(10));
    }
}
