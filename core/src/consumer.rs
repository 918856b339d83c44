//! Consumer traits — the downstream sink for one signal.
//!
//! Every non-terminal pipeline stage is itself a consumer for its signal;
//! exporters are the terminal consumers. Batches are passed by reference
//! and must be treated as immutable: a processor that wants to modify one
//! builds a new batch and forwards that instead.
//!
//! # Example
//!
//! ```ignore
//! use virta_core::{ConsumeError, TraceConsumer, TraceData};
//! use tokio_util::sync::CancellationToken;
//!
//! struct CountingSink(std::sync::atomic::AtomicU64);
//!
//! #[async_trait::async_trait]
//! impl TraceConsumer for CountingSink {
//!     async fn consume_traces(
//!         &self,
//!         _cancel: &CancellationToken,
//!         batch: &TraceData,
//!     ) -> Result<(), ConsumeError> {
//!         self.0.fetch_add(batch.spans.len() as u64, std::sync::atomic::Ordering::Relaxed);
//!         Ok(())
//!     }
//! }
//! ```

use crate::data::{MetricsData, TraceData};
use crate::error::ConsumeError;
use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

/// Sink for trace batches.
///
/// Calls may block while downstream stages apply backpressure; callers are
/// expected to stop accepting new input while blocked. The cancellation
/// token is triggered by the owning receiver on shutdown, and
/// implementations must abort cleanly when it fires, surfacing
/// [`ConsumeError::Cancelled`].
#[async_trait]
pub trait TraceConsumer: Send + Sync {
    /// Deliver one trace batch downstream.
    async fn consume_traces(
        &self,
        cancel: &CancellationToken,
        batch: &TraceData,
    ) -> Result<(), ConsumeError>;
}

/// Sink for metrics batches. Same contract as [`TraceConsumer`].
#[async_trait]
pub trait MetricsConsumer: Send + Sync {
    /// Deliver one metrics batch downstream.
    async fn consume_metrics(
        &self,
        cancel: &CancellationToken,
        batch: &MetricsData,
    ) -> Result<(), ConsumeError>;
}
