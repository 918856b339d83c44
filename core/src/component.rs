//! Runtime component traits and the host interface.
//!
//! Four component kinds exist: receivers produce batches, processors
//! transform them, exporters are terminal sinks, extensions provide
//! service-level features outside the data path. Processors and exporters
//! are consumers of their signal; receivers are not (they originate data).
//!
//! Lifecycle contract: the builder constructs components in reverse
//! dataflow order (exporters, processors, receivers) so every consumer
//! exists before the stage feeding it, starts them in that same order,
//! and stops them in forward order (receivers first) so in-flight batches
//! drain before their sinks close.

use crate::consumer::{MetricsConsumer, TraceConsumer};
use crate::error::ComponentError;
use crate::factory::FactoryRef;
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;

/// The four component kinds. Immutable per factory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ComponentKind {
    /// Ingests data from a wire protocol.
    Receiver,
    /// Transforms batches in flight.
    Processor,
    /// Terminal sink delivering to a backend.
    Exporter,
    /// Service-level feature outside the data path.
    Extension,
}

impl fmt::Display for ComponentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ComponentKind::Receiver => "receiver",
            ComponentKind::Processor => "processor",
            ComponentKind::Exporter => "exporter",
            ComponentKind::Extension => "extension",
        };
        f.write_str(s)
    }
}

/// A receiver's trace half: owns its ingest concurrency, hands batches to
/// the consumer it was created with.
#[async_trait]
pub trait TraceReceiver: Send + Sync {
    /// Begin accepting data. Called once, after all downstream stages
    /// have started.
    async fn start(&self, host: Arc<dyn Host>) -> Result<(), ComponentError>;

    /// Stop accepting new data and block until in-flight batches are
    /// handed off. Cancels in-flight consumer calls.
    async fn shutdown(&self) -> Result<(), ComponentError>;
}

/// A receiver's metrics half. Same contract as [`TraceReceiver`].
#[async_trait]
pub trait MetricsReceiver: Send + Sync {
    /// Begin accepting data.
    async fn start(&self, host: Arc<dyn Host>) -> Result<(), ComponentError>;

    /// Stop accepting and drain.
    async fn shutdown(&self) -> Result<(), ComponentError>;
}

/// A trace processor: a consumer that forwards (possibly new) batches to
/// the next consumer it was created with.
#[async_trait]
pub trait TraceProcessor: TraceConsumer {
    /// Instance name, for logging and error attribution.
    fn name(&self) -> &str;

    /// Prepare for traffic. Default: nothing to do.
    async fn start(&self, _host: Arc<dyn Host>) -> Result<(), ComponentError> {
        Ok(())
    }

    /// Flush internal queues and stop. Blocks until buffered batches have
    /// been forwarded or discarded per the processor's documented policy.
    async fn shutdown(&self) -> Result<(), ComponentError> {
        Ok(())
    }
}

/// A metrics processor. Same contract as [`TraceProcessor`].
#[async_trait]
pub trait MetricsProcessor: MetricsConsumer {
    /// Instance name.
    fn name(&self) -> &str;

    /// Prepare for traffic.
    async fn start(&self, _host: Arc<dyn Host>) -> Result<(), ComponentError> {
        Ok(())
    }

    /// Flush and stop.
    async fn shutdown(&self) -> Result<(), ComponentError> {
        Ok(())
    }
}

/// A trace exporter: the terminal consumer of a traces pipeline.
#[async_trait]
pub trait TraceExporter: TraceConsumer {
    /// Instance name.
    fn name(&self) -> &str;

    /// Prepare for traffic. Default: nothing to do.
    async fn start(&self, _host: Arc<dyn Host>) -> Result<(), ComponentError> {
        Ok(())
    }

    /// Flush pending data and release the backend connection.
    async fn shutdown(&self) -> Result<(), ComponentError> {
        Ok(())
    }
}

/// A metrics exporter. Same contract as [`TraceExporter`].
#[async_trait]
pub trait MetricsExporter: MetricsConsumer {
    /// Instance name.
    fn name(&self) -> &str;

    /// Prepare for traffic.
    async fn start(&self, _host: Arc<dyn Host>) -> Result<(), ComponentError> {
        Ok(())
    }

    /// Flush and release.
    async fn shutdown(&self) -> Result<(), ComponentError> {
        Ok(())
    }
}

/// A service extension (health check, pprof, zpages). Only its lifecycle
/// is part of the core contract.
#[async_trait]
pub trait Extension: Send + Sync {
    /// Instance name.
    fn name(&self) -> &str;

    /// Start the extension.
    async fn start(&self, host: Arc<dyn Host>) -> Result<(), ComponentError>;

    /// Stop the extension.
    async fn shutdown(&self) -> Result<(), ComponentError>;
}

/// The component's only window onto the rest of the process.
///
/// Handed to every component at start time.
pub trait Host: Send + Sync {
    /// Report an unrecoverable error. The runtime shuts the whole
    /// collector down gracefully, attributing the failure to `component`.
    /// Asynchronous: returns immediately.
    fn report_fatal_error(&self, component: &str, error: ComponentError);

    /// Look up a running extension by instance name.
    fn extension(&self, name: &str) -> Option<Arc<dyn Extension>>;

    /// Look up a registered factory by kind and type string.
    fn factory(&self, kind: ComponentKind, type_str: &str) -> Option<FactoryRef>;
}
