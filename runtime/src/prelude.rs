//! Convenience re-exports for collector embedders.
//!
//! ```rust
//! use virta_runtime::prelude::*;
//! ```

// Batch and identity types
pub use virta_core::{Labels, MetricFamily, MetricsData, Node, Sample, Span, TraceData};

// Consumer and component contracts
pub use virta_core::{
    Extension, MetricsConsumer, MetricsExporter, MetricsProcessor, MetricsReceiver,
    TraceConsumer, TraceExporter, TraceProcessor, TraceReceiver,
};

// Factory contracts
pub use virta_core::{
    ComponentConfig, ExporterFactory, ExtensionFactory, ProcessorFactory, ReceiverFactory,
    Settings,
};

// Errors
pub use virta_core::{ComponentError, ConsumeError, FactoryError};

// Engine
pub use virta_collector::{Collector, Factories, LoadedConfig, Signal, defaults, load_str};

// Cancellation token used by every consumer call
pub use virta_core::CancellationToken;

// Runtime
pub use crate::{Service, ServiceError};
