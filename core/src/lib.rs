//! virta-core - Core contracts for the virta telemetry collector
//!
//! This crate provides the types shared between the virta collector engine
//! and its components (receivers, processors, exporters, extensions):
//!
//! - [`TraceData`] / [`MetricsData`] - the batch types flowing through
//!   pipelines, keyed by a [`Node`] descriptor
//! - [`TraceConsumer`] / [`MetricsConsumer`] - the downstream sink traits
//! - the runtime component traits ([`TraceReceiver`], [`TraceProcessor`],
//!   [`TraceExporter`], [`Extension`], and their metrics counterparts)
//! - the factory traits ([`ReceiverFactory`], [`ProcessorFactory`],
//!   [`ExporterFactory`], [`ExtensionFactory`]) and [`FactoryRef`]
//! - [`ComponentConfig`] plus the structural config merge
//! - the [`Host`] interface and the shared error taxonomy
//!
//! # Why this crate exists
//!
//! Third-party component crates need to implement the factory and
//! component traits without depending on the collector engine, and the
//! engine wants to optionally bundle such components. Extracting the
//! contracts here breaks the cycle:
//!
//! ```text
//! virta-core ◄── virta-collector
//!     ▲
//!     └────────── external component crates
//! ```

#![deny(unsafe_code)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]
#![warn(clippy::panic)]
#![warn(missing_docs)]

/// Component runtime traits and the host interface.
pub mod component;
/// Typed component configuration and the generic default-merge.
pub mod config;
/// Consumer traits.
pub mod consumer;
/// Telemetry payload types.
pub mod data;
/// Shared error taxonomy.
pub mod error;
/// Factory traits.
pub mod factory;

pub use component::{
    ComponentKind, Extension, Host, MetricsExporter, MetricsProcessor, MetricsReceiver,
    TraceExporter, TraceProcessor, TraceReceiver,
};
pub use config::{ComponentConfig, DecodeError, Settings, decode_with_defaults, merge_values};
pub use consumer::{MetricsConsumer, TraceConsumer};
pub use data::{
    INSTANCE_LABEL, JOB_LABEL, Labels, METRIC_NAME_LABEL, MetricFamily, MetricKind, MetricsData,
    Node, PORT_ATTR, SCHEME_ATTR, SCHEME_LABEL, Sample, Span, TraceData,
};
pub use error::{ComponentError, ConsumeError, FactoryError, FanOutErrors};
pub use factory::{
    ExporterFactory, ExtensionFactory, FactoryRef, ProcessorFactory, ReceiverFactory,
    downcast_config,
};

// Re-export the cancellation token used by every consumer call so
// component crates don't need a direct tokio-util dependency.
pub use tokio_util::sync::CancellationToken;
