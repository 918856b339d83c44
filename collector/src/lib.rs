//! virta-collector - Pipeline engine for the virta telemetry collector
//!
//! Turns a declarative configuration into a running graph of receivers,
//! processors, and exporters:
//!
//! ```text
//! receivers ──► [processor₁ ► processor₂ ► …] ──► fan-out ──► exporters
//! ```
//!
//! The pieces, in the order data meets them:
//!
//! - [`registry::Factories`] - the per-kind factory index
//! - [`config`] - loader turning a parsed document into a validated
//!   [`config::LoadedConfig`]
//! - [`builder::Collector`] - instantiates, wires, starts, and stops the
//!   graph
//! - [`fanout`] - ordered fan-out consumers with error aggregation
//! - [`receiver`] / [`processor`] / [`exporter`] / [`extension`] - the
//!   default component set ([`defaults::components`])

#![deny(unsafe_code)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]
#![warn(clippy::panic)]
#![warn(missing_docs)]

/// Pipeline builder and runtime graph.
pub mod builder;
/// Configuration model and loader.
pub mod config;
/// The default component bundle.
pub mod defaults;
/// Built-in exporters.
pub mod exporter;
/// Built-in service extensions.
pub mod extension;
/// Fan-out consumers.
pub mod fanout;
/// Host implementation.
pub mod host;
/// Collector self-metrics.
pub mod observability;
/// Built-in processors.
pub mod processor;
/// Built-in receivers.
pub mod receiver;
/// Factory registry.
pub mod registry;

pub use builder::{BuildError, Collector};
pub use config::{ConfigError, LoadedConfig, PipelineConfig, ServiceConfig, Signal, load, load_str};
pub use fanout::{MetricsFanOut, TraceFanOut};
pub use host::{CollectorHost, FatalError};
pub use observability::Metrics;
pub use registry::{Factories, RegistryError};
