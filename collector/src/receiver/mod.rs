//! Built-in receiver factories.
//!
//! Receivers ingest telemetry from wire protocols and hand batches to the
//! consumer they were created with. The wire listeners themselves live at
//! the process boundary; what the collector core sees — and what these
//! modules implement — is the factory contract, the typed configuration,
//! and the lifecycle (start accepting, stop and drain).
//!
//! ```text
//! wire protocol ──► receiver ──► TraceConsumer / MetricsConsumer
//! ```

pub mod jaeger;
pub mod opencensus;
pub mod prometheus;
pub mod vmmetrics;
pub mod zipkin;

pub use jaeger::JaegerReceiverFactory;
pub use opencensus::OpenCensusReceiverFactory;
pub use prometheus::PrometheusReceiverFactory;
pub use vmmetrics::VmMetricsReceiverFactory;
pub use zipkin::ZipkinReceiverFactory;
