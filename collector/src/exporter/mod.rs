//! Built-in exporter factories.
//!
//! Exporters are the terminal consumers of a pipeline. The backend
//! transports live at the process boundary; these modules own what the
//! core sees: the typed configuration (validated at creation), the
//! consumer entry point, and shutdown.

pub mod jaeger_grpc;
pub mod jaeger_thrift_http;
pub mod logging;
pub mod opencensus;
pub mod prometheus;
pub mod zipkin;

pub use jaeger_grpc::JaegerGrpcExporterFactory;
pub use jaeger_thrift_http::JaegerThriftHttpExporterFactory;
pub use logging::LoggingExporterFactory;
pub use opencensus::OpenCensusExporterFactory;
pub use prometheus::PrometheusExporterFactory;
pub use zipkin::ZipkinExporterFactory;
