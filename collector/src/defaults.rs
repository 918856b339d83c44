//! The default component bundle shipped with the collector.

use crate::exporter::{
    JaegerGrpcExporterFactory, JaegerThriftHttpExporterFactory, LoggingExporterFactory,
    OpenCensusExporterFactory, PrometheusExporterFactory, ZipkinExporterFactory,
};
use crate::extension::{
    HealthCheckExtensionFactory, PprofExtensionFactory, ZpagesExtensionFactory,
};
use crate::processor::{
    AttributesProcessorFactory, BatchProcessorFactory, ProbabilisticSamplerFactory,
    QueuedRetryProcessorFactory, TailSamplingProcessorFactory,
};
use crate::receiver::{
    JaegerReceiverFactory, OpenCensusReceiverFactory, PrometheusReceiverFactory,
    VmMetricsReceiverFactory, ZipkinReceiverFactory,
};
use crate::registry::{Factories, RegistryError};
use std::sync::Arc;

/// Build the default factories bundle.
pub fn components() -> Result<Factories, RegistryError> {
    Factories::build(
        vec![
            Arc::new(JaegerReceiverFactory),
            Arc::new(ZipkinReceiverFactory),
            Arc::new(PrometheusReceiverFactory),
            Arc::new(OpenCensusReceiverFactory),
            Arc::new(VmMetricsReceiverFactory),
        ],
        vec![
            Arc::new(AttributesProcessorFactory),
            Arc::new(QueuedRetryProcessorFactory),
            Arc::new(BatchProcessorFactory),
            Arc::new(TailSamplingProcessorFactory),
            Arc::new(ProbabilisticSamplerFactory),
        ],
        vec![
            Arc::new(OpenCensusExporterFactory),
            Arc::new(PrometheusExporterFactory),
            Arc::new(LoggingExporterFactory),
            Arc::new(ZipkinExporterFactory),
            Arc::new(JaegerGrpcExporterFactory),
            Arc::new(JaegerThriftHttpExporterFactory),
        ],
        vec![
            Arc::new(HealthCheckExtensionFactory),
            Arc::new(PprofExtensionFactory),
            Arc::new(ZpagesExtensionFactory),
        ],
    )
}
