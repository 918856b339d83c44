//! Configuration model: the validated output of the loader.

use std::collections::BTreeMap;
use std::fmt;
use virta_core::ComponentConfig;

/// The signal a pipeline carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Signal {
    /// Distributed trace spans.
    Traces,
    /// Metric timeseries.
    Metrics,
}

impl Signal {
    /// Parse a pipeline key's type part.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "traces" => Some(Signal::Traces),
            "metrics" => Some(Signal::Metrics),
            _ => None,
        }
    }
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Signal::Traces => "traces",
            Signal::Metrics => "metrics",
        })
    }
}

/// One pipeline: a signal-typed ordered triple of component name lists.
/// Processor order is observed exactly at runtime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineConfig {
    /// Pipeline name (`traces` or `traces/suffix`, ...).
    pub name: String,
    /// The signal this pipeline carries.
    pub signal: Signal,
    /// Receiver instance names feeding the pipeline.
    pub receivers: Vec<String>,
    /// Processor instance names, in dataflow order.
    pub processors: Vec<String>,
    /// Exporter instance names fanned out to.
    pub exporters: Vec<String>,
}

/// The `service` section: which extensions run and which pipelines exist.
#[derive(Debug, Clone, Default)]
pub struct ServiceConfig {
    /// Extension instance names, in start order.
    pub extensions: Vec<String>,
    /// Pipelines keyed by name.
    pub pipelines: BTreeMap<String, PipelineConfig>,
}

/// A fully loaded and validated configuration.
pub struct LoadedConfig {
    /// Receiver configs keyed by instance name.
    pub receivers: BTreeMap<String, Box<dyn ComponentConfig>>,
    /// Processor configs keyed by instance name.
    pub processors: BTreeMap<String, Box<dyn ComponentConfig>>,
    /// Exporter configs keyed by instance name.
    pub exporters: BTreeMap<String, Box<dyn ComponentConfig>>,
    /// Extension configs keyed by instance name.
    pub extensions: BTreeMap<String, Box<dyn ComponentConfig>>,
    /// The service section.
    pub service: ServiceConfig,
}

impl fmt::Debug for LoadedConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoadedConfig")
            .field("receivers", &self.receivers.keys().collect::<Vec<_>>())
            .field("processors", &self.processors.keys().collect::<Vec<_>>())
            .field("exporters", &self.exporters.keys().collect::<Vec<_>>())
            .field("extensions", &self.extensions.keys().collect::<Vec<_>>())
            .field("service", &self.service)
            .finish()
    }
}

/// Split an instance name into its type part and optional suffix.
/// Valid forms are `type` and `type/suffix`, both parts non-empty.
pub fn split_name(key: &str) -> Option<(&str, Option<&str>)> {
    match key.split_once('/') {
        None if !key.is_empty() => Some((key, None)),
        Some((type_str, suffix)) if !type_str.is_empty() && !suffix.is_empty() => {
            Some((type_str, Some(suffix)))
        }
        _ => None,
    }
}
