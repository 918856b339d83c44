//! Factory traits — stateless constructors for each component kind.
//!
//! The four factory variants deliberately share no structural supertype
//! beyond their type string: the registry is four maps, not one, and
//! cross-kind dispatch goes through the [`FactoryRef`] sum type.
//!
//! A factory advertises its type string, produces its default config,
//! decodes a config subtree (the default `load_config` path is the
//! generic merge in [`crate::config`]; factories with polymorphic
//! sub-records override it), and constructs components per signal.
//! Returning [`FactoryError::DataTypeUnsupported`] from a `create_*`
//! method is the first-class way to say "skip this wiring".

use crate::component::{
    Extension, MetricsExporter, MetricsProcessor, MetricsReceiver, TraceExporter, TraceProcessor,
    TraceReceiver,
};
use crate::config::{ComponentConfig, DecodeError};
use crate::consumer::{MetricsConsumer, TraceConsumer};
use crate::error::FactoryError;
use serde_yaml::Value;
use std::sync::Arc;

/// Factory for receivers. May support one or both signals.
pub trait ReceiverFactory: Send + Sync {
    /// The type string this factory answers to (`"jaeger"`, ...).
    fn type_str(&self) -> &'static str;

    /// The default configuration, named after the type string.
    fn default_config(&self) -> Box<dyn ComponentConfig>;

    /// Decode a config subtree into a typed config. Overriding this is
    /// how multi-protocol receivers install their custom unmarshalling.
    fn load_config(&self, subtree: &Value) -> Result<Box<dyn ComponentConfig>, DecodeError>;

    /// Create the trace half, wired to `next`.
    fn create_trace_receiver(
        &self,
        _cfg: &dyn ComponentConfig,
        _next: Arc<dyn TraceConsumer>,
    ) -> Result<Arc<dyn TraceReceiver>, FactoryError> {
        Err(FactoryError::DataTypeUnsupported)
    }

    /// Create the metrics half, wired to `next`.
    fn create_metrics_receiver(
        &self,
        _cfg: &dyn ComponentConfig,
        _next: Arc<dyn MetricsConsumer>,
    ) -> Result<Arc<dyn MetricsReceiver>, FactoryError> {
        Err(FactoryError::DataTypeUnsupported)
    }
}

/// Factory for processors.
pub trait ProcessorFactory: Send + Sync {
    /// The type string this factory answers to.
    fn type_str(&self) -> &'static str;

    /// The default configuration.
    fn default_config(&self) -> Box<dyn ComponentConfig>;

    /// Decode a config subtree into a typed config.
    fn load_config(&self, subtree: &Value) -> Result<Box<dyn ComponentConfig>, DecodeError>;

    /// Create a trace processor forwarding to `next`.
    fn create_trace_processor(
        &self,
        _cfg: &dyn ComponentConfig,
        _next: Arc<dyn TraceConsumer>,
    ) -> Result<Arc<dyn TraceProcessor>, FactoryError> {
        Err(FactoryError::DataTypeUnsupported)
    }

    /// Create a metrics processor forwarding to `next`.
    fn create_metrics_processor(
        &self,
        _cfg: &dyn ComponentConfig,
        _next: Arc<dyn MetricsConsumer>,
    ) -> Result<Arc<dyn MetricsProcessor>, FactoryError> {
        Err(FactoryError::DataTypeUnsupported)
    }
}

/// Factory for exporters.
pub trait ExporterFactory: Send + Sync {
    /// The type string this factory answers to.
    fn type_str(&self) -> &'static str;

    /// The default configuration.
    fn default_config(&self) -> Box<dyn ComponentConfig>;

    /// Decode a config subtree into a typed config.
    fn load_config(&self, subtree: &Value) -> Result<Box<dyn ComponentConfig>, DecodeError>;

    /// Create a trace exporter.
    fn create_trace_exporter(
        &self,
        _cfg: &dyn ComponentConfig,
    ) -> Result<Arc<dyn TraceExporter>, FactoryError> {
        Err(FactoryError::DataTypeUnsupported)
    }

    /// Create a metrics exporter.
    fn create_metrics_exporter(
        &self,
        _cfg: &dyn ComponentConfig,
    ) -> Result<Arc<dyn MetricsExporter>, FactoryError> {
        Err(FactoryError::DataTypeUnsupported)
    }
}

/// Factory for service extensions.
pub trait ExtensionFactory: Send + Sync {
    /// The type string this factory answers to.
    fn type_str(&self) -> &'static str;

    /// The default configuration.
    fn default_config(&self) -> Box<dyn ComponentConfig>;

    /// Decode a config subtree into a typed config.
    fn load_config(&self, subtree: &Value) -> Result<Box<dyn ComponentConfig>, DecodeError>;

    /// Create the extension.
    fn create_extension(
        &self,
        cfg: &dyn ComponentConfig,
    ) -> Result<Arc<dyn Extension>, FactoryError>;
}

/// A factory of any kind, as handed out by [`crate::Host::factory`].
#[derive(Clone)]
pub enum FactoryRef {
    /// A receiver factory.
    Receiver(Arc<dyn ReceiverFactory>),
    /// A processor factory.
    Processor(Arc<dyn ProcessorFactory>),
    /// An exporter factory.
    Exporter(Arc<dyn ExporterFactory>),
    /// An extension factory.
    Extension(Arc<dyn ExtensionFactory>),
}

impl FactoryRef {
    /// The wrapped factory's type string.
    pub fn type_str(&self) -> &'static str {
        match self {
            FactoryRef::Receiver(f) => f.type_str(),
            FactoryRef::Processor(f) => f.type_str(),
            FactoryRef::Exporter(f) => f.type_str(),
            FactoryRef::Extension(f) => f.type_str(),
        }
    }
}

/// Recover a factory's concrete config from the trait object, failing
/// with a clear message when the loader handed over something else.
pub fn downcast_config<'a, T: 'static>(
    cfg: &'a dyn ComponentConfig,
    type_str: &str,
) -> Result<&'a T, FactoryError> {
    cfg.as_any().downcast_ref::<T>().ok_or_else(|| {
        FactoryError::InvalidConfig(format!(
            "config for '{}' is not a {} config",
            cfg.name(),
            type_str
        ))
    })
}
