//! Factory registry for virta.
//!
//! A read-mostly index of component factories, one map per kind. Populated
//! once at startup and then consulted by the config loader and the
//! pipeline builder; after [`Factories::build`] returns, nothing mutates
//! the bundle, so readers share it behind an `Arc` without locking.

use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;
use virta_core::{
    ComponentKind, ExporterFactory, ExtensionFactory, FactoryRef, ProcessorFactory,
    ReceiverFactory,
};

/// Registry error.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    /// A factory with the same type string is already registered for the
    /// kind.
    #[error("duplicate {kind} factory for type '{type_str}'")]
    DuplicateType {
        /// Kind the collision happened in.
        kind: ComponentKind,
        /// The colliding type string.
        type_str: String,
    },
}

/// The factories bundle: four maps from type string to factory.
#[derive(Default)]
pub struct Factories {
    receivers: HashMap<&'static str, Arc<dyn ReceiverFactory>>,
    processors: HashMap<&'static str, Arc<dyn ProcessorFactory>>,
    exporters: HashMap<&'static str, Arc<dyn ExporterFactory>>,
    extensions: HashMap<&'static str, Arc<dyn ExtensionFactory>>,
}

impl Factories {
    /// Create an empty bundle.
    pub fn new() -> Self {
        Self::default()
    }

    /// Collect factory lists into a bundle, rejecting duplicates within
    /// each kind.
    pub fn build(
        receivers: Vec<Arc<dyn ReceiverFactory>>,
        processors: Vec<Arc<dyn ProcessorFactory>>,
        exporters: Vec<Arc<dyn ExporterFactory>>,
        extensions: Vec<Arc<dyn ExtensionFactory>>,
    ) -> Result<Self, RegistryError> {
        let mut bundle = Self::new();
        for f in receivers {
            bundle.register_receiver(f)?;
        }
        for f in processors {
            bundle.register_processor(f)?;
        }
        for f in exporters {
            bundle.register_exporter(f)?;
        }
        for f in extensions {
            bundle.register_extension(f)?;
        }
        Ok(bundle)
    }

    /// Register a receiver factory.
    pub fn register_receiver(&mut self, f: Arc<dyn ReceiverFactory>) -> Result<(), RegistryError> {
        let type_str = f.type_str();
        if self.receivers.contains_key(type_str) {
            return Err(RegistryError::DuplicateType {
                kind: ComponentKind::Receiver,
                type_str: type_str.to_string(),
            });
        }
        debug!(type_str, "registered receiver factory");
        self.receivers.insert(type_str, f);
        Ok(())
    }

    /// Register a processor factory.
    pub fn register_processor(
        &mut self,
        f: Arc<dyn ProcessorFactory>,
    ) -> Result<(), RegistryError> {
        let type_str = f.type_str();
        if self.processors.contains_key(type_str) {
            return Err(RegistryError::DuplicateType {
                kind: ComponentKind::Processor,
                type_str: type_str.to_string(),
            });
        }
        debug!(type_str, "registered processor factory");
        self.processors.insert(type_str, f);
        Ok(())
    }

    /// Register an exporter factory.
    pub fn register_exporter(&mut self, f: Arc<dyn ExporterFactory>) -> Result<(), RegistryError> {
        let type_str = f.type_str();
        if self.exporters.contains_key(type_str) {
            return Err(RegistryError::DuplicateType {
                kind: ComponentKind::Exporter,
                type_str: type_str.to_string(),
            });
        }
        debug!(type_str, "registered exporter factory");
        self.exporters.insert(type_str, f);
        Ok(())
    }

    /// Register an extension factory.
    pub fn register_extension(
        &mut self,
        f: Arc<dyn ExtensionFactory>,
    ) -> Result<(), RegistryError> {
        let type_str = f.type_str();
        if self.extensions.contains_key(type_str) {
            return Err(RegistryError::DuplicateType {
                kind: ComponentKind::Extension,
                type_str: type_str.to_string(),
            });
        }
        debug!(type_str, "registered extension factory");
        self.extensions.insert(type_str, f);
        Ok(())
    }

    /// Look up a receiver factory by type string.
    pub fn receiver_factory(&self, type_str: &str) -> Option<Arc<dyn ReceiverFactory>> {
        self.receivers.get(type_str).cloned()
    }

    /// Look up a processor factory by type string.
    pub fn processor_factory(&self, type_str: &str) -> Option<Arc<dyn ProcessorFactory>> {
        self.processors.get(type_str).cloned()
    }

    /// Look up an exporter factory by type string.
    pub fn exporter_factory(&self, type_str: &str) -> Option<Arc<dyn ExporterFactory>> {
        self.exporters.get(type_str).cloned()
    }

    /// Look up an extension factory by type string.
    pub fn extension_factory(&self, type_str: &str) -> Option<Arc<dyn ExtensionFactory>> {
        self.extensions.get(type_str).cloned()
    }

    /// Look up any factory by kind and type string.
    pub fn factory(&self, kind: ComponentKind, type_str: &str) -> Option<FactoryRef> {
        match kind {
            ComponentKind::Receiver => self.receiver_factory(type_str).map(FactoryRef::Receiver),
            ComponentKind::Processor => self.processor_factory(type_str).map(FactoryRef::Processor),
            ComponentKind::Exporter => self.exporter_factory(type_str).map(FactoryRef::Exporter),
            ComponentKind::Extension => self.extension_factory(type_str).map(FactoryRef::Extension),
        }
    }

    /// Registered receiver type strings.
    pub fn receiver_types(&self) -> Vec<&'static str> {
        self.receivers.keys().copied().collect()
    }

    /// Registered processor type strings.
    pub fn processor_types(&self) -> Vec<&'static str> {
        self.processors.keys().copied().collect()
    }

    /// Registered exporter type strings.
    pub fn exporter_types(&self) -> Vec<&'static str> {
        self.exporters.keys().copied().collect()
    }

    /// Registered extension type strings.
    pub fn extension_types(&self) -> Vec<&'static str> {
        self.extensions.keys().copied().collect()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_yaml::Value;
    use virta_core::{ComponentConfig, DecodeError, Settings, decode_with_defaults};

    #[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
    struct NoopConfig {
        #[serde(flatten)]
        settings: Settings,
    }

    virta_core::impl_component_config!(NoopConfig, "noop");

    struct NoopReceiverFactory;

    impl ReceiverFactory for NoopReceiverFactory {
        fn type_str(&self) -> &'static str {
            "noop"
        }

        fn default_config(&self) -> Box<dyn ComponentConfig> {
            Box::new(NoopConfig {
                settings: Settings::named("noop"),
            })
        }

        fn load_config(&self, subtree: &Value) -> Result<Box<dyn ComponentConfig>, DecodeError> {
            let default = NoopConfig {
                settings: Settings::named("noop"),
            };
            Ok(Box::new(decode_with_defaults(&default, subtree)?))
        }
    }

    #[test]
    fn register_then_lookup_returns_same_factory() {
        let mut factories = Factories::new();
        factories
            .register_receiver(Arc::new(NoopReceiverFactory))
            .unwrap();

        let found = factories.receiver_factory("noop").expect("should resolve");
        assert_eq!(found.type_str(), "noop");
        assert!(factories.receiver_factory("missing").is_none());
    }

    #[test]
    fn duplicate_type_within_kind_rejected() {
        let mut factories = Factories::new();
        factories
            .register_receiver(Arc::new(NoopReceiverFactory))
            .unwrap();

        let err = factories
            .register_receiver(Arc::new(NoopReceiverFactory))
            .unwrap_err();
        assert_eq!(
            err,
            RegistryError::DuplicateType {
                kind: ComponentKind::Receiver,
                type_str: "noop".to_string(),
            }
        );
    }

    #[test]
    fn default_config_type_matches_factory_type() {
        let factory = NoopReceiverFactory;
        assert_eq!(factory.default_config().type_str(), factory.type_str());
    }

    #[test]
    fn kinds_are_independent_namespaces() {
        // A receiver and an extension may share a type string; only
        // same-kind duplicates collide.
        struct NoopExtensionFactory;

        impl ExtensionFactory for NoopExtensionFactory {
            fn type_str(&self) -> &'static str {
                "noop"
            }

            fn default_config(&self) -> Box<dyn ComponentConfig> {
                Box::new(NoopConfig {
                    settings: Settings::named("noop"),
                })
            }

            fn load_config(
                &self,
                subtree: &Value,
            ) -> Result<Box<dyn ComponentConfig>, DecodeError> {
                let default = NoopConfig {
                    settings: Settings::named("noop"),
                };
                Ok(Box::new(decode_with_defaults(&default, subtree)?))
            }

            fn create_extension(
                &self,
                _cfg: &dyn ComponentConfig,
            ) -> Result<Arc<dyn virta_core::Extension>, virta_core::FactoryError> {
                Err(virta_core::FactoryError::InvalidConfig(
                    "not constructible in this test".to_string(),
                ))
            }
        }

        let factories = Factories::build(
            vec![Arc::new(NoopReceiverFactory)],
            vec![],
            vec![],
            vec![Arc::new(NoopExtensionFactory)],
        )
        .unwrap();

        assert!(
            factories
                .factory(ComponentKind::Receiver, "noop")
                .is_some()
        );
        assert!(
            factories
                .factory(ComponentKind::Extension, "noop")
                .is_some()
        );
        assert!(factories.factory(ComponentKind::Exporter, "noop").is_none());
    }
}
