//! Health check extension: exposes collector readiness.

use async_trait::async_trait;
use serde_yaml::Value;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio_util::sync::CancellationToken;
use tracing::info;
use virta_core::{
    ComponentConfig, ComponentError, DecodeError, Extension, ExtensionFactory, FactoryError, Host,
    Settings, decode_with_defaults, downcast_config,
};

const TYPE_STR: &str = "health_check";

/// Health check extension configuration.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct HealthCheckConfig {
    /// Common settings.
    #[serde(flatten)]
    pub settings: Settings,
    /// Port the readiness endpoint listens on.
    pub port: u16,
}

virta_core::impl_component_config!(HealthCheckConfig, TYPE_STR);

impl Default for HealthCheckConfig {
    fn default() -> Self {
        Self {
            settings: Settings::named(TYPE_STR),
            port: 13133,
        }
    }
}

/// Factory for the health check extension.
pub struct HealthCheckExtensionFactory;

impl ExtensionFactory for HealthCheckExtensionFactory {
    fn type_str(&self) -> &'static str {
        TYPE_STR
    }

    fn default_config(&self) -> Box<dyn ComponentConfig> {
        Box::new(HealthCheckConfig::default())
    }

    fn load_config(&self, subtree: &Value) -> Result<Box<dyn ComponentConfig>, DecodeError> {
        Ok(Box::new(decode_with_defaults(
            &HealthCheckConfig::default(),
            subtree,
        )?))
    }

    fn create_extension(
        &self,
        cfg: &dyn ComponentConfig,
    ) -> Result<Arc<dyn Extension>, FactoryError> {
        let cfg = downcast_config::<HealthCheckConfig>(cfg, TYPE_STR)?;
        Ok(Arc::new(HealthCheckExtension {
            name: cfg.name().to_string(),
            port: cfg.port,
            ready: AtomicBool::new(false),
            cancel: CancellationToken::new(),
        }))
    }
}

/// Readiness flips to true once the collector has started and back to
/// false when shutdown begins. The HTTP endpoint itself lives at the
/// process boundary and reads this flag.
pub struct HealthCheckExtension {
    name: String,
    port: u16,
    ready: AtomicBool,
    cancel: CancellationToken,
}

impl HealthCheckExtension {
    /// Current readiness.
    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Extension for HealthCheckExtension {
    fn name(&self) -> &str {
        &self.name
    }

    async fn start(&self, _host: Arc<dyn Host>) -> Result<(), ComponentError> {
        self.ready.store(true, Ordering::SeqCst);
        info!(name = %self.name, port = self.port, "health check ready");
        Ok(())
    }

    async fn shutdown(&self) -> Result<(), ComponentError> {
        self.ready.store(false, Ordering::SeqCst);
        self.cancel.cancel();
        info!(name = %self.name, "health check stopped");
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::config::load_str;
    use crate::defaults;
    use virta_core::{ComponentKind, FactoryRef};

    struct NullHost;

    impl Host for NullHost {
        fn report_fatal_error(&self, _component: &str, _error: ComponentError) {}
        fn extension(&self, _name: &str) -> Option<Arc<dyn Extension>> {
            None
        }
        fn factory(&self, _kind: ComponentKind, _type_str: &str) -> Option<FactoryRef> {
            None
        }
    }

    #[test]
    fn config_merge_default_and_override() {
        // Two entries: one equal to the factory default, one with the
        // port overridden and the suffixed name stamped.
        let yaml = r#"
extensions:
  health_check:
  health_check/1:
    port: 13
service:
  extensions: [health_check/1]
  pipelines: {}
"#;
        let factories = defaults::components().unwrap();
        let config = load_str(yaml, &factories).unwrap();

        let base = config
            .extensions
            .get("health_check")
            .unwrap()
            .as_any()
            .downcast_ref::<HealthCheckConfig>()
            .unwrap();
        assert_eq!(base, &HealthCheckConfig::default());

        let second = config
            .extensions
            .get("health_check/1")
            .unwrap()
            .as_any()
            .downcast_ref::<HealthCheckConfig>()
            .unwrap();
        assert_eq!(
            second,
            &HealthCheckConfig {
                settings: Settings::named("health_check/1"),
                port: 13,
            }
        );

        assert_eq!(config.service.extensions, vec!["health_check/1".to_string()]);
    }

    #[tokio::test]
    async fn readiness_follows_lifecycle() {
        let factory = HealthCheckExtensionFactory;
        let cfg = factory.default_config();
        let extension = factory.create_extension(cfg.as_ref()).unwrap();

        extension.start(Arc::new(NullHost)).await.unwrap();
        extension.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn readiness_flag_observable() {
        let factory = HealthCheckExtensionFactory;
        let cfg = factory.default_config();
        let cfg = downcast_config::<HealthCheckConfig>(cfg.as_ref(), TYPE_STR).unwrap();
        let extension = HealthCheckExtension {
            name: cfg.name().to_string(),
            port: cfg.port,
            ready: AtomicBool::new(false),
            cancel: CancellationToken::new(),
        };

        assert!(!extension.is_ready());
        extension.start(Arc::new(NullHost)).await.unwrap();
        assert!(extension.is_ready());
        extension.shutdown().await.unwrap();
        assert!(!extension.is_ready());
    }
}
