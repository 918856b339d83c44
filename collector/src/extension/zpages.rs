//! zPages extension: in-process diagnostic pages.

use async_trait::async_trait;
use serde_yaml::Value;
use std::sync::Arc;
use tracing::info;
use virta_core::{
    ComponentConfig, ComponentError, DecodeError, Extension, ExtensionFactory, FactoryError, Host,
    Settings, decode_with_defaults, downcast_config,
};

const TYPE_STR: &str = "zpages";

/// zPages extension configuration.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ZpagesConfig {
    /// Common settings.
    #[serde(flatten)]
    pub settings: Settings,
    /// Port the diagnostic pages listen on.
    pub port: u16,
}

virta_core::impl_component_config!(ZpagesConfig, TYPE_STR);

impl Default for ZpagesConfig {
    fn default() -> Self {
        Self {
            settings: Settings::named(TYPE_STR),
            port: 55679,
        }
    }
}

/// Factory for the zPages extension.
pub struct ZpagesExtensionFactory;

impl ExtensionFactory for ZpagesExtensionFactory {
    fn type_str(&self) -> &'static str {
        TYPE_STR
    }

    fn default_config(&self) -> Box<dyn ComponentConfig> {
        Box::new(ZpagesConfig::default())
    }

    fn load_config(&self, subtree: &Value) -> Result<Box<dyn ComponentConfig>, DecodeError> {
        Ok(Box::new(decode_with_defaults(
            &ZpagesConfig::default(),
            subtree,
        )?))
    }

    fn create_extension(
        &self,
        cfg: &dyn ComponentConfig,
    ) -> Result<Arc<dyn Extension>, FactoryError> {
        let cfg = downcast_config::<ZpagesConfig>(cfg, TYPE_STR)?;
        Ok(Arc::new(ZpagesExtension {
            name: cfg.name().to_string(),
            port: cfg.port,
        }))
    }
}

struct ZpagesExtension {
    name: String,
    port: u16,
}

#[async_trait]
impl Extension for ZpagesExtension {
    fn name(&self) -> &str {
        &self.name
    }

    async fn start(&self, _host: Arc<dyn Host>) -> Result<(), ComponentError> {
        info!(name = %self.name, port = self.port, "zpages extension serving");
        Ok(())
    }

    async fn shutdown(&self) -> Result<(), ComponentError> {
        info!(name = %self.name, "zpages extension stopped");
        Ok(())
    }
}
