//! Typed component configuration and the generic default-merge.
//!
//! The loader parses a hierarchical document into per-component subtrees
//! and asks each factory to turn its subtree into a strongly typed config.
//! The generic path is [`decode_with_defaults`]: serialise the factory's
//! default config into a tree, structurally merge the subtree on top
//! (scalars replace scalars, mappings recurse, lists replace wholesale),
//! and deserialise the result back into the typed config. Factories with
//! polymorphic sub-records override `load_config` instead.

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_yaml::Value;
use std::any::Any;
use thiserror::Error;

/// A typed component configuration produced by a factory.
///
/// Invariant: `type_str()` always matches the factory that produced the
/// config, and after loading, `name()` equals the config's section key.
pub trait ComponentConfig: Any + Send + Sync {
    /// The component type string, fixed per factory.
    fn type_str(&self) -> &'static str;

    /// The instance name (`type` or `type/suffix`).
    fn name(&self) -> &str;

    /// Stamp the instance name. Called by the loader with the section key.
    fn set_name(&mut self, name: &str);

    /// Whether the component should be wired at all. The builder skips
    /// disabled components entirely.
    fn is_enabled(&self) -> bool;

    /// Downcast support for factories recovering their concrete config.
    fn as_any(&self) -> &dyn Any;
}

/// Settings common to every component config: the instance name and the
/// `disabled` flag. Embed with `#[serde(flatten)]`; the name is never read
/// from the document (the loader stamps it from the section key).
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Settings {
    /// Instance name, stamped by the loader.
    #[serde(skip)]
    pub name: String,

    /// When true the builder skips this component.
    #[serde(default)]
    pub disabled: bool,
}

impl Settings {
    /// Settings named after the component type, as factory defaults are.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            disabled: false,
        }
    }
}

/// Implements [`ComponentConfig`] for a config struct with a `settings:
/// Settings` field and a fixed type string. Configs with bespoke
/// enablement rules (multi-protocol receivers) implement the trait by
/// hand instead.
#[macro_export]
macro_rules! impl_component_config {
    ($cfg:ty, $type_str:expr) => {
        impl $crate::ComponentConfig for $cfg {
            fn type_str(&self) -> &'static str {
                $type_str
            }

            fn name(&self) -> &str {
                &self.settings.name
            }

            fn set_name(&mut self, name: &str) {
                self.settings.name = name.to_string();
            }

            fn is_enabled(&self) -> bool {
                !self.settings.disabled
            }

            fn as_any(&self) -> &dyn std::any::Any {
                self
            }
        }
    };
}

/// Error decoding a component config subtree.
#[derive(Error, Debug)]
pub enum DecodeError {
    /// The subtree is not a mapping (and not empty).
    #[error("component config must be a mapping")]
    NotAMapping,

    /// The merged tree did not fit the typed config.
    #[error("{0}")]
    Invalid(String),
}

/// Merge `overlay` onto `base`: scalars replace scalars, mappings recurse,
/// lists replace wholesale.
pub fn merge_values(base: &mut Value, overlay: &Value) {
    match (base, overlay) {
        (Value::Mapping(base_map), Value::Mapping(overlay_map)) => {
            for (key, overlay_value) in overlay_map {
                match base_map.get_mut(key) {
                    Some(base_value) => merge_values(base_value, overlay_value),
                    None => {
                        base_map.insert(key.clone(), overlay_value.clone());
                    }
                }
            }
        }
        (base, overlay) => *base = overlay.clone(),
    }
}

/// Decode a config subtree by merging it over the factory default.
///
/// A `Null` subtree (an entry with no body, like `health_check:`) yields
/// the default unchanged.
pub fn decode_with_defaults<T>(default: &T, subtree: &Value) -> Result<T, DecodeError>
where
    T: Serialize + DeserializeOwned + Clone,
{
    match subtree {
        Value::Null => Ok(default.clone()),
        Value::Mapping(_) => {
            let mut base = serde_yaml::to_value(default)
                .map_err(|e| DecodeError::Invalid(e.to_string()))?;
            merge_values(&mut base, subtree);
            serde_yaml::from_value(base).map_err(|e| DecodeError::Invalid(e.to_string()))
        }
        _ => Err(DecodeError::NotAMapping),
    }
}
