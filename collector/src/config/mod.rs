//! Configuration loader.
//!
//! Turns a parsed hierarchical document into a validated [`LoadedConfig`]:
//! recognises the four component sections plus `service`, resolves every
//! entry against the factory registry, merges the entry's subtree over the
//! factory's default config (or lets the factory's custom unmarshalling
//! take over), stamps identities, and checks reference integrity of the
//! declared pipelines. Failures carry a path-qualified message, e.g.
//! `service.pipelines.traces/primary: exporter "otlp" not defined`.

mod model;

pub use model::{LoadedConfig, PipelineConfig, ServiceConfig, Signal, split_name};

use crate::registry::Factories;
use serde::Deserialize;
use serde_yaml::Value;
use std::collections::BTreeMap;
use thiserror::Error;
use virta_core::{ComponentConfig, ComponentKind, DecodeError};

/// Configuration loading error. The `Display` form is path-qualified.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The document failed to parse at all.
    #[error("configuration does not parse: {0}")]
    Parse(String),

    /// The document root is not a mapping.
    #[error("configuration must be a mapping")]
    NotAMapping,

    /// A top-level section is not one of `receivers`, `processors`,
    /// `exporters`, `extensions`, `service`.
    #[error("unknown top-level section '{0}'")]
    UnknownSection(String),

    /// An entry key is not of the form `type` or `type/suffix`.
    #[error("{kind}s: invalid entry name '{key}'")]
    InvalidEntryName {
        /// Section kind.
        kind: ComponentKind,
        /// Offending key.
        key: String,
    },

    /// No factory is registered for the entry's type part.
    #[error("{kind}s.{key}: unknown {kind} type '{type_str}'")]
    UnknownComponentType {
        /// Section kind.
        kind: ComponentKind,
        /// Entry key.
        key: String,
        /// Unresolvable type string.
        type_str: String,
    },

    /// The entry's subtree did not decode into the typed config.
    #[error("{kind}s.{key}: {source}")]
    Malformed {
        /// Section kind.
        kind: ComponentKind,
        /// Entry key.
        key: String,
        /// Decode failure.
        source: DecodeError,
    },

    /// The factory produced a config whose type does not match the entry.
    #[error("{kind}s.{key}: factory produced config of type '{type_str}'")]
    TypeMismatch {
        /// Section kind.
        kind: ComponentKind,
        /// Entry key.
        key: String,
        /// Type string the config claims.
        type_str: String,
    },

    /// The `service` section is missing.
    #[error("missing 'service' section")]
    MissingService,

    /// The `service` section did not have the expected shape.
    #[error("service: {0}")]
    MalformedService(String),

    /// `service.extensions` references an undefined extension.
    #[error("service.extensions: extension \"{0}\" not defined")]
    ExtensionRefMissing(String),

    /// A pipeline key's type part is not a known signal.
    #[error("service.pipelines.{pipeline}: unknown signal '{signal}'")]
    UnknownSignal {
        /// Pipeline key.
        pipeline: String,
        /// Offending signal string.
        signal: String,
    },

    /// A pipeline has no receivers.
    #[error("service.pipelines.{0}: pipeline must have at least one receiver")]
    PipelineNoReceivers(String),

    /// A pipeline has no exporters.
    #[error("service.pipelines.{0}: pipeline must have at least one exporter")]
    PipelineNoExporters(String),

    /// A pipeline references an undefined component.
    #[error("service.pipelines.{pipeline}: {kind} \"{name}\" not defined")]
    PipelineRefMissing {
        /// Pipeline key.
        pipeline: String,
        /// Kind of the missing reference.
        kind: ComponentKind,
        /// The unresolved name.
        name: String,
    },
}

/// Parse a YAML document and load it. See [`load`].
pub fn load_str(yaml: &str, factories: &Factories) -> Result<LoadedConfig, ConfigError> {
    let doc: Value = serde_yaml::from_str(yaml).map_err(|e| ConfigError::Parse(e.to_string()))?;
    load(&doc, factories)
}

/// Load an already-parsed document into a validated [`LoadedConfig`].
pub fn load(doc: &Value, factories: &Factories) -> Result<LoadedConfig, ConfigError> {
    let root = match doc {
        Value::Mapping(m) => m,
        Value::Null => return Err(ConfigError::MissingService),
        _ => return Err(ConfigError::NotAMapping),
    };

    let mut receivers = BTreeMap::new();
    let mut processors = BTreeMap::new();
    let mut exporters = BTreeMap::new();
    let mut extensions = BTreeMap::new();
    let mut service_doc: Option<&Value> = None;

    for (key, section) in root {
        let section_name = key.as_str().unwrap_or_default();
        match section_name {
            "receivers" => {
                receivers = load_entries(ComponentKind::Receiver, section, |type_str, subtree| {
                    factories
                        .receiver_factory(type_str)
                        .map(|f| f.load_config(subtree))
                })?;
            }
            "processors" => {
                processors =
                    load_entries(ComponentKind::Processor, section, |type_str, subtree| {
                        factories
                            .processor_factory(type_str)
                            .map(|f| f.load_config(subtree))
                    })?;
            }
            "exporters" => {
                exporters = load_entries(ComponentKind::Exporter, section, |type_str, subtree| {
                    factories
                        .exporter_factory(type_str)
                        .map(|f| f.load_config(subtree))
                })?;
            }
            "extensions" => {
                extensions =
                    load_entries(ComponentKind::Extension, section, |type_str, subtree| {
                        factories
                            .extension_factory(type_str)
                            .map(|f| f.load_config(subtree))
                    })?;
            }
            "service" => service_doc = Some(section),
            other => return Err(ConfigError::UnknownSection(other.to_string())),
        }
    }

    let service = parse_service(service_doc.ok_or(ConfigError::MissingService)?)?;

    let loaded = LoadedConfig {
        receivers,
        processors,
        exporters,
        extensions,
        service,
    };
    validate_service(&loaded)?;
    Ok(loaded)
}

/// Resolve every entry of one component section: split the key, look up
/// the factory, let it decode the subtree, and stamp the instance name.
fn load_entries<F>(
    kind: ComponentKind,
    section: &Value,
    resolve: F,
) -> Result<BTreeMap<String, Box<dyn ComponentConfig>>, ConfigError>
where
    F: Fn(&str, &Value) -> Option<Result<Box<dyn ComponentConfig>, DecodeError>>,
{
    let entries = match section {
        Value::Mapping(m) => m,
        Value::Null => return Ok(BTreeMap::new()),
        _ => return Err(ConfigError::NotAMapping),
    };

    let mut table: BTreeMap<String, Box<dyn ComponentConfig>> = BTreeMap::new();
    for (key, subtree) in entries {
        let key = key
            .as_str()
            .ok_or_else(|| ConfigError::InvalidEntryName {
                kind,
                key: format!("{key:?}"),
            })?
            .to_string();
        let (type_str, _suffix) = split_name(&key).ok_or_else(|| ConfigError::InvalidEntryName {
            kind,
            key: key.clone(),
        })?;

        let mut cfg = resolve(type_str, subtree)
            .ok_or_else(|| ConfigError::UnknownComponentType {
                kind,
                key: key.clone(),
                type_str: type_str.to_string(),
            })?
            .map_err(|source| ConfigError::Malformed {
                kind,
                key: key.clone(),
                source,
            })?;

        cfg.set_name(&key);
        if cfg.type_str() != type_str {
            return Err(ConfigError::TypeMismatch {
                kind,
                key: key.clone(),
                type_str: cfg.type_str().to_string(),
            });
        }
        table.insert(key, cfg);
    }
    Ok(table)
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct RawService {
    #[serde(default)]
    extensions: Vec<String>,
    #[serde(default)]
    pipelines: BTreeMap<String, RawPipeline>,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct RawPipeline {
    #[serde(default)]
    receivers: Vec<String>,
    #[serde(default)]
    processors: Vec<String>,
    #[serde(default)]
    exporters: Vec<String>,
}

fn parse_service(doc: &Value) -> Result<ServiceConfig, ConfigError> {
    let raw: RawService = serde_yaml::from_value(doc.clone())
        .map_err(|e| ConfigError::MalformedService(e.to_string()))?;

    let mut pipelines = BTreeMap::new();
    for (key, raw_pipeline) in raw.pipelines {
        let (signal_str, _suffix) =
            split_name(&key).ok_or_else(|| ConfigError::UnknownSignal {
                pipeline: key.clone(),
                signal: key.clone(),
            })?;
        let signal = Signal::parse(signal_str).ok_or_else(|| ConfigError::UnknownSignal {
            pipeline: key.clone(),
            signal: signal_str.to_string(),
        })?;
        pipelines.insert(
            key.clone(),
            PipelineConfig {
                name: key,
                signal,
                receivers: raw_pipeline.receivers,
                processors: raw_pipeline.processors,
                exporters: raw_pipeline.exporters,
            },
        );
    }

    Ok(ServiceConfig {
        extensions: raw.extensions,
        pipelines,
    })
}

/// Reference-integrity checks over the service section.
fn validate_service(config: &LoadedConfig) -> Result<(), ConfigError> {
    for name in &config.service.extensions {
        if !config.extensions.contains_key(name) {
            return Err(ConfigError::ExtensionRefMissing(name.clone()));
        }
    }

    for pipeline in config.service.pipelines.values() {
        if pipeline.receivers.is_empty() {
            return Err(ConfigError::PipelineNoReceivers(pipeline.name.clone()));
        }
        if pipeline.exporters.is_empty() {
            return Err(ConfigError::PipelineNoExporters(pipeline.name.clone()));
        }
        for (kind, names, table) in [
            (
                ComponentKind::Receiver,
                &pipeline.receivers,
                &config.receivers,
            ),
            (
                ComponentKind::Processor,
                &pipeline.processors,
                &config.processors,
            ),
            (
                ComponentKind::Exporter,
                &pipeline.exporters,
                &config.exporters,
            ),
        ] {
            for name in names {
                if !table.contains_key(name) {
                    return Err(ConfigError::PipelineRefMissing {
                        pipeline: pipeline.name.clone(),
                        kind,
                        name: name.clone(),
                    });
                }
            }
        }
    }
    Ok(())
}
