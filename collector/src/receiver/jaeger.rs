//! Jaeger trace receiver: a multi-protocol receiver.
//!
//! Jaeger exposes several sub-endpoints (gRPC, thrift-over-HTTP). Each is
//! configured under `protocols`, and the receiver as a whole is enabled
//! iff at least one protocol is not disabled. The `protocols` map selects
//! exactly the protocols the user named, so this factory overrides
//! `load_config` instead of using the generic default-merge (which would
//! union the user's map with the defaults).

use serde_yaml::Value;
use std::any::Any;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;
use virta_core::{
    ComponentConfig, ComponentError, DecodeError, FactoryError, Host, ReceiverFactory, Settings,
    TraceConsumer, TraceReceiver, decode_with_defaults, downcast_config,
};

const TYPE_STR: &str = "jaeger";

/// One jaeger sub-protocol endpoint.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ProtocolConfig {
    /// Disable this sub-endpoint.
    #[serde(default)]
    pub disabled: bool,
    /// Listen address.
    #[serde(default)]
    pub endpoint: String,
}

/// Jaeger receiver configuration.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct JaegerReceiverConfig {
    /// Common settings.
    #[serde(flatten)]
    pub settings: Settings,
    /// Enabled sub-protocols keyed by protocol name.
    #[serde(default)]
    pub protocols: BTreeMap<String, ProtocolConfig>,
}

impl Default for JaegerReceiverConfig {
    fn default() -> Self {
        Self {
            settings: Settings::named(TYPE_STR),
            protocols: default_protocols(),
        }
    }
}

fn default_protocols() -> BTreeMap<String, ProtocolConfig> {
    BTreeMap::from([
        (
            "grpc".to_string(),
            ProtocolConfig {
                disabled: false,
                endpoint: "localhost:14250".to_string(),
            },
        ),
        (
            "thrift_http".to_string(),
            ProtocolConfig {
                disabled: false,
                endpoint: "localhost:14268".to_string(),
            },
        ),
    ])
}

impl ComponentConfig for JaegerReceiverConfig {
    fn type_str(&self) -> &'static str {
        TYPE_STR
    }

    fn name(&self) -> &str {
        &self.settings.name
    }

    fn set_name(&mut self, name: &str) {
        self.settings.name = name.to_string();
    }

    // Enabled iff at least one protocol is not disabled.
    fn is_enabled(&self) -> bool {
        self.protocols.values().any(|p| !p.disabled)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Factory for the jaeger receiver. Traces only.
pub struct JaegerReceiverFactory;

impl ReceiverFactory for JaegerReceiverFactory {
    fn type_str(&self) -> &'static str {
        TYPE_STR
    }

    fn default_config(&self) -> Box<dyn ComponentConfig> {
        Box::new(JaegerReceiverConfig::default())
    }

    // Custom unmarshalling: a `protocols` map in the document replaces the
    // default protocol set with exactly the named protocols; every other
    // key decodes like the common settings.
    fn load_config(&self, subtree: &Value) -> Result<Box<dyn ComponentConfig>, DecodeError> {
        let mapping = match subtree {
            Value::Null => return Ok(Box::new(JaegerReceiverConfig::default())),
            Value::Mapping(m) => m,
            _ => return Err(DecodeError::NotAMapping),
        };

        let mut cfg = JaegerReceiverConfig::default();
        for (key, value) in mapping {
            match key.as_str() {
                Some("disabled") => {
                    cfg.settings.disabled = value.as_bool().ok_or_else(|| {
                        DecodeError::Invalid("'disabled' must be a boolean".to_string())
                    })?;
                }
                Some("protocols") => {
                    let listed = match value {
                        Value::Mapping(m) => m,
                        Value::Null => continue,
                        _ => {
                            return Err(DecodeError::Invalid(
                                "'protocols' must be a mapping".to_string(),
                            ));
                        }
                    };
                    let defaults = default_protocols();
                    let mut protocols = BTreeMap::new();
                    for (proto_key, proto_value) in listed {
                        let proto_name = proto_key
                            .as_str()
                            .ok_or_else(|| {
                                DecodeError::Invalid("protocol name must be a string".to_string())
                            })?
                            .to_string();
                        let base = defaults.get(&proto_name).cloned().ok_or_else(|| {
                            DecodeError::Invalid(format!("unknown jaeger protocol '{proto_name}'"))
                        })?;
                        protocols.insert(proto_name, decode_with_defaults(&base, proto_value)?);
                    }
                    cfg.protocols = protocols;
                }
                Some(other) => {
                    return Err(DecodeError::Invalid(format!("unknown field '{other}'")));
                }
                None => {
                    return Err(DecodeError::Invalid("field names must be strings".to_string()));
                }
            }
        }
        Ok(Box::new(cfg))
    }

    fn create_trace_receiver(
        &self,
        cfg: &dyn ComponentConfig,
        next: Arc<dyn TraceConsumer>,
    ) -> Result<Arc<dyn TraceReceiver>, FactoryError> {
        let cfg = downcast_config::<JaegerReceiverConfig>(cfg, TYPE_STR)?;
        let protocols: Vec<(String, String)> = cfg
            .protocols
            .iter()
            .filter(|(_, p)| !p.disabled)
            .map(|(name, p)| (name.clone(), p.endpoint.clone()))
            .collect();
        if protocols.is_empty() {
            return Err(FactoryError::InvalidConfig(format!(
                "\"{}\" has no enabled protocols",
                cfg.name()
            )));
        }
        Ok(Arc::new(JaegerReceiver {
            name: cfg.name().to_string(),
            protocols,
            next,
            cancel: CancellationToken::new(),
        }))
    }
}

struct JaegerReceiver {
    name: String,
    protocols: Vec<(String, String)>,
    #[allow(dead_code)] // handed to the protocol listeners at the process boundary
    next: Arc<dyn TraceConsumer>,
    cancel: CancellationToken,
}

#[async_trait::async_trait]
impl TraceReceiver for JaegerReceiver {
    async fn start(&self, _host: Arc<dyn Host>) -> Result<(), ComponentError> {
        for (protocol, endpoint) in &self.protocols {
            info!(
                name = %self.name,
                protocol = %protocol,
                endpoint = %endpoint,
                "jaeger receiver accepting spans"
            );
        }
        Ok(())
    }

    async fn shutdown(&self) -> Result<(), ComponentError> {
        self.cancel.cancel();
        info!(name = %self.name, "jaeger receiver stopped");
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn load(yaml: &str) -> JaegerReceiverConfig {
        let subtree: Value = serde_yaml::from_str(yaml).unwrap();
        let cfg = JaegerReceiverFactory.load_config(&subtree).unwrap();
        cfg.as_any()
            .downcast_ref::<JaegerReceiverConfig>()
            .unwrap()
            .clone()
    }

    #[test]
    fn default_enables_both_protocols() {
        let cfg = JaegerReceiverConfig::default();
        assert!(cfg.is_enabled());
        assert_eq!(cfg.protocols.len(), 2);
    }

    #[test]
    fn listed_protocols_replace_defaults() {
        let cfg = load("protocols:\n  grpc:\n    endpoint: 0.0.0.0:1\n");
        assert_eq!(cfg.protocols.len(), 1);
        assert_eq!(cfg.protocols["grpc"].endpoint, "0.0.0.0:1");
    }

    #[test]
    fn listed_protocol_without_body_keeps_default_endpoint() {
        let cfg = load("protocols:\n  thrift_http:\n");
        assert_eq!(cfg.protocols.len(), 1);
        assert_eq!(cfg.protocols["thrift_http"].endpoint, "localhost:14268");
    }

    #[test]
    fn unknown_protocol_rejected() {
        let subtree: Value = serde_yaml::from_str("protocols:\n  carrier_pigeon:\n").unwrap();
        assert!(JaegerReceiverFactory.load_config(&subtree).is_err());
    }

    #[test]
    fn all_protocols_disabled_reports_disabled() {
        let cfg = load(
            "protocols:\n  grpc:\n    disabled: true\n  thrift_http:\n    disabled: true\n",
        );
        assert!(!cfg.is_enabled());
    }

    #[test]
    fn one_enabled_protocol_is_enough() {
        let cfg = load(
            "protocols:\n  grpc:\n    disabled: true\n  thrift_http:\n    disabled: false\n",
        );
        assert!(cfg.is_enabled());
    }
}
