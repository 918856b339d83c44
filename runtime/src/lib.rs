//! virta-runtime — service shell for the virta collector
//!
//! Provides [`Service`], which runs a factories bundle plus a
//! configuration file to completion: initialise tracing, load and
//! validate the config, build and start the pipeline graph, then wait
//! until an external shutdown signal arrives or a component reports a
//! fatal error.
//!
//! # Quick start
//!
//! ```ignore
//! use virta_runtime::Service;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let factories = virta_collector::defaults::components()?;
//!     Service::new(factories).config_file("collector.yaml").run().await?;
//!     Ok(())
//! }
//! ```

#![deny(unsafe_code)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]
#![warn(clippy::panic)]

pub mod prelude;

use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use virta_collector::{BuildError, Collector, ConfigError, Factories};

/// Environment variable naming the configuration file.
const CONFIG_ENV: &str = "VIRTA_CONFIG";
/// Environment variable selecting `json` or `pretty` log output.
const LOG_FORMAT_ENV: &str = "VIRTA_LOG_FORMAT";

/// Service error: anything that prevents the collector from running to a
/// clean stop.
#[derive(Error, Debug)]
pub enum ServiceError {
    /// No configuration source was provided.
    #[error("no configuration: set {CONFIG_ENV} or use config_file()/config_yaml()")]
    NoConfig,

    /// The configuration file could not be read.
    #[error("cannot read config file '{path}': {message}")]
    ReadConfig {
        /// The offending path.
        path: String,
        /// The IO failure.
        message: String,
    },

    /// The configuration did not load or validate.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The pipeline graph did not build or start.
    #[error(transparent)]
    Build(#[from] BuildError),

    /// A component reported a fatal error at runtime; the collector was
    /// shut down gracefully.
    #[error("component '{component}' reported a fatal error: {message}")]
    FatalComponent {
        /// The originating component.
        component: String,
        /// The reported error.
        message: String,
    },
}

/// The collector service. Construct with a factories bundle, point it at
/// a configuration, and [`run`](Service::run).
pub struct Service {
    factories: Factories,
    config_path: Option<PathBuf>,
    config_yaml: Option<String>,
    handle_signals: bool,
}

impl Service {
    /// A service over the given factories bundle.
    pub fn new(factories: Factories) -> Self {
        Self {
            factories,
            config_path: None,
            config_yaml: None,
            handle_signals: true,
        }
    }

    /// Read configuration from this file instead of `$VIRTA_CONFIG`.
    pub fn config_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.config_path = Some(path.into());
        self
    }

    /// Use an inline YAML document instead of a file.
    pub fn config_yaml(mut self, yaml: impl Into<String>) -> Self {
        self.config_yaml = Some(yaml.into());
        self
    }

    /// Skip installing SIGINT/SIGTERM handlers; the service then stops
    /// only on a fatal component error. Used by tests and embedders that
    /// manage their own lifetime.
    pub fn without_signal_handling(mut self) -> Self {
        self.handle_signals = false;
        self
    }

    /// Run until shutdown. Returns when the runtime is asked to stop
    /// (signal) or a component reports a fatal error; the fatal case
    /// stops everything gracefully and then surfaces the error with the
    /// originating component's name.
    pub async fn run(self) -> Result<(), ServiceError> {
        init_tracing();

        let yaml = self.load_config_source()?;
        let factories = Arc::new(self.factories);
        let config = virta_collector::load_str(&yaml, &factories)?;

        let mut collector = Collector::build(&config, factories)?;
        let mut fatal_rx = collector.take_fatal_receiver();
        collector.start().await?;
        info!("virta collector running");

        let outcome = if self.handle_signals {
            tokio::select! {
                _ = shutdown_signal() => None,
                fatal = recv_fatal(&mut fatal_rx) => fatal,
            }
        } else {
            recv_fatal(&mut fatal_rx).await
        };

        collector.shutdown().await;

        match outcome {
            None => {
                info!("virta collector stopped");
                Ok(())
            }
            Some(fatal) => {
                error!(
                    component = %fatal.component,
                    error = %fatal.error,
                    "shutting down after fatal component error"
                );
                Err(ServiceError::FatalComponent {
                    component: fatal.component,
                    message: fatal.error.to_string(),
                })
            }
        }
    }

    fn load_config_source(&self) -> Result<String, ServiceError> {
        if let Some(yaml) = &self.config_yaml {
            return Ok(yaml.clone());
        }
        let path = match &self.config_path {
            Some(path) => path.clone(),
            None => PathBuf::from(std::env::var(CONFIG_ENV).map_err(|_| ServiceError::NoConfig)?),
        };
        std::fs::read_to_string(&path).map_err(|e| ServiceError::ReadConfig {
            path: path.display().to_string(),
            message: e.to_string(),
        })
    }
}

async fn recv_fatal(
    rx: &mut Option<tokio::sync::mpsc::UnboundedReceiver<virta_collector::FatalError>>,
) -> Option<virta_collector::FatalError> {
    match rx {
        Some(rx) => rx.recv().await,
        // No channel: nothing will ever arrive.
        None => std::future::pending().await,
    }
}

/// Initialise the tracing subscriber. Idempotent so embedding tests can
/// run multiple services in one process.
fn init_tracing() {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    let registry = tracing_subscriber::registry().with(env_filter);

    let json = std::env::var(LOG_FORMAT_ENV)
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);
    let result = if json {
        registry
            .with(tracing_subscriber::fmt::layer().json())
            .try_init()
    } else {
        registry.with(tracing_subscriber::fmt::layer()).try_init()
    };
    // A subscriber may already be installed (tests, embedders).
    let _ = result;
}

/// Wait for SIGINT (Ctrl+C) or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = ?e, "failed to install Ctrl+C handler");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!(error = ?e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received Ctrl+C, shutting down"),
        _ = terminate => info!("received SIGTERM, shutting down"),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use serde_yaml::Value;
    use std::sync::Arc;
    use tokio_util::sync::CancellationToken;
    use virta_core::{
        ComponentConfig, ComponentError, ConsumeError, DecodeError, ExporterFactory,
        FactoryError, Host, ReceiverFactory, Settings, TraceConsumer, TraceData, TraceExporter,
        TraceReceiver, decode_with_defaults,
    };

    #[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
    struct StubConfig {
        #[serde(flatten)]
        settings: Settings,
    }

    virta_core::impl_component_config!(StubConfig, "stub");

    fn stub_default() -> StubConfig {
        StubConfig {
            settings: Settings::named("stub"),
        }
    }

    /// Receiver that reports a fatal error right after starting.
    struct FatalReceiverFactory;

    impl ReceiverFactory for FatalReceiverFactory {
        fn type_str(&self) -> &'static str {
            "stub"
        }

        fn default_config(&self) -> Box<dyn ComponentConfig> {
            Box::new(stub_default())
        }

        fn load_config(&self, subtree: &Value) -> Result<Box<dyn ComponentConfig>, DecodeError> {
            Ok(Box::new(decode_with_defaults(&stub_default(), subtree)?))
        }

        fn create_trace_receiver(
            &self,
            _cfg: &dyn ComponentConfig,
            _next: Arc<dyn TraceConsumer>,
        ) -> Result<Arc<dyn TraceReceiver>, FactoryError> {
            Ok(Arc::new(FatalReceiver {
                stopped: Mutex::new(false),
            }))
        }
    }

    struct FatalReceiver {
        stopped: Mutex<bool>,
    }

    #[async_trait]
    impl TraceReceiver for FatalReceiver {
        async fn start(&self, host: Arc<dyn Host>) -> Result<(), ComponentError> {
            host.report_fatal_error("stub", ComponentError::Fatal("port vanished".to_string()));
            Ok(())
        }

        async fn shutdown(&self) -> Result<(), ComponentError> {
            *self.stopped.lock() = true;
            Ok(())
        }
    }

    struct StubExporterFactory;

    impl ExporterFactory for StubExporterFactory {
        fn type_str(&self) -> &'static str {
            "stub"
        }

        fn default_config(&self) -> Box<dyn ComponentConfig> {
            Box::new(stub_default())
        }

        fn load_config(&self, subtree: &Value) -> Result<Box<dyn ComponentConfig>, DecodeError> {
            Ok(Box::new(decode_with_defaults(&stub_default(), subtree)?))
        }

        fn create_trace_exporter(
            &self,
            _cfg: &dyn ComponentConfig,
        ) -> Result<Arc<dyn TraceExporter>, FactoryError> {
            Ok(Arc::new(StubExporter))
        }
    }

    struct StubExporter;

    #[async_trait]
    impl TraceConsumer for StubExporter {
        async fn consume_traces(
            &self,
            _cancel: &CancellationToken,
            _batch: &TraceData,
        ) -> Result<(), ConsumeError> {
            Ok(())
        }
    }

    #[async_trait]
    impl TraceExporter for StubExporter {
        fn name(&self) -> &str {
            "stub"
        }
    }

    const CONFIG: &str = r#"
receivers:
  stub:
exporters:
  stub:
service:
  pipelines:
    traces:
      receivers: [stub]
      exporters: [stub]
"#;

    fn stub_factories() -> Factories {
        Factories::build(
            vec![Arc::new(FatalReceiverFactory)],
            vec![],
            vec![Arc::new(StubExporterFactory)],
            vec![],
        )
        .unwrap()
    }

    #[tokio::test]
    async fn fatal_component_error_stops_the_service() {
        let err = Service::new(stub_factories())
            .config_yaml(CONFIG)
            .without_signal_handling()
            .run()
            .await
            .unwrap_err();

        match err {
            ServiceError::FatalComponent { component, message } => {
                assert_eq!(component, "stub");
                assert!(message.contains("port vanished"));
            }
            other => panic!("expected fatal component error, got {other}"),
        }
    }

    #[tokio::test]
    async fn missing_config_source_is_an_error() {
        // No config_yaml, no config_file; the env var is not set in tests.
        let service = Service::new(stub_factories()).without_signal_handling();
        if std::env::var(CONFIG_ENV).is_ok() {
            return; // environment owns the variable; nothing to assert
        }
        let err = service.run().await.unwrap_err();
        assert!(matches!(err, ServiceError::NoConfig));
    }

    #[tokio::test]
    async fn invalid_config_surfaces_loader_error() {
        let err = Service::new(stub_factories())
            .config_yaml("receivers:\n  nosuch:\nservice:\n  pipelines: {}\n")
            .without_signal_handling()
            .run()
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Config(_)));
    }
}
