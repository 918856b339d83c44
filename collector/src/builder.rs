//! Pipeline builder and runtime graph.
//!
//! Turns a [`LoadedConfig`] plus a [`Factories`] bundle into a
//! [`Collector`]: the running graph of receivers, processors, and
//! exporters.
//!
//! Construction runs in reverse dataflow order so every consumer exists
//! before the stage that feeds it. Per pipeline: exporters first (cached
//! by instance name, so an exporter shared across pipelines is created
//! once), then the fan-out over them, then the processor chain walked in
//! reverse, each processor becoming the next consumer of its
//! predecessor. Receivers are built last and once per instance name: a
//! receiver referenced by several pipelines of one signal gets a fan-out
//! over all those pipelines' heads, and a receiver referenced from both a
//! traces and a metrics pipeline gets both halves wired.
//!
//! Start order is exporters, processors, receivers (extensions before
//! all); any start failure rolls back what already started, in reverse.
//! Shutdown is the mirror image: receivers first, so no new batches
//! enter, then processors (head first, so drains flow downstream), then
//! exporters, then extensions.

use crate::config::{LoadedConfig, Signal};
use crate::fanout::{MetricsFanOut, TraceFanOut};
use crate::host::{CollectorHost, FatalError};
use crate::observability::Metrics;
use crate::registry::Factories;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{error, info};
use virta_core::{
    ComponentConfig, ComponentError, ComponentKind, Extension, FactoryError, Host,
    MetricsConsumer, MetricsExporter, MetricsProcessor, MetricsReceiver, TraceConsumer,
    TraceExporter, TraceProcessor, TraceReceiver,
};

/// Error building or starting the graph.
#[derive(Error, Debug)]
pub enum BuildError {
    /// A pipeline references a component whose factory does not produce
    /// that signal.
    #[error("pipeline '{pipeline}': {kind} '{name}' does not support {signal}")]
    SignalUnsupported {
        /// Pipeline demanding the signal.
        pipeline: String,
        /// Kind of the offending component.
        kind: ComponentKind,
        /// Instance name.
        name: String,
        /// The demanded signal.
        signal: Signal,
    },

    /// A factory rejected its configuration.
    #[error("{kind} '{name}': {message}")]
    BadComponent {
        /// Kind of the component.
        kind: ComponentKind,
        /// Instance name.
        name: String,
        /// Factory-reported reason.
        message: String,
    },

    /// Internal consistency failure: the loader validated a reference the
    /// builder cannot resolve.
    #[error("{kind} '{name}' is not in the loaded configuration")]
    MissingConfig {
        /// Kind of the component.
        kind: ComponentKind,
        /// Instance name.
        name: String,
    },

    /// A component failed to start; everything started before it has
    /// been stopped again.
    #[error("component '{name}' failed to start: {source}")]
    ComponentStart {
        /// Instance name.
        name: String,
        /// The start failure.
        source: ComponentError,
    },
}

fn create_error(
    kind: ComponentKind,
    name: &str,
    pipeline: &str,
    signal: Signal,
    err: FactoryError,
) -> BuildError {
    match err {
        FactoryError::DataTypeUnsupported => BuildError::SignalUnsupported {
            pipeline: pipeline.to_string(),
            kind,
            name: name.to_string(),
            signal,
        },
        FactoryError::InvalidConfig(message) => BuildError::BadComponent {
            kind,
            name: name.to_string(),
            message,
        },
    }
}

/// Pipeline heads accumulated for one receiver before it is built.
struct ReceiverWiring<C: ?Sized> {
    heads: Vec<Arc<C>>,
    /// First pipeline that referenced the receiver, for error reporting.
    pipeline: String,
}

impl std::fmt::Debug for Collector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Collector")
            .field("extensions", &self.extensions.len())
            .field("trace_receivers", &self.trace_receivers.len())
            .field("metrics_receivers", &self.metrics_receivers.len())
            .field("trace_processors", &self.trace_processors.len())
            .field("metrics_processors", &self.metrics_processors.len())
            .field("trace_exporters", &self.trace_exporters.len())
            .field("metrics_exporters", &self.metrics_exporters.len())
            .field("started", &self.started)
            .finish()
    }
}

/// The built runtime graph.
pub struct Collector {
    host: Arc<CollectorHost>,
    fatal_rx: Option<mpsc::UnboundedReceiver<FatalError>>,
    /// Extensions in service-declaration order.
    extensions: Vec<Arc<dyn Extension>>,
    trace_receivers: Vec<(String, Arc<dyn TraceReceiver>)>,
    metrics_receivers: Vec<(String, Arc<dyn MetricsReceiver>)>,
    /// Processors in creation order (tail of each chain first).
    trace_processors: Vec<(String, Arc<dyn TraceProcessor>)>,
    metrics_processors: Vec<(String, Arc<dyn MetricsProcessor>)>,
    trace_exporters: Vec<(String, Arc<dyn TraceExporter>)>,
    metrics_exporters: Vec<(String, Arc<dyn MetricsExporter>)>,
    started: bool,
}

impl Collector {
    /// Build the graph. Nothing is started yet.
    pub fn build(config: &LoadedConfig, factories: Arc<Factories>) -> Result<Self, BuildError> {
        if let Err(e) = Metrics::init() {
            // Self-metrics are best-effort; the data plane works without
            // them.
            error!(error = %e, "collector metrics unavailable");
        }

        // Extensions are created first: the host hands them to every
        // component at start time.
        let mut extension_map: HashMap<String, Arc<dyn Extension>> = HashMap::new();
        let mut extensions = Vec::new();
        for name in &config.service.extensions {
            let cfg = config
                .extensions
                .get(name)
                .ok_or_else(|| BuildError::MissingConfig {
                    kind: ComponentKind::Extension,
                    name: name.clone(),
                })?;
            if !cfg.is_enabled() {
                info!(extension = %name, "skipping disabled extension");
                continue;
            }
            let factory = factories.extension_factory(cfg.type_str()).ok_or_else(|| {
                BuildError::MissingConfig {
                    kind: ComponentKind::Extension,
                    name: name.clone(),
                }
            })?;
            let extension =
                factory
                    .create_extension(cfg.as_ref())
                    .map_err(|e| BuildError::BadComponent {
                        kind: ComponentKind::Extension,
                        name: name.clone(),
                        message: e.to_string(),
                    })?;
            extension_map.insert(name.clone(), Arc::clone(&extension));
            extensions.push(extension);
        }

        let (host, fatal_rx) = CollectorHost::new(Arc::clone(&factories), extension_map);

        let mut trace_exporter_cache: BTreeMap<String, Arc<dyn TraceExporter>> = BTreeMap::new();
        let mut metrics_exporter_cache: BTreeMap<String, Arc<dyn MetricsExporter>> =
            BTreeMap::new();
        let mut trace_processors: Vec<(String, Arc<dyn TraceProcessor>)> = Vec::new();
        let mut metrics_processors: Vec<(String, Arc<dyn MetricsProcessor>)> = Vec::new();
        let mut trace_wiring: BTreeMap<String, ReceiverWiring<dyn TraceConsumer>> = BTreeMap::new();
        let mut metrics_wiring: BTreeMap<String, ReceiverWiring<dyn MetricsConsumer>> =
            BTreeMap::new();

        for pipeline in config.service.pipelines.values() {
            match pipeline.signal {
                Signal::Traces => {
                    let mut outs: Vec<Arc<dyn TraceConsumer>> = Vec::new();
                    for name in &pipeline.exporters {
                        let exporter = match trace_exporter_cache.get(name) {
                            Some(exporter) => Arc::clone(exporter),
                            None => {
                                let (cfg, factory) = exporter_parts(config, &factories, name)?;
                                let exporter =
                                    factory.create_trace_exporter(cfg).map_err(|e| {
                                        create_error(
                                            ComponentKind::Exporter,
                                            name,
                                            &pipeline.name,
                                            Signal::Traces,
                                            e,
                                        )
                                    })?;
                                trace_exporter_cache.insert(name.clone(), Arc::clone(&exporter));
                                exporter
                            }
                        };
                        outs.push(exporter);
                    }

                    let mut next: Arc<dyn TraceConsumer> = TraceFanOut::wrap(outs);
                    for name in pipeline.processors.iter().rev() {
                        let (cfg, factory) = processor_parts(config, &factories, name)?;
                        let processor =
                            factory.create_trace_processor(cfg, next).map_err(|e| {
                                create_error(
                                    ComponentKind::Processor,
                                    name,
                                    &pipeline.name,
                                    Signal::Traces,
                                    e,
                                )
                            })?;
                        trace_processors.push((name.clone(), Arc::clone(&processor)));
                        next = processor;
                    }

                    for name in &pipeline.receivers {
                        trace_wiring
                            .entry(name.clone())
                            .or_insert_with(|| ReceiverWiring {
                                heads: Vec::new(),
                                pipeline: pipeline.name.clone(),
                            })
                            .heads
                            .push(Arc::clone(&next));
                    }
                }
                Signal::Metrics => {
                    let mut outs: Vec<Arc<dyn MetricsConsumer>> = Vec::new();
                    for name in &pipeline.exporters {
                        let exporter = match metrics_exporter_cache.get(name) {
                            Some(exporter) => Arc::clone(exporter),
                            None => {
                                let (cfg, factory) = exporter_parts(config, &factories, name)?;
                                let exporter =
                                    factory.create_metrics_exporter(cfg).map_err(|e| {
                                        create_error(
                                            ComponentKind::Exporter,
                                            name,
                                            &pipeline.name,
                                            Signal::Metrics,
                                            e,
                                        )
                                    })?;
                                metrics_exporter_cache.insert(name.clone(), Arc::clone(&exporter));
                                exporter
                            }
                        };
                        outs.push(exporter);
                    }

                    let mut next: Arc<dyn MetricsConsumer> = MetricsFanOut::wrap(outs);
                    for name in pipeline.processors.iter().rev() {
                        let (cfg, factory) = processor_parts(config, &factories, name)?;
                        let processor =
                            factory.create_metrics_processor(cfg, next).map_err(|e| {
                                create_error(
                                    ComponentKind::Processor,
                                    name,
                                    &pipeline.name,
                                    Signal::Metrics,
                                    e,
                                )
                            })?;
                        metrics_processors.push((name.clone(), Arc::clone(&processor)));
                        next = processor;
                    }

                    for name in &pipeline.receivers {
                        metrics_wiring
                            .entry(name.clone())
                            .or_insert_with(|| ReceiverWiring {
                                heads: Vec::new(),
                                pipeline: pipeline.name.clone(),
                            })
                            .heads
                            .push(Arc::clone(&next));
                    }
                }
            }
        }

        // Receivers, once per instance name.
        let mut trace_receivers = Vec::new();
        for (name, wiring) in trace_wiring {
            let (cfg, factory) = receiver_parts(config, &factories, &name)?;
            if !cfg.is_enabled() {
                info!(receiver = %name, "skipping disabled receiver");
                continue;
            }
            let receiver = factory
                .create_trace_receiver(cfg, TraceFanOut::wrap(wiring.heads))
                .map_err(|e| {
                    create_error(
                        ComponentKind::Receiver,
                        &name,
                        &wiring.pipeline,
                        Signal::Traces,
                        e,
                    )
                })?;
            trace_receivers.push((name, receiver));
        }

        let mut metrics_receivers = Vec::new();
        for (name, wiring) in metrics_wiring {
            let (cfg, factory) = receiver_parts(config, &factories, &name)?;
            if !cfg.is_enabled() {
                info!(receiver = %name, "skipping disabled receiver");
                continue;
            }
            let receiver = factory
                .create_metrics_receiver(cfg, MetricsFanOut::wrap(wiring.heads))
                .map_err(|e| {
                    create_error(
                        ComponentKind::Receiver,
                        &name,
                        &wiring.pipeline,
                        Signal::Metrics,
                        e,
                    )
                })?;
            metrics_receivers.push((name, receiver));
        }

        for pipeline in config.service.pipelines.values() {
            info!(
                pipeline = %pipeline.name,
                signal = %pipeline.signal,
                receivers = pipeline.receivers.len(),
                processors = pipeline.processors.len(),
                exporters = pipeline.exporters.len(),
                "pipeline assembled"
            );
        }

        Ok(Collector {
            host,
            fatal_rx: Some(fatal_rx),
            extensions,
            trace_receivers,
            metrics_receivers,
            trace_processors,
            metrics_processors,
            trace_exporters: trace_exporter_cache.into_iter().collect(),
            metrics_exporters: metrics_exporter_cache.into_iter().collect(),
            started: false,
        })
    }

    /// Take the fatal-error channel. The runtime selects on this to turn
    /// a component's fatal report into a collector-wide shutdown.
    pub fn take_fatal_receiver(&mut self) -> Option<mpsc::UnboundedReceiver<FatalError>> {
        self.fatal_rx.take()
    }

    /// Start everything: extensions, then exporters, processors, and
    /// receivers last. On failure, components already started are
    /// stopped again in reverse order and the error is surfaced.
    pub async fn start(&mut self) -> Result<(), BuildError> {
        let host: Arc<dyn Host> = self.host.clone();
        let mut started: Vec<Stage> = Vec::new();

        let plan = self.start_plan();
        for (name, stage) in plan {
            if let Err(source) = stage.start(Arc::clone(&host)).await {
                error!(component = %name, error = %source, "start failed, rolling back");
                for stage in started.iter().rev() {
                    if let Err(e) = stage.shutdown().await {
                        error!(error = %e, "rollback shutdown failed");
                    }
                }
                return Err(BuildError::ComponentStart { name, source });
            }
            if let Some(m) = Metrics::get() {
                m.components_running.inc();
            }
            started.push(stage);
        }
        self.started = true;
        info!(components = started.len(), "collector started");
        Ok(())
    }

    /// Stop everything: receivers first (no new data enters, in-flight
    /// calls are cancelled), then processors head-first so drains flow
    /// downstream, then exporters, then extensions. Failures are logged
    /// and do not stop the remaining shutdowns.
    pub async fn shutdown(&mut self) {
        if !self.started {
            return;
        }
        self.started = false;

        for (name, receiver) in &self.trace_receivers {
            log_shutdown(name, receiver.shutdown().await);
        }
        for (name, receiver) in &self.metrics_receivers {
            log_shutdown(name, receiver.shutdown().await);
        }
        // Chains were recorded tail-first; drain head-first.
        for (name, processor) in self.trace_processors.iter().rev() {
            log_shutdown(name, processor.shutdown().await);
        }
        for (name, processor) in self.metrics_processors.iter().rev() {
            log_shutdown(name, processor.shutdown().await);
        }
        for (name, exporter) in &self.trace_exporters {
            log_shutdown(name, TraceExporter::shutdown(exporter.as_ref()).await);
        }
        for (name, exporter) in &self.metrics_exporters {
            log_shutdown(name, MetricsExporter::shutdown(exporter.as_ref()).await);
        }
        for extension in self.extensions.iter().rev() {
            log_shutdown(extension.name(), extension.shutdown().await);
        }
        if let Some(m) = Metrics::get() {
            m.components_running.set(0);
        }
        info!("collector stopped");
    }

    /// The start sequence: extensions, exporters, processors, receivers.
    fn start_plan(&self) -> Vec<(String, Stage)> {
        let mut plan: Vec<(String, Stage)> = Vec::new();
        for extension in &self.extensions {
            plan.push((
                extension.name().to_string(),
                Stage::Extension(Arc::clone(extension)),
            ));
        }
        for (name, exporter) in &self.trace_exporters {
            plan.push((name.clone(), Stage::TraceExporter(Arc::clone(exporter))));
        }
        for (name, exporter) in &self.metrics_exporters {
            plan.push((name.clone(), Stage::MetricsExporter(Arc::clone(exporter))));
        }
        for (name, processor) in &self.trace_processors {
            plan.push((name.clone(), Stage::TraceProcessor(Arc::clone(processor))));
        }
        for (name, processor) in &self.metrics_processors {
            plan.push((name.clone(), Stage::MetricsProcessor(Arc::clone(processor))));
        }
        for (name, receiver) in &self.trace_receivers {
            plan.push((name.clone(), Stage::TraceReceiver(Arc::clone(receiver))));
        }
        for (name, receiver) in &self.metrics_receivers {
            plan.push((name.clone(), Stage::MetricsReceiver(Arc::clone(receiver))));
        }
        plan
    }
}

fn log_shutdown(name: &str, result: Result<(), ComponentError>) {
    if let Err(e) = result {
        error!(component = %name, error = %e, "shutdown failed");
    }
}

fn exporter_parts<'a>(
    config: &'a LoadedConfig,
    factories: &Factories,
    name: &str,
) -> Result<(&'a dyn ComponentConfig, Arc<dyn virta_core::ExporterFactory>), BuildError> {
    let cfg = config
        .exporters
        .get(name)
        .ok_or_else(|| BuildError::MissingConfig {
            kind: ComponentKind::Exporter,
            name: name.to_string(),
        })?;
    let factory = factories
        .exporter_factory(cfg.type_str())
        .ok_or_else(|| BuildError::MissingConfig {
            kind: ComponentKind::Exporter,
            name: name.to_string(),
        })?;
    Ok((cfg.as_ref(), factory))
}

fn processor_parts<'a>(
    config: &'a LoadedConfig,
    factories: &Factories,
    name: &str,
) -> Result<(&'a dyn ComponentConfig, Arc<dyn virta_core::ProcessorFactory>), BuildError> {
    let cfg = config
        .processors
        .get(name)
        .ok_or_else(|| BuildError::MissingConfig {
            kind: ComponentKind::Processor,
            name: name.to_string(),
        })?;
    let factory = factories
        .processor_factory(cfg.type_str())
        .ok_or_else(|| BuildError::MissingConfig {
            kind: ComponentKind::Processor,
            name: name.to_string(),
        })?;
    Ok((cfg.as_ref(), factory))
}

fn receiver_parts<'a>(
    config: &'a LoadedConfig,
    factories: &Factories,
    name: &str,
) -> Result<(&'a dyn ComponentConfig, Arc<dyn virta_core::ReceiverFactory>), BuildError> {
    let cfg = config
        .receivers
        .get(name)
        .ok_or_else(|| BuildError::MissingConfig {
            kind: ComponentKind::Receiver,
            name: name.to_string(),
        })?;
    let factory = factories
        .receiver_factory(cfg.type_str())
        .ok_or_else(|| BuildError::MissingConfig {
            kind: ComponentKind::Receiver,
            name: name.to_string(),
        })?;
    Ok((cfg.as_ref(), factory))
}

/// One startable component, for the ordered start plan and rollback.
enum Stage {
    Extension(Arc<dyn Extension>),
    TraceExporter(Arc<dyn TraceExporter>),
    MetricsExporter(Arc<dyn MetricsExporter>),
    TraceProcessor(Arc<dyn TraceProcessor>),
    MetricsProcessor(Arc<dyn MetricsProcessor>),
    TraceReceiver(Arc<dyn TraceReceiver>),
    MetricsReceiver(Arc<dyn MetricsReceiver>),
}

impl Stage {
    async fn start(&self, host: Arc<dyn Host>) -> Result<(), ComponentError> {
        match self {
            Stage::Extension(c) => c.start(host).await,
            Stage::TraceExporter(c) => c.start(host).await,
            Stage::MetricsExporter(c) => c.start(host).await,
            Stage::TraceProcessor(c) => c.start(host).await,
            Stage::MetricsProcessor(c) => c.start(host).await,
            Stage::TraceReceiver(c) => c.start(host).await,
            Stage::MetricsReceiver(c) => c.start(host).await,
        }
    }

    async fn shutdown(&self) -> Result<(), ComponentError> {
        match self {
            Stage::Extension(c) => c.shutdown().await,
            Stage::TraceExporter(c) => c.shutdown().await,
            Stage::MetricsExporter(c) => c.shutdown().await,
            Stage::TraceProcessor(c) => c.shutdown().await,
            Stage::MetricsProcessor(c) => c.shutdown().await,
            Stage::TraceReceiver(c) => c.shutdown().await,
            Stage::MetricsReceiver(c) => c.shutdown().await,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::config::load_str;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use serde_yaml::Value;
    use std::sync::atomic::{AtomicU64, Ordering};
    use tokio_util::sync::CancellationToken;
    use virta_core::{
        ConsumeError, DecodeError, MetricsData, Settings, Span, TraceData, decode_with_defaults,
    };

    // ======================================================================
    // Shared test fixtures: an observable receiver/processor/exporter set
    // ======================================================================

    /// Everything the mock components report into.
    #[derive(Default)]
    struct Probe {
        /// Consumers handed to created trace receivers, by instance name.
        receiver_inputs: Mutex<HashMap<String, Arc<dyn TraceConsumer>>>,
        metrics_inputs: Mutex<HashMap<String, Arc<dyn MetricsConsumer>>>,
        /// Batches captured by trace exporters, by instance name.
        exported: Mutex<Vec<(String, TraceData)>>,
        exported_metrics: Mutex<Vec<(String, MetricsData)>>,
        /// create_* call counts.
        receiver_creates: AtomicU64,
        exporter_creates: AtomicU64,
        /// Lifecycle event log ("start exporter", ...).
        lifecycle: Mutex<Vec<String>>,
        /// Component names whose start should fail.
        fail_start: Mutex<Vec<String>>,
    }

    impl Probe {
        fn log(&self, event: impl Into<String>) {
            self.lifecycle.lock().push(event.into());
        }

        fn should_fail(&self, name: &str) -> bool {
            self.fail_start.lock().iter().any(|n| n == name)
        }
    }

    #[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
    struct MockConfig {
        #[serde(flatten)]
        settings: Settings,
        #[serde(default)]
        tag: String,
        #[serde(default)]
        metrics_only: bool,
    }

    virta_core::impl_component_config!(MockConfig, "mock");

    fn mock_default() -> MockConfig {
        MockConfig {
            settings: Settings::named("mock"),
            ..Default::default()
        }
    }

    // ── receiver ─────────────────────────────────────────────────────

    struct MockReceiverFactory(Arc<Probe>);

    impl virta_core::ReceiverFactory for MockReceiverFactory {
        fn type_str(&self) -> &'static str {
            "mock"
        }

        fn default_config(&self) -> Box<dyn ComponentConfig> {
            Box::new(mock_default())
        }

        fn load_config(&self, subtree: &Value) -> Result<Box<dyn ComponentConfig>, DecodeError> {
            Ok(Box::new(decode_with_defaults(&mock_default(), subtree)?))
        }

        fn create_trace_receiver(
            &self,
            cfg: &dyn ComponentConfig,
            next: Arc<dyn TraceConsumer>,
        ) -> Result<Arc<dyn TraceReceiver>, FactoryError> {
            let mock = cfg.as_any().downcast_ref::<MockConfig>().unwrap();
            if mock.metrics_only {
                return Err(FactoryError::DataTypeUnsupported);
            }
            self.0.receiver_creates.fetch_add(1, Ordering::SeqCst);
            self.0
                .receiver_inputs
                .lock()
                .insert(cfg.name().to_string(), next);
            Ok(Arc::new(MockReceiver {
                name: cfg.name().to_string(),
                probe: Arc::clone(&self.0),
            }))
        }

        fn create_metrics_receiver(
            &self,
            cfg: &dyn ComponentConfig,
            next: Arc<dyn MetricsConsumer>,
        ) -> Result<Arc<dyn MetricsReceiver>, FactoryError> {
            self.0
                .metrics_inputs
                .lock()
                .insert(cfg.name().to_string(), next);
            Ok(Arc::new(MockReceiver {
                name: cfg.name().to_string(),
                probe: Arc::clone(&self.0),
            }))
        }
    }

    struct MockReceiver {
        name: String,
        probe: Arc<Probe>,
    }

    #[async_trait]
    impl TraceReceiver for MockReceiver {
        async fn start(&self, _host: Arc<dyn Host>) -> Result<(), ComponentError> {
            if self.probe.should_fail(&self.name) {
                return Err(ComponentError::Start("bind failed".to_string()));
            }
            self.probe.log(format!("start receiver {}", self.name));
            Ok(())
        }

        async fn shutdown(&self) -> Result<(), ComponentError> {
            self.probe.log(format!("stop receiver {}", self.name));
            Ok(())
        }
    }

    #[async_trait]
    impl MetricsReceiver for MockReceiver {
        async fn start(&self, _host: Arc<dyn Host>) -> Result<(), ComponentError> {
            self.probe.log(format!("start receiver {}", self.name));
            Ok(())
        }

        async fn shutdown(&self) -> Result<(), ComponentError> {
            self.probe.log(format!("stop receiver {}", self.name));
            Ok(())
        }
    }

    // ── processor ────────────────────────────────────────────────────

    struct MockProcessorFactory(Arc<Probe>);

    impl virta_core::ProcessorFactory for MockProcessorFactory {
        fn type_str(&self) -> &'static str {
            "mock"
        }

        fn default_config(&self) -> Box<dyn ComponentConfig> {
            Box::new(mock_default())
        }

        fn load_config(&self, subtree: &Value) -> Result<Box<dyn ComponentConfig>, DecodeError> {
            Ok(Box::new(decode_with_defaults(&mock_default(), subtree)?))
        }

        fn create_trace_processor(
            &self,
            cfg: &dyn ComponentConfig,
            next: Arc<dyn TraceConsumer>,
        ) -> Result<Arc<dyn TraceProcessor>, FactoryError> {
            let mock = cfg.as_any().downcast_ref::<MockConfig>().unwrap();
            Ok(Arc::new(TagProcessor {
                name: cfg.name().to_string(),
                tag: mock.tag.clone(),
                next,
                probe: Arc::clone(&self.0),
            }))
        }
    }

    /// Appends its tag to every span name, proving chain order.
    struct TagProcessor {
        name: String,
        tag: String,
        next: Arc<dyn TraceConsumer>,
        probe: Arc<Probe>,
    }

    #[async_trait]
    impl TraceConsumer for TagProcessor {
        async fn consume_traces(
            &self,
            cancel: &CancellationToken,
            batch: &TraceData,
        ) -> Result<(), ConsumeError> {
            let mut tagged = batch.clone();
            for span in &mut tagged.spans {
                span.name.push_str(&self.tag);
            }
            self.next.consume_traces(cancel, &tagged).await
        }
    }

    #[async_trait]
    impl TraceProcessor for TagProcessor {
        fn name(&self) -> &str {
            &self.name
        }

        async fn start(&self, _host: Arc<dyn Host>) -> Result<(), ComponentError> {
            self.probe.log(format!("start processor {}", self.name));
            Ok(())
        }

        async fn shutdown(&self) -> Result<(), ComponentError> {
            self.probe.log(format!("stop processor {}", self.name));
            Ok(())
        }
    }

    // ── exporter ─────────────────────────────────────────────────────

    struct MockExporterFactory(Arc<Probe>);

    impl virta_core::ExporterFactory for MockExporterFactory {
        fn type_str(&self) -> &'static str {
            "mock"
        }

        fn default_config(&self) -> Box<dyn ComponentConfig> {
            Box::new(mock_default())
        }

        fn load_config(&self, subtree: &Value) -> Result<Box<dyn ComponentConfig>, DecodeError> {
            Ok(Box::new(decode_with_defaults(&mock_default(), subtree)?))
        }

        fn create_trace_exporter(
            &self,
            cfg: &dyn ComponentConfig,
        ) -> Result<Arc<dyn TraceExporter>, FactoryError> {
            let mock = cfg.as_any().downcast_ref::<MockConfig>().unwrap();
            if mock.metrics_only {
                return Err(FactoryError::DataTypeUnsupported);
            }
            self.0.exporter_creates.fetch_add(1, Ordering::SeqCst);
            Ok(Arc::new(MockExporter {
                name: cfg.name().to_string(),
                probe: Arc::clone(&self.0),
            }))
        }

        fn create_metrics_exporter(
            &self,
            cfg: &dyn ComponentConfig,
        ) -> Result<Arc<dyn MetricsExporter>, FactoryError> {
            Ok(Arc::new(MockExporter {
                name: cfg.name().to_string(),
                probe: Arc::clone(&self.0),
            }))
        }
    }

    struct MockExporter {
        name: String,
        probe: Arc<Probe>,
    }

    #[async_trait]
    impl TraceConsumer for MockExporter {
        async fn consume_traces(
            &self,
            _cancel: &CancellationToken,
            batch: &TraceData,
        ) -> Result<(), ConsumeError> {
            self.probe
                .exported
                .lock()
                .push((self.name.clone(), batch.clone()));
            Ok(())
        }
    }

    #[async_trait]
    impl MetricsConsumer for MockExporter {
        async fn consume_metrics(
            &self,
            _cancel: &CancellationToken,
            batch: &MetricsData,
        ) -> Result<(), ConsumeError> {
            self.probe
                .exported_metrics
                .lock()
                .push((self.name.clone(), batch.clone()));
            Ok(())
        }
    }

    #[async_trait]
    impl TraceExporter for MockExporter {
        fn name(&self) -> &str {
            &self.name
        }

        async fn start(&self, _host: Arc<dyn Host>) -> Result<(), ComponentError> {
            self.probe.log(format!("start exporter {}", self.name));
            Ok(())
        }

        async fn shutdown(&self) -> Result<(), ComponentError> {
            self.probe.log(format!("stop exporter {}", self.name));
            Ok(())
        }
    }

    #[async_trait]
    impl MetricsExporter for MockExporter {
        fn name(&self) -> &str {
            &self.name
        }

        async fn start(&self, _host: Arc<dyn Host>) -> Result<(), ComponentError> {
            self.probe.log(format!("start exporter {}", self.name));
            Ok(())
        }

        async fn shutdown(&self) -> Result<(), ComponentError> {
            self.probe.log(format!("stop exporter {}", self.name));
            Ok(())
        }
    }

    fn mock_factories(probe: &Arc<Probe>) -> Arc<Factories> {
        Arc::new(
            Factories::build(
                vec![Arc::new(MockReceiverFactory(Arc::clone(probe)))],
                vec![Arc::new(MockProcessorFactory(Arc::clone(probe)))],
                vec![Arc::new(MockExporterFactory(Arc::clone(probe)))],
                vec![],
            )
            .unwrap(),
        )
    }

    async fn inject(probe: &Probe, receiver: &str, batch: &TraceData) {
        let input = Arc::clone(probe.receiver_inputs.lock().get(receiver).unwrap());
        input
            .consume_traces(&CancellationToken::new(), batch)
            .await
            .unwrap();
    }

    fn one_span_batch() -> TraceData {
        TraceData {
            spans: vec![Span {
                name: "op".to_string(),
                ..Default::default()
            }],
            ..Default::default()
        }
    }

    // ======================================================================
    // Wiring
    // ======================================================================

    #[tokio::test]
    async fn processor_chain_order_is_config_order() {
        let probe = Arc::new(Probe::default());
        let yaml = r#"
receivers:
  mock:
processors:
  mock/a:
    tag: "-a"
  mock/b:
    tag: "-b"
exporters:
  mock:
service:
  pipelines:
    traces:
      receivers: [mock]
      processors: [mock/a, mock/b]
      exporters: [mock]
"#;
        let config = load_str(yaml, &mock_factories(&probe)).unwrap();
        let _collector = Collector::build(&config, mock_factories(&probe)).unwrap();

        inject(&probe, "mock", &one_span_batch()).await;

        let exported = probe.exported.lock();
        // a runs before b: tags append in declaration order.
        assert_eq!(exported[0].1.spans[0].name, "op-a-b");
    }

    #[tokio::test]
    async fn exporter_shared_across_pipelines_created_once() {
        let probe = Arc::new(Probe::default());
        let yaml = r#"
receivers:
  mock:
  mock/second:
exporters:
  mock:
service:
  pipelines:
    traces:
      receivers: [mock]
      exporters: [mock]
    traces/second:
      receivers: [mock/second]
      exporters: [mock]
"#;
        let config = load_str(yaml, &mock_factories(&probe)).unwrap();
        let _collector = Collector::build(&config, mock_factories(&probe)).unwrap();

        assert_eq!(probe.exporter_creates.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn receiver_shared_across_pipelines_fans_out_to_both_heads() {
        let probe = Arc::new(Probe::default());
        let yaml = r#"
receivers:
  mock:
exporters:
  mock:
  mock/other:
service:
  pipelines:
    traces:
      receivers: [mock]
      exporters: [mock]
    traces/second:
      receivers: [mock]
      exporters: [mock/other]
"#;
        let config = load_str(yaml, &mock_factories(&probe)).unwrap();
        let _collector = Collector::build(&config, mock_factories(&probe)).unwrap();

        // One receiver instance...
        assert_eq!(probe.receiver_creates.load(Ordering::SeqCst), 1);

        // ...whose output reaches both pipelines' exporters.
        inject(&probe, "mock", &one_span_batch()).await;
        let exported = probe.exported.lock();
        let names: Vec<&str> = exported.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, vec!["mock", "mock/other"]);
    }

    #[tokio::test]
    async fn receiver_in_both_signal_pipelines_gets_both_halves() {
        let probe = Arc::new(Probe::default());
        let yaml = r#"
receivers:
  mock:
exporters:
  mock:
service:
  pipelines:
    traces:
      receivers: [mock]
      exporters: [mock]
    metrics:
      receivers: [mock]
      exporters: [mock]
"#;
        let config = load_str(yaml, &mock_factories(&probe)).unwrap();
        let _collector = Collector::build(&config, mock_factories(&probe)).unwrap();

        assert!(probe.receiver_inputs.lock().contains_key("mock"));
        assert!(probe.metrics_inputs.lock().contains_key("mock"));
    }

    #[tokio::test]
    async fn disabled_receiver_skipped() {
        let probe = Arc::new(Probe::default());
        let yaml = r#"
receivers:
  mock:
    disabled: true
exporters:
  mock:
service:
  pipelines:
    traces:
      receivers: [mock]
      exporters: [mock]
"#;
        let config = load_str(yaml, &mock_factories(&probe)).unwrap();
        let collector = Collector::build(&config, mock_factories(&probe)).unwrap();

        assert_eq!(probe.receiver_creates.load(Ordering::SeqCst), 0);
        assert!(collector.trace_receivers.is_empty());
    }

    #[tokio::test]
    async fn unsupported_signal_is_an_error() {
        let probe = Arc::new(Probe::default());
        let yaml = r#"
receivers:
  mock:
exporters:
  mock:
    metrics_only: true
service:
  pipelines:
    traces:
      receivers: [mock]
      exporters: [mock]
"#;
        let config = load_str(yaml, &mock_factories(&probe)).unwrap();
        let err = Collector::build(&config, mock_factories(&probe)).unwrap_err();

        match err {
            BuildError::SignalUnsupported {
                pipeline,
                kind,
                name,
                signal,
            } => {
                assert_eq!(pipeline, "traces");
                assert_eq!(kind, ComponentKind::Exporter);
                assert_eq!(name, "mock");
                assert_eq!(signal, Signal::Traces);
            }
            other => panic!("expected SignalUnsupported, got {other}"),
        }
    }

    // ======================================================================
    // Lifecycle
    // ======================================================================

    #[tokio::test]
    async fn start_order_and_shutdown_order_mirror() {
        let probe = Arc::new(Probe::default());
        let yaml = r#"
receivers:
  mock:
processors:
  mock/p:
exporters:
  mock:
service:
  pipelines:
    traces:
      receivers: [mock]
      processors: [mock/p]
      exporters: [mock]
"#;
        let config = load_str(yaml, &mock_factories(&probe)).unwrap();
        let mut collector = Collector::build(&config, mock_factories(&probe)).unwrap();

        collector.start().await.unwrap();
        collector.shutdown().await;

        let lifecycle = probe.lifecycle.lock();
        assert_eq!(
            *lifecycle,
            vec![
                "start exporter mock",
                "start processor mock/p",
                "start receiver mock",
                "stop receiver mock",
                "stop processor mock/p",
                "stop exporter mock",
            ]
        );
    }

    #[tokio::test]
    async fn start_failure_rolls_back_started_components() {
        let probe = Arc::new(Probe::default());
        probe.fail_start.lock().push("mock".to_string());
        let yaml = r#"
receivers:
  mock:
exporters:
  mock/e:
service:
  pipelines:
    traces:
      receivers: [mock]
      exporters: [mock/e]
"#;
        let config = load_str(yaml, &mock_factories(&probe)).unwrap();
        let mut collector = Collector::build(&config, mock_factories(&probe)).unwrap();

        let err = collector.start().await.unwrap_err();
        assert!(matches!(err, BuildError::ComponentStart { ref name, .. } if name == "mock"));

        let lifecycle = probe.lifecycle.lock();
        assert_eq!(
            *lifecycle,
            vec!["start exporter mock/e", "stop exporter mock/e"]
        );
    }

    #[tokio::test]
    async fn fatal_error_channel_reaches_runtime() {
        let probe = Arc::new(Probe::default());
        let yaml = r#"
receivers:
  mock:
exporters:
  mock:
service:
  pipelines:
    traces:
      receivers: [mock]
      exporters: [mock]
"#;
        let config = load_str(yaml, &mock_factories(&probe)).unwrap();
        let mut collector = Collector::build(&config, mock_factories(&probe)).unwrap();
        let mut fatal_rx = collector.take_fatal_receiver().unwrap();

        collector.host.report_fatal_error(
            "mock",
            ComponentError::Fatal("listener crashed".to_string()),
        );
        let report = fatal_rx.recv().await.unwrap();
        assert_eq!(report.component, "mock");
    }
}
