//! Host implementation handed to running components.

use crate::registry::Factories;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::warn;
use virta_core::{ComponentError, ComponentKind, Extension, FactoryRef, Host};

/// A fatal error reported by a running component, attributed by name.
#[derive(Debug, Clone)]
pub struct FatalError {
    /// Instance name of the reporting component.
    pub component: String,
    /// The error itself.
    pub error: ComponentError,
}

/// The collector's [`Host`]: exposes the factory registry, the running
/// extensions, and the fatal-error channel that triggers a collector-wide
/// graceful shutdown.
pub struct CollectorHost {
    factories: Arc<Factories>,
    extensions: HashMap<String, Arc<dyn Extension>>,
    fatal_tx: mpsc::UnboundedSender<FatalError>,
}

impl CollectorHost {
    /// Create a host plus the receiving side of its fatal-error channel.
    pub fn new(
        factories: Arc<Factories>,
        extensions: HashMap<String, Arc<dyn Extension>>,
    ) -> (Arc<Self>, mpsc::UnboundedReceiver<FatalError>) {
        let (fatal_tx, fatal_rx) = mpsc::unbounded_channel();
        (
            Arc::new(Self {
                factories,
                extensions,
                fatal_tx,
            }),
            fatal_rx,
        )
    }

    /// All running extensions, keyed by instance name.
    pub fn extensions(&self) -> &HashMap<String, Arc<dyn Extension>> {
        &self.extensions
    }
}

impl Host for CollectorHost {
    fn report_fatal_error(&self, component: &str, error: ComponentError) {
        let report = FatalError {
            component: component.to_string(),
            error,
        };
        // The receiver disappears once shutdown has begun; late reports
        // are logged and dropped.
        if self.fatal_tx.send(report.clone()).is_err() {
            warn!(
                component = %report.component,
                error = %report.error,
                "fatal error reported after shutdown began"
            );
        }
    }

    fn extension(&self, name: &str) -> Option<Arc<dyn Extension>> {
        self.extensions.get(name).cloned()
    }

    fn factory(&self, kind: ComponentKind, type_str: &str) -> Option<FactoryRef> {
        self.factories.factory(kind, type_str)
    }
}
