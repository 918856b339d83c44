//! Error types shared by virta components.

use std::fmt;
use thiserror::Error;

/// Error returned by a consumer call ([`crate::TraceConsumer`] /
/// [`crate::MetricsConsumer`]).
///
/// Consumer errors propagate back to the caller (ultimately a receiver),
/// which decides whether to log, drop, or retry. Fan-out aggregates
/// per-downstream failures instead of short-circuiting.
#[derive(Error, Debug)]
pub enum ConsumeError {
    /// The operation's cancellation token was triggered.
    #[error("operation cancelled")]
    Cancelled,

    /// A named stage failed to handle the batch.
    #[error("consumer '{name}' failed: {message}")]
    Component {
        /// Instance name of the failing stage.
        name: String,
        /// What went wrong.
        message: String,
    },

    /// One or more fan-out downstreams failed; successful deliveries are
    /// not rolled back.
    #[error("{0}")]
    FanOut(FanOutErrors),
}

impl ConsumeError {
    /// Convenience constructor for a named stage failure.
    pub fn component(name: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::Component {
            name: name.into(),
            message: message.to_string(),
        }
    }
}

/// Collected failures from one fan-out call, in downstream list order.
#[derive(Debug, Default)]
pub struct FanOutErrors(pub Vec<ConsumeError>);

impl fmt::Display for FanOutErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} downstream consumer(s) failed: ", self.0.len())?;
        for (i, err) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, "; ")?;
            }
            write!(f, "{err}")?;
        }
        Ok(())
    }
}

/// Error from a component lifecycle operation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ComponentError {
    /// Startup failed; the component never became operational.
    #[error("start failed: {0}")]
    Start(String),

    /// Graceful shutdown failed; buffered data may have been lost.
    #[error("shutdown failed: {0}")]
    Shutdown(String),

    /// The component hit an unrecoverable runtime condition and asks the
    /// host to bring the whole collector down.
    #[error("fatal: {0}")]
    Fatal(String),
}

/// Error from a factory `create_*` call.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FactoryError {
    /// The factory does not produce components for the requested signal.
    ///
    /// This is a first-class non-error outcome: the builder skips the
    /// wiring instead of failing, unless a pipeline explicitly demanded
    /// that signal from the component.
    #[error("data type is not supported")]
    DataTypeUnsupported,

    /// The supplied config is invalid for this factory.
    #[error("{0}")]
    InvalidConfig(String),
}
