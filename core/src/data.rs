//! Telemetry payload types flowing through pipelines.
//!
//! A batch is either a [`TraceData`] (a node descriptor plus spans) or a
//! [`MetricsData`] (a node descriptor plus metric families). Batches are
//! treated as immutable once handed to the first consumer; a stage that
//! needs to modify one must build a new batch.

use bytes::Bytes;
use std::collections::BTreeMap;

/// Label name carrying the metric family name in scraped samples.
pub const METRIC_NAME_LABEL: &str = "__name__";
/// Label name carrying the scrape job.
pub const JOB_LABEL: &str = "job";
/// Label name carrying the scrape target instance (`host[:port]`).
pub const INSTANCE_LABEL: &str = "instance";
/// Label name carrying the scrape scheme, set on a target's shared labels.
pub const SCHEME_LABEL: &str = "__scheme__";

/// Node attribute key for the target port.
pub const PORT_ATTR: &str = "port";
/// Node attribute key for the scrape scheme.
pub const SCHEME_ATTR: &str = "scheme";

/// Identity of a data source: service name, host, and free-form attributes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Node {
    /// Logical service name (for scraped metrics, the job).
    pub service_name: String,
    /// Host the data originated from.
    pub host_name: String,
    /// Additional identifying attributes (port, scheme, ...).
    pub attributes: BTreeMap<String, String>,
}

impl Node {
    /// Create a node with no attributes.
    pub fn new(service_name: impl Into<String>, host_name: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
            host_name: host_name.into(),
            attributes: BTreeMap::new(),
        }
    }

    /// Add an attribute, builder style.
    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }
}

/// A single span within a trace batch.
///
/// Identifiers are opaque byte strings so the collector never interprets
/// them; `Bytes` keeps clones cheap when batches fan out.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Span {
    /// Trace this span belongs to.
    pub trace_id: Bytes,
    /// Identifier of this span.
    pub span_id: Bytes,
    /// Operation name.
    pub name: String,
    /// Start time, nanoseconds since the unix epoch.
    pub start_unix_ns: u64,
    /// End time, nanoseconds since the unix epoch.
    pub end_unix_ns: u64,
    /// Span attributes.
    pub attributes: BTreeMap<String, String>,
}

/// One trace batch: the unit handed between pipeline stages.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TraceData {
    /// Origin of the spans.
    pub node: Node,
    /// Spans in the batch.
    pub spans: Vec<Span>,
}

/// The shape of a metric family.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum MetricKind {
    /// Monotonically increasing cumulative value.
    Counter,
    /// Point-in-time value.
    Gauge,
    /// No declared type.
    #[default]
    Untyped,
}

/// One data point of a metric family.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    /// Labels distinguishing this timeseries within the family.
    pub labels: Labels,
    /// Observation time, milliseconds since the unix epoch.
    pub timestamp_ms: i64,
    /// Start of the cumulative interval, when known (set by adjustment).
    pub start_timestamp_ms: Option<i64>,
    /// Observed value.
    pub value: f64,
}

/// A named group of samples sharing one metric name and kind.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricFamily {
    /// Metric family name.
    pub name: String,
    /// Declared kind from target metadata.
    pub kind: MetricKind,
    /// Data points.
    pub samples: Vec<Sample>,
}

/// One metrics batch: the unit handed between pipeline stages.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetricsData {
    /// Origin of the metrics.
    pub node: Node,
    /// Metric families in the batch.
    pub metrics: Vec<MetricFamily>,
}

/// An ordered set of labels attached to a scraped sample.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Labels(BTreeMap<String, String>);

impl Labels {
    /// Create an empty label set.
    pub fn new() -> Self {
        Self(BTreeMap::new())
    }

    /// Look up a label value; absent labels read as `""`, like the
    /// prometheus data model.
    pub fn get(&self, name: &str) -> &str {
        self.0.get(name).map(String::as_str).unwrap_or("")
    }

    /// Insert or replace a label.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.0.insert(name.into(), value.into());
    }

    /// Insert a label, builder style.
    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(name, value);
        self
    }

    /// Iterate labels in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Number of labels.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the set is empty.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Labels {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}
