//! Target metadata and the per-target metric builder.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use virta_core::{
    INSTANCE_LABEL, JOB_LABEL, Labels, METRIC_NAME_LABEL, MetricFamily, MetricKind, Sample,
};

use super::ScrapeError;

/// Schema knowledge about one scrape target: its shared labels (scheme,
/// ...) and the declared kind of each known metric family.
#[derive(Debug, Clone, Default)]
pub struct TargetMetadata {
    /// Labels shared by every sample of the target.
    pub shared_labels: Labels,
    /// Declared family kinds; families not listed read as untyped.
    pub families: HashMap<String, MetricKind>,
}

impl TargetMetadata {
    /// The declared kind of a family, `Untyped` when unknown.
    pub fn kind_of(&self, family: &str) -> MetricKind {
        self.families.get(family).copied().unwrap_or_default()
    }
}

/// Resolves metadata for a scrape target. Implementations are owned by
/// the receiver; the transaction only sees this interface.
pub trait MetadataService: Send + Sync {
    /// Metadata for `(job, instance)`, or
    /// [`ScrapeError::MetadataUnknown`] for targets this receiver does
    /// not know.
    fn get(&self, job: &str, instance: &str) -> Result<Arc<TargetMetadata>, ScrapeError>;
}

/// Metadata service treating every family as untyped, with a fixed set of
/// shared labels. Used when the scrape config carries no schema.
pub struct StaticMetadataService {
    metadata: Arc<TargetMetadata>,
}

impl StaticMetadataService {
    /// Create a service whose targets share the given labels.
    pub fn new(shared_labels: Labels) -> Self {
        Self {
            metadata: Arc::new(TargetMetadata {
                shared_labels,
                families: HashMap::new(),
            }),
        }
    }
}

impl MetadataService for StaticMetadataService {
    fn get(&self, _job: &str, _instance: &str) -> Result<Arc<TargetMetadata>, ScrapeError> {
        Ok(Arc::clone(&self.metadata))
    }
}

/// Accumulates one scrape's samples into metric families.
pub struct MetricBuilder {
    metadata: Arc<TargetMetadata>,
    families: BTreeMap<String, MetricFamily>,
    num_samples: u64,
}

impl MetricBuilder {
    /// Builder for one transaction against `metadata`'s target.
    pub fn new(metadata: Arc<TargetMetadata>) -> Self {
        Self {
            metadata,
            families: BTreeMap::new(),
            num_samples: 0,
        }
    }

    /// Append one sample. The family name comes from the `__name__`
    /// label; reserved labels are stripped from the stored sample.
    pub fn add_sample(
        &mut self,
        labels: &Labels,
        timestamp_ms: i64,
        value: f64,
    ) -> Result<(), ScrapeError> {
        let name = labels.get(METRIC_NAME_LABEL);
        if name.is_empty() {
            return Err(ScrapeError::MetricNameMissing);
        }

        let stripped: Labels = labels
            .iter()
            .filter(|(k, _)| !k.starts_with("__") && *k != JOB_LABEL && *k != INSTANCE_LABEL)
            .collect();

        let kind = self.metadata.kind_of(name);
        let family = self
            .families
            .entry(name.to_string())
            .or_insert_with(|| MetricFamily {
                name: name.to_string(),
                kind,
                samples: Vec::new(),
            });
        family.samples.push(Sample {
            labels: stripped,
            timestamp_ms,
            start_timestamp_ms: None,
            value,
        });
        self.num_samples += 1;
        Ok(())
    }

    /// Finalise into families, returning `(families, kept, dropped)`
    /// sample counts.
    pub fn build(self) -> (Vec<MetricFamily>, u64, u64) {
        let families: Vec<MetricFamily> = self.families.into_values().collect();
        let kept: u64 = families.iter().map(|f| f.samples.len() as u64).sum();
        (families, kept, self.num_samples - kept)
    }
}
