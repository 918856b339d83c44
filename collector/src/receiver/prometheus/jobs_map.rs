//! Per-target state persisted between scrape rounds, and the staleness
//! adjuster built on top of it.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt::Write;
use std::sync::Arc;
use virta_core::MetricFamily;

/// First/last observation times of one timeseries.
#[derive(Debug, Clone, Copy)]
struct SeriesInfo {
    start_ms: i64,
    last_ms: i64,
}

/// Timeseries bookkeeping for one `(job, instance)` target.
#[derive(Debug, Default)]
pub struct TimeseriesState {
    series: HashMap<String, SeriesInfo>,
}

/// One entry per `(job, instance)`, shared across scrape rounds.
///
/// The outer map takes a coarse lock; writes happen once per scrape round
/// per target, so contention is not a concern. Per-target state is locked
/// independently while a commit adjusts its samples.
#[derive(Default)]
pub struct JobsMap {
    targets: Mutex<HashMap<(String, String), Arc<Mutex<TimeseriesState>>>>,
}

impl JobsMap {
    /// Create an empty map.
    pub fn new() -> Self {
        Self::default()
    }

    /// The persistent state for `(job, instance)`, created on first use.
    pub fn get(&self, job: &str, instance: &str) -> Arc<Mutex<TimeseriesState>> {
        let mut targets = self.targets.lock();
        Arc::clone(
            targets
                .entry((job.to_string(), instance.to_string()))
                .or_default(),
        )
    }

    /// Number of tracked targets.
    pub fn len(&self) -> usize {
        self.targets.lock().len()
    }

    /// Whether any target is tracked.
    pub fn is_empty(&self) -> bool {
        self.targets.lock().is_empty()
    }
}

/// Rewrites one commit's families against the previous rounds' state:
/// stamps start timestamps on known series and drops samples whose
/// timestamp does not advance past the last seen one (stale replays).
pub struct MetricsAdjuster {
    state: Arc<Mutex<TimeseriesState>>,
}

impl MetricsAdjuster {
    /// Adjuster over one target's persistent state.
    pub fn new(state: Arc<Mutex<TimeseriesState>>) -> Self {
        Self { state }
    }

    /// Adjust the families of one commit. Families left without samples
    /// are removed; the result may be empty.
    pub fn adjust(&self, families: Vec<MetricFamily>) -> Vec<MetricFamily> {
        let mut state = self.state.lock();
        families
            .into_iter()
            .filter_map(|mut family| {
                family.samples.retain_mut(|sample| {
                    let key = series_key(&family.name, sample);
                    match state.series.get_mut(&key) {
                        None => {
                            state.series.insert(
                                key,
                                SeriesInfo {
                                    start_ms: sample.timestamp_ms,
                                    last_ms: sample.timestamp_ms,
                                },
                            );
                            sample.start_timestamp_ms = Some(sample.timestamp_ms);
                            true
                        }
                        Some(info) => {
                            if sample.timestamp_ms <= info.last_ms {
                                return false;
                            }
                            sample.start_timestamp_ms = Some(info.start_ms);
                            info.last_ms = sample.timestamp_ms;
                            true
                        }
                    }
                });
                if family.samples.is_empty() {
                    None
                } else {
                    Some(family)
                }
            })
            .collect()
    }
}

fn series_key(family: &str, sample: &virta_core::Sample) -> String {
    let mut key = String::from(family);
    for (name, value) in sample.labels.iter() {
        // labels iterate in name order, so the key is canonical
        let _ = write!(key, "|{name}={value}");
    }
    key
}
