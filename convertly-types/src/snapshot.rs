//! MetricsSnapshot - a point-in-time view of the conversion rollup.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// A point-in-time copy of the aggregated conversion counters.
///
/// This is the exact body served by the stats service's read endpoint.
/// `last_event_ts` serializes as `null` until the first event is seen, so it
/// is deliberately not skipped when `None`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    /// Successful conversions processed since startup.
    pub total_conversions: u64,

    /// Failed conversions processed since startup.
    pub errors: u64,

    /// Successful conversions per lowercase output format.
    pub by_format: BTreeMap<String, u64>,

    /// Timestamp of the most recently processed event, any kind.
    pub last_event_ts: Option<u64>,
}

impl MetricsSnapshot {
    /// An empty snapshot, as served before any event arrives.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sum of the per-format counts.
    ///
    /// This can be less than `total_conversions`: successes with a missing or
    /// blank output format are counted in the total but not per format.
    pub fn format_total(&self) -> u64 {
        self.by_format.values().sum()
    }
}
