//! In-memory rollup of conversion telemetry.

use std::collections::BTreeMap;

use convertly_types::{Event, EventKind, MetricsSnapshot};
use parking_lot::RwLock;

/// Counter state owned by the lock. Updated as one unit per event so a
/// reader never sees `total_conversions` without its `by_format` entry.
#[derive(Debug, Default)]
struct Counters {
    total_conversions: u64,
    errors: u64,
    by_format: BTreeMap<String, u64>,
    last_event_ts: Option<u64>,
}

/// The aggregate conversion counters.
///
/// One logical writer (the consumer task) calls [`apply`](Aggregator::apply);
/// any number of HTTP handlers call [`snapshot`](Aggregator::snapshot)
/// concurrently. State is process-lifetime only.
#[derive(Debug, Default)]
pub struct Aggregator {
    inner: RwLock<Counters>,
}

impl Aggregator {
    /// Create an empty aggregator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one event into the counters.
    ///
    /// `last_event_ts` is overwritten unconditionally, including by
    /// out-of-order events. A success with a missing or blank
    /// `output_format` counts toward `total_conversions` but not toward any
    /// `by_format` entry, so the two can legitimately diverge; dashboards
    /// rely on this accounting. Unknown kinds update the timestamp only.
    pub fn apply(&self, event: &Event) {
        let mut inner = self.inner.write();
        inner.last_event_ts = Some(event.ts);

        match &event.kind {
            EventKind::ConvertSuccess => {
                inner.total_conversions += 1;
                if let Some(format) = &event.details.output_format {
                    let format = format.to_lowercase();
                    if !format.is_empty() {
                        *inner.by_format.entry(format).or_insert(0) += 1;
                    }
                }
            }
            EventKind::ConvertError => {
                inner.errors += 1;
            }
            EventKind::Other(_) => {}
        }
    }

    /// Copy the current counters into an immutable snapshot.
    pub fn snapshot(&self) -> MetricsSnapshot {
        let inner = self.inner.read();
        MetricsSnapshot {
            total_conversions: inner.total_conversions,
            errors: inner.errors,
            by_format: inner.by_format.clone(),
            last_event_ts: inner.last_event_ts,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use convertly_types::EventDetails;

    fn success(ts: u64, format: Option<&str>) -> Event {
        let details = match format {
            Some(f) => EventDetails::new().output_format(f),
            None => EventDetails::new(),
        };
        Event::new("image-service", EventKind::ConvertSuccess, ts, details)
    }

    fn error(ts: u64) -> Event {
        Event::new(
            "image-service",
            EventKind::ConvertError,
            ts,
            EventDetails::new().error("boom"),
        )
    }

    #[test]
    fn empty_aggregator_serves_zeroes() {
        let agg = Aggregator::new();
        let snap = agg.snapshot();
        assert_eq!(snap, MetricsSnapshot::new());
        assert_eq!(snap.last_event_ts, None);
    }

    #[test]
    fn success_error_success_scenario() {
        let agg = Aggregator::new();
        agg.apply(&success(100, Some("png")));
        agg.apply(&success(101, Some("png")));
        agg.apply(&error(102));

        let snap = agg.snapshot();
        assert_eq!(snap.total_conversions, 2);
        assert_eq!(snap.errors, 1);
        assert_eq!(snap.by_format.get("png"), Some(&2));
        assert_eq!(snap.by_format.len(), 1);
        assert_eq!(snap.last_event_ts, Some(102));
    }

    #[test]
    fn success_without_format_counts_total_only() {
        let agg = Aggregator::new();
        agg.apply(&success(50, None));

        let snap = agg.snapshot();
        assert_eq!(snap.total_conversions, 1);
        assert_eq!(snap.errors, 0);
        assert!(snap.by_format.is_empty());
        assert_eq!(snap.last_event_ts, Some(50));
    }

    #[test]
    fn empty_format_counts_total_only() {
        let agg = Aggregator::new();
        agg.apply(&success(60, Some("")));

        let snap = agg.snapshot();
        assert_eq!(snap.total_conversions, 1);
        assert!(snap.by_format.is_empty());
    }

    #[test]
    fn format_keys_are_lowercased() {
        let agg = Aggregator::new();
        agg.apply(&success(1, Some("PNG")));
        agg.apply(&success(2, Some("png")));
        agg.apply(&success(3, Some("Png")));

        let snap = agg.snapshot();
        assert_eq!(snap.by_format.get("png"), Some(&3));
        assert_eq!(snap.by_format.len(), 1);
    }

    #[test]
    fn unknown_kind_updates_timestamp_only() {
        let agg = Aggregator::new();
        agg.apply(&success(10, Some("webp")));
        agg.apply(&Event::new(
            "pdf-service",
            EventKind::Other("convert_retry".into()),
            11,
            EventDetails::new(),
        ));

        let snap = agg.snapshot();
        assert_eq!(snap.total_conversions, 1);
        assert_eq!(snap.errors, 0);
        assert_eq!(snap.last_event_ts, Some(11));
    }

    #[test]
    fn timestamp_is_overwritten_by_out_of_order_events() {
        let agg = Aggregator::new();
        agg.apply(&success(100, Some("png")));
        agg.apply(&success(90, Some("png")));

        assert_eq!(agg.snapshot().last_event_ts, Some(90));
    }

    #[test]
    fn counts_match_event_sequence_regardless_of_interleaving() {
        let agg = Aggregator::new();
        let events = vec![
            success(1, Some("png")),
            error(2),
            Event::new("x", EventKind::Other("noise".into()), 3, EventDetails::new()),
            success(4, Some("jpeg")),
            error(5),
            success(6, None),
            success(7, Some("PNG")),
        ];
        for event in &events {
            agg.apply(event);
        }

        let snap = agg.snapshot();
        assert_eq!(snap.total_conversions, 4);
        assert_eq!(snap.errors, 2);
        // Formats: png x2, jpeg x1; the format-less success is excluded
        assert_eq!(snap.format_total(), 3);
        assert_eq!(snap.last_event_ts, Some(7));
    }

    #[test]
    fn concurrent_snapshots_never_see_torn_counters() {
        use std::sync::Arc;
        use std::thread;

        let agg = Arc::new(Aggregator::new());

        let writer = {
            let agg = agg.clone();
            thread::spawn(move || {
                for i in 0..1000u64 {
                    agg.apply(&success(i, Some("png")));
                }
            })
        };

        let readers: Vec<_> = (0..4)
            .map(|_| {
                let agg = agg.clone();
                thread::spawn(move || {
                    for _ in 0..500 {
                        let snap = agg.snapshot();
                        // Every success carries a format, so the pair must
                        // always agree
                        assert_eq!(snap.total_conversions, snap.format_total());
                    }
                })
            })
            .collect();

        writer.join().unwrap();
        for r in readers {
            r.join().unwrap();
        }

        let snap = agg.snapshot();
        assert_eq!(snap.total_conversions, 1000);
        assert_eq!(snap.by_format.get("png"), Some(&1000));
    }
}
