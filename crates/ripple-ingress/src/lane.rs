use std::collections::BTreeMap;

use ripple_arrow::scalar_value::ScalarValue;
use ripple_batch::{EventKind, StreamEvent, SyncTime};
use ripple_state::{HasPriority, MinHeap};

use crate::PeriodicPunctuationPolicy;

/// An event waiting in the reorder buffer.
#[derive(Debug)]
pub(crate) struct Buffered {
    /// Arrival order, used to break ties between events with the same time.
    pub seq: u64,
    pub event: StreamEvent,
}

impl HasPriority for Buffered {
    type Priority = (SyncTime, u64);

    fn priority(&self) -> Self::Priority {
        (self.event.sync_time, self.seq)
    }
}

/// Identifies the start edge an end edge closes: key, original start time
/// and payload.
pub(crate) type StartEdge = (u64, SyncTime, ScalarValue);

/// Reorder state of a single partition, or of the whole stream if it is not
/// partitioned.
#[derive(Debug)]
pub(crate) struct Lane {
    /// The latest sync time accepted on this lane.
    pub high_water_mark: SyncTime,
    /// The latest punctuation emitted on this lane.
    pub last_marker: SyncTime,
    /// Everything at or before this time has been released by a flush.
    pub released_to: SyncTime,
    /// Start edges moved forward by the `Adjust` policy, with the times they
    /// were moved to, oldest first.
    pub adjusted_starts: BTreeMap<StartEdge, Vec<SyncTime>>,
    /// Quantized time of the first released event. Punctuations are only
    /// generated for boundaries past this.
    pub punctuation_baseline: Option<SyncTime>,
    pub buffer: MinHeap<Buffered>,
}

impl Lane {
    pub fn new() -> Self {
        Self {
            high_water_mark: SyncTime::MIN,
            last_marker: SyncTime::MIN,
            released_to: SyncTime::MIN,
            adjusted_starts: BTreeMap::new(),
            punctuation_baseline: None,
            buffer: MinHeap::default(),
        }
    }

    /// The earliest sync time an arriving event may have.
    ///
    /// Saturates near the minimum time rather than wrapping.
    pub fn bound(&self, reorder_latency: i64, low_watermark: SyncTime) -> SyncTime {
        self.high_water_mark
            .saturating_sub(reorder_latency)
            .max(self.last_marker)
            .max(self.released_to)
            .max(low_watermark)
    }

    /// Remember that the start edge `edge` was moved to `adjusted`.
    pub fn record_adjusted_start(&mut self, edge: StartEdge, adjusted: SyncTime) {
        self.adjusted_starts.entry(edge).or_default().push(adjusted);
    }

    /// The time the start edge closed by an end edge was moved to, if it was
    /// adjusted. Each adjusted start is closed at most once.
    pub fn take_adjusted_start(&mut self, edge: &StartEdge) -> Option<SyncTime> {
        let times = self.adjusted_starts.get_mut(edge)?;
        let adjusted = times.remove(0);
        if times.is_empty() {
            self.adjusted_starts.remove(edge);
        }
        Some(adjusted)
    }

    pub fn accept(&mut self, seq: u64, event: StreamEvent) {
        self.high_water_mark = self.high_water_mark.max(event.sync_time);
        self.buffer.push(Buffered { seq, event });
    }

    /// Release buffered events with sync time at or before `up_to`.
    ///
    /// Generated punctuations are interleaved before the event that crossed
    /// the boundary. Each released row is paired with the arrival sequence of
    /// the event that caused it.
    pub fn release(
        &mut self,
        key: u64,
        up_to: SyncTime,
        low_watermark: SyncTime,
        policy: &PeriodicPunctuationPolicy,
        released: &mut Vec<(u64, StreamEvent)>,
    ) {
        while let Some(Buffered { seq, event }) = self.buffer.pop_if(|(time, _)| *time <= up_to) {
            if let PeriodicPunctuationPolicy::Time { period } = policy {
                let boundary = event.sync_time.quantize(*period);
                match self.punctuation_baseline {
                    None => self.punctuation_baseline = Some(boundary),
                    Some(baseline) => {
                        if boundary > baseline.max(self.last_marker).max(low_watermark) {
                            self.last_marker = boundary;
                            self.punctuation_baseline = Some(boundary);
                            released.push((seq, StreamEvent::marker(EventKind::Punctuation, key, boundary)));
                        }
                    }
                }
            }
            released.push((seq, event));
        }
    }

    /// Whether this lane holds no events and no adjusted start edges waiting
    /// for their end.
    pub fn is_quiescent(&self) -> bool {
        self.buffer.is_empty() && self.adjusted_starts.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn times(released: &[(u64, StreamEvent)]) -> Vec<String> {
        released.iter().map(|(_, event)| event.to_string()).collect()
    }

    #[test]
    fn test_release_in_time_then_arrival_order() {
        let mut lane = Lane::new();
        lane.accept(0, StreamEvent::point(0, 10, 1i64));
        lane.accept(1, StreamEvent::point(0, 5, 2i64));
        lane.accept(2, StreamEvent::point(0, 5, 3i64));

        let mut released = Vec::new();
        lane.release(0, SyncTime::new(5), SyncTime::MIN, &PeriodicPunctuationPolicy::None, &mut released);
        assert_eq!(times(&released), vec!["point(0, 5, 2i64)", "point(0, 5, 3i64)"]);
        assert!(!lane.is_quiescent());
        assert_eq!(lane.high_water_mark, SyncTime::new(10));
    }

    #[test]
    fn test_bound_saturates() {
        let mut lane = Lane::new();
        assert_eq!(lane.bound(500, SyncTime::MIN), SyncTime::MIN);
        lane.accept(0, StreamEvent::point(0, -10, 1i64));
        assert_eq!(lane.bound(i64::MAX, SyncTime::MIN), SyncTime::MIN);
        assert_eq!(lane.bound(500, SyncTime::new(100)), SyncTime::new(100));
    }

    #[test]
    fn test_flush_raises_bound() {
        let mut lane = Lane::new();
        lane.accept(0, StreamEvent::point(0, 10, 1i64));
        assert_eq!(lane.bound(100, SyncTime::MIN), SyncTime::MIN);
        lane.released_to = lane.high_water_mark;
        assert_eq!(lane.bound(100, SyncTime::MIN), SyncTime::new(10));
    }

    #[test]
    fn test_adjusted_starts_closed_once() {
        let mut lane = Lane::new();
        let edge = (1, SyncTime::new(3), ScalarValue::from(1i64));
        lane.record_adjusted_start(edge.clone(), SyncTime::new(10));
        lane.record_adjusted_start(edge.clone(), SyncTime::new(12));
        assert!(!lane.is_quiescent());

        assert_eq!(lane.take_adjusted_start(&edge), Some(SyncTime::new(10)));
        assert_eq!(lane.take_adjusted_start(&edge), Some(SyncTime::new(12)));
        assert_eq!(lane.take_adjusted_start(&edge), None);
        assert!(lane.is_quiescent());
    }

    #[test]
    fn test_generated_punctuation() {
        let policy = PeriodicPunctuationPolicy::Time { period: 100 };
        let mut lane = Lane::new();
        for (seq, time) in [5, 50, 120, 130, 350].into_iter().enumerate() {
            lane.accept(seq as u64, StreamEvent::point(7, time, 0i64));
        }

        let mut released = Vec::new();
        lane.release(7, SyncTime::INFINITY, SyncTime::MIN, &policy, &mut released);
        assert_eq!(
            times(&released),
            vec![
                "point(7, 5, 0i64)",
                "point(7, 50, 0i64)",
                "punctuation(7, 100)",
                "point(7, 120, 0i64)",
                "point(7, 130, 0i64)",
                "punctuation(7, 300)",
                "point(7, 350, 0i64)",
            ]
        );
    }
}
