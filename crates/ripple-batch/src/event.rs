use ripple_arrow::scalar_value::ScalarValue;

use crate::{Error, SyncTime};

/// The shape of an event row.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize,
)]
#[repr(u8)]
pub enum EventKind {
    /// Opens an interval whose end is not yet known.
    ///
    /// The other time is `INFINITY`.
    Start = 0,
    /// Closes an interval opened by a start edge.
    ///
    /// The sync time is the end of the interval and the other time is the
    /// start of the interval being closed.
    End = 1,
    /// An interval `[sync_time, other_time)`. Points have a duration of one.
    Interval = 2,
    /// No more data at or before the sync time on this stream (or on the
    /// partition identified by the key, for partitioned streams).
    Punctuation = 3,
    /// No more data at or before the sync time on any partition.
    LowWatermark = 4,
}

impl EventKind {
    pub fn is_marker(self) -> bool {
        matches!(self, EventKind::Punctuation | EventKind::LowWatermark)
    }

    pub fn is_data(self) -> bool {
        !self.is_marker()
    }
}

impl TryFrom<u8> for EventKind {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(EventKind::Start),
            1 => Ok(EventKind::End),
            2 => Ok(EventKind::Interval),
            3 => Ok(EventKind::Punctuation),
            4 => Ok(EventKind::LowWatermark),
            invalid => Err(Error::InvalidKind(invalid)),
        }
    }
}

/// A single event in row form.
///
/// This is the unit of ingress and of per-event egress. Within execution
/// events travel in [DataBatch](crate::DataBatch)es.
#[derive(Clone, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct StreamEvent {
    pub sync_time: SyncTime,
    pub other_time: SyncTime,
    pub kind: EventKind,
    /// The partition (or grouping) key. Zero for non-partitioned markers.
    pub key: u64,
    /// Null for markers.
    pub payload: ScalarValue,
}

impl StreamEvent {
    /// An event occupying the single tick `[time, time + 1)`.
    pub fn point(key: u64, time: i64, payload: impl Into<ScalarValue>) -> Self {
        Self::interval(key, time, time.saturating_add(1), payload)
    }

    pub fn interval(key: u64, start: i64, end: i64, payload: impl Into<ScalarValue>) -> Self {
        Self {
            sync_time: SyncTime::new(start),
            other_time: SyncTime::new(end),
            kind: EventKind::Interval,
            key,
            payload: payload.into(),
        }
    }

    pub fn start(key: u64, start: i64, payload: impl Into<ScalarValue>) -> Self {
        Self {
            sync_time: SyncTime::new(start),
            other_time: SyncTime::INFINITY,
            kind: EventKind::Start,
            key,
            payload: payload.into(),
        }
    }

    /// An end edge closing the interval that started at `start`.
    pub fn end(key: u64, end: i64, start: i64, payload: impl Into<ScalarValue>) -> Self {
        Self {
            sync_time: SyncTime::new(end),
            other_time: SyncTime::new(start),
            kind: EventKind::End,
            key,
            payload: payload.into(),
        }
    }

    /// A punctuation for a non-partitioned stream.
    pub fn punctuation(time: i64) -> Self {
        Self::marker(EventKind::Punctuation, 0, SyncTime::new(time))
    }

    /// A punctuation for a single partition of a partitioned stream.
    pub fn partition_punctuation(key: u64, time: i64) -> Self {
        Self::marker(EventKind::Punctuation, key, SyncTime::new(time))
    }

    pub fn low_watermark(time: i64) -> Self {
        Self::marker(EventKind::LowWatermark, 0, SyncTime::new(time))
    }

    pub fn marker(kind: EventKind, key: u64, time: SyncTime) -> Self {
        debug_assert!(kind.is_marker());
        Self {
            sync_time: time,
            other_time: SyncTime::PUNCTUATION_OTHER,
            kind,
            key,
            payload: ScalarValue::Null,
        }
    }

    pub fn is_marker(&self) -> bool {
        self.kind.is_marker()
    }

    /// The time the underlying interval started.
    pub fn start_time(&self) -> SyncTime {
        match self.kind {
            EventKind::End => self.other_time,
            _ => self.sync_time,
        }
    }

    /// The time the underlying interval ends, if known.
    pub fn end_time(&self) -> SyncTime {
        match self.kind {
            EventKind::Interval => self.other_time,
            EventKind::End => self.sync_time,
            _ => SyncTime::INFINITY,
        }
    }
}

impl std::fmt::Display for StreamEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.kind {
            EventKind::Interval if self.other_time == self.sync_time.succ() => {
                write!(f, "point({}, {}, {})", self.key, self.sync_time, self.payload)
            }
            EventKind::Interval => write!(
                f,
                "interval({}, [{}, {}), {})",
                self.key, self.sync_time, self.other_time, self.payload
            ),
            EventKind::Start => {
                write!(f, "start({}, {}, {})", self.key, self.sync_time, self.payload)
            }
            EventKind::End => write!(
                f,
                "end({}, {}, {}, {})",
                self.key, self.sync_time, self.other_time, self.payload
            ),
            EventKind::Punctuation => write!(f, "punctuation({}, {})", self.key, self.sync_time),
            EventKind::LowWatermark => write!(f, "low_watermark({})", self.sync_time),
        }
    }
}
