//! Serialized form of operator state.
//!
//! Payloads are stored as [ScalarValue]s so state written by one execution
//! strategy can be restored by the other.

use ripple_arrow::scalar_value::ScalarValue;
use ripple_batch::{EventKind, SyncTime};
use ripple_state::PartitionTable;

use crate::lane::Timer;
use crate::{OperatorKind, Side};

#[derive(Debug, serde::Serialize, serde::Deserialize)]
pub(crate) struct OperatorState {
    pub kind: OperatorKind,
    pub low_watermark: [SyncTime; 2],
    pub output_low_watermark: SyncTime,
    pub next_id: u64,
    pub partitions: PartitionTable,
    pub lanes: Vec<LaneState>,
}

#[derive(Debug, serde::Serialize, serde::Deserialize)]
pub(crate) struct LaneState {
    pub key: u64,
    pub sides: [SideSnapshot; 2],
    pub entries: Vec<EntryState>,
    /// `(left id, right id, start)` of open matches.
    pub matches: Vec<(u64, u64, SyncTime)>,
    pub timers: Vec<Timer>,
    pub ready: Vec<RowState>,
    pub last_punctuation: SyncTime,
    pub finished: bool,
}

#[derive(Debug, serde::Serialize, serde::Deserialize)]
pub(crate) struct SideSnapshot {
    pub queue: Vec<EventState>,
    pub last_sync: SyncTime,
    pub punctuation: SyncTime,
}

#[derive(Debug, serde::Serialize, serde::Deserialize)]
pub(crate) struct EventState {
    pub kind: EventKind,
    pub key: u64,
    pub sync_time: SyncTime,
    pub other_time: SyncTime,
    pub payload: ScalarValue,
}

#[derive(Debug, serde::Serialize, serde::Deserialize)]
pub(crate) struct EntryState {
    pub key: u64,
    pub id: u64,
    pub side: Side,
    pub start: SyncTime,
    pub end: SyncTime,
    pub payload: ScalarValue,
    pub held: bool,
    pub matched: bool,
}

#[derive(Debug, serde::Serialize, serde::Deserialize)]
pub(crate) struct RowState {
    pub seq: u64,
    pub kind: EventKind,
    pub key: u64,
    pub sync_time: SyncTime,
    pub other_time: SyncTime,
    pub payload: PayloadState,
}

#[derive(Debug, serde::Serialize, serde::Deserialize)]
pub(crate) enum PayloadState {
    Null,
    Single(ScalarValue),
    Pair(ScalarValue, Option<ScalarValue>),
}
