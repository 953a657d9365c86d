use std::collections::{BTreeMap, BTreeSet, VecDeque};

use ripple_batch::{EventKind, SyncTime};
use ripple_state::{HasPriority, MinHeap};

use crate::equality::EqualityFn;
use crate::output::{OutPayload, OutRow};
use crate::Side;

/// A data event waiting to be processed.
#[derive(Clone, Debug)]
pub(crate) struct InputEvent<P> {
    pub kind: EventKind,
    pub key: u64,
    pub sync_time: SyncTime,
    pub other_time: SyncTime,
    pub payload: P,
}

/// An interval (or open start edge) that is still alive.
#[derive(Clone, Debug)]
pub(crate) struct Entry<P> {
    pub side: Side,
    pub start: SyncTime,
    /// `INFINITY` until the end edge arrives.
    pub end: SyncTime,
    pub payload: P,
    /// Whether the entry may still produce output starting at `start`. Held
    /// entries delay all later output of the lane.
    pub held: bool,
    pub matched: bool,
}

impl<P> Entry<P> {
    pub fn is_open(&self) -> bool {
        self.end.is_infinite()
    }
}

/// Retires the entry at the end of its interval.
#[derive(Clone, Copy, Debug, serde::Serialize, serde::Deserialize)]
pub(crate) struct Timer {
    pub time: SyncTime,
    pub key: u64,
    pub id: u64,
}

impl HasPriority for Timer {
    type Priority = (SyncTime, u64);

    fn priority(&self) -> Self::Priority {
        (self.time, self.id)
    }
}

/// An output row waiting for held entries with earlier start times.
#[derive(Debug)]
pub(crate) struct Ready<P> {
    pub seq: u64,
    pub row: OutRow<P>,
}

impl<P> HasPriority for Ready<P> {
    type Priority = (SyncTime, u64);

    fn priority(&self) -> Self::Priority {
        (self.row.sync_time, self.seq)
    }
}

#[derive(Debug)]
pub(crate) struct SideState<P> {
    pub queue: VecDeque<InputEvent<P>>,
    /// The latest sync time received on this side.
    pub last_sync: SyncTime,
    pub punctuation: SyncTime,
}

impl<P> SideState<P> {
    fn new() -> Self {
        Self {
            queue: VecDeque::new(),
            last_sync: SyncTime::MIN,
            punctuation: SyncTime::MIN,
        }
    }

    pub fn push(&mut self, event: InputEvent<P>) {
        self.last_sync = self.last_sync.max(event.sync_time);
        self.queue.push_back(event);
    }

    /// Every later event on this side has a sync time at least this.
    fn bound(&self, low_watermark: SyncTime) -> SyncTime {
        self.last_sync.max(self.punctuation).max(low_watermark)
    }

    /// The progress asserted by the markers received on this side.
    fn progress(&self, low_watermark: SyncTime) -> SyncTime {
        self.punctuation.max(low_watermark)
    }
}

/// Operator state of a single partition, or of the whole stream if it is
/// not partitioned.
pub(crate) struct Lane<P> {
    pub sides: [SideState<P>; 2],
    pub entries: BTreeMap<(u64, u64), Entry<P>>,
    /// `(start, key, id)` of held entries.
    pub held: BTreeSet<(SyncTime, u64, u64)>,
    /// Open matches from `(left id, right id)` to the start of the match.
    pub matches: BTreeMap<(u64, u64), SyncTime>,
    /// `(right id, left id)` of open matches.
    pub matches_by_right: BTreeSet<(u64, u64)>,
    pub timers: MinHeap<Timer>,
    pub ready: MinHeap<Ready<P>>,
    pub last_punctuation: SyncTime,
    pub finished: bool,
}

impl<P: std::fmt::Debug> std::fmt::Debug for Lane<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Lane")
            .field("queued", &[self.sides[0].queue.len(), self.sides[1].queue.len()])
            .field("entries", &self.entries.len())
            .field("held", &self.held.len())
            .field("ready", &self.ready.len())
            .field("last_punctuation", &self.last_punctuation)
            .field("finished", &self.finished)
            .finish_non_exhaustive()
    }
}

impl<P> Lane<P> {
    pub fn new() -> Self {
        Self {
            sides: [SideState::new(), SideState::new()],
            entries: BTreeMap::new(),
            held: BTreeSet::new(),
            matches: BTreeMap::new(),
            matches_by_right: BTreeSet::new(),
            timers: MinHeap::default(),
            ready: MinHeap::default(),
            last_punctuation: SyncTime::MIN,
            finished: false,
        }
    }

    /// Every step before this time may be processed.
    pub fn safe_time(&self, low_watermark: &[SyncTime; 2]) -> SyncTime {
        self.sides[0]
            .bound(low_watermark[0])
            .min(self.sides[1].bound(low_watermark[1]))
    }

    /// The earliest queued time before `safe`.
    pub fn next_step(&self, safe: SyncTime) -> Option<SyncTime> {
        self.sides
            .iter()
            .filter_map(|side| side.queue.front())
            .map(|event| event.sync_time)
            .filter(|time| *time < safe)
            .min()
    }

    pub fn held_floor(&self) -> SyncTime {
        self.held
            .first()
            .map(|(start, _, _)| *start)
            .unwrap_or(SyncTime::INFINITY)
    }

    /// Every later output row of this lane has a sync time at least this.
    pub fn floor(&self) -> SyncTime {
        let ready = self
            .ready
            .peek_priority()
            .map(|(time, _)| *time)
            .unwrap_or(SyncTime::INFINITY);
        self.held_floor().min(ready)
    }

    /// The time up to which this lane may emit a punctuation.
    pub fn progress(&self, low_watermark: &[SyncTime; 2]) -> SyncTime {
        self.sides[0]
            .progress(low_watermark[0])
            .min(self.sides[1].progress(low_watermark[1]))
            .min(self.floor())
    }

    /// Move ready rows that no held entry precedes to `rows`.
    pub fn release(&mut self, rows: &mut Vec<OutRow<P>>) {
        let floor = self.held_floor();
        while let Some(ready) = self.ready.pop_if(|(time, _)| *time <= floor) {
            rows.push(ready.row);
        }
    }

    /// Drop all intervals and matches.
    pub fn clear_state(&mut self) {
        self.entries.clear();
        self.held.clear();
        self.matches.clear();
        self.matches_by_right.clear();
        self.timers = MinHeap::default();
    }

    /// Whether the lane holds no events, intervals or output.
    pub fn is_quiescent(&self) -> bool {
        self.sides.iter().all(|side| side.queue.is_empty())
            && self.entries.is_empty()
            && self.ready.is_empty()
    }
}

/// The state an operator's logic works on while processing a lane.
pub(crate) struct LaneContext<'a, P> {
    pub lane: &'a mut Lane<P>,
    pub equality: &'a [EqualityFn<P>; 2],
    pub next_id: &'a mut u64,
}

impl<'a, P: Clone> LaneContext<'a, P> {
    fn next_id(&mut self) -> u64 {
        let id = *self.next_id;
        *self.next_id += 1;
        id
    }

    /// Add an entry, returning its id. Entries with a known end are retired
    /// when their end is reached.
    pub fn insert(
        &mut self,
        side: Side,
        key: u64,
        start: SyncTime,
        end: SyncTime,
        payload: P,
        held: bool,
    ) -> u64 {
        let id = self.next_id();
        if !end.is_infinite() {
            self.lane.timers.push(Timer { time: end, key, id });
        }
        if held {
            self.lane.held.insert((start, key, id));
        }
        self.lane.entries.insert(
            (key, id),
            Entry {
                side,
                start,
                end,
                payload,
                held,
                matched: false,
            },
        );
        id
    }

    pub fn entry(&self, key: u64, id: u64) -> Option<&Entry<P>> {
        self.lane.entries.get(&(key, id))
    }

    pub fn remove(&mut self, key: u64, id: u64) -> Option<Entry<P>> {
        let entry = self.lane.entries.remove(&(key, id))?;
        if entry.held {
            self.lane.held.remove(&(entry.start, key, id));
        }
        Some(entry)
    }

    /// Mark an entry as matched. It no longer holds back output.
    pub fn set_matched(&mut self, key: u64, id: u64) {
        if let Some(entry) = self.lane.entries.get_mut(&(key, id)) {
            entry.matched = true;
            if entry.held {
                entry.held = false;
                self.lane.held.remove(&(entry.start, key, id));
            }
        }
    }

    /// Ids of the entries with the given key from one side.
    pub fn entries_of(&self, key: u64, side: Side) -> Vec<u64> {
        self.lane
            .entries
            .range((key, 0)..=(key, u64::MAX))
            .filter(|(_, entry)| entry.side == side)
            .map(|((_, id), _)| *id)
            .collect()
    }

    /// Ids of the held entries that are still open.
    pub fn held_open(&self) -> Vec<(u64, u64)> {
        self.lane
            .held
            .iter()
            .map(|(_, key, id)| (*key, *id))
            .filter(|(key, id)| self.entry(*key, *id).map_or(false, Entry::is_open))
            .collect()
    }

    /// Find the open start edge closed by an end edge.
    pub fn find_open(&self, side: Side, key: u64, start: SyncTime, payload: &P) -> Option<u64> {
        let equal = &self.equality[side.index()];
        self.lane
            .entries
            .range((key, 0)..=(key, u64::MAX))
            .find(|(_, entry)| {
                entry.side == side
                    && entry.is_open()
                    && entry.start == start
                    && equal(&entry.payload, payload)
            })
            .map(|((_, id), _)| *id)
    }

    pub fn open_match(&mut self, left: u64, right: u64, start: SyncTime) {
        self.lane.matches.insert((left, right), start);
        self.lane.matches_by_right.insert((right, left));
    }

    /// Remove the open matches of an entry, returning `(left, right, start)`.
    pub fn take_matches(&mut self, side: Side, id: u64) -> Vec<(u64, u64, SyncTime)> {
        let pairs: Vec<(u64, u64)> = match side {
            Side::Left => self
                .lane
                .matches
                .range((id, 0)..=(id, u64::MAX))
                .map(|(pair, _)| *pair)
                .collect(),
            Side::Right => self
                .lane
                .matches_by_right
                .range((id, 0)..=(id, u64::MAX))
                .map(|(right, left)| (*left, *right))
                .collect(),
        };
        pairs
            .into_iter()
            .filter_map(|(left, right)| {
                self.lane.matches_by_right.remove(&(right, left));
                let start = self.lane.matches.remove(&(left, right))?;
                Some((left, right, start))
            })
            .collect()
    }

    /// Queue an output row.
    ///
    /// An interval with no duration is emitted as an end edge at its start.
    pub fn emit(
        &mut self,
        kind: EventKind,
        key: u64,
        sync_time: SyncTime,
        other_time: SyncTime,
        payload: OutPayload<P>,
    ) {
        debug_assert!(
            kind != EventKind::Interval || sync_time < other_time,
            "empty interval [{sync_time}, {other_time})"
        );
        let (kind, other_time) = if kind == EventKind::Interval && other_time <= sync_time {
            (EventKind::End, sync_time)
        } else {
            (kind, other_time)
        };

        let seq = self.next_id();
        self.lane.ready.push(Ready {
            seq,
            row: OutRow {
                kind,
                key,
                sync_time,
                other_time,
                payload,
            },
        });
    }
}
