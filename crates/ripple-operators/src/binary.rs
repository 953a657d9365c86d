use std::collections::{BTreeMap, BTreeSet};

use error_stack::ResultExt;
use ripple_batch::{BatchPool, DataBatch, EventKind, StreamProperties, SyncTime};
use ripple_state::{Checkpointable, CheckpointReader, CheckpointWriter, PartitionTable};

use crate::equality::EqualityFn;
use crate::lane::{Entry, InputEvent, Lane, LaneContext, Ready};
use crate::logic::Logic;
use crate::output::{build_batches, OutPayload, OutRow, OutputShape};
use crate::state::{
    EntryState, EventState, LaneState, OperatorState, PayloadState, RowState, SideSnapshot,
};
use crate::strategy::{ExecutionMode, ExecutionStrategy};
use crate::{Error, Operator, OperatorKind, Side};

/// Drives the logic of a binary operator.
///
/// Input rows are queued per lane: one lane per key for partitioned
/// streams, and a single lane otherwise. A lane processes a time step once
/// both inputs have progressed past it, so the logic sees each lane's events
/// in time order regardless of how the inputs interleave.
pub(crate) struct BinaryOperator<S: ExecutionStrategy, L: Logic> {
    strategy: S,
    logic: L,
    inputs: [StreamProperties; 2],
    properties: StreamProperties,
    shape: OutputShape,
    equality: [EqualityFn<S::Payload>; 2],
    pool: BatchPool,
    lanes: BTreeMap<u64, Lane<S::Payload>>,
    low_watermark: [SyncTime; 2],
    output_low_watermark: SyncTime,
    /// Source of entry ids and output sequence numbers.
    next_id: u64,
    partitions: PartitionTable,
}

impl<S: ExecutionStrategy, L: Logic> std::fmt::Debug for BinaryOperator<S, L> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BinaryOperator")
            .field("kind", &self.logic.kind())
            .field("mode", &self.strategy.mode())
            .field("properties", &self.properties)
            .field("lanes", &self.lanes.len())
            .field("low_watermark", &self.low_watermark)
            .field("output_low_watermark", &self.output_low_watermark)
            .finish_non_exhaustive()
    }
}

impl<S: ExecutionStrategy, L: Logic> BinaryOperator<S, L> {
    pub fn new(
        strategy: S,
        logic: L,
        inputs: [StreamProperties; 2],
        equality: [EqualityFn<S::Payload>; 2],
        pool: &BatchPool,
        partition_grace: i64,
    ) -> Self {
        let shape = match logic.kind() {
            OperatorKind::Join(_) => OutputShape::Pair {
                left: inputs[0].payload_type.clone(),
                right: inputs[1].payload_type.clone(),
            },
            OperatorKind::Clip | OperatorKind::Union | OperatorKind::WhereNotExists => {
                OutputShape::Single(inputs[0].payload_type.clone())
            }
        };
        let properties = StreamProperties::new(inputs[0].partitioned, shape.data_type());
        Self {
            strategy,
            logic,
            inputs,
            properties,
            shape,
            equality,
            pool: pool.clone(),
            lanes: BTreeMap::new(),
            low_watermark: [SyncTime::MIN; 2],
            output_low_watermark: SyncTime::MIN,
            next_id: 0,
            partitions: PartitionTable::new(partition_grace),
        }
    }

    fn partitioned(&self) -> bool {
        self.properties.partitioned
    }

    fn process_lane(&mut self, lane_key: u64, rows: &mut Vec<OutRow<S::Payload>>) {
        let Some(lane) = self.lanes.get_mut(&lane_key) else {
            return;
        };
        let mut ctx = LaneContext {
            lane,
            equality: &self.equality,
            next_id: &mut self.next_id,
        };

        let safe = ctx.lane.safe_time(&self.low_watermark);
        loop {
            let next_step = ctx.lane.next_step(safe);
            if let Some(&(time, _)) = ctx.lane.timers.peek_priority() {
                if time <= safe && next_step.map_or(true, |step| time <= step) {
                    if let Some(timer) = ctx.lane.timers.pop() {
                        let live = ctx
                            .entry(timer.key, timer.id)
                            .map_or(false, |entry| entry.end == timer.time);
                        if live {
                            self.logic.on_retire(&mut ctx, timer.key, timer.id);
                        }
                    }
                    continue;
                }
            }

            match next_step {
                Some(step) => process_step(&self.logic, &mut ctx, step),
                None => break,
            }
        }

        if safe.is_infinite() && !ctx.lane.finished {
            self.logic.on_end_of_stream(&mut ctx);
            ctx.lane.clear_state();
            ctx.lane.finished = true;
        }
        ctx.lane.release(rows);
    }

    /// Append the punctuations and low watermark that the processed input
    /// allows.
    fn emit_markers(&mut self, punctuated: &BTreeSet<u64>, rows: &mut Vec<OutRow<S::Payload>>) {
        let low_watermark = self.low_watermark;
        if !self.partitioned() {
            if let Some(lane) = self.lanes.get_mut(&0) {
                let progress = lane.progress(&low_watermark);
                if progress > lane.last_punctuation {
                    lane.last_punctuation = progress;
                    rows.push(OutRow::marker(EventKind::Punctuation, 0, progress));
                }
            }
            return;
        }

        let candidate = low_watermark[0].min(low_watermark[1]);
        let next_low_watermark = if candidate > self.output_low_watermark {
            self.lanes
                .values()
                .map(Lane::floor)
                .fold(candidate, SyncTime::min)
        } else {
            self.output_low_watermark
        };

        for key in punctuated {
            if let Some(lane) = self.lanes.get_mut(key) {
                let progress = lane.progress(&low_watermark);
                if progress > lane.last_punctuation.max(next_low_watermark) {
                    lane.last_punctuation = progress;
                    rows.push(OutRow::marker(EventKind::Punctuation, *key, progress));
                }
            }
        }

        if next_low_watermark > self.output_low_watermark {
            self.output_low_watermark = next_low_watermark;
            rows.push(OutRow::marker(
                EventKind::LowWatermark,
                0,
                next_low_watermark,
            ));
        }

        // Eviction follows the input low watermark, so a partition holding
        // back the output does not keep idle partitions resident.
        let lanes = &self.lanes;
        let evicted = self.partitions.advance_low_watermark(candidate, |key| {
            lanes.get(&key).map_or(true, Lane::is_quiescent)
        });
        if !evicted.is_empty() {
            tracing::debug!(
                "Evicted {} partitions of {} at {candidate}",
                evicted.len(),
                self.logic.kind()
            );
        }
        for key in evicted {
            self.lanes.remove(&key);
        }
    }

    fn snapshot(&self) -> error_stack::Result<OperatorState, Error> {
        let mut lanes = Vec::with_capacity(self.lanes.len());
        for (key, lane) in &self.lanes {
            lanes.push(self.snapshot_lane(*key, lane)?);
        }
        Ok(OperatorState {
            kind: self.logic.kind(),
            low_watermark: self.low_watermark,
            output_low_watermark: self.output_low_watermark,
            next_id: self.next_id,
            partitions: self.partitions.clone(),
            lanes,
        })
    }

    fn snapshot_lane(
        &self,
        key: u64,
        lane: &Lane<S::Payload>,
    ) -> error_stack::Result<LaneState, Error> {
        let snapshot_side = |side: Side| -> error_stack::Result<SideSnapshot, Error> {
            let state = &lane.sides[side.index()];
            let mut queue = Vec::with_capacity(state.queue.len());
            for event in &state.queue {
                queue.push(EventState {
                    kind: event.kind,
                    key: event.key,
                    sync_time: event.sync_time,
                    other_time: event.other_time,
                    payload: self.strategy.to_scalar(&event.payload)?,
                });
            }
            Ok(SideSnapshot {
                queue,
                last_sync: state.last_sync,
                punctuation: state.punctuation,
            })
        };

        let mut entries = Vec::with_capacity(lane.entries.len());
        for ((entry_key, id), entry) in &lane.entries {
            entries.push(EntryState {
                key: *entry_key,
                id: *id,
                side: entry.side,
                start: entry.start,
                end: entry.end,
                payload: self.strategy.to_scalar(&entry.payload)?,
                held: entry.held,
                matched: entry.matched,
            });
        }

        let mut ready = Vec::with_capacity(lane.ready.len());
        for Ready { seq, row } in lane.ready.iter() {
            let payload = match &row.payload {
                OutPayload::Null => PayloadState::Null,
                OutPayload::Single(payload) => {
                    PayloadState::Single(self.strategy.to_scalar(payload)?)
                }
                OutPayload::Pair(left, right) => {
                    let right = match right {
                        Some(right) => Some(self.strategy.to_scalar(right)?),
                        None => None,
                    };
                    PayloadState::Pair(self.strategy.to_scalar(left)?, right)
                }
            };
            ready.push(RowState {
                seq: *seq,
                kind: row.kind,
                key: row.key,
                sync_time: row.sync_time,
                other_time: row.other_time,
                payload,
            });
        }

        Ok(LaneState {
            key,
            sides: [snapshot_side(Side::Left)?, snapshot_side(Side::Right)?],
            entries,
            matches: lane
                .matches
                .iter()
                .map(|((left, right), start)| (*left, *right, *start))
                .collect(),
            timers: lane.timers.iter().copied().collect(),
            ready,
            last_punctuation: lane.last_punctuation,
            finished: lane.finished,
        })
    }

    fn restore_state(&mut self, state: OperatorState) -> error_stack::Result<(), Error> {
        error_stack::ensure!(
            state.kind == self.logic.kind(),
            Error::Internal("checkpoint was written by a different operator")
        );

        let mut lanes = BTreeMap::new();
        for lane_state in state.lanes {
            let key = lane_state.key;
            lanes.insert(key, self.restore_lane(lane_state)?);
        }
        self.lanes = lanes;
        self.low_watermark = state.low_watermark;
        self.output_low_watermark = state.output_low_watermark;
        self.next_id = state.next_id;
        self.partitions = state.partitions;
        Ok(())
    }

    fn restore_lane(
        &self,
        state: LaneState,
    ) -> error_stack::Result<Lane<S::Payload>, Error> {
        let left_type = &self.inputs[0].payload_type;
        let right_type = &self.inputs[1].payload_type;
        let payload_type = |side: Side| &self.inputs[side.index()].payload_type;

        let mut lane = Lane::new();
        for (side, snapshot) in [Side::Left, Side::Right].into_iter().zip(state.sides) {
            let restored = &mut lane.sides[side.index()];
            for event in snapshot.queue {
                restored.queue.push_back(InputEvent {
                    kind: event.kind,
                    key: event.key,
                    sync_time: event.sync_time,
                    other_time: event.other_time,
                    payload: self
                        .strategy
                        .from_scalar(&event.payload, payload_type(side))?,
                });
            }
            restored.last_sync = snapshot.last_sync;
            restored.punctuation = snapshot.punctuation;
        }

        for entry in state.entries {
            if entry.held {
                lane.held.insert((entry.start, entry.key, entry.id));
            }
            lane.entries.insert(
                (entry.key, entry.id),
                Entry {
                    side: entry.side,
                    start: entry.start,
                    end: entry.end,
                    payload: self
                        .strategy
                        .from_scalar(&entry.payload, payload_type(entry.side))?,
                    held: entry.held,
                    matched: entry.matched,
                },
            );
        }
        for (left, right, start) in state.matches {
            lane.matches.insert((left, right), start);
            lane.matches_by_right.insert((right, left));
        }
        lane.timers = state.timers.into_iter().collect();

        for row in state.ready {
            let payload = match row.payload {
                PayloadState::Null => OutPayload::Null,
                PayloadState::Single(payload) => {
                    OutPayload::Single(self.strategy.from_scalar(&payload, left_type)?)
                }
                PayloadState::Pair(left, right) => {
                    let right = match right {
                        Some(right) => Some(self.strategy.from_scalar(&right, right_type)?),
                        None => None,
                    };
                    OutPayload::Pair(self.strategy.from_scalar(&left, left_type)?, right)
                }
            };
            lane.ready.push(Ready {
                seq: row.seq,
                row: OutRow {
                    kind: row.kind,
                    key: row.key,
                    sync_time: row.sync_time,
                    other_time: row.other_time,
                    payload,
                },
            });
        }

        lane.last_punctuation = state.last_punctuation;
        lane.finished = state.finished;
        Ok(lane)
    }
}

/// Process the events of a lane at a single time step.
fn process_step<P: Clone, L: Logic>(logic: &L, ctx: &mut LaneContext<'_, P>, time: SyncTime) {
    let mut ends = Vec::new();
    let mut others = Vec::new();
    for side in [Side::Left, Side::Right] {
        let queue = &mut ctx.lane.sides[side.index()].queue;
        let len = queue
            .iter()
            .take_while(|event| event.sync_time == time)
            .count();
        for event in queue.drain(..len) {
            if event.kind == EventKind::End {
                ends.push((side, event));
            } else {
                others.push((side, event));
            }
        }
    }

    // A start edge closed within the step it opened has an empty lifetime.
    let equality = ctx.equality;
    ends.retain(|(side, end)| {
        if end.other_time != time {
            return true;
        }
        let equal = &equality[side.index()];
        let start = others.iter().position(|(other_side, other)| {
            other_side == side
                && other.kind == EventKind::Start
                && other.key == end.key
                && equal(&other.payload, &end.payload)
        });
        match start {
            Some(index) => {
                others.remove(index);
                false
            }
            None => true,
        }
    });

    for (side, event) in ends.into_iter().chain(others) {
        logic.on_event(ctx, side, event);
    }
}

impl<S: ExecutionStrategy, L: Logic> Operator for BinaryOperator<S, L> {
    fn kind(&self) -> OperatorKind {
        self.logic.kind()
    }

    fn mode(&self) -> ExecutionMode {
        self.strategy.mode()
    }

    fn properties(&self) -> &StreamProperties {
        &self.properties
    }

    fn push(
        &mut self,
        side: Side,
        batch: &DataBatch,
        output: &mut Vec<DataBatch>,
    ) -> error_stack::Result<(), Error> {
        let partitioned = self.partitioned();
        let mut touched = BTreeSet::new();
        let mut punctuated = BTreeSet::new();
        let mut advanced = false;

        for row in 0..batch.len() {
            let kind = batch.kind(row).change_context(Error::Payload)?;
            let key = batch.key().value(row);
            let sync_time = SyncTime::new(batch.sync_time().value(row));
            let lane_key = if partitioned { key } else { 0 };

            match kind {
                EventKind::LowWatermark => {
                    let low_watermark = &mut self.low_watermark[side.index()];
                    if sync_time > *low_watermark {
                        *low_watermark = sync_time;
                        advanced = true;
                    }
                }
                EventKind::Punctuation => {
                    let lane = self.lanes.entry(lane_key).or_insert_with(Lane::new);
                    let state = &mut lane.sides[side.index()];
                    state.punctuation = state.punctuation.max(sync_time);
                    touched.insert(lane_key);
                    if partitioned {
                        self.partitions.observe(key, sync_time);
                        punctuated.insert(lane_key);
                    }
                }
                EventKind::Start | EventKind::End | EventKind::Interval => {
                    let other_time = SyncTime::new(batch.other_time().value(row));
                    let empty = match kind {
                        EventKind::Interval => other_time <= sync_time,
                        EventKind::End => sync_time < other_time,
                        _ => false,
                    };
                    if empty {
                        tracing::warn!(
                            "Ignoring empty {kind:?} at {sync_time} (other time {other_time}) on {side:?} input of {}",
                            self.logic.kind()
                        );
                        continue;
                    }
                    let payload = self.strategy.payload(batch, row)?;
                    self.lanes
                        .entry(lane_key)
                        .or_insert_with(Lane::new)
                        .sides[side.index()]
                        .push(InputEvent {
                            kind,
                            key,
                            sync_time,
                            other_time,
                            payload,
                        });
                    touched.insert(lane_key);
                    if partitioned {
                        self.partitions.observe(key, sync_time);
                    }
                }
            }
        }

        let mut rows = Vec::new();
        let lane_keys: Vec<u64> = if advanced {
            self.lanes.keys().copied().collect()
        } else {
            touched.into_iter().collect()
        };
        for lane_key in lane_keys {
            self.process_lane(lane_key, &mut rows);
        }
        self.emit_markers(&punctuated, &mut rows);

        tracing::trace!(
            "{} produced {} rows from {} {side:?} rows",
            self.logic.kind(),
            rows.len(),
            batch.len()
        );
        build_batches(&self.strategy, &self.pool, &self.shape, &rows, output)
    }

    fn num_partitions(&self) -> usize {
        self.lanes.len()
    }
}

impl<S: ExecutionStrategy, L: Logic> Checkpointable for BinaryOperator<S, L> {
    fn checkpoint(
        &self,
        section: &str,
        writer: &mut CheckpointWriter<'_>,
    ) -> error_stack::Result<(), ripple_state::Error> {
        let state = self
            .snapshot()
            .change_context_lazy(|| ripple_state::Error::Serialize(section.to_owned()))?;
        writer.write_section(section, &state)
    }

    fn restore(
        &mut self,
        section: &str,
        reader: &mut CheckpointReader<'_>,
    ) -> error_stack::Result<(), ripple_state::Error> {
        let state: OperatorState = reader.read_section(section)?;
        self.restore_state(state)
            .change_context_lazy(|| ripple_state::Error::Deserialize(section.to_owned()))
    }
}
