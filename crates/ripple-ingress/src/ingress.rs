use std::collections::BTreeMap;

use arrow_array::RecordBatch;
use error_stack::{IntoReport, ResultExt};
use itertools::Itertools;
use ripple_batch::{
    events_from_record_batch, events_to_record_batch, BatchBuilder, BatchPool, DataBatch,
    EventKind, StreamEvent, StreamProperties, SyncTime,
};
use ripple_state::{Checkpointable, CheckpointReader, CheckpointWriter, PartitionTable};

use crate::lane::{Lane, StartEdge};
use crate::{
    DisorderPolicy, Error, FlushPolicy, IngressOptions, OnCompletedPolicy,
    PeriodicLowWatermarkPolicy,
};

/// The ingress point of a single input stream.
///
/// Events are pushed in arrival order. Output is accumulated as sealed
/// [DataBatch]es, retrieved with [Ingress::take_output]. Within a partition
/// (or the whole stream, if it is not partitioned) output rows are in
/// non-decreasing sync time order, and every event emitted after a
/// punctuation or low watermark at `T` has a sync time of at least `T`.
pub struct Ingress {
    options: IngressOptions,
    properties: StreamProperties,
    builder: BatchBuilder,
    lanes: BTreeMap<u64, Lane>,
    low_watermark: SyncTime,
    /// Quantized time of the latest low watermark boundary, used for
    /// periodic generation. `None` until the first event.
    low_watermark_baseline: Option<SyncTime>,
    next_seq: u64,
    partitions: PartitionTable,
    completed: bool,
    output: Vec<DataBatch>,
}

impl std::fmt::Debug for Ingress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Ingress")
            .field("options", &self.options)
            .field("properties", &self.properties)
            .field("lanes", &self.lanes.len())
            .field("low_watermark", &self.low_watermark)
            .field("completed", &self.completed)
            .finish_non_exhaustive()
    }
}

impl Ingress {
    pub fn try_new(
        options: IngressOptions,
        properties: StreamProperties,
        pool: &BatchPool,
        partition_grace: i64,
    ) -> error_stack::Result<Self, Error> {
        options
            .validate(properties.partitioned)
            .map_err(Error::InvalidOptions)?;

        Ok(Self {
            options,
            builder: pool.builder(properties.payload_type.clone()),
            properties,
            lanes: BTreeMap::new(),
            low_watermark: SyncTime::MIN,
            low_watermark_baseline: None,
            next_seq: 0,
            partitions: PartitionTable::new(partition_grace),
            completed: false,
            output: Vec::new(),
        })
    }

    pub fn properties(&self) -> &StreamProperties {
        &self.properties
    }

    pub fn options(&self) -> &IngressOptions {
        &self.options
    }

    pub fn low_watermark(&self) -> SyncTime {
        self.low_watermark
    }

    pub fn is_completed(&self) -> bool {
        self.completed
    }

    /// Number of events waiting in the reorder buffer.
    pub fn num_buffered(&self) -> usize {
        self.lanes.values().map(|lane| lane.buffer.len()).sum()
    }

    /// Number of resident partitions.
    pub fn num_partitions(&self) -> usize {
        self.partitions.len()
    }

    /// Remove the sealed output batches.
    pub fn take_output(&mut self) -> Vec<DataBatch> {
        std::mem::take(&mut self.output)
    }

    pub fn on_next(&mut self, event: StreamEvent) -> error_stack::Result<(), Error> {
        error_stack::ensure!(!self.completed, Error::Completed);
        match event.kind {
            EventKind::Start | EventKind::End | EventKind::Interval => self.on_data(event),
            EventKind::Punctuation => self.on_punctuation(event),
            EventKind::LowWatermark => self.on_low_watermark(event.sync_time, false),
        }
    }

    /// Ingest a sequence of events.
    ///
    /// With [FlushPolicy::FlushOnBatchBoundary] the output is sealed after
    /// the last event.
    pub fn on_next_batch(
        &mut self,
        events: impl IntoIterator<Item = StreamEvent>,
    ) -> error_stack::Result<(), Error> {
        for event in events {
            self.on_next(event)?;
        }
        if self.options.flush == FlushPolicy::FlushOnBatchBoundary {
            self.seal()?;
        }
        Ok(())
    }

    /// Release every buffered event and seal the output.
    ///
    /// Each lane is released up to its high water mark, which becomes the
    /// lane's bound: events arriving later within the reorder window are
    /// handled by the disorder policy.
    pub fn flush(&mut self) -> error_stack::Result<(), Error> {
        let mut released = Vec::new();
        for (key, lane) in self.lanes.iter_mut() {
            let up_to = lane.high_water_mark;
            lane.released_to = lane.released_to.max(up_to);
            lane.release(
                *key,
                up_to,
                self.low_watermark,
                &self.options.punctuation,
                &mut released,
            );
        }
        released.sort_by_key(|(seq, event)| (event.sync_time, *seq));
        for (_, event) in released {
            self.emit(event)?;
        }
        self.seal()
    }

    pub fn on_completed(&mut self) -> error_stack::Result<(), Error> {
        error_stack::ensure!(!self.completed, Error::Completed);
        match self.options.on_completed {
            OnCompletedPolicy::None => {}
            OnCompletedPolicy::Flush => self.release_all(SyncTime::INFINITY)?,
            OnCompletedPolicy::EndOfStream => {
                self.release_all(SyncTime::INFINITY)?;
                if self.properties.partitioned {
                    if self.low_watermark < SyncTime::INFINITY {
                        self.low_watermark = SyncTime::INFINITY;
                        self.emit(StreamEvent::marker(
                            EventKind::LowWatermark,
                            0,
                            SyncTime::INFINITY,
                        ))?;
                    }
                } else {
                    let lane = self.lanes.entry(0).or_insert_with(Lane::new);
                    if lane.last_marker < SyncTime::INFINITY {
                        lane.last_marker = SyncTime::INFINITY;
                        self.emit(StreamEvent::marker(
                            EventKind::Punctuation,
                            0,
                            SyncTime::INFINITY,
                        ))?;
                    }
                }
            }
        }
        self.completed = true;
        tracing::debug!("Completed ingress with {} events buffered", self.num_buffered());
        self.seal()
    }

    fn lane_key(&self, event: &StreamEvent) -> u64 {
        if self.properties.partitioned {
            event.key
        } else {
            0
        }
    }

    fn on_data(&mut self, mut event: StreamEvent) -> error_stack::Result<(), Error> {
        match event.kind {
            EventKind::Interval => error_stack::ensure!(
                event.sync_time < event.other_time,
                Error::InvalidEvent(event.to_string())
            ),
            EventKind::End => error_stack::ensure!(
                event.other_time < event.sync_time,
                Error::InvalidEvent(event.to_string())
            ),
            _ => {}
        }
        if !event.payload.is_null() {
            error_stack::ensure!(
                event.payload.data_type() == self.properties.payload_type,
                Error::InvalidEvent(format!(
                    "{event} does not have payload type {:?}",
                    self.properties.payload_type
                ))
            );
        }

        let key = self.lane_key(&event);
        let latency = self.options.disorder.reorder_latency();
        let lane = self.lanes.entry(key).or_insert_with(Lane::new);
        let bound = lane.bound(latency, self.low_watermark);

        // An end edge closes its start edge where that was moved to.
        let adjusted_start = if event.kind == EventKind::End {
            lane.take_adjusted_start(&(event.key, event.other_time, event.payload.clone()))
        } else {
            None
        };
        if let Some(start) = adjusted_start {
            event.other_time = start;
        }

        if event.sync_time < bound {
            match self.options.disorder {
                DisorderPolicy::Throw { .. } => error_stack::bail!(Error::OutOfOrder {
                    time: event.sync_time,
                    bound
                }),
                DisorderPolicy::Drop { .. } => {
                    tracing::warn!("Dropping late event {event}; earliest acceptable time is {bound}");
                    return Ok(());
                }
                DisorderPolicy::Adjust { .. } => {
                    if event.kind == EventKind::Start {
                        lane.record_adjusted_start(
                            (event.key, event.sync_time, event.payload.clone()),
                            bound,
                        );
                    }
                    adjust(&mut event, bound);
                }
            }
        }
        if event.kind == EventKind::End && event.other_time >= event.sync_time {
            // The start was moved onto or past the end. It keeps a single tick.
            tracing::debug!("Closing adjusted start edge of {event} one tick after it");
            event.sync_time = event.other_time.succ();
        }

        let time = event.sync_time;
        let seq = self.next_seq;
        self.next_seq += 1;
        lane.accept(seq, event);
        if self.properties.partitioned {
            self.partitions.observe(key, time);
        }

        self.maybe_generate_low_watermark(time)?;

        let up_to = self
            .lanes
            .get(&key)
            .map_or(self.low_watermark, |lane| lane.bound(latency, self.low_watermark));
        self.release_lane(key, up_to)
    }

    fn on_punctuation(&mut self, event: StreamEvent) -> error_stack::Result<(), Error> {
        let key = self.lane_key(&event);
        let latency = self.options.disorder.reorder_latency();
        let lane = self.lanes.entry(key).or_insert_with(Lane::new);

        let mut time = event.sync_time;
        if time <= lane.last_marker.max(self.low_watermark) {
            tracing::debug!("Suppressing punctuation at {time} on {key}; already at {}", lane.last_marker);
            return Ok(());
        }
        let bound = lane.bound(latency, self.low_watermark);
        if time < bound {
            match self.options.disorder {
                DisorderPolicy::Throw { .. } => {
                    error_stack::bail!(Error::OutOfOrder { time, bound })
                }
                DisorderPolicy::Drop { .. } => {
                    tracing::warn!("Dropping late punctuation at {time}; earliest acceptable time is {bound}");
                    return Ok(());
                }
                DisorderPolicy::Adjust { .. } => time = bound,
            }
        }

        if self.properties.partitioned {
            self.partitions.observe(key, time);
        }
        self.release_lane(key, time)?;
        if let Some(lane) = self.lanes.get_mut(&key) {
            if time <= lane.last_marker {
                // Releasing generated a punctuation at or past this one.
                return Ok(());
            }
            lane.last_marker = time;
        }
        self.emit(StreamEvent::marker(EventKind::Punctuation, key, time))?;
        if self.options.flush == FlushPolicy::FlushOnPunctuation {
            self.seal()?;
        }
        Ok(())
    }

    fn on_low_watermark(
        &mut self,
        time: SyncTime,
        generated: bool,
    ) -> error_stack::Result<(), Error> {
        error_stack::ensure!(
            self.properties.partitioned,
            Error::LowWatermarkOnUnpartitioned
        );
        if time <= self.low_watermark {
            if matches!(self.options.disorder, DisorderPolicy::Throw { .. }) {
                error_stack::bail!(Error::LowWatermarkRegression {
                    time,
                    current: self.low_watermark
                });
            }
            tracing::debug!(
                "Ignoring low watermark {time}; already at {}",
                self.low_watermark
            );
            return Ok(());
        }

        self.release_all(time)?;
        self.low_watermark = time;
        if !generated {
            let boundary = match self.options.low_watermark {
                PeriodicLowWatermarkPolicy::Time { period, .. } => time.quantize(period),
                PeriodicLowWatermarkPolicy::None => time,
            };
            self.low_watermark_baseline = Some(
                self.low_watermark_baseline
                    .map_or(boundary, |baseline| baseline.max(boundary)),
            );
        }
        tracing::debug!("Emitting low watermark {time} (generated: {generated})");
        self.emit(StreamEvent::marker(EventKind::LowWatermark, 0, time))?;

        let lanes = &self.lanes;
        let evicted = self.partitions.advance_low_watermark(time, |key| {
            lanes.get(&key).map_or(true, Lane::is_quiescent)
        });
        for key in evicted {
            self.lanes.remove(&key);
        }

        if matches!(
            self.options.flush,
            FlushPolicy::FlushOnPunctuation | FlushPolicy::FlushOnLowWatermark
        ) {
            self.seal()?;
        }
        Ok(())
    }

    fn maybe_generate_low_watermark(&mut self, time: SyncTime) -> error_stack::Result<(), Error> {
        let PeriodicLowWatermarkPolicy::Time { period, lag } = self.options.low_watermark else {
            return Ok(());
        };
        let boundary = time.quantize(period);
        match self.low_watermark_baseline {
            None => {
                self.low_watermark_baseline = Some(boundary);
                Ok(())
            }
            Some(baseline) if boundary > baseline => {
                self.low_watermark_baseline = Some(boundary);
                let value = boundary.saturating_sub(lag);
                if value > self.low_watermark {
                    self.on_low_watermark(value, true)
                } else {
                    Ok(())
                }
            }
            Some(_) => Ok(()),
        }
    }

    fn release_lane(&mut self, key: u64, up_to: SyncTime) -> error_stack::Result<(), Error> {
        let mut released = Vec::new();
        if let Some(lane) = self.lanes.get_mut(&key) {
            lane.release(
                key,
                up_to,
                self.low_watermark,
                &self.options.punctuation,
                &mut released,
            );
        }
        for (_, event) in released {
            self.emit(event)?;
        }
        Ok(())
    }

    /// Release every lane up to `up_to`, merging lanes in time then arrival
    /// order.
    fn release_all(&mut self, up_to: SyncTime) -> error_stack::Result<(), Error> {
        let mut released = Vec::new();
        for (key, lane) in self.lanes.iter_mut() {
            lane.release(
                *key,
                up_to,
                self.low_watermark,
                &self.options.punctuation,
                &mut released,
            );
        }
        released.sort_by_key(|(seq, event)| (event.sync_time, *seq));
        for (_, event) in released {
            self.emit(event)?;
        }
        Ok(())
    }

    fn emit(&mut self, event: StreamEvent) -> error_stack::Result<(), Error> {
        self.builder.push(event);
        if self.builder.is_full() {
            self.seal()?;
        }
        Ok(())
    }

    /// Seal the rows emitted so far into an output batch.
    ///
    /// Events still within the reorder window remain buffered.
    pub fn seal(&mut self) -> error_stack::Result<(), Error> {
        if let Some(batch) = self.builder.finish().change_context(Error::Batch)? {
            tracing::trace!(
                "Sealed ingress batch of {} rows in [{}, {}]",
                batch.len(),
                batch.min_timestamp(),
                batch.max_timestamp()
            );
            self.output.push(batch);
        }
        Ok(())
    }
}

/// Move a late event up to `bound`.
///
/// An interval that would become empty keeps a single tick at `bound`.
fn adjust(event: &mut StreamEvent, bound: SyncTime) {
    tracing::debug!("Adjusting late event {event} to {bound}");
    if event.kind == EventKind::Interval && event.other_time <= bound {
        event.other_time = bound.succ();
    }
    event.sync_time = bound;
}

#[derive(serde::Serialize, serde::Deserialize)]
struct LaneState {
    key: u64,
    high_water_mark: SyncTime,
    last_marker: SyncTime,
    released_to: SyncTime,
    adjusted_starts: Vec<(StartEdge, Vec<SyncTime>)>,
    punctuation_baseline: Option<SyncTime>,
}

#[derive(serde::Serialize, serde::Deserialize)]
struct IngressState {
    lanes: Vec<LaneState>,
    /// Buffered events of every lane, in arrival order.
    #[serde(with = "ripple_arrow::serde::record_batch")]
    buffered: RecordBatch,
    low_watermark: SyncTime,
    low_watermark_baseline: Option<SyncTime>,
    partitions: PartitionTable,
    completed: bool,
}

impl Checkpointable for Ingress {
    fn checkpoint(
        &self,
        section: &str,
        writer: &mut CheckpointWriter<'_>,
    ) -> error_stack::Result<(), ripple_state::Error> {
        error_stack::ensure!(
            self.builder.is_empty() && self.output.is_empty(),
            ripple_state::Error::InvalidState(format!("{section} has unsealed output"))
        );

        let lanes = self
            .lanes
            .iter()
            .map(|(key, lane)| LaneState {
                key: *key,
                high_water_mark: lane.high_water_mark,
                last_marker: lane.last_marker,
                released_to: lane.released_to,
                adjusted_starts: lane
                    .adjusted_starts
                    .iter()
                    .map(|(edge, times)| (edge.clone(), times.clone()))
                    .collect(),
                punctuation_baseline: lane.punctuation_baseline,
            })
            .collect();
        let buffered: Vec<_> = self
            .lanes
            .values()
            .flat_map(|lane| lane.buffer.iter())
            .sorted_by_key(|buffered| buffered.seq)
            .map(|buffered| buffered.event.clone())
            .collect();
        let buffered = events_to_record_batch(&self.properties.payload_type, &buffered)
            .change_context_lazy(|| ripple_state::Error::Serialize(section.to_owned()))?;

        writer.write_section(
            section,
            &IngressState {
                lanes,
                buffered,
                low_watermark: self.low_watermark,
                low_watermark_baseline: self.low_watermark_baseline,
                partitions: self.partitions.clone(),
                completed: self.completed,
            },
        )
    }

    fn restore(
        &mut self,
        section: &str,
        reader: &mut CheckpointReader<'_>,
    ) -> error_stack::Result<(), ripple_state::Error> {
        let state: IngressState = reader.read_section(section)?;
        let buffered = events_from_record_batch(&state.buffered)
            .change_context_lazy(|| ripple_state::Error::Deserialize(section.to_owned()))?;

        self.lanes = state
            .lanes
            .into_iter()
            .map(|lane| {
                let mut restored = Lane::new();
                restored.high_water_mark = lane.high_water_mark;
                restored.last_marker = lane.last_marker;
                restored.released_to = lane.released_to;
                restored.adjusted_starts = lane.adjusted_starts.into_iter().collect();
                restored.punctuation_baseline = lane.punctuation_baseline;
                (lane.key, restored)
            })
            .collect();
        self.next_seq = 0;
        for event in buffered {
            let key = self.lane_key(&event);
            let lane = self
                .lanes
                .get_mut(&key)
                .ok_or_else(|| ripple_state::Error::InvalidState(section.to_owned()))
                .into_report()?;
            lane.buffer.push(crate::lane::Buffered {
                seq: self.next_seq,
                event,
            });
            self.next_seq += 1;
        }
        self.low_watermark = state.low_watermark;
        self.low_watermark_baseline = state.low_watermark_baseline;
        self.partitions = state.partitions;
        self.completed = state.completed;
        tracing::info!(
            "Restored ingress '{section}' with {} lanes and {} buffered events",
            self.lanes.len(),
            self.next_seq
        );
        Ok(())
    }
}
