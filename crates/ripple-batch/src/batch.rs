use std::sync::Arc;

use arrow::compute::{max, min};
use arrow_array::cast::AsArray;
use arrow_array::types::{Int64Type, UInt64Type, UInt8Type};
use arrow_array::{Array, ArrayRef, Int64Array, RecordBatch, UInt64Array, UInt8Array};
use arrow_schema::{DataType, Field, Schema, SchemaRef};
use error_stack::{IntoReport, IntoReportCompat, ResultExt};
use itertools::izip;
use ripple_arrow::scalar_value::ScalarValue;

use crate::pool::BatchLease;
use crate::{BatchPool, Error, EventKind, StreamEvent, SyncTime};

/// A columnar batch of events.
///
/// Columns are stored struct-of-arrays: sync time, other time, key, kind and
/// payload. Cloning a batch shares the underlying columns, so a batch
/// consumed by several downstream stages is freed when the last clone is
/// dropped.
#[derive(Clone)]
pub struct DataBatch {
    info: Arc<BatchInfo>,
}

struct BatchInfo {
    sync_time: ArrayRef,
    other_time: ArrayRef,
    key: ArrayRef,
    kind: ArrayRef,
    payload: ArrayRef,
    /// The minimum sync time of any row, including marker rows.
    min_timestamp: SyncTime,
    /// The maximum sync time of any row, including marker rows.
    max_timestamp: SyncTime,
    _lease: BatchLease,
}

impl DataBatch {
    /// Create a new batch from the given columns.
    ///
    /// The batch must contain at least one row, and no more than the
    /// capacity of the pool.
    pub fn try_new(
        pool: &BatchPool,
        sync_time: Int64Array,
        other_time: Int64Array,
        key: UInt64Array,
        kind: UInt8Array,
        payload: ArrayRef,
    ) -> error_stack::Result<Self, Error> {
        let len = sync_time.len();
        error_stack::ensure!(
            len > 0,
            Error::internal_msg("Unable to create batch from empty data".to_owned())
        );
        error_stack::ensure!(
            len <= pool.capacity(),
            Error::ExceedsCapacity {
                len,
                capacity: pool.capacity()
            }
        );
        error_stack::ensure!(
            other_time.len() == len
                && key.len() == len
                && kind.len() == len
                && payload.len() == len,
            Error::internal_msg("columns of a batch must have the same length".to_owned())
        );
        error_stack::ensure!(
            sync_time.null_count() == 0 && kind.null_count() == 0,
            Error::internal_msg("time and kind columns should not contain null".to_owned())
        );

        let min_timestamp = min(&sync_time).map(SyncTime::new).unwrap_or(SyncTime::MIN);
        let max_timestamp = max(&sync_time).map(SyncTime::new).unwrap_or(SyncTime::MIN);

        Ok(Self {
            info: Arc::new(BatchInfo {
                sync_time: Arc::new(sync_time),
                other_time: Arc::new(other_time),
                key: Arc::new(key),
                kind: Arc::new(kind),
                payload,
                min_timestamp,
                max_timestamp,
                _lease: pool.lease(),
            }),
        })
    }

    /// Create a batch from a record batch with the layout of [DataBatch::schema].
    pub fn try_from_record_batch(
        pool: &BatchPool,
        batch: &RecordBatch,
    ) -> error_stack::Result<Self, Error> {
        error_stack::ensure!(
            batch.num_columns() == 5,
            Error::internal_msg(format!(
                "expected 5 columns in event batch, but was {}",
                batch.num_columns()
            ))
        );
        let sync_time = downcast::<Int64Type>(batch.column(0))?;
        let other_time = downcast::<Int64Type>(batch.column(1))?;
        let key = downcast::<UInt64Type>(batch.column(2))?;
        let kind = downcast::<UInt8Type>(batch.column(3))?;
        Self::try_new(
            pool,
            sync_time,
            other_time,
            key,
            kind,
            batch.column(4).clone(),
        )
    }

    /// The schema of the record batch form of batches with the given payload type.
    pub fn schema(payload_type: &DataType) -> SchemaRef {
        Arc::new(Schema::new(vec![
            Field::new("_sync_time", DataType::Int64, false),
            Field::new("_other_time", DataType::Int64, false),
            Field::new("_key", DataType::UInt64, false),
            Field::new("_kind", DataType::UInt8, false),
            Field::new("payload", payload_type.clone(), true),
        ]))
    }

    pub fn to_record_batch(&self) -> error_stack::Result<RecordBatch, Error> {
        RecordBatch::try_new(
            Self::schema(self.payload_type()),
            vec![
                self.info.sync_time.clone(),
                self.info.other_time.clone(),
                self.info.key.clone(),
                self.info.kind.clone(),
                self.info.payload.clone(),
            ],
        )
        .into_report()
        .change_context(Error::internal_msg("create record batch".to_owned()))
    }

    pub fn len(&self) -> usize {
        self.info.sync_time.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn sync_time(&self) -> &Int64Array {
        self.info.sync_time.as_primitive()
    }

    pub fn other_time(&self) -> &Int64Array {
        self.info.other_time.as_primitive()
    }

    pub fn key(&self) -> &UInt64Array {
        self.info.key.as_primitive()
    }

    pub fn kinds(&self) -> &UInt8Array {
        self.info.kind.as_primitive()
    }

    pub fn payload(&self) -> &ArrayRef {
        &self.info.payload
    }

    pub fn payload_type(&self) -> &DataType {
        self.info.payload.data_type()
    }

    pub fn min_timestamp(&self) -> SyncTime {
        self.info.min_timestamp
    }

    pub fn max_timestamp(&self) -> SyncTime {
        self.info.max_timestamp
    }

    pub fn kind(&self, row: usize) -> error_stack::Result<EventKind, Error> {
        EventKind::try_from(self.kinds().value(row)).into_report()
    }

    /// Materialize a single row.
    pub fn event(&self, row: usize) -> error_stack::Result<StreamEvent, Error> {
        let kind = self.kind(row)?;
        let payload = if kind.is_marker() {
            ScalarValue::Null
        } else {
            ScalarValue::from_array(self.payload().as_ref(), row)
                .into_report()
                .change_context(Error::internal_msg(format!("payload of row {row}")))?
        };
        Ok(StreamEvent {
            sync_time: SyncTime::new(self.sync_time().value(row)),
            other_time: SyncTime::new(self.other_time().value(row)),
            kind,
            key: self.key().value(row),
            payload,
        })
    }

    /// Materialize all rows.
    pub fn events(&self) -> error_stack::Result<Vec<StreamEvent>, Error> {
        (0..self.len()).map(|row| self.event(row)).collect()
    }
}

impl PartialEq for DataBatch {
    fn eq(&self, other: &Self) -> bool {
        let columns = |batch: &DataBatch| {
            [
                batch.info.sync_time.clone(),
                batch.info.other_time.clone(),
                batch.info.key.clone(),
                batch.info.kind.clone(),
                batch.info.payload.clone(),
            ]
        };
        izip!(columns(self), columns(other)).all(|(a, b)| a == b)
    }
}

impl std::fmt::Debug for DataBatch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DataBatch")
            .field("len", &self.len())
            .field("min_timestamp", &self.info.min_timestamp)
            .field("max_timestamp", &self.info.max_timestamp)
            .field("payload_type", self.payload_type())
            .finish_non_exhaustive()
    }
}

/// Convert events to a record batch with the layout of [DataBatch::schema].
///
/// Unlike a [DataBatch] the result is not bound by the capacity of a pool,
/// and may be empty. Used for state that holds buffered rows.
pub fn events_to_record_batch(
    payload_type: &DataType,
    events: &[StreamEvent],
) -> error_stack::Result<RecordBatch, Error> {
    let sync_time = Int64Array::from_iter_values(events.iter().map(|e| e.sync_time.ticks()));
    let other_time = Int64Array::from_iter_values(events.iter().map(|e| e.other_time.ticks()));
    let key = UInt64Array::from_iter_values(events.iter().map(|e| e.key));
    let kind = UInt8Array::from_iter_values(events.iter().map(|e| e.kind as u8));
    let payload = ScalarValue::iter_to_array(payload_type, events.iter().map(|e| &e.payload))
        .into_report()
        .change_context(Error::internal_msg("build payload column".to_owned()))?;

    RecordBatch::try_new(
        DataBatch::schema(payload_type),
        vec![
            Arc::new(sync_time),
            Arc::new(other_time),
            Arc::new(key),
            Arc::new(kind),
            payload,
        ],
    )
    .into_report()
    .change_context(Error::internal_msg("create record batch".to_owned()))
}

/// Read events from a record batch with the layout of [DataBatch::schema].
pub fn events_from_record_batch(
    batch: &RecordBatch,
) -> error_stack::Result<Vec<StreamEvent>, Error> {
    error_stack::ensure!(
        batch.num_columns() == 5,
        Error::internal_msg(format!(
            "expected 5 columns in event batch, but was {}",
            batch.num_columns()
        ))
    );
    let sync_time = downcast::<Int64Type>(batch.column(0))?;
    let other_time = downcast::<Int64Type>(batch.column(1))?;
    let key = downcast::<UInt64Type>(batch.column(2))?;
    let kind = downcast::<UInt8Type>(batch.column(3))?;
    let payload = batch.column(4);

    izip!(
        sync_time.values().iter(),
        other_time.values().iter(),
        key.values().iter(),
        kind.values().iter()
    )
    .enumerate()
    .map(
        |(row, (sync_time, other_time, key, kind))| -> error_stack::Result<StreamEvent, Error> {
            let kind = EventKind::try_from(*kind).into_report()?;
            let payload = if kind.is_marker() {
                ScalarValue::Null
            } else {
                ScalarValue::from_array(payload.as_ref(), row)
                    .into_report()
                    .change_context(Error::internal_msg(format!("payload of row {row}")))?
            };
            Ok(StreamEvent {
                sync_time: SyncTime::new(*sync_time),
                other_time: SyncTime::new(*other_time),
                kind,
                key: *key,
                payload,
            })
        },
    )
    .collect()
}

fn downcast<T: arrow_array::ArrowPrimitiveType>(
    column: &ArrayRef,
) -> error_stack::Result<arrow_array::PrimitiveArray<T>, Error> {
    column
        .as_primitive_opt::<T>()
        .cloned()
        .ok_or_else(|| {
            Error::internal_msg(format!(
                "expected {:?} column, but was {:?}",
                T::DATA_TYPE,
                column.data_type()
            ))
        })
        .into_report()
}
