use std::sync::Arc;

use arrow_array::{ArrayRef, Int64Array, UInt64Array, UInt8Array};
use arrow_buffer::NullBuffer;
use arrow_schema::{DataType, Field};
use error_stack::ResultExt;
use ripple_arrow::utils::make_struct_array;
use ripple_batch::{BatchPool, DataBatch, EventKind, SyncTime};

use crate::strategy::ExecutionStrategy;
use crate::Error;

/// The payload of an output row.
#[derive(Clone, Debug)]
pub(crate) enum OutPayload<P> {
    /// Markers.
    Null,
    Single(P),
    /// A left payload and the right payload it was joined with, if any.
    Pair(P, Option<P>),
}

#[derive(Clone, Debug)]
pub(crate) struct OutRow<P> {
    pub kind: EventKind,
    pub key: u64,
    pub sync_time: SyncTime,
    pub other_time: SyncTime,
    pub payload: OutPayload<P>,
}

impl<P> OutRow<P> {
    pub fn marker(kind: EventKind, key: u64, time: SyncTime) -> Self {
        Self {
            kind,
            key,
            sync_time: time,
            other_time: SyncTime::PUNCTUATION_OTHER,
            payload: OutPayload::Null,
        }
    }
}

/// The payload layout of an operator output.
#[derive(Clone, Debug)]
pub(crate) enum OutputShape {
    /// Payloads are passed through from the inputs.
    Single(DataType),
    /// Payloads are records of the left and right payload.
    Pair { left: DataType, right: DataType },
}

impl OutputShape {
    pub fn data_type(&self) -> DataType {
        match self {
            OutputShape::Single(data_type) => data_type.clone(),
            OutputShape::Pair { left, right } => DataType::Struct(
                vec![
                    Field::new("left", left.clone(), true),
                    Field::new("right", right.clone(), true),
                ]
                .into(),
            ),
        }
    }
}

/// Pack rows into batches no larger than the capacity of the pool.
pub(crate) fn build_batches<S: ExecutionStrategy>(
    strategy: &S,
    pool: &BatchPool,
    shape: &OutputShape,
    rows: &[OutRow<S::Payload>],
    output: &mut Vec<DataBatch>,
) -> error_stack::Result<(), Error> {
    for chunk in rows.chunks(pool.capacity()) {
        let payload = match shape {
            OutputShape::Single(data_type) => {
                let payloads: Vec<_> = chunk
                    .iter()
                    .map(|row| match &row.payload {
                        OutPayload::Single(payload) => Some(payload),
                        OutPayload::Pair(left, _) => Some(left),
                        OutPayload::Null => None,
                    })
                    .collect();
                strategy.concat(data_type, &payloads)?
            }
            OutputShape::Pair { left, right } => {
                let (lefts, rights): (Vec<_>, Vec<_>) = chunk
                    .iter()
                    .map(|row| match &row.payload {
                        OutPayload::Pair(left, right) => (Some(left), right.as_ref()),
                        OutPayload::Single(left) => (Some(left), None),
                        OutPayload::Null => (None, None),
                    })
                    .unzip();
                let left_column = strategy.concat(left, &lefts)?;
                let right_column = strategy.concat(right, &rights)?;

                let validity: Vec<bool> = chunk
                    .iter()
                    .map(|row| !matches!(row.payload, OutPayload::Null))
                    .collect();
                let nulls = NullBuffer::from(validity);
                let nulls = (nulls.null_count() > 0).then_some(nulls);
                Arc::new(make_struct_array(
                    chunk.len(),
                    vec![
                        (Arc::new(Field::new("left", left.clone(), true)), left_column),
                        (Arc::new(Field::new("right", right.clone(), true)), right_column),
                    ],
                    nulls,
                )) as ArrayRef
            }
        };

        let batch = DataBatch::try_new(
            pool,
            Int64Array::from_iter_values(chunk.iter().map(|row| row.sync_time.ticks())),
            Int64Array::from_iter_values(chunk.iter().map(|row| row.other_time.ticks())),
            UInt64Array::from_iter_values(chunk.iter().map(|row| row.key)),
            UInt8Array::from_iter_values(chunk.iter().map(|row| row.kind as u8)),
            payload,
        )
        .change_context(Error::Output)?;
        output.push(batch);
    }
    Ok(())
}
