use arrow_array::{Int64Array, UInt64Array, UInt8Array};
use arrow_schema::DataType;
use error_stack::{IntoReportCompat, ResultExt};
use ripple_arrow::scalar_value::ScalarValue;

use crate::{BatchPool, DataBatch, Error, StreamEvent, SyncTime};

/// Accumulates events in row form until they are sealed into a [DataBatch].
pub struct BatchBuilder {
    pool: BatchPool,
    payload_type: DataType,
    sync_time: Vec<i64>,
    other_time: Vec<i64>,
    key: Vec<u64>,
    kind: Vec<u8>,
    payload: Vec<ScalarValue>,
    min_timestamp: SyncTime,
    max_timestamp: SyncTime,
}

impl BatchBuilder {
    pub fn new(pool: &BatchPool, payload_type: DataType) -> Self {
        Self {
            pool: pool.clone(),
            payload_type,
            sync_time: Vec::new(),
            other_time: Vec::new(),
            key: Vec::new(),
            kind: Vec::new(),
            payload: Vec::new(),
            min_timestamp: SyncTime::INFINITY,
            max_timestamp: SyncTime::MIN,
        }
    }

    pub fn payload_type(&self) -> &DataType {
        &self.payload_type
    }

    pub fn len(&self) -> usize {
        self.sync_time.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sync_time.is_empty()
    }

    /// Whether the builder has reached the capacity of the pool.
    pub fn is_full(&self) -> bool {
        self.len() >= self.pool.capacity()
    }

    /// The minimum sync time pushed since the last `finish`.
    pub fn min_timestamp(&self) -> Option<SyncTime> {
        (!self.is_empty()).then_some(self.min_timestamp)
    }

    /// The maximum sync time pushed since the last `finish`.
    pub fn max_timestamp(&self) -> Option<SyncTime> {
        (!self.is_empty()).then_some(self.max_timestamp)
    }

    pub fn push(&mut self, event: StreamEvent) {
        debug_assert!(!self.is_full(), "push to full batch builder");
        self.min_timestamp = self.min_timestamp.min(event.sync_time);
        self.max_timestamp = self.max_timestamp.max(event.sync_time);
        self.sync_time.push(event.sync_time.ticks());
        self.other_time.push(event.other_time.ticks());
        self.key.push(event.key);
        self.kind.push(event.kind as u8);
        self.payload.push(event.payload);
    }

    /// Seal the rows pushed so far into a batch.
    ///
    /// Returns `None` if no rows were pushed. The builder is left empty and
    /// may be reused.
    pub fn finish(&mut self) -> error_stack::Result<Option<DataBatch>, Error> {
        if self.is_empty() {
            return Ok(None);
        }

        let payload = ScalarValue::iter_to_array(&self.payload_type, &self.payload)
            .into_report()
            .change_context(Error::internal_msg("build payload column".to_owned()))?;
        self.payload.clear();

        let batch = DataBatch::try_new(
            &self.pool,
            Int64Array::from(std::mem::take(&mut self.sync_time)),
            Int64Array::from(std::mem::take(&mut self.other_time)),
            UInt64Array::from(std::mem::take(&mut self.key)),
            UInt8Array::from(std::mem::take(&mut self.kind)),
            payload,
        )?;
        debug_assert_eq!(batch.min_timestamp(), self.min_timestamp);
        debug_assert_eq!(batch.max_timestamp(), self.max_timestamp);

        self.min_timestamp = SyncTime::INFINITY;
        self.max_timestamp = SyncTime::MIN;
        Ok(Some(batch))
    }
}

impl std::fmt::Debug for BatchBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchBuilder")
            .field("len", &self.len())
            .field("capacity", &self.pool.capacity())
            .field("payload_type", &self.payload_type)
            .finish_non_exhaustive()
    }
}
