//! Serde support for Arrow data embedded in checkpoints.
//!
//! Batches are encoded as an Arrow IPC stream (schema message followed by
//! the batch), which keeps null and empty markers of variable-length columns
//! intact.

use std::io::Cursor;

use arrow::error::ArrowError;
use arrow::ipc::reader::StreamReader;
use arrow::ipc::writer::StreamWriter;
use arrow::record_batch::RecordBatch;
use itertools::Itertools;

/// Provides serde for `RecordBatch`.
///
/// Example:
///
/// ```rust
/// #[derive(serde::Serialize, serde::Deserialize)]
/// struct Foo {
///   #[serde(with = "ripple_arrow::serde::record_batch")]
///   batch: RecordBatch
/// }
/// ```
pub mod record_batch {
    use arrow::record_batch::RecordBatch;
    use serde::Deserialize;

    pub fn serialize<S>(batch: &RecordBatch, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        use serde::ser::Error;
        let bytes = super::encode_batch(batch).map_err(Error::custom)?;
        serializer.serialize_bytes(&bytes)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<RecordBatch, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        use serde::de::Error;
        let bytes: Vec<u8> = Deserialize::deserialize(deserializer)?;
        super::decode_batch(bytes).map_err(Error::custom)
    }
}

fn encode_batch(batch: &RecordBatch) -> Result<Vec<u8>, ArrowError> {
    let mut writer = StreamWriter::try_new(Vec::new(), &batch.schema())?;
    writer.write(batch)?;
    writer.finish()?;
    writer.into_inner()
}

fn decode_batch(bytes: Vec<u8>) -> Result<RecordBatch, ArrowError> {
    let reader = StreamReader::try_new(Cursor::new(bytes), None)?;
    let schema = reader.schema();

    let batches: Vec<_> = reader.into_iter().try_collect()?;
    arrow::compute::concat_batches(&schema, &batches)
}
