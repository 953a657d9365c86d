//! Binary format for persisting streams of batches.
//!
//! The format is a fixed magic, a flag indicating whether stream properties
//! follow, the optional length-prefixed properties, and then the batches as
//! an Arrow IPC stream. Whether properties are present is part of the
//! contract between writer and reader: a reader expecting them fails on a
//! stream written without them, and vice versa.

use std::io::{BufReader, Read, Write};

use arrow::ipc::reader::StreamReader;
use arrow::ipc::writer::StreamWriter;
use arrow_array::RecordBatch;
use arrow_schema::DataType;
use error_stack::{IntoReport, ResultExt};

use crate::{BatchPool, DataBatch, Error, StreamProperties};

const MAGIC: &[u8; 8] = b"RIPPLEB1";

/// Writes batches in the binary batch format.
pub struct BatchWriter<W: Write> {
    writer: StreamWriter<W>,
    payload_type: DataType,
}

impl<W: Write> BatchWriter<W> {
    /// Write the header and prepare to write batches.
    ///
    /// If `properties` are given they are embedded in the header, and must be
    /// expected by the reader.
    pub fn try_new(
        mut writer: W,
        payload_type: &DataType,
        properties: Option<&StreamProperties>,
    ) -> error_stack::Result<Self, Error> {
        writer
            .write_all(MAGIC)
            .into_report()
            .change_context(Error::Write)?;

        match properties {
            Some(properties) => {
                error_stack::ensure!(
                    &properties.payload_type == payload_type,
                    Error::internal_msg(format!(
                        "payload type {payload_type:?} doesn't match properties {properties:?}"
                    ))
                );
                let bytes = bincode::serialize(properties)
                    .into_report()
                    .change_context(Error::Write)?;
                let len = u32::try_from(bytes.len())
                    .into_report()
                    .change_context(Error::Write)?;
                writer
                    .write_all(&[1])
                    .and_then(|_| writer.write_all(&len.to_le_bytes()))
                    .and_then(|_| writer.write_all(&bytes))
                    .into_report()
                    .change_context(Error::Write)?;
            }
            None => {
                writer
                    .write_all(&[0])
                    .into_report()
                    .change_context(Error::Write)?;
            }
        }

        let schema = DataBatch::schema(payload_type);
        let writer = StreamWriter::try_new(writer, &schema)
            .into_report()
            .change_context(Error::Write)?;
        Ok(Self {
            writer,
            payload_type: payload_type.clone(),
        })
    }

    pub fn write(&mut self, batch: &DataBatch) -> error_stack::Result<(), Error> {
        error_stack::ensure!(
            batch.payload_type() == &self.payload_type,
            Error::internal_msg(format!(
                "expected payload type {:?}, but batch had {:?}",
                self.payload_type,
                batch.payload_type()
            ))
        );
        let batch = batch.to_record_batch()?;
        self.writer
            .write(&batch)
            .into_report()
            .change_context(Error::Write)
    }

    /// Write the end of stream marker and return the underlying writer.
    pub fn finish(mut self) -> error_stack::Result<W, Error> {
        self.writer
            .finish()
            .into_report()
            .change_context(Error::Write)?;
        self.writer
            .into_inner()
            .into_report()
            .change_context(Error::Write)
    }
}

/// Reads batches in the binary batch format.
///
/// Batches larger than the capacity of the pool (for instance, written with a
/// larger batch size) are split.
pub struct BatchReader<R: Read> {
    reader: StreamReader<BufReader<R>>,
    properties: Option<StreamProperties>,
    payload_type: DataType,
    pool: BatchPool,
    /// A batch read from the stream, and the number of rows already returned.
    pending: Option<(RecordBatch, usize)>,
}

impl<R: Read> BatchReader<R> {
    pub fn try_new(
        mut reader: R,
        pool: &BatchPool,
        expect_properties: bool,
    ) -> error_stack::Result<Self, Error> {
        let mut magic = [0u8; 8];
        reader
            .read_exact(&mut magic)
            .into_report()
            .change_context(Error::Read)?;
        error_stack::ensure!(&magic == MAGIC, Error::InvalidHeader);

        let mut flag = [0u8; 1];
        reader
            .read_exact(&mut flag)
            .into_report()
            .change_context(Error::Read)?;
        let written = match flag[0] {
            0 => false,
            1 => true,
            _ => error_stack::bail!(Error::InvalidHeader),
        };
        error_stack::ensure!(
            written == expect_properties,
            Error::PropertiesMismatch {
                written,
                expected: expect_properties
            }
        );

        let properties = if written {
            let mut len = [0u8; 4];
            reader
                .read_exact(&mut len)
                .into_report()
                .change_context(Error::Read)?;
            let mut bytes = vec![0u8; u32::from_le_bytes(len) as usize];
            reader
                .read_exact(&mut bytes)
                .into_report()
                .change_context(Error::Read)?;
            let properties: StreamProperties = bincode::deserialize(&bytes)
                .into_report()
                .change_context(Error::Read)?;
            Some(properties)
        } else {
            None
        };

        let reader = StreamReader::try_new(reader, None)
            .into_report()
            .change_context(Error::Read)?;
        let schema = reader.schema();
        error_stack::ensure!(
            schema.fields().len() == 5,
            Error::internal_msg(format!("unexpected batch schema {schema:?}"))
        );
        let payload_type = schema.field(4).data_type().clone();
        if let Some(properties) = &properties {
            error_stack::ensure!(
                properties.payload_type == payload_type,
                Error::internal_msg(format!(
                    "payload type {payload_type:?} doesn't match properties {properties:?}"
                ))
            );
        }

        Ok(Self {
            reader,
            properties,
            payload_type,
            pool: pool.clone(),
            pending: None,
        })
    }

    pub fn properties(&self) -> Option<&StreamProperties> {
        self.properties.as_ref()
    }

    pub fn payload_type(&self) -> &DataType {
        &self.payload_type
    }

    fn next_batch(&mut self) -> error_stack::Result<Option<DataBatch>, Error> {
        loop {
            if let Some((batch, offset)) = self.pending.as_mut() {
                if *offset < batch.num_rows() {
                    let len = self.pool.capacity().min(batch.num_rows() - *offset);
                    let slice = batch.slice(*offset, len);
                    *offset += len;
                    return DataBatch::try_from_record_batch(&self.pool, &slice).map(Some);
                }
            }

            match self.reader.next() {
                None => return Ok(None),
                Some(batch) => {
                    let batch = batch.into_report().change_context(Error::Read)?;
                    self.pending = Some((batch, 0));
                }
            }
        }
    }
}

impl<R: Read> Iterator for BatchReader<R> {
    type Item = error_stack::Result<DataBatch, Error>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_batch().transpose()
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use rand::distributions::Alphanumeric;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};
    use ripple_arrow::scalar_value::ScalarValue;

    use super::*;
    use crate::StreamEvent;

    fn random_strings(len: usize, seed: u64) -> Vec<StreamEvent> {
        let mut rng = StdRng::seed_from_u64(seed);
        (0..len)
            .map(|index| {
                let payload = match rng.gen_range(0..3) {
                    0 => ScalarValue::Utf8(None),
                    1 => ScalarValue::from(""),
                    _ => {
                        let len = rng.gen_range(1..20);
                        let s: String = (&mut rng)
                            .sample_iter(&Alphanumeric)
                            .take(len)
                            .map(char::from)
                            .collect();
                        ScalarValue::from(s)
                    }
                };
                StreamEvent::point(0, index as i64, payload)
            })
            .collect()
    }

    fn write_events(
        events: &[StreamEvent],
        pool: &BatchPool,
        properties: Option<&StreamProperties>,
    ) -> Vec<u8> {
        let mut writer = BatchWriter::try_new(Vec::new(), &DataType::Utf8, properties).unwrap();
        for chunk in events.chunks(pool.capacity()) {
            let mut builder = pool.builder(DataType::Utf8);
            for event in chunk {
                builder.push(event.clone());
            }
            writer.write(&builder.finish().unwrap().unwrap()).unwrap();
        }
        writer.finish().unwrap()
    }

    fn read_events(bytes: &[u8], pool: &BatchPool, expect_properties: bool) -> Vec<StreamEvent> {
        let reader = BatchReader::try_new(Cursor::new(bytes), pool, expect_properties).unwrap();
        let mut events = Vec::new();
        for batch in reader {
            let batch = batch.unwrap();
            assert!(batch.len() <= pool.capacity());
            events.extend(batch.events().unwrap());
        }
        events
    }

    #[test]
    fn test_string_serialization_batch_sizes() {
        for batch_size in [1000, 80000] {
            let pool = BatchPool::new(batch_size);
            let events = random_strings(batch_size, batch_size as u64);
            let bytes = write_events(&events, &pool, None);
            assert_eq!(read_events(&bytes, &pool, false), events);
            assert_eq!(pool.outstanding(), 0);
        }
    }

    #[test]
    fn test_string_serialization_batch_size_change() {
        let events = random_strings(5000, 7);
        let bytes = write_events(&events, &BatchPool::new(80000), None);

        let pool = BatchPool::new(1000);
        assert_eq!(read_events(&bytes, &pool, false), events);
        assert_eq!(pool.allocated(), 5);
    }

    #[test]
    fn test_properties_round_trip() {
        let pool = BatchPool::new(10);
        let properties = StreamProperties::new(true, DataType::Utf8);
        let events = random_strings(25, 3);
        let bytes = write_events(&events, &pool, Some(&properties));

        let reader = BatchReader::try_new(Cursor::new(&bytes), &pool, true).unwrap();
        assert_eq!(reader.properties(), Some(&properties));
        assert_eq!(read_events(&bytes, &pool, true), events);
    }

    #[test]
    fn test_properties_mismatch() {
        let pool = BatchPool::new(10);
        let properties = StreamProperties::new(false, DataType::Utf8);
        let events = random_strings(5, 3);

        let with = write_events(&events, &pool, Some(&properties));
        let err = BatchReader::try_new(Cursor::new(&with), &pool, false)
            .err()
            .unwrap();
        assert!(matches!(
            err.current_context(),
            Error::PropertiesMismatch {
                written: true,
                expected: false
            }
        ));

        let without = write_events(&events, &pool, None);
        let err = BatchReader::try_new(Cursor::new(&without), &pool, true)
            .err()
            .unwrap();
        assert_eq!(
            err.current_context().to_string(),
            "stream properties were not written, but the reader expected them"
        );
    }

    #[test]
    fn test_double_read_is_identical() {
        let pool = BatchPool::new(16);
        let events = random_strings(100, 11);
        let bytes = write_events(&events, &pool, None);

        let mut cursor = Cursor::new(bytes);
        let first: Vec<_> = BatchReader::try_new(&mut cursor, &pool, false)
            .unwrap()
            .map(|batch| batch.unwrap())
            .collect();
        cursor.set_position(0);
        let second: Vec<_> = BatchReader::try_new(&mut cursor, &pool, false)
            .unwrap()
            .map(|batch| batch.unwrap())
            .collect();
        assert_eq!(first, second);
    }

    #[test]
    fn test_invalid_header() {
        let pool = BatchPool::new(16);
        let err = BatchReader::try_new(Cursor::new(b"NOTABATCHSTREAM".to_vec()), &pool, false)
            .err()
            .unwrap();
        assert!(matches!(err.current_context(), Error::InvalidHeader));
    }
}
