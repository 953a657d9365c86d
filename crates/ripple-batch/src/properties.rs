use arrow_schema::DataType;

/// Static properties of a stream, known when the stream is defined.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct StreamProperties {
    /// Whether the stream is partitioned by key.
    ///
    /// Partitioned streams are ordered per key and carry low watermarks.
    /// Non-partitioned streams are ordered globally and carry punctuations.
    pub partitioned: bool,
    /// The type of the payload column.
    pub payload_type: DataType,
}

impl StreamProperties {
    pub fn new(partitioned: bool, payload_type: DataType) -> Self {
        Self {
            partitioned,
            payload_type,
        }
    }
}
