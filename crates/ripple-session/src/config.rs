use ripple_operators::ExecutionMode;

/// Configuration of a query container.
///
/// Passed to [QueryContainer::new](crate::QueryContainer::new) and applied
/// to every process restored from the container.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct Config {
    /// Maximum number of rows in a batch.
    pub data_batch_size: usize,
    /// Run operators with boxed per-row payloads instead of columns.
    pub force_row_based_execution: bool,
    /// Ticks a partition may stay idle behind the low watermark before it is
    /// considered for eviction.
    pub partition_grace: i64,
    /// Accepted for compatibility. Has no effect.
    pub use_multi_string: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_batch_size: 80_000,
            force_row_based_execution: false,
            partition_grace: 0,
            use_multi_string: false,
        }
    }
}

impl Config {
    pub fn with_data_batch_size(mut self, data_batch_size: usize) -> Self {
        self.data_batch_size = data_batch_size;
        self
    }

    pub fn with_force_row_based_execution(mut self, force: bool) -> Self {
        self.force_row_based_execution = force;
        self
    }

    pub fn with_partition_grace(mut self, partition_grace: i64) -> Self {
        self.partition_grace = partition_grace;
        self
    }

    pub fn execution_mode(&self) -> ExecutionMode {
        if self.force_row_based_execution {
            ExecutionMode::RowBased
        } else {
            ExecutionMode::Columnar
        }
    }
}
