use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use arrow_schema::DataType;

use crate::BatchBuilder;

/// Hands out batch capacity and tracks the batches that are still alive.
///
/// Every [DataBatch](crate::DataBatch) holds a lease on the pool it was
/// created from. The lease is returned when the last clone of the batch is
/// dropped, so `outstanding() == 0` once everything has been consumed.
#[derive(Clone, Debug)]
pub struct BatchPool {
    inner: Arc<PoolInner>,
}

#[derive(Debug)]
struct PoolInner {
    capacity: usize,
    outstanding: AtomicUsize,
    allocated: AtomicU64,
}

impl BatchPool {
    /// Create a pool producing batches of at most `capacity` rows.
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Arc::new(PoolInner {
                capacity: capacity.max(1),
                outstanding: AtomicUsize::new(0),
                allocated: AtomicU64::new(0),
            }),
        }
    }

    /// The maximum number of rows in a batch.
    pub fn capacity(&self) -> usize {
        self.inner.capacity
    }

    /// Number of batches created from this pool that have not been freed.
    pub fn outstanding(&self) -> usize {
        self.inner.outstanding.load(Ordering::Acquire)
    }

    /// Total number of batches created from this pool.
    pub fn allocated(&self) -> u64 {
        self.inner.allocated.load(Ordering::Relaxed)
    }

    /// Create a builder for rows with the given payload type.
    pub fn builder(&self, payload_type: DataType) -> BatchBuilder {
        BatchBuilder::new(self, payload_type)
    }

    pub(crate) fn lease(&self) -> BatchLease {
        self.inner.outstanding.fetch_add(1, Ordering::AcqRel);
        self.inner.allocated.fetch_add(1, Ordering::Relaxed);
        BatchLease {
            pool: self.inner.clone(),
        }
    }
}

/// Returned to the pool on drop.
#[derive(Debug)]
pub(crate) struct BatchLease {
    pool: Arc<PoolInner>,
}

impl Drop for BatchLease {
    fn drop(&mut self) {
        self.pool.outstanding.fetch_sub(1, Ordering::AcqRel);
    }
}
