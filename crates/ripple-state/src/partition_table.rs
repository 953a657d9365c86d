use std::collections::BTreeSet;

use hashbrown::hash_map::Entry;
use hashbrown::HashMap;
use ripple_batch::SyncTime;

/// Lifecycle status of a resident partition.
///
/// Partitions that have never been seen, or that have been evicted, are not
/// resident in the table.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum PartitionStatus {
    Active,
    /// No activity within the grace window of the low watermark. Evicted on
    /// the next low watermark advance if the owner's state is quiescent.
    Inactive,
}

/// The outcome of observing activity on a partition.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Activation {
    /// The key was not resident (never seen, or evicted). The owner should
    /// start from fresh state.
    New,
    /// The key was inactive and is active again.
    Reactivated,
    /// The key was already active.
    Existing,
}

#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
struct PartitionEntry {
    status: PartitionStatus,
    last_activity: SyncTime,
}

/// Tracks which partitions are active, and decides when they may be evicted.
///
/// Eviction is driven by the low watermark alone: advancing the watermark
/// past `last_activity + grace` deactivates a partition, and a later advance
/// evicts it if the owner reports no outstanding state for the key. Traffic
/// on the partition itself is not required.
#[derive(Clone, Debug, Default, serde::Serialize, serde::Deserialize)]
pub struct PartitionTable {
    grace: i64,
    partitions: HashMap<u64, PartitionEntry>,
    /// Active partitions ordered by last activity.
    by_activity: BTreeSet<(SyncTime, u64)>,
    inactive: BTreeSet<u64>,
    low_watermark: SyncTime,
    evicted: u64,
}

impl PartitionTable {
    pub fn new(grace: i64) -> Self {
        Self {
            grace: grace.max(0),
            low_watermark: SyncTime::MIN,
            ..Default::default()
        }
    }

    /// Number of resident partitions.
    pub fn len(&self) -> usize {
        self.partitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.partitions.is_empty()
    }

    pub fn num_inactive(&self) -> usize {
        self.inactive.len()
    }

    /// Total number of evictions performed.
    pub fn num_evicted(&self) -> u64 {
        self.evicted
    }

    pub fn low_watermark(&self) -> SyncTime {
        self.low_watermark
    }

    pub fn status(&self, key: u64) -> Option<PartitionStatus> {
        self.partitions.get(&key).map(|entry| entry.status)
    }

    /// Record activity for `key` at `time`.
    pub fn observe(&mut self, key: u64, time: SyncTime) -> Activation {
        match self.partitions.entry(key) {
            Entry::Vacant(vacant) => {
                vacant.insert(PartitionEntry {
                    status: PartitionStatus::Active,
                    last_activity: time,
                });
                self.by_activity.insert((time, key));
                Activation::New
            }
            Entry::Occupied(mut occupied) => {
                let entry = occupied.get_mut();
                let activation = match entry.status {
                    PartitionStatus::Active => {
                        self.by_activity.remove(&(entry.last_activity, key));
                        Activation::Existing
                    }
                    PartitionStatus::Inactive => {
                        self.inactive.remove(&key);
                        entry.status = PartitionStatus::Active;
                        Activation::Reactivated
                    }
                };
                entry.last_activity = entry.last_activity.max(time);
                self.by_activity.insert((entry.last_activity, key));
                activation
            }
        }
    }

    /// Advance the low watermark, returning the keys evicted by this advance.
    ///
    /// `is_quiescent` reports whether the owner holds no state for a key. A
    /// partition that is inactive but not quiescent stays resident and is
    /// checked again on the next advance.
    pub fn advance_low_watermark(
        &mut self,
        low_watermark: SyncTime,
        mut is_quiescent: impl FnMut(u64) -> bool,
    ) -> Vec<u64> {
        if low_watermark <= self.low_watermark {
            return Vec::new();
        }
        self.low_watermark = low_watermark;

        // Partitions deactivated by an earlier advance.
        let evicted: Vec<u64> = self
            .inactive
            .iter()
            .copied()
            .filter(|key| is_quiescent(*key))
            .collect();
        for key in &evicted {
            self.inactive.remove(key);
            self.partitions.remove(key);
        }
        self.evicted += evicted.len() as u64;

        while let Some(&(last_activity, key)) = self.by_activity.first() {
            if last_activity.ticks().saturating_add(self.grace) >= low_watermark.ticks() {
                break;
            }
            self.by_activity.pop_first();
            if let Some(entry) = self.partitions.get_mut(&key) {
                entry.status = PartitionStatus::Inactive;
            }
            self.inactive.insert(key);
        }

        if !evicted.is_empty() {
            tracing::debug!(
                "Evicted {} partitions at low watermark {low_watermark}; {} resident",
                evicted.len(),
                self.partitions.len()
            );
        }
        evicted
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    fn t(ticks: i64) -> SyncTime {
        SyncTime::new(ticks)
    }

    #[test]
    fn test_eviction_needs_two_advances() {
        let mut table = PartitionTable::new(0);
        assert_eq!(table.observe(1, t(10)), Activation::New);

        assert!(table.advance_low_watermark(t(20), |_| true).is_empty());
        assert_eq!(table.status(1), Some(PartitionStatus::Inactive));

        assert_eq!(table.advance_low_watermark(t(30), |_| true), vec![1]);
        assert_eq!(table.status(1), None);
        assert_eq!(table.num_evicted(), 1);

        // A later event starts over.
        assert_eq!(table.observe(1, t(40)), Activation::New);
    }

    #[test]
    fn test_activity_reactivates() {
        let mut table = PartitionTable::new(5);
        table.observe(1, t(10));
        table.advance_low_watermark(t(16), |_| true);
        assert_eq!(table.status(1), Some(PartitionStatus::Inactive));

        assert_eq!(table.observe(1, t(17)), Activation::Reactivated);
        assert!(table.advance_low_watermark(t(20), |_| true).is_empty());
        assert_eq!(table.status(1), Some(PartitionStatus::Active));
    }

    #[test]
    fn test_grace_window() {
        let mut table = PartitionTable::new(5);
        table.observe(1, t(10));
        table.advance_low_watermark(t(15), |_| true);
        assert_eq!(table.status(1), Some(PartitionStatus::Active));
        table.advance_low_watermark(t(16), |_| true);
        assert_eq!(table.status(1), Some(PartitionStatus::Inactive));
    }

    #[test]
    fn test_state_keeps_partition_resident() {
        let mut table = PartitionTable::new(0);
        table.observe(1, t(10));
        table.observe(2, t(10));
        table.advance_low_watermark(t(20), |_| true);

        assert_eq!(table.advance_low_watermark(t(30), |key| key != 1), vec![2]);
        assert_eq!(table.status(1), Some(PartitionStatus::Inactive));
        assert_eq!(table.advance_low_watermark(t(40), |_| true), vec![1]);
    }

    #[test]
    fn test_regression_is_ignored() {
        let mut table = PartitionTable::new(0);
        table.observe(1, t(10));
        table.advance_low_watermark(t(20), |_| true);
        assert!(table.advance_low_watermark(t(20), |_| true).is_empty());
        assert!(table.advance_low_watermark(t(5), |_| true).is_empty());
        assert_eq!(table.status(1), Some(PartitionStatus::Inactive));
    }

    #[derive(Debug, Clone)]
    enum Op {
        Observe(u64, i64),
        Advance(i64),
    }

    fn arb_op() -> impl Strategy<Value = Op> {
        prop_oneof![
            (0u64..8, 0i64..100).prop_map(|(key, time)| Op::Observe(key, time)),
            (0i64..100).prop_map(Op::Advance),
        ]
    }

    proptest! {
        #[test]
        fn test_evicted_partitions_were_idle(ops in prop::collection::vec(arb_op(), 1..100), grace in 0i64..10) {
            let mut table = PartitionTable::new(grace);
            let mut last_seen = std::collections::HashMap::new();
            let mut low_watermark = i64::MIN;
            for op in ops {
                match op {
                    Op::Observe(key, time) => {
                        table.observe(key, t(time));
                        let seen = last_seen.entry(key).or_insert(time);
                        *seen = (*seen).max(time);
                    }
                    Op::Advance(time) => {
                        let previous = low_watermark;
                        for key in table.advance_low_watermark(t(time), |_| true) {
                            let seen = last_seen.remove(&key).unwrap();
                            // Idle past the grace window before the previous advance.
                            prop_assert!(seen + grace < previous);
                        }
                        low_watermark = low_watermark.max(time);
                    }
                }
            }
            prop_assert_eq!(table.len(), last_seen.len());
        }
    }
}
