//! Set of partitions changed locally since the last broadcast
//!
//! Writers insert into whatever set is current; `take` swaps in a fresh set
//! and then waits until every writer still holding the old one has let go,
//! so an insert is either part of the taken set or lands in the new one.

use crate::types::Partition;
use arc_swap::ArcSwap;
use dashmap::DashSet;
use std::collections::HashSet;
use std::sync::Arc;

/// Concurrent dirty-partition set with an atomic swap-for-empty
#[derive(Debug)]
pub struct PendingSet {
    current: ArcSwap<DashSet<Partition>>,
}

impl PendingSet {
    /// Create an empty pending set
    pub fn new() -> Self {
        Self {
            current: ArcSwap::from_pointee(DashSet::new()),
        }
    }

    /// Mark a partition as pending
    pub fn insert(&self, partition: Partition) {
        // load_full pins the set with a strong reference until the insert is done
        let set = self.current.load_full();
        set.insert(partition);
    }

    /// Mark many partitions as pending
    pub fn extend(&self, partitions: impl IntoIterator<Item = Partition>) {
        let set = self.current.load_full();
        for partition in partitions {
            set.insert(partition);
        }
    }

    /// Drop a partition from the current set
    pub fn remove(&self, partition: &Partition) -> bool {
        self.current.load_full().remove(partition).is_some()
    }

    /// Whether a partition is in the current set
    pub fn contains(&self, partition: &Partition) -> bool {
        self.current.load().contains(partition)
    }

    /// Number of partitions in the current set
    pub fn len(&self) -> usize {
        self.current.load().len()
    }

    /// Whether the current set is empty
    pub fn is_empty(&self) -> bool {
        self.current.load().is_empty()
    }

    /// Install a fresh empty set and return the contents of the old one.
    pub async fn take(&self) -> HashSet<Partition> {
        let mut taken = self.current.swap(Arc::new(DashSet::new()));
        loop {
            match Arc::try_unwrap(taken) {
                Ok(set) => return set.into_iter().collect(),
                Err(shared) => {
                    taken = shared;
                    tokio::task::yield_now().await;
                }
            }
        }
    }
}

impl Default for PendingSet {
    fn default() -> Self {
        Self::new()
    }
}
