//! Bounded set of committed run identifiers

use std::collections::{HashSet, VecDeque};

/// Fixed-capacity set remembering which runs have been committed.
///
/// Insertion order is kept in a ring; once `capacity` is exceeded the oldest
/// id is forgotten and events for it are accepted again.
#[derive(Debug, Clone)]
pub struct CommittedRuns {
    capacity: usize,
    ids: HashSet<String>,
    order: VecDeque<String>,
}

impl CommittedRuns {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            ids: HashSet::with_capacity(capacity),
            order: VecDeque::with_capacity(capacity),
        }
    }

    pub fn contains(&self, run_id: &str) -> bool {
        self.ids.contains(run_id)
    }

    /// Record a run as committed.
    ///
    /// Returns false if it was already present.
    pub fn insert(&mut self, run_id: &str) -> bool {
        if !self.ids.insert(run_id.to_string()) {
            return false;
        }
        self.order.push_back(run_id.to_string());

        while self.order.len() > self.capacity {
            if let Some(evicted) = self.order.pop_front() {
                self.ids.remove(&evicted);
                tracing::trace!(run_id = %evicted, "Evicted committed run");
            }
        }
        true
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
