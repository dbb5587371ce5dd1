// src/executions/store.rs

use std::collections::{HashMap, VecDeque};

use tracing::debug;

use crate::executions::record::ExecutionRecord;
use crate::ids::ExecutionId;

/// In-memory execution records, in acceptance order.
///
/// Terminal records beyond `retain_finished` are evicted oldest-first.
/// Non-terminal records are never evicted.
#[derive(Debug)]
pub struct ExecutionStore {
    records: HashMap<ExecutionId, ExecutionRecord>,
    order: VecDeque<ExecutionId>,
    retain_finished: usize,
}

impl ExecutionStore {
    pub fn new(retain_finished: usize) -> Self {
        Self {
            records: HashMap::new(),
            order: VecDeque::new(),
            retain_finished: retain_finished.max(1),
        }
    }

    pub fn insert(&mut self, record: ExecutionRecord) {
        let id = record.execution_id;
        if self.records.insert(id, record).is_none() {
            self.order.push_back(id);
        }
    }

    pub fn get(&self, id: &ExecutionId) -> Option<&ExecutionRecord> {
        self.records.get(id)
    }

    pub fn get_mut(&mut self, id: &ExecutionId) -> Option<&mut ExecutionRecord> {
        self.records.get_mut(id)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Records in acceptance order.
    pub fn iter(&self) -> impl Iterator<Item = &ExecutionRecord> {
        self.order.iter().filter_map(|id| self.records.get(id))
    }

    /// Number of runs that have not reached a terminal status.
    pub fn in_flight(&self) -> usize {
        self.records.values().filter(|r| !r.is_terminal()).count()
    }

    pub fn all_terminal(&self) -> bool {
        self.records.values().all(ExecutionRecord::is_terminal)
    }

    /// Evict the oldest terminal records above the retention limit.
    pub fn prune_finished(&mut self) -> Vec<ExecutionId> {
        let terminal = self.records.values().filter(|r| r.is_terminal()).count();
        let mut excess = terminal.saturating_sub(self.retain_finished);
        let mut evicted = Vec::new();

        if excess == 0 {
            return evicted;
        }

        self.order.retain(|id| {
            if excess == 0 {
                return true;
            }
            match self.records.get(id) {
                Some(r) if r.is_terminal() => {
                    self.records.remove(id);
                    evicted.push(*id);
                    excess -= 1;
                    false
                }
                _ => true,
            }
        });

        debug!(evicted = evicted.len(), "evicted finished execution records");
        evicted
    }
}
