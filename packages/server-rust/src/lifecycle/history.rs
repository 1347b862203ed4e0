use std::collections::{HashMap, VecDeque};

use opwatch_core::Operation;

/// Bounded archive of finished operations, oldest evicted first.
///
/// Archiving an id that is already present replaces the old record and moves
/// it to the newest position.
#[derive(Debug)]
pub struct OperationHistory {
    capacity: usize,
    order: VecDeque<String>,
    records: HashMap<String, Operation>,
}

impl OperationHistory {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            order: VecDeque::with_capacity(capacity),
            records: HashMap::with_capacity(capacity),
        }
    }

    pub fn archive(&mut self, operation: Operation) {
        if self.capacity == 0 {
            return;
        }
        if self.records.contains_key(&operation.id) {
            self.order.retain(|id| id != &operation.id);
        }
        self.order.push_back(operation.id.clone());
        self.records.insert(operation.id.clone(), operation);

        while self.order.len() > self.capacity {
            if let Some(evicted) = self.order.pop_front() {
                self.records.remove(&evicted);
            }
        }
    }

    #[must_use]
    pub fn get(&self, id: &str) -> Option<&Operation> {
        self.records.get(id)
    }

    /// Up to `limit` records, newest first.
    #[must_use]
    pub fn recent(&self, limit: usize) -> Vec<Operation> {
        self.order
            .iter()
            .rev()
            .take(limit)
            .filter_map(|id| self.records.get(id).cloned())
            .collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.order.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use opwatch_core::OperationKind;

    use super::*;

    fn op(id: &str, description: &str) -> Operation {
        Operation::new(id, OperationKind::Backup, "scope", 1, description, 0)
    }

    #[test]
    fn evicts_oldest_beyond_capacity() {
        let mut history = OperationHistory::new(2);
        history.archive(op("a", ""));
        history.archive(op("b", ""));
        history.archive(op("c", ""));

        assert_eq!(history.len(), 2);
        assert!(history.get("a").is_none());
        assert!(history.get("b").is_some());
        assert!(history.get("c").is_some());
    }

    #[test]
    fn rearchiving_replaces_and_refreshes_position() {
        let mut history = OperationHistory::new(2);
        history.archive(op("a", "first run"));
        history.archive(op("b", ""));
        history.archive(op("a", "second run"));
        history.archive(op("c", ""));

        assert_eq!(history.len(), 2);
        assert_eq!(history.get("a").unwrap().description, "second run");
        assert!(history.get("b").is_none());
    }

    #[test]
    fn recent_is_newest_first() {
        let mut history = OperationHistory::new(10);
        for id in ["a", "b", "c"] {
            history.archive(op(id, ""));
        }
        let ids: Vec<String> = history.recent(2).into_iter().map(|o| o.id).collect();
        assert_eq!(ids, vec!["c", "b"]);
    }

    #[test]
    fn zero_capacity_keeps_nothing() {
        let mut history = OperationHistory::new(0);
        history.archive(op("a", ""));
        assert!(history.is_empty());
    }
}
