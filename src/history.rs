use std::collections::VecDeque;

use log::debug;

use crate::model::{Edge, Node};
use crate::store::EntityStore;

/// Immutable capture of the whole graph.
#[derive(Debug, Clone, PartialEq)]
pub struct GraphSnapshot {
    label: String,
    nodes: Vec<Node>,
    edges: Vec<Edge>,
}

impl GraphSnapshot {
    pub fn new(label: impl Into<String>, nodes: Vec<Node>, edges: Vec<Edge>) -> Self {
        Self {
            label: label.into(),
            nodes,
            edges,
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }
}

/// Bounded undo/redo stacks of full-graph snapshots.
#[derive(Debug, Clone)]
pub struct History {
    undo: VecDeque<GraphSnapshot>,
    redo: Vec<GraphSnapshot>,
    capacity: usize,
}

impl Default for History {
    fn default() -> Self {
        Self::new(crate::HISTORY_CAPACITY)
    }
}

impl History {
    pub fn new(capacity: usize) -> Self {
        Self {
            undo: VecDeque::new(),
            redo: Vec::new(),
            capacity: capacity.max(1),
        }
    }

    /// Records the current state of `store` before an undoable mutation.
    pub fn push(&mut self, label: impl Into<String>, store: &EntityStore) {
        self.push_snapshot(store.snapshot(label));
    }

    pub fn push_snapshot(&mut self, snapshot: GraphSnapshot) {
        debug!(label = snapshot.label(); "History push");
        self.undo.push_back(snapshot);
        while self.undo.len() > self.capacity {
            self.undo.pop_front();
        }
        self.redo.clear();
    }

    /// Restores the most recent snapshot. Returns its label, or `None` when
    /// there is nothing to undo.
    pub fn undo(&mut self, store: &mut EntityStore) -> Option<String> {
        let snapshot = self.undo.pop_back()?;
        let label = snapshot.label().to_string();
        self.redo.push(store.snapshot(label.clone()));
        store.restore(&snapshot);
        debug!(label = label.as_str(); "Undo");
        Some(label)
    }

    pub fn redo(&mut self, store: &mut EntityStore) -> Option<String> {
        let snapshot = self.redo.pop()?;
        let label = snapshot.label().to_string();
        self.undo.push_back(store.snapshot(label.clone()));
        while self.undo.len() > self.capacity {
            self.undo.pop_front();
        }
        store.restore(&snapshot);
        debug!(label = label.as_str(); "Redo");
        Some(label)
    }

    pub fn can_undo(&self) -> bool {
        !self.undo.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo.is_empty()
    }

    pub fn undo_len(&self) -> usize {
        self.undo.len()
    }

    pub fn redo_len(&self) -> usize {
        self.redo.len()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn clear(&mut self) {
        self.undo.clear();
        self.redo.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::{Position, Size};
    use crate::model::{Attributes, EdgeKind, Routing};

    fn add(store: &mut EntityStore, kind: &str, x: i32) -> crate::model::NodeId {
        store
            .add_node(kind, Position::new(x, 100), Size::new(160, 80), Attributes::new())
            .id
            .clone()
    }

    #[test]
    fn undo_restores_prior_snapshot_and_redo_reapplies() {
        let mut store = EntityStore::new();
        let mut history = History::new(10);
        let a = add(&mut store, "bronze", 100);

        history.push("add node", &store);
        let b = add(&mut store, "silver", 300);
        store.add_edge(&a, &b, EdgeKind::Flow, Routing::Auto).unwrap();
        let after = store.snapshot("after");

        assert_eq!(history.undo(&mut store).as_deref(), Some("add node"));
        assert_eq!(store.node_count(), 1);
        assert_eq!(store.edge_count(), 0);

        assert_eq!(history.redo(&mut store).as_deref(), Some("add node"));
        assert_eq!(store.nodes().cloned().collect::<Vec<_>>(), after.nodes());
        assert_eq!(store.edges(), after.edges());
    }

    #[test]
    fn empty_stacks_are_no_ops() {
        let mut store = EntityStore::new();
        let mut history = History::new(10);
        add(&mut store, "bronze", 100);
        assert_eq!(history.undo(&mut store), None);
        assert_eq!(history.redo(&mut store), None);
        assert_eq!(store.node_count(), 1);
    }

    #[test]
    fn capacity_evicts_oldest_entries() {
        let mut store = EntityStore::new();
        let mut history = History::new(3);
        for step in 0..5 {
            add(&mut store, "bronze", step * 200);
            history.push(format!("step {step}"), &store);
        }
        assert_eq!(history.undo_len(), 3);
        assert_eq!(history.undo(&mut store).as_deref(), Some("step 4"));
        assert_eq!(history.undo(&mut store).as_deref(), Some("step 3"));
        assert_eq!(history.undo(&mut store).as_deref(), Some("step 2"));
        assert_eq!(history.undo(&mut store), None);
    }

    #[test]
    fn push_clears_redo() {
        let mut store = EntityStore::new();
        let mut history = History::new(10);
        history.push("first", &store);
        add(&mut store, "bronze", 100);
        history.undo(&mut store);
        assert!(history.can_redo());
        history.push("second", &store);
        assert!(!history.can_redo());
    }

    #[test]
    fn restore_prunes_selection() {
        let mut store = EntityStore::new();
        let mut history = History::new(10);
        history.push("empty", &store);
        let a = add(&mut store, "bronze", 100);
        store.set_selection([&a]);
        history.undo(&mut store);
        assert!(store.selection().is_empty());
    }
}
