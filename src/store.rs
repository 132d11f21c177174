use std::collections::{BTreeSet, HashMap, HashSet};

use log::debug;
use serde_json::Value;

use crate::error::CanvasError;
use crate::geometry::{Position, Rect, Size};
use crate::history::GraphSnapshot;
use crate::model::{
    Attributes, Edge, EdgeId, EdgeKey, EdgeKind, NAME_ATTRIBUTE, Node, NodeId, Routing,
    edge_identifier,
};

/// Owns every node and edge on the canvas plus the transient selection.
///
/// All mutations keep three invariants: edge endpoints exist, edge tuples
/// `(from, to, from_anchor, to_anchor)` are unique, and ids are non-empty and
/// unique.
#[derive(Debug, Clone, Default)]
pub struct EntityStore {
    nodes: HashMap<NodeId, Node>,
    order: Vec<NodeId>,
    edges: Vec<Edge>,
    selection: BTreeSet<NodeId>,
    sources: Vec<Value>,
    revision: u64,
    dirty: bool,
}

impl EntityStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_node(
        &mut self,
        kind: impl Into<String>,
        position: Position,
        size: Size,
        attributes: Attributes,
    ) -> &Node {
        let id = loop {
            let candidate = NodeId::generate();
            if !self.nodes.contains_key(&candidate) {
                break candidate;
            }
        };
        let node = Node {
            id: id.clone(),
            kind: kind.into(),
            position: position.clamp_to_canvas(),
            size: size.clamp_to_canvas(),
            attributes,
        };
        self.order.push(id.clone());
        self.nodes.insert(id.clone(), node);
        self.touch();
        &self.nodes[&id]
    }

    /// Inserts a node that already carries an id, e.g. when restoring a document.
    pub fn insert_node(&mut self, mut node: Node) -> Result<&Node, CanvasError> {
        if node.id.is_empty() {
            return Err(CanvasError::EmptyId);
        }
        if self.nodes.contains_key(&node.id) {
            return Err(CanvasError::DuplicateNodeId(node.id));
        }
        node.position = node.position.clamp_to_canvas();
        node.size = node.size.clamp_to_canvas();
        let id = node.id.clone();
        self.order.push(id.clone());
        self.nodes.insert(id.clone(), node);
        self.touch();
        Ok(&self.nodes[&id])
    }

    pub fn move_node(&mut self, id: &NodeId, position: Position) -> Result<(), CanvasError> {
        let node = self
            .nodes
            .get_mut(id)
            .ok_or_else(|| CanvasError::UnknownNode(id.clone()))?;
        let position = position.clamp_to_canvas();
        if node.position != position {
            node.position = position;
            self.touch();
        }
        Ok(())
    }

    pub fn rename_node(&mut self, id: &NodeId, name: &str) -> Result<(), CanvasError> {
        let node = self
            .nodes
            .get_mut(id)
            .ok_or_else(|| CanvasError::UnknownNode(id.clone()))?;
        let name = name.trim();
        if node.attributes.get(NAME_ATTRIBUTE).map(String::as_str) != Some(name) {
            node.attributes
                .insert(NAME_ATTRIBUTE.to_string(), name.to_string());
            self.touch();
        }
        Ok(())
    }

    /// Merges `patch` into the node's attributes. `None` values remove keys.
    pub fn update_attributes(
        &mut self,
        id: &NodeId,
        patch: impl IntoIterator<Item = (String, Option<String>)>,
    ) -> Result<(), CanvasError> {
        let node = self
            .nodes
            .get_mut(id)
            .ok_or_else(|| CanvasError::UnknownNode(id.clone()))?;
        for (key, value) in patch {
            match value {
                Some(value) => {
                    node.attributes.insert(key, value);
                }
                None => {
                    node.attributes.remove(&key);
                }
            }
        }
        self.touch();
        Ok(())
    }

    /// Removes the node after removing every incident edge. Returns the removed edges.
    pub fn delete_node(&mut self, id: &NodeId) -> Result<Vec<Edge>, CanvasError> {
        if !self.nodes.contains_key(id) {
            return Err(CanvasError::UnknownNode(id.clone()));
        }

        let (removed, kept): (Vec<Edge>, Vec<Edge>) = std::mem::take(&mut self.edges)
            .into_iter()
            .partition(|edge| edge.touches(id));
        self.edges = kept;

        self.nodes.remove(id);
        self.order.retain(|existing| existing != id);
        self.selection.remove(id);
        self.touch();

        debug!(node:% = id, edges = removed.len(); "Deleted node with incident edges");
        Ok(removed)
    }

    pub fn add_edge(
        &mut self,
        from: &NodeId,
        to: &NodeId,
        kind: EdgeKind,
        routing: Routing,
    ) -> Result<&Edge, CanvasError> {
        self.add_edge_with_id(EdgeId::generate(), from, to, kind, routing)
    }

    pub fn add_edge_with_id(
        &mut self,
        id: EdgeId,
        from: &NodeId,
        to: &NodeId,
        kind: EdgeKind,
        routing: Routing,
    ) -> Result<&Edge, CanvasError> {
        if from == to {
            return Err(CanvasError::SelfLoopRejected(from.clone()));
        }
        for endpoint in [from, to] {
            if !self.nodes.contains_key(endpoint) {
                return Err(CanvasError::UnknownEndpoint(endpoint.clone()));
            }
        }
        if id.is_empty() {
            return Err(CanvasError::EmptyId);
        }

        let edge = Edge {
            id,
            from: from.clone(),
            to: to.clone(),
            kind,
            routing,
        };
        let key = edge.key();
        if self.edges.iter().any(|existing| existing.key() == key) {
            return Err(CanvasError::DuplicateEdgeRejected {
                from: from.clone(),
                to: to.clone(),
            });
        }

        let edge = if self.edges.iter().any(|existing| existing.id == edge.id) {
            Edge {
                id: EdgeId::generate(),
                ..edge
            }
        } else {
            edge
        };

        debug!(edge:% = edge.id, path = edge_identifier(&edge).as_str(); "Added edge");
        self.edges.push(edge);
        self.touch();
        let index = self.edges.len() - 1;
        Ok(&self.edges[index])
    }

    pub fn delete_edge(&mut self, id: &EdgeId) -> Result<Edge, CanvasError> {
        let index = self
            .edges
            .iter()
            .position(|edge| &edge.id == id)
            .ok_or_else(|| CanvasError::UnknownEdge(id.clone()))?;
        let edge = self.edges.remove(index);
        self.touch();
        Ok(edge)
    }

    /// Replaces the selection, ignoring ids that are not on the canvas.
    pub fn set_selection<'a>(&mut self, ids: impl IntoIterator<Item = &'a NodeId>) {
        self.selection = ids
            .into_iter()
            .filter(|id| self.nodes.contains_key(*id))
            .cloned()
            .collect();
    }

    pub fn add_to_selection(&mut self, id: &NodeId) {
        if self.nodes.contains_key(id) {
            self.selection.insert(id.clone());
        }
    }

    pub fn select_all(&mut self) {
        self.selection = self.order.iter().cloned().collect();
    }

    pub fn clear_selection(&mut self) {
        self.selection.clear();
    }

    pub fn selection(&self) -> &BTreeSet<NodeId> {
        &self.selection
    }

    pub fn is_selected(&self, id: &NodeId) -> bool {
        self.selection.contains(id)
    }

    pub fn clear(&mut self) {
        self.nodes.clear();
        self.order.clear();
        self.edges.clear();
        self.selection.clear();
        self.sources.clear();
        self.touch();
    }

    pub fn node(&self, id: &NodeId) -> Option<&Node> {
        self.nodes.get(id)
    }

    pub fn contains_node(&self, id: &NodeId) -> bool {
        self.nodes.contains_key(id)
    }

    /// Nodes in creation order.
    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.order.iter().filter_map(|id| self.nodes.get(id))
    }

    pub fn node_ids(&self) -> &[NodeId] {
        &self.order
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge(&self, id: &EdgeId) -> Option<&Edge> {
        self.edges.iter().find(|edge| &edge.id == id)
    }

    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    pub fn incident_edges<'a>(&'a self, id: &'a NodeId) -> impl Iterator<Item = &'a Edge> + 'a {
        self.edges.iter().filter(move |edge| edge.touches(id))
    }

    pub fn node_rect(&self, id: &NodeId) -> Option<Rect> {
        self.nodes.get(id).map(Node::rect)
    }

    /// Rectangles of every node except the listed ones, in creation order.
    pub fn obstacles_excluding(&self, excluded: &[&NodeId]) -> Vec<Rect> {
        self.nodes()
            .filter(|node| !excluded.contains(&&node.id))
            .map(Node::rect)
            .collect()
    }

    /// Topmost node under `point`; later nodes are drawn above earlier ones.
    pub fn node_at(&self, point: crate::geometry::Point) -> Option<&Node> {
        self.order
            .iter()
            .rev()
            .filter_map(|id| self.nodes.get(id))
            .find(|node| node.rect().contains(point))
    }

    pub fn sources(&self) -> &[Value] {
        &self.sources
    }

    pub fn set_sources(&mut self, sources: Vec<Value>) {
        self.sources = sources;
        self.touch();
    }

    /// Drops every edge whose tuple repeats an earlier edge. Returns how many were removed.
    pub fn dedupe_edges(&mut self) -> usize {
        let mut seen: HashSet<EdgeKey> = HashSet::new();
        let before = self.edges.len();
        self.edges.retain(|edge| seen.insert(edge.key()));
        let removed = before - self.edges.len();
        if removed > 0 {
            self.touch();
        }
        removed
    }

    /// Drops edges whose endpoints no longer exist. Returns how many were removed.
    pub fn prune_orphan_edges(&mut self) -> usize {
        let before = self.edges.len();
        let nodes = &self.nodes;
        self.edges
            .retain(|edge| nodes.contains_key(&edge.from) && nodes.contains_key(&edge.to));
        let removed = before - self.edges.len();
        if removed > 0 {
            self.touch();
        }
        removed
    }

    pub fn snapshot(&self, label: impl Into<String>) -> GraphSnapshot {
        GraphSnapshot::new(
            label,
            self.nodes().cloned().collect(),
            self.edges.clone(),
        )
    }

    /// Replaces the node and edge tables with fresh copies of the snapshot.
    pub fn restore(&mut self, snapshot: &GraphSnapshot) {
        self.nodes = snapshot
            .nodes()
            .iter()
            .map(|node| (node.id.clone(), node.clone()))
            .collect();
        self.order = snapshot.nodes().iter().map(|node| node.id.clone()).collect();
        self.edges = snapshot.edges().to_vec();
        let nodes = &self.nodes;
        self.selection.retain(|id| nodes.contains_key(id));
        self.prune_orphan_edges();
        self.touch();
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Returns whether the store changed since the last call and resets the flag.
    pub fn take_dirty(&mut self) -> bool {
        std::mem::replace(&mut self.dirty, false)
    }

    fn touch(&mut self) {
        self.revision += 1;
        self.dirty = true;
    }
}
