use std::collections::{BTreeSet, HashSet};

use log::debug;
use serde::{Deserialize, Serialize};

use crate::editor::CanvasEditor;
use crate::geometry::{
    Alignment, AnchorSide, Point, Position, Rect, anchor_point, nearest_alignment, rects_overlap,
    snap,
};
use crate::history::GraphSnapshot;
use crate::model::{EdgeId, NodeId};
use crate::{ANCHOR_HANDLE_RADIUS, EDGE_HIT_TOLERANCE};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EditorMode {
    #[default]
    View,
    Connect,
    ManualAnchor,
}

#[derive(Debug, Clone, PartialEq)]
pub enum InteractionState {
    Idle,
    MultiSelectDragging {
        origin: Point,
        current: Point,
        highlighted: BTreeSet<NodeId>,
        additive: bool,
    },
    NodeDragging {
        primary: NodeId,
        origin: Point,
        start_positions: Vec<(NodeId, Position)>,
        before: GraphSnapshot,
        moved: bool,
    },
    ConnectPendingSource {
        source: NodeId,
    },
    ManualAnchorPendingAnchor {
        source: NodeId,
        side: AnchorSide,
        preview_end: Point,
    },
}

impl InteractionState {
    pub fn name(&self) -> &'static str {
        match self {
            InteractionState::Idle => "idle",
            InteractionState::MultiSelectDragging { .. } => "multi-select-dragging",
            InteractionState::NodeDragging { .. } => "node-dragging",
            InteractionState::ConnectPendingSource { .. } => "connect-pending-source",
            InteractionState::ManualAnchorPendingAnchor { .. } => "manual-anchor-pending-anchor",
        }
    }

    pub fn is_idle(&self) -> bool {
        matches!(self, InteractionState::Idle)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Modifiers {
    pub shift: bool,
    pub ctrl: bool,
    pub meta: bool,
}

impl Modifiers {
    pub const NONE: Modifiers = Modifiers {
        shift: false,
        ctrl: false,
        meta: false,
    };

    pub const SHIFT: Modifiers = Modifiers {
        shift: true,
        ctrl: false,
        meta: false,
    };

    pub const CTRL: Modifiers = Modifiers {
        shift: false,
        ctrl: true,
        meta: false,
    };

    /// Shift, ctrl or meta extend the selection instead of replacing it.
    pub fn additive(self) -> bool {
        self.shift || self.ctrl || self.meta
    }

    pub fn command(self) -> bool {
        self.ctrl || self.meta
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Key {
    Delete,
    Backspace,
    Escape,
    Char(char),
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PointerTarget {
    Canvas,
    Node(NodeId),
    Anchor(NodeId, AnchorSide),
    Edge(EdgeId),
}

/// Host input, in canvas-local coordinates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum InputEvent {
    PointerDown {
        x: f32,
        y: f32,
        #[serde(default)]
        modifiers: Modifiers,
    },
    PointerMove {
        x: f32,
        y: f32,
    },
    PointerUp {
        x: f32,
        y: f32,
        #[serde(default)]
        modifiers: Modifiers,
    },
    #[serde(rename_all = "camelCase")]
    KeyDown {
        key: Key,
        #[serde(default)]
        modifiers: Modifiers,
        #[serde(default)]
        text_focus: bool,
    },
}

impl CanvasEditor {
    pub fn handle_event(&mut self, event: InputEvent) -> bool {
        match event {
            InputEvent::PointerDown { x, y, modifiers } => {
                self.pointer_down(Point::new(x, y), modifiers);
                true
            }
            InputEvent::PointerMove { x, y } => {
                self.pointer_move(Point::new(x, y));
                true
            }
            InputEvent::PointerUp { x, y, modifiers } => {
                self.pointer_up(Point::new(x, y), modifiers);
                true
            }
            InputEvent::KeyDown {
                key,
                modifiers,
                text_focus,
            } => self.key_down(key, modifiers, text_focus),
        }
    }

    /// Anchor handles (manual-anchor mode only), then nodes topmost first, then edge paths.
    pub fn hit_test(&self, point: Point) -> PointerTarget {
        if self.mode == EditorMode::ManualAnchor {
            if let Some((id, side)) = self.anchor_at(point) {
                return PointerTarget::Anchor(id, side);
            }
        }
        if let Some(node) = self.store.node_at(point) {
            return PointerTarget::Node(node.id.clone());
        }
        for edge in self.store.edges().iter().rev() {
            if self
                .routes
                .get(&edge.id)
                .is_some_and(|route| route.hit(point, EDGE_HIT_TOLERANCE))
            {
                return PointerTarget::Edge(edge.id.clone());
            }
        }
        PointerTarget::Canvas
    }

    pub fn pointer_down(&mut self, point: Point, modifiers: Modifiers) {
        let target = self.hit_test(point);
        match self.mode {
            EditorMode::View => self.view_pointer_down(point, target, modifiers),
            EditorMode::Connect => self.connect_pointer_down(target),
            EditorMode::ManualAnchor => self.anchor_pointer_down(point, target),
        }
    }

    pub fn pointer_move(&mut self, point: Point) {
        match &mut self.interaction {
            InteractionState::MultiSelectDragging { origin, current, .. } => {
                *current = point;
                let band = Rect::from_corners(*origin, point);
                self.update_highlight(band);
            }
            InteractionState::NodeDragging { .. } => self.drag_to(point),
            InteractionState::ManualAnchorPendingAnchor { preview_end, .. } => {
                *preview_end = point;
                self.hovered_anchor = self.anchor_at(point);
            }
            _ => {
                if self.mode == EditorMode::ManualAnchor {
                    self.hovered_anchor = self.anchor_at(point);
                }
            }
        }
    }

    pub fn pointer_up(&mut self, point: Point, modifiers: Modifiers) {
        match &self.interaction {
            InteractionState::MultiSelectDragging { .. } => {
                self.pointer_move(point);
                let InteractionState::MultiSelectDragging {
                    highlighted,
                    additive,
                    ..
                } = std::mem::replace(&mut self.interaction, InteractionState::Idle)
                else {
                    return;
                };
                let mut selection = highlighted;
                if additive || modifiers.additive() {
                    selection.extend(self.store.selection().iter().cloned());
                }
                self.store.set_selection(selection.iter());
            }
            InteractionState::NodeDragging { .. } => {
                self.pointer_move(point);
                let InteractionState::NodeDragging { before, moved, .. } =
                    std::mem::replace(&mut self.interaction, InteractionState::Idle)
                else {
                    return;
                };
                self.guides = Alignment::default();
                if moved {
                    self.history.push_snapshot(before);
                    self.after_change();
                }
            }
            _ => {}
        }
    }

    /// Returns whether the key was consumed.
    pub fn key_down(&mut self, key: Key, modifiers: Modifiers, text_focus: bool) -> bool {
        if key == Key::Escape {
            self.cancel_interaction();
            self.set_mode(EditorMode::View);
            return true;
        }
        if text_focus {
            return false;
        }

        match key {
            Key::Delete | Key::Backspace => {
                if !self.interaction.is_idle() {
                    return false;
                }
                self.delete_selection();
                true
            }
            Key::Char(c) if modifiers.command() => match c.to_ascii_lowercase() {
                'z' if modifiers.shift => {
                    self.redo();
                    true
                }
                'z' => {
                    self.undo();
                    true
                }
                'y' if modifiers.ctrl => {
                    self.redo();
                    true
                }
                'a' => {
                    self.select_all();
                    true
                }
                _ => false,
            },
            _ => false,
        }
    }

    /// Aborts the current gesture. Drags put every node back where it started.
    pub fn cancel_interaction(&mut self) {
        let state = std::mem::replace(&mut self.interaction, InteractionState::Idle);
        if let InteractionState::NodeDragging {
            start_positions,
            ..
        } = state
        {
            for (id, position) in &start_positions {
                let _ = self.store.move_node(id, *position);
            }
            let ids: Vec<NodeId> = start_positions.into_iter().map(|(id, _)| id).collect();
            self.reroute_nodes(&ids);
            self.store.take_dirty();
        }
        self.hovered_anchor = None;
        self.guides = Alignment::default();
    }

    fn view_pointer_down(&mut self, point: Point, target: PointerTarget, modifiers: Modifiers) {
        match target {
            PointerTarget::Node(id) => {
                if !self.store.is_selected(&id) {
                    if modifiers.additive() {
                        self.store.add_to_selection(&id);
                    } else {
                        self.store.set_selection([&id]);
                    }
                }
                self.begin_drag(id, point);
            }
            _ => {
                self.interaction = InteractionState::MultiSelectDragging {
                    origin: point,
                    current: point,
                    highlighted: BTreeSet::new(),
                    additive: modifiers.additive(),
                };
            }
        }
    }

    fn connect_pointer_down(&mut self, target: PointerTarget) {
        let pending = match &self.interaction {
            InteractionState::ConnectPendingSource { source } => Some(source.clone()),
            _ => None,
        };

        match (pending, target) {
            (None, PointerTarget::Node(id)) => {
                debug!(source:% = id; "Connection source chosen");
                self.interaction = InteractionState::ConnectPendingSource { source: id };
            }
            (None, PointerTarget::Edge(edge)) => {
                let _ = self.delete_edge(&edge);
            }
            (Some(source), PointerTarget::Node(id)) => {
                self.interaction = InteractionState::Idle;
                if source != id {
                    let _ = self.connect(&source, &id);
                }
            }
            (Some(_), _) => self.interaction = InteractionState::Idle,
            (None, _) => {}
        }
    }

    fn anchor_pointer_down(&mut self, point: Point, target: PointerTarget) {
        let pending = match &self.interaction {
            InteractionState::ManualAnchorPendingAnchor { source, side, .. } => {
                Some((source.clone(), *side))
            }
            _ => None,
        };

        match (pending, target) {
            (None, PointerTarget::Anchor(id, side)) => {
                self.interaction = InteractionState::ManualAnchorPendingAnchor {
                    source: id,
                    side,
                    preview_end: point,
                };
            }
            (None, PointerTarget::Edge(edge)) => {
                let _ = self.delete_edge(&edge);
            }
            (Some((source, from_side)), PointerTarget::Anchor(id, to_side)) => {
                self.interaction = InteractionState::Idle;
                self.hovered_anchor = None;
                if source != id {
                    let _ = self.connect_manual(&source, from_side, &id, to_side);
                }
            }
            (Some((source, _)), PointerTarget::Node(id)) if source == id => {
                self.interaction = InteractionState::Idle;
                self.hovered_anchor = None;
            }
            _ => {}
        }
    }

    fn begin_drag(&mut self, primary: NodeId, origin: Point) {
        let start_positions: Vec<(NodeId, Position)> = self
            .store
            .nodes()
            .filter(|node| self.store.is_selected(&node.id))
            .filter(|node| !self.catalog.resolve(&node.kind).fixed)
            .map(|node| (node.id.clone(), node.position))
            .collect();

        if start_positions.is_empty() {
            self.interaction = InteractionState::Idle;
            return;
        }

        self.interaction = InteractionState::NodeDragging {
            primary,
            origin,
            start_positions,
            before: self.store.snapshot("Move nodes"),
            moved: false,
        };
    }

    fn drag_to(&mut self, point: Point) {
        let InteractionState::NodeDragging {
            primary,
            origin,
            start_positions,
            moved,
            ..
        } = &mut self.interaction
        else {
            return;
        };

        let delta = Point::new(point.x - origin.x, point.y - origin.y).rounded();
        let grid = self.config.grid_unit;

        // the primary node leads; fixed primaries hand over to the first movable node
        let (lead_id, lead_start) = start_positions
            .iter()
            .find(|(id, _)| id == primary)
            .or_else(|| start_positions.first())
            .map(|(id, position)| (id.clone(), *position))
            .unwrap_or_else(|| (primary.clone(), Position::default()));
        let Some(size) = self.store.node(&lead_id).map(|node| node.size) else {
            return;
        };

        let candidate = snap(lead_start.offset(delta.x, delta.y), grid).clamp_to_canvas();
        let dragged: HashSet<&NodeId> = start_positions.iter().map(|(id, _)| id).collect();
        let others: Vec<Rect> = self
            .store
            .nodes()
            .filter(|node| !dragged.contains(&node.id))
            .map(|node| node.rect())
            .collect();
        let alignment = nearest_alignment(
            Rect::from_position(candidate, size),
            &others,
            self.config.alignment_tolerance,
        );
        // an alignment line wins over the grid on its axis
        let target = Position::new(
            alignment.snapped_x.unwrap_or(candidate.x),
            alignment.snapped_y.unwrap_or(candidate.y),
        );
        let dx = target.x.saturating_sub(lead_start.x);
        let dy = target.y.saturating_sub(lead_start.y);

        let moves: Vec<(NodeId, Position)> = start_positions
            .iter()
            .map(|(id, start)| (id.clone(), start.offset(dx, dy).clamp_to_canvas()))
            .collect();
        *moved = dx != 0 || dy != 0;
        self.guides = alignment;

        for (id, position) in &moves {
            let _ = self.store.move_node(id, *position);
        }
        let ids: Vec<NodeId> = moves.into_iter().map(|(id, _)| id).collect();
        self.reroute_nodes(&ids);
    }

    fn update_highlight(&mut self, band: Rect) {
        let hits: BTreeSet<NodeId> = self
            .store
            .nodes()
            .filter(|node| rects_overlap(band, node.rect()))
            .map(|node| node.id.clone())
            .collect();
        if let InteractionState::MultiSelectDragging { highlighted, .. } = &mut self.interaction {
            *highlighted = hits;
        }
    }

    fn anchor_at(&self, point: Point) -> Option<(NodeId, AnchorSide)> {
        let nodes: Vec<_> = self.store.nodes().collect();
        nodes.into_iter().rev().find_map(|node| {
            AnchorSide::ALL
                .into_iter()
                .find(|side| anchor_point(node.rect(), *side).distance(point) <= ANCHOR_HANDLE_RADIUS)
                .map(|side| (node.id.clone(), side))
        })
    }
}
