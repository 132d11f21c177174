use std::collections::{BTreeMap, BTreeSet, HashMap};

use log::{debug, info, warn};

use crate::catalog::{Catalog, NodeCatalog, NodeCategory};
use crate::codec::{self, CanvasDocument, LoadReport};
use crate::config::EditorConfig;
use crate::controller::{EditorMode, InteractionState};
use crate::error::{CanvasError, StorageError};
use crate::geometry::{Alignment, AnchorSide, Point, Position, Rect, find_free_spot, snap};
use crate::history::History;
use crate::model::{Attributes, EdgeId, EdgeKind, NAME_ATTRIBUTE, NodeId, Routing};
use crate::notify::{Notice, Notifier};
use crate::routing::Route;
use crate::scheduler::{Clock, CoalescingScheduler, SystemClock};
use crate::storage::{KeyValueStore, MemoryStore};
use crate::store::EntityStore;
use crate::templates::find_template;
use crate::{FREE_SPOT_COLUMNS, FREE_SPOT_PADDING};

/// Deferred work the editor runs from [`CanvasEditor::tick`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EditorTask {
    Persist,
    Reroute,
}

/// One canvas session: entity store, history, routes, interaction state and
/// the collaborators they need.
pub struct CanvasEditor {
    pub(crate) config: EditorConfig,
    pub(crate) catalog: Box<dyn NodeCatalog>,
    pub(crate) storage: Box<dyn KeyValueStore>,
    pub(crate) clock: Box<dyn Clock>,
    pub(crate) store: EntityStore,
    pub(crate) history: History,
    pub(crate) scheduler: CoalescingScheduler<EditorTask>,
    pub(crate) notifier: Notifier,
    pub(crate) routes: HashMap<EdgeId, Route>,
    pub(crate) mode: EditorMode,
    pub(crate) interaction: InteractionState,
    pub(crate) hovered_anchor: Option<(NodeId, AnchorSide)>,
    pub(crate) guides: Alignment,
    pub(crate) theme: String,
}

impl std::fmt::Debug for CanvasEditor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CanvasEditor")
            .field("nodes", &self.store.node_count())
            .field("edges", &self.store.edge_count())
            .field("mode", &self.mode)
            .field("interaction", &self.interaction.name())
            .finish()
    }
}

impl CanvasEditor {
    pub fn new(
        config: EditorConfig,
        catalog: impl NodeCatalog + 'static,
        storage: impl KeyValueStore + 'static,
    ) -> Self {
        Self {
            history: History::new(config.history_capacity),
            notifier: Notifier::new(config.notice_capacity),
            theme: config.theme.clone(),
            config,
            catalog: Box::new(catalog),
            storage: Box::new(storage),
            clock: Box::new(SystemClock),
            store: EntityStore::new(),
            scheduler: CoalescingScheduler::new(),
            routes: HashMap::new(),
            mode: EditorMode::View,
            interaction: InteractionState::Idle,
            hovered_anchor: None,
            guides: Alignment::default(),
        }
    }

    /// Built-in config and catalog over an in-memory store.
    pub fn in_memory() -> Self {
        Self::new(EditorConfig::builtin(), Catalog::builtin(), MemoryStore::new())
    }

    pub fn with_clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Box::new(clock);
        self
    }

    pub fn config(&self) -> &EditorConfig {
        &self.config
    }

    pub fn catalog(&self) -> &dyn NodeCatalog {
        self.catalog.as_ref()
    }

    pub fn store(&self) -> &EntityStore {
        &self.store
    }

    pub fn history(&self) -> &History {
        &self.history
    }

    pub fn routes(&self) -> &HashMap<EdgeId, Route> {
        &self.routes
    }

    pub fn route(&self, id: &EdgeId) -> Option<&Route> {
        self.routes.get(id)
    }

    pub fn theme(&self) -> &str {
        &self.theme
    }

    pub fn set_theme(&mut self, theme: impl Into<String>) {
        self.theme = theme.into();
        self.schedule_persist();
    }

    pub fn notices(&self) -> impl Iterator<Item = &Notice> {
        self.notifier.notices()
    }

    pub fn drain_notices(&mut self) -> Vec<Notice> {
        self.notifier.drain()
    }

    pub fn mode(&self) -> EditorMode {
        self.mode
    }

    pub fn interaction(&self) -> &InteractionState {
        &self.interaction
    }

    pub fn guides(&self) -> Alignment {
        self.guides
    }

    pub fn hovered_anchor(&self) -> Option<(&NodeId, AnchorSide)> {
        self.hovered_anchor.as_ref().map(|(id, side)| (id, *side))
    }

    pub fn selection(&self) -> &BTreeSet<NodeId> {
        self.store.selection()
    }

    /// Nodes currently under the rubber band.
    pub fn highlighted(&self) -> Option<&BTreeSet<NodeId>> {
        match &self.interaction {
            InteractionState::MultiSelectDragging { highlighted, .. } => Some(highlighted),
            _ => None,
        }
    }

    pub fn rubber_band(&self) -> Option<Rect> {
        match &self.interaction {
            InteractionState::MultiSelectDragging { origin, current, .. } => {
                Some(Rect::from_corners(*origin, *current))
            }
            _ => None,
        }
    }

    /// Dashed line from the chosen anchor to the pointer while a manual edge is pending.
    pub fn preview_line(&self) -> Option<(Point, Point)> {
        match &self.interaction {
            InteractionState::ManualAnchorPendingAnchor {
                source,
                side,
                preview_end,
            } => {
                let rect = self.store.node_rect(source)?;
                Some((crate::geometry::anchor_point(rect, *side), *preview_end))
            }
            _ => None,
        }
    }

    /// Loads the persisted document, if any. A malformed document is reported
    /// as a notice and leaves the canvas empty.
    pub fn restore(&mut self) -> Result<Option<LoadReport>, StorageError> {
        let Some(json) = self.storage.load(&self.config.storage_key)? else {
            debug!(key = self.config.storage_key.as_str(); "No persisted canvas");
            return Ok(None);
        };

        let (document, warnings) = match codec::decode(&json) {
            Ok(decoded) => decoded,
            Err(err) => {
                self.notifier.error(format!("Could not restore canvas: {err}"));
                return Ok(None);
            }
        };

        let mut report = codec::apply(&mut self.store, &document, self.catalog.as_ref());
        report.warnings = warnings
            .into_iter()
            .chain(std::mem::take(&mut report.warnings))
            .collect();
        self.theme = document.theme.clone();
        self.history.clear();
        self.interaction = InteractionState::Idle;
        self.reroute_all();
        self.store.take_dirty();
        info!(
            nodes = report.nodes_created,
            edges = report.edges_created;
            "Restored canvas"
        );
        Ok(Some(report))
    }

    pub fn save_now(&mut self) -> Result<(), StorageError> {
        let json = self.export_json()?;
        self.storage.save(&self.config.storage_key, &json)?;
        self.scheduler.cancel(EditorTask::Persist);
        debug!(key = self.config.storage_key.as_str(); "Saved canvas");
        Ok(())
    }

    /// Writes any pending debounced save immediately.
    pub fn flush(&mut self) -> Result<(), StorageError> {
        if self.scheduler.is_pending(EditorTask::Persist) {
            self.save_now()?;
        }
        Ok(())
    }

    pub fn export_document(&self) -> CanvasDocument {
        codec::encode(&self.store, &self.theme)
    }

    pub fn export_json(&self) -> Result<String, serde_json::Error> {
        self.export_document().to_json()
    }

    pub fn import_json(&mut self, json: &str) -> Result<LoadReport, CanvasError> {
        let (document, warnings) = codec::decode(json)?;
        let mut report = self.load_document(&document);
        report.warnings = warnings
            .into_iter()
            .chain(std::mem::take(&mut report.warnings))
            .collect();
        Ok(report)
    }

    /// Replaces the canvas with `document` as one undoable step.
    pub fn load_document(&mut self, document: &CanvasDocument) -> LoadReport {
        self.interaction = InteractionState::Idle;
        self.history.push("Load document", &self.store);
        let report = codec::apply(&mut self.store, document, self.catalog.as_ref());
        self.theme = document.theme.clone();
        self.after_change();
        if report.warnings.is_empty() {
            self.notifier.success(format!(
                "Loaded {} items and {} connections",
                report.nodes_created, report.edges_created
            ));
        } else {
            self.notifier.warn(format!(
                "Loaded with {} warning(s); {} connection(s) dropped",
                report.warnings.len(),
                report.edges_dropped
            ));
        }
        report
    }

    /// Places a node of `kind` at the snapped `position`.
    pub fn add_node(&mut self, kind: &str, position: Position, mut attributes: Attributes) -> NodeId {
        let entry = self.catalog.resolve(kind);
        attributes
            .entry(NAME_ATTRIBUTE.to_string())
            .or_insert_with(|| entry.display_name.clone());
        let position = snap(position.clamp_to_canvas(), self.config.grid_unit);

        self.history
            .push(format!("Add {}", entry.display_name), &self.store);
        let id = self
            .store
            .add_node(kind, position, entry.default_size, attributes)
            .id
            .clone();
        self.after_change();
        debug!(node:% = id, kind, position:% = position; "Added node");
        id
    }

    /// Places a node at the first free grid cell.
    pub fn place_node(&mut self, kind: &str) -> NodeId {
        let position = self.free_spot(kind);
        self.add_node(kind, position, Attributes::new())
    }

    /// First grid cell where a node of `kind` would not overlap anything.
    pub fn free_spot(&self, kind: &str) -> Position {
        let size = self.catalog.resolve(kind).default_size;
        let grid = self.config.grid_unit;
        let occupied = self.store.obstacles_excluding(&[]);
        find_free_spot(
            size,
            &occupied,
            Position::new(grid * 2, grid * 2),
            grid,
            FREE_SPOT_COLUMNS,
            FREE_SPOT_PADDING,
        )
    }

    pub fn move_node(&mut self, id: &NodeId, position: Position) -> Result<(), CanvasError> {
        self.update_node(id, Some(position), None)
    }

    /// Moves and/or renames a node as a single undoable step.
    pub fn update_node(
        &mut self,
        id: &NodeId,
        position: Option<Position>,
        name: Option<&str>,
    ) -> Result<(), CanvasError> {
        let grid = self.config.grid_unit;
        let position = position.map(|position| snap(position.clamp_to_canvas(), grid));
        self.record("Edit node", |store| {
            if let Some(position) = position {
                store.move_node(id, position)?;
            }
            if let Some(name) = name {
                store.rename_node(id, name)?;
            }
            Ok(())
        })
    }

    pub fn rename_node(&mut self, id: &NodeId, name: &str) -> Result<(), CanvasError> {
        self.record("Rename node", |store| store.rename_node(id, name))
    }

    pub fn update_attributes(
        &mut self,
        id: &NodeId,
        patch: BTreeMap<String, Option<String>>,
    ) -> Result<(), CanvasError> {
        self.record("Edit details", |store| store.update_attributes(id, patch))
    }

    /// Deletes the node and its incident edges. Returns the number of edges removed.
    pub fn delete_node(&mut self, id: &NodeId) -> Result<usize, CanvasError> {
        self.record("Delete node", |store| store.delete_node(id).map(|edges| edges.len()))
    }

    /// Deletes every selected node as one undoable step. Returns how many were removed.
    pub fn delete_selection(&mut self) -> usize {
        let ids: Vec<NodeId> = self.store.selection().iter().cloned().collect();
        if ids.is_empty() {
            return 0;
        }
        let result = self.record("Delete selection", |store| {
            for id in &ids {
                store.delete_node(id)?;
            }
            Ok(ids.len())
        });
        match result {
            Ok(count) => {
                self.notifier.info(format!("Deleted {count} item(s)"));
                count
            }
            Err(err) => {
                self.notifier.error(err.to_string());
                0
            }
        }
    }

    /// Creates an auto-routed edge. Rejections are also posted as warnings.
    pub fn connect(&mut self, from: &NodeId, to: &NodeId) -> Result<EdgeId, CanvasError> {
        let kind = self.edge_kind_for(from);
        self.create_edge(from, to, kind, Routing::Auto)
    }

    pub fn connect_manual(
        &mut self,
        from: &NodeId,
        from_side: AnchorSide,
        to: &NodeId,
        to_side: AnchorSide,
    ) -> Result<EdgeId, CanvasError> {
        let kind = self.edge_kind_for(from);
        self.create_edge(
            from,
            to,
            kind,
            Routing::Manual {
                from: from_side,
                to: to_side,
            },
        )
    }

    pub fn delete_edge(&mut self, id: &EdgeId) -> Result<(), CanvasError> {
        self.record("Delete connection", |store| store.delete_edge(id).map(|_| ()))
    }

    pub fn set_selection<'a>(&mut self, ids: impl IntoIterator<Item = &'a NodeId>) {
        self.store.set_selection(ids);
    }

    pub fn select_all(&mut self) {
        self.store.select_all();
    }

    pub fn clear_selection(&mut self) {
        self.store.clear_selection();
    }

    pub fn clear_canvas(&mut self) {
        self.interaction = InteractionState::Idle;
        let _ = self.record("Clear canvas", |store| {
            store.clear();
            Ok(())
        });
    }

    pub fn undo(&mut self) -> bool {
        self.interaction = InteractionState::Idle;
        match self.history.undo(&mut self.store) {
            Some(label) => {
                self.after_change();
                self.notifier.info(format!("Undid: {label}"));
                true
            }
            None => {
                self.notifier.info("Nothing to undo");
                false
            }
        }
    }

    pub fn redo(&mut self) -> bool {
        self.interaction = InteractionState::Idle;
        match self.history.redo(&mut self.store) {
            Some(label) => {
                self.after_change();
                self.notifier.info(format!("Redid: {label}"));
                true
            }
            None => {
                self.notifier.info("Nothing to redo");
                false
            }
        }
    }

    /// Replaces the canvas with a built-in template as one undoable step.
    pub fn load_template(&mut self, name: &str) -> Result<LoadReport, CanvasError> {
        let template =
            find_template(name).ok_or_else(|| CanvasError::UnknownTemplate(name.to_string()))?;
        let grid = self.config.grid_unit;
        let items: Vec<_> = template
            .items
            .iter()
            .map(|item| {
                let entry = self.catalog.resolve(&item.kind);
                let mut attributes = Attributes::new();
                attributes.insert(
                    NAME_ATTRIBUTE.to_string(),
                    item.name.clone().unwrap_or_else(|| entry.display_name.clone()),
                );
                let kind = if entry.category == NodeCategory::Source {
                    EdgeKind::SourceToItem
                } else {
                    EdgeKind::Flow
                };
                (item.kind.clone(), snap(Position::new(item.x, item.y), grid), entry.default_size, attributes, kind)
            })
            .collect();

        self.interaction = InteractionState::Idle;
        let label = format!("Load template {}", template.name);
        let report = self.record(&label, |store| {
            let mut report = LoadReport::default();
            store.clear();
            let ids: Vec<NodeId> = items
                .iter()
                .map(|(kind, position, size, attributes, _)| {
                    store
                        .add_node(kind.as_str(), *position, *size, attributes.clone())
                        .id
                        .clone()
                })
                .collect();
            report.nodes_created = ids.len();

            for connection in &template.connections {
                let (Some(from), Some(to)) = (ids.get(connection.from), ids.get(connection.to)) else {
                    report.edges_dropped += 1;
                    report.warnings.push(format!(
                        "template connection {} -> {} is out of range",
                        connection.from, connection.to
                    ));
                    continue;
                };
                let kind = items[connection.from].4;
                match store.add_edge(from, to, kind, Routing::Auto) {
                    Ok(_) => report.edges_created += 1,
                    Err(err) => {
                        report.edges_dropped += 1;
                        report.warnings.push(err.to_string());
                    }
                }
            }
            Ok(report)
        })?;

        for message in &report.warnings {
            warn!("{message}");
        }
        self.notifier
            .success(format!("Loaded template '{}'", template.name));
        Ok(report)
    }

    pub fn set_mode(&mut self, mode: EditorMode) {
        if self.mode != mode {
            debug!(mode:? = mode; "Editor mode changed");
        }
        self.mode = mode;
        self.interaction = InteractionState::Idle;
        self.hovered_anchor = None;
        self.guides = Alignment::default();
    }

    /// Container resize notification; re-routing is throttled.
    pub fn notify_resize(&mut self) {
        let now = self.clock.now();
        self.scheduler
            .schedule_throttled(EditorTask::Reroute, self.config.resize_throttle, now);
    }

    /// Runs deferred work whose deadline has passed and returns what ran.
    pub fn tick(&mut self) -> Vec<EditorTask> {
        let due = self.scheduler.take_due(self.clock.now());
        for task in &due {
            match task {
                EditorTask::Persist => {
                    if let Err(err) = self.save_now() {
                        self.notifier.error(format!("Could not save canvas: {err}"));
                    }
                }
                EditorTask::Reroute => self.reroute_all(),
            }
        }
        due
    }

    pub fn is_pending(&self, task: EditorTask) -> bool {
        self.scheduler.is_pending(task)
    }

    pub fn render_svg(&self, background: &str) -> String {
        crate::svg::render_svg(&self.store, &self.routes, self.catalog.as_ref(), background)
    }

    pub(crate) fn reroute_all(&mut self) {
        self.routes = self.config.routing.route_all(&self.store);
    }

    pub(crate) fn reroute_nodes(&mut self, nodes: &[NodeId]) {
        self.config
            .routing
            .reroute_incident(&self.store, nodes, &mut self.routes);
    }

    pub(crate) fn schedule_persist(&mut self) {
        let now = self.clock.now();
        self.scheduler
            .schedule(EditorTask::Persist, self.config.persist_debounce, now);
    }

    /// Re-routes, clears the dirty flag and debounces a save.
    pub(crate) fn after_change(&mut self) {
        self.reroute_all();
        if self.store.take_dirty() {
            self.schedule_persist();
        }
    }

    pub(crate) fn is_fixed(&self, id: &NodeId) -> bool {
        self.store
            .node(id)
            .is_some_and(|node| self.catalog.resolve(&node.kind).fixed)
    }

    /// Runs `op` against the store; on success the pre-op state becomes one
    /// history entry. Operations that change nothing leave history alone.
    fn record<T>(
        &mut self,
        label: &str,
        op: impl FnOnce(&mut EntityStore) -> Result<T, CanvasError>,
    ) -> Result<T, CanvasError> {
        let before = self.store.snapshot(label);
        let mut scratch = self.store.clone();
        let value = op(&mut scratch)?;
        if scratch.revision() == self.store.revision() {
            return Ok(value);
        }
        self.store = scratch;
        self.history.push_snapshot(before);
        self.after_change();
        Ok(value)
    }

    fn create_edge(
        &mut self,
        from: &NodeId,
        to: &NodeId,
        kind: EdgeKind,
        routing: Routing,
    ) -> Result<EdgeId, CanvasError> {
        let result = self.record("Connect", |store| {
            store
                .add_edge(from, to, kind, routing)
                .map(|edge| edge.id.clone())
        });
        if let Err(err) = &result {
            if err.is_rejection() {
                self.notifier.warn(err.to_string());
            }
        }
        result
    }

    fn edge_kind_for(&self, from: &NodeId) -> EdgeKind {
        match self.store.node(from) {
            Some(node) if self.catalog.resolve(&node.kind).category == NodeCategory::Source => {
                EdgeKind::SourceToItem
            }
            _ => EdgeKind::Flow,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::CANVAS_EXTENT;
    use crate::notify::NoticeLevel;
    use crate::scheduler::ManualClock;
    use std::time::Duration;

    fn editor_with_clock() -> (CanvasEditor, ManualClock) {
        let clock = ManualClock::new();
        (CanvasEditor::in_memory().with_clock(clock.clone()), clock)
    }

    #[test]
    fn add_node_snaps_and_names_from_catalog() {
        let mut editor = CanvasEditor::in_memory();
        let id = editor.add_node("bronze", Position::new(113, 107), Attributes::new());
        let node = editor.store().node(&id).unwrap();
        assert_eq!(node.position, Position::new(120, 100));
        assert_eq!(node.name(), "Bronze");
        assert_eq!(editor.history().undo_len(), 1);
    }

    #[test]
    fn move_to_extreme_coordinates_stops_at_the_canvas_edge() {
        let mut editor = CanvasEditor::in_memory();
        let a = editor.add_node("bronze", Position::new(100, 100), Attributes::new());
        editor.move_node(&a, Position::new(i32::MAX - 5, 0)).unwrap();
        assert_eq!(editor.store().node(&a).unwrap().position, Position::new(CANVAS_EXTENT, 0));

        let b = editor.add_node("silver", Position::new(i32::MIN, i32::MAX), Attributes::new());
        assert_eq!(
            editor.store().node(&b).unwrap().position,
            Position::new(-CANVAS_EXTENT, CANVAS_EXTENT)
        );
        editor.connect(&a, &b).unwrap();
        assert_eq!(editor.routes().len(), 1);
    }

    #[test]
    fn unchanged_moves_and_renames_leave_history_alone() {
        let mut editor = CanvasEditor::in_memory();
        let a = editor.add_node("bronze", Position::new(100, 100), Attributes::new());
        editor.move_node(&a, Position::new(103, 96)).unwrap();
        editor.update_node(&a, None, Some("Bronze")).unwrap();
        assert_eq!(editor.history().undo_len(), 1);
    }

    #[test]
    fn move_and_rename_is_one_step_and_rolls_back_together() {
        let mut editor = CanvasEditor::in_memory();
        let a = editor.add_node("bronze", Position::new(100, 100), Attributes::new());
        editor
            .update_node(&a, Some(Position::new(300, 200)), Some("Raw events"))
            .unwrap();
        assert_eq!(editor.history().undo_len(), 2);

        assert!(editor.undo());
        let node = editor.store().node(&a).unwrap();
        assert_eq!(node.position, Position::new(100, 100));
        assert_eq!(node.name(), "Bronze");

        let ghost = NodeId::from("ghost".to_string());
        let err = editor
            .update_node(&ghost, Some(Position::new(0, 0)), Some("x"))
            .unwrap_err();
        assert_eq!(err, CanvasError::UnknownNode(ghost));
    }

    #[test]
    fn rejected_connections_post_warnings_and_skip_history() {
        let mut editor = CanvasEditor::in_memory();
        let a = editor.add_node("bronze", Position::new(100, 100), Attributes::new());
        let before = editor.history().undo_len();
        let err = editor.connect(&a, &a).unwrap_err();
        assert_eq!(err, CanvasError::SelfLoopRejected(a));
        assert_eq!(editor.history().undo_len(), before);
        let notice = editor.notices().last().unwrap();
        assert_eq!(notice.level, NoticeLevel::Warning);
    }

    #[test]
    fn source_nodes_create_source_edges() {
        let mut editor = CanvasEditor::in_memory();
        let source = editor.add_node("data-source", Position::new(0, 0), Attributes::new());
        let item = editor.add_node("bronze", Position::new(300, 0), Attributes::new());
        let edge = editor.connect(&source, &item).unwrap();
        assert_eq!(editor.store().edge(&edge).unwrap().kind, EdgeKind::SourceToItem);
        assert_eq!(editor.route(&edge).unwrap().from_anchor, AnchorSide::Right);
    }

    #[test]
    fn persistence_is_debounced() {
        let (mut editor, clock) = editor_with_clock();
        editor.add_node("bronze", Position::new(0, 0), Attributes::new());
        clock.advance(Duration::from_millis(300));
        editor.add_node("silver", Position::new(300, 0), Attributes::new());
        clock.advance(Duration::from_millis(300));
        assert!(editor.tick().is_empty());
        clock.advance(Duration::from_millis(200));
        assert_eq!(editor.tick(), vec![EditorTask::Persist]);
        assert!(!editor.is_pending(EditorTask::Persist));
    }

    #[test]
    fn resize_reroutes_are_throttled() {
        let (mut editor, clock) = editor_with_clock();
        editor.notify_resize();
        clock.advance(Duration::from_millis(50));
        editor.notify_resize();
        clock.advance(Duration::from_millis(50));
        assert_eq!(editor.tick(), vec![EditorTask::Reroute]);
    }

    #[test]
    fn undo_on_empty_history_posts_info() {
        let mut editor = CanvasEditor::in_memory();
        assert!(!editor.undo());
        let notice = editor.drain_notices().pop().unwrap();
        assert_eq!(notice.level, NoticeLevel::Info);
    }

    #[test]
    fn template_load_is_one_history_entry() {
        let mut editor = CanvasEditor::in_memory();
        editor.add_node("gold", Position::new(0, 0), Attributes::new());
        let report = editor.load_template("medallion").unwrap();
        assert_eq!(report.nodes_created, 5);
        assert_eq!(report.edges_created, 4);
        assert!(report.warnings.is_empty());
        assert_eq!(editor.routes().len(), 4);
        assert_eq!(editor.history().undo_len(), 2);

        assert!(editor.undo());
        assert_eq!(editor.store().node_count(), 1);
        assert!(matches!(
            editor.load_template("nope"),
            Err(CanvasError::UnknownTemplate(_))
        ));
    }

    #[test]
    fn restore_reads_saved_document() {
        let (mut editor, _) = editor_with_clock();
        let a = editor.add_node("bronze", Position::new(100, 100), Attributes::new());
        let b = editor.add_node("silver", Position::new(300, 100), Attributes::new());
        editor.connect(&a, &b).unwrap();
        let json = editor.export_json().unwrap();

        let storage = MemoryStore::with_entry(crate::DEFAULT_STORAGE_KEY, json);
        let mut restored = CanvasEditor::new(EditorConfig::builtin(), Catalog::builtin(), storage);
        let report = restored.restore().unwrap().unwrap();
        assert_eq!(report.nodes_created, 2);
        assert_eq!(report.edges_created, 1);
        assert!(restored.store().contains_node(&a));
        assert!(!restored.history().can_undo());
    }

    #[test]
    fn malformed_saved_document_is_reported() {
        let storage = MemoryStore::with_entry(crate::DEFAULT_STORAGE_KEY, "[1, 2]");
        let mut editor = CanvasEditor::new(EditorConfig::builtin(), Catalog::builtin(), storage);
        assert_eq!(editor.restore().unwrap(), None);
        assert_eq!(editor.notices().count(), 1);
    }

    #[test]
    fn place_node_avoids_existing_nodes() {
        let mut editor = CanvasEditor::in_memory();
        let first = editor.place_node("bronze");
        let second = editor.place_node("silver");
        let a = editor.store().node_rect(&first).unwrap();
        let b = editor.store().node_rect(&second).unwrap();
        assert!(!crate::geometry::rects_overlap(a, b));
    }
}
