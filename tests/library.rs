use std::time::Duration;

use anyhow::Result;
use archdraw::editor::EditorTask;
use archdraw::{
    AnchorSide, Attributes, CanvasEditor, CanvasError, Catalog, EditorConfig, FileStore,
    InputEvent, ManualClock, Modifiers, Position,
};
use tempfile::tempdir;

fn side_by_side(editor: &mut CanvasEditor) -> (archdraw::NodeId, archdraw::NodeId) {
    let a = editor.add_node("bronze", Position::new(100, 100), Attributes::new());
    let b = editor.add_node("silver", Position::new(300, 100), Attributes::new());
    (a, b)
}

#[test]
fn auto_edge_between_side_by_side_nodes_leaves_right_enters_left() -> Result<()> {
    let mut editor = CanvasEditor::in_memory();
    let (a, b) = side_by_side(&mut editor);

    let edge = editor.connect(&a, &b)?;
    let route = editor.route(&edge).expect("edge should be routed");

    assert_eq!(route.from_anchor, AnchorSide::Right);
    assert_eq!(route.to_anchor, AnchorSide::Left);
    assert_eq!(editor.store().edge_count(), 1);
    Ok(())
}

#[test]
fn deleting_a_node_removes_its_edges() -> Result<()> {
    let mut editor = CanvasEditor::in_memory();
    let (a, b) = side_by_side(&mut editor);
    editor.connect(&a, &b)?;

    let removed = editor.delete_node(&b)?;

    assert_eq!(removed, 1);
    assert_eq!(editor.store().node_count(), 1);
    assert_eq!(editor.store().edge_count(), 0);
    assert!(editor.routes().is_empty());
    Ok(())
}

#[test]
fn self_loops_and_duplicates_are_rejected() -> Result<()> {
    let mut editor = CanvasEditor::in_memory();
    let (a, b) = side_by_side(&mut editor);

    assert!(matches!(
        editor.connect(&a, &a),
        Err(CanvasError::SelfLoopRejected(_))
    ));
    editor.connect(&a, &b)?;
    assert!(matches!(
        editor.connect(&a, &b),
        Err(CanvasError::DuplicateEdgeRejected { .. })
    ));
    assert_eq!(editor.store().edge_count(), 1);
    Ok(())
}

#[test]
fn dangling_connection_is_dropped_with_one_warning() -> Result<()> {
    let document = r#"{
        "version": "2.0",
        "items": [
            { "id": "a", "type": "bronze", "x": 100, "y": 100 },
            { "id": "b", "type": "silver", "x": 300, "y": 100 }
        ],
        "connections": [
            { "id": "e1", "from": "a", "to": "ghost" }
        ]
    }"#;

    let mut editor = CanvasEditor::in_memory();
    let report = editor.import_json(document)?;

    assert_eq!(editor.store().node_count(), 2);
    assert_eq!(editor.store().edge_count(), 0);
    assert_eq!(report.edges_dropped, 1);
    assert_eq!(report.warnings.len(), 1);
    Ok(())
}

#[test]
fn non_object_document_is_malformed() {
    let mut editor = CanvasEditor::in_memory();
    assert!(matches!(
        editor.import_json("[1, 2, 3]"),
        Err(CanvasError::MalformedDocument(_))
    ));
}

#[test]
fn move_snaps_to_grid() -> Result<()> {
    let mut editor = CanvasEditor::in_memory();
    let a = editor.add_node("bronze", Position::new(100, 100), Attributes::new());

    editor.move_node(&a, Position::new(113, 107))?;

    assert_eq!(
        editor.store().node(&a).map(|node| node.position),
        Some(Position::new(120, 100))
    );
    Ok(())
}

#[test]
fn pointer_drag_lands_on_grid() {
    let mut editor = CanvasEditor::in_memory();
    let a = editor.add_node("bronze", Position::new(100, 100), Attributes::new());

    editor.handle_event(InputEvent::PointerDown {
        x: 150.0,
        y: 130.0,
        modifiers: Modifiers::NONE,
    });
    editor.handle_event(InputEvent::PointerMove { x: 163.0, y: 137.0 });
    editor.handle_event(InputEvent::PointerUp {
        x: 163.0,
        y: 137.0,
        modifiers: Modifiers::NONE,
    });

    assert_eq!(
        editor.store().node(&a).map(|node| node.position),
        Some(Position::new(120, 100))
    );
    assert!(editor.interaction().is_idle());
    assert!(editor.history().can_undo());
}

#[test]
fn undo_and_redo_walk_history() -> Result<()> {
    let mut editor = CanvasEditor::in_memory();
    let (a, b) = side_by_side(&mut editor);
    editor.connect(&a, &b)?;

    assert!(editor.undo());
    assert_eq!(editor.store().edge_count(), 0);
    assert_eq!(editor.store().node_count(), 2);

    assert!(editor.redo());
    assert_eq!(editor.store().edge_count(), 1);
    assert!(!editor.redo());
    Ok(())
}

#[test]
fn template_round_trips_through_json() -> Result<()> {
    let mut editor = CanvasEditor::in_memory();
    let report = editor.load_template("medallion")?;
    assert_eq!(report.nodes_created, 5);
    assert_eq!(report.edges_created, 4);

    let json = editor.export_json()?;
    let mut reloaded = CanvasEditor::in_memory();
    let report = reloaded.import_json(&json)?;

    assert!(report.warnings.is_empty());
    let original: Vec<_> = editor.store().nodes().map(|n| (n.id.clone(), n.position)).collect();
    let restored: Vec<_> = reloaded.store().nodes().map(|n| (n.id.clone(), n.position)).collect();
    assert_eq!(original, restored);
    assert_eq!(reloaded.store().edge_count(), 4);
    Ok(())
}

#[test]
fn unknown_template_is_an_error() {
    let mut editor = CanvasEditor::in_memory();
    assert!(matches!(
        editor.load_template("nope"),
        Err(CanvasError::UnknownTemplate(_))
    ));
    assert_eq!(editor.store().node_count(), 0);
}

#[test]
fn persistence_is_debounced_and_restorable() -> Result<()> {
    let dir = tempdir()?;
    let clock = ManualClock::new();
    let mut editor = CanvasEditor::new(
        EditorConfig::builtin(),
        Catalog::builtin(),
        FileStore::new(dir.path()),
    )
    .with_clock(clock.clone());

    let (a, b) = side_by_side(&mut editor);
    editor.connect(&a, &b)?;
    assert!(editor.is_pending(EditorTask::Persist));
    assert!(editor.tick().is_empty());

    clock.advance(Duration::from_millis(501));
    assert_eq!(editor.tick(), vec![EditorTask::Persist]);
    assert!(dir.path().join("archdraw-canvas.json").exists());

    let mut restored = CanvasEditor::new(
        EditorConfig::builtin(),
        Catalog::builtin(),
        FileStore::new(dir.path()),
    );
    let report = restored.restore()?.expect("a canvas was saved");
    assert_eq!(report.nodes_created, 2);
    assert_eq!(report.edges_created, 1);
    assert!(!restored.history().can_undo());
    Ok(())
}
