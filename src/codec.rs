use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use log::{debug, warn};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use crate::catalog::NodeCatalog;
use crate::error::CanvasError;
use crate::geometry::{AnchorSide, Position, Size};
use crate::model::{Attributes, EdgeId, EdgeKind, NAME_ATTRIBUTE, Node, NodeId, Routing};
use crate::store::EntityStore;
use crate::{CANVAS_EXTENT, DEFAULT_THEME, DOCUMENT_VERSION};

/// Portable form of the canvas, as written to the key-value store and exported.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CanvasDocument {
    pub version: String,
    pub theme: String,
    #[serde(default)]
    pub items: Vec<NodeRecord>,
    #[serde(default)]
    pub connections: Vec<EdgeRecord>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sources: Vec<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub saved_at: Option<DateTime<Utc>>,
}

impl Default for CanvasDocument {
    fn default() -> Self {
        Self {
            version: DOCUMENT_VERSION.to_string(),
            theme: DEFAULT_THEME.to_string(),
            items: Vec::new(),
            connections: Vec::new(),
            sources: Vec::new(),
            saved_at: None,
        }
    }
}

impl CanvasDocument {
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(alias = "type")]
    pub kind: String,
    #[serde(deserialize_with = "lenient_coordinate")]
    pub x: i32,
    #[serde(deserialize_with = "lenient_coordinate")]
    pub y: i32,
    #[serde(
        default,
        deserialize_with = "lenient_dimension",
        skip_serializing_if = "Option::is_none"
    )]
    pub width: Option<i32>,
    #[serde(
        default,
        deserialize_with = "lenient_dimension",
        skip_serializing_if = "Option::is_none"
    )]
    pub height: Option<i32>,
    #[serde(default, deserialize_with = "lenient_attributes")]
    pub attributes: Attributes,
    /// Older documents stored the label next to the kind.
    #[serde(default, skip_serializing)]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoutingMode {
    #[default]
    Auto,
    Manual,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EdgeRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(alias = "fromId")]
    pub from: EndpointRef,
    #[serde(alias = "toId")]
    pub to: EndpointRef,
    #[serde(default)]
    pub routing: RoutingMode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from_anchor: Option<AnchorSide>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to_anchor: Option<AnchorSide>,
    #[serde(default)]
    pub kind: EdgeKind,
}

/// A connection endpoint: an item id, or a position in the item list as
/// written by legacy documents. Only JSON numbers are positions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum EndpointRef {
    Index(usize),
    Id(String),
}

impl From<&NodeId> for EndpointRef {
    fn from(id: &NodeId) -> Self {
        Self::Id(id.to_string())
    }
}

impl std::fmt::Display for EndpointRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Index(index) => write!(f, "#{index}"),
            Self::Id(id) => f.write_str(id),
        }
    }
}

impl<'de> Deserialize<'de> for EndpointRef {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        match Value::deserialize(deserializer)? {
            Value::String(text) => Ok(Self::Id(text)),
            Value::Number(number) => Ok(match number.as_u64().and_then(|n| usize::try_from(n).ok()) {
                Some(index) => Self::Index(index),
                // negative or fractional positions never resolve
                None => Self::Id(number.to_string()),
            }),
            other => Err(serde::de::Error::custom(format!(
                "expected an endpoint id, found {other}"
            ))),
        }
    }
}

/// Outcome of applying a document to the store.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadReport {
    pub nodes_created: usize,
    pub nodes_reissued: usize,
    pub edges_created: usize,
    pub edges_dropped: usize,
    pub warnings: Vec<String>,
}

impl LoadReport {
    fn warn(&mut self, message: String) {
        warn!("{message}");
        self.warnings.push(message);
    }
}

fn lenient_coordinate<'de, D>(deserializer: D) -> Result<i32, D::Error>
where
    D: Deserializer<'de>,
{
    let value = f64::deserialize(deserializer)?;
    let extent = f64::from(CANVAS_EXTENT);
    // NaN casts to 0
    Ok(value.round().clamp(-extent, extent) as i32)
}

fn lenient_dimension<'de, D>(deserializer: D) -> Result<Option<i32>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<f64>::deserialize(deserializer)?;
    Ok(value
        .map(|v| v.round().min(f64::from(CANVAS_EXTENT)) as i32)
        .filter(|v| *v > 0))
}

fn lenient_attributes<'de, D>(deserializer: D) -> Result<Attributes, D::Error>
where
    D: Deserializer<'de>,
{
    let map = Option::<Map<String, Value>>::deserialize(deserializer)?.unwrap_or_default();
    Ok(map
        .into_iter()
        .filter_map(|(key, value)| match value {
            Value::Null => None,
            Value::String(text) => Some((key, text)),
            other => Some((key, other.to_string())),
        })
        .collect())
}

/// Captures the store as a document. Edges repeating an earlier tuple are skipped.
pub fn encode(store: &EntityStore, theme: &str) -> CanvasDocument {
    let items = store
        .nodes()
        .map(|node| NodeRecord {
            id: Some(node.id.to_string()),
            kind: node.kind.clone(),
            x: node.position.x,
            y: node.position.y,
            width: Some(node.size.width),
            height: Some(node.size.height),
            attributes: node.attributes.clone(),
            name: None,
        })
        .collect();

    let mut seen = HashSet::new();
    let connections = store
        .edges()
        .iter()
        .filter(|edge| seen.insert(edge.key()))
        .map(|edge| {
            let (from_anchor, to_anchor) = edge.routing.anchors();
            EdgeRecord {
                id: Some(edge.id.to_string()),
                from: EndpointRef::from(&edge.from),
                to: EndpointRef::from(&edge.to),
                routing: if edge.routing.is_manual() {
                    RoutingMode::Manual
                } else {
                    RoutingMode::Auto
                },
                from_anchor,
                to_anchor,
                kind: edge.kind,
            }
        })
        .collect();

    CanvasDocument {
        version: DOCUMENT_VERSION.to_string(),
        theme: theme.to_string(),
        items,
        connections,
        sources: store.sources().to_vec(),
        saved_at: Some(Utc::now()),
    }
}

/// Tolerant parse. Only a top level that is not a JSON object is fatal; bad
/// containers and entries are skipped and reported as warnings.
pub fn decode(json: &str) -> Result<(CanvasDocument, Vec<String>), CanvasError> {
    let value: Value = serde_json::from_str(json)
        .map_err(|err| CanvasError::MalformedDocument(err.to_string()))?;
    let Value::Object(mut root) = value else {
        return Err(CanvasError::MalformedDocument(
            "top-level value must be an object".to_string(),
        ));
    };

    let mut warnings = Vec::new();
    let mut document = CanvasDocument::default();

    if let Some(Value::String(version)) = root.remove("version") {
        document.version = version;
    }
    if let Some(Value::String(theme)) = root.remove("theme") {
        document.theme = theme;
    }

    document.items = decode_list(root.remove("items"), "items", &mut warnings);
    document.connections = decode_list(root.remove("connections"), "connections", &mut warnings);

    match root.remove("sources") {
        None | Some(Value::Null) => {}
        Some(Value::Array(sources)) => document.sources = sources,
        Some(_) => warnings.push("ignoring 'sources': expected an array".to_string()),
    }

    match root.remove("savedAt") {
        None | Some(Value::Null) => {}
        Some(value) => match serde_json::from_value(value) {
            Ok(saved_at) => document.saved_at = Some(saved_at),
            Err(err) => warnings.push(format!("ignoring 'savedAt': {err}")),
        },
    }

    for message in &warnings {
        warn!("{message}");
    }

    Ok((document, warnings))
}

fn decode_list<T>(value: Option<Value>, field: &str, warnings: &mut Vec<String>) -> Vec<T>
where
    T: for<'de> Deserialize<'de>,
{
    match value {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Array(entries)) => entries
            .into_iter()
            .enumerate()
            .filter_map(|(index, entry)| match serde_json::from_value(entry) {
                Ok(record) => Some(record),
                Err(err) => {
                    warnings.push(format!("skipping {field}[{index}]: {err}"));
                    None
                }
            })
            .collect(),
        Some(_) => {
            warnings.push(format!("ignoring '{field}': expected an array"));
            Vec::new()
        }
    }
}

/// Replaces the store's contents with `document`.
///
/// All nodes are created first, keeping their saved ids. String endpoints then
/// resolve through the saved-id lookup and the live store. Numeric endpoints
/// index the created items, as legacy documents expect.
pub fn apply(store: &mut EntityStore, document: &CanvasDocument, catalog: &dyn NodeCatalog) -> LoadReport {
    let mut report = LoadReport::default();
    store.clear();

    let mut lookup: HashMap<&str, NodeId> = HashMap::new();
    let mut created: Vec<NodeId> = Vec::with_capacity(document.items.len());

    for (index, record) in document.items.iter().enumerate() {
        let saved = record.id.as_deref().map(str::trim).filter(|id| !id.is_empty());
        let id = match saved {
            Some(saved) if !store.contains_node(&NodeId::from(saved)) => NodeId::from(saved),
            Some(saved) => {
                report.nodes_reissued += 1;
                let fresh = NodeId::generate();
                report.warn(format!("item {index}: duplicate id '{saved}' re-issued as '{fresh}'"));
                fresh
            }
            None => {
                debug!(index; "Backfilling missing item id");
                NodeId::generate()
            }
        };

        let entry = catalog.resolve(&record.kind);
        let size = Size::new(
            record.width.unwrap_or(entry.default_size.width),
            record.height.unwrap_or(entry.default_size.height),
        );
        let mut attributes = record.attributes.clone();
        if let Some(name) = record.name.as_ref().filter(|name| !name.trim().is_empty()) {
            attributes
                .entry(NAME_ATTRIBUTE.to_string())
                .or_insert_with(|| name.clone());
        }

        let node = Node {
            id: id.clone(),
            kind: record.kind.clone(),
            position: Position::new(record.x, record.y),
            size,
            attributes,
        };
        match store.insert_node(node) {
            Ok(_) => {
                report.nodes_created += 1;
                if let Some(saved) = saved {
                    lookup.entry(saved).or_insert_with(|| id.clone());
                }
                created.push(id);
            }
            Err(err) => report.warn(format!("item {index}: {err}")),
        }
    }

    for (index, record) in document.connections.iter().enumerate() {
        let from = resolve_endpoint(&record.from, &lookup, store, &created);
        let to = resolve_endpoint(&record.to, &lookup, store, &created);
        let (Some(from), Some(to)) = (from, to) else {
            report.edges_dropped += 1;
            report.warn(format!(
                "connection {index}: dropped dangling edge '{}' -> '{}'",
                record.from, record.to
            ));
            continue;
        };

        let routing = match (record.routing, record.from_anchor, record.to_anchor) {
            (RoutingMode::Manual, Some(from), Some(to)) => Routing::Manual { from, to },
            (RoutingMode::Manual, _, _) => {
                report.warn(format!(
                    "connection {index}: manual routing without both anchors, using auto"
                ));
                Routing::Auto
            }
            (RoutingMode::Auto, _, _) => Routing::Auto,
        };

        let id = record
            .id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .map(EdgeId::from)
            .unwrap_or_else(EdgeId::generate);

        match store.add_edge_with_id(id, &from, &to, record.kind, routing) {
            Ok(_) => report.edges_created += 1,
            Err(err) => {
                report.edges_dropped += 1;
                report.warn(format!("connection {index}: {err}"));
            }
        }
    }

    store.set_sources(document.sources.clone());
    debug!(
        nodes = report.nodes_created,
        edges = report.edges_created,
        dropped = report.edges_dropped;
        "Applied canvas document"
    );
    report
}

fn resolve_endpoint(
    reference: &EndpointRef,
    lookup: &HashMap<&str, NodeId>,
    store: &EntityStore,
    created: &[NodeId],
) -> Option<NodeId> {
    match reference {
        EndpointRef::Index(index) => created.get(*index).cloned(),
        EndpointRef::Id(reference) => {
            let reference = reference.trim();
            if let Some(id) = lookup.get(reference) {
                return Some(id.clone());
            }
            let direct = NodeId::from(reference);
            store.contains_node(&direct).then_some(direct)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::Catalog;
    use proptest::prelude::*;

    fn load(json: &str) -> (EntityStore, LoadReport) {
        let (document, warnings) = decode(json).expect("decodes");
        let mut store = EntityStore::new();
        let mut report = apply(&mut store, &document, &Catalog::builtin());
        let mut all = warnings;
        all.append(&mut report.warnings);
        report.warnings = all;
        (store, report)
    }

    #[test]
    fn non_object_documents_are_malformed() {
        assert!(matches!(decode("[]"), Err(CanvasError::MalformedDocument(_))));
        assert!(matches!(decode("not json"), Err(CanvasError::MalformedDocument(_))));
    }

    #[test]
    fn dangling_edges_are_dropped_with_one_warning() {
        let (store, report) = load(
            r#"{"version":"2.0","theme":"light",
                "items":[{"id":"a","kind":"bronze","x":100,"y":100},
                         {"id":"b","kind":"silver","x":300,"y":100}],
                "connections":[{"id":"e1","from":"a","to":"ghost"}]}"#,
        );
        assert_eq!(store.node_count(), 2);
        assert_eq!(store.edge_count(), 0);
        assert_eq!(report.edges_dropped, 1);
        assert_eq!(report.warnings.len(), 1);
    }

    #[test]
    fn tolerant_decoding_skips_bad_entries() {
        let (store, report) = load(
            r#"{"items":[{"id":"a","kind":"bronze","x":100.4,"y":99.6},
                         {"id":"broken"},
                         {"id":"b","type":"silver","x":300,"y":100,"attributes":{"tier":2}}],
                "connections":{"oops":true}}"#,
        );
        assert_eq!(store.node_count(), 2);
        let a = store.node(&NodeId::from("a")).unwrap();
        assert_eq!(a.position, Position::new(100, 100));
        let b = store.node(&NodeId::from("b")).unwrap();
        assert_eq!(b.kind, "silver");
        assert_eq!(b.attributes.get("tier").map(String::as_str), Some("2"));
        assert_eq!(report.warnings.len(), 2);
    }

    #[test]
    fn legacy_aliases_and_indices_resolve() {
        let (store, report) = load(
            r#"{"items":[{"kind":"bronze","x":0,"y":0,"name":"Raw"},
                         {"kind":"silver","x":200,"y":0}],
                "connections":[{"fromId":0,"toId":1}]}"#,
        );
        assert!(report.warnings.is_empty(), "{:?}", report.warnings);
        assert_eq!(store.edge_count(), 1);
        let first = store.nodes().next().unwrap();
        assert_eq!(first.name(), "Raw");
        assert!(!first.id.is_empty());
    }

    #[test]
    fn digit_string_endpoints_are_ids_not_positions() {
        let (store, report) = load(
            r#"{"items":[{"id":"a","kind":"bronze","x":0,"y":0},
                         {"id":"b","kind":"silver","x":200,"y":0}],
                "connections":[{"from":"a","to":"1"}]}"#,
        );
        assert_eq!(store.edge_count(), 0);
        assert_eq!(report.edges_dropped, 1);
        assert_eq!(report.warnings.len(), 1);
        assert!(report.warnings[0].contains("'a' -> '1'"), "{}", report.warnings[0]);
    }

    #[test]
    fn out_of_range_coordinates_are_clamped_on_load() {
        let (store, report) = load(
            r#"{"items":[{"id":"far","kind":"bronze","x":1e12,"y":-9007199254740993,
                          "width":3e9,"height":80}]}"#,
        );
        assert!(report.warnings.is_empty(), "{:?}", report.warnings);
        let far = store.node(&NodeId::from("far")).unwrap();
        assert_eq!(far.position, Position::new(CANVAS_EXTENT, -CANVAS_EXTENT));
        assert_eq!(far.size, Size::new(CANVAS_EXTENT, 80));
    }

    #[test]
    fn duplicate_item_ids_are_reissued() {
        let (store, report) = load(
            r#"{"items":[{"id":"a","kind":"bronze","x":0,"y":0},
                         {"id":"a","kind":"silver","x":200,"y":0}]}"#,
        );
        assert_eq!(store.node_count(), 2);
        assert_eq!(report.nodes_reissued, 1);
    }

    #[test]
    fn duplicate_and_self_loop_edges_are_purged_on_load() {
        let (store, report) = load(
            r#"{"items":[{"id":"a","kind":"bronze","x":0,"y":0},
                         {"id":"b","kind":"silver","x":200,"y":0}],
                "connections":[{"from":"a","to":"b"},{"from":"a","to":"b"},{"from":"a","to":"a"}]}"#,
        );
        assert_eq!(store.edge_count(), 1);
        assert_eq!(report.edges_dropped, 2);
    }

    #[test]
    fn manual_edge_without_anchors_falls_back_to_auto() {
        let (store, report) = load(
            r#"{"items":[{"id":"a","kind":"bronze","x":0,"y":0},
                         {"id":"b","kind":"silver","x":200,"y":0}],
                "connections":[{"from":"a","to":"b","routing":"manual","fromAnchor":"bottom"}]}"#,
        );
        assert_eq!(store.edges()[0].routing, Routing::Auto);
        assert_eq!(report.warnings.len(), 1);
    }

    #[test]
    fn sources_round_trip_verbatim() -> anyhow::Result<()> {
        let (store, _) = load(
            r#"{"items":[],"sources":[{"id":"s1","name":"CRM","extra":{"k":[1,2]}}]}"#,
        );
        let json = encode(&store, "dark").to_json()?;
        let (document, warnings) = decode(&json)?;
        assert!(warnings.is_empty());
        assert_eq!(document.theme, "dark");
        assert_eq!(document.sources, store.sources());
        Ok(())
    }

    proptest! {
        #[test]
        fn round_trip_preserves_nodes_and_edge_tuples(
            coords in proptest::collection::vec((-500i32..500, -500i32..500), 1..8),
            links in proptest::collection::vec((0usize..8, 0usize..8, any::<bool>()), 0..12),
        ) {
            let mut store = EntityStore::new();
            let ids: Vec<NodeId> = coords
                .iter()
                .map(|(x, y)| {
                    store
                        .add_node("bronze", Position::new(*x, *y), Size::new(160, 80), Attributes::new())
                        .id
                        .clone()
                })
                .collect();
            for (from, to, manual) in links {
                let (Some(from), Some(to)) = (ids.get(from), ids.get(to)) else { continue };
                let routing = if manual {
                    Routing::Manual { from: AnchorSide::Bottom, to: AnchorSide::Top }
                } else {
                    Routing::Auto
                };
                let _ = store.add_edge(from, to, EdgeKind::Flow, routing);
            }

            let json = encode(&store, DEFAULT_THEME).to_json().unwrap();
            let (document, warnings) = decode(&json).unwrap();
            prop_assert!(warnings.is_empty());
            let mut restored = EntityStore::new();
            let report = apply(&mut restored, &document, &Catalog::builtin());
            prop_assert!(report.warnings.is_empty());

            let before: Vec<_> = store.nodes().map(|n| (n.id.clone(), n.kind.clone(), n.position)).collect();
            let after: Vec<_> = restored.nodes().map(|n| (n.id.clone(), n.kind.clone(), n.position)).collect();
            prop_assert_eq!(before, after);

            let before: Vec<_> = store.edges().iter().map(|e| e.key()).collect();
            let after: Vec<_> = restored.edges().iter().map(|e| e.key()).collect();
            prop_assert_eq!(before, after);
        }
    }
}
