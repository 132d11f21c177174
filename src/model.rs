use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

use crate::geometry::{AnchorSide, Position, Rect, Size};

/// Open key/value metadata attached to a node.
pub type Attributes = BTreeMap<String, String>;

pub const NAME_ATTRIBUTE: &str = "name";

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(String);

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EdgeId(String);

macro_rules! impl_identifier {
    ($ty:ident, $prefix:literal) => {
        impl $ty {
            pub fn generate() -> Self {
                Self(format!(concat!($prefix, "-{}"), Uuid::new_v4().simple()))
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }

            pub fn is_empty(&self) -> bool {
                self.0.trim().is_empty()
            }
        }

        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $ty {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }

        impl From<String> for $ty {
            fn from(value: String) -> Self {
                Self(value)
            }
        }

        impl AsRef<str> for $ty {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

impl_identifier!(NodeId, "node");
impl_identifier!(EdgeId, "edge");

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    pub id: NodeId,
    pub kind: String,
    pub position: Position,
    pub size: Size,
    #[serde(default)]
    pub attributes: Attributes,
}

impl Node {
    pub fn rect(&self) -> Rect {
        Rect::from_position(self.position, self.size)
    }

    /// Display name, falling back to the kind tag.
    pub fn name(&self) -> &str {
        self.attributes
            .get(NAME_ATTRIBUTE)
            .map(String::as_str)
            .filter(|name| !name.trim().is_empty())
            .unwrap_or(&self.kind)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EdgeKind {
    #[default]
    Flow,
    /// Leaves a data-source entry; its source anchor is pinned to the right side.
    SourceToItem,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Routing {
    #[default]
    Auto,
    Manual { from: AnchorSide, to: AnchorSide },
}

impl Routing {
    pub fn anchors(&self) -> (Option<AnchorSide>, Option<AnchorSide>) {
        match *self {
            Routing::Auto => (None, None),
            Routing::Manual { from, to } => (Some(from), Some(to)),
        }
    }

    pub fn is_manual(&self) -> bool {
        matches!(self, Routing::Manual { .. })
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Routing::Auto => "auto",
            Routing::Manual { .. } => "manual",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Edge {
    pub id: EdgeId,
    pub from: NodeId,
    pub to: NodeId,
    pub kind: EdgeKind,
    pub routing: Routing,
}

/// Uniqueness key of an edge: endpoints plus anchors.
pub type EdgeKey = (NodeId, NodeId, Option<AnchorSide>, Option<AnchorSide>);

impl Edge {
    pub fn key(&self) -> EdgeKey {
        let (from_anchor, to_anchor) = self.routing.anchors();
        (self.from.clone(), self.to.clone(), from_anchor, to_anchor)
    }

    pub fn touches(&self, node_id: &NodeId) -> bool {
        &self.from == node_id || &self.to == node_id
    }
}

pub fn edge_identifier(edge: &Edge) -> String {
    let (from_anchor, to_anchor) = edge.routing.anchors();
    match (from_anchor, to_anchor) {
        (Some(a), Some(b)) => format!("{}:{} -> {}:{}", edge.from, a, edge.to, b),
        _ => format!("{} -> {}", edge.from, edge.to),
    }
}
