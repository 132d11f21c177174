use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::CanvasError;
use crate::geometry::Size;
use crate::{DEFAULT_NODE_HEIGHT, DEFAULT_NODE_WIDTH};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeCategory {
    Medallion,
    Source,
    Storage,
    Dataset,
    Consumption,
    Zone,
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogEntry {
    pub kind: String,
    pub display_name: String,
    #[serde(default)]
    pub icon: String,
    pub category: NodeCategory,
    pub default_size: Size,
    /// Fixed entries never move with drags.
    #[serde(default)]
    pub fixed: bool,
}

impl CatalogEntry {
    fn new(kind: &str, display_name: &str, icon: &str, category: NodeCategory, size: Size) -> Self {
        Self {
            kind: kind.to_string(),
            display_name: display_name.to_string(),
            icon: icon.to_string(),
            category,
            default_size: size,
            fixed: false,
        }
    }

    fn fixed(mut self) -> Self {
        self.fixed = true;
        self
    }

    /// Entry used for kinds the catalog has never heard of.
    pub fn fallback(kind: &str) -> Self {
        Self::new(
            kind,
            kind,
            "box",
            NodeCategory::Other,
            Size::new(DEFAULT_NODE_WIDTH, DEFAULT_NODE_HEIGHT),
        )
    }
}

/// Read-only kind → presentation lookup.
pub trait NodeCatalog: Send + Sync {
    fn lookup(&self, kind: &str) -> Option<&CatalogEntry>;

    fn entries(&self) -> Vec<&CatalogEntry>;

    fn resolve(&self, kind: &str) -> CatalogEntry {
        self.lookup(kind)
            .cloned()
            .unwrap_or_else(|| CatalogEntry::fallback(kind))
    }
}

#[derive(Debug, Clone, Default)]
pub struct Catalog {
    entries: Vec<CatalogEntry>,
    by_kind: HashMap<String, usize>,
}

impl Catalog {
    pub fn new(entries: Vec<CatalogEntry>) -> Self {
        let mut catalog = Self::default();
        for entry in entries {
            catalog.insert(entry);
        }
        catalog
    }

    pub fn builtin() -> Self {
        let node = Size::new(160, 80);
        let wide = Size::new(200, 80);
        let source = Size::new(160, 40);
        let zone = Size::new(240, 400);

        Self::new(vec![
            CatalogEntry::new("bronze", "Bronze", "layers", NodeCategory::Medallion, node),
            CatalogEntry::new("silver", "Silver", "layers", NodeCategory::Medallion, node),
            CatalogEntry::new("gold", "Gold", "layers", NodeCategory::Medallion, node),
            CatalogEntry::new("warehouse", "Warehouse", "database", NodeCategory::Storage, wide),
            CatalogEntry::new("lakehouse", "Lakehouse", "lake", NodeCategory::Storage, wide),
            CatalogEntry::new("dataset", "Dataset", "table", NodeCategory::Dataset, node),
            CatalogEntry::new("data-source", "Data Source", "plug", NodeCategory::Source, source),
            CatalogEntry::new("stream", "Event Stream", "bolt", NodeCategory::Source, source),
            CatalogEntry::new("consumption", "Consumption", "chart", NodeCategory::Consumption, node),
            CatalogEntry::new("dashboard", "Dashboard", "chart", NodeCategory::Consumption, node),
            CatalogEntry::new("stage-zone", "Pipeline Stage", "frame", NodeCategory::Zone, zone).fixed(),
        ])
    }

    /// Parses a JSON array of catalog entries.
    pub fn from_json(json: &str) -> Result<Self, CanvasError> {
        let entries: Vec<CatalogEntry> = serde_json::from_str(json)
            .map_err(|err| CanvasError::MalformedDocument(format!("catalog: {err}")))?;
        Ok(Self::new(entries))
    }

    /// Adds or replaces the entry for its kind.
    pub fn insert(&mut self, entry: CatalogEntry) {
        match self.by_kind.get(&entry.kind) {
            Some(&index) => self.entries[index] = entry,
            None => {
                self.by_kind.insert(entry.kind.clone(), self.entries.len());
                self.entries.push(entry);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl NodeCatalog for Catalog {
    fn lookup(&self, kind: &str) -> Option<&CatalogEntry> {
        self.by_kind.get(kind).map(|&index| &self.entries[index])
    }

    fn entries(&self) -> Vec<&CatalogEntry> {
        self.entries.iter().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_kinds_resolve_to_fallback() {
        let catalog = Catalog::builtin();
        let entry = catalog.resolve("quantum-lake");
        assert_eq!(entry.kind, "quantum-lake");
        assert_eq!(entry.category, NodeCategory::Other);
        assert_eq!(entry.default_size, Size::new(DEFAULT_NODE_WIDTH, DEFAULT_NODE_HEIGHT));
    }

    #[test]
    fn builtin_zone_is_fixed() {
        let catalog = Catalog::builtin();
        assert!(catalog.resolve("stage-zone").fixed);
        assert!(!catalog.resolve("bronze").fixed);
        assert_eq!(catalog.resolve("data-source").category, NodeCategory::Source);
    }

    #[test]
    fn json_catalog_accepts_unknown_categories() -> anyhow::Result<()> {
        let catalog = Catalog::from_json(
            r#"[{"kind":"kafka","displayName":"Kafka","category":"messaging","defaultSize":{"width":120,"height":60}}]"#,
        )?;
        let entry = catalog.lookup("kafka").expect("kafka entry");
        assert_eq!(entry.category, NodeCategory::Other);
        assert!(!entry.fixed);
        assert!(Catalog::from_json("{}").is_err());
        Ok(())
    }
}
