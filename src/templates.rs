use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplateItem {
    pub kind: String,
    pub x: i32,
    pub y: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// Connection between two template items, by index into `items`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplateConnection {
    pub from: usize,
    pub to: usize,
}

/// A canned graph that replaces the canvas when loaded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Template {
    pub name: String,
    pub description: String,
    pub items: Vec<TemplateItem>,
    pub connections: Vec<TemplateConnection>,
}

fn item(kind: &str, x: i32, y: i32, name: &str) -> TemplateItem {
    TemplateItem {
        kind: kind.to_string(),
        x,
        y,
        name: Some(name.to_string()),
    }
}

fn link(from: usize, to: usize) -> TemplateConnection {
    TemplateConnection { from, to }
}

pub fn builtin_templates() -> Vec<Template> {
    vec![
        Template {
            name: "medallion".to_string(),
            description: "Source feeding bronze, silver and gold layers".to_string(),
            items: vec![
                item("data-source", 40, 140, "Operational DB"),
                item("bronze", 260, 120, "Raw"),
                item("silver", 480, 120, "Cleansed"),
                item("gold", 700, 120, "Curated"),
                item("dashboard", 920, 120, "Reporting"),
            ],
            connections: vec![link(0, 1), link(1, 2), link(2, 3), link(3, 4)],
        },
        Template {
            name: "lakehouse".to_string(),
            description: "Two sources landing in a lakehouse that serves a dataset".to_string(),
            items: vec![
                item("data-source", 40, 80, "CRM"),
                item("data-source", 40, 240, "ERP"),
                item("lakehouse", 280, 140, "Lakehouse"),
                item("dataset", 560, 140, "Semantic model"),
                item("consumption", 800, 140, "Analysts"),
            ],
            connections: vec![link(0, 2), link(1, 2), link(2, 3), link(3, 4)],
        },
        Template {
            name: "streaming".to_string(),
            description: "Event stream processed into a warehouse and a live dashboard".to_string(),
            items: vec![
                item("stream", 40, 160, "Clickstream"),
                item("bronze", 260, 140, "Landing"),
                item("warehouse", 480, 40, "Warehouse"),
                item("dashboard", 480, 240, "Live metrics"),
            ],
            connections: vec![link(0, 1), link(1, 2), link(1, 3)],
        },
    ]
}

pub fn find_template(name: &str) -> Option<Template> {
    builtin_templates()
        .into_iter()
        .find(|template| template.name.eq_ignore_ascii_case(name.trim()))
}
