use std::collections::HashMap;
use std::fmt::{self, Write};

use crate::catalog::{NodeCatalog, NodeCategory};
use crate::model::EdgeId;
use crate::routing::{ArrowHead, Route};
use crate::store::EntityStore;
use crate::utils::{escape_xml, format_points};

const CANVAS_MARGIN: i32 = 40;
const EMPTY_CANVAS: (i32, i32) = (400, 300);
const STROKE_COLOR: &str = "#2d3748";
const TEXT_COLOR: &str = "#1a202c";

fn fill_for(category: NodeCategory) -> &'static str {
    match category {
        NodeCategory::Medallion => "#fefcbf",
        NodeCategory::Source => "#e2e8f0",
        NodeCategory::Storage => "#bee3f8",
        NodeCategory::Dataset => "#c6f6d5",
        NodeCategory::Consumption => "#fed7e2",
        NodeCategory::Zone => "#f7fafc",
        NodeCategory::Other => "#ffffff",
    }
}

/// Static SVG preview of the canvas: node boxes with labels, routed edge
/// polylines and their arrowheads.
pub fn render_svg(
    store: &EntityStore,
    routes: &HashMap<EdgeId, Route>,
    catalog: &dyn NodeCatalog,
    background: &str,
) -> String {
    let mut svg = String::new();
    // writing into a String cannot fail
    let _ = write_svg(&mut svg, store, routes, catalog, background);
    svg
}

fn write_svg(
    svg: &mut String,
    store: &EntityStore,
    routes: &HashMap<EdgeId, Route>,
    catalog: &dyn NodeCatalog,
    background: &str,
) -> fmt::Result {
    let rects: Vec<_> = store.nodes().map(|node| node.rect()).collect();
    let (min_x, min_y, width, height) = if rects.is_empty() {
        (0, 0, EMPTY_CANVAS.0, EMPTY_CANVAS.1)
    } else {
        let min_x = rects.iter().map(|r| r.left()).min().unwrap_or(0) - CANVAS_MARGIN;
        let min_y = rects.iter().map(|r| r.top()).min().unwrap_or(0) - CANVAS_MARGIN;
        let max_x = rects.iter().map(|r| r.right()).max().unwrap_or(0) + CANVAS_MARGIN;
        let max_y = rects.iter().map(|r| r.bottom()).max().unwrap_or(0) + CANVAS_MARGIN;
        (min_x, min_y, max_x - min_x, max_y - min_y)
    };

    write!(
        svg,
        r##"<?xml version="1.0" encoding="UTF-8"?>
<svg xmlns="http://www.w3.org/2000/svg" width="{width}" height="{height}" viewBox="{min_x} {min_y} {width} {height}" font-family="Inter, system-ui, sans-serif">
  <rect x="{min_x}" y="{min_y}" width="100%" height="100%" fill="{}" />
"##,
        escape_xml(background)
    )?;

    // zones sit underneath everything else
    let (zones, items): (Vec<_>, Vec<_>) = store
        .nodes()
        .partition(|node| catalog.resolve(&node.kind).category == NodeCategory::Zone);

    for node in zones.iter().chain(items.iter()) {
        let entry = catalog.resolve(&node.kind);
        let rect = node.rect();
        let dash = if entry.fixed {
            " stroke-dasharray=\"8 6\""
        } else {
            ""
        };
        writeln!(
            svg,
            "  <rect x=\"{}\" y=\"{}\" width=\"{}\" height=\"{}\" rx=\"8\" ry=\"8\" fill=\"{}\" stroke=\"{}\" stroke-width=\"2\"{} data-id=\"{}\" />",
            rect.x,
            rect.y,
            rect.width,
            rect.height,
            fill_for(entry.category),
            STROKE_COLOR,
            dash,
            escape_xml(node.id.as_str())
        )?;
        let center = rect.center();
        writeln!(
            svg,
            "  <text x=\"{:.1}\" y=\"{:.1}\" fill=\"{}\" font-size=\"14\" text-anchor=\"middle\" dominant-baseline=\"middle\">{}</text>",
            center.x,
            center.y,
            TEXT_COLOR,
            escape_xml(node.name())
        )?;
    }

    for edge in store.edges() {
        let Some(route) = routes.get(&edge.id) else {
            continue;
        };
        writeln!(
            svg,
            "  <polyline points=\"{}\" fill=\"none\" stroke=\"{}\" stroke-width=\"2\" data-id=\"{}\" />",
            format_points(&route.points),
            STROKE_COLOR,
            escape_xml(edge.id.as_str())
        )?;
        write_arrow(svg, &route.arrow_head)?;
        if let Some(mid) = &route.mid_arrow {
            write_arrow(svg, mid)?;
        }
    }

    svg.push_str("</svg>\n");
    Ok(())
}

fn write_arrow(svg: &mut String, arrow: &ArrowHead) -> fmt::Result {
    writeln!(
        svg,
        "  <polygon points=\"{}\" fill=\"{}\" />",
        format_points(&[arrow.tip, arrow.left, arrow.right]),
        STROKE_COLOR
    )
}
