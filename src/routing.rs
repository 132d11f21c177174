use std::collections::HashMap;

use log::debug;
use serde::Serialize;

use crate::geometry::{AnchorSide, Point, Rect, anchor_point, distance_to_segment};
use crate::model::{Edge, EdgeId, EdgeKind, NodeId, Routing};
use crate::store::EntityStore;
use crate::{
    ARROW_HALF_WIDTH, ARROW_LENGTH, MANUAL_COLINEAR_TOLERANCE, MID_ARROW_MIN_LENGTH,
    OBSTACLE_MARGIN, OBSTACLE_MAX_ITER, ROUTE_STANDOFF,
};

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ArrowHead {
    pub tip: Point,
    pub left: Point,
    pub right: Point,
}

impl ArrowHead {
    fn pointing(tip: Point, direction: (f32, f32)) -> Self {
        let (dx, dy) = direction;
        let base = Point::new(tip.x - dx * ARROW_LENGTH, tip.y - dy * ARROW_LENGTH);
        let (px, py) = (-dy, dx);
        ArrowHead {
            tip,
            left: Point::new(base.x + px * ARROW_HALF_WIDTH, base.y + py * ARROW_HALF_WIDTH),
            right: Point::new(base.x - px * ARROW_HALF_WIDTH, base.y - py * ARROW_HALF_WIDTH),
        }
    }
}

/// A routed edge path ready for drawing.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Route {
    pub points: Vec<Point>,
    pub from_anchor: AnchorSide,
    pub to_anchor: AnchorSide,
    pub arrow_head: ArrowHead,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mid_arrow: Option<ArrowHead>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub degenerate: bool,
}

impl Route {
    pub fn length(&self) -> f32 {
        self.points
            .windows(2)
            .map(|pair| pair[0].distance(pair[1]))
            .sum()
    }

    /// Whether `point` lies within `tolerance` of any segment of the path.
    pub fn hit(&self, point: Point, tolerance: f32) -> bool {
        self.points
            .windows(2)
            .any(|pair| distance_to_segment(point, pair[0], pair[1]) <= tolerance)
    }
}

/// Computes orthogonal elbow paths between anchored node rectangles.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RoutingEngine {
    pub standoff: f32,
    pub margin: f32,
    pub max_iterations: usize,
    pub colinear_tolerance: f32,
    pub mid_arrow_min_length: f32,
}

impl Default for RoutingEngine {
    fn default() -> Self {
        Self {
            standoff: ROUTE_STANDOFF,
            margin: OBSTACLE_MARGIN,
            max_iterations: OBSTACLE_MAX_ITER,
            colinear_tolerance: MANUAL_COLINEAR_TOLERANCE,
            mid_arrow_min_length: MID_ARROW_MIN_LENGTH,
        }
    }
}

impl RoutingEngine {
    /// Anchor pair facing the direction of travel between the two centers.
    /// Horizontal wins ties.
    pub fn choose_anchors(&self, from: Rect, to: Rect, kind: EdgeKind) -> (AnchorSide, AnchorSide) {
        let a = from.center();
        let b = to.center();
        let dx = b.x - a.x;
        let dy = b.y - a.y;

        let (from_side, to_side) = if dx.abs() >= dy.abs() {
            if dx >= 0.0 {
                (AnchorSide::Right, AnchorSide::Left)
            } else {
                (AnchorSide::Left, AnchorSide::Right)
            }
        } else if dy > 0.0 {
            (AnchorSide::Bottom, AnchorSide::Top)
        } else {
            (AnchorSide::Top, AnchorSide::Bottom)
        };

        match kind {
            EdgeKind::SourceToItem => (AnchorSide::Right, to_side),
            EdgeKind::Flow => (from_side, to_side),
        }
    }

    pub fn route_between(
        &self,
        from: Rect,
        to: Rect,
        kind: EdgeKind,
        routing: Routing,
        obstacles: &[Rect],
    ) -> Route {
        let (from_side, to_side) = match routing {
            Routing::Auto => self.choose_anchors(from, to, kind),
            Routing::Manual { from, to } => (from, to),
        };
        let start = anchor_point(from, from_side);
        let end = anchor_point(to, to_side);

        if from.is_empty() || to.is_empty() || points_close(start, end) {
            debug!(
                from_anchor = from_side.as_str(),
                to_anchor = to_side.as_str();
                "Degenerate route, falling back to a straight line"
            );
            return self.finish(vec![start, end], from_side, to_side, true);
        }

        let points = match routing {
            Routing::Auto => self.auto_path(start, end, from_side, to_side, obstacles),
            Routing::Manual { .. } => self.manual_path(start, end, from_side, to_side),
        };

        self.finish(simplify(points), from_side, to_side, false)
    }

    /// Routes one edge against the live store. `None` when an endpoint is missing.
    pub fn route_edge(&self, edge: &Edge, store: &EntityStore) -> Option<Route> {
        let from = store.node_rect(&edge.from)?;
        let to = store.node_rect(&edge.to)?;
        let obstacles = store.obstacles_excluding(&[&edge.from, &edge.to]);
        Some(self.route_between(from, to, edge.kind, edge.routing, &obstacles))
    }

    pub fn route_all(&self, store: &EntityStore) -> HashMap<EdgeId, Route> {
        store
            .edges()
            .iter()
            .filter_map(|edge| Some((edge.id.clone(), self.route_edge(edge, store)?)))
            .collect()
    }

    /// Re-routes only the edges touching `nodes`, updating `routes` in place.
    pub fn reroute_incident(
        &self,
        store: &EntityStore,
        nodes: &[NodeId],
        routes: &mut HashMap<EdgeId, Route>,
    ) {
        for edge in store
            .edges()
            .iter()
            .filter(|edge| nodes.iter().any(|id| edge.touches(id)))
        {
            match self.route_edge(edge, store) {
                Some(route) => {
                    routes.insert(edge.id.clone(), route);
                }
                None => {
                    routes.remove(&edge.id);
                }
            }
        }
    }

    fn auto_path(
        &self,
        start: Point,
        end: Point,
        from_side: AnchorSide,
        to_side: AnchorSide,
        obstacles: &[Rect],
    ) -> Vec<Point> {
        match (from_side.is_horizontal(), to_side.is_horizontal()) {
            (true, true) => {
                let (turn, travel) =
                    self.turn_coordinate(start.x, end.x, from_side.outward().0, from_side == to_side);
                let turn = self.push_past_obstacles(turn, travel, (start.y, end.y), obstacles, Axis::X);
                vec![start, Point::new(turn, start.y), Point::new(turn, end.y), end]
            }
            (false, false) => {
                let (turn, travel) =
                    self.turn_coordinate(start.y, end.y, from_side.outward().1, from_side == to_side);
                let turn = self.push_past_obstacles(turn, travel, (start.x, end.x), obstacles, Axis::Y);
                vec![start, Point::new(start.x, turn), Point::new(end.x, turn), end]
            }
            _ => l_path(start, end, from_side),
        }
    }

    fn manual_path(&self, start: Point, end: Point, from_side: AnchorSide, to_side: AnchorSide) -> Vec<Point> {
        if (end.x - start.x).abs() <= self.colinear_tolerance
            || (end.y - start.y).abs() <= self.colinear_tolerance
        {
            return vec![start, end];
        }

        match (from_side.is_horizontal(), to_side.is_horizontal()) {
            (true, true) => {
                let mid_x = (start.x + end.x) / 2.0;
                vec![start, Point::new(mid_x, start.y), Point::new(mid_x, end.y), end]
            }
            (false, false) => {
                let mid_y = (start.y + end.y) / 2.0;
                vec![start, Point::new(start.x, mid_y), Point::new(end.x, mid_y), end]
            }
            _ => l_path(start, end, from_side),
        }
    }

    /// Elbow coordinate plus the direction obstacles may push it. Anchors on the
    /// same side turn outside both nodes.
    fn turn_coordinate(&self, start: f32, end: f32, outward: f32, same_side: bool) -> (f32, f32) {
        if same_side {
            let extreme = if outward > 0.0 { start.max(end) } else { start.min(end) };
            return (extreme + self.standoff * outward, outward);
        }
        let delta = end - start;
        let travel = if delta >= 0.0 { 1.0 } else { -1.0 };
        if delta.abs() < 2.0 * self.standoff {
            return (start + delta / 2.0, travel);
        }
        let direction = if delta != 0.0 { delta.signum() } else { outward };
        (start + self.standoff * direction, travel)
    }

    fn push_past_obstacles(
        &self,
        mut turn: f32,
        travel: f32,
        cross_span: (f32, f32),
        obstacles: &[Rect],
        axis: Axis,
    ) -> f32 {
        let cross_lo = cross_span.0.min(cross_span.1);
        let cross_hi = cross_span.0.max(cross_span.1);

        for _ in 0..self.max_iterations {
            let blocking = obstacles.iter().find(|rect| {
                let (near, far, cross_near, cross_far) = axis.extents(rect);
                turn > near && turn < far && cross_lo < cross_far && cross_hi > cross_near
            });
            let Some(rect) = blocking else {
                break;
            };
            let (near, far, _, _) = axis.extents(rect);
            turn = if travel > 0.0 {
                far + self.margin
            } else {
                near - self.margin
            };
        }

        turn
    }

    fn finish(&self, points: Vec<Point>, from_anchor: AnchorSide, to_anchor: AnchorSide, degenerate: bool) -> Route {
        let arrow_head = final_arrow(&points, to_anchor);
        let mut route = Route {
            points,
            from_anchor,
            to_anchor,
            arrow_head,
            mid_arrow: None,
            degenerate,
        };
        if !degenerate && route.length() >= self.mid_arrow_min_length {
            route.mid_arrow = mid_arrow(&route.points, route.length());
        }
        route
    }
}

#[derive(Debug, Clone, Copy)]
enum Axis {
    X,
    Y,
}

impl Axis {
    /// (near, far) along the axis, then (near, far) across it.
    fn extents(self, rect: &Rect) -> (f32, f32, f32, f32) {
        match self {
            Axis::X => (
                rect.left() as f32,
                rect.right() as f32,
                rect.top() as f32,
                rect.bottom() as f32,
            ),
            Axis::Y => (
                rect.top() as f32,
                rect.bottom() as f32,
                rect.left() as f32,
                rect.right() as f32,
            ),
        }
    }
}

fn l_path(start: Point, end: Point, from_side: AnchorSide) -> Vec<Point> {
    let corner = if from_side.is_horizontal() {
        Point::new(end.x, start.y)
    } else {
        Point::new(start.x, end.y)
    };
    vec![start, corner, end]
}

/// Drops repeated points and interior points lying on a straight run.
fn simplify(points: Vec<Point>) -> Vec<Point> {
    let mut result: Vec<Point> = Vec::with_capacity(points.len());
    for point in points {
        if result.last().is_some_and(|last| points_close(*last, point)) {
            continue;
        }
        while result.len() >= 2 {
            let a = result[result.len() - 2];
            let b = result[result.len() - 1];
            if orientation(a, b, point).abs() < 1e-3 {
                result.pop();
            } else {
                break;
            }
        }
        result.push(point);
    }
    result
}

fn final_arrow(points: &[Point], to_anchor: AnchorSide) -> ArrowHead {
    let tip = points.last().copied().unwrap_or_default();
    let inward = {
        let (ox, oy) = to_anchor.outward();
        (-ox, -oy)
    };
    let direction = match points {
        [.., before, last] => unit(*before, *last).unwrap_or(inward),
        _ => inward,
    };
    ArrowHead::pointing(tip, direction)
}

fn mid_arrow(points: &[Point], total: f32) -> Option<ArrowHead> {
    let half = total / 2.0;
    let mut walked = 0.0;
    for pair in points.windows(2) {
        let length = pair[0].distance(pair[1]);
        if length > 0.0 && walked + length >= half {
            let direction = unit(pair[0], pair[1])?;
            // the tip may not run past the corner ending this segment
            let along = (half - walked + ARROW_LENGTH / 2.0).min(length);
            let tip = Point::new(pair[0].x + direction.0 * along, pair[0].y + direction.1 * along);
            return Some(ArrowHead::pointing(tip, direction));
        }
        walked += length;
    }
    None
}

fn unit(from: Point, to: Point) -> Option<(f32, f32)> {
    let length = from.distance(to);
    if length <= f32::EPSILON {
        return None;
    }
    Some(((to.x - from.x) / length, (to.y - from.y) / length))
}

fn orientation(a: Point, b: Point, c: Point) -> f32 {
    (b.x - a.x) * (c.y - a.y) - (b.y - a.y) * (c.x - a.x)
}

fn points_close(a: Point, b: Point) -> bool {
    a.distance(b) < 1e-2_f32
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine() -> RoutingEngine {
        RoutingEngine::default()
    }

    fn is_orthogonal(points: &[Point]) -> bool {
        points
            .windows(2)
            .all(|pair| pair[0].x == pair[1].x || pair[0].y == pair[1].y)
    }

    #[test]
    fn side_by_side_nodes_use_right_to_left() {
        let a = Rect::new(100, 100, 160, 80);
        let b = Rect::new(300, 100, 160, 80);
        let route = engine().route_between(a, b, EdgeKind::Flow, Routing::Auto, &[]);
        assert_eq!(route.from_anchor, AnchorSide::Right);
        assert_eq!(route.to_anchor, AnchorSide::Left);
        assert_eq!(route.points, vec![Point::new(260.0, 140.0), Point::new(300.0, 140.0)]);
        assert_eq!(route.arrow_head.tip, Point::new(300.0, 140.0));
        assert!(!route.degenerate);
    }

    #[test]
    fn source_edge_to_a_node_on_its_left_turns_outside_the_source() {
        let source = Rect::new(400, 100, 160, 80);
        let item = Rect::new(100, 300, 160, 80);
        let route = engine().route_between(source, item, EdgeKind::SourceToItem, Routing::Auto, &[]);
        assert_eq!((route.from_anchor, route.to_anchor), (AnchorSide::Right, AnchorSide::Right));
        assert!(is_orthogonal(&route.points));
        assert!(route.points.len() >= 3);
        assert!(route.points[1].x > source.right() as f32, "{:?}", route.points);
        for point in &route.points[1..route.points.len() - 1] {
            assert!(!source.contains(*point), "{point:?} is inside the source");
        }
    }

    #[test]
    fn mid_arrow_stays_on_its_segment() {
        let points = [Point::new(0.0, 0.0), Point::new(60.0, 0.0), Point::new(60.0, 60.0)];
        let arrow = mid_arrow(&points, 120.0).unwrap();
        assert_eq!(arrow.tip, Point::new(60.0, 0.0));

        let points = [Point::new(0.0, 0.0), Point::new(200.0, 0.0)];
        let arrow = mid_arrow(&points, 200.0).unwrap();
        assert_eq!(arrow.tip, Point::new(100.0 + ARROW_LENGTH / 2.0, 0.0));
    }

    #[test]
    fn vertical_dominance_uses_bottom_to_top() {
        let a = Rect::new(100, 100, 160, 80);
        let b = Rect::new(160, 400, 160, 80);
        let route = engine().route_between(a, b, EdgeKind::Flow, Routing::Auto, &[]);
        assert_eq!((route.from_anchor, route.to_anchor), (AnchorSide::Bottom, AnchorSide::Top));
        assert_eq!(route.points.len(), 4);
        assert_eq!(route.points[1], Point::new(180.0, 220.0));
        assert!(is_orthogonal(&route.points));
    }

    #[test]
    fn ties_count_as_horizontal() {
        let a = Rect::new(0, 0, 100, 100);
        let b = Rect::new(200, 200, 100, 100);
        assert_eq!(
            engine().choose_anchors(a, b, EdgeKind::Flow),
            (AnchorSide::Right, AnchorSide::Left)
        );
        assert_eq!(
            engine().choose_anchors(b, a, EdgeKind::Flow),
            (AnchorSide::Left, AnchorSide::Right)
        );
    }

    #[test]
    fn source_edges_leave_from_the_right() {
        let source = Rect::new(100, 100, 120, 40);
        let item = Rect::new(100, 400, 160, 80);
        let route = engine().route_between(source, item, EdgeKind::SourceToItem, Routing::Auto, &[]);
        assert_eq!(route.from_anchor, AnchorSide::Right);
        assert_eq!(route.to_anchor, AnchorSide::Top);
        // single-corner L
        assert_eq!(route.points.len(), 3);
        assert!(is_orthogonal(&route.points));
    }

    #[test]
    fn turn_is_pushed_past_obstacles() {
        let a = Rect::new(0, 0, 100, 80);
        let b = Rect::new(400, 300, 100, 80);
        // obstacle straddling the default turn at x = 140
        let obstacle = Rect::new(120, 0, 60, 400);
        let route = engine().route_between(a, b, EdgeKind::Flow, Routing::Auto, &[obstacle]);
        assert_eq!(route.points.len(), 4);
        assert_eq!(route.points[1].x, 190.0);
        assert!(is_orthogonal(&route.points));
    }

    #[test]
    fn manual_nearly_colinear_anchors_draw_one_segment() {
        let a = Rect::new(0, 0, 100, 80);
        let b = Rect::new(300, 3, 100, 80);
        let routing = Routing::Manual {
            from: AnchorSide::Right,
            to: AnchorSide::Left,
        };
        let route = engine().route_between(a, b, EdgeKind::Flow, routing, &[]);
        assert_eq!(route.points.len(), 2);
    }

    #[test]
    fn manual_horizontal_anchors_split_at_mid_x() {
        let a = Rect::new(0, 0, 100, 80);
        let b = Rect::new(300, 200, 100, 80);
        let routing = Routing::Manual {
            from: AnchorSide::Right,
            to: AnchorSide::Left,
        };
        let route = engine().route_between(a, b, EdgeKind::Flow, routing, &[]);
        assert_eq!(
            route.points,
            vec![
                Point::new(100.0, 40.0),
                Point::new(200.0, 40.0),
                Point::new(200.0, 240.0),
                Point::new(300.0, 240.0),
            ]
        );
        assert_eq!((route.from_anchor, route.to_anchor), (AnchorSide::Right, AnchorSide::Left));
    }

    #[test]
    fn manual_mixed_anchors_form_an_l() {
        let a = Rect::new(0, 0, 100, 80);
        let b = Rect::new(300, 200, 100, 80);
        let routing = Routing::Manual {
            from: AnchorSide::Bottom,
            to: AnchorSide::Left,
        };
        let route = engine().route_between(a, b, EdgeKind::Flow, routing, &[]);
        assert_eq!(
            route.points,
            vec![Point::new(50.0, 80.0), Point::new(50.0, 240.0), Point::new(300.0, 240.0)]
        );
    }

    #[test]
    fn zero_size_endpoint_degrades_to_straight_line() {
        let a = Rect::new(0, 0, 0, 0);
        let b = Rect::new(300, 200, 100, 80);
        let route = engine().route_between(a, b, EdgeKind::Flow, Routing::Auto, &[]);
        assert!(route.degenerate);
        assert_eq!(route.points.len(), 2);
        assert!(route.mid_arrow.is_none());
    }

    #[test]
    fn long_paths_get_a_mid_arrow() {
        let a = Rect::new(0, 0, 100, 80);
        let b = Rect::new(600, 0, 100, 80);
        let route = engine().route_between(a, b, EdgeKind::Flow, Routing::Auto, &[]);
        assert!(route.length() >= 160.0);
        let mid = route.mid_arrow.expect("mid arrow");
        assert_eq!(mid.tip, Point::new(355.0, 40.0));

        let short = engine().route_between(a, Rect::new(150, 0, 100, 80), EdgeKind::Flow, Routing::Auto, &[]);
        assert!(short.mid_arrow.is_none());
    }

    #[test]
    fn arrow_head_follows_final_segment() {
        let a = Rect::new(0, 0, 100, 80);
        let b = Rect::new(0, 300, 100, 80);
        let route = engine().route_between(a, b, EdgeKind::Flow, Routing::Auto, &[]);
        let head = route.arrow_head;
        assert_eq!(head.tip, Point::new(50.0, 300.0));
        assert_eq!(head.left.y, 290.0);
        assert_eq!(head.right.y, 290.0);
    }

    #[test]
    fn hit_uses_segment_tolerance() {
        let a = Rect::new(100, 100, 160, 80);
        let b = Rect::new(400, 100, 160, 80);
        let route = engine().route_between(a, b, EdgeKind::Flow, Routing::Auto, &[]);
        assert!(route.hit(Point::new(330.0, 144.0), 6.0));
        assert!(!route.hit(Point::new(330.0, 160.0), 6.0));
    }
}
