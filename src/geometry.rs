use serde::{Deserialize, Serialize};
use std::fmt;

use crate::CANVAS_EXTENT;

/// Integer canvas-local coordinate of a node's top-left corner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Position {
    pub x: i32,
    pub y: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Size {
    pub width: i32,
    pub height: i32,
}

/// Path and pointer coordinates. Same canvas-local space as [`Position`].
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnchorSide {
    Top,
    Right,
    Bottom,
    Left,
}

/// Result of an alignment search. `snapped_*` is the adjusted top-left coordinate
/// of the moving rectangle, `guide_*` the line a renderer should draw.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Alignment {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub snapped_x: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub snapped_y: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub guide_x: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub guide_y: Option<i32>,
}

impl Position {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    pub fn offset(self, dx: i32, dy: i32) -> Self {
        Self {
            x: self.x.saturating_add(dx),
            y: self.y.saturating_add(dy),
        }
    }

    /// Clamps both coordinates into `-CANVAS_EXTENT..=CANVAS_EXTENT`.
    pub fn clamp_to_canvas(self) -> Self {
        Self {
            x: clamp_coordinate(self.x),
            y: clamp_coordinate(self.y),
        }
    }
}

pub fn clamp_coordinate(value: i32) -> i32 {
    value.clamp(-CANVAS_EXTENT, CANVAS_EXTENT)
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

impl Size {
    pub const fn new(width: i32, height: i32) -> Self {
        Self { width, height }
    }

    /// Keeps both dimensions within `0..=CANVAS_EXTENT`.
    pub fn clamp_to_canvas(self) -> Self {
        Self {
            width: self.width.clamp(0, CANVAS_EXTENT),
            height: self.height.clamp(0, CANVAS_EXTENT),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.width <= 0 || self.height <= 0
    }
}

impl Point {
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub fn distance(self, other: Point) -> f32 {
        let dx = other.x - self.x;
        let dy = other.y - self.y;
        (dx * dx + dy * dy).sqrt()
    }

    pub fn rounded(self) -> Position {
        Position {
            x: self.x.round() as i32,
            y: self.y.round() as i32,
        }
    }
}

impl From<Position> for Point {
    fn from(position: Position) -> Self {
        Point {
            x: position.x as f32,
            y: position.y as f32,
        }
    }
}

impl Rect {
    pub const fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn from_position(position: Position, size: Size) -> Self {
        Self {
            x: position.x,
            y: position.y,
            width: size.width,
            height: size.height,
        }
    }

    /// Normalized rectangle spanning two corner points, in either order.
    pub fn from_corners(a: Point, b: Point) -> Self {
        let min_x = a.x.min(b.x).round() as i32;
        let min_y = a.y.min(b.y).round() as i32;
        let max_x = a.x.max(b.x).round() as i32;
        let max_y = a.y.max(b.y).round() as i32;
        Self {
            x: min_x,
            y: min_y,
            width: max_x.saturating_sub(min_x),
            height: max_y.saturating_sub(min_y),
        }
    }

    pub fn left(&self) -> i32 {
        self.x
    }

    pub fn right(&self) -> i32 {
        self.x.saturating_add(self.width)
    }

    pub fn top(&self) -> i32 {
        self.y
    }

    pub fn bottom(&self) -> i32 {
        self.y.saturating_add(self.height)
    }

    pub fn center_x(&self) -> i32 {
        self.x.saturating_add(self.width / 2)
    }

    pub fn center_y(&self) -> i32 {
        self.y.saturating_add(self.height / 2)
    }

    pub fn center(&self) -> Point {
        Point {
            x: self.x as f32 + self.width as f32 / 2.0,
            y: self.y as f32 + self.height as f32 / 2.0,
        }
    }

    pub fn position(&self) -> Position {
        Position::new(self.x, self.y)
    }

    pub fn is_empty(&self) -> bool {
        self.width <= 0 || self.height <= 0
    }

    pub fn inflate(self, amount: i32) -> Rect {
        let twice = amount.saturating_mul(2);
        Rect {
            x: self.x.saturating_sub(amount),
            y: self.y.saturating_sub(amount),
            width: self.width.saturating_add(twice),
            height: self.height.saturating_add(twice),
        }
    }

    pub fn contains(&self, point: Point) -> bool {
        point.x >= self.x as f32
            && point.x <= self.right() as f32
            && point.y >= self.y as f32
            && point.y <= self.bottom() as f32
    }
}

impl AnchorSide {
    pub const ALL: [AnchorSide; 4] = [
        AnchorSide::Top,
        AnchorSide::Right,
        AnchorSide::Bottom,
        AnchorSide::Left,
    ];

    /// Left and right anchors leave the node horizontally.
    pub fn is_horizontal(self) -> bool {
        matches!(self, AnchorSide::Left | AnchorSide::Right)
    }

    pub fn opposite(self) -> AnchorSide {
        match self {
            AnchorSide::Top => AnchorSide::Bottom,
            AnchorSide::Right => AnchorSide::Left,
            AnchorSide::Bottom => AnchorSide::Top,
            AnchorSide::Left => AnchorSide::Right,
        }
    }

    /// Unit vector pointing out of the node through this side.
    pub fn outward(self) -> (f32, f32) {
        match self {
            AnchorSide::Top => (0.0, -1.0),
            AnchorSide::Right => (1.0, 0.0),
            AnchorSide::Bottom => (0.0, 1.0),
            AnchorSide::Left => (-1.0, 0.0),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            AnchorSide::Top => "top",
            AnchorSide::Right => "right",
            AnchorSide::Bottom => "bottom",
            AnchorSide::Left => "left",
        }
    }
}

impl fmt::Display for AnchorSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Alignment {
    pub fn is_empty(&self) -> bool {
        self.snapped_x.is_none() && self.snapped_y.is_none()
    }
}

/// Rounds both coordinates to the nearest multiple of `grid`.
///
/// Half-way values round toward positive infinity, so the function is
/// idempotent and commutes with translation by whole grid units.
pub fn snap(position: Position, grid: i32) -> Position {
    if grid <= 0 {
        return position;
    }
    Position {
        x: snap_coordinate(position.x, grid),
        y: snap_coordinate(position.y, grid),
    }
}

fn snap_coordinate(value: i32, grid: i32) -> i32 {
    value
        .saturating_add(grid / 2)
        .div_euclid(grid)
        .saturating_mul(grid)
}

pub fn anchor_point(rect: Rect, side: AnchorSide) -> Point {
    let center = rect.center();
    match side {
        AnchorSide::Top => Point::new(center.x, rect.top() as f32),
        AnchorSide::Right => Point::new(rect.right() as f32, center.y),
        AnchorSide::Bottom => Point::new(center.x, rect.bottom() as f32),
        AnchorSide::Left => Point::new(rect.left() as f32, center.y),
    }
}

/// Half-open overlap test: touching edges do not overlap.
pub fn rects_overlap(a: Rect, b: Rect) -> bool {
    if a.is_empty() || b.is_empty() {
        return false;
    }
    a.left() < b.right() && b.left() < a.right() && a.top() < b.bottom() && b.top() < a.bottom()
}

/// Finds the closest alignment line per axis within `tolerance`.
///
/// The moving rectangle's left, center and right lines are compared with each
/// other rectangle's matching line and its opposite edge (left↔left, left↔right,
/// right↔right, right↔left, center↔center); vertically the same with
/// top/middle/bottom. Ties keep the first candidate in iteration order.
pub fn nearest_alignment(moving: Rect, others: &[Rect], tolerance: i32) -> Alignment {
    let mut alignment = Alignment::default();

    if let Some((snapped, guide)) = closest_line(
        moving.x,
        moving.width,
        others.iter().map(|rect| (rect.x, rect.width)),
        tolerance,
    ) {
        alignment.snapped_x = Some(snapped);
        alignment.guide_x = Some(guide);
    }

    if let Some((snapped, guide)) = closest_line(
        moving.y,
        moving.height,
        others.iter().map(|rect| (rect.y, rect.height)),
        tolerance,
    ) {
        alignment.snapped_y = Some(snapped);
        alignment.guide_y = Some(guide);
    }

    alignment
}

fn closest_line(
    start: i32,
    extent: i32,
    others: impl Iterator<Item = (i32, i32)>,
    tolerance: i32,
) -> Option<(i32, i32)> {
    let near = 0;
    let middle = extent / 2;
    let far = extent;

    let mut best: Option<(i32, i32, i32)> = None;

    for (other_start, other_extent) in others {
        let other_near = other_start;
        let other_middle = other_start + other_extent / 2;
        let other_far = other_start + other_extent;

        let pairs = [
            (near, other_near),
            (near, other_far),
            (far, other_far),
            (far, other_near),
            (middle, other_middle),
        ];

        for (offset, line) in pairs {
            let distance = (start + offset - line).abs();
            if distance > tolerance {
                continue;
            }
            let better = match best {
                Some((best_distance, _, _)) => distance < best_distance,
                None => true,
            };
            if better {
                best = Some((distance, line - offset, line));
            }
        }
    }

    best.map(|(_, snapped, guide)| (snapped, guide))
}

/// Scans grid cells row-major from `origin` and returns the first top-left
/// position whose padded rectangle overlaps none of `occupied`.
pub fn find_free_spot(
    size: Size,
    occupied: &[Rect],
    origin: Position,
    grid: i32,
    columns: i32,
    padding: i32,
) -> Position {
    let step_x = (size.width + padding).max(grid.max(1));
    let step_y = (size.height + padding).max(grid.max(1));
    let columns = columns.max(1);
    let origin = snap(origin, grid);

    let mut row = 0;
    loop {
        for column in 0..columns {
            let candidate = snap(origin.offset(column * step_x, row * step_y), grid);
            let footprint = Rect::from_position(candidate, size).inflate(padding / 2);
            if !occupied.iter().any(|rect| rects_overlap(footprint, *rect)) {
                return candidate;
            }
        }
        row += 1;
        if row as usize > occupied.len() + 1 {
            // every row was blocked at least once; fall below everything
            let bottom = occupied.iter().map(Rect::bottom).max().unwrap_or(origin.y);
            return snap(Position::new(origin.x, bottom + padding), grid);
        }
    }
}

/// Shortest distance from `point` to the segment `a`-`b`.
pub fn distance_to_segment(point: Point, a: Point, b: Point) -> f32 {
    let dx = b.x - a.x;
    let dy = b.y - a.y;
    let length_sq = dx * dx + dy * dy;
    if length_sq <= f32::EPSILON {
        return point.distance(a);
    }
    let t = (((point.x - a.x) * dx + (point.y - a.y) * dy) / length_sq).clamp(0.0, 1.0);
    point.distance(Point::new(a.x + t * dx, a.y + t * dy))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn snap_rounds_to_nearest_grid_line() {
        assert_eq!(snap(Position::new(113, 107), 20), Position::new(120, 100));
        assert_eq!(snap(Position::new(110, 90), 20), Position::new(120, 100));
        assert_eq!(snap(Position::new(-11, -9), 20), Position::new(-20, 0));
    }

    #[test]
    fn extreme_coordinates_neither_overflow_nor_escape_the_canvas() {
        let far = Position::new(i32::MAX - 5, i32::MIN + 3);
        let snapped = snap(far, 20);
        assert!(snapped.x > 0 && snapped.y < 0);
        assert_eq!(
            far.clamp_to_canvas(),
            Position::new(CANVAS_EXTENT, -CANVAS_EXTENT)
        );

        let rect = Rect::new(i32::MAX - 10, 0, 160, 80);
        assert_eq!(rect.right(), i32::MAX);
        assert_eq!(rect.inflate(40).width, 240);
    }

    #[test]
    fn snap_with_non_positive_grid_is_identity() {
        let p = Position::new(13, 7);
        assert_eq!(snap(p, 0), p);
        assert_eq!(snap(p, -5), p);
    }

    proptest! {
        #[test]
        fn snap_is_idempotent(x in -10_000i32..10_000, y in -10_000i32..10_000, grid in 1i32..64) {
            let once = snap(Position::new(x, y), grid);
            prop_assert_eq!(snap(once, grid), once);
        }

        #[test]
        fn snap_commutes_with_grid_translation(
            x in -10_000i32..10_000,
            y in -10_000i32..10_000,
            kx in -50i32..50,
            ky in -50i32..50,
            grid in 1i32..64,
        ) {
            let p = Position::new(x, y);
            let shifted = p.offset(kx * grid, ky * grid);
            prop_assert_eq!(snap(shifted, grid), snap(p, grid).offset(kx * grid, ky * grid));
        }
    }

    #[test]
    fn anchor_points_sit_on_side_midpoints() {
        let rect = Rect::new(100, 100, 160, 80);
        assert_eq!(anchor_point(rect, AnchorSide::Top), Point::new(180.0, 100.0));
        assert_eq!(anchor_point(rect, AnchorSide::Right), Point::new(260.0, 140.0));
        assert_eq!(anchor_point(rect, AnchorSide::Bottom), Point::new(180.0, 180.0));
        assert_eq!(anchor_point(rect, AnchorSide::Left), Point::new(100.0, 140.0));
    }

    #[test]
    fn touching_rectangles_do_not_overlap() {
        let a = Rect::new(0, 0, 100, 100);
        assert!(!rects_overlap(a, Rect::new(100, 0, 50, 50)));
        assert!(!rects_overlap(a, Rect::new(0, 100, 50, 50)));
        assert!(rects_overlap(a, Rect::new(99, 99, 50, 50)));
        assert!(!rects_overlap(a, Rect::new(10, 10, 0, 0)));
    }

    #[test]
    fn alignment_prefers_the_closest_line() {
        let moving = Rect::new(103, 300, 160, 80);
        let others = [Rect::new(100, 0, 160, 80), Rect::new(104, 600, 160, 80)];
        let alignment = nearest_alignment(moving, &others, 8);
        assert_eq!(alignment.snapped_x, Some(104));
        assert_eq!(alignment.guide_x, Some(104));
        assert_eq!(alignment.snapped_y, None);
    }

    #[test]
    fn alignment_matches_opposite_edges_and_centers() {
        // moving left edge close to the other's right edge
        let moving = Rect::new(263, 0, 40, 40);
        let alignment = nearest_alignment(moving, &[Rect::new(100, 200, 160, 80)], 5);
        assert_eq!(alignment.snapped_x, Some(260));
        assert_eq!(alignment.guide_x, Some(260));

        // vertical centers
        let moving = Rect::new(0, 117, 40, 40);
        let alignment = nearest_alignment(moving, &[Rect::new(400, 100, 160, 80)], 5);
        assert_eq!(alignment.snapped_y, Some(120));
        assert_eq!(alignment.guide_y, Some(140));
    }

    #[test]
    fn alignment_outside_tolerance_is_empty() {
        let alignment = nearest_alignment(Rect::new(0, 0, 40, 40), &[Rect::new(500, 500, 40, 40)], 8);
        assert!(alignment.is_empty());
    }

    #[test]
    fn free_spot_skips_occupied_cells() {
        let size = Size::new(160, 80);
        let occupied = [Rect::new(40, 40, 160, 80)];
        let spot = find_free_spot(size, &occupied, Position::new(40, 40), 20, 4, 20);
        assert_ne!(spot, Position::new(40, 40));
        assert!(!rects_overlap(Rect::from_position(spot, size), occupied[0]));
        assert_eq!(spot, snap(spot, 20));
    }

    #[test]
    fn segment_distance_clamps_to_endpoints() {
        let a = Point::new(0.0, 0.0);
        let b = Point::new(10.0, 0.0);
        assert_eq!(distance_to_segment(Point::new(5.0, 3.0), a, b), 3.0);
        assert_eq!(distance_to_segment(Point::new(13.0, 4.0), a, b), 5.0);
    }
}
