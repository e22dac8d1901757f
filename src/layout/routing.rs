use std::collections::{BTreeMap, HashMap};

use tracing::warn;

use super::params::RoutingStyle;
use super::types::{EdgeLayout, NodeLayout};
use crate::ir::{DEFAULT_DOMAIN, Direction, Edge, Graph};

/// dx/dy ratio beyond which a pair of nodes is connected through its
/// horizontal sides regardless of the flow direction.
const DIRECTION_PREF_RATIO: f32 = 1.6;
/// Straight-line gap between parallel edges when the caller sets none.
const DEFAULT_EDGE_SPACING: f32 = 10.0;
const DEFAULT_MIN_BEND_SPACING: f32 = 12.0;
const DEFAULT_NODE_CLEARANCE: f32 = 16.0;
/// Channel offsets tried on each side of the midpoint, in multiples of edge spacing.
const CHANNEL_STEPS: i32 = 3;

const OBSTACLE_PENALTY: f32 = 1000.0;
const SHORT_SEGMENT_PENALTY: f32 = 200.0;
const BEND_PENALTY: f32 = 10.0;
const LENGTH_PENALTY: f32 = 0.01;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) enum EdgeSide {
    Left,
    Right,
    Top,
    Bottom,
}

pub(crate) fn side_is_vertical(side: EdgeSide) -> bool {
    matches!(side, EdgeSide::Left | EdgeSide::Right)
}

/// Routing knobs shared by every algorithm that emits edges.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RouteOptions {
    pub style: RoutingStyle,
    pub direction: Direction,
    pub edge_spacing: f32,
    pub min_bend_spacing: f32,
    pub node_clearance: f32,
}

impl RouteOptions {
    pub fn new(style: RoutingStyle, direction: Direction) -> Self {
        Self {
            style,
            direction,
            edge_spacing: DEFAULT_EDGE_SPACING,
            min_bend_spacing: DEFAULT_MIN_BEND_SPACING,
            node_clearance: DEFAULT_NODE_CLEARANCE,
        }
    }
}

impl Default for RouteOptions {
    fn default() -> Self {
        Self::new(RoutingStyle::Straight, Direction::TopDown)
    }
}

/// Routes every edge of `graph` between the already positioned `nodes`.
///
/// Edges whose endpoint has no position are skipped with a warning; the
/// remaining edges come back in input order.
pub fn route_edges(graph: &Graph, nodes: &BTreeMap<String, NodeLayout>, options: &RouteOptions) -> Vec<EdgeLayout> {
    let pair_counts = build_edge_pair_counts(&graph.edges);
    let mut pair_seen: HashMap<(&str, &str), usize> = HashMap::new();
    let mut routed = Vec::with_capacity(graph.edges.len());

    for edge in &graph.edges {
        let (Some(from), Some(to)) = (nodes.get(&edge.from), nodes.get(&edge.to)) else {
            warn!(edge = %edge.id, from = %edge.from, to = %edge.to, "skipping edge with unpositioned endpoint");
            continue;
        };
        let key = edge_pair_key(edge);
        let total = pair_counts.get(&key).copied().unwrap_or(1);
        let slot = pair_seen.entry(key).or_insert(0);
        let offset = parallel_edge_offset(*slot, total, options.edge_spacing);
        *slot += 1;

        let points = if edge.is_self_loop() {
            route_self_loop(from, options.node_clearance.max(DEFAULT_NODE_CLEARANCE), offset)
        } else {
            match options.style {
                RoutingStyle::Straight => route_straight(from, to, offset, edge.from <= edge.to),
                RoutingStyle::Orthogonal => route_orthogonal(from, to, nodes, offset, options),
            }
        };

        routed.push(EdgeLayout {
            id: edge.id.clone(),
            from: edge.from.clone(),
            to: edge.to.clone(),
            points,
            label: edge.label.clone(),
            edge_type: edge.edge_type.clone(),
            cross_domain: is_cross_domain(from, to),
            bundle: None,
        });
    }
    routed
}

pub(crate) fn is_cross_domain(from: &NodeLayout, to: &NodeLayout) -> bool {
    from.domain.as_deref().unwrap_or(DEFAULT_DOMAIN) != to.domain.as_deref().unwrap_or(DEFAULT_DOMAIN)
}

pub(crate) fn edge_pair_key(edge: &Edge) -> (&str, &str) {
    if edge.from <= edge.to {
        (edge.from.as_str(), edge.to.as_str())
    } else {
        (edge.to.as_str(), edge.from.as_str())
    }
}

pub(crate) fn build_edge_pair_counts(edges: &[Edge]) -> HashMap<(&str, &str), usize> {
    let mut counts: HashMap<(&str, &str), usize> = HashMap::new();
    for edge in edges {
        *counts.entry(edge_pair_key(edge)).or_insert(0) += 1;
    }
    counts
}

/// Symmetric offset of the `index`-th of `total` parallel edges.
pub(crate) fn parallel_edge_offset(index: usize, total: usize, gap: f32) -> f32 {
    if total <= 1 {
        return 0.0;
    }
    (index as f32 - (total as f32 - 1.0) / 2.0) * gap
}

/// Point where the ray from the node center toward `toward` leaves the box.
pub(crate) fn clip_to_boundary(node: &NodeLayout, toward: (f32, f32)) -> (f32, f32) {
    let (cx, cy) = node.center();
    let dx = toward.0 - cx;
    let dy = toward.1 - cy;
    let hw = node.width / 2.0;
    let hh = node.height / 2.0;
    if dx.abs() < 1e-6 && dy.abs() < 1e-6 {
        return (cx, node.bottom());
    }
    let tx = if dx.abs() < 1e-6 { f32::INFINITY } else { hw / dx.abs() };
    let ty = if dy.abs() < 1e-6 { f32::INFINITY } else { hh / dy.abs() };
    let t = tx.min(ty);
    (cx + dx * t, cy + dy * t)
}

/// Center-to-center line clipped to both boxes. Parallel edges bow out
/// through a midpoint shifted perpendicular to the center line; `forward`
/// tells whether the edge runs in the pair's canonical order so opposite
/// edges of the same pair bow to consistent sides.
fn route_straight(from: &NodeLayout, to: &NodeLayout, offset: f32, forward: bool) -> Vec<(f32, f32)> {
    let a = from.center();
    let b = to.center();
    if offset.abs() < 1e-6 {
        return vec![clip_to_boundary(from, b), clip_to_boundary(to, a)];
    }
    let (dx, dy) = if forward { (b.0 - a.0, b.1 - a.1) } else { (a.0 - b.0, a.1 - b.1) };
    let len = (dx * dx + dy * dy).sqrt().max(1e-3);
    let normal = (-dy / len, dx / len);
    let mid = ((a.0 + b.0) / 2.0 + normal.0 * offset, (a.1 + b.1) / 2.0 + normal.1 * offset);
    vec![clip_to_boundary(from, mid), mid, clip_to_boundary(to, mid)]
}

/// Loop leaving the top side and re-entering the right side, around the
/// top-right corner.
pub(crate) fn route_self_loop(node: &NodeLayout, pad: f32, offset: f32) -> Vec<(f32, f32)> {
    let pad = pad + offset.abs();
    let top_x = node.x + node.width * 0.75;
    let side_y = node.y + node.height * 0.25;
    let right_x = node.right() + pad;
    let top_y = node.y - pad;
    vec![
        (top_x, node.y),
        (top_x, top_y),
        (right_x, top_y),
        (right_x, side_y),
        (node.right(), side_y),
    ]
}

/// Sides the edge leaves `from` and enters `to`, plus whether it runs
/// against the flow direction.
pub(crate) fn edge_sides(from: &NodeLayout, to: &NodeLayout, direction: Direction) -> (EdgeSide, EdgeSide, bool) {
    let (from_cx, from_cy) = from.center();
    let (to_cx, to_cy) = to.center();
    let dx = to_cx - from_cx;
    let dy = to_cy - from_cy;
    let x_overlap = from.x < to.right() && to.x < from.right();
    let y_overlap = from.y < to.bottom() && to.y < from.bottom();

    let ratio = dx.abs() / dy.abs().max(1e-3);
    let horiz_pref = ratio > DIRECTION_PREF_RATIO || (y_overlap && ratio > 0.9);
    let vert_pref = ratio < 1.0 / DIRECTION_PREF_RATIO || (x_overlap && ratio < 1.1);
    let use_horizontal = if horiz_pref && !vert_pref {
        true
    } else if vert_pref && !horiz_pref {
        false
    } else {
        direction.is_horizontal()
    };

    if use_horizontal {
        let is_backward = match direction {
            Direction::RightLeft => dx > 0.0,
            _ => dx < 0.0,
        };
        if dx >= 0.0 {
            (EdgeSide::Right, EdgeSide::Left, is_backward)
        } else {
            (EdgeSide::Left, EdgeSide::Right, is_backward)
        }
    } else {
        let is_backward = match direction {
            Direction::BottomTop => dy > 0.0,
            _ => dy < 0.0,
        };
        if dy >= 0.0 {
            (EdgeSide::Bottom, EdgeSide::Top, is_backward)
        } else {
            (EdgeSide::Top, EdgeSide::Bottom, is_backward)
        }
    }
}

/// Point on `side`, shifted along it by `offset` and kept one unit inside the corners.
pub(crate) fn anchor_point_for_node(node: &NodeLayout, side: EdgeSide, offset: f32) -> (f32, f32) {
    let (cx, cy) = node.center();
    let max_offset = if side_is_vertical(side) {
        node.height / 2.0 - 1.0
    } else {
        node.width / 2.0 - 1.0
    };
    let clamp = if max_offset > 0.0 {
        offset.clamp(-max_offset, max_offset)
    } else {
        0.0
    };
    match side {
        EdgeSide::Left => (node.x, cy + clamp),
        EdgeSide::Right => (node.right(), cy + clamp),
        EdgeSide::Top => (cx + clamp, node.y),
        EdgeSide::Bottom => (cx + clamp, node.bottom()),
    }
}

pub(crate) fn port_stub_point(point: (f32, f32), side: EdgeSide, length: f32) -> (f32, f32) {
    match side {
        EdgeSide::Left => (point.0 - length, point.1),
        EdgeSide::Right => (point.0 + length, point.1),
        EdgeSide::Top => (point.0, point.1 - length),
        EdgeSide::Bottom => (point.0, point.1 + length),
    }
}

/// Horizontal/vertical polyline between facing sides of `from` and `to`.
///
/// Tries a straight run, both L-shapes, Z-shapes through a spread of
/// channels and detours around both boxes, then keeps the cheapest by
/// obstacle hits, short jogs, bends and length. Heuristic, not minimal.
pub(crate) fn route_orthogonal(
    from: &NodeLayout,
    to: &NodeLayout,
    nodes: &BTreeMap<String, NodeLayout>,
    offset: f32,
    options: &RouteOptions,
) -> Vec<(f32, f32)> {
    let (start_side, end_side, _) = edge_sides(from, to, options.direction);
    let start = anchor_point_for_node(from, start_side, offset);
    let end = anchor_point_for_node(to, end_side, offset);

    let mut candidates: Vec<Vec<(f32, f32)>> = Vec::new();
    if let Some(straight) = aligned_route(from, to, start, end, start_side, options.min_bend_spacing) {
        if path_obstacle_intersections(&straight, from, to, nodes) == 0 {
            return straight;
        }
        candidates.push(straight);
    }

    let clearance = options.node_clearance.max(0.0);
    let s1 = port_stub_point(start, start_side, clearance);
    let e1 = port_stub_point(end, end_side, clearance);
    let spacing = options.edge_spacing.max(1.0);

    candidates.push(vec![start, s1, (e1.0, s1.1), e1, end]);
    candidates.push(vec![start, s1, (s1.0, e1.1), e1, end]);

    let leaves_vertically = !side_is_vertical(start_side);
    let enters_vertically = !side_is_vertical(end_side);
    if leaves_vertically && enters_vertically {
        let mid = (s1.1 + e1.1) / 2.0;
        for step in -CHANNEL_STEPS..=CHANNEL_STEPS {
            let y = mid + step as f32 * spacing + offset;
            candidates.push(vec![start, s1, (s1.0, y), (e1.0, y), e1, end]);
        }
        let left = from.x.min(to.x) - clearance + offset;
        let right = from.right().max(to.right()) + clearance + offset;
        for x in [left, right] {
            candidates.push(vec![start, s1, (x, s1.1), (x, e1.1), e1, end]);
        }
    } else if !leaves_vertically && !enters_vertically {
        let mid = (s1.0 + e1.0) / 2.0;
        for step in -CHANNEL_STEPS..=CHANNEL_STEPS {
            let x = mid + step as f32 * spacing + offset;
            candidates.push(vec![start, s1, (x, s1.1), (x, e1.1), e1, end]);
        }
        let top = from.y.min(to.y) - clearance + offset;
        let bottom = from.bottom().max(to.bottom()) + clearance + offset;
        for y in [top, bottom] {
            candidates.push(vec![start, s1, (s1.0, y), (e1.0, y), e1, end]);
        }
    }

    let mut best: Option<(f32, Vec<(f32, f32)>)> = None;
    for candidate in candidates {
        let path = compress_path(&candidate);
        let score = route_score(&path, from, to, nodes, options.min_bend_spacing);
        if best.as_ref().is_none_or(|(best_score, _)| score < *best_score) {
            best = Some((score, path));
        }
    }
    best.map(|(_, path)| path).unwrap_or_else(|| vec![start, end])
}

/// Straight run when both anchors sit within `min_bend_spacing` of the same
/// line and the two boxes share that line's span.
fn aligned_route(
    from: &NodeLayout,
    to: &NodeLayout,
    start: (f32, f32),
    end: (f32, f32),
    side: EdgeSide,
    min_bend_spacing: f32,
) -> Option<Vec<(f32, f32)>> {
    if side_is_vertical(side) {
        if (start.1 - end.1).abs() >= min_bend_spacing {
            return None;
        }
        let lo = from.y.max(to.y) + 1.0;
        let hi = from.bottom().min(to.bottom()) - 1.0;
        if lo > hi {
            return None;
        }
        let y = ((start.1 + end.1) / 2.0).clamp(lo, hi);
        Some(vec![(start.0, y), (end.0, y)])
    } else {
        if (start.0 - end.0).abs() >= min_bend_spacing {
            return None;
        }
        let lo = from.x.max(to.x) + 1.0;
        let hi = from.right().min(to.right()) - 1.0;
        if lo > hi {
            return None;
        }
        let x = ((start.0 + end.0) / 2.0).clamp(lo, hi);
        Some(vec![(x, start.1), (x, end.1)])
    }
}

fn route_score(
    path: &[(f32, f32)],
    from: &NodeLayout,
    to: &NodeLayout,
    nodes: &BTreeMap<String, NodeLayout>,
    min_bend_spacing: f32,
) -> f32 {
    let hits = path_obstacle_intersections(path, from, to, nodes);
    let segments = path.len().saturating_sub(1);
    let short = path
        .windows(2)
        .enumerate()
        .filter(|(idx, seg)| {
            *idx > 0 && *idx + 1 < segments && segment_length(seg[0], seg[1]) < min_bend_spacing
        })
        .count();
    hits as f32 * OBSTACLE_PENALTY
        + short as f32 * SHORT_SEGMENT_PENALTY
        + path_bend_count(path) as f32 * BEND_PENALTY
        + path_length(path) * LENGTH_PENALTY
}

/// Counts segment/box intersections. The endpoint boxes are shrunk by one
/// unit and their touching stubs skipped so leaving a box is not a hit.
pub(crate) fn path_obstacle_intersections(
    path: &[(f32, f32)],
    from: &NodeLayout,
    to: &NodeLayout,
    nodes: &BTreeMap<String, NodeLayout>,
) -> usize {
    let segments = path.len().saturating_sub(1);
    let mut hits = 0;
    for (idx, seg) in path.windows(2).enumerate() {
        for node in nodes.values() {
            let is_endpoint = node.id == from.id || node.id == to.id;
            if is_endpoint {
                if idx == 0 || idx + 1 == segments {
                    continue;
                }
                let inset = Rect::from_node(node).inset(1.0);
                if segment_intersects_rect(seg[0], seg[1], &inset) {
                    hits += 1;
                }
            } else if segment_intersects_rect(seg[0], seg[1], &Rect::from_node(node)) {
                hits += 1;
            }
        }
    }
    hits
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct Rect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl Rect {
    pub(crate) fn from_node(node: &NodeLayout) -> Self {
        Self {
            x: node.x,
            y: node.y,
            width: node.width,
            height: node.height,
        }
    }

    fn inset(self, by: f32) -> Self {
        Self {
            x: self.x + by,
            y: self.y + by,
            width: (self.width - 2.0 * by).max(0.0),
            height: (self.height - 2.0 * by).max(0.0),
        }
    }
}

pub(crate) fn compress_path(points: &[(f32, f32)]) -> Vec<(f32, f32)> {
    let mut deduped: Vec<(f32, f32)> = Vec::with_capacity(points.len());
    for &point in points {
        if let Some(&last) = deduped.last()
            && (point.0 - last.0).abs() <= 1e-4
            && (point.1 - last.1).abs() <= 1e-4
        {
            continue;
        }
        deduped.push(point);
    }
    if deduped.len() <= 2 {
        return deduped;
    }
    let mut out: Vec<(f32, f32)> = Vec::with_capacity(deduped.len());
    out.push(deduped[0]);
    for idx in 1..deduped.len() - 1 {
        let prev = out[out.len() - 1];
        let curr = deduped[idx];
        let next = deduped[idx + 1];
        let dx1 = curr.0 - prev.0;
        let dy1 = curr.1 - prev.1;
        let dx2 = next.0 - curr.0;
        let dy2 = next.1 - curr.1;
        let same_heading = (dx1 * dy2 - dy1 * dx2).abs() <= 1e-4 && dx1 * dx2 + dy1 * dy2 >= 0.0;
        if same_heading {
            continue;
        }
        out.push(curr);
    }
    out.push(deduped[deduped.len() - 1]);
    out
}

pub(crate) fn segment_length(a: (f32, f32), b: (f32, f32)) -> f32 {
    let dx = b.0 - a.0;
    let dy = b.1 - a.1;
    (dx * dx + dy * dy).sqrt()
}

pub(crate) fn path_length(points: &[(f32, f32)]) -> f32 {
    points.windows(2).map(|seg| segment_length(seg[0], seg[1])).sum()
}

pub(crate) fn path_bend_count(points: &[(f32, f32)]) -> usize {
    if points.len() < 3 {
        return 0;
    }
    let mut bends = 0usize;
    for idx in 1..points.len() - 1 {
        let p0 = points[idx - 1];
        let p1 = points[idx];
        let p2 = points[idx + 1];
        let dx1 = p1.0 - p0.0;
        let dy1 = p1.1 - p0.1;
        let dx2 = p2.0 - p1.0;
        let dy2 = p2.1 - p1.1;
        if (dx1.abs() <= 1e-4 && dy1.abs() <= 1e-4) || (dx2.abs() <= 1e-4 && dy2.abs() <= 1e-4) {
            continue;
        }
        let cross = dx1 * dy2 - dy1 * dx2;
        if cross.abs() > 1e-4 {
            bends += 1;
        }
    }
    bends
}

pub(crate) fn segment_intersects_rect(a: (f32, f32), b: (f32, f32), rect: &Rect) -> bool {
    let (x1, y1) = a;
    let (x2, y2) = b;
    let min_x = x1.min(x2);
    let max_x = x1.max(x2);
    let min_y = y1.min(y2);
    let max_y = y1.max(y2);
    if max_x < rect.x || min_x > rect.x + rect.width || max_y < rect.y || min_y > rect.y + rect.height {
        return false;
    }
    let inside = |x: f32, y: f32| x >= rect.x && x <= rect.x + rect.width && y >= rect.y && y <= rect.y + rect.height;
    if inside(x1, y1) || inside(x2, y2) {
        return true;
    }
    let corners = [
        (rect.x, rect.y),
        (rect.x + rect.width, rect.y),
        (rect.x + rect.width, rect.y + rect.height),
        (rect.x, rect.y + rect.height),
    ];
    (0..4).any(|idx| segments_intersect(a, b, corners[idx], corners[(idx + 1) % 4]))
}

pub(crate) fn segments_intersect(a: (f32, f32), b: (f32, f32), c: (f32, f32), d: (f32, f32)) -> bool {
    fn orient(a: (f32, f32), b: (f32, f32), c: (f32, f32)) -> f32 {
        (b.0 - a.0) * (c.1 - a.1) - (b.1 - a.1) * (c.0 - a.0)
    }
    fn on_segment(a: (f32, f32), b: (f32, f32), c: (f32, f32)) -> bool {
        c.0 >= a.0.min(b.0) - 1e-6
            && c.0 <= a.0.max(b.0) + 1e-6
            && c.1 >= a.1.min(b.1) - 1e-6
            && c.1 <= a.1.max(b.1) + 1e-6
    }
    let o1 = orient(a, b, c);
    let o2 = orient(a, b, d);
    let o3 = orient(c, d, a);
    let o4 = orient(c, d, b);
    if (o1 > 0.0 && o2 < 0.0 || o1 < 0.0 && o2 > 0.0) && (o3 > 0.0 && o4 < 0.0 || o3 < 0.0 && o4 > 0.0) {
        return true;
    }
    (o1.abs() <= 1e-6 && on_segment(a, b, c))
        || (o2.abs() <= 1e-6 && on_segment(a, b, d))
        || (o3.abs() <= 1e-6 && on_segment(c, d, a))
        || (o4.abs() <= 1e-6 && on_segment(c, d, b))
}
