use std::collections::BTreeMap;

use serde::Serialize;

use crate::zoom::DetailLevel;

/// A positioned node. `x`/`y` is the TOP-LEFT corner of the node box for
/// every algorithm; renderers add half the size to get the center.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NodeLayout {
    pub id: String,
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub domain: Option<String>,
    pub node_type: Option<String>,
}

impl NodeLayout {
    pub fn center(&self) -> (f32, f32) {
        (self.x + self.width / 2.0, self.y + self.height / 2.0)
    }

    pub fn right(&self) -> f32 {
        self.x + self.width
    }

    pub fn bottom(&self) -> f32 {
        self.y + self.height
    }

    /// Strict interior overlap; boxes that only touch do not count.
    pub fn overlaps(&self, other: &NodeLayout) -> bool {
        self.x < other.right() && other.x < self.right() && self.y < other.bottom() && other.y < self.bottom()
    }

    /// Distance from `point` to the nearest point of this node's outline.
    pub fn boundary_distance(&self, point: (f32, f32)) -> f32 {
        let (px, py) = point;
        let inside = px > self.x && px < self.right() && py > self.y && py < self.bottom();
        if inside {
            let dx = (px - self.x).min(self.right() - px);
            let dy = (py - self.y).min(self.bottom() - py);
            return dx.min(dy);
        }
        let dx = (self.x - px).max(0.0).max(px - self.right());
        let dy = (self.y - py).max(0.0).max(py - self.bottom());
        (dx * dx + dy * dy).sqrt()
    }
}

/// Edges merged by the bundling pass. The originals are kept verbatim so the
/// bundle can be expanded again.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EdgeBundle {
    pub source_class: String,
    pub target_class: String,
    pub members: Vec<EdgeLayout>,
    /// Index of each member in the edge list before bundling.
    pub original_positions: Vec<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EdgeLayout {
    pub id: String,
    pub from: String,
    pub to: String,
    /// Polyline from the source boundary to the target boundary.
    pub points: Vec<(f32, f32)>,
    pub label: Option<String>,
    pub edge_type: Option<String>,
    /// Endpoints sit in different domains. Render-only hint; never affects geometry.
    pub cross_domain: bool,
    pub bundle: Option<EdgeBundle>,
}

impl EdgeLayout {
    pub fn is_bundled(&self) -> bool {
        self.bundle.is_some()
    }
}

/// Rectangle reserved for a group of nodes (a matrix cell).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GroupLayout {
    pub id: String,
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub row: usize,
    pub col: usize,
    pub nodes: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct Bounds {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl Bounds {
    pub fn aspect_ratio(&self) -> f32 {
        if self.width <= 0.0 || self.height <= 0.0 {
            1.0
        } else {
            self.width / self.height
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LayoutResult {
    pub algorithm: String,
    pub nodes: BTreeMap<String, NodeLayout>,
    pub edges: Vec<EdgeLayout>,
    pub groups: Vec<GroupLayout>,
    pub bounds: Bounds,
    pub duration_ms: f64,
    /// Simulation ticks actually run (0 for non-iterative algorithms).
    pub iterations: usize,
    /// False when an iterative algorithm hit its cap before settling.
    pub converged: bool,
    /// True when the cancellation checkpoint stopped the run early.
    pub cancelled: bool,
    pub detail_level: Option<DetailLevel>,
}

impl LayoutResult {
    pub fn new(
        algorithm: &str,
        nodes: BTreeMap<String, NodeLayout>,
        edges: Vec<EdgeLayout>,
        groups: Vec<GroupLayout>,
    ) -> Self {
        let bounds = compute_bounds(&nodes, &edges, &groups);
        Self {
            algorithm: algorithm.to_string(),
            nodes,
            edges,
            groups,
            bounds,
            duration_ms: 0.0,
            iterations: 0,
            converged: true,
            cancelled: false,
            detail_level: None,
        }
    }

    pub fn width(&self) -> f32 {
        self.bounds.width
    }

    pub fn height(&self) -> f32 {
        self.bounds.height
    }

    pub fn refresh_bounds(&mut self) {
        self.bounds = compute_bounds(&self.nodes, &self.edges, &self.groups);
    }
}

pub(crate) fn compute_bounds(
    nodes: &BTreeMap<String, NodeLayout>,
    edges: &[EdgeLayout],
    groups: &[GroupLayout],
) -> Bounds {
    let mut min_x = f32::MAX;
    let mut min_y = f32::MAX;
    let mut max_x = f32::MIN;
    let mut max_y = f32::MIN;
    let mut any = false;
    let mut grow = |x0: f32, y0: f32, x1: f32, y1: f32| {
        min_x = min_x.min(x0);
        min_y = min_y.min(y0);
        max_x = max_x.max(x1);
        max_y = max_y.max(y1);
        any = true;
    };
    for node in nodes.values() {
        grow(node.x, node.y, node.right(), node.bottom());
    }
    for group in groups {
        grow(group.x, group.y, group.x + group.width, group.y + group.height);
    }
    for edge in edges {
        for &(x, y) in &edge.points {
            grow(x, y, x, y);
        }
    }
    if !any {
        return Bounds::default();
    }
    Bounds {
        x: min_x,
        y: min_y,
        width: max_x - min_x,
        height: max_y - min_y,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(id: &str, x: f32, y: f32) -> NodeLayout {
        NodeLayout {
            id: id.to_string(),
            x,
            y,
            width: 100.0,
            height: 50.0,
            domain: None,
            node_type: None,
        }
    }

    #[test]
    fn touching_boxes_do_not_overlap() {
        assert!(!node("a", 0.0, 0.0).overlaps(&node("b", 100.0, 0.0)));
        assert!(node("a", 0.0, 0.0).overlaps(&node("b", 99.0, 10.0)));
    }

    #[test]
    fn boundary_distance_is_zero_on_outline() {
        let n = node("a", 10.0, 10.0);
        assert!(n.boundary_distance((110.0, 30.0)).abs() < 1e-4);
        assert!(n.boundary_distance((60.0, 10.0)).abs() < 1e-4);
        assert!((n.boundary_distance((120.0, 30.0)) - 10.0).abs() < 1e-4);
        assert!((n.boundary_distance((60.0, 30.0)) - 20.0).abs() < 1e-4);
    }

    #[test]
    fn bounds_cover_nodes_and_edge_points() {
        let mut nodes = BTreeMap::new();
        nodes.insert("a".to_string(), node("a", 0.0, 0.0));
        nodes.insert("b".to_string(), node("b", 200.0, 100.0));
        let edges = vec![EdgeLayout {
            id: "e".to_string(),
            from: "a".to_string(),
            to: "b".to_string(),
            points: vec![(50.0, 50.0), (50.0, -20.0), (250.0, 100.0)],
            label: None,
            edge_type: None,
            cross_domain: false,
            bundle: None,
        }];
        let result = LayoutResult::new("test", nodes, edges, Vec::new());
        assert_eq!(result.bounds.y, -20.0);
        assert_eq!(result.width(), 300.0);
        assert_eq!(result.height(), 170.0);
    }

    #[test]
    fn empty_layout_has_zero_bounds() {
        let result = LayoutResult::new("test", BTreeMap::new(), Vec::new(), Vec::new());
        assert_eq!(result.bounds, Bounds::default());
        assert_eq!(result.bounds.aspect_ratio(), 1.0);
    }
}
