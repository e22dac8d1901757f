//! Layout algorithms and the contract they share.
//!
//! Every algorithm turns an immutable [`Graph`] into a [`LayoutResult`]
//! whose node positions are top-left corners. Edges are routed afterwards
//! by [`routing::route_edges`], so all algorithms agree on how polylines
//! meet node boundaries.

pub mod force;
pub mod hierarchical;
pub mod layered;
pub mod matrix;
pub mod orthogonal;
pub mod params;
pub mod registry;
pub mod routing;
pub mod stress;
pub(crate) mod types;

pub use params::{LayoutOptions, ParamKind, ParamSpec, ResolvedParams, RoutingStyle, validate_options};
pub use registry::{LayoutRegistry, ValidationReport};
pub use routing::RouteOptions;
pub use types::*;

use std::collections::BTreeMap;

use crate::error::ParamViolation;
use crate::ir::Graph;

/// Margin left around layouts that are shifted into non-negative space.
pub(crate) const LAYOUT_MARGIN: f32 = 8.0;

/// Per-call state handed to an algorithm.
#[derive(Clone, Copy, Default)]
pub struct LayoutContext<'a> {
    cancel: Option<&'a dyn Fn() -> bool>,
}

impl<'a> LayoutContext<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Installs a checkpoint consulted between simulation iterations.
    /// Returning `true` stops the run and keeps the best positions so far.
    pub fn with_cancel(cancel: &'a dyn Fn() -> bool) -> Self {
        Self { cancel: Some(cancel) }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_some_and(|cancel| cancel())
    }
}

impl std::fmt::Debug for LayoutContext<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LayoutContext")
            .field("cancellable", &self.cancel.is_some())
            .finish()
    }
}

pub trait LayoutAlgorithm: Send + Sync {
    fn name(&self) -> &'static str;

    fn description(&self) -> &'static str {
        ""
    }

    fn schema(&self) -> &'static [ParamSpec];

    /// Checks `options` against [`Self::schema`], returning every violation.
    fn validate(&self, options: &LayoutOptions) -> Vec<ParamViolation> {
        validate_options(self.name(), self.schema(), options)
    }

    /// Lays out `graph`. `params` have already passed [`Self::validate`] and
    /// `graph` contains no dangling edges.
    fn calculate(&self, graph: &Graph, params: &ResolvedParams<'_>, ctx: &LayoutContext<'_>) -> LayoutResult;
}

/// One unpositioned layout box per node, at the origin.
pub(crate) fn initial_node_layouts(graph: &Graph) -> BTreeMap<String, NodeLayout> {
    graph
        .nodes
        .values()
        .map(|node| {
            (
                node.id.clone(),
                NodeLayout {
                    id: node.id.clone(),
                    x: 0.0,
                    y: 0.0,
                    width: node.width,
                    height: node.height,
                    domain: node.domain.clone(),
                    node_type: node.node_type.clone(),
                },
            )
        })
        .collect()
}

/// Shifts every node so the top-left of the whole layout sits at `(margin, margin)`.
pub(crate) fn normalize_to_origin(nodes: &mut BTreeMap<String, NodeLayout>, margin: f32) {
    let min_x = nodes.values().map(|n| n.x).fold(f32::INFINITY, f32::min);
    let min_y = nodes.values().map(|n| n.y).fold(f32::INFINITY, f32::min);
    if !min_x.is_finite() || !min_y.is_finite() {
        return;
    }
    let dx = margin - min_x;
    let dy = margin - min_y;
    for node in nodes.values_mut() {
        node.x += dx;
        node.y += dy;
    }
}

/// Moves nodes with a caller supplied position back onto it.
pub(crate) fn apply_fixed_positions(graph: &Graph, nodes: &mut BTreeMap<String, NodeLayout>) {
    for node in graph.nodes.values() {
        if let Some((x, y)) = node.fixed_position
            && let Some(layout) = nodes.get_mut(&node.id)
        {
            layout.x = x;
            layout.y = y;
        }
    }
}

pub(crate) fn has_fixed_positions(graph: &Graph) -> bool {
    graph.nodes.values().any(|node| node.fixed_position.is_some())
}

/// Pins fixed nodes, routes every edge and assembles the result.
pub(crate) fn finish_layout(
    algorithm: &str,
    graph: &Graph,
    mut nodes: BTreeMap<String, NodeLayout>,
    groups: Vec<GroupLayout>,
    route: &RouteOptions,
) -> LayoutResult {
    apply_fixed_positions(graph, &mut nodes);
    let edges = routing::route_edges(graph, &nodes, route);
    LayoutResult::new(algorithm, nodes, edges, groups)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::Node;
    use std::cell::Cell;

    #[test]
    fn context_reports_cancellation() {
        let calls = Cell::new(0);
        let check = || {
            calls.set(calls.get() + 1);
            calls.get() > 2
        };
        let ctx = LayoutContext::with_cancel(&check);
        assert!(!ctx.is_cancelled());
        assert!(!ctx.is_cancelled());
        assert!(ctx.is_cancelled());
        assert!(!LayoutContext::new().is_cancelled());
    }

    #[test]
    fn normalize_moves_layout_to_margin() {
        let mut graph = Graph::new();
        graph.add_node(Node::new("a", 10.0, 10.0)).unwrap();
        graph.add_node(Node::new("b", 10.0, 10.0)).unwrap();
        let mut nodes = initial_node_layouts(&graph);
        nodes.get_mut("a").unwrap().x = -50.0;
        nodes.get_mut("b").unwrap().y = -20.0;
        normalize_to_origin(&mut nodes, LAYOUT_MARGIN);
        assert_eq!(nodes["a"].x, LAYOUT_MARGIN);
        assert_eq!(nodes["b"].y, LAYOUT_MARGIN);
        assert_eq!(nodes["b"].x, 50.0 + LAYOUT_MARGIN);
    }

    #[test]
    fn fixed_positions_override_placement() {
        let mut graph = Graph::new();
        graph.add_node(Node::new("a", 10.0, 10.0).with_fixed_position(400.0, 7.0)).unwrap();
        let result = finish_layout("test", &graph, initial_node_layouts(&graph), Vec::new(), &RouteOptions::default());
        assert_eq!((result.nodes["a"].x, result.nodes["a"].y), (400.0, 7.0));
    }
}
