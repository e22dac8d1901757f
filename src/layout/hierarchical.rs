//! Hierarchical layout delegated to the `dagre_rust` port of dagre.

use std::collections::{BTreeMap, HashSet};

use dagre_rust::{GraphConfig as DagreConfig, GraphEdge as DagreEdge, GraphNode as DagreNode, layout as dagre_layout};
use graphlib_rust::{Graph as DagreGraph, GraphOption};
use tracing::debug;

use super::params::{DIRECTIONS, ROUTING_STYLES};
use super::routing::RouteOptions;
use super::{
    LAYOUT_MARGIN, LayoutAlgorithm, LayoutContext, LayoutResult, NodeLayout, ParamSpec, ResolvedParams,
    finish_layout, initial_node_layouts, normalize_to_origin,
};
use crate::ir::{Direction, Graph};

const SCHEMA: &[ParamSpec] = &[
    ParamSpec::choice("direction", DIRECTIONS, "TB", "flow direction of the ranks"),
    ParamSpec::number("node_spacing", 0.0, 1000.0, 50.0, "gap between nodes of one rank"),
    ParamSpec::number("rank_spacing", 0.0, 2000.0, 50.0, "gap between consecutive ranks"),
    ParamSpec::choice("routing", ROUTING_STYLES, "straight", "edge routing style"),
];

#[derive(Debug, Default, Clone, Copy)]
pub struct HierarchicalLayout;

impl LayoutAlgorithm for HierarchicalLayout {
    fn name(&self) -> &'static str {
        "hierarchical"
    }

    fn description(&self) -> &'static str {
        "dagre layered layout"
    }

    fn schema(&self) -> &'static [ParamSpec] {
        SCHEMA
    }

    fn calculate(&self, graph: &Graph, params: &ResolvedParams<'_>, _ctx: &LayoutContext<'_>) -> LayoutResult {
        let direction = params.direction();
        let mut nodes = initial_node_layouts(graph);
        if !nodes.is_empty() {
            assign_positions_dagre(
                graph,
                &mut nodes,
                direction,
                params.number("node_spacing"),
                params.number("rank_spacing"),
            );
            normalize_to_origin(&mut nodes, LAYOUT_MARGIN);
        }
        let route = RouteOptions::new(params.routing(), direction);
        finish_layout(self.name(), graph, nodes, Vec::new(), &route)
    }
}

fn assign_positions_dagre(
    graph: &Graph,
    nodes: &mut BTreeMap<String, NodeLayout>,
    direction: Direction,
    node_spacing: f32,
    rank_spacing: f32,
) {
    let mut dagre_graph: DagreGraph<DagreConfig, DagreNode, DagreEdge> = DagreGraph::new(Some(GraphOption {
        directed: Some(true),
        multigraph: Some(false),
        compound: Some(false),
    }));

    let mut graph_config = DagreConfig::default();
    graph_config.rankdir = Some(dagre_rankdir(direction).to_string());
    graph_config.nodesep = Some(node_spacing);
    graph_config.ranksep = Some(rank_spacing);
    graph_config.marginx = Some(LAYOUT_MARGIN);
    graph_config.marginy = Some(LAYOUT_MARGIN);
    dagre_graph.set_graph(graph_config);

    for (node_id, layout) in nodes.iter() {
        let mut node = DagreNode::default();
        node.width = layout.width;
        node.height = layout.height;
        dagre_graph.set_node(node_id.clone(), Some(node));
    }

    // dagre is built as a simple graph: parallel edges and self-loops only
    // matter to the router.
    let mut edge_set: HashSet<(&str, &str)> = HashSet::new();
    for edge in &graph.edges {
        if edge.is_self_loop() || !edge_set.insert((edge.from.as_str(), edge.to.as_str())) {
            continue;
        }
        let _ = dagre_graph.set_edge(&edge.from, &edge.to, Some(DagreEdge::default()), None);
    }

    dagre_layout::run_layout(&mut dagre_graph);

    let mut placed = 0usize;
    for (node_id, node) in nodes.iter_mut() {
        let Some(dagre_node) = dagre_graph.node(node_id) else {
            continue;
        };
        node.x = dagre_node.x - node.width / 2.0;
        node.y = dagre_node.y - node.height / 2.0;
        placed += 1;
    }
    debug!(placed, edges = edge_set.len(), "dagre layout applied");
}

fn dagre_rankdir(direction: Direction) -> &'static str {
    match direction {
        Direction::TopDown => "tb",
        Direction::BottomTop => "bt",
        Direction::LeftRight => "lr",
        Direction::RightLeft => "rl",
    }
}
