use super::layered::{LayeredSettings, layered_positions};
use super::params::{DIRECTIONS, RoutingStyle};
use super::routing::RouteOptions;
use super::{LayoutAlgorithm, LayoutContext, LayoutResult, ParamSpec, ResolvedParams, finish_layout};
use crate::ir::Graph;

const ORDER_PASSES: usize = 4;

const SCHEMA: &[ParamSpec] = &[
    ParamSpec::choice("direction", DIRECTIONS, "TB", "flow direction of the ranks"),
    ParamSpec::number("node_spacing", 0.0, 1000.0, 60.0, "gap between nodes of one rank"),
    ParamSpec::number("rank_spacing", 0.0, 2000.0, 80.0, "gap between consecutive ranks"),
    ParamSpec::number("edge_spacing", 0.0, 200.0, 10.0, "gap between parallel edges"),
    ParamSpec::number("min_bend_spacing", 0.0, 200.0, 12.0, "shortest segment allowed between two bends"),
    ParamSpec::number("node_clearance", 0.0, 200.0, 16.0, "straight run out of a node before the first bend"),
];

/// Layered placement with every edge routed as horizontal and vertical runs.
#[derive(Debug, Default, Clone, Copy)]
pub struct OrthogonalLayout;

impl LayoutAlgorithm for OrthogonalLayout {
    fn name(&self) -> &'static str {
        "orthogonal"
    }

    fn description(&self) -> &'static str {
        "layered placement with orthogonal edge routing"
    }

    fn schema(&self) -> &'static [ParamSpec] {
        SCHEMA
    }

    fn calculate(&self, graph: &Graph, params: &ResolvedParams<'_>, _ctx: &LayoutContext<'_>) -> LayoutResult {
        let direction = params.direction();
        let clearance = params.number("node_clearance");
        // Ranks must leave room for a stub out of each side plus one bend.
        let rank_spacing = params.number("rank_spacing").max(2.0 * clearance + params.number("min_bend_spacing"));
        let settings = LayeredSettings {
            direction,
            node_spacing: params.number("node_spacing"),
            rank_spacing,
            order_passes: ORDER_PASSES,
        };
        let nodes = layered_positions(graph, &settings);
        let route = RouteOptions {
            style: RoutingStyle::Orthogonal,
            direction,
            edge_spacing: params.number("edge_spacing"),
            min_bend_spacing: params.number("min_bend_spacing"),
            node_clearance: clearance,
        };
        finish_layout(self.name(), graph, nodes, Vec::new(), &route)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{Edge, Node};
    use crate::layout::LayoutOptions;

    #[test]
    fn every_segment_is_horizontal_or_vertical() {
        let mut graph = Graph::new();
        for id in ["gateway", "orders", "billing", "ledger"] {
            graph.add_node(Node::new(id, 120.0, 50.0)).unwrap();
        }
        graph.add_edge(Edge::new("g-o", "gateway", "orders"));
        graph.add_edge(Edge::new("g-b", "gateway", "billing"));
        graph.add_edge(Edge::new("o-l", "orders", "ledger"));
        graph.add_edge(Edge::new("b-l", "billing", "ledger"));
        graph.add_edge(Edge::new("g-l", "gateway", "ledger"));

        let options = LayoutOptions::new();
        let params = ResolvedParams::new(SCHEMA, &options);
        let result = OrthogonalLayout.calculate(&graph, &params, &LayoutContext::new());
        assert_eq!(result.edges.len(), 5);
        for edge in &result.edges {
            for seg in edge.points.windows(2) {
                let axis_aligned = (seg[0].0 - seg[1].0).abs() < 1e-3 || (seg[0].1 - seg[1].1).abs() < 1e-3;
                assert!(axis_aligned, "{}: {:?}", edge.id, edge.points);
            }
        }
    }
}
