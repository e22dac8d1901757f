//! Semantic zoom: maps a zoom scalar to a detail level and hides the
//! element types that level does not show.

use std::collections::BTreeSet;
use std::fmt;

use serde::Serialize;
use tracing::debug;

use crate::ir::{Graph, Node};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DetailLevel {
    Overview,
    Medium,
    Detail,
}

impl DetailLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Overview => "overview",
            Self::Medium => "medium",
            Self::Detail => "detail",
        }
    }
}

impl fmt::Display for DetailLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Level thresholds and the element types each level adds.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ZoomConfig {
    /// Zoom values below this show the overview.
    pub overview_below: f32,
    /// Zoom values below this (and not overview) show the medium level.
    pub medium_below: f32,
    pub overview_types: Vec<String>,
    pub medium_types: Vec<String>,
    pub detail_types: Vec<String>,
}

impl Default for ZoomConfig {
    fn default() -> Self {
        let owned = |items: &[&str]| items.iter().map(|s| (*s).to_string()).collect();
        Self {
            overview_below: 0.4,
            medium_below: 0.8,
            overview_types: owned(&[
                "person",
                "system",
                "external-system",
                "goal",
                "stakeholder",
                "function",
                "changeset",
            ]),
            medium_types: owned(&[
                "container",
                "service",
                "process",
                "driver",
                "outcome",
                "requirement",
                "capability",
            ]),
            detail_types: owned(&[
                "component",
                "event",
                "interface",
                "object",
                "actor",
                "role",
                "principle",
                "constraint",
                "assessment",
                "meaning",
                "value",
                "code",
            ]),
        }
    }
}

/// A resolved zoom: its level plus the node types that stay visible.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ZoomView {
    pub level: DetailLevel,
    pub visible_types: BTreeSet<String>,
}

impl ZoomView {
    /// Untagged nodes are always visible.
    pub fn is_visible(&self, node: &Node) -> bool {
        match &node.node_type {
            Some(kind) => self.visible_types.contains(&kind.to_ascii_lowercase()),
            None => true,
        }
    }

    /// Cache-key fragment identifying this filter.
    pub fn descriptor(&self) -> String {
        format!("zoom={}", self.level)
    }
}

pub fn detail_level(zoom: f32, config: &ZoomConfig) -> DetailLevel {
    if zoom.is_nan() || zoom < config.overview_below {
        DetailLevel::Overview
    } else if zoom < config.medium_below {
        DetailLevel::Medium
    } else {
        DetailLevel::Detail
    }
}

/// Resolves `zoom` into a view. Visible sets are cumulative, so a higher
/// level always shows a superset of a lower one.
pub fn detail_for_zoom(zoom: f32, config: &ZoomConfig) -> ZoomView {
    let level = detail_level(zoom, config);
    let mut visible_types = BTreeSet::new();
    let mut add = |types: &[String]| {
        visible_types.extend(types.iter().map(|t| t.to_ascii_lowercase()));
    };
    add(&config.overview_types);
    if level >= DetailLevel::Medium {
        add(&config.medium_types);
    }
    if level >= DetailLevel::Detail {
        add(&config.detail_types);
    }
    ZoomView { level, visible_types }
}

/// Keeps visible nodes and the edges whose endpoints both survive.
pub fn filter_graph(graph: &Graph, view: &ZoomView) -> Graph {
    let nodes: std::collections::BTreeMap<_, _> = graph
        .nodes
        .iter()
        .filter(|(_, node)| view.is_visible(node))
        .map(|(id, node)| (id.clone(), node.clone()))
        .collect();
    let edges = graph
        .edges
        .iter()
        .filter(|edge| nodes.contains_key(&edge.from) && nodes.contains_key(&edge.to))
        .cloned()
        .collect::<Vec<_>>();
    debug!(
        level = %view.level,
        kept_nodes = nodes.len(),
        hidden_nodes = graph.nodes.len() - nodes.len(),
        kept_edges = edges.len(),
        "zoom filter applied"
    );
    Graph { nodes, edges }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::Edge;

    fn sample() -> Graph {
        let mut graph = Graph::new();
        graph.add_node(Node::new("crm", 100.0, 50.0).with_type("system")).unwrap();
        graph.add_node(Node::new("api", 100.0, 50.0).with_type("Container")).unwrap();
        graph.add_node(Node::new("handler", 100.0, 50.0).with_type("component")).unwrap();
        graph.add_node(Node::new("note", 100.0, 50.0)).unwrap();
        graph.add_edge(Edge::new("e1", "crm", "api"));
        graph.add_edge(Edge::new("e2", "api", "handler"));
        graph.add_edge(Edge::new("e3", "note", "crm"));
        graph
    }

    #[test]
    fn thresholds_pick_levels() {
        let config = ZoomConfig::default();
        assert_eq!(detail_level(0.1, &config), DetailLevel::Overview);
        assert_eq!(detail_level(0.4, &config), DetailLevel::Medium);
        assert_eq!(detail_level(0.79, &config), DetailLevel::Medium);
        assert_eq!(detail_level(0.8, &config), DetailLevel::Detail);
        assert_eq!(detail_level(3.0, &config), DetailLevel::Detail);
    }

    #[test]
    fn degenerate_zoom_values_clamp() {
        let config = ZoomConfig::default();
        assert_eq!(detail_level(f32::NAN, &config), DetailLevel::Overview);
        assert_eq!(detail_level(-2.0, &config), DetailLevel::Overview);
        assert_eq!(detail_level(f32::NEG_INFINITY, &config), DetailLevel::Overview);
        assert_eq!(detail_level(f32::INFINITY, &config), DetailLevel::Detail);
    }

    #[test]
    fn overview_hides_detail_types() {
        let view = detail_for_zoom(0.2, &ZoomConfig::default());
        let filtered = filter_graph(&sample(), &view);
        let ids: Vec<&str> = filtered.nodes.keys().map(String::as_str).collect();
        assert_eq!(ids, ["crm", "note"]);
        assert_eq!(filtered.edges.len(), 1);
        assert_eq!(filtered.edges[0].id, "e3");
    }

    #[test]
    fn medium_matches_types_case_insensitively() {
        let view = detail_for_zoom(0.5, &ZoomConfig::default());
        let filtered = filter_graph(&sample(), &view);
        assert!(filtered.nodes.contains_key("api"));
        assert!(!filtered.nodes.contains_key("handler"));
    }

    #[test]
    fn detail_shows_everything_known() {
        let view = detail_for_zoom(1.0, &ZoomConfig::default());
        let filtered = filter_graph(&sample(), &view);
        assert_eq!(filtered.nodes.len(), 4);
        assert_eq!(filtered.edges.len(), 3);
        assert_eq!(view.descriptor(), "zoom=detail");
    }
}
