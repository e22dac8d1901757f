use std::collections::{BTreeMap, HashSet};
use std::hash::{Hash, Hasher};

use rustc_hash::FxHasher;

use crate::error::GraphIssue;

/// Smallest width/height a node may have once a lenient validation pass clamps it.
pub const MIN_NODE_SIZE: f32 = 1.0;

/// Domain assumed for nodes that carry no domain tag.
pub const DEFAULT_DOMAIN: &str = "General";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    TopDown,
    BottomTop,
    LeftRight,
    RightLeft,
}

impl Direction {
    pub fn from_token(token: &str) -> Option<Self> {
        match token {
            "TD" | "TB" => Some(Self::TopDown),
            "BT" => Some(Self::BottomTop),
            "LR" => Some(Self::LeftRight),
            "RL" => Some(Self::RightLeft),
            _ => None,
        }
    }

    pub fn is_horizontal(self) -> bool {
        matches!(self, Self::LeftRight | Self::RightLeft)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub id: String,
    pub label: Option<String>,
    pub width: f32,
    pub height: f32,
    /// Categorical grouping (business area, layer) used by the matrix layout.
    pub domain: Option<String>,
    /// Element type tag (`service`, `goal`, `container`, ...).
    pub node_type: Option<String>,
    /// Free-form attributes carried from the source model (lifecycle, criticality, ...).
    pub metadata: BTreeMap<String, String>,
    /// Top-left position the caller wants kept regardless of the algorithm.
    pub fixed_position: Option<(f32, f32)>,
}

impl Node {
    pub fn new(id: impl Into<String>, width: f32, height: f32) -> Self {
        Self {
            id: id.into(),
            label: None,
            width,
            height,
            domain: None,
            node_type: None,
            metadata: BTreeMap::new(),
            fixed_position: None,
        }
    }

    pub fn with_domain(mut self, domain: impl Into<String>) -> Self {
        self.domain = Some(domain.into());
        self
    }

    pub fn with_type(mut self, node_type: impl Into<String>) -> Self {
        self.node_type = Some(node_type.into());
        self
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn with_fixed_position(mut self, x: f32, y: f32) -> Self {
        self.fixed_position = Some((x, y));
        self
    }

    pub fn domain_or_default(&self) -> &str {
        self.domain.as_deref().unwrap_or(DEFAULT_DOMAIN)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Edge {
    pub id: String,
    /// Source node id.
    pub from: String,
    /// Target node id.
    pub to: String,
    pub label: Option<String>,
    pub edge_type: Option<String>,
}

impl Edge {
    pub fn new(id: impl Into<String>, from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            from: from.into(),
            to: to.into(),
            label: None,
            edge_type: None,
        }
    }

    pub fn with_type(mut self, edge_type: impl Into<String>) -> Self {
        self.edge_type = Some(edge_type.into());
        self
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn is_self_loop(&self) -> bool {
        self.from == self.to
    }
}

/// Engine-neutral graph handed to every layout algorithm.
///
/// Nodes are keyed by id, so iteration order never depends on how the
/// caller assembled the graph.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Graph {
    pub nodes: BTreeMap<String, Node>,
    pub edges: Vec<Edge>,
}

impl Graph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a node, refusing to overwrite an existing id.
    pub fn add_node(&mut self, node: Node) -> Result<(), GraphIssue> {
        if self.nodes.contains_key(&node.id) {
            return Err(GraphIssue::DuplicateNode(node.id));
        }
        self.nodes.insert(node.id.clone(), node);
        Ok(())
    }

    pub fn add_edge(&mut self, edge: Edge) {
        self.edges.push(edge);
    }

    pub fn node(&self, id: &str) -> Option<&Node> {
        self.nodes.get(id)
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Collects every structural problem instead of stopping at the first one.
    pub fn validate(&self) -> Vec<GraphIssue> {
        let mut issues = Vec::new();
        for node in self.nodes.values() {
            if !valid_size(node.width) || !valid_size(node.height) {
                issues.push(GraphIssue::InvalidSize {
                    node: node.id.clone(),
                    width: node.width,
                    height: node.height,
                });
            }
        }
        let mut seen: HashSet<&str> = HashSet::new();
        for edge in &self.edges {
            if !seen.insert(edge.id.as_str()) {
                issues.push(GraphIssue::DuplicateEdge(edge.id.clone()));
            }
            if !self.nodes.contains_key(&edge.from) {
                issues.push(GraphIssue::MissingSource {
                    edge: edge.id.clone(),
                    node: edge.from.clone(),
                });
            }
            if !self.nodes.contains_key(&edge.to) {
                issues.push(GraphIssue::MissingTarget {
                    edge: edge.id.clone(),
                    node: edge.to.clone(),
                });
            }
        }
        issues
    }

    /// Returns a copy with dangling and duplicate edges dropped and bad sizes clamped.
    pub fn sanitized(&self) -> (Graph, Vec<GraphIssue>) {
        let issues = self.validate();
        if issues.is_empty() {
            return (self.clone(), issues);
        }
        let mut nodes = self.nodes.clone();
        for node in nodes.values_mut() {
            if !valid_size(node.width) {
                node.width = MIN_NODE_SIZE;
            }
            if !valid_size(node.height) {
                node.height = MIN_NODE_SIZE;
            }
        }
        let mut seen: HashSet<&str> = HashSet::new();
        let edges = self
            .edges
            .iter()
            .filter(|edge| {
                seen.insert(edge.id.as_str())
                    && nodes.contains_key(&edge.from)
                    && nodes.contains_key(&edge.to)
            })
            .cloned()
            .collect();
        (Graph { nodes, edges }, issues)
    }

    /// Number of edge endpoints touching each node; self-loops count twice.
    pub fn degrees(&self) -> BTreeMap<&str, usize> {
        let mut degrees: BTreeMap<&str, usize> =
            self.nodes.keys().map(|id| (id.as_str(), 0)).collect();
        for edge in &self.edges {
            if let Some(d) = degrees.get_mut(edge.from.as_str()) {
                *d += 1;
            }
            if let Some(d) = degrees.get_mut(edge.to.as_str()) {
                *d += 1;
            }
        }
        degrees
    }

    /// Stable content hash. Edge order does not matter; any change to ids,
    /// sizes, tags, pinned positions or endpoints changes the value.
    pub fn fingerprint(&self) -> u64 {
        let mut hasher = FxHasher::default();
        self.nodes.len().hash(&mut hasher);
        for node in self.nodes.values() {
            node.id.hash(&mut hasher);
            node.label.hash(&mut hasher);
            node.width.to_bits().hash(&mut hasher);
            node.height.to_bits().hash(&mut hasher);
            node.domain.hash(&mut hasher);
            node.node_type.hash(&mut hasher);
            node.fixed_position
                .map(|(x, y)| (x.to_bits(), y.to_bits()))
                .hash(&mut hasher);
        }
        let mut edges: Vec<&Edge> = self.edges.iter().collect();
        edges.sort_by(|a, b| a.id.cmp(&b.id).then_with(|| a.from.cmp(&b.from)));
        edges.len().hash(&mut hasher);
        for edge in edges {
            edge.id.hash(&mut hasher);
            edge.from.hash(&mut hasher);
            edge.to.hash(&mut hasher);
            edge.label.hash(&mut hasher);
            edge.edge_type.hash(&mut hasher);
        }
        hasher.finish()
    }
}

fn valid_size(value: f32) -> bool {
    value.is_finite() && value > 0.0
}
