//! Turns external architecture documents into the engine-neutral [`Graph`].
//!
//! Two document shapes are understood: a layered model (`layers` holding
//! elements and relationships, plus cross-layer `references`) and a
//! changeset (`metadata` plus a list of element changes).

use std::collections::{BTreeMap, BTreeSet, HashMap};

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::error::AdapterError;
use crate::ir::{Edge, Graph, Node};

/// Element ids of the form `layer.type.name`.
static ELEMENT_ID_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^([a-z_]+)\.([a-z-]+)\.(.+)$").unwrap());

pub const DEFAULT_NODE_WIDTH: f32 = 200.0;
pub const DEFAULT_NODE_HEIGHT: f32 = 100.0;

/// Element properties copied into node metadata when present.
const METADATA_KEYS: &[&str] = &["lifecycle", "criticality", "status", "owner"];

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ModelDocument {
    #[serde(default)]
    pub layers: BTreeMap<String, ModelLayer>,
    #[serde(default)]
    pub references: Vec<CrossReference>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ModelLayer {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub elements: Vec<ModelElement>,
    #[serde(default)]
    pub relationships: Vec<ModelRelationship>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelElement {
    pub id: String,
    #[serde(default, rename = "type")]
    pub element_type: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub layer_id: Option<String>,
    #[serde(default)]
    pub properties: Map<String, Value>,
    #[serde(default)]
    pub visual: Option<Visual>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Visual {
    #[serde(default)]
    pub position: Option<Position>,
    #[serde(default)]
    pub size: Option<Size>,
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct Position {
    pub x: f32,
    pub y: f32,
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct Size {
    pub width: f32,
    pub height: f32,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelRelationship {
    #[serde(default)]
    pub id: Option<String>,
    pub source_id: String,
    pub target_id: String,
    #[serde(default, rename = "type")]
    pub relationship_type: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CrossReference {
    pub source: ElementRef,
    pub target: ElementRef,
    #[serde(default, rename = "type")]
    pub reference_type: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ElementRef {
    pub layer_id: String,
    pub element_id: String,
}

/// How a model is narrowed and sized on its way into a graph.
#[derive(Debug, Clone)]
pub struct AdapterOptions {
    /// Only these layers are kept; `None` keeps all of them.
    pub layers: Option<BTreeSet<String>>,
    pub include_references: bool,
    /// Use `visual.position` as a pinned position instead of ignoring it.
    pub pin_positions: bool,
}

impl Default for AdapterOptions {
    fn default() -> Self {
        Self {
            layers: None,
            include_references: true,
            pin_positions: false,
        }
    }
}

impl AdapterOptions {
    fn keeps_layer(&self, layer: &str) -> bool {
        self.layers.as_ref().is_none_or(|keep| keep.contains(layer))
    }
}

pub fn parse_model(text: &str, options: &AdapterOptions) -> Result<Graph, AdapterError> {
    let document: ModelDocument = serde_json::from_str(text)?;
    graph_from_model(&document, options)
}

/// Relationship and reference endpoints that name no element are kept as
/// edges so graph validation can report them. Endpoints hidden by the layer
/// filter are dropped quietly.
pub fn graph_from_model(document: &ModelDocument, options: &AdapterOptions) -> Result<Graph, AdapterError> {
    if let Some(wanted) = &options.layers
        && let Some(missing) = wanted.iter().find(|layer| !document.layers.contains_key(*layer))
    {
        return Err(AdapterError::UnknownLayer(missing.clone()));
    }

    let resolver = IdResolver::new(document.layers.values().flat_map(|layer| &layer.elements));
    let mut graph = Graph::new();
    for (layer_key, layer) in &document.layers {
        if !options.keeps_layer(layer_key) {
            continue;
        }
        for element in &layer.elements {
            graph.add_node(element_node(element, layer_key, options))?;
        }
    }

    for (layer_key, layer) in &document.layers {
        if !options.keeps_layer(layer_key) {
            continue;
        }
        for relationship in &layer.relationships {
            let from = resolver.resolve(&relationship.source_id);
            let to = resolver.resolve(&relationship.target_id);
            if filtered_out(&graph, &resolver, from) || filtered_out(&graph, &resolver, to) {
                debug!(source = from, target = to, "relationship hidden by layer filter");
                continue;
            }
            let kind = relationship.relationship_type.as_deref().unwrap_or("association");
            let id = relationship.id.clone().unwrap_or_else(|| format!("{from}-{kind}-{to}"));
            let mut edge = Edge::new(id, from, to);
            edge.edge_type = relationship.relationship_type.clone();
            graph.add_edge(edge);
        }
    }

    if options.include_references {
        for reference in &document.references {
            if !options.keeps_layer(&reference.source.layer_id) || !options.keeps_layer(&reference.target.layer_id) {
                continue;
            }
            let from = resolver.resolve(&reference.source.element_id);
            let to = resolver.resolve(&reference.target.element_id);
            if filtered_out(&graph, &resolver, from) || filtered_out(&graph, &resolver, to) {
                continue;
            }
            let kind = reference.reference_type.as_deref().unwrap_or("reference");
            let mut edge = Edge::new(format!("ref:{from}-{kind}-{to}"), from, to);
            edge.edge_type = reference.reference_type.clone();
            graph.add_edge(edge);
        }
    }

    debug!(
        layers = document.layers.len(),
        nodes = graph.nodes.len(),
        edges = graph.edges.len(),
        "model adapted"
    );
    Ok(graph)
}

fn element_node(element: &ModelElement, layer_key: &str, options: &AdapterOptions) -> Node {
    let parts = ELEMENT_ID_RE.captures(&element.id);
    let size = element.visual.as_ref().and_then(|visual| visual.size);
    let (width, height) = size.map_or((DEFAULT_NODE_WIDTH, DEFAULT_NODE_HEIGHT), |s| (s.width, s.height));

    let mut node = Node::new(element.id.clone(), width, height);
    node.label = element.name.clone();
    node.node_type = element
        .element_type
        .clone()
        .or_else(|| parts.as_ref().map(|caps| caps[2].to_string()));
    node.domain = Some(
        element
            .properties
            .get("domain")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| layer_key.to_string()),
    );
    node.metadata.insert(
        "layer".to_string(),
        element.layer_id.clone().unwrap_or_else(|| layer_key.to_string()),
    );
    for key in METADATA_KEYS {
        if let Some(value) = element.properties.get(*key).and_then(scalar_text) {
            node.metadata.insert((*key).to_string(), value);
        }
    }
    if options.pin_positions
        && let Some(position) = element.visual.as_ref().and_then(|visual| visual.position)
    {
        node.fixed_position = Some((position.x, position.y));
    }
    node
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(text) => Some(text.clone()),
        Value::Number(number) => Some(number.to_string()),
        Value::Bool(flag) => Some(flag.to_string()),
        _ => None,
    }
}

/// True when `id` names a real element that the layer filter removed.
fn filtered_out(graph: &Graph, resolver: &IdResolver<'_>, id: &str) -> bool {
    resolver.known.contains(id) && !graph.nodes.contains_key(id)
}

/// Maps relationship endpoints onto element ids. Endpoints may use the full
/// `layer.type.name` id or only its trailing name.
struct IdResolver<'a> {
    known: BTreeSet<&'a str>,
    by_name: HashMap<&'a str, Option<&'a str>>,
}

impl<'a> IdResolver<'a> {
    fn new(elements: impl Iterator<Item = &'a ModelElement>) -> Self {
        let mut known = BTreeSet::new();
        let mut by_name: HashMap<&'a str, Option<&'a str>> = HashMap::new();
        for element in elements {
            let id = element.id.as_str();
            known.insert(id);
            if let Some(caps) = ELEMENT_ID_RE.captures(id)
                && let Some(name) = caps.get(3)
            {
                by_name
                    .entry(name.as_str())
                    .and_modify(|slot| *slot = None)
                    .or_insert(Some(id));
            }
        }
        Self { known, by_name }
    }

    fn resolve<'b>(&self, id: &'b str) -> &'b str
    where
        'a: 'b,
    {
        if self.known.contains(id) {
            return id;
        }
        let short = ELEMENT_ID_RE
            .captures(id)
            .and_then(|caps| caps.get(3))
            .map_or(id, |name| name.as_str());
        match self.by_name.get(short) {
            Some(Some(full)) => *full,
            _ => id,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChangesetDocument {
    #[serde(default)]
    pub metadata: ChangesetMetadata,
    pub changes: ChangeList,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChangesetMetadata {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
}

/// `changes` appears either as a bare list or wrapped in `{"changes": [...]}`.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum ChangeList {
    Wrapped { changes: Vec<Change> },
    Bare(Vec<Change>),
}

impl Default for ChangeList {
    fn default() -> Self {
        Self::Bare(Vec::new())
    }
}

impl ChangeList {
    pub fn items(&self) -> &[Change] {
        match self {
            Self::Wrapped { changes } | Self::Bare(changes) => changes,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Change {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default = "default_operation")]
    pub operation: String,
    #[serde(alias = "elementId")]
    pub element_id: String,
    #[serde(default, alias = "layerName", alias = "layer")]
    pub layer_name: Option<String>,
    #[serde(default, alias = "elementType")]
    pub element_type: Option<String>,
}

fn default_operation() -> String {
    "update".to_string()
}

pub fn parse_changeset(text: &str) -> Result<Graph, AdapterError> {
    let document: ChangesetDocument = serde_json::from_str(text)?;
    graph_from_changeset(&document)
}

/// A star graph: the changeset in the middle, one node per touched element,
/// one edge per change typed by its operation.
pub fn graph_from_changeset(document: &ChangesetDocument) -> Result<Graph, AdapterError> {
    let root_id = document.metadata.id.clone().unwrap_or_else(|| "changeset".to_string());
    let mut root = Node::new(root_id.clone(), DEFAULT_NODE_WIDTH, DEFAULT_NODE_HEIGHT).with_type("changeset");
    root.label = document.metadata.name.clone();
    if let Some(status) = &document.metadata.status {
        root.metadata.insert("status".to_string(), status.clone());
    }

    let changes = document.changes.items();
    let mut elements: BTreeMap<&str, Node> = BTreeMap::new();
    let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
    for change in changes {
        let parts = ELEMENT_ID_RE.captures(&change.element_id);
        let node = elements.entry(change.element_id.as_str()).or_insert_with(|| {
            let mut node = Node::new(change.element_id.clone(), DEFAULT_NODE_WIDTH, DEFAULT_NODE_HEIGHT);
            node.label = parts.as_ref().map(|caps| caps[3].to_string());
            node.node_type = change
                .element_type
                .clone()
                .or_else(|| parts.as_ref().map(|caps| caps[2].to_string()));
            node.domain = change
                .layer_name
                .clone()
                .or_else(|| parts.as_ref().map(|caps| caps[1].to_string()));
            node
        });
        node.metadata.insert("operation".to_string(), change.operation.clone());
        *counts.entry(change.element_id.as_str()).or_default() += 1;
    }

    let mut graph = Graph::new();
    graph.add_node(root)?;
    for (id, mut node) in elements {
        if let Some(count) = counts.get(id) {
            node.metadata.insert("changes".to_string(), count.to_string());
        }
        graph.add_node(node)?;
    }
    for (idx, change) in changes.iter().enumerate() {
        let id = change.id.clone().unwrap_or_else(|| format!("change-{idx}"));
        let edge = Edge::new(id, root_id.clone(), change.element_id.clone()).with_type(change.operation.clone());
        graph.add_edge(edge);
    }
    if changes.is_empty() {
        warn!(changeset = %root_id, "changeset has no changes");
    }
    Ok(graph)
}

/// Parses either document shape, telling them apart by their top-level keys.
pub fn parse_document(text: &str, options: &AdapterOptions) -> Result<Graph, AdapterError> {
    let value: Value = serde_json::from_str(text)?;
    if value.get("changes").is_some() && value.get("layers").is_none() {
        let document: ChangesetDocument = serde_json::from_value(value)?;
        graph_from_changeset(&document)
    } else {
        let document: ModelDocument = serde_json::from_value(value)?;
        graph_from_model(&document, options)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::GraphIssue;

    const MODEL: &str = r#"{
        "layers": {
            "Business": {
                "name": "Business",
                "elements": [
                    {
                        "id": "business.service.orders",
                        "type": "service",
                        "name": "Orders",
                        "layerId": "Business",
                        "properties": { "lifecycle": "active", "criticality": 3 },
                        "visual": { "position": { "x": 10, "y": 20 }, "size": { "width": 160, "height": 80 } }
                    },
                    {
                        "id": "business.process.fulfil",
                        "name": "Fulfil",
                        "properties": { "domain": "Logistics" }
                    }
                ],
                "relationships": [
                    { "sourceId": "business.service.orders", "targetId": "fulfil", "type": "triggers" }
                ]
            },
            "Technology": {
                "elements": [ { "id": "technology.node.db", "type": "node" } ],
                "relationships": []
            }
        },
        "references": [
            {
                "source": { "layerId": "Business", "elementId": "business.service.orders" },
                "target": { "layerId": "Technology", "elementId": "technology.node.db" },
                "type": "uses"
            }
        ]
    }"#;

    #[test]
    fn model_elements_become_nodes() {
        let graph = parse_model(MODEL, &AdapterOptions::default()).unwrap();
        assert_eq!(graph.nodes.len(), 3);
        let orders = &graph.nodes["business.service.orders"];
        assert_eq!((orders.width, orders.height), (160.0, 80.0));
        assert_eq!(orders.domain.as_deref(), Some("Business"));
        assert_eq!(orders.metadata["lifecycle"], "active");
        assert_eq!(orders.metadata["criticality"], "3");
        assert_eq!(orders.fixed_position, None);

        let fulfil = &graph.nodes["business.process.fulfil"];
        assert_eq!(fulfil.node_type.as_deref(), Some("process"));
        assert_eq!(fulfil.domain.as_deref(), Some("Logistics"));
        assert_eq!((fulfil.width, fulfil.height), (DEFAULT_NODE_WIDTH, DEFAULT_NODE_HEIGHT));
    }

    #[test]
    fn short_targets_resolve_and_references_cross_layers() {
        let graph = parse_model(MODEL, &AdapterOptions::default()).unwrap();
        assert_eq!(graph.edges.len(), 2);
        assert!(graph.validate().is_empty(), "{:?}", graph.validate());
        let triggers = graph.edges.iter().find(|e| e.edge_type.as_deref() == Some("triggers")).unwrap();
        assert_eq!(triggers.to, "business.process.fulfil");
        assert!(graph.edges.iter().any(|e| e.id.starts_with("ref:") && e.to == "technology.node.db"));
    }

    #[test]
    fn layer_filter_drops_hidden_endpoints() {
        let options = AdapterOptions {
            layers: Some(["Business".to_string()].into_iter().collect()),
            ..AdapterOptions::default()
        };
        let graph = parse_model(MODEL, &options).unwrap();
        assert_eq!(graph.nodes.len(), 2);
        assert_eq!(graph.edges.len(), 1);

        let unknown = AdapterOptions {
            layers: Some(["Security".to_string()].into_iter().collect()),
            ..AdapterOptions::default()
        };
        assert!(matches!(parse_model(MODEL, &unknown), Err(AdapterError::UnknownLayer(l)) if l == "Security"));
    }

    #[test]
    fn dangling_relationships_survive_for_validation() {
        let text = r#"{ "layers": { "A": {
            "elements": [ { "id": "a" } ],
            "relationships": [ { "sourceId": "a", "targetId": "ghost" } ]
        } } }"#;
        let graph = parse_model(text, &AdapterOptions::default()).unwrap();
        assert_eq!(graph.edges.len(), 1);
        assert!(matches!(&graph.validate()[0], GraphIssue::MissingTarget { node, .. } if node == "ghost"));
    }

    #[test]
    fn duplicate_elements_are_rejected() {
        let text = r#"{ "layers": { "A": { "elements": [ { "id": "a" }, { "id": "a" } ] } } }"#;
        assert!(matches!(
            parse_model(text, &AdapterOptions::default()),
            Err(AdapterError::Graph(GraphIssue::DuplicateNode(_)))
        ));
    }

    #[test]
    fn pinned_positions_are_opt_in() {
        let options = AdapterOptions {
            pin_positions: true,
            ..AdapterOptions::default()
        };
        let graph = parse_model(MODEL, &options).unwrap();
        assert_eq!(graph.nodes["business.service.orders"].fixed_position, Some((10.0, 20.0)));
    }

    #[test]
    fn changeset_forms_a_star() {
        let text = r#"{
            "metadata": { "id": "cs-7", "name": "Split billing", "status": "draft" },
            "changes": { "changes": [
                { "id": "c1", "operation": "add", "element_id": "application.service.billing" },
                { "id": "c2", "operation": "update", "elementId": "application.service.billing" },
                { "operation": "delete", "element_id": "legacy", "layer_name": "Technology", "element_type": "node" }
            ] }
        }"#;
        let graph = parse_document(text, &AdapterOptions::default()).unwrap();
        assert_eq!(graph.nodes.len(), 3);
        assert_eq!(graph.edges.len(), 3);
        assert!(graph.validate().is_empty());
        let billing = &graph.nodes["application.service.billing"];
        assert_eq!(billing.node_type.as_deref(), Some("service"));
        assert_eq!(billing.domain.as_deref(), Some("application"));
        assert_eq!(billing.metadata["operation"], "update");
        assert_eq!(billing.metadata["changes"], "2");
        assert_eq!(graph.nodes["cs-7"].node_type.as_deref(), Some("changeset"));
        assert_eq!(graph.nodes["legacy"].domain.as_deref(), Some("Technology"));
        assert!(graph.edges.iter().any(|e| e.id == "change-2" && e.edge_type.as_deref() == Some("delete")));
    }

    #[test]
    fn malformed_json_is_an_error() {
        assert!(matches!(parse_document("{ nope", &AdapterOptions::default()), Err(AdapterError::Json(_))));
    }
}
