//! Edge bundling: once a layout has more edges than nodes can carry
//! legibly, edges joining the same pair of node classes collapse into one.

use std::collections::BTreeMap;

use serde::Serialize;
use tracing::debug;

use crate::layout::{EdgeBundle, EdgeLayout, LayoutResult, NodeLayout};

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BundlingConfig {
    pub enabled: bool,
    /// Bundling never kicks in at or below this many edges.
    pub min_threshold: usize,
    /// Edges allowed per node before bundling.
    pub per_node: f32,
}

impl Default for BundlingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            min_threshold: 20,
            per_node: 1.5,
        }
    }
}

/// Edge count above which bundling applies: `max(min_threshold, ceil(nodes * per_node))`.
pub fn bundle_threshold(node_count: usize, config: &BundlingConfig) -> usize {
    let scaled = (node_count as f32 * config.per_node.max(0.0)).ceil() as usize;
    scaled.max(config.min_threshold)
}

/// Class used to group an endpoint: its type, else its domain, else `node`.
fn node_class(node: Option<&NodeLayout>) -> String {
    node.and_then(|n| n.node_type.clone().or_else(|| n.domain.clone()))
        .unwrap_or_else(|| "node".to_string())
}

/// Replaces edges that share a (source class, target class) pair with one
/// bundled edge. Returns how many bundles were created.
pub fn bundle_edges(result: &mut LayoutResult, config: &BundlingConfig) -> usize {
    if !config.enabled {
        return 0;
    }
    let threshold = bundle_threshold(result.nodes.len(), config);
    if result.edges.len() <= threshold {
        return 0;
    }

    let mut groups: BTreeMap<(String, String), Vec<usize>> = BTreeMap::new();
    for (idx, edge) in result.edges.iter().enumerate() {
        let key = (node_class(result.nodes.get(&edge.from)), node_class(result.nodes.get(&edge.to)));
        groups.entry(key).or_default().push(idx);
    }

    // Slot of the first member keeps the bundle; other members are dropped.
    let mut replacement: BTreeMap<usize, EdgeLayout> = BTreeMap::new();
    let mut absorbed = vec![false; result.edges.len()];
    for ((source_class, target_class), members) in groups {
        if members.len() < 2 {
            continue;
        }
        let first = members[0];
        let originals: Vec<EdgeLayout> = members.iter().map(|&idx| result.edges[idx].clone()).collect();
        let representative = &result.edges[first];
        let bundled = EdgeLayout {
            id: format!("bundle:{source_class}->{target_class}"),
            from: representative.from.clone(),
            to: representative.to.clone(),
            points: representative.points.clone(),
            label: Some(format!("{} relationships", members.len())),
            edge_type: representative.edge_type.clone(),
            cross_domain: originals.iter().any(|e| e.cross_domain),
            bundle: Some(EdgeBundle {
                source_class,
                target_class,
                members: originals,
                original_positions: members.clone(),
            }),
        };
        for &idx in &members {
            absorbed[idx] = true;
        }
        replacement.insert(first, bundled);
    }

    let bundles = replacement.len();
    if bundles == 0 {
        return 0;
    }
    let before = result.edges.len();
    let edges = std::mem::take(&mut result.edges);
    result.edges = edges
        .into_iter()
        .enumerate()
        .filter_map(|(idx, edge)| match replacement.remove(&idx) {
            Some(bundle) => Some(bundle),
            None if absorbed[idx] => None,
            None => Some(edge),
        })
        .collect();
    result.refresh_bounds();
    debug!(threshold, before, after = result.edges.len(), bundles, "edges bundled");
    bundles
}

/// Restores the exact original edge list, order included. Bundled members
/// return to their recorded slots; plain edges fill the rest in sequence.
pub fn unbundle(edges: &[EdgeLayout]) -> Vec<EdgeLayout> {
    let total: usize = edges.iter().map(|e| e.bundle.as_ref().map_or(1, |b| b.members.len())).sum();
    let mut slots: Vec<Option<EdgeLayout>> = vec![None; total];
    let mut plain: Vec<&EdgeLayout> = Vec::new();
    for edge in edges {
        match &edge.bundle {
            Some(bundle) => {
                for (member, &pos) in bundle.members.iter().zip(&bundle.original_positions) {
                    if let Some(slot) = slots.get_mut(pos).filter(|slot| slot.is_none()) {
                        *slot = Some(member.clone());
                    } else {
                        plain.push(member);
                    }
                }
            }
            None => plain.push(edge),
        }
    }
    let mut plain = plain.into_iter();
    let mut out: Vec<EdgeLayout> = slots
        .into_iter()
        .filter_map(|slot| slot.or_else(|| plain.next().cloned()))
        .collect();
    out.extend(plain.cloned());
    out
}

/// Ids of the original edges an edge stands for.
pub fn member_ids(edge: &EdgeLayout) -> Vec<&str> {
    match &edge.bundle {
        Some(bundle) => bundle.members.iter().map(|e| e.id.as_str()).collect(),
        None => vec![edge.id.as_str()],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(id: &str, node_type: Option<&str>, domain: Option<&str>) -> NodeLayout {
        NodeLayout {
            id: id.to_string(),
            x: 0.0,
            y: 0.0,
            width: 10.0,
            height: 10.0,
            domain: domain.map(str::to_string),
            node_type: node_type.map(str::to_string),
        }
    }

    fn edge(id: &str, from: &str, to: &str) -> EdgeLayout {
        EdgeLayout {
            id: id.to_string(),
            from: from.to_string(),
            to: to.to_string(),
            points: vec![(0.0, 0.0), (1.0, 1.0)],
            label: Some(id.to_string()),
            edge_type: None,
            cross_domain: false,
            bundle: None,
        }
    }

    /// Two services, two databases and one untyped node wired with `count` edges.
    fn dense(count: usize) -> LayoutResult {
        let nodes: BTreeMap<String, NodeLayout> = [
            node("s1", Some("service"), None),
            node("s2", Some("service"), None),
            node("d1", Some("database"), None),
            node("d2", Some("database"), None),
            node("misc", None, Some("Ops")),
        ]
        .into_iter()
        .map(|n| (n.id.clone(), n))
        .collect();
        let mut edges: Vec<EdgeLayout> = (0..count)
            .map(|i| edge(&format!("e{i}"), if i % 2 == 0 { "s1" } else { "s2" }, if i % 3 == 0 { "d1" } else { "d2" }))
            .collect();
        edges.push(edge("lonely", "misc", "s1"));
        LayoutResult::new("test", nodes, edges, Vec::new())
    }

    #[test]
    fn threshold_scales_with_node_count() {
        let config = BundlingConfig::default();
        assert_eq!(bundle_threshold(0, &config), 20);
        assert_eq!(bundle_threshold(10, &config), 20);
        assert_eq!(bundle_threshold(15, &config), 23);
    }

    #[test]
    fn sparse_layouts_are_untouched() {
        let mut result = dense(5);
        assert_eq!(bundle_edges(&mut result, &BundlingConfig::default()), 0);
        assert_eq!(result.edges.len(), 6);
    }

    #[test]
    fn dense_layouts_bundle_by_class_pair() {
        let mut result = dense(24);
        let original = result.edges.clone();
        let bundles = bundle_edges(&mut result, &BundlingConfig::default());
        assert_eq!(bundles, 1);
        assert_eq!(result.edges.len(), 2);
        let bundle = result.edges.iter().find(|e| e.is_bundled()).unwrap();
        assert_eq!(bundle.label.as_deref(), Some("24 relationships"));
        assert_eq!(member_ids(bundle).len(), 24);
        let singleton = result.edges.iter().find(|e| !e.is_bundled()).unwrap();
        assert_eq!(singleton.id, "lonely");
        assert_eq!(member_ids(singleton), ["lonely"]);

        assert_eq!(unbundle(&result.edges), original);
    }

    #[test]
    fn bounds_follow_the_bundled_geometry() {
        let mut result = dense(24);
        // A detour on an absorbed member stretches the unbundled bounds.
        result.edges[1].points.push((900.0, 700.0));
        result.refresh_bounds();
        assert!(result.bounds.width > 800.0);

        bundle_edges(&mut result, &BundlingConfig::default());
        assert!(result.bounds.width < 100.0, "{:?}", result.bounds);
        assert!(result.bounds.height < 100.0, "{:?}", result.bounds);
    }

    #[test]
    fn disabled_config_skips_bundling() {
        let mut result = dense(40);
        let config = BundlingConfig {
            enabled: false,
            ..BundlingConfig::default()
        };
        assert_eq!(bundle_edges(&mut result, &config), 0);
        assert_eq!(result.edges.len(), 41);
    }
}
