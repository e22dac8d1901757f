//! Native layered (Sugiyama-style) placement: longest-path ranking,
//! median crossing reduction and barycentric coordinate assignment.

use std::cmp::{Ordering, Reverse};
use std::collections::{BTreeMap, BinaryHeap, HashMap, HashSet};

use super::params::{DIRECTIONS, ROUTING_STYLES};
use super::routing::RouteOptions;
use super::{
    LAYOUT_MARGIN, LayoutAlgorithm, LayoutContext, LayoutResult, NodeLayout, ParamSpec, ResolvedParams,
    finish_layout, initial_node_layouts, normalize_to_origin,
};
use crate::ir::{Direction, Graph};

/// Cross-axis size reserved for the virtual nodes long edges pass through.
const VIRTUAL_NODE_SIZE: f32 = 12.0;
/// Share of the current position kept when pulling a node toward its neighbors.
const POSITION_INERTIA: f32 = 0.15;

const SCHEMA: &[ParamSpec] = &[
    ParamSpec::choice("direction", DIRECTIONS, "TB", "flow direction of the ranks"),
    ParamSpec::number("node_spacing", 0.0, 1000.0, 50.0, "gap between nodes of one rank"),
    ParamSpec::number("rank_spacing", 0.0, 2000.0, 70.0, "gap between consecutive ranks"),
    ParamSpec::integer("order_passes", 1, 32, 4, "crossing reduction sweeps"),
    ParamSpec::choice("routing", ROUTING_STYLES, "straight", "edge routing style"),
];

#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct LayeredSettings {
    pub direction: Direction,
    pub node_spacing: f32,
    pub rank_spacing: f32,
    pub order_passes: usize,
}

#[derive(Debug, Default, Clone, Copy)]
pub struct LayeredLayout;

impl LayoutAlgorithm for LayeredLayout {
    fn name(&self) -> &'static str {
        "layered"
    }

    fn description(&self) -> &'static str {
        "native layered layout with median crossing reduction"
    }

    fn schema(&self) -> &'static [ParamSpec] {
        SCHEMA
    }

    fn calculate(&self, graph: &Graph, params: &ResolvedParams<'_>, _ctx: &LayoutContext<'_>) -> LayoutResult {
        let settings = LayeredSettings {
            direction: params.direction(),
            node_spacing: params.number("node_spacing"),
            rank_spacing: params.number("rank_spacing"),
            order_passes: params.count("order_passes"),
        };
        let nodes = layered_positions(graph, &settings);
        let route = RouteOptions::new(params.routing(), settings.direction);
        finish_layout(self.name(), graph, nodes, Vec::new(), &route)
    }
}

/// Positions every node of `graph` in ranks along `settings.direction`.
pub(crate) fn layered_positions(graph: &Graph, settings: &LayeredSettings) -> BTreeMap<String, NodeLayout> {
    let mut nodes = initial_node_layouts(graph);
    if nodes.is_empty() {
        return nodes;
    }
    let horizontal = settings.direction.is_horizontal();
    let node_ids: Vec<String> = graph.nodes.keys().cloned().collect();
    let node_order: HashMap<String, usize> = node_ids.iter().enumerate().map(|(idx, id)| (id.clone(), idx)).collect();
    let links: Vec<(String, String)> = graph
        .edges
        .iter()
        .filter(|edge| !edge.is_self_loop())
        .map(|edge| (edge.from.clone(), edge.to.clone()))
        .collect();

    let ranks = compute_ranks(&node_ids, &links, &node_order);
    let max_rank = ranks.values().copied().max().unwrap_or(0);
    let mut rank_nodes: Vec<Vec<String>> = vec![Vec::new(); max_rank + 1];
    for id in &node_ids {
        rank_nodes[ranks.get(id).copied().unwrap_or(0)].push(id.clone());
    }

    // Edges spanning several ranks get one virtual node per crossed rank.
    let mut expanded: Vec<(String, String)> = Vec::new();
    let mut virtual_ids: HashSet<String> = HashSet::new();
    for (idx, (from, to)) in links.iter().enumerate() {
        let from_rank = ranks.get(from).copied().unwrap_or(0);
        let to_rank = ranks.get(to).copied().unwrap_or(0);
        let (lo, hi, head, tail) = if from_rank <= to_rank {
            (from_rank, to_rank, from, to)
        } else {
            (to_rank, from_rank, to, from)
        };
        if hi <= lo + 1 {
            expanded.push((head.clone(), tail.clone()));
            continue;
        }
        let mut prev = head.clone();
        for rank in lo + 1..hi {
            let id = format!("\u{0}virtual:{idx}:{rank}");
            rank_nodes[rank].push(id.clone());
            virtual_ids.insert(id.clone());
            nodes.insert(
                id.clone(),
                NodeLayout {
                    id: id.clone(),
                    x: 0.0,
                    y: 0.0,
                    width: VIRTUAL_NODE_SIZE,
                    height: VIRTUAL_NODE_SIZE,
                    domain: None,
                    node_type: None,
                },
            );
            expanded.push((prev, id.clone()));
            prev = id;
        }
        expanded.push((prev, tail.clone()));
    }

    let mut order_map = node_order.clone();
    for bucket in &rank_nodes {
        for id in bucket {
            let next = order_map.len();
            order_map.entry(id.clone()).or_insert(next);
        }
    }
    order_rank_nodes(&mut rank_nodes, &expanded, &order_map, settings.order_passes);

    // Main axis: ranks stacked with rank_spacing between the thickest members.
    let mut main_cursor = 0.0;
    for bucket in &rank_nodes {
        let mut thickest: f32 = 0.0;
        for id in bucket {
            if let Some(node) = nodes.get_mut(id) {
                if horizontal {
                    node.x = main_cursor;
                    thickest = thickest.max(node.width);
                } else {
                    node.y = main_cursor;
                    thickest = thickest.max(node.height);
                }
            }
        }
        main_cursor += thickest + settings.rank_spacing;
    }

    // Cross axis: sequential packing, then median pulls toward neighbors.
    let mut cross_pos: HashMap<String, f32> = HashMap::new();
    for bucket in &rank_nodes {
        let mut cursor = 0.0;
        for id in bucket {
            if let Some(node) = nodes.get(id) {
                let size = if horizontal { node.height } else { node.width };
                cross_pos.insert(id.clone(), cursor + size / 2.0);
                cursor += size + settings.node_spacing;
            }
        }
    }

    let mut incoming: HashMap<String, Vec<String>> = HashMap::new();
    let mut outgoing: HashMap<String, Vec<String>> = HashMap::new();
    for (from, to) in &expanded {
        incoming.entry(to.clone()).or_default().push(from.clone());
        outgoing.entry(from.clone()).or_default().push(to.clone());
    }

    for _ in 0..settings.order_passes.max(1) {
        for bucket in &rank_nodes {
            place_rank(bucket, &incoming, &mut cross_pos, &nodes, horizontal, settings.node_spacing);
        }
        for bucket in rank_nodes.iter().rev() {
            place_rank(bucket, &outgoing, &mut cross_pos, &nodes, horizontal, settings.node_spacing);
        }
    }

    for (id, center) in &cross_pos {
        if let Some(node) = nodes.get_mut(id) {
            if horizontal {
                node.y = center - node.height / 2.0;
            } else {
                node.x = center - node.width / 2.0;
            }
        }
    }

    nodes.retain(|id, _| !virtual_ids.contains(id));
    flip_reversed_axis(&mut nodes, settings.direction);
    normalize_to_origin(&mut nodes, LAYOUT_MARGIN);
    nodes
}

/// Mirrors the main axis for BT and RL flows.
fn flip_reversed_axis(nodes: &mut BTreeMap<String, NodeLayout>, direction: Direction) {
    match direction {
        Direction::BottomTop => {
            let max = nodes.values().map(|n| n.bottom()).fold(0.0, f32::max);
            for node in nodes.values_mut() {
                node.y = max - node.bottom();
            }
        }
        Direction::RightLeft => {
            let max = nodes.values().map(|n| n.right()).fold(0.0, f32::max);
            for node in nodes.values_mut() {
                node.x = max - node.right();
            }
        }
        Direction::TopDown | Direction::LeftRight => {}
    }
}

/// Moves each node of one rank toward the median of its neighbors' centers
/// while keeping `spacing` between boxes and the rank's mean in place.
fn place_rank(
    bucket: &[String],
    neighbors: &HashMap<String, Vec<String>>,
    cross_pos: &mut HashMap<String, f32>,
    nodes: &BTreeMap<String, NodeLayout>,
    horizontal: bool,
    spacing: f32,
) {
    if bucket.is_empty() {
        return;
    }
    let mut entries: Vec<(&String, f32, f32, usize)> = Vec::with_capacity(bucket.len());
    for (idx, id) in bucket.iter().enumerate() {
        let Some(node) = nodes.get(id) else {
            continue;
        };
        let current = cross_pos.get(id).copied().unwrap_or(0.0);
        let mut centers: Vec<f32> = neighbors
            .get(id)
            .map(|list| list.iter().filter_map(|n| cross_pos.get(n).copied()).collect())
            .unwrap_or_default();
        let desired = if centers.is_empty() {
            current
        } else {
            centers.sort_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));
            let mid = centers.len() / 2;
            let median = if centers.len() % 2 == 1 {
                centers[mid]
            } else {
                (centers[mid - 1] + centers[mid]) * 0.5
            };
            median * (1.0 - POSITION_INERTIA) + current * POSITION_INERTIA
        };
        let half = if horizontal { node.height / 2.0 } else { node.width / 2.0 };
        entries.push((id, desired, half, idx));
    }
    if entries.is_empty() {
        return;
    }
    // Rank order was fixed by crossing reduction; only coordinates move.
    entries.sort_by_key(|entry| entry.3);
    let desired_mean = entries.iter().map(|e| e.1).sum::<f32>() / entries.len() as f32;

    let mut assigned: Vec<(&String, f32)> = Vec::with_capacity(entries.len());
    let mut prev: Option<(f32, f32)> = None;
    for (id, desired, half, _) in entries {
        let center = match prev {
            Some((prev_center, prev_half)) => desired.max(prev_center + prev_half + half + spacing),
            None => desired,
        };
        assigned.push((id, center));
        prev = Some((center, half));
    }
    let actual_mean = assigned.iter().map(|(_, c)| *c).sum::<f32>() / assigned.len() as f32;
    let delta = desired_mean - actual_mean;
    for (id, center) in assigned {
        cross_pos.insert(id.clone(), center + delta);
    }
}

/// Sweeps ranks down and up, sorting each by the median position of its
/// neighbors in the previous rank.
pub(crate) fn order_rank_nodes(
    rank_nodes: &mut [Vec<String>],
    edges: &[(String, String)],
    node_order: &HashMap<String, usize>,
    passes: usize,
) {
    if rank_nodes.len() <= 1 {
        return;
    }
    let mut incoming: HashMap<String, Vec<String>> = HashMap::new();
    let mut outgoing: HashMap<String, Vec<String>> = HashMap::new();
    for (from, to) in edges {
        outgoing.entry(from.clone()).or_default().push(to.clone());
        incoming.entry(to.clone()).or_default().push(from.clone());
    }

    let mut positions: HashMap<String, usize> = HashMap::new();
    let update_positions = |rank_nodes: &[Vec<String>], positions: &mut HashMap<String, usize>| {
        positions.clear();
        for bucket in rank_nodes {
            for (idx, id) in bucket.iter().enumerate() {
                positions.insert(id.clone(), idx);
            }
        }
    };
    update_positions(rank_nodes, &mut positions);

    let sort_bucket = |bucket: &mut Vec<String>,
                       neighbors: &HashMap<String, Vec<String>>,
                       positions: &HashMap<String, usize>| {
        let current: HashMap<String, usize> = bucket.iter().enumerate().map(|(idx, id)| (id.clone(), idx)).collect();
        bucket.sort_by(|a, b| {
            let a_score = median_position(a, neighbors, positions, &current);
            let b_score = median_position(b, neighbors, positions, &current);
            a_score
                .partial_cmp(&b_score)
                .unwrap_or(Ordering::Equal)
                .then_with(|| current.get(a).cmp(&current.get(b)))
                .then_with(|| {
                    node_order
                        .get(a)
                        .copied()
                        .unwrap_or(usize::MAX)
                        .cmp(&node_order.get(b).copied().unwrap_or(usize::MAX))
                })
        });
    };

    for _ in 0..passes.max(1) {
        for rank in 1..rank_nodes.len() {
            if rank_nodes[rank].len() <= 1 {
                continue;
            }
            sort_bucket(&mut rank_nodes[rank], &incoming, &positions);
            update_positions(rank_nodes, &mut positions);
        }
        for rank in (0..rank_nodes.len() - 1).rev() {
            if rank_nodes[rank].len() <= 1 {
                continue;
            }
            sort_bucket(&mut rank_nodes[rank], &outgoing, &positions);
            update_positions(rank_nodes, &mut positions);
        }
    }
}

fn median_position(
    node_id: &str,
    neighbors: &HashMap<String, Vec<String>>,
    positions: &HashMap<String, usize>,
    current: &HashMap<String, usize>,
) -> f32 {
    let fallback = current.get(node_id).copied().unwrap_or(0) as f32;
    let Some(list) = neighbors.get(node_id) else {
        return fallback;
    };
    let mut values: Vec<f32> = list.iter().filter_map(|n| positions.get(n)).map(|p| *p as f32).collect();
    if values.is_empty() {
        return fallback;
    }
    values.sort_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));
    let mid = values.len() / 2;
    if values.len() % 2 == 1 {
        values[mid]
    } else {
        (values[mid - 1] + values[mid]) * 0.5
    }
}

/// Longest-path ranks over a topological order. Cycles are broken at the
/// remaining node earliest in `node_order`; its incoming edges become back edges.
pub(crate) fn compute_ranks(
    node_ids: &[String],
    edges: &[(String, String)],
    node_order: &HashMap<String, usize>,
) -> HashMap<String, usize> {
    let set: HashSet<&str> = node_ids.iter().map(String::as_str).collect();
    let mut adj: HashMap<&str, Vec<&str>> = HashMap::new();
    let mut indeg: HashMap<&str, usize> = set.iter().map(|id| (*id, 0)).collect();
    for (from, to) in edges {
        if set.contains(from.as_str()) && set.contains(to.as_str()) {
            adj.entry(from.as_str()).or_default().push(to.as_str());
            *indeg.entry(to.as_str()).or_insert(0) += 1;
        }
    }
    let order_key = |id: &str| node_order.get(id).copied().unwrap_or(usize::MAX);

    let mut ready: BinaryHeap<Reverse<(usize, &str)>> = BinaryHeap::new();
    for id in &set {
        if indeg.get(id).copied().unwrap_or(0) == 0 {
            ready.push(Reverse((order_key(*id), *id)));
        }
    }

    let mut order: Vec<&str> = Vec::with_capacity(set.len());
    let mut processed: HashSet<&str> = HashSet::new();
    loop {
        while let Some(Reverse((_, id))) = ready.pop() {
            if !processed.insert(id) {
                continue;
            }
            order.push(id);
            for next in adj.get(id).into_iter().flatten() {
                if processed.contains(next) {
                    continue;
                }
                if let Some(deg) = indeg.get_mut(next) {
                    *deg = deg.saturating_sub(1);
                    if *deg == 0 {
                        ready.push(Reverse((order_key(*next), *next)));
                    }
                }
            }
        }
        if processed.len() >= set.len() {
            break;
        }
        let next_source = set
            .iter()
            .filter(|id| !processed.contains(*id))
            .min_by_key(|id| (order_key(**id), **id));
        match next_source {
            Some(id) => ready.push(Reverse((order_key(*id), *id))),
            None => break,
        }
    }

    let order_index: HashMap<&str, usize> = order.iter().enumerate().map(|(idx, id)| (*id, idx)).collect();
    let mut ranks: HashMap<String, usize> = HashMap::new();
    for id in &order {
        let rank = ranks.get(*id).copied().unwrap_or(0);
        ranks.entry((*id).to_string()).or_insert(rank);
        let from_idx = order_index.get(id).copied().unwrap_or(0);
        for next in adj.get(id).into_iter().flatten() {
            let to_idx = order_index.get(next).copied().unwrap_or(from_idx);
            if to_idx <= from_idx {
                continue;
            }
            let entry = ranks.entry((*next).to_string()).or_insert(0);
            *entry = (*entry).max(rank + 1);
        }
    }
    ranks
}
