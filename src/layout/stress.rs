//! Stress majorization: places nodes so Euclidean distances approximate
//! graph-theoretic distances, minimising weighted stress with the localized
//! SMACOF update.

use std::collections::{HashMap, VecDeque};
use std::f32::consts::TAU;

use tracing::debug;

use super::force::SimulationOutcome;
use super::params::ROUTING_STYLES;
use super::routing::RouteOptions;
use super::{
    LAYOUT_MARGIN, LayoutAlgorithm, LayoutContext, LayoutResult, ParamSpec, ResolvedParams, finish_layout,
    has_fixed_positions, initial_node_layouts, normalize_to_origin,
};
use crate::ir::{Direction, Graph};

const SCHEMA: &[ParamSpec] = &[
    ParamSpec::integer("iterations", 1, 5000, 200, "maximum majorization rounds"),
    ParamSpec::number("edge_length", 1.0, 2000.0, 150.0, "ideal distance between adjacent nodes"),
    ParamSpec::number("tolerance", 0.0, 1.0, 1e-4, "relative stress change that ends the run"),
    ParamSpec::choice("routing", ROUTING_STYLES, "straight", "edge routing style"),
];

#[derive(Debug, Default, Clone, Copy)]
pub struct StressLayout;

impl LayoutAlgorithm for StressLayout {
    fn name(&self) -> &'static str {
        "stress"
    }

    fn description(&self) -> &'static str {
        "stress majorization over shortest-path distances"
    }

    fn schema(&self) -> &'static [ParamSpec] {
        SCHEMA
    }

    fn calculate(&self, graph: &Graph, params: &ResolvedParams<'_>, ctx: &LayoutContext<'_>) -> LayoutResult {
        let edge_length = params.number("edge_length");
        let mut nodes = initial_node_layouts(graph);
        let ids: Vec<&str> = graph.nodes.keys().map(String::as_str).collect();
        let pinned: Vec<Option<(f32, f32)>> = graph
            .nodes
            .values()
            .map(|n| n.fixed_position.map(|(x, y)| (x + n.width / 2.0, y + n.height / 2.0)))
            .collect();

        // Pinned nodes fix the frame, so free centers are kept off the negative axes instead.
        let floors: Option<Vec<(f32, f32)>> = has_fixed_positions(graph).then(|| {
            graph
                .nodes
                .values()
                .map(|n| (n.width / 2.0, n.height / 2.0))
                .collect()
        });

        let distances = shortest_path_matrix(graph, &ids, edge_length);
        let mut positions = circle_positions(ids.len(), edge_length);
        if let Some(floors) = &floors {
            let lift_x = floors.iter().map(|f| f.0).fold(0.0, f32::max);
            let lift_y = floors.iter().map(|f| f.1).fold(0.0, f32::max);
            let radius = positions.iter().map(|p| p.0.abs().max(p.1.abs())).fold(0.0, f32::max);
            for pos in &mut positions {
                pos.0 += radius + lift_x;
                pos.1 += radius + lift_y;
            }
        }
        for (pos, pin) in positions.iter_mut().zip(&pinned) {
            if let Some(center) = pin {
                *pos = *center;
            }
        }
        let outcome = majorize(
            &mut positions,
            &distances,
            &pinned,
            floors.as_deref(),
            params.count("iterations"),
            params.number("tolerance"),
            ctx,
        );

        for (node, (x, y)) in nodes.values_mut().zip(&positions) {
            node.x = x - node.width / 2.0;
            node.y = y - node.height / 2.0;
        }
        if floors.is_none() {
            normalize_to_origin(&mut nodes, LAYOUT_MARGIN);
        }
        debug!(iterations = outcome.iterations, converged = outcome.converged, "stress layout finished");

        let route = RouteOptions::new(params.routing(), Direction::TopDown);
        let mut result = finish_layout(self.name(), graph, nodes, Vec::new(), &route);
        result.iterations = outcome.iterations;
        result.converged = outcome.converged;
        result.cancelled = outcome.cancelled;
        result
    }
}

/// All-pairs hop distances scaled by `edge_length`. Pairs in different
/// components are placed one edge beyond the longest finite distance.
fn shortest_path_matrix(graph: &Graph, ids: &[&str], edge_length: f32) -> Vec<Vec<f32>> {
    let n = ids.len();
    let index: HashMap<&str, usize> = ids.iter().enumerate().map(|(idx, id)| (*id, idx)).collect();
    let mut adjacency: Vec<Vec<usize>> = vec![Vec::new(); n];
    for edge in &graph.edges {
        let (Some(&a), Some(&b)) = (index.get(edge.from.as_str()), index.get(edge.to.as_str())) else {
            continue;
        };
        if a != b {
            adjacency[a].push(b);
            adjacency[b].push(a);
        }
    }

    let mut hops = vec![vec![usize::MAX; n]; n];
    let mut queue = VecDeque::new();
    for source in 0..n {
        hops[source][source] = 0;
        queue.push_back(source);
        while let Some(current) = queue.pop_front() {
            let next_hop = hops[source][current] + 1;
            for &next in &adjacency[current] {
                if hops[source][next] == usize::MAX {
                    hops[source][next] = next_hop;
                    queue.push_back(next);
                }
            }
        }
    }

    let longest = hops
        .iter()
        .flatten()
        .filter(|h| **h != usize::MAX)
        .copied()
        .max()
        .unwrap_or(0);
    hops.into_iter()
        .map(|row| {
            row.into_iter()
                .map(|h| {
                    let h = if h == usize::MAX { longest + 1 } else { h };
                    h as f32 * edge_length
                })
                .collect()
        })
        .collect()
}

/// Evenly spaced points on a circle whose circumference fits one edge per node.
fn circle_positions(count: usize, edge_length: f32) -> Vec<(f32, f32)> {
    let radius = (edge_length * count as f32 / TAU).max(edge_length);
    (0..count)
        .map(|idx| {
            let angle = TAU * idx as f32 / count.max(1) as f32;
            (radius * angle.cos(), radius * angle.sin())
        })
        .collect()
}

fn stress(positions: &[(f32, f32)], distances: &[Vec<f32>]) -> f64 {
    let mut total = 0.0f64;
    for i in 0..positions.len() {
        for j in i + 1..positions.len() {
            let target = distances[i][j] as f64;
            if target <= 0.0 {
                continue;
            }
            let dx = (positions[i].0 - positions[j].0) as f64;
            let dy = (positions[i].1 - positions[j].1) as f64;
            let actual = (dx * dx + dy * dy).sqrt();
            total += (actual - target).powi(2) / (target * target);
        }
    }
    total
}

/// Runs localized SMACOF rounds. With `floors`, each free center is projected
/// back to at least its floor after every update.
fn majorize(
    positions: &mut [(f32, f32)],
    distances: &[Vec<f32>],
    pinned: &[Option<(f32, f32)>],
    floors: Option<&[(f32, f32)]>,
    iterations: usize,
    tolerance: f32,
    ctx: &LayoutContext<'_>,
) -> SimulationOutcome {
    let n = positions.len();
    if n < 2 {
        return outcome(0, true, false);
    }
    let mut previous = stress(positions, distances);
    for round in 0..iterations.max(1) {
        if ctx.is_cancelled() {
            return outcome(round, false, true);
        }
        for i in 0..n {
            if pinned[i].is_some() {
                continue;
            }
            let (xi, yi) = positions[i];
            let mut sum_w = 0.0f32;
            let mut nx = 0.0f32;
            let mut ny = 0.0f32;
            for j in 0..n {
                if i == j {
                    continue;
                }
                let target = distances[i][j];
                if target <= 0.0 {
                    continue;
                }
                let w = 1.0 / (target * target);
                let (xj, yj) = positions[j];
                let dx = xi - xj;
                let dy = yi - yj;
                let actual = (dx * dx + dy * dy).sqrt();
                let (ux, uy) = if actual > 1e-6 {
                    (dx / actual, dy / actual)
                } else {
                    // Coincident points: separate along a deterministic direction.
                    let angle = TAU * (i as f32 + 1.0) / (n as f32 + 1.0);
                    (angle.cos(), angle.sin())
                };
                nx += w * (xj + target * ux);
                ny += w * (yj + target * uy);
                sum_w += w;
            }
            if sum_w > 0.0 {
                positions[i] = (nx / sum_w, ny / sum_w);
            }
            if let Some(&(floor_x, floor_y)) = floors.and_then(|f| f.get(i)) {
                positions[i].0 = positions[i].0.max(floor_x);
                positions[i].1 = positions[i].1.max(floor_y);
            }
        }
        let current = stress(positions, distances);
        let change = if previous > 0.0 {
            (previous - current).abs() / previous
        } else {
            0.0
        };
        previous = current;
        if change < tolerance as f64 {
            return outcome(round + 1, true, false);
        }
    }
    outcome(iterations.max(1), false, false)
}

fn outcome(iterations: usize, converged: bool, cancelled: bool) -> SimulationOutcome {
    SimulationOutcome {
        iterations,
        converged,
        cancelled,
    }
}
