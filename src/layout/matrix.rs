//! Domain matrix: one grid cell per domain, nodes arranged inside their cell.

use std::collections::BTreeMap;

use tracing::{debug, debug_span};

use super::force::{Body, DEFAULT_SEED, Simulation, SimulationConfig, SimulationOutcome, phyllotaxis};
use super::routing::RouteOptions;
use super::{
    GroupLayout, LAYOUT_MARGIN, LayoutAlgorithm, LayoutContext, LayoutResult, NodeLayout, ParamSpec,
    ResolvedParams, finish_layout, initial_node_layouts,
};
use crate::ir::Graph;

/// Cells with at most this many nodes use a fixed two-column grid.
const SMALL_CELL_LIMIT: usize = 4;
const SMALL_CELL_COLUMNS: usize = 2;
const CELL_CHARGE: f32 = -300.0;
const CELL_CENTER_STRENGTH: f32 = 0.05;
const CELL_CONVERGENCE: f32 = 0.01;
/// Inner area of a simulated cell relative to the padded area of its nodes.
const RELAX_ROOM: f32 = 2.0;
const SEPARATION_PASSES: usize = 200;

const SCHEMA: &[ParamSpec] = &[
    ParamSpec::number("cell_padding", 0.0, 1000.0, 40.0, "inset between a cell border and its nodes"),
    ParamSpec::number("cell_gap", 0.0, 2000.0, 80.0, "gap between neighbouring cells"),
    ParamSpec::number("node_spacing", 0.0, 1000.0, 30.0, "gap between nodes inside a cell"),
    ParamSpec::flag("simulate", true, "run a confined force simulation in crowded cells"),
    ParamSpec::integer("iterations", 1, 5000, 120, "simulation ticks per crowded cell"),
    ParamSpec::integer("seed", 0, i64::MAX, DEFAULT_SEED as i64, "jiggle seed"),
];

#[derive(Debug, Clone, Copy, PartialEq)]
struct MatrixSettings {
    cell_padding: f32,
    cell_gap: f32,
    node_spacing: f32,
    simulate: bool,
    iterations: usize,
    seed: u64,
}

#[derive(Debug, Default, Clone, Copy)]
pub struct MatrixLayout;

impl LayoutAlgorithm for MatrixLayout {
    fn name(&self) -> &'static str {
        "matrix"
    }

    fn description(&self) -> &'static str {
        "domain matrix with one grid cell per domain"
    }

    fn schema(&self) -> &'static [ParamSpec] {
        SCHEMA
    }

    fn calculate(&self, graph: &Graph, params: &ResolvedParams<'_>, ctx: &LayoutContext<'_>) -> LayoutResult {
        let settings = MatrixSettings {
            cell_padding: params.number("cell_padding"),
            cell_gap: params.number("cell_gap"),
            node_spacing: params.number("node_spacing"),
            simulate: params.flag("simulate"),
            iterations: params.count("iterations"),
            seed: params.integer("seed").max(0) as u64,
        };
        let _span = debug_span!("matrix_layout", nodes = graph.nodes.len()).entered();
        let mut nodes = initial_node_layouts(graph);

        // BTreeMap keys give alphabetical domains; graph order gives id order within each.
        let mut domains: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
        for node in graph.nodes.values() {
            domains.entry(node.domain_or_default()).or_default().push(node.id.as_str());
        }

        let side = grid_side(domains.len());
        let (cell_w, cell_h) = cell_size(&domains, &nodes, &settings);
        let mut groups = Vec::with_capacity(domains.len());
        let mut simulated = 0usize;
        let mut ticks = 0usize;
        let mut converged = true;
        let mut cancelled = false;

        for (index, (domain, members)) in domains.iter().enumerate() {
            let row = index / side;
            let col = index % side;
            let cell = GroupLayout {
                id: (*domain).to_string(),
                x: LAYOUT_MARGIN + col as f32 * (cell_w + settings.cell_gap),
                y: LAYOUT_MARGIN + row as f32 * (cell_h + settings.cell_gap),
                width: cell_w,
                height: cell_h,
                row,
                col,
                nodes: members.iter().map(|id| (*id).to_string()).collect(),
            };

            place_in_columns(&mut nodes, members, &cell, columns_for(members.len()), &settings);
            if members.len() > SMALL_CELL_LIMIT && settings.simulate {
                let packed = snapshot(&nodes, members);
                let outcome = relax_cell(graph, &mut nodes, members, &cell, &settings, ctx);
                simulated += 1;
                ticks += outcome.iterations;
                converged &= outcome.converged;
                cancelled |= outcome.cancelled;
                if has_overlaps(&nodes, members) {
                    debug!(domain = *domain, "relaxed cell overlaps, keeping packed grid");
                    restore(&mut nodes, packed);
                }
            }
            groups.push(cell);
        }
        debug!(domains = domains.len(), side, simulated, ticks, "matrix cells placed");

        let mut result = finish_layout(self.name(), graph, nodes, groups, &RouteOptions::default());
        result.iterations = ticks;
        result.converged = converged;
        result.cancelled = cancelled;
        result
    }
}

/// Side of the smallest square grid holding `count` cells.
fn grid_side(count: usize) -> usize {
    ((count as f64).sqrt().ceil() as usize).max(1)
}

fn columns_for(count: usize) -> usize {
    if count <= SMALL_CELL_LIMIT {
        SMALL_CELL_COLUMNS
    } else {
        (count as f32).sqrt().ceil() as usize
    }
}

/// Uniform cell size: big enough for the most demanding domain's packed grid,
/// grown for crowded domains that will be relaxed.
fn cell_size(
    domains: &BTreeMap<&str, Vec<&str>>,
    nodes: &BTreeMap<String, NodeLayout>,
    settings: &MatrixSettings,
) -> (f32, f32) {
    let mut width: f32 = 0.0;
    let mut height: f32 = 0.0;
    for members in domains.values() {
        let (max_w, max_h) = max_node_size(nodes, members);
        let columns = columns_for(members.len()).min(members.len()).max(1);
        let rows = members.len().div_ceil(columns);
        let mut inner_w = columns as f32 * max_w + (columns.saturating_sub(1)) as f32 * settings.node_spacing;
        let mut inner_h = rows as f32 * max_h + (rows.saturating_sub(1)) as f32 * settings.node_spacing;
        if settings.simulate && members.len() > SMALL_CELL_LIMIT && inner_w > 0.0 && inner_h > 0.0 {
            let padded: f32 = members
                .iter()
                .filter_map(|id| nodes.get(*id))
                .map(|n| (n.width + settings.node_spacing) * (n.height + settings.node_spacing))
                .sum();
            let grow = (RELAX_ROOM * padded / (inner_w * inner_h)).sqrt().max(1.0);
            inner_w *= grow;
            inner_h *= grow;
        }
        width = width.max(inner_w);
        height = height.max(inner_h);
    }
    (width + 2.0 * settings.cell_padding, height + 2.0 * settings.cell_padding)
}

fn max_node_size(nodes: &BTreeMap<String, NodeLayout>, members: &[&str]) -> (f32, f32) {
    members
        .iter()
        .filter_map(|id| nodes.get(*id))
        .fold((0.0f32, 0.0f32), |(w, h), n| (w.max(n.width), h.max(n.height)))
}

/// Row-major packing into `columns` slots sized by the largest member.
fn place_in_columns(
    nodes: &mut BTreeMap<String, NodeLayout>,
    members: &[&str],
    cell: &GroupLayout,
    columns: usize,
    settings: &MatrixSettings,
) {
    let (slot_w, slot_h) = max_node_size(nodes, members);
    let columns = columns.max(1);
    for (idx, id) in members.iter().enumerate() {
        let Some(node) = nodes.get_mut(*id) else {
            continue;
        };
        let col = idx % columns;
        let row = idx / columns;
        node.x = cell.x + settings.cell_padding + col as f32 * (slot_w + settings.node_spacing);
        node.y = cell.y + settings.cell_padding + row as f32 * (slot_h + settings.node_spacing);
    }
}

fn snapshot(nodes: &BTreeMap<String, NodeLayout>, members: &[&str]) -> Vec<(String, f32, f32)> {
    members
        .iter()
        .filter_map(|id| nodes.get(*id))
        .map(|node| (node.id.clone(), node.x, node.y))
        .collect()
}

fn restore(nodes: &mut BTreeMap<String, NodeLayout>, positions: Vec<(String, f32, f32)>) {
    for (id, x, y) in positions {
        if let Some(node) = nodes.get_mut(&id) {
            node.x = x;
            node.y = y;
        }
    }
}

fn has_overlaps(nodes: &BTreeMap<String, NodeLayout>, members: &[&str]) -> bool {
    let boxes: Vec<&NodeLayout> = members.iter().filter_map(|id| nodes.get(*id)).collect();
    boxes
        .iter()
        .enumerate()
        .any(|(idx, a)| boxes[idx + 1..].iter().any(|b| a.overlaps(b)))
}

/// Force relaxation of one crowded cell, starting from the packed grid and
/// clamped to the padded cell rectangle. Boxes are separated once the run ends.
fn relax_cell(
    graph: &Graph,
    nodes: &mut BTreeMap<String, NodeLayout>,
    members: &[&str],
    cell: &GroupLayout,
    settings: &MatrixSettings,
    ctx: &LayoutContext<'_>,
) -> SimulationOutcome {
    let (max_w, max_h) = max_node_size(nodes, members);
    let index: BTreeMap<&str, usize> = members.iter().enumerate().map(|(idx, id)| (*id, idx)).collect();
    let center = (cell.x + cell.width / 2.0, cell.y + cell.height / 2.0);
    let bodies: Vec<Body> = members
        .iter()
        .enumerate()
        .map(|(idx, id)| match nodes.get(*id) {
            Some(node) => Body::new(node.center(), node.width, node.height, settings.node_spacing / 2.0),
            None => Body::new(phyllotaxis(idx, center), max_w, max_h, 0.0),
        })
        .collect();
    let links = graph
        .edges
        .iter()
        .filter_map(|edge| Some((*index.get(edge.from.as_str())?, *index.get(edge.to.as_str())?)))
        .collect();
    let diagonal = (cell.width * cell.width + cell.height * cell.height).sqrt();
    let config = SimulationConfig {
        iterations: settings.iterations,
        link_distance: max_w.max(max_h) + settings.node_spacing,
        charge: CELL_CHARGE,
        collision_padding: settings.node_spacing / 2.0,
        center_strength: CELL_CENTER_STRENGTH,
        distance_max: diagonal.max(1.0),
        convergence: CELL_CONVERGENCE,
        seed: settings.seed,
    };
    let bounds = (
        cell.x + settings.cell_padding,
        cell.y + settings.cell_padding,
        cell.x + cell.width - settings.cell_padding,
        cell.y + cell.height - settings.cell_padding,
    );
    let mut simulation = Simulation::new(config, bodies, links, center)
        .box_collision()
        .confine(bounds);
    let outcome = simulation.run(ctx);
    if !simulation.separate_boxes(SEPARATION_PASSES) {
        debug!(nodes = members.len(), "cell boxes still touch after separation");
    }
    for (id, body) in members.iter().zip(simulation.bodies()) {
        if let Some(node) = nodes.get_mut(*id) {
            node.x = body.x - node.width / 2.0;
            node.y = body.y - node.height / 2.0;
        }
    }
    outcome
}
