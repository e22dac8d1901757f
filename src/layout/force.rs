//! Force-directed layout: a velocity-Verlet simulation cooled by an alpha
//! schedule, in the style of d3-force.
//!
//! Forces per tick: link springs, many-body charge pruned through a uniform
//! grid, collision between node circles, and a weak pull to the center.

use std::collections::{BTreeMap, HashMap};
use std::f32::consts::PI;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rustc_hash::FxHashMap;
use tracing::{debug, debug_span};

use super::params::ROUTING_STYLES;
use super::routing::RouteOptions;
use super::{
    LAYOUT_MARGIN, LayoutAlgorithm, LayoutContext, LayoutResult, NodeLayout, ParamSpec, ResolvedParams,
    finish_layout, has_fixed_positions, initial_node_layouts, normalize_to_origin,
};
use crate::ir::{Direction, Graph};

/// Default seed for every seeded algorithm.
pub const DEFAULT_SEED: u64 = 42;

const ALPHA_MIN: f32 = 0.001;
/// Fraction of velocity kept between ticks.
const VELOCITY_RETAIN: f32 = 0.6;
const INITIAL_RADIUS: f32 = 10.0;
/// Ticks run before the kinetic-energy stop is consulted.
const WARMUP_TICKS: usize = 30;
const MIN_DISTANCE_SQ: f32 = 1.0;

const SCHEMA: &[ParamSpec] = &[
    ParamSpec::integer("iterations", 1, 5000, 300, "maximum simulation ticks"),
    ParamSpec::number("link_distance", 1.0, 2000.0, 120.0, "rest length of edge springs"),
    ParamSpec::number("charge", -10000.0, 0.0, -300.0, "many-body strength, negative repels"),
    ParamSpec::number("collision_padding", 0.0, 500.0, 8.0, "extra radius around each node"),
    ParamSpec::number("center_strength", 0.0, 1.0, 0.05, "pull toward the layout center"),
    ParamSpec::number("distance_max", 1.0, 100000.0, 900.0, "charge cut-off distance"),
    ParamSpec::number("convergence", 0.0, 100.0, 0.01, "kinetic energy per node that ends the run"),
    ParamSpec::integer("seed", 0, i64::MAX, DEFAULT_SEED as i64, "jiggle seed"),
    ParamSpec::choice("routing", ROUTING_STYLES, "straight", "edge routing style"),
];

#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct SimulationConfig {
    pub iterations: usize,
    pub link_distance: f32,
    pub charge: f32,
    pub collision_padding: f32,
    pub center_strength: f32,
    pub distance_max: f32,
    pub convergence: f32,
    pub seed: u64,
}

impl SimulationConfig {
    fn from_params(params: &ResolvedParams<'_>) -> Self {
        Self {
            iterations: params.count("iterations"),
            link_distance: params.number("link_distance"),
            charge: params.number("charge"),
            collision_padding: params.number("collision_padding"),
            center_strength: params.number("center_strength"),
            distance_max: params.number("distance_max"),
            convergence: params.number("convergence"),
            seed: params.integer("seed").max(0) as u64,
        }
    }
}

/// One simulated node; `x`/`y` is its center.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct Body {
    pub x: f32,
    pub y: f32,
    vx: f32,
    vy: f32,
    half_w: f32,
    half_h: f32,
    padding: f32,
    radius: f32,
    pinned: bool,
}

impl Body {
    pub(crate) fn new(center: (f32, f32), width: f32, height: f32, padding: f32) -> Self {
        let half_w = width / 2.0;
        let half_h = height / 2.0;
        Self {
            x: center.0,
            y: center.1,
            vx: 0.0,
            vy: 0.0,
            half_w,
            half_h,
            padding,
            radius: (half_w * half_w + half_h * half_h).sqrt() + padding,
            pinned: false,
        }
    }

    pub(crate) fn pinned(mut self) -> Self {
        self.pinned = true;
        self
    }

    /// Overlap of the padded boxes as the push that moves `self` clear of
    /// `other` along the shallower axis.
    fn box_penetration(&self, other: &Body) -> Option<(f32, f32)> {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        let over_x = self.half_w + other.half_w + self.padding + other.padding - dx.abs();
        let over_y = self.half_h + other.half_h + self.padding + other.padding - dy.abs();
        if over_x <= 0.0 || over_y <= 0.0 {
            return None;
        }
        let sign = |d: f32| if d < 0.0 { -1.0 } else { 1.0 };
        if over_x < over_y {
            Some((over_x * sign(dx), 0.0))
        } else {
            Some((0.0, over_y * sign(dy)))
        }
    }

    fn extent(&self) -> f32 {
        2.0 * (self.half_w.max(self.half_h) + self.padding)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct SimulationOutcome {
    pub iterations: usize,
    pub converged: bool,
    pub cancelled: bool,
}

pub(crate) struct Simulation {
    config: SimulationConfig,
    bodies: Vec<Body>,
    links: Vec<(usize, usize)>,
    link_strength: Vec<f32>,
    center: (f32, f32),
    bounds: Option<(f32, f32, f32, f32)>,
    boxes: bool,
    rng: StdRng,
}

impl Simulation {
    pub(crate) fn new(config: SimulationConfig, bodies: Vec<Body>, links: Vec<(usize, usize)>, center: (f32, f32)) -> Self {
        let mut degree = vec![0usize; bodies.len()];
        let links: Vec<(usize, usize)> = links
            .into_iter()
            .filter(|(a, b)| a != b && *a < bodies.len() && *b < bodies.len())
            .collect();
        for &(a, b) in &links {
            degree[a] += 1;
            degree[b] += 1;
        }
        let link_strength = links
            .iter()
            .map(|&(a, b)| 1.0 / degree[a].min(degree[b]).max(1) as f32)
            .collect();
        Self {
            rng: StdRng::seed_from_u64(config.seed),
            config,
            bodies,
            links,
            link_strength,
            center,
            bounds: None,
            boxes: false,
        }
    }

    /// Collides padded rectangles instead of circles.
    pub(crate) fn box_collision(mut self) -> Self {
        self.boxes = true;
        self
    }

    /// Keeps every body's box inside `(min_x, min_y, max_x, max_y)`.
    pub(crate) fn confine(mut self, bounds: (f32, f32, f32, f32)) -> Self {
        self.bounds = Some(bounds);
        self.clamp_to_bounds();
        self
    }

    pub(crate) fn bodies(&self) -> &[Body] {
        &self.bodies
    }

    pub(crate) fn run(&mut self, ctx: &LayoutContext<'_>) -> SimulationOutcome {
        let ticks = self.config.iterations.max(1);
        let alpha_decay = 1.0 - ALPHA_MIN.powf(1.0 / ticks as f32);
        let mut alpha = 1.0f32;
        let mut ran = 0;
        let free = self.bodies.iter().filter(|b| !b.pinned).count().max(1) as f32;
        for tick in 0..ticks {
            if ctx.is_cancelled() {
                debug!(tick, "simulation cancelled");
                return SimulationOutcome {
                    iterations: ran,
                    converged: false,
                    cancelled: true,
                };
            }
            alpha += (0.0 - alpha) * alpha_decay;
            let energy = self.tick(alpha);
            ran += 1;
            if tick + 1 >= WARMUP_TICKS && energy / free < self.config.convergence {
                return SimulationOutcome {
                    iterations: ran,
                    converged: true,
                    cancelled: false,
                };
            }
        }
        SimulationOutcome {
            iterations: ran,
            converged: false,
            cancelled: false,
        }
    }

    /// Applies every force once and moves the bodies. Returns total kinetic energy.
    fn tick(&mut self, alpha: f32) -> f32 {
        self.apply_links(alpha);
        self.apply_charge(alpha);
        if self.boxes {
            self.apply_box_collision();
        } else {
            self.apply_collision();
        }
        self.apply_center(alpha);

        let mut energy = 0.0;
        for body in &mut self.bodies {
            if body.pinned {
                body.vx = 0.0;
                body.vy = 0.0;
                continue;
            }
            body.vx *= VELOCITY_RETAIN;
            body.vy *= VELOCITY_RETAIN;
            body.x += body.vx;
            body.y += body.vy;
            energy += body.vx * body.vx + body.vy * body.vy;
        }
        self.clamp_to_bounds();
        energy
    }

    fn apply_links(&mut self, alpha: f32) {
        for (idx, &(a, b)) in self.links.iter().enumerate() {
            let source = self.bodies[a];
            let target = self.bodies[b];
            let mut dx = target.x + target.vx - source.x - source.vx;
            let mut dy = target.y + target.vy - source.y - source.vy;
            if dx == 0.0 {
                dx = jiggle(&mut self.rng);
            }
            if dy == 0.0 {
                dy = jiggle(&mut self.rng);
            }
            let len = (dx * dx + dy * dy).sqrt();
            let pull = (len - self.config.link_distance) / len * alpha * self.link_strength[idx];
            dx *= pull;
            dy *= pull;
            let (target_share, source_share) = match (source.pinned, target.pinned) {
                (true, false) => (1.0, 0.0),
                (false, true) => (0.0, 1.0),
                _ => (0.5, 0.5),
            };
            self.bodies[b].vx -= dx * target_share;
            self.bodies[b].vy -= dy * target_share;
            self.bodies[a].vx += dx * source_share;
            self.bodies[a].vy += dy * source_share;
        }
    }

    fn apply_charge(&mut self, alpha: f32) {
        if self.config.charge == 0.0 || self.bodies.len() < 2 {
            return;
        }
        let cutoff = self.config.distance_max.max(1.0);
        let cutoff_sq = cutoff * cutoff;
        let grid = SpatialGrid::build(&self.bodies, cutoff);
        let strength = self.config.charge * alpha;
        for i in 0..self.bodies.len() {
            if self.bodies[i].pinned {
                continue;
            }
            let (x, y) = (self.bodies[i].x, self.bodies[i].y);
            let mut fx = 0.0;
            let mut fy = 0.0;
            for j in grid.neighbors(x, y) {
                if j == i {
                    continue;
                }
                let mut dx = self.bodies[j].x - x;
                let mut dy = self.bodies[j].y - y;
                let mut dist_sq = dx * dx + dy * dy;
                if dist_sq >= cutoff_sq {
                    continue;
                }
                if dx == 0.0 {
                    dx = jiggle(&mut self.rng);
                    dist_sq += dx * dx;
                }
                if dy == 0.0 {
                    dy = jiggle(&mut self.rng);
                    dist_sq += dy * dy;
                }
                let dist_sq = dist_sq.max(MIN_DISTANCE_SQ);
                fx += dx * strength / dist_sq;
                fy += dy * strength / dist_sq;
            }
            self.bodies[i].vx += fx;
            self.bodies[i].vy += fy;
        }
    }

    fn apply_collision(&mut self) {
        let max_radius = self.bodies.iter().map(|b| b.radius).fold(0.0, f32::max);
        if max_radius <= 0.0 || self.bodies.len() < 2 {
            return;
        }
        let grid = SpatialGrid::build(&self.bodies, max_radius * 2.0);
        for i in 0..self.bodies.len() {
            let node = self.bodies[i];
            let xi = node.x + node.vx;
            let yi = node.y + node.vy;
            for j in grid.neighbors(node.x, node.y) {
                if j <= i {
                    continue;
                }
                let other = self.bodies[j];
                let reach = node.radius + other.radius;
                let mut dx = xi - other.x - other.vx;
                let mut dy = yi - other.y - other.vy;
                let mut len_sq = dx * dx + dy * dy;
                if len_sq >= reach * reach {
                    continue;
                }
                if dx == 0.0 {
                    dx = jiggle(&mut self.rng);
                    len_sq += dx * dx;
                }
                if dy == 0.0 {
                    dy = jiggle(&mut self.rng);
                    len_sq += dy * dy;
                }
                let len = len_sq.sqrt();
                let push = (reach - len) / len;
                dx *= push;
                dy *= push;
                let ri = node.radius * node.radius;
                let rj = other.radius * other.radius;
                let (share_i, share_j) = match (node.pinned, other.pinned) {
                    (true, true) => (0.0, 0.0),
                    (true, false) => (0.0, 1.0),
                    (false, true) => (1.0, 0.0),
                    (false, false) => (rj / (ri + rj), ri / (ri + rj)),
                };
                self.bodies[i].vx += dx * share_i;
                self.bodies[i].vy += dy * share_i;
                self.bodies[j].vx -= dx * share_j;
                self.bodies[j].vy -= dy * share_j;
            }
        }
    }

    fn apply_box_collision(&mut self) {
        let reach = self.bodies.iter().map(Body::extent).fold(0.0, f32::max);
        if reach <= 0.0 || self.bodies.len() < 2 {
            return;
        }
        let grid = SpatialGrid::build(&self.bodies, reach);
        for i in 0..self.bodies.len() {
            let node = self.bodies[i];
            let ahead = Body {
                x: node.x + node.vx,
                y: node.y + node.vy,
                ..node
            };
            for j in grid.neighbors(node.x, node.y) {
                if j <= i {
                    continue;
                }
                let other = self.bodies[j];
                let other_ahead = Body {
                    x: other.x + other.vx,
                    y: other.y + other.vy,
                    ..other
                };
                let Some((px, py)) = ahead.box_penetration(&other_ahead) else {
                    continue;
                };
                let (share_i, share_j) = push_shares(node.pinned, other.pinned);
                self.bodies[i].vx += px * share_i;
                self.bodies[i].vy += py * share_i;
                self.bodies[j].vx -= px * share_j;
                self.bodies[j].vy -= py * share_j;
            }
        }
    }

    /// Moves overlapping padded boxes apart directly, clamping after every
    /// pass. Returns true once no padded boxes overlap.
    pub(crate) fn separate_boxes(&mut self, passes: usize) -> bool {
        let reach = self.bodies.iter().map(Body::extent).fold(0.0, f32::max);
        if reach <= 0.0 || self.bodies.len() < 2 {
            return true;
        }
        for _ in 0..passes {
            let grid = SpatialGrid::build(&self.bodies, reach);
            let mut moved = false;
            for i in 0..self.bodies.len() {
                let (x, y) = (self.bodies[i].x, self.bodies[i].y);
                for j in grid.neighbors(x, y) {
                    if j <= i {
                        continue;
                    }
                    let Some((px, py)) = self.bodies[i].box_penetration(&self.bodies[j]) else {
                        continue;
                    };
                    let (share_i, share_j) = push_shares(self.bodies[i].pinned, self.bodies[j].pinned);
                    self.bodies[i].x += px * share_i;
                    self.bodies[i].y += py * share_i;
                    self.bodies[j].x -= px * share_j;
                    self.bodies[j].y -= py * share_j;
                    moved = true;
                }
            }
            self.clamp_to_bounds();
            if !moved {
                return true;
            }
        }
        self.bodies
            .iter()
            .enumerate()
            .all(|(i, a)| self.bodies[i + 1..].iter().all(|b| a.box_penetration(b).is_none()))
    }

    fn apply_center(&mut self, alpha: f32) {
        let strength = self.config.center_strength * alpha;
        if strength == 0.0 {
            return;
        }
        let (cx, cy) = self.center;
        for body in self.bodies.iter_mut().filter(|b| !b.pinned) {
            body.vx += (cx - body.x) * strength;
            body.vy += (cy - body.y) * strength;
        }
    }

    fn clamp_to_bounds(&mut self) {
        let Some((min_x, min_y, max_x, max_y)) = self.bounds else {
            return;
        };
        for body in self.bodies.iter_mut().filter(|b| !b.pinned) {
            body.x = clamp_center(body.x, body.half_w, min_x, max_x);
            body.y = clamp_center(body.y, body.half_h, min_y, max_y);
        }
    }
}

/// How a push between two bodies is split; pinned bodies never move.
fn push_shares(a_pinned: bool, b_pinned: bool) -> (f32, f32) {
    match (a_pinned, b_pinned) {
        (true, true) => (0.0, 0.0),
        (true, false) => (0.0, 1.0),
        (false, true) => (1.0, 0.0),
        (false, false) => (0.5, 0.5),
    }
}

fn clamp_center(value: f32, half: f32, min: f32, max: f32) -> f32 {
    let lo = min + half;
    let hi = max - half;
    if lo > hi {
        (min + max) / 2.0
    } else {
        value.clamp(lo, hi)
    }
}

fn jiggle(rng: &mut StdRng) -> f32 {
    (rng.r#gen::<f32>() - 0.5) * 1e-6
}

/// Uniform bucket grid; a query returns the bodies of the 3x3 block of
/// cells around a point.
struct SpatialGrid {
    cell: f32,
    buckets: FxHashMap<(i32, i32), Vec<usize>>,
}

impl SpatialGrid {
    fn build(bodies: &[Body], cell: f32) -> Self {
        let mut buckets: FxHashMap<(i32, i32), Vec<usize>> = FxHashMap::default();
        for (idx, body) in bodies.iter().enumerate() {
            buckets.entry(cell_of(body.x, body.y, cell)).or_default().push(idx);
        }
        Self { cell, buckets }
    }

    fn neighbors(&self, x: f32, y: f32) -> impl Iterator<Item = usize> + '_ {
        let (cx, cy) = cell_of(x, y, self.cell);
        (-1..=1)
            .flat_map(move |dx| (-1..=1).map(move |dy| (cx + dx, cy + dy)))
            .filter_map(|key| self.buckets.get(&key))
            .flatten()
            .copied()
    }
}

fn cell_of(x: f32, y: f32, cell: f32) -> (i32, i32) {
    ((x / cell).floor() as i32, (y / cell).floor() as i32)
}

/// Mean center of the pinned nodes, if any.
fn pinned_centroid(graph: &Graph) -> Option<(f32, f32)> {
    let centers: Vec<(f32, f32)> = graph
        .nodes
        .values()
        .filter_map(|n| n.fixed_position.map(|(x, y)| (x + n.width / 2.0, y + n.height / 2.0)))
        .collect();
    if centers.is_empty() {
        return None;
    }
    let count = centers.len() as f32;
    let (sx, sy) = centers.iter().fold((0.0, 0.0), |(sx, sy), (x, y)| (sx + x, sy + y));
    Some((sx / count, sy / count))
}

/// Deterministic sunflower spiral around `origin`.
pub(crate) fn phyllotaxis(index: usize, origin: (f32, f32)) -> (f32, f32) {
    let golden_angle = PI * (3.0 - 5.0f32.sqrt());
    let radius = INITIAL_RADIUS * (0.5 + index as f32).sqrt();
    let angle = index as f32 * golden_angle;
    (origin.0 + radius * angle.cos(), origin.1 + radius * angle.sin())
}

#[derive(Debug, Default, Clone, Copy)]
pub struct ForceLayout;

impl LayoutAlgorithm for ForceLayout {
    fn name(&self) -> &'static str {
        "force"
    }

    fn description(&self) -> &'static str {
        "force-directed simulation with charge, springs and collision"
    }

    fn schema(&self) -> &'static [ParamSpec] {
        SCHEMA
    }

    fn calculate(&self, graph: &Graph, params: &ResolvedParams<'_>, ctx: &LayoutContext<'_>) -> LayoutResult {
        let config = SimulationConfig::from_params(params);
        let _span = debug_span!("force_layout", nodes = graph.nodes.len(), edges = graph.edges.len()).entered();
        let mut nodes = initial_node_layouts(graph);
        let outcome = if nodes.is_empty() {
            SimulationOutcome {
                iterations: 0,
                converged: true,
                cancelled: false,
            }
        } else {
            simulate(graph, &mut nodes, config, ctx)
        };
        if !has_fixed_positions(graph) {
            normalize_to_origin(&mut nodes, LAYOUT_MARGIN);
        }
        debug!(iterations = outcome.iterations, converged = outcome.converged, "force layout finished");
        let route = RouteOptions::new(params.routing(), Direction::TopDown);
        let mut result = finish_layout(self.name(), graph, nodes, Vec::new(), &route);
        result.iterations = outcome.iterations;
        result.converged = outcome.converged;
        result.cancelled = outcome.cancelled;
        result
    }
}

fn simulate(
    graph: &Graph,
    nodes: &mut BTreeMap<String, NodeLayout>,
    config: SimulationConfig,
    ctx: &LayoutContext<'_>,
) -> SimulationOutcome {
    let index: HashMap<&str, usize> = graph.nodes.keys().enumerate().map(|(idx, id)| (id.as_str(), idx)).collect();
    let origin = pinned_centroid(graph).unwrap_or((0.0, 0.0));
    let bodies: Vec<Body> = graph
        .nodes
        .values()
        .enumerate()
        .map(|(idx, node)| match node.fixed_position {
            Some((x, y)) => {
                Body::new((x + node.width / 2.0, y + node.height / 2.0), node.width, node.height, config.collision_padding)
                    .pinned()
            }
            None => Body::new(phyllotaxis(idx, origin), node.width, node.height, config.collision_padding),
        })
        .collect();
    let links = graph
        .edges
        .iter()
        .filter_map(|edge| Some((*index.get(edge.from.as_str())?, *index.get(edge.to.as_str())?)))
        .collect();

    let mut simulation = Simulation::new(config, bodies, links, origin);
    if has_fixed_positions(graph) {
        // Pinned coordinates are kept as given, so free bodies stay in the positive quadrant.
        simulation = simulation.confine((0.0, 0.0, f32::INFINITY, f32::INFINITY));
    }
    let outcome = simulation.run(ctx);
    for (node, body) in nodes.values_mut().zip(simulation.bodies()) {
        node.x = body.x - node.width / 2.0;
        node.y = body.y - node.height / 2.0;
    }
    outcome
}
