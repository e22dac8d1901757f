//! Readability scoring for realized layouts.
//!
//! Every metric is a pure function of the positioned nodes and routed edges.
//! Sub-scores are normalized so that 1.0 is best, then combined with fixed
//! weights into `overall_score`.

use std::collections::BTreeMap;
use std::fmt;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::debug;

use crate::layout::{EdgeLayout, LayoutResult, NodeLayout};

/// Bounding-box shape the aspect-ratio score aims for.
pub const IDEAL_ASPECT_RATIO: f64 = 16.0 / 9.0;

const WEIGHT_CROSSINGS: f64 = 0.30;
const WEIGHT_CROSSING_ANGLE: f64 = 0.10;
const WEIGHT_ANGULAR_RESOLUTION: f64 = 0.15;
const WEIGHT_EDGE_LENGTH: f64 = 0.15;
const WEIGHT_OCCLUSION: f64 = 0.20;
const WEIGHT_ASPECT_RATIO: f64 = 0.05;
const WEIGHT_DENSITY: f64 = 0.05;

const EPS: f64 = 1e-9;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DiagramType {
    Business,
    Motivation,
    C4,
    Changeset,
    Architecture,
}

impl DiagramType {
    pub fn from_token(token: &str) -> Option<Self> {
        match token.to_ascii_lowercase().as_str() {
            "business" => Some(Self::Business),
            "motivation" => Some(Self::Motivation),
            "c4" => Some(Self::C4),
            "changeset" => Some(Self::Changeset),
            "architecture" => Some(Self::Architecture),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Business => "business",
            Self::Motivation => "motivation",
            Self::C4 => "c4",
            Self::Changeset => "changeset",
            Self::Architecture => "architecture",
        }
    }
}

impl fmt::Display for DiagramType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Raw geometric measurements of a layout.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct QualityMetrics {
    /// Proper segment crossings between edges that share no endpoint.
    pub crossings: usize,
    /// Edge pairs that cross at least once, over the number of pairs that
    /// could cross. Stays in [0, 1] however often two polylines meet.
    pub crossing_number: f64,
    /// Mean acute crossing angle in degrees; 90 when nothing crosses.
    pub crossing_angle: f64,
    /// Smallest angle in degrees between two edges at any node; 0 when no
    /// node has two incident edges.
    pub angular_resolution_min: f64,
    /// Mean standard deviation of the angular gaps around each node.
    pub angular_resolution_deviation: f64,
    pub edge_length_min: f64,
    pub edge_length_max: f64,
    pub edge_length_mean: f64,
    pub edge_length_stddev: f64,
    /// Pairs of node boxes that overlap.
    pub occlusions: usize,
    pub aspect_ratio: f64,
    pub density: f64,
}

/// Per-criterion scores in [0, 1], higher is better.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct SubScores {
    pub crossings: f64,
    pub crossing_angle: f64,
    pub angular_resolution: f64,
    pub edge_length: f64,
    pub occlusion: f64,
    pub aspect_ratio: f64,
    pub density: f64,
}

impl SubScores {
    /// Each criterion as `(name, score, weight)`.
    pub fn weighted(&self) -> [(&'static str, f64, f64); 7] {
        [
            ("crossings", self.crossings, WEIGHT_CROSSINGS),
            ("crossing_angle", self.crossing_angle, WEIGHT_CROSSING_ANGLE),
            ("angular_resolution", self.angular_resolution, WEIGHT_ANGULAR_RESOLUTION),
            ("edge_length", self.edge_length, WEIGHT_EDGE_LENGTH),
            ("occlusion", self.occlusion, WEIGHT_OCCLUSION),
            ("aspect_ratio", self.aspect_ratio, WEIGHT_ASPECT_RATIO),
            ("density", self.density, WEIGHT_DENSITY),
        ]
    }

    pub fn overall(&self) -> f64 {
        let total: f64 = self.weighted().iter().map(|(_, score, weight)| score * weight).sum();
        unit(total)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QualityReport {
    pub overall_score: f64,
    pub metrics: QualityMetrics,
    pub scores: SubScores,
    pub node_count: usize,
    pub edge_count: usize,
    pub layout_type: String,
    pub diagram_type: DiagramType,
    pub computation_ms: f64,
    pub timestamp: DateTime<Utc>,
}

/// Scores a finished layout.
pub fn calculate_quality(result: &LayoutResult, diagram_type: DiagramType) -> QualityReport {
    score_layout(&result.nodes, &result.edges, &result.algorithm, diagram_type)
}

/// Scores any set of positioned nodes and routed edges.
pub fn score_layout(
    nodes: &BTreeMap<String, NodeLayout>,
    edges: &[EdgeLayout],
    layout_type: &str,
    diagram_type: DiagramType,
) -> QualityReport {
    let started = Instant::now();
    let node_count = nodes.len();
    let edge_count = edges.len();

    let crossings = crossing_stats(edges);
    let max_crossings = max_crossings(nodes, edges);
    let angular = angular_resolution(nodes, edges);
    let lengths = edge_length_stats(edges);
    let occlusions = occlusion_count(nodes);
    let aspect_ratio = aspect_ratio(nodes);
    let density = density(node_count, edge_count);

    let crossing_number = if max_crossings > 0.0 {
        crossings.pairs as f64 / max_crossings
    } else {
        0.0
    };
    let metrics = QualityMetrics {
        crossings: crossings.count,
        crossing_number: finite(crossing_number),
        crossing_angle: finite(crossings.mean_angle),
        angular_resolution_min: finite(angular.min),
        angular_resolution_deviation: finite(angular.deviation),
        edge_length_min: finite(lengths.min),
        edge_length_max: finite(lengths.max),
        edge_length_mean: finite(lengths.mean),
        edge_length_stddev: finite(lengths.stddev),
        occlusions,
        aspect_ratio: finite(aspect_ratio),
        density: finite(density),
    };

    let scores = SubScores {
        crossings: unit(1.0 - crossing_number),
        crossing_angle: unit(crossings.mean_angle / 90.0),
        angular_resolution: unit(angular.score),
        edge_length: if lengths.mean > EPS {
            unit(1.0 - lengths.stddev / lengths.mean)
        } else {
            1.0
        },
        occlusion: if node_count > 0 {
            unit(1.0 - occlusions as f64 / node_count as f64)
        } else {
            1.0
        },
        aspect_ratio: unit(aspect_ratio.min(IDEAL_ASPECT_RATIO) / aspect_ratio.max(IDEAL_ASPECT_RATIO)),
        density: unit(1.0 - density),
    };
    let overall_score = scores.overall();
    let computation_ms = started.elapsed().as_secs_f64() * 1000.0;
    debug!(
        layout_type,
        %diagram_type,
        nodes = node_count,
        edges = edge_count,
        crossings = metrics.crossings,
        overall_score,
        "layout scored"
    );
    QualityReport {
        overall_score,
        metrics,
        scores,
        node_count,
        edge_count,
        layout_type: layout_type.to_string(),
        diagram_type,
        computation_ms,
        timestamp: Utc::now(),
    }
}

/// Clamps to [0, 1]; anything non-finite counts as the worst score.
fn unit(value: f64) -> f64 {
    if value.is_finite() { value.clamp(0.0, 1.0) } else { 0.0 }
}

fn finite(value: f64) -> f64 {
    if value.is_finite() { value } else { 0.0 }
}

type Point = (f64, f64);

fn polyline(edge: &EdgeLayout) -> Vec<Point> {
    edge.points.iter().map(|&(x, y)| (x as f64, y as f64)).collect()
}

struct CrossingStats {
    count: usize,
    /// Edge pairs with at least one crossing.
    pairs: usize,
    mean_angle: f64,
}

struct EdgeGeometry<'a> {
    from: &'a str,
    to: &'a str,
    points: Vec<Point>,
    min: Point,
    max: Point,
}

/// Counts proper crossings with a sweep over edge bounding boxes sorted by
/// their left side. Edges sharing an endpoint are never compared.
fn crossing_stats(edges: &[EdgeLayout]) -> CrossingStats {
    let mut geometry: Vec<EdgeGeometry<'_>> = edges
        .iter()
        .filter(|edge| edge.points.len() >= 2)
        .map(|edge| {
            let points = polyline(edge);
            let (mut min, mut max) = ((f64::MAX, f64::MAX), (f64::MIN, f64::MIN));
            for &(x, y) in &points {
                min = (min.0.min(x), min.1.min(y));
                max = (max.0.max(x), max.1.max(y));
            }
            EdgeGeometry {
                from: &edge.from,
                to: &edge.to,
                points,
                min,
                max,
            }
        })
        .collect();
    geometry.sort_by(|a, b| a.min.0.total_cmp(&b.min.0));

    let mut count = 0usize;
    let mut pairs = 0usize;
    let mut angle_sum = 0.0;
    for (idx, a) in geometry.iter().enumerate() {
        for b in &geometry[idx + 1..] {
            if b.min.0 > a.max.0 {
                break;
            }
            if b.min.1 > a.max.1 || b.max.1 < a.min.1 {
                continue;
            }
            if a.from == b.from || a.from == b.to || a.to == b.from || a.to == b.to {
                continue;
            }
            let before = count;
            for sa in a.points.windows(2) {
                for sb in b.points.windows(2) {
                    if let Some(angle) = proper_crossing_angle(sa[0], sa[1], sb[0], sb[1]) {
                        count += 1;
                        angle_sum += angle;
                    }
                }
            }
            if count > before {
                pairs += 1;
            }
        }
    }
    CrossingStats {
        count,
        pairs,
        mean_angle: if count > 0 { angle_sum / count as f64 } else { 90.0 },
    }
}

/// Acute angle in degrees at which two segments cross, if they cross at an
/// interior point of both.
fn proper_crossing_angle(a: Point, b: Point, c: Point, d: Point) -> Option<f64> {
    fn orient(p: Point, q: Point, r: Point) -> f64 {
        (q.0 - p.0) * (r.1 - p.1) - (q.1 - p.1) * (r.0 - p.0)
    }
    let o1 = orient(a, b, c);
    let o2 = orient(a, b, d);
    let o3 = orient(c, d, a);
    let o4 = orient(c, d, b);
    let straddles = |p: f64, q: f64| (p > EPS && q < -EPS) || (p < -EPS && q > EPS);
    if !(straddles(o1, o2) && straddles(o3, o4)) {
        return None;
    }
    let u = (b.0 - a.0, b.1 - a.1);
    let v = (d.0 - c.0, d.1 - c.1);
    let norms = (u.0.hypot(u.1)) * (v.0.hypot(v.1));
    if norms <= EPS {
        return None;
    }
    let cos = ((u.0 * v.0 + u.1 * v.1).abs() / norms).min(1.0);
    Some(cos.acos().to_degrees())
}

/// `m(m-1)/2 - sum(deg(v)(deg(v)-1)/2)`: pairs of edges that could cross.
fn max_crossings(nodes: &BTreeMap<String, NodeLayout>, edges: &[EdgeLayout]) -> f64 {
    let m = edges.len() as f64;
    let mut degrees: BTreeMap<&str, f64> = nodes.keys().map(|id| (id.as_str(), 0.0)).collect();
    for edge in edges {
        *degrees.entry(edge.from.as_str()).or_default() += 1.0;
        if edge.to != edge.from {
            *degrees.entry(edge.to.as_str()).or_default() += 1.0;
        }
    }
    let adjacent: f64 = degrees.values().map(|d| d * (d - 1.0) / 2.0).sum();
    (m * (m - 1.0) / 2.0 - adjacent).max(0.0)
}

struct AngularStats {
    min: f64,
    deviation: f64,
    score: f64,
}

/// Angles are taken from each node center toward the neighbouring polyline
/// point, so bends near the node count rather than the far endpoint.
fn angular_resolution(nodes: &BTreeMap<String, NodeLayout>, edges: &[EdgeLayout]) -> AngularStats {
    let mut incident: BTreeMap<&str, Vec<f64>> = BTreeMap::new();
    for edge in edges {
        if edge.from == edge.to || edge.points.len() < 2 {
            continue;
        }
        let points = polyline(edge);
        let ends = [
            (edge.from.as_str(), points[1]),
            (edge.to.as_str(), points[points.len() - 2]),
        ];
        for (id, toward) in ends {
            let Some(node) = nodes.get(id) else {
                continue;
            };
            let (cx, cy) = node.center();
            let (dx, dy) = (toward.0 - cx as f64, toward.1 - cy as f64);
            if dx.abs() <= EPS && dy.abs() <= EPS {
                continue;
            }
            incident.entry(id).or_default().push(dy.atan2(dx).to_degrees().rem_euclid(360.0));
        }
    }

    let mut min = f64::MAX;
    let mut deviation_sum = 0.0;
    let mut ratio_sum = 0.0;
    let mut counted = 0usize;
    for angles in incident.values_mut() {
        if angles.len() < 2 {
            continue;
        }
        angles.sort_by(f64::total_cmp);
        let mut gaps: Vec<f64> = angles.windows(2).map(|w| w[1] - w[0]).collect();
        gaps.push(360.0 - angles[angles.len() - 1] + angles[0]);
        let ideal = 360.0 / angles.len() as f64;
        let node_min = gaps.iter().copied().fold(f64::MAX, f64::min);
        let variance = gaps.iter().map(|g| (g - ideal).powi(2)).sum::<f64>() / gaps.len() as f64;
        min = min.min(node_min);
        deviation_sum += variance.sqrt();
        ratio_sum += node_min / ideal;
        counted += 1;
    }
    if counted == 0 {
        return AngularStats {
            min: 0.0,
            deviation: 0.0,
            score: 1.0,
        };
    }
    AngularStats {
        min,
        deviation: deviation_sum / counted as f64,
        score: ratio_sum / counted as f64,
    }
}

struct LengthStats {
    min: f64,
    max: f64,
    mean: f64,
    stddev: f64,
}

fn edge_length_stats(edges: &[EdgeLayout]) -> LengthStats {
    let lengths: Vec<f64> = edges
        .iter()
        .map(|edge| {
            polyline(edge)
                .windows(2)
                .map(|w| (w[1].0 - w[0].0).hypot(w[1].1 - w[0].1))
                .sum()
        })
        .collect();
    if lengths.is_empty() {
        return LengthStats {
            min: 0.0,
            max: 0.0,
            mean: 0.0,
            stddev: 0.0,
        };
    }
    let n = lengths.len() as f64;
    let mean = lengths.iter().sum::<f64>() / n;
    let variance = lengths.iter().map(|l| (l - mean).powi(2)).sum::<f64>() / n;
    LengthStats {
        min: lengths.iter().copied().fold(f64::MAX, f64::min),
        max: lengths.iter().copied().fold(f64::MIN, f64::max),
        mean,
        stddev: variance.sqrt(),
    }
}

/// Overlapping node pairs, found by sweeping boxes sorted by their left side.
fn occlusion_count(nodes: &BTreeMap<String, NodeLayout>) -> usize {
    let mut boxes: Vec<&NodeLayout> = nodes.values().collect();
    boxes.sort_by(|a, b| a.x.total_cmp(&b.x));
    let mut count = 0;
    for (idx, a) in boxes.iter().enumerate() {
        for b in &boxes[idx + 1..] {
            if b.x >= a.right() {
                break;
            }
            if a.overlaps(b) {
                count += 1;
            }
        }
    }
    count
}

/// Width over height of the node extent; 1 for empty or degenerate extents.
fn aspect_ratio(nodes: &BTreeMap<String, NodeLayout>) -> f64 {
    let mut min = (f64::MAX, f64::MAX);
    let mut max = (f64::MIN, f64::MIN);
    for node in nodes.values() {
        min = (min.0.min(node.x as f64), min.1.min(node.y as f64));
        max = (max.0.max(node.right() as f64), max.1.max(node.bottom() as f64));
    }
    let (width, height) = (max.0 - min.0, max.1 - min.1);
    if nodes.is_empty() || width <= EPS || height <= EPS {
        1.0
    } else {
        width / height
    }
}

/// `m / (n(n-1)/2)`, capped at 1 since multigraphs can exceed it.
fn density(node_count: usize, edge_count: usize) -> f64 {
    if node_count < 2 {
        return 0.0;
    }
    let possible = (node_count * (node_count - 1)) as f64 / 2.0;
    (edge_count as f64 / possible).min(1.0)
}

/// One criterion of a regression check.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricDelta {
    pub name: &'static str,
    pub current: f64,
    pub baseline: f64,
    pub delta: f64,
    pub regressed: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QualityComparison {
    pub passed: bool,
    pub overall_delta: f64,
    pub metrics: Vec<MetricDelta>,
}

impl QualityComparison {
    pub fn regressions(&self) -> impl Iterator<Item = &MetricDelta> {
        self.metrics.iter().filter(|m| m.regressed)
    }
}

/// Compares `current` against a curated `baseline`. A criterion regresses
/// when its score falls more than `tolerance` below the baseline; the check
/// passes when nothing regresses, the overall score included.
pub fn compare_reports(current: &QualityReport, baseline: &QualityReport, tolerance: f64) -> QualityComparison {
    let tolerance = if tolerance.is_finite() { tolerance.max(0.0) } else { 0.0 };
    let delta = |name: &'static str, current: f64, baseline: f64| {
        let delta = current - baseline;
        MetricDelta {
            name,
            current,
            baseline,
            delta,
            regressed: delta < -tolerance,
        }
    };
    let mut metrics: Vec<MetricDelta> = current
        .scores
        .weighted()
        .iter()
        .zip(baseline.scores.weighted())
        .map(|(&(name, now, _), (_, before, _))| delta(name, now, before))
        .collect();
    metrics.push(delta("overall", current.overall_score, baseline.overall_score));
    let passed = metrics.iter().all(|m| !m.regressed);
    QualityComparison {
        passed,
        overall_delta: current.overall_score - baseline.overall_score,
        metrics,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(id: &str, x: f32, y: f32) -> NodeLayout {
        NodeLayout {
            id: id.to_string(),
            x,
            y,
            width: 20.0,
            height: 20.0,
            domain: None,
            node_type: None,
        }
    }

    fn edge(id: &str, from: &str, to: &str, points: Vec<(f32, f32)>) -> EdgeLayout {
        EdgeLayout {
            id: id.to_string(),
            from: from.to_string(),
            to: to.to_string(),
            points,
            label: None,
            edge_type: None,
            cross_domain: false,
            bundle: None,
        }
    }

    fn nodes(list: Vec<NodeLayout>) -> BTreeMap<String, NodeLayout> {
        list.into_iter().map(|n| (n.id.clone(), n)).collect()
    }

    /// Corners of a square, wired as an X.
    fn crossed() -> (BTreeMap<String, NodeLayout>, Vec<EdgeLayout>) {
        let nodes = nodes(vec![
            node("a", 0.0, 0.0),
            node("b", 200.0, 0.0),
            node("c", 0.0, 200.0),
            node("d", 200.0, 200.0),
        ]);
        let edges = vec![
            edge("ad", "a", "d", vec![(20.0, 20.0), (200.0, 200.0)]),
            edge("bc", "b", "c", vec![(200.0, 20.0), (20.0, 200.0)]),
        ];
        (nodes, edges)
    }

    #[test]
    fn empty_layout_scores_defined() {
        let report = score_layout(&BTreeMap::new(), &[], "matrix", DiagramType::Business);
        assert!((0.0..=1.0).contains(&report.overall_score));
        assert_eq!(report.node_count, 0);
        assert_eq!(report.metrics.crossings, 0);
        assert_eq!(report.metrics.density, 0.0);
    }

    #[test]
    fn square_x_has_one_right_angle_crossing() {
        let (nodes, edges) = crossed();
        let report = score_layout(&nodes, &edges, "force", DiagramType::Architecture);
        assert_eq!(report.metrics.crossings, 1);
        assert!((report.metrics.crossing_angle - 90.0).abs() < 1e-6);
        assert!((report.metrics.crossing_number - 1.0).abs() < 1e-9);
        assert_eq!(report.scores.crossings, 0.0);
        assert!((report.scores.crossing_angle - 1.0).abs() < 1e-9);
    }

    #[test]
    fn repeated_crossings_of_one_pair_stay_normalized() {
        let nodes = nodes(vec![
            node("a", 0.0, 100.0),
            node("b", 400.0, 100.0),
            node("c", 0.0, 300.0),
            node("d", 400.0, 300.0),
        ]);
        // A straight wire and a zigzag that passes it three times.
        let edges = vec![
            edge("ab", "a", "b", vec![(20.0, 110.0), (400.0, 110.0)]),
            edge(
                "cd",
                "c",
                "d",
                vec![(20.0, 300.0), (100.0, 50.0), (200.0, 200.0), (300.0, 50.0), (400.0, 300.0)],
            ),
        ];
        let report = score_layout(&nodes, &edges, "orthogonal", DiagramType::Architecture);
        assert_eq!(report.metrics.crossings, 4);
        assert!((report.metrics.crossing_number - 1.0).abs() < 1e-9);
        assert_eq!(report.scores.crossings, 0.0);
    }

    #[test]
    fn edges_sharing_a_node_never_cross() {
        let nodes = nodes(vec![node("a", 0.0, 0.0), node("b", 100.0, 0.0), node("c", 0.0, 100.0)]);
        let edges = vec![
            edge("ab", "a", "b", vec![(20.0, 10.0), (100.0, 10.0)]),
            edge("ac", "a", "c", vec![(10.0, 20.0), (10.0, 100.0)]),
        ];
        let report = score_layout(&nodes, &edges, "layered", DiagramType::C4);
        assert_eq!(report.metrics.crossings, 0);
        assert_eq!(report.scores.crossings, 1.0);
    }

    #[test]
    fn overlapping_nodes_are_counted() {
        let nodes = nodes(vec![node("a", 0.0, 0.0), node("b", 10.0, 10.0), node("c", 100.0, 0.0)]);
        let report = score_layout(&nodes, &[], "matrix", DiagramType::Business);
        assert_eq!(report.metrics.occlusions, 1);
        assert!(report.scores.occlusion < 1.0);
    }

    #[test]
    fn uniform_edges_score_full_length_uniformity() {
        let (nodes, edges) = crossed();
        let report = score_layout(&nodes, &edges, "force", DiagramType::Architecture);
        assert!(report.metrics.edge_length_stddev < 1e-6);
        assert!((report.scores.edge_length - 1.0).abs() < 1e-9);
        assert!((report.metrics.edge_length_min - report.metrics.edge_length_max).abs() < 1e-6);
    }

    #[test]
    fn angular_resolution_of_a_star() {
        let nodes = nodes(vec![
            node("hub", 100.0, 100.0),
            node("e", 200.0, 100.0),
            node("w", 0.0, 100.0),
            node("n", 100.0, 0.0),
            node("s", 100.0, 200.0),
        ]);
        let edges = vec![
            edge("he", "hub", "e", vec![(120.0, 110.0), (200.0, 110.0)]),
            edge("hw", "hub", "w", vec![(100.0, 110.0), (20.0, 110.0)]),
            edge("hn", "hub", "n", vec![(110.0, 100.0), (110.0, 20.0)]),
            edge("hs", "hub", "s", vec![(110.0, 120.0), (110.0, 200.0)]),
        ];
        let report = score_layout(&nodes, &edges, "force", DiagramType::Motivation);
        assert!((report.metrics.angular_resolution_min - 90.0).abs() < 1e-6);
        assert!(report.metrics.angular_resolution_deviation < 1e-6);
        assert!((report.scores.angular_resolution - 1.0).abs() < 1e-9);
    }

    #[test]
    fn aspect_ratio_prefers_widescreen() {
        let wide = nodes(vec![node("a", 0.0, 0.0), node("b", 140.0, 70.0)]);
        let tall = nodes(vec![node("a", 0.0, 0.0), node("b", 0.0, 300.0)]);
        let wide = score_layout(&wide, &[], "matrix", DiagramType::Business);
        let tall = score_layout(&tall, &[], "matrix", DiagramType::Business);
        assert!(wide.scores.aspect_ratio > tall.scores.aspect_ratio);
    }

    #[test]
    fn comparison_flags_regressions_beyond_tolerance() {
        let (nodes, edges) = crossed();
        let worse = score_layout(&nodes, &edges, "force", DiagramType::Architecture);
        let better = score_layout(&nodes, &edges[..1], "force", DiagramType::Architecture);

        let same = compare_reports(&better, &better, 0.0);
        assert!(same.passed);
        assert_eq!(same.metrics.len(), 8);

        let regressed = compare_reports(&worse, &better, 0.05);
        assert!(!regressed.passed);
        assert!(regressed.regressions().any(|m| m.name == "crossings"));
        assert!(regressed.overall_delta < 0.0);

        assert!(compare_reports(&worse, &better, 1.0).passed);
    }

    #[test]
    fn diagram_tokens_parse_case_insensitively() {
        assert_eq!(DiagramType::from_token("C4"), Some(DiagramType::C4));
        assert_eq!(DiagramType::from_token("Changeset"), Some(DiagramType::Changeset));
        assert_eq!(DiagramType::from_token("uml"), None);
    }
}
