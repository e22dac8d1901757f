use std::collections::BTreeMap;
use std::time::Instant;

use tracing::debug;

use super::force::ForceLayout;
use super::hierarchical::HierarchicalLayout;
use super::layered::LayeredLayout;
use super::matrix::MatrixLayout;
use super::orthogonal::OrthogonalLayout;
use super::stress::StressLayout;
use super::{LayoutAlgorithm, LayoutContext, LayoutOptions, LayoutResult, ResolvedParams};
use crate::error::{LayoutError, ParamViolation};
use crate::ir::Graph;

/// Outcome of checking an option map before any computation starts.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationReport {
    pub valid: bool,
    pub errors: Vec<ParamViolation>,
}

impl ValidationReport {
    fn from_errors(errors: Vec<ParamViolation>) -> Self {
        Self {
            valid: errors.is_empty(),
            errors,
        }
    }

    pub fn messages(&self) -> Vec<String> {
        self.errors.iter().map(ToString::to_string).collect()
    }
}

/// Name to algorithm table. Immutable once built, so it can be shared
/// between views.
#[derive(Default)]
pub struct LayoutRegistry {
    algorithms: BTreeMap<String, Box<dyn LayoutAlgorithm>>,
}

impl LayoutRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register("hierarchical", HierarchicalLayout);
        registry.register("layered", LayeredLayout);
        registry.register("force", ForceLayout);
        registry.register("stress", StressLayout);
        registry.register("matrix", MatrixLayout);
        registry.register("orthogonal", OrthogonalLayout);
        registry
    }

    /// Adds `algorithm` under `name`, returning whatever it replaced.
    pub fn register(
        &mut self,
        name: impl Into<String>,
        algorithm: impl LayoutAlgorithm + 'static,
    ) -> Option<Box<dyn LayoutAlgorithm>> {
        self.algorithms.insert(name.into(), Box::new(algorithm))
    }

    pub fn get(&self, name: &str) -> Result<&dyn LayoutAlgorithm, LayoutError> {
        self.algorithms
            .get(name)
            .map(|algorithm| algorithm.as_ref())
            .ok_or_else(|| LayoutError::UnknownAlgorithm(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.algorithms.contains_key(name)
    }

    pub fn names(&self) -> Vec<&str> {
        self.algorithms.keys().map(String::as_str).collect()
    }

    pub fn validate(&self, name: &str, options: &LayoutOptions) -> ValidationReport {
        match self.algorithms.get(name) {
            Some(algorithm) => ValidationReport::from_errors(algorithm.validate(options)),
            None => ValidationReport::from_errors(vec![ParamViolation::UnknownAlgorithm {
                name: name.to_string(),
                known: self.algorithms.keys().cloned().collect(),
            }]),
        }
    }

    /// Validates `options`, then runs the algorithm and stamps the result
    /// with its registered name and wall-clock duration.
    pub fn run(
        &self,
        name: &str,
        graph: &Graph,
        options: &LayoutOptions,
        ctx: &LayoutContext<'_>,
    ) -> Result<LayoutResult, LayoutError> {
        let algorithm = self.get(name)?;
        let violations = algorithm.validate(options);
        if !violations.is_empty() {
            return Err(LayoutError::InvalidParameters(violations));
        }
        let params = ResolvedParams::new(algorithm.schema(), options);
        let started = Instant::now();
        let mut result = algorithm.calculate(graph, &params, ctx);
        result.algorithm = name.to_string();
        result.duration_ms = started.elapsed().as_secs_f64() * 1000.0;
        debug!(
            algorithm = name,
            nodes = result.nodes.len(),
            edges = result.edges.len(),
            duration_ms = result.duration_ms,
            "layout computed"
        );
        Ok(result)
    }
}

impl std::fmt::Debug for LayoutRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LayoutRegistry").field("algorithms", &self.names()).finish()
    }
}
