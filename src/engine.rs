//! The request pipeline: graph policy, semantic zoom, validation, cached
//! computation and edge bundling.
//!
//! [`LayoutEngine`] is immutable and shared between views. Each view owns a
//! [`LayoutSession`] whose cache never leaks into another view.

use std::borrow::Cow;

use serde_json::Value;
use tracing::{debug, debug_span, warn};

use crate::bundling::bundle_edges;
use crate::cache::{CacheKey, CacheStats, LayoutCache};
use crate::config::{EngineConfig, MalformedEdgePolicy};
use crate::error::LayoutError;
use crate::ir::Graph;
use crate::layout::{LayoutContext, LayoutOptions, LayoutRegistry, LayoutResult, ResolvedParams, ValidationReport};
use crate::zoom::{ZoomView, detail_for_zoom, filter_graph};

/// One layout call: which algorithm, its options and the view state.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LayoutRequest {
    /// Falls back to the configured default algorithm.
    pub algorithm: Option<String>,
    pub options: LayoutOptions,
    /// Current zoom scalar; `None` lays out every node.
    pub zoom: Option<f32>,
    pub skip_bundling: bool,
}

impl LayoutRequest {
    pub fn new(algorithm: impl Into<String>) -> Self {
        Self {
            algorithm: Some(algorithm.into()),
            ..Self::default()
        }
    }

    pub fn with_option(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.options.insert(name.into(), value.into());
        self
    }

    pub fn with_options(mut self, options: LayoutOptions) -> Self {
        self.options.extend(options);
        self
    }

    pub fn with_zoom(mut self, zoom: f32) -> Self {
        self.zoom = Some(zoom);
        self
    }

    pub fn without_bundling(mut self) -> Self {
        self.skip_bundling = true;
        self
    }
}

#[derive(Debug)]
pub struct LayoutEngine {
    registry: LayoutRegistry,
    config: EngineConfig,
}

impl Default for LayoutEngine {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}

impl LayoutEngine {
    /// Engine with every built-in algorithm registered.
    pub fn new(config: EngineConfig) -> Self {
        Self::with_registry(LayoutRegistry::with_defaults(), config)
    }

    pub fn with_registry(registry: LayoutRegistry, config: EngineConfig) -> Self {
        Self { registry, config }
    }

    pub fn registry(&self) -> &LayoutRegistry {
        &self.registry
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// A fresh per-view session sized from the config.
    pub fn session(&self) -> LayoutSession {
        LayoutSession::new(self.config.cache_capacity)
    }

    fn algorithm_name<'r>(&'r self, request: &'r LayoutRequest) -> &'r str {
        request.algorithm.as_deref().unwrap_or(&self.config.default_algorithm)
    }

    /// Configured defaults for the algorithm with the request's options on top.
    fn effective_options(&self, name: &str, request: &LayoutRequest) -> LayoutOptions {
        let mut options = self.config.layout_options.get(name).cloned().unwrap_or_default();
        options.extend(request.options.iter().map(|(k, v)| (k.clone(), v.clone())));
        options
    }

    pub fn validate(&self, request: &LayoutRequest) -> ValidationReport {
        let name = self.algorithm_name(request);
        self.registry.validate(name, &self.effective_options(name, request))
    }

    /// Applies the malformed-edge policy. Lenient mode drops offending edges
    /// and clamps bad sizes, logging every issue.
    pub fn prepare_graph<'g>(&self, graph: &'g Graph) -> Result<Cow<'g, Graph>, LayoutError> {
        let issues = graph.validate();
        if issues.is_empty() {
            return Ok(Cow::Borrowed(graph));
        }
        match self.config.malformed_edges {
            MalformedEdgePolicy::Strict => Err(LayoutError::MalformedGraph(issues)),
            MalformedEdgePolicy::Lenient => {
                for issue in &issues {
                    warn!(%issue, "skipping malformed graph element");
                }
                let (clean, _) = graph.sanitized();
                Ok(Cow::Owned(clean))
            }
        }
    }

    /// Runs the pipeline without a cache.
    pub fn layout(&self, graph: &Graph, request: &LayoutRequest) -> Result<LayoutResult, LayoutError> {
        self.run(graph, request, &LayoutContext::new(), None)
    }

    fn run(
        &self,
        graph: &Graph,
        request: &LayoutRequest,
        ctx: &LayoutContext<'_>,
        cache: Option<&mut LayoutCache>,
    ) -> Result<LayoutResult, LayoutError> {
        let name = self.algorithm_name(request);
        let _span = debug_span!("layout_request", algorithm = name).entered();
        let algorithm = self.registry.get(name)?;
        let options = self.effective_options(name, request);
        let violations = algorithm.validate(&options);
        if !violations.is_empty() {
            return Err(LayoutError::InvalidParameters(violations));
        }

        let prepared = self.prepare_graph(graph)?;
        let view: Option<ZoomView> = request.zoom.map(|zoom| detail_for_zoom(zoom, &self.config.zoom));
        let visible = match &view {
            Some(view) => Cow::Owned(filter_graph(&prepared, view)),
            None => prepared,
        };

        let mut params = ResolvedParams::new(algorithm.schema(), &options).canonical();
        if let Some(view) = &view {
            params.push(';');
            params.push_str(&view.descriptor());
        }
        let key = CacheKey::new(visible.fingerprint(), name, params);

        let mut result = match cache {
            Some(cache) => match cache.get(&key) {
                Some(hit) => hit.clone(),
                None => {
                    let computed = self.compute(name, &visible, &options, ctx, view.as_ref())?;
                    if computed.cancelled {
                        debug!("cancelled layout not cached");
                    } else {
                        cache.put(key, computed.clone());
                    }
                    computed
                }
            },
            None => self.compute(name, &visible, &options, ctx, view.as_ref())?,
        };

        if !request.skip_bundling {
            bundle_edges(&mut result, &self.config.bundling);
        }
        Ok(result)
    }

    fn compute(
        &self,
        name: &str,
        graph: &Graph,
        options: &LayoutOptions,
        ctx: &LayoutContext<'_>,
        view: Option<&ZoomView>,
    ) -> Result<LayoutResult, LayoutError> {
        let mut result = self.registry.run(name, graph, options, ctx)?;
        result.detail_level = view.map(|view| view.level);
        Ok(result)
    }
}

/// Per-view state: owns the layout cache for one consuming view.
#[derive(Debug, Default)]
pub struct LayoutSession {
    cache: LayoutCache,
}

impl LayoutSession {
    pub fn new(capacity: usize) -> Self {
        Self {
            cache: LayoutCache::new(capacity),
        }
    }

    /// Runs the pipeline, serving repeated requests from this session's cache.
    pub fn layout(
        &mut self,
        engine: &LayoutEngine,
        graph: &Graph,
        request: &LayoutRequest,
    ) -> Result<LayoutResult, LayoutError> {
        engine.run(graph, request, &LayoutContext::new(), Some(&mut self.cache))
    }

    /// Like [`Self::layout`], consulting `ctx` for cancellation.
    pub fn layout_with(
        &mut self,
        engine: &LayoutEngine,
        graph: &Graph,
        request: &LayoutRequest,
        ctx: &LayoutContext<'_>,
    ) -> Result<LayoutResult, LayoutError> {
        engine.run(graph, request, ctx, Some(&mut self.cache))
    }

    pub fn stats(&self) -> CacheStats {
        self.cache.stats()
    }

    pub fn clear(&mut self) {
        self.cache.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::GraphIssue;
    use crate::ir::{Edge, Node};
    use crate::zoom::DetailLevel;

    fn graph() -> Graph {
        let mut graph = Graph::new();
        graph.add_node(Node::new("crm", 120.0, 60.0).with_type("system").with_domain("Sales")).unwrap();
        graph.add_node(Node::new("api", 120.0, 60.0).with_type("container").with_domain("Sales")).unwrap();
        graph.add_node(Node::new("db", 120.0, 60.0).with_type("component").with_domain("Data")).unwrap();
        graph.add_edge(Edge::new("e1", "crm", "api"));
        graph.add_edge(Edge::new("e2", "api", "db"));
        graph
    }

    #[test]
    fn engine_is_shareable_across_threads() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<LayoutEngine>();
    }

    #[test]
    fn repeated_requests_hit_the_cache() {
        let engine = LayoutEngine::default();
        let mut session = engine.session();
        let request = LayoutRequest::new("matrix");
        let first = session.layout(&engine, &graph(), &request).unwrap();
        let second = session.layout(&engine, &graph(), &request).unwrap();
        assert_eq!(first.nodes, second.nodes);
        let stats = session.stats();
        assert_eq!((stats.hits, stats.misses, stats.len), (1, 1, 1));
    }

    #[test]
    fn equivalent_options_share_a_cache_entry() {
        let engine = LayoutEngine::default();
        let mut session = engine.session();
        session.layout(&engine, &graph(), &LayoutRequest::new("force")).unwrap();
        session
            .layout(&engine, &graph(), &LayoutRequest::new("force").with_option("seed", 42))
            .unwrap();
        assert_eq!(session.stats().hits, 1);
        session
            .layout(&engine, &graph(), &LayoutRequest::new("force").with_option("seed", 7))
            .unwrap();
        assert_eq!(session.stats().len, 2);
    }

    #[test]
    fn zoom_filters_and_tags_the_result() {
        let engine = LayoutEngine::default();
        let result = engine.layout(&graph(), &LayoutRequest::new("layered").with_zoom(0.1)).unwrap();
        assert_eq!(result.detail_level, Some(DetailLevel::Overview));
        assert_eq!(result.nodes.len(), 1);
        assert!(result.edges.is_empty());

        let mut session = engine.session();
        session.layout(&engine, &graph(), &LayoutRequest::new("layered").with_zoom(0.1)).unwrap();
        session.layout(&engine, &graph(), &LayoutRequest::new("layered").with_zoom(1.0)).unwrap();
        assert_eq!(session.stats().len, 2);
    }

    #[test]
    fn invalid_options_fail_before_layout() {
        let engine = LayoutEngine::default();
        let err = engine
            .layout(&graph(), &LayoutRequest::new("force").with_option("iterations", "many"))
            .unwrap_err();
        assert!(matches!(err, LayoutError::InvalidParameters(_)));
        assert!(matches!(
            engine.layout(&graph(), &LayoutRequest::new("radial")),
            Err(LayoutError::UnknownAlgorithm(_))
        ));
    }

    #[test]
    fn malformed_edges_follow_the_policy() {
        let mut broken = graph();
        broken.add_edge(Edge::new("dangling", "api", "ghost"));

        let lenient = LayoutEngine::default();
        let result = lenient.layout(&broken, &LayoutRequest::new("layered")).unwrap();
        assert_eq!(result.edges.len(), 2);

        let strict = LayoutEngine::new(EngineConfig {
            malformed_edges: MalformedEdgePolicy::Strict,
            ..EngineConfig::default()
        });
        match strict.layout(&broken, &LayoutRequest::new("layered")) {
            Err(LayoutError::MalformedGraph(issues)) => {
                assert!(matches!(&issues[0], GraphIssue::MissingTarget { node, .. } if node == "ghost"));
            }
            other => panic!("expected a malformed graph error, got {other:?}"),
        }
    }

    #[test]
    fn configured_defaults_apply_under_request_options() {
        let mut config = EngineConfig {
            default_algorithm: "force".to_string(),
            ..EngineConfig::default()
        };
        config
            .layout_options
            .insert("force".to_string(), [("iterations".to_string(), Value::from(-1))].into_iter().collect());
        let engine = LayoutEngine::new(config);
        assert!(!engine.validate(&LayoutRequest::default()).valid);
        assert!(engine.validate(&LayoutRequest::default().with_option("iterations", 50)).valid);
    }

    #[test]
    fn cancelled_runs_are_not_cached() {
        let engine = LayoutEngine::default();
        let mut session = engine.session();
        let cancel = || true;
        let ctx = LayoutContext::with_cancel(&cancel);
        let result = session
            .layout_with(&engine, &graph(), &LayoutRequest::new("force"), &ctx)
            .unwrap();
        assert!(!result.converged);
        assert!(result.cancelled);
        assert_eq!(session.stats().len, 0);
    }

    #[test]
    fn finished_runs_are_cached_even_if_the_deadline_passes_later() {
        let engine = LayoutEngine::default();
        let mut session = engine.session();
        let checks = std::cell::Cell::new(0);
        let expired = || {
            checks.set(checks.get() + 1);
            true
        };
        let ctx = LayoutContext::with_cancel(&expired);
        // Layered placement has no checkpoints, so the run always completes.
        let result = session
            .layout_with(&engine, &graph(), &LayoutRequest::new("layered"), &ctx)
            .unwrap();
        assert!(!result.cancelled);
        assert_eq!(checks.get(), 0);
        assert_eq!(session.stats().len, 1);
    }
}
