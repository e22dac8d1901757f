use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, bail};
use serde::{Deserialize, Serialize};

use crate::bundling::BundlingConfig;
use crate::cache::DEFAULT_CACHE_CAPACITY;
use crate::layout::LayoutOptions;
use crate::zoom::ZoomConfig;

/// What to do with edges whose endpoints are missing or whose ids repeat.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MalformedEdgePolicy {
    /// Drop the offending edges with a warning and lay out the rest.
    #[default]
    Lenient,
    /// Reject the whole graph.
    Strict,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EngineConfig {
    pub default_algorithm: String,
    pub cache_capacity: usize,
    pub malformed_edges: MalformedEdgePolicy,
    /// Per-algorithm options applied under every request's own options.
    pub layout_options: BTreeMap<String, LayoutOptions>,
    pub zoom: ZoomConfig,
    pub bundling: BundlingConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_algorithm: "matrix".to_string(),
            cache_capacity: DEFAULT_CACHE_CAPACITY,
            malformed_edges: MalformedEdgePolicy::default(),
            layout_options: BTreeMap::new(),
            zoom: ZoomConfig::default(),
            bundling: BundlingConfig::default(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ZoomConfigFile {
    overview_below: Option<f32>,
    medium_below: Option<f32>,
    overview_types: Option<Vec<String>>,
    medium_types: Option<Vec<String>>,
    detail_types: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BundlingConfigFile {
    enabled: Option<bool>,
    min_threshold: Option<usize>,
    per_node: Option<f32>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ConfigFile {
    default_algorithm: Option<String>,
    cache_capacity: Option<usize>,
    malformed_edges: Option<MalformedEdgePolicy>,
    layout_options: Option<BTreeMap<String, LayoutOptions>>,
    zoom: Option<ZoomConfigFile>,
    bundling: Option<BundlingConfigFile>,
}

/// Reads a JSON5 config file and overlays it on the defaults. Every key is
/// optional; `None` yields the defaults untouched.
pub fn load_config(path: Option<&Path>) -> anyhow::Result<EngineConfig> {
    let Some(path) = path else {
        return Ok(EngineConfig::default());
    };
    let contents = std::fs::read_to_string(path).with_context(|| format!("reading config {}", path.display()))?;
    parse_config(&contents).with_context(|| format!("loading config {}", path.display()))
}

pub fn parse_config(contents: &str) -> anyhow::Result<EngineConfig> {
    let mut config = EngineConfig::default();
    let parsed: ConfigFile = json5::from_str(contents)?;

    if let Some(v) = parsed.default_algorithm {
        config.default_algorithm = v;
    }
    if let Some(v) = parsed.cache_capacity {
        if v == 0 {
            bail!("cacheCapacity must be at least 1");
        }
        config.cache_capacity = v;
    }
    if let Some(v) = parsed.malformed_edges {
        config.malformed_edges = v;
    }
    if let Some(v) = parsed.layout_options {
        config.layout_options = v;
    }

    if let Some(zoom) = parsed.zoom {
        if let Some(v) = zoom.overview_below {
            config.zoom.overview_below = v;
        }
        if let Some(v) = zoom.medium_below {
            config.zoom.medium_below = v;
        }
        if let Some(v) = zoom.overview_types {
            config.zoom.overview_types = v;
        }
        if let Some(v) = zoom.medium_types {
            config.zoom.medium_types = v;
        }
        if let Some(v) = zoom.detail_types {
            config.zoom.detail_types = v;
        }
        let (low, high) = (config.zoom.overview_below, config.zoom.medium_below);
        if !low.is_finite() || !high.is_finite() || low > high {
            bail!("zoom thresholds must be finite with overviewBelow <= mediumBelow (got {low} and {high})");
        }
    }

    if let Some(bundling) = parsed.bundling {
        if let Some(v) = bundling.enabled {
            config.bundling.enabled = v;
        }
        if let Some(v) = bundling.min_threshold {
            config.bundling.min_threshold = v;
        }
        if let Some(v) = bundling.per_node {
            if !v.is_finite() || v < 0.0 {
                bail!("bundling.perNode must be a non-negative number (got {v})");
            }
            config.bundling.per_node = v;
        }
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_path_yields_defaults() {
        let config = load_config(None).unwrap();
        assert_eq!(config, EngineConfig::default());
        assert_eq!(config.cache_capacity, 10);
        assert_eq!(config.malformed_edges, MalformedEdgePolicy::Lenient);
    }

    #[test]
    fn json5_overlay_keeps_unset_fields() {
        let config = parse_config(
            r#"{
                // comments and trailing commas are fine
                defaultAlgorithm: "force",
                malformedEdges: "strict",
                zoom: { mediumBelow: 0.9 },
                bundling: { perNode: 2.0, },
                layoutOptions: { force: { seed: 7 } },
            }"#,
        )
        .unwrap();
        assert_eq!(config.default_algorithm, "force");
        assert_eq!(config.malformed_edges, MalformedEdgePolicy::Strict);
        assert_eq!(config.zoom.medium_below, 0.9);
        assert_eq!(config.zoom.overview_below, 0.4);
        assert_eq!(config.bundling.per_node, 2.0);
        assert_eq!(config.bundling.min_threshold, 20);
        assert_eq!(config.cache_capacity, 10);
        assert_eq!(config.layout_options["force"]["seed"].as_f64(), Some(7.0));
    }

    #[test]
    fn inconsistent_values_are_rejected() {
        assert!(parse_config("{ zoom: { overviewBelow: 0.9, mediumBelow: 0.5 } }").is_err());
        assert!(parse_config("{ cacheCapacity: 0 }").is_err());
        assert!(parse_config("{ malformedEdges: \"sometimes\" }").is_err());
    }

    #[test]
    fn unreadable_file_names_the_path() {
        let err = load_config(Some(Path::new("/nonexistent/archviz.json5"))).unwrap_err();
        assert!(format!("{err:#}").contains("/nonexistent/archviz.json5"));
    }
}
