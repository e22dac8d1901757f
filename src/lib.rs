//! Layout and quality engine for interactive architecture diagrams.
//!
//! Graphs come from [`adapter`], are laid out by one of the algorithms in
//! [`layout`] through an [`engine::LayoutEngine`], and can be scored with
//! [`quality`].

pub mod adapter;
pub mod bundling;
pub mod cache;
#[cfg(feature = "cli")]
pub mod cli;
pub mod config;
pub mod engine;
pub mod error;
pub mod ir;
pub mod layout;
pub mod quality;
pub mod zoom;

#[cfg(feature = "cli")]
pub use cli::run;
pub use config::{EngineConfig, MalformedEdgePolicy, load_config};
pub use engine::{LayoutEngine, LayoutRequest, LayoutSession};
pub use error::{AdapterError, GraphIssue, LayoutError, ParamViolation};
pub use ir::{Direction, Edge, Graph, Node};
pub use layout::{LayoutAlgorithm, LayoutContext, LayoutOptions, LayoutRegistry, LayoutResult};
pub use quality::{DiagramType, QualityReport, calculate_quality, compare_reports};
