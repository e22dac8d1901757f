use std::fmt;

use thiserror::Error;

/// Structural problem found while validating a [`crate::ir::Graph`].
#[derive(Debug, Clone, PartialEq, Error)]
pub enum GraphIssue {
    #[error("duplicate node id `{0}`")]
    DuplicateNode(String),
    #[error("duplicate edge id `{0}`")]
    DuplicateEdge(String),
    #[error("edge `{edge}` references missing source node `{node}`")]
    MissingSource { edge: String, node: String },
    #[error("edge `{edge}` references missing target node `{node}`")]
    MissingTarget { edge: String, node: String },
    #[error("node `{node}` has invalid size {width}x{height}")]
    InvalidSize { node: String, width: f32, height: f32 },
}

/// A single rejected layout option.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ParamViolation {
    #[error("unknown layout algorithm `{name}` (known: {})", known.join(", "))]
    UnknownAlgorithm { name: String, known: Vec<String> },
    #[error("`{algorithm}` does not recognize option `{option}`")]
    UnknownOption { algorithm: String, option: String },
    #[error("option `{option}` must be {expected}")]
    WrongType { option: String, expected: &'static str },
    #[error("option `{option}` = {value} is outside [{min}, {max}]")]
    OutOfRange {
        option: String,
        value: f64,
        min: f64,
        max: f64,
    },
    #[error("option `{option}` = `{value}` is not one of: {}", allowed.join(", "))]
    InvalidChoice {
        option: String,
        value: String,
        allowed: Vec<&'static str>,
    },
}

impl ParamViolation {
    pub fn option(&self) -> Option<&str> {
        match self {
            Self::UnknownAlgorithm { .. } => None,
            Self::UnknownOption { option, .. }
            | Self::WrongType { option, .. }
            | Self::OutOfRange { option, .. }
            | Self::InvalidChoice { option, .. } => Some(option),
        }
    }
}

#[derive(Debug, Error)]
pub enum LayoutError {
    #[error("unknown layout algorithm `{0}`")]
    UnknownAlgorithm(String),
    #[error("invalid layout parameters: {}", Joined(.0))]
    InvalidParameters(Vec<ParamViolation>),
    #[error("malformed graph: {}", Joined(.0))]
    MalformedGraph(Vec<GraphIssue>),
}

/// Failure turning an external model document into a [`crate::ir::Graph`].
#[derive(Debug, Error)]
pub enum AdapterError {
    #[error("failed to parse model JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("model element rejected: {0}")]
    Graph(#[from] GraphIssue),
    #[error("layer `{0}` is not present in the model")]
    UnknownLayer(String),
}

struct Joined<'a, T>(&'a [T]);

impl<T: fmt::Display> fmt::Display for Joined<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (idx, item) in self.0.iter().enumerate() {
            if idx > 0 {
                f.write_str("; ")?;
            }
            write!(f, "{item}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_parameters_lists_every_violation() {
        let err = LayoutError::InvalidParameters(vec![
            ParamViolation::UnknownOption {
                algorithm: "force".to_string(),
                option: "gravity".to_string(),
            },
            ParamViolation::OutOfRange {
                option: "iterations".to_string(),
                value: -1.0,
                min: 1.0,
                max: 5000.0,
            },
        ]);
        let text = err.to_string();
        assert!(text.contains("gravity"));
        assert!(text.contains("iterations"));
        assert!(text.contains("; "));
    }
}
