use std::collections::BTreeMap;
use std::fmt::Write as _;

use serde_json::Value;

use crate::error::ParamViolation;
use crate::ir::Direction;

/// Named option dictionary supplied by the caller, e.g. `{"direction": "LR"}`.
pub type LayoutOptions = BTreeMap<String, Value>;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ParamKind {
    Number { min: f64, max: f64, default: f64 },
    Integer { min: i64, max: i64, default: i64 },
    Bool { default: bool },
    Choice {
        allowed: &'static [&'static str],
        default: &'static str,
    },
}

/// One entry of an algorithm's parameter schema.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParamSpec {
    pub name: &'static str,
    pub kind: ParamKind,
    pub description: &'static str,
}

impl ParamSpec {
    pub const fn number(name: &'static str, min: f64, max: f64, default: f64, description: &'static str) -> Self {
        Self {
            name,
            kind: ParamKind::Number { min, max, default },
            description,
        }
    }

    pub const fn integer(name: &'static str, min: i64, max: i64, default: i64, description: &'static str) -> Self {
        Self {
            name,
            kind: ParamKind::Integer { min, max, default },
            description,
        }
    }

    pub const fn flag(name: &'static str, default: bool, description: &'static str) -> Self {
        Self {
            name,
            kind: ParamKind::Bool { default },
            description,
        }
    }

    pub const fn choice(
        name: &'static str,
        allowed: &'static [&'static str],
        default: &'static str,
        description: &'static str,
    ) -> Self {
        Self {
            name,
            kind: ParamKind::Choice { allowed, default },
            description,
        }
    }

    fn check(&self, value: &Value) -> Option<ParamViolation> {
        let option = self.name.to_string();
        match self.kind {
            ParamKind::Number { min, max, .. } => {
                let Some(v) = value.as_f64() else {
                    return Some(ParamViolation::WrongType {
                        option,
                        expected: "a number",
                    });
                };
                if !v.is_finite() || v < min || v > max {
                    return Some(ParamViolation::OutOfRange {
                        option,
                        value: v,
                        min,
                        max,
                    });
                }
                None
            }
            ParamKind::Integer { min, max, .. } => {
                let Some(v) = integral(value) else {
                    return Some(ParamViolation::WrongType {
                        option,
                        expected: "an integer",
                    });
                };
                if v < min || v > max {
                    return Some(ParamViolation::OutOfRange {
                        option,
                        value: v as f64,
                        min: min as f64,
                        max: max as f64,
                    });
                }
                None
            }
            ParamKind::Bool { .. } => {
                if value.is_boolean() {
                    None
                } else {
                    Some(ParamViolation::WrongType {
                        option,
                        expected: "a boolean",
                    })
                }
            }
            ParamKind::Choice { allowed, .. } => {
                let Some(v) = value.as_str() else {
                    return Some(ParamViolation::WrongType {
                        option,
                        expected: "a string",
                    });
                };
                if allowed.contains(&v) {
                    None
                } else {
                    Some(ParamViolation::InvalidChoice {
                        option,
                        value: v.to_string(),
                        allowed: allowed.to_vec(),
                    })
                }
            }
        }
    }
}

/// Integer view of a JSON number; `7.0` counts, `7.5` does not.
fn integral(value: &Value) -> Option<i64> {
    value.as_i64().or_else(|| {
        value
            .as_f64()
            .filter(|v| v.is_finite() && v.fract() == 0.0 && v.abs() < i64::MAX as f64)
            .map(|v| v as i64)
    })
}

/// Checks every supplied option against `schema` and returns all violations.
pub fn validate_options(algorithm: &str, schema: &[ParamSpec], options: &LayoutOptions) -> Vec<ParamViolation> {
    let mut violations = Vec::new();
    for (name, value) in options {
        match schema.iter().find(|spec| spec.name == name) {
            Some(spec) => violations.extend(spec.check(value)),
            None => violations.push(ParamViolation::UnknownOption {
                algorithm: algorithm.to_string(),
                option: name.clone(),
            }),
        }
    }
    violations
}

/// Validated options with schema defaults filled in.
#[derive(Debug, Clone, Copy)]
pub struct ResolvedParams<'a> {
    schema: &'a [ParamSpec],
    options: &'a LayoutOptions,
}

impl<'a> ResolvedParams<'a> {
    pub fn new(schema: &'a [ParamSpec], options: &'a LayoutOptions) -> Self {
        Self { schema, options }
    }

    fn spec(&self, name: &str) -> Option<&'a ParamSpec> {
        self.schema.iter().find(|spec| spec.name == name)
    }

    pub fn number(&self, name: &str) -> f32 {
        let Some(spec) = self.spec(name) else {
            return 0.0;
        };
        let fallback = match spec.kind {
            ParamKind::Number { default, .. } => default,
            ParamKind::Integer { default, .. } => default as f64,
            _ => 0.0,
        };
        self.options
            .get(name)
            .and_then(Value::as_f64)
            .filter(|v| v.is_finite())
            .unwrap_or(fallback) as f32
    }

    pub fn integer(&self, name: &str) -> i64 {
        let Some(spec) = self.spec(name) else {
            return 0;
        };
        let fallback = match spec.kind {
            ParamKind::Integer { default, .. } => default,
            ParamKind::Number { default, .. } => default as i64,
            _ => 0,
        };
        self.options.get(name).and_then(integral).unwrap_or(fallback)
    }

    pub fn count(&self, name: &str) -> usize {
        self.integer(name).max(0) as usize
    }

    pub fn flag(&self, name: &str) -> bool {
        let fallback = match self.spec(name).map(|spec| spec.kind) {
            Some(ParamKind::Bool { default }) => default,
            _ => false,
        };
        self.options.get(name).and_then(Value::as_bool).unwrap_or(fallback)
    }

    pub fn choice(&self, name: &str) -> &'a str {
        let Some(spec) = self.spec(name) else {
            return "";
        };
        let ParamKind::Choice { allowed, default } = spec.kind else {
            return "";
        };
        match self.options.get(name).and_then(Value::as_str) {
            Some(value) => allowed.iter().copied().find(|a| *a == value).unwrap_or(default),
            None => default,
        }
    }

    pub fn direction(&self) -> Direction {
        Direction::from_token(self.choice("direction")).unwrap_or(Direction::TopDown)
    }

    pub fn routing(&self) -> RoutingStyle {
        match self.choice("routing") {
            "orthogonal" => RoutingStyle::Orthogonal,
            _ => RoutingStyle::Straight,
        }
    }

    /// Stable `name=value` listing of every schema entry, defaults included.
    /// Two option maps that resolve to the same parameters yield the same string.
    pub fn canonical(&self) -> String {
        let mut out = String::new();
        for spec in self.schema {
            if !out.is_empty() {
                out.push(';');
            }
            let _ = match spec.kind {
                ParamKind::Number { .. } => write!(out, "{}={}", spec.name, self.number(spec.name)),
                ParamKind::Integer { .. } => write!(out, "{}={}", spec.name, self.integer(spec.name)),
                ParamKind::Bool { .. } => write!(out, "{}={}", spec.name, self.flag(spec.name)),
                ParamKind::Choice { .. } => write!(out, "{}={}", spec.name, self.choice(spec.name)),
            };
        }
        out
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoutingStyle {
    Straight,
    Orthogonal,
}

pub(crate) const DIRECTIONS: &[&str] = &["TB", "BT", "LR", "RL"];
pub(crate) const ROUTING_STYLES: &[&str] = &["straight", "orthogonal"];
