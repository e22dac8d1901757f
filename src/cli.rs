use std::collections::BTreeSet;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use clap::{Parser, ValueEnum};
use serde::Serialize;
use serde_json::Value;
use tracing_subscriber::EnvFilter;

use crate::adapter::{AdapterOptions, parse_document};
use crate::config::load_config;
use crate::engine::{LayoutEngine, LayoutRequest};
use crate::layout::{LayoutOptions, LayoutResult, ParamKind};
use crate::quality::{DiagramType, QualityReport, calculate_quality};

#[derive(Parser, Debug)]
#[command(name = "archviz-layout", version, about = "Lay out and score architecture diagrams")]
pub struct Args {
    /// Model or changeset JSON file, or '-' for stdin
    #[arg(short = 'i', long = "input")]
    pub input: Option<PathBuf>,

    /// Output file. Defaults to stdout.
    #[arg(short = 'o', long = "output")]
    pub output: Option<PathBuf>,

    /// Engine config file (JSON5)
    #[arg(short = 'c', long = "configFile")]
    pub config: Option<PathBuf>,

    /// Layout algorithm. Defaults to the configured one.
    #[arg(short = 'a', long = "algorithm")]
    pub algorithm: Option<String>,

    /// Algorithm option as name=value; the value is parsed as JSON when it can be
    #[arg(short = 'O', long = "option", value_parser = parse_option)]
    pub options: Vec<(String, Value)>,

    /// Zoom scalar for semantic zoom
    #[arg(short = 'z', long = "zoom")]
    pub zoom: Option<f32>,

    /// Only keep these model layers (repeatable)
    #[arg(short = 'l', long = "layer")]
    pub layers: Vec<String>,

    /// Use element positions from the model as pinned positions
    #[arg(long = "pinPositions")]
    pub pin_positions: bool,

    /// Leave edges unbundled
    #[arg(long = "noBundling")]
    pub no_bundling: bool,

    /// Also score the layout
    #[arg(short = 'q', long = "quality")]
    pub quality: bool,

    /// Diagram type recorded in the quality report
    #[arg(short = 'd', long = "diagramType", value_enum, default_value = "architecture")]
    pub diagram_type: DiagramArg,

    /// List algorithms and their options, then exit
    #[arg(long = "listAlgorithms")]
    pub list_algorithms: bool,

    /// Pretty-print JSON output
    #[arg(short = 'p', long = "pretty")]
    pub pretty: bool,
}

#[derive(ValueEnum, Debug, Clone, Copy)]
pub enum DiagramArg {
    Business,
    Motivation,
    C4,
    Changeset,
    Architecture,
}

impl From<DiagramArg> for DiagramType {
    fn from(value: DiagramArg) -> Self {
        match value {
            DiagramArg::Business => Self::Business,
            DiagramArg::Motivation => Self::Motivation,
            DiagramArg::C4 => Self::C4,
            DiagramArg::Changeset => Self::Changeset,
            DiagramArg::Architecture => Self::Architecture,
        }
    }
}

#[derive(Serialize)]
struct Output<'a> {
    layout: &'a LayoutResult,
    #[serde(skip_serializing_if = "Option::is_none")]
    quality: Option<QualityReport>,
}

fn parse_option(raw: &str) -> Result<(String, Value), String> {
    let (name, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected name=value, got `{raw}`"))?;
    let name = name.trim();
    if name.is_empty() {
        return Err(format!("missing option name in `{raw}`"));
    }
    let value = value.trim();
    let value = serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.to_string()));
    Ok((name.to_string(), value))
}

/// Installs the stderr log subscriber; `RUST_LOG` overrides the `warn` default.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .try_init();
}

pub fn run() -> Result<()> {
    init_tracing();
    let args = Args::parse();
    let config = load_config(args.config.as_deref())?;
    let engine = LayoutEngine::new(config);

    if args.list_algorithms {
        let listing = list_algorithms(&engine);
        return write_output(&listing, args.output.as_deref());
    }

    let input = read_input(args.input.as_deref())?;
    let adapter = AdapterOptions {
        layers: (!args.layers.is_empty()).then(|| args.layers.iter().cloned().collect::<BTreeSet<_>>()),
        pin_positions: args.pin_positions,
        ..AdapterOptions::default()
    };
    let graph = parse_document(&input, &adapter)?;

    let request = LayoutRequest {
        algorithm: args.algorithm.clone(),
        options: args.options.iter().cloned().collect::<LayoutOptions>(),
        zoom: args.zoom,
        skip_bundling: args.no_bundling,
    };
    let result = engine.layout(&graph, &request)?;
    let quality = args.quality.then(|| calculate_quality(&result, args.diagram_type.into()));

    let output = Output {
        layout: &result,
        quality,
    };
    let text = if args.pretty {
        serde_json::to_string_pretty(&output)?
    } else {
        serde_json::to_string(&output)?
    };
    write_output(&text, args.output.as_deref())
}

fn list_algorithms(engine: &LayoutEngine) -> String {
    let mut out = String::new();
    for name in engine.registry().names() {
        let Ok(algorithm) = engine.registry().get(name) else {
            continue;
        };
        out.push_str(name);
        if !algorithm.description().is_empty() {
            out.push_str(" - ");
            out.push_str(algorithm.description());
        }
        out.push('\n');
        for spec in algorithm.schema() {
            let detail = match spec.kind {
                ParamKind::Number { min, max, default } => format!("number in [{min}, {max}], default {default}"),
                ParamKind::Integer { min, max, default } => format!("integer in [{min}, {max}], default {default}"),
                ParamKind::Bool { default } => format!("boolean, default {default}"),
                ParamKind::Choice { allowed, default } => format!("one of {}, default {default}", allowed.join("|")),
            };
            out.push_str(&format!("  {:<18} {detail}  {}\n", spec.name, spec.description));
        }
    }
    out
}

fn read_input(path: Option<&Path>) -> Result<String> {
    if let Some(path) = path
        && path != Path::new("-")
    {
        return std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()));
    }
    let mut buf = String::new();
    io::stdin().read_to_string(&mut buf)?;
    if buf.trim().is_empty() {
        return Err(anyhow!("no input: pass --input or pipe a model on stdin"));
    }
    Ok(buf)
}

fn write_output(text: &str, path: Option<&Path>) -> Result<()> {
    match path {
        Some(path) => std::fs::write(path, text).with_context(|| format!("writing {}", path.display())),
        None => {
            let mut stdout = io::stdout().lock();
            stdout.write_all(text.as_bytes())?;
            if !text.ends_with('\n') {
                stdout.write_all(b"\n")?;
            }
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn options_parse_as_json_or_fall_back_to_strings() {
        assert_eq!(parse_option("iterations=50").unwrap(), ("iterations".to_string(), Value::from(50)));
        assert_eq!(parse_option("simulate=false").unwrap().1, Value::Bool(false));
        assert_eq!(parse_option("direction=LR").unwrap().1, Value::from("LR"));
        assert!(parse_option("direction").is_err());
        assert!(parse_option("=3").is_err());
    }

    #[test]
    fn listing_covers_every_algorithm() {
        let listing = list_algorithms(&LayoutEngine::default());
        for name in ["force", "hierarchical", "layered", "matrix", "orthogonal", "stress"] {
            assert!(listing.lines().any(|line| line.starts_with(name)), "{name} missing");
        }
        assert!(listing.contains("cell_gap"));
    }

    #[test]
    fn args_accept_repeated_options() {
        let args = Args::try_parse_from(["archviz-layout", "-a", "force", "-O", "seed=7", "-O", "iterations=40", "-q"])
            .unwrap();
        assert_eq!(args.options.len(), 2);
        assert!(args.quality);
        assert!(matches!(args.diagram_type, DiagramArg::Architecture));
    }
}
