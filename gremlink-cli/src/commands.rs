//! Command execution.

use crate::Commands;
use colored::Colorize;
use gremlink_client::model::strip_types;
use gremlink_client::{Client, Literal, ResultFrames};
use gremlink_protocol::Bindings;
use serde_json::Value;
use std::collections::HashMap;

/// Executes a command and returns the formatted output.
pub async fn execute(
    client: &Client,
    cmd: Commands,
    raw: bool,
) -> Result<String, Box<dyn std::error::Error>> {
    match cmd {
        Commands::Repl => Err("repl cannot run as a one-shot command".into()),

        Commands::Query { script, bindings } => {
            let script = read_arg(&script)?;
            let bindings = match bindings {
                Some(arg) => parse_bindings(&arg)?,
                None => Bindings::new(),
            };
            let frames = client
                .execute_with_bindings(&script, bindings, HashMap::new())
                .await?;
            format_frames(&frames, raw)
        }

        Commands::Count { script } => {
            let count = client.get_count(&script).await?;
            Ok(count.to_string())
        }

        Commands::Vertices { script } => {
            let vertices = client.get_vertices(&script).await?;
            if vertices.is_empty() {
                return Ok("No vertices".yellow().to_string());
            }
            Ok(format_json(&serde_json::to_value(&vertices)?))
        }

        Commands::Edges { script } => {
            let edges = client.get_edges(&script).await?;
            if edges.is_empty() {
                return Ok("No edges".yellow().to_string());
            }
            Ok(format_json(&serde_json::to_value(&edges)?))
        }

        Commands::AddVertex { label, properties } => {
            let properties = parse_properties(&properties)?;
            let vertex = client.add_vertex(&label, &properties).await?;
            Ok(format!(
                "{} vertex {} ({})",
                "Created".green(),
                vertex.id.to_string().cyan(),
                vertex.label
            ))
        }

        Commands::AddEdge {
            label,
            from,
            to,
            properties,
        } => {
            let properties = parse_properties(&properties)?;
            let edge = client
                .add_edge(&label, parse_literal(&from), parse_literal(&to), &properties)
                .await?;
            Ok(format!(
                "{} edge {} ({}: {} -> {})",
                "Created".green(),
                edge.id.to_string().cyan(),
                edge.label,
                edge.out_v,
                edge.in_v
            ))
        }

        Commands::DropVertex { id } => {
            client.drop_vertex(parse_literal(&id)).await?;
            Ok(format!("{} vertex {}", "Dropped".green(), id.cyan()))
        }

        Commands::DropEdge { id } => {
            client.drop_edge(parse_literal(&id)).await?;
            Ok(format!("{} edge {}", "Dropped".green(), id.cyan()))
        }
    }
}

/// Reads an argument inline or from `@file`.
pub fn read_arg(arg: &str) -> Result<String, Box<dyn std::error::Error>> {
    match arg.strip_prefix('@') {
        Some(path) => Ok(std::fs::read_to_string(path)?),
        None => Ok(arg.to_string()),
    }
}

/// Parses a JSON object argument (either inline JSON or @file.json).
pub fn parse_bindings(arg: &str) -> Result<Bindings, Box<dyn std::error::Error>> {
    match serde_json::from_str::<Value>(&read_arg(arg)?)? {
        Value::Object(map) => Ok(map.into_iter().collect()),
        _ => Err("bindings must be a JSON object".into()),
    }
}

/// Interprets a command-line value as an integer, float, boolean or string.
pub fn parse_literal(value: &str) -> Literal {
    if let Ok(n) = value.parse::<i64>() {
        Literal::Int(n)
    } else if let Ok(x) = value.parse::<f64>() {
        Literal::Float(x)
    } else if let Ok(b) = value.parse::<bool>() {
        Literal::Bool(b)
    } else {
        Literal::Str(value.to_string())
    }
}

/// Turns `key=value` arguments into a flat key/value list.
pub fn parse_properties(args: &[String]) -> Result<Vec<Literal>, Box<dyn std::error::Error>> {
    let mut out = Vec::with_capacity(args.len() * 2);
    for arg in args {
        let (key, value) = arg
            .split_once('=')
            .ok_or_else(|| format!("property '{}' is not key=value", arg))?;
        out.push(Literal::from(key));
        out.push(parse_literal(value));
    }
    Ok(out)
}

/// Formats result frames, one JSON document per frame.
pub fn format_frames(frames: &ResultFrames, raw: bool) -> Result<String, Box<dyn std::error::Error>> {
    if frames.is_empty() {
        return Ok("No results".yellow().to_string());
    }
    let mut output = Vec::with_capacity(frames.len());
    for frame in frames {
        let value: Value = serde_json::from_slice(frame)?;
        let value = if raw { value } else { strip_types(value) };
        output.push(format_json(&value));
    }
    Ok(output.join("\n"))
}

/// Formats JSON for display.
pub fn format_json(value: &Value) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
}
