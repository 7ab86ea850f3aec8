//! Deterministic rendering of a tool result into user-facing text.
//!
//! Used when rephrasing is disabled or the model fails to phrase the result.
//! Always returns non-empty text.

use serde_json::{Map, Value};

use crate::domain::ToolInvocationResult;

/// Longest list of rows rendered before truncating
const MAX_ROWS: usize = 20;

pub fn render_result(tool_name: &str, result: &ToolInvocationResult) -> String {
    match result {
        ToolInvocationResult::Success { payload } => render_payload(tool_name, payload),
        ToolInvocationResult::Failure(failure) => {
            format!("Sorry, '{}' could not be completed ({}): {}", tool_name, failure.kind, failure.message)
        }
    }
}

fn render_payload(tool_name: &str, payload: &Value) -> String {
    match payload {
        Value::Null => format!("'{}' completed with no output.", tool_name),
        Value::String(s) if s.trim().is_empty() => format!("'{}' returned an empty result.", tool_name),
        Value::String(s) => format!("Result of '{}': {}", tool_name, s),
        Value::Bool(_) | Value::Number(_) => format!("Result of '{}': {}", tool_name, payload),
        Value::Array(rows) if rows.is_empty() => format!("'{}' returned no rows.", tool_name),
        Value::Array(rows) => {
            let mut out = format!("Result of '{}' ({} rows):", tool_name, rows.len());
            for row in rows.iter().take(MAX_ROWS) {
                out.push_str("\n- ");
                out.push_str(&render_inline(row));
            }
            if rows.len() > MAX_ROWS {
                out.push_str(&format!("\n... {} more", rows.len() - MAX_ROWS));
            }
            out
        }
        Value::Object(map) if map.is_empty() => format!("'{}' completed with no output.", tool_name),
        Value::Object(map) => format!("Result of '{}': {}", tool_name, render_object(map)),
    }
}

fn render_inline(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Object(map) => render_object(map),
        other => other.to_string(),
    }
}

fn render_object(map: &Map<String, Value>) -> String {
    map.iter()
        .map(|(k, v)| format!("{}: {}", k, render_inline(v)))
        .collect::<Vec<_>>()
        .join(", ")
}
