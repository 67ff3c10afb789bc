//! Validation error reporting.
//!
//! When a submitted job graph is rejected, the engine answers with a
//! deeply nested JSON report keyed by node. The report itself carries no
//! node titles, so [`ValidationFailure`] maps its keys back through the
//! submitted graph to name each failing node by title, and renders a
//! flat, human-readable summary including, where the report carries
//! them, the values the engine would have accepted. The raw report is
//! kept for programmatic use.

use serde_json::Value;
use thiserror::Error;

use promptweave_graph::job::JobGraph;

/// A rejected job submission with its rendered summary.
#[derive(Debug, Clone, Error)]
#[error("{summary}")]
pub struct ValidationFailure {
    /// The engine's raw validation report.
    pub raw: Value,
    /// Human-readable, per-node summary of the report.
    pub summary: String,
}

impl ValidationFailure {
    /// Wrap a raw validation report, rendering its summary against the
    /// graph that was submitted.
    pub fn new(raw: Value, submitted: &JobGraph) -> Self {
        let summary = format_summary(&raw, submitted);
        Self { raw, summary }
    }
}

/// Render the engine's validation report into a flat summary.
fn format_summary(raw: &Value, submitted: &JobGraph) -> String {
    let mut lines = Vec::new();

    let message = raw
        .pointer("/error/message")
        .and_then(Value::as_str)
        .unwrap_or("Job graph failed validation");
    lines.push(message.to_string());

    if let Some(details) = raw.pointer("/error/details").and_then(Value::as_str) {
        if !details.is_empty() {
            lines.push(format!("  {details}"));
        }
    }

    if let Some(node_errors) = raw.get("node_errors").and_then(Value::as_object) {
        for (key, node) in node_errors {
            // prefer the title of the node that was submitted under this
            // key; the report only knows class types
            let label = submitted
                .get(key.as_str())
                .and_then(|node| node.meta.title.as_deref())
                .or_else(|| node.get("class_type").and_then(Value::as_str))
                .unwrap_or("unknown node");
            lines.push(format!("{label} (#{key}):"));

            let errors = node
                .get("errors")
                .and_then(Value::as_array)
                .map(Vec::as_slice)
                .unwrap_or_default();
            for error in errors {
                lines.push(format_node_error(error));
                if let Some(accepted) = accepted_values(error) {
                    lines.push(accepted);
                }
            }
        }
    }

    lines.join("\n")
}

/// Render one node-level error line.
fn format_node_error(error: &Value) -> String {
    let message = error
        .get("message")
        .and_then(Value::as_str)
        .unwrap_or("validation error");
    match error.get("details").and_then(Value::as_str) {
        Some(details) if !details.is_empty() => format!("  - {message}: {details}"),
        _ => format!("  - {message}"),
    }
}

/// For enumerated inputs, list what the engine would have accepted.
///
/// The accepted list sits at `extra_info.input_config[0]` of a
/// `value_not_in_list` error.
fn accepted_values(error: &Value) -> Option<String> {
    if error.get("type").and_then(Value::as_str) != Some("value_not_in_list") {
        return None;
    }
    let input_name = error
        .pointer("/extra_info/input_name")
        .and_then(Value::as_str)?;
    let accepted = error
        .pointer("/extra_info/input_config/0")
        .and_then(Value::as_array)?;

    let rendered: Vec<String> = accepted
        .iter()
        .map(|value| match value {
            Value::String(text) => text.clone(),
            other => other.to_string(),
        })
        .collect();
    Some(format!(
        "    accepted values for {input_name}: {}",
        rendered.join(", ")
    ))
}
