//! Parameter substitution.
//!
//! Applies the flattened override map onto the merged job graph. String
//! values support two special forms: deferred upload references (the
//! remote filename of an upload is only known after fragment building) and
//! `@{{name}}` context-variable interpolation.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;

use crate::error::{CompileError, CompileResult};
use crate::host::HostGraph;
use crate::job::JobGraph;
use crate::merge::OverrideMap;
use crate::resolve::{resolve, ResolvedSource};
use crate::upload::UploadSet;

/// Sentinel prefix of a deferred upload reference; the remainder is
/// `<hostPath>:<inputIndex>`.
pub const UPLOAD_REF_PREFIX: &str = ":#:inputfrom:#:";

static VAR_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"@\{\{(.*?)\}\}").expect("valid pattern"));

/// Applies literal and wire overrides onto the merged graph in place.
pub fn apply_overrides<G: HostGraph>(
    graph: &G,
    job_graph: &mut JobGraph,
    overrides: &OverrideMap,
    uploads: &UploadSet,
    context_vars: &BTreeMap<String, Value>,
) -> CompileResult<()> {
    for (key, inputs) in overrides {
        for (input_name, value) in inputs {
            let value = match value {
                Value::String(text) => {
                    Value::from(expand_value(graph, text, uploads, context_vars)?)
                }
                other => other.clone(),
            };
            let node = job_graph
                .get_mut(key)
                .ok_or_else(|| CompileError::BrokenWire { key: key.clone() })?;
            node.inputs.insert(input_name.clone(), value);
        }
    }
    Ok(())
}

/// Resolves the special string forms of an override value.
fn expand_value<G: HostGraph>(
    graph: &G,
    text: &str,
    uploads: &UploadSet,
    context_vars: &BTreeMap<String, Value>,
) -> CompileResult<String> {
    let Some(reference) = text.strip_prefix(UPLOAD_REF_PREFIX) else {
        return interpolate(text, context_vars);
    };

    let (path, input) = reference
        .rsplit_once(':')
        .ok_or_else(|| CompileError::BadUploadReference {
            reference: reference.to_string(),
        })?;
    let input: usize = input
        .parse()
        .map_err(|_| CompileError::BadUploadReference {
            reference: reference.to_string(),
        })?;
    let unresolved = || CompileError::UnresolvedUploadReference {
        path: path.to_string(),
        input,
    };

    let node = graph.node_at_path(path).ok_or_else(unresolved)?;
    let Some(ResolvedSource::Raw {
        node: source,
        output,
        ..
    }) = resolve(graph, node, input)
    else {
        return Err(unresolved());
    };

    let frame = graph.frame();
    uploads
        .iter()
        .find(|(key, _)| key.node == source && key.output == output && key.context.frame == frame)
        .map(|(_, record)| record.remote_name.clone())
        .ok_or_else(unresolved)
}

/// Substitutes every `@{{name}}` placeholder from the context variables.
fn interpolate(text: &str, context_vars: &BTreeMap<String, Value>) -> CompileResult<String> {
    let mut result = String::with_capacity(text.len());
    let mut last = 0;
    for captures in VAR_PATTERN.captures_iter(text) {
        let whole = captures.get(0).expect("group 0 always present");
        let name = &captures[1];
        let value = context_vars
            .get(name)
            .ok_or_else(|| CompileError::VariableNotFound {
                name: name.to_string(),
            })?;
        result.push_str(&text[last..whole.start()]);
        result.push_str(&render(value));
        last = whole.end();
    }
    result.push_str(&text[last..]);
    Ok(result)
}

/// Renders a context variable into its substituted text.
fn render(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}
