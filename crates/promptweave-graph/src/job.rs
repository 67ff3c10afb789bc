//! Job graph data model.
//!
//! The flat JSON structure submitted to the remote engine: a mapping from
//! string key to job node, where every node carries a class type, an input
//! map and optional metadata. An input value that is a two-element
//! `[key, output]` array is a wire reference to another node in the same
//! graph.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{CompileError, CompileResult};

/// Globally unique key of a node within a [`JobGraph`].
pub type NodeKey = String;

/// The flattened job graph submitted to the remote engine.
pub type JobGraph = BTreeMap<NodeKey, JobNode>;

/// Metadata attached to a job node.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JobMeta {
    /// Human-readable node title.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Output-slot position stamped on save nodes, used to recover slot
    /// ordering after flattening.
    #[serde(rename = "_sort_order", skip_serializing_if = "Option::is_none")]
    pub sort_order: Option<usize>,
}

impl JobMeta {
    /// Returns whether no metadata is set.
    pub fn is_empty(&self) -> bool {
        self.title.is_none() && self.sort_order.is_none()
    }
}

/// One node of the job graph.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JobNode {
    /// Engine-side class implementing this node.
    pub class_type: String,
    /// Input values: scalars or `[key, output]` wire references.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub inputs: BTreeMap<String, Value>,
    /// Node metadata.
    #[serde(rename = "_meta", default, skip_serializing_if = "JobMeta::is_empty")]
    pub meta: JobMeta,
}

impl JobNode {
    /// Creates a node with the given class type and title.
    pub fn new(class_type: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            class_type: class_type.into(),
            inputs: BTreeMap::new(),
            meta: JobMeta {
                title: Some(title.into()),
                sort_order: None,
            },
        }
    }

    /// Sets an input value.
    pub fn with_input(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.inputs.insert(name.into(), value.into());
        self
    }

    /// Stamps the output-slot position.
    pub fn with_sort_order(mut self, sort_order: usize) -> Self {
        self.meta.sort_order = Some(sort_order);
        self
    }
}

/// Interprets an input value as a wire reference, if it is one.
pub fn as_link(value: &Value) -> Option<(&str, u64)> {
    let items = value.as_array()?;
    if items.len() != 2 {
        return None;
    }
    Some((items[0].as_str()?, items[1].as_u64()?))
}

/// Builds a wire-reference input value.
pub fn link(key: impl Into<String>, output: u64) -> Value {
    Value::Array(vec![Value::from(key.into()), Value::from(output)])
}

/// Finds the key of the template node carrying the given title.
pub fn title_to_key(graph: &BTreeMap<String, JobNode>, title: &str) -> CompileResult<NodeKey> {
    graph
        .iter()
        .find(|(_, node)| node.meta.title.as_deref() == Some(title))
        .map(|(key, _)| key.clone())
        .ok_or_else(|| CompileError::TitleNotFound {
            title: title.to_string(),
        })
}
