//! Engine response payloads.
//!
//! Deserialization targets for the engine's JSON responses. Queue entries
//! are positional arrays rather than objects, so [`QueueState`] keeps them
//! as raw values and digs the prompt id out by index.

use std::collections::BTreeMap;

use serde::Deserialize;
use serde_json::Value;

/// Response to a successful job submission.
#[derive(Debug, Clone, Deserialize)]
pub struct SubmitResponse {
    /// Engine-assigned id of the queued job.
    pub prompt_id: String,
    /// Position in the execution queue.
    #[serde(default)]
    pub number: Option<u64>,
    /// Per-node warnings the engine attached without rejecting the job.
    #[serde(default)]
    pub node_errors: Value,
}

/// Snapshot of the engine's execution queue.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct QueueState {
    /// Jobs currently executing.
    #[serde(default)]
    pub queue_running: Vec<Value>,
    /// Jobs waiting to execute.
    #[serde(default)]
    pub queue_pending: Vec<Value>,
}

impl QueueState {
    /// Whether a submission is still running or pending.
    ///
    /// Queue entries are positional arrays with the prompt id at index 1.
    pub fn contains(&self, prompt_id: &str) -> bool {
        self.queue_running
            .iter()
            .chain(self.queue_pending.iter())
            .any(|entry| entry.get(1).and_then(Value::as_str) == Some(prompt_id))
    }
}

/// History record of one finished submission.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct HistoryEntry {
    /// Produced assets, keyed by the terminal node's graph key.
    #[serde(default)]
    pub outputs: BTreeMap<String, NodeOutput>,
    /// Raw completion status block.
    #[serde(default)]
    pub status: Value,
}

/// Assets produced by one terminal node.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NodeOutput {
    /// Image assets.
    #[serde(default)]
    pub images: Vec<OutputAsset>,
    /// Mesh assets, listed by the engine under the `3d` key.
    #[serde(default, rename = "3d")]
    pub meshes: Vec<OutputAsset>,
}

impl NodeOutput {
    /// All downloadable assets of the node, images first.
    pub fn assets(&self) -> impl Iterator<Item = &OutputAsset> {
        self.images.iter().chain(self.meshes.iter())
    }
}

/// One downloadable asset.
#[derive(Debug, Clone, Deserialize)]
pub struct OutputAsset {
    /// Filename on the remote server.
    pub filename: String,
    /// Subfolder on the remote server; empty for the output root.
    #[serde(default)]
    pub subfolder: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_queue_contains_by_positional_id() {
        let state: QueueState = serde_json::from_str(
            r#"{
                "queue_running": [[0, "running-id", {}, {}, []]],
                "queue_pending": [[1, "pending-id", {}, {}, []]]
            }"#,
        )
        .expect("deserialization failed");

        assert!(state.contains("running-id"));
        assert!(state.contains("pending-id"));
        assert!(!state.contains("finished-id"));
    }

    #[test]
    fn test_empty_queue() {
        let state: QueueState = serde_json::from_str("{}").expect("deserialization failed");
        assert!(!state.contains("anything"));
    }

    #[test]
    fn test_history_entry_outputs() {
        let entry: HistoryEntry = serde_json::from_str(
            r#"{
                "outputs": {
                    "1_0": {
                        "images": [
                            {"filename": "out_00001_.png", "subfolder": "", "type": "output"}
                        ]
                    },
                    "2_0": {
                        "3d": [{"filename": "mesh_00001_.glb", "subfolder": "3d"}]
                    }
                },
                "status": {"completed": true}
            }"#,
        )
        .expect("deserialization failed");

        assert_eq!(entry.outputs["1_0"].images[0].filename, "out_00001_.png");
        let mesh = entry.outputs["2_0"].assets().next().expect("mesh asset");
        assert_eq!(mesh.filename, "mesh_00001_.glb");
        assert_eq!(mesh.subfolder, "3d");
    }
}
