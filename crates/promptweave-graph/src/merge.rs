//! Fragment merging.
//!
//! Every fragment's local keys are renamed to `"{offset}_{localKey}"`
//! using a sequential per-fragment offset, which makes collisions
//! impossible by construction. After all fragments are renamed and
//! flattened into one job graph, wire inputs are resolved through the
//! producing fragment's already-renamed outputs map; merging strictly
//! precedes that lookup.

use std::collections::BTreeMap;

use serde_json::Value;

use crate::error::{CompileError, CompileResult};
use crate::fragment::FragmentSet;
use crate::job::{as_link, link, JobGraph, NodeKey};

/// Flattened parameter overrides: global key to input name to value,
/// where a value is either a scalar or a `[producerKey, output]` wire.
pub type OverrideMap = BTreeMap<NodeKey, BTreeMap<String, Value>>;

/// Merges all fragments into one job graph plus the flattened override
/// map. Fragment-local keys are rewritten in place, so fragments read
/// after this call see their renamed keys.
pub fn merge_fragments(set: &mut FragmentSet) -> CompileResult<(JobGraph, OverrideMap)> {
    let ids = set.order().to_vec();

    let mut merged = JobGraph::new();
    for (offset, id) in ids.iter().enumerate() {
        let fragment = set
            .get_mut(id)
            .ok_or_else(|| CompileError::Internal(format!("fragment {id} disappeared")))?;

        let mapping: BTreeMap<String, String> = fragment
            .subgraph
            .keys()
            .map(|key| (key.clone(), format!("{offset}_{key}")))
            .collect();
        let renamed_key = |key: &str| -> CompileResult<String> {
            mapping
                .get(key)
                .cloned()
                .ok_or_else(|| CompileError::BrokenWire {
                    key: key.to_string(),
                })
        };

        let mut renamed = BTreeMap::new();
        for (key, mut node) in std::mem::take(&mut fragment.subgraph) {
            // internal wires must point at the renamed keys
            for value in node.inputs.values_mut() {
                if let Some((target, output)) = as_link(value) {
                    *value = link(renamed_key(target)?, output);
                }
            }
            renamed.insert(renamed_key(&key)?, node);
        }

        fragment.outputs = std::mem::take(&mut fragment.outputs)
            .into_iter()
            .map(|(index, (key, output))| Ok((index, (renamed_key(&key)?, output))))
            .collect::<CompileResult<_>>()?;
        fragment.inputs = std::mem::take(&mut fragment.inputs)
            .into_iter()
            .map(|((key, input), source)| Ok(((renamed_key(&key)?, input), source)))
            .collect::<CompileResult<_>>()?;
        fragment.literals = std::mem::take(&mut fragment.literals)
            .into_iter()
            .map(|((key, input), value)| Ok(((renamed_key(&key)?, input), value)))
            .collect::<CompileResult<_>>()?;

        merged.extend(renamed.clone());
        fragment.subgraph = renamed;
    }

    // all fragments are renamed; producer outputs can now be looked up
    let mut overrides = OverrideMap::new();
    for id in &ids {
        let fragment = set
            .get(id)
            .ok_or_else(|| CompileError::Internal(format!("fragment {id} disappeared")))?;
        for ((key, input), value) in &fragment.literals {
            overrides
                .entry(key.clone())
                .or_default()
                .insert(input.clone(), value.clone());
        }
        for ((key, input), (producer, output)) in &fragment.inputs {
            let producer_fragment =
                set.get(producer)
                    .ok_or_else(|| CompileError::MissingFragmentOutput {
                        fragment: *producer,
                        output: *output,
                    })?;
            let (producer_key, remote_output) = producer_fragment
                .outputs
                .get(output)
                .ok_or_else(|| CompileError::MissingFragmentOutput {
                    fragment: *producer,
                    output: *output,
                })?;
            overrides
                .entry(key.clone())
                .or_default()
                .insert(input.clone(), link(producer_key.clone(), *remote_output));
        }
    }

    Ok((merged, overrides))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fragment::{Fragment, FragmentId};
    use crate::host::NodeRef;
    use crate::job::JobNode;

    fn producer_fragment() -> Fragment {
        Fragment {
            subgraph: BTreeMap::from([
                (
                    "0".to_string(),
                    JobNode::new("KSampler", "Sampler").with_input("model", link("1", 0)),
                ),
                (
                    "1".to_string(),
                    JobNode::new("CheckpointLoaderSimple", "Loader"),
                ),
            ]),
            outputs: BTreeMap::from([(0, ("0".to_string(), 0))]),
            ..Fragment::default()
        }
    }

    fn consumer_fragment(producer: FragmentId) -> Fragment {
        Fragment {
            subgraph: BTreeMap::from([(
                "0".to_string(),
                JobNode::new("VAEDecode", "Decode"),
            )]),
            outputs: BTreeMap::from([(0, ("0".to_string(), 0))]),
            inputs: BTreeMap::from([(("0".to_string(), "samples".to_string()), (producer, 0))]),
            literals: BTreeMap::from([(("0".to_string(), "tile_size".to_string()), Value::from(512))]),
        }
    }

    #[test]
    fn test_merge_renames_and_rewrites_internal_wires() {
        let producer = FragmentId::Node(NodeRef::new(1));
        let mut set = FragmentSet::new();
        set.insert(producer, producer_fragment());

        let (merged, _) = merge_fragments(&mut set).expect("merge failed");
        assert_eq!(merged.len(), 2);
        assert!(merged.contains_key("0_0"));
        assert!(merged.contains_key("0_1"));
        assert_eq!(as_link(&merged["0_0"].inputs["model"]), Some(("0_1", 0)));
    }

    #[test]
    fn test_merge_keys_globally_unique() {
        let first = FragmentId::Node(NodeRef::new(1));
        let second = FragmentId::Node(NodeRef::new(2));
        let mut set = FragmentSet::new();
        set.insert(first, producer_fragment());
        set.insert(second, producer_fragment());

        let (merged, _) = merge_fragments(&mut set).expect("merge failed");
        assert_eq!(merged.len(), 4);
        for key in ["0_0", "0_1", "1_0", "1_1"] {
            assert!(merged.contains_key(key), "missing {key}");
        }
    }

    #[test]
    fn test_overrides_resolve_through_renamed_producer_outputs() {
        let producer = FragmentId::Node(NodeRef::new(1));
        let consumer = FragmentId::Node(NodeRef::new(2));
        let mut set = FragmentSet::new();
        set.insert(producer, producer_fragment());
        set.insert(consumer, consumer_fragment(producer));

        let (_, overrides) = merge_fragments(&mut set).expect("merge failed");
        let consumer_overrides = &overrides["1_0"];
        assert_eq!(as_link(&consumer_overrides["samples"]), Some(("0_0", 0)));
        assert_eq!(consumer_overrides["tile_size"], Value::from(512));
    }

    #[test]
    fn test_shared_producer_resolves_to_one_key() {
        let producer = FragmentId::Node(NodeRef::new(1));
        let left = FragmentId::Node(NodeRef::new(2));
        let right = FragmentId::Node(NodeRef::new(3));
        let mut set = FragmentSet::new();
        set.insert(producer, producer_fragment());
        set.insert(left, consumer_fragment(producer));
        set.insert(right, consumer_fragment(producer));

        let (_, overrides) = merge_fragments(&mut set).expect("merge failed");
        assert_eq!(as_link(&overrides["1_0"]["samples"]), Some(("0_0", 0)));
        assert_eq!(as_link(&overrides["2_0"]["samples"]), Some(("0_0", 0)));
    }

    #[test]
    fn test_missing_producer_output_is_a_defect() {
        let producer = FragmentId::Node(NodeRef::new(1));
        let consumer = FragmentId::Node(NodeRef::new(2));
        let mut set = FragmentSet::new();
        let mut bare = producer_fragment();
        bare.outputs.clear();
        set.insert(producer, bare);
        set.insert(consumer, consumer_fragment(producer));

        assert!(matches!(
            merge_fragments(&mut set),
            Err(CompileError::MissingFragmentOutput { .. })
        ));
    }

    #[test]
    fn test_dangling_template_wire_is_a_defect() {
        let mut fragment = producer_fragment();
        fragment.subgraph.get_mut("0").expect("node").inputs.insert(
            "latent".to_string(),
            link("99", 0),
        );
        let mut set = FragmentSet::new();
        set.insert(FragmentId::Node(NodeRef::new(1)), fragment);

        assert!(matches!(
            merge_fragments(&mut set),
            Err(CompileError::BrokenWire { .. })
        ));
    }
}
