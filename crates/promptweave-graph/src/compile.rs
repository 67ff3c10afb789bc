//! Compile entry points.
//!
//! Two ways in: [`Compiler::compile_aggregator`] compiles everything wired
//! into a designated output node, appending a save template per connected
//! slot; [`Compiler::compile_roots`] compiles an explicit list of
//! compile-unit nodes whose templates already carry their own terminal
//! nodes. Both end with the same pipeline: merge the fragment set, apply
//! the flattened overrides, then recover the per-slot output keys from the
//! sort-order stamps of the terminal fragments.

use std::collections::BTreeMap;

use serde_json::Value;

use crate::error::{CompileError, CompileResult};
use crate::fragment::{build_fragment, CompileState, Fragment, FragmentId};
use crate::host::{HostGraph, NodeCategory, NodeRef};
use crate::job::JobGraph;
use crate::merge::merge_fragments;
use crate::resolve::{resolve, ResolvedSource};
use crate::substitute::apply_overrides;
use crate::templates;
use crate::upload::UploadSet;
use crate::value::OutputType;
use crate::TRACING_TARGET;

/// Filename prefix stamped on the save node of an output slot; the remote
/// engine appends its own counter and extension.
pub fn output_prefix(slot: usize) -> String {
    format!("promptweave-output-{slot}")
}

/// The result of one compile: the submittable graph, the save-node key per
/// output slot, and the upload table the submission must satisfy first.
#[derive(Debug, Clone, Default)]
pub struct CompiledJob {
    /// Merged, override-applied job graph.
    pub graph: JobGraph,
    /// Key of the terminal node per output slot; `None` where nothing
    /// meaningful was connected.
    pub outputs: Vec<Option<String>>,
    /// Uploads the job graph reads; pending records must be uploaded
    /// before submission.
    pub uploads: UploadSet,
}

/// One compile over a host graph.
#[derive(Debug)]
pub struct Compiler<'g, G> {
    graph: &'g G,
    context_vars: BTreeMap<String, Value>,
    uploads: UploadSet,
}

impl<'g, G: HostGraph> Compiler<'g, G> {
    /// Creates a compiler over a host graph.
    pub fn new(graph: &'g G) -> Self {
        Self {
            graph,
            context_vars: BTreeMap::new(),
            uploads: UploadSet::new(),
        }
    }

    /// Supplies a context variable for `@{{name}}` interpolation.
    pub fn with_context_var(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.context_vars.insert(name.into(), value.into());
        self
    }

    /// Supplies a batch of context variables.
    pub fn with_context_vars(mut self, vars: BTreeMap<String, Value>) -> Self {
        self.context_vars.extend(vars);
        self
    }

    /// Seeds the upload table, typically with records reused from an
    /// earlier submission so completed uploads are not repeated.
    pub fn with_uploads(mut self, uploads: UploadSet) -> Self {
        self.uploads = uploads;
        self
    }

    fn into_state(self) -> CompileState {
        CompileState {
            uploads: self.uploads,
            context_vars: self.context_vars,
            ..CompileState::default()
        }
    }

    /// Compiles everything wired into `output_node`, treating each of its
    /// input connectors as one output slot.
    ///
    /// Unconnected connectors and connectors resolving to raw sources
    /// yield a `None` slot; connected compile units get a save template
    /// appended per their declared output type.
    pub fn compile_aggregator(self, output_node: NodeRef) -> CompileResult<CompiledJob> {
        let graph = self.graph;
        let mut state = self.into_state();

        let slot_count = graph.input_count(output_node);
        tracing::debug!(
            target: TRACING_TARGET,
            node = %output_node,
            slots = slot_count,
            "compiling aggregator"
        );

        let mut aggregator = Fragment::default();
        for slot in 0..slot_count {
            let Some(ResolvedSource::Graph {
                node: producer,
                output,
            }) = resolve(graph, output_node, slot)
            else {
                // nothing compilable behind this connector
                continue;
            };
            build_fragment(graph, producer, &mut state)?;

            let binding = graph
                .output_slots(producer)
                .get(output)
                .cloned()
                .ok_or(CompileError::MissingFragmentOutput {
                    fragment: FragmentId::Node(producer),
                    output,
                })?;
            let output_type = match binding.value_type.as_deref() {
                Some(tag) => OutputType::parse(tag)?,
                None => {
                    return Err(CompileError::UnsupportedSaveType {
                        tag: "<undeclared>".to_string(),
                    })
                }
            };

            let prefix = output_prefix(slot);
            let key = slot.to_string();
            let (save, saving_key, saving_input) = match output_type {
                OutputType::Image => (
                    templates::image_save(&prefix, &key, slot),
                    key.clone(),
                    "images",
                ),
                OutputType::Mask => (
                    templates::mask_save(&prefix, &key, slot),
                    key.clone(),
                    "mask",
                ),
                OutputType::Mesh => (
                    templates::mesh_save(&prefix, &key, slot),
                    key.clone(),
                    "mesh",
                ),
                OutputType::TriMesh => {
                    let input_key = format!("input1_{slot}");
                    (
                        templates::trimesh_save(&prefix, &input_key, &key, slot),
                        input_key,
                        "trimesh",
                    )
                }
                OutputType::Text => (templates::string_save(&key, slot), key.clone(), "image_path"),
            };
            aggregator.subgraph.extend(save);
            aggregator.inputs.insert(
                (saving_key, saving_input.to_string()),
                (FragmentId::Node(producer), output),
            );
        }
        state
            .fragments
            .insert(FragmentId::Node(output_node), aggregator);

        Self::finish(graph, state, slot_count, &[FragmentId::Node(output_node)])
    }

    /// Compiles an explicit list of roots, one output slot per root.
    ///
    /// Each root must be a compile-unit node whose template reduces to a
    /// single top-level node; that node is stamped with the root's
    /// position so slot ordering survives merging.
    pub fn compile_roots(self, roots: &[NodeRef]) -> CompileResult<CompiledJob> {
        let graph = self.graph;
        let mut state = self.into_state();

        tracing::debug!(target: TRACING_TARGET, roots = roots.len(), "compiling explicit roots");

        for &root in roots {
            if graph.category(root) != NodeCategory::CompileUnit {
                return Err(CompileError::InvalidRoot { node: root });
            }
            build_fragment(graph, root, &mut state)?;
        }

        for (position, &root) in roots.iter().enumerate() {
            let fragment = state
                .fragments
                .get_mut(&FragmentId::Node(root))
                .ok_or_else(|| CompileError::Internal(format!("root {root} built no fragment")))?;
            if fragment.subgraph.len() != 1 {
                return Err(CompileError::AmbiguousRoot {
                    count: fragment.subgraph.len(),
                });
            }
            if let Some(node) = fragment.subgraph.values_mut().next() {
                node.meta.sort_order = Some(position);
            }
        }

        let terminals: Vec<FragmentId> = roots.iter().map(|&root| FragmentId::Node(root)).collect();
        Self::finish(graph, state, roots.len(), &terminals)
    }

    /// Shared tail of both modes: merge, substitute, recover slot keys.
    ///
    /// Slot keys are read back from the terminal fragments only; a
    /// compile-unit template carrying its own sort-order stamp must not
    /// shadow a save node.
    fn finish(
        graph: &G,
        mut state: CompileState,
        slot_count: usize,
        terminals: &[FragmentId],
    ) -> CompileResult<CompiledJob> {
        let (mut merged, overrides) = merge_fragments(&mut state.fragments)?;
        apply_overrides(
            graph,
            &mut merged,
            &overrides,
            &state.uploads,
            &state.context_vars,
        )?;

        let mut outputs: Vec<Option<String>> = vec![None; slot_count];
        for id in terminals {
            let Some(fragment) = state.fragments.get(id) else {
                continue;
            };
            // merging renamed the fragment's keys in place
            for (key, node) in &fragment.subgraph {
                if let Some(slot) = node.meta.sort_order {
                    if slot < slot_count {
                        outputs[slot] = Some(key.clone());
                    }
                }
            }
        }

        tracing::debug!(
            target: TRACING_TARGET,
            nodes = merged.len(),
            uploads = state.uploads.len(),
            "compile finished"
        );
        Ok(CompiledJob {
            graph: merged,
            outputs,
            uploads: state.uploads,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::{OutputBinding, SlotBinding, SlotValue};
    use crate::job::as_link;
    use crate::memory::{MemoryGraph, MemoryNode};

    const GEN_TEMPLATE: &str = r#"{
        "0": {
            "inputs": {"seed": 0},
            "class_type": "KSampler",
            "_meta": {"title": "Gen"}
        }
    }"#;

    const CHAIN_TEMPLATE: &str = r#"{
        "0": {
            "inputs": {"samples": ["1", 0]},
            "class_type": "VAEDecode",
            "_meta": {"title": "Decode"}
        },
        "1": {
            "class_type": "KSampler",
            "_meta": {"title": "Gen"}
        }
    }"#;

    fn generator(graph: &mut MemoryGraph, path: &str, seed: i64) -> crate::host::NodeRef {
        graph.add(
            MemoryNode::compile_unit(path, GEN_TEMPLATE)
                .with_input_slot(
                    SlotBinding::new("Gen", "seed", "int").with_value(SlotValue::Int(seed)),
                )
                .with_output_slot(OutputBinding::new("Gen", 0).with_value_type("IMAGE")),
        )
    }

    #[test]
    fn test_empty_aggregator_yields_empty_job() {
        let mut graph = MemoryGraph::new();
        let out = graph.add(MemoryNode::plain("/out").with_input_connectors(2));

        let job = Compiler::new(&graph)
            .compile_aggregator(out)
            .expect("compile failed");
        assert!(job.graph.is_empty());
        assert_eq!(job.outputs, vec![None, None]);
        assert!(job.uploads.is_empty());
    }

    #[test]
    fn test_single_unit_image_output() {
        let mut graph = MemoryGraph::new();
        let unit = generator(&mut graph, "/gen", 5);
        let out = graph.add(MemoryNode::plain("/out"));
        graph.connect(unit, 0, out, 0);

        let job = Compiler::new(&graph)
            .compile_aggregator(out)
            .expect("compile failed");

        // generator fragment first, aggregator second
        assert_eq!(job.graph.len(), 2);
        let sampler = &job.graph["0_0"];
        assert_eq!(sampler.class_type, "KSampler");
        assert_eq!(sampler.inputs["seed"], Value::from(5));

        let save = &job.graph["1_0"];
        assert_eq!(save.class_type, "SaveImage");
        assert_eq!(as_link(&save.inputs["images"]), Some(("0_0", 0)));
        assert_eq!(save.inputs["filename_prefix"], "promptweave-output-0");
        assert_eq!(save.meta.sort_order, Some(0));

        assert_eq!(job.outputs, vec![Some("1_0".to_string())]);
    }

    #[test]
    fn test_template_sort_stamp_does_not_shadow_save_node() {
        // a unit template may carry its own sort-order stamp; slot keys
        // must still come from the appended save nodes
        const STAMPED_TEMPLATE: &str = r#"{
            "0": {
                "inputs": {"seed": 0},
                "class_type": "KSampler",
                "_meta": {"title": "Gen", "_sort_order": 0}
            }
        }"#;
        let mut graph = MemoryGraph::new();
        let unit = graph.add(
            MemoryNode::compile_unit("/gen", STAMPED_TEMPLATE)
                .with_output_slot(OutputBinding::new("Gen", 0).with_value_type("IMAGE")),
        );
        let out = graph.add(MemoryNode::plain("/out"));
        graph.connect(unit, 0, out, 0);

        let job = Compiler::new(&graph)
            .compile_aggregator(out)
            .expect("compile failed");

        assert_eq!(job.graph["1_0"].class_type, "SaveImage");
        assert_eq!(job.outputs, vec![Some("1_0".to_string())]);
    }

    #[test]
    fn test_unconnected_slots_interleave_with_connected() {
        let mut graph = MemoryGraph::new();
        let unit = generator(&mut graph, "/gen", 1);
        let out = graph.add(MemoryNode::plain("/out").with_input_connectors(3));
        graph.connect(unit, 0, out, 1);

        let job = Compiler::new(&graph)
            .compile_aggregator(out)
            .expect("compile failed");
        assert_eq!(job.outputs.len(), 3);
        assert!(job.outputs[0].is_none());
        assert!(job.outputs[1].is_some());
        assert!(job.outputs[2].is_none());
    }

    #[test]
    fn test_undeclared_output_type_rejected() {
        let mut graph = MemoryGraph::new();
        let unit = graph.add(
            MemoryNode::compile_unit("/gen", GEN_TEMPLATE)
                .with_output_slot(OutputBinding::new("Gen", 0)),
        );
        let out = graph.add(MemoryNode::plain("/out"));
        graph.connect(unit, 0, out, 0);

        assert!(matches!(
            Compiler::new(&graph).compile_aggregator(out),
            Err(CompileError::UnsupportedSaveType { .. })
        ));
    }

    #[test]
    fn test_diamond_producer_compiled_once() {
        let mut graph = MemoryGraph::new();
        let shared = generator(&mut graph, "/shared", 7);
        let left = graph.add(
            MemoryNode::compile_unit("/left", GEN_TEMPLATE)
                .with_input_slot(SlotBinding::new("Gen", "latent", "input1"))
                .with_output_slot(OutputBinding::new("Gen", 0).with_value_type("IMAGE")),
        );
        let right = graph.add(
            MemoryNode::compile_unit("/right", GEN_TEMPLATE)
                .with_input_slot(SlotBinding::new("Gen", "latent", "input1"))
                .with_output_slot(OutputBinding::new("Gen", 0).with_value_type("IMAGE")),
        );
        let out = graph.add(MemoryNode::plain("/out").with_input_connectors(2));
        graph.connect(shared, 0, left, 0);
        graph.connect(shared, 0, right, 0);
        graph.connect(left, 0, out, 0);
        graph.connect(right, 0, out, 1);

        let job = Compiler::new(&graph)
            .compile_aggregator(out)
            .expect("compile failed");

        // shared + left + right + two save nodes; no duplicate of shared
        assert_eq!(job.graph.len(), 5);
        let left_wire = as_link(&job.graph["1_0"].inputs["latent"]).expect("wire");
        let right_wire = as_link(&job.graph["2_0"].inputs["latent"]).expect("wire");
        assert_eq!(left_wire, right_wire);
        assert_eq!(left_wire.0, "0_0");
    }

    #[test]
    fn test_raw_source_becomes_upload_and_loader() {
        let mut graph = MemoryGraph::new();
        graph.set_frame(12);
        let camera = graph.add(MemoryNode::plain("/render"));
        let unit = graph.add(
            MemoryNode::compile_unit("/gen", GEN_TEMPLATE)
                .with_input_slot(SlotBinding::new("Gen", "pixels", "input1"))
                .with_output_slot(OutputBinding::new("Gen", 0).with_value_type("IMAGE")),
        );
        let out = graph.add(MemoryNode::plain("/out"));
        graph.connect(camera, 0, unit, 0);
        graph.connect(unit, 0, out, 0);

        let job = Compiler::new(&graph)
            .compile_aggregator(out)
            .expect("compile failed");

        assert_eq!(job.uploads.len(), 1);
        let (_, record) = job.uploads.iter().next().expect("record");
        assert_eq!(record.frame, Some(12));
        assert!(!record.uploaded);

        let loader = job
            .graph
            .values()
            .find(|node| node.class_type == "LoadImage")
            .expect("loader node");
        assert_eq!(loader.inputs["image"], Value::from(record.remote_name.clone()));

        // the generator reads pixels from the loader
        let sampler = job
            .graph
            .values()
            .find(|node| node.class_type == "KSampler" && node.inputs.contains_key("pixels"))
            .expect("generator node");
        assert!(as_link(&sampler.inputs["pixels"]).is_some());
    }

    fn big_int_graph(text: &str) -> (MemoryGraph, crate::host::NodeRef) {
        let mut graph = MemoryGraph::new();
        let unit = graph.add(
            MemoryNode::compile_unit("/gen", GEN_TEMPLATE)
                .with_input_slot(
                    SlotBinding::new("Gen", "seed", "textint")
                        .with_value(SlotValue::Text(text.to_string())),
                )
                .with_output_slot(OutputBinding::new("Gen", 0).with_value_type("IMAGE")),
        );
        let out = graph.add(MemoryNode::plain("/out"));
        graph.connect(unit, 0, out, 0);
        (graph, out)
    }

    #[test]
    fn test_big_int_literal_out_of_range() {
        let (graph, out) = big_int_graph("9223372036854775808");

        assert!(matches!(
            Compiler::new(&graph).compile_aggregator(out),
            Err(CompileError::IntOutOfRange { .. })
        ));
    }

    #[test]
    fn test_big_int_literal_in_range() {
        let (graph, out) = big_int_graph("2147483647");

        let job = Compiler::new(&graph)
            .compile_aggregator(out)
            .expect("compile failed");
        assert_eq!(job.graph["0_0"].inputs["seed"], Value::from(2147483647i64));
    }

    #[test]
    fn test_context_variable_interpolation() {
        const PROMPT_TEMPLATE: &str = r#"{
            "0": {
                "inputs": {"text": ""},
                "class_type": "CLIPTextEncode",
                "_meta": {"title": "Prompt"}
            }
        }"#;
        let mut graph = MemoryGraph::new();
        let unit = graph.add(
            MemoryNode::compile_unit("/gen", PROMPT_TEMPLATE)
                .with_input_slot(
                    SlotBinding::new("Prompt", "text", "text")
                        .with_value(SlotValue::Text("a @{{animal}} at dusk".to_string())),
                )
                .with_output_slot(OutputBinding::new("Prompt", 0).with_value_type("IMAGE")),
        );
        let out = graph.add(MemoryNode::plain("/out"));
        graph.connect(unit, 0, out, 0);

        let job = Compiler::new(&graph)
            .with_context_var("animal", "red fox")
            .compile_aggregator(out)
            .expect("compile failed");
        assert_eq!(job.graph["0_0"].inputs["text"], "a red fox at dusk");
    }

    #[test]
    fn test_explicit_roots_ordered_by_position() {
        let mut graph = MemoryGraph::new();
        let first = generator(&mut graph, "/a", 1);
        let second = generator(&mut graph, "/b", 2);

        let job = Compiler::new(&graph)
            .compile_roots(&[second, first])
            .expect("compile failed");
        assert_eq!(job.graph.len(), 2);
        assert_eq!(
            job.outputs,
            vec![Some("0_0".to_string()), Some("1_0".to_string())]
        );
        // slot 0 is the root listed first
        assert_eq!(job.graph["0_0"].inputs["seed"], Value::from(2));
        assert_eq!(job.graph["1_0"].inputs["seed"], Value::from(1));
    }

    #[test]
    fn test_multi_node_root_rejected() {
        let mut graph = MemoryGraph::new();
        let root = graph.add(
            MemoryNode::compile_unit("/chain", CHAIN_TEMPLATE)
                .with_output_slot(OutputBinding::new("Decode", 0).with_value_type("IMAGE")),
        );

        assert!(matches!(
            Compiler::new(&graph).compile_roots(&[root]),
            Err(CompileError::AmbiguousRoot { count: 2 })
        ));
    }

    #[test]
    fn test_non_unit_root_rejected() {
        let mut graph = MemoryGraph::new();
        let root = graph.add(MemoryNode::plain("/not-a-unit"));

        assert!(matches!(
            Compiler::new(&graph).compile_roots(&[root]),
            Err(CompileError::InvalidRoot { .. })
        ));
    }

    #[test]
    fn test_resolution_through_indirection() {
        let mut graph = MemoryGraph::new();
        let unit = generator(&mut graph, "/gen", 3);
        let null = graph.add(MemoryNode::passthrough("/null"));
        let bypassed = graph.add(MemoryNode::plain("/bypassed").with_bypassed());
        let switch = graph.add(MemoryNode::switch("/switch", 1));
        let decoy = graph.add(MemoryNode::plain("/decoy"));
        let out = graph.add(MemoryNode::plain("/out"));
        graph.connect(unit, 0, null, 0);
        graph.connect(null, 0, bypassed, 0);
        graph.connect(decoy, 0, switch, 0);
        graph.connect(bypassed, 0, switch, 1);
        graph.connect(switch, 0, out, 0);

        let job = Compiler::new(&graph)
            .compile_aggregator(out)
            .expect("compile failed");
        // the switch selects the compile unit, not the decoy raw source
        assert!(job.uploads.is_empty());
        assert_eq!(job.outputs.len(), 1);
        assert!(job.outputs[0].is_some());
        assert_eq!(job.graph["0_0"].inputs["seed"], Value::from(3));
    }
}
