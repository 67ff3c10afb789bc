//! In-memory host graph.
//!
//! A self-contained [`HostGraph`] implementation used by the test suite
//! and by embedders that build graphs programmatically instead of reading
//! them from a content-creation tool.

use std::collections::HashMap;
use std::sync::Arc;

use derive_more::Debug;

use crate::host::{
    FragmentCompiler, HostGraph, NodeCategory, NodeRef, OutputBinding, SlotBinding, SlotValue, Wire,
};

/// One node of an in-memory graph.
#[derive(Debug, Clone, Default)]
pub struct MemoryNode {
    /// Absolute path of the node.
    pub path: String,
    /// Structural role.
    pub category: Option<NodeCategory>,
    /// Bypass flag.
    pub bypassed: bool,
    /// Input connections, index-aligned with input connectors.
    pub inputs: Vec<Option<Wire>>,
    /// Minimum number of input connectors, wired or not.
    pub input_connectors: usize,
    /// Enclosing network.
    pub parent: Option<NodeRef>,
    /// Declared output nodes when this node is a subnet.
    pub subnet_outputs: Vec<NodeRef>,
    /// Input placeholder nodes when this node is a subnet.
    pub subnet_inputs: Vec<NodeRef>,
    /// Selected input when this node is a switch.
    pub switch_selection: usize,
    /// Embedded job-graph template text.
    pub template: Option<String>,
    /// Declared input slots.
    pub input_slots: Vec<SlotBinding>,
    /// Declared outputs.
    pub output_slots: Vec<OutputBinding>,
    /// Literal values exposed to the deadend follower, per input index.
    pub deadend_values: HashMap<usize, SlotValue>,
    /// Self-declared custom fragment compiler.
    #[debug(skip)]
    pub custom: Option<Arc<dyn FragmentCompiler<MemoryGraph> + Send + Sync>>,
}

impl MemoryNode {
    fn with_category(path: impl Into<String>, category: NodeCategory) -> Self {
        Self {
            path: path.into(),
            category: Some(category),
            ..Self::default()
        }
    }

    /// An ordinary node, resolving as a raw external source.
    pub fn plain(path: impl Into<String>) -> Self {
        Self::with_category(path, NodeCategory::Plain)
    }

    /// A compile-unit node with an embedded graph template.
    pub fn compile_unit(path: impl Into<String>, template: impl Into<String>) -> Self {
        Self {
            template: Some(template.into()),
            ..Self::with_category(path, NodeCategory::CompileUnit)
        }
    }

    /// A pass-through utility node.
    pub fn passthrough(path: impl Into<String>) -> Self {
        Self::with_category(path, NodeCategory::Passthrough)
    }

    /// A switch selector with the given active input.
    pub fn switch(path: impl Into<String>, selection: usize) -> Self {
        Self {
            switch_selection: selection,
            ..Self::with_category(path, NodeCategory::Switch)
        }
    }

    /// A nested network.
    pub fn subnet(path: impl Into<String>) -> Self {
        Self::with_category(path, NodeCategory::Subnet)
    }

    /// A subnet input placeholder.
    pub fn subnet_input(path: impl Into<String>) -> Self {
        Self::with_category(path, NodeCategory::SubnetInput)
    }

    /// A subnet output placeholder.
    pub fn subnet_output(path: impl Into<String>) -> Self {
        Self::with_category(path, NodeCategory::SubnetOutput)
    }

    /// Marks the node as bypassed.
    pub fn with_bypassed(mut self) -> Self {
        self.bypassed = true;
        self
    }

    /// Declares a minimum number of input connectors.
    pub fn with_input_connectors(mut self, count: usize) -> Self {
        self.input_connectors = count;
        self
    }

    /// Declares an input slot.
    pub fn with_input_slot(mut self, slot: SlotBinding) -> Self {
        self.input_slots.push(slot);
        self
    }

    /// Declares an output.
    pub fn with_output_slot(mut self, output: OutputBinding) -> Self {
        self.output_slots.push(output);
        self
    }

    /// Exposes a literal value to the deadend follower.
    pub fn with_deadend_value(mut self, input: usize, value: SlotValue) -> Self {
        self.deadend_values.insert(input, value);
        self
    }

    /// Attaches a custom fragment compiler.
    pub fn with_custom_compiler(
        mut self,
        compiler: Arc<dyn FragmentCompiler<MemoryGraph> + Send + Sync>,
    ) -> Self {
        self.custom = Some(compiler);
        self
    }
}

/// In-memory [`HostGraph`] implementation.
#[derive(Debug, Clone, Default)]
pub struct MemoryGraph {
    nodes: Vec<MemoryNode>,
    frame: i64,
}

impl MemoryGraph {
    /// Creates an empty graph at frame 0.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the current frame.
    pub fn set_frame(&mut self, frame: i64) {
        self.frame = frame;
    }

    /// Adds a node and returns its handle.
    pub fn add(&mut self, node: MemoryNode) -> NodeRef {
        self.nodes.push(node);
        NodeRef::new(self.nodes.len() as u64 - 1)
    }

    /// Wires `from`'s output connector into `to`'s input connector.
    pub fn connect(&mut self, from: NodeRef, output: usize, to: NodeRef, input: usize) {
        let inputs = &mut self.node_mut(to).inputs;
        if inputs.len() <= input {
            inputs.resize(input + 1, None);
        }
        inputs[input] = Some(Wire {
            node: from,
            index: output,
        });
    }

    /// Records `parent` as the enclosing network of `child`.
    pub fn set_parent(&mut self, child: NodeRef, parent: NodeRef) {
        self.node_mut(child).parent = Some(parent);
    }

    /// Declares the output nodes of a subnet.
    pub fn set_subnet_outputs(&mut self, subnet: NodeRef, outputs: Vec<NodeRef>) {
        self.node_mut(subnet).subnet_outputs = outputs;
    }

    /// Declares the input placeholder nodes of a subnet.
    pub fn set_subnet_inputs(&mut self, subnet: NodeRef, inputs: Vec<NodeRef>) {
        self.node_mut(subnet).subnet_inputs = inputs;
    }

    fn node(&self, node: NodeRef) -> &MemoryNode {
        &self.nodes[node.as_u64() as usize]
    }

    fn node_mut(&mut self, node: NodeRef) -> &mut MemoryNode {
        &mut self.nodes[node.as_u64() as usize]
    }
}

impl HostGraph for MemoryGraph {
    fn input_count(&self, node: NodeRef) -> usize {
        let data = self.node(node);
        data.inputs.len().max(data.input_connectors)
    }

    fn input_connection(&self, node: NodeRef, input: usize) -> Option<Wire> {
        self.node(node).inputs.get(input).copied().flatten()
    }

    fn output_connection(&self, node: NodeRef, output: usize) -> Option<Wire> {
        for (index, candidate) in self.nodes.iter().enumerate() {
            for (input, wire) in candidate.inputs.iter().enumerate() {
                if *wire
                    == Some(Wire {
                        node,
                        index: output,
                    })
                {
                    return Some(Wire {
                        node: NodeRef::new(index as u64),
                        index: input,
                    });
                }
            }
        }
        None
    }

    fn is_bypassed(&self, node: NodeRef) -> bool {
        self.node(node).bypassed
    }

    fn category(&self, node: NodeRef) -> NodeCategory {
        self.node(node).category.unwrap_or(NodeCategory::Plain)
    }

    fn parent(&self, node: NodeRef) -> Option<NodeRef> {
        self.node(node).parent
    }

    fn subnet_outputs(&self, node: NodeRef) -> Vec<NodeRef> {
        self.node(node).subnet_outputs.clone()
    }

    fn subnet_inputs(&self, node: NodeRef) -> Vec<NodeRef> {
        self.node(node).subnet_inputs.clone()
    }

    fn switch_selection(&self, node: NodeRef) -> usize {
        self.node(node).switch_selection
    }

    fn graph_template(&self, node: NodeRef) -> Option<String> {
        self.node(node).template.clone()
    }

    fn input_slots(&self, node: NodeRef) -> Vec<SlotBinding> {
        self.node(node).input_slots.clone()
    }

    fn output_slots(&self, node: NodeRef) -> Vec<OutputBinding> {
        self.node(node).output_slots.clone()
    }

    fn deadend_value(&self, node: NodeRef, input: usize) -> Option<SlotValue> {
        self.node(node).deadend_values.get(&input).cloned()
    }

    fn node_path(&self, node: NodeRef) -> String {
        self.node(node).path.clone()
    }

    fn node_at_path(&self, path: &str) -> Option<NodeRef> {
        self.nodes
            .iter()
            .position(|node| node.path == path)
            .map(|index| NodeRef::new(index as u64))
    }

    fn frame(&self) -> i64 {
        self.frame
    }

    fn custom_compiler(&self, node: NodeRef) -> Option<&dyn FragmentCompiler<Self>> {
        self.node(node)
            .custom
            .as_deref()
            .map(|compiler| compiler as &dyn FragmentCompiler<Self>)
    }
}
