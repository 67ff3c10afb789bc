//! Host graph capability interface.
//!
//! The compiler never owns the visual graph; it consumes it through the
//! read-only [`HostGraph`] trait. The hosting application (or the
//! [`crate::memory::MemoryGraph`] test double) implements the trait and
//! stays in charge of node storage, parameter evaluation and wiring.

use derive_more::{Debug, Display, From, Into};

use crate::error::CompileResult;
use crate::fragment::CompileState;

/// Opaque handle to a node in the host graph.
///
/// Handles are assigned by the [`HostGraph`] implementation and are only
/// meaningful within the graph that produced them.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[derive(Debug, Display, From, Into)]
#[debug("{_0}")]
#[display("node#{_0}")]
pub struct NodeRef(u64);

impl NodeRef {
    /// Creates a handle from a raw id.
    #[inline]
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Returns the raw id.
    #[inline]
    pub const fn as_u64(&self) -> u64 {
        self.0
    }
}

/// One end of a connection: the node on the other side of the wire plus
/// the connector index on that node.
///
/// For input connections `index` is the upstream node's output connector;
/// for output connections it is the downstream node's input connector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Wire {
    /// Node on the far side of the wire.
    pub node: NodeRef,
    /// Connector index on the far side.
    pub index: usize,
}

/// Structural role of a node, as seen by the connection resolver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeCategory {
    /// Carries an embedded job-graph template; the unit of compilation.
    CompileUnit,
    /// Utility node that forwards its input unchanged (a "null").
    Passthrough,
    /// Selector that forwards exactly one of its inputs.
    Switch,
    /// Placeholder standing for one of the enclosing subnet's inputs.
    SubnetInput,
    /// Placeholder standing for one of the enclosing subnet's outputs.
    SubnetOutput,
    /// A nested network whose designated output node continues resolution.
    Subnet,
    /// Any other node; resolves as a raw external source.
    Plain,
}

/// Literal payload read from a node parameter.
#[derive(Debug, Clone, PartialEq)]
pub enum SlotValue {
    /// Integer parameter.
    Int(i64),
    /// Floating point parameter.
    Float(f64),
    /// Text parameter.
    Text(String),
    /// Toggle parameter.
    Bool(bool),
}

/// Declared input slot of a compile-unit node.
///
/// Kind tags are carried as raw strings exactly as the host stores them;
/// the fragment builder validates them into [`crate::value::SlotKind`] at
/// the read boundary and fails fast on unknown tags.
#[derive(Debug, Clone, PartialEq)]
pub struct SlotBinding {
    /// Title of the template node this slot targets.
    pub node_title: String,
    /// Input name on the targeted template node.
    pub input_name: String,
    /// Raw value kind tag, e.g. `"int"`, `"textint"` or `"input2"`.
    pub value_type: String,
    /// The kind the slot declared before any wiring override, if recorded.
    pub original_value_type: Option<String>,
    /// Conversion target for text slots, e.g. `"int"` or `"bool"`.
    pub converted_type: Option<String>,
    /// Whether a raw source feeding this slot is color-corrected before
    /// capture. `None` on older declarations, which default to `true`.
    pub bake_color_correction: Option<bool>,
    /// Declared value kind of a wired raw source, e.g. `"IMAGE"` or
    /// `"MASK"`. `None` and the empty tag both mean image.
    pub value_kind: Option<String>,
    /// Evaluated literal payload for non-wire slots.
    pub value: Option<SlotValue>,
}

impl SlotBinding {
    /// Creates a slot declaration with the given target and kind tag.
    pub fn new(
        node_title: impl Into<String>,
        input_name: impl Into<String>,
        value_type: impl Into<String>,
    ) -> Self {
        Self {
            node_title: node_title.into(),
            input_name: input_name.into(),
            value_type: value_type.into(),
            original_value_type: None,
            converted_type: None,
            bake_color_correction: None,
            value_kind: None,
            value: None,
        }
    }

    /// Sets the pre-override kind tag.
    pub fn with_original_value_type(mut self, tag: impl Into<String>) -> Self {
        self.original_value_type = Some(tag.into());
        self
    }

    /// Sets the text conversion target.
    pub fn with_converted_type(mut self, tag: impl Into<String>) -> Self {
        self.converted_type = Some(tag.into());
        self
    }

    /// Sets the color-correction flag.
    pub fn with_bake_color_correction(mut self, bake: bool) -> Self {
        self.bake_color_correction = Some(bake);
        self
    }

    /// Sets the declared value kind of a wired raw source.
    pub fn with_value_kind(mut self, tag: impl Into<String>) -> Self {
        self.value_kind = Some(tag.into());
        self
    }

    /// Sets the literal payload.
    pub fn with_value(mut self, value: SlotValue) -> Self {
        self.value = Some(value);
        self
    }
}

/// Declared output of a compile-unit node.
#[derive(Debug, Clone, PartialEq)]
pub struct OutputBinding {
    /// Title of the template node that produces this output.
    pub node_title: String,
    /// Output index on the produced job node.
    pub output_index: u64,
    /// Declared output type tag, e.g. `"IMAGE"` or `"MESH"`; the empty tag
    /// also means image. `None` when the node never declared a type.
    pub value_type: Option<String>,
}

impl OutputBinding {
    /// Creates an output declaration.
    pub fn new(node_title: impl Into<String>, output_index: u64) -> Self {
        Self {
            node_title: node_title.into(),
            output_index,
            value_type: None,
        }
    }

    /// Sets the declared output type tag.
    pub fn with_value_type(mut self, tag: impl Into<String>) -> Self {
        self.value_type = Some(tag.into());
        self
    }
}

/// Read-only capability interface over the host's visual graph.
///
/// Wiring is assumed to be acyclic: the host's editing rules make cycles
/// structurally unreachable, and the resolver carries no cycle guard.
pub trait HostGraph {
    /// Number of input connectors on a node.
    fn input_count(&self, node: NodeRef) -> usize;

    /// Upstream end of the wire plugged into an input connector, if any.
    fn input_connection(&self, node: NodeRef, input: usize) -> Option<Wire>;

    /// Downstream end of the first wire leaving an output connector.
    fn output_connection(&self, node: NodeRef, output: usize) -> Option<Wire>;

    /// Whether the node is bypassed and must be treated as transparent.
    fn is_bypassed(&self, node: NodeRef) -> bool;

    /// Structural role of the node.
    fn category(&self, node: NodeRef) -> NodeCategory;

    /// Enclosing network of a node, if it has one.
    fn parent(&self, node: NodeRef) -> Option<NodeRef>;

    /// Declared output nodes of a nested network, in declaration order.
    fn subnet_outputs(&self, node: NodeRef) -> Vec<NodeRef>;

    /// Input placeholder nodes of a nested network, in declaration order.
    fn subnet_inputs(&self, node: NodeRef) -> Vec<NodeRef>;

    /// Currently selected input index of a switch node.
    fn switch_selection(&self, node: NodeRef) -> usize;

    /// Embedded job-graph template text of a compile-unit node.
    fn graph_template(&self, node: NodeRef) -> Option<String>;

    /// Declared input slots of a compile-unit node.
    fn input_slots(&self, node: NodeRef) -> Vec<SlotBinding>;

    /// Declared outputs of a compile-unit node.
    fn output_slots(&self, node: NodeRef) -> Vec<OutputBinding>;

    /// Literal value carried by an ordinary node at the end of a
    /// pass-through chain, if it exposes one for the given input.
    fn deadend_value(&self, node: NodeRef, input: usize) -> Option<SlotValue>;

    /// Absolute path of a node within the host graph.
    fn node_path(&self, node: NodeRef) -> String;

    /// Looks a node up by its absolute path.
    fn node_at_path(&self, path: &str) -> Option<NodeRef>;

    /// Current global frame number.
    fn frame(&self) -> i64;

    /// Custom fragment compiler a node self-declares, if any.
    ///
    /// Nodes returning a compiler here are treated as compile units and
    /// compiled through the hook instead of the default fragment builder.
    fn custom_compiler(&self, node: NodeRef) -> Option<&dyn FragmentCompiler<Self>>
    where
        Self: Sized,
    {
        let _ = node;
        None
    }
}

/// Compilation hook for nodes that implement their own fragment building.
///
/// Implementations must satisfy the same contract as the default builder:
/// mutate `state` to register at most one fragment for `node`, registering
/// upstream fragments first.
pub trait FragmentCompiler<G: HostGraph> {
    /// Compiles `node` into fragments, mutating the shared compile state.
    fn build(&self, graph: &G, node: NodeRef, state: &mut CompileState) -> CompileResult<()>;
}
