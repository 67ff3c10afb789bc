//! Fragment building.
//!
//! A fragment is the intermediate representation of one compile-unit node:
//! its embedded sub-graph, its declared outputs, its wire inputs and its
//! literal parameter overrides, all keyed by fragment-local node keys.
//! [`build_fragment`] compiles a node and, depth-first, every compile unit
//! it depends on; the fragment set doubles as the memoization guard, so a
//! node shared by several consumers is compiled exactly once.

use std::collections::BTreeMap;

use derive_more::Display;
use serde_json::Value;

use crate::error::{CompileError, CompileResult};
use crate::host::{HostGraph, NodeCategory, NodeRef, SlotBinding, SlotValue};
use crate::job::{title_to_key, JobNode, NodeKey};
use crate::resolve::{resolve, follow_to_deadend, RawKind, ResolvedSource};
use crate::templates;
use crate::upload::{ProcessingContext, UploadKey, UploadSet};
use crate::value::{check_big_int, ConvertKind, SlotKind, SlotValueKind};
use crate::TRACING_TARGET;

/// Identity of a fragment within one compile.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FragmentId {
    /// Fragment compiled from a host node (a compile unit or the output
    /// aggregator).
    #[display("{_0}")]
    Node(NodeRef),
    /// Synthetic loader fragment feeding one input connector of its
    /// consumer from an uploaded asset.
    #[display("{consumer}/load{input}")]
    Loader {
        /// The compile unit the loader feeds.
        consumer: NodeRef,
        /// The consumer's input connector.
        input: usize,
    },
}

/// The IR produced by compiling one compile-unit node, prior to
/// namespacing and merging.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Fragment {
    /// Embedded sub-graph, keyed by fragment-local node keys.
    pub subgraph: BTreeMap<String, JobNode>,
    /// Declared outputs: connector index to (local key, remote output).
    pub outputs: BTreeMap<usize, (String, u64)>,
    /// Wire inputs: (local key, input name) to producer fragment output.
    pub inputs: BTreeMap<(String, String), (FragmentId, usize)>,
    /// Literal overrides: (local key, input name) to scalar value.
    pub literals: BTreeMap<(String, String), Value>,
}

/// Insertion-ordered collection of fragments.
///
/// Order is the merge order; because dependencies are built depth-first,
/// every producer fragment precedes its consumers.
#[derive(Debug, Clone, Default)]
pub struct FragmentSet {
    fragments: std::collections::HashMap<FragmentId, Fragment>,
    order: Vec<FragmentId>,
}

impl FragmentSet {
    /// Creates an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns whether a fragment is registered for the id.
    pub fn contains(&self, id: &FragmentId) -> bool {
        self.fragments.contains_key(id)
    }

    /// Returns the fragment for an id, if present.
    pub fn get(&self, id: &FragmentId) -> Option<&Fragment> {
        self.fragments.get(id)
    }

    /// Returns the fragment for an id mutably, if present.
    pub fn get_mut(&mut self, id: &FragmentId) -> Option<&mut Fragment> {
        self.fragments.get_mut(id)
    }

    /// Registers a fragment, keeping first-insertion order.
    pub fn insert(&mut self, id: FragmentId, fragment: Fragment) {
        if self.fragments.insert(id, fragment).is_none() {
            self.order.push(id);
        }
    }

    /// Fragment ids in insertion order.
    pub fn order(&self) -> &[FragmentId] {
        &self.order
    }

    /// Number of fragments.
    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// Returns whether the set is empty.
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

/// Shared accumulator state threaded through one compile.
#[derive(Debug, Clone, Default)]
pub struct CompileState {
    /// Fragments built so far; also the visited set of the recursion.
    pub fragments: FragmentSet,
    /// Upload table shared across the whole compile.
    pub uploads: UploadSet,
    /// Context variables for submit-time string interpolation.
    pub context_vars: BTreeMap<String, Value>,
}

/// Compiles a node (and, depth-first, its compile-unit dependencies) into
/// fragments. Idempotent per node: an already-built node is a no-op.
pub fn build_fragment<G: HostGraph>(
    graph: &G,
    node: NodeRef,
    state: &mut CompileState,
) -> CompileResult<()> {
    if state.fragments.contains(&FragmentId::Node(node)) {
        return Ok(());
    }

    // nodes may reimplement fragment building entirely
    if let Some(custom) = graph.custom_compiler(node) {
        tracing::debug!(target: TRACING_TARGET, node = %node, "delegating to custom fragment compiler");
        return custom.build(graph, node, state);
    }

    if graph.category(node) != NodeCategory::CompileUnit {
        // ordinary nodes are transparent: continue from the first input
        return match graph.input_connection(node, 0) {
            Some(wire) => build_fragment(graph, wire.node, state),
            None => Ok(()),
        };
    }

    tracing::debug!(target: TRACING_TARGET, node = %node, "building fragment");

    let template = graph
        .graph_template(node)
        .ok_or(CompileError::MissingTemplate { node })?;
    let subgraph: BTreeMap<String, JobNode> = serde_json::from_str(&template)?;
    let slots = graph.input_slots(node);

    // resolve every input connector to a producing fragment output
    let mut sources: Vec<Option<(FragmentId, usize)>> = Vec::new();
    for index in 0..graph.input_count(node) {
        sources.push(None);
        let Some(resolved) = resolve(graph, node, index) else {
            continue;
        };
        match resolved {
            ResolvedSource::Raw {
                node: source,
                output,
                kind: RawKind::Image,
            } => {
                // the connector only matters if a declared slot is wired to it
                let Some(slot) = slot_for_connector(&slots, index) else {
                    continue;
                };
                let bake_cc = slot.bake_color_correction.unwrap_or(true);
                let value_kind = SlotValueKind::parse(slot.value_kind.as_deref().unwrap_or(""))?;
                let key = UploadKey {
                    node: source,
                    output,
                    context: ProcessingContext {
                        frame: graph.frame(),
                        bake_color_correction: bake_cc,
                    },
                };
                let remote_name = state.uploads.ensure_image(key).remote_name.clone();
                let loader = match value_kind {
                    SlotValueKind::Image => templates::image_load(&remote_name),
                    SlotValueKind::Mask => templates::mask_load(&remote_name),
                };
                let loader_id = FragmentId::Loader {
                    consumer: node,
                    input: index,
                };
                state.fragments.insert(
                    loader_id,
                    Fragment {
                        subgraph: loader,
                        outputs: BTreeMap::from([(0, ("0".to_string(), 0))]),
                        ..Fragment::default()
                    },
                );
                sources[index] = Some((loader_id, 0));
            }
            ResolvedSource::Graph {
                node: producer,
                output,
            } => {
                // producer first, so its fragment precedes ours
                build_fragment(graph, producer, state)?;
                sources[index] = Some((FragmentId::Node(producer), output));
            }
        }
    }

    let mut inputs = BTreeMap::new();
    let mut literals = BTreeMap::new();
    for slot in &slots {
        let target = || -> CompileResult<(NodeKey, String)> {
            Ok((
                title_to_key(&subgraph, &slot.node_title)?,
                slot.input_name.clone(),
            ))
        };
        match SlotKind::parse(&slot.value_type)? {
            SlotKind::Wire(index) => match sources.get(index).copied().flatten() {
                Some(source) => {
                    inputs.insert(target()?, source);
                }
                None => {
                    // the slot may still reach a literal through an
                    // ordinary host-level connection chain
                    if let Some(value) = deadend_literal(graph, node, index, slot)? {
                        literals.insert(target()?, value);
                    }
                }
            },
            kind => {
                literals.insert(target()?, literal_value(slot, kind)?);
            }
        }
    }

    let mut outputs = BTreeMap::new();
    for (index, binding) in graph.output_slots(node).iter().enumerate() {
        outputs.insert(
            index,
            (
                title_to_key(&subgraph, &binding.node_title)?,
                binding.output_index,
            ),
        );
    }

    state.fragments.insert(
        FragmentId::Node(node),
        Fragment {
            subgraph,
            outputs,
            inputs,
            literals,
        },
    );
    Ok(())
}

/// Finds the declared slot wired to an input connector, if any.
fn slot_for_connector(slots: &[SlotBinding], connector: usize) -> Option<&SlotBinding> {
    slots
        .iter()
        .find(|slot| SlotKind::parse(&slot.value_type).ok() == Some(SlotKind::Wire(connector)))
}

/// Reads a strongly-typed literal from a slot declaration.
fn literal_value(slot: &SlotBinding, kind: SlotKind) -> CompileResult<Value> {
    let mismatch = |expected: &'static str| CompileError::SlotValueMismatch {
        slot: slot.node_title.clone(),
        expected,
    };
    match kind {
        SlotKind::Int => match slot.value {
            Some(SlotValue::Int(value)) => Ok(Value::from(value)),
            _ => Err(mismatch("int")),
        },
        SlotKind::BigInt => match &slot.value {
            Some(SlotValue::Text(text)) => {
                let wide: i128 = text.trim().parse().map_err(|_| CompileError::InvalidConversion {
                    text: text.clone(),
                    target: "int",
                })?;
                Ok(Value::from(check_big_int(wide)?))
            }
            _ => Err(mismatch("textint")),
        },
        SlotKind::Float => match slot.value {
            Some(SlotValue::Float(value)) => Ok(Value::from(value)),
            _ => Err(mismatch("float")),
        },
        SlotKind::Text => match &slot.value {
            Some(SlotValue::Text(text)) => {
                ConvertKind::parse(slot.converted_type.as_deref())?.apply(text)
            }
            _ => Err(mismatch("text")),
        },
        SlotKind::Bool => match slot.value {
            Some(SlotValue::Bool(value)) => Ok(Value::from(value)),
            Some(SlotValue::Int(value)) => Ok(Value::from(value != 0)),
            _ => Err(mismatch("bool")),
        },
        SlotKind::Wire(_) => Err(CompileError::Internal(
            "wire slots carry no literal value".to_string(),
        )),
    }
}

/// Best-effort literal lookup for an unwired slot: follow the host-level
/// connection chain to its deadend and read the value carried there.
///
/// Unknown original kind tags are skipped silently, a compatibility
/// fallback rather than an error.
fn deadend_literal<G: HostGraph>(
    graph: &G,
    node: NodeRef,
    input: usize,
    slot: &SlotBinding,
) -> CompileResult<Option<Value>> {
    let Some(original) = slot.original_value_type.as_deref() else {
        return Ok(None);
    };
    if original.is_empty() || original.starts_with("input") {
        return Ok(None);
    }
    let Some((deadend, deadend_input)) = follow_to_deadend(graph, node, input) else {
        return Ok(None);
    };
    let Some(raw) = graph.deadend_value(deadend, deadend_input) else {
        return Ok(None);
    };
    let value = match SlotKind::parse(original) {
        Ok(SlotKind::BigInt) => {
            let text = match &raw {
                SlotValue::Text(text) => text.clone(),
                SlotValue::Int(value) => value.to_string(),
                _ => return Ok(None),
            };
            let wide: i128 = text.trim().parse().map_err(|_| CompileError::InvalidConversion {
                text: text.clone(),
                target: "int",
            })?;
            Value::from(check_big_int(wide)?)
        }
        Ok(SlotKind::Bool) => match raw {
            SlotValue::Bool(value) => Value::from(value),
            SlotValue::Int(value) => Value::from(value != 0),
            _ => return Ok(None),
        },
        Ok(_) => match raw {
            SlotValue::Int(value) => Value::from(value),
            SlotValue::Float(value) => Value::from(value),
            SlotValue::Text(text) => Value::from(text),
            SlotValue::Bool(value) => Value::from(value),
        },
        // unknown kinds skip silently for compatibility
        Err(_) => return Ok(None),
    };
    Ok(Some(value))
}
