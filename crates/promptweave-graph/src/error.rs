//! Compiler error types.

use thiserror::Error;

use crate::fragment::FragmentId;
use crate::host::NodeRef;

/// Result type for compiler operations.
pub type CompileResult<T> = Result<T, CompileError>;

/// Errors that can occur while compiling a host graph into a job graph.
///
/// Every variant is a compile-time defect: compilation aborts and no
/// partial submission takes place.
#[derive(Debug, Error)]
pub enum CompileError {
    /// A graph template contains no node with the declared title.
    #[error("node with title {title:?} not found in graph template")]
    TitleNotFound {
        /// Title that was looked up.
        title: String,
    },

    /// A slot declaration carries a kind tag the compiler does not know.
    #[error("unknown value kind {tag:?}")]
    UnknownValueKind {
        /// The raw kind tag as read from the node.
        tag: String,
    },

    /// A text slot declares an unknown conversion target.
    #[error("unknown conversion kind {tag:?}")]
    UnknownConversion {
        /// The raw conversion tag as read from the node.
        tag: String,
    },

    /// A slot's literal payload does not match its declared kind.
    #[error("slot targeting {slot:?} expected a {expected} value")]
    SlotValueMismatch {
        /// Title of the template node the slot targets.
        slot: String,
        /// The kind the declaration promised.
        expected: &'static str,
    },

    /// A big-integer literal falls outside the supported range.
    #[error("integer {value} is outside the range the engine can process")]
    IntOutOfRange {
        /// The offending value.
        value: i128,
    },

    /// A literal could not be parsed or coerced to its declared kind.
    #[error("cannot convert literal {text:?} to {target}")]
    InvalidConversion {
        /// The raw literal text.
        text: String,
        /// The conversion target.
        target: &'static str,
    },

    /// A raw source slot declares a value kind with no loader template.
    #[error("uploading of value kind {tag:?} is not implemented")]
    UnsupportedValueKind {
        /// The raw value kind tag.
        tag: String,
    },

    /// An aggregator slot's producer declares an output type with no save
    /// template.
    #[error("saving of output type {tag:?} is not implemented")]
    UnsupportedSaveType {
        /// The raw output type tag.
        tag: String,
    },

    /// A compile-unit node has no embedded graph template.
    #[error("node {node} has no embedded graph template")]
    MissingTemplate {
        /// The offending node.
        node: NodeRef,
    },

    /// An explicit root compiled to more than one top-level node.
    #[error("graph root must reduce to a single node, found {count}")]
    AmbiguousRoot {
        /// Number of top-level keys the root produced.
        count: usize,
    },

    /// An explicit root is not a compile-unit node.
    #[error("explicit root {node} is not a compile-unit node")]
    InvalidRoot {
        /// The offending node.
        node: NodeRef,
    },

    /// A wire reference points at a key that does not exist.
    #[error("wire references unknown node key {key:?}")]
    BrokenWire {
        /// The dangling key.
        key: String,
    },

    /// A fragment wire points at an output the producer never declared.
    #[error("fragment {fragment} declares no output {output}")]
    MissingFragmentOutput {
        /// The producer fragment.
        fragment: FragmentId,
        /// The requested output index.
        output: usize,
    },

    /// A deferred upload reference string is malformed.
    #[error("malformed upload reference {reference:?}")]
    BadUploadReference {
        /// The raw reference text after the sentinel prefix.
        reference: String,
    },

    /// A deferred upload reference does not resolve to an uploaded source.
    #[error("upload reference {path}:{input} does not resolve to an uploaded source")]
    UnresolvedUploadReference {
        /// Host path named by the reference.
        path: String,
        /// Input index named by the reference.
        input: usize,
    },

    /// A string override interpolates a context variable that was not
    /// supplied.
    #[error("submit variable {name:?} not found")]
    VariableNotFound {
        /// The missing variable name.
        name: String,
    },

    /// An embedded graph template is not valid JSON.
    #[error("invalid graph template: {0}")]
    Template(#[from] serde_json::Error),

    /// Internal error.
    #[error("internal error: {0}")]
    Internal(String),
}
