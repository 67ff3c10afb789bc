//! Prelude module for convenient imports.
//!
//! This module re-exports commonly used types for ergonomic imports:
//!
//! ```rust
//! use promptweave_graph::prelude::*;
//! ```

pub use crate::compile::{CompiledJob, Compiler};
pub use crate::error::{CompileError, CompileResult};
pub use crate::fragment::{CompileState, Fragment, FragmentId, FragmentSet};
pub use crate::host::{
    FragmentCompiler, HostGraph, NodeCategory, NodeRef, OutputBinding, SlotBinding, SlotValue, Wire,
};
pub use crate::job::{JobGraph, JobMeta, JobNode, NodeKey};
pub use crate::memory::{MemoryGraph, MemoryNode};
pub use crate::upload::{ProcessingContext, UploadKey, UploadKind, UploadRecord, UploadSet};
pub use crate::value::OutputType;
