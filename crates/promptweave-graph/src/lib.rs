#![forbid(unsafe_code)]
#![cfg_attr(docsrs, feature(doc_cfg))]
#![doc = include_str!("../README.md")]

pub mod compile;
mod error;
pub mod fragment;
pub mod host;
pub mod job;
pub mod memory;
pub mod merge;
pub mod resolve;
pub mod substitute;
pub mod templates;
pub mod upload;
pub mod value;

#[doc(hidden)]
pub mod prelude;

pub use compile::{CompiledJob, Compiler};
pub use error::{CompileError, CompileResult};
pub use host::{HostGraph, NodeRef};

/// Tracing target for compiler operations.
pub const TRACING_TARGET: &str = "promptweave_graph";
