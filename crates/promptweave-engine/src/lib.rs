#![forbid(unsafe_code)]
#![cfg_attr(docsrs, feature(doc_cfg))]
#![doc = include_str!("../README.md")]

/// Tracing target for the main library
pub const TRACING_TARGET: &str = "promptweave_engine";

/// Tracing target for client operations
pub const TRACING_TARGET_CLIENT: &str = "promptweave_engine::client";

/// Tracing target for submission orchestration
pub const TRACING_TARGET_SUBMIT: &str = "promptweave_engine::submit";

mod client;
mod error;
#[doc(hidden)]
pub mod prelude;
pub mod response;
pub mod submit;
pub mod validation;

pub use crate::client::{EngineBuilder, EngineClient, EngineConfig, EngineCredentials};
pub use crate::error::{EngineError, EngineResult};
pub use crate::submit::{AssetSource, FileAssetSource, Orchestrator, OutputTarget, SubmissionState};
pub use crate::validation::ValidationFailure;
