//! Prelude module for convenient imports.
//!
//! This module re-exports commonly used types for ergonomic imports:
//!
//! ```rust
//! use promptweave_engine::prelude::*;
//! ```

pub use crate::client::{EngineBuilder, EngineClient, EngineConfig, EngineCredentials};
pub use crate::error::{EngineError, EngineResult};
pub use crate::response::{HistoryEntry, NodeOutput, OutputAsset, QueueState, SubmitResponse};
pub use crate::submit::{AssetSource, FileAssetSource, Orchestrator, OutputTarget, SubmissionState};
pub use crate::validation::ValidationFailure;
