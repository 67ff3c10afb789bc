//! Engine client module.
//!
//! This module provides the HTTP client for the remote generative-compute
//! engine: job submission, queue and history inspection, asset transfer
//! and the housekeeping endpoints.

mod engine_client;
mod engine_config;
mod engine_credentials;

pub use engine_client::EngineClient;
pub use engine_config::{EngineBuilder, EngineConfig};
pub use engine_credentials::EngineCredentials;
