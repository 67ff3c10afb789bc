//! Engine client credentials.

use derive_more::Debug;

/// Authentication credentials for the engine.
///
/// Local engine instances typically run unauthenticated; reverse-proxied
/// deployments usually front the API with a bearer token.
#[derive(Debug, Clone)]
pub enum EngineCredentials {
    /// Bearer token authentication.
    Bearer(#[debug(skip)] String),
    /// No authentication.
    None,
}

impl EngineCredentials {
    /// Create bearer token credentials.
    pub fn bearer(token: impl Into<String>) -> Self {
        Self::Bearer(token.into())
    }

    /// Create empty credentials for unauthenticated instances.
    pub fn none() -> Self {
        Self::None
    }
}
