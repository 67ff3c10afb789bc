//! Engine client implementation
//!
//! This module provides the main client interface for the remote engine's
//! HTTP API: job submission, queue and history inspection, asset transfer
//! and the housekeeping endpoints contributed by the companion extension.

use bytes::Bytes;
use reqwest::multipart::{Form, Part};
use reqwest::{Client as HttpClient, ClientBuilder, Method, StatusCode};
use serde_json::{json, Value};

use promptweave_graph::job::JobGraph;

use super::{EngineConfig, EngineCredentials};
use crate::response::{HistoryEntry, QueueState, SubmitResponse};
use crate::validation::ValidationFailure;
use crate::{EngineError, EngineResult, TRACING_TARGET_CLIENT};

/// Client for the remote generative-compute engine's HTTP API.
///
/// # Examples
///
/// ```rust
/// use promptweave_engine::{EngineClient, EngineConfig, EngineCredentials};
/// use std::time::Duration;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let config = EngineConfig::builder()
///     .with_base_url("http://127.0.0.1:8188")?
///     .with_timeout(Duration::from_secs(30))
///     .build()?;
///
/// let client = EngineClient::new(config, EngineCredentials::none()).await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct EngineClient {
    http_client: HttpClient,
    config: EngineConfig,
    credentials: EngineCredentials,
}

impl EngineClient {
    /// Create a new engine client with the given configuration and
    /// credentials.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be created or if the
    /// engine does not answer the initial health check.
    pub async fn new(config: EngineConfig, credentials: EngineCredentials) -> EngineResult<Self> {
        tracing::debug!(
            target: TRACING_TARGET_CLIENT,
            base_url = %config.base_url,
            "Creating engine client"
        );

        let client = Self::offline(config, credentials)?;
        client.health_check().await?;

        tracing::info!(
            target: TRACING_TARGET_CLIENT,
            "Engine client created successfully"
        );

        Ok(client)
    }

    /// Create an engine client without contacting the engine.
    ///
    /// Useful when the engine may not be reachable yet; call
    /// [`health_check`](Self::health_check) separately to verify
    /// connectivity.
    pub fn offline(config: EngineConfig, credentials: EngineCredentials) -> EngineResult<Self> {
        let http_client = ClientBuilder::new()
            .timeout(config.timeout)
            .connect_timeout(config.connect_timeout)
            .user_agent(&config.user_agent)
            .build()
            .map_err(EngineError::Http)?;

        Ok(Self {
            http_client,
            config,
            credentials,
        })
    }

    /// Create a new engine client with default configuration.
    pub async fn with_defaults(
        base_url: impl AsRef<str>,
        credentials: EngineCredentials,
    ) -> EngineResult<Self> {
        let config = EngineConfig::builder()
            .with_base_url(base_url.as_ref())?
            .build()
            .map_err(|e| EngineError::invalid_config(e.to_string()))?;

        Self::new(config, credentials).await
    }

    /// Verify that the engine is accessible and responding.
    pub async fn health_check(&self) -> EngineResult<()> {
        let response = self.request(Method::GET, "queue")?.send().await?;

        if response.status().is_success() {
            Ok(())
        } else {
            let status = response.status().as_u16();
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            Err(EngineError::api_error(status, message))
        }
    }

    /// Get the client configuration.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Submit a job graph for execution.
    ///
    /// A `400` response carrying the engine's structured validation report
    /// is surfaced as [`EngineError::Validation`].
    pub async fn submit(&self, graph: &JobGraph) -> EngineResult<SubmitResponse> {
        tracing::debug!(
            target: TRACING_TARGET_CLIENT,
            nodes = graph.len(),
            "Submitting job graph"
        );

        let response = self
            .request(Method::POST, "prompt")?
            .json(&json!({ "prompt": graph }))
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            let submitted: SubmitResponse = response.json().await?;
            // the engine sometimes accepts a job while still reporting
            // per-node problems; treat those as a rejection
            if submitted
                .node_errors
                .as_object()
                .is_some_and(|errors| !errors.is_empty())
            {
                return Err(ValidationFailure::new(
                    json!({ "node_errors": submitted.node_errors }),
                    graph,
                )
                .into());
            }
            tracing::info!(
                target: TRACING_TARGET_CLIENT,
                prompt_id = %submitted.prompt_id,
                "Job submitted"
            );
            return Ok(submitted);
        }

        let body = response.text().await.unwrap_or_default();
        if status == StatusCode::BAD_REQUEST {
            if let Ok(raw) = serde_json::from_str::<Value>(&body) {
                return Err(ValidationFailure::new(raw, graph).into());
            }
        }
        Err(EngineError::api_error(status.as_u16(), body))
    }

    /// Fetch the current execution queue.
    pub async fn queue_state(&self) -> EngineResult<QueueState> {
        let response = self.request(Method::GET, "queue")?.send().await?;
        self.decode(response).await
    }

    /// Fetch the history record of a submission, if it has finished.
    pub async fn history(&self, prompt_id: &str) -> EngineResult<Option<HistoryEntry>> {
        let response = self
            .request(Method::GET, &format!("history/{prompt_id}"))?
            .send()
            .await?;
        let mut body: Value = self.decode(response).await?;

        match body.get_mut(prompt_id) {
            Some(entry) => Ok(Some(serde_json::from_value(entry.take())?)),
            None => Ok(None),
        }
    }

    /// Download an output asset.
    pub async fn download(&self, filename: &str, subfolder: &str) -> EngineResult<Bytes> {
        tracing::debug!(
            target: TRACING_TARGET_CLIENT,
            filename,
            subfolder,
            "Downloading asset"
        );

        let response = self
            .request(Method::GET, "view")?
            .query(&[("filename", filename), ("subfolder", subfolder)])
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response.text().await.unwrap_or_default();
            return Err(EngineError::api_error(status, message));
        }
        Ok(response.bytes().await?)
    }

    /// Upload an input image under its remote name, overwriting any
    /// previous upload with the same name.
    pub async fn upload_image(&self, remote_name: &str, content: Bytes) -> EngineResult<()> {
        let (subfolder, filename) = match remote_name.rsplit_once('/') {
            Some((subfolder, filename)) => (subfolder, filename),
            None => ("", remote_name),
        };
        tracing::debug!(
            target: TRACING_TARGET_CLIENT,
            remote_name,
            size = content.len(),
            "Uploading input image"
        );

        let form = Form::new()
            .part(
                "image",
                Part::bytes(content.to_vec()).file_name(filename.to_string()),
            )
            .text("subfolder", subfolder.to_string())
            .text("overwrite", "1");

        let response = self
            .request(Method::POST, "upload/image")?
            .multipart(form)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response.text().await.unwrap_or_default();
            return Err(EngineError::api_error(status, message));
        }
        Ok(())
    }

    /// Delete a previously uploaded input asset through the companion
    /// extension's housekeeping endpoint.
    pub async fn delete_image(&self, remote_name: &str) -> EngineResult<()> {
        let (subfolder, filename) = match remote_name.rsplit_once('/') {
            Some((subfolder, filename)) => (subfolder, filename),
            None => ("", remote_name),
        };
        let path = format!("{}/image", self.config.housekeeping_namespace);

        let response = self
            .request(Method::DELETE, &path)?
            .json(&json!({
                "type": "input",
                "image_name": filename,
                "subfolder": subfolder,
            }))
            .send()
            .await?;

        match response.status() {
            status if status.is_success() => Ok(()),
            StatusCode::METHOD_NOT_ALLOWED => Err(EngineError::NotSupported {
                operation: "input asset deletion",
            }),
            StatusCode::BAD_REQUEST => Err(EngineError::DeleteRejected {
                remote_name: remote_name.to_string(),
            }),
            status => {
                let message = response.text().await.unwrap_or_default();
                Err(EngineError::api_error(status.as_u16(), message))
            }
        }
    }

    /// Delete a submission's history record.
    pub async fn delete_history(&self, prompt_id: &str) -> EngineResult<()> {
        let response = self
            .request(Method::POST, "history")?
            .json(&json!({ "delete": [prompt_id] }))
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response.text().await.unwrap_or_default();
            return Err(EngineError::api_error(status, message));
        }
        Ok(())
    }

    /// Interrupt a specific submission through the companion extension.
    pub async fn interrupt(&self, prompt_id: &str) -> EngineResult<()> {
        let path = format!("{}/interrupt", self.config.housekeeping_namespace);

        let response = self
            .request(Method::POST, &path)?
            .json(&json!({ "prompt_id": prompt_id }))
            .send()
            .await?;

        match response.status() {
            status if status.is_success() => Ok(()),
            StatusCode::METHOD_NOT_ALLOWED => Err(EngineError::NotSupported {
                operation: "targeted interrupt",
            }),
            status => {
                let message = response.text().await.unwrap_or_default();
                Err(EngineError::api_error(status.as_u16(), message))
            }
        }
    }

    /// Decode a JSON response body, surfacing non-success statuses first.
    async fn decode<T: serde::de::DeserializeOwned>(
        &self,
        response: reqwest::Response,
    ) -> EngineResult<T> {
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response.text().await.unwrap_or_default();
            return Err(EngineError::api_error(status, message));
        }
        Ok(response.json().await?)
    }

    /// Add authentication headers to a request.
    fn add_auth_headers(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.credentials {
            EngineCredentials::Bearer(token) => {
                request.header("Authorization", format!("Bearer {token}"))
            }
            EngineCredentials::None => request,
        }
    }

    /// Create a new request builder with base configuration.
    fn request(&self, method: Method, path: &str) -> EngineResult<reqwest::RequestBuilder> {
        let url = self
            .config
            .base_url
            .join(path)
            .map_err(|e| EngineError::invalid_config(format!("Invalid request URL: {e}")))?;

        Ok(self.add_auth_headers(self.http_client.request(method, url)))
    }
}
