//! Submission orchestration.
//!
//! [`Orchestrator`] drives one compiled job through its lifecycle: upload
//! pending input assets, submit the graph, poll until the engine finishes,
//! download the declared outputs and optionally clean the temporary inputs
//! off the remote server. Cancellation is cooperative through a
//! [`CancellationToken`]; a cancelled wait sends a best-effort interrupt
//! before returning.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;
use strum::Display;
use tokio_util::sync::CancellationToken;

use promptweave_graph::compile::CompiledJob;
use promptweave_graph::job::NodeKey;
use promptweave_graph::upload::{UploadKey, UploadKind, UploadRecord, UploadSet};

use crate::client::EngineClient;
use crate::response::{HistoryEntry, NodeOutput, OutputAsset};
use crate::{EngineError, EngineResult, TRACING_TARGET_SUBMIT};

/// Phase of a running submission, surfaced through logging.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq)]
#[strum(serialize_all = "kebab-case")]
pub enum SubmissionState {
    /// Uploading pending input assets.
    Uploading,
    /// Sending the job graph to the engine.
    Submitting,
    /// Waiting for the engine to execute the job.
    Waiting,
    /// Downloading produced outputs.
    Downloading,
    /// Removing temporary inputs from the remote server.
    CleaningUp,
    /// All phases finished.
    Done,
}

/// Produces the local content of a pending upload.
#[async_trait]
pub trait AssetSource: Send + Sync {
    /// Fetch the bytes to upload for a record.
    async fn fetch(&self, key: &UploadKey, record: &UploadRecord) -> EngineResult<Bytes>;
}

/// Asset source for uploads that reference local files.
#[derive(Debug, Clone, Copy, Default)]
pub struct FileAssetSource;

#[async_trait]
impl AssetSource for FileAssetSource {
    async fn fetch(&self, _key: &UploadKey, record: &UploadRecord) -> EngineResult<Bytes> {
        match &record.kind {
            UploadKind::File { source_path } => {
                let content = tokio::fs::read(source_path).await?;
                Ok(Bytes::from(content))
            }
            // image and geometry captures come from the host application
            _ => Err(EngineError::AssetUnavailable {
                remote_name: record.remote_name.clone(),
            }),
        }
    }
}

/// Where one output slot's assets land on the local filesystem.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputTarget {
    /// Local file path.
    pub path: PathBuf,
    /// Whether the slot downloads every produced asset, numbering the
    /// files, instead of only the first.
    pub batch: bool,
}

impl OutputTarget {
    /// Target downloading only the slot's first asset.
    pub fn single(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            batch: false,
        }
    }

    /// Target downloading every asset of the slot.
    pub fn batch(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            batch: true,
        }
    }
}

/// Drives compiled jobs through upload, submission, wait, download and
/// remote cleanup.
#[derive(Debug, Clone)]
pub struct Orchestrator {
    client: EngineClient,
    cleanup: bool,
    cancel: CancellationToken,
}

impl Orchestrator {
    /// Creates an orchestrator over an engine client.
    pub fn new(client: EngineClient) -> Self {
        Self {
            client,
            cleanup: true,
            cancel: CancellationToken::new(),
        }
    }

    /// Sets whether temporary inputs are deleted after the job finishes.
    pub fn with_cleanup(mut self, cleanup: bool) -> Self {
        self.cleanup = cleanup;
        self
    }

    /// Supplies the cancellation token observed while waiting.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// The token that cancels a running submission.
    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Runs one compiled job end to end and returns the written files.
    ///
    /// Upload records in `job.uploads` are marked as completed in place,
    /// so re-running a failed submission skips finished uploads.
    pub async fn run(
        &self,
        job: &mut CompiledJob,
        source: &dyn AssetSource,
        targets: &[Option<OutputTarget>],
    ) -> EngineResult<Vec<PathBuf>> {
        tracing::info!(target: TRACING_TARGET_SUBMIT, state = %SubmissionState::Uploading, "Starting submission");
        self.upload_inputs(&mut job.uploads, source).await?;

        tracing::info!(target: TRACING_TARGET_SUBMIT, state = %SubmissionState::Submitting, "Inputs ready");
        let submitted = self.client.submit(&job.graph).await?;
        let prompt_id = submitted.prompt_id;

        tracing::info!(
            target: TRACING_TARGET_SUBMIT,
            state = %SubmissionState::Waiting,
            prompt_id = %prompt_id,
            "Job queued"
        );
        let entry = match self.wait(&prompt_id).await {
            Ok(entry) => entry,
            Err(error) => {
                // inputs are already remote; clean them up even when the
                // job itself did not finish
                if self.cleanup {
                    self.cleanup_remote(&job.uploads, &prompt_id).await;
                }
                return Err(error);
            }
        };

        tracing::info!(target: TRACING_TARGET_SUBMIT, state = %SubmissionState::Downloading, "Job finished");
        let outputs = collect_outputs(&entry, &job.outputs, &prompt_id)?;
        let written = self.download_outputs(&outputs, targets).await?;

        if self.cleanup {
            tracing::info!(target: TRACING_TARGET_SUBMIT, state = %SubmissionState::CleaningUp, "Removing temporary inputs");
            self.cleanup_remote(&job.uploads, &prompt_id).await;
        }

        tracing::info!(
            target: TRACING_TARGET_SUBMIT,
            state = %SubmissionState::Done,
            files = written.len(),
            "Submission complete"
        );
        Ok(written)
    }

    /// Uploads every pending record of the table, marking each as
    /// completed only after its upload call succeeds.
    pub async fn upload_inputs(
        &self,
        uploads: &mut UploadSet,
        source: &dyn AssetSource,
    ) -> EngineResult<()> {
        for (key, record) in uploads.iter_mut() {
            if record.uploaded {
                continue;
            }
            let content = source.fetch(key, record).await?;
            self.client.upload_image(&record.remote_name, content).await?;
            record.uploaded = true;
        }
        Ok(())
    }

    /// Polls until the submission leaves the queue and appears in the
    /// history, or until the cancellation token fires.
    pub async fn wait(&self, prompt_id: &str) -> EngineResult<HistoryEntry> {
        loop {
            // queue before history: a job finishing between a history read
            // and a queue read would look lost; this order cannot miss it
            let queued = self.client.queue_state().await?.contains(prompt_id);
            if !queued {
                return match self.client.history(prompt_id).await? {
                    Some(entry) => Ok(entry),
                    None => Err(EngineError::JobNotFound {
                        prompt_id: prompt_id.to_string(),
                    }),
                };
            }

            tokio::select! {
                _ = self.cancel.cancelled() => {
                    tracing::info!(
                        target: TRACING_TARGET_SUBMIT,
                        prompt_id,
                        "Cancellation requested, interrupting job"
                    );
                    if let Err(error) = self.client.interrupt(prompt_id).await {
                        tracing::warn!(
                            target: TRACING_TARGET_SUBMIT,
                            prompt_id,
                            %error,
                            "Best-effort interrupt failed"
                        );
                    }
                    return Err(EngineError::Cancelled);
                }
                _ = tokio::time::sleep(self.client.config().poll_interval) => {}
            }
        }
    }

    /// Downloads the assets of every targeted slot.
    async fn download_outputs(
        &self,
        outputs: &[Option<(NodeKey, NodeOutput)>],
        targets: &[Option<OutputTarget>],
    ) -> EngineResult<Vec<PathBuf>> {
        let mut written = Vec::new();
        for (slot, target) in targets.iter().enumerate() {
            let Some(target) = target else {
                continue;
            };
            let Some((key, output)) = outputs.get(slot).and_then(Option::as_ref) else {
                continue;
            };

            if target.batch {
                // a batch slot downloads whichever asset list the node
                // produced, numbering the local files
                let assets = if output.images.is_empty() {
                    &output.meshes
                } else {
                    &output.images
                };
                for (index, asset) in assets.iter().enumerate() {
                    let path = batch_filename(&target.path, index);
                    self.write_asset(asset, &path).await?;
                    written.push(path);
                }
            } else {
                let asset = output
                    .assets()
                    .next()
                    .ok_or_else(|| EngineError::NoAsset { key: key.clone() })?;
                self.write_asset(asset, &target.path).await?;
                written.push(target.path.clone());
            }
        }
        Ok(written)
    }

    /// Downloads one asset to a local path, replacing any previous file.
    async fn write_asset(&self, asset: &OutputAsset, path: &Path) -> EngineResult<()> {
        let content = self.client.download(&asset.filename, &asset.subfolder).await?;

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        match tokio::fs::remove_file(path).await {
            Ok(()) => {}
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => {}
            Err(error) => return Err(error.into()),
        }
        tokio::fs::write(path, content).await?;

        tracing::debug!(
            target: TRACING_TARGET_SUBMIT,
            filename = %asset.filename,
            path = %path.display(),
            "Wrote output asset"
        );
        Ok(())
    }

    /// Deletes the job's uploaded inputs and history record.
    ///
    /// Cleanup never fails the submission; every problem is only logged.
    /// Produced outputs stay on the remote server.
    pub async fn cleanup_remote(&self, uploads: &UploadSet, prompt_id: &str) {
        for (_, record) in uploads.iter() {
            if !record.uploaded {
                continue;
            }
            if let Err(error) = self.client.delete_image(&record.remote_name).await {
                tracing::warn!(
                    target: TRACING_TARGET_SUBMIT,
                    remote_name = %record.remote_name,
                    %error,
                    "Failed to delete temporary input"
                );
            }
        }
        if let Err(error) = self.client.delete_history(prompt_id).await {
            tracing::warn!(
                target: TRACING_TARGET_SUBMIT,
                prompt_id,
                %error,
                "Failed to delete job history"
            );
        }
    }
}

/// Picks each declared output slot's results out of the history entry.
///
/// A slot whose save node is absent from the finished job's outputs is a
/// hard error; `None` slots pass through untouched.
fn collect_outputs(
    entry: &HistoryEntry,
    declared: &[Option<NodeKey>],
    prompt_id: &str,
) -> EngineResult<Vec<Option<(NodeKey, NodeOutput)>>> {
    declared
        .iter()
        .map(|slot| match slot {
            Some(key) => entry
                .outputs
                .get(key)
                .cloned()
                .map(|output| Some((key.clone(), output)))
                .ok_or_else(|| EngineError::ResultNotFound {
                    prompt_id: prompt_id.to_string(),
                    key: key.clone(),
                }),
            None => Ok(None),
        })
        .collect()
}

/// Derives the local filename of the `index`-th asset of a batch slot by
/// inserting the index before the extension.
fn batch_filename(path: &Path, index: usize) -> PathBuf {
    let stem = path
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_default();
    let name = match path.extension() {
        Some(extension) => format!("{stem}.{index}.{}", extension.to_string_lossy()),
        None => format!("{stem}.{index}"),
    };
    path.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use promptweave_graph::host::NodeRef;
    use promptweave_graph::upload::ProcessingContext;

    fn upload_key() -> UploadKey {
        UploadKey {
            node: NodeRef::new(0),
            output: 0,
            context: ProcessingContext {
                frame: 0,
                bake_color_correction: true,
            },
        }
    }

    fn file_record(path: &Path) -> UploadRecord {
        UploadRecord {
            remote_name: "promptweave/test.png".to_string(),
            frame: None,
            uploaded: false,
            kind: UploadKind::File {
                source_path: path.to_path_buf(),
            },
        }
    }

    #[test]
    fn test_batch_filename_inserts_index() {
        assert_eq!(
            batch_filename(Path::new("/out/render.png"), 2),
            PathBuf::from("/out/render.2.png")
        );
        assert_eq!(
            batch_filename(Path::new("/out/render"), 0),
            PathBuf::from("/out/render.0")
        );
    }

    #[test]
    fn test_collect_outputs_filters_declared_slots() {
        let entry: HistoryEntry = serde_json::from_str(
            r#"{
                "outputs": {
                    "1_0": {"images": [{"filename": "a.png", "subfolder": ""}]},
                    "9_9": {"images": [{"filename": "extra.png", "subfolder": ""}]}
                }
            }"#,
        )
        .expect("deserialization failed");
        let declared = vec![None, Some("1_0".to_string())];

        let outputs = collect_outputs(&entry, &declared, "job").expect("collect failed");
        assert_eq!(outputs.len(), 2);
        assert!(outputs[0].is_none());
        let (key, output) = outputs[1].as_ref().expect("slot result");
        assert_eq!(key, "1_0");
        assert_eq!(output.images[0].filename, "a.png");
    }

    #[test]
    fn test_collect_outputs_missing_declared_slot() {
        let entry = HistoryEntry::default();
        let declared = vec![Some("1_0".to_string())];

        assert!(matches!(
            collect_outputs(&entry, &declared, "job"),
            Err(EngineError::ResultNotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_completed_uploads_are_not_repeated() {
        let client = EngineClient::offline(
            crate::EngineConfig::default(),
            crate::EngineCredentials::none(),
        )
        .expect("client failed");
        let orchestrator = Orchestrator::new(client);

        // an image capture cannot be fetched by the file source, so any
        // attempt to re-upload this record would fail loudly
        let mut uploads = UploadSet::new();
        uploads.insert(
            upload_key(),
            UploadRecord {
                remote_name: "promptweave/done.png".to_string(),
                frame: Some(0),
                uploaded: true,
                kind: UploadKind::Image {
                    bake_color_correction: true,
                },
            },
        );

        orchestrator
            .upload_inputs(&mut uploads, &FileAssetSource)
            .await
            .expect("completed records must be skipped");
        assert!(uploads.iter().all(|(_, record)| record.uploaded));
    }

    #[tokio::test]
    async fn test_file_asset_source_reads_local_file() {
        let dir = tempfile::tempdir().expect("tempdir failed");
        let path = dir.path().join("input.png");
        tokio::fs::write(&path, b"pixels").await.expect("write failed");

        let content = FileAssetSource
            .fetch(&upload_key(), &file_record(&path))
            .await
            .expect("fetch failed");
        assert_eq!(content.as_ref(), b"pixels");
    }

    #[tokio::test]
    async fn test_file_asset_source_rejects_host_captures() {
        let record = UploadRecord {
            remote_name: "promptweave/render.png".to_string(),
            frame: Some(1),
            uploaded: false,
            kind: UploadKind::Image {
                bake_color_correction: true,
            },
        };

        assert!(matches!(
            FileAssetSource.fetch(&upload_key(), &record).await,
            Err(EngineError::AssetUnavailable { .. })
        ));
    }

    #[test]
    fn test_submission_state_display() {
        assert_eq!(SubmissionState::CleaningUp.to_string(), "cleaning-up");
        assert_eq!(SubmissionState::Uploading.to_string(), "uploading");
    }
}
