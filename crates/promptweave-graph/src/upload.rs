//! Upload table and deduplication.
//!
//! Raw external sources feeding a compile are captured once per distinct
//! (source identity, processing context) pair and uploaded to the remote
//! engine under a fresh temporary filename. The table may outlive a single
//! compile when the caller reuses it across retried submissions.

use std::collections::HashMap;
use std::path::PathBuf;

use uuid::Uuid;

use crate::host::NodeRef;

/// Namespace prefix of remote temporary filenames.
pub const UPLOAD_NAMESPACE: &str = "promptweave";

/// Identifies *how* a raw source must be captured; equal contexts on the
/// same source share one upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProcessingContext {
    /// Frame at which the source is captured.
    pub frame: i64,
    /// Whether color correction is baked into the capture.
    pub bake_color_correction: bool,
}

/// Unique key into the upload table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct UploadKey {
    /// Source node in the host graph.
    pub node: NodeRef,
    /// Output connector on the source node.
    pub output: usize,
    /// Capture context.
    pub context: ProcessingContext,
}

/// What kind of asset an upload record carries.
#[derive(Debug, Clone, PartialEq)]
pub enum UploadKind {
    /// Rendered image capture.
    Image {
        /// Whether color correction is baked into the render.
        bake_color_correction: bool,
    },
    /// Geometry capture.
    Geometry,
    /// Arbitrary file taken from the local filesystem.
    File {
        /// Local path the content is read from.
        source_path: PathBuf,
    },
}

/// One pending or completed upload.
#[derive(Debug, Clone, PartialEq)]
pub struct UploadRecord {
    /// Remote temporary filename, `{namespace}/{uuid}.png`.
    pub remote_name: String,
    /// Frame the capture belongs to, when frame-dependent.
    pub frame: Option<i64>,
    /// Set to true exactly once, after the upload call succeeds. Reused
    /// records skip re-uploading on a retried submission.
    pub uploaded: bool,
    /// Asset kind.
    pub kind: UploadKind,
}

impl UploadRecord {
    /// Splits the remote name into (subfolder, filename) on the last `/`.
    pub fn subfolder_and_name(&self) -> (&str, &str) {
        match self.remote_name.rsplit_once('/') {
            Some((subfolder, name)) => (subfolder, name),
            None => ("", &self.remote_name),
        }
    }
}

/// Upload table for one compile+submit cycle.
///
/// The invariant is at most one record per key; callers confine a reused
/// set to one submission at a time.
#[derive(Debug, Clone, Default)]
pub struct UploadSet {
    records: HashMap<UploadKey, UploadRecord>,
}

impl UploadSet {
    /// Creates an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the record for a key, if present.
    pub fn get(&self, key: &UploadKey) -> Option<&UploadRecord> {
        self.records.get(key)
    }

    /// Looks up or creates the image upload for a key, allocating a fresh
    /// remote filename on first request.
    pub fn ensure_image(&mut self, key: UploadKey) -> &UploadRecord {
        self.records.entry(key).or_insert_with(|| UploadRecord {
            remote_name: allocate_remote_name(),
            frame: Some(key.context.frame),
            uploaded: false,
            kind: UploadKind::Image {
                bake_color_correction: key.context.bake_color_correction,
            },
        })
    }

    /// Registers a record under a key, replacing any previous one.
    pub fn insert(&mut self, key: UploadKey, record: UploadRecord) {
        self.records.insert(key, record);
    }

    /// Iterates all records.
    pub fn iter(&self) -> impl Iterator<Item = (&UploadKey, &UploadRecord)> {
        self.records.iter()
    }

    /// Iterates all records mutably.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = (&UploadKey, &mut UploadRecord)> {
        self.records.iter_mut()
    }

    /// Number of records.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Returns whether the table is empty.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

fn allocate_remote_name() -> String {
    format!("{UPLOAD_NAMESPACE}/{}.png", Uuid::new_v4())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(node: u64, output: usize, frame: i64, bake_cc: bool) -> UploadKey {
        UploadKey {
            node: NodeRef::new(node),
            output,
            context: ProcessingContext {
                frame,
                bake_color_correction: bake_cc,
            },
        }
    }

    #[test]
    fn test_dedup_same_context() {
        let mut uploads = UploadSet::new();
        let first = uploads.ensure_image(key(1, 0, 10, true)).remote_name.clone();
        let second = uploads.ensure_image(key(1, 0, 10, true)).remote_name.clone();
        assert_eq!(first, second);
        assert_eq!(uploads.len(), 1);
    }

    #[test]
    fn test_distinct_context_distinct_upload() {
        let mut uploads = UploadSet::new();
        uploads.ensure_image(key(1, 0, 10, true));
        uploads.ensure_image(key(1, 0, 11, true));
        uploads.ensure_image(key(1, 0, 10, false));
        uploads.ensure_image(key(1, 1, 10, true));
        assert_eq!(uploads.len(), 4);
    }

    #[test]
    fn test_remote_name_shape() {
        let mut uploads = UploadSet::new();
        let record = uploads.ensure_image(key(1, 0, 0, true)).clone();
        assert!(record.remote_name.starts_with("promptweave/"));
        assert!(record.remote_name.ends_with(".png"));
        let (subfolder, name) = record.subfolder_and_name();
        assert_eq!(subfolder, "promptweave");
        assert!(name.ends_with(".png"));
    }
}
