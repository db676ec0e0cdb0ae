// onion_core/src/domain.rs
use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::codec::ArchiveFormat;
use crate::plan::PlanRequest;
use crate::store::BlobRef;

/// Opaque task identifier; also the namespace for every path a task touches.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TaskId(String);

impl TaskId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().simple().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TaskId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// One planned compression layer. Consumed once by the compression engine.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LayerSpec {
    /// 1-based
    pub index: u32,
    pub format: ArchiveFormat,
    /// Resolved secret for this layer, master password included.
    pub password: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum PasswordToken {
    None,
    /// Secret supplied by the caller at runtime; never written to the manifest.
    Master,
    Explicit(String),
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub index: u32,
    pub archive_filename: String,
    pub password: PasswordToken,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskState {
    Running,
    Succeeded,
    Failed,
    Cancelled,
}

impl TaskState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskState::Succeeded | TaskState::Failed | TaskState::Cancelled
        )
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CompressParams {
    /// Uploaded file; deleted by the task on every exit path.
    pub source: PathBuf,
    /// Sanitized name the file was submitted under.
    pub source_name: String,
    pub plan: PlanRequest,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DecompressParams {
    pub source: PathBuf,
    pub entries: Vec<ManifestEntry>,
    #[serde(skip_serializing, default)]
    pub master_password: Option<String>,
    /// Name of the single-file result, or the stem of the repackaged archive.
    pub expected_filename: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TaskParams {
    Compress(CompressParams),
    Decompress(DecompressParams),
}

impl TaskParams {
    pub fn source(&self) -> &PathBuf {
        match self {
            TaskParams::Compress(p) => &p.source,
            TaskParams::Decompress(p) => &p.source,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TaskResult {
    pub blob: BlobRef,
    pub filename: String,
    /// Present for compression tasks only.
    pub manifest: Option<String>,
    pub delete_token: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum TaskOutcome {
    Succeeded(TaskResult),
    Failed { cause: String },
    Cancelled,
}

impl TaskOutcome {
    pub fn state(&self) -> TaskState {
        match self {
            TaskOutcome::Succeeded(_) => TaskState::Succeeded,
            TaskOutcome::Failed { .. } => TaskState::Failed,
            TaskOutcome::Cancelled => TaskState::Cancelled,
        }
    }
}
