// onion_core/src/store.rs
use std::fmt;
use std::io::Read;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::domain::{TaskId, TaskOutcome, TaskParams, TaskState};
use crate::error::Result;

/// Opaque handle to a stored artifact.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BlobRef(pub String);

impl fmt::Display for BlobRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// What a blob store currently holds.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlobUsage {
    pub bytes: u64,
    pub files: u64,
}

/// Point-in-time copy of a task record.
#[derive(Clone, Debug, Serialize)]
pub struct TaskSnapshot {
    pub id: TaskId,
    pub params: TaskParams,
    pub state: TaskState,
    pub progress: u8,
    pub status_text: String,
    pub logs: Vec<String>,
    pub outcome: Option<TaskOutcome>,
    pub cancel_requested: bool,
    pub result_deleted: bool,
    /// Unix seconds.
    pub created_at: i64,
    pub updated_at: i64,
}

/// Persistent task ledger. Progress and status text are for observers only;
/// the engine never reads them back.
pub trait TaskStore: Send + Sync {
    fn insert(&self, id: &TaskId, params: TaskParams) -> Result<()>;

    fn fetch_params(&self, id: &TaskId) -> Result<TaskParams>;

    fn append_log(&self, id: &TaskId, line: &str) -> Result<()>;

    fn set_progress(&self, id: &TaskId, percent: u8) -> Result<()>;

    fn set_status_text(&self, id: &TaskId, text: &str) -> Result<()>;

    /// Fails if the task already reached a terminal state.
    fn set_terminal(&self, id: &TaskId, outcome: TaskOutcome) -> Result<()>;

    fn cancel_requested(&self, id: &TaskId) -> Result<bool>;

    fn request_cancel(&self, id: &TaskId) -> Result<()>;

    fn snapshot(&self, id: &TaskId) -> Result<TaskSnapshot>;

    fn mark_result_deleted(&self, id: &TaskId) -> Result<()>;
}

pub trait BlobStore: Send + Sync {
    fn put(&self, path: &Path, filename: &str) -> Result<BlobRef>;

    fn open(&self, blob: &BlobRef) -> Result<Box<dyn Read + Send + '_>>;

    fn delete(&self, blob: &BlobRef) -> Result<()>;

    fn usage(&self) -> Result<BlobUsage>;
}
