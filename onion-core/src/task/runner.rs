use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;
use tracing::{info, warn};

use crate::config::EngineConfig;
use crate::container::manifest::Manifest;
use crate::crypto::password::tokens_match;
use crate::domain::{CompressParams, DecompressParams, TaskId, TaskOutcome, TaskParams};
use crate::error::{OnionError, Result, invalid};
use crate::plan::PlanRequest;
use crate::store::{BlobStore, TaskSnapshot, TaskStore};
use crate::task::context::{TaskContext, TaskRun};
use crate::task::pool::{SlotGuard, TaskHandle, WorkerPool};
use crate::usage::StorageReport;
use crate::util::sanitize::sanitize_filename;
use crate::validate::{UploadKind, validate_upload};

#[derive(Clone, Debug)]
pub struct CompressRequest {
    /// Caller's file; the runner works on its own copy.
    pub source: PathBuf,
    /// Name the file was submitted under.
    pub filename: String,
    pub plan: PlanRequest,
}

#[derive(Clone, Debug)]
pub struct DecompressRequest {
    pub source: PathBuf,
    pub filename: String,
    pub manifest_text: String,
    pub master_password: Option<String>,
}

/// Outcome counts of [`Runner::delete_results`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct BatchDelete {
    pub deleted: usize,
    pub failed: usize,
}

pub struct Submitted {
    pub id: TaskId,
    pub handle: TaskHandle<TaskRun>,
}

/// Entry point for the request layer: validates, admits and launches tasks.
pub struct Runner {
    store: Arc<dyn TaskStore>,
    blobs: Arc<dyn BlobStore>,
    pool: WorkerPool,
    config: Arc<EngineConfig>,
}

impl Runner {
    pub fn new(
        config: EngineConfig,
        store: Arc<dyn TaskStore>,
        blobs: Arc<dyn BlobStore>,
    ) -> Result<Self> {
        fs::create_dir_all(config.uploads_dir())?;
        fs::create_dir_all(config.tasks_dir())?;
        let pool = WorkerPool::new(config.max_concurrent_tasks)?;
        Ok(Self {
            store,
            blobs,
            pool,
            config: Arc::new(config),
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn pool(&self) -> &WorkerPool {
        &self.pool
    }

    pub fn submit_compress(&self, req: CompressRequest) -> Result<Submitted> {
        let slot = self.pool.try_acquire()?;
        req.plan.validate(&self.config.policy)?;
        validate_upload(&req.source, &req.filename, UploadKind::Compress, &self.config.policy)?;

        let id = TaskId::new();
        let source_name = sanitize_filename(&req.filename);
        let staged = self.stage_copy(&id, &source_name, &req.source)?;
        let params = TaskParams::Compress(CompressParams {
            source: staged,
            source_name,
            plan: req.plan,
        });
        self.launch(slot, id, params)
    }

    pub fn submit_decompress(&self, req: DecompressRequest) -> Result<Submitted> {
        let slot = self.pool.try_acquire()?;
        validate_upload(&req.source, &req.filename, UploadKind::Decompress, &self.config.policy)?;
        let manifest = Manifest::parse(&req.manifest_text);
        if manifest.is_empty() {
            return Err(invalid("could not parse the password manifest"));
        }

        let id = TaskId::new();
        let expected_filename = sanitize_filename(&req.filename);
        let staged = self.stage_copy(&id, &expected_filename, &req.source)?;
        let params = TaskParams::Decompress(DecompressParams {
            source: staged,
            entries: manifest.entries,
            master_password: req.master_password,
            expected_filename,
        });
        self.launch(slot, id, params)
    }

    /// Decompresses the stored result of an earlier compression task, using
    /// the manifest recorded with it.
    pub fn submit_shared_decompress(
        &self,
        prior: &TaskId,
        master_password: Option<String>,
    ) -> Result<Submitted> {
        let slot = self.pool.try_acquire()?;
        let snap = self.store.snapshot(prior)?;
        let (source_name, result) = match (&snap.params, &snap.outcome) {
            (TaskParams::Compress(p), Some(TaskOutcome::Succeeded(r))) if !snap.result_deleted => {
                (p.source_name.clone(), r.clone())
            }
            _ => {
                return Err(invalid(format!(
                    "task {prior} has no compressed result to decompress"
                )));
            }
        };
        let manifest = Manifest::parse(result.manifest.as_deref().unwrap_or_default());
        if manifest.is_empty() {
            return Err(invalid(format!("task {prior} has no usable manifest")));
        }

        let id = TaskId::new();
        let staged = self.config.uploads_dir().join(format!(
            "share_{id}_{}",
            sanitize_filename(&result.filename)
        ));
        let copied = self.blobs.open(&result.blob).and_then(|mut blob| {
            io::copy(&mut blob, &mut File::create(&staged)?)?;
            Ok(())
        });
        if let Err(e) = copied {
            let _ = fs::remove_file(&staged);
            return Err(e);
        }
        let params = TaskParams::Decompress(DecompressParams {
            source: staged,
            entries: manifest.entries,
            master_password,
            expected_filename: source_name,
        });
        self.launch(slot, id, params)
    }

    pub fn cancel(&self, id: &TaskId) -> Result<()> {
        self.store.request_cancel(id)?;
        info!(task = %id, "cancellation requested");
        Ok(())
    }

    pub fn status(&self, id: &TaskId) -> Result<TaskSnapshot> {
        self.store.snapshot(id)
    }

    /// Removes a finished task's artifact, given the token issued with it.
    pub fn delete_result(&self, id: &TaskId, token: &str) -> Result<()> {
        let snap = self.store.snapshot(id)?;
        let Some(TaskOutcome::Succeeded(result)) = &snap.outcome else {
            return Err(invalid(format!("task {id} has no result")));
        };
        if snap.result_deleted {
            return Err(invalid(format!("result of task {id} was already deleted")));
        }
        if !tokens_match(token, &result.delete_token) {
            return Err(OnionError::InvalidToken);
        }
        self.blobs.delete(&result.blob)?;
        self.store.mark_result_deleted(id)?;
        info!(task = %id, "result deleted");
        Ok(())
    }

    /// Deletes each `(task, token)` pair independently. A missing token, bad
    /// token, unknown task or store error counts as a failure and the batch
    /// moves on.
    pub fn delete_results(&self, items: &[(TaskId, String)]) -> BatchDelete {
        let mut out = BatchDelete::default();
        for (id, token) in items {
            if token.is_empty() {
                out.failed += 1;
                continue;
            }
            match self.delete_result(id, token) {
                Ok(()) => out.deleted += 1,
                Err(e) => {
                    warn!(task = %id, error = %e, "batch delete entry failed");
                    out.failed += 1;
                }
            }
        }
        info!(deleted = out.deleted, failed = out.failed, "batch delete finished");
        out
    }

    /// Space taken by stored results against the configured quota.
    pub fn storage_stats(&self) -> Result<StorageReport> {
        let usage = self.blobs.usage()?;
        Ok(StorageReport::new(usage, self.config.policy.storage_quota_bytes))
    }

    fn stage_copy(&self, id: &TaskId, name: &str, src: &Path) -> Result<PathBuf> {
        let staged = self.config.uploads_dir().join(format!("{id}_{name}"));
        fs::copy(src, &staged)?;
        Ok(staged)
    }

    fn launch(&self, slot: SlotGuard, id: TaskId, params: TaskParams) -> Result<Submitted> {
        let source = params.source().clone();
        if let Err(e) = self.store.insert(&id, params) {
            let _ = fs::remove_file(&source);
            return Err(e);
        }
        info!(task = %id, in_flight = self.pool.in_flight(), "task submitted");

        let ctx = TaskContext::new(
            id.clone(),
            Arc::clone(&self.store),
            Arc::clone(&self.blobs),
            Arc::clone(&self.config),
        );
        let handle = self.pool.spawn(slot, move || ctx.run());
        Ok(Submitted { id, handle })
    }
}
