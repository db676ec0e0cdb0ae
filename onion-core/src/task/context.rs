use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{error, info, info_span, warn};

use crate::config::EngineConfig;
use crate::crypto::password::delete_token;
use crate::domain::{
    CompressParams, DecompressParams, TaskId, TaskOutcome, TaskParams, TaskResult, TaskState,
};
use crate::error::{ErrorKind, OnionError, Result, invalid};
use crate::pack::writer::LayerWriter;
use crate::plan;
use crate::read::assemble::assemble;
use crate::read::extract::{Peeler, remove_path};
use crate::store::{BlobStore, TaskStore};
use crate::task::cancel::CancelToken;

/// Per-run bookkeeping, handed back to whoever waits on the task.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TaskRun {
    pub id: TaskId,
    pub state: TaskState,
    pub layers_completed: u32,
    pub total_layers: u32,
    pub extracted_bytes: u64,
}

/// Deletes the submitted source when dropped.
struct InputGuard {
    path: PathBuf,
}

impl Drop for InputGuard {
    fn drop(&mut self) {
        if self.path.exists() {
            if let Err(e) = remove_path(&self.path) {
                warn!(path = %self.path.display(), error = %e, "could not remove task input");
            }
        }
    }
}

/// Drives one task from `Running` to exactly one terminal state.
pub struct TaskContext {
    id: TaskId,
    store: Arc<dyn TaskStore>,
    blobs: Arc<dyn BlobStore>,
    config: Arc<EngineConfig>,
    cancel: CancelToken,
}

impl TaskContext {
    pub fn new(
        id: TaskId,
        store: Arc<dyn TaskStore>,
        blobs: Arc<dyn BlobStore>,
        config: Arc<EngineConfig>,
    ) -> Self {
        let cancel = CancelToken::new(Arc::clone(&store), id.clone());
        Self {
            id,
            store,
            blobs,
            config,
            cancel,
        }
    }

    /// Executes the task and publishes its terminal state. Never panics;
    /// a panic inside the engines is reported as an internal failure.
    pub fn run(self) -> TaskRun {
        let _span = info_span!("task", task = %self.id).entered();
        let mut run = TaskRun {
            id: self.id.clone(),
            state: TaskState::Running,
            layers_completed: 0,
            total_layers: 0,
            extracted_bytes: 0,
        };

        let result = panic::catch_unwind(AssertUnwindSafe(|| self.execute(&mut run)));
        let outcome = match result {
            Ok(Ok(res)) => {
                info!(filename = %res.filename, blob = %res.blob, "task succeeded");
                TaskOutcome::Succeeded(res)
            }
            Ok(Err(e)) => self.outcome_for(&e),
            Err(_) => {
                error!("task panicked");
                self.note_failure();
                TaskOutcome::Failed {
                    cause: "internal error".to_string(),
                }
            }
        };

        run.state = outcome.state();
        if let Err(e) = self.store.set_terminal(&self.id, outcome) {
            error!(error = %e, "could not publish terminal state");
        }
        run
    }

    fn execute(&self, run: &mut TaskRun) -> Result<TaskResult> {
        let params = self.store.fetch_params(&self.id)?;
        let _input = InputGuard {
            path: params.source().clone(),
        };
        let tasks_dir = self.config.tasks_dir();
        std::fs::create_dir_all(&tasks_dir)?;
        let work = tempfile::Builder::new()
            .prefix(&format!("{}_", self.id))
            .tempdir_in(&tasks_dir)?;

        match &params {
            TaskParams::Compress(p) => self.compress(p, work.path(), run),
            TaskParams::Decompress(p) => self.decompress(p, work.path(), run),
        }
    }

    fn compress(&self, p: &CompressParams, work: &Path, run: &mut TaskRun) -> Result<TaskResult> {
        let plan = plan::plan(&p.plan, &self.id, &self.config.policy)?;
        run.total_layers = plan.layers.len() as u32;
        let mut writer = LayerWriter::new(self.id.clone(), work, &p.source);

        for layer in &plan.layers {
            self.cancel.checkpoint()?;
            self.status(&format!(
                "compressing layer {}/{} (format: {})",
                layer.index, run.total_layers, layer.format
            ))?;
            writer.write_layer(layer)?;
            run.layers_completed = layer.index;
            self.progress(run)?;
        }
        self.status("compression finished")?;

        let artifact = writer.into_current();
        let filename = artifact
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| format!("{}.bin", self.id));
        let blob = self.blobs.put(&artifact, &filename)?;
        Ok(TaskResult {
            blob,
            filename,
            manifest: Some(plan.manifest.to_text()),
            delete_token: delete_token(),
        })
    }

    fn decompress(
        &self,
        p: &DecompressParams,
        work: &Path,
        run: &mut TaskRun,
    ) -> Result<TaskResult> {
        if p.entries.is_empty() {
            return Err(invalid("no usable manifest entries"));
        }
        run.total_layers = p.entries.len() as u32;
        let mut peeler = Peeler::new(
            work,
            &p.source,
            self.config.policy.extract_ceiling,
            p.master_password.clone(),
        );

        // Outermost layer was created last.
        for entry in p.entries.iter().rev() {
            self.cancel.checkpoint()?;
            self.status(&format!(
                "decompressing layer {}/{}",
                entry.index, run.total_layers
            ))?;
            let peeled = peeler.peel(entry);
            run.extracted_bytes = peeler.extracted_bytes();
            let peeled = peeled?;
            if peeled.discarded > 0 {
                warn!(layer = entry.index, discarded = peeled.discarded, "extra entries dropped");
                self.log(&format!(
                    "layer {} held {} extra entries; only the first was kept",
                    entry.index, peeled.discarded
                ))?;
            }
            run.layers_completed += 1;
            self.progress(run)?;
        }
        self.status("all layers peeled, checking final content")?;

        let result = peeler.into_current();
        let assembled = assemble(&result, &p.expected_filename, &work.join("out"))?;
        self.log(if assembled.repackaged {
            "multiple files found, packed into one zip"
        } else {
            "single file found, original name kept"
        })?;
        let blob = self.blobs.put(&assembled.path, &assembled.filename)?;
        self.status("task complete")?;
        Ok(TaskResult {
            blob,
            filename: assembled.filename,
            manifest: None,
            delete_token: delete_token(),
        })
    }

    fn outcome_for(&self, e: &OnionError) -> TaskOutcome {
        match e.kind() {
            ErrorKind::Cancelled => {
                info!("task cancelled");
                let _ = self.log("operation cancelled by user");
                let _ = self.store.set_status_text(&self.id, "cancelled");
                TaskOutcome::Cancelled
            }
            ErrorKind::Internal => {
                error!(error = ?e, "task failed");
                self.note_failure();
                TaskOutcome::Failed {
                    cause: e.public_cause(),
                }
            }
            _ => {
                warn!(error = %e, "task failed");
                let _ = self.log(&format!("failed: {e}"));
                self.note_failure();
                TaskOutcome::Failed {
                    cause: e.public_cause(),
                }
            }
        }
    }

    fn note_failure(&self) {
        let _ = self.store.set_status_text(&self.id, "task failed");
    }

    fn log(&self, line: &str) -> Result<()> {
        self.store.append_log(&self.id, line)
    }

    fn status(&self, text: &str) -> Result<()> {
        info!("{text}");
        self.store.append_log(&self.id, text)?;
        self.store.set_status_text(&self.id, text)
    }

    fn progress(&self, run: &TaskRun) -> Result<()> {
        self.store
            .set_progress(&self.id, percent(run.layers_completed, run.total_layers))
    }
}

pub fn percent(done: u32, total: u32) -> u8 {
    if total == 0 {
        return 0;
    }
    ((done as f64 / total as f64) * 100.0).round().min(100.0) as u8
}
