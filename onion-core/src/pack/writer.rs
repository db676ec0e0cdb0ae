use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::domain::{LayerSpec, TaskId};
use crate::error::Result;
use crate::plan::layer_filename;

/// Compression side of a chain: each layer wraps the previous layer's
/// archive, which is then removed. The submitted source is never removed here.
pub struct LayerWriter {
    task: TaskId,
    work_dir: PathBuf,
    original: PathBuf,
    current: PathBuf,
}

impl LayerWriter {
    pub fn new(task: TaskId, work_dir: &Path, source: &Path) -> Self {
        Self {
            task,
            work_dir: work_dir.to_path_buf(),
            original: source.to_path_buf(),
            current: source.to_path_buf(),
        }
    }

    pub fn current(&self) -> &Path {
        &self.current
    }

    /// Creates the archive for `layer` around the current file and makes it current.
    pub fn write_layer(&mut self, layer: &LayerSpec) -> Result<&Path> {
        let out = self
            .work_dir
            .join(layer_filename(&self.task, layer.index, layer.format));
        layer
            .format
            .create(&self.current, &out, layer.password.as_deref())?;
        debug!(
            task = %self.task,
            layer = layer.index,
            format = %layer.format,
            encrypted = layer.password.is_some() && layer.format.supports_password(),
            "layer written"
        );
        if self.current != self.original {
            fs::remove_file(&self.current)?;
        }
        self.current = out;
        Ok(&self.current)
    }

    pub fn into_current(self) -> PathBuf {
        self.current
    }
}
