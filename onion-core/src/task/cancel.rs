use std::sync::Arc;

use crate::domain::TaskId;
use crate::error::{OnionError, Result};
use crate::store::TaskStore;

/// Stop signal owned by the task store. Polled between layers only; a layer
/// that has started always runs to completion or failure.
#[derive(Clone)]
pub struct CancelToken {
    store: Arc<dyn TaskStore>,
    id: TaskId,
}

impl CancelToken {
    pub fn new(store: Arc<dyn TaskStore>, id: TaskId) -> Self {
        Self { store, id }
    }

    pub fn is_requested(&self) -> Result<bool> {
        self.store.cancel_requested(&self.id)
    }

    /// `Err(Cancelled)` once a stop has been requested.
    pub fn checkpoint(&self) -> Result<()> {
        if self.is_requested()? {
            return Err(OnionError::Cancelled);
        }
        Ok(())
    }
}
