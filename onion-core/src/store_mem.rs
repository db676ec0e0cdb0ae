use dashmap::DashMap;
use time::OffsetDateTime;

use crate::domain::{TaskId, TaskOutcome, TaskParams, TaskState};
use crate::error::{OnionError, Result};
use crate::store::{TaskSnapshot, TaskStore};

#[derive(Clone, Debug)]
struct TaskRecord {
    params: TaskParams,
    state: TaskState,
    progress: u8,
    status_text: String,
    logs: Vec<String>,
    outcome: Option<TaskOutcome>,
    cancel_requested: bool,
    result_deleted: bool,
    created_at: i64,
    updated_at: i64,
}

/// Process-local task ledger, used by the CLI and tests.
#[derive(Default)]
pub struct MemoryTaskStore {
    tasks: DashMap<TaskId, TaskRecord>,
}

impl MemoryTaskStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    fn update<T>(&self, id: &TaskId, f: impl FnOnce(&mut TaskRecord) -> Result<T>) -> Result<T> {
        let mut rec = self
            .tasks
            .get_mut(id)
            .ok_or_else(|| OnionError::UnknownTask(id.to_string()))?;
        let out = f(&mut *rec)?;
        rec.updated_at = now();
        Ok(out)
    }
}

fn now() -> i64 {
    OffsetDateTime::now_utc().unix_timestamp()
}

impl TaskStore for MemoryTaskStore {
    fn insert(&self, id: &TaskId, params: TaskParams) -> Result<()> {
        let ts = now();
        self.tasks.insert(
            id.clone(),
            TaskRecord {
                params,
                state: TaskState::Running,
                progress: 0,
                status_text: "starting".to_string(),
                logs: Vec::new(),
                outcome: None,
                cancel_requested: false,
                result_deleted: false,
                created_at: ts,
                updated_at: ts,
            },
        );
        Ok(())
    }

    fn fetch_params(&self, id: &TaskId) -> Result<TaskParams> {
        self.tasks
            .get(id)
            .map(|r| r.params.clone())
            .ok_or_else(|| OnionError::UnknownTask(id.to_string()))
    }

    fn append_log(&self, id: &TaskId, line: &str) -> Result<()> {
        self.update(id, |r| {
            r.logs.push(line.to_string());
            Ok(())
        })
    }

    fn set_progress(&self, id: &TaskId, percent: u8) -> Result<()> {
        self.update(id, |r| {
            r.progress = percent.min(100);
            Ok(())
        })
    }

    fn set_status_text(&self, id: &TaskId, text: &str) -> Result<()> {
        self.update(id, |r| {
            r.status_text = text.to_string();
            Ok(())
        })
    }

    fn set_terminal(&self, id: &TaskId, outcome: TaskOutcome) -> Result<()> {
        self.update(id, |r| {
            if r.state.is_terminal() {
                return Err(OnionError::InvalidTransition(r.state));
            }
            r.state = outcome.state();
            if r.state == TaskState::Succeeded {
                r.progress = 100;
            }
            r.outcome = Some(outcome);
            Ok(())
        })
    }

    fn cancel_requested(&self, id: &TaskId) -> Result<bool> {
        self.tasks
            .get(id)
            .map(|r| r.cancel_requested)
            .ok_or_else(|| OnionError::UnknownTask(id.to_string()))
    }

    fn request_cancel(&self, id: &TaskId) -> Result<()> {
        self.update(id, |r| {
            r.cancel_requested = true;
            Ok(())
        })
    }

    fn snapshot(&self, id: &TaskId) -> Result<TaskSnapshot> {
        let r = self
            .tasks
            .get(id)
            .ok_or_else(|| OnionError::UnknownTask(id.to_string()))?;
        Ok(TaskSnapshot {
            id: id.clone(),
            params: r.params.clone(),
            state: r.state,
            progress: r.progress,
            status_text: r.status_text.clone(),
            logs: r.logs.clone(),
            outcome: r.outcome.clone(),
            cancel_requested: r.cancel_requested,
            result_deleted: r.result_deleted,
            created_at: r.created_at,
            updated_at: r.updated_at,
        })
    }

    fn mark_result_deleted(&self, id: &TaskId) -> Result<()> {
        self.update(id, |r| {
            r.result_deleted = true;
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::DecompressParams;

    fn params() -> TaskParams {
        TaskParams::Decompress(DecompressParams {
            source: "/tmp/in.zip".into(),
            entries: vec![],
            master_password: Some("m".into()),
            expected_filename: "in.zip".into(),
        })
    }

    #[test]
    fn terminal_states_are_sticky() {
        let store = MemoryTaskStore::new();
        let id = TaskId::new();
        store.insert(&id, params()).unwrap();
        store.set_terminal(&id, TaskOutcome::Cancelled).unwrap();
        let err = store
            .set_terminal(
                &id,
                TaskOutcome::Failed {
                    cause: "late".into(),
                },
            )
            .unwrap_err();
        assert!(matches!(err, OnionError::InvalidTransition(TaskState::Cancelled)));
        assert_eq!(store.snapshot(&id).unwrap().state, TaskState::Cancelled);
    }

    #[test]
    fn cancel_flag_and_logs() {
        let store = MemoryTaskStore::new();
        let id = TaskId::new();
        store.insert(&id, params()).unwrap();
        assert!(!store.cancel_requested(&id).unwrap());
        store.request_cancel(&id).unwrap();
        store.append_log(&id, "one").unwrap();
        store.set_progress(&id, 250).unwrap();
        let snap = store.snapshot(&id).unwrap();
        assert!(snap.cancel_requested);
        assert_eq!(snap.logs, vec!["one"]);
        assert_eq!(snap.progress, 100);
        assert!(store.cancel_requested(&TaskId::from("nope")).is_err());
    }
}
