use thiserror::Error;

use crate::domain::TaskState;

#[derive(Error, Debug)]
pub enum OnionError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid request: {0}")]
    Validation(String),

    #[error("archive is corrupt or unreadable: {0}")]
    CorruptArchive(String),

    #[error("layer {layer} requires master password")]
    MissingMasterPassword { layer: u32 },

    #[error("no content found after extracting layer {layer}")]
    EmptyLayer { layer: u32 },

    #[error("extracted {total} bytes, over the {ceiling} byte ceiling; archive bomb aborted")]
    ZipBombExceeded { total: u64, ceiling: u64 },

    #[error("task was cancelled")]
    Cancelled,

    #[error("server busy: {capacity} tasks already in flight")]
    Busy { capacity: usize },

    #[error("task {0} not found")]
    UnknownTask(String),

    #[error("blob {0} not found")]
    UnknownBlob(String),

    #[error("task is already {0:?}; terminal states are final")]
    InvalidTransition(TaskState),

    #[error("delete token does not match")]
    InvalidToken,
}

/// Coarse classification used to pick a terminal state and the cause text
/// surfaced to callers.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    CorruptArchive,
    ZipBomb,
    Cancelled,
    Internal,
}

impl OnionError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            OnionError::Validation(_) | OnionError::Busy { .. } => ErrorKind::Validation,
            OnionError::CorruptArchive(_)
            | OnionError::MissingMasterPassword { .. }
            | OnionError::EmptyLayer { .. } => ErrorKind::CorruptArchive,
            OnionError::ZipBombExceeded { .. } => ErrorKind::ZipBomb,
            OnionError::Cancelled => ErrorKind::Cancelled,
            OnionError::Io(_)
            | OnionError::UnknownTask(_)
            | OnionError::UnknownBlob(_)
            | OnionError::InvalidTransition(_)
            | OnionError::InvalidToken => ErrorKind::Internal,
        }
    }

    /// Text safe to show to the submitter. Internal failures never leak detail.
    pub fn public_cause(&self) -> String {
        match self.kind() {
            ErrorKind::Internal => "internal error".to_string(),
            _ => self.to_string(),
        }
    }
}

pub(crate) fn corrupt(e: impl std::fmt::Display) -> OnionError {
    OnionError::CorruptArchive(e.to_string())
}

pub(crate) fn invalid(msg: impl Into<String>) -> OnionError {
    OnionError::Validation(msg.into())
}

// Convenient crate-wide result type
pub type Result<T> = std::result::Result<T, OnionError>;
