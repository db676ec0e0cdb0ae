#![forbid(unsafe_code)]

pub mod config;
pub mod domain;
pub mod error;
pub mod plan;
pub mod policy;
pub mod store;
pub mod store_fs;
pub mod store_mem;
pub mod task;
pub mod usage;
pub mod validate;

pub mod util {
    pub mod hashing_writer;
    pub mod sanitize;
}

pub mod codec;

pub mod crypto {
    pub mod password;
}

pub mod container {
    pub mod manifest;
}

pub mod pack {
    pub mod writer;
}

pub mod read {
    pub mod assemble;
    pub mod extract;
}

// Re-exports: stable API surface
pub use codec::ArchiveFormat;
pub use config::EngineConfig;
pub use container::manifest::Manifest;
pub use domain::{ManifestEntry, PasswordToken, TaskId, TaskOutcome, TaskState};
pub use error::{OnionError, Result};
pub use plan::{EncryptionPolicy, MasterPolicy, PlanRequest, plan};
pub use policy::Policy;
pub use store::{BlobRef, BlobStore, BlobUsage, TaskSnapshot, TaskStore};
pub use store_fs::FsBlobStore;
pub use store_mem::MemoryTaskStore;
pub use task::{BatchDelete, CompressRequest, DecompressRequest, Runner, Submitted, TaskRun};
pub use usage::{StorageReport, UsageLevel};
