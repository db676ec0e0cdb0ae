pub mod cancel;
pub mod context;
pub mod pool;
pub mod runner;

pub use cancel::CancelToken;
pub use context::{TaskContext, TaskRun};
pub use pool::{SlotGuard, TaskHandle, WorkerPool};
pub use runner::{BatchDelete, CompressRequest, DecompressRequest, Runner, Submitted};
