use serde::{Deserialize, Serialize};

pub const MIB: u64 = 1024 * 1024;
pub const GIB: u64 = 1024 * MIB;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Policy {
    /// Largest accepted source file, either direction.
    pub max_upload_bytes: u64,
    /// Cumulative extracted bytes across all peeled layers of one task.
    pub extract_ceiling: u64,
    pub max_iterations: u32,
    /// Space the blob store is expected to stay within; drives the usage level.
    pub storage_quota_bytes: u64,
}

impl Default for Policy {
    fn default() -> Self {
        Self {
            max_upload_bytes: 100 * MIB,
            extract_ceiling: GIB,
            max_iterations: 100,
            storage_quota_bytes: 512 * MIB,
        }
    }
}
