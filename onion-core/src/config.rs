use std::path::PathBuf;
use std::str::FromStr;

use crate::error::{Result, invalid};
use crate::policy::{MIB, Policy};

#[derive(Clone, Debug)]
pub struct EngineConfig {
    /// Uploads, per-task work directories and blobs live under here.
    pub work_dir: PathBuf,
    pub max_concurrent_tasks: usize,
    pub policy: Policy,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            work_dir: std::env::temp_dir().join("onion"),
            max_concurrent_tasks: 3,
            policy: Policy::default(),
        }
    }
}

impl EngineConfig {
    /// Defaults overridden by `ONION_WORK_DIR`, `MAX_CONCURRENT_TASKS`,
    /// `MAX_FILE_SIZE_MB`, `ONION_EXTRACT_CEILING` (bytes) and
    /// `ONION_STORAGE_QUOTA_MB`.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|k| std::env::var(k).ok())
    }

    pub fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut cfg = Self::default();
        if let Some(dir) = get("ONION_WORK_DIR") {
            cfg.work_dir = PathBuf::from(dir);
        }
        if let Some(v) = get("MAX_CONCURRENT_TASKS") {
            cfg.max_concurrent_tasks = parse_num("MAX_CONCURRENT_TASKS", &v)?;
        }
        if let Some(v) = get("MAX_FILE_SIZE_MB") {
            cfg.policy.max_upload_bytes = parse_num::<u64>("MAX_FILE_SIZE_MB", &v)? * MIB;
        }
        if let Some(v) = get("ONION_EXTRACT_CEILING") {
            cfg.policy.extract_ceiling = parse_num("ONION_EXTRACT_CEILING", &v)?;
        }
        if let Some(v) = get("ONION_STORAGE_QUOTA_MB") {
            cfg.policy.storage_quota_bytes =
                parse_num::<u64>("ONION_STORAGE_QUOTA_MB", &v)? * MIB;
        }
        if cfg.max_concurrent_tasks == 0 {
            return Err(invalid("MAX_CONCURRENT_TASKS must be at least 1"));
        }
        Ok(cfg)
    }

    pub fn uploads_dir(&self) -> PathBuf {
        self.work_dir.join("uploads")
    }

    pub fn tasks_dir(&self) -> PathBuf {
        self.work_dir.join("tasks")
    }

    pub fn blobs_dir(&self) -> PathBuf {
        self.work_dir.join("blobs")
    }
}

fn parse_num<T: FromStr>(key: &str, raw: &str) -> Result<T> {
    raw.trim()
        .parse()
        .map_err(|_| invalid(format!("{key}: expected a number, got {raw:?}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn env_overrides_defaults() {
        let vars: HashMap<&str, &str> = [
            ("ONION_WORK_DIR", "/var/lib/onion"),
            ("MAX_CONCURRENT_TASKS", "5"),
            ("MAX_FILE_SIZE_MB", "2"),
            ("ONION_STORAGE_QUOTA_MB", "64"),
        ]
        .into_iter()
        .collect();
        let cfg = EngineConfig::from_lookup(|k| vars.get(k).map(|v| v.to_string())).unwrap();
        assert_eq!(cfg.work_dir, PathBuf::from("/var/lib/onion"));
        assert_eq!(cfg.max_concurrent_tasks, 5);
        assert_eq!(cfg.policy.max_upload_bytes, 2 * MIB);
        assert_eq!(cfg.policy.storage_quota_bytes, 64 * MIB);
        assert_eq!(cfg.policy.extract_ceiling, Policy::default().extract_ceiling);
    }

    #[test]
    fn rejects_garbage_and_zero_workers() {
        fn only(key: &'static str, val: &'static str) -> impl Fn(&str) -> Option<String> {
            move |k| (k == key).then(|| val.to_string())
        }
        assert!(EngineConfig::from_lookup(only("MAX_FILE_SIZE_MB", "lots")).is_err());
        assert!(EngineConfig::from_lookup(only("MAX_CONCURRENT_TASKS", "0")).is_err());
    }
}
