use serde::{Deserialize, Serialize};

use crate::store::BlobUsage;

/// Fill level of the blob store against its quota.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UsageLevel {
    Normal,
    /// 80% or more.
    Warning,
    /// 95% or more.
    Danger,
    /// At or over the quota; uploads should stop.
    Full,
}

impl UsageLevel {
    pub fn for_percent(percent: f64) -> Self {
        if percent >= 100.0 {
            UsageLevel::Full
        } else if percent >= 95.0 {
            UsageLevel::Danger
        } else if percent >= 80.0 {
            UsageLevel::Warning
        } else {
            UsageLevel::Normal
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StorageReport {
    pub used_bytes: u64,
    pub file_count: u64,
    pub quota_bytes: u64,
    /// Zero once the quota is used up.
    pub available_bytes: u64,
    /// Rounded to two decimals.
    pub usage_percent: f64,
    pub level: UsageLevel,
    pub can_upload: bool,
}

impl StorageReport {
    pub fn new(usage: BlobUsage, quota_bytes: u64) -> Self {
        let usage_percent = if quota_bytes == 0 {
            100.0
        } else {
            (usage.bytes as f64 / quota_bytes as f64 * 10_000.0).round() / 100.0
        };
        let level = UsageLevel::for_percent(usage_percent);
        Self {
            used_bytes: usage.bytes,
            file_count: usage.files,
            quota_bytes,
            available_bytes: quota_bytes.saturating_sub(usage.bytes),
            usage_percent,
            level,
            can_upload: level != UsageLevel::Full,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::MIB;

    fn report(bytes: u64) -> StorageReport {
        StorageReport::new(BlobUsage { bytes, files: 3 }, 512 * MIB)
    }

    #[test]
    fn thresholds() {
        assert_eq!(report(0).level, UsageLevel::Normal);
        assert_eq!(report(409 * MIB).level, UsageLevel::Normal);
        assert_eq!(report(410 * MIB).level, UsageLevel::Warning);
        assert_eq!(report(487 * MIB).level, UsageLevel::Danger);
        let full = report(600 * MIB);
        assert_eq!(full.level, UsageLevel::Full);
        assert!(!full.can_upload);
        assert_eq!(full.available_bytes, 0);
    }

    #[test]
    fn percent_and_remaining_space() {
        let r = report(128 * MIB);
        assert_eq!(r.usage_percent, 25.0);
        assert_eq!(r.available_bytes, 384 * MIB);
        assert_eq!(r.file_count, 3);
        assert!(r.can_upload);
        assert_eq!(report(MIB).usage_percent, 0.2);
    }

    #[test]
    fn zero_quota_is_full() {
        let r = StorageReport::new(BlobUsage::default(), 0);
        assert_eq!(r.level, UsageLevel::Full);
    }
}
