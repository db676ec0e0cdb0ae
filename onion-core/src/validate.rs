use std::fs;
use std::path::Path;

use crate::codec::{ArchiveFormat, read_header};
use crate::error::{Result, invalid};
use crate::policy::Policy;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum UploadKind {
    Compress,
    Decompress,
}

/// Rejects oversized files and, for decompression, anything whose content
/// signature does not match its declared container.
pub fn validate_upload(
    path: &Path,
    declared_name: &str,
    kind: UploadKind,
    policy: &Policy,
) -> Result<()> {
    if declared_name.trim().is_empty() {
        return Err(invalid("file name must not be empty"));
    }
    let len = fs::metadata(path)?.len();
    if len > policy.max_upload_bytes {
        return Err(invalid(format!(
            "file is {len} bytes, above the {} byte limit",
            policy.max_upload_bytes
        )));
    }
    if kind == UploadKind::Compress {
        return Ok(());
    }

    let declared = ArchiveFormat::from_filename(declared_name)
        .ok_or_else(|| invalid(format!("unsupported archive type: {declared_name}")))?;
    let header = read_header(path)?;
    if ArchiveFormat::from_signature(&header) != Some(declared) {
        return Err(invalid(format!(
            "file claims to be {declared} but its content does not match"
        )));
    }
    Ok(())
}
