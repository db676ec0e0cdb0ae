use std::fs::File;
use std::path::Path;

use crate::error::{Result, corrupt};

pub const DEFAULT_LEVEL: i32 = 3;

pub fn create(src: &Path, entry_name: &str, out: &Path, level: i32) -> Result<()> {
    let enc = zstd::stream::Encoder::new(File::create(out)?, level.max(1))?;
    let mut builder = tar::Builder::new(enc);
    if src.is_dir() {
        builder.append_dir_all(entry_name, src).map_err(corrupt)?;
    } else {
        builder.append_path_with_name(src, entry_name).map_err(corrupt)?;
    }
    let enc = builder.into_inner().map_err(corrupt)?;
    enc.finish().map_err(corrupt)?;
    Ok(())
}

/// `tar` refuses entries that would land outside `dest`.
pub fn extract(archive: &Path, dest: &Path) -> Result<()> {
    let dec = zstd::stream::Decoder::new(File::open(archive)?).map_err(corrupt)?;
    let mut ar = tar::Archive::new(dec);
    ar.unpack(dest).map_err(corrupt)
}
