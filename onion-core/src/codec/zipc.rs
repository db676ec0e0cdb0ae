use std::fs::{self, File};
use std::io;
use std::path::Path;

use zip::write::SimpleFileOptions;
use zip::{AesMode, CompressionMethod, ZipArchive, ZipWriter};

use crate::error::{Result, corrupt};

pub fn create(src: &Path, entry_name: &str, out: &Path, password: Option<&str>) -> Result<()> {
    let mut input = File::open(src)?;
    let mut zip = ZipWriter::new(File::create(out)?);
    let base = SimpleFileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .large_file(true);
    let options = match password {
        Some(pw) => base.with_aes_encryption(AesMode::Aes256, pw),
        None => base,
    };
    zip.start_file(entry_name, options).map_err(corrupt)?;
    io::copy(&mut input, &mut zip).map_err(corrupt)?;
    zip.finish().map_err(corrupt)?;
    Ok(())
}

pub fn extract(archive: &Path, dest: &Path, password: Option<&str>) -> Result<()> {
    let mut zip = ZipArchive::new(File::open(archive)?).map_err(corrupt)?;
    for i in 0..zip.len() {
        let encrypted = zip.by_index_raw(i).map_err(corrupt)?.encrypted();
        let mut entry = match (encrypted, password) {
            (true, Some(pw)) => zip.by_index_decrypt(i, pw.as_bytes()).map_err(corrupt)?,
            (true, None) => return Err(corrupt("entry is encrypted but the layer has no password")),
            (false, _) => zip.by_index(i).map_err(corrupt)?,
        };
        let rel = entry
            .enclosed_name()
            .ok_or_else(|| corrupt(format!("unsafe entry path: {}", entry.name())))?;
        let outp = dest.join(rel);
        if entry.is_dir() {
            fs::create_dir_all(&outp)?;
            continue;
        }
        if let Some(parent) = outp.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut out = File::create(&outp)?;
        // Bad AES MACs and truncated deflate streams surface here as io errors.
        io::copy(&mut entry, &mut out).map_err(corrupt)?;
    }
    Ok(())
}

/// Writes every regular file under `root` into an unencrypted zip, with entry
/// paths relative to `root`.
pub fn create_tree(root: &Path, out: &Path) -> Result<u64> {
    let mut zip = ZipWriter::new(File::create(out)?);
    let options = SimpleFileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .large_file(true);
    let mut files = 0u64;
    for e in walkdir::WalkDir::new(root).follow_links(false).sort_by_file_name() {
        let e = e.map_err(io::Error::other)?;
        if !e.file_type().is_file() {
            continue;
        }
        let rel = e.path().strip_prefix(root).map_err(io::Error::other)?;
        let name = rel
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");
        zip.start_file(name, options).map_err(corrupt)?;
        io::copy(&mut File::open(e.path())?, &mut zip).map_err(corrupt)?;
        files += 1;
    }
    zip.finish().map_err(corrupt)?;
    Ok(files)
}
