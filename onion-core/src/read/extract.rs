use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;
use walkdir::WalkDir;

use crate::codec::resolve_format;
use crate::domain::{ManifestEntry, PasswordToken};
use crate::error::{OnionError, Result, corrupt};

/// Secret for one layer. A master-marked layer needs the caller's master password.
pub fn resolve_password(entry: &ManifestEntry, master: Option<&str>) -> Result<Option<String>> {
    match &entry.password {
        PasswordToken::None => Ok(None),
        PasswordToken::Explicit(p) => Ok(Some(p.clone())),
        PasswordToken::Master => master
            .filter(|m| !m.is_empty())
            .map(|m| Some(m.to_string()))
            .ok_or(OnionError::MissingMasterPassword { layer: entry.index }),
    }
}

#[derive(Clone, Debug)]
pub struct PeeledLayer {
    pub index: u32,
    pub layer_bytes: u64,
    pub total_bytes: u64,
    /// Top-level entries left behind in the scratch dir.
    pub discarded: usize,
}

/// Decompression side of a chain. Layers must be fed outermost first.
///
/// Only the first top-level entry of each extracted layer (by name) moves on
/// to the next layer; any siblings are dropped.
pub struct Peeler {
    work_dir: PathBuf,
    original: PathBuf,
    current: PathBuf,
    ceiling: u64,
    extracted: u64,
    master: Option<String>,
}

impl Peeler {
    pub fn new(work_dir: &Path, source: &Path, ceiling: u64, master: Option<String>) -> Self {
        Self {
            work_dir: work_dir.to_path_buf(),
            original: source.to_path_buf(),
            current: source.to_path_buf(),
            ceiling,
            extracted: 0,
            master,
        }
    }

    pub fn current(&self) -> &Path {
        &self.current
    }

    pub fn extracted_bytes(&self) -> u64 {
        self.extracted
    }

    pub fn peel(&mut self, entry: &ManifestEntry) -> Result<PeeledLayer> {
        let password = resolve_password(entry, self.master.as_deref())?;
        if self.current.is_dir() {
            return Err(corrupt(format!(
                "layer {}: expected an archive, found a directory",
                entry.index
            )));
        }
        let format = resolve_format(&entry.archive_filename, &self.current)?;

        // Removed on drop, whichever way this layer ends.
        let scratch = tempfile::Builder::new()
            .prefix(&format!("scratch_{}_", entry.index))
            .tempdir_in(&self.work_dir)?;
        format.extract(&self.current, scratch.path(), password.as_deref())?;

        let layer_bytes = tree_size(scratch.path())?;
        self.extracted = self.extracted.saturating_add(layer_bytes);
        if self.extracted > self.ceiling {
            return Err(OnionError::ZipBombExceeded {
                total: self.extracted,
                ceiling: self.ceiling,
            });
        }

        let mut children: Vec<PathBuf> = fs::read_dir(scratch.path())?
            .map(|e| e.map(|e| e.path()))
            .collect::<std::io::Result<_>>()?;
        children.sort();
        let Some(first) = children.first() else {
            return Err(OnionError::EmptyLayer { layer: entry.index });
        };

        let kind = fs::symlink_metadata(first)?.file_type();
        if !(kind.is_file() || kind.is_dir()) {
            return Err(corrupt(format!(
                "layer {}: extracted entry is not a regular file or directory",
                entry.index
            )));
        }

        let promoted = self.work_dir.join(format!("peeled_{}", entry.index));
        fs::rename(first, &promoted)?;
        if self.current != self.original {
            remove_path(&self.current)?;
        }
        self.current = promoted;

        debug!(
            layer = entry.index,
            format = %format,
            layer_bytes,
            total_bytes = self.extracted,
            "layer peeled"
        );
        Ok(PeeledLayer {
            index: entry.index,
            layer_bytes,
            total_bytes: self.extracted,
            discarded: children.len() - 1,
        })
    }

    pub fn into_current(self) -> PathBuf {
        self.current
    }
}

/// Sum of regular file sizes below `root`. Anything that is neither a regular
/// file nor a directory (symlinks included) is refused, so no extracted entry
/// can point outside the tree.
pub fn tree_size(root: &Path) -> Result<u64> {
    let mut total = 0u64;
    for e in WalkDir::new(root).follow_links(false) {
        let e = e.map_err(std::io::Error::other)?;
        let meta = fs::symlink_metadata(e.path())?;
        if meta.is_file() {
            total = total.saturating_add(meta.len());
        } else if !meta.is_dir() {
            let rel = e.path().strip_prefix(root).unwrap_or(e.path());
            return Err(corrupt(format!(
                "entry {} is not a regular file or directory",
                rel.display()
            )));
        }
    }
    Ok(total)
}

pub(crate) fn remove_path(p: &Path) -> std::io::Result<()> {
    if p.is_dir() {
        fs::remove_dir_all(p)
    } else {
        fs::remove_file(p)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::ArchiveFormat;

    fn entry(index: u32, name: &str, password: PasswordToken) -> ManifestEntry {
        ManifestEntry {
            index,
            archive_filename: name.into(),
            password,
        }
    }

    #[test]
    fn master_marker_needs_master() {
        let e = entry(4, "x.zip", PasswordToken::Master);
        assert!(matches!(
            resolve_password(&e, None),
            Err(OnionError::MissingMasterPassword { layer: 4 })
        ));
        assert!(resolve_password(&e, Some("")).is_err());
        assert_eq!(resolve_password(&e, Some("m")).unwrap().as_deref(), Some("m"));
        let plain = entry(1, "x.zip", PasswordToken::None);
        assert_eq!(resolve_password(&plain, Some("m")).unwrap(), None);
    }

    #[test]
    fn peels_and_counts_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("data.bin");
        fs::write(&src, vec![7u8; 4096]).unwrap();
        let archive = dir.path().join("a.zip");
        ArchiveFormat::Zip.create(&src, &archive, Some("pw")).unwrap();

        let work = dir.path().join("work");
        fs::create_dir_all(&work).unwrap();
        let mut p = Peeler::new(&work, &archive, 1 << 20, None);
        let out = p
            .peel(&entry(1, "a.zip", PasswordToken::Explicit("pw".into())))
            .unwrap();
        assert_eq!(out.layer_bytes, 4096);
        assert_eq!(out.discarded, 0);
        assert_eq!(fs::read(p.current()).unwrap(), vec![7u8; 4096]);
        // the submitted archive stays; the context owns its removal
        assert!(archive.exists());
        // scratch is gone
        let leftovers: Vec<_> = fs::read_dir(&work).unwrap().collect();
        assert_eq!(leftovers.len(), 1);
    }

    #[test]
    fn ceiling_trips_inside_the_oversized_layer() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("big.bin");
        fs::write(&src, vec![0u8; 64 * 1024]).unwrap();
        let archive = dir.path().join("big.tar.zst");
        ArchiveFormat::TarZst.create(&src, &archive, None).unwrap();

        let mut p = Peeler::new(dir.path(), &archive, 1024, None);
        let err = p
            .peel(&entry(1, "big.tar.zst", PasswordToken::None))
            .unwrap_err();
        assert!(matches!(
            err,
            OnionError::ZipBombExceeded { total: 65536, ceiling: 1024 }
        ));
        assert_eq!(p.current(), archive.as_path());
    }

    #[test]
    fn ceiling_trips_on_cumulative_growth() {
        let dir = tempfile::tempdir().unwrap();
        // incompressible, so the inner zip is about as large as its payload
        let mut x = 0x2545_f491_u32;
        let payload: Vec<u8> = (0..3000)
            .map(|_| {
                x ^= x << 13;
                x ^= x >> 17;
                x ^= x << 5;
                x as u8
            })
            .collect();
        let src = dir.path().join("payload.bin");
        fs::write(&src, &payload).unwrap();
        let inner = dir.path().join("inner.zip");
        ArchiveFormat::Zip.create(&src, &inner, None).unwrap();
        let outer = dir.path().join("outer.tar.zst");
        ArchiveFormat::TarZst.create(&inner, &outer, None).unwrap();

        let inner_len = fs::metadata(&inner).unwrap().len();
        let ceiling = inner_len + payload.len() as u64 - 1;
        let work = dir.path().join("work");
        fs::create_dir_all(&work).unwrap();

        let mut p = Peeler::new(&work, &outer, ceiling, None);
        let first = p
            .peel(&entry(2, "outer.tar.zst", PasswordToken::None))
            .unwrap();
        assert_eq!(first.layer_bytes, inner_len);
        assert!(first.total_bytes < ceiling);

        let err = p
            .peel(&entry(1, "inner.zip", PasswordToken::None))
            .unwrap_err();
        match err {
            OnionError::ZipBombExceeded { total, ceiling: c } => {
                assert_eq!(total, inner_len + 3000);
                assert_eq!(c, ceiling);
            }
            other => panic!("expected ceiling abort, got {other:?}"),
        }
    }

    #[cfg(unix)]
    #[test]
    fn symlink_entries_are_refused() {
        let dir = tempfile::tempdir().unwrap();
        let secret = dir.path().join("server_secret.txt");
        fs::write(&secret, b"SERVER-ONLY SECRET").unwrap();

        let archive = dir.path().join("evil.tar.zst");
        let enc = zstd::stream::Encoder::new(fs::File::create(&archive).unwrap(), 3).unwrap();
        let mut builder = tar::Builder::new(enc);
        let mut header = tar::Header::new_gnu();
        header.set_entry_type(tar::EntryType::Symlink);
        header.set_size(0);
        header.set_mode(0o777);
        builder
            .append_link(&mut header, "innocent.txt", &secret)
            .unwrap();
        builder.into_inner().unwrap().finish().unwrap();

        let work = dir.path().join("work");
        fs::create_dir_all(&work).unwrap();
        let mut p = Peeler::new(&work, &archive, u64::MAX, None);
        let err = p
            .peel(&entry(1, "evil.tar.zst", PasswordToken::None))
            .unwrap_err();
        assert!(matches!(err, OnionError::CorruptArchive(_)), "{err:?}");
        assert_eq!(p.current(), archive.as_path());
        assert_eq!(fs::read_dir(&work).unwrap().count(), 0);
    }

    #[cfg(unix)]
    #[test]
    fn nested_symlinks_fail_the_size_walk() {
        let dir = tempfile::tempdir().unwrap();
        let tree = dir.path().join("tree");
        fs::create_dir_all(tree.join("sub")).unwrap();
        fs::write(tree.join("sub/ok.txt"), b"ok").unwrap();
        assert_eq!(tree_size(&tree).unwrap(), 2);

        std::os::unix::fs::symlink("/etc/hostname", tree.join("sub/link")).unwrap();
        assert!(matches!(tree_size(&tree), Err(OnionError::CorruptArchive(_))));
    }

    #[test]
    fn first_entry_wins_and_empty_layers_fail() {
        let dir = tempfile::tempdir().unwrap();
        let tree = dir.path().join("tree");
        fs::create_dir_all(&tree).unwrap();
        let archive = dir.path().join("multi.tar.zst");
        ArchiveFormat::TarZst.create(&tree, &archive, None).unwrap();
        let work = dir.path().join("w");
        fs::create_dir_all(&work).unwrap();

        // an archive of an empty directory yields exactly one (empty) dir entry
        let mut p = Peeler::new(&work, &archive, u64::MAX, None);
        let peeled = p.peel(&entry(1, "multi.tar.zst", PasswordToken::None)).unwrap();
        assert_eq!(peeled.layer_bytes, 0);
        assert!(p.current().is_dir());

        let empty_zip = dir.path().join("empty.zip");
        zip::ZipWriter::new(fs::File::create(&empty_zip).unwrap())
            .finish()
            .unwrap();
        let mut p = Peeler::new(&work, &empty_zip, u64::MAX, None);
        assert!(matches!(
            p.peel(&entry(1, "empty.zip", PasswordToken::None)),
            Err(OnionError::EmptyLayer { layer: 1 })
        ));
    }
}
