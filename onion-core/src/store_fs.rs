use std::fs::{self, File};
use std::io::{self, Read};
use std::path::{Path, PathBuf};

use tracing::debug;
use uuid::Uuid;

use crate::error::{OnionError, Result, invalid};
use crate::store::{BlobRef, BlobStore, BlobUsage};
use crate::util::hashing_writer::HashingWriter;

/// Blob directory. A reference is `{blake3 hex}-{put id}`: the digest of the
/// stored bytes plus a per-put suffix, so equal results from two tasks are
/// two files and deleting one leaves the other readable.
pub struct FsBlobStore {
    root: PathBuf,
}

impl FsBlobStore {
    pub fn new(root: &Path) -> Result<Self> {
        fs::create_dir_all(root)?;
        Ok(Self {
            root: root.to_path_buf(),
        })
    }

    fn path_for(&self, blob: &BlobRef) -> Result<PathBuf> {
        if !is_blob_name(&blob.0) {
            return Err(OnionError::UnknownBlob(blob.0.clone()));
        }
        Ok(self.root.join(&blob.0))
    }
}

fn is_hex(s: &str, len: usize) -> bool {
    s.len() == len && s.bytes().all(|b| b.is_ascii_hexdigit())
}

fn is_blob_name(name: &str) -> bool {
    name.split_once('-')
        .is_some_and(|(digest, id)| is_hex(digest, 64) && is_hex(id, 32))
}

impl BlobStore for FsBlobStore {
    fn put(&self, path: &Path, filename: &str) -> Result<BlobRef> {
        // Never follow a link out of the task's work dir.
        if !fs::symlink_metadata(path)?.is_file() {
            return Err(invalid(format!("{} is not a regular file", path.display())));
        }
        let tmp = tempfile::NamedTempFile::new_in(&self.root)?;
        let mut w = HashingWriter::new(tmp);
        io::copy(&mut File::open(path)?, &mut w)?;
        let (tmp, digest, len) = w.finish();
        let blob = BlobRef(format!("{}-{}", digest.to_hex(), Uuid::new_v4().simple()));
        tmp.persist(self.root.join(&blob.0)).map_err(|e| e.error)?;
        debug!(blob = %blob, filename, bytes = len, "blob stored");
        Ok(blob)
    }

    fn open(&self, blob: &BlobRef) -> Result<Box<dyn Read + Send + '_>> {
        let f = File::open(self.path_for(blob)?)?;
        Ok(Box::new(f))
    }

    fn delete(&self, blob: &BlobRef) -> Result<()> {
        fs::remove_file(self.path_for(blob)?)?;
        Ok(())
    }

    fn usage(&self) -> Result<BlobUsage> {
        let mut usage = BlobUsage::default();
        for e in fs::read_dir(&self.root)? {
            let e = e?;
            let meta = fs::symlink_metadata(e.path())?;
            if meta.is_file() && e.file_name().to_str().is_some_and(is_blob_name) {
                usage.bytes += meta.len();
                usage.files += 1;
            }
        }
        Ok(usage)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn put_open_delete() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsBlobStore::new(&dir.path().join("blobs")).unwrap();
        let src = dir.path().join("artifact.zip");
        fs::write(&src, b"artifact bytes").unwrap();

        let blob = store.put(&src, "artifact.zip").unwrap();
        let digest = blake3::hash(b"artifact bytes").to_hex().to_string();
        assert!(blob.0.starts_with(&format!("{digest}-")));

        let mut body = Vec::new();
        store.open(&blob).unwrap().read_to_end(&mut body).unwrap();
        assert_eq!(body, b"artifact bytes");

        store.delete(&blob).unwrap();
        assert!(store.open(&blob).is_err());
        assert!(store.open(&BlobRef("../../etc/passwd".into())).is_err());
        assert!(store.open(&BlobRef(digest)).is_err());
    }

    #[test]
    fn equal_content_gets_separate_blobs() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsBlobStore::new(&dir.path().join("blobs")).unwrap();
        let src = dir.path().join("same.txt");
        fs::write(&src, b"same").unwrap();

        let a = store.put(&src, "a.txt").unwrap();
        let b = store.put(&src, "b.txt").unwrap();
        assert_ne!(a, b);
        store.delete(&a).unwrap();
        let mut body = String::new();
        store.open(&b).unwrap().read_to_string(&mut body).unwrap();
        assert_eq!(body, "same");
    }

    #[test]
    fn usage_counts_only_blobs() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("blobs");
        let store = FsBlobStore::new(&root).unwrap();
        assert_eq!(store.usage().unwrap(), BlobUsage::default());

        let src = dir.path().join("x.bin");
        fs::write(&src, vec![1u8; 100]).unwrap();
        store.put(&src, "x.bin").unwrap();
        store.put(&src, "y.bin").unwrap();
        fs::write(root.join("stray.txt"), b"not a blob").unwrap();

        assert_eq!(
            store.usage().unwrap(),
            BlobUsage {
                bytes: 200,
                files: 2
            }
        );
    }

    #[cfg(unix)]
    #[test]
    fn links_are_not_stored() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsBlobStore::new(&dir.path().join("blobs")).unwrap();
        let secret = dir.path().join("secret.txt");
        fs::write(&secret, b"host file").unwrap();
        let link = dir.path().join("result.txt");
        std::os::unix::fs::symlink(&secret, &link).unwrap();

        assert!(matches!(
            store.put(&link, "result.txt"),
            Err(OnionError::Validation(_))
        ));
        assert_eq!(store.usage().unwrap().files, 0);
    }
}
