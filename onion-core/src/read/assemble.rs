use std::fs;
use std::path::{Path, PathBuf};

use tracing::info;

use crate::codec::{ArchiveFormat, zipc};
use crate::error::Result;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Assembled {
    pub path: PathBuf,
    /// Name the artifact is published under.
    pub filename: String,
    pub repackaged: bool,
}

/// Turns the last peeled item into exactly one artifact. A directory is
/// zipped (unencrypted, paths relative to its root) and named after
/// `expected_filename` with a `.zip` extension; a single file is kept as-is
/// and takes `expected_filename` verbatim.
pub fn assemble(result: &Path, expected_filename: &str, out_dir: &Path) -> Result<Assembled> {
    if !result.is_dir() {
        info!(filename = expected_filename, "single file result kept");
        return Ok(Assembled {
            path: result.to_path_buf(),
            filename: expected_filename.to_string(),
            repackaged: false,
        });
    }

    let stem = Path::new(expected_filename)
        .file_stem()
        .and_then(|s| s.to_str())
        .filter(|s| !s.is_empty())
        .unwrap_or("output");
    let filename = format!("{stem}{}", ArchiveFormat::Zip.extension());
    fs::create_dir_all(out_dir)?;
    let path = out_dir.join(&filename);
    let files = zipc::create_tree(result, &path)?;
    info!(filename = %filename, files, "directory result repackaged");
    Ok(Assembled {
        path,
        filename,
        repackaged: true,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;

    #[test]
    fn single_file_keeps_submitted_name() {
        let dir = tempfile::tempdir().unwrap();
        let f = dir.path().join("peeled_1");
        fs::write(&f, b"x").unwrap();
        let a = assemble(&f, "holiday.jpg", &dir.path().join("out")).unwrap();
        assert_eq!(a.path, f);
        assert_eq!(a.filename, "holiday.jpg");
        assert!(!a.repackaged);
    }

    #[test]
    fn directory_becomes_one_zip_with_relative_paths() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("peeled_1");
        fs::create_dir_all(root.join("nested/deeper")).unwrap();
        fs::write(root.join("a.txt"), b"alpha").unwrap();
        fs::write(root.join("nested/deeper/b.txt"), b"beta").unwrap();

        let a = assemble(&root, "bundle.tar.zst", &dir.path().join("out")).unwrap();
        assert_eq!(a.filename, "bundle.tar.zip");
        assert!(a.repackaged);

        let mut zip = zip::ZipArchive::new(fs::File::open(&a.path).unwrap()).unwrap();
        let mut names: Vec<String> = zip.file_names().map(str::to_string).collect();
        names.sort();
        assert_eq!(names, vec!["a.txt", "nested/deeper/b.txt"]);
        let mut body = String::new();
        zip.by_name("nested/deeper/b.txt")
            .unwrap()
            .read_to_string(&mut body)
            .unwrap();
        assert_eq!(body, "beta");
    }
}
