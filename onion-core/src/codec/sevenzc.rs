use std::path::Path;

use sevenz_rust::Password;

use crate::error::{Result, corrupt};

/// The entry is stored under the basename of `src`.
pub fn create(src: &Path, out: &Path, password: Option<&str>) -> Result<()> {
    match password {
        Some(pw) => sevenz_rust::compress_to_path_encrypted(src, out, Password::from(pw)),
        None => sevenz_rust::compress_to_path(src, out),
    }
    .map_err(corrupt)
}

pub fn extract(archive: &Path, dest: &Path, password: Option<&str>) -> Result<()> {
    match password {
        Some(pw) => sevenz_rust::decompress_file_with_password(archive, dest, Password::from(pw)),
        None => sevenz_rust::decompress_file(archive, dest),
    }
    .map_err(corrupt)
}
