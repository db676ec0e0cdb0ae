use std::fmt;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{OnionError, Result, corrupt, invalid};

pub mod sevenzc;
pub mod tarzst;
pub mod zipc;

pub const ZIP_MAGICS: [&[u8]; 3] = [b"PK\x03\x04", b"PK\x05\x06", b"PK\x07\x08"];
pub const SEVENZ_MAGIC: &[u8] = b"7z\xBC\xAF\x27\x1C";
pub const ZSTD_MAGIC: &[u8] = b"\x28\xB5\x2F\xFD";

/// Container backends. Each arm carries its own password capability, which
/// the planner and both engines consult instead of the format name.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ArchiveFormat {
    #[serde(rename = "zip")]
    Zip,
    #[serde(rename = "7z")]
    SevenZ,
    #[serde(rename = "tarzst")]
    TarZst,
}

impl ArchiveFormat {
    pub const DEFAULT_ROTATION: [ArchiveFormat; 3] =
        [ArchiveFormat::Zip, ArchiveFormat::SevenZ, ArchiveFormat::TarZst];

    pub fn name(self) -> &'static str {
        match self {
            ArchiveFormat::Zip => "zip",
            ArchiveFormat::SevenZ => "7z",
            ArchiveFormat::TarZst => "tarzst",
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            ArchiveFormat::Zip => ".zip",
            ArchiveFormat::SevenZ => ".7z",
            ArchiveFormat::TarZst => ".tar.zst",
        }
    }

    pub fn supports_password(self) -> bool {
        match self {
            ArchiveFormat::Zip | ArchiveFormat::SevenZ => true,
            ArchiveFormat::TarZst => false,
        }
    }

    pub fn from_filename(name: &str) -> Option<Self> {
        let lower = name.to_ascii_lowercase();
        if lower.ends_with(".zip") {
            Some(ArchiveFormat::Zip)
        } else if lower.ends_with(".7z") {
            Some(ArchiveFormat::SevenZ)
        } else if lower.ends_with(".tar.zst") || lower.ends_with(".zst") {
            Some(ArchiveFormat::TarZst)
        } else {
            None
        }
    }

    pub fn from_signature(header: &[u8]) -> Option<Self> {
        if ZIP_MAGICS.iter().any(|m| header.starts_with(m)) {
            Some(ArchiveFormat::Zip)
        } else if header.starts_with(SEVENZ_MAGIC) {
            Some(ArchiveFormat::SevenZ)
        } else if header.starts_with(ZSTD_MAGIC) {
            Some(ArchiveFormat::TarZst)
        } else {
            None
        }
    }

    /// Reads the leading bytes of `path` and matches them against known containers.
    pub fn sniff(path: &Path) -> Result<Option<Self>> {
        let header = read_header(path)?;
        Ok(Self::from_signature(&header))
    }

    /// Writes a new archive at `out` holding exactly one entry, `src`, under
    /// its own basename. The password is ignored by formats that cannot carry one.
    pub fn create(self, src: &Path, out: &Path, password: Option<&str>) -> Result<()> {
        let entry_name = src
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| invalid(format!("no usable file name: {}", src.display())))?;
        let password = password.filter(|_| self.supports_password());
        match self {
            ArchiveFormat::Zip => zipc::create(src, entry_name, out, password),
            ArchiveFormat::SevenZ => sevenzc::create(src, out, password),
            ArchiveFormat::TarZst => tarzst::create(src, entry_name, out, tarzst::DEFAULT_LEVEL),
        }
    }

    /// Unpacks every entry of `archive` below `dest`.
    pub fn extract(self, archive: &Path, dest: &Path, password: Option<&str>) -> Result<()> {
        match self {
            ArchiveFormat::Zip => zipc::extract(archive, dest, password),
            ArchiveFormat::SevenZ => sevenzc::extract(archive, dest, password),
            ArchiveFormat::TarZst => tarzst::extract(archive, dest),
        }
    }
}

impl fmt::Display for ArchiveFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ArchiveFormat {
    type Err = OnionError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "zip" => Ok(ArchiveFormat::Zip),
            "7z" => Ok(ArchiveFormat::SevenZ),
            "tarzst" | "tar.zst" => Ok(ArchiveFormat::TarZst),
            other => Err(invalid(format!("unknown archive format: {other:?}"))),
        }
    }
}

pub(crate) fn read_header(path: &Path) -> Result<Vec<u8>> {
    let mut header = Vec::with_capacity(8);
    File::open(path)?.take(8).read_to_end(&mut header)?;
    Ok(header)
}

/// Backend for a layer: the manifest's filename first, then the content signature.
pub fn resolve_format(archive_filename: &str, current: &Path) -> Result<ArchiveFormat> {
    if let Some(f) = ArchiveFormat::from_filename(archive_filename) {
        return Ok(f);
    }
    ArchiveFormat::sniff(current)?
        .ok_or_else(|| corrupt(format!("unrecognized container: {archive_filename}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capability_follows_variant() {
        assert!(ArchiveFormat::Zip.supports_password());
        assert!(ArchiveFormat::SevenZ.supports_password());
        assert!(!ArchiveFormat::TarZst.supports_password());
    }

    #[test]
    fn names_parse_back() {
        for f in ArchiveFormat::DEFAULT_ROTATION {
            assert_eq!(f.name().parse::<ArchiveFormat>().unwrap(), f);
        }
        assert_eq!("TAR.ZST".parse::<ArchiveFormat>().unwrap(), ArchiveFormat::TarZst);
        assert!("rar".parse::<ArchiveFormat>().is_err());
    }

    #[test]
    fn filename_and_signature_detection() {
        assert_eq!(ArchiveFormat::from_filename("a_layer_3.tar.zst"), Some(ArchiveFormat::TarZst));
        assert_eq!(ArchiveFormat::from_filename("X.ZIP"), Some(ArchiveFormat::Zip));
        assert_eq!(ArchiveFormat::from_filename("notes.txt"), None);
        assert_eq!(ArchiveFormat::from_signature(b"PK\x05\x06\0\0"), Some(ArchiveFormat::Zip));
        assert_eq!(
            ArchiveFormat::from_signature(b"7z\xBC\xAF\x27\x1C\0\x04"),
            Some(ArchiveFormat::SevenZ)
        );
        assert_eq!(ArchiveFormat::from_signature(b"hello"), None);
    }

    #[test]
    fn every_backend_round_trips_one_file() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("payload.bin");
        std::fs::write(&src, b"layered payload \x00\x01\x02").unwrap();

        for (i, f) in ArchiveFormat::DEFAULT_ROTATION.into_iter().enumerate() {
            let out = dir.path().join(format!("layer_{i}{}", f.extension()));
            let pw = f.supports_password().then_some("s3cretPassw0");
            f.create(&src, &out, pw).unwrap();
            assert_eq!(ArchiveFormat::sniff(&out).unwrap(), Some(f));

            let dest = dir.path().join(format!("out_{i}"));
            std::fs::create_dir_all(&dest).unwrap();
            f.extract(&out, &dest, pw).unwrap();
            assert_eq!(
                std::fs::read(dest.join("payload.bin")).unwrap(),
                b"layered payload \x00\x01\x02"
            );
        }
    }

    #[test]
    fn wrong_zip_password_is_corruption() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("a.txt");
        std::fs::write(&src, b"abc").unwrap();
        let out = dir.path().join("a.zip");
        ArchiveFormat::Zip.create(&src, &out, Some("right")).unwrap();

        let dest = dir.path().join("x");
        std::fs::create_dir_all(&dest).unwrap();
        let err = ArchiveFormat::Zip.extract(&out, &dest, Some("wrong")).unwrap_err();
        assert!(matches!(err, OnionError::CorruptArchive(_)));
        let err = ArchiveFormat::Zip.extract(&out, &dest, None).unwrap_err();
        assert!(matches!(err, OnionError::CorruptArchive(_)));
    }
}
