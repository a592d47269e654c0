//! File identity checks: does a path still refer to the file we have open?

use std::fs::Metadata;
use std::io;
use std::path::Path;

/// Identity of an on-disk file, stable across renames
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FileIdentity {
    dev: u64,
    ino: u64,
}

impl FileIdentity {
    /// Identity from metadata (device and inode)
    #[cfg(unix)]
    pub fn of(meta: &Metadata) -> Option<Self> {
        use std::os::unix::fs::MetadataExt;
        Some(Self {
            dev: meta.dev(),
            ino: meta.ino(),
        })
    }

    /// Without inode numbers only a missing path can be detected
    #[cfg(not(unix))]
    pub fn of(_meta: &Metadata) -> Option<Self> {
        None
    }
}

/// What a path currently refers to, relative to an expected file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathStatus {
    /// Same file (or identity unknown)
    Same,
    /// A different file now lives at the path
    Replaced,
    /// Nothing lives at the path
    Missing,
}

impl PathStatus {
    pub fn is_changed(&self) -> bool {
        !matches!(self, PathStatus::Same)
    }
}

/// Compare what `path` refers to against `expected`
pub async fn check_path(path: &Path, expected: Option<FileIdentity>) -> io::Result<PathStatus> {
    match tokio::fs::metadata(path).await {
        Ok(meta) => match (expected, FileIdentity::of(&meta)) {
            (Some(expected), Some(actual)) if expected != actual => Ok(PathStatus::Replaced),
            _ => Ok(PathStatus::Same),
        },
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(PathStatus::Missing),
        Err(e) => Err(e),
    }
}
