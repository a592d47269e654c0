//! The backing file currently receiving writes

use chrono::{DateTime, Local};
use rotastream_core::{FileOptions, OpenFlags};
use rotastream_watch::FileIdentity;
use std::fs::Metadata;
use std::io;
use std::path::{Path, PathBuf};
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tracing::warn;

/// Cached size/mtime of the backing file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FileSnapshot {
    pub size: u64,
    pub modified: Option<DateTime<Local>>,
    pub identity: Option<FileIdentity>,
}

impl FileSnapshot {
    /// Stand-in used when the file cannot be stat'ed
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn from_metadata(meta: &Metadata) -> Self {
        Self {
            size: meta.len(),
            modified: meta.modified().ok().map(DateTime::<Local>::from),
            identity: FileIdentity::of(meta),
        }
    }
}

/// An open backing file and its last known state
#[derive(Debug)]
pub struct BackingFile {
    path: PathBuf,
    file: File,
    snapshot: FileSnapshot,
}

impl BackingFile {
    /// Open (creating if needed) and snapshot the file.
    ///
    /// Resolves only once the file is open; a failed stat degrades to an
    /// empty snapshot instead of failing the open.
    pub async fn open(path: &Path, options: &FileOptions) -> io::Result<Self> {
        let mut open = OpenOptions::new();
        open.create(true);
        match options.flags {
            OpenFlags::Append => open.append(true),
            OpenFlags::Truncate => open.write(true).truncate(true),
        };
        #[cfg(unix)]
        if let Some(mode) = options.mode {
            open.mode(mode);
        }

        let file = open.open(path).await?;
        let snapshot = match file.metadata().await {
            Ok(meta) => FileSnapshot::from_metadata(&meta),
            Err(e) => {
                warn!("Failed to stat {}: {}", path.display(), e);
                FileSnapshot::empty()
            }
        };

        Ok(Self {
            path: path.to_path_buf(),
            file,
            snapshot,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn snapshot(&self) -> &FileSnapshot {
        &self.snapshot
    }

    /// Re-stat the open descriptor; keeps the cached snapshot on failure
    pub async fn refresh(&mut self) -> &FileSnapshot {
        match self.file.metadata().await {
            Ok(meta) => {
                // Keep the identity captured at open: it names the file we hold
                let identity = self.snapshot.identity;
                self.snapshot = FileSnapshot::from_metadata(&meta);
                self.snapshot.identity = identity.or(self.snapshot.identity);
            }
            Err(e) => warn!("Failed to stat {}: {}", self.path.display(), e),
        }
        &self.snapshot
    }

    /// Write the whole chunk and wait for it to reach the file
    pub async fn write(&mut self, data: &[u8]) -> io::Result<()> {
        self.file.write_all(data).await?;
        self.file.flush().await?;
        self.snapshot.size += data.len() as u64;
        Ok(())
    }

    /// Flush and release the descriptor, returning the final snapshot
    pub async fn close(mut self) -> io::Result<FileSnapshot> {
        self.file.flush().await?;
        self.refresh().await;
        Ok(self.snapshot)
    }
}
