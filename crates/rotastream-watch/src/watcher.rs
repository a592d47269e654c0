//! Filesystem watcher using notify
//!
//! The parent directory is watched rather than the file itself, so a rename
//! of the file is reported against the path we care about instead of
//! following the inode to its new name.

use notify::event::ModifyKind;
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher as NotifyWatcher};
use rotastream_core::{Error, Result};
use std::path::{Path, PathBuf};
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, trace};

/// Kind of change seen on the watched path
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchEventKind {
    Create,
    Remove,
    Rename,
    Other,
}

impl WatchEventKind {
    /// Content changes and accesses are not interesting: the writer makes them itself
    pub fn classify(kind: &EventKind) -> Option<Self> {
        match kind {
            EventKind::Create(_) => Some(WatchEventKind::Create),
            EventKind::Remove(_) => Some(WatchEventKind::Remove),
            EventKind::Modify(ModifyKind::Name(_)) => Some(WatchEventKind::Rename),
            EventKind::Modify(_) | EventKind::Access(_) => None,
            EventKind::Any | EventKind::Other => Some(WatchEventKind::Other),
        }
    }
}

/// Change notification for a watched path
#[derive(Debug, Clone)]
pub struct WatchSignal {
    /// Generation of the watcher that produced the signal
    pub generation: u64,
    pub kind: WatchEventKind,
    pub path: PathBuf,
}

/// Watches a single file path; dropping it detaches the watch
pub struct PathWatcher {
    _watcher: RecommendedWatcher,
    path: PathBuf,
    generation: u64,
}

impl PathWatcher {
    /// Start watching `path`, forwarding signals tagged with `generation`
    pub fn attach(
        path: &Path,
        generation: u64,
        tx: UnboundedSender<WatchSignal>,
    ) -> Result<Self> {
        let file_name = path
            .file_name()
            .map(|n| n.to_os_string())
            .ok_or_else(|| Error::watch(format!("No file name in {}", path.display())))?;
        let directory = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or(Path::new("."));

        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| {
            let event = match res {
                Ok(event) => event,
                Err(e) => {
                    debug!("Watch error: {}", e);
                    return;
                }
            };
            let Some(kind) = WatchEventKind::classify(&event.kind) else {
                return;
            };

            for changed in event
                .paths
                .into_iter()
                .filter(|p| p.file_name() == Some(file_name.as_os_str()))
            {
                trace!("Watch event: {:?} on {}", kind, changed.display());
                // The receiver is gone once the rotator shuts down
                if tx
                    .send(WatchSignal {
                        generation,
                        kind,
                        path: changed,
                    })
                    .is_err()
                {
                    return;
                }
            }
        })
        .map_err(|e| Error::watch(format!("Failed to create watcher: {}", e)))?;

        watcher
            .watch(directory, RecursiveMode::NonRecursive)
            .map_err(|e| {
                Error::watch(format!("Failed to watch {}: {}", directory.display(), e))
            })?;

        debug!(
            "Watching {} (generation {})",
            path.display(),
            generation
        );

        Ok(Self {
            _watcher: watcher,
            path: path.to_path_buf(),
            generation,
        })
    }

    /// The watched file path
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }
}
