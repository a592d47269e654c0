//! Retention: bound the number of rotated files kept on disk

use regex::Regex;
use rotastream_core::{Result, RotatorConfig};
use std::io;
use std::path::PathBuf;
use tracing::{debug, warn};

use crate::naming::rotated_pattern;

/// Outcome of a prune pass
#[derive(Debug, Default)]
pub struct PruneReport {
    /// Rotated files left in place
    pub kept: usize,
    /// Files deleted, oldest first
    pub removed: Vec<PathBuf>,
    /// Files that could not be deleted
    pub failures: Vec<(PathBuf, io::Error)>,
}

/// Keeps at most `keep` rotated files in the destination directory
#[derive(Debug, Clone)]
pub struct RetentionPolicy {
    directory: PathBuf,
    keep: usize,
    pattern: Regex,
}

impl RetentionPolicy {
    pub fn new(config: &RotatorConfig) -> Result<Self> {
        Ok(Self {
            directory: config.directory.clone(),
            keep: config.retention,
            pattern: rotated_pattern(config)?,
        })
    }

    pub fn keep(&self) -> usize {
        self.keep
    }

    /// Names to delete: matching names sorted ascending, minus the newest `keep`
    pub fn select_expired(&self, names: impl IntoIterator<Item = String>) -> Vec<String> {
        let mut matching: Vec<String> = names
            .into_iter()
            .filter(|name| self.pattern.is_match(name))
            .collect();
        matching.sort();

        let excess = matching.len().saturating_sub(self.keep);
        matching.truncate(excess);
        matching
    }

    /// Delete rotated files beyond the retention count.
    ///
    /// A listing failure is returned as an error; individual deletion
    /// failures are collected in the report and do not stop the pass.
    pub async fn prune(&self) -> io::Result<PruneReport> {
        let mut names = Vec::new();
        let mut entries = tokio::fs::read_dir(&self.directory).await?;
        while let Some(entry) = entries.next_entry().await? {
            if let Some(name) = entry.file_name().to_str() {
                names.push(name.to_string());
            }
        }

        let total = names.iter().filter(|n| self.pattern.is_match(n)).count();
        let expired = self.select_expired(names);

        let mut report = PruneReport {
            kept: total - expired.len(),
            ..Default::default()
        };

        for name in expired {
            let path = self.directory.join(&name);
            match tokio::fs::remove_file(&path).await {
                Ok(()) => {
                    debug!("Removed expired file {}", path.display());
                    report.removed.push(path);
                }
                Err(e) => {
                    warn!("Failed to remove expired file {}: {}", path.display(), e);
                    report.failures.push((path, e));
                }
            }
        }

        Ok(report)
    }
}
