//! File naming: the stable current path and timestamped rotated paths

use chrono::{DateTime, Local};
use regex::Regex;
use rotastream_core::{Result, RotatorConfig};
use std::path::PathBuf;

/// Path for the current file, or for a rotated file when `timestamp` is given.
///
/// `directory/base.ext` or `directory/base_<timestamp>[_<n>].ext`. The
/// disambiguator is ignored for the current file.
pub fn name_for(
    config: &RotatorConfig,
    timestamp: Option<&DateTime<Local>>,
    disambiguator: Option<u32>,
) -> PathBuf {
    let file_name = match (timestamp, disambiguator) {
        (None, _) => format!("{}.{}", config.base_name, config.extension),
        (Some(ts), None) => format!(
            "{}_{}.{}",
            config.base_name,
            config.timestamp_format.format(ts),
            config.extension
        ),
        (Some(ts), Some(n)) => format!(
            "{}_{}_{}.{}",
            config.base_name,
            config.timestamp_format.format(ts),
            n,
            config.extension
        ),
    };
    config.directory.join(file_name)
}

/// The stable path writes go to
pub fn current_path(config: &RotatorConfig) -> PathBuf {
    name_for(config, None, None)
}

/// First rotated name for `timestamp` that does not exist yet.
///
/// The bare name is tried first, then disambiguators 0, 1, 2, ...
pub async fn free_rotated_path(
    config: &RotatorConfig,
    timestamp: &DateTime<Local>,
) -> std::io::Result<PathBuf> {
    let bare = name_for(config, Some(timestamp), None);
    if !tokio::fs::try_exists(&bare).await? {
        return Ok(bare);
    }

    let mut n: u32 = 0;
    loop {
        let candidate = name_for(config, Some(timestamp), Some(n));
        if !tokio::fs::try_exists(&candidate).await? {
            return Ok(candidate);
        }
        n = n.checked_add(1).ok_or_else(|| {
            std::io::Error::new(
                std::io::ErrorKind::AlreadyExists,
                format!("no free rotated name for {}", bare.display()),
            )
        })?;
    }
}

/// Matches rotated file names (`^base_.*\.ext$`), never the current file
pub fn rotated_pattern(config: &RotatorConfig) -> Result<Regex> {
    let pattern = format!(
        r"^{}_.*\.{}$",
        regex::escape(&config.base_name),
        regex::escape(&config.extension)
    );
    Regex::new(&pattern).map_err(|e| {
        rotastream_core::Error::config(format!("Invalid rotated name pattern: {}", e))
    })
}
