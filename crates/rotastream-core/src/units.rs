//! Small stateless helpers: size parsing and directory verification

use bytesize::ByteSize;
use std::path::Path;
use tracing::debug;

use crate::error::{Error, Result};

/// Parse a human-readable size into bytes.
///
/// Follows `bytesize` units: `k`/`KB` are powers of 1000, `KiB` powers of
/// 1024. Sizes under one byte are rejected.
pub fn parse_size(s: &str) -> Result<u64> {
    let size: ByteSize = s
        .trim()
        .parse()
        .map_err(|e| Error::InvalidSize(format!("{} ({})", s, e)))?;

    if size.as_u64() == 0 {
        return Err(Error::InvalidSize(format!(
            "{} (must be at least one byte)",
            s
        )));
    }

    Ok(size.as_u64())
}

/// Make sure `path` is a directory, creating it recursively when absent
pub async fn ensure_directory(path: &Path) -> Result<()> {
    match tokio::fs::metadata(path).await {
        Ok(meta) if meta.is_dir() => Ok(()),
        Ok(_) => Err(Error::NotADirectory(path.to_path_buf())),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!("Creating directory {}", path.display());
            tokio::fs::create_dir_all(path).await?;
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}
