//! Rotation decision: may the next chunk go to the current file?

use chrono::{DateTime, Local};
use rotastream_core::{BoundaryUnit, RotatorConfig};

use crate::file::FileSnapshot;
use crate::schedule::boundary_crossed;

/// Why a rotation was started
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RotationReason {
    /// The pending write would exceed the size limit
    Size,
    /// A calendar boundary passed since the last modification
    Boundary,
    /// The frequency timer expired
    Frequency,
    /// The current path was moved or replaced by someone else
    External,
}

impl RotationReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            RotationReason::Size => "size",
            RotationReason::Boundary => "boundary",
            RotationReason::Frequency => "frequency",
            RotationReason::External => "external",
        }
    }

    /// Externally moved files are already gone from the current path
    pub fn needs_rename(&self) -> bool {
        !matches!(self, RotationReason::External)
    }
}

impl std::fmt::Display for RotationReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Size and boundary limits checked before each write
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RotationPolicy {
    pub max_size: Option<u64>,
    pub boundary: Option<BoundaryUnit>,
}

impl RotationPolicy {
    pub fn from_config(config: &RotatorConfig) -> Self {
        Self {
            max_size: config.max_size,
            boundary: config.boundary,
        }
    }

    /// Decide whether writing `pending` more bytes requires a rotation first.
    ///
    /// An empty file is never rotated. Size wins over boundary, boundary over
    /// an expired frequency timer.
    pub fn evaluate(
        &self,
        snapshot: &FileSnapshot,
        pending: u64,
        now: &DateTime<Local>,
        expired: bool,
    ) -> Option<RotationReason> {
        if snapshot.size == 0 {
            return None;
        }

        if let Some(max) = self.max_size {
            if snapshot.size.saturating_add(pending) > max {
                return Some(RotationReason::Size);
            }
        }

        if let (Some(unit), Some(modified)) = (self.boundary, snapshot.modified.as_ref()) {
            if boundary_crossed(unit, modified, now) {
                return Some(RotationReason::Boundary);
            }
        }

        if expired {
            return Some(RotationReason::Frequency);
        }

        None
    }
}
