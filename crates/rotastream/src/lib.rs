//! rotastream - a byte sink that writes to a file and rotates it
//!
//! Writes go to `directory/base.ext`. When the file grows past a size limit,
//! crosses a calendar boundary, outlives a rotation frequency or is moved away
//! by someone else, it is closed, renamed to `base_<timestamp>.ext` and a fresh
//! file takes its place. Old rotated files beyond the retention count are
//! deleted.
//!
//! ```no_run
//! use rotastream::{Rotator, RotatorConfig};
//!
//! # async fn demo() -> rotastream::Result<()> {
//! let config = RotatorConfig::new("/var/log/myapp", "app").with_max_size(10 * 1024 * 1024);
//! let rotator = Rotator::new(config)?;
//! rotator.write("hello\n")?;
//! rotator.close().await?;
//! # Ok(())
//! # }
//! ```

mod decision;
mod engine;
mod event;
mod file;
mod naming;
mod queue;
mod retention;
mod rotator;
mod schedule;
mod writer;

pub use decision::{RotationPolicy, RotationReason};
pub use event::{EventBus, RotatorEvent};
pub use file::{BackingFile, FileSnapshot};
pub use naming::{current_path, free_rotated_path, name_for, rotated_pattern};
pub use queue::WriteQueue;
pub use retention::{PruneReport, RetentionPolicy};
pub use rotator::Rotator;
pub use schedule::{boundary_crossed, delay_until_next, next_boundary};
pub use writer::RotatorWriter;

pub use rotastream_core::{
    BoundaryUnit, Encoding, Error, FileOptions, Frequency, OpenFlags, Result, RotatorConfig,
    RotatorOptions, TimestampFormat,
};
