//! rotastream watch - detects when the current file is moved out from under the writer

mod identity;
mod watcher;

pub use identity::{check_path, FileIdentity, PathStatus};
pub use watcher::{PathWatcher, WatchEventKind, WatchSignal};
