//! Constants and default values for rotastream

/// Default extension of the current and rotated files
pub const DEFAULT_EXTENSION: &str = "log";

/// Default number of rotated files to keep
pub const DEFAULT_RETENTION: usize = 2;

/// Default strftime format for rotated file names.
/// Fixed width, so lexicographic order is chronological order.
pub const DEFAULT_TIMESTAMP_FORMAT: &str = "%Y-%m-%d-%H%M%S";

/// Default permission mode for newly created backing files
pub const DEFAULT_FILE_MODE: u32 = 0o644;

/// Capacity of the event broadcast channel
pub const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Longest accepted rotation frequency (ten years)
pub const MAX_FREQUENCY_SECS: u64 = 10 * 366 * 86_400;

/// Chunk size used when piping a reader into a rotator
pub const PIPE_CHUNK_SIZE: usize = 64 * 1024;

/// Config file names searched for by the CLI (in priority order)
pub const CONFIG_FILES: &[&str] = &[
    "rotastream.toml",
    "rotastream.yaml",
    "rotastream.yml",
    "rotastream.json",
];
