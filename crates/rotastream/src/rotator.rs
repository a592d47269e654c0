//! Producer handle for a rotating sink

use bytes::Bytes;
use futures::StreamExt;
use rotastream_core::{Encoding, Error, Result, RotatorConfig, EVENT_CHANNEL_CAPACITY, PIPE_CHUNK_SIZE};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::AsyncRead;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio_util::io::ReaderStream;
use tracing::debug;

use crate::engine::{CloseMode, Command, Engine, Shared};
use crate::event::{EventBus, RotatorEvent};
use crate::naming;
use crate::retention::RetentionPolicy;

/// A writable byte sink backed by a rotating file.
///
/// Cloning gives another handle to the same sink. Writes from all handles
/// are committed in the order they were accepted.
#[derive(Clone)]
pub struct Rotator {
    tx: mpsc::UnboundedSender<Command>,
    shared: Arc<Shared>,
    events: EventBus,
    config: Arc<RotatorConfig>,
}

impl Rotator {
    /// Validate the config and start the sink on the current tokio runtime
    pub fn new(config: RotatorConfig) -> Result<Self> {
        Self::with_events(config).map(|(rotator, _)| rotator)
    }

    /// Like [`Rotator::new`], also returning a subscription taken before the
    /// sink starts, so the first `open` is never missed
    pub fn with_events(config: RotatorConfig) -> Result<(Self, broadcast::Receiver<RotatorEvent>)> {
        config.validate()?;
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| Error::config(format!("A rotator needs a tokio runtime: {}", e)))?;
        let retention = RetentionPolicy::new(&config)?;
        let config = Arc::new(config);

        let events = EventBus::new(EVENT_CHANNEL_CAPACITY);
        let subscription = events.subscribe();
        let shared = Arc::new(Shared::default());
        let (tx, commands) = mpsc::unbounded_channel();

        let engine = Engine::new(config.clone(), retention, shared.clone(), events.clone());
        runtime.spawn(engine.run(commands));
        debug!("Started rotator for {}", naming::current_path(&config).display());

        Ok((
            Self {
                tx,
                shared,
                events,
                config,
            },
            subscription,
        ))
    }

    fn ensure_writable(&self) -> Result<()> {
        if self.shared.is_halted() {
            return Err(Error::Halted);
        }
        if self.shared.is_closing() {
            return Err(Error::Closed);
        }
        Ok(())
    }

    /// Queue bytes for the current file.
    ///
    /// Accepted writes are never reordered. An empty payload only nudges the
    /// queue to drain.
    pub fn write(&self, payload: impl Into<Bytes>) -> Result<()> {
        self.ensure_writable()?;
        self.tx
            .send(Command::Write(payload.into()))
            .map_err(|_| Error::Closed)
    }

    /// Encode text and queue it; `None` uses the configured encoding
    pub fn write_str(&self, text: &str, encoding: Option<Encoding>) -> Result<()> {
        self.ensure_writable()?;
        let encoding = encoding.unwrap_or(self.config.file.encoding);
        self.write(encoding.encode(text)?)
    }

    /// Wait until everything written so far has been committed or is blocked.
    ///
    /// Returns the number of chunks still queued.
    pub async fn flush(&self) -> Result<usize> {
        self.ensure_writable()?;
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(Command::Flush(reply))
            .map_err(|_| Error::Closed)?;
        rx.await.map_err(|_| Error::Closed)
    }

    /// Write an optional final payload, then close
    pub async fn end(&self, payload: Option<Bytes>) -> Result<()> {
        if let Some(payload) = payload {
            self.write(payload)?;
        }
        self.close().await
    }

    /// Drain what can be written without rotating, release the file, emit `close`
    pub async fn close(&self) -> Result<()> {
        self.shutdown(CloseMode::Graceful).await
    }

    /// Release the file immediately, discarding queued writes
    pub async fn destroy(&self) -> Result<()> {
        self.shutdown(CloseMode::Destroy).await
    }

    async fn shutdown(&self, mode: CloseMode) -> Result<()> {
        if self.shared.closing.swap(true, std::sync::atomic::Ordering::SeqCst) {
            return Err(Error::Closed);
        }
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(Command::Close { mode, reply })
            .map_err(|_| Error::Closed)?;
        rx.await.map_err(|_| Error::Closed)?
    }

    /// Copy a reader into the sink until EOF, returning the bytes read
    pub async fn pipe_from<R>(&self, reader: R, source: &str) -> Result<u64>
    where
        R: AsyncRead + Unpin,
    {
        self.ensure_writable()?;
        self.events.emit(RotatorEvent::Pipe {
            source: source.to_string(),
        });

        let mut stream = ReaderStream::with_capacity(reader, PIPE_CHUNK_SIZE);
        let mut total = 0u64;
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            total += chunk.len() as u64;
            self.write(chunk)?;
        }
        debug!("Pipe from {} finished after {} bytes", source, total);
        Ok(total)
    }

    /// Whether writes are still accepted
    pub fn is_writable(&self) -> bool {
        self.ensure_writable().is_ok()
    }

    /// Whether a backing file is open and not rotating
    pub fn is_ready(&self) -> bool {
        self.shared.is_ready()
    }

    pub fn is_halted(&self) -> bool {
        self.shared.is_halted()
    }

    /// The stable path writes go to
    pub fn current_path(&self) -> PathBuf {
        naming::current_path(&self.config)
    }

    pub fn config(&self) -> &RotatorConfig {
        &self.config
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RotatorEvent> {
        self.events.subscribe()
    }
}

impl std::fmt::Debug for Rotator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Rotator")
            .field("path", &self.current_path())
            .field("ready", &self.is_ready())
            .field("halted", &self.is_halted())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rotastream_core::{BoundaryUnit, Frequency, TimestampFormat};
    use std::path::Path;
    use std::time::{Duration, SystemTime};
    use tempfile::TempDir;
    use tokio::time::timeout;

    fn drain_events(rx: &mut broadcast::Receiver<RotatorEvent>) -> Vec<RotatorEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    fn names(events: &[RotatorEvent]) -> Vec<&'static str> {
        events.iter().map(|e| e.name()).collect()
    }

    async fn wait_for<F>(rx: &mut broadcast::Receiver<RotatorEvent>, mut pred: F) -> RotatorEvent
    where
        F: FnMut(&RotatorEvent) -> bool,
    {
        timeout(Duration::from_secs(5), async {
            loop {
                let event = rx.recv().await.unwrap();
                if pred(&event) {
                    return event;
                }
            }
        })
        .await
        .unwrap()
    }

    fn rotated_files(dir: &Path) -> Vec<PathBuf> {
        let mut files: Vec<PathBuf> = std::fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().path())
            .filter(|p| {
                let name = p.file_name().unwrap().to_string_lossy().to_string();
                name.starts_with("app_") && name.ends_with(".log")
            })
            .collect();
        files.sort();
        files
    }

    #[tokio::test]
    async fn test_writes_before_ready_keep_order() {
        let dir = TempDir::new().unwrap();
        let (rotator, mut events) =
            Rotator::with_events(RotatorConfig::new(dir.path().join("nested"), "app")).unwrap();

        let mut expected = String::new();
        for i in 0..50 {
            let line = format!("line {}\n", i);
            expected.push_str(&line);
            rotator.write(line).unwrap();
        }
        rotator.close().await.unwrap();

        let content = std::fs::read_to_string(dir.path().join("nested/app.log")).unwrap();
        assert_eq!(content, expected);

        let events = drain_events(&mut events);
        assert_eq!(names(&events), vec!["open", "rotated-on", "close"]);
    }

    #[tokio::test]
    async fn test_size_rotation() {
        let dir = TempDir::new().unwrap();
        let config = RotatorConfig::new(dir.path(), "app").with_max_size(10);
        let (rotator, mut events) = Rotator::with_events(config).unwrap();

        rotator.write("123456789\n").unwrap();
        rotator.write("abcd\n").unwrap();
        rotator.close().await.unwrap();

        assert_eq!(
            std::fs::read_to_string(dir.path().join("app.log")).unwrap(),
            "abcd\n"
        );
        let rotated = rotated_files(dir.path());
        assert_eq!(rotated.len(), 1);
        assert_eq!(std::fs::read_to_string(&rotated[0]).unwrap(), "123456789\n");

        let events = drain_events(&mut events);
        assert_eq!(
            names(&events),
            vec!["open", "rotated-on", "rotated-off", "rotated-on", "drain", "close"]
        );
        assert_eq!(
            events[2],
            RotatorEvent::RotatedOff {
                path: rotated[0].clone()
            }
        );
    }

    #[tokio::test]
    async fn test_empty_file_accepts_oversized_write() {
        let dir = TempDir::new().unwrap();
        let config = RotatorConfig::new(dir.path(), "app").with_max_size(4);
        let (rotator, mut events) = Rotator::with_events(config).unwrap();

        rotator.write("abcdefgh").unwrap();
        rotator.write("x").unwrap();
        rotator.close().await.unwrap();

        assert_eq!(std::fs::read_to_string(dir.path().join("app.log")).unwrap(), "x");
        let rotated = rotated_files(dir.path());
        assert_eq!(rotated.len(), 1);
        assert_eq!(std::fs::read_to_string(&rotated[0]).unwrap(), "abcdefgh");

        let events = drain_events(&mut events);
        let offs = events.iter().filter(|e| e.name() == "rotated-off").count();
        assert_eq!(offs, 1);
    }

    #[tokio::test]
    async fn test_retention_bounds_rotated_files() {
        let dir = TempDir::new().unwrap();
        let config = RotatorConfig::new(dir.path(), "app")
            .with_max_size(5)
            .with_retention(2);
        let (rotator, mut events) = Rotator::with_events(config).unwrap();

        for i in 0..6 {
            rotator.write(format!("chunk-{}\n", i)).unwrap();
        }
        rotator.close().await.unwrap();

        assert_eq!(
            std::fs::read_to_string(dir.path().join("app.log")).unwrap(),
            "chunk-5\n"
        );
        assert!(rotated_files(dir.path()).len() <= 2);

        let events = drain_events(&mut events);
        let offs = events.iter().filter(|e| e.name() == "rotated-off").count();
        assert_eq!(offs, 5);
        assert!(!events.iter().any(|e| e.name() == "error"));
    }

    #[tokio::test]
    async fn test_startup_prunes_old_rotations() {
        let dir = TempDir::new().unwrap();
        for stamp in ["2024-01-01-000000", "2024-01-02-000000", "2024-01-03-000000", "2024-01-04-000000"] {
            std::fs::write(dir.path().join(format!("app_{}.log", stamp)), "old").unwrap();
        }
        std::fs::write(dir.path().join("other_2024-01-01-000000.log"), "keep").unwrap();

        let rotator = Rotator::new(RotatorConfig::new(dir.path(), "app").with_retention(2)).unwrap();
        rotator.flush().await.unwrap();

        let rotated = rotated_files(dir.path());
        assert_eq!(
            rotated,
            vec![
                dir.path().join("app_2024-01-03-000000.log"),
                dir.path().join("app_2024-01-04-000000.log"),
            ]
        );
        assert!(dir.path().join("other_2024-01-01-000000.log").exists());
        rotator.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_destination_not_a_directory_halts() {
        let dir = TempDir::new().unwrap();
        let occupied = dir.path().join("occupied");
        std::fs::write(&occupied, "x").unwrap();

        let (rotator, mut events) = Rotator::with_events(RotatorConfig::new(&occupied, "app")).unwrap();
        let event = wait_for(&mut events, |e| e.is_fatal()).await;

        assert!(event.to_string().contains("not a directory"));
        assert!(rotator.is_halted());
        assert!(!rotator.is_writable());
        assert!(matches!(rotator.write("data"), Err(Error::Halted)));
    }

    #[tokio::test]
    async fn test_external_rename_starts_new_file() {
        let dir = TempDir::new().unwrap();
        let config =
            RotatorConfig::new(dir.path(), "app").with_poll_interval(Duration::from_millis(50));
        let (rotator, mut events) = Rotator::with_events(config).unwrap();

        rotator.write("before\n").unwrap();
        rotator.flush().await.unwrap();
        wait_for(&mut events, |e| e.name() == "rotated-on").await;

        let moved = dir.path().join("moved.txt");
        std::fs::rename(dir.path().join("app.log"), &moved).unwrap();
        wait_for(&mut events, |e| e.name() == "rotated-on").await;

        rotator.write("after\n").unwrap();
        rotator.close().await.unwrap();

        assert_eq!(std::fs::read_to_string(&moved).unwrap(), "before\n");
        assert_eq!(
            std::fs::read_to_string(dir.path().join("app.log")).unwrap(),
            "after\n"
        );
        let rest = drain_events(&mut events);
        assert!(!rest.iter().any(|e| e.name() == "rotated-off"));
    }

    #[tokio::test]
    async fn test_write_after_close_fails() {
        let dir = TempDir::new().unwrap();
        let rotator = Rotator::new(RotatorConfig::new(dir.path(), "app")).unwrap();

        rotator.end(Some(Bytes::from_static(b"last\n"))).await.unwrap();

        assert!(matches!(rotator.write("late"), Err(Error::Closed)));
        assert!(matches!(rotator.close().await, Err(Error::Closed)));
        assert_eq!(
            std::fs::read_to_string(dir.path().join("app.log")).unwrap(),
            "last\n"
        );
    }

    #[tokio::test]
    async fn test_destroy_emits_close() {
        let dir = TempDir::new().unwrap();
        let (rotator, mut events) =
            Rotator::with_events(RotatorConfig::new(dir.path(), "app")).unwrap();

        rotator.destroy().await.unwrap();
        let events = drain_events(&mut events);
        assert_eq!(events.last(), Some(&RotatorEvent::Close));
        assert!(!rotator.is_writable());
    }

    #[tokio::test]
    async fn test_day_boundary_rotates_stale_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("app.log");
        std::fs::write(&path, "old\n").unwrap();
        let two_days_ago = SystemTime::now() - Duration::from_secs(2 * 86_400);
        std::fs::File::options()
            .write(true)
            .open(&path)
            .unwrap()
            .set_modified(two_days_ago)
            .unwrap();

        let config = RotatorConfig::new(dir.path(), "app").with_boundary(BoundaryUnit::Day);
        let expected = naming::name_for(
            &config,
            Some(&chrono::DateTime::<chrono::Local>::from(two_days_ago)),
            None,
        );
        let rotator = Rotator::new(config).unwrap();

        rotator.write("new\n").unwrap();
        rotator.close().await.unwrap();

        assert_eq!(std::fs::read_to_string(&path).unwrap(), "new\n");
        assert_eq!(std::fs::read_to_string(&expected).unwrap(), "old\n");
    }

    fn set_mtime(path: &Path, when: SystemTime) {
        std::fs::File::options()
            .write(true)
            .open(path)
            .unwrap()
            .set_modified(when)
            .unwrap();
    }

    fn non_fatal_errors(events: &[RotatorEvent]) -> Vec<String> {
        events
            .iter()
            .filter_map(|e| match e {
                RotatorEvent::Error {
                    message,
                    fatal: false,
                } => Some(message.clone()),
                _ => None,
            })
            .collect()
    }

    #[tokio::test]
    async fn test_rotation_collision_uses_disambiguator() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("app.log");
        std::fs::write(&path, "old\n").unwrap();
        let stamp = SystemTime::now() - Duration::from_secs(2 * 86_400);
        set_mtime(&path, stamp);

        let config = RotatorConfig::new(dir.path(), "app")
            .with_boundary(BoundaryUnit::Day)
            .with_retention(5);
        let stamp = chrono::DateTime::<chrono::Local>::from(stamp);
        let taken = naming::name_for(&config, Some(&stamp), None);
        let expected = naming::name_for(&config, Some(&stamp), Some(0));
        std::fs::write(&taken, "taken\n").unwrap();

        let (rotator, mut events) = Rotator::with_events(config).unwrap();
        rotator.write("new\n").unwrap();
        rotator.close().await.unwrap();

        assert_eq!(std::fs::read_to_string(&path).unwrap(), "new\n");
        assert_eq!(std::fs::read_to_string(&taken).unwrap(), "taken\n");
        assert_eq!(std::fs::read_to_string(&expected).unwrap(), "old\n");

        let events = drain_events(&mut events);
        assert!(events.contains(&RotatorEvent::RotatedOff { path: expected }));
    }

    #[tokio::test]
    async fn test_rename_failure_keeps_writing() {
        let dir = TempDir::new().unwrap();
        // rotated names longer than any file system allows
        let format = TimestampFormat::new("%Y%m%d%H%M%S".repeat(30)).unwrap();
        let config = RotatorConfig::new(dir.path(), "app")
            .with_max_size(5)
            .with_timestamp_format(format);
        let (rotator, mut events) = Rotator::with_events(config).unwrap();

        rotator.write("first\n").unwrap();
        rotator.write("second\n").unwrap();
        rotator.close().await.unwrap();

        assert!(!rotator.is_halted());
        assert_eq!(
            std::fs::read_to_string(dir.path().join("app.log")).unwrap(),
            "first\nsecond\n"
        );
        assert!(rotated_files(dir.path()).is_empty());

        let events = drain_events(&mut events);
        let errors = non_fatal_errors(&events);
        assert_eq!(errors.len(), 1);
        assert!(errors[0].starts_with("Failed to rename"), "{}", errors[0]);
        assert!(!events.iter().any(|e| e.is_fatal()));
        assert!(!names(&events).contains(&"rotated-off"));
        let ons = events.iter().filter(|e| e.name() == "rotated-on").count();
        assert_eq!(ons, 2);
        assert_eq!(events.last(), Some(&RotatorEvent::Close));
    }

    #[tokio::test]
    async fn test_retention_failure_does_not_block_open() {
        let dir = TempDir::new().unwrap();
        // a directory matching the rotated pattern cannot be unlinked
        let stuck = dir.path().join("app_2000-01-01-000000.log");
        std::fs::create_dir(&stuck).unwrap();
        std::fs::write(stuck.join("keep"), "x").unwrap();
        std::fs::write(dir.path().join("app_2000-01-02-000000.log"), "y").unwrap();

        let config = RotatorConfig::new(dir.path(), "app").with_retention(1);
        let (rotator, mut events) = Rotator::with_events(config).unwrap();
        rotator.write("hello\n").unwrap();
        rotator.close().await.unwrap();

        assert!(!rotator.is_halted());
        assert!(stuck.is_dir());
        assert_eq!(
            std::fs::read_to_string(dir.path().join("app.log")).unwrap(),
            "hello\n"
        );

        let events = drain_events(&mut events);
        let errors = non_fatal_errors(&events);
        assert_eq!(errors.len(), 1);
        assert!(errors[0].starts_with("Failed to remove"), "{}", errors[0]);
        assert!(names(&events).contains(&"rotated-on"));
        assert_eq!(events.last(), Some(&RotatorEvent::Close));
    }

    #[tokio::test]
    async fn test_frequency_rotation() {
        let dir = TempDir::new().unwrap();
        let config = RotatorConfig::new(dir.path(), "app")
            .with_frequency(Frequency::new(1, BoundaryUnit::Second));
        let rotator = Rotator::new(config).unwrap();

        rotator.write("a\n").unwrap();
        rotator.flush().await.unwrap();
        tokio::time::sleep(Duration::from_millis(1100)).await;
        rotator.write("b\n").unwrap();
        rotator.close().await.unwrap();

        assert_eq!(
            std::fs::read_to_string(dir.path().join("app.log")).unwrap(),
            "b\n"
        );
        let rotated = rotated_files(dir.path());
        assert_eq!(rotated.len(), 1);
        assert_eq!(std::fs::read_to_string(&rotated[0]).unwrap(), "a\n");
    }

    #[tokio::test]
    async fn test_write_str_encodings() {
        let dir = TempDir::new().unwrap();
        let rotator = Rotator::new(RotatorConfig::new(dir.path(), "app")).unwrap();

        rotator.write_str("6869", Some(Encoding::Hex)).unwrap();
        rotator.write_str("\n", None).unwrap();
        assert!(matches!(
            rotator.write_str("zz", Some(Encoding::Hex)),
            Err(Error::InvalidEncoding(_))
        ));
        rotator.close().await.unwrap();

        assert_eq!(
            std::fs::read_to_string(dir.path().join("app.log")).unwrap(),
            "hi\n"
        );
    }

    #[tokio::test]
    async fn test_pipe_from_reader() {
        let dir = TempDir::new().unwrap();
        let (rotator, mut events) =
            Rotator::with_events(RotatorConfig::new(dir.path(), "app")).unwrap();

        let copied = rotator.pipe_from(&b"piped data\n"[..], "memory").await.unwrap();
        rotator.close().await.unwrap();

        assert_eq!(copied, 11);
        assert_eq!(
            std::fs::read_to_string(dir.path().join("app.log")).unwrap(),
            "piped data\n"
        );
        let events = drain_events(&mut events);
        assert!(events.contains(&RotatorEvent::Pipe {
            source: "memory".to_string()
        }));
    }

    #[tokio::test]
    async fn test_clones_share_one_sink() {
        let dir = TempDir::new().unwrap();
        let rotator = Rotator::new(RotatorConfig::new(dir.path(), "app")).unwrap();
        let other = rotator.clone();

        rotator.write("one\n").unwrap();
        other.write("two\n").unwrap();
        other.flush().await.unwrap();
        assert!(rotator.is_ready());
        rotator.close().await.unwrap();

        assert!(!other.is_writable());
        assert_eq!(
            std::fs::read_to_string(dir.path().join("app.log")).unwrap(),
            "one\ntwo\n"
        );
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = RotatorConfig::new("/tmp", "bad/name");
        assert!(Rotator::new(config).is_err());

        let config = RotatorConfig::new("/tmp", "app")
            .with_frequency(Frequency::new(200_000_000, BoundaryUnit::Day));
        assert!(matches!(
            Rotator::new(config),
            Err(Error::InvalidFrequency(_))
        ));
    }

    #[test]
    fn test_new_outside_runtime_is_an_error() {
        let dir = TempDir::new().unwrap();
        let result = Rotator::new(RotatorConfig::new(dir.path(), "app"));
        assert!(matches!(result, Err(Error::ConfigError(_))));
        assert!(!dir.path().join("app.log").exists());
    }
}
