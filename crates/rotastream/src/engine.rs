//! Rotation engine
//!
//! A single task owns the write queue, the backing file, the watcher and the
//! timers. Producers reach it through a command channel; watcher signals,
//! the poll interval and the frequency timer are the only inputs that do not
//! come from a producer. A rotation runs to completion before the next input
//! is taken, so at most one file is open and no write is committed while the
//! rotator is not ready.

use bytes::Bytes;
use chrono::Local;
use rotastream_core::{ensure_directory, Error, Result, RotatorConfig};
use rotastream_watch::{check_path, PathWatcher, WatchSignal};
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{Instant, Interval, MissedTickBehavior, Sleep};
use tracing::{debug, error, info, trace, warn};

use crate::decision::{RotationPolicy, RotationReason};
use crate::event::{EventBus, RotatorEvent};
use crate::file::BackingFile;
use crate::naming;
use crate::queue::WriteQueue;
use crate::retention::RetentionPolicy;
use crate::schedule;

/// Flags readable from producer handles without a round trip
#[derive(Debug, Default)]
pub(crate) struct Shared {
    pub ready: AtomicBool,
    pub halted: AtomicBool,
    pub closing: AtomicBool,
}

impl Shared {
    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    pub fn is_halted(&self) -> bool {
        self.halted.load(Ordering::SeqCst)
    }

    pub fn is_closing(&self) -> bool {
        self.closing.load(Ordering::SeqCst)
    }
}

/// File lifecycle states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum LifecycleState {
    Uninitialized,
    VerifyingPath,
    Creating,
    Ready,
    Rotating,
    Closed,
    Halted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CloseMode {
    /// Drain what can be written, then release the file
    Graceful,
    /// Drop queued data and release the file
    Destroy,
}

pub(crate) enum Command {
    Write(Bytes),
    Flush(oneshot::Sender<usize>),
    Close {
        mode: CloseMode,
        reply: oneshot::Sender<Result<()>>,
    },
}

pub(crate) struct Engine {
    config: Arc<RotatorConfig>,
    policy: RotationPolicy,
    retention: RetentionPolicy,
    shared: Arc<Shared>,
    events: EventBus,
    queue: WriteQueue,
    state: LifecycleState,
    file: Option<BackingFile>,
    watcher: Option<PathWatcher>,
    watch_generation: u64,
    watch_tx: mpsc::UnboundedSender<WatchSignal>,
    watch_rx: mpsc::UnboundedReceiver<WatchSignal>,
    poll: Option<Interval>,
    expiry: Option<Pin<Box<Sleep>>>,
    expired: bool,
    emitted_open: bool,
}

impl Engine {
    pub fn new(
        config: Arc<RotatorConfig>,
        retention: RetentionPolicy,
        shared: Arc<Shared>,
        events: EventBus,
    ) -> Self {
        let (watch_tx, watch_rx) = mpsc::unbounded_channel();
        Self {
            policy: RotationPolicy::from_config(&config),
            config,
            retention,
            shared,
            events,
            queue: WriteQueue::new(),
            state: LifecycleState::Uninitialized,
            file: None,
            watcher: None,
            watch_generation: 0,
            watch_tx,
            watch_rx,
            poll: None,
            expiry: None,
            expired: false,
            emitted_open: false,
        }
    }

    /// Verify the directory, open the first file, then serve inputs until closed
    pub async fn run(mut self, mut commands: mpsc::UnboundedReceiver<Command>) {
        if let Err(e) = self.start().await {
            self.halt(e);
        }

        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(Command::Write(chunk)) => {
                        if self.state == LifecycleState::Halted {
                            trace!("Dropping write of {} bytes on halted rotator", chunk.len());
                            continue;
                        }
                        self.queue.push(chunk);
                        self.drain(true).await;
                    }
                    Some(Command::Flush(reply)) => {
                        self.drain(true).await;
                        let _ = reply.send(self.queue.len());
                    }
                    Some(Command::Close { mode, reply }) => {
                        let result = self.shutdown(mode).await;
                        let _ = reply.send(result);
                        return;
                    }
                    None => {
                        debug!("All rotator handles dropped, closing");
                        if let Err(e) = self.shutdown(CloseMode::Graceful).await {
                            warn!("Close after last handle dropped failed: {}", e);
                        }
                        return;
                    }
                },
                Some(signal) = self.watch_rx.recv() => self.on_watch_signal(signal).await,
                _ = next_tick(&mut self.poll) => self.check_external_change().await,
                _ = expiry(&mut self.expiry) => {
                    self.expiry = None;
                    self.expired = true;
                    debug!("Frequency timer expired, next write rotates");
                }
            }
        }
    }

    fn transition(&mut self, next: LifecycleState) {
        trace!("Lifecycle {:?} -> {:?}", self.state, next);
        self.state = next;
    }

    async fn start(&mut self) -> Result<()> {
        self.transition(LifecycleState::VerifyingPath);
        ensure_directory(&self.config.directory).await?;
        self.create().await
    }

    /// Prune, open the current file, arm watcher and timers, become ready
    async fn create(&mut self) -> Result<()> {
        self.transition(LifecycleState::Creating);

        match self.retention.prune().await {
            Ok(report) => {
                debug!(
                    "Retention kept {} of at most {} rotated files, removed {}",
                    report.kept,
                    self.retention.keep(),
                    report.removed.len()
                );
                for (path, e) in report.failures {
                    self.report(format!("Failed to remove {}: {}", path.display(), e));
                }
            }
            Err(e) => self.report(format!(
                "Failed to list {}: {}",
                self.config.directory.display(),
                e
            )),
        }

        // Schedule first: a frequency with no next boundary halts before a file is held
        let expiry_delay = match self.config.frequency {
            Some(frequency) => {
                let delay = schedule::delay_until_next(&frequency, &Local::now()).ok_or_else(|| {
                    Error::InvalidFrequency(format!("{} has no next boundary", frequency))
                })?;
                debug!("Frequency {} expires in {:?}", frequency, delay);
                Some(delay)
            }
            None => None,
        };

        let path = naming::current_path(&self.config);
        let file = BackingFile::open(&path, &self.config.file).await?;
        debug!(
            "Opened {} ({} bytes)",
            path.display(),
            file.snapshot().size
        );
        self.file = Some(file);

        self.attach_watcher(&path);
        self.poll = self.config.poll_interval.map(|period| {
            let mut interval = tokio::time::interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            interval
        });
        self.expired = false;
        self.expiry = expiry_delay.map(|delay| Box::pin(tokio::time::sleep(delay)));

        self.shared.ready.store(true, Ordering::SeqCst);
        self.transition(LifecycleState::Ready);

        if !self.emitted_open {
            self.emitted_open = true;
            self.events.emit(RotatorEvent::Open { path: path.clone() });
        }
        self.events.emit(RotatorEvent::RotatedOn { path });
        Ok(())
    }

    fn attach_watcher(&mut self, path: &Path) {
        self.watch_generation += 1;
        match PathWatcher::attach(path, self.watch_generation, self.watch_tx.clone()) {
            Ok(watcher) => self.watcher = Some(watcher),
            Err(e) => {
                warn!("External change detection unavailable: {}", e);
                self.watcher = None;
            }
        }
    }

    /// Stop the watcher and both timers
    fn detach(&mut self) {
        self.watcher = None;
        self.poll = None;
        self.expiry = None;
    }

    /// Close the current file, give it its rotated name, open the next one
    async fn rotate(&mut self, reason: RotationReason) -> Result<()> {
        self.transition(LifecycleState::Rotating);
        self.shared.ready.store(false, Ordering::SeqCst);
        self.detach();
        self.queue.mark_backlogged();

        let Some(file) = self.file.take() else {
            return self.create().await;
        };
        let current = file.path().to_path_buf();
        let snapshot = file.close().await?;
        info!(
            "Rotating {} ({}, {} bytes)",
            current.display(),
            reason,
            snapshot.size
        );

        if reason.needs_rename() {
            let stamp = snapshot.modified.unwrap_or_else(Local::now);
            match self.rename_rotated(&current, &stamp).await {
                Ok(target) => {
                    info!("Rotated {} -> {}", current.display(), target.display());
                    self.events.emit(RotatorEvent::RotatedOff { path: target });
                }
                Err(e) => self.report(format!("Failed to rename {}: {}", current.display(), e)),
            }
        }

        self.create().await
    }

    async fn rename_rotated(
        &self,
        current: &Path,
        stamp: &chrono::DateTime<Local>,
    ) -> std::io::Result<PathBuf> {
        let target = naming::free_rotated_path(&self.config, stamp).await?;
        tokio::fs::rename(current, &target).await?;
        Ok(target)
    }

    /// Refresh the snapshot and ask the policy about `pending` more bytes
    async fn rotation_needed(&mut self, pending: u64) -> Option<RotationReason> {
        let file = self.file.as_mut()?;
        let snapshot = *file.refresh().await;
        self.policy
            .evaluate(&snapshot, pending, &Local::now(), self.expired)
    }

    /// Commit queued chunks in order while ready.
    ///
    /// With `allow_rotation` a chunk that needs a rotation triggers one and is
    /// written to the next file; a chunk triggers at most one rotation. Without
    /// it, draining stops at the first chunk that would need a rotation.
    async fn drain(&mut self, allow_rotation: bool) {
        let mut rotated_for_head = false;

        while self.state == LifecycleState::Ready {
            let Some(pending) = self.queue.front().map(|c| c.len() as u64) else {
                break;
            };

            if let Some(reason) = self.rotation_needed(pending).await {
                if !allow_rotation {
                    debug!(
                        "{} queued chunks need a {} rotation, not draining them",
                        self.queue.len(),
                        reason
                    );
                    break;
                }
                if rotated_for_head {
                    warn!(
                        "Fresh file still requires a {} rotation, writing to it anyway",
                        reason
                    );
                } else {
                    if let Err(e) = self.rotate(reason).await {
                        self.halt(e);
                        break;
                    }
                    rotated_for_head = true;
                    continue;
                }
            }

            let Some(chunk) = self.queue.pop_front() else {
                break;
            };
            let Some(file) = self.file.as_mut() else {
                self.queue.push_front(chunk);
                break;
            };
            if let Err(e) = file.write(&chunk).await {
                self.queue.push_front(chunk);
                self.halt(e.into());
                break;
            }
            rotated_for_head = false;
        }

        if self.queue.is_empty() {
            if self.queue.take_drained() {
                self.events.emit(RotatorEvent::Drain);
            }
        } else {
            self.queue.mark_backlogged();
        }
    }

    async fn on_watch_signal(&mut self, signal: WatchSignal) {
        let current = self.watcher.as_ref().map(|w| w.generation());
        if current != Some(signal.generation) {
            trace!("Ignoring stale watch signal (generation {})", signal.generation);
            return;
        }
        debug!("{:?} on {}", signal.kind, signal.path.display());
        self.check_external_change().await;
    }

    /// Rotate without renaming if the current path no longer names our file
    async fn check_external_change(&mut self) {
        if self.state != LifecycleState::Ready {
            return;
        }
        let Some(file) = self.file.as_ref() else {
            return;
        };
        let (path, identity) = (file.path().to_path_buf(), file.snapshot().identity);

        let status = match check_path(&path, identity).await {
            Ok(status) => status,
            Err(e) => {
                debug!("Failed to check {}: {}", path.display(), e);
                return;
            }
        };
        if !status.is_changed() {
            return;
        }

        info!("{} changed externally ({:?})", path.display(), status);
        if let Err(e) = self.rotate(RotationReason::External).await {
            self.halt(e);
            return;
        }
        self.drain(true).await;
    }

    /// Report a recoverable failure
    fn report(&self, message: String) {
        warn!("{}", message);
        self.events.emit(RotatorEvent::Error {
            message,
            fatal: false,
        });
    }

    /// Enter the terminal error state; every later write fails
    fn halt(&mut self, err: Error) {
        error!("Rotator halted: {}", err);
        self.shared.halted.store(true, Ordering::SeqCst);
        self.shared.ready.store(false, Ordering::SeqCst);
        self.transition(LifecycleState::Halted);
        self.detach();
        self.file = None;
        self.events.emit(RotatorEvent::Error {
            message: err.to_string(),
            fatal: true,
        });
    }

    async fn shutdown(&mut self, mode: CloseMode) -> Result<()> {
        self.shared.closing.store(true, Ordering::SeqCst);
        self.detach();

        if mode == CloseMode::Graceful && self.state == LifecycleState::Ready {
            self.drain(false).await;
        }
        let pending = self.queue.pending_bytes();
        let discarded = self.queue.clear();
        if discarded > 0 {
            warn!(
                "Discarding {} queued chunks ({} bytes) on close",
                discarded, pending
            );
        }

        self.shared.ready.store(false, Ordering::SeqCst);
        let mut result = Ok(());
        if let Some(file) = self.file.take() {
            match file.close().await {
                Ok(snapshot) => debug!("Closed backing file ({} bytes)", snapshot.size),
                Err(e) => {
                    error!("Failed to close backing file: {}", e);
                    result = Err(e.into());
                }
            }
        }

        if self.state != LifecycleState::Halted {
            self.transition(LifecycleState::Closed);
        }
        self.events.emit(RotatorEvent::Close);
        result
    }
}

async fn next_tick(interval: &mut Option<Interval>) {
    match interval {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending().await,
    }
}

async fn expiry(timer: &mut Option<Pin<Box<Sleep>>>) {
    match timer {
        Some(sleep) => sleep.as_mut().await,
        None => std::future::pending().await,
    }
}
