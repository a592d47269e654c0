//! Lifecycle notifications published to subscribers

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tokio::sync::broadcast;

/// Events emitted by a rotator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum RotatorEvent {
    /// First backing file is open (fires once)
    Open { path: PathBuf },

    /// A new backing file is open and accepting writes
    RotatedOn { path: PathBuf },

    /// A rotated file got its final name
    RotatedOff { path: PathBuf },

    /// The write queue emptied after holding data
    Drain,

    /// A reader was connected to the sink
    Pipe { source: String },

    /// Something failed; `fatal` errors halt the rotator
    Error { message: String, fatal: bool },

    /// The rotator has shut down (fires once)
    Close,
}

impl RotatorEvent {
    /// Event name as used in logs and JSON output
    pub fn name(&self) -> &'static str {
        match self {
            RotatorEvent::Open { .. } => "open",
            RotatorEvent::RotatedOn { .. } => "rotated-on",
            RotatorEvent::RotatedOff { .. } => "rotated-off",
            RotatorEvent::Drain => "drain",
            RotatorEvent::Pipe { .. } => "pipe",
            RotatorEvent::Error { .. } => "error",
            RotatorEvent::Close => "close",
        }
    }

    pub fn is_fatal(&self) -> bool {
        matches!(self, RotatorEvent::Error { fatal: true, .. })
    }
}

impl std::fmt::Display for RotatorEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RotatorEvent::Open { path }
            | RotatorEvent::RotatedOn { path }
            | RotatorEvent::RotatedOff { path } => write!(f, "{} {}", self.name(), path.display()),
            RotatorEvent::Pipe { source } => write!(f, "pipe from {}", source),
            RotatorEvent::Error { message, fatal } => {
                if *fatal {
                    write!(f, "fatal error: {}", message)
                } else {
                    write!(f, "error: {}", message)
                }
            }
            RotatorEvent::Drain | RotatorEvent::Close => write!(f, "{}", self.name()),
        }
    }
}

/// Broadcast fan-out of rotator events
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<RotatorEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RotatorEvent> {
        self.tx.subscribe()
    }

    /// Publish to current subscribers; events with no subscriber are dropped
    pub fn emit(&self, event: RotatorEvent) {
        let _ = self.tx.send(event);
    }
}
