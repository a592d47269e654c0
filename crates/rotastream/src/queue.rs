//! FIFO of writes waiting for a ready backing file

use bytes::Bytes;
use std::collections::VecDeque;

/// Pending writes in submission order
#[derive(Debug, Default)]
pub struct WriteQueue {
    items: VecDeque<Bytes>,
    bytes: u64,
    backlogged: bool,
}

impl WriteQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append to the tail; empty chunks carry nothing and are not queued
    pub fn push(&mut self, chunk: Bytes) {
        if chunk.is_empty() {
            return;
        }
        self.bytes += chunk.len() as u64;
        self.items.push_back(chunk);
    }

    /// Put a chunk that could not be committed back at the head
    pub fn push_front(&mut self, chunk: Bytes) {
        self.bytes += chunk.len() as u64;
        self.items.push_front(chunk);
    }

    pub fn front(&self) -> Option<&Bytes> {
        self.items.front()
    }

    pub fn pop_front(&mut self) -> Option<Bytes> {
        let chunk = self.items.pop_front()?;
        self.bytes -= chunk.len() as u64;
        Some(chunk)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Total bytes waiting
    pub fn pending_bytes(&self) -> u64 {
        self.bytes
    }

    /// Record that data had to wait for a backing file
    pub fn mark_backlogged(&mut self) {
        if !self.items.is_empty() {
            self.backlogged = true;
        }
    }

    /// True once per backlog, when the queue has emptied again
    pub fn take_drained(&mut self) -> bool {
        if self.backlogged && self.items.is_empty() {
            self.backlogged = false;
            return true;
        }
        false
    }

    /// Drop everything, returning how many chunks were discarded
    pub fn clear(&mut self) -> usize {
        let discarded = self.items.len();
        self.items.clear();
        self.bytes = 0;
        self.backlogged = false;
        discarded
    }
}
