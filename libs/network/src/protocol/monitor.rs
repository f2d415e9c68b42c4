//! Message Monitor
//!
//! Observes every message construction and frame size. A monitor never affects
//! control flow; [`NullMessageMonitor`] is the default when nothing is watching.

use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use types::MessageType;

use crate::error::Direction;

pub trait MessageMonitor: Send + Sync {
    fn new_message(&self, direction: Direction, message_type: MessageType);

    fn message_bytes(&self, direction: Direction, message_type: MessageType, bytes: usize);
}

#[derive(Debug, Default)]
pub struct NullMessageMonitor;

impl MessageMonitor for NullMessageMonitor {
    fn new_message(&self, _direction: Direction, _message_type: MessageType) {}

    fn message_bytes(&self, _direction: Direction, _message_type: MessageType, _bytes: usize) {}
}

/// Counters for one (direction, type) pair
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MessageStats {
    pub messages: u64,
    pub bytes: u64,
}

#[derive(Debug, Default)]
struct Counters {
    messages: AtomicU64,
    bytes: AtomicU64,
}

/// Per-type, per-direction message and byte totals
#[derive(Debug, Default)]
pub struct MessageStatsMonitor {
    counters: DashMap<(Direction, MessageType), Counters>,
}

impl MessageStatsMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stats(&self, direction: Direction, message_type: MessageType) -> MessageStats {
        self.counters
            .get(&(direction, message_type))
            .map(|c| MessageStats {
                messages: c.messages.load(Ordering::Relaxed),
                bytes: c.bytes.load(Ordering::Relaxed),
            })
            .unwrap_or_default()
    }

    /// Totals across all types for one direction
    pub fn totals(&self, direction: Direction) -> MessageStats {
        self.counters
            .iter()
            .filter(|entry| entry.key().0 == direction)
            .fold(MessageStats::default(), |acc, entry| MessageStats {
                messages: acc.messages + entry.messages.load(Ordering::Relaxed),
                bytes: acc.bytes + entry.bytes.load(Ordering::Relaxed),
            })
    }

    pub fn snapshot(&self) -> Vec<(Direction, MessageType, MessageStats)> {
        let mut out: Vec<_> = self
            .counters
            .iter()
            .map(|entry| {
                let (direction, message_type) = *entry.key();
                (
                    direction,
                    message_type,
                    MessageStats {
                        messages: entry.messages.load(Ordering::Relaxed),
                        bytes: entry.bytes.load(Ordering::Relaxed),
                    },
                )
            })
            .collect();
        out.sort_by_key(|(direction, message_type, _)| (*message_type, *direction == Direction::Inbound));
        out
    }
}

impl MessageMonitor for MessageStatsMonitor {
    fn new_message(&self, direction: Direction, message_type: MessageType) {
        self.counters
            .entry((direction, message_type))
            .or_default()
            .messages
            .fetch_add(1, Ordering::Relaxed);
    }

    fn message_bytes(&self, direction: Direction, message_type: MessageType, bytes: usize) {
        self.counters
            .entry((direction, message_type))
            .or_default()
            .bytes
            .fetch_add(bytes as u64, Ordering::Relaxed);
    }
}
