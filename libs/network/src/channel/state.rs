//! Per-channel state behind one lock

use std::collections::HashMap;

use parking_lot::Mutex;
use tracing::warn;
use types::{ChannelId, SessionId};

use super::{Attachment, ChannelLifecycle};
use crate::error::ChannelError;

#[derive(Debug)]
struct ChannelState {
    lifecycle: ChannelLifecycle,
    channel_id: ChannelId,
    session: SessionId,
    connect_count: u64,
    connect_attempt_count: u64,
    attachments: HashMap<String, Attachment>,
}

/// Lifecycle, identity, session, counters and attachments of one channel.
///
/// Only the documented transitions are exposed; every one takes the same lock
/// for a short, non-blocking critical section.
#[derive(Debug)]
pub struct ChannelStatus {
    state: Mutex<ChannelState>,
}

impl ChannelStatus {
    pub fn new(channel_id: ChannelId) -> Self {
        Self {
            state: Mutex::new(ChannelState {
                lifecycle: ChannelLifecycle::Init,
                channel_id,
                session: SessionId::NULL,
                connect_count: 0,
                connect_attempt_count: 0,
                attachments: HashMap::new(),
            }),
        }
    }

    pub fn lifecycle(&self) -> ChannelLifecycle {
        self.state.lock().lifecycle
    }

    /// INIT → OPEN
    pub fn open(&self) -> Result<(), ChannelError> {
        let mut state = self.state.lock();
        match state.lifecycle {
            ChannelLifecycle::Init => {
                state.lifecycle = ChannelLifecycle::Open;
                Ok(())
            }
            other => Err(ChannelError::illegal_transition(state.channel_id, "open", other)),
        }
    }

    /// Move to CLOSED. Returns `true` for the single caller that performed the
    /// transition, `false` when the channel was already closed.
    pub fn close_once(&self) -> bool {
        let mut state = self.state.lock();
        match state.lifecycle {
            ChannelLifecycle::Closed => false,
            ChannelLifecycle::Init => {
                warn!(channel = %state.channel_id, "Closing channel before it was ever opened");
                state.lifecycle = ChannelLifecycle::Closed;
                true
            }
            ChannelLifecycle::Open => {
                state.lifecycle = ChannelLifecycle::Closed;
                true
            }
        }
    }

    /// Back to INIT ahead of a reconnect. A closed channel stays closed.
    pub fn reset(&self) -> Result<(), ChannelError> {
        let mut state = self.state.lock();
        match state.lifecycle {
            ChannelLifecycle::Closed => Err(ChannelError::Closed {
                channel: state.channel_id,
            }),
            _ => {
                state.lifecycle = ChannelLifecycle::Init;
                Ok(())
            }
        }
    }

    pub fn channel_id(&self) -> ChannelId {
        self.state.lock().channel_id
    }

    /// Set the id on first connect. Ids are immutable once assigned, so a
    /// different id on a later connect is ignored.
    pub fn assign_channel_id(&self, id: ChannelId) -> ChannelId {
        let mut state = self.state.lock();
        if state.channel_id.is_null() {
            state.channel_id = id;
        } else if state.channel_id != id {
            warn!(channel = %state.channel_id, offered = %id, "Ignoring channel id change");
        }
        state.channel_id
    }

    pub fn session_id(&self) -> SessionId {
        self.state.lock().session
    }

    /// Start a new session generation and return it.
    pub fn next_session(&self) -> SessionId {
        let mut state = self.state.lock();
        state.session = state.session.next();
        state.session
    }

    pub fn record_connect(&self) -> u64 {
        let mut state = self.state.lock();
        state.connect_count += 1;
        state.connect_count
    }

    pub fn record_connect_attempt(&self) -> u64 {
        let mut state = self.state.lock();
        state.connect_attempt_count += 1;
        state.connect_attempt_count
    }

    pub fn connect_count(&self) -> u64 {
        self.state.lock().connect_count
    }

    pub fn connect_attempt_count(&self) -> u64 {
        self.state.lock().connect_attempt_count
    }

    pub fn add_attachment(&self, key: &str, value: Attachment, replace: bool) -> Option<Attachment> {
        let mut state = self.state.lock();
        if !replace {
            if let Some(existing) = state.attachments.get(key) {
                return Some(existing.clone());
            }
        }
        state.attachments.insert(key.to_string(), value)
    }

    pub fn get_attachment(&self, key: &str) -> Option<Attachment> {
        self.state.lock().attachments.get(key).cloned()
    }

    pub fn remove_attachment(&self, key: &str) -> Option<Attachment> {
        self.state.lock().attachments.remove(key)
    }
}
