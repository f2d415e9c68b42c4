//! Test doubles for sinks and listeners

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::Notify;
use types::{ChannelId, MessageType};

use crate::channel::{ChannelEvent, ChannelEventListener, ChannelEventType, MessageChannel};
use crate::error::RouteError;
use crate::manager::ChannelManagerEventListener;
use crate::protocol::BoxedMessage;
use crate::routing::Sink;

/// A sink that collects messages with bounded storage
pub struct CollectorSink {
    messages: Mutex<VecDeque<BoxedMessage>>,
    max_messages: usize,
    fail_on_put: AtomicBool,
    received: AtomicU64,
    arrived: Notify,
}

impl CollectorSink {
    pub fn new() -> Arc<Self> {
        Self::with_capacity(1000)
    }

    pub fn with_capacity(max_messages: usize) -> Arc<Self> {
        Arc::new(Self {
            messages: Mutex::new(VecDeque::with_capacity(max_messages.min(1024))),
            max_messages,
            fail_on_put: AtomicBool::new(false),
            received: AtomicU64::new(0),
            arrived: Notify::new(),
        })
    }

    /// Messages currently held
    pub fn message_count(&self) -> usize {
        self.messages.lock().len()
    }

    /// Messages ever accepted, including any evicted at capacity
    pub fn received_count(&self) -> u64 {
        self.received.load(Ordering::Acquire)
    }

    pub fn take_messages(&self) -> Vec<BoxedMessage> {
        self.messages.lock().drain(..).collect()
    }

    pub fn message_types(&self) -> Vec<MessageType> {
        self.messages.lock().iter().map(|m| m.message_type()).collect()
    }

    /// Reject every subsequent put with `StageClosed`.
    pub fn fail_puts(&self) {
        self.fail_on_put.store(true, Ordering::Release);
    }

    /// Wait until at least `count` messages have been accepted. Returns `false` on timeout.
    pub async fn wait_for(&self, count: u64, timeout: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let notified = self.arrived.notified();
            if self.received_count() >= count {
                return true;
            }
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return self.received_count() >= count;
            }
        }
    }
}

impl Sink<BoxedMessage> for CollectorSink {
    fn put(&self, message: BoxedMessage) -> Result<(), RouteError> {
        if self.fail_on_put.load(Ordering::Acquire) {
            return Err(RouteError::StageClosed {
                stage: "collector".to_string(),
            });
        }
        {
            let mut messages = self.messages.lock();
            if messages.len() >= self.max_messages {
                messages.pop_front();
            }
            messages.push_back(message);
        }
        self.received.fetch_add(1, Ordering::AcqRel);
        self.arrived.notify_waiters();
        Ok(())
    }
}

/// Records every channel event it is notified of
#[derive(Default)]
pub struct RecordingListener {
    events: Mutex<Vec<(ChannelEventType, ChannelId)>>,
}

impl RecordingListener {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn events(&self) -> Vec<(ChannelEventType, ChannelId)> {
        self.events.lock().clone()
    }

    pub fn count(&self, event_type: ChannelEventType) -> usize {
        self.events
            .lock()
            .iter()
            .filter(|(t, _)| *t == event_type)
            .count()
    }
}

impl ChannelEventListener for RecordingListener {
    fn notify_channel_event(&self, event: &ChannelEvent) {
        self.events
            .lock()
            .push((event.event_type, event.channel.channel_id()));
    }
}

/// Manager-level signals in arrival order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManagerSignal {
    Constructed(ChannelId),
    Created(ChannelId),
    Removed(ChannelId),
}

#[derive(Default)]
pub struct RecordingManagerListener {
    signals: Mutex<Vec<ManagerSignal>>,
}

impl RecordingManagerListener {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn signals(&self) -> Vec<ManagerSignal> {
        self.signals.lock().clone()
    }
}

impl ChannelManagerEventListener for RecordingManagerListener {
    fn channel_constructed(&self, channel: &Arc<dyn MessageChannel>) {
        self.signals
            .lock()
            .push(ManagerSignal::Constructed(channel.channel_id()));
    }

    fn channel_created(&self, channel: &Arc<dyn MessageChannel>) {
        self.signals
            .lock()
            .push(ManagerSignal::Created(channel.channel_id()));
    }

    fn channel_removed(&self, channel: &Arc<dyn MessageChannel>) {
        self.signals
            .lock()
            .push(ManagerSignal::Removed(channel.channel_id()));
    }
}
