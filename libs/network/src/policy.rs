//! Admission control for inbound connections
//!
//! A listener asks the policy before assigning a fresh channel id. Refused
//! clients are answered with the null id. Ids are released when their channel
//! leaves the channel manager.

use std::collections::HashSet;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tracing::debug;
use types::ChannelId;

use crate::channel::MessageChannel;
use crate::manager::{ChannelManager, ChannelManagerEventListener};

#[derive(Debug, Default)]
pub struct ConnectionPolicy {
    max_connections: Option<usize>,
    admitted: Mutex<HashSet<ChannelId>>,
}

impl ConnectionPolicy {
    /// Admit every connection
    pub fn unlimited() -> Self {
        Self::default()
    }

    pub fn with_max_connections(max_connections: usize) -> Self {
        Self {
            max_connections: Some(max_connections),
            admitted: Mutex::new(HashSet::new()),
        }
    }

    pub fn max_connections(&self) -> Option<usize> {
        self.max_connections
    }

    pub fn connection_count(&self) -> usize {
        self.admitted.lock().len()
    }

    /// Reserve a slot for `channel_id`. Admitting an id twice takes one slot.
    pub fn try_admit(&self, channel_id: ChannelId) -> bool {
        let mut admitted = self.admitted.lock();
        if admitted.contains(&channel_id) {
            return true;
        }
        if self
            .max_connections
            .is_some_and(|max| admitted.len() >= max)
        {
            return false;
        }
        admitted.insert(channel_id);
        true
    }

    pub fn release(&self, channel_id: ChannelId) -> bool {
        self.admitted.lock().remove(&channel_id)
    }

    /// Listener that frees a slot whenever `manager` drops a channel for good.
    pub(crate) fn releaser(
        self: &Arc<Self>,
        manager: &Arc<ChannelManager>,
    ) -> Arc<dyn ChannelManagerEventListener> {
        Arc::new(ConnectionReleaser {
            policy: self.clone(),
            manager: Arc::downgrade(manager),
        })
    }
}

struct ConnectionReleaser {
    policy: Arc<ConnectionPolicy>,
    manager: Weak<ChannelManager>,
}

impl ChannelManagerEventListener for ConnectionReleaser {
    fn channel_created(&self, _channel: &Arc<dyn MessageChannel>) {}

    fn channel_removed(&self, channel: &Arc<dyn MessageChannel>) {
        let channel_id = channel.channel_id();
        // a replacement registered under the same id keeps the slot
        let replaced = self
            .manager
            .upgrade()
            .is_some_and(|manager| manager.is_valid_id(channel_id));
        if !replaced && self.policy.release(channel_id) {
            debug!(channel = %channel_id, connections = self.policy.connection_count(), "Connection released");
        }
    }
}
