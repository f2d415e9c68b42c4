//! Communications Manager
//!
//! Top-level wiring for one process: the shared router, the message mappings
//! every channel family starts from, TCP listeners with their channel managers,
//! and outbound client channels. Shutdown is set-once; nothing new can be
//! created afterwards.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use types::{ChannelId, ConnectionId, MessageType, MessageTypeRegistry};

use crate::channel::{ClientMessageChannel, MessageChannel};
use crate::error::{CommsError, FactoryError, TransportError};
use crate::manager::{ChannelManager, DefaultServerChannelFactory};
use crate::policy::ConnectionPolicy;
use crate::protocol::{MessageFactory, MessageMapping, MessageMonitor};
use crate::routing::{start_hydrate_stage, HydrateContext, MessageRouter, Stage};
use crate::transports::{NetworkLayer, PendingConnection, TcpNetworkConfig, TcpNetworkLayer};

/// Hands out connection ids, starting at 1
#[derive(Debug)]
pub struct ConnectionIdFactory {
    next: AtomicU64,
}

impl Default for ConnectionIdFactory {
    fn default() -> Self {
        Self {
            next: AtomicU64::new(1),
        }
    }
}

impl ConnectionIdFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_id(&self) -> ConnectionId {
        ConnectionId::new(self.next.fetch_add(1, Ordering::Relaxed))
    }
}

/// A bound TCP endpoint feeding accepted connections to its channel manager
pub struct NetworkListener {
    local_address: SocketAddr,
    channel_manager: Arc<ChannelManager>,
    accept_task: Mutex<Option<JoinHandle<()>>>,
}

impl NetworkListener {
    pub fn local_address(&self) -> SocketAddr {
        self.local_address
    }

    pub fn channel_manager(&self) -> &Arc<ChannelManager> {
        &self.channel_manager
    }

    pub fn is_running(&self) -> bool {
        self.accept_task.lock().is_some()
    }

    /// Stop accepting and close every channel this listener created.
    pub fn stop(&self) -> Result<(), CommsError> {
        if let Some(task) = self.accept_task.lock().take() {
            task.abort();
            info!(address = %self.local_address, "Listener stopped");
        }
        self.channel_manager.close_all_channels()?;
        Ok(())
    }
}

pub struct CommunicationsManager {
    name: String,
    monitor: Arc<dyn MessageMonitor>,
    router: Arc<MessageRouter>,
    class_mappings: Mutex<HashMap<MessageType, MessageMapping>>,
    transport_config: TcpNetworkConfig,
    connection_ids: Arc<ConnectionIdFactory>,
    connection_policy: Arc<ConnectionPolicy>,
    listeners: Mutex<Vec<Arc<NetworkListener>>>,
    hydrate_stage: Mutex<Option<Arc<Stage<HydrateContext>>>>,
    shutdown: AtomicBool,
}

impl CommunicationsManager {
    /// Fails if the message type table does not pass its startup check.
    pub fn new(
        name: impl Into<String>,
        monitor: Arc<dyn MessageMonitor>,
        transport_config: TcpNetworkConfig,
    ) -> Result<Self, CommsError> {
        let registry = MessageTypeRegistry::global()?;
        let name = name.into();
        debug!(name = %name, message_types = registry.len(), "Communications manager created");

        Ok(Self {
            name,
            monitor,
            router: Arc::new(MessageRouter::new()),
            class_mappings: Mutex::new(HashMap::new()),
            transport_config,
            connection_ids: Arc::new(ConnectionIdFactory::new()),
            connection_policy: Arc::new(ConnectionPolicy::unlimited()),
            listeners: Mutex::new(Vec::new()),
            hydrate_stage: Mutex::new(None),
            shutdown: AtomicBool::new(false),
        })
    }

    /// Admission policy shared by every listener created afterwards
    pub fn with_connection_policy(mut self, policy: ConnectionPolicy) -> Self {
        self.connection_policy = Arc::new(policy);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn connection_policy(&self) -> &Arc<ConnectionPolicy> {
        &self.connection_policy
    }

    pub fn router(&self) -> &Arc<MessageRouter> {
        &self.router
    }

    pub fn monitor(&self) -> &Arc<dyn MessageMonitor> {
        &self.monitor
    }

    /// Register a mapping copied into every factory created from now on.
    pub fn add_class_mapping(
        &self,
        message_type: MessageType,
        mapping: MessageMapping,
    ) -> Result<(), FactoryError> {
        if mapping.outbound.is_none() && mapping.inbound.is_none() {
            return Err(FactoryError::Unmappable { message_type });
        }
        let mut mappings = self.class_mappings.lock();
        if mappings.contains_key(&message_type) {
            return Err(FactoryError::AlreadyMapped { message_type });
        }
        mappings.insert(message_type, mapping);
        Ok(())
    }

    /// Factory preloaded with the manager-level mappings
    pub fn new_message_factory(&self) -> Result<Arc<MessageFactory>, FactoryError> {
        let factory = MessageFactory::new(self.monitor.clone());
        let mappings: Vec<_> = self
            .class_mappings
            .lock()
            .iter()
            .map(|(message_type, mapping)| (*message_type, mapping.clone()))
            .collect();
        for (message_type, mapping) in mappings {
            factory.add_class_mapping(message_type, mapping)?;
        }
        Ok(Arc::new(factory))
    }

    /// Start (once) the hydration stage used for hydrated routes. Later calls
    /// return the running stage; its worker count does not change.
    pub fn hydrate_stage(&self, workers: usize) -> Arc<Stage<HydrateContext>> {
        let mut slot = self.hydrate_stage.lock();
        if let Some(stage) = slot.as_ref() {
            let running = stage.worker_count();
            if running != workers.max(1) {
                warn!(
                    name = %self.name,
                    requested = workers,
                    running,
                    "Hydration stage already running; worker count unchanged"
                );
            }
            return stage.clone();
        }
        slot.insert(start_hydrate_stage(workers)).clone()
    }

    pub fn create_server_channel_manager(
        &self,
        transport_disconnect_removes_channel: bool,
    ) -> Result<Arc<ChannelManager>, CommsError> {
        self.ensure_running()?;
        let factory = self.new_message_factory()?;
        Ok(ChannelManager::new(
            Arc::new(DefaultServerChannelFactory::new(factory, self.router.clone())),
            transport_disconnect_removes_channel,
        ))
    }

    /// Bind `bind_address` and accept connections into a new channel manager.
    pub async fn create_listener(
        &self,
        bind_address: SocketAddr,
        transport_disconnect_removes_channel: bool,
    ) -> Result<Arc<NetworkListener>, CommsError> {
        let channel_manager = self.create_server_channel_manager(transport_disconnect_removes_channel)?;
        let socket = TcpListener::bind(bind_address).await.map_err(|e| {
            TransportError::network_with_source(format!("Failed to bind {}", bind_address), e)
        })?;
        let local_address = socket.local_addr().map_err(TransportError::from)?;
        channel_manager.add_event_listener(self.connection_policy.releaser(&channel_manager));

        let accept_task = tokio::spawn(accept_loop(
            socket,
            channel_manager.clone(),
            self.connection_ids.clone(),
            self.connection_policy.clone(),
            self.transport_config.clone(),
        ));
        let listener = Arc::new(NetworkListener {
            local_address,
            channel_manager,
            accept_task: Mutex::new(Some(accept_task)),
        });
        self.listeners.lock().push(listener.clone());
        info!(
            name = %self.name,
            address = %local_address,
            max_connections = ?self.connection_policy.max_connections(),
            "Listener started"
        );
        Ok(listener)
    }

    /// Client channel over TCP. The channel is returned in INIT; call `open()`.
    pub fn create_client_channel(
        &self,
        remote_address: SocketAddr,
    ) -> Result<Arc<ClientMessageChannel>, CommsError> {
        let transport = TcpNetworkLayer::new_client(remote_address, self.transport_config.clone());
        self.create_client_channel_with_transport(transport)
    }

    pub fn create_client_channel_with_transport(
        &self,
        transport: Arc<dyn NetworkLayer>,
    ) -> Result<Arc<ClientMessageChannel>, CommsError> {
        self.ensure_running()?;
        let factory = self.new_message_factory()?;
        Ok(ClientMessageChannel::new(transport, factory, self.router.clone()))
    }

    pub fn all_listeners(&self) -> Vec<Arc<NetworkListener>> {
        self.listeners.lock().clone()
    }

    pub fn is_in_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::Acquire)
    }

    /// Stop all listeners and the hydration stage. Only the first call has any
    /// effect. Every listener is stopped even if one fails; the first failure
    /// is returned.
    pub async fn shutdown(&self) -> Result<(), CommsError> {
        if self.shutdown.swap(true, Ordering::AcqRel) {
            warn!(name = %self.name, "Shutdown already started");
            return Ok(());
        }
        info!(name = %self.name, "Communications manager shutting down");

        let mut result = Ok(());
        let listeners: Vec<_> = std::mem::take(&mut *self.listeners.lock());
        for listener in listeners {
            if let Err(e) = listener.stop() {
                error!(address = %listener.local_address(), error = %e, "Listener did not stop cleanly");
                if result.is_ok() {
                    result = Err(e);
                }
            }
        }

        let stage = self.hydrate_stage.lock().take();
        if let Some(stage) = stage {
            stage.stop().await;
        }
        result
    }

    fn ensure_running(&self) -> Result<(), CommsError> {
        if self.is_in_shutdown() {
            return Err(CommsError::ShutDown);
        }
        Ok(())
    }
}

async fn accept_loop(
    socket: TcpListener,
    channel_manager: Arc<ChannelManager>,
    connection_ids: Arc<ConnectionIdFactory>,
    policy: Arc<ConnectionPolicy>,
    config: TcpNetworkConfig,
) {
    loop {
        match socket.accept().await {
            Ok((stream, peer)) => {
                let channel_manager = channel_manager.clone();
                let connection_ids = connection_ids.clone();
                let policy = policy.clone();
                let config = config.clone();
                tokio::spawn(async move {
                    let accepted = accept_connection(
                        stream,
                        peer,
                        &channel_manager,
                        &connection_ids,
                        &policy,
                        config,
                    )
                    .await;
                    if let Err(e) = accepted {
                        warn!(%peer, error = %e, "Rejected inbound connection");
                    }
                });
            }
            Err(e) => {
                warn!(error = %e, "Accept failed");
                tokio::time::sleep(Duration::from_millis(100)).await;
            }
        }
    }
}

/// Complete the id exchange and attach the connection to a channel. A client
/// presenting the id of a still-registered channel gets that channel back; a
/// new client the policy has no room for is answered with the null id.
async fn accept_connection(
    stream: TcpStream,
    peer: SocketAddr,
    channel_manager: &ChannelManager,
    connection_ids: &ConnectionIdFactory,
    policy: &ConnectionPolicy,
    config: TcpNetworkConfig,
) -> Result<(), CommsError> {
    let pending = PendingConnection::read_request(stream, peer, &config).await?;
    let requested = pending.requested();
    let existing = if requested.is_null() {
        None
    } else {
        channel_manager.get_channel(ChannelId::from(requested))
    };
    let assigned = if existing.is_some() {
        requested
    } else {
        connection_ids.next_id()
    };

    if existing.is_none() && !policy.try_admit(ChannelId::from(assigned)) {
        pending.refuse().await?;
        return Err(CommsError::ConnectionRefused {
            peer,
            max_connections: policy.max_connections().unwrap_or_default(),
        });
    }

    let transport = match pending.complete(assigned, config).await {
        Ok(transport) => transport,
        Err(e) => {
            if existing.is_none() {
                policy.release(ChannelId::from(assigned));
            }
            return Err(e.into());
        }
    };
    match existing {
        Some(channel) => {
            info!(channel = %channel.channel_id(), %peer, "Client reconnected");
            channel.attach_transport(transport.clone())?;
        }
        None => {
            channel_manager.create_new_channel(ChannelId::from(assigned), transport.clone());
        }
    }
    transport.open().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::Weak;

    use super::*;
    use crate::error::ChannelError;
    use crate::manager::ChannelManagerEventListener;
    use crate::protocol::{NullMessageMonitor, PingMessage};
    use crate::transports::MemoryNetworkLayer;

    /// Registers one more channel the first time a channel is removed
    struct Resurrector {
        manager: Weak<ChannelManager>,
        fired: AtomicBool,
    }

    impl ChannelManagerEventListener for Resurrector {
        fn channel_created(&self, _channel: &Arc<dyn MessageChannel>) {}

        fn channel_removed(&self, _channel: &Arc<dyn MessageChannel>) {
            if self.fired.swap(true, Ordering::AcqRel) {
                return;
            }
            if let Some(manager) = self.manager.upgrade() {
                manager.create_new_channel(
                    ChannelId::new(99),
                    MemoryNetworkLayer::new(ConnectionId::new(99)),
                );
            }
        }
    }

    fn comms() -> CommunicationsManager {
        CommunicationsManager::new("test", Arc::new(NullMessageMonitor), TcpNetworkConfig::default())
            .unwrap()
    }

    #[test]
    fn test_connection_ids_start_at_one() {
        let ids = ConnectionIdFactory::new();
        assert_eq!(ids.next_id(), ConnectionId::new(1));
        assert_eq!(ids.next_id(), ConnectionId::new(2));
    }

    #[test]
    fn test_mappings_copied_into_factories() {
        let comms = comms();
        comms
            .add_class_mapping(MessageType::Ping, MessageMapping::of::<PingMessage>())
            .unwrap();
        assert_eq!(
            comms.add_class_mapping(MessageType::Ping, MessageMapping::of::<PingMessage>()),
            Err(FactoryError::AlreadyMapped { message_type: MessageType::Ping })
        );

        let factory = comms.new_message_factory().unwrap();
        assert_eq!(factory.capabilities(MessageType::Ping), Some((true, true)));
        // factories are independent copies
        assert!(comms.new_message_factory().unwrap().is_mapped(MessageType::Ping));
    }

    #[tokio::test]
    async fn test_nothing_created_after_shutdown() {
        let comms = comms();
        comms.shutdown().await.unwrap();
        comms.shutdown().await.unwrap();
        assert!(comms.is_in_shutdown());

        let addr: SocketAddr = "127.0.0.1:0".parse().unwrap();
        assert!(matches!(comms.create_listener(addr, true).await, Err(CommsError::ShutDown)));
        assert!(matches!(comms.create_client_channel(addr), Err(CommsError::ShutDown)));
    }

    #[tokio::test]
    async fn test_shutdown_reports_listener_failure() {
        let comms = comms();
        let addr: SocketAddr = "127.0.0.1:0".parse().unwrap();
        let failing = comms.create_listener(addr, true).await.unwrap();
        let healthy = comms.create_listener(addr, true).await.unwrap();

        let manager = failing.channel_manager().clone();
        manager.add_event_listener(Arc::new(Resurrector {
            manager: Arc::downgrade(&manager),
            fired: AtomicBool::new(false),
        }));
        manager.create_new_channel(ChannelId::new(1), MemoryNetworkLayer::new(ConnectionId::new(1)));
        healthy
            .channel_manager()
            .create_new_channel(ChannelId::new(2), MemoryNetworkLayer::new(ConnectionId::new(2)));

        let result = comms.shutdown().await;
        assert!(matches!(
            result,
            Err(CommsError::Channel(ChannelError::ChannelsRemaining { count: 1 }))
        ));
        // the failure does not stop the remaining listeners from shutting down
        assert!(!failing.is_running());
        assert!(!healthy.is_running());
        assert_eq!(healthy.channel_manager().channel_count(), 0);
    }

    #[tokio::test]
    async fn test_hydrate_stage_keeps_first_worker_count() {
        let comms = comms();
        let stage = comms.hydrate_stage(3);
        assert_eq!(stage.worker_count(), 3);

        let again = comms.hydrate_stage(8);
        assert!(Arc::ptr_eq(&stage, &again));
        assert_eq!(again.worker_count(), 3);

        comms.shutdown().await.unwrap();
        assert_eq!(stage.worker_count(), 0);
    }
}
