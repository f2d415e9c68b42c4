//! In-Process Network Layer
//!
//! A [`MemoryNetworkLayer`] either stands alone, recording every frame it is
//! asked to send, or is one end of a pair whose frames are delivered straight
//! into the other end's receive layer. Connection loss can be simulated with
//! [`MemoryNetworkLayer::drop_connection`].

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::{Mutex, RwLock};
use tracing::debug;
use types::ConnectionId;

use super::{NetworkLayer, ReceiveLayer};
use crate::{Result, TransportError};

#[derive(Debug)]
pub struct MemoryNetworkLayer {
    connection_id: ConnectionId,
    connected: AtomicBool,
    closed: AtomicBool,
    peer: Mutex<Weak<MemoryNetworkLayer>>,
    receive_layer: RwLock<Option<Weak<dyn ReceiveLayer>>>,
    sent: Mutex<Vec<Bytes>>,
}

impl MemoryNetworkLayer {
    /// Unpaired layer that records outbound frames.
    pub fn new(connection_id: ConnectionId) -> Arc<Self> {
        Arc::new(Self {
            connection_id,
            connected: AtomicBool::new(false),
            closed: AtomicBool::new(false),
            peer: Mutex::new(Weak::new()),
            receive_layer: RwLock::new(None),
            sent: Mutex::new(Vec::new()),
        })
    }

    /// Two connected ends sharing one connection id: `(client, server)`.
    pub fn pair(connection_id: ConnectionId) -> (Arc<Self>, Arc<Self>) {
        let client = Self::new(connection_id);
        let server = Self::new(connection_id);
        *client.peer.lock() = Arc::downgrade(&server);
        *server.peer.lock() = Arc::downgrade(&client);
        (client, server)
    }

    pub fn connection_id(&self) -> ConnectionId {
        self.connection_id
    }

    /// Frames handed to `send` so far
    pub fn sent_frames(&self) -> Vec<Bytes> {
        self.sent.lock().clone()
    }

    pub fn sent_count(&self) -> usize {
        self.sent.lock().len()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Simulate an unexpected connection loss on both ends.
    pub fn drop_connection(&self) {
        self.lose_connection();
        if let Some(peer) = self.peer.lock().upgrade() {
            peer.lose_connection();
        }
    }

    /// Push raw segments into this end's receive layer as if they came off the wire.
    pub fn inject(&self, segments: Vec<Bytes>) {
        if let Some(layer) = self.upcall() {
            layer.receive(segments);
        }
    }

    fn lose_connection(&self) {
        if self.connected.swap(false, Ordering::AcqRel) {
            debug!(connection = %self.connection_id, "Memory transport disconnected");
            if let Some(layer) = self.upcall() {
                layer.notify_transport_disconnected(self.connection_id);
            }
        }
    }

    fn upcall(&self) -> Option<Arc<dyn ReceiveLayer>> {
        self.receive_layer.read().as_ref().and_then(Weak::upgrade)
    }
}

#[async_trait]
impl NetworkLayer for MemoryNetworkLayer {
    fn set_receive_layer(&self, layer: Weak<dyn ReceiveLayer>) {
        *self.receive_layer.write() = Some(layer);
    }

    async fn open(&self) -> Result<ConnectionId> {
        if self.is_closed() {
            return Err(TransportError::connection("transport is closed", None));
        }
        let layer = self.upcall();
        if let Some(layer) = &layer {
            layer.notify_transport_connect_attempt();
        }
        self.connected.store(true, Ordering::Release);
        if let Some(layer) = &layer {
            layer.notify_transport_connected(self.connection_id);
        }
        Ok(self.connection_id)
    }

    async fn send(&self, frame: Bytes) -> Result<()> {
        if !self.is_connected() {
            return Err(TransportError::connection("memory transport not connected", None));
        }
        self.sent.lock().push(frame.clone());

        let peer = self.peer.lock().upgrade();
        if let Some(peer) = peer {
            if peer.is_connected() {
                peer.inject(vec![frame]);
            }
        }
        Ok(())
    }

    fn close(&self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            self.connected.store(false, Ordering::Release);
            if let Some(layer) = self.upcall() {
                layer.notify_transport_closed();
            }
        }
    }

    fn reset(&self) {
        self.connected.store(false, Ordering::Release);
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    fn local_address(&self) -> Option<SocketAddr> {
        None
    }

    fn remote_address(&self) -> Option<SocketAddr> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Recorder {
        frames: Mutex<Vec<Vec<Bytes>>>,
        connected: Mutex<Vec<ConnectionId>>,
        disconnected: AtomicBool,
    }

    impl ReceiveLayer for Recorder {
        fn receive(&self, segments: Vec<Bytes>) {
            self.frames.lock().push(segments);
        }
        fn notify_transport_connected(&self, connection_id: ConnectionId) {
            self.connected.lock().push(connection_id);
        }
        fn notify_transport_disconnected(&self, _connection_id: ConnectionId) {
            self.disconnected.store(true, Ordering::SeqCst);
        }
        fn notify_transport_connect_attempt(&self) {}
        fn notify_transport_closed(&self) {}
    }

    #[tokio::test]
    async fn test_pair_delivers_frames() {
        let (client, server) = MemoryNetworkLayer::pair(ConnectionId::new(4));
        let recorder = Arc::new(Recorder::default());
        let weak: Weak<dyn ReceiveLayer> = Arc::downgrade(&recorder) as Weak<dyn ReceiveLayer>;
        server.set_receive_layer(weak);

        assert_eq!(server.open().await.unwrap(), ConnectionId::new(4));
        client.open().await.unwrap();
        client.send(Bytes::from_static(b"frame")).await.unwrap();

        assert_eq!(recorder.frames.lock().len(), 1);
        assert_eq!(recorder.connected.lock().as_slice(), &[ConnectionId::new(4)]);
        assert_eq!(client.sent_count(), 1);
    }

    #[tokio::test]
    async fn test_send_requires_connection() {
        let layer = MemoryNetworkLayer::new(ConnectionId::new(1));
        assert!(layer.send(Bytes::new()).await.is_err());
        layer.close();
        assert!(layer.open().await.is_err());
    }

    #[tokio::test]
    async fn test_drop_connection_notifies() {
        let (client, server) = MemoryNetworkLayer::pair(ConnectionId::new(2));
        let recorder = Arc::new(Recorder::default());
        client.set_receive_layer(Arc::downgrade(&recorder) as Weak<dyn ReceiveLayer>);
        client.open().await.unwrap();
        server.open().await.unwrap();

        server.drop_connection();
        assert!(recorder.disconnected.load(Ordering::SeqCst));
        assert!(!client.is_connected());
    }
}
