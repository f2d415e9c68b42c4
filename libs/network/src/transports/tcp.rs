//! TCP Network Layer Implementation
//!
//! Frames travel with a 4-byte big-endian length prefix. Before the first frame
//! both sides exchange an 8-byte connection id: the client presents the id it
//! held before (zero on first connect) and the server answers with the id it
//! assigned. A reconnecting client therefore keeps its identity.
//!
//! Each live connection runs two tasks: a reader that hands every frame to the
//! receive layer, and a writer fed from a bounded queue so `send()` never holds
//! a lock across socket I/O.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use types::ConnectionId;

use super::{NetworkLayer, ReceiveLayer};
use crate::{Result, TransportError};

/// TCP network layer configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TcpNetworkConfig {
    /// Remote address to connect to (client mode)
    pub remote_address: Option<SocketAddr>,
    /// Connection and handshake timeout
    pub connect_timeout: Duration,
    /// Maximum frame size in either direction
    pub max_frame_size: usize,
    /// Frames buffered ahead of the writer task
    pub write_queue_depth: usize,
}

impl Default for TcpNetworkConfig {
    fn default() -> Self {
        Self {
            remote_address: None,
            connect_timeout: Duration::from_secs(5),
            max_frame_size: 16 * 1024 * 1024, // 16MB
            write_queue_depth: 1024,
        }
    }
}

/// Shared between a connection's tasks so either can report the loss once.
struct LinkEvents {
    connection_id: ConnectionId,
    connected: Arc<AtomicBool>,
    receive_layer: Option<Weak<dyn ReceiveLayer>>,
}

impl LinkEvents {
    fn upcall(&self) -> Option<Arc<dyn ReceiveLayer>> {
        self.receive_layer.as_ref().and_then(Weak::upgrade)
    }

    fn disconnected(&self, reason: &str) {
        if self.connected.swap(false, Ordering::AcqRel) {
            info!(connection = %self.connection_id, reason, "TCP connection lost");
            if let Some(layer) = self.upcall() {
                layer.notify_transport_disconnected(self.connection_id);
            }
        }
    }
}

struct ActiveLink {
    writer: mpsc::Sender<Bytes>,
    tasks: [JoinHandle<()>; 2],
}

impl ActiveLink {
    fn abort(&self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}

#[derive(Default)]
struct LinkState {
    connection_id: ConnectionId,
    link: Option<ActiveLink>,
    /// Accepted stream waiting for `open()`
    pending: Option<TcpStream>,
    local: Option<SocketAddr>,
    remote: Option<SocketAddr>,
}

/// One TCP connection, either dialled (client) or accepted (server)
pub struct TcpNetworkLayer {
    config: TcpNetworkConfig,
    state: Mutex<LinkState>,
    receive_layer: RwLock<Option<Weak<dyn ReceiveLayer>>>,
    connected: Arc<AtomicBool>,
    closed: AtomicBool,
}

impl std::fmt::Debug for TcpNetworkLayer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("TcpNetworkLayer")
            .field("connection_id", &state.connection_id)
            .field("local", &state.local)
            .field("remote", &state.remote)
            .field("connected", &self.is_connected())
            .finish()
    }
}

impl TcpNetworkLayer {
    /// Client layer dialling `remote_address`
    pub fn new_client(remote_address: SocketAddr, config: TcpNetworkConfig) -> Arc<Self> {
        Self::from_config(TcpNetworkConfig {
            remote_address: Some(remote_address),
            ..config
        })
    }

    pub fn from_config(config: TcpNetworkConfig) -> Arc<Self> {
        Arc::new(Self {
            config,
            state: Mutex::new(LinkState::default()),
            receive_layer: RwLock::new(None),
            connected: Arc::new(AtomicBool::new(false)),
            closed: AtomicBool::new(false),
        })
    }

    pub fn connection_id(&self) -> ConnectionId {
        self.state.lock().connection_id
    }

    fn upcall(&self) -> Option<Arc<dyn ReceiveLayer>> {
        self.receive_layer.read().as_ref().and_then(Weak::upgrade)
    }

    async fn dial(&self, remote: SocketAddr) -> Result<(TcpStream, ConnectionId)> {
        let timeout = self.config.connect_timeout;
        let mut stream = tokio::time::timeout(timeout, TcpStream::connect(remote))
            .await
            .map_err(|_| TransportError::timeout("TCP connect", timeout.as_millis() as u64))?
            .map_err(|e| {
                TransportError::connection_with_source("Failed to connect", Some(remote), e)
            })?;

        if let Err(e) = stream.set_nodelay(true) {
            warn!("Failed to set TCP_NODELAY: {}", e);
        }

        let requested = self.connection_id();
        let assigned = tokio::time::timeout(timeout, async {
            stream.write_all(&requested.inner().to_be_bytes()).await?;
            stream.flush().await?;
            stream.read_u64().await
        })
        .await
        .map_err(|_| TransportError::timeout("connection id exchange", timeout.as_millis() as u64))?
        .map_err(|e| TransportError::network_with_source("Connection id exchange failed", e))?;

        if assigned == 0 {
            return Err(TransportError::connection(
                "Server refused the connection",
                Some(remote),
            ));
        }
        Ok((stream, ConnectionId::new(assigned)))
    }

    /// Split the stream and spawn its reader and writer tasks.
    fn start_link(&self, stream: TcpStream, connection_id: ConnectionId) -> Result<()> {
        let local = stream.local_addr().ok();
        let remote = stream.peer_addr().ok();
        let (reader, writer) = stream.into_split();

        let events = Arc::new(LinkEvents {
            connection_id,
            connected: self.connected.clone(),
            receive_layer: self.receive_layer.read().clone(),
        });
        let (tx, rx) = mpsc::channel(self.config.write_queue_depth);

        self.connected.store(true, Ordering::Release);
        let reader_task = tokio::spawn(read_frames(
            reader,
            self.config.max_frame_size,
            events.clone(),
        ));
        let writer_task = tokio::spawn(write_frames(writer, rx, events));

        let mut state = self.state.lock();
        if let Some(old) = state.link.take() {
            old.abort();
        }
        state.connection_id = connection_id;
        state.local = local;
        state.remote = remote;
        state.link = Some(ActiveLink {
            writer: tx,
            tasks: [reader_task, writer_task],
        });
        Ok(())
    }

    fn stop_link(&self) {
        self.connected.store(false, Ordering::Release);
        let mut state = self.state.lock();
        if let Some(link) = state.link.take() {
            link.abort();
        }
        state.pending = None;
    }
}

#[async_trait]
impl NetworkLayer for TcpNetworkLayer {
    fn set_receive_layer(&self, layer: Weak<dyn ReceiveLayer>) {
        *self.receive_layer.write() = Some(layer);
    }

    /// Client: dial and exchange ids. Accepted connection: start its tasks.
    async fn open(&self) -> Result<ConnectionId> {
        if self.closed.load(Ordering::Acquire) {
            return Err(TransportError::connection("TCP layer is closed", None));
        }
        if self.is_connected() {
            return Err(TransportError::connection("TCP layer already connected", None));
        }

        let pending = self.state.lock().pending.take();
        let (stream, connection_id) = match pending {
            Some(stream) => (stream, self.connection_id()),
            None => {
                let remote = self.config.remote_address.ok_or_else(|| {
                    TransportError::configuration("No remote address configured", Some("remote_address"))
                })?;
                if let Some(layer) = self.upcall() {
                    layer.notify_transport_connect_attempt();
                }
                info!("Connecting to TCP peer at {}", remote);
                self.dial(remote).await?
            }
        };

        self.start_link(stream, connection_id)?;
        info!(connection = %connection_id, remote = ?self.remote_address(), "TCP connection established");

        if let Some(layer) = self.upcall() {
            layer.notify_transport_connected(connection_id);
        }
        Ok(connection_id)
    }

    async fn send(&self, frame: Bytes) -> Result<()> {
        if frame.len() > self.config.max_frame_size {
            return Err(TransportError::protocol(format!(
                "Frame size {} exceeds maximum {}",
                frame.len(),
                self.config.max_frame_size
            )));
        }

        let writer = {
            let state = self.state.lock();
            match &state.link {
                Some(link) if self.is_connected() => link.writer.clone(),
                _ => return Err(TransportError::connection("TCP layer not connected", state.remote)),
            }
        };

        writer
            .send(frame)
            .await
            .map_err(|_| TransportError::network("TCP writer stopped"))
    }

    fn close(&self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            self.stop_link();
            debug!(connection = %self.connection_id(), "TCP layer closed");
            if let Some(layer) = self.upcall() {
                layer.notify_transport_closed();
            }
        }
    }

    fn reset(&self) {
        self.stop_link();
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    fn local_address(&self) -> Option<SocketAddr> {
        self.state.lock().local
    }

    fn remote_address(&self) -> Option<SocketAddr> {
        self.state.lock().remote
    }
}

/// An accepted socket that has presented its requested connection id
pub struct PendingConnection {
    stream: TcpStream,
    peer: SocketAddr,
    requested: ConnectionId,
}

impl PendingConnection {
    /// Read the client's requested connection id.
    pub async fn read_request(
        mut stream: TcpStream,
        peer: SocketAddr,
        config: &TcpNetworkConfig,
    ) -> Result<Self> {
        if let Err(e) = stream.set_nodelay(true) {
            warn!("Failed to set TCP_NODELAY: {}", e);
        }
        let timeout = config.connect_timeout;
        let requested = tokio::time::timeout(timeout, stream.read_u64())
            .await
            .map_err(|_| TransportError::timeout("connection id request", timeout.as_millis() as u64))?
            .map_err(|e| TransportError::connection_with_source("Connection id request failed", Some(peer), e))?;

        Ok(Self {
            stream,
            peer,
            requested: ConnectionId::new(requested),
        })
    }

    /// Id the client held before, null on first connect
    pub fn requested(&self) -> ConnectionId {
        self.requested
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    /// Answer with the null id, which the client reports as a refusal, and drop the socket.
    pub async fn refuse(mut self) -> Result<()> {
        self.stream
            .write_all(&ConnectionId::NULL.inner().to_be_bytes())
            .await?;
        self.stream.flush().await?;
        debug!(peer = %self.peer, "Refused TCP connection");
        Ok(())
    }

    /// Answer with the assigned id. The returned layer starts its tasks on `open()`.
    pub async fn complete(
        mut self,
        assigned: ConnectionId,
        config: TcpNetworkConfig,
    ) -> Result<Arc<TcpNetworkLayer>> {
        self.stream.write_all(&assigned.inner().to_be_bytes()).await?;
        self.stream.flush().await?;

        let layer = TcpNetworkLayer::from_config(config);
        {
            let mut state = layer.state.lock();
            state.connection_id = assigned;
            state.remote = Some(self.peer);
            state.local = self.stream.local_addr().ok();
            state.pending = Some(self.stream);
        }
        debug!(peer = %self.peer, connection = %assigned, "Accepted TCP connection");
        Ok(layer)
    }
}

async fn read_frame<R: AsyncRead + Unpin>(reader: &mut R, max_size: usize) -> Result<Bytes> {
    let frame_len = reader
        .read_u32()
        .await
        .map_err(|e| TransportError::network_with_source("Failed to read frame length", e))?
        as usize;

    if frame_len > max_size {
        return Err(TransportError::protocol(format!(
            "Frame size {} exceeds maximum {}",
            frame_len, max_size
        )));
    }

    let mut buffer = BytesMut::zeroed(frame_len);
    reader
        .read_exact(&mut buffer)
        .await
        .map_err(|e| TransportError::network_with_source("Failed to read frame data", e))?;
    Ok(buffer.freeze())
}

async fn write_frame<W: AsyncWrite + Unpin>(writer: &mut W, frame: &[u8]) -> Result<()> {
    let mut buffer = BytesMut::with_capacity(4 + frame.len());
    buffer.extend_from_slice(&(frame.len() as u32).to_be_bytes());
    buffer.extend_from_slice(frame);

    writer
        .write_all(&buffer)
        .await
        .map_err(|e| TransportError::network_with_source("Failed to write frame", e))?;
    writer
        .flush()
        .await
        .map_err(|e| TransportError::network_with_source("Failed to flush TCP stream", e))?;
    Ok(())
}

async fn read_frames<R: AsyncRead + Unpin>(mut reader: R, max_size: usize, events: Arc<LinkEvents>) {
    loop {
        match read_frame(&mut reader, max_size).await {
            Ok(frame) => {
                debug!(connection = %events.connection_id, bytes = frame.len(), "Received frame");
                match events.upcall() {
                    Some(layer) => layer.receive(vec![frame]),
                    None => {
                        warn!(connection = %events.connection_id, "No receive layer attached, dropping frame");
                    }
                }
            }
            Err(e) => {
                events.disconnected(&e.to_string());
                return;
            }
        }
    }
}

async fn write_frames<W: AsyncWrite + Unpin>(
    mut writer: W,
    mut frames: mpsc::Receiver<Bytes>,
    events: Arc<LinkEvents>,
) {
    while let Some(frame) = frames.recv().await {
        if let Err(e) = write_frame(&mut writer, &frame).await {
            events.disconnected(&e.to_string());
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_frame_codec_over_duplex() {
        let (mut a, mut b) = tokio::io::duplex(1024);
        write_frame(&mut a, b"hello").await.unwrap();
        let frame = read_frame(&mut b, 1024).await.unwrap();
        assert_eq!(&frame[..], b"hello");
    }

    #[tokio::test]
    async fn test_oversized_frame_rejected() {
        let (mut a, mut b) = tokio::io::duplex(1024);
        write_frame(&mut a, &[0u8; 64]).await.unwrap();
        let err = read_frame(&mut b, 16).await.unwrap_err();
        assert_eq!(err.category(), "protocol");
    }

    #[tokio::test]
    async fn test_client_without_remote_fails() {
        let layer = TcpNetworkLayer::from_config(TcpNetworkConfig::default());
        let err = layer.open().await.unwrap_err();
        assert_eq!(err.category(), "configuration");
        assert!(!layer.is_connected());
    }
}
