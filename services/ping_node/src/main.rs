//! PING/PONG node
//!
//! `ping_node serve` listens and answers every PING with a PONG on the same
//! channel. `ping_node ping` dials the configured remote, sends PINGs at a fixed
//! interval and logs each PONG after it passes through the hydration stage.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use comms_config::CommsConfig;
use network::{
    BoxedMessage, CommunicationsManager, ConnectionPolicy, Direction, MessageChannel, MessageMapping,
    MessageStatsMonitor, PingMessage, PongMessage, RouteError, Sink, TcpNetworkConfig,
};
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use types::MessageType;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    mode: Mode,
}

#[derive(Subcommand, Debug)]
enum Mode {
    /// Accept connections and answer PINGs
    Serve,
    /// Connect to the configured remote and send PINGs
    Ping {
        #[arg(short = 'n', long, default_value_t = 10)]
        count: u64,

        /// Milliseconds between PINGs
        #[arg(long, default_value_t = 1000)]
        interval_ms: u64,
    },
}

/// Replies to each PING on the channel it arrived on
struct Responder;

impl Sink<BoxedMessage> for Responder {
    fn put(&self, mut message: BoxedMessage) -> Result<(), RouteError> {
        tokio::spawn(async move {
            let channel = message.channel().clone();
            if let Err(e) = message.hydrate() {
                warn!(channel = %channel.channel_id(), error = %e, "Undecodable PING");
                channel.close();
                return;
            }
            let Some(ping) = message.downcast_ref::<PingMessage>() else {
                return;
            };

            let mut pong = match channel.create_message(MessageType::Pong) {
                Ok(pong) => pong,
                Err(e) => {
                    warn!(channel = %channel.channel_id(), error = %e, "Cannot build PONG");
                    return;
                }
            };
            if let Some(reply) = pong.downcast_mut::<PongMessage>() {
                reply.set(ping.sequence, ping.payload.clone());
            }
            if let Err(e) = channel.send(pong).await {
                warn!(channel = %channel.channel_id(), error = %e, "PONG not sent");
            }
        });
        Ok(())
    }
}

/// Logs hydrated PONGs
struct PongLogger;

impl Sink<BoxedMessage> for PongLogger {
    fn put(&self, message: BoxedMessage) -> Result<(), RouteError> {
        if let Some(pong) = message.downcast_ref::<PongMessage>() {
            info!(channel = %message.channel_id(), sequence = pong.sequence, "PONG");
        }
        Ok(())
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = CommsConfig::load(args.config.as_deref())?;

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.log_level.as_str().into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting {} ({})", config.name, env!("CARGO_PKG_VERSION"));

    let monitor = Arc::new(MessageStatsMonitor::new());
    let transport_config = TcpNetworkConfig {
        connect_timeout: config.connect_timeout(),
        max_frame_size: config.transport.max_frame_size,
        ..TcpNetworkConfig::default()
    };
    let policy = match config.listener.max_connections {
        Some(max) => ConnectionPolicy::with_max_connections(max),
        None => ConnectionPolicy::unlimited(),
    };
    let comms = CommunicationsManager::new(config.name.clone(), monitor.clone(), transport_config)?
        .with_connection_policy(policy);
    comms.add_class_mapping(MessageType::Ping, MessageMapping::of::<PingMessage>())?;
    comms.add_class_mapping(MessageType::Pong, MessageMapping::of::<PongMessage>())?;

    let result = match args.mode {
        Mode::Serve => serve(&comms, &config).await,
        Mode::Ping { count, interval_ms } => {
            ping(&comms, &config, count, Duration::from_millis(interval_ms)).await
        }
    };
    if let Err(e) = &result {
        error!("{:#}", e);
    }

    if let Err(e) = comms.shutdown().await {
        error!(error = %e, "Shutdown incomplete");
    }
    let sent = monitor.totals(Direction::Outbound);
    let received = monitor.totals(Direction::Inbound);
    info!(
        sent = sent.messages,
        sent_bytes = sent.bytes,
        received = received.messages,
        received_bytes = received.bytes,
        "Message totals"
    );
    result
}

async fn serve(comms: &CommunicationsManager, config: &CommsConfig) -> Result<()> {
    comms
        .router()
        .route_message_type(MessageType::Ping, Arc::new(Responder));

    let listener = comms
        .create_listener(
            config.listener_address()?,
            config.listener.transport_disconnect_removes_channel,
        )
        .await?;
    info!(address = %listener.local_address(), "Serving PINGs; Ctrl-C to stop");

    tokio::signal::ctrl_c()
        .await
        .context("Failed to install Ctrl-C handler")?;
    info!(
        channels = listener.channel_manager().channel_count(),
        "Shutdown signal received"
    );
    Ok(())
}

async fn ping(
    comms: &CommunicationsManager,
    config: &CommsConfig,
    count: u64,
    interval: Duration,
) -> Result<()> {
    let stage = comms.hydrate_stage(config.hydrate.workers);
    comms
        .router()
        .route_message_type_with_hydration(MessageType::Pong, Arc::new(PongLogger), stage);

    let channel = comms.create_client_channel(config.remote_address()?)?;
    let channel_id = channel.open().await?;
    info!(channel = %channel_id, "Connected");

    let mut ticker = tokio::time::interval(interval);
    for sequence in 1..=count {
        ticker.tick().await;
        let mut message = channel.create_message(MessageType::Ping)?;
        if let Some(ping) = message.downcast_mut::<PingMessage>() {
            ping.set(sequence, config.name.clone());
        }
        channel.send(message).await?;
    }

    // let the last PONG arrive
    tokio::time::sleep(interval).await;
    channel.close();
    Ok(())
}
