// src/main.rs
//! trail-listen
//!
//! Attaches to the trail session channel as the consumer and logs one line
//! per received session. Useful for checking that a simulation is streaming
//! before pointing a real visualizer at it.

use anyhow::{Context, Result};
use std::time::Duration;
use trail_link::observability::{init_metrics, init_tracing};
use trail_link::{InboundChannel, Session, TrailConfig};
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let config = TrailConfig::load().context("Failed to load configuration")?;

    // Initialize observability (tracing, metrics)
    init_tracing(&config.observability)?;
    init_metrics(&config.observability)?;

    info!("Starting trail-listen v{}", trail_link::VERSION);

    let channel: InboundChannel<Session> = InboundChannel::new(config.transport.clone());
    channel.on_receive(|session: Session| {
        let secondary_frames: usize = session.secondary.iter().map(|t| t.len()).sum();
        info!(
            map = %session.map,
            room = %session.room,
            appearances = session.registry.len(),
            primary_frames = session.primary.len(),
            secondary_tracks = session.secondary.len(),
            secondary_frames,
            duration_secs = session.primary.last().map_or(0.0, |f| f.t),
            "Received trail session"
        );
    });

    channel.start()?;
    info!("Listening on {:?}", channel.endpoint().path());

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);
    let mut health = tokio::time::interval(Duration::from_secs(1));

    loop {
        tokio::select! {
            signal = &mut shutdown => {
                signal.context("Failed to install CTRL+C signal handler")?;
                info!("Received shutdown signal, cleaning up...");
                channel.shutdown().await?;
                let stats = channel.stats();
                info!(
                    "Received {} sessions over {} connections",
                    stats.received,
                    stats.reconnects + 1
                );
                return Ok(());
            }
            _ = health.tick() => {
                // The reader only stops by itself on a protocol fault
                if !channel.is_running() {
                    let stopped = channel.join().await;
                    if let Err(e) = &stopped {
                        error!("Reader stopped: {}", e);
                    }
                    return stopped.map_err(Into::into);
                }
            }
        }
    }
}
