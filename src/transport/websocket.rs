//! WebSocket signaling client
//!
//! Connects to the signaling server and pumps frames between the socket and
//! the [`SignalingOrchestrator`]. Outbound frames are written by a dedicated
//! task so the polling loop never waits on the network.

use crate::webrtc::{PeerConnectionRegistry, RtcError, SignalingOrchestrator};
use futures::{SinkExt, StreamExt};
use log::{debug, error, info, warn};
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, oneshot};
use tokio::time::{self, MissedTickBehavior};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::protocol::Message;

/// Why the read loop stopped
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Shutdown {
    RemoteClosed,
    Error(String),
    Interrupted,
}

/// Run one signaling session until the socket closes or Ctrl-C.
///
/// `outbound` is the receiving half of the orchestrator's outbox. On exit the
/// transport is closed first, then the orchestrator tears its session down.
pub async fn run_signaling_client(
    url: &str,
    registry: &mut PeerConnectionRegistry,
    orchestrator: &mut SignalingOrchestrator,
    mut outbound: mpsc::UnboundedReceiver<String>,
    poll_interval: Duration,
) -> Result<Shutdown, RtcError> {
    info!("Connecting to signaling server {}", url);
    let (ws_stream, _) = connect_async(url)
        .await
        .map_err(|e| RtcError::Transport(format!("Failed to connect to {}: {}", url, e)))?;

    let (mut write, mut read) = ws_stream.split();
    let (close_tx, mut close_rx) = oneshot::channel::<()>();

    let writer_handle = tokio::spawn(async move {
        loop {
            tokio::select! {
                message = outbound.recv() => {
                    let Some(text) = message else { break };
                    debug!("Sending message: {}", text);
                    if let Err(e) = write.send(Message::Text(text)).await {
                        error!("Failed to send signaling message: {}", e);
                        break;
                    }
                }
                _ = &mut close_rx => {
                    // Flush what the orchestrator queued before shutdown.
                    while let Ok(text) = outbound.try_recv() {
                        if write.send(Message::Text(text)).await.is_err() {
                            break;
                        }
                    }
                    break;
                }
            }
        }
        if let Err(e) = write.close().await {
            debug!("Closing signaling socket: {}", e);
        }
    });

    orchestrator.on_open(registry);

    let mut ticker = time::interval(poll_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    let shutdown = loop {
        tokio::select! {
            frame = read.next() => match frame {
                Some(Ok(Message::Text(text))) => orchestrator.on_message(registry, &text),
                Some(Ok(Message::Binary(data))) => match String::from_utf8(data) {
                    Ok(text) => orchestrator.on_message(registry, &text),
                    Err(e) => warn!("Dropping non UTF-8 binary frame: {}", e),
                },
                Some(Ok(Message::Close(frame))) => {
                    info!("Signaling server closed the connection: {:?}", frame);
                    break Shutdown::RemoteClosed;
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    error!("WebSocket error: {}", e);
                    break Shutdown::Error(e.to_string());
                }
                None => break Shutdown::RemoteClosed,
            },
            _ = ticker.tick() => orchestrator.on_tick(registry, Instant::now()),
            _ = &mut ctrl_c => {
                info!("Interrupted, shutting down");
                break Shutdown::Interrupted;
            }
        }
    };

    let _ = close_tx.send(());
    if let Err(e) = writer_handle.await {
        error!("Signaling writer task failed: {}", e);
    }
    orchestrator.on_close();
    orchestrator.teardown(registry);

    Ok(shutdown)
}
