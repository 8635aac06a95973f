//! Per-connection dispatch loop.
//!
//! One task per upgraded socket: register with the registry, spawn the
//! outbound writer, then read frames until the transport errors, the
//! payload is malformed, or the hub closes the session. Every exit goes
//! through the same cleanup tail (unregister + close), so a failing
//! client disappears from future broadcasts and affects nobody else.

use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::extract::ws::{Message as WsMessage, WebSocket};
use beacon_core::Message;
use futures::{SinkExt, StreamExt};
use metrics::{counter, gauge, histogram};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::config::ServerConfig;

use super::broadcast::Broadcaster;
use super::registry::SessionRegistry;
use super::session::ClientSession;

/// Why the read loop ended. Logged once at cleanup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LoopExit {
    /// Peer sent a close frame or the stream ended.
    PeerClosed,
    /// Read or write on the transport failed.
    TransportError,
    /// Payload failed structural decoding (strict policy: the session ends).
    MalformedPayload,
    /// The hub closed the session (eviction).
    HubClosed,
    /// Server-wide shutdown was signalled.
    ShuttingDown,
}

/// Run a presence session for one upgraded socket.
///
/// Lifecycle is `Connecting → Active → Closed`: registration activates
/// the session and fixes its identity, the loop dispatches inbound
/// messages by kind, and the single cleanup tail always unregisters.
/// `shutdown` is the server-wide signal; cancelling it ends the loop the
/// same way an eviction does.
#[instrument(skip_all, fields(client_id))]
pub async fn run_session(
    ws: WebSocket,
    registry: Arc<SessionRegistry>,
    broadcaster: Arc<Broadcaster>,
    config: Arc<ServerConfig>,
    shutdown: CancellationToken,
) {
    let (mut ws_tx, mut ws_rx) = ws.split();
    let (send_tx, mut send_rx) = mpsc::channel::<Arc<String>>(config.send_queue_capacity);

    let session = registry.register(send_tx).await;
    let _ = tracing::Span::current().record("client_id", session.id.as_u32());

    let started = Instant::now();
    info!("client connected");
    counter!("ws_connections_total").increment(1);
    gauge!("ws_connections_active").increment(1.0);

    // Outbound writer: drains the session queue into the socket and
    // interleaves Ping frames. A write failure or an unresponsive client
    // closes the session, which in turn unblocks the read loop below.
    let writer_session = session.clone();
    let ping_interval = Duration::from_secs(config.heartbeat_interval_secs.max(1));
    let max_missed_pongs =
        (config.heartbeat_timeout_secs / config.heartbeat_interval_secs.max(1)).max(1);
    let writer = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(ping_interval);
        // The first tick fires immediately; skip it.
        let _ = ticker.tick().await;
        let mut missed_pongs: u64 = 0;

        loop {
            tokio::select! {
                queued = send_rx.recv() => {
                    let Some(payload) = queued else { break };
                    if ws_tx.send(WsMessage::Text(payload.as_ref().clone().into())).await.is_err() {
                        break;
                    }
                }
                _ = ticker.tick() => {
                    if writer_session.check_alive() {
                        missed_pongs = 0;
                    } else {
                        missed_pongs += 1;
                        if missed_pongs >= max_missed_pongs {
                            warn!(client_id = %writer_session.id, "client unresponsive, disconnecting");
                            break;
                        }
                    }
                    if ws_tx.send(WsMessage::Ping(Vec::new().into())).await.is_err() {
                        break;
                    }
                }
            }
        }
        writer_session.close();
    });

    let exit = loop {
        let frame = tokio::select! {
            () = session.closed() => break LoopExit::HubClosed,
            () = shutdown.cancelled() => break LoopExit::ShuttingDown,
            frame = ws_rx.next() => frame,
        };

        let text = match frame {
            None => break LoopExit::PeerClosed,
            Some(Err(e)) => {
                debug!(error = %e, "transport read failed");
                break LoopExit::TransportError;
            }
            Some(Ok(WsMessage::Text(t))) => t.to_string(),
            Some(Ok(WsMessage::Binary(data))) => match std::str::from_utf8(&data) {
                Ok(s) => s.to_owned(),
                Err(_) => {
                    warn!(len = data.len(), "non-UTF8 binary frame");
                    break LoopExit::MalformedPayload;
                }
            },
            Some(Ok(WsMessage::Close(_))) => {
                session.begin_close();
                break LoopExit::PeerClosed;
            }
            Some(Ok(WsMessage::Ping(_) | WsMessage::Pong(_))) => {
                session.mark_alive();
                continue;
            }
        };

        // Explicit decode step with its own match; a structural failure
        // ends this session and only this session.
        let message = match Message::decode(&text) {
            Ok(message) => message,
            Err(e) => {
                warn!(error = %e, "malformed payload, closing session");
                break LoopExit::MalformedPayload;
            }
        };

        dispatch(&session, &broadcaster, message).await;
    };

    info!(?exit, "client disconnected");
    counter!("ws_disconnections_total").increment(1);
    gauge!("ws_connections_active").decrement(1.0);
    histogram!("ws_connection_duration_seconds").record(started.elapsed().as_secs_f64());
    registry.unregister(session.id).await;
    writer.abort();
}

/// Route one decoded message by kind.
async fn dispatch(session: &Arc<ClientSession>, broadcaster: &Broadcaster, message: Message) {
    match message {
        Message::Greeting => {
            // Identity was fixed at registration; greeting just gets the
            // assigned id echoed back, to this client only.
            debug!("greeting, sending welcome");
            let welcome = Message::Welcome {
                client_id: session.id,
            };
            if let Err(e) = session.send(&welcome) {
                debug!(error = %e, "welcome not delivered");
            }
        }
        Message::PositionUpdate { x, y, .. } => {
            // Stamp the registered identity; the payload's own clientId
            // is never trusted for attribution.
            let stamped = Message::PositionUpdate {
                x,
                y,
                client_id: Some(session.id),
            };
            broadcaster.broadcast(session.id, &stamped).await;
        }
        Message::Acknowledge { client_id } => {
            debug!(acked_as = %client_id, "ack received");
        }
        Message::Welcome { .. } => {
            debug!("ignoring server-only message from client");
        }
        Message::Unknown { tag } => {
            info!(tag, "unknown message type, ignoring");
        }
    }
}
