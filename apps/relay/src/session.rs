//! Tunnel control-channel session handler
//!
//! One session per accepted WebSocket on `/tunnel`. A dedicated writer task
//! drains the outbound queue so every channel write goes through one task; a
//! heartbeat task queues a ping frame every 30 seconds; the read loop
//! dispatches inbound frames. Channel close or error tears the session down
//! and removes its tunnel from the registry.

use std::time::Duration;

use axum::extract::ws::{CloseFrame, Message as WsMessage, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::http::HeaderMap;
use axum::response::Response;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use localhosted_common::constants::{
    DEFAULT_LOCAL_PORT, HEARTBEAT_INTERVAL_SECS, MAX_FRAME_SIZE_BYTES,
};
use localhosted_common::protocol::Message;
use localhosted_common::subdomain;

use crate::AppState;
use crate::tunnel::{ChannelHandle, Outbound};

/// `GET /tunnel`: upgrade to the control channel.
///
/// The optional `X-Subdomain` and `X-Local-Port` headers are read once here;
/// they only matter to a later `register` frame.
pub async fn tunnel_upgrade(
    State(state): State<AppState>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> Response {
    let subdomain_hint = header_value(&headers, "x-subdomain");
    let local_port = header_value(&headers, "x-local-port")
        .and_then(|value| value.parse().ok())
        .unwrap_or(DEFAULT_LOCAL_PORT);

    ws.max_message_size(MAX_FRAME_SIZE_BYTES)
        .on_upgrade(move |socket| handle_session(state, socket, subdomain_hint, local_port))
}

fn header_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

async fn handle_session(
    state: AppState,
    socket: WebSocket,
    subdomain_hint: Option<String>,
    local_port: u16,
) {
    let (sink, stream) = socket.split();
    let (tx, rx) = mpsc::channel::<Outbound>(64);
    let channel = ChannelHandle::new(tx.clone());
    let channel_id = channel.id();
    info!(%channel_id, "Tunnel channel connected");

    let writer = tokio::spawn(write_task(sink, rx));
    let heartbeat = tokio::spawn(heartbeat_task(tx.clone()));

    let registered = read_loop(&state, &channel, stream, subdomain_hint, local_port).await;

    heartbeat.abort();
    state.registry.remove_by_channel(channel_id).await;
    drop(channel);
    drop(tx);
    let _ = writer.await;

    info!(
        %channel_id,
        subdomain = registered.as_deref().unwrap_or("-"),
        "Tunnel channel closed"
    );
}

/// The only task that touches the socket sink
async fn write_task(mut sink: SplitSink<WebSocket, WsMessage>, mut rx: mpsc::Receiver<Outbound>) {
    while let Some(outbound) = rx.recv().await {
        let result = match outbound {
            Outbound::Frame(frame) => match serde_json::to_string(&frame) {
                Ok(json) => sink.send(WsMessage::Text(json.into())).await,
                Err(e) => {
                    error!(error = %e, "Failed to serialize outbound frame");
                    continue;
                }
            },
            Outbound::Pong(payload) => sink.send(WsMessage::Pong(payload.into())).await,
            Outbound::Close(code) => {
                let _ = sink
                    .send(WsMessage::Close(Some(CloseFrame {
                        code,
                        reason: "".into(),
                    })))
                    .await;
                break;
            }
        };

        if let Err(e) = result {
            debug!(error = %e, "Channel write failed, stopping writer");
            break;
        }
    }
}

/// Queues a ping frame every heartbeat interval while the channel is open
async fn heartbeat_task(tx: mpsc::Sender<Outbound>) {
    let mut ticker = tokio::time::interval(Duration::from_secs(HEARTBEAT_INTERVAL_SECS));
    // The first tick completes immediately
    ticker.tick().await;
    loop {
        ticker.tick().await;
        if tx.send(Outbound::Frame(Message::Ping)).await.is_err() {
            break;
        }
    }
}

/// Returns the subdomain this session registered, if any
async fn read_loop(
    state: &AppState,
    channel: &ChannelHandle,
    mut stream: SplitStream<WebSocket>,
    subdomain_hint: Option<String>,
    local_port: u16,
) -> Option<String> {
    let mut registered: Option<String> = None;

    while let Some(message) = stream.next().await {
        match message {
            Ok(WsMessage::Text(text)) => {
                handle_frame(
                    state,
                    channel,
                    &text,
                    subdomain_hint.as_deref(),
                    local_port,
                    &mut registered,
                )
                .await;
            }
            Ok(WsMessage::Binary(_)) => {
                warn!(channel_id = %channel.id(), "Ignoring unexpected binary frame");
            }
            Ok(WsMessage::Ping(payload)) => {
                channel.pong(payload.to_vec()).await;
            }
            Ok(WsMessage::Pong(_)) => {
                debug!(channel_id = %channel.id(), "Transport pong received");
            }
            Ok(WsMessage::Close(_)) => {
                info!(channel_id = %channel.id(), "Client closed channel");
                break;
            }
            Err(e) => {
                warn!(channel_id = %channel.id(), error = %e, "Channel read error");
                break;
            }
        }
    }

    registered
}

/// Dispatch one inbound text frame by its `type`
pub(crate) async fn handle_frame(
    state: &AppState,
    channel: &ChannelHandle,
    text: &str,
    subdomain_hint: Option<&str>,
    local_port: u16,
    registered: &mut Option<String>,
) {
    let frame: Message = match serde_json::from_str(text) {
        Ok(frame) => frame,
        Err(e) => {
            warn!(channel_id = %channel.id(), error = %e, "Malformed control frame");
            let notice = Message::Error {
                message: format!("Invalid message format: {}", e),
            };
            if let Err(e) = channel.send(notice).await {
                debug!(channel_id = %channel.id(), error = %e, "Failed to send error frame");
            }
            return;
        }
    };

    match frame {
        Message::Register { subdomain } => {
            let label = resolve_label(subdomain.as_deref(), subdomain_hint);
            let tunnel = state
                .registry
                .register(&label, local_port, channel.clone())
                .await;

            let ready = Message::TunnelReady {
                url: state.config.public_url(&label),
                subdomain: label.clone(),
                id: tunnel.id(),
            };
            if let Err(e) = channel.send(ready).await {
                warn!(subdomain = %label, error = %e, "Failed to send tunnel-ready frame");
            }
            *registered = Some(label);
        }

        Message::Response { data } => {
            state.registry.handle_response(channel.id(), data).await;
        }

        Message::Pong => {
            debug!(channel_id = %channel.id(), "Heartbeat pong received");
        }

        other => {
            warn!(channel_id = %channel.id(), frame = ?other, "Ignoring unexpected frame type");
        }
    }
}

/// Label precedence: the register frame's value, then the upgrade-header
/// hint, then a generated name. Blank values fall through; the winner is
/// sanitized, and a value that sanitizes away is replaced by a generated one.
fn resolve_label(message_subdomain: Option<&str>, header_hint: Option<&str>) -> String {
    let raw = message_subdomain
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .or_else(|| header_hint.map(str::trim).filter(|value| !value.is_empty()))
        .map(str::to_string)
        .unwrap_or_else(subdomain::generate);

    let label = subdomain::sanitize(&raw);
    if label.is_empty() {
        subdomain::generate()
    } else {
        label
    }
}
