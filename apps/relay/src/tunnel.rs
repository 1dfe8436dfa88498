//! Per-tunnel state: identity, control channel handle, pending-request table
//!
//! A `Tunnel` owns the table of requests parked waiting for a response frame.
//! Waiters are oneshot sinks; the deadline timer lives with the caller in
//! `Registry::forward`. Once a tunnel is shut no new waiter can be parked,
//! which is what makes registry removal atomic with respect to in-flight
//! forwards.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::{mpsc, oneshot};
use uuid::Uuid;

use localhosted_common::protocol::{Message, TunnelResponse};
use localhosted_common::utils::current_timestamp_secs;
use localhosted_common::{Result, TunnelError};

/// Outbound traffic for a session's writer task
#[derive(Debug)]
pub enum Outbound {
    /// A protocol frame, serialized to one JSON text message
    Frame(Message),
    /// Reply to a transport-level ping
    Pong(Vec<u8>),
    /// Close the socket with the given status code; the writer stops after
    Close(u16),
}

/// Write handle to one control channel.
///
/// The session's writer task owns the receiving end and is the only task
/// touching the socket sink, so all channel writes are serialized. The handle
/// id identifies the connection: response frames only complete waiters of the
/// tunnel whose handle carries the same id.
#[derive(Debug, Clone)]
pub struct ChannelHandle {
    id: Uuid,
    tx: mpsc::Sender<Outbound>,
}

impl ChannelHandle {
    pub fn new(tx: mpsc::Sender<Outbound>) -> Self {
        Self {
            id: Uuid::new_v4(),
            tx,
        }
    }

    /// Identity of the underlying connection
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Whether the writer task is still draining this channel
    pub fn is_open(&self) -> bool {
        !self.tx.is_closed()
    }

    /// Queue a frame for the writer task
    pub async fn send(&self, frame: Message) -> Result<()> {
        self.tx
            .send(Outbound::Frame(frame))
            .await
            .map_err(|_| TunnelError::FrameSendFailed("channel writer is gone".to_string()))
    }

    /// Queue a transport-level pong
    pub async fn pong(&self, payload: Vec<u8>) {
        let _ = self.tx.send(Outbound::Pong(payload)).await;
    }

    /// Queue a close frame; the writer shuts down after sending it
    pub async fn close(&self, code: u16) {
        let _ = self.tx.send(Outbound::Close(code)).await;
    }
}

type Waiter = oneshot::Sender<Result<TunnelResponse>>;

/// One registered tunnel: identity, channel, statistics, and parked waiters
#[derive(Debug)]
pub struct Tunnel {
    id: Uuid,
    subdomain: String,
    local_port: u16,
    channel: ChannelHandle,
    connected_at: i64,
    request_count: AtomicU64,
    state: tokio::sync::Mutex<PendingState>,
}

#[derive(Debug)]
struct PendingState {
    open: bool,
    waiters: HashMap<Uuid, Waiter>,
}

impl Tunnel {
    pub fn new(subdomain: String, local_port: u16, channel: ChannelHandle) -> Self {
        Self {
            id: Uuid::new_v4(),
            subdomain,
            local_port,
            channel,
            connected_at: current_timestamp_secs(),
            request_count: AtomicU64::new(0),
            state: tokio::sync::Mutex::new(PendingState {
                open: true,
                waiters: HashMap::new(),
            }),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn subdomain(&self) -> &str {
        &self.subdomain
    }

    pub fn local_port(&self) -> u16 {
        self.local_port
    }

    pub fn channel(&self) -> &ChannelHandle {
        &self.channel
    }

    /// Registration instant, Unix epoch seconds
    pub fn connected_at(&self) -> i64 {
        self.connected_at
    }

    /// Requests dispatched over this tunnel so far
    pub fn request_count(&self) -> u64 {
        self.request_count.load(Ordering::Relaxed)
    }

    pub(crate) fn record_request(&self) {
        self.request_count.fetch_add(1, Ordering::Relaxed);
    }

    pub async fn pending_count(&self) -> usize {
        self.state.lock().await.waiters.len()
    }

    /// Park a waiter for `id`. Fails once the tunnel has been shut, so a
    /// caller can never park on a tunnel the registry already removed.
    pub(crate) async fn insert_waiter(
        &self,
        id: Uuid,
    ) -> Result<oneshot::Receiver<Result<TunnelResponse>>> {
        let mut state = self.state.lock().await;
        if !state.open {
            return Err(TunnelError::TunnelNotOpen(self.subdomain.clone()));
        }
        let (tx, rx) = oneshot::channel();
        state.waiters.insert(id, tx);
        Ok(rx)
    }

    /// Drop the waiter for `id` if it is still parked (send failure, timeout)
    pub(crate) async fn remove_waiter(&self, id: &Uuid) {
        self.state.lock().await.waiters.remove(id);
    }

    /// Complete the waiter parked for `response.id`. Returns false when no
    /// waiter holds that id (late or unknown response).
    pub(crate) async fn complete(&self, response: TunnelResponse) -> bool {
        let waiter = self.state.lock().await.waiters.remove(&response.id);
        match waiter {
            Some(tx) => tx.send(Ok(response)).is_ok(),
            None => false,
        }
    }

    /// Mark the tunnel closed and fail every parked waiter exactly once with
    /// a disconnection error. After this returns no new waiter can be parked.
    pub(crate) async fn shut(&self) {
        let waiters: Vec<Waiter> = {
            let mut state = self.state.lock().await;
            state.open = false;
            state.waiters.drain().map(|(_, waiter)| waiter).collect()
        };
        for waiter in waiters {
            let _ = waiter.send(Err(TunnelError::TunnelDisconnected(self.subdomain.clone())));
        }
    }
}
