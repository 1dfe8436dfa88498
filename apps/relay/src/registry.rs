//! Concurrent registry of active tunnels and the request/response correlator
//!
//! One mutex guards the subdomain map; register, remove, and the channel scan
//! serialize on it. Everything a public request does while parked happens
//! outside that lock.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::Mutex;
use tokio::time::timeout;
use tracing::{debug, info, warn};
use uuid::Uuid;

use localhosted_common::constants::{CLOSE_GOING_AWAY, CLOSE_NORMAL};
use localhosted_common::protocol::{Message, TunnelRequest, TunnelResponse};
use localhosted_common::{Result, TunnelError};

use crate::tunnel::{ChannelHandle, Tunnel};

/// Point-in-time view of one tunnel, as exposed by `/stats`
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TunnelStats {
    pub subdomain: String,
    pub local_port: u16,
    pub connected_at: i64,
    pub request_count: u64,
    pub pending: usize,
}

/// Registry of active tunnels, keyed by subdomain
#[derive(Debug, Default)]
pub struct Registry {
    tunnels: Mutex<HashMap<String, Arc<Tunnel>>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a tunnel for `subdomain`, evicting any prior holder first.
    ///
    /// The evicted tunnel's waiters fail with a disconnection error and its
    /// channel is closed with a normal-closure status before the replacement
    /// becomes visible to `get`.
    pub async fn register(
        &self,
        subdomain: &str,
        local_port: u16,
        channel: ChannelHandle,
    ) -> Arc<Tunnel> {
        let mut tunnels = self.tunnels.lock().await;
        if let Some(old) = tunnels.remove(subdomain) {
            info!(subdomain, "Evicting previous tunnel for re-registration");
            Self::teardown(&old, CLOSE_NORMAL).await;
        }

        let tunnel = Arc::new(Tunnel::new(subdomain.to_string(), local_port, channel));
        tunnels.insert(subdomain.to_string(), Arc::clone(&tunnel));
        info!(subdomain, tunnel_id = %tunnel.id(), local_port, "Tunnel registered");
        tunnel
    }

    pub async fn get(&self, subdomain: &str) -> Option<Arc<Tunnel>> {
        self.tunnels.lock().await.get(subdomain).cloned()
    }

    /// Remove `subdomain`: fail its parked waiters, close its channel with a
    /// normal closure, and delete the entry. No-op when absent.
    pub async fn remove(&self, subdomain: &str) {
        let mut tunnels = self.tunnels.lock().await;
        if let Some(tunnel) = tunnels.remove(subdomain) {
            Self::teardown(&tunnel, CLOSE_NORMAL).await;
            info!(subdomain, "Tunnel removed");
        }
    }

    /// Remove whichever tunnel owns the channel `channel_id`. Idempotent:
    /// called from the session teardown path, which may race an eviction.
    pub async fn remove_by_channel(&self, channel_id: Uuid) {
        let mut tunnels = self.tunnels.lock().await;
        let subdomain = tunnels
            .values()
            .find(|tunnel| tunnel.channel().id() == channel_id)
            .map(|tunnel| tunnel.subdomain().to_string());

        if let Some(subdomain) = subdomain {
            if let Some(tunnel) = tunnels.remove(&subdomain) {
                Self::teardown(&tunnel, CLOSE_NORMAL).await;
                info!(subdomain, "Tunnel removed after channel close");
            }
        }
    }

    /// Forward one public HTTP request over the tunnel for `subdomain` and
    /// wait for the correlated response frame, at most `deadline` long.
    ///
    /// The waiter is parked before the frame is transmitted, so a reply can
    /// never arrive ahead of its waiter.
    pub async fn forward(
        &self,
        subdomain: &str,
        request: TunnelRequest,
        deadline: Duration,
    ) -> Result<TunnelResponse> {
        let tunnel = self
            .get(subdomain)
            .await
            .ok_or_else(|| TunnelError::TunnelNotFound(subdomain.to_string()))?;

        if !tunnel.channel().is_open() {
            self.remove(subdomain).await;
            return Err(TunnelError::TunnelNotOpen(subdomain.to_string()));
        }

        let request_id = request.id;
        let rx = tunnel.insert_waiter(request_id).await?;

        if let Err(e) = tunnel.channel().send(Message::Request { data: request }).await {
            tunnel.remove_waiter(&request_id).await;
            warn!(subdomain, %request_id, error = %e, "Failed to transmit request frame");
            return Err(TunnelError::TunnelNotOpen(subdomain.to_string()));
        }
        tunnel.record_request();
        debug!(subdomain, %request_id, "Request frame dispatched");

        match timeout(deadline, rx).await {
            Ok(Ok(result)) => result,
            // The waiter was dropped without completion; the tunnel is gone.
            Ok(Err(_)) => Err(TunnelError::TunnelDisconnected(subdomain.to_string())),
            Err(_) => {
                tunnel.remove_waiter(&request_id).await;
                debug!(subdomain, %request_id, "Request deadline elapsed");
                Err(TunnelError::RequestTimeout(subdomain.to_string()))
            }
        }
    }

    /// Complete the waiter parked for `response.id` on the tunnel owning
    /// `channel_id`. Frames from a non-owning channel or with an unknown id
    /// are dropped without side effects.
    pub async fn handle_response(&self, channel_id: Uuid, response: TunnelResponse) {
        let tunnel = {
            let tunnels = self.tunnels.lock().await;
            tunnels
                .values()
                .find(|tunnel| tunnel.channel().id() == channel_id)
                .cloned()
        };

        let Some(tunnel) = tunnel else {
            debug!(%channel_id, response_id = %response.id, "Response frame from unknown channel dropped");
            return;
        };

        let response_id = response.id;
        if !tunnel.complete(response).await {
            debug!(
                subdomain = tunnel.subdomain(),
                %response_id,
                "Response frame with unknown id dropped"
            );
        }
    }

    /// Snapshot of every active tunnel, sorted by subdomain.
    ///
    /// The tunnel list is cloned out first so per-tunnel pending counts are
    /// read without holding the registry lock.
    pub async fn stats(&self) -> Vec<TunnelStats> {
        let snapshot: Vec<Arc<Tunnel>> = {
            let tunnels = self.tunnels.lock().await;
            tunnels.values().cloned().collect()
        };

        let mut stats = Vec::with_capacity(snapshot.len());
        for tunnel in snapshot {
            stats.push(TunnelStats {
                subdomain: tunnel.subdomain().to_string(),
                local_port: tunnel.local_port(),
                connected_at: tunnel.connected_at(),
                request_count: tunnel.request_count(),
                pending: tunnel.pending_count().await,
            });
        }
        stats.sort_by(|a, b| a.subdomain.cmp(&b.subdomain));
        stats
    }

    pub async fn len(&self) -> usize {
        self.tunnels.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.tunnels.lock().await.is_empty()
    }

    /// Close every tunnel with a going-away status. In-flight forwards fail
    /// with a disconnection error. Used on graceful shutdown.
    pub async fn shutdown(&self) {
        let mut tunnels = self.tunnels.lock().await;
        for (subdomain, tunnel) in tunnels.drain() {
            Self::teardown(&tunnel, CLOSE_GOING_AWAY).await;
            debug!(subdomain, "Tunnel closed for shutdown");
        }
    }

    /// Fail all waiters, then close the channel if it is still open
    async fn teardown(tunnel: &Tunnel, code: u16) {
        tunnel.shut().await;
        if tunnel.channel().is_open() {
            tunnel.channel().close(code).await;
        }
    }
}
