use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{TunnelRequest, TunnelResponse};

/// All control-channel frames are wrapped in this typed envelope.
///
/// One frame is one UTF-8 JSON text message on the WebSocket, dispatched by
/// its `type` field.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum Message {
    /// Heartbeat, relay to agent
    Ping,
    /// Heartbeat reply, agent to relay
    Pong,

    /// Agent claims a tunnel slot, optionally naming the subdomain
    Register {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        subdomain: Option<String>,
    },

    /// Relay confirms registration and announces the public URL
    TunnelReady {
        url: String,
        subdomain: String,
        id: Uuid,
    },

    /// Data plane: a public HTTP request forwarded to the agent
    Request { data: TunnelRequest },

    /// Data plane: the agent's response, correlated by `data.id`
    Response { data: TunnelResponse },

    /// Malformed-frame notice, relay to agent
    Error { message: String },
}
