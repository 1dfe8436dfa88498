use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// The response from the local service, sent back through the tunnel
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TunnelResponse {
    /// Must match the `id` of the corresponding TunnelRequest
    pub id: Uuid,

    /// HTTP status code in [100, 599]
    pub status_code: u16,

    /// Flattened response headers
    #[serde(default)]
    pub headers: HashMap<String, String>,

    /// Base64-encoded response body, omitted when empty
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
}

impl TunnelResponse {
    /// Create a response for `id` with no headers or body
    pub fn new(id: Uuid, status_code: u16) -> Self {
        Self {
            id,
            status_code,
            headers: HashMap::new(),
            body: None,
        }
    }

    pub fn has_body(&self) -> bool {
        self.body.is_some()
    }

    /// Check if the response is successful (2xx status code)
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status_code)
    }
}
