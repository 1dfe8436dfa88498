use thiserror::Error;

/// Error types for the LocalHosted tunnel system
#[derive(Error, Debug)]
pub enum TunnelError {
    #[error("Missing subdomain in request path")]
    SubdomainMissing,

    #[error("No active tunnel for subdomain: {0}")]
    TunnelNotFound(String),

    #[error("Tunnel channel is not open: {0}")]
    TunnelNotOpen(String),

    #[error("Tunnel disconnected: {0}")]
    TunnelDisconnected(String),

    #[error("Timed out waiting for tunnel response: {0}")]
    RequestTimeout(String),

    #[error("Failed to send frame on tunnel channel: {0}")]
    FrameSendFailed(String),

    #[error("Invalid message format: {0}")]
    InvalidMessage(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Base64 decode error: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("HTTP error: {0}")]
    Http(String),
}

/// Type alias for Results using TunnelError
pub type Result<T> = std::result::Result<T, TunnelError>;

impl TunnelError {
    /// HTTP status code this error surfaces as to a public caller
    pub fn public_status(&self) -> u16 {
        match self {
            TunnelError::SubdomainMissing => 400,
            TunnelError::RequestTimeout(_) => 504,
            _ => 502,
        }
    }
}
