//! LocalHosted relay server
//!
//! Publishes a public HTTP endpoint per connected developer and forwards
//! inbound requests across a WebSocket control channel to the developer's
//! local HTTP server. The relay never initiates connections to the
//! developer; everything rides the channel the forwarder agent opened.
//!
//! ```text
//!  public request ──▶ adapter ──▶ registry/correlator ──▶ channel ──▶ agent
//!  public response ◀── adapter ◀── waiter resolved ◀── response frame ◀──┘
//! ```

use std::sync::Arc;
use std::time::Instant;

pub mod adapter;
pub mod config;
pub mod registry;
pub mod routes;
pub mod session;
pub mod tunnel;

pub use config::RelayConfig;
pub use registry::Registry;

/// Shared state injected into every handler
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<Registry>,
    pub config: Arc<RelayConfig>,
    pub started_at: Instant,
}
