//! Common types and utilities for the LocalHosted tunnel relay
//!
//! This crate provides the control-channel protocol, error types, subdomain
//! utilities, and helpers shared by the relay server and the forwarder agent.

pub mod constants;
pub mod error;
pub mod protocol;
pub mod subdomain;
pub mod utils;

// Re-export commonly used types for convenience
pub use error::{Result, TunnelError};
pub use protocol::{Message, TunnelRequest, TunnelResponse};
pub use utils::{current_timestamp_secs, decode_body, encode_body, headers_to_map, map_to_headers};
