/// Default deadline waiting for a response frame from the agent (30 seconds)
pub const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Heartbeat interval on the control channel (30 seconds)
pub const HEARTBEAT_INTERVAL_SECS: u64 = 30;

/// Maximum inbound frame size on the control channel (50 MiB)
pub const MAX_FRAME_SIZE_BYTES: usize = 50 * 1024 * 1024;

/// Local port assumed when the agent does not report one
pub const DEFAULT_LOCAL_PORT: u16 = 3000;

/// Maximum subdomain label length in bytes (DNS label limit)
pub const MAX_LABEL_LEN: usize = 63;

/// WebSocket close status for a normal closure (eviction, explicit removal)
pub const CLOSE_NORMAL: u16 = 1000;

/// WebSocket close status sent to every channel on relay shutdown
pub const CLOSE_GOING_AWAY: u16 = 1001;

/// Minimum delay for exponential backoff reconnection (1 second)
pub const RECONNECT_MIN_DELAY_MS: u64 = 1000;

/// Maximum delay for exponential backoff reconnection (60 seconds)
pub const RECONNECT_MAX_DELAY_MS: u64 = 60000;

/// Multiplier for exponential backoff reconnection
pub const RECONNECT_MULTIPLIER: f64 = 2.0;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constants_values() {
        // Compile-time checks documenting the constraints between constants
        const _: () = assert!(MAX_LABEL_LEN == 63, "DNS label limit");
        const _: () = assert!(RECONNECT_MIN_DELAY_MS < RECONNECT_MAX_DELAY_MS);
        const _: () = assert!(RECONNECT_MULTIPLIER > 1.0);
        const _: () = assert!(CLOSE_NORMAL == 1000 && CLOSE_GOING_AWAY == 1001);

        assert_eq!(MAX_FRAME_SIZE_BYTES, 50 * 1024 * 1024);
        assert_eq!(REQUEST_TIMEOUT_SECS, 30);
        assert_eq!(HEARTBEAT_INTERVAL_SECS, 30);
    }
}
