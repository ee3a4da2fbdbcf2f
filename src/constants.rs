//! Application-wide constants for kslive.
//!
//! This module centralizes all magic numbers and protocol constants
//! to improve maintainability and discoverability. Constants are grouped
//! by domain with documentation explaining their purpose.
//!
//! # Categories
//!
//! - **Timeouts**: Network and operation timeouts
//! - **Room channel**: Heartbeat cadence and queue sizes
//! - **Endpoints**: Paths under the live site's API base
//! - **Page session**: Alphabet and length of generated page ids

use std::time::Duration;

// ============================================================================
// Timeouts
// ============================================================================

/// HTTP client request timeout for directory and action API calls.
///
/// Room directory lookups and mutations are short request/response
/// exchanges; 10 seconds prevents indefinite hangs on network issues.
pub const HTTP_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Default bound on opening the room socket (TCP, proxy tunnel, TLS and
/// WebSocket upgrade together).
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// How long teardown waits for the writer task to flush a close frame
/// before the socket is dropped outright.
pub const WRITER_CLOSE_TIMEOUT: Duration = Duration::from_secs(2);

/// How long teardown waits for the heartbeat task to exit before aborting it.
pub const HEARTBEAT_STOP_TIMEOUT: Duration = Duration::from_secs(1);

// ============================================================================
// Room channel
// ============================================================================

/// Keepalive cadence expected by the room server.
///
/// The server drops sessions that stay silent for too long; the web
/// client sends one heartbeat every 20 seconds regardless of traffic.
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(20);

/// Capacity of the outbound frame queue feeding the socket writer.
pub const OUTBOUND_QUEUE_CAPACITY: usize = 64;

/// Capacity of the connection-state broadcast channel.
pub const STATE_CHANNEL_CAPACITY: usize = 32;

// ============================================================================
// Endpoints
// ============================================================================

/// Default base URL of the live site.
pub const DEFAULT_API_BASE: &str = "https://live.kuaishou.com";

/// Room socket discovery endpoint (token + WebSocket URLs for a room id).
pub const WEBSOCKET_INFO_PATH: &str = "/live_api/liveroom/websocketinfo";

/// Generic GraphQL query/mutation endpoint.
pub const GRAPHQL_PATH: &str = "/live_graphql";

/// Gift catalog endpoint.
pub const ALL_GIFTS_PATH: &str = "/live_api/emoji/allgifts";

/// Desktop browser User-Agent sent with every request.
///
/// The live site serves a reduced page without the embedded room state to
/// unknown agents.
pub const USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/107.0.0.0 Safari/537.36";

/// Accept header used when fetching the room page.
pub const HTML_ACCEPT: &str = "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,image/apng,*/*;q=0.8,application/signed-exchange;v=b3;q=0.9";

/// Accept header used for JSON endpoints.
pub const JSON_ACCEPT: &str = "application/json, text/plain, */*";

// ============================================================================
// Page session
// ============================================================================

/// Alphabet the web client draws page session ids from.
pub const PAGE_ID_CHARSET: &[u8; 64] =
    b"-_zyxwvutsrqponmlkjihgfedcba9876543210ZYXWVUTSRQPONMLKJIHGFEDCBA";

/// Number of random characters before the `_<millis>` suffix.
pub const PAGE_ID_RANDOM_LEN: usize = 16;

/// Current wall-clock time in epoch milliseconds.
pub fn now_millis() -> u64 {
    chrono::Utc::now().timestamp_millis().max(0) as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_charset_has_64_unique_symbols() {
        let mut seen = std::collections::HashSet::new();
        for b in PAGE_ID_CHARSET {
            assert!(seen.insert(*b), "duplicate symbol {}", *b as char);
        }
        assert_eq!(seen.len(), 64);
    }

    #[test]
    fn test_now_millis_is_recent() {
        // 2020-01-01T00:00:00Z
        assert!(now_millis() > 1_577_836_800_000);
    }
}
