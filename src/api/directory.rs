//! Room directory: from a room page URL to a socket endpoint.
//!
//! Resolution takes two requests. The room page embeds its initial state as
//! a JavaScript object literal (`window.__INITIAL_STATE__=...`), which holds
//! the current live stream id. The socket discovery endpoint then trades
//! that id for a room-entry token and the WebSocket URLs.

use std::sync::LazyLock;

use async_trait::async_trait;
use regex::Regex;
use reqwest::header::ACCEPT;

use super::client::{check_status, LiveHttp};
use super::types::WebSocketInfoResponse;
use crate::constants::{HTML_ACCEPT, JSON_ACCEPT, WEBSOCKET_INFO_PATH};
use crate::error::LiveError;

/// Embedded page state, up to the script's trailing IIFE.
static INITIAL_STATE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)__INITIAL_STATE__\s*=\s*(\{.*?\})\s*;\s*\(function\(\)")
        .expect("Invalid initial state regex")
});

/// Bare `undefined` values, which are valid JavaScript but not JSON.
static UNDEFINED_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"([:,\[])\s*undefined\b").expect("Invalid undefined regex")
});

/// Where to open the room socket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SocketEndpoint {
    /// Room-entry token for the handshake.
    pub token: String,
    /// WebSocket URL.
    pub url: String,
}

/// A resolved room, as held by one session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoomIdentity {
    /// Live stream id.
    pub room_id: String,
    /// WebSocket URL of the session.
    pub websocket_url: String,
}

/// Resolves rooms to socket endpoints.
#[async_trait]
pub trait RoomDirectory: Send + Sync {
    /// Current live stream id of the room at `page_url`.
    ///
    /// # Errors
    ///
    /// [`LiveError::NotLive`] when nobody is broadcasting,
    /// [`LiveError::SessionInvalid`] when the page was served without room
    /// state (cookie refused).
    async fn resolve_room_id(&self, page_url: &str) -> Result<String, LiveError>;

    /// Token and socket URL for `room_id`.
    ///
    /// # Errors
    ///
    /// [`LiveError::SessionInvalid`] when the endpoint refuses the cookie.
    async fn resolve_socket_endpoint(&self, room_id: &str) -> Result<SocketEndpoint, LiveError>;
}

/// Extract the live stream id from a room page.
///
/// # Errors
///
/// - [`LiveError::SessionInvalid`] if the page has no embedded state or the
///   live stream record is empty.
/// - [`LiveError::NotLive`] if the record has no `id`.
/// - [`LiveError::Request`] if the state is not valid JSON or the id is
///   empty.
pub fn parse_room_id(html: &str) -> Result<String, LiveError> {
    let state = INITIAL_STATE_RE
        .captures(html)
        .and_then(|c| c.get(1))
        .ok_or_else(|| {
            LiveError::SessionInvalid("room page has no initial state".to_string())
        })?
        .as_str();

    let state = UNDEFINED_RE.replace_all(state, "${1}null");
    let state: serde_json::Value = serde_json::from_str(&state)
        .map_err(|e| LiveError::Request(format!("room page state is not JSON: {e}")))?;

    let stream = state
        .get("liveroom")
        .and_then(|r| r.get("liveStream"))
        .and_then(serde_json::Value::as_object)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| LiveError::SessionInvalid("room page has no live stream record".to_string()))?;

    let id = match stream.get("id") {
        None | Some(serde_json::Value::Null) => return Err(LiveError::NotLive),
        Some(serde_json::Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    };
    if id.is_empty() {
        return Err(LiveError::Request("live stream id is empty".to_string()));
    }
    Ok(id)
}

/// [`RoomDirectory`] backed by the live site.
#[derive(Debug, Clone)]
pub struct HttpRoomDirectory {
    http: LiveHttp,
}

impl HttpRoomDirectory {
    /// Directory using `http` for all requests.
    pub fn new(http: LiveHttp) -> Self {
        Self { http }
    }
}

#[async_trait]
impl RoomDirectory for HttpRoomDirectory {
    async fn resolve_room_id(&self, page_url: &str) -> Result<String, LiveError> {
        let url = page_url.trim_end_matches('/');
        log::debug!("[Directory] Fetching room page {url}");

        let response = self
            .http
            .client()
            .get(url)
            .header(ACCEPT, HTML_ACCEPT)
            .send()
            .await?;
        let html = check_status(response, "room page")?.text().await?;

        let room_id = parse_room_id(&html)?;
        log::info!("[Directory] Room id {room_id}");
        Ok(room_id)
    }

    async fn resolve_socket_endpoint(&self, room_id: &str) -> Result<SocketEndpoint, LiveError> {
        let response = self
            .http
            .client()
            .get(self.http.url(WEBSOCKET_INFO_PATH))
            .query(&[("liveStreamId", room_id)])
            .header(ACCEPT, JSON_ACCEPT)
            .send()
            .await?;
        let info: WebSocketInfoResponse = check_status(response, "websocket info")?.json().await?;

        if info.data.result != 1 {
            return Err(LiveError::SessionInvalid(format!(
                "websocket info refused (result {})",
                info.data.result
            )));
        }
        let url = info
            .data
            .websocket_urls
            .into_iter()
            .next()
            .ok_or_else(|| LiveError::Request("websocket info has no URLs".to_string()))?;

        log::debug!("[Directory] Socket endpoint for {room_id}: {url}");
        Ok(SocketEndpoint {
            token: info.data.token,
            url,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page(state: &str) -> String {
        format!(
            "<html><script>window.__INITIAL_STATE__={state};(function(){{var s;(s=document.currentScript||document.scripts[document.scripts.length-1]).parentNode.removeChild(s);}}());</script></html>"
        )
    }

    #[test]
    fn test_parse_room_id_live() {
        let html = page(r#"{"liveroom":{"liveStream":{"id":"abc123","caption":"hi"}}}"#);
        assert_eq!(parse_room_id(&html).unwrap(), "abc123");
    }

    #[test]
    fn test_parse_room_id_tolerates_undefined() {
        let html = page(r#"{"liveroom":{"liveStream":{"id":"abc","cover":undefined,"tags":[undefined]}},"x":undefined}"#);
        assert_eq!(parse_room_id(&html).unwrap(), "abc");
    }

    #[test]
    fn test_parse_room_id_no_id_is_not_live() {
        let html = page(r#"{"liveroom":{"liveStream":{"caption":"offline"}}}"#);
        assert_eq!(parse_room_id(&html), Err(LiveError::NotLive));
    }

    #[test]
    fn test_parse_room_id_empty_stream_is_session_invalid() {
        let html = page(r#"{"liveroom":{"liveStream":{}}}"#);
        assert!(matches!(parse_room_id(&html), Err(LiveError::SessionInvalid(_))));
    }

    #[test]
    fn test_parse_room_id_missing_state_is_session_invalid() {
        assert!(matches!(
            parse_room_id("<html>captcha</html>"),
            Err(LiveError::SessionInvalid(_))
        ));
    }

    #[test]
    fn test_parse_room_id_empty_id_is_error() {
        let html = page(r#"{"liveroom":{"liveStream":{"id":""}}}"#);
        assert!(matches!(parse_room_id(&html), Err(LiveError::Request(_))));
    }
}
