//! Authenticated HTTP session against the live site.
//!
//! This module provides [`LiveHttp`], the reqwest client shared by the room
//! directory and the action API. It carries the browser identity the site
//! expects on every call: a desktop User-Agent, the room page as `Referer`
//! and the session cookie.

use reqwest::header::{HeaderMap, HeaderValue, COOKIE, REFERER};
use reqwest::{Client, Response, StatusCode};

use crate::config::ProxyConfig;
use crate::constants;
use crate::error::LiveError;

/// HTTP session for one room page and one cookie.
///
/// Cheap to clone; clones share the connection pool.
#[derive(Debug, Clone)]
pub struct LiveHttp {
    client: Client,
    api_base: String,
    page_url: String,
}

impl LiveHttp {
    /// Creates a session sending `cookie` with every request.
    ///
    /// # Arguments
    ///
    /// * `api_base` - Base URL of the live site (no trailing slash)
    /// * `page_url` - Room page URL, sent as `Referer`
    /// * `cookie` - Session cookie string (`name=value; ...`)
    /// * `proxy` - Optional HTTP proxy for all requests
    ///
    /// # Errors
    ///
    /// Returns [`LiveError::Request`] if a header value is not valid or the
    /// HTTP client cannot be created.
    pub fn new(
        api_base: &str,
        page_url: &str,
        cookie: &str,
        proxy: Option<&ProxyConfig>,
    ) -> Result<Self, LiveError> {
        let mut headers = HeaderMap::new();
        if !page_url.is_empty() {
            let referer = HeaderValue::from_str(page_url)
                .map_err(|e| LiveError::Request(format!("invalid page url header: {e}")))?;
            headers.insert(REFERER, referer);
        }
        if !cookie.is_empty() {
            let mut value = HeaderValue::from_str(cookie)
                .map_err(|e| LiveError::Request(format!("invalid cookie header: {e}")))?;
            value.set_sensitive(true);
            headers.insert(COOKIE, value);
        }

        let mut builder = Client::builder()
            .timeout(constants::HTTP_REQUEST_TIMEOUT)
            .user_agent(constants::USER_AGENT)
            .default_headers(headers);
        if let Some(proxy) = proxy {
            builder = builder.proxy(reqwest::Proxy::all(proxy.url())?);
        }
        let client = builder.build()?;

        Ok(Self::with_client(client, api_base, page_url))
    }

    /// Creates a session around a pre-configured HTTP client.
    ///
    /// Useful for testing or when custom client configuration is needed.
    pub fn with_client(client: Client, api_base: &str, page_url: &str) -> Self {
        Self {
            client,
            api_base: api_base.trim_end_matches('/').to_string(),
            page_url: page_url.to_string(),
        }
    }

    /// Returns the API base URL.
    pub fn api_base(&self) -> &str {
        &self.api_base
    }

    /// Returns the room page URL.
    pub fn page_url(&self) -> &str {
        &self.page_url
    }

    pub(crate) fn client(&self) -> &Client {
        &self.client
    }

    /// Absolute URL for `path` under the API base.
    pub(crate) fn url(&self, path: &str) -> String {
        format!("{}{}", self.api_base, path)
    }
}

/// Map HTTP status codes onto the error taxonomy.
///
/// 401 and 403 mean the cookie was rejected.
pub(crate) fn check_status(response: Response, what: &str) -> Result<Response, LiveError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(LiveError::SessionInvalid(
            format!("{what} rejected the session ({status})"),
        )),
        _ => Err(LiveError::Request(format!("{what} failed: {status}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_joins_without_double_slash() {
        let http = LiveHttp::new("https://live.example.com/", "", "", None).unwrap();
        assert_eq!(http.api_base(), "https://live.example.com");
        assert_eq!(
            http.url("/live_graphql"),
            "https://live.example.com/live_graphql"
        );
    }

    #[test]
    fn test_invalid_cookie_is_request_error() {
        let err = LiveHttp::new("https://live.example.com", "", "bad\ncookie", None).unwrap_err();
        assert!(matches!(err, LiveError::Request(_)));
    }

    #[test]
    fn test_proxy_is_accepted() {
        let proxy = ProxyConfig {
            host: "127.0.0.1".to_string(),
            port: 8080,
        };
        assert!(LiveHttp::new("https://live.example.com", "", "a=b", Some(&proxy)).is_ok());
    }
}
