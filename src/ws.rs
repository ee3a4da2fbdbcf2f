//! Room socket transport.
//!
//! [`connect`] dials the socket URL, directly or through an HTTP `CONNECT`
//! proxy, then runs TLS and the WebSocket upgrade over that stream. The
//! result is split in two:
//!
//! - [`SocketWriter`], owned by the outbound writer task,
//! - [`SocketReader`], owned by the session read loop, which yields
//!   [`SocketFrame`]s already sorted into what the room protocol cares about.

use anyhow::{anyhow, bail, Context, Result};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::{header, HeaderValue};
use tokio_tungstenite::tungstenite::{Error, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use crate::config::ProxyConfig;

type RoomStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Largest proxy CONNECT response header we are willing to buffer.
const MAX_PROXY_RESPONSE: usize = 8 * 1024;

/// Close code reported when the peer closed without one.
const NO_STATUS_CODE: u16 = 1005;

/// One inbound socket message, as the room session sees it.
#[derive(Debug, PartialEq, Eq)]
pub enum SocketFrame {
    /// A protocol envelope.
    Binary(Vec<u8>),
    /// Keepalive ping from the server; answer with a pong.
    Ping(Vec<u8>),
    /// The server closed the socket.
    Close {
        /// Close code (1005 when none was sent).
        code: u16,
        /// Close reason, possibly empty.
        reason: String,
    },
    /// Text or pong; unused by the room protocol.
    Ignored {
        /// Message kind, for logging.
        kind: &'static str,
        /// Payload size in bytes.
        len: usize,
    },
}

impl SocketFrame {
    /// Sort a tungstenite message. Raw frames are never surfaced.
    fn from_message(message: Message) -> Option<Self> {
        let frame = match message {
            Message::Binary(data) => Self::Binary(data.to_vec()),
            Message::Ping(data) => Self::Ping(data.to_vec()),
            Message::Close(frame) => match frame {
                Some(frame) => Self::Close {
                    code: frame.code.into(),
                    reason: frame.reason.to_string(),
                },
                None => Self::Close {
                    code: NO_STATUS_CODE,
                    reason: String::new(),
                },
            },
            Message::Text(text) => Self::Ignored {
                kind: "text",
                len: text.len(),
            },
            Message::Pong(data) => Self::Ignored {
                kind: "pong",
                len: data.len(),
            },
            Message::Frame(_) => return None,
        };
        Some(frame)
    }
}

/// Write half of the room socket.
#[derive(Debug)]
pub struct SocketWriter {
    sink: SplitSink<RoomStream, Message>,
}

impl SocketWriter {
    async fn write(&mut self, message: Message, what: &str) -> Result<()> {
        self.sink
            .send(message)
            .await
            .with_context(|| format!("socket {what} write failed"))
    }

    /// Write one encoded envelope.
    pub async fn binary(&mut self, data: Vec<u8>) -> Result<()> {
        self.write(Message::Binary(data), "binary").await
    }

    /// Answer a ping.
    pub async fn pong(&mut self, data: Vec<u8>) -> Result<()> {
        self.write(Message::Pong(data), "pong").await
    }

    /// Send a close frame (when the socket is still open) and close the
    /// sink. A socket the server already closed is not an error.
    pub async fn shutdown(&mut self) -> Result<()> {
        if let Err(e) = self.sink.send(Message::Close(None)).await {
            log::debug!("[Room] Close frame not sent: {e}");
        }
        match self.sink.close().await {
            Ok(()) | Err(Error::ConnectionClosed | Error::AlreadyClosed) => Ok(()),
            Err(e) => Err(anyhow!("socket close failed: {e}")),
        }
    }
}

/// Read half of the room socket.
#[derive(Debug)]
pub struct SocketReader {
    stream: SplitStream<RoomStream>,
}

impl SocketReader {
    /// Next frame, or `None` once the stream has ended.
    pub async fn recv(&mut self) -> Option<Result<SocketFrame>> {
        while let Some(next) = self.stream.next().await {
            match next {
                Ok(message) => {
                    if let Some(frame) = SocketFrame::from_message(message) {
                        return Some(Ok(frame));
                    }
                }
                Err(e) => return Some(Err(anyhow!("socket read failed: {e}"))),
            }
        }
        None
    }
}

/// Open the room socket at `url`, identifying as `user_agent`.
///
/// # Errors
///
/// Fails when the URL has no host, the proxy refuses the tunnel, the TCP
/// connection cannot be made, or TLS / the WebSocket upgrade fails.
pub async fn connect(
    url: &str,
    user_agent: &str,
    proxy: Option<&ProxyConfig>,
) -> Result<(SocketWriter, SocketReader)> {
    let mut request = url
        .into_client_request()
        .with_context(|| format!("not a socket URL: {url}"))?;
    let agent = HeaderValue::from_str(user_agent).context("User-Agent is not a valid header")?;
    request.headers_mut().insert(header::USER_AGENT, agent);

    let (host, port) = {
        let uri = request.uri();
        let host = uri
            .host()
            .with_context(|| format!("socket URL has no host: {url}"))?;
        let default_port = if uri.scheme_str() == Some("wss") { 443 } else { 80 };
        (host.to_string(), uri.port_u16().unwrap_or(default_port))
    };

    let tcp = if let Some(proxy) = proxy {
        open_tunnel(proxy, &host, port).await?
    } else {
        TcpStream::connect((host.as_str(), port))
            .await
            .with_context(|| format!("TCP connect to {host}:{port} failed"))?
    };

    let (socket, _response) = tokio_tungstenite::client_async_tls(request, tcp)
        .await
        .with_context(|| format!("socket upgrade at {host}:{port} failed"))?;
    let (sink, stream) = socket.split();
    Ok((SocketWriter { sink }, SocketReader { stream }))
}

/// Open a TCP stream to `host:port` through an HTTP `CONNECT` proxy.
async fn open_tunnel(proxy: &ProxyConfig, host: &str, port: u16) -> Result<TcpStream> {
    let mut stream = TcpStream::connect((proxy.host.as_str(), proxy.port))
        .await
        .with_context(|| format!("proxy connect to {} failed", proxy.authority()))?;

    let connect = format!("CONNECT {host}:{port} HTTP/1.1\r\nHost: {host}:{port}\r\n\r\n");
    stream
        .write_all(connect.as_bytes())
        .await
        .context("proxy CONNECT write failed")?;

    let mut response = Vec::with_capacity(256);
    let mut chunk = [0u8; 256];
    while !response.windows(4).any(|w| w == b"\r\n\r\n") {
        if response.len() > MAX_PROXY_RESPONSE {
            bail!("proxy response header too large");
        }
        let n = stream
            .read(&mut chunk)
            .await
            .context("proxy CONNECT read failed")?;
        if n == 0 {
            bail!("proxy closed the connection during CONNECT");
        }
        response.extend_from_slice(&chunk[..n]);
    }

    let head = String::from_utf8_lossy(&response);
    let status_line = head.lines().next().unwrap_or_default();
    if status_line.split_whitespace().nth(1) != Some("200") {
        bail!("proxy refused tunnel: {status_line}");
    }

    log::debug!("[Room] Tunnel to {host}:{port} open via {}", proxy.authority());
    Ok(stream)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;
    use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
    use tokio_tungstenite::tungstenite::protocol::CloseFrame;

    fn local_proxy(port: u16) -> ProxyConfig {
        ProxyConfig {
            host: "127.0.0.1".to_string(),
            port,
        }
    }

    #[test]
    fn test_frames_sorted_for_session() {
        assert_eq!(
            SocketFrame::from_message(Message::Binary(vec![8, 1])),
            Some(SocketFrame::Binary(vec![8, 1]))
        );
        assert_eq!(
            SocketFrame::from_message(Message::Text("hi".into())),
            Some(SocketFrame::Ignored { kind: "text", len: 2 })
        );
        assert_eq!(
            SocketFrame::from_message(Message::Close(None)),
            Some(SocketFrame::Close {
                code: 1005,
                reason: String::new()
            })
        );
        assert_eq!(
            SocketFrame::from_message(Message::Close(Some(CloseFrame {
                code: CloseCode::Normal,
                reason: "done".into(),
            }))),
            Some(SocketFrame::Close {
                code: 1000,
                reason: "done".to_string()
            })
        );
    }

    #[tokio::test]
    async fn test_connect_rejects_relative_url() {
        assert!(connect("/websocket", "test-agent", None).await.is_err());
    }

    #[tokio::test]
    async fn test_connect_refused_port() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("ws://{}/websocket", listener.local_addr().unwrap());
        drop(listener);
        assert!(connect(&url, "test-agent", None).await.is_err());
    }

    #[tokio::test]
    async fn test_tunnel_accepts_200() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let server = tokio::spawn(async move {
            let (mut sock, _) = listener.accept().await.unwrap();
            let mut buf = vec![0u8; 1024];
            let n = sock.read(&mut buf).await.unwrap();
            sock.write_all(b"HTTP/1.1 200 Connection established\r\n\r\n")
                .await
                .unwrap();
            String::from_utf8_lossy(&buf[..n]).to_string()
        });

        open_tunnel(&local_proxy(port), "live.example.com", 443)
            .await
            .unwrap();
        let request = server.await.unwrap();
        assert!(request.starts_with("CONNECT live.example.com:443 HTTP/1.1\r\n"));
    }

    #[tokio::test]
    async fn test_tunnel_rejects_non_200() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            let (mut sock, _) = listener.accept().await.unwrap();
            let mut buf = vec![0u8; 1024];
            let _ = sock.read(&mut buf).await;
            let _ = sock
                .write_all(b"HTTP/1.1 407 Proxy Authentication Required\r\n\r\n")
                .await;
        });

        let err = open_tunnel(&local_proxy(port), "live.example.com", 443)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("407"));
    }
}
