//! Error taxonomy shared by the room client and the HTTP collaborators.
//!
//! Errors fall in two groups:
//! - **Session fatal**: [`LiveError::SessionInvalid`], [`LiveError::Transport`].
//!   These end a connection attempt or an open session.
//! - **Contained**: [`LiveError::Frame`] errors are per-frame; the read loop
//!   logs them and keeps going.

use crate::protocol::FrameError;
use crate::room::ConnectionState;

/// Errors surfaced by the room client, room directory and action API.
#[derive(Debug, Clone, PartialEq)]
pub enum LiveError {
    /// The session credential was rejected. Retrying with the same cookie
    /// will not help.
    SessionInvalid(String),
    /// The room exists but nobody is broadcasting right now.
    NotLive,
    /// A single frame could not be encoded or decoded.
    Frame(FrameError),
    /// Socket-level failure (open, read, write, timeout).
    Transport(String),
    /// `connect()` was called while a session is already in progress.
    AlreadyConnected(ConnectionState),
    /// An outbound write was attempted without an open session.
    NotConnected,
    /// An HTTP request failed for a reason other than authentication.
    Request(String),
}

impl LiveError {
    /// Whether retrying later with the same credential can succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::NotLive | Self::Transport(_) | Self::Request(_))
    }
}

impl std::fmt::Display for LiveError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::SessionInvalid(msg) => write!(f, "Session invalid: {msg}"),
            Self::NotLive => write!(f, "Room is not live"),
            Self::Frame(err) => write!(f, "Frame error: {err}"),
            Self::Transport(msg) => write!(f, "Transport error: {msg}"),
            Self::AlreadyConnected(state) => write!(f, "Already connected (state: {state:?})"),
            Self::NotConnected => write!(f, "Not connected"),
            Self::Request(msg) => write!(f, "Request failed: {msg}"),
        }
    }
}

impl std::error::Error for LiveError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Frame(err) => Some(err),
            _ => None,
        }
    }
}

impl From<FrameError> for LiveError {
    fn from(err: FrameError) -> Self {
        Self::Frame(err)
    }
}

impl From<reqwest::Error> for LiveError {
    fn from(err: reqwest::Error) -> Self {
        Self::Request(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(LiveError::NotLive.is_retryable());
        assert!(LiveError::Transport("reset".into()).is_retryable());
        assert!(!LiveError::SessionInvalid("expired".into()).is_retryable());
        assert!(!LiveError::AlreadyConnected(ConnectionState::Active).is_retryable());
    }

    #[test]
    fn test_frame_error_converts_and_chains() {
        let err: LiveError = FrameError::Malformed("truncated".into()).into();
        assert!(matches!(err, LiveError::Frame(FrameError::Malformed(_))));
        assert!(std::error::Error::source(&err).is_some());
        assert_eq!(err.to_string(), "Frame error: Malformed frame: truncated");
    }
}
