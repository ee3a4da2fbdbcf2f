//! kslive - live-room protocol client.
//!
//! This crate connects to a live broadcast room over its binary WebSocket
//! channel, keeps the session alive and turns pushed frames into typed
//! events. A small set of HTTP calls sits beside the socket: resolving the
//! room, posting chat, following users and reading the gift catalog.
//!
//! # Architecture
//!
//! - **Protocol** - envelope codec, payload messages and handshake frames
//! - **Room** - connection state machine, heartbeat and event dispatch
//! - **Api** - room directory, action API and cookie providers
//! - **Commands** - CLI adapters over the above
//!
//! # Modules
//!
//! - [`protocol`] - frame codec and session negotiation
//! - [`room`] - room client and its session tasks
//! - [`api`] - HTTP collaborators
//! - [`config`] - configuration loading/saving

// Library modules
pub mod api;
pub mod commands;
pub mod room;
pub mod ws;

pub mod config;
pub mod constants;
pub mod error;
pub mod protocol;

// Re-export commonly used types
pub use api::{ActionApi, HttpRoomDirectory, LiveHttp, RoomDirectory};
pub use config::Config;
pub use error::LiveError;
pub use protocol::{Envelope, FrameError};
pub use room::{CloseCause, ConnectionState, EventHandler, RoomClient, RoomEvent, RoomOptions};
