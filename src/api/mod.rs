//! HTTP collaborators of the room client.
//!
//! - [`client`] - authenticated HTTP session (`LiveHttp`)
//! - [`directory`] - room page and socket endpoint resolution
//! - [`actions`] - chat, follow, profile and gift calls
//! - [`credentials`] - session cookie providers
//! - [`types`] - request/response data types

pub mod actions;
pub mod client;
pub mod credentials;
pub mod directory;
pub mod types;

pub use actions::ActionApi;
pub use client::LiveHttp;
pub use credentials::{CookieCache, CredentialProvider, FileCookie, StaticCookie};
pub use directory::{parse_room_id, HttpRoomDirectory, RoomDirectory, RoomIdentity, SocketEndpoint};
