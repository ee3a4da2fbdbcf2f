//! Protobuf messages of the room channel.
//!
//! Hand-written prost definitions (no build-time codegen). Only the fields the
//! client reads or writes are declared; prost skips every other tag on decode,
//! so newer server payloads keep parsing.
//!
//! Every outer frame has the same shape:
//!
//! ```text
//! field 1  varint  payload type tag
//! field 2  varint  compression (optional)
//! field 3  bytes   payload (a nested message, serialized)
//! ```

use bytes::Bytes;

/// Type tag carried in field 1 of every frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, prost::Enumeration)]
#[repr(i32)]
pub enum PayloadType {
    /// Unset.
    Unknown = 0,
    /// Client keepalive.
    CsHeartbeat = 1,
    /// Client-reported error.
    CsError = 3,
    /// Client ping.
    CsPing = 4,
    /// Server keepalive acknowledgement.
    ScHeartbeatAck = 101,
    /// Server echo.
    ScEcho = 102,
    /// Server-reported error.
    ScError = 103,
    /// Server ping acknowledgement.
    ScPingAck = 104,
    /// Server informational notice.
    ScInfo = 105,
    /// Room-entry handshake.
    CsEnterRoom = 200,
    /// Client paused playback.
    CsUserPause = 201,
    /// Client left the room.
    CsUserExit = 202,
    /// Room-entry acknowledgement.
    ScEnterRoomAck = 300,
    /// Broadcaster paused the stream.
    ScAuthorPause = 301,
    /// Broadcaster resumed the stream.
    ScAuthorResume = 302,
    /// Comment/like/gift batch.
    ScFeedPush = 310,
    /// Viewer list and count update.
    ScLiveWatchingList = 340,
}

/// Payload compression tag carried in field 2.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, prost::Enumeration)]
#[repr(i32)]
pub enum CompressionType {
    /// Unset; payload is plain.
    Unknown = 0,
    /// Explicitly uncompressed.
    Uncompressed = 1,
    /// Gzip-compressed payload.
    Gzip = 2,
    /// Encrypted payload (not supported by this client).
    Aes = 3,
}

/// Outer frame as it appears on the wire.
#[derive(Clone, PartialEq, prost::Message)]
pub struct SocketMessage {
    /// Payload type tag. Absent only in malformed frames.
    #[prost(enumeration = "PayloadType", optional, tag = "1")]
    pub payload_type: Option<i32>,
    /// Compression applied to `payload`.
    #[prost(enumeration = "CompressionType", optional, tag = "2")]
    pub compression_type: Option<i32>,
    /// Serialized sub-message.
    #[prost(bytes = "bytes", tag = "3")]
    pub payload: Bytes,
}

/// Room-entry handshake body (`CsEnterRoom`).
#[derive(Clone, PartialEq, prost::Message)]
pub struct EnterRoom {
    /// Token issued by the socket discovery endpoint.
    #[prost(string, tag = "1")]
    pub token: String,
    /// Live stream (room) id.
    #[prost(string, tag = "2")]
    pub live_stream_id: String,
    /// Reconnect attempts made by this page session.
    #[prost(uint32, tag = "3")]
    pub reconnect_count: u32,
    /// Last error code seen before reconnecting.
    #[prost(uint32, tag = "4")]
    pub last_error_code: u32,
    /// Experiment tag.
    #[prost(string, tag = "5")]
    pub exp_tag: String,
    /// Opaque attachment.
    #[prost(string, tag = "6")]
    pub attach: String,
    /// Page session id.
    #[prost(string, tag = "7")]
    pub page_id: String,
}

/// Keepalive body (`CsHeartbeat`).
#[derive(Clone, PartialEq, prost::Message)]
pub struct Heartbeat {
    /// Epoch milliseconds at send time.
    #[prost(uint64, tag = "1")]
    pub timestamp: u64,
}

/// Room-entry acknowledgement (`ScEnterRoomAck`).
#[derive(Clone, PartialEq, prost::Message)]
pub struct EnterRoomAck {
    /// Lower bound of the server-suggested reconnect delay.
    #[prost(uint64, tag = "1")]
    pub min_reconnect_ms: u64,
    /// Upper bound of the server-suggested reconnect delay.
    #[prost(uint64, tag = "2")]
    pub max_reconnect_ms: u64,
    /// Heartbeat interval the server expects.
    #[prost(uint64, tag = "3")]
    pub heartbeat_interval_ms: u64,
}

/// Keepalive acknowledgement (`ScHeartbeatAck`).
#[derive(Clone, PartialEq, prost::Message)]
pub struct HeartbeatAck {
    /// Server time.
    #[prost(uint64, tag = "1")]
    pub timestamp: u64,
    /// Echo of the client heartbeat timestamp.
    #[prost(uint64, tag = "2")]
    pub client_timestamp: u64,
}

/// Minimal user record attached to feeds.
#[derive(Clone, PartialEq, prost::Message)]
pub struct SimpleUserInfo {
    /// Stable user id.
    #[prost(string, tag = "1")]
    pub principal_id: String,
    /// Display name.
    #[prost(string, tag = "2")]
    pub user_name: String,
    /// Avatar URL.
    #[prost(string, tag = "3")]
    pub head_url: String,
}

/// One chat comment.
#[derive(Clone, PartialEq, prost::Message)]
pub struct CommentFeed {
    /// Comment id.
    #[prost(string, tag = "1")]
    pub id: String,
    /// Author.
    #[prost(message, optional, tag = "2")]
    pub user: Option<SimpleUserInfo>,
    /// Comment text.
    #[prost(string, tag = "3")]
    pub content: String,
    /// Author device hash.
    #[prost(string, tag = "4")]
    pub device_hash: String,
    /// Server-side ordering key.
    #[prost(uint64, tag = "5")]
    pub sort_rank: u64,
    /// Display colour, e.g. `#FF8BA7`.
    #[prost(string, tag = "6")]
    pub color: String,
}

/// One like event.
#[derive(Clone, PartialEq, prost::Message)]
pub struct LikeFeed {
    /// Like id.
    #[prost(string, tag = "1")]
    pub id: String,
    /// Who liked.
    #[prost(message, optional, tag = "2")]
    pub user: Option<SimpleUserInfo>,
    /// Server-side ordering key.
    #[prost(uint64, tag = "3")]
    pub sort_rank: u64,
}

/// One gift event.
#[derive(Clone, PartialEq, prost::Message)]
pub struct GiftFeed {
    /// Gift event id.
    #[prost(string, tag = "1")]
    pub id: String,
    /// Sender.
    #[prost(message, optional, tag = "2")]
    pub user: Option<SimpleUserInfo>,
    /// Send time (epoch milliseconds).
    #[prost(uint64, tag = "3")]
    pub time: u64,
    /// Catalog id of the gift.
    #[prost(uint32, tag = "4")]
    pub gift_id: u32,
    /// Gifts in this batch.
    #[prost(uint32, tag = "7")]
    pub batch_size: u32,
    /// Running combo counter.
    #[prost(uint32, tag = "8")]
    pub combo_count: u32,
}

/// Batched room activity (`ScFeedPush`).
#[derive(Clone, PartialEq, prost::Message)]
pub struct FeedPush {
    /// Viewer count as displayed (may be abbreviated, e.g. `1.2w`).
    #[prost(string, tag = "1")]
    pub display_watching_count: String,
    /// Like count as displayed.
    #[prost(string, tag = "2")]
    pub display_like_count: String,
    /// Likes not yet reflected in `display_like_count`.
    #[prost(uint64, tag = "3")]
    pub pending_like_count: u64,
    /// Suggested push interval.
    #[prost(uint64, tag = "4")]
    pub push_interval: u64,
    /// Chat comments.
    #[prost(message, repeated, tag = "5")]
    pub comment_feeds: Vec<CommentFeed>,
    /// Comment cursor for incremental fetches.
    #[prost(string, tag = "6")]
    pub comment_cursor: String,
    /// Likes.
    #[prost(message, repeated, tag = "8")]
    pub like_feeds: Vec<LikeFeed>,
    /// Gifts.
    #[prost(message, repeated, tag = "9")]
    pub gift_feeds: Vec<GiftFeed>,
}

/// One entry of the viewer list.
#[derive(Clone, PartialEq, prost::Message)]
pub struct WatchingUser {
    /// The viewer.
    #[prost(message, optional, tag = "1")]
    pub user: Option<SimpleUserInfo>,
    /// Viewer went offline.
    #[prost(bool, tag = "2")]
    pub offline: bool,
    /// Top spender flag.
    #[prost(bool, tag = "3")]
    pub tuhao: bool,
    /// Display string of coins spent.
    #[prost(string, tag = "5")]
    pub display_ks_coin: String,
}

/// Viewer list and count update (`ScLiveWatchingList`).
#[derive(Clone, PartialEq, prost::Message)]
pub struct WatchingUsers {
    /// Top viewers.
    #[prost(message, repeated, tag = "1")]
    pub watching_user: Vec<WatchingUser>,
    /// Viewer count as displayed.
    #[prost(string, tag = "2")]
    pub display_watching_count: String,
    /// Milliseconds until the next update.
    #[prost(uint64, tag = "3")]
    pub pending_duration: u64,
}
