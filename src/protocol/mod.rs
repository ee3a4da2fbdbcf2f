//! Wire codec for the room channel.
//!
//! Every WebSocket binary message is one protobuf-encoded envelope:
//!
//! ```text
//! [field 1: type tag][field 2: compression, optional][field 3: payload bytes]
//! ```
//!
//! The codec works in two steps. [`decode_envelope`] only checks that the
//! outer frame is well formed and keeps the payload opaque. [`decode_typed`]
//! turns the payload into one of the known sub-messages on demand, so an
//! unknown or future tag never fails at the envelope level.
//!
//! Tag values are fixed by the server (`200` = room entry, `1` = heartbeat,
//! `300` = entry ack, `101` = heartbeat ack, `310` = feed push,
//! `340` = watching list) and must be preserved exactly.

pub mod handshake;
pub mod inspect;
pub mod messages;

use std::borrow::Cow;
use std::io::Read;

use bytes::Bytes;
use prost::Message;

pub use messages::{
    CommentFeed, CompressionType, EnterRoom, EnterRoomAck, FeedPush, GiftFeed, Heartbeat,
    HeartbeatAck, LikeFeed, PayloadType, SimpleUserInfo, SocketMessage, WatchingUser,
    WatchingUsers,
};

/// Shortest byte sequence that can hold a type tag (one key byte plus one
/// varint byte).
pub const MIN_ENVELOPE_LEN: usize = 2;

/// Upper bound on an inflated payload.
const MAX_INFLATED_SIZE: u64 = 16 * 1024 * 1024;

/// Per-frame codec failures.
///
/// None of these end a session: the read loop logs them and moves on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameError {
    /// Bytes do not form a valid envelope or payload.
    Malformed(String),
    /// The envelope's tag does not match the requested payload shape.
    UnknownPayload {
        /// Tag of the requested shape.
        expected: i32,
        /// Tag found on the envelope.
        actual: i32,
    },
    /// A payload could not be serialized.
    Encoding(String),
}

impl std::fmt::Display for FrameError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Malformed(msg) => write!(f, "Malformed frame: {msg}"),
            Self::UnknownPayload { expected, actual } => write!(
                f,
                "Unexpected payload: wanted {} ({expected}), got {} ({actual})",
                tag_name(*expected),
                tag_name(*actual)
            ),
            Self::Encoding(msg) => write!(f, "Encoding failed: {msg}"),
        }
    }
}

impl std::error::Error for FrameError {}

/// Human-readable name for a type tag, for logs.
pub fn tag_name(tag: i32) -> Cow<'static, str> {
    match PayloadType::try_from(tag) {
        Ok(kind) => Cow::Owned(format!("{kind:?}")),
        Err(_) => Cow::Borrowed("Unrecognized"),
    }
}

/// Decoded outer frame: a type tag and an opaque payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    /// Raw type tag. Values outside [`PayloadType`] are legal.
    pub payload_type: i32,
    /// How `payload` is compressed.
    pub compression: CompressionType,
    /// Serialized sub-message, possibly compressed.
    pub payload: Bytes,
}

impl Envelope {
    /// Create an uncompressed envelope.
    pub fn new(payload_type: i32, payload: impl Into<Bytes>) -> Self {
        Self {
            payload_type,
            compression: CompressionType::Unknown,
            payload: payload.into(),
        }
    }

    /// Serialize `message` and wrap it under `payload_type`.
    pub fn from_message<M: Message>(payload_type: PayloadType, message: &M) -> Result<Self, FrameError> {
        let mut buf = Vec::with_capacity(message.encoded_len());
        message
            .encode(&mut buf)
            .map_err(|e| FrameError::Encoding(e.to_string()))?;
        Ok(Self::new(payload_type as i32, buf))
    }

    /// The known payload type, if the tag is one.
    pub fn kind(&self) -> Option<PayloadType> {
        PayloadType::try_from(self.payload_type).ok()
    }

    /// Payload bytes with compression removed.
    pub fn plain_payload(&self) -> Result<Cow<'_, [u8]>, FrameError> {
        match self.compression {
            CompressionType::Unknown | CompressionType::Uncompressed => {
                Ok(Cow::Borrowed(&self.payload[..]))
            }
            CompressionType::Gzip => {
                let mut inflated = Vec::new();
                flate2::read::GzDecoder::new(&self.payload[..])
                    .take(MAX_INFLATED_SIZE)
                    .read_to_end(&mut inflated)
                    .map_err(|e| FrameError::Malformed(format!("gzip payload: {e}")))?;
                Ok(Cow::Owned(inflated))
            }
            CompressionType::Aes => Err(FrameError::Malformed(
                "encrypted payloads are not supported".to_string(),
            )),
        }
    }
}

/// A sub-message with a fixed type tag.
pub trait PayloadMessage: Message + Default {
    /// Tag this shape travels under.
    const PAYLOAD_TYPE: PayloadType;
}

impl PayloadMessage for EnterRoom {
    const PAYLOAD_TYPE: PayloadType = PayloadType::CsEnterRoom;
}

impl PayloadMessage for Heartbeat {
    const PAYLOAD_TYPE: PayloadType = PayloadType::CsHeartbeat;
}

impl PayloadMessage for EnterRoomAck {
    const PAYLOAD_TYPE: PayloadType = PayloadType::ScEnterRoomAck;
}

impl PayloadMessage for HeartbeatAck {
    const PAYLOAD_TYPE: PayloadType = PayloadType::ScHeartbeatAck;
}

impl PayloadMessage for FeedPush {
    const PAYLOAD_TYPE: PayloadType = PayloadType::ScFeedPush;
}

impl PayloadMessage for WatchingUsers {
    const PAYLOAD_TYPE: PayloadType = PayloadType::ScLiveWatchingList;
}

/// Encode an envelope into the bytes of one WebSocket binary message.
pub fn encode_envelope(envelope: &Envelope) -> Result<Vec<u8>, FrameError> {
    let compression_type = match envelope.compression {
        CompressionType::Unknown => None,
        other => Some(other as i32),
    };
    let raw = SocketMessage {
        payload_type: Some(envelope.payload_type),
        compression_type,
        payload: envelope.payload.clone(),
    };
    let mut buf = Vec::with_capacity(raw.encoded_len());
    raw.encode(&mut buf)
        .map_err(|e| FrameError::Encoding(e.to_string()))?;
    Ok(buf)
}

/// Decode the outer envelope of one inbound message.
///
/// Only the envelope structure is validated; the payload stays opaque.
pub fn decode_envelope(bytes: &[u8]) -> Result<Envelope, FrameError> {
    if bytes.len() < MIN_ENVELOPE_LEN {
        return Err(FrameError::Malformed(format!(
            "frame too short: {} bytes (min {MIN_ENVELOPE_LEN})",
            bytes.len()
        )));
    }

    let raw = SocketMessage::decode(bytes).map_err(|e| FrameError::Malformed(e.to_string()))?;
    let payload_type = raw
        .payload_type
        .ok_or_else(|| FrameError::Malformed("missing payload type".to_string()))?;
    let compression = raw
        .compression_type
        .and_then(|c| CompressionType::try_from(c).ok())
        .unwrap_or_default();

    Ok(Envelope {
        payload_type,
        compression,
        payload: raw.payload,
    })
}

/// Decode the payload of `envelope` as `T`.
///
/// Fails with [`FrameError::UnknownPayload`] when the envelope carries a
/// different tag. Unknown fields inside the payload are skipped.
pub fn decode_typed<T: PayloadMessage>(envelope: &Envelope) -> Result<T, FrameError> {
    let expected = T::PAYLOAD_TYPE as i32;
    if envelope.payload_type != expected {
        return Err(FrameError::UnknownPayload {
            expected,
            actual: envelope.payload_type,
        });
    }
    let body = envelope.plain_payload()?;
    T::decode(body.as_ref()).map_err(|e| FrameError::Malformed(e.to_string()))
}
