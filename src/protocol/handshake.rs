//! Session negotiation frames: the room-entry handshake and the keepalive.

use std::sync::atomic::{AtomicU64, Ordering};

use rand::Rng;

use super::{Envelope, EnterRoom, FrameError, Heartbeat, PayloadType};
use crate::constants::{PAGE_ID_CHARSET, PAGE_ID_RANDOM_LEN};

/// Last timestamp handed out, so ids generated within one millisecond
/// still differ.
static LAST_PAGE_ID_MILLIS: AtomicU64 = AtomicU64::new(0);

/// Client-generated id for one connection attempt.
///
/// Sixteen symbols from [`PAGE_ID_CHARSET`] followed by `_<epoch millis>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PageSessionId(String);

impl PageSessionId {
    /// Generate a fresh id stamped with `now_ms`.
    ///
    /// The stamp is bumped past the previous one when needed, so two ids from
    /// the same process never share a suffix.
    pub fn generate(now_ms: u64) -> Self {
        let stamp = next_stamp(now_ms);
        let mut rng = rand::rng();
        let mut id = String::with_capacity(PAGE_ID_RANDOM_LEN + 16);
        for _ in 0..PAGE_ID_RANDOM_LEN {
            let idx = rng.random_range(0..PAGE_ID_CHARSET.len());
            id.push(char::from(PAGE_ID_CHARSET[idx]));
        }
        id.push('_');
        id.push_str(&stamp.to_string());
        Self(id)
    }

    /// The id as sent on the wire.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for PageSessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

fn next_stamp(now_ms: u64) -> u64 {
    let mut prev = LAST_PAGE_ID_MILLIS.load(Ordering::Relaxed);
    loop {
        let next = now_ms.max(prev + 1);
        match LAST_PAGE_ID_MILLIS.compare_exchange_weak(prev, next, Ordering::Relaxed, Ordering::Relaxed) {
            Ok(_) => return next,
            Err(actual) => prev = actual,
        }
    }
}

/// Build the room-entry frame sent immediately after the socket opens.
///
/// Every other `EnterRoom` field keeps its zero value.
pub fn build_handshake(
    token: &str,
    room_id: &str,
    page_id: &PageSessionId,
) -> Result<Envelope, FrameError> {
    let body = EnterRoom {
        token: token.to_string(),
        live_stream_id: room_id.to_string(),
        page_id: page_id.as_str().to_string(),
        ..Default::default()
    };
    Envelope::from_message(PayloadType::CsEnterRoom, &body)
}

/// Build one keepalive frame stamped with `timestamp_ms`.
pub fn build_heartbeat(timestamp_ms: u64) -> Result<Envelope, FrameError> {
    Envelope::from_message(PayloadType::CsHeartbeat, &Heartbeat { timestamp: timestamp_ms })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{decode_envelope, decode_typed, encode_envelope};

    #[test]
    fn test_page_id_shape() {
        let id = PageSessionId::generate(1_700_000_000_000);
        // '_' is also in the charset, so split on the last one.
        let (random, stamp) = id.as_str().rsplit_once('_').unwrap();
        assert_eq!(random.len(), PAGE_ID_RANDOM_LEN);
        assert!(random.bytes().all(|b| PAGE_ID_CHARSET.contains(&b)));
        assert!(stamp.parse::<u64>().unwrap() >= 1_700_000_000_000);
    }

    #[test]
    fn test_page_ids_are_distinct_within_one_millisecond() {
        let a = PageSessionId::generate(1_800_000_000_000);
        let b = PageSessionId::generate(1_800_000_000_000);
        assert_ne!(a, b);
        let stamp = |id: &PageSessionId| {
            id.as_str().rsplit_once('_').unwrap().1.parse::<u64>().unwrap()
        };
        assert!(stamp(&b) > stamp(&a));
    }

    #[test]
    fn test_handshake_carries_token_room_and_page_id() {
        let page_id = PageSessionId::generate(1_700_000_000_000);
        let envelope = build_handshake("tok", "room-1", &page_id).unwrap();
        assert_eq!(envelope.payload_type, 200);

        let wire = encode_envelope(&envelope).unwrap();
        let body: EnterRoom = decode_typed(&decode_envelope(&wire).unwrap()).unwrap();
        assert_eq!(body.token, "tok");
        assert_eq!(body.live_stream_id, "room-1");
        assert_eq!(body.page_id, page_id.as_str());
        assert_eq!(body.reconnect_count, 0);
        assert!(body.exp_tag.is_empty());
    }

    #[test]
    fn test_handshake_with_empty_token_is_still_well_formed() {
        let page_id = PageSessionId::generate(1_700_000_000_000);
        let envelope = build_handshake("", "room-1", &page_id).unwrap();
        let body: EnterRoom = decode_typed(&envelope).unwrap();
        assert!(body.token.is_empty());
        assert_eq!(body.live_stream_id, "room-1");
    }

    #[test]
    fn test_heartbeat_frame() {
        let envelope = build_heartbeat(1_234).unwrap();
        assert_eq!(envelope.payload_type, 1);
        let body: Heartbeat = decode_typed(&envelope).unwrap();
        assert_eq!(body.timestamp, 1_234);
    }
}
