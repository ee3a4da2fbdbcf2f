//! Tag-based routing of inbound envelopes.
//!
//! A fixed table maps each dispatched tag to its decode routine. Acks are
//! consumed here and only logged; chat pushes and viewer updates are queued
//! for the registered [`EventHandler`], which runs on its own thread (see
//! [`spawn_consumer`]). Anything else becomes [`DecodedEvent::Unrecognized`]
//! and is logged at debug. Nothing in this module returns an error to the
//! read loop.

use tokio::sync::mpsc;

use super::{EventHandler, RoomEvent};
use crate::protocol::{
    decode_typed, tag_name, EnterRoomAck, Envelope, FeedPush, FrameError, HeartbeatAck,
    PayloadType, WatchingUsers,
};

/// A decoded inbound frame.
#[derive(Debug, Clone, PartialEq)]
pub enum DecodedEvent {
    /// Room-entry acknowledgement.
    EnterAck(EnterRoomAck),
    /// Keepalive acknowledgement.
    HeartbeatAck(HeartbeatAck),
    /// Batched comments, likes and gifts.
    ChatPush(FeedPush),
    /// Viewer list and count update.
    WatchingUsers(WatchingUsers),
    /// Any other tag, kept raw for diagnostics.
    Unrecognized(Envelope),
}

type DecodeFn = fn(&Envelope) -> Result<DecodedEvent, FrameError>;

struct Route {
    kind: PayloadType,
    decode: DecodeFn,
}

const ROUTES: &[Route] = &[
    Route {
        kind: PayloadType::ScEnterRoomAck,
        decode: decode_enter_ack,
    },
    Route {
        kind: PayloadType::ScHeartbeatAck,
        decode: decode_heartbeat_ack,
    },
    Route {
        kind: PayloadType::ScFeedPush,
        decode: decode_feed_push,
    },
    Route {
        kind: PayloadType::ScLiveWatchingList,
        decode: decode_watching_users,
    },
];

fn decode_enter_ack(envelope: &Envelope) -> Result<DecodedEvent, FrameError> {
    decode_typed(envelope).map(DecodedEvent::EnterAck)
}

fn decode_heartbeat_ack(envelope: &Envelope) -> Result<DecodedEvent, FrameError> {
    decode_typed(envelope).map(DecodedEvent::HeartbeatAck)
}

fn decode_feed_push(envelope: &Envelope) -> Result<DecodedEvent, FrameError> {
    decode_typed(envelope).map(DecodedEvent::ChatPush)
}

fn decode_watching_users(envelope: &Envelope) -> Result<DecodedEvent, FrameError> {
    decode_typed(envelope).map(DecodedEvent::WatchingUsers)
}

/// Decode `envelope` by its tag. Unknown tags are not an error.
pub fn decode_event(envelope: Envelope) -> Result<DecodedEvent, FrameError> {
    match ROUTES.iter().find(|r| r.kind as i32 == envelope.payload_type) {
        Some(route) => (route.decode)(&envelope),
        None => Ok(DecodedEvent::Unrecognized(envelope)),
    }
}

/// What happened to one dispatched envelope.
#[derive(Debug, Clone, PartialEq)]
pub enum DispatchRecord {
    /// An ack, logged and consumed internally.
    Acknowledged(PayloadType),
    /// Delivered to the event handler.
    Delivered(PayloadType),
    /// Tag not in the dispatch table.
    Unrecognized {
        /// Raw tag.
        payload_type: i32,
        /// Payload size in bytes.
        payload_len: usize,
    },
    /// Known tag whose payload failed to decode.
    DecodeFailed {
        /// Raw tag.
        payload_type: i32,
        /// Decode error.
        error: FrameError,
    },
}

/// Queue feeding the consumer thread. One per client, cloned into each
/// session.
pub(crate) type EventSender = mpsc::UnboundedSender<RoomEvent>;

/// Start the thread that owns `handler`.
///
/// Events are handled one at a time in queue order, off the async runtime,
/// so a handler that blocks only delays later events. The thread exits once
/// every [`EventSender`] is gone.
pub(crate) fn spawn_consumer(mut handler: Box<dyn EventHandler>) -> EventSender {
    let (events_tx, mut events_rx) = mpsc::unbounded_channel::<RoomEvent>();
    let spawned = std::thread::Builder::new()
        .name("kslive-events".to_string())
        .spawn(move || {
            while let Some(event) = events_rx.blocking_recv() {
                handler.on_event(event);
            }
            log::debug!("[Room] Event consumer finished");
        });
    if let Err(e) = spawned {
        log::error!("[Room] Event consumer thread failed to start: {e}");
    }
    events_tx
}

/// Routes envelopes of one session to decode routines and the handler.
pub struct EventDispatcher {
    room_id: String,
    events: EventSender,
}

impl std::fmt::Debug for EventDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventDispatcher")
            .field("room_id", &self.room_id)
            .finish_non_exhaustive()
    }
}

impl EventDispatcher {
    /// Create a dispatcher for `room_id` queueing onto `events`.
    pub(crate) fn new(room_id: impl Into<String>, events: EventSender) -> Self {
        Self {
            room_id: room_id.into(),
            events,
        }
    }

    /// Room this dispatcher serves.
    pub fn room_id(&self) -> &str {
        &self.room_id
    }

    /// Decode and route one envelope.
    pub fn dispatch(&self, envelope: Envelope) -> DispatchRecord {
        let payload_type = envelope.payload_type;
        let event = match decode_event(envelope) {
            Ok(event) => event,
            Err(error) => {
                log::warn!(
                    "[Room] room={} type={} ({}): {}",
                    self.room_id,
                    payload_type,
                    tag_name(payload_type),
                    error
                );
                return DispatchRecord::DecodeFailed {
                    payload_type,
                    error,
                };
            }
        };

        match event {
            DecodedEvent::EnterAck(ack) => {
                log::info!(
                    "[Room] room={} entered (server heartbeat {} ms)",
                    self.room_id,
                    ack.heartbeat_interval_ms
                );
                DispatchRecord::Acknowledged(PayloadType::ScEnterRoomAck)
            }
            DecodedEvent::HeartbeatAck(ack) => {
                log::debug!(
                    "[Heartbeat] room={} ack server={} client={}",
                    self.room_id,
                    ack.timestamp,
                    ack.client_timestamp
                );
                DispatchRecord::Acknowledged(PayloadType::ScHeartbeatAck)
            }
            DecodedEvent::ChatPush(push) => {
                self.deliver(RoomEvent::Chat(push));
                DispatchRecord::Delivered(PayloadType::ScFeedPush)
            }
            DecodedEvent::WatchingUsers(users) => {
                self.deliver(RoomEvent::WatchingUsers(users));
                DispatchRecord::Delivered(PayloadType::ScLiveWatchingList)
            }
            DecodedEvent::Unrecognized(raw) => {
                log::debug!(
                    "[Room] room={} unhandled type={} ({}) len={}",
                    self.room_id,
                    raw.payload_type,
                    tag_name(raw.payload_type),
                    raw.payload.len()
                );
                DispatchRecord::Unrecognized {
                    payload_type: raw.payload_type,
                    payload_len: raw.payload.len(),
                }
            }
        }
    }

    /// Queue an event for the consumer. Never blocks.
    pub(crate) fn deliver(&self, event: RoomEvent) {
        if let Err(e) = self.events.send(event) {
            log::warn!(
                "[Room] room={} consumer gone, dropping {:?}",
                self.room_id,
                e.0
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{CommentFeed, Envelope, SimpleUserInfo};
    use crate::room::CloseCause;
    use prost::Message;
    use std::time::{Duration, Instant};

    fn recording_dispatcher() -> (EventDispatcher, mpsc::UnboundedReceiver<RoomEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (EventDispatcher::new("room-1", tx), rx)
    }

    fn queued(rx: &mut mpsc::UnboundedReceiver<RoomEvent>) -> Vec<RoomEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    fn chat_envelope(text: &str) -> Envelope {
        let push = FeedPush {
            comment_feeds: vec![CommentFeed {
                user: Some(SimpleUserInfo {
                    user_name: "bob".to_string(),
                    ..Default::default()
                }),
                content: text.to_string(),
                ..Default::default()
            }],
            ..Default::default()
        };
        Envelope::new(PayloadType::ScFeedPush as i32, push.encode_to_vec())
    }

    #[test]
    fn test_chat_push_reaches_handler_in_order() {
        let (dispatcher, mut rx) = recording_dispatcher();
        assert_eq!(
            dispatcher.dispatch(chat_envelope("first")),
            DispatchRecord::Delivered(PayloadType::ScFeedPush)
        );
        dispatcher.dispatch(chat_envelope("second"));

        let texts: Vec<_> = queued(&mut rx)
            .iter()
            .map(|e| match e {
                RoomEvent::Chat(push) => push.comment_feeds[0].content.clone(),
                other => panic!("unexpected event {other:?}"),
            })
            .collect();
        assert_eq!(texts, vec!["first", "second"]);
    }

    #[test]
    fn test_acks_are_not_delivered() {
        let (dispatcher, mut rx) = recording_dispatcher();
        let ack = Envelope::from_message(PayloadType::ScEnterRoomAck, &EnterRoomAck::default()).unwrap();
        let hb_ack = Envelope::from_message(PayloadType::ScHeartbeatAck, &HeartbeatAck::default()).unwrap();

        assert_eq!(
            dispatcher.dispatch(ack),
            DispatchRecord::Acknowledged(PayloadType::ScEnterRoomAck)
        );
        assert_eq!(
            dispatcher.dispatch(hb_ack),
            DispatchRecord::Acknowledged(PayloadType::ScHeartbeatAck)
        );
        assert!(queued(&mut rx).is_empty());
    }

    #[test]
    fn test_watching_users_delivered() {
        let (dispatcher, mut rx) = recording_dispatcher();
        let users = WatchingUsers {
            display_watching_count: "321".to_string(),
            ..Default::default()
        };
        let envelope = Envelope::from_message(PayloadType::ScLiveWatchingList, &users).unwrap();
        dispatcher.dispatch(envelope);
        assert_eq!(queued(&mut rx), vec![RoomEvent::WatchingUsers(users)]);
    }

    #[test]
    fn test_unknown_tag_yields_one_unrecognized_record() {
        let (dispatcher, mut rx) = recording_dispatcher();
        let record = dispatcher.dispatch(Envelope::new(777, vec![1, 2, 3]));
        assert_eq!(
            record,
            DispatchRecord::Unrecognized {
                payload_type: 777,
                payload_len: 3
            }
        );
        assert!(queued(&mut rx).is_empty());
    }

    #[test]
    fn test_known_but_undispatched_tag_is_unrecognized() {
        let (dispatcher, _rx) = recording_dispatcher();
        let record = dispatcher.dispatch(Envelope::new(PayloadType::ScAuthorPause as i32, Vec::new()));
        assert!(matches!(record, DispatchRecord::Unrecognized { payload_type: 301, .. }));
    }

    #[test]
    fn test_malformed_payload_for_known_tag_is_contained() {
        let (dispatcher, mut rx) = recording_dispatcher();
        let record = dispatcher.dispatch(Envelope::new(PayloadType::ScFeedPush as i32, vec![0xff; 4]));
        assert!(matches!(
            record,
            DispatchRecord::DecodeFailed {
                payload_type: 310,
                error: FrameError::Malformed(_)
            }
        ));
        assert!(queued(&mut rx).is_empty());

        // Next frame still goes through.
        dispatcher.dispatch(chat_envelope("after"));
        assert_eq!(queued(&mut rx).len(), 1);
    }

    #[test]
    fn test_decode_event_table_covers_dispatched_tags() {
        let tags: Vec<i32> = ROUTES.iter().map(|r| r.kind as i32).collect();
        assert_eq!(tags, vec![300, 101, 310, 340]);
    }

    #[test]
    fn test_consumer_runs_on_own_thread_in_order() {
        let (seen_tx, seen_rx) = std::sync::mpsc::channel();
        let events = spawn_consumer(Box::new(move |event: RoomEvent| {
            let thread = std::thread::current().name().map(str::to_string);
            seen_tx.send((thread, event)).unwrap();
        }));
        let dispatcher = EventDispatcher::new("room-1", events);

        dispatcher.dispatch(chat_envelope("one"));
        dispatcher.dispatch(chat_envelope("two"));
        dispatcher.deliver(RoomEvent::Disconnected(CloseCause::Requested));

        let mut got = Vec::new();
        for _ in 0..3 {
            got.push(seen_rx.recv_timeout(Duration::from_secs(5)).unwrap());
        }
        assert!(got.iter().all(|(thread, _)| thread.as_deref() == Some("kslive-events")));
        assert!(matches!(&got[0].1, RoomEvent::Chat(p) if p.comment_feeds[0].content == "one"));
        assert!(matches!(&got[1].1, RoomEvent::Chat(p) if p.comment_feeds[0].content == "two"));
        assert_eq!(got[2].1, RoomEvent::Disconnected(CloseCause::Requested));
    }

    #[test]
    fn test_blocking_handler_does_not_block_dispatch() {
        let (done_tx, done_rx) = std::sync::mpsc::channel();
        let events = spawn_consumer(Box::new(move |_event: RoomEvent| {
            std::thread::sleep(Duration::from_millis(500));
            let _ = done_tx.send(());
        }));
        let dispatcher = EventDispatcher::new("room-1", events);

        let started = Instant::now();
        for i in 0..4 {
            dispatcher.dispatch(chat_envelope(&format!("msg {i}")));
        }
        assert!(started.elapsed() < Duration::from_millis(250));

        // All four still handled, one after another.
        for _ in 0..4 {
            done_rx.recv_timeout(Duration::from_secs(5)).unwrap();
        }
    }
}
