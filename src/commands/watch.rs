//! `kslive watch`: follow a live room and print its chat.
//!
//! Reconnection lives here rather than in the room client. With
//! `--reconnect`, a dropped or failed session is retried with exponential
//! backoff and jitter, except when the cookie was rejected.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tokio::sync::mpsc;

use crate::api::HttpRoomDirectory;
use crate::config::Config;
use crate::error::LiveError;
use crate::protocol::{FeedPush, SimpleUserInfo, WatchingUsers};
use crate::room::{CloseCause, RoomClient, RoomEvent, RoomOptions};

const INITIAL_BACKOFF_SECS: u64 = 1;
const MAX_BACKOFF_SECS: u64 = 60;

/// Exponential backoff with up to one second of jitter.
#[derive(Debug)]
pub struct Backoff {
    secs: u64,
}

impl Default for Backoff {
    fn default() -> Self {
        Self {
            secs: INITIAL_BACKOFF_SECS,
        }
    }
}

impl Backoff {
    /// Delay before the next attempt; doubles the base up to the cap.
    pub fn next_delay(&mut self) -> Duration {
        let jitter_ms = rand::random::<u64>() % 1000;
        let delay = Duration::from_millis(self.secs * 1000 + jitter_ms);
        self.secs = (self.secs * 2).min(MAX_BACKOFF_SECS);
        delay
    }

    /// Back to the initial delay after a successful session.
    pub fn reset(&mut self) {
        self.secs = INITIAL_BACKOFF_SECS;
    }
}

fn user_name(user: Option<&SimpleUserInfo>) -> &str {
    user.map_or("?", |u| u.user_name.as_str())
}

/// Render a feed push as display lines: comments, then gifts, then likes.
pub fn format_feed(push: &FeedPush) -> Vec<String> {
    let mut lines = Vec::new();
    for comment in &push.comment_feeds {
        lines.push(format!("{}: {}", user_name(comment.user.as_ref()), comment.content));
    }
    for gift in &push.gift_feeds {
        lines.push(format!(
            "* {} sent gift #{} x{}",
            user_name(gift.user.as_ref()),
            gift.gift_id,
            gift.batch_size.max(1)
        ));
    }
    for like in &push.like_feeds {
        lines.push(format!("* {} liked", user_name(like.user.as_ref())));
    }
    lines
}

fn format_watching(users: &WatchingUsers) -> String {
    format!("[viewers] {}", users.display_watching_count)
}

/// Connect to the configured room and print events until Ctrl-C.
pub async fn run(config: &Config, reconnect: bool) -> Result<()> {
    super::require_page_url(config)?;
    let http = super::http_session(config)?;
    let directory = Arc::new(HttpRoomDirectory::new(http));

    let (done_tx, mut done_rx) = mpsc::unbounded_channel::<CloseCause>();
    let handler = move |event: RoomEvent| match event {
        RoomEvent::Chat(push) => {
            for line in format_feed(&push) {
                println!("{line}");
            }
        }
        RoomEvent::WatchingUsers(users) => println!("{}", format_watching(&users)),
        RoomEvent::Disconnected(cause) => {
            let _ = done_tx.send(cause);
        }
    };
    let client = RoomClient::new(directory, RoomOptions::from_config(config), handler);
    let mut backoff = Backoff::default();

    loop {
        match client.connect().await {
            Ok(()) => {
                backoff.reset();
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {
                        log::info!("[Room] Interrupted, closing");
                        client.close().await;
                        return Ok(());
                    }
                    cause = done_rx.recv() => {
                        let cause = cause.unwrap_or(CloseCause::Requested);
                        if !reconnect {
                            if let CloseCause::Error(msg) = cause {
                                anyhow::bail!("Session ended: {msg}");
                            }
                            return Ok(());
                        }
                        log::warn!("[Room] Session ended ({cause}), reconnecting");
                    }
                }
            }
            Err(e @ LiveError::SessionInvalid(_)) => return Err(e.into()),
            Err(e) if !reconnect || !e.is_retryable() => return Err(e.into()),
            Err(e) => log::warn!("[Room] Connect failed: {e}"),
        }

        let delay = backoff.next_delay();
        log::info!("[Room] Retrying in {:.1}s", delay.as_secs_f64());
        tokio::select! {
            _ = tokio::signal::ctrl_c() => return Ok(()),
            () = tokio::time::sleep(delay) => {}
        }
    }
}
