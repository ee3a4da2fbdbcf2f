//! Periodic keepalive for an open room session.
//!
//! The first heartbeat goes out one full interval after the session is
//! established, then one per interval until [`Heartbeat::stop`] is called.
//! A failed send is reported on the fault channel and ends the schedule; the
//! session decides what happens next. A zero interval falls back to
//! [`HEARTBEAT_INTERVAL`].

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

use super::outbound::FrameSink;
use crate::constants::{now_millis, HEARTBEAT_INTERVAL, HEARTBEAT_STOP_TIMEOUT};
use crate::error::LiveError;
use crate::protocol::encode_envelope;
use crate::protocol::handshake::build_heartbeat;

/// Handle to a running heartbeat task.
#[derive(Debug)]
pub struct Heartbeat {
    shutdown_tx: Option<oneshot::Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl Heartbeat {
    /// Start sending heartbeats through `sink` every `interval`.
    pub fn start(
        sink: Arc<dyn FrameSink>,
        interval: Duration,
        fault_tx: mpsc::UnboundedSender<LiveError>,
    ) -> Self {
        let interval = if interval.is_zero() {
            log::warn!("[Heartbeat] Zero interval, using {HEARTBEAT_INTERVAL:?}");
            HEARTBEAT_INTERVAL
        } else {
            interval
        };
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let handle = tokio::spawn(run(sink, interval, fault_tx, shutdown_rx));
        Self {
            shutdown_tx: Some(shutdown_tx),
            handle: Some(handle),
        }
    }

    /// Stop the schedule. No heartbeat is sent once this returns.
    ///
    /// A send still waiting on the writer is abandoned. The task is aborted
    /// if it has not exited within [`HEARTBEAT_STOP_TIMEOUT`].
    pub async fn stop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(mut handle) = self.handle.take() {
            if tokio::time::timeout(HEARTBEAT_STOP_TIMEOUT, &mut handle)
                .await
                .is_err()
            {
                log::warn!("[Heartbeat] Task did not stop, aborting");
                handle.abort();
            }
        }
    }

    /// Resolve once the task has ended without being stopped, with the
    /// reason. Pending forever after [`stop`](Self::stop).
    pub async fn exited(&mut self) -> String {
        let Some(handle) = self.handle.as_mut() else {
            return std::future::pending().await;
        };
        let result = handle.await;
        self.handle = None;
        match result {
            Ok(()) => "heartbeat stopped".to_string(),
            Err(e) => format!("heartbeat task failed: {e}"),
        }
    }
}

impl Drop for Heartbeat {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

async fn run(
    sink: Arc<dyn FrameSink>,
    period: Duration,
    fault_tx: mpsc::UnboundedSender<LiveError>,
    mut shutdown_rx: oneshot::Receiver<()>,
) {
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;

            _ = &mut shutdown_rx => {
                log::debug!("[Heartbeat] Stopped");
                return;
            }

            _ = ticker.tick() => {
                let timestamp = now_millis();
                let frame = match build_heartbeat(timestamp).and_then(|env| encode_envelope(&env)) {
                    Ok(frame) => frame,
                    Err(e) => {
                        log::warn!("[Heartbeat] Encode failed: {e}");
                        let _ = fault_tx.send(e.into());
                        return;
                    }
                };
                let sent = tokio::select! {
                    biased;
                    _ = &mut shutdown_rx => {
                        log::debug!("[Heartbeat] Stopped with a send pending");
                        return;
                    }
                    sent = sink.send_frame(frame) => sent,
                };
                if let Err(e) = sent {
                    log::warn!("[Heartbeat] Send failed: {e}");
                    let _ = fault_tx.send(e);
                    return;
                }
                log::trace!("[Heartbeat] Sent ({timestamp})");
            }
        }
    }
}
