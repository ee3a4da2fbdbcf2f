//! Serialized writes to the room socket.
//!
//! The heartbeat task and caller-issued sends share one socket. Instead of
//! locking the write half, every write goes through a bounded queue drained
//! by a single writer task, so frames never interleave.
//!
//! ```text
//! Heartbeat ──┐
//! RoomClient ─┼──> OutboundQueue (mpsc) ──> writer task ──> SocketWriter
//! session ────┘  (pong / close)
//! ```

use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::constants::OUTBOUND_QUEUE_CAPACITY;
use crate::error::LiveError;
use crate::ws::SocketWriter;

/// Destination for encoded frames.
#[async_trait]
pub trait FrameSink: Send + Sync {
    /// Write one encoded frame, resolving once the socket accepted it.
    async fn send_frame(&self, bytes: Vec<u8>) -> Result<(), LiveError>;
}

/// Work item for the writer task.
#[derive(Debug)]
enum Outbound {
    Frame {
        bytes: Vec<u8>,
        done: oneshot::Sender<Result<(), LiveError>>,
    },
    Pong(Vec<u8>),
    Close,
}

/// Cloneable handle feeding the writer task.
#[derive(Debug, Clone)]
pub struct OutboundQueue {
    tx: mpsc::Sender<Outbound>,
}

impl OutboundQueue {
    /// Start the writer task that owns `writer`.
    ///
    /// Write failures are reported once on `fault_tx`; the task then exits
    /// and every later send fails with [`LiveError::NotConnected`].
    pub fn spawn(
        writer: SocketWriter,
        fault_tx: mpsc::UnboundedSender<LiveError>,
    ) -> (Self, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(OUTBOUND_QUEUE_CAPACITY);
        let handle = tokio::spawn(run_writer(writer, rx, fault_tx));
        (Self { tx }, handle)
    }

    /// Queue a pong reply.
    pub async fn pong(&self, data: Vec<u8>) {
        if self.tx.send(Outbound::Pong(data)).await.is_err() {
            log::debug!("[Outbound] Writer gone, pong dropped");
        }
    }

    /// Ask the writer to send a close frame and stop.
    pub async fn close(&self) {
        if self.tx.send(Outbound::Close).await.is_err() {
            log::debug!("[Outbound] Writer already stopped");
        }
    }
}

#[async_trait]
impl FrameSink for OutboundQueue {
    async fn send_frame(&self, bytes: Vec<u8>) -> Result<(), LiveError> {
        let (done, done_rx) = oneshot::channel();
        self.tx
            .send(Outbound::Frame { bytes, done })
            .await
            .map_err(|_| LiveError::NotConnected)?;
        done_rx.await.map_err(|_| LiveError::NotConnected)?
    }
}

async fn run_writer(
    mut writer: SocketWriter,
    mut rx: mpsc::Receiver<Outbound>,
    fault_tx: mpsc::UnboundedSender<LiveError>,
) {
    while let Some(item) = rx.recv().await {
        match item {
            Outbound::Frame { bytes, done } => {
                let len = bytes.len();
                match writer.binary(bytes).await {
                    Ok(()) => {
                        log::trace!("[Outbound] Wrote {len} bytes");
                        let _ = done.send(Ok(()));
                    }
                    Err(e) => {
                        let err = LiveError::Transport(format!("{e:#}"));
                        log::warn!("[Outbound] Write failed: {err}");
                        let _ = done.send(Err(err.clone()));
                        let _ = fault_tx.send(err);
                        return;
                    }
                }
            }
            Outbound::Pong(data) => {
                if let Err(e) = writer.pong(data).await {
                    let _ = fault_tx.send(LiveError::Transport(format!("{e:#}")));
                    return;
                }
            }
            Outbound::Close => {
                if let Err(e) = writer.shutdown().await {
                    log::debug!("[Outbound] {e:#}");
                }
                return;
            }
        }
    }
    // Every queue handle dropped without an explicit close.
    let _ = writer.shutdown().await;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_send_after_writer_gone_is_not_connected() {
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        let queue = OutboundQueue { tx };
        assert_eq!(
            queue.send_frame(vec![1, 2]).await,
            Err(LiveError::NotConnected)
        );
    }

    #[tokio::test]
    async fn test_dropped_completion_is_not_connected() {
        let (tx, mut rx) = mpsc::channel(1);
        let queue = OutboundQueue { tx };
        tokio::spawn(async move {
            // Accept the item but never report completion.
            let item = rx.recv().await;
            drop(item);
        });
        assert_eq!(
            queue.send_frame(vec![1, 2]).await,
            Err(LiveError::NotConnected)
        );
    }
}
