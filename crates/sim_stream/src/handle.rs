//! Stream handles and the silence watchdog.
//!
//! A transport implementation creates a pair with [`StreamHandle::channel`],
//! keeps the [`StreamSender`] in its connection task and returns the handle to
//! the caller. The handle owns the watchdog and the terminal-event
//! bookkeeping, so every implementation gets the same guarantees.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::{CancellationToken, WaitForCancellationFuture};
use uuid::Uuid;

use crate::error::TransportError;
use crate::event::StreamEvent;

pub const DEFAULT_SILENCE_TIMEOUT: Duration = Duration::from_secs(60);

const STREAM_EVENT_CHANNEL_CAPACITY: usize = 256;

type Delivery = Result<StreamEvent, TransportError>;

/// Producer side of a stream, held by the connection task.
#[derive(Debug, Clone)]
pub struct StreamSender {
    tx: mpsc::Sender<Delivery>,
    cancel: CancellationToken,
}

impl StreamSender {
    /// Deliver an event. Returns `false` once the handle is gone or closed.
    pub async fn send(&self, event: StreamEvent) -> bool {
        self.tx.send(Ok(event)).await.is_ok()
    }

    pub async fn fail(&self, error: TransportError) -> bool {
        self.tx.send(Err(error)).await.is_ok()
    }

    /// Resolves when the consumer closes the handle.
    pub fn cancelled(&self) -> WaitForCancellationFuture<'_> {
        self.cancel.cancelled()
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

/// Consumer side of one open stream.
#[derive(Debug)]
pub struct StreamHandle {
    id: Uuid,
    events: mpsc::Receiver<Delivery>,
    cancel: CancellationToken,
    silence_timeout: Duration,
    deadline: Instant,
    finished: bool,
}

impl StreamHandle {
    pub fn channel(silence_timeout: Duration) -> (StreamSender, StreamHandle) {
        let (tx, rx) = mpsc::channel(STREAM_EVENT_CHANNEL_CAPACITY);
        let cancel = CancellationToken::new();

        let sender = StreamSender {
            tx,
            cancel: cancel.clone(),
        };
        let handle = StreamHandle {
            id: Uuid::new_v4(),
            events: rx,
            cancel,
            silence_timeout,
            deadline: Instant::now() + silence_timeout,
            finished: false,
        };

        (sender, handle)
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Next event in arrival order.
    ///
    /// Yields at most one terminal item (`Done`, `SessionEnd` or an error)
    /// and `None` forever after. Silence longer than the timeout, or a
    /// producer that disappears without a terminal event, is reported as an
    /// error. Cancel-safe: dropping the future loses no event and keeps the
    /// watchdog deadline.
    pub async fn recv(&mut self) -> Option<Delivery> {
        if self.finished {
            return None;
        }

        let delivery = match tokio::time::timeout_at(self.deadline, self.events.recv()).await {
            Ok(Some(Ok(event))) => {
                if event.is_terminal() {
                    self.finish();
                } else {
                    self.deadline = Instant::now() + self.silence_timeout;
                }
                Ok(event)
            }
            Ok(Some(Err(error))) => {
                self.finish();
                Err(error)
            }
            Ok(None) => {
                self.finish();
                Err(TransportError::ClosedUnexpectedly)
            }
            Err(_elapsed) => {
                log::warn!(
                    "Stream {} silent for {:?}, closing",
                    self.id,
                    self.silence_timeout
                );
                self.finish();
                Err(TransportError::Timeout(self.silence_timeout))
            }
        };

        Some(delivery)
    }

    /// Close the stream. Safe to call any number of times, before or after
    /// natural termination.
    pub fn close(&mut self) {
        if !self.finished {
            log::debug!("Stream {} closed by consumer", self.id);
        }
        self.finish();
    }

    fn finish(&mut self) {
        self.finished = true;
        self.cancel.cancel();
        self.events.close();
    }
}

impl Drop for StreamHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
