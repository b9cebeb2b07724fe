//! Best-effort, ordered offline writes.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use cmisync_model::{SinkError, TrackBatch, TrackSink};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::error::{OfflineError, OfflineResult};
use crate::store::OfflineStore;

/// Configuration of an [`OfflineWriteQueue`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueConfig {
    /// Batches that may wait before writes are refused.
    pub capacity: usize,
}

impl QueueConfig {
    /// Sets the capacity. Zero is raised to one.
    #[must_use]
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity.max(1);
        self
    }
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self { capacity: 64 }
    }
}

enum Message {
    Save(Box<TrackBatch>),
    Flush(oneshot::Sender<()>),
}

/// A bounded queue drained by one worker task, in FIFO order.
///
/// Enqueueing never waits: when the queue is full the batch is refused with
/// [`SinkError::QueueFull`] so a content callback is never blocked. Write
/// failures inside the worker are logged and counted.
#[derive(Debug, Clone)]
pub struct OfflineWriteQueue {
    tx: mpsc::Sender<Message>,
    failures: Arc<AtomicU64>,
}

impl OfflineWriteQueue {
    /// Starts the worker on the current Tokio runtime.
    ///
    /// The worker stops once every queue handle has been dropped and the
    /// remaining batches are written.
    pub fn spawn(store: Arc<OfflineStore>, config: QueueConfig) -> (Self, JoinHandle<()>) {
        let (tx, mut rx) = mpsc::channel(config.capacity.max(1));
        let failures = Arc::new(AtomicU64::new(0));
        let worker_failures = Arc::clone(&failures);

        let worker = tokio::spawn(async move {
            while let Some(message) = rx.recv().await {
                match message {
                    Message::Save(batch) => {
                        if let Err(err) = store.save_tracks(&batch) {
                            worker_failures.fetch_add(1, Ordering::Relaxed);
                            warn!(
                                scorm_id = batch.scorm_id,
                                attempt = batch.attempt,
                                error = %err,
                                "queued offline write failed"
                            );
                        }
                    }
                    Message::Flush(done) => {
                        if done.send(()).is_err() {
                            debug!("flush waiter went away before the queue drained");
                        }
                    }
                }
            }
            debug!("offline write queue stopped");
        });

        (Self { tx, failures }, worker)
    }

    /// Enqueues a batch.
    pub fn enqueue(&self, batch: TrackBatch) -> OfflineResult<()> {
        self.tx
            .try_send(Message::Save(Box::new(batch)))
            .map_err(|err| match err {
                mpsc::error::TrySendError::Full(_) => OfflineError::QueueFull,
                mpsc::error::TrySendError::Closed(_) => OfflineError::QueueClosed,
            })
    }

    /// Waits until every batch enqueued before this call has been written.
    pub async fn flush(&self) -> OfflineResult<()> {
        let (done, wait) = oneshot::channel();
        self.tx
            .send(Message::Flush(done))
            .await
            .map_err(|_| OfflineError::QueueClosed)?;
        wait.await.map_err(|_| OfflineError::QueueClosed)
    }

    /// Returns how many queued writes failed.
    pub fn failures(&self) -> u64 {
        self.failures.load(Ordering::Relaxed)
    }
}

impl TrackSink for OfflineWriteQueue {
    fn save_tracks(&self, batch: &TrackBatch) -> Result<(), SinkError> {
        self.enqueue(batch.clone()).map_err(|err| match err {
            OfflineError::QueueFull => SinkError::QueueFull,
            _ => SinkError::Closed,
        })
    }
}
