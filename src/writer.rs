//! Dedicated writer task for outbound frames.
//!
//! Senders never touch the transport sink directly; they push frames into
//! a bounded mpsc channel drained by one task, which keeps outbound order
//! and lets synchronous callers (handlers) enqueue with `try_send`.
//!
//! ```text
//! send() ─┐
//! send() ─┼─► mpsc::Sender<Outbound> ─► Writer Task ─► Transport sink
//! close ──┘
//! ```

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use futures::SinkExt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::error::{Result, SyncError};
use crate::transport::{Outbound, OutboundSink};

/// Maximum frames fed to the sink before a flush.
const MAX_BATCH_SIZE: usize = 64;

/// Handle for sending frames to the writer task.
///
/// Cheap to clone.
#[derive(Clone)]
pub(crate) struct WriterHandle {
    tx: mpsc::Sender<Outbound>,
    pending: Arc<AtomicUsize>,
}

impl WriterHandle {
    /// Queue a frame, waiting for channel capacity.
    pub(crate) async fn send(&self, frame: Outbound) -> Result<()> {
        self.pending.fetch_add(1, Ordering::AcqRel);
        self.tx.send(frame).await.map_err(|_| {
            self.pending.fetch_sub(1, Ordering::Release);
            SyncError::ConnectionClosed
        })
    }

    /// Queue a frame without waiting.
    ///
    /// A full channel is reported as [`SyncError::Transport`]; the frame is
    /// not queued.
    pub(crate) fn try_send(&self, frame: Outbound) -> Result<()> {
        self.pending.fetch_add(1, Ordering::AcqRel);
        self.tx.try_send(frame).map_err(|e| {
            self.pending.fetch_sub(1, Ordering::Release);
            match e {
                mpsc::error::TrySendError::Full(_) => {
                    SyncError::Transport("outbound queue full".to_string())
                }
                mpsc::error::TrySendError::Closed(_) => SyncError::ConnectionClosed,
            }
        })
    }

    /// Frames queued but not yet handed to the sink.
    #[inline]
    pub(crate) fn pending_count(&self) -> usize {
        self.pending.load(Ordering::Acquire)
    }
}

/// Spawn the writer task and return a handle for sending frames.
pub(crate) fn spawn_writer_task(
    sink: OutboundSink,
    capacity: usize,
) -> (WriterHandle, JoinHandle<Result<()>>) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    let pending = Arc::new(AtomicUsize::new(0));

    let handle = WriterHandle {
        tx,
        pending: pending.clone(),
    };
    let task = tokio::spawn(writer_loop(rx, sink, pending));

    (handle, task)
}

/// Feed ready frames to the sink in batches, flushing once per batch.
///
/// Ends after writing a [`Outbound::Close`] frame or when every handle is dropped.
async fn writer_loop(
    mut rx: mpsc::Receiver<Outbound>,
    mut sink: OutboundSink,
    pending: Arc<AtomicUsize>,
) -> Result<()> {
    loop {
        let first = match rx.recv().await {
            Some(frame) => frame,
            None => break,
        };

        let mut batch = Vec::with_capacity(MAX_BATCH_SIZE);
        batch.push(first);
        while batch.len() < MAX_BATCH_SIZE {
            match rx.try_recv() {
                Ok(frame) => batch.push(frame),
                Err(_) => break,
            }
        }

        let batch_size = batch.len();
        let mut closing = false;
        for frame in batch {
            closing = matches!(frame, Outbound::Close);
            sink.feed(frame).await?;
            if closing {
                break;
            }
        }
        sink.flush().await?;
        pending.fetch_sub(batch_size, Ordering::Release);

        if closing {
            break;
        }
    }

    // Peer may already be gone.
    let _ = sink.close().await;
    Ok(())
}
