//! Background batching of soft deletes.
//!
//! Callers push ids onto a bounded [`DeleteQueue`]. A single [`DeleteWorker`]
//! task waits for the first queued id, drains whatever else is already
//! queued, and hands the batch to a [`DeleteSink`] in one call.
//!
//! The queue is bounded: once it is full, `enqueue` waits for the worker. A
//! batch the sink fails to apply is logged and dropped.

use async_trait::async_trait;
use burrow_core::{LinkId, Result, StorageError};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use typed_builder::TypedBuilder;

/// Applies a batch of soft deletes.
#[async_trait]
pub trait DeleteSink: Send + Sync + 'static {
    async fn apply(&self, batch: &[LinkId]) -> Result<()>;
}

#[derive(Debug, Clone, TypedBuilder)]
pub struct DeleteWorkerSettings {
    /// Maximum number of ids waiting in the queue.
    #[builder(default = 1024)]
    pub queue_capacity: usize,
    /// Maximum number of ids handed to the sink in one call.
    #[builder(default = 256)]
    pub max_batch: usize,
}

impl Default for DeleteWorkerSettings {
    fn default() -> Self {
        Self::builder().build()
    }
}

/// Producer side of the delete pipeline.
#[derive(Debug, Clone)]
pub struct DeleteQueue {
    tx: mpsc::Sender<LinkId>,
}

impl DeleteQueue {
    /// Queues an id for deletion, waiting while the queue is full.
    pub async fn enqueue(&self, id: LinkId) -> Result<()> {
        self.tx
            .send(id)
            .await
            .map_err(|_| StorageError::Unavailable("delete worker has stopped".to_string()))
    }
}

/// Handle to the background delete task.
#[derive(Debug)]
pub struct DeleteWorker {
    shutdown: Option<oneshot::Sender<()>>,
    handle: JoinHandle<()>,
}

impl DeleteWorker {
    /// Spawns the worker on the current tokio runtime.
    pub fn spawn<S: DeleteSink>(sink: S, settings: DeleteWorkerSettings) -> (DeleteQueue, Self) {
        let (tx, rx) = mpsc::channel(settings.queue_capacity.max(1));
        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        let handle = tokio::spawn(run(sink, rx, shutdown_rx, settings.max_batch.max(1)));

        (
            DeleteQueue { tx },
            Self {
                shutdown: Some(shutdown_tx),
                handle,
            },
        )
    }

    /// Stops accepting new ids, applies everything still queued and waits
    /// for the task to finish.
    pub async fn shutdown(mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        if let Err(e) = (&mut self.handle).await {
            warn!(error = %e, "delete worker task failed");
        }
    }
}

async fn run<S: DeleteSink>(
    sink: S,
    mut rx: mpsc::Receiver<LinkId>,
    mut shutdown: oneshot::Receiver<()>,
    max_batch: usize,
) {
    debug!(max_batch, "delete worker started");
    let mut closing = false;

    loop {
        tokio::select! {
            received = rx.recv() => match received {
                Some(first) => flush(&sink, &mut rx, first, max_batch).await,
                None => break,
            },
            _ = &mut shutdown, if !closing => {
                // Queued ids are still delivered by `recv` after `close`.
                closing = true;
                rx.close();
            }
        }
    }

    info!("delete worker stopped");
}

async fn flush<S: DeleteSink>(
    sink: &S,
    rx: &mut mpsc::Receiver<LinkId>,
    first: LinkId,
    max_batch: usize,
) {
    let mut batch = vec![first];
    while batch.len() < max_batch {
        match rx.try_recv() {
            Ok(id) => batch.push(id),
            Err(_) => break,
        }
    }

    match sink.apply(&batch).await {
        Ok(()) => debug!(count = batch.len(), "applied delete batch"),
        Err(e) => warn!(
            count = batch.len(),
            error = %e,
            "failed to apply delete batch, discarding it"
        ),
    }
}
