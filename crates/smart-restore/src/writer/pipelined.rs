use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::core::{Catalog, Row, WriteBatch};
use crate::error::{RestoreError, Result};
use crate::progress::{ProgressTracker, RestoreSummary};
use crate::target::{TargetConnection, TargetConnector};

use super::{UpsertWriter, WriterCore};

/// Work handed to the write worker.
#[derive(Debug)]
enum WriteItem {
    Upsert(WriteBatch),
    /// No more work: commit and exit.
    Stop,
}

enum QueueSender {
    Bounded(mpsc::Sender<WriteItem>),
    Unbounded(mpsc::UnboundedSender<WriteItem>),
}

impl QueueSender {
    /// Enqueue `item`; waits for space when the queue is bounded.
    async fn send(&self, item: WriteItem) -> std::result::Result<(), WriteItem> {
        match self {
            QueueSender::Bounded(tx) => tx.send(item).await.map_err(|e| e.0),
            QueueSender::Unbounded(tx) => tx.send(item).map_err(|e| e.0),
        }
    }
}

enum QueueReceiver {
    Bounded(mpsc::Receiver<WriteItem>),
    Unbounded(mpsc::UnboundedReceiver<WriteItem>),
}

impl QueueReceiver {
    async fn recv(&mut self) -> Option<WriteItem> {
        match self {
            QueueReceiver::Bounded(rx) => rx.recv().await,
            QueueReceiver::Unbounded(rx) => rx.recv().await,
        }
    }
}

fn queue(capacity: Option<usize>) -> (QueueSender, QueueReceiver) {
    match capacity {
        Some(capacity) => {
            let (tx, rx) = mpsc::channel(capacity.max(1));
            (QueueSender::Bounded(tx), QueueReceiver::Bounded(rx))
        }
        None => {
            let (tx, rx) = mpsc::unbounded_channel();
            (QueueSender::Unbounded(tx), QueueReceiver::Unbounded(rx))
        }
    }
}

/// Hands writes to a single background worker over a FIFO queue.
///
/// The worker owns its own connection and one transaction spanning the
/// whole run, so nothing is visible in the target until `join` commits.
pub struct PipelinedWriter {
    core: WriterCore,
    queue: QueueSender,
    worker: Option<JoinHandle<Result<u64>>>,
}

impl PipelinedWriter {
    /// Spawn the worker. `queue_capacity` of `None` gives an unbounded queue.
    pub(crate) fn start(core: WriterCore, queue_capacity: Option<usize>) -> Self {
        let (tx, rx) = queue(queue_capacity);
        let worker = tokio::spawn(run_worker(
            Arc::clone(&core.connector),
            Arc::clone(&core.catalog),
            rx,
        ));
        debug!(
            "Started write worker (queue capacity: {})",
            queue_capacity.map_or_else(|| "unbounded".to_string(), |c| c.to_string())
        );

        Self {
            core,
            queue: tx,
            worker: Some(worker),
        }
    }

    /// Wait for the worker to exit and return its outcome.
    async fn wait_worker(&mut self) -> Result<u64> {
        let Some(handle) = self.worker.take() else {
            return Err(RestoreError::WriterStopped(
                "write worker already finished".to_string(),
            ));
        };
        match handle.await {
            Ok(result) => result,
            Err(e) => Err(RestoreError::WriterStopped(format!(
                "write worker panicked: {}",
                e
            ))),
        }
    }

    /// Send `item`, surfacing the worker's own error if it has gone away.
    async fn enqueue(&mut self, item: WriteItem) -> Result<()> {
        if self.queue.send(item).await.is_ok() {
            return Ok(());
        }
        match self.wait_worker().await {
            Err(e) => Err(e),
            Ok(_) => Err(RestoreError::WriterStopped(
                "write worker exited before the run finished".to_string(),
            )),
        }
    }
}

#[async_trait]
impl UpsertWriter for PipelinedWriter {
    async fn upsert_rows(&mut self, table: &str, rows: Vec<Row>) -> Result<()> {
        self.core.progress.update(table, rows.len());
        if rows.is_empty() {
            return Ok(());
        }
        self.enqueue(WriteItem::Upsert(WriteBatch::new(table, rows)))
            .await
    }

    async fn join(self: Box<Self>) -> Result<RestoreSummary> {
        let mut this = *self;
        this.enqueue(WriteItem::Stop).await?;
        let written = this.wait_worker().await?;
        info!("Write worker committed {} rows", written);

        let PipelinedWriter { core, .. } = this;
        core.finish().await
    }

    fn progress(&self) -> &ProgressTracker {
        &self.core.progress
    }
}

/// Drain the queue into one transaction; commit on `Stop`.
async fn run_worker(
    connector: Arc<dyn TargetConnector>,
    catalog: Arc<Catalog>,
    mut rx: QueueReceiver,
) -> Result<u64> {
    let mut conn = connector.connect().await?;
    conn.begin().await?;

    let mut written = 0;
    while let Some(item) = rx.recv().await {
        match item {
            WriteItem::Upsert(batch) => match apply(conn.as_mut(), &catalog, &batch).await {
                Ok(n) => written += n,
                Err(e) => {
                    abort(conn.as_mut()).await;
                    return Err(e);
                }
            },
            WriteItem::Stop => {
                conn.commit().await?;
                return Ok(written);
            }
        }
    }

    // Every sender is gone without a Stop: the run was abandoned.
    abort(conn.as_mut()).await;
    Err(RestoreError::WriterStopped(
        "write queue closed before stop".to_string(),
    ))
}

async fn apply(conn: &mut dyn TargetConnection, catalog: &Catalog, batch: &WriteBatch) -> Result<u64> {
    let table = catalog.table(&batch.table)?;
    conn.upsert(table, &batch.rows).await
}

async fn abort(conn: &mut dyn TargetConnection) {
    if let Err(e) = conn.rollback().await {
        warn!("Rollback of write transaction failed: {}", e);
    }
}
