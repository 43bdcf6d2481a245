//! Upsert writers.
//!
//! Two schedulings of the same contract:
//!
//! - [`InlineWriter`]: each `upsert_rows` call runs in its own transaction
//!   and returns once it is committed.
//! - [`PipelinedWriter`]: calls enqueue onto a FIFO channel drained by one
//!   worker task that holds a single transaction for the whole run and
//!   commits it at `join`.
//!
//! Both update the progress counters on every call, and both repair the
//! sequences of every written table once all writes are done.

mod inline;
mod pipelined;
mod sequences;

pub use inline::InlineWriter;
pub use pipelined::PipelinedWriter;
pub use sequences::repair_sequences;

use std::sync::Arc;

use async_trait::async_trait;

use crate::core::{Catalog, Row};
use crate::error::Result;
use crate::progress::{ProgressTracker, RestoreSummary};
use crate::target::TargetConnector;

/// Writer scheduling, chosen at construction time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriterMode {
    /// Synchronous, one transaction per call.
    Inline,
    /// Background worker; `None` capacity means an unbounded queue.
    Pipelined { queue_capacity: Option<usize> },
}

/// Applies rows to the target.
#[async_trait]
pub trait UpsertWriter: Send {
    /// Upsert `rows` into `table`. An empty `rows` only touches the counters.
    async fn upsert_rows(&mut self, table: &str, rows: Vec<Row>) -> Result<()>;

    /// Wait for every write submitted so far, repair sequences and return
    /// the run summary.
    async fn join(self: Box<Self>) -> Result<RestoreSummary>;

    fn progress(&self) -> &ProgressTracker;
}

/// State shared by both writer variants.
pub(crate) struct WriterCore {
    pub(crate) catalog: Arc<Catalog>,
    pub(crate) connector: Arc<dyn TargetConnector>,
    pub(crate) progress: ProgressTracker,
}

impl WriterCore {
    /// Repair sequences of every dirty table and summarize. Must only run
    /// after every write has landed.
    pub(crate) async fn finish(self) -> Result<RestoreSummary> {
        let dirty = self.progress.dirty_tables();
        let repaired = repair_sequences(self.connector.as_ref(), &self.catalog, &dirty).await?;
        Ok(self.progress.summary(repaired))
    }
}

/// Build the writer for `mode`.
///
/// The pipelined worker is spawned immediately, so this must be called from
/// inside a tokio runtime.
pub fn build_writer(
    mode: WriterMode,
    catalog: Arc<Catalog>,
    connector: Arc<dyn TargetConnector>,
    progress: ProgressTracker,
) -> Box<dyn UpsertWriter> {
    let core = WriterCore {
        catalog,
        connector,
        progress,
    };
    match mode {
        WriterMode::Inline => Box::new(InlineWriter::new(core)),
        WriterMode::Pipelined { queue_capacity } => {
            Box::new(PipelinedWriter::start(core, queue_capacity))
        }
    }
}
