use async_trait::async_trait;
use tracing::warn;

use crate::core::Row;
use crate::error::{RestoreError, Result};
use crate::progress::{ProgressTracker, RestoreSummary};
use crate::target::TargetConnection;

use super::{UpsertWriter, WriterCore};

/// Writes on the caller's task, one committed transaction per call.
pub struct InlineWriter {
    core: WriterCore,
    conn: Option<Box<dyn TargetConnection>>,
}

impl InlineWriter {
    pub(crate) fn new(core: WriterCore) -> Self {
        Self { core, conn: None }
    }
}

#[async_trait]
impl UpsertWriter for InlineWriter {
    async fn upsert_rows(&mut self, table: &str, rows: Vec<Row>) -> Result<()> {
        self.core.progress.update(table, rows.len());
        if rows.is_empty() {
            return Ok(());
        }

        let table = self.core.catalog.table(table)?.clone();
        if self.conn.is_none() {
            self.conn = Some(self.core.connector.connect().await?);
        }
        let Some(conn) = self.conn.as_mut() else {
            return Err(RestoreError::WriterStopped("no target connection".into()));
        };

        conn.begin().await?;
        match conn.upsert(&table, &rows).await {
            Ok(_) => conn.commit().await,
            Err(e) => {
                if let Err(rollback_err) = conn.rollback().await {
                    warn!("Rollback after failed write to {} failed: {}", table.name, rollback_err);
                }
                Err(e)
            }
        }
    }

    async fn join(self: Box<Self>) -> Result<RestoreSummary> {
        // Every write is already committed.
        let InlineWriter { core, conn } = *self;
        drop(conn);
        core.finish().await
    }

    fn progress(&self) -> &ProgressTracker {
        &self.core.progress
    }
}
