//! The copy orchestrator: reads, resolves ancestors, writes, fans out.
//!
//! One [`Restorer`] drives one run. It owns the reader (and with it the
//! run-wide dedup set) and the writer; all reads and resolution happen
//! sequentially on the caller's task, one batch at a time.

mod resolver;

pub use resolver::resolve_ancestors;

use std::sync::Arc;

use futures::future::{BoxFuture, FutureExt};
use tracing::{debug, info};

use crate::catalog::load_catalog;
use crate::config::RestoreConfig;
use crate::connection::ConnectionSpec;
use crate::core::{FanoutSet, Row, Table};
use crate::error::{RestoreError, Result};
use crate::predicate::{Predicate, TableExpr};
use crate::progress::{ProgressTracker, RestoreSummary};
use crate::source::{PgSource, RowReader};
use crate::target::PgTarget;
use crate::writer::{build_writer, UpsertWriter};

/// Default number of rows per copy batch.
pub const DEFAULT_BATCH_SIZE: usize = 100;

/// Pool sizes per side.
const SOURCE_POOL_SIZE: usize = 2;
const TARGET_POOL_SIZE: usize = 4;

/// Copies rows plus their dependencies from source to target.
pub struct Restorer {
    reader: RowReader,
    writer: Box<dyn UpsertWriter>,
    batch_size: usize,
}

impl Restorer {
    pub fn new(reader: RowReader, writer: Box<dyn UpsertWriter>, batch_size: usize) -> Self {
        Self {
            reader,
            writer,
            batch_size: batch_size.max(1),
        }
    }

    /// Connect to both databases, load their catalogs and build the
    /// reader and writer described by `config`.
    pub async fn connect(config: &RestoreConfig) -> Result<Self> {
        let source_spec = ConnectionSpec::parse(&config.source)?;
        let target_spec = ConnectionSpec::parse(&config.target)?;

        let source_pool = source_spec.pool(SOURCE_POOL_SIZE, "source").await?;
        let target_pool = target_spec.pool(TARGET_POOL_SIZE, "target").await?;

        let cache = config.metadata_cache();
        let source_catalog = {
            let client = source_pool
                .get()
                .await
                .map_err(|e| RestoreError::pool(e, "loading source metadata"))?;
            load_catalog(&client, &config.schema, cache.as_ref(), "source").await?
        };
        let target_catalog = {
            let client = target_pool
                .get()
                .await
                .map_err(|e| RestoreError::pool(e, "loading target metadata"))?;
            load_catalog(&client, &config.schema, cache.as_ref(), "target").await?
        };
        info!(
            "Loaded metadata: {} source tables, {} target tables",
            source_catalog.len(),
            target_catalog.len()
        );

        let reader = RowReader::new(
            Arc::new(PgSource::new(source_pool)),
            Arc::new(source_catalog),
            config.exclude_tables.iter().cloned(),
            config.page_size,
        );
        let writer = build_writer(
            config.writer_mode(),
            Arc::new(target_catalog),
            Arc::new(PgTarget::new(target_pool)),
            ProgressTracker::new(config.progress),
        );

        Ok(Self::new(reader, writer, config.batch_size))
    }

    pub fn reader(&self) -> &RowReader {
        &self.reader
    }

    pub fn progress(&self) -> &ProgressTracker {
        self.writer.progress()
    }

    /// Copy every expression in order, then wait for the writer and return
    /// the run summary.
    pub async fn run(mut self, exprs: &[TableExpr], fanout: &FanoutSet) -> Result<RestoreSummary> {
        for expr in exprs {
            info!("Copying {}", expr);
            self.copy(&expr.table, expr.predicate.clone(), fanout).await?;
        }
        info!("Read {} distinct rows from source", self.reader.seen_count());
        self.finish().await
    }

    /// Flush the writer, repair sequences and summarize.
    pub async fn finish(self) -> Result<RestoreSummary> {
        self.writer.join().await
    }

    /// Copy rows of `table` matching `predicate`, their ancestors, and the
    /// rows of `fanout` tables that reference any of them.
    pub fn copy<'a>(
        &'a mut self,
        table: &'a str,
        predicate: Predicate,
        fanout: &'a FanoutSet,
    ) -> BoxFuture<'a, Result<()>> {
        async move {
            let mut stream = self.reader.stream(table, predicate)?;
            let table = Arc::clone(stream.table());

            loop {
                let batch = self.reader.next_batch(&mut stream, self.batch_size).await?;
                if batch.is_empty() {
                    break;
                }
                debug!("Copying batch of {} rows from {}", batch.len(), table.name);

                let ancestors = resolve_ancestors(&mut self.reader, &table, &batch).await?;

                for plan in &ancestors {
                    self.writer
                        .upsert_rows(&plan.table, plan.rows.clone())
                        .await?;
                }
                self.writer
                    .upsert_rows(&table.name, batch.clone())
                    .await?;

                for plan in &ancestors {
                    let ancestor = Arc::clone(self.reader.catalog().table(&plan.table)?);
                    self.fanout(&ancestor, &plan.rows, fanout).await?;
                }
                self.fanout(&table, &batch, fanout).await?;
            }

            Ok(())
        }
        .boxed()
    }

    /// Copy rows of `fanout` tables that reference `rows` of `table`.
    ///
    /// Each recursive copy gets `fanout` minus the table it targets, so a
    /// table is fanned into at most once along one branch. Sibling branches
    /// keep their own sets.
    fn fanout<'a>(
        &'a mut self,
        table: &'a Table,
        rows: &'a [Row],
        fanout: &'a FanoutSet,
    ) -> BoxFuture<'a, Result<()>> {
        async move {
            if rows.is_empty() || fanout.is_empty() {
                return Ok(());
            }

            let groups = self.reader.catalog().referencing_groups(&table.name);
            for group in groups {
                if !fanout.contains(&group.table) {
                    continue;
                }

                let predicate = Predicate::matching(&group.columns, rows);
                if predicate.is_empty() {
                    continue;
                }

                debug!(
                    "Fanning out {} -> {} via {}",
                    table.name, group.table, group.constraint
                );
                let branch = fanout.without(&group.table);
                self.copy(&group.table, predicate, &branch).await?;
            }

            Ok(())
        }
        .boxed()
    }
}
