//! Reading rows from the source database.
//!
//! [`RowSource`] is the raw paged query; [`RowReader`] layers pagination,
//! run-wide deduplication and table exclusion on top of it. The reader is
//! owned by the single producer of a run and is never shared.

mod postgres;

pub use postgres::PgSource;

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::core::{Catalog, Row, RowIdentity, Table};
use crate::error::Result;
use crate::predicate::Predicate;

/// Default number of rows fetched per page.
pub const DEFAULT_PAGE_SIZE: usize = 1000;

/// A paged query against one table.
#[async_trait]
pub trait RowSource: Send + Sync {
    /// Fetch at most `limit` rows of `table` matching `predicate`, skipping the
    /// first `offset`.
    async fn fetch_page(
        &self,
        table: &Table,
        predicate: &Predicate,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Row>>;
}

/// Cursor over one `stream` request.
///
/// Streams are driven through [`RowReader::next_row`] /
/// [`RowReader::next_batch`] so that every stream of a run shares the
/// reader's dedup set.
#[derive(Debug)]
pub struct RowStream {
    table: Arc<Table>,
    predicate: Predicate,
    offset: usize,
    page: VecDeque<Row>,
    exhausted: bool,
}

impl RowStream {
    pub fn table(&self) -> &Arc<Table> {
        &self.table
    }
}

/// Paginating, deduplicating reader over a [`RowSource`].
pub struct RowReader {
    source: Arc<dyn RowSource>,
    catalog: Arc<Catalog>,
    seen: HashSet<RowIdentity>,
    exclude_tables: HashSet<String>,
    page_size: usize,
}

impl RowReader {
    pub fn new(
        source: Arc<dyn RowSource>,
        catalog: Arc<Catalog>,
        exclude_tables: impl IntoIterator<Item = String>,
        page_size: usize,
    ) -> Self {
        Self {
            source,
            catalog,
            seen: HashSet::new(),
            exclude_tables: exclude_tables.into_iter().collect(),
            page_size: page_size.max(1),
        }
    }

    pub fn catalog(&self) -> &Arc<Catalog> {
        &self.catalog
    }

    pub fn is_excluded(&self, table: &str) -> bool {
        self.exclude_tables.contains(table)
    }

    /// Number of distinct rows yielded so far.
    pub fn seen_count(&self) -> usize {
        self.seen.len()
    }

    /// Start streaming `table` under `predicate`.
    ///
    /// Excluded tables produce an empty stream without touching the source.
    /// Unknown tables are an error.
    pub fn stream(&self, table: &str, predicate: Predicate) -> Result<RowStream> {
        let table = Arc::clone(self.catalog.table(table)?);

        let exhausted = if self.is_excluded(&table.name) {
            warn!("Skipping read of excluded table {}", table.name);
            true
        } else {
            predicate.is_empty()
        };

        Ok(RowStream {
            table,
            predicate,
            offset: 0,
            page: VecDeque::new(),
            exhausted,
        })
    }

    /// Next row of `stream` not yet yielded anywhere in this run.
    pub async fn next_row(&mut self, stream: &mut RowStream) -> Result<Option<Row>> {
        loop {
            while let Some(row) = stream.page.pop_front() {
                let identity = RowIdentity::of(&stream.table.name, &stream.table.primary_key, &row);
                if self.seen.insert(identity) {
                    return Ok(Some(row));
                }
            }

            if stream.exhausted {
                return Ok(None);
            }

            let page = self
                .source
                .fetch_page(&stream.table, &stream.predicate, self.page_size, stream.offset)
                .await?;
            debug!(
                "Read {} rows from {} at offset {} where {}",
                page.len(),
                stream.table.name,
                stream.offset,
                stream.predicate
            );

            if page.is_empty() {
                stream.exhausted = true;
            } else {
                stream.offset += self.page_size;
                stream.page.extend(page);
            }
        }
    }

    /// Up to `max` unseen rows of `stream`; empty once the stream is done.
    pub async fn next_batch(&mut self, stream: &mut RowStream, max: usize) -> Result<Vec<Row>> {
        let mut batch = Vec::with_capacity(max.min(self.page_size));
        while batch.len() < max {
            match self.next_row(stream).await? {
                Some(row) => batch.push(row),
                None => break,
            }
        }
        Ok(batch)
    }

    /// Every unseen row of `table` matching `predicate`.
    pub async fn select_all(&mut self, table: &str, predicate: Predicate) -> Result<Vec<Row>> {
        let mut stream = self.stream(table, predicate)?;
        let mut rows = Vec::new();
        while let Some(row) = self.next_row(&mut stream).await? {
            rows.push(row);
        }
        Ok(rows)
    }
}
