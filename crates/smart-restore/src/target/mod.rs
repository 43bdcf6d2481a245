//! Writing rows to the target database.
//!
//! The writers in [`crate::writer`] only decide *when* work happens; the
//! statements themselves go through these traits so the scheduling can be
//! exercised against an in-memory store.

mod postgres;

pub use postgres::{build_upsert_sql, PgTarget, PgTargetConnection, MAX_BIND_PARAMS};

use async_trait::async_trait;

use crate::core::{Row, Table};
use crate::error::Result;

/// Hands out target connections.
#[async_trait]
pub trait TargetConnector: Send + Sync {
    async fn connect(&self) -> Result<Box<dyn TargetConnection>>;
}

/// One exclusive target connection.
///
/// Outside of `begin`/`commit` every statement autocommits.
#[async_trait]
pub trait TargetConnection: Send {
    async fn begin(&mut self) -> Result<()>;

    async fn commit(&mut self) -> Result<()>;

    async fn rollback(&mut self) -> Result<()>;

    /// Insert `rows`; on primary-key conflict overwrite every non-key column,
    /// or ignore the row when the key covers every written column.
    ///
    /// Returns the number of rows inserted or updated.
    async fn upsert(&mut self, table: &Table, rows: &[Row]) -> Result<u64>;

    /// Sequence owned by an identity or serial column, if any.
    async fn serial_sequence(&mut self, table: &Table, column: &str) -> Result<Option<String>>;

    /// Advance `sequence` to `MAX(column)` of `table`; returns the new value,
    /// `None` when the table is empty.
    async fn reset_sequence(
        &mut self,
        table: &Table,
        column: &str,
        sequence: &str,
    ) -> Result<Option<i64>>;
}
