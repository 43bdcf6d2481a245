//! PostgreSQL target: `INSERT ... ON CONFLICT` upserts and sequence repair.

use async_trait::async_trait;
use deadpool_postgres::{Object, Pool};
use tokio_postgres::types::ToSql;
use tracing::debug;

use crate::core::identifier::{qualify, quote_ident};
use crate::core::{Row, Table};
use crate::error::{RestoreError, Result};

use super::{TargetConnection, TargetConnector};

/// PostgreSQL limit on bind parameters per statement.
pub const MAX_BIND_PARAMS: usize = 65535;

/// Target connector backed by a deadpool pool.
pub struct PgTarget {
    pool: Pool,
}

impl PgTarget {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TargetConnector for PgTarget {
    async fn connect(&self) -> Result<Box<dyn TargetConnection>> {
        let client = self
            .pool
            .get()
            .await
            .map_err(|e| RestoreError::pool(e, "getting target connection"))?;
        Ok(Box::new(PgTargetConnection { client }))
    }
}

/// A pooled target connection.
pub struct PgTargetConnection {
    client: Object,
}

/// Build one upsert statement for `rows`, binding every value as text.
///
/// `columns` are the columns written, in order; each placeholder is cast
/// to the column's type without its modifier, so length and precision are
/// checked on assignment instead of silently applied by the cast.
pub fn build_upsert_sql(table: &Table, columns: &[&str], rows: &[Row]) -> (String, Vec<Option<String>>) {
    let col_list: Vec<String> = columns.iter().map(|c| quote_ident(c)).collect();
    let casts: Vec<String> = columns
        .iter()
        .map(|c| {
            table
                .column(c)
                .map(|col| format!("::text::{}", col.base_type()))
                .unwrap_or_default()
        })
        .collect();

    // GENERATED ALWAYS identity columns reject explicit values otherwise.
    let overriding = if columns
        .iter()
        .any(|c| table.column(c).is_some_and(|col| col.is_identity))
    {
        " OVERRIDING SYSTEM VALUE"
    } else {
        ""
    };

    let mut placeholders = Vec::with_capacity(rows.len());
    let mut params = Vec::with_capacity(rows.len() * columns.len());
    let mut idx = 1;

    for row in rows {
        let mut row_placeholders = Vec::with_capacity(columns.len());
        for (col, cast) in columns.iter().zip(&casts) {
            row_placeholders.push(format!("${}{}", idx, cast));
            idx += 1;
            params.push(row.get(col).and_then(|v| v.to_text_param()));
        }
        placeholders.push(format!("({})", row_placeholders.join(", ")));
    }

    let pk_list: Vec<String> = table.primary_key.iter().map(|c| quote_ident(c)).collect();

    // Build UPDATE SET clause (exclude PK columns)
    let update_cols: Vec<String> = columns
        .iter()
        .filter(|c| !table.is_pk_column(c))
        .map(|c| format!("{} = EXCLUDED.{}", quote_ident(c), quote_ident(c)))
        .collect();

    let conflict = if update_cols.is_empty() {
        "DO NOTHING".to_string()
    } else {
        format!("DO UPDATE SET {}", update_cols.join(", "))
    };

    let sql = format!(
        "INSERT INTO {} ({}){} VALUES {} ON CONFLICT ({}) {}",
        qualify(&table.schema, &table.name),
        col_list.join(", "),
        overriding,
        placeholders.join(", "),
        pk_list.join(", "),
        conflict
    );

    (sql, params)
}

/// Columns of `table` present in `row` that can be written.
fn written_columns<'a>(table: &'a Table, row: &Row) -> Vec<&'a str> {
    table
        .writable_columns()
        .filter(|c| row.get(&c.name).is_some())
        .map(|c| c.name.as_str())
        .collect()
}

#[async_trait]
impl TargetConnection for PgTargetConnection {
    async fn begin(&mut self) -> Result<()> {
        self.client.batch_execute("BEGIN").await?;
        Ok(())
    }

    async fn commit(&mut self) -> Result<()> {
        self.client.batch_execute("COMMIT").await?;
        Ok(())
    }

    async fn rollback(&mut self) -> Result<()> {
        self.client.batch_execute("ROLLBACK").await?;
        Ok(())
    }

    async fn upsert(&mut self, table: &Table, rows: &[Row]) -> Result<u64> {
        let Some(first) = rows.first() else {
            return Ok(0);
        };
        if !table.has_pk() {
            return Err(RestoreError::NoPrimaryKey(table.full_name()));
        }

        let columns = written_columns(table, first);
        if columns.is_empty() {
            return Err(RestoreError::write(
                &table.name,
                "no writable columns in common with the source rows",
            ));
        }

        let rows_per_stmt = (MAX_BIND_PARAMS / columns.len()).max(1);
        let mut affected = 0;

        for chunk in rows.chunks(rows_per_stmt) {
            let (sql, params) = build_upsert_sql(table, &columns, chunk);
            let param_refs: Vec<&(dyn ToSql + Sync)> =
                params.iter().map(|p| p as &(dyn ToSql + Sync)).collect();

            affected += self
                .client
                .execute(sql.as_str(), &param_refs)
                .await
                .map_err(|e| RestoreError::write_rejected(&table.name, e))?;
        }

        debug!("Upserted {} rows into {}", affected, table.name);
        Ok(affected)
    }

    async fn serial_sequence(&mut self, table: &Table, column: &str) -> Result<Option<String>> {
        let row = self
            .client
            .query_one(
                "SELECT pg_get_serial_sequence($1, $2)",
                &[&qualify(&table.schema, &table.name), &column],
            )
            .await?;
        Ok(row.get(0))
    }

    async fn reset_sequence(
        &mut self,
        table: &Table,
        column: &str,
        sequence: &str,
    ) -> Result<Option<i64>> {
        let sql = format!(
            "SELECT setval($1::text::regclass, (SELECT MAX({})::bigint FROM {}))",
            quote_ident(column),
            qualify(&table.schema, &table.name)
        );
        let row = self.client.query_one(sql.as_str(), &[&sequence]).await?;
        Ok(row.get(0))
    }
}
