//! PostgreSQL row source.

use std::sync::Arc;

use async_trait::async_trait;
use deadpool_postgres::Pool;

use crate::core::identifier::{qualify, quote_ident};
use crate::core::{Column, Row, SqlValue, Table};
use crate::error::{RestoreError, Result};
use crate::predicate::Predicate;

use super::RowSource;

/// How a column is selected and decoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ColumnKind {
    Bool,
    I16,
    I32,
    I64,
    F32,
    F64,
    Uuid,
    Timestamp,
    TimestampTz,
    Date,
    Time,
    Bytes,
    Text,
    /// Anything else, selected as `::text`.
    Other,
}

impl ColumnKind {
    fn of(column: &Column) -> Self {
        match column.base_type().as_str() {
            "boolean" => ColumnKind::Bool,
            "smallint" => ColumnKind::I16,
            "integer" => ColumnKind::I32,
            "bigint" => ColumnKind::I64,
            "real" => ColumnKind::F32,
            "double precision" => ColumnKind::F64,
            "uuid" => ColumnKind::Uuid,
            "timestamp without time zone" => ColumnKind::Timestamp,
            "timestamp with time zone" => ColumnKind::TimestampTz,
            "date" => ColumnKind::Date,
            "time without time zone" => ColumnKind::Time,
            "bytea" => ColumnKind::Bytes,
            "text" | "character varying" | "character" => ColumnKind::Text,
            _ => ColumnKind::Other,
        }
    }
}

/// Reads pages with `SELECT ... WHERE <predicate> LIMIT n OFFSET m`.
pub struct PgSource {
    pool: Pool,
}

impl PgSource {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }
}

/// Build the page query for `table`.
fn build_select_sql(table: &Table, predicate: &Predicate, limit: usize, offset: usize) -> String {
    let columns: Vec<String> = table
        .columns
        .iter()
        .map(|col| {
            let ident = quote_ident(&col.name);
            match ColumnKind::of(col) {
                ColumnKind::Other => format!("{}::text AS {}", ident, ident),
                _ => ident,
            }
        })
        .collect();

    format!(
        "SELECT {} FROM {} WHERE {} LIMIT {} OFFSET {}",
        columns.join(", "),
        qualify(&table.schema, &table.name),
        predicate.to_sql(),
        limit,
        offset
    )
}

fn convert_value(row: &tokio_postgres::Row, idx: usize, kind: ColumnKind) -> Result<SqlValue> {
    let value = match kind {
        ColumnKind::Bool => row.try_get::<_, Option<bool>>(idx)?.map(SqlValue::Bool),
        ColumnKind::I16 => row.try_get::<_, Option<i16>>(idx)?.map(SqlValue::I16),
        ColumnKind::I32 => row.try_get::<_, Option<i32>>(idx)?.map(SqlValue::I32),
        ColumnKind::I64 => row.try_get::<_, Option<i64>>(idx)?.map(SqlValue::I64),
        ColumnKind::F32 => row.try_get::<_, Option<f32>>(idx)?.map(SqlValue::F32),
        ColumnKind::F64 => row.try_get::<_, Option<f64>>(idx)?.map(SqlValue::F64),
        ColumnKind::Uuid => row
            .try_get::<_, Option<uuid::Uuid>>(idx)?
            .map(SqlValue::Uuid),
        ColumnKind::Timestamp => row
            .try_get::<_, Option<chrono::NaiveDateTime>>(idx)?
            .map(SqlValue::DateTime),
        ColumnKind::TimestampTz => row
            .try_get::<_, Option<chrono::DateTime<chrono::FixedOffset>>>(idx)?
            .map(SqlValue::DateTimeOffset),
        ColumnKind::Date => row
            .try_get::<_, Option<chrono::NaiveDate>>(idx)?
            .map(SqlValue::Date),
        ColumnKind::Time => row
            .try_get::<_, Option<chrono::NaiveTime>>(idx)?
            .map(SqlValue::Time),
        ColumnKind::Bytes => row.try_get::<_, Option<Vec<u8>>>(idx)?.map(SqlValue::Bytes),
        ColumnKind::Text | ColumnKind::Other => {
            row.try_get::<_, Option<String>>(idx)?.map(SqlValue::Text)
        }
    };
    Ok(value.unwrap_or(SqlValue::Null))
}

#[async_trait]
impl RowSource for PgSource {
    async fn fetch_page(
        &self,
        table: &Table,
        predicate: &Predicate,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Row>> {
        let client = self
            .pool
            .get()
            .await
            .map_err(|e| RestoreError::pool(e, format!("reading {}", table.name)))?;

        let sql = build_select_sql(table, predicate, limit, offset);
        let pg_rows = client.query(sql.as_str(), &[]).await?;

        let kinds: Vec<ColumnKind> = table.columns.iter().map(ColumnKind::of).collect();
        let names: Arc<[String]> = table.columns.iter().map(|c| c.name.clone()).collect();

        pg_rows
            .iter()
            .map(|pg_row| {
                let values = kinds
                    .iter()
                    .enumerate()
                    .map(|(idx, kind)| convert_value(pg_row, idx, *kind))
                    .collect::<Result<Vec<_>>>()?;
                Ok(Row::new(Arc::clone(&names), values))
            })
            .collect()
    }
}
