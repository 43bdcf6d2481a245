//! PostgreSQL schema reflection.

use std::collections::BTreeMap;

use tokio_postgres::Client;
use tracing::debug;

use crate::core::identifier::qualify;
use crate::core::{Catalog, Column, ForeignKey, Table};
use crate::error::Result;

const COLUMNS_QUERY: &str = r#"
    SELECT
        c.relname::text,
        a.attname::text,
        pg_catalog.format_type(a.atttypid, a.atttypmod),
        NOT a.attnotnull,
        pg_catalog.pg_get_expr(d.adbin, d.adrelid),
        a.attidentity <> '',
        a.attgenerated <> ''
    FROM pg_catalog.pg_class c
    JOIN pg_catalog.pg_namespace n ON n.oid = c.relnamespace
    JOIN pg_catalog.pg_attribute a ON a.attrelid = c.oid
    LEFT JOIN pg_catalog.pg_attrdef d ON d.adrelid = a.attrelid AND d.adnum = a.attnum
    WHERE n.nspname = $1
      AND c.relkind IN ('r', 'p')
      AND a.attnum > 0
      AND NOT a.attisdropped
    ORDER BY c.relname, a.attnum
"#;

const PRIMARY_KEYS_QUERY: &str = r#"
    SELECT
        c.relname::text,
        a.attname::text
    FROM pg_catalog.pg_constraint con
    JOIN pg_catalog.pg_class c ON c.oid = con.conrelid
    JOIN pg_catalog.pg_namespace n ON n.oid = c.relnamespace
    CROSS JOIN LATERAL unnest(con.conkey) WITH ORDINALITY AS k(attnum, ord)
    JOIN pg_catalog.pg_attribute a ON a.attrelid = c.oid AND a.attnum = k.attnum
    WHERE n.nspname = $1
      AND con.contype = 'p'
    ORDER BY c.relname, k.ord
"#;

const FOREIGN_KEYS_QUERY: &str = r#"
    SELECT
        con.conname::text,
        c.relname::text,
        a.attname::text,
        rc.relname::text,
        ra.attname::text,
        k.ord::int4
    FROM pg_catalog.pg_constraint con
    JOIN pg_catalog.pg_class c ON c.oid = con.conrelid
    JOIN pg_catalog.pg_namespace n ON n.oid = c.relnamespace
    JOIN pg_catalog.pg_class rc ON rc.oid = con.confrelid
    JOIN pg_catalog.pg_namespace rn ON rn.oid = rc.relnamespace
    CROSS JOIN LATERAL unnest(con.conkey, con.confkey) WITH ORDINALITY AS k(attnum, ref_attnum, ord)
    JOIN pg_catalog.pg_attribute a ON a.attrelid = con.conrelid AND a.attnum = k.attnum
    JOIN pg_catalog.pg_attribute ra ON ra.attrelid = con.confrelid AND ra.attnum = k.ref_attnum
    WHERE n.nspname = $1
      AND rn.nspname = $1
      AND con.contype = 'f'
    ORDER BY c.relname, con.conname, k.ord
"#;

/// Reflect every ordinary and partitioned table of `schema`.
pub async fn reflect(client: &Client, schema: &str) -> Result<Catalog> {
    let mut tables: BTreeMap<String, Table> = BTreeMap::new();

    for row in client.query(COLUMNS_QUERY, &[&schema]).await? {
        let table_name: String = row.get(0);
        let table = tables.entry(table_name.clone()).or_insert_with(|| Table {
            schema: schema.to_string(),
            name: table_name,
            columns: Vec::new(),
            primary_key: Vec::new(),
            foreign_keys: Vec::new(),
        });
        table.columns.push(Column {
            name: row.get(1),
            data_type: row.get(2),
            is_nullable: row.get(3),
            default: row.get(4),
            is_identity: row.get(5),
            is_generated: row.get(6),
        });
    }

    for row in client.query(PRIMARY_KEYS_QUERY, &[&schema]).await? {
        let table_name: String = row.get(0);
        if let Some(table) = tables.get_mut(&table_name) {
            table.primary_key.push(row.get(1));
        }
    }

    let mut fk_count = 0;
    for row in client.query(FOREIGN_KEYS_QUERY, &[&schema]).await? {
        let table_name: String = row.get(1);
        if let Some(table) = tables.get_mut(&table_name) {
            table.foreign_keys.push(ForeignKey {
                constraint: row.get(0),
                column: row.get(2),
                ref_table: row.get(3),
                ref_column: row.get(4),
                position: row.get(5),
            });
            fk_count += 1;
        }
    }

    debug!(
        "Reflected {} tables and {} foreign key columns from schema {}",
        tables.len(),
        fk_count,
        schema
    );

    Ok(Catalog::from_tables(schema, tables.into_values()))
}

/// Migration revision of the database, used as the metadata cache key.
///
/// Reads the Alembic heads, sorted and joined with `|`. Returns `None` when the
/// schema has no `alembic_version` table.
pub async fn schema_revision(client: &Client, schema: &str) -> Result<Option<String>> {
    let exists: bool = client
        .query_one(
            "SELECT to_regclass(format('%I.alembic_version', $1::text)) IS NOT NULL",
            &[&schema],
        )
        .await?
        .get(0);
    if !exists {
        return Ok(None);
    }

    let sql = format!(
        "SELECT version_num::text FROM {}",
        qualify(schema, "alembic_version")
    );
    let mut heads: Vec<String> = client
        .query(sql.as_str(), &[])
        .await?
        .iter()
        .map(|row| row.get(0))
        .collect();
    if heads.is_empty() {
        return Ok(None);
    }
    heads.sort();

    Ok(Some(heads.join("|")))
}
