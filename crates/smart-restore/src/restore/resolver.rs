//! Foreign-key ancestor resolution.

use std::sync::Arc;

use futures::future::{BoxFuture, FutureExt};
use tracing::{debug, warn};

use crate::core::{Row, Table, WriteBatch};
use crate::error::Result;
use crate::predicate::Predicate;
use crate::source::RowReader;

/// Every row `rows` reference through foreign keys, transitively, ordered so
/// that each table's rows come after the rows they reference.
///
/// Each foreign key constraint of `table` is matched as a whole (composite
/// keys as a conjunction). Excluded targets are skipped before any query.
/// The same table may appear more than once when reached through different
/// constraints; reads go through `reader`, so no row is returned twice in a
/// run.
pub fn resolve_ancestors<'a>(
    reader: &'a mut RowReader,
    table: &'a Table,
    rows: &'a [Row],
) -> BoxFuture<'a, Result<Vec<WriteBatch>>> {
    async move {
        let mut plan = Vec::new();
        if rows.is_empty() {
            return Ok(plan);
        }

        for group in table.foreign_key_groups() {
            if reader.is_excluded(&group.ref_table) {
                debug!(
                    "Not resolving {} -> {}: target table is excluded",
                    table.name, group.ref_table
                );
                continue;
            }
            let Some(target) = reader.catalog().get(&group.ref_table).map(Arc::clone) else {
                warn!(
                    "Foreign key {} references unknown table {}",
                    group.constraint, group.ref_table
                );
                continue;
            };

            // Filter the referenced table on its key columns using our local values.
            let pairs: Vec<(String, String)> = group
                .columns
                .iter()
                .map(|(local, referenced)| (referenced.clone(), local.clone()))
                .collect();
            let predicate = Predicate::matching(&pairs, rows);
            if predicate.is_empty() {
                continue;
            }

            let target_rows = reader.select_all(&target.name, predicate).await?;
            if target_rows.is_empty() {
                continue;
            }

            plan.extend(resolve_ancestors(reader, &target, &target_rows).await?);
            plan.push(WriteBatch::new(target.name.clone(), target_rows));
        }

        Ok(plan)
    }
    .boxed()
}
