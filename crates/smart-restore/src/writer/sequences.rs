//! Post-copy sequence repair.
//!
//! Upserts write primary-key values copied from the source, which bypasses
//! the target's sequences. Once every write has landed each sequence bound
//! to a primary-key column of a written table is advanced to the column's
//! maximum so native inserts do not collide with copied rows.

use std::collections::BTreeSet;

use tracing::{debug, info, warn};

use crate::core::{Catalog, Table};
use crate::error::Result;
use crate::target::{TargetConnection, TargetConnector};

/// Repair the sequences of every table in `dirty`; returns how many were set.
pub async fn repair_sequences(
    connector: &dyn TargetConnector,
    catalog: &Catalog,
    dirty: &BTreeSet<String>,
) -> Result<usize> {
    if dirty.is_empty() {
        return Ok(0);
    }

    info!("Fixing primary key sequences for {} tables", dirty.len());
    let mut conn = connector.connect().await?;
    let mut repaired = 0;

    for name in dirty {
        let Some(table) = catalog.get(name) else {
            warn!("Table {} is not in the target catalog; skipping sequence repair", name);
            continue;
        };
        repaired += repair_table(conn.as_mut(), table).await?;
    }

    Ok(repaired)
}

async fn repair_table(conn: &mut dyn TargetConnection, table: &Table) -> Result<usize> {
    let mut repaired = 0;

    for column in table.pk_columns() {
        let sequence = match column.sequence_name() {
            Some(sequence) => Some(sequence.to_string()),
            None if column.is_identity => conn.serial_sequence(table, &column.name).await?,
            None => None,
        };
        let Some(sequence) = sequence else {
            continue;
        };

        let value = conn.reset_sequence(table, &column.name, &sequence).await?;
        debug!("Sequence {} of {}.{} set to {:?}", sequence, table.name, column.name, value);
        repaired += 1;
    }

    Ok(repaired)
}
