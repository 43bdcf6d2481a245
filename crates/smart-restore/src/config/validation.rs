//! Configuration validation.

use super::RestoreConfig;
use crate::connection::ConnectionSpec;
use crate::core::identifier::validate_identifier;
use crate::error::{RestoreError, Result};
use crate::predicate::TableExpr;

/// Validate the configuration.
pub fn validate(config: &RestoreConfig) -> Result<()> {
    if config.source.trim().is_empty() {
        return Err(RestoreError::Config("source is required".into()));
    }
    if config.target.trim().is_empty() {
        return Err(RestoreError::Config("target is required".into()));
    }

    let source = ConnectionSpec::parse(&config.source)?;
    let target = ConnectionSpec::parse(&config.target)?;

    // Cannot restore into the database being read
    if source.display() == target.display() {
        return Err(RestoreError::Config(format!(
            "source and target cannot be the same database ({})",
            source.display()
        )));
    }

    validate_identifier(&config.schema)?;
    for table in config.fanout.iter().chain(&config.exclude_tables) {
        validate_identifier(table)?;
    }
    for expr in &config.tables {
        TableExpr::parse(expr)?;
    }

    if config.page_size == 0 {
        return Err(RestoreError::Config("page_size must be at least 1".into()));
    }
    if config.batch_size == 0 {
        return Err(RestoreError::Config("batch_size must be at least 1".into()));
    }
    if let Some(0) = config.write_queue_capacity {
        return Err(RestoreError::Config(
            "write_queue_capacity must be at least 1".into(),
        ));
    }

    Ok(())
}
