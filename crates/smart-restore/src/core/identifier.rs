//! Identifier validation and quoting for dynamically built PostgreSQL statements.
//!
//! Table and column names cannot be bound as statement parameters, so every
//! statement the restore engine builds goes through [`quote_ident`] /
//! [`qualify`]. Names typed by the user (table expressions, `--fanout`,
//! `--exclude-table`) are checked with [`validate_identifier`] first.

use crate::error::{RestoreError, Result};

/// PostgreSQL truncates identifiers beyond 63 bytes.
const MAX_IDENTIFIER_LENGTH: usize = 63;

/// Validate a user-supplied identifier.
///
/// Rejects empty names, names containing null bytes and names longer than
/// PostgreSQL's identifier limit.
pub fn validate_identifier(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(RestoreError::Config(
            "Identifier cannot be empty".to_string(),
        ));
    }

    if name.contains('\0') {
        return Err(RestoreError::Config(format!(
            "Identifier contains null byte: {:?}",
            name
        )));
    }

    if name.len() > MAX_IDENTIFIER_LENGTH {
        return Err(RestoreError::Config(format!(
            "Identifier exceeds maximum length of {} bytes (got {} bytes): {:?}",
            MAX_IDENTIFIER_LENGTH,
            name.len(),
            name
        )));
    }

    Ok(())
}

/// Quote a PostgreSQL identifier, doubling embedded double quotes.
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Qualify a table name with its schema.
pub fn qualify(schema: &str, table: &str) -> String {
    format!("{}.{}", quote_ident(schema), quote_ident(table))
}

/// Quote a string as a PostgreSQL literal.
pub fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quote_ident() {
        assert_eq!(quote_ident("users"), "\"users\"");
        assert_eq!(quote_ident("odd\"name"), "\"odd\"\"name\"");
    }

    #[test]
    fn test_qualify() {
        assert_eq!(qualify("public", "orders"), "\"public\".\"orders\"");
    }

    #[test]
    fn test_quote_literal() {
        assert_eq!(quote_literal("o'brien"), "'o''brien'");
    }

    #[test]
    fn test_validate_identifier() {
        assert!(validate_identifier("orders").is_ok());
        assert!(validate_identifier("").is_err());
        assert!(validate_identifier("bad\0name").is_err());
        assert!(validate_identifier(&"x".repeat(64)).is_err());
        assert!(validate_identifier(&"x".repeat(63)).is_ok());
    }
}
