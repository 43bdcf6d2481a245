//! Reflected schema metadata: tables, columns, primary and foreign keys.
//!
//! A [`Catalog`] is loaded once per run (from the target database or the
//! metadata cache) and is read-only afterwards.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{RestoreError, Result};

/// Column metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Column {
    /// Column name.
    pub name: String,

    /// Formatted PostgreSQL type (e.g. "integer", "character varying(20)").
    pub data_type: String,

    /// Whether the column allows NULL.
    pub is_nullable: bool,

    /// Server-side default expression, if any.
    #[serde(default)]
    pub default: Option<String>,

    /// Whether the column is an identity column.
    #[serde(default)]
    pub is_identity: bool,

    /// Whether the column is generated (never written explicitly).
    #[serde(default)]
    pub is_generated: bool,
}

impl Column {
    /// Name of the sequence bound to this column through a
    /// `nextval('<sequence>'::regclass)` default.
    pub fn sequence_name(&self) -> Option<&str> {
        let default = self.default.as_deref()?.trim();
        let inner = default
            .strip_prefix("nextval('")?
            .strip_suffix("'::regclass)")?;
        if inner.is_empty() || inner.contains('\'') {
            return None;
        }
        Some(inner)
    }

    /// Type name with any modifier removed ("numeric(10,2)" -> "numeric",
    /// "timestamp(3) with time zone" -> "timestamp with time zone").
    pub fn base_type(&self) -> String {
        match (self.data_type.find('('), self.data_type.find(')')) {
            (Some(open), Some(close)) if open < close => format!(
                "{}{}",
                self.data_type[..open].trim_end(),
                &self.data_type[close + 1..]
            ),
            _ => self.data_type.clone(),
        }
    }
}

/// One column of a foreign key constraint.
///
/// Foreign keys are stored per column; columns sharing a constraint name
/// form one logical (possibly composite) reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForeignKey {
    /// Constraint name.
    pub constraint: String,

    /// Local (referencing) column.
    pub column: String,

    /// Referenced table name.
    pub ref_table: String,

    /// Referenced column name.
    pub ref_column: String,

    /// Position of this column within the constraint (1-based).
    #[serde(default = "default_position")]
    pub position: i32,
}

fn default_position() -> i32 {
    1
}

/// All columns of one foreign key constraint, matched together.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForeignKeyGroup {
    /// Constraint name.
    pub constraint: String,

    /// Referencing table.
    pub table: String,

    /// Referenced table.
    pub ref_table: String,

    /// `(local column, referenced column)` pairs in constraint order.
    pub columns: Vec<(String, String)>,
}

impl ForeignKeyGroup {
    pub fn is_composite(&self) -> bool {
        self.columns.len() > 1
    }
}

/// Table metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Table {
    /// Schema name.
    pub schema: String,

    /// Table name.
    pub name: String,

    /// Column definitions in ordinal order.
    pub columns: Vec<Column>,

    /// Primary key column names in key order.
    pub primary_key: Vec<String>,

    /// Foreign keys, one entry per constrained column.
    #[serde(default)]
    pub foreign_keys: Vec<ForeignKey>,
}

impl Table {
    /// Get the fully qualified table name.
    pub fn full_name(&self) -> String {
        format!("{}.{}", self.schema, self.name)
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Check if the table has a primary key.
    pub fn has_pk(&self) -> bool {
        !self.primary_key.is_empty()
    }

    pub fn is_pk_column(&self, name: &str) -> bool {
        self.primary_key.iter().any(|pk| pk == name)
    }

    /// Columns that can be written explicitly (everything but generated columns).
    pub fn writable_columns(&self) -> impl Iterator<Item = &Column> {
        self.columns.iter().filter(|c| !c.is_generated)
    }

    /// Primary key columns.
    pub fn pk_columns(&self) -> impl Iterator<Item = &Column> {
        self.primary_key.iter().filter_map(|pk| self.column(pk))
    }

    /// Foreign keys grouped by constraint, in constraint name order.
    pub fn foreign_key_groups(&self) -> Vec<ForeignKeyGroup> {
        let mut grouped: BTreeMap<&str, Vec<&ForeignKey>> = BTreeMap::new();
        for fk in &self.foreign_keys {
            grouped.entry(fk.constraint.as_str()).or_default().push(fk);
        }

        grouped
            .into_iter()
            .map(|(constraint, mut fks)| {
                fks.sort_by_key(|fk| fk.position);
                ForeignKeyGroup {
                    constraint: constraint.to_string(),
                    table: self.name.clone(),
                    ref_table: fks[0].ref_table.clone(),
                    columns: fks
                        .iter()
                        .map(|fk| (fk.column.clone(), fk.ref_column.clone()))
                        .collect(),
                }
            })
            .collect()
    }
}

/// Every table of one schema, keyed by table name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Catalog {
    /// Schema the tables were reflected from.
    pub schema: String,

    /// Tables by name.
    pub tables: BTreeMap<String, Arc<Table>>,
}

impl Catalog {
    pub fn new(schema: impl Into<String>) -> Self {
        Self {
            schema: schema.into(),
            tables: BTreeMap::new(),
        }
    }

    /// Build a catalog from a list of tables.
    pub fn from_tables(schema: impl Into<String>, tables: impl IntoIterator<Item = Table>) -> Self {
        let mut catalog = Self::new(schema);
        for table in tables {
            catalog.insert(table);
        }
        catalog
    }

    pub fn insert(&mut self, table: Table) {
        self.tables.insert(table.name.clone(), Arc::new(table));
    }

    /// Look up a table, failing with `UnknownTable`.
    pub fn table(&self, name: &str) -> Result<&Arc<Table>> {
        self.tables
            .get(name)
            .ok_or_else(|| RestoreError::UnknownTable(name.to_string()))
    }

    pub fn get(&self, name: &str) -> Option<&Arc<Table>> {
        self.tables.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tables.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    /// Foreign key groups in other tables (or this one) that reference `table`,
    /// ordered by referencing table then constraint name.
    pub fn referencing_groups(&self, table: &str) -> Vec<ForeignKeyGroup> {
        self.tables
            .values()
            .flat_map(|t| t.foreign_key_groups())
            .filter(|group| group.ref_table == table)
            .collect()
    }
}
