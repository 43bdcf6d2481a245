//! Core data model shared by every stage of a restore.
//!
//! - [`schema`]: tables, columns, primary and foreign keys, the [`Catalog`]
//! - [`value`]: SQL values, rows and row identities
//! - [`plan`]: write batches and per-branch fanout sets
//! - [`identifier`]: identifier validation and quoting

pub mod identifier;
pub mod plan;
pub mod schema;
pub mod value;

pub use plan::{FanoutSet, WriteBatch};
pub use schema::{Catalog, Column, ForeignKey, ForeignKeyGroup, Table};
pub use value::{Row, RowIdentity, SqlValue};
