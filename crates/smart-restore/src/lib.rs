//! # smart-restore
//!
//! Copy a referentially consistent subset of a PostgreSQL database into
//! another one.
//!
//! Given `table[:where]` expressions, the library copies the matching rows
//! together with:
//!
//! - **Ancestors**: every row they reference through foreign keys, transitively,
//!   written before the rows that need them
//! - **Fanout**: optionally, rows of chosen tables that reference the copied
//!   rows, one hop per table along each branch
//!
//! Rows are upserted by primary key, so re-running a restore is idempotent.
//! After the last write, sequences backing primary keys are advanced past
//! the copied values.
//!
//! ## Example
//!
//! ```rust,no_run
//! use smart_restore::{RestoreConfig, Restorer};
//!
//! #[tokio::main]
//! async fn main() -> smart_restore::Result<()> {
//!     let config = RestoreConfig::load("smart_restore.yaml")?;
//!     let restorer = Restorer::connect(&config).await?;
//!     let summary = restorer
//!         .run(&config.table_exprs()?, &config.fanout_set())
//!         .await?;
//!     println!("{}", summary.render_text());
//!     Ok(())
//! }
//! ```

pub mod catalog;
pub mod config;
pub mod connection;
pub mod core;
pub mod error;
pub mod predicate;
pub mod progress;
pub mod restore;
pub mod source;
pub mod target;
pub mod writer;

// Re-exports for convenient access
pub use crate::core::{Catalog, Column, FanoutSet, ForeignKey, Row, SqlValue, Table, WriteBatch};
pub use config::RestoreConfig;
pub use error::{RestoreError, Result};
pub use predicate::{Predicate, TableExpr};
pub use progress::{ProgressTracker, RestoreSummary};
pub use restore::Restorer;
pub use source::{RowReader, RowSource};
pub use target::{TargetConnection, TargetConnector};
pub use writer::{build_writer, UpsertWriter, WriterMode};
