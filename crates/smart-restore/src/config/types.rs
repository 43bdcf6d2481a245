//! Configuration type definitions.

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::catalog::DEFAULT_CACHE_PATH;
use crate::connection::redact;
use crate::restore::DEFAULT_BATCH_SIZE;
use crate::source::DEFAULT_PAGE_SIZE;

/// Default configuration file, read from the working directory when present.
pub const DEFAULT_CONFIG_FILE: &str = "smart_restore.yaml";

/// Everything one restore run needs.
///
/// Every field can come from the YAML file or the command line.
#[derive(Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RestoreConfig {
    /// Source database URL or bare database name.
    #[serde(default)]
    pub source: String,

    /// Target database URL or bare database name.
    #[serde(default)]
    pub target: String,

    /// Schema whose tables are restored (default: public).
    #[serde(default = "default_schema")]
    pub schema: String,

    /// Tables to fan out into from copied rows.
    #[serde(default)]
    pub fanout: Vec<String>,

    /// Tables never read or written.
    #[serde(default)]
    pub exclude_tables: Vec<String>,

    /// `table[:where]` expressions to copy.
    #[serde(default)]
    pub tables: Vec<String>,

    /// Write inline instead of through the background worker.
    #[serde(default)]
    pub sync: bool,

    /// Debug logging.
    #[serde(default)]
    pub verbose: bool,

    /// Rows per source page (default: 1000).
    #[serde(default = "default_page_size")]
    pub page_size: usize,

    /// Rows per copy batch (default: 100).
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Capacity of the pipelined write queue; unbounded when unset.
    #[serde(default)]
    pub write_queue_capacity: Option<usize>,

    /// Metadata cache file (default: .smart_restore_meta.json).
    #[serde(default = "default_metadata_cache")]
    pub metadata_cache: PathBuf,

    /// Reflect metadata on every run.
    #[serde(default)]
    pub no_metadata_cache: bool,

    /// Emit JSON progress lines on stderr.
    #[serde(default)]
    pub progress: bool,
}

impl Default for RestoreConfig {
    fn default() -> Self {
        Self {
            source: String::new(),
            target: String::new(),
            schema: default_schema(),
            fanout: Vec::new(),
            exclude_tables: Vec::new(),
            tables: Vec::new(),
            sync: false,
            verbose: false,
            page_size: default_page_size(),
            batch_size: default_batch_size(),
            write_queue_capacity: None,
            metadata_cache: default_metadata_cache(),
            no_metadata_cache: false,
            progress: false,
        }
    }
}

impl fmt::Debug for RestoreConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RestoreConfig")
            .field("source", &redact(&self.source))
            .field("target", &redact(&self.target))
            .field("schema", &self.schema)
            .field("fanout", &self.fanout)
            .field("exclude_tables", &self.exclude_tables)
            .field("tables", &self.tables)
            .field("sync", &self.sync)
            .field("verbose", &self.verbose)
            .field("page_size", &self.page_size)
            .field("batch_size", &self.batch_size)
            .field("write_queue_capacity", &self.write_queue_capacity)
            .field("metadata_cache", &self.metadata_cache)
            .field("no_metadata_cache", &self.no_metadata_cache)
            .field("progress", &self.progress)
            .finish()
    }
}

fn default_schema() -> String {
    "public".to_string()
}

fn default_page_size() -> usize {
    DEFAULT_PAGE_SIZE
}

fn default_batch_size() -> usize {
    DEFAULT_BATCH_SIZE
}

fn default_metadata_cache() -> PathBuf {
    PathBuf::from(DEFAULT_CACHE_PATH)
}
