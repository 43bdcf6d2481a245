//! Configuration loading and validation.

mod types;
mod validation;

pub use types::*;

use std::path::Path;

use sha2::{Digest, Sha256};

use crate::catalog::{JsonFileCache, MetadataCache, NoOpCache};
use crate::core::FanoutSet;
use crate::error::Result;
use crate::predicate::TableExpr;
use crate::writer::WriterMode;

impl RestoreConfig {
    /// Load and validate configuration from a YAML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let config = Self::read(path)?;
        config.validate()?;
        Ok(config)
    }

    /// Read a YAML file without validating it, for merging with CLI options.
    pub fn read<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_yaml::from_str(&content)?)
    }

    /// Parse configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: RestoreConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        validation::validate(self)
    }

    /// Compute a SHA256 hash of the configuration.
    pub fn hash(&self) -> String {
        let yaml = serde_yaml::to_string(self).unwrap_or_default();
        let mut hasher = Sha256::new();
        hasher.update(yaml.as_bytes());
        format!("{:x}", hasher.finalize())
    }

    /// Parsed table expressions, in order.
    pub fn table_exprs(&self) -> Result<Vec<TableExpr>> {
        self.tables.iter().map(|e| TableExpr::parse(e)).collect()
    }

    pub fn fanout_set(&self) -> FanoutSet {
        self.fanout.iter().cloned().collect()
    }

    pub fn writer_mode(&self) -> WriterMode {
        if self.sync {
            WriterMode::Inline
        } else {
            WriterMode::Pipelined {
                queue_capacity: self.write_queue_capacity,
            }
        }
    }

    pub fn metadata_cache(&self) -> Box<dyn MetadataCache> {
        if self.no_metadata_cache {
            Box::new(NoOpCache)
        } else {
            Box::new(JsonFileCache::new(&self.metadata_cache))
        }
    }
}

/// Append the entries of `more` not already in `list`, keeping order.
pub fn merge_unique(list: &mut Vec<String>, more: impl IntoIterator<Item = String>) {
    for item in more {
        if !list.contains(&item) {
            list.push(item);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_yaml_defaults() {
        let config = RestoreConfig::from_yaml(
            "source: postgresql://replica/shop\ntarget: shop_dev\nfanout: [orders]\n",
        )
        .unwrap();

        assert_eq!(config.schema, "public");
        assert_eq!(config.page_size, 1000);
        assert_eq!(config.batch_size, 100);
        assert!(config.fanout_set().contains("orders"));
        assert_eq!(
            config.writer_mode(),
            WriterMode::Pipelined {
                queue_capacity: None
            }
        );
    }

    #[test]
    fn test_sync_selects_inline_writer() {
        let config = RestoreConfig {
            sync: true,
            ..RestoreConfig::default()
        };
        assert_eq!(config.writer_mode(), WriterMode::Inline);
    }

    #[test]
    fn test_unknown_field_rejected() {
        assert!(RestoreConfig::from_yaml("source: a\ntarget: b\nfan_out: [x]\n").is_err());
    }

    #[test]
    fn test_hash_changes_with_content() {
        let a = RestoreConfig::default();
        let b = RestoreConfig {
            batch_size: 7,
            ..RestoreConfig::default()
        };
        assert_eq!(a.hash(), RestoreConfig::default().hash());
        assert_ne!(a.hash(), b.hash());
    }

    #[test]
    fn test_merge_unique() {
        let mut list = vec!["orders".to_string()];
        merge_unique(&mut list, ["addresses".to_string(), "orders".to_string()]);
        assert_eq!(list, vec!["orders".to_string(), "addresses".to_string()]);
    }

    #[test]
    fn test_load_and_read() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("smart_restore.yaml");
        std::fs::write(&path, "target: shop_dev\nsync: true\n").unwrap();

        let partial = RestoreConfig::read(&path).unwrap();
        assert!(partial.sync);
        assert!(RestoreConfig::load(&path).is_err());
    }
}
