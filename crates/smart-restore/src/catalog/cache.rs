//! Metadata cache keyed by schema revision.
//!
//! Reflection is the slowest part of startup on large schemas, so a reflected
//! [`Catalog`] is stored under the database's revision tag and reused until
//! the schema migrates.

use std::collections::HashMap;
use std::path::PathBuf;

use async_trait::async_trait;
use tracing::debug;

use crate::core::Catalog;
use crate::error::{RestoreError, Result};

/// Default location of the JSON metadata cache.
pub const DEFAULT_CACHE_PATH: &str = ".smart_restore_meta.json";

/// Key-value store of reflected catalogs.
#[async_trait]
pub trait MetadataCache: Send + Sync {
    /// Look up the catalog stored under `key`.
    async fn get(&self, key: &str) -> Result<Option<Catalog>>;

    /// Store `catalog` under `key`, replacing any previous entry.
    async fn put(&self, key: &str, catalog: &Catalog) -> Result<()>;

    /// Backend name for log output.
    fn cache_type(&self) -> &'static str;
}

/// Cache stored as one JSON file holding a key → catalog map.
pub struct JsonFileCache {
    path: PathBuf,
}

impl JsonFileCache {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    async fn load(&self) -> Result<HashMap<String, Catalog>> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) => serde_json::from_slice(&bytes).map_err(|e| {
                RestoreError::Cache(format!("Failed to parse {}: {}", self.path.display(), e))
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(HashMap::new()),
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait]
impl MetadataCache for JsonFileCache {
    async fn get(&self, key: &str) -> Result<Option<Catalog>> {
        Ok(self.load().await?.remove(key))
    }

    async fn put(&self, key: &str, catalog: &Catalog) -> Result<()> {
        let mut entries = self.load().await.unwrap_or_else(|e| {
            debug!("Discarding unreadable metadata cache: {}", e);
            HashMap::new()
        });
        entries.insert(key.to_string(), catalog.clone());

        // Write a sibling file, then rename it over the cache.
        let tmp = self.path.with_extension("json.tmp");
        let json = serde_json::to_vec(&entries)?;
        tokio::fs::write(&tmp, json).await?;
        tokio::fs::rename(&tmp, &self.path).await?;

        debug!("Stored catalog {} in {}", key, self.path.display());
        Ok(())
    }

    fn cache_type(&self) -> &'static str {
        "json"
    }
}

/// Cache that stores nothing.
pub struct NoOpCache;

#[async_trait]
impl MetadataCache for NoOpCache {
    async fn get(&self, _key: &str) -> Result<Option<Catalog>> {
        Ok(None)
    }

    async fn put(&self, _key: &str, _catalog: &Catalog) -> Result<()> {
        Ok(())
    }

    fn cache_type(&self) -> &'static str {
        "none"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Column, Table};
    use tempfile::TempDir;

    fn sample_catalog() -> Catalog {
        Catalog::from_tables(
            "public",
            [Table {
                schema: "public".into(),
                name: "customers".into(),
                columns: vec![Column {
                    name: "id".into(),
                    data_type: "integer".into(),
                    is_nullable: false,
                    default: Some("nextval('customers_id_seq'::regclass)".into()),
                    is_identity: false,
                    is_generated: false,
                }],
                primary_key: vec!["id".into()],
                foreign_keys: vec![],
            }],
        )
    }

    #[tokio::test]
    async fn test_json_cache_roundtrip() {
        let dir = TempDir::new().unwrap();
        let cache = JsonFileCache::new(dir.path().join("meta.json"));

        assert!(cache.get("public:abc123").await.unwrap().is_none());

        let catalog = sample_catalog();
        cache.put("public:abc123", &catalog).await.unwrap();
        cache.put("public:def456", &Catalog::new("public")).await.unwrap();

        let loaded = cache.get("public:abc123").await.unwrap().unwrap();
        assert_eq!(loaded, catalog);
        assert!(cache.get("public:def456").await.unwrap().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_json_cache_rejects_corrupt_file_on_read() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("meta.json");
        std::fs::write(&path, b"not json").unwrap();

        let cache = JsonFileCache::new(&path);
        assert!(matches!(cache.get("k").await, Err(RestoreError::Cache(_))));

        // A put replaces the corrupt file.
        cache.put("k", &sample_catalog()).await.unwrap();
        assert!(cache.get("k").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_noop_cache() {
        let cache = NoOpCache;
        cache.put("k", &sample_catalog()).await.unwrap();
        assert!(cache.get("k").await.unwrap().is_none());
        assert_eq!(cache.cache_type(), "none");
    }
}
