//! Schema metadata: reflection from PostgreSQL plus the revision-keyed cache.

mod cache;
mod postgres;

pub use cache::{JsonFileCache, MetadataCache, NoOpCache, DEFAULT_CACHE_PATH};
pub use postgres::{reflect, schema_revision};

use tokio_postgres::Client;
use tracing::{debug, info, warn};

use crate::core::Catalog;
use crate::error::Result;

/// Cache key for one schema at one revision.
pub fn cache_key(schema: &str, revision: &str) -> String {
    format!("{}:{}", schema, revision)
}

/// Load the catalog of `schema`, from `cache` when the revision is known.
///
/// Databases without a revision tag are always reflected and never cached.
pub async fn load_catalog(
    client: &Client,
    schema: &str,
    cache: &dyn MetadataCache,
    role: &str,
) -> Result<Catalog> {
    let revision = schema_revision(client, schema).await?;

    let Some(revision) = revision else {
        debug!("{} has no schema revision; reflecting without cache", role);
        return reflect(client, schema).await;
    };
    debug!("{} schema revision: {}", role, revision);

    let key = cache_key(schema, &revision);
    match cache.get(&key).await {
        Ok(Some(catalog)) => {
            debug!("Using cached {} metadata ({})", role, cache.cache_type());
            return Ok(catalog);
        }
        Ok(None) => {}
        Err(e) => warn!("Ignoring unreadable metadata cache: {}", e),
    }

    info!("Reflecting {} metadata", role);
    let catalog = reflect(client, schema).await?;
    if let Err(e) = cache.put(&key, &catalog).await {
        warn!("Failed to store {} metadata in cache: {}", role, e);
    }

    Ok(catalog)
}
