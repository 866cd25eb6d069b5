//! Redis-backed cache keystore
//!
//! Tracked-key writes and namespace-scoped invalidation. Every write is one
//! atomic MULTI/EXEC pipeline, so an entry can never be live without being a
//! member of its namespace's tracking set. Invalidation touches only the
//! keys listed in that set; the cost is proportional to the live keys of the
//! namespace, not the keyspace.

use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use std::time::Duration;
use tracing::info;

use super::keys::Namespace;
use crate::config::CacheArgs;
use crate::types::{Result, WeirError};

/// TTL settings for tracked entries
#[derive(Debug, Clone)]
pub struct KeystoreConfig {
    /// TTL of individual data entries
    pub entry_ttl: Duration,
    /// TTL of the per-namespace tracking set, refreshed on every insertion.
    /// Must exceed the entry TTL so membership can be stale but never missing.
    pub set_ttl: Duration,
}

impl From<&CacheArgs> for KeystoreConfig {
    fn from(args: &CacheArgs) -> Self {
        Self {
            entry_ttl: args.entry_ttl(),
            set_ttl: args.set_ttl(),
        }
    }
}

/// Cache keystore client
#[derive(Clone)]
pub struct CacheKeystore {
    conn: ConnectionManager,
    config: KeystoreConfig,
}

impl CacheKeystore {
    /// Connect to the cache store
    pub async fn connect(url: &str, config: KeystoreConfig) -> Result<Self> {
        let client = redis::Client::open(url)
            .map_err(|e| WeirError::Cache(format!("Invalid Redis URL: {}", e)))?;
        let conn = client
            .get_connection_manager()
            .await
            .map_err(|e| WeirError::Cache(format!("Failed to connect to Redis: {}", e)))?;

        info!("Connected to Redis at {}", url);
        Ok(Self { conn, config })
    }

    /// Store a cache entry and register it in its namespace's tracking set
    pub async fn put_tracked(&self, ns: Namespace, key: &str, value: &[u8]) -> Result<()> {
        let mut conn = self.conn.clone();
        let set_key = ns.tracking_set();

        let mut pipe = redis::pipe();
        pipe.atomic()
            .set_ex(key, value, self.config.entry_ttl.as_secs())
            .ignore()
            .sadd(&set_key, key)
            .ignore()
            .expire(&set_key, self.config.set_ttl.as_secs() as i64)
            .ignore();

        let _: () = pipe
            .query_async(&mut conn)
            .await
            .map_err(|e| WeirError::Cache(format!("put_tracked failed for {}: {}", key, e)))?;
        Ok(())
    }

    /// Delete every tracked key in the namespace plus the tracking set
    /// itself. Returns the number of data keys removed. Members whose
    /// entries already expired delete as no-ops.
    pub async fn invalidate_namespace(&self, ns: Namespace) -> Result<u64> {
        let mut conn = self.conn.clone();
        let set_key = ns.tracking_set();

        let members: Vec<String> = conn
            .smembers(&set_key)
            .await
            .map_err(|e| WeirError::Cache(format!("smembers {} failed: {}", set_key, e)))?;

        if members.is_empty() {
            let _: i64 = conn
                .del(&set_key)
                .await
                .map_err(|e| WeirError::Cache(format!("del {} failed: {}", set_key, e)))?;
            return Ok(0);
        }

        let mut pipe = redis::pipe();
        pipe.atomic();
        pipe.del(&members);
        pipe.del(&set_key).ignore();

        let (deleted,): (i64,) = pipe
            .query_async(&mut conn)
            .await
            .map_err(|e| WeirError::Cache(format!("invalidate {} failed: {}", ns, e)))?;

        Ok(deleted.max(0) as u64)
    }
}
