//! PostgreSQL connection pooling
//!
//! Connection pooling via deadpool-postgres. The processor applies the
//! embedded schema at startup; the gateway only reads the ledger through
//! the same pool type.

pub mod ledger;
pub mod tables;

use deadpool_postgres::{Config, ManagerConfig, Object, Pool, PoolConfig, RecyclingMethod, Runtime};
use tokio_postgres::NoTls;
use tracing::info;

use crate::config::DbArgs;
use crate::types::{Result, WeirError};

/// Schema applied by the processor at startup (idempotent).
const SCHEMA: &str = include_str!("schema.sql");

/// Pooled PostgreSQL client
#[derive(Clone)]
pub struct PgClient {
    pool: Pool,
}

impl PgClient {
    /// Create a connection pool from configuration
    pub fn connect(args: &DbArgs) -> Result<Self> {
        let mut cfg = Config::new();
        cfg.host = Some(args.db_host.clone());
        cfg.port = Some(args.db_port);
        cfg.dbname = Some(args.db_name.clone());
        cfg.user = Some(args.db_user.clone());
        cfg.password = Some(args.db_password.clone());
        cfg.manager = Some(ManagerConfig {
            recycling_method: RecyclingMethod::Fast,
        });
        cfg.pool = Some(PoolConfig::new(args.db_pool_size));

        let pool = cfg
            .create_pool(Some(Runtime::Tokio1), NoTls)
            .map_err(|e| WeirError::Database(format!("Failed to create pool: {}", e)))?;

        Ok(Self { pool })
    }

    /// Get a connection from the pool
    pub async fn get(&self) -> Result<Object> {
        self.pool.get().await.map_err(WeirError::from)
    }

    /// Apply the embedded schema, statement by statement. Safe to run on
    /// every startup.
    pub async fn init_schema(&self) -> Result<()> {
        let conn = self.get().await?;
        for statement in schema_statements(SCHEMA) {
            conn.batch_execute(statement)
                .await
                .map_err(|e| WeirError::Database(format!("Schema statement failed: {}", e)))?;
        }
        info!("Database schema applied");
        Ok(())
    }
}

fn schema_statements(schema: &str) -> Vec<&str> {
    schema
        .split(';')
        .filter_map(|statement| {
            let trimmed = statement.trim();
            if trimmed.is_empty() {
                return None;
            }
            let has_sql = trimmed.lines().any(|line| {
                let line = line.trim();
                !line.is_empty() && !line.starts_with("--")
            });
            has_sql.then_some(trimmed)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_splits_into_nonempty_statements() {
        let statements = schema_statements(SCHEMA);
        assert!(statements.len() >= 4);
        for statement in statements {
            assert!(!statement.trim().is_empty());
        }
    }

    #[test]
    fn test_schema_statements_skips_comment_only_chunks() {
        let statements = schema_statements("-- just a comment\n;CREATE TABLE t (id int);");
        assert_eq!(statements.len(), 1);
        assert!(statements[0].starts_with("CREATE TABLE"));
    }
}
