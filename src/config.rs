//! Configuration for the weir binaries
//!
//! CLI arguments and environment variable handling using clap. The gateway,
//! write processor and CDC consumer all parse the same `Args`; each binary
//! reads the sections it needs.

use clap::Parser;
use std::net::SocketAddr;
use std::time::Duration;
use uuid::Uuid;

/// Weir - durable, idempotent asynchronous write pipeline
#[derive(Parser, Debug, Clone)]
#[command(name = "weir")]
#[command(about = "Durable write pipeline with CDC-driven cache invalidation")]
pub struct Args {
    /// Unique node identifier for this instance
    #[arg(long, env = "NODE_ID", default_value_t = Uuid::new_v4())]
    pub node_id: Uuid,

    /// Address the gateway listens on
    #[arg(long, env = "LISTEN", default_value = "0.0.0.0:8080")]
    pub listen: SocketAddr,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Queue connection settings
    #[command(flatten)]
    pub nats: NatsArgs,

    /// Relational store connection settings
    #[command(flatten)]
    pub db: DbArgs,

    /// Cache keystore settings
    #[command(flatten)]
    pub cache: CacheArgs,

    /// Gateway admission control settings
    #[command(flatten)]
    pub admission: AdmissionArgs,

    /// Write processor settings
    #[command(flatten)]
    pub processor: ProcessorArgs,
}

/// NATS connection configuration
#[derive(Parser, Debug, Clone)]
pub struct NatsArgs {
    /// NATS server URL
    #[arg(long, env = "NATS_URL", default_value = "nats://127.0.0.1:4222")]
    pub nats_url: String,

    /// NATS username (optional)
    #[arg(long, env = "NATS_USER")]
    pub nats_user: Option<String>,

    /// NATS password (optional)
    #[arg(long, env = "NATS_PASSWORD")]
    pub nats_password: Option<String>,

    /// Publisher dedup window on the writes stream, in seconds
    #[arg(long, env = "DEDUP_WINDOW_SECS", default_value = "120")]
    pub dedup_window_secs: u64,
}

impl NatsArgs {
    pub fn dedup_window(&self) -> Duration {
        Duration::from_secs(self.dedup_window_secs)
    }
}

/// PostgreSQL connection configuration
#[derive(Parser, Debug, Clone)]
pub struct DbArgs {
    /// PostgreSQL host
    #[arg(long, env = "DB_HOST", default_value = "localhost")]
    pub db_host: String,

    /// PostgreSQL port
    #[arg(long, env = "DB_PORT", default_value = "5432")]
    pub db_port: u16,

    /// Database name
    #[arg(long, env = "DB_NAME", default_value = "weir")]
    pub db_name: String,

    /// Database user
    #[arg(long, env = "DB_USER", default_value = "postgres")]
    pub db_user: String,

    /// Database password
    #[arg(long, env = "DB_PASSWORD", default_value = "")]
    pub db_password: String,

    /// Maximum pool size
    #[arg(long, env = "DB_POOL_SIZE", default_value = "16")]
    pub db_pool_size: usize,
}

/// Redis cache keystore configuration
#[derive(Parser, Debug, Clone)]
pub struct CacheArgs {
    /// Redis server URL
    #[arg(long, env = "REDIS_URL", default_value = "redis://127.0.0.1:6379")]
    pub redis_url: String,

    /// TTL of individual cache entries, in seconds
    #[arg(long, env = "CACHE_ENTRY_TTL_SECS", default_value = "300")]
    pub entry_ttl_secs: u64,

    /// Tracking-set TTL as a multiple of the entry TTL (must be at least 2)
    #[arg(long, env = "CACHE_SET_TTL_FACTOR", default_value = "2")]
    pub set_ttl_factor: u64,
}

impl CacheArgs {
    pub fn entry_ttl(&self) -> Duration {
        Duration::from_secs(self.entry_ttl_secs)
    }

    /// Tracking sets outlive the entries they list, so a live key is never
    /// missing from its set.
    pub fn set_ttl(&self) -> Duration {
        Duration::from_secs(self.entry_ttl_secs * self.set_ttl_factor)
    }
}

/// Gateway admission control configuration
#[derive(Parser, Debug, Clone)]
pub struct AdmissionArgs {
    /// Maximum concurrent publishes before requests are rejected
    #[arg(long, env = "MAX_IN_FLIGHT", default_value = "256")]
    pub max_in_flight: usize,

    /// Consecutive publish failures that open the circuit
    #[arg(long, env = "BREAKER_THRESHOLD", default_value = "5")]
    pub breaker_threshold: u32,

    /// How long the circuit stays open before admitting a probe, in milliseconds
    #[arg(long, env = "BREAKER_RESET_MS", default_value = "10000")]
    pub breaker_reset_ms: u64,

    /// Overall timeout for one publish, in milliseconds
    #[arg(long, env = "PUBLISH_TIMEOUT_MS", default_value = "5000")]
    pub publish_timeout_ms: u64,
}

impl AdmissionArgs {
    pub fn breaker_reset(&self) -> Duration {
        Duration::from_millis(self.breaker_reset_ms)
    }

    pub fn publish_timeout(&self) -> Duration {
        Duration::from_millis(self.publish_timeout_ms)
    }
}

/// Write processor configuration
#[derive(Parser, Debug, Clone)]
pub struct ProcessorArgs {
    /// Maximum delivery attempts before a message is dead-lettered
    #[arg(long, env = "MAX_DELIVER", default_value = "5")]
    pub max_deliver: u32,

    /// Ack deadline per delivery, in seconds
    #[arg(long, env = "ACK_WAIT_SECS", default_value = "30")]
    pub ack_wait_secs: u64,

    /// Messages fetched per batch
    #[arg(long, env = "BATCH_SIZE", default_value = "16")]
    pub batch_size: usize,

    /// Maximum unacknowledged deliveries per consumer
    #[arg(long, env = "MAX_ACK_PENDING", default_value = "64")]
    pub max_ack_pending: i64,

    /// Redelivery delay after a retryable failure, in milliseconds
    #[arg(long, env = "NAK_DELAY_MS", default_value = "1000")]
    pub nak_delay_ms: u64,

    /// Promote stale pending ledger rows to failed
    #[arg(long, env = "SWEEPER_ENABLED", default_value = "false")]
    pub sweeper_enabled: bool,

    /// Age after which a pending row is considered stale, in seconds
    #[arg(long, env = "SWEEPER_GRACE_SECS", default_value = "3600")]
    pub sweeper_grace_secs: u64,

    /// Interval between sweeper passes, in seconds
    #[arg(long, env = "SWEEPER_INTERVAL_SECS", default_value = "300")]
    pub sweeper_interval_secs: u64,
}

impl ProcessorArgs {
    pub fn ack_wait(&self) -> Duration {
        Duration::from_secs(self.ack_wait_secs)
    }

    pub fn nak_delay(&self) -> Duration {
        Duration::from_millis(self.nak_delay_ms)
    }
}

impl Args {
    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.admission.max_in_flight == 0 {
            return Err("MAX_IN_FLIGHT must be greater than zero".to_string());
        }
        if self.admission.breaker_threshold == 0 {
            return Err("BREAKER_THRESHOLD must be greater than zero".to_string());
        }
        if self.processor.max_deliver == 0 {
            return Err("MAX_DELIVER must be greater than zero".to_string());
        }
        if self.cache.set_ttl_factor < 2 {
            return Err("CACHE_SET_TTL_FACTOR must be at least 2".to_string());
        }
        if self.db.db_pool_size == 0 {
            return Err("DB_POOL_SIZE must be greater than zero".to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn default_args() -> Args {
        Args::parse_from(["weir"])
    }

    #[test]
    fn test_defaults_validate() {
        assert!(default_args().validate().is_ok());
    }

    #[test]
    fn test_zero_in_flight_rejected() {
        let mut args = default_args();
        args.admission.max_in_flight = 0;
        assert!(args.validate().is_err());
    }

    #[test]
    fn test_set_ttl_factor_floor() {
        let mut args = default_args();
        args.cache.set_ttl_factor = 1;
        assert!(args.validate().is_err());
    }

    #[test]
    fn test_set_ttl_outlives_entry_ttl() {
        let args = default_args();
        assert!(args.cache.set_ttl() >= args.cache.entry_ttl() * 2);
    }
}
