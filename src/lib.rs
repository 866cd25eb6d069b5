//! Weir - durable, idempotent asynchronous write pipeline
//!
//! Clients submit mutations over HTTP to the gateway, which publishes one
//! durable record per logical operation to NATS JetStream. Per-table
//! processors apply each operation at most once to Postgres through an
//! idempotency ledger, and a CDC consumer invalidates Redis read views from
//! the database's logical replication feed.

pub mod cache;
pub mod cdc;
pub mod config;
pub mod db;
pub mod gateway;
pub mod nats;
pub mod processor;
pub mod queue;
pub mod routes;
pub mod server;
pub mod types;

pub use types::{Result, WeirError};
