//! Weir write processor - durable consumers applying the write protocol

use clap::Parser;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use weir::cache::{CacheKeystore, KeystoreConfig};
use weir::config::Args;
use weir::db::PgClient;
use weir::nats::NatsClient;
use weir::processor::sweeper::{spawn_sweeper_task, SweeperConfig};
use weir::processor::{self, DlqPublisher, ProcessorContext};
use weir::queue;
use weir::types::EntityTable;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    let args = Args::parse();

    let log_level = args.log_level.clone();
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("weir={},info", log_level).into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    if let Err(e) = args.validate() {
        error!("Configuration error: {}", e);
        std::process::exit(1);
    }

    info!("======================================");
    info!("  Weir - write processor");
    info!("======================================");
    info!("Node ID: {}", args.node_id);
    info!("NATS: {}", args.nats.nats_url);
    info!(
        "Postgres: {}:{}/{}",
        args.db.db_host, args.db.db_port, args.db.db_name
    );
    info!("Redis: {}", args.cache.redis_url);
    info!(
        "Tables: {}",
        EntityTable::ALL
            .iter()
            .map(|t| t.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    );
    info!(
        "Retry budget: {} deliveries, ack wait {}s",
        args.processor.max_deliver, args.processor.ack_wait_secs
    );
    info!("Sweeper: {}", if args.processor.sweeper_enabled { "enabled" } else { "disabled" });
    info!("======================================");

    let nats = NatsClient::new(&args.nats, &format!("weir-processor-{}", args.node_id)).await?;
    let jetstream = nats.jetstream();

    let stream = queue::ensure_writes_stream(&jetstream, args.nats.dedup_window()).await?;
    queue::ensure_dlq_stream(&jetstream).await?;

    let db = PgClient::connect(&args.db)?;
    db.init_schema().await?;

    let cache = CacheKeystore::connect(&args.cache.redis_url, KeystoreConfig::from(&args.cache)).await?;

    let ctx = Arc::new(ProcessorContext {
        db: db.clone(),
        cache,
        dlq: DlqPublisher::new(jetstream.clone()),
        nak_delay: args.processor.nak_delay(),
        max_deliver: args.processor.max_deliver as i64,
    });

    let (running, handles) = processor::spawn_workers(Arc::clone(&ctx), &stream, &args.processor).await?;

    let sweeper = if args.processor.sweeper_enabled {
        Some(spawn_sweeper_task(
            db.clone(),
            SweeperConfig {
                grace: std::time::Duration::from_secs(args.processor.sweeper_grace_secs),
                interval: std::time::Duration::from_secs(args.processor.sweeper_interval_secs),
            },
        ))
    } else {
        None
    };

    info!("Processor running, press ctrl-c to stop");
    tokio::signal::ctrl_c().await?;

    // Stop intake, drain in-flight batches, then close clients with the
    // queue connection last.
    info!("Shutdown requested, draining in-flight work");
    *running.write().await = false;
    for handle in handles {
        let _ = handle.await;
    }
    if let Some(sweeper) = sweeper {
        sweeper.abort();
    }
    nats.flush().await.ok();

    info!("Processor stopped");
    Ok(())
}
