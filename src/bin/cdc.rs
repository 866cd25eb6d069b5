//! Weir CDC consumer - cache invalidation from the replication feed

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use weir::cache::{CacheKeystore, KeystoreConfig};
use weir::cdc::CdcConsumer;
use weir::config::Args;
use weir::nats::NatsClient;
use weir::queue;

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
    info!("  Weir - CDC consumer");
    info!("======================================");
    info!("Node ID: {}", args.node_id);
    info!("NATS: {}", args.nats.nats_url);
    info!("Redis: {}", args.cache.redis_url);
    info!("======================================");

    let nats = NatsClient::new(&args.nats, &format!("weir-cdc-{}", args.node_id)).await?;
    let jetstream = nats.jetstream();

    let consumer = queue::cdc_consumer(&jetstream).await?;
    let cache = CacheKeystore::connect(&args.cache.redis_url, KeystoreConfig::from(&args.cache)).await?;

    let cdc = CdcConsumer::new(consumer, cache, args.processor.nak_delay());
    let running = cdc.shutdown_handle();

    let handle = tokio::spawn(async move {
        if let Err(e) = cdc.run().await {
            error!("CDC consumer failed: {}", e);
        }
    });

    tokio::signal::ctrl_c().await?;
    info!("Shutdown requested, draining CDC consumer");
    *running.write().await = false;
    let _ = handle.await;
    nats.flush().await.ok();

    info!("CDC consumer stopped");
    Ok(())
}
