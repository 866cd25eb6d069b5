//! Weir gateway - write ingress and status surface

use clap::Parser;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use weir::config::Args;
use weir::db::PgClient;
use weir::gateway::{AdmissionControl, WritePublisher};
use weir::nats::NatsClient;
use weir::{queue, server};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file if present
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
    info!("  Weir - write gateway");
    info!("======================================");
    info!("Node ID: {}", args.node_id);
    info!("Listen: {}", args.listen);
    info!("NATS: {}", args.nats.nats_url);
    info!(
        "Postgres: {}:{}/{}",
        args.db.db_host, args.db.db_port, args.db.db_name
    );
    info!("Max in flight: {}", args.admission.max_in_flight);
    info!(
        "Circuit breaker: {} failures, {}ms reset",
        args.admission.breaker_threshold, args.admission.breaker_reset_ms
    );
    info!("======================================");

    let nats = NatsClient::new(&args.nats, &format!("weir-gateway-{}", args.node_id)).await?;
    let jetstream = nats.jetstream();

    // The gateway publishes into the writes stream; ensure it exists with
    // the dedup window before accepting traffic.
    queue::ensure_writes_stream(&jetstream, args.nats.dedup_window()).await?;

    let db = PgClient::connect(&args.db)?;
    let publisher = WritePublisher::new(jetstream, args.admission.publish_timeout());
    let admission = AdmissionControl::new(&args.admission);

    let state = Arc::new(server::AppState::new(args, nats, publisher, admission, db));
    server::run(state).await?;

    info!("Gateway stopped");
    Ok(())
}
