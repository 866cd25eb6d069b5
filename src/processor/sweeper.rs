//! Stale-pending sweeper
//!
//! A processor crash between the pending insert and the terminal transition,
//! or a final retry routed to the DLQ, leaves a ledger row pending with no
//! message left to finish it. This optional task promotes rows older than a
//! grace period to failed so pollers stop waiting.

use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{info, warn};

use crate::db::PgClient;
use crate::types::Result;

/// Error message written to promoted rows
pub const SWEEP_ERROR: &str = "expired before completion";

#[derive(Debug, Clone)]
pub struct SweeperConfig {
    /// Age after which a pending row is considered stale
    pub grace: Duration,
    /// Interval between passes
    pub interval: Duration,
}

/// Spawn the sweeper background task
pub fn spawn_sweeper_task(db: PgClient, config: SweeperConfig) -> JoinHandle<()> {
    info!(
        grace_secs = config.grace.as_secs(),
        interval_secs = config.interval.as_secs(),
        "Stale-pending sweeper enabled"
    );

    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(config.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            match sweep(&db, config.grace).await {
                Ok(0) => {}
                Ok(promoted) => {
                    info!(promoted, "Promoted stale pending operations to failed")
                }
                Err(e) => warn!(error = %e, "Sweeper pass failed"),
            }
        }
    })
}

/// One sweeper pass. Only pending rows are touched, so terminal states stay
/// terminal.
pub async fn sweep(db: &PgClient, grace: Duration) -> Result<u64> {
    let conn = db.get().await?;
    let grace_secs = grace.as_secs() as f64;

    let promoted = conn
        .execute(
            "UPDATE write_operations \
             SET status = 'failed', error = $2, completed_at = now() \
             WHERE status = 'pending' \
               AND created_at < now() - make_interval(secs => $1)",
            &[&grace_secs, &SWEEP_ERROR],
        )
        .await?;

    Ok(promoted)
}
