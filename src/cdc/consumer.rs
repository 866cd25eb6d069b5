//! CDC consumption loop
//!
//! Tails the database's row-change stream and invalidates the affected
//! cache namespaces. Invalidations are idempotent and commutative, so the
//! durable cursor can start at the beginning of the stream and replicas can
//! scale horizontally without coordination.

use async_nats::jetstream::consumer::PullConsumer;
use async_nats::jetstream::{AckKind, Message};
use futures_util::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use super::event::{ChangeOp, RowChange};
use crate::cache::{CacheKeystore, Namespace};
use crate::types::{EntityTable, Result, WeirError};

/// Batch size for the endless message stream
const BATCH_SIZE: usize = 64;

/// Idle heartbeat so a quiet stream does not look like a dead connection
const IDLE_HEARTBEAT: Duration = Duration::from_secs(15);

/// CDC consumer over the row-change stream
pub struct CdcConsumer {
    consumer: PullConsumer,
    cache: CacheKeystore,
    nak_delay: Duration,
    running: Arc<RwLock<bool>>,
}

impl CdcConsumer {
    pub fn new(consumer: PullConsumer, cache: CacheKeystore, nak_delay: Duration) -> Self {
        Self {
            consumer,
            cache,
            nak_delay,
            running: Arc::new(RwLock::new(true)),
        }
    }

    /// Flag that stops the loop when set to false
    pub fn shutdown_handle(&self) -> Arc<RwLock<bool>> {
        Arc::clone(&self.running)
    }

    /// Run the consumption loop
    pub async fn run(&self) -> Result<()> {
        let mut messages = self
            .consumer
            .stream()
            .max_messages_per_batch(BATCH_SIZE)
            .heartbeat(IDLE_HEARTBEAT)
            .messages()
            .await
            .map_err(|e| WeirError::Queue(format!("Failed to open CDC stream: {}", e)))?;

        info!("CDC consumer started");

        while *self.running.read().await {
            let msg = tokio::select! {
                next = messages.next() => match next {
                    Some(Ok(msg)) => msg,
                    Some(Err(e)) => {
                        warn!("Error receiving CDC message: {}", e);
                        continue;
                    }
                    None => break,
                },
                // Periodic wakeup so the running flag is observed on a
                // quiet stream.
                _ = tokio::time::sleep(Duration::from_secs(1)) => continue,
            };

            self.handle(msg).await;
        }

        info!("CDC consumer stopped");
        Ok(())
    }

    async fn handle(&self, msg: Message) {
        let decoded = RowChange::decode(&msg.payload);
        let change = match decoded {
            Ok(change) => change,
            Err(e) => {
                warn!(subject = %msg.subject, error = %e, "Dropping undecodable CDC event");
                ack(msg).await;
                return;
            }
        };

        // Initial-snapshot reads replay rows that were never cached as new.
        if change.op == ChangeOp::SnapshotRead {
            ack(msg).await;
            return;
        }

        match self.invalidate(&change).await {
            Ok(deleted) => {
                debug!(
                    table = %change.table,
                    op = ?change.op,
                    deleted,
                    "Invalidated after row change"
                );
                ack(msg).await;
            }
            Err(e) => {
                // Entries carry a bounded TTL; redeliver shortly anyway.
                warn!(table = %change.table, error = %e, "Invalidation failed, redelivering");
                if let Err(e) = msg.ack_with(AckKind::Nak(Some(self.nak_delay))).await {
                    warn!("Failed to nak CDC message: {}", e);
                }
            }
        }
    }

    async fn invalidate(&self, change: &RowChange) -> Result<u64> {
        let mut deleted = 0;
        for namespace in fan_out(change) {
            deleted += self.cache.invalidate_namespace(namespace).await?;
        }
        Ok(deleted)
    }
}

/// Namespaces affected by one row change. Deleting a user cascades to its
/// orders, so dependent order views are dropped too.
fn fan_out(change: &RowChange) -> Vec<Namespace> {
    match (change.table, change.op) {
        (EntityTable::Users, ChangeOp::Delete) => vec![Namespace::Users, Namespace::Orders],
        (EntityTable::Users, _) => vec![Namespace::Users],
        (EntityTable::Orders, _) => vec![Namespace::Orders],
    }
}

async fn ack(msg: Message) {
    if let Err(e) = msg.ack().await {
        warn!("Failed to ack CDC message: {}", e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn change(table: EntityTable, op: ChangeOp) -> RowChange {
        RowChange {
            op,
            table,
            primary_key: None,
            source_ts_ms: 0,
        }
    }

    #[test]
    fn test_user_changes_invalidate_users() {
        let namespaces = fan_out(&change(EntityTable::Users, ChangeOp::Create));
        assert_eq!(namespaces, vec![Namespace::Users]);

        let namespaces = fan_out(&change(EntityTable::Users, ChangeOp::Update));
        assert_eq!(namespaces, vec![Namespace::Users]);
    }

    #[test]
    fn test_user_delete_cascades_to_orders() {
        let namespaces = fan_out(&change(EntityTable::Users, ChangeOp::Delete));
        assert_eq!(namespaces, vec![Namespace::Users, Namespace::Orders]);
    }

    #[test]
    fn test_order_changes_stay_in_orders() {
        for op in [ChangeOp::Create, ChangeOp::Update, ChangeOp::Delete] {
            let namespaces = fan_out(&change(EntityTable::Orders, op));
            assert_eq!(namespaces, vec![Namespace::Orders]);
        }
    }
}
