//! The write protocol
//!
//! Applies one delivered message against the relational store with
//! at-most-once effect. The ledger's primary key is the idempotency pivot:
//! the first pending insert wins, and every redelivery of the same operation
//! short-circuits on the conflict. The pending insert, domain insert and
//! completed transition commit in one transaction, so no observer sees a
//! completed status without its domain row.

use async_nats::jetstream::{AckKind, Message};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::dlq::DeadLetter;
use super::handler::{DomainError, TableHandler};
use super::retry;
use super::ProcessorContext;
use crate::db::ledger;
use crate::types::{OpType, Result, WeirError, WriteRequest};

/// Outcome of a committed protocol run
enum Applied {
    Committed,
    Duplicate,
}

/// Failure of a protocol run, split by retryability
enum WriteFailure {
    Retryable(String),
    NonRetryable(String),
}

/// Whether the current delivery is the last one the queue will make
fn is_final_attempt(deliveries: i64, max_deliver: i64) -> bool {
    deliveries >= max_deliver
}

/// Run the write protocol for one delivered message.
///
/// Every path through this function acknowledges the message exactly one
/// way: ack, nak with delay, or DLQ-publish-then-ack.
pub async fn process_message(handler: &TableHandler, ctx: &ProcessorContext, msg: Message) {
    let info = msg.info().map(|info| info.delivered);
    let deliveries = match info {
        Ok(deliveries) => deliveries,
        Err(e) => {
            error!("Message carried no delivery info: {}", e);
            ack(msg).await;
            return;
        }
    };

    let decoded = WriteRequest::decode(&msg.payload);
    let request = match decoded {
        Ok(r) => r,
        Err(e) => {
            // A malformed record can never succeed on redelivery.
            warn!(subject = %msg.subject, error = %e, "Dropping undecodable write message");
            ack(msg).await;
            return;
        }
    };

    let operation_id = request.operation_id;
    let entity_id = Uuid::new_v4();

    match apply_write(handler, ctx, &request, entity_id).await {
        Ok(Applied::Committed) => {
            // Invalidation is advisory here; the CDC consumer and entry TTLs
            // converge the cache if it fails.
            let namespace = handler.namespace();
            match ctx.cache.invalidate_namespace(namespace).await {
                Ok(deleted) => {
                    debug!(%namespace, deleted, "Invalidated cache namespace after write")
                }
                Err(e) => warn!(%namespace, error = %e, "Cache invalidation failed"),
            }
            info!(
                %operation_id,
                table = %handler.table,
                %entity_id,
                "Write completed"
            );
            ack(msg).await;
        }
        Ok(Applied::Duplicate) => {
            debug!(%operation_id, "Duplicate operation, skip");
            ack(msg).await;
        }
        Err(WriteFailure::NonRetryable(message)) => {
            // The transaction already rolled back; record the terminal
            // failure so status polling can observe it. Best effort.
            if let Err(e) = record_failure(ctx, &request, entity_id, &message).await {
                warn!(%operation_id, error = %e, "Failed to record terminal failure");
            }
            warn!(%operation_id, error = %message, "Write failed, not retryable");
            ack(msg).await;
        }
        Err(WriteFailure::Retryable(message)) => {
            if is_final_attempt(deliveries, ctx.max_deliver) {
                route_to_dlq(handler, ctx, msg, operation_id, message, deliveries).await;
            } else {
                warn!(
                    %operation_id,
                    attempt = deliveries,
                    error = %message,
                    "Write attempt failed, redelivering"
                );
                if let Err(e) = msg.ack_with(AckKind::Nak(Some(ctx.nak_delay))).await {
                    warn!("Failed to nak message: {}", e);
                }
            }
        }
    }
}

/// Steps 2 through 7 of the protocol: one transaction around the pending
/// insert, the domain insert and the completed transition. Dropping the
/// transaction on any early return rolls it back.
async fn apply_write(
    handler: &TableHandler,
    ctx: &ProcessorContext,
    request: &WriteRequest,
    entity_id: Uuid,
) -> std::result::Result<Applied, WriteFailure> {
    let mut conn = ctx
        .db
        .get()
        .await
        .map_err(|e| WriteFailure::Retryable(e.to_string()))?;
    let tx = conn.transaction().await.map_err(classify_db)?;

    let inserted = ledger::insert_pending(
        &tx,
        request.operation_id,
        request.table,
        entity_id,
        OpType::Create,
    )
    .await
    .map_err(classify_db)?;

    if !inserted {
        return Ok(Applied::Duplicate);
    }

    handler
        .insert_domain(&tx, entity_id, &request.data)
        .await
        .map_err(|e| match e {
            DomainError::Payload(e) => {
                WriteFailure::NonRetryable(format!("payload does not match schema: {}", e))
            }
            DomainError::Db(e) => classify_db(e),
        })?;

    ledger::mark_completed(&tx, request.operation_id)
        .await
        .map_err(classify_db)?;
    tx.commit().await.map_err(classify_db)?;

    Ok(Applied::Committed)
}

fn classify_db(err: tokio_postgres::Error) -> WriteFailure {
    let message = match err.as_db_error() {
        Some(db) => db.message().to_string(),
        None => err.to_string(),
    };
    if retry::is_retryable(&err) {
        WriteFailure::Retryable(message)
    } else {
        WriteFailure::NonRetryable(message)
    }
}

async fn record_failure(
    ctx: &ProcessorContext,
    request: &WriteRequest,
    entity_id: Uuid,
    message: &str,
) -> Result<()> {
    let conn = ctx.db.get().await?;
    ledger::record_failure(
        &conn,
        request.operation_id,
        request.table,
        entity_id,
        OpType::Create,
        message,
    )
    .await
    .map_err(WeirError::from)
}

/// Copy the message to the DLQ, then ack the original. The likely cause of
/// reaching this point is store unavailability, so no ledger write is
/// attempted; the row stays pending for the sweeper or an operator replay.
async fn route_to_dlq(
    handler: &TableHandler,
    ctx: &ProcessorContext,
    msg: Message,
    operation_id: Uuid,
    error: String,
    deliveries: i64,
) {
    let letter = DeadLetter {
        subject: msg.subject.to_string(),
        operation_id: Some(operation_id),
        payload: msg.payload.to_vec(),
        error,
        deliveries,
    };

    match ctx.dlq.publish(handler.table, &letter).await {
        Ok(()) => {
            warn!(%operation_id, deliveries, "Retry budget exhausted, routed to DLQ");
            ack(msg).await;
        }
        Err(e) => {
            // Without a durable DLQ record the original must not be acked;
            // it stays on the stream for operator recovery.
            error!(%operation_id, error = %e, "DLQ publish failed, leaving message unacked");
        }
    }
}

async fn ack(msg: Message) {
    if let Err(e) = msg.ack().await {
        warn!("Failed to ack message: {}", e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_final_attempt_boundary() {
        let max_deliver = 5;
        // Attempts before the budget nak for redelivery.
        assert!(!is_final_attempt(1, max_deliver));
        assert!(!is_final_attempt(max_deliver - 1, max_deliver));
        // The attempt that reaches the budget routes to the DLQ.
        assert!(is_final_attempt(max_deliver, max_deliver));
        assert!(is_final_attempt(max_deliver + 1, max_deliver));
    }

    #[test]
    fn test_single_attempt_budget_goes_straight_to_dlq() {
        assert!(is_final_attempt(1, 1));
    }
}
