//! Idempotency ledger operations
//!
//! The unique constraint on `operation_id` is the only coordination between
//! processor replicas: the first pending insert wins and every redelivery of
//! the same operation short-circuits on the conflict. Terminal states are
//! never overwritten.
//!
//! Functions that run inside the write protocol return raw
//! `tokio_postgres::Error` so the caller can classify retryability; the
//! status projection read maps into `WeirError` directly.

use tokio_postgres::error::SqlState;
use tokio_postgres::{Row, Transaction};
use uuid::Uuid;

use super::PgClient;
use crate::types::{EntityTable, OpType, Operation, Result, WeirError};

/// Insert the pending ledger row inside the write transaction.
///
/// Returns `Ok(false)` when the operation id is already recorded, which is
/// the duplicate-delivery case. Any other failure propagates unchanged.
pub async fn insert_pending(
    tx: &Transaction<'_>,
    operation_id: Uuid,
    table: EntityTable,
    entity_id: Uuid,
    op_type: OpType,
) -> std::result::Result<bool, tokio_postgres::Error> {
    let result = tx
        .execute(
            "INSERT INTO write_operations (operation_id, entity_table, entity_id, op_type, status) \
             VALUES ($1, $2, $3, $4, 'pending')",
            &[&operation_id, &table.as_str(), &entity_id, &op_type.as_str()],
        )
        .await;

    match result {
        Ok(_) => Ok(true),
        Err(e) if is_operation_conflict(&e) => Ok(false),
        Err(e) => Err(e),
    }
}

fn is_operation_conflict(err: &tokio_postgres::Error) -> bool {
    err.as_db_error().is_some_and(|db| {
        db.code() == &SqlState::UNIQUE_VIOLATION
            && db.constraint() == Some("write_operations_pkey")
    })
}

/// Transition the pending row to completed, inside the same transaction as
/// the domain insert.
pub async fn mark_completed(
    tx: &Transaction<'_>,
    operation_id: Uuid,
) -> std::result::Result<(), tokio_postgres::Error> {
    tx.execute(
        "UPDATE write_operations \
         SET status = 'completed', completed_at = now() \
         WHERE operation_id = $1 AND status = 'pending'",
        &[&operation_id],
    )
    .await?;
    Ok(())
}

/// Record a terminal failure after the write transaction rolled back.
///
/// Upsert keyed on the operation id; the guard on `status = 'pending'`
/// leaves rows that already reached a terminal state untouched.
pub async fn record_failure(
    client: &tokio_postgres::Client,
    operation_id: Uuid,
    table: EntityTable,
    entity_id: Uuid,
    op_type: OpType,
    error: &str,
) -> std::result::Result<(), tokio_postgres::Error> {
    client
        .execute(
            "INSERT INTO write_operations \
             (operation_id, entity_table, entity_id, op_type, status, error, completed_at) \
             VALUES ($1, $2, $3, $4, 'failed', $5, now()) \
             ON CONFLICT (operation_id) DO UPDATE \
             SET status = 'failed', error = EXCLUDED.error, completed_at = EXCLUDED.completed_at \
             WHERE write_operations.status = 'pending'",
            &[
                &operation_id,
                &table.as_str(),
                &entity_id,
                &op_type.as_str(),
                &error,
            ],
        )
        .await?;
    Ok(())
}

/// Status projection read for the poll API
pub async fn fetch_status(db: &PgClient, operation_id: Uuid) -> Result<Option<Operation>> {
    let conn = db.get().await?;
    let row = conn
        .query_opt(
            "SELECT operation_id, entity_table, entity_id, op_type, status, error, \
                    created_at, completed_at \
             FROM write_operations WHERE operation_id = $1",
            &[&operation_id],
        )
        .await
        .map_err(WeirError::from)?;

    row.map(row_to_operation).transpose()
}

fn row_to_operation(row: Row) -> Result<Operation> {
    let entity_table: String = row.get(1);
    let op_type: String = row.get(3);
    let status: String = row.get(4);

    Ok(Operation {
        operation_id: row.get(0),
        entity_table: entity_table.parse()?,
        entity_id: row.get(2),
        op_type: op_type.parse()?,
        status: status.parse()?,
        error: row.get(5),
        created_at: row.get(6),
        completed_at: row.get(7),
    })
}
