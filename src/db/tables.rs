//! Domain tables and their input schemas
//!
//! Payloads are validated against these schemas once at the ingress boundary
//! and parsed again by the processor inside the write transaction. Domain
//! rows are created only there, in the same transaction that completes the
//! operation's ledger row.

use serde::{Deserialize, Serialize};
use tokio_postgres::Transaction;
use uuid::Uuid;

use crate::types::{EntityTable, Result, WeirError};

/// Input schema for `POST /users`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UserInput {
    pub name: String,
    pub email: String,
}

/// Input schema for `POST /orders`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct OrderInput {
    pub user_id: Uuid,
    pub item: String,
    pub quantity: i32,
}

/// Validate a raw payload against the table's input schema
pub fn validate_payload(table: EntityTable, data: &[u8]) -> Result<()> {
    let outcome = match table {
        EntityTable::Users => serde_json::from_slice::<UserInput>(data).map(drop),
        EntityTable::Orders => serde_json::from_slice::<OrderInput>(data).map(drop),
    };
    outcome.map_err(|e| {
        WeirError::InvalidRequest(format!("Body does not match the {} schema: {}", table, e))
    })
}

/// Insert a user row with the processor-allocated entity id
pub async fn insert_user(
    tx: &Transaction<'_>,
    user_id: Uuid,
    input: &UserInput,
) -> std::result::Result<(), tokio_postgres::Error> {
    tx.execute(
        "INSERT INTO users (user_id, name, email) VALUES ($1, $2, $3)",
        &[&user_id, &input.name, &input.email],
    )
    .await?;
    Ok(())
}

/// Insert an order row with the processor-allocated entity id
pub async fn insert_order(
    tx: &Transaction<'_>,
    order_id: Uuid,
    input: &OrderInput,
) -> std::result::Result<(), tokio_postgres::Error> {
    tx.execute(
        "INSERT INTO orders (order_id, user_id, item, quantity) VALUES ($1, $2, $3, $4)",
        &[&order_id, &input.user_id, &input.item, &input.quantity],
    )
    .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_payload_validates() {
        let body = br#"{"name":"Alice","email":"a@x"}"#;
        assert!(validate_payload(EntityTable::Users, body).is_ok());
    }

    #[test]
    fn test_unknown_field_rejected() {
        let body = br#"{"name":"Alice","email":"a@x","role":"admin"}"#;
        assert!(validate_payload(EntityTable::Users, body).is_err());
    }

    #[test]
    fn test_order_payload_is_camel_case() {
        let body = br#"{"userId":"5f0c1e8a-0d4e-4c3a-9e1a-7d2b0a1c2d3e","item":"widget","quantity":2}"#;
        assert!(validate_payload(EntityTable::Orders, body).is_ok());

        let snake = br#"{"user_id":"5f0c1e8a-0d4e-4c3a-9e1a-7d2b0a1c2d3e","item":"widget","quantity":2}"#;
        assert!(validate_payload(EntityTable::Orders, snake).is_err());
    }

    #[test]
    fn test_payload_for_wrong_table_rejected() {
        let body = br#"{"name":"Alice","email":"a@x"}"#;
        assert!(validate_payload(EntityTable::Orders, body).is_err());
    }
}
