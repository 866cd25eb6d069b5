//! Per-table write capabilities
//!
//! A handler is a plain value over the table enum. The write protocol in
//! `protocol.rs` is a free function parameterized by one of these; adding a
//! table means adding an enum variant and a match arm, nothing more.

use serde_json::value::RawValue;
use std::fmt;
use tokio_postgres::Transaction;
use uuid::Uuid;

use crate::cache::Namespace;
use crate::db::tables::{self, OrderInput, UserInput};
use crate::types::EntityTable;

/// Failure inserting a domain row
#[derive(Debug)]
pub enum DomainError {
    /// The payload no longer parses against the table schema. It passed
    /// validation at ingress, so this only happens for corrupt records and
    /// is never retryable.
    Payload(serde_json::Error),
    Db(tokio_postgres::Error),
}

impl fmt::Display for DomainError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DomainError::Payload(e) => write!(f, "payload does not match schema: {}", e),
            DomainError::Db(e) => write!(f, "{}", e),
        }
    }
}

/// Write capabilities for one table
pub struct TableHandler {
    pub table: EntityTable,
}

impl TableHandler {
    pub fn new(table: EntityTable) -> Self {
        Self { table }
    }

    /// Insert the domain row for this operation inside the open transaction
    pub async fn insert_domain(
        &self,
        tx: &Transaction<'_>,
        entity_id: Uuid,
        data: &RawValue,
    ) -> Result<(), DomainError> {
        match self.table {
            EntityTable::Users => {
                let input: UserInput =
                    serde_json::from_str(data.get()).map_err(DomainError::Payload)?;
                tables::insert_user(tx, entity_id, &input)
                    .await
                    .map_err(DomainError::Db)
            }
            EntityTable::Orders => {
                let input: OrderInput =
                    serde_json::from_str(data.get()).map_err(DomainError::Payload)?;
                tables::insert_order(tx, entity_id, &input)
                    .await
                    .map_err(DomainError::Db)
            }
        }
    }

    /// Cache namespace this table's committed writes invalidate
    pub fn namespace(&self) -> Namespace {
        Namespace::from(self.table)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handler_namespace_follows_table() {
        assert_eq!(
            TableHandler::new(EntityTable::Users).namespace(),
            Namespace::Users
        );
        assert_eq!(
            TableHandler::new(EntityTable::Orders).namespace(),
            Namespace::Orders
        );
    }
}
