//! Operation model shared by the gateway, processors and status reader
//!
//! An operation is a caller-identified logical mutation. Its id doubles as
//! the idempotency key at ingress and the publish dedup id on the queue.
//! The entity id of the row it produces is allocated by the processor and
//! independent of the operation id.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::value::RawValue;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use super::error::{Result, WeirError};

/// Tables that accept writes through the pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityTable {
    Users,
    Orders,
}

impl EntityTable {
    /// All supported tables, in consumer spawn order
    pub const ALL: [EntityTable; 2] = [EntityTable::Users, EntityTable::Orders];

    pub fn as_str(&self) -> &'static str {
        match self {
            EntityTable::Users => "users",
            EntityTable::Orders => "orders",
        }
    }

    /// JetStream subject carrying writes for this table
    pub fn write_subject(&self) -> String {
        format!("writes.{}", self.as_str())
    }

    /// JetStream subject for messages that exhausted their retry budget
    pub fn dlq_subject(&self) -> String {
        format!("writes-dlq.{}", self.as_str())
    }

    /// CDC subject fed by the replication connector
    pub fn cdc_subject(&self) -> String {
        format!("cdc.public.{}", self.as_str())
    }

    /// Durable consumer name for this table's write processor
    pub fn consumer_name(&self) -> String {
        format!("wp_{}", self.as_str())
    }
}

impl fmt::Display for EntityTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityTable {
    type Err = WeirError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "users" => Ok(EntityTable::Users),
            "orders" => Ok(EntityTable::Orders),
            other => Err(WeirError::Decode(format!("Unsupported table '{}'", other))),
        }
    }
}

/// Kind of mutation an operation performs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OpType {
    Create,
    Update,
    Delete,
}

impl OpType {
    pub fn as_str(&self) -> &'static str {
        match self {
            OpType::Create => "create",
            OpType::Update => "update",
            OpType::Delete => "delete",
        }
    }
}

impl FromStr for OpType {
    type Err = WeirError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "create" => Ok(OpType::Create),
            "update" => Ok(OpType::Update),
            "delete" => Ok(OpType::Delete),
            other => Err(WeirError::Decode(format!("Unknown op type '{}'", other))),
        }
    }
}

/// Ledger status of an operation. Once it leaves `Pending` it is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OpStatus {
    Pending,
    Completed,
    Failed,
}

impl OpStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OpStatus::Pending => "pending",
            OpStatus::Completed => "completed",
            OpStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, OpStatus::Pending)
    }
}

impl FromStr for OpStatus {
    type Err = WeirError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "pending" => Ok(OpStatus::Pending),
            "completed" => Ok(OpStatus::Completed),
            "failed" => Ok(OpStatus::Failed),
            other => Err(WeirError::Decode(format!("Unknown status '{}'", other))),
        }
    }
}

impl fmt::Display for OpStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Wire record published to the durable queue, one per logical operation.
///
/// `data` is carried as raw JSON: the gateway validates it against the
/// table's input schema, everything downstream treats it as opaque bytes,
/// and decode-then-encode reproduces the original bytes exactly.
#[derive(Debug, Serialize, Deserialize)]
pub struct WriteRequest {
    pub operation_id: Uuid,
    pub table: EntityTable,
    pub data: Box<RawValue>,
}

impl WriteRequest {
    pub fn encode(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self)
            .map_err(|e| WeirError::Internal(format!("Failed to encode write request: {}", e)))
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes)
            .map_err(|e| WeirError::Decode(format!("Malformed write request: {}", e)))
    }
}

/// A row of the idempotency ledger
#[derive(Debug, Clone)]
pub struct Operation {
    pub operation_id: Uuid,
    pub entity_table: EntityTable,
    pub entity_id: Uuid,
    pub op_type: OpType,
    pub status: OpStatus,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// Body of the gateway's 202 response
#[derive(Debug, Serialize, Deserialize)]
pub struct AcceptedResponse {
    pub status: String,
    pub operation_id: Uuid,
    pub accepted_at: DateTime<Utc>,
}

impl AcceptedResponse {
    pub fn new(operation_id: Uuid) -> Self {
        Self {
            status: "accepted".to_string(),
            operation_id,
            accepted_at: Utc::now(),
        }
    }
}

/// Body of `GET /status/<operation_id>`
#[derive(Debug, Serialize, Deserialize)]
pub struct StatusResponse {
    pub status: OpStatus,
    pub operation_id: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub table: Option<EntityTable>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entity_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl StatusResponse {
    /// Projection for an operation the ledger has not seen yet. The message
    /// may still be queued, so the client keeps polling.
    pub fn pending(operation_id: Uuid) -> Self {
        Self {
            status: OpStatus::Pending,
            operation_id,
            table: None,
            entity_id: None,
            error: None,
        }
    }

    pub fn from_operation(op: &Operation) -> Self {
        Self {
            status: op.status,
            operation_id: op.operation_id,
            table: Some(op.entity_table),
            entity_id: Some(op.entity_id),
            error: op.error.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subjects() {
        assert_eq!(EntityTable::Users.write_subject(), "writes.users");
        assert_eq!(EntityTable::Orders.dlq_subject(), "writes-dlq.orders");
        assert_eq!(EntityTable::Users.cdc_subject(), "cdc.public.users");
        assert_eq!(EntityTable::Orders.consumer_name(), "wp_orders");
    }

    #[test]
    fn test_table_parse_roundtrip() {
        for table in EntityTable::ALL {
            assert_eq!(table.as_str().parse::<EntityTable>().unwrap(), table);
        }
        assert!("carts".parse::<EntityTable>().is_err());
    }

    #[test]
    fn test_status_terminality() {
        assert!(!OpStatus::Pending.is_terminal());
        assert!(OpStatus::Completed.is_terminal());
        assert!(OpStatus::Failed.is_terminal());
    }

    #[test]
    fn test_unknown_ledger_row_polls_as_pending() {
        let id = Uuid::new_v4();
        let resp = StatusResponse::pending(id);
        assert_eq!(resp.status, OpStatus::Pending);
        assert_eq!(resp.operation_id, id);
        assert!(resp.table.is_none());
        assert!(resp.entity_id.is_none());
        assert!(resp.error.is_none());
    }

    #[test]
    fn test_status_response_carries_terminal_metadata() {
        let op = Operation {
            operation_id: Uuid::new_v4(),
            entity_table: EntityTable::Orders,
            entity_id: Uuid::new_v4(),
            op_type: OpType::Create,
            status: OpStatus::Failed,
            error: Some("foreign key violation".to_string()),
            created_at: Utc::now(),
            completed_at: Some(Utc::now()),
        };
        let resp = StatusResponse::from_operation(&op);
        assert_eq!(resp.status, OpStatus::Failed);
        assert_eq!(resp.table, Some(EntityTable::Orders));
        assert_eq!(resp.entity_id, Some(op.entity_id));
        assert_eq!(resp.error.as_deref(), Some("foreign key violation"));
    }

    #[test]
    fn test_write_request_decode_encode() {
        let data = serde_json::value::RawValue::from_string(
            r#"{"name":"Alice","email":"a@x"}"#.to_string(),
        )
        .unwrap();
        let request = WriteRequest {
            operation_id: Uuid::new_v4(),
            table: EntityTable::Users,
            data,
        };
        let encoded = request.encode().unwrap();
        let decoded = WriteRequest::decode(&encoded).unwrap();
        assert_eq!(decoded.operation_id, request.operation_id);
        assert_eq!(decoded.table, EntityTable::Users);
        assert_eq!(decoded.data.get(), r#"{"name":"Alice","email":"a@x"}"#);
        assert_eq!(decoded.encode().unwrap(), encoded);
    }
}
