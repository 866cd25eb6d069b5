//! CDC event decoding
//!
//! Row-change events as emitted by a Debezium-style connector over the
//! database's logical replication. Both the schema-enveloped form
//! (`{schema, payload}`) and the flattened form decode to the same
//! `RowChange`. Only the op code, table, primary-key columns and source
//! timestamp are interpreted; everything else in the event is ignored.

use serde::Deserialize;
use serde_json::Value as JsonValue;

use crate::types::{EntityTable, Result, WeirError};

/// Row-change operation codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeOp {
    Create,
    Update,
    Delete,
    /// Initial-snapshot read, a no-op for invalidation
    SnapshotRead,
}

impl ChangeOp {
    pub fn from_code(code: &str) -> Option<ChangeOp> {
        match code {
            "c" => Some(ChangeOp::Create),
            "u" => Some(ChangeOp::Update),
            "d" => Some(ChangeOp::Delete),
            "r" => Some(ChangeOp::SnapshotRead),
            _ => None,
        }
    }
}

/// One decoded row change
#[derive(Debug, Clone)]
pub struct RowChange {
    pub op: ChangeOp,
    pub table: EntityTable,
    /// Primary-key value of the affected row, from the before image on
    /// deletes and the after image otherwise
    pub primary_key: Option<JsonValue>,
    /// Source commit timestamp in milliseconds
    pub source_ts_ms: i64,
}

#[derive(Debug, Deserialize)]
struct RawEvent {
    op: String,
    source: RawSource,
    #[serde(default)]
    before: Option<JsonValue>,
    #[serde(default)]
    after: Option<JsonValue>,
}

#[derive(Debug, Deserialize)]
struct RawSource {
    table: String,
    #[serde(default)]
    ts_ms: i64,
}

impl RowChange {
    /// Decode a CDC event payload
    pub fn decode(payload: &[u8]) -> Result<RowChange> {
        let value: JsonValue = serde_json::from_slice(payload)
            .map_err(|e| WeirError::Decode(format!("CDC event is not JSON: {}", e)))?;

        // Some connectors wrap the event in a schema envelope.
        let event = match value.get("payload") {
            Some(inner) if inner.is_object() => inner.clone(),
            _ => value,
        };

        let raw: RawEvent = serde_json::from_value(event)
            .map_err(|e| WeirError::Decode(format!("Malformed CDC event: {}", e)))?;

        let op = ChangeOp::from_code(&raw.op)
            .ok_or_else(|| WeirError::Decode(format!("Unknown CDC op code '{}'", raw.op)))?;
        let table: EntityTable = raw.source.table.parse()?;

        let image = match op {
            ChangeOp::Delete => raw.before.or(raw.after),
            _ => raw.after.or(raw.before),
        };

        Ok(RowChange {
            op,
            table,
            primary_key: extract_primary_key(table, image),
            source_ts_ms: raw.source.ts_ms,
        })
    }
}

fn extract_primary_key(table: EntityTable, image: Option<JsonValue>) -> Option<JsonValue> {
    let column = match table {
        EntityTable::Users => "user_id",
        EntityTable::Orders => "order_id",
    };
    image?.get(column).cloned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_bare_insert_event() {
        let payload = br#"{
            "op": "c",
            "source": {"table": "users", "ts_ms": 1712000000000},
            "before": null,
            "after": {"user_id": "abc", "name": "Alice", "email": "a@x"}
        }"#;
        let change = RowChange::decode(payload).unwrap();
        assert_eq!(change.op, ChangeOp::Create);
        assert_eq!(change.table, EntityTable::Users);
        assert_eq!(change.primary_key, Some(JsonValue::from("abc")));
        assert_eq!(change.source_ts_ms, 1712000000000);
    }

    #[test]
    fn test_decode_enveloped_event() {
        let payload = br#"{
            "schema": {"type": "struct"},
            "payload": {
                "op": "u",
                "source": {"table": "orders", "ts_ms": 7},
                "before": {"order_id": "o1"},
                "after": {"order_id": "o1", "item": "widget"}
            }
        }"#;
        let change = RowChange::decode(payload).unwrap();
        assert_eq!(change.op, ChangeOp::Update);
        assert_eq!(change.table, EntityTable::Orders);
        assert_eq!(change.primary_key, Some(JsonValue::from("o1")));
    }

    #[test]
    fn test_delete_takes_primary_key_from_before_image() {
        let payload = br#"{
            "op": "d",
            "source": {"table": "users", "ts_ms": 1},
            "before": {"user_id": "gone"},
            "after": null
        }"#;
        let change = RowChange::decode(payload).unwrap();
        assert_eq!(change.op, ChangeOp::Delete);
        assert_eq!(change.primary_key, Some(JsonValue::from("gone")));
    }

    #[test]
    fn test_snapshot_read_decodes() {
        let payload = br#"{
            "op": "r",
            "source": {"table": "users", "ts_ms": 1},
            "after": {"user_id": "u1"}
        }"#;
        let change = RowChange::decode(payload).unwrap();
        assert_eq!(change.op, ChangeOp::SnapshotRead);
    }

    #[test]
    fn test_unknown_table_rejected() {
        let payload = br#"{"op": "c", "source": {"table": "carts", "ts_ms": 1}}"#;
        assert!(RowChange::decode(payload).is_err());
    }

    #[test]
    fn test_unknown_op_code_rejected() {
        let payload = br#"{"op": "t", "source": {"table": "users", "ts_ms": 1}}"#;
        assert!(RowChange::decode(payload).is_err());
    }
}
