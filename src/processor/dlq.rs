//! Dead-letter routing
//!
//! A message on its final delivery is copied to the DLQ with its original
//! subject and payload. The original is acked only after the DLQ publish is
//! acknowledged, so the record cannot vanish in between; operators replay
//! dead letters out of band.

use async_nats::jetstream::Context;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::types::{EntityTable, Result, WeirError};

/// Record published to `writes-dlq.<table>`
#[derive(Debug, Serialize, Deserialize)]
pub struct DeadLetter {
    /// Subject the message was originally published to
    pub subject: String,
    /// Operation id, when the payload decoded far enough to know it
    pub operation_id: Option<Uuid>,
    /// Original payload bytes
    #[serde(with = "base64_bytes")]
    pub payload: Vec<u8>,
    /// Error that exhausted the retry budget
    pub error: String,
    /// Delivery attempts consumed
    pub deliveries: i64,
}

/// Base64 encoding for binary payloads
mod base64_bytes {
    use base64::{engine::general_purpose::STANDARD, Engine};
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S>(bytes: &Vec<u8>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        STANDARD.encode(bytes).serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        STANDARD
            .decode(&s)
            .map_err(|e| serde::de::Error::custom(format!("base64 decode error: {e}")))
    }
}

/// Publisher for the dead-letter stream
#[derive(Clone)]
pub struct DlqPublisher {
    jetstream: Context,
}

impl DlqPublisher {
    pub fn new(jetstream: Context) -> Self {
        Self { jetstream }
    }

    /// Publish the dead letter and wait for the broker's acknowledgement
    pub async fn publish(&self, table: EntityTable, letter: &DeadLetter) -> Result<()> {
        let payload = serde_json::to_vec(letter)
            .map_err(|e| WeirError::Internal(format!("Failed to encode dead letter: {}", e)))?;

        self.jetstream
            .publish(table.dlq_subject(), Bytes::from(payload))
            .await
            .map_err(|e| WeirError::Queue(format!("DLQ publish failed: {}", e)))?
            .await
            .map_err(|e| WeirError::Queue(format!("DLQ publish was not acknowledged: {}", e)))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dead_letter_roundtrip() {
        let letter = DeadLetter {
            subject: "writes.users".to_string(),
            operation_id: Some(Uuid::new_v4()),
            payload: br#"{"operation_id":"x"}"#.to_vec(),
            error: "connection refused".to_string(),
            deliveries: 5,
        };
        let encoded = serde_json::to_vec(&letter).unwrap();
        let decoded: DeadLetter = serde_json::from_slice(&encoded).unwrap();
        assert_eq!(decoded.subject, letter.subject);
        assert_eq!(decoded.operation_id, letter.operation_id);
        assert_eq!(decoded.payload, letter.payload);
        assert_eq!(decoded.deliveries, 5);
    }

    #[test]
    fn test_payload_is_base64_in_json() {
        let letter = DeadLetter {
            subject: "writes.orders".to_string(),
            operation_id: None,
            payload: vec![0xff, 0x00, 0x01],
            error: "timeout".to_string(),
            deliveries: 3,
        };
        let json: serde_json::Value =
            serde_json::from_slice(&serde_json::to_vec(&letter).unwrap()).unwrap();
        assert!(json.get("payload").unwrap().is_string());
    }
}
