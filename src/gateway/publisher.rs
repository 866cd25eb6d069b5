//! JetStream publisher for the write gateway
//!
//! Exactly one durable record per logical operation. The operation id rides
//! in the Nats-Msg-Id header, so the broker drops re-publishes of the same
//! key inside the stream's dedup window; the processor's ledger covers
//! duplicates beyond it.

use async_nats::jetstream::Context;
use async_nats::HeaderMap;
use bytes::Bytes;
use std::time::Duration;
use tracing::debug;

use crate::types::{Result, WeirError, WriteRequest};

/// Header consulted by JetStream for publisher-side deduplication
const MSG_ID_HEADER: &str = "Nats-Msg-Id";

/// Publishes write records to the durable queue
pub struct WritePublisher {
    jetstream: Context,
    timeout: Duration,
}

impl WritePublisher {
    pub fn new(jetstream: Context, timeout: Duration) -> Self {
        Self { jetstream, timeout }
    }

    /// Publish one write record and wait for the broker's acknowledgement.
    /// A duplicate ack still counts as acceptance: the record is durable.
    pub async fn publish(&self, request: &WriteRequest) -> Result<()> {
        let payload = request.encode()?;
        let subject = request.table.write_subject();

        let mut headers = HeaderMap::new();
        headers.insert(MSG_ID_HEADER, request.operation_id.to_string().as_str());

        let ack = tokio::time::timeout(self.timeout, async {
            self.jetstream
                .publish_with_headers(subject.clone(), headers, Bytes::from(payload))
                .await
                .map_err(|e| WeirError::Upstream(format!("Publish to {} failed: {}", subject, e)))?
                .await
                .map_err(|e| {
                    WeirError::Upstream(format!("Publish to {} was not acknowledged: {}", subject, e))
                })
        })
        .await
        .map_err(|_| {
            WeirError::Upstream(format!(
                "Publish of {} timed out after {:?}",
                request.operation_id, self.timeout
            ))
        })??;

        if ack.duplicate {
            debug!(
                operation_id = %request.operation_id,
                "Duplicate publish absorbed by the dedup window"
            );
        }
        Ok(())
    }
}
