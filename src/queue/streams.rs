//! JetStream streams and durable consumers
//!
//! One WRITES stream carries all write subjects with publisher-side dedup
//! keyed by the operation id. A second stream receives dead letters. The CDC
//! stream is created and fed by the replication connector; this side only
//! opens it and maintains a durable cursor.

use async_nats::jetstream::consumer::pull::Config as PullConfig;
use async_nats::jetstream::consumer::{AckPolicy, DeliverPolicy, PullConsumer};
use async_nats::jetstream::stream::{Config as StreamConfig, StorageType, Stream};
use async_nats::jetstream::Context;
use std::time::Duration;
use tracing::info;

use crate::config::ProcessorArgs;
use crate::types::{EntityTable, Result, WeirError};

pub const WRITES_STREAM: &str = "WRITES";
pub const WRITES_SUBJECTS: &str = "writes.>";
pub const DLQ_STREAM: &str = "WRITES_DLQ";
pub const DLQ_SUBJECTS: &str = "writes-dlq.>";
pub const CDC_STREAM: &str = "CDC";
pub const CDC_CONSUMER: &str = "cdc_invalidator";

/// Ensure the writes stream exists
pub async fn ensure_writes_stream(jetstream: &Context, dedup_window: Duration) -> Result<Stream> {
    let stream = jetstream
        .get_or_create_stream(StreamConfig {
            name: WRITES_STREAM.to_string(),
            subjects: vec![WRITES_SUBJECTS.to_string()],
            storage: StorageType::File,
            duplicate_window: dedup_window,
            ..Default::default()
        })
        .await
        .map_err(|e| WeirError::Queue(format!("Failed to create stream {}: {}", WRITES_STREAM, e)))?;

    info!(
        "Using stream {} with subjects {} (dedup window {:?})",
        WRITES_STREAM, WRITES_SUBJECTS, dedup_window
    );
    Ok(stream)
}

/// Ensure the dead-letter stream exists
pub async fn ensure_dlq_stream(jetstream: &Context) -> Result<Stream> {
    let stream = jetstream
        .get_or_create_stream(StreamConfig {
            name: DLQ_STREAM.to_string(),
            subjects: vec![DLQ_SUBJECTS.to_string()],
            storage: StorageType::File,
            ..Default::default()
        })
        .await
        .map_err(|e| WeirError::Queue(format!("Failed to create stream {}: {}", DLQ_STREAM, e)))?;

    info!("Using stream {} with subjects {}", DLQ_STREAM, DLQ_SUBJECTS);
    Ok(stream)
}

/// Ensure the durable consumer for one table's write processor
pub async fn ensure_table_consumer(
    stream: &Stream,
    table: EntityTable,
    cfg: &ProcessorArgs,
) -> Result<PullConsumer> {
    let name = table.consumer_name();

    let consumer = stream
        .get_or_create_consumer(
            &name,
            PullConfig {
                durable_name: Some(name.clone()),
                ack_policy: AckPolicy::Explicit,
                filter_subject: table.write_subject(),
                max_deliver: cfg.max_deliver as i64,
                ack_wait: cfg.ack_wait(),
                max_ack_pending: cfg.max_ack_pending,
                ..Default::default()
            },
        )
        .await
        .map_err(|e| WeirError::Queue(format!("Failed to create consumer {}: {}", name, e)))?;

    info!(
        "Using consumer {} on {} (max_deliver {}, ack_wait {:?})",
        name,
        table.write_subject(),
        cfg.max_deliver,
        cfg.ack_wait()
    );
    Ok(consumer)
}

/// Open the externally maintained CDC stream and ensure the invalidation
/// consumer. On first creation the cursor starts at the beginning of the
/// stream; replaying old events only re-runs idempotent invalidations.
pub async fn cdc_consumer(jetstream: &Context) -> Result<PullConsumer> {
    let stream = jetstream.get_stream(CDC_STREAM).await.map_err(|e| {
        WeirError::Queue(format!(
            "CDC stream {} is missing, the replication connector must create it: {}",
            CDC_STREAM, e
        ))
    })?;

    let consumer = stream
        .get_or_create_consumer(
            CDC_CONSUMER,
            PullConfig {
                durable_name: Some(CDC_CONSUMER.to_string()),
                ack_policy: AckPolicy::Explicit,
                deliver_policy: DeliverPolicy::All,
                filter_subjects: EntityTable::ALL.iter().map(|t| t.cdc_subject()).collect(),
                ..Default::default()
            },
        )
        .await
        .map_err(|e| WeirError::Queue(format!("Failed to create consumer {}: {}", CDC_CONSUMER, e)))?;

    info!("Using consumer {} on stream {}", CDC_CONSUMER, CDC_STREAM);
    Ok(consumer)
}
