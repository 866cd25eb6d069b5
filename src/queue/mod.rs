//! Durable queue topology

pub mod streams;

pub use streams::{
    cdc_consumer, ensure_dlq_stream, ensure_table_consumer, ensure_writes_stream, CDC_CONSUMER,
    CDC_STREAM, DLQ_STREAM, WRITES_STREAM,
};
