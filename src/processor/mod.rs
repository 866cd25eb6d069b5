//! Write processor
//!
//! One durable consumer loop per supported table. Every delivered message
//! runs the write protocol and leaves exactly one way: ack, nak with delay,
//! or DLQ-then-ack.

pub mod dlq;
pub mod handler;
pub mod protocol;
pub mod retry;
pub mod sweeper;

pub use dlq::{DeadLetter, DlqPublisher};
pub use handler::TableHandler;
pub use protocol::process_message;

use async_nats::jetstream::consumer::PullConsumer;
use async_nats::jetstream::stream::Stream;
use futures_util::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::cache::CacheKeystore;
use crate::config::ProcessorArgs;
use crate::db::PgClient;
use crate::queue;
use crate::types::{EntityTable, Result, WeirError};

/// Dependencies shared by all table workers, passed in at construction
pub struct ProcessorContext {
    pub db: PgClient,
    pub cache: CacheKeystore,
    pub dlq: DlqPublisher,
    /// Redelivery delay after a retryable failure
    pub nak_delay: Duration,
    /// Delivery attempts budget; the attempt that reaches it is final
    pub max_deliver: i64,
}

/// Consumption loop for one table
pub struct TableWorker {
    handler: TableHandler,
    consumer: PullConsumer,
    ctx: Arc<ProcessorContext>,
    running: Arc<RwLock<bool>>,
    batch_size: usize,
}

impl TableWorker {
    /// Run the worker processing loop
    pub async fn run(&self) {
        info!(table = %self.handler.table, "Starting write consumption loop");

        while *self.running.read().await {
            match self.process_batch().await {
                Ok(count) => {
                    if count > 0 {
                        debug!(table = %self.handler.table, count, "Processed write batch");
                    }
                }
                Err(e) => {
                    error!(table = %self.handler.table, error = %e, "Error processing batch");
                    tokio::time::sleep(Duration::from_secs(1)).await;
                }
            }
        }

        info!(table = %self.handler.table, "Write consumption loop stopped");
    }

    /// Fetch and process one batch of messages
    async fn process_batch(&self) -> Result<usize> {
        let mut messages = self
            .consumer
            .fetch()
            .max_messages(self.batch_size)
            .expires(Duration::from_secs(5))
            .messages()
            .await
            .map_err(|e| WeirError::Queue(format!("Failed to fetch messages: {}", e)))?;

        let mut count = 0;

        while let Some(msg_result) = messages.next().await {
            match msg_result {
                Ok(msg) => {
                    count += 1;
                    process_message(&self.handler, &self.ctx, msg).await;
                }
                Err(e) => {
                    warn!("Error receiving message: {}", e);
                }
            }
        }

        Ok(count)
    }
}

/// Spawn one worker per supported table. Setting the returned flag to false
/// drains the loops; the join handles complete once in-flight batches finish.
pub async fn spawn_workers(
    ctx: Arc<ProcessorContext>,
    stream: &Stream,
    cfg: &ProcessorArgs,
) -> Result<(Arc<RwLock<bool>>, Vec<JoinHandle<()>>)> {
    let running = Arc::new(RwLock::new(true));
    let mut handles = Vec::with_capacity(EntityTable::ALL.len());

    for table in EntityTable::ALL {
        let consumer = queue::ensure_table_consumer(stream, table, cfg).await?;
        let worker = TableWorker {
            handler: TableHandler::new(table),
            consumer,
            ctx: Arc::clone(&ctx),
            running: Arc::clone(&running),
            batch_size: cfg.batch_size,
        };
        handles.push(tokio::spawn(async move { worker.run().await }));
    }

    Ok((running, handles))
}
