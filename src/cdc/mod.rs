//! CDC consumer: cache invalidation from the database's replication feed

pub mod consumer;
pub mod event;

pub use consumer::CdcConsumer;
pub use event::{ChangeOp, RowChange};
