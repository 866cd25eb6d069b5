//! Write gateway internals: admission control and durable publishing

pub mod admission;
pub mod publisher;

pub use admission::{AdmissionControl, AdmissionMetrics, Admitted, CircuitState};
pub use publisher::WritePublisher;
