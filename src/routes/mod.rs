//! HTTP route handlers for the gateway

pub mod health;
pub mod status;
pub mod writes;

pub use health::{health_check, readiness_check};
pub use status::operation_status;
pub use writes::submit_write;
