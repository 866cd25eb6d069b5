//! NATS client wrapper

pub mod client;

pub use client::NatsClient;
