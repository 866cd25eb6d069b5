//! Health endpoints
//!
//! /health is a liveness probe: 200 whenever the gateway is running, with
//! the admission metrics in the body. /ready answers 503 until the queue
//! connection is established, for load balancers and pre-flight checks.

use bytes::Bytes;
use http_body_util::Full;
use hyper::{Response, StatusCode};
use serde::Serialize;

use crate::gateway::AdmissionMetrics;
use crate::server::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    /// Overall health status (true if the gateway is running)
    pub healthy: bool,
    /// Service version
    pub version: &'static str,
    /// Current timestamp
    pub timestamp: String,
    /// Node identifier
    pub node_id: String,
    /// Admission gate state: in-flight count, circuit state, failures
    pub admission: AdmissionMetrics,
    /// Durable queue connection status
    pub queue: QueueHealth,
}

#[derive(Serialize)]
pub struct QueueHealth {
    pub connected: bool,
    pub url: String,
}

fn build_health_response(state: &AppState) -> HealthResponse {
    HealthResponse {
        healthy: true,
        version: env!("CARGO_PKG_VERSION"),
        timestamp: chrono::Utc::now().to_rfc3339(),
        node_id: state.args.node_id.to_string(),
        admission: state.admission.metrics(),
        queue: QueueHealth {
            connected: state.nats.is_connected(),
            url: state.args.nats.nats_url.clone(),
        },
    }
}

/// Handle liveness probe (/health, /healthz)
pub fn health_check(state: &AppState) -> Response<Full<Bytes>> {
    let response = build_health_response(state);

    let body = serde_json::to_string(&response)
        .unwrap_or_else(|_| r#"{"healthy":true,"error":"Serialization failed"}"#.to_string());

    Response::builder()
        .status(StatusCode::OK)
        .header("Content-Type", "application/json")
        .body(Full::new(Bytes::from(body)))
        .unwrap()
}

/// Handle readiness probe (/ready, /readyz)
pub fn readiness_check(state: &AppState) -> Response<Full<Bytes>> {
    let response = build_health_response(state);
    let is_ready = response.queue.connected;

    let body = serde_json::to_string(&response)
        .unwrap_or_else(|_| r#"{"healthy":false,"error":"Serialization failed"}"#.to_string());

    let status = if is_ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    Response::builder()
        .status(status)
        .header("Content-Type", "application/json")
        .body(Full::new(Bytes::from(body)))
        .unwrap()
}
