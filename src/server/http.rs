//! HTTP server for the write gateway
//!
//! hyper http1 with TokioIo; requests are routed on (method, path). The
//! gateway owns no persistent state: it validates, admits and publishes,
//! and serves the status projection out of the ledger.

use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{debug, error, info};

use crate::config::Args;
use crate::db::PgClient;
use crate::gateway::{AdmissionControl, WritePublisher};
use crate::nats::NatsClient;
use crate::routes;
use crate::types::{EntityTable, Result, WeirError};

pub type BoxBody = http_body_util::combinators::BoxBody<Bytes, hyper::Error>;

/// Shared application state
pub struct AppState {
    pub args: Args,
    pub nats: NatsClient,
    pub publisher: WritePublisher,
    pub admission: AdmissionControl,
    pub db: PgClient,
}

impl AppState {
    pub fn new(
        args: Args,
        nats: NatsClient,
        publisher: WritePublisher,
        admission: AdmissionControl,
        db: PgClient,
    ) -> Self {
        Self {
            args,
            nats,
            publisher,
            admission,
            db,
        }
    }
}

/// Start the HTTP server. Returns after ctrl-c; open connections finish on
/// their own tasks.
pub async fn run(state: Arc<AppState>) -> Result<()> {
    let listener = TcpListener::bind(state.args.listen)
        .await
        .map_err(|e| WeirError::Internal(format!("Failed to bind {}: {}", state.args.listen, e)))?;

    info!(
        "Weir gateway listening on {} as node {}",
        state.args.listen, state.args.node_id
    );

    loop {
        let accepted = tokio::select! {
            accepted = listener.accept() => accepted,
            _ = tokio::signal::ctrl_c() => {
                info!("Shutdown requested, no longer accepting connections");
                return Ok(());
            }
        };

        match accepted {
            Ok((stream, addr)) => {
                let state = Arc::clone(&state);
                tokio::spawn(async move {
                    let io = TokioIo::new(stream);

                    let service = service_fn(move |req| {
                        let state = Arc::clone(&state);
                        async move { handle_request(state, req).await }
                    });

                    if let Err(err) = http1::Builder::new().serve_connection(io, service).await {
                        error!("Error serving connection from {}: {:?}", addr, err);
                    }
                });
            }
            Err(e) => {
                error!("Error accepting connection: {:?}", e);
            }
        }
    }
}

/// Route incoming HTTP requests
async fn handle_request(
    state: Arc<AppState>,
    req: Request<Incoming>,
) -> std::result::Result<Response<BoxBody>, hyper::Error> {
    let method = req.method().clone();
    let path = req.uri().path().to_string();

    debug!("{} {}", method, path);

    let response = match (method, path.as_str()) {
        // Liveness probe with admission metrics
        (Method::GET, "/health") | (Method::GET, "/healthz") => {
            routes::health_check(&state)
        }

        // Readiness probe: 200 only while the queue connection is up
        (Method::GET, "/ready") | (Method::GET, "/readyz") => {
            routes::readiness_check(&state)
        }

        // Status projection for client polling
        (Method::GET, p) if p.starts_with("/status/") => {
            let id = p.strip_prefix("/status/").unwrap_or("");
            routes::operation_status(&state, id).await
        }

        // Write submission, one route per supported table
        (Method::POST, "/users") => {
            routes::submit_write(Arc::clone(&state), EntityTable::Users, req).await
        }
        (Method::POST, "/orders") => {
            routes::submit_write(Arc::clone(&state), EntityTable::Orders, req).await
        }

        (_, p) => not_found_response(p),
    };

    Ok(to_boxed(response))
}

/// Convert a Full<Bytes> body to BoxBody
pub fn to_boxed(response: Response<Full<Bytes>>) -> Response<BoxBody> {
    response.map(|body| body.map_err(|never| match never {}).boxed())
}

/// Serialize a value as a JSON response
pub fn json_response<T: serde::Serialize>(status: StatusCode, value: &T) -> Response<Full<Bytes>> {
    let body = serde_json::to_string(value)
        .unwrap_or_else(|_| r#"{"error":"Serialization failed"}"#.to_string());

    Response::builder()
        .status(status)
        .header("Content-Type", "application/json")
        .body(Full::new(Bytes::from(body)))
        .unwrap()
}

/// Map a pipeline error to its HTTP response, with Retry-After advice on
/// admission rejections
pub fn error_response(err: &WeirError) -> Response<Full<Bytes>> {
    let body = serde_json::json!({ "error": err.to_string() });

    let mut builder = Response::builder()
        .status(err.status_code())
        .header("Content-Type", "application/json");
    if let Some(secs) = err.retry_after_secs() {
        builder = builder.header("Retry-After", secs.to_string());
    }

    builder
        .body(Full::new(Bytes::from(body.to_string())))
        .unwrap()
}

/// Not found response
fn not_found_response(path: &str) -> Response<Full<Bytes>> {
    let body = serde_json::json!({
        "error": "Not Found",
        "path": path,
    });

    Response::builder()
        .status(StatusCode::NOT_FOUND)
        .header("Content-Type", "application/json")
        .body(Full::new(Bytes::from(body.to_string())))
        .unwrap()
}
