//! Write submission endpoints
//!
//! `POST /<table>` validates the payload against the table's input schema,
//! applies admission control and publishes exactly one durable record keyed
//! by the caller's idempotency key. A 202 promises durability, not
//! completion; clients poll `/status/<operation_id>`.

use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::header::HeaderMap;
use hyper::{Request, Response, StatusCode};
use serde_json::value::RawValue;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use crate::db::tables;
use crate::server::http::{error_response, json_response};
use crate::server::AppState;
use crate::types::{AcceptedResponse, EntityTable, Result, WeirError, WriteRequest};

/// Header carrying the caller-supplied operation id
pub const IDEMPOTENCY_KEY_HEADER: &str = "idempotency-key";

/// Upper bound on accepted payload size
const MAX_BODY_BYTES: usize = 64 * 1024;

/// Handle `POST /<table>`
pub async fn submit_write(
    state: Arc<AppState>,
    table: EntityTable,
    req: Request<Incoming>,
) -> Response<Full<Bytes>> {
    match handle_submit(state, table, req).await {
        Ok(response) => response,
        Err(e) => error_response(&e),
    }
}

async fn handle_submit(
    state: Arc<AppState>,
    table: EntityTable,
    req: Request<Incoming>,
) -> Result<Response<Full<Bytes>>> {
    let operation_id = extract_idempotency_key(req.headers())?;

    let body = req
        .into_body()
        .collect()
        .await
        .map_err(|e| WeirError::InvalidRequest(format!("Failed to read request body: {}", e)))?
        .to_bytes();
    if body.len() > MAX_BODY_BYTES {
        return Err(WeirError::InvalidRequest(format!(
            "Body exceeds {} bytes",
            MAX_BODY_BYTES
        )));
    }

    tables::validate_payload(table, &body)?;
    let data: Box<RawValue> = serde_json::from_slice(&body)
        .map_err(|e| WeirError::InvalidRequest(format!("Body is not valid JSON: {}", e)))?;

    let request = WriteRequest {
        operation_id,
        table,
        data,
    };

    // The permit covers the whole publish; dropping it on any path below
    // releases the in-flight slot.
    let permit = state.admission.try_admit()?;
    let outcome = state.publisher.publish(&request).await;
    state.admission.record(permit.kind, outcome.is_ok());
    drop(permit);
    outcome?;

    info!(%operation_id, %table, "Write accepted");
    Ok(json_response(
        StatusCode::ACCEPTED,
        &AcceptedResponse::new(operation_id),
    ))
}

fn extract_idempotency_key(headers: &HeaderMap) -> Result<Uuid> {
    let raw = headers
        .get(IDEMPOTENCY_KEY_HEADER)
        .and_then(|h| h.to_str().ok())
        .ok_or_else(|| {
            WeirError::InvalidRequest(format!(
                "Header '{}' is required",
                IDEMPOTENCY_KEY_HEADER
            ))
        })?;

    Uuid::parse_str(raw).map_err(|_| {
        WeirError::InvalidRequest(format!(
            "Header '{}' must be a UUID",
            IDEMPOTENCY_KEY_HEADER
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use hyper::header::HeaderValue;

    #[test]
    fn test_missing_key_rejected() {
        let headers = HeaderMap::new();
        assert!(matches!(
            extract_idempotency_key(&headers),
            Err(WeirError::InvalidRequest(_))
        ));
    }

    #[test]
    fn test_malformed_key_rejected() {
        let mut headers = HeaderMap::new();
        headers.insert(
            IDEMPOTENCY_KEY_HEADER,
            HeaderValue::from_static("not-a-uuid"),
        );
        assert!(matches!(
            extract_idempotency_key(&headers),
            Err(WeirError::InvalidRequest(_))
        ));
    }

    #[test]
    fn test_valid_key_extracted() {
        let id = Uuid::new_v4();
        let mut headers = HeaderMap::new();
        headers.insert(
            IDEMPOTENCY_KEY_HEADER,
            HeaderValue::from_str(&id.to_string()).unwrap(),
        );
        assert_eq!(extract_idempotency_key(&headers).unwrap(), id);
    }
}
