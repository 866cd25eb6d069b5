//! Operation status projection
//!
//! Read-only view over the idempotency ledger for client polling. A missing
//! row only means the message has not been processed yet, so it reads as
//! pending rather than not-found.

use bytes::Bytes;
use http_body_util::Full;
use hyper::{Response, StatusCode};
use tracing::warn;
use uuid::Uuid;

use crate::db::ledger;
use crate::server::http::{error_response, json_response};
use crate::server::AppState;
use crate::types::{StatusResponse, WeirError};

/// Handle `GET /status/<operation_id>`
pub async fn operation_status(state: &AppState, id: &str) -> Response<Full<Bytes>> {
    let operation_id = match Uuid::parse_str(id) {
        Ok(v) => v,
        Err(_) => {
            return error_response(&WeirError::InvalidRequest(format!(
                "'{}' is not a valid operation id",
                id
            )))
        }
    };

    match ledger::fetch_status(&state.db, operation_id).await {
        Ok(Some(op)) => json_response(StatusCode::OK, &StatusResponse::from_operation(&op)),
        Ok(None) => json_response(StatusCode::OK, &StatusResponse::pending(operation_id)),
        Err(e) => {
            warn!(%operation_id, error = %e, "Status read failed");
            error_response(&e)
        }
    }
}
