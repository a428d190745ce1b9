//! HTTP handlers for the event endpoints.

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{Extension, Json},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use eventgate_types::{Envelope, EventKind};
use serde::Serialize;
use serde_json::{json, Value};
use thiserror::Error;

use crate::ingress::{IngestError, Ingested};
use crate::AppState;

/// Response body for a published event.
#[derive(Debug, Serialize)]
pub struct IngestResponse {
    /// Always `"success"`.
    pub status: String,
    pub partition: i32,
    pub offset: i64,
    /// The envelope as it was written to the log.
    pub event: Envelope,
}

impl From<Ingested> for IngestResponse {
    fn from(ingested: Ingested) -> Self {
        Self {
            status: "success".to_string(),
            partition: ingested.placement.partition,
            offset: ingested.placement.offset,
            event: ingested.envelope,
        }
    }
}

/// API error type mapping to HTTP status codes.
///
/// The body is the plain error text.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    InternalServerError(String),
    #[error("{0}")]
    GatewayTimeout(String),
}

impl From<IngestError> for ApiError {
    fn from(e: IngestError) -> Self {
        match e {
            IngestError::MalformedPayload(_) => ApiError::BadRequest(e.to_string()),
            IngestError::EncodingFailure(_) | IngestError::PublishFailure(_) => {
                ApiError::InternalServerError(e.to_string())
            }
            IngestError::PublishTimeout(_) => ApiError::GatewayTimeout(e.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::InternalServerError(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
            ApiError::GatewayTimeout(msg) => (StatusCode::GATEWAY_TIMEOUT, msg),
        };

        (status, message).into_response()
    }
}

/// Handler for `GET /api/events/health`.
pub async fn health_handler() -> Json<Value> {
    Json(json!({ "status": true }))
}

/// Handler for `POST /api/events/movie`.
pub async fn movie_event_handler(
    Extension(state): Extension<Arc<AppState>>,
    body: Bytes,
) -> Result<(StatusCode, Json<IngestResponse>), ApiError> {
    ingest(&state, EventKind::Movie, &body).await
}

/// Handler for `POST /api/events/user`.
pub async fn user_event_handler(
    Extension(state): Extension<Arc<AppState>>,
    body: Bytes,
) -> Result<(StatusCode, Json<IngestResponse>), ApiError> {
    ingest(&state, EventKind::User, &body).await
}

/// Handler for `POST /api/events/payment`.
pub async fn payment_event_handler(
    Extension(state): Extension<Arc<AppState>>,
    body: Bytes,
) -> Result<(StatusCode, Json<IngestResponse>), ApiError> {
    ingest(&state, EventKind::Payment, &body).await
}

async fn ingest(
    state: &AppState,
    kind: EventKind,
    body: &[u8],
) -> Result<(StatusCode, Json<IngestResponse>), ApiError> {
    let ingested = state.relay.ingest(kind, body).await?;
    Ok((StatusCode::CREATED, Json(IngestResponse::from(ingested))))
}
