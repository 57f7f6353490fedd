//! Webhook ingestion.
//!
//! # Endpoints
//!
//! - `POST /integrations/{name}/events` – accept one JSON event for an integration
//!
//! When the integration has a secret, the body must be signed:
//!
//! ```text
//! Eventpipe-Signature: {unix_timestamp}.{base64_signature}
//! ```
//!
//! The signature is computed as `HMAC-SHA256("{timestamp}.{body}", secret)`.
//! All cryptographic operations are delegated to [`eventpipe_sdk::signature`].

use crate::integration::MappingError;
use crate::state::AppState;
use axum::{
    Json, Router,
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::post,
};
use bytes::Bytes;
use eventpipe_core::pipeline::GroupError;
use eventpipe_core::sinks::http::EVENT_TYPE_HEADER;
use eventpipe_sdk::signature::{self, SIGNATURE_HEADER, SignatureError};
use serde::Serialize;

/// Build the ingestion router.
pub fn router() -> Router<AppState> {
    Router::new().route("/integrations/{name}/events", post(ingest_event))
}

#[derive(Serialize)]
struct Accepted {
    accepted: bool,
}

/// Errors that can occur while accepting an event.
#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error("unknown integration {0}")]
    UnknownIntegration(String),
    #[error("missing Eventpipe-Signature header")]
    MissingSignature,
    #[error("invalid Eventpipe-Signature header: {0}")]
    Signature(#[from] SignatureError),
    #[error(transparent)]
    Mapping(#[from] MappingError),
    #[error("event could not be queued: {0}")]
    Unavailable(#[from] GroupError),
}

impl IntoResponse for IngestError {
    fn into_response(self) -> Response {
        let status = match &self {
            IngestError::UnknownIntegration(_) => StatusCode::NOT_FOUND,
            IngestError::MissingSignature => StatusCode::UNAUTHORIZED,
            IngestError::Signature(SignatureError::SignatureMismatch | SignatureError::Expired) => {
                StatusCode::UNAUTHORIZED
            }
            IngestError::Signature(_) => StatusCode::BAD_REQUEST,
            IngestError::Mapping(MappingError::InvalidJson(_)) => StatusCode::BAD_REQUEST,
            IngestError::Mapping(MappingError::MissingPrimaryKey { .. }) => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            IngestError::Unavailable(e) => {
                tracing::warn!(error = %e, "Rejecting event, pipelines unavailable");
                StatusCode::SERVICE_UNAVAILABLE
            }
        };
        (status, self.to_string()).into_response()
    }
}

/// `POST /integrations/{name}/events` – verify, map and queue one event.
///
/// Responds `202 Accepted` once every pipeline of the integration queued
/// the event. Delivery happens asynchronously.
async fn ingest_event(
    State(state): State<AppState>,
    Path(name): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse, IngestError> {
    let integration = state
        .integration(&name)
        .ok_or_else(|| IngestError::UnknownIntegration(name.clone()))?;

    if let Some(secret) = integration.secret() {
        let header_value = headers
            .get(SIGNATURE_HEADER)
            .ok_or(IngestError::MissingSignature)?
            .to_str()
            .map_err(|_| SignatureError::InvalidFormat)?;
        signature::verify_body(header_value, &body, secret)?;
    }

    let event_type = headers
        .get(EVENT_TYPE_HEADER)
        .and_then(|value| value.to_str().ok());
    let event = integration.to_event(body, event_type)?;

    tracing::debug!(
        integration = %integration.name(),
        event_id = ?event.id(),
        event_type = ?event.event_type(),
        operation = %event.operation(),
        "Event received"
    );
    integration.group().add_message(event).await?;

    Ok((StatusCode::ACCEPTED, Json(Accepted { accepted: true })))
}
