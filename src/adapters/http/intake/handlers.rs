//! Intake handlers. They only validate and enqueue; workers drive the engine.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Json, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};

use crate::domain::foundation::DomainError;
use crate::domain::job::Job;
use crate::domain::session::Event;
use crate::ports::TaskQueue;

use super::dto::{AcceptedResponse, CallbackRequest, ErrorResponse, HealthResponse, InboundEventRequest};
use super::signature::{CallbackVerifier, SignatureError, SIGNATURE_HEADER};

/// Shared state of the intake router.
#[derive(Clone)]
pub struct IntakeState {
    pub queue: Arc<dyn TaskQueue>,
    pub verifier: CallbackVerifier,
}

impl IntakeState {
    pub fn new(queue: Arc<dyn TaskQueue>, verifier: CallbackVerifier) -> Self {
        Self { queue, verifier }
    }
}

// ════════════════════════════════════════════════════════════════════════════════
// Errors
// ════════════════════════════════════════════════════════════════════════════════

#[derive(Debug)]
pub enum IntakeError {
    Unauthorized(SignatureError),
    BadRequest(String),
    Unavailable(DomainError),
}

impl IntoResponse for IntakeError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            IntakeError::Unauthorized(e) => (
                StatusCode::UNAUTHORIZED,
                ErrorResponse::new("INVALID_SIGNATURE", e.to_string()),
            ),
            IntakeError::BadRequest(msg) => {
                (StatusCode::BAD_REQUEST, ErrorResponse::new("BAD_REQUEST", msg))
            }
            IntakeError::Unavailable(e) => {
                tracing::error!(error = %e, "Failed to enqueue job");
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    ErrorResponse::new(e.code.to_string(), "Job queue unavailable"),
                )
            }
        };
        (status, Json(body)).into_response()
    }
}

// ════════════════════════════════════════════════════════════════════════════════
// Handlers
// ════════════════════════════════════════════════════════════════════════════════

/// `POST /events/inbound`
pub async fn receive_inbound(
    State(state): State<IntakeState>,
    Json(request): Json<InboundEventRequest>,
) -> Result<(StatusCode, Json<AcceptedResponse>), IntakeError> {
    let (contact_id, message) = request.into_parts();
    tracing::debug!(
        contact_id = %contact_id,
        message_id = %message.message_id,
        channel = %message.channel,
        "Inbound message accepted"
    );

    let job = Job::process_event(contact_id, Event::InboundMessage(message));
    let job_id = state
        .queue
        .schedule_now(job)
        .await
        .map_err(IntakeError::Unavailable)?;

    Ok((StatusCode::ACCEPTED, Json(AcceptedResponse { job_id })))
}

/// `POST /callbacks`
///
/// The signature covers the raw body, so it is checked before parsing.
pub async fn receive_callback(
    State(state): State<IntakeState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<(StatusCode, Json<AcceptedResponse>), IntakeError> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|value| value.to_str().ok());
    if let Err(e) = state.verifier.verify(&body, signature) {
        tracing::warn!(error = %e, "Rejected callback with invalid signature");
        return Err(IntakeError::Unauthorized(e));
    }

    let request: CallbackRequest =
        serde_json::from_slice(&body).map_err(|e| IntakeError::BadRequest(e.to_string()))?;
    tracing::debug!(correlation_key = %request.correlation_key, "Callback accepted");

    let job_id = state
        .queue
        .schedule_now(Job::process_callback(request.correlation_key, request.payload))
        .await
        .map_err(IntakeError::Unavailable)?;

    Ok((StatusCode::ACCEPTED, Json(AcceptedResponse { job_id })))
}

/// `GET /health`
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
    })
}
