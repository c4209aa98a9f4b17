mod api;
mod users;

pub use api::*;
pub use users::*;

use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{request::Parts, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::error;
use uuid::Uuid;

use crate::error::MarketError;
use crate::state::AppState;

pub const ACTOR_HEADER: &str = "x-actor-id";

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/review-requests", post(create_request))
        .route("/review-requests/:id", get(get_request))
        .route(
            "/review-requests/:id/slots/:slot_id/claim",
            post(claim_slot),
        )
        .route("/slots/:slot_id/submit", post(submit_review))
        .route("/slots/:slot_id/accept", post(accept_review))
        .route("/slots/:slot_id/reject", post(reject_review))
        .route("/slots/:slot_id/elaborate", post(request_elaboration))
        .route("/slots/:slot_id/abandon", post(abandon_claim))
        .route("/slots/:slot_id/dispute", post(dispute_rejection))
        .route("/users/:id/tier-status", get(tier_status))
        .route("/users/:id/tier-progress", get(tier_progress))
        .route("/users/:id/promote", post(promote_user))
        .route("/users/:id/karma", get(karma_history).post(record_karma))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: &'static str,
    pub message: String,
}

/// Wrapper that turns a [`MarketError`] into a JSON response.
#[derive(Debug)]
pub struct ApiError(pub MarketError);

impl From<MarketError> for ApiError {
    fn from(e: MarketError) -> Self {
        ApiError(e)
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match &self.0 {
            MarketError::ClaimConflict { .. }
            | MarketError::CapacityExceeded { .. }
            | MarketError::InvalidTransition { .. }
            | MarketError::AutoAcceptNotDue { .. }
            | MarketError::ElaborationLimit { .. }
            | MarketError::PromotionBlocked { .. } => StatusCode::CONFLICT,
            MarketError::TierRestricted { .. }
            | MarketError::Forbidden(_)
            | MarketError::PolicyViolation(_) => StatusCode::FORBIDDEN,
            MarketError::DeadlineExpired { .. } | MarketError::RequestClosed { .. } => {
                StatusCode::GONE
            }
            MarketError::NotFound(_) => StatusCode::NOT_FOUND,
            MarketError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            MarketError::EscrowStateError { .. } | MarketError::Database(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(error = %self.0, "Request failed");
        }
        let body = ErrorBody {
            error: self.0.kind(),
            message: self.0.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

pub type ApiResult<T> = Result<Json<T>, ApiError>;

/// Caller identity taken from the `x-actor-id` header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActorId(pub Uuid);

#[async_trait]
impl<S> FromRequestParts<S> for ActorId
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let raw = parts
            .headers
            .get(ACTOR_HEADER)
            .and_then(|value| value.to_str().ok())
            .ok_or_else(|| {
                ApiError(MarketError::Forbidden(format!(
                    "missing {} header",
                    ACTOR_HEADER
                )))
            })?;

        raw.trim().parse().map(ActorId).map_err(|_| {
            ApiError(MarketError::Validation(format!(
                "{} must be a UUID",
                ACTOR_HEADER
            )))
        })
    }
}

pub async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}
