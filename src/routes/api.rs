use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use std::sync::Arc;
use uuid::Uuid;

use super::{ActorId, ApiError, ApiResult};
use crate::error::MarketError;
use crate::lifecycle::{RequestView, ReviewRequest, ReviewRequestDraft, ReviewSlot};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct SubmitBody {
    pub content: String,
    pub rating: u8,
}

#[derive(Debug, Deserialize)]
pub struct AcceptBody {
    pub helpful_rating: u8,
}

#[derive(Debug, Deserialize)]
pub struct RejectBody {
    pub reason: String,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ElaborateBody {
    pub text: String,
}

#[derive(Debug, Deserialize)]
pub struct DisputeBody {
    pub reason: String,
}

pub async fn create_request(
    State(state): State<Arc<AppState>>,
    ActorId(owner): ActorId,
    Json(draft): Json<ReviewRequestDraft>,
) -> Result<(StatusCode, Json<ReviewRequest>), ApiError> {
    let request = state.market.lifecycle().create_request(owner, draft).await?;
    Ok((StatusCode::CREATED, Json(request)))
}

pub async fn get_request(
    State(state): State<Arc<AppState>>,
    Path(request_id): Path<Uuid>,
) -> ApiResult<RequestView> {
    Ok(Json(state.market.lifecycle().request_view(request_id).await?))
}

pub async fn claim_slot(
    State(state): State<Arc<AppState>>,
    ActorId(reviewer): ActorId,
    Path((request_id, slot_id)): Path<(Uuid, Uuid)>,
) -> ApiResult<ReviewSlot> {
    let lifecycle = state.market.lifecycle();
    let slot = lifecycle.get_slot(slot_id).await?;
    if slot.review_request_id != request_id {
        return Err(MarketError::NotFound(format!(
            "slot {} on review request {}",
            slot_id, request_id
        ))
        .into());
    }
    Ok(Json(lifecycle.claim(slot_id, reviewer).await?))
}

pub async fn submit_review(
    State(state): State<Arc<AppState>>,
    ActorId(reviewer): ActorId,
    Path(slot_id): Path<Uuid>,
    Json(body): Json<SubmitBody>,
) -> ApiResult<ReviewSlot> {
    let slot = state
        .market
        .lifecycle()
        .submit(slot_id, reviewer, body.content, body.rating)
        .await?;
    Ok(Json(slot))
}

pub async fn accept_review(
    State(state): State<Arc<AppState>>,
    ActorId(requester): ActorId,
    Path(slot_id): Path<Uuid>,
    Json(body): Json<AcceptBody>,
) -> ApiResult<ReviewSlot> {
    let slot = state
        .market
        .lifecycle()
        .accept(slot_id, requester, body.helpful_rating)
        .await?;
    Ok(Json(slot))
}

pub async fn reject_review(
    State(state): State<Arc<AppState>>,
    ActorId(requester): ActorId,
    Path(slot_id): Path<Uuid>,
    Json(body): Json<RejectBody>,
) -> ApiResult<ReviewSlot> {
    let slot = state
        .market
        .lifecycle()
        .reject(slot_id, requester, body.reason, body.notes)
        .await?;
    Ok(Json(slot))
}

pub async fn request_elaboration(
    State(state): State<Arc<AppState>>,
    ActorId(requester): ActorId,
    Path(slot_id): Path<Uuid>,
    Json(body): Json<ElaborateBody>,
) -> ApiResult<ReviewSlot> {
    let slot = state
        .market
        .lifecycle()
        .request_elaboration(slot_id, requester, body.text)
        .await?;
    Ok(Json(slot))
}

pub async fn abandon_claim(
    State(state): State<Arc<AppState>>,
    ActorId(reviewer): ActorId,
    Path(slot_id): Path<Uuid>,
) -> ApiResult<ReviewSlot> {
    Ok(Json(state.market.lifecycle().abandon(slot_id, reviewer).await?))
}

pub async fn dispute_rejection(
    State(state): State<Arc<AppState>>,
    ActorId(reviewer): ActorId,
    Path(slot_id): Path<Uuid>,
    Json(body): Json<DisputeBody>,
) -> ApiResult<ReviewSlot> {
    let slot = state
        .market
        .lifecycle()
        .dispute(slot_id, reviewer, body.reason)
        .await?;
    Ok(Json(slot))
}
