use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use super::{ActorId, ApiError, ApiResult};
use crate::error::MarketError;
use crate::reputation::{KarmaAction, KarmaMetadata, KarmaTransaction, TierProgress, UserTierStatus};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct KarmaRange {
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
pub struct KarmaBody {
    pub action: KarmaAction,
    /// Required for `manual`, ignored otherwise
    #[serde(default)]
    pub delta: Option<i64>,
    pub reason: String,
}

pub async fn tier_status(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<Uuid>,
) -> Json<UserTierStatus> {
    Json(state.market.tier_status(user_id).await)
}

/// `null` once the user holds the top tier.
pub async fn tier_progress(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<Uuid>,
) -> Json<Option<TierProgress>> {
    Json(state.market.tier_progress(user_id).await)
}

pub async fn promote_user(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<Uuid>,
) -> ApiResult<UserTierStatus> {
    Ok(Json(state.market.promote(user_id).await?))
}

pub async fn karma_history(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<Uuid>,
    Query(range): Query<KarmaRange>,
) -> ApiResult<Vec<KarmaTransaction>> {
    let from = range.from.unwrap_or(DateTime::<Utc>::UNIX_EPOCH);
    let to = range
        .to
        .unwrap_or_else(|| state.market.now() + Duration::days(1));
    if from > to {
        return Err(MarketError::Validation("from must not be after to".to_string()).into());
    }

    let history = match &state.pool {
        Some(pool) => crate::db::karma_between(pool.as_ref(), user_id, from, to)
            .await
            .map_err(MarketError::from)?,
        None => {
            state
                .market
                .reputation()
                .history_between(user_id, from, to)
                .await
        }
    };
    Ok(Json(history))
}

pub async fn record_karma(
    State(state): State<Arc<AppState>>,
    ActorId(actor): ActorId,
    Path(user_id): Path<Uuid>,
    Json(body): Json<KarmaBody>,
) -> Result<(StatusCode, Json<KarmaTransaction>), ApiError> {
    if actor == user_id {
        return Err(MarketError::Forbidden("cannot record karma for yourself".to_string()).into());
    }
    if !body.action.is_externally_recorded() {
        return Err(MarketError::Validation(format!(
            "{} karma only comes from review activity",
            body.action
        ))
        .into());
    }

    let reputation = state.market.reputation();
    let tx = match body.action {
        KarmaAction::Manual => {
            let delta = body.delta.ok_or_else(|| {
                MarketError::Validation("manual adjustments need a delta".to_string())
            })?;
            reputation.adjust(user_id, delta, body.reason).await?
        }
        action => {
            reputation
                .record(user_id, action, body.reason, KarmaMetadata::default())
                .await?
        }
    };

    info!(
        user_id = %user_id,
        actor = %actor,
        action = %tx.action,
        points = tx.points,
        "Karma event recorded through API"
    );
    Ok((StatusCode::CREATED, Json(tx)))
}
