mod common;

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use chrono::Duration;
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;
use uuid::Uuid;

use common::*;
use review_market::clock::ManualClock;
use review_market::routes::{self, ACTOR_HEADER};
use review_market::state::AppState;
use review_market::Marketplace;

fn app() -> (Router, Arc<Marketplace>, Arc<ManualClock>) {
    let (market, clock) = market();
    let state = Arc::new(AppState {
        market: market.clone(),
        pool: None,
    });
    (routes::router(state), market, clock)
}

async fn call(
    app: &Router,
    method: &str,
    uri: &str,
    actor: Option<Uuid>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(actor) = actor {
        builder = builder.header(ACTOR_HEADER, actor.to_string());
    }
    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

fn draft() -> Value {
    json!({
        "title": "Chapter one",
        "content_type": "text",
        "review_type": "free",
        "reviews_requested": 1
    })
}

#[tokio::test]
async fn test_health() {
    let (app, _, _) = app();
    let (status, body) = call(&app, "GET", "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn test_full_review_round_trip() {
    let (app, _, _) = app();
    let owner = Uuid::new_v4();
    let reviewer = Uuid::new_v4();

    let (status, request) = call(&app, "POST", "/review-requests", Some(owner), Some(draft())).await;
    assert_eq!(status, StatusCode::CREATED);
    let request_id = request["id"].as_str().unwrap().to_string();
    let slot_id = request["slot_ids"][0].as_str().unwrap().to_string();

    let (status, slot) = call(
        &app,
        "POST",
        &format!("/review-requests/{}/slots/{}/claim", request_id, slot_id),
        Some(reviewer),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(slot["status"], "claimed");

    let (status, slot) = call(
        &app,
        "POST",
        &format!("/slots/{}/submit", slot_id),
        Some(reviewer),
        Some(json!({ "content": REVIEW_TEXT, "rating": 4 })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(slot["status"], "submitted");

    let (status, slot) = call(
        &app,
        "POST",
        &format!("/slots/{}/accept", slot_id),
        Some(owner),
        Some(json!({ "helpful_rating": 4 })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(slot["status"], "accepted");

    let (status, view) = call(&app, "GET", &format!("/review-requests/{}", request_id), None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(view["slots"][0]["status"], "accepted");

    let (status, tier) = call(&app, "GET", &format!("/users/{}/tier-status", reviewer), None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(tier["tier"], "NOVICE");
    assert_eq!(tier["karma"], 35);

    let (status, history) = call(&app, "GET", &format!("/users/{}/karma", reviewer), None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(history.as_array().unwrap().len(), 3);
}

#[tokio::test]
async fn test_errors_map_to_status_codes() {
    let (app, market, clock) = app();
    let (owner, request) = open_request(&market, free_draft(1)).await;
    let slot_id = request.slot_ids[0];
    let claim_uri = format!("/review-requests/{}/slots/{}/claim", request.id, slot_id);

    let (status, body) = call(&app, "POST", &claim_uri, None, None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"], "forbidden");

    let (status, body) = call(&app, "POST", &claim_uri, Some(owner), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"], "policy_violation");

    let reviewer = Uuid::new_v4();
    let (status, _) = call(&app, "POST", &claim_uri, Some(reviewer), None).await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = call(&app, "POST", &claim_uri, Some(Uuid::new_v4()), None).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "claim_conflict");

    let (status, body) = call(
        &app,
        "POST",
        &format!("/slots/{}/accept", slot_id),
        Some(owner),
        Some(json!({ "helpful_rating": 5 })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "invalid_transition");

    let (status, body) = call(
        &app,
        "POST",
        &format!("/slots/{}/submit", slot_id),
        Some(reviewer),
        Some(json!({ "content": "too short", "rating": 4 })),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"], "validation");

    clock.advance(Duration::hours(49));
    let (status, body) = call(
        &app,
        "POST",
        &format!("/slots/{}/submit", slot_id),
        Some(reviewer),
        Some(json!({ "content": REVIEW_TEXT, "rating": 4 })),
    )
    .await;
    assert_eq!(status, StatusCode::GONE);
    assert_eq!(body["error"], "deadline_expired");

    let (status, body) = call(
        &app,
        "GET",
        &format!("/review-requests/{}", Uuid::new_v4()),
        None,
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "not_found");
}

#[tokio::test]
async fn test_expensive_claim_is_tier_restricted() {
    let (app, market, _) = app();
    let (_, request) = open_request(&market, expert_draft(1, 30_000)).await;

    let (status, body) = call(
        &app,
        "POST",
        &format!(
            "/review-requests/{}/slots/{}/claim",
            request.id, request.slot_ids[0]
        ),
        Some(Uuid::new_v4()),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"], "tier_restricted");
}

#[tokio::test]
async fn test_promotion_blocked_is_conflict() {
    let (app, _, _) = app();
    let user = Uuid::new_v4();

    let (status, progress) = call(&app, "GET", &format!("/users/{}/tier-progress", user), None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(progress["next"], "CONTRIBUTOR");

    let (status, body) = call(&app, "POST", &format!("/users/{}/promote", user), None, None).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "promotion_blocked");
}

#[tokio::test]
async fn test_karma_api_records_events() {
    let (app, _, _) = app();
    let admin = Uuid::new_v4();
    let user = Uuid::new_v4();
    let uri = format!("/users/{}/karma", user);

    let (status, tx) = call(
        &app,
        "POST",
        &uri,
        Some(admin),
        Some(json!({ "action": "referral", "reason": "Invited a friend" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(tx["points"], 25);

    let (status, tx) = call(
        &app,
        "POST",
        &uri,
        Some(admin),
        Some(json!({ "action": "manual", "delta": -7, "reason": "Duplicate referral" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(tx["points"], -7);

    let (status, body) = call(
        &app,
        "POST",
        &uri,
        Some(admin),
        Some(json!({ "action": "manual", "reason": "No delta" })),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"], "validation");

    let (status, body) = call(
        &app,
        "POST",
        &uri,
        Some(admin),
        Some(json!({ "action": "promotion", "reason": "Shortcut" })),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"], "validation");

    let (_, status_body) = call(&app, "GET", &format!("/users/{}/tier-status", user), None, None).await;
    assert_eq!(status_body["karma"], 18);
}

#[tokio::test]
async fn test_review_karma_cannot_be_posted() {
    let (app, _, _) = app();
    let user = Uuid::new_v4();
    let uri = format!("/users/{}/karma", user);

    for action in ["accepted", "very_helpful", "milestone", "streak_bonus", "submitted"] {
        let (status, body) = call(
            &app,
            "POST",
            &uri,
            Some(Uuid::new_v4()),
            Some(json!({ "action": action, "reason": "Free points" })),
        )
        .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY, "{}", action);
        assert_eq!(body["error"], "validation");
    }

    let (status, body) = call(
        &app,
        "POST",
        &uri,
        Some(user),
        Some(json!({ "action": "referral", "reason": "Invited myself" })),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"], "forbidden");

    let (_, tier) = call(&app, "GET", &format!("/users/{}/tier-status", user), None, None).await;
    assert_eq!(tier["karma"], 0);
}
