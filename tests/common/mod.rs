#![allow(dead_code)]

use chrono::{DateTime, TimeZone, Utc};
use std::sync::Arc;
use uuid::Uuid;

use review_market::clock::ManualClock;
use review_market::lifecycle::{
    LifecyclePolicy, ReviewRequest, ReviewRequestDraft, ReviewSlot, ReviewType,
};
use review_market::pricing::Pricing;
use review_market::Marketplace;

pub const REVIEW_TEXT: &str =
    "The argument in section two is solid, but the conclusion overreaches the data shown.";

pub fn start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 4, 10, 0, 0).unwrap()
}

pub fn market_with(policy: LifecyclePolicy) -> (Arc<Marketplace>, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::new(start()));
    let market = Arc::new(Marketplace::new(policy, Pricing::default(), clock.clone()));
    (market, clock)
}

pub fn market() -> (Arc<Marketplace>, Arc<ManualClock>) {
    market_with(LifecyclePolicy::default())
}

pub fn free_draft(reviews: u32) -> ReviewRequestDraft {
    ReviewRequestDraft {
        title: "Short story draft".to_string(),
        content_type: "text".to_string(),
        review_type: ReviewType::Free,
        budget_cents: None,
        reviews_requested: reviews,
        deadline: None,
    }
}

pub fn expert_draft(reviews: u32, budget_cents: i64) -> ReviewRequestDraft {
    ReviewRequestDraft {
        title: "Series A pitch deck".to_string(),
        content_type: "slides".to_string(),
        review_type: ReviewType::Expert,
        budget_cents: Some(budget_cents),
        reviews_requested: reviews,
        deadline: None,
    }
}

pub async fn open_request(
    market: &Marketplace,
    draft: ReviewRequestDraft,
) -> (Uuid, ReviewRequest) {
    let owner = Uuid::new_v4();
    let request = market
        .lifecycle()
        .create_request(owner, draft)
        .await
        .unwrap();
    (owner, request)
}

pub async fn submitted_slot(market: &Marketplace, request: &ReviewRequest) -> (Uuid, ReviewSlot) {
    let reviewer = Uuid::new_v4();
    let slot_id = request.slot_ids[0];
    market.lifecycle().claim(slot_id, reviewer).await.unwrap();
    let slot = market
        .lifecycle()
        .submit(slot_id, reviewer, REVIEW_TEXT.to_string(), 4)
        .await
        .unwrap();
    (reviewer, slot)
}
