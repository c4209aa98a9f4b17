//! Slot lifecycle: claim, submit and resolve a unit of reviewing work.
//!
//! Every operation takes the store lock, validates against the slot's current
//! state, applies escrow and karma side effects, and commits the new slot with a
//! compare-and-set on its version before releasing the lock.

mod store;
mod types;

pub use store::{SlotStore, StoreInner};
pub use types::{
    AutoAcceptOutcome, ElaborationRequest, PaymentStatus, ReviewRequest, ReviewRequestDraft,
    ReviewSlot, ReviewType, SlotStatus,
};

use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::clock::Clock;
use crate::error::{MarketError, Result};
use crate::escrow::EscrowLedger;
use crate::events::{EventBus, MarketEvent, AUTO_ACTOR};
use crate::pricing::Pricing;
use crate::reputation::{KarmaMetadata, ReputationEngine, ReviewOutcomes};

/// Largest budget a single expert request may carry ($1,000,000).
pub const MAX_BUDGET_CENTS: i64 = 100_000_000;

/// Tunables for the slot state machine.
#[derive(Debug, Clone)]
pub struct LifecyclePolicy {
    /// Time a reviewer has to submit after claiming
    pub claim_window: Duration,
    /// Time a requester has to act before a submission is auto-accepted
    pub auto_accept_grace: Duration,
    pub max_elaborations: u32,
    /// Response SLA attached to each elaboration request; informational only
    pub elaboration_response_window: Duration,
    pub min_review_length: usize,
    pub min_elaboration_length: usize,
    /// Concurrent claimed/submitted slots a reviewer may hold
    pub max_active_claims: usize,
    /// Open a replacement slot when a review is rejected
    pub reopen_on_reject: bool,
    pub max_reviews_per_request: u32,
}

impl Default for LifecyclePolicy {
    fn default() -> Self {
        Self {
            claim_window: Duration::hours(48),
            auto_accept_grace: Duration::days(7),
            max_elaborations: 2,
            elaboration_response_window: Duration::hours(48),
            min_review_length: 50,
            min_elaboration_length: 20,
            max_active_claims: 3,
            reopen_on_reject: true,
            max_reviews_per_request: 10,
        }
    }
}

/// A request together with its slots, in creation order.
#[derive(Debug, Clone, serde::Serialize)]
pub struct RequestView {
    pub request: ReviewRequest,
    pub slots: Vec<ReviewSlot>,
}

pub struct SlotLifecycleManager {
    store: SlotStore,
    escrow: Arc<EscrowLedger>,
    reputation: Arc<ReputationEngine>,
    pricing: Pricing,
    policy: LifecyclePolicy,
    clock: Arc<dyn Clock>,
    events: EventBus,
}

fn validate_rating(rating: u8, field: &str) -> Result<()> {
    if !(1..=5).contains(&rating) {
        return Err(MarketError::Validation(format!(
            "{} must be between 1 and 5, got {}",
            field, rating
        )));
    }
    Ok(())
}

fn validate_length(text: &str, min: usize, field: &str) -> Result<()> {
    let len = text.trim().chars().count();
    if len < min {
        return Err(MarketError::Validation(format!(
            "{} must be at least {} characters, got {}",
            field, min, len
        )));
    }
    Ok(())
}

impl SlotLifecycleManager {
    pub fn new(
        escrow: Arc<EscrowLedger>,
        reputation: Arc<ReputationEngine>,
        pricing: Pricing,
        policy: LifecyclePolicy,
        clock: Arc<dyn Clock>,
        events: EventBus,
    ) -> Self {
        Self {
            store: SlotStore::new(),
            escrow,
            reputation,
            pricing,
            policy,
            clock,
            events,
        }
    }

    pub fn policy(&self) -> &LifecyclePolicy {
        &self.policy
    }

    fn announce(&self, slot: &ReviewSlot, request: &ReviewRequest, actor: String) {
        self.events.publish(MarketEvent::SlotChanged {
            slot: slot.clone(),
            request: request.clone(),
            actor,
        });
    }

    pub async fn create_request(
        &self,
        owner_id: Uuid,
        draft: ReviewRequestDraft,
    ) -> Result<ReviewRequest> {
        let now = self.clock.now();
        if draft.title.trim().is_empty() {
            return Err(MarketError::Validation("title is required".to_string()));
        }
        if draft.reviews_requested == 0
            || draft.reviews_requested > self.policy.max_reviews_per_request
        {
            return Err(MarketError::Validation(format!(
                "reviews_requested must be between 1 and {}",
                self.policy.max_reviews_per_request
            )));
        }
        match (draft.review_type, draft.budget_cents) {
            (ReviewType::Expert, Some(budget)) if budget > MAX_BUDGET_CENTS => {
                return Err(MarketError::Validation(format!(
                    "budget cannot exceed {} cents",
                    MAX_BUDGET_CENTS
                )))
            }
            (ReviewType::Expert, Some(budget)) if budget > 0 => {}
            (ReviewType::Expert, _) => {
                return Err(MarketError::Validation(
                    "expert reviews need a positive budget".to_string(),
                ))
            }
            (ReviewType::Free, Some(_)) => {
                return Err(MarketError::Validation(
                    "free reviews cannot carry a budget".to_string(),
                ))
            }
            (ReviewType::Free, None) => {}
        }
        if draft.deadline.map_or(false, |deadline| deadline <= now) {
            return Err(MarketError::Validation(
                "deadline must be in the future".to_string(),
            ));
        }

        let id = Uuid::new_v4();
        let slots: Vec<ReviewSlot> = (0..draft.reviews_requested)
            .map(|_| ReviewSlot::new(id))
            .collect();
        let request = ReviewRequest {
            id,
            owner_id,
            title: draft.title.trim().to_string(),
            content_type: draft.content_type,
            review_type: draft.review_type,
            budget_cents: draft.budget_cents,
            reviews_requested: draft.reviews_requested,
            reviews_claimed: 0,
            deadline: draft.deadline,
            slot_ids: slots.iter().map(|slot| slot.id).collect(),
            created_at: now,
        };

        self.store
            .lock()
            .await
            .insert_request(request.clone(), slots);

        info!(
            request_id = %request.id,
            owner_id = %owner_id,
            review_type = request.review_type.as_str(),
            reviews_requested = request.reviews_requested,
            "Review request created"
        );
        self.events.publish(MarketEvent::RequestCreated {
            request: request.clone(),
        });
        Ok(request)
    }

    pub async fn claim(&self, slot_id: Uuid, reviewer_id: Uuid) -> Result<ReviewSlot> {
        let mut store = self.store.lock().await;
        let now = self.clock.now();
        let mut slot = store.slot(slot_id)?.clone();

        if slot.status.is_active() {
            return Err(MarketError::ClaimConflict { slot_id });
        }
        if !slot.status.is_claimable() {
            return Err(MarketError::InvalidTransition {
                slot_id,
                from: slot.status,
                action: "claim",
            });
        }

        let request = store.request(slot.review_request_id)?.clone();
        if request.owner_id == reviewer_id {
            return Err(MarketError::PolicyViolation(
                "reviewers cannot claim their own request".to_string(),
            ));
        }
        if request.is_closed_at(now) {
            return Err(MarketError::RequestClosed {
                request_id: request.id,
            });
        }

        let (same_request, active) = store
            .active_claims(reviewer_id)
            .fold((false, 0usize), |(same, count), held| {
                (same || held.review_request_id == request.id, count + 1)
            });
        if same_request {
            return Err(MarketError::PolicyViolation(
                "reviewer already holds a slot on this request".to_string(),
            ));
        }
        if active >= self.policy.max_active_claims {
            return Err(MarketError::PolicyViolation(format!(
                "reviewer already holds {} active claims",
                active
            )));
        }

        let tier = self.reputation.effective_tier(reviewer_id).await;
        if !tier.benefits().can_claim_budget(request.budget_cents) {
            return Err(MarketError::TierRestricted {
                tier,
                budget_cents: request.budget_cents.unwrap_or(0),
            });
        }
        if request.available_slots() == 0 {
            return Err(MarketError::CapacityExceeded {
                request_id: request.id,
            });
        }

        slot.reset_occupancy();
        slot.status = SlotStatus::Claimed;
        slot.reviewer_id = Some(reviewer_id);
        slot.claimed_at = Some(now);
        slot.claim_deadline = Some(now + self.policy.claim_window);

        if request.is_paid() {
            let amount = request.budget_cents.unwrap_or(0);
            let record = self
                .escrow
                .hold(
                    slot.id,
                    request.owner_id,
                    reviewer_id,
                    amount,
                    self.pricing.platform_fee(amount),
                )
                .await?;
            slot.payment_amount_cents = Some(amount);
            slot.payment_status = Some(record.state.into());
            slot.escrow_id = Some(record.id);
        }

        let slot = store.commit(slot)?;
        let request = {
            let request = store.request_mut(slot.review_request_id)?;
            request.reviews_claimed += 1;
            request.clone()
        };

        info!(
            slot_id = %slot_id,
            request_id = %request.id,
            reviewer_id = %reviewer_id,
            tier = %tier,
            available = request.available_slots(),
            "Slot claimed"
        );
        self.announce(&slot, &request, reviewer_id.to_string());
        Ok(slot)
    }

    pub async fn submit(
        &self,
        slot_id: Uuid,
        reviewer_id: Uuid,
        content: String,
        rating: u8,
    ) -> Result<ReviewSlot> {
        let mut store = self.store.lock().await;
        let now = self.clock.now();
        let mut slot = store.slot(slot_id)?.clone();

        if slot.status != SlotStatus::Claimed {
            return Err(MarketError::InvalidTransition {
                slot_id,
                from: slot.status,
                action: "submit",
            });
        }
        if !slot.is_bound_to(reviewer_id) {
            return Err(MarketError::Forbidden(
                "only the claiming reviewer can submit".to_string(),
            ));
        }

        // The deadline is judged here, inside the critical section.
        let deadline = slot.claim_deadline.unwrap_or(now);
        if now >= deadline {
            self.abandon_expired(&mut store, slot, reviewer_id.to_string())
                .await?;
            return Err(MarketError::DeadlineExpired { slot_id, deadline });
        }

        validate_rating(rating, "rating")?;
        validate_length(&content, self.policy.min_review_length, "review content")?;

        slot.status = SlotStatus::Submitted;
        slot.content = Some(content);
        slot.rating = Some(rating);
        slot.submitted_at = Some(now);
        slot.auto_accept_at = Some(now + self.policy.auto_accept_grace);

        let slot = store.commit(slot)?;
        store.outcomes_mut(reviewer_id).submitted += 1;
        let request = store.request(slot.review_request_id)?.clone();

        self.reputation
            .after_submission(reviewer_id, KarmaMetadata::for_slot(request.id, slot.id))
            .await;

        info!(
            slot_id = %slot_id,
            reviewer_id = %reviewer_id,
            auto_accept_at = ?slot.auto_accept_at,
            "Review submitted"
        );
        self.announce(&slot, &request, reviewer_id.to_string());
        Ok(slot)
    }

    pub async fn accept(
        &self,
        slot_id: Uuid,
        requester_id: Uuid,
        helpful_rating: u8,
    ) -> Result<ReviewSlot> {
        let mut store = self.store.lock().await;
        let slot = store.slot(slot_id)?.clone();

        if slot.status != SlotStatus::Submitted {
            return Err(MarketError::InvalidTransition {
                slot_id,
                from: slot.status,
                action: "accept",
            });
        }
        let request = store.request(slot.review_request_id)?;
        if request.owner_id != requester_id {
            return Err(MarketError::Forbidden(
                "only the request owner can accept".to_string(),
            ));
        }
        validate_rating(helpful_rating, "helpful_rating")?;

        self.accept_submitted(&mut store, slot, Some(helpful_rating), requester_id.to_string())
            .await
    }

    /// Accept on the requester's behalf once the grace window has passed.
    ///
    /// Calling this on a slot that is already resolved is a no-op.
    pub async fn auto_accept(&self, slot_id: Uuid) -> Result<AutoAcceptOutcome> {
        let mut store = self.store.lock().await;
        let now = self.clock.now();
        let slot = store.slot(slot_id)?.clone();

        if slot.status.is_resolved() {
            debug!(slot_id = %slot_id, status = %slot.status, "Auto-accept skipped, slot already resolved");
            return Ok(AutoAcceptOutcome::AlreadyResolved(slot));
        }
        if slot.status != SlotStatus::Submitted {
            return Err(MarketError::InvalidTransition {
                slot_id,
                from: slot.status,
                action: "auto-accept",
            });
        }
        if let Some(due_at) = slot.auto_accept_at {
            if now < due_at {
                return Err(MarketError::AutoAcceptNotDue { slot_id, due_at });
            }
        }

        let slot = self
            .accept_submitted(&mut store, slot, None, AUTO_ACTOR.to_string())
            .await?;
        Ok(AutoAcceptOutcome::Accepted(slot))
    }

    async fn accept_submitted(
        &self,
        store: &mut StoreInner,
        mut slot: ReviewSlot,
        helpful_rating: Option<u8>,
        actor: String,
    ) -> Result<ReviewSlot> {
        let now = self.clock.now();
        if let Some(escrow_id) = slot.escrow_id {
            let record = self.escrow.release(escrow_id).await?;
            slot.payment_status = Some(record.state.into());
        }

        slot.status = SlotStatus::Accepted;
        slot.resolved_at = Some(now);
        slot.helpful_rating = helpful_rating;
        slot.auto_accepted = helpful_rating.is_none();

        let slot = store.commit(slot)?;
        let request = store.request(slot.review_request_id)?.clone();

        if let Some(reviewer_id) = slot.reviewer_id {
            let accepted_total = {
                let outcomes = store.outcomes_mut(reviewer_id);
                outcomes.accepted += 1;
                if let Some(rating) = helpful_rating {
                    outcomes.helpful_rating_sum += u32::from(rating);
                    outcomes.helpful_rating_count += 1;
                }
                outcomes.accepted
            };
            self.reputation
                .after_acceptance(
                    reviewer_id,
                    helpful_rating,
                    accepted_total,
                    KarmaMetadata::for_slot(request.id, slot.id),
                )
                .await;
        }

        info!(
            slot_id = %slot.id,
            actor = %actor,
            helpful_rating = ?helpful_rating,
            "Review accepted"
        );
        self.announce(&slot, &request, actor);
        Ok(slot)
    }

    pub async fn reject(
        &self,
        slot_id: Uuid,
        requester_id: Uuid,
        reason: String,
        notes: Option<String>,
    ) -> Result<ReviewSlot> {
        let mut store = self.store.lock().await;
        let now = self.clock.now();
        let mut slot = store.slot(slot_id)?.clone();

        if slot.status != SlotStatus::Submitted {
            return Err(MarketError::InvalidTransition {
                slot_id,
                from: slot.status,
                action: "reject",
            });
        }
        if store.request(slot.review_request_id)?.owner_id != requester_id {
            return Err(MarketError::Forbidden(
                "only the request owner can reject".to_string(),
            ));
        }
        if reason.trim().is_empty() {
            return Err(MarketError::Validation(
                "a rejection reason is required".to_string(),
            ));
        }

        if let Some(escrow_id) = slot.escrow_id {
            let record = self.escrow.refund(escrow_id).await?;
            slot.payment_status = Some(record.state.into());
        }
        slot.status = SlotStatus::Rejected;
        slot.resolved_at = Some(now);
        slot.rejection_reason = Some(reason.trim().to_string());
        slot.rejection_notes = notes;

        let slot = store.commit(slot)?;
        if let Some(reviewer_id) = slot.reviewer_id {
            store.outcomes_mut(reviewer_id).rejected += 1;
        }

        let replacement = if self.policy.reopen_on_reject {
            let replacement = ReviewSlot::new(slot.review_request_id);
            store.append_slot(replacement.clone())?;
            let request = store.request_mut(slot.review_request_id)?;
            request.reviews_claimed = request.reviews_claimed.saturating_sub(1);
            Some(replacement)
        } else {
            None
        };
        let request = store.request(slot.review_request_id)?.clone();

        if let Some(reviewer_id) = slot.reviewer_id {
            self.reputation
                .after_rejection(
                    reviewer_id,
                    slot.rejection_reason.as_deref().unwrap_or_default(),
                    KarmaMetadata::for_slot(request.id, slot.id),
                )
                .await;
        }

        info!(
            slot_id = %slot_id,
            requester_id = %requester_id,
            reopened = replacement.is_some(),
            "Review rejected"
        );
        self.announce(&slot, &request, requester_id.to_string());
        if let Some(replacement) = replacement {
            self.announce(&replacement, &request, requester_id.to_string());
        }
        Ok(slot)
    }

    pub async fn request_elaboration(
        &self,
        slot_id: Uuid,
        requester_id: Uuid,
        text: String,
    ) -> Result<ReviewSlot> {
        let mut store = self.store.lock().await;
        let now = self.clock.now();
        let mut slot = store.slot(slot_id)?.clone();

        if slot.status != SlotStatus::Submitted {
            return Err(MarketError::InvalidTransition {
                slot_id,
                from: slot.status,
                action: "request elaboration on",
            });
        }
        if store.request(slot.review_request_id)?.owner_id != requester_id {
            return Err(MarketError::Forbidden(
                "only the request owner can ask for elaboration".to_string(),
            ));
        }
        if slot.elaboration_count >= self.policy.max_elaborations {
            return Err(MarketError::ElaborationLimit {
                slot_id,
                max: self.policy.max_elaborations,
            });
        }
        validate_length(&text, self.policy.min_elaboration_length, "elaboration request")?;

        let respond_by = now + self.policy.elaboration_response_window;
        let text = text.trim().to_string();
        slot.elaboration_count += 1;
        slot.elaboration_requests.push(ElaborationRequest {
            text: text.clone(),
            requested_at: now,
            respond_by,
        });

        let slot = store.commit(slot)?;
        let request = store.request(slot.review_request_id)?.clone();

        info!(
            slot_id = %slot_id,
            elaboration_count = slot.elaboration_count,
            respond_by = %respond_by,
            "Elaboration requested"
        );
        self.events.publish(MarketEvent::ElaborationRequested {
            slot_id,
            requester_id,
            reviewer_id: slot.reviewer_id,
            text,
            respond_by,
        });
        self.announce(&slot, &request, requester_id.to_string());
        Ok(slot)
    }

    /// Reviewer gives up a claim; the slot goes back to `available`.
    pub async fn abandon(&self, slot_id: Uuid, reviewer_id: Uuid) -> Result<ReviewSlot> {
        let mut store = self.store.lock().await;
        let mut slot = store.slot(slot_id)?.clone();

        if slot.status != SlotStatus::Claimed {
            return Err(MarketError::InvalidTransition {
                slot_id,
                from: slot.status,
                action: "abandon",
            });
        }
        if !slot.is_bound_to(reviewer_id) {
            return Err(MarketError::Forbidden(
                "only the claiming reviewer can abandon".to_string(),
            ));
        }

        if let Some(escrow_id) = slot.escrow_id {
            self.escrow.refund(escrow_id).await?;
        }
        slot.reset_occupancy();

        let slot = store.commit(slot)?;
        let request = {
            let request = store.request_mut(slot.review_request_id)?;
            request.reviews_claimed = request.reviews_claimed.saturating_sub(1);
            request.clone()
        };

        info!(
            slot_id = %slot_id,
            reviewer_id = %reviewer_id,
            available = request.available_slots(),
            "Claim abandoned"
        );
        self.announce(&slot, &request, reviewer_id.to_string());
        Ok(slot)
    }

    /// Reviewer contests a rejection. Resolution belongs to moderation.
    pub async fn dispute(
        &self,
        slot_id: Uuid,
        reviewer_id: Uuid,
        reason: String,
    ) -> Result<ReviewSlot> {
        let mut store = self.store.lock().await;
        let mut slot = store.slot(slot_id)?.clone();

        if slot.status != SlotStatus::Rejected {
            return Err(MarketError::InvalidTransition {
                slot_id,
                from: slot.status,
                action: "dispute",
            });
        }
        if !slot.is_bound_to(reviewer_id) {
            return Err(MarketError::Forbidden(
                "only the rejected reviewer can dispute".to_string(),
            ));
        }
        if reason.trim().is_empty() {
            return Err(MarketError::Validation(
                "a dispute reason is required".to_string(),
            ));
        }

        slot.status = SlotStatus::Disputed;
        slot.dispute_reason = Some(reason.trim().to_string());
        let slot = store.commit(slot)?;
        let request = store.request(slot.review_request_id)?.clone();

        warn!(slot_id = %slot_id, reviewer_id = %reviewer_id, "Rejection disputed");
        self.announce(&slot, &request, reviewer_id.to_string());
        Ok(slot)
    }

    /// Abandon a claim whose window has lapsed. Used by the scheduler sweep.
    pub async fn expire_claim(&self, slot_id: Uuid) -> Result<ReviewSlot> {
        let mut store = self.store.lock().await;
        let now = self.clock.now();
        let slot = store.slot(slot_id)?.clone();

        if slot.status != SlotStatus::Claimed {
            return Err(MarketError::InvalidTransition {
                slot_id,
                from: slot.status,
                action: "expire",
            });
        }
        if let Some(deadline) = slot.claim_deadline {
            if now < deadline {
                return Err(MarketError::Validation(format!(
                    "claim on slot {} runs until {}",
                    slot_id, deadline
                )));
            }
        }

        self.abandon_expired(&mut store, slot, AUTO_ACTOR.to_string())
            .await
    }

    async fn abandon_expired(
        &self,
        store: &mut StoreInner,
        mut slot: ReviewSlot,
        actor: String,
    ) -> Result<ReviewSlot> {
        if let Some(escrow_id) = slot.escrow_id {
            let record = self.escrow.refund(escrow_id).await?;
            slot.payment_status = Some(record.state.into());
        }
        slot.status = SlotStatus::Abandoned;

        let slot = store.commit(slot)?;
        let request = {
            let request = store.request_mut(slot.review_request_id)?;
            request.reviews_claimed = request.reviews_claimed.saturating_sub(1);
            request.clone()
        };

        warn!(
            slot_id = %slot.id,
            reviewer_id = ?slot.reviewer_id,
            deadline = ?slot.claim_deadline,
            "Claim window lapsed, slot abandoned"
        );
        self.announce(&slot, &request, actor);
        Ok(slot)
    }

    pub async fn get_slot(&self, slot_id: Uuid) -> Result<ReviewSlot> {
        self.store.lock().await.slot(slot_id).cloned()
    }

    pub async fn get_request(&self, request_id: Uuid) -> Result<ReviewRequest> {
        self.store.lock().await.request(request_id).cloned()
    }

    pub async fn request_view(&self, request_id: Uuid) -> Result<RequestView> {
        let store = self.store.lock().await;
        Ok(RequestView {
            request: store.request(request_id)?.clone(),
            slots: store.slots_for_request(request_id)?,
        })
    }

    pub async fn slots_for_request(&self, request_id: Uuid) -> Result<Vec<ReviewSlot>> {
        self.store.lock().await.slots_for_request(request_id)
    }

    /// Outcome aggregates consumed by the reputation engine.
    pub async fn outcomes_for(&self, user_id: Uuid) -> ReviewOutcomes {
        self.store.lock().await.outcomes(user_id)
    }

    pub async fn due_for_auto_accept(&self, now: DateTime<Utc>) -> Vec<Uuid> {
        self.store.lock().await.due_for_auto_accept(now)
    }

    pub async fn overdue_claims(&self, now: DateTime<Utc>) -> Vec<Uuid> {
        self.store.lock().await.overdue_claims(now)
    }
}
