use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::{Mutex, MutexGuard};
use uuid::Uuid;

use super::types::{ReviewRequest, ReviewSlot, SlotStatus};
use crate::error::{MarketError, Result};
use crate::reputation::ReviewOutcomes;

/// Requests, slots and per-reviewer outcome aggregates behind one lock.
///
/// Holding the guard for the whole of a transition is what makes the status
/// check, the counter update and the side effects one atomic step.
#[derive(Default)]
pub struct SlotStore {
    inner: Mutex<StoreInner>,
}

impl SlotStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn lock(&self) -> MutexGuard<'_, StoreInner> {
        self.inner.lock().await
    }
}

#[derive(Default)]
pub struct StoreInner {
    requests: HashMap<Uuid, ReviewRequest>,
    slots: HashMap<Uuid, ReviewSlot>,
    outcomes: HashMap<Uuid, ReviewOutcomes>,
}

impl StoreInner {
    pub fn slot(&self, slot_id: Uuid) -> Result<&ReviewSlot> {
        self.slots
            .get(&slot_id)
            .ok_or_else(|| MarketError::NotFound(format!("slot {}", slot_id)))
    }

    pub fn request(&self, request_id: Uuid) -> Result<&ReviewRequest> {
        self.requests
            .get(&request_id)
            .ok_or_else(|| MarketError::NotFound(format!("review request {}", request_id)))
    }

    pub fn request_mut(&mut self, request_id: Uuid) -> Result<&mut ReviewRequest> {
        self.requests
            .get_mut(&request_id)
            .ok_or_else(|| MarketError::NotFound(format!("review request {}", request_id)))
    }

    pub fn insert_request(&mut self, request: ReviewRequest, slots: Vec<ReviewSlot>) {
        for slot in slots {
            self.slots.insert(slot.id, slot);
        }
        self.requests.insert(request.id, request);
    }

    /// Add a fresh slot to an existing request.
    pub fn append_slot(&mut self, slot: ReviewSlot) -> Result<()> {
        self.request_mut(slot.review_request_id)?.slot_ids.push(slot.id);
        self.slots.insert(slot.id, slot);
        Ok(())
    }

    /// Compare-and-set write of a slot.
    ///
    /// `next` must carry the version it was read at and a status reachable from
    /// the stored one. On success the stored copy has its version bumped.
    pub fn commit(&mut self, mut next: ReviewSlot) -> Result<ReviewSlot> {
        let current = self.slot(next.id)?;
        if current.version != next.version {
            return Err(MarketError::ClaimConflict { slot_id: next.id });
        }
        if current.status != next.status && !current.status.can_transition_to(next.status) {
            return Err(MarketError::InvalidTransition {
                slot_id: next.id,
                from: current.status,
                action: next.status.as_str(),
            });
        }

        next.version += 1;
        self.slots.insert(next.id, next.clone());
        Ok(next)
    }

    pub fn outcomes(&self, user_id: Uuid) -> ReviewOutcomes {
        self.outcomes.get(&user_id).copied().unwrap_or_default()
    }

    pub fn outcomes_mut(&mut self, user_id: Uuid) -> &mut ReviewOutcomes {
        self.outcomes.entry(user_id).or_default()
    }

    pub fn active_claims(&self, reviewer_id: Uuid) -> impl Iterator<Item = &ReviewSlot> {
        self.slots
            .values()
            .filter(move |slot| slot.status.is_active() && slot.is_bound_to(reviewer_id))
    }

    pub fn slots_for_request(&self, request_id: Uuid) -> Result<Vec<ReviewSlot>> {
        let request = self.request(request_id)?;
        Ok(request
            .slot_ids
            .iter()
            .filter_map(|id| self.slots.get(id).cloned())
            .collect())
    }

    pub fn due_for_auto_accept(&self, now: DateTime<Utc>) -> Vec<Uuid> {
        self.slots
            .values()
            .filter(|slot| {
                slot.status == SlotStatus::Submitted
                    && slot.auto_accept_at.map_or(false, |due| due <= now)
            })
            .map(|slot| slot.id)
            .collect()
    }

    pub fn overdue_claims(&self, now: DateTime<Utc>) -> Vec<Uuid> {
        self.slots
            .values()
            .filter(|slot| {
                slot.status == SlotStatus::Claimed
                    && slot.claim_deadline.map_or(false, |deadline| deadline <= now)
            })
            .map(|slot| slot.id)
            .collect()
    }
}
