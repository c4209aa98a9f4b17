use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::escrow::EscrowState;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewType {
    Free,
    Expert,
}

impl ReviewType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReviewType::Free => "free",
            ReviewType::Expert => "expert",
        }
    }
}

/// Requester input for a new review request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewRequestDraft {
    pub title: String,
    pub content_type: String,
    pub review_type: ReviewType,
    #[serde(default)]
    pub budget_cents: Option<i64>,
    pub reviews_requested: u32,
    #[serde(default)]
    pub deadline: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewRequest {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub title: String,
    pub content_type: String,
    pub review_type: ReviewType,
    /// Present only for expert reviews
    pub budget_cents: Option<i64>,
    pub reviews_requested: u32,
    pub reviews_claimed: u32,
    pub deadline: Option<DateTime<Utc>>,
    pub slot_ids: Vec<Uuid>,
    pub created_at: DateTime<Utc>,
}

impl ReviewRequest {
    pub fn available_slots(&self) -> u32 {
        self.reviews_requested.saturating_sub(self.reviews_claimed)
    }

    pub fn is_paid(&self) -> bool {
        self.review_type == ReviewType::Expert && self.budget_cents.unwrap_or(0) > 0
    }

    pub fn is_closed_at(&self, now: DateTime<Utc>) -> bool {
        self.deadline.map_or(false, |deadline| now >= deadline)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SlotStatus {
    Available,
    Claimed,
    Submitted,
    Accepted,
    Rejected,
    Abandoned,
    Disputed,
}

impl SlotStatus {
    pub const ALL: [SlotStatus; 7] = [
        SlotStatus::Available,
        SlotStatus::Claimed,
        SlotStatus::Submitted,
        SlotStatus::Accepted,
        SlotStatus::Rejected,
        SlotStatus::Abandoned,
        SlotStatus::Disputed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SlotStatus::Available => "available",
            SlotStatus::Claimed => "claimed",
            SlotStatus::Submitted => "submitted",
            SlotStatus::Accepted => "accepted",
            SlotStatus::Rejected => "rejected",
            SlotStatus::Abandoned => "abandoned",
            SlotStatus::Disputed => "disputed",
        }
    }

    /// The complete edge set of the slot state machine.
    pub fn can_transition_to(&self, next: SlotStatus) -> bool {
        use SlotStatus::*;
        matches!(
            (self, next),
            (Available, Claimed)
                | (Abandoned, Claimed)
                | (Claimed, Submitted)
                | (Claimed, Abandoned)
                | (Claimed, Available)
                | (Submitted, Accepted)
                | (Submitted, Rejected)
                | (Rejected, Disputed)
        )
    }

    /// Slot is open for a new occupancy.
    pub fn is_claimable(&self) -> bool {
        matches!(self, SlotStatus::Available | SlotStatus::Abandoned)
    }

    /// Slot holds a reviewer's active claim.
    pub fn is_active(&self) -> bool {
        matches!(self, SlotStatus::Claimed | SlotStatus::Submitted)
    }

    pub fn is_resolved(&self) -> bool {
        matches!(
            self,
            SlotStatus::Accepted | SlotStatus::Rejected | SlotStatus::Disputed
        )
    }
}

impl fmt::Display for SlotStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    Escrowed,
    Released,
    Refunded,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Escrowed => "escrowed",
            PaymentStatus::Released => "released",
            PaymentStatus::Refunded => "refunded",
        }
    }
}

impl From<EscrowState> for PaymentStatus {
    fn from(state: EscrowState) -> Self {
        match state {
            EscrowState::Pending => PaymentStatus::Pending,
            EscrowState::Escrowed => PaymentStatus::Escrowed,
            EscrowState::Released => PaymentStatus::Released,
            EscrowState::Refunded => PaymentStatus::Refunded,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ElaborationRequest {
    pub text: String,
    pub requested_at: DateTime<Utc>,
    pub respond_by: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewSlot {
    pub id: Uuid,
    pub review_request_id: Uuid,
    pub reviewer_id: Option<Uuid>,
    pub status: SlotStatus,
    /// Bumped by every committed transition
    pub version: u64,
    pub claimed_at: Option<DateTime<Utc>>,
    pub claim_deadline: Option<DateTime<Utc>>,
    pub submitted_at: Option<DateTime<Utc>>,
    pub auto_accept_at: Option<DateTime<Utc>>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub content: Option<String>,
    pub rating: Option<u8>,
    pub helpful_rating: Option<u8>,
    pub auto_accepted: bool,
    pub payment_amount_cents: Option<i64>,
    pub payment_status: Option<PaymentStatus>,
    pub escrow_id: Option<Uuid>,
    pub rejection_reason: Option<String>,
    pub rejection_notes: Option<String>,
    pub elaboration_count: u32,
    pub elaboration_requests: Vec<ElaborationRequest>,
    pub dispute_reason: Option<String>,
}

impl ReviewSlot {
    pub fn new(review_request_id: Uuid) -> Self {
        Self {
            id: Uuid::new_v4(),
            review_request_id,
            reviewer_id: None,
            status: SlotStatus::Available,
            version: 0,
            claimed_at: None,
            claim_deadline: None,
            submitted_at: None,
            auto_accept_at: None,
            resolved_at: None,
            content: None,
            rating: None,
            helpful_rating: None,
            auto_accepted: false,
            payment_amount_cents: None,
            payment_status: None,
            escrow_id: None,
            rejection_reason: None,
            rejection_notes: None,
            elaboration_count: 0,
            elaboration_requests: Vec::new(),
            dispute_reason: None,
        }
    }

    /// Drop everything tied to the previous occupancy, keeping id and version.
    pub(crate) fn reset_occupancy(&mut self) {
        let fresh = ReviewSlot {
            id: self.id,
            version: self.version,
            ..ReviewSlot::new(self.review_request_id)
        };
        *self = fresh;
    }

    pub fn is_bound_to(&self, user_id: Uuid) -> bool {
        self.reviewer_id == Some(user_id)
    }
}

/// Result of an auto-accept attempt.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", content = "slot", rename_all = "snake_case")]
pub enum AutoAcceptOutcome {
    Accepted(ReviewSlot),
    /// Slot was already accepted, rejected or disputed; nothing changed
    AlreadyResolved(ReviewSlot),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transition_table_is_exhaustive() {
        use SlotStatus::*;
        let allowed = [
            (Available, Claimed),
            (Abandoned, Claimed),
            (Claimed, Submitted),
            (Claimed, Abandoned),
            (Claimed, Available),
            (Submitted, Accepted),
            (Submitted, Rejected),
            (Rejected, Disputed),
        ];

        for from in SlotStatus::ALL {
            for to in SlotStatus::ALL {
                assert_eq!(
                    from.can_transition_to(to),
                    allowed.contains(&(from, to)),
                    "{} -> {}",
                    from,
                    to
                );
            }
        }
    }

    #[test]
    fn test_terminal_states_have_no_exit_except_dispute() {
        for to in SlotStatus::ALL {
            assert!(!SlotStatus::Accepted.can_transition_to(to));
            assert!(!SlotStatus::Disputed.can_transition_to(to));
        }
        assert!(SlotStatus::Rejected.can_transition_to(SlotStatus::Disputed));
    }

    #[test]
    fn test_reset_occupancy_keeps_identity() {
        let request_id = Uuid::new_v4();
        let mut slot = ReviewSlot::new(request_id);
        slot.version = 4;
        slot.reviewer_id = Some(Uuid::new_v4());
        slot.content = Some("draft".to_string());
        slot.elaboration_count = 1;
        let id = slot.id;

        slot.reset_occupancy();
        assert_eq!(slot.id, id);
        assert_eq!(slot.version, 4);
        assert_eq!(slot.review_request_id, request_id);
        assert_eq!(slot.reviewer_id, None);
        assert_eq!(slot.content, None);
        assert_eq!(slot.elaboration_count, 0);
    }

    #[test]
    fn test_free_request_is_not_paid() {
        let request = ReviewRequest {
            id: Uuid::new_v4(),
            owner_id: Uuid::new_v4(),
            title: "Landing page copy".to_string(),
            content_type: "text".to_string(),
            review_type: ReviewType::Free,
            budget_cents: None,
            reviews_requested: 3,
            reviews_claimed: 1,
            deadline: None,
            slot_ids: Vec::new(),
            created_at: Utc::now(),
        };
        assert!(!request.is_paid());
        assert_eq!(request.available_slots(), 2);
        assert!(!request.is_closed_at(Utc::now()));
    }
}
