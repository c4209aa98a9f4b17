use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

use crate::escrow::EscrowState;
use crate::lifecycle::SlotStatus;
use crate::reputation::Tier;

/// Marketplace core error types
#[derive(Error, Debug, Clone, PartialEq)]
pub enum MarketError {
    /// Another reviewer won the race for this slot
    #[error("Slot {slot_id} was claimed by another reviewer")]
    ClaimConflict { slot_id: Uuid },

    /// Every slot of the request is taken
    #[error("Review request {request_id} has no available slots")]
    CapacityExceeded { request_id: Uuid },

    /// Reviewer tier does not allow the request budget
    #[error("Tier {tier} cannot claim a review with budget {budget_cents} cents")]
    TierRestricted { tier: Tier, budget_cents: i64 },

    /// Claim window lapsed; the slot has been abandoned
    #[error("Claim on slot {slot_id} expired at {deadline}")]
    DeadlineExpired {
        slot_id: Uuid,
        deadline: DateTime<Utc>,
    },

    /// Operation not allowed from the slot's current state
    #[error("Cannot {action} slot {slot_id} while it is {from}")]
    InvalidTransition {
        slot_id: Uuid,
        from: SlotStatus,
        action: &'static str,
    },

    /// Escrow operation attempted from the wrong state
    #[error("Cannot {operation} escrow {escrow_id} while it is {state}")]
    EscrowStateError {
        escrow_id: Uuid,
        state: EscrowState,
        operation: &'static str,
    },

    /// Request deadline has passed
    #[error("Review request {request_id} is closed")]
    RequestClosed { request_id: Uuid },

    /// Auto-accept attempted before the grace window ended
    #[error("Slot {slot_id} cannot be auto-accepted before {due_at}")]
    AutoAcceptNotDue { slot_id: Uuid, due_at: DateTime<Utc> },

    /// Requester already used every elaboration request
    #[error("Slot {slot_id} already has the maximum of {max} elaboration requests")]
    ElaborationLimit { slot_id: Uuid, max: u32 },

    /// Next tier's gates are not all met, or the user is already at the top
    #[error("User {user_id} is not eligible for promotion from {tier}")]
    PromotionBlocked { user_id: Uuid, tier: Tier },

    /// Claim policy violated (own request, too many active claims)
    #[error("Policy violation: {0}")]
    PolicyViolation(String),

    /// Actor is not a party allowed to perform the operation
    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Database error: {0}")]
    Database(String),
}

impl MarketError {
    /// Stable machine-readable code for API bodies
    pub fn kind(&self) -> &'static str {
        match self {
            MarketError::ClaimConflict { .. } => "claim_conflict",
            MarketError::CapacityExceeded { .. } => "capacity_exceeded",
            MarketError::TierRestricted { .. } => "tier_restricted",
            MarketError::DeadlineExpired { .. } => "deadline_expired",
            MarketError::InvalidTransition { .. } => "invalid_transition",
            MarketError::EscrowStateError { .. } => "escrow_state_error",
            MarketError::RequestClosed { .. } => "request_closed",
            MarketError::AutoAcceptNotDue { .. } => "auto_accept_not_due",
            MarketError::ElaborationLimit { .. } => "elaboration_limit",
            MarketError::PromotionBlocked { .. } => "promotion_blocked",
            MarketError::PolicyViolation(_) => "policy_violation",
            MarketError::Forbidden(_) => "forbidden",
            MarketError::NotFound(_) => "not_found",
            MarketError::Validation(_) => "validation",
            MarketError::Database(_) => "database",
        }
    }
}

impl From<sqlx::Error> for MarketError {
    fn from(e: sqlx::Error) -> Self {
        MarketError::Database(e.to_string())
    }
}

/// Result type for marketplace operations
pub type Result<T> = std::result::Result<T, MarketError>;
