use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use uuid::Uuid;

use crate::clock::Clock;
use crate::error::{MarketError, Result};
use crate::escrow::EscrowLedger;
use crate::events::EventBus;
use crate::lifecycle::{LifecyclePolicy, SlotLifecycleManager};
use crate::pricing::Pricing;
use crate::reputation::{ReputationEngine, TierProgress, UserTierStatus};
use crate::scheduler::AutoAcceptScheduler;

/// The slot lifecycle, escrow ledger and reputation engine wired to one clock
/// and one event bus.
pub struct Marketplace {
    lifecycle: Arc<SlotLifecycleManager>,
    reputation: Arc<ReputationEngine>,
    escrow: Arc<EscrowLedger>,
    clock: Arc<dyn Clock>,
    events: EventBus,
}

impl Marketplace {
    pub fn new(policy: LifecyclePolicy, pricing: Pricing, clock: Arc<dyn Clock>) -> Self {
        let events = EventBus::new();
        let escrow = Arc::new(EscrowLedger::new(clock.clone(), events.clone()));
        let reputation = Arc::new(ReputationEngine::new(clock.clone(), events.clone()));
        let lifecycle = Arc::new(SlotLifecycleManager::new(
            escrow.clone(),
            reputation.clone(),
            pricing,
            policy,
            clock.clone(),
            events.clone(),
        ));

        Self {
            lifecycle,
            reputation,
            escrow,
            clock,
            events,
        }
    }

    pub fn lifecycle(&self) -> &SlotLifecycleManager {
        &self.lifecycle
    }

    pub fn reputation(&self) -> &ReputationEngine {
        &self.reputation
    }

    pub fn escrow(&self) -> &EscrowLedger {
        &self.escrow
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub async fn tier_status(&self, user_id: Uuid) -> UserTierStatus {
        let outcomes = self.lifecycle.outcomes_for(user_id).await;
        self.reputation.compute_status(user_id, &outcomes).await
    }

    /// `None` once the user holds the top tier.
    pub async fn tier_progress(&self, user_id: Uuid) -> Option<TierProgress> {
        let status = self.tier_status(user_id).await;
        ReputationEngine::progress_to_next_tier(&status)
    }

    /// Promote one tier if every gate is met and return the refreshed status.
    pub async fn promote(&self, user_id: Uuid) -> Result<UserTierStatus> {
        let outcomes = self.lifecycle.outcomes_for(user_id).await;
        match self.reputation.try_promote(user_id, &outcomes).await {
            Some(tx) => {
                info!(
                    user_id = %user_id,
                    old_tier = ?tx.metadata.old_tier,
                    new_tier = ?tx.metadata.new_tier,
                    "User promoted"
                );
                Ok(self.reputation.compute_status(user_id, &outcomes).await)
            }
            None => Err(MarketError::PromotionBlocked {
                user_id,
                tier: self.reputation.effective_tier(user_id).await,
            }),
        }
    }

    pub fn scheduler(&self, interval: Duration) -> AutoAcceptScheduler {
        AutoAcceptScheduler::new(self.lifecycle.clone(), self.clock.clone(), interval)
    }
}
