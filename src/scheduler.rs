//! Background sweep that auto-accepts stale submissions and expires lapsed claims.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::clock::Clock;
use crate::error::Result;
use crate::lifecycle::{AutoAcceptOutcome, SlotLifecycleManager};

/// What the scheduler needs from the slot lifecycle.
#[async_trait]
pub trait SweepTarget: Send + Sync {
    async fn due_for_auto_accept(&self, now: DateTime<Utc>) -> Vec<Uuid>;
    async fn overdue_claims(&self, now: DateTime<Utc>) -> Vec<Uuid>;
    async fn auto_accept(&self, slot_id: Uuid) -> Result<AutoAcceptOutcome>;
    async fn expire_claim(&self, slot_id: Uuid) -> Result<()>;
}

#[async_trait]
impl SweepTarget for SlotLifecycleManager {
    async fn due_for_auto_accept(&self, now: DateTime<Utc>) -> Vec<Uuid> {
        SlotLifecycleManager::due_for_auto_accept(self, now).await
    }

    async fn overdue_claims(&self, now: DateTime<Utc>) -> Vec<Uuid> {
        SlotLifecycleManager::overdue_claims(self, now).await
    }

    async fn auto_accept(&self, slot_id: Uuid) -> Result<AutoAcceptOutcome> {
        SlotLifecycleManager::auto_accept(self, slot_id).await
    }

    async fn expire_claim(&self, slot_id: Uuid) -> Result<()> {
        SlotLifecycleManager::expire_claim(self, slot_id)
            .await
            .map(|_| ())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub accepted: usize,
    pub already_resolved: usize,
    pub expired: usize,
    pub failed: usize,
}

impl SweepReport {
    pub fn is_idle(&self) -> bool {
        *self == SweepReport::default()
    }
}

pub struct AutoAcceptScheduler {
    target: Arc<dyn SweepTarget>,
    clock: Arc<dyn Clock>,
    interval: Duration,
}

impl AutoAcceptScheduler {
    pub fn new(target: Arc<dyn SweepTarget>, clock: Arc<dyn Clock>, interval: Duration) -> Self {
        Self {
            target,
            clock,
            interval,
        }
    }

    /// One pass over everything that is due. A failing slot is logged and
    /// skipped; it will be picked up again next pass.
    pub async fn sweep(&self) -> SweepReport {
        let now = self.clock.now();
        let mut report = SweepReport::default();

        for slot_id in self.target.due_for_auto_accept(now).await {
            match self.target.auto_accept(slot_id).await {
                Ok(AutoAcceptOutcome::Accepted(_)) => report.accepted += 1,
                Ok(AutoAcceptOutcome::AlreadyResolved(_)) => report.already_resolved += 1,
                Err(e) => {
                    warn!(slot_id = %slot_id, error = %e, "Auto-accept failed");
                    report.failed += 1;
                }
            }
        }

        for slot_id in self.target.overdue_claims(now).await {
            match self.target.expire_claim(slot_id).await {
                Ok(()) => report.expired += 1,
                Err(e) => {
                    warn!(slot_id = %slot_id, error = %e, "Claim expiry failed");
                    report.failed += 1;
                }
            }
        }

        if report.is_idle() {
            debug!("Sweep found nothing due");
        } else {
            info!(
                accepted = report.accepted,
                already_resolved = report.already_resolved,
                expired = report.expired,
                failed = report.failed,
                "Sweep complete"
            );
        }
        report
    }

    /// Sweep on every tick until `shutdown` flips to true or its sender is dropped.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        info!(interval = ?self.interval, "Starting auto-accept scheduler");
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.sweep().await;
                }
                changed = shutdown.changed() => {
                    let stop = changed.is_err() || *shutdown.borrow();
                    if stop {
                        break;
                    }
                }
            }
        }
        info!("Auto-accept scheduler stopped");
    }

    pub fn spawn(self, shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(self.run(shutdown))
    }
}
