//! Escrow ledger for paid review slots.
//!
//! Each paid claim opens one [`EscrowRecord`] which moves
//! `pending -> escrowed -> {released | refunded}` exactly once. Every movement is
//! appended to an immutable audit trail. Fees are computed by the caller.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};
use uuid::Uuid;

use crate::clock::Clock;
use crate::error::{MarketError, Result};
use crate::events::{EventBus, MarketEvent};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EscrowState {
    Pending,
    Escrowed,
    Released,
    Refunded,
}

impl EscrowState {
    pub fn as_str(&self) -> &'static str {
        match self {
            EscrowState::Pending => "pending",
            EscrowState::Escrowed => "escrowed",
            EscrowState::Released => "released",
            EscrowState::Refunded => "refunded",
        }
    }

    pub fn is_settled(&self) -> bool {
        matches!(self, EscrowState::Released | EscrowState::Refunded)
    }
}

impl fmt::Display for EscrowState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EscrowRecord {
    pub id: Uuid,
    pub slot_id: Uuid,
    /// Requester funding the review
    pub payer_id: Uuid,
    /// Reviewer paid on release
    pub payee_id: Uuid,
    pub amount_cents: i64,
    pub platform_fee_cents: i64,
    pub reviewer_payout_cents: i64,
    pub state: EscrowState,
    pub created_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
}

/// Immutable audit entry, one per state change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EscrowMovement {
    /// Append order within this process
    pub sequence: u64,
    pub escrow_id: Uuid,
    pub from: EscrowState,
    pub to: EscrowState,
    pub amount_cents: i64,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct EscrowTotals {
    pub held_cents: i64,
    pub released_cents: i64,
    pub refunded_cents: i64,
}

#[derive(Default)]
struct LedgerInner {
    records: HashMap<Uuid, EscrowRecord>,
    movements: Vec<EscrowMovement>,
}

impl LedgerInner {
    fn record(&self, escrow_id: Uuid) -> Result<&EscrowRecord> {
        self.records
            .get(&escrow_id)
            .ok_or_else(|| MarketError::NotFound(format!("escrow {}", escrow_id)))
    }

    fn create(
        &mut self,
        slot_id: Uuid,
        payer_id: Uuid,
        payee_id: Uuid,
        amount_cents: i64,
        platform_fee_cents: i64,
        now: DateTime<Utc>,
    ) -> Result<EscrowRecord> {
        if amount_cents <= 0 {
            return Err(MarketError::Validation(format!(
                "escrow amount must be positive, got {}",
                amount_cents
            )));
        }
        if platform_fee_cents < 0 || platform_fee_cents > amount_cents {
            return Err(MarketError::Validation(format!(
                "platform fee {} out of range for amount {}",
                platform_fee_cents, amount_cents
            )));
        }

        let record = EscrowRecord {
            id: Uuid::new_v4(),
            slot_id,
            payer_id,
            payee_id,
            amount_cents,
            platform_fee_cents,
            reviewer_payout_cents: amount_cents - platform_fee_cents,
            state: EscrowState::Pending,
            created_at: now,
            resolved_at: None,
        };
        self.records.insert(record.id, record.clone());
        Ok(record)
    }

    /// Moves a record between states, writing the audit entry.
    fn transition(
        &mut self,
        escrow_id: Uuid,
        to: EscrowState,
        now: DateTime<Utc>,
    ) -> Result<(EscrowRecord, EscrowMovement)> {
        let sequence = self.movements.len() as u64 + 1;
        let record = self
            .records
            .get_mut(&escrow_id)
            .ok_or_else(|| MarketError::NotFound(format!("escrow {}", escrow_id)))?;

        let movement = EscrowMovement {
            sequence,
            escrow_id,
            from: record.state,
            to,
            amount_cents: record.amount_cents,
            at: now,
        };
        record.state = to;
        if to.is_settled() {
            record.resolved_at = Some(now);
        }
        let record = record.clone();
        self.movements.push(movement.clone());
        Ok((record, movement))
    }
}

pub struct EscrowLedger {
    inner: RwLock<LedgerInner>,
    clock: Arc<dyn Clock>,
    events: EventBus,
}

impl EscrowLedger {
    pub fn new(clock: Arc<dyn Clock>, events: EventBus) -> Self {
        Self {
            inner: RwLock::new(LedgerInner::default()),
            clock,
            events,
        }
    }

    /// Create a `pending` record for a paid slot.
    pub async fn open(
        &self,
        slot_id: Uuid,
        payer_id: Uuid,
        payee_id: Uuid,
        amount_cents: i64,
        platform_fee_cents: i64,
    ) -> Result<EscrowRecord> {
        let now = self.clock.now();
        let record = self.inner.write().await.create(
            slot_id,
            payer_id,
            payee_id,
            amount_cents,
            platform_fee_cents,
            now,
        )?;

        info!(
            escrow_id = %record.id,
            slot_id = %slot_id,
            amount_cents,
            "Escrow opened"
        );
        Ok(record)
    }

    /// `pending -> escrowed`. Fails from any other state.
    pub async fn reserve(&self, escrow_id: Uuid) -> Result<EscrowRecord> {
        let now = self.clock.now();
        let (record, movement) = {
            let mut inner = self.inner.write().await;
            let state = inner.record(escrow_id)?.state;
            if state != EscrowState::Pending {
                return Err(MarketError::EscrowStateError {
                    escrow_id,
                    state,
                    operation: "reserve",
                });
            }
            inner.transition(escrow_id, EscrowState::Escrowed, now)?
        };
        self.announce(&record, movement);
        Ok(record)
    }

    /// Open and reserve in one critical section; used when a paid slot is claimed.
    pub async fn hold(
        &self,
        slot_id: Uuid,
        payer_id: Uuid,
        payee_id: Uuid,
        amount_cents: i64,
        platform_fee_cents: i64,
    ) -> Result<EscrowRecord> {
        let now = self.clock.now();
        let (record, movement) = {
            let mut inner = self.inner.write().await;
            let created = inner.create(
                slot_id,
                payer_id,
                payee_id,
                amount_cents,
                platform_fee_cents,
                now,
            )?;
            inner.transition(created.id, EscrowState::Escrowed, now)?
        };

        info!(
            escrow_id = %record.id,
            slot_id = %slot_id,
            amount_cents,
            "Funds escrowed"
        );
        self.announce(&record, movement);
        Ok(record)
    }

    /// `escrowed -> released`. Repeating a release is a no-op.
    pub async fn release(&self, escrow_id: Uuid) -> Result<EscrowRecord> {
        self.settle(escrow_id, EscrowState::Released, "release").await
    }

    /// `escrowed -> refunded`. Repeating a refund is a no-op.
    pub async fn refund(&self, escrow_id: Uuid) -> Result<EscrowRecord> {
        self.settle(escrow_id, EscrowState::Refunded, "refund").await
    }

    async fn settle(
        &self,
        escrow_id: Uuid,
        target: EscrowState,
        operation: &'static str,
    ) -> Result<EscrowRecord> {
        let now = self.clock.now();
        let (record, movement) = {
            let mut inner = self.inner.write().await;
            let current = inner.record(escrow_id)?;
            if current.state == target {
                debug!(escrow_id = %escrow_id, state = %target, "Escrow already settled");
                return Ok(current.clone());
            }
            if current.state != EscrowState::Escrowed {
                return Err(MarketError::EscrowStateError {
                    escrow_id,
                    state: current.state,
                    operation,
                });
            }
            inner.transition(escrow_id, target, now)?
        };

        info!(
            escrow_id = %escrow_id,
            slot_id = %record.slot_id,
            state = %target,
            amount_cents = record.amount_cents,
            payout_cents = record.reviewer_payout_cents,
            "Escrow settled"
        );
        self.announce(&record, movement);
        Ok(record)
    }

    fn announce(&self, record: &EscrowRecord, movement: EscrowMovement) {
        self.events.publish(MarketEvent::EscrowMoved {
            record: record.clone(),
            movement,
        });
    }

    pub async fn get(&self, escrow_id: Uuid) -> Option<EscrowRecord> {
        self.inner.read().await.records.get(&escrow_id).cloned()
    }

    pub async fn movements(&self, escrow_id: Uuid) -> Vec<EscrowMovement> {
        self.inner
            .read()
            .await
            .movements
            .iter()
            .filter(|m| m.escrow_id == escrow_id)
            .cloned()
            .collect()
    }

    pub async fn totals(&self) -> EscrowTotals {
        let inner = self.inner.read().await;
        inner
            .records
            .values()
            .fold(EscrowTotals::default(), |mut totals, record| {
                match record.state {
                    EscrowState::Escrowed => totals.held_cents += record.amount_cents,
                    EscrowState::Released => totals.released_cents += record.amount_cents,
                    EscrowState::Refunded => totals.refunded_cents += record.amount_cents,
                    EscrowState::Pending => {}
                }
                totals
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::SystemClock;

    fn ledger() -> EscrowLedger {
        EscrowLedger::new(Arc::new(SystemClock), EventBus::new())
    }

    #[tokio::test]
    async fn test_open_reserve_release() {
        let ledger = ledger();
        let record = ledger
            .open(Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4(), 10_000, 1_000)
            .await
            .unwrap();
        assert_eq!(record.state, EscrowState::Pending);
        assert_eq!(record.reviewer_payout_cents, 9_000);

        let reserved = ledger.reserve(record.id).await.unwrap();
        assert_eq!(reserved.state, EscrowState::Escrowed);

        let released = ledger.release(record.id).await.unwrap();
        assert_eq!(released.state, EscrowState::Released);
        assert!(released.resolved_at.is_some());

        let movements = ledger.movements(record.id).await;
        assert_eq!(movements.len(), 2);
        assert_eq!(movements[0].from, EscrowState::Pending);
        assert_eq!(movements[1].to, EscrowState::Released);
    }

    #[tokio::test]
    async fn test_reserve_only_from_pending() {
        let ledger = ledger();
        let record = ledger
            .hold(Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4(), 5_000, 500)
            .await
            .unwrap();

        let err = ledger.reserve(record.id).await.unwrap_err();
        assert!(matches!(
            err,
            MarketError::EscrowStateError {
                state: EscrowState::Escrowed,
                operation: "reserve",
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_double_release_moves_funds_once() {
        let ledger = ledger();
        let record = ledger
            .hold(Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4(), 5_000, 500)
            .await
            .unwrap();

        ledger.release(record.id).await.unwrap();
        let again = ledger.release(record.id).await.unwrap();
        assert_eq!(again.state, EscrowState::Released);
        assert_eq!(ledger.movements(record.id).await.len(), 2);
        assert_eq!(ledger.totals().await.released_cents, 5_000);
    }

    #[tokio::test]
    async fn test_release_after_refund_is_rejected() {
        let ledger = ledger();
        let record = ledger
            .hold(Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4(), 5_000, 500)
            .await
            .unwrap();

        ledger.refund(record.id).await.unwrap();
        let err = ledger.release(record.id).await.unwrap_err();
        assert!(matches!(
            err,
            MarketError::EscrowStateError {
                state: EscrowState::Refunded,
                ..
            }
        ));

        let stored = ledger.get(record.id).await.unwrap();
        assert_eq!(stored.state, EscrowState::Refunded);
        assert_eq!(ledger.totals().await.released_cents, 0);
    }

    #[tokio::test]
    async fn test_settle_from_pending_is_rejected() {
        let ledger = ledger();
        let record = ledger
            .open(Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4(), 5_000, 0)
            .await
            .unwrap();

        assert!(ledger.refund(record.id).await.is_err());
        assert_eq!(ledger.movements(record.id).await.len(), 0);
    }

    #[tokio::test]
    async fn test_rejects_non_positive_amount() {
        let ledger = ledger();
        let err = ledger
            .open(Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4(), 0, 0)
            .await
            .unwrap_err();
        assert!(matches!(err, MarketError::Validation(_)));
    }
}
