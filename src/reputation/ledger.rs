use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::tiers::Tier;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KarmaAction {
    Submitted,
    Accepted,
    Helpful,
    VeryHelpful,
    StreakBonus,
    Milestone,
    Referral,
    Rejected,
    Reported,
    StreakBroken,
    Violation,
    Manual,
    Promotion,
}

impl KarmaAction {
    pub const ALL: [KarmaAction; 13] = [
        KarmaAction::Submitted,
        KarmaAction::Accepted,
        KarmaAction::Helpful,
        KarmaAction::VeryHelpful,
        KarmaAction::StreakBonus,
        KarmaAction::Milestone,
        KarmaAction::Referral,
        KarmaAction::Rejected,
        KarmaAction::Reported,
        KarmaAction::StreakBroken,
        KarmaAction::Violation,
        KarmaAction::Manual,
        KarmaAction::Promotion,
    ];

    /// Actions with no slot transition behind them, which moderation and
    /// admin tooling may record directly.
    pub fn is_externally_recorded(&self) -> bool {
        matches!(
            self,
            KarmaAction::Referral
                | KarmaAction::Reported
                | KarmaAction::Violation
                | KarmaAction::Manual
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            KarmaAction::Submitted => "submitted",
            KarmaAction::Accepted => "accepted",
            KarmaAction::Helpful => "helpful",
            KarmaAction::VeryHelpful => "very_helpful",
            KarmaAction::StreakBonus => "streak_bonus",
            KarmaAction::Milestone => "milestone",
            KarmaAction::Referral => "referral",
            KarmaAction::Rejected => "rejected",
            KarmaAction::Reported => "reported",
            KarmaAction::StreakBroken => "streak_broken",
            KarmaAction::Violation => "violation",
            KarmaAction::Manual => "manual",
            KarmaAction::Promotion => "promotion",
        }
    }

    /// Unscaled point value. `None` for manual adjustments, which carry their own delta.
    pub fn base_points(&self) -> Option<i64> {
        match self {
            KarmaAction::Submitted => Some(5),
            KarmaAction::Accepted => Some(20),
            KarmaAction::Helpful => Some(10),
            KarmaAction::VeryHelpful => Some(25),
            KarmaAction::StreakBonus => Some(15),
            KarmaAction::Milestone => Some(50),
            KarmaAction::Referral => Some(25),
            KarmaAction::Rejected => Some(-15),
            KarmaAction::Reported => Some(-50),
            KarmaAction::StreakBroken => Some(-10),
            KarmaAction::Violation => Some(-100),
            KarmaAction::Manual => None,
            KarmaAction::Promotion => Some(0),
        }
    }

    /// Earned actions are scaled by the earner's tier multiplier; penalties are not.
    pub fn is_earned(&self) -> bool {
        matches!(
            self,
            KarmaAction::Submitted
                | KarmaAction::Accepted
                | KarmaAction::Helpful
                | KarmaAction::VeryHelpful
                | KarmaAction::StreakBonus
                | KarmaAction::Milestone
                | KarmaAction::Referral
        )
    }
}

impl fmt::Display for KarmaAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for KarmaAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        KarmaAction::ALL
            .iter()
            .find(|a| a.as_str() == s)
            .copied()
            .ok_or_else(|| format!("unknown karma action: {}", s))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct KarmaMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub review_request_id: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slot_id: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub old_tier: Option<Tier>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_tier: Option<Tier>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub streak_days: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub milestone: Option<u32>,
}

impl KarmaMetadata {
    pub fn for_slot(review_request_id: Uuid, slot_id: Uuid) -> Self {
        Self {
            review_request_id: Some(review_request_id),
            slot_id: Some(slot_id),
            ..Default::default()
        }
    }
}

/// Immutable ledger entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KarmaTransaction {
    pub id: Uuid,
    /// Append order within this process
    pub sequence: u64,
    pub user_id: Uuid,
    pub action: KarmaAction,
    pub points: i64,
    pub reason: String,
    pub metadata: KarmaMetadata,
    pub created_at: DateTime<Utc>,
}

/// What a caller wants appended; the ledger assigns id and sequence.
#[derive(Debug, Clone)]
pub struct KarmaEntry {
    pub action: KarmaAction,
    pub points: i64,
    pub reason: String,
    pub metadata: KarmaMetadata,
    pub created_at: DateTime<Utc>,
}

#[derive(Default)]
struct LedgerInner {
    by_user: HashMap<Uuid, Vec<KarmaTransaction>>,
    appended: u64,
}

/// Append-only karma store, indexed by user.
#[derive(Default)]
pub struct KarmaLedger {
    inner: RwLock<LedgerInner>,
}

impl KarmaLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append entries derived from the user's current history under one write lock.
    ///
    /// `build` sees the user's transactions in append order and returns zero or more
    /// entries to append after them.
    pub async fn append_with<F>(&self, user_id: Uuid, build: F) -> Vec<KarmaTransaction>
    where
        F: FnOnce(&[KarmaTransaction]) -> Vec<KarmaEntry>,
    {
        let mut inner = self.inner.write().await;
        let entries = build(
            inner
                .by_user
                .get(&user_id)
                .map(Vec::as_slice)
                .unwrap_or(&[]),
        );

        let mut appended = Vec::with_capacity(entries.len());
        for entry in entries {
            inner.appended += 1;
            let transaction = KarmaTransaction {
                id: Uuid::new_v4(),
                sequence: inner.appended,
                user_id,
                action: entry.action,
                points: entry.points,
                reason: entry.reason,
                metadata: entry.metadata,
                created_at: entry.created_at,
            };
            inner
                .by_user
                .entry(user_id)
                .or_default()
                .push(transaction.clone());
            appended.push(transaction);
        }
        appended
    }

    /// Read the user's history without copying it.
    pub async fn with_history<R>(&self, user_id: Uuid, read: impl FnOnce(&[KarmaTransaction]) -> R) -> R {
        let inner = self.inner.read().await;
        read(
            inner
                .by_user
                .get(&user_id)
                .map(Vec::as_slice)
                .unwrap_or(&[]),
        )
    }

    pub async fn history(&self, user_id: Uuid) -> Vec<KarmaTransaction> {
        self.with_history(user_id, |txs| txs.to_vec()).await
    }

    /// Transactions with `from <= created_at < to`.
    pub async fn history_between(
        &self,
        user_id: Uuid,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Vec<KarmaTransaction> {
        self.with_history(user_id, |txs| {
            txs.iter()
                .filter(|tx| tx.created_at >= from && tx.created_at < to)
                .cloned()
                .collect()
        })
        .await
    }

    pub async fn total(&self, user_id: Uuid) -> i64 {
        self.with_history(user_id, |txs| txs.iter().map(|tx| tx.points).sum())
            .await
    }

    pub async fn len(&self) -> u64 {
        self.inner.read().await.appended
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}
