//! Reputation engine: karma ledger, tier derivation and promotion.
//!
//! The karma total is always the sum of the user's ledger entries. The effective
//! tier is the `new_tier` of the most recent `promotion` entry, so a user whose
//! karma already sits in a higher band still has to pass every secondary gate
//! before [`ReputationEngine::try_promote`] moves them up.

mod ledger;
mod tiers;

pub use ledger::{KarmaAction, KarmaEntry, KarmaLedger, KarmaMetadata, KarmaTransaction};
pub use tiers::{tier_for_karma, Tier, TierBenefits, TierRequirements};

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use crate::clock::Clock;
use crate::error::{MarketError, Result};
use crate::events::{EventBus, MarketEvent};

/// Accepted-review counts that award a one-off milestone bonus.
pub const MILESTONES: [u32; 6] = [10, 25, 50, 100, 250, 500];

/// Streak length (days) at which a streak bonus is paid, and every multiple of it.
pub const STREAK_BONUS_EVERY: u32 = 7;

/// Slot outcome aggregates for one reviewer, supplied by the lifecycle read model.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ReviewOutcomes {
    pub submitted: u32,
    pub accepted: u32,
    pub rejected: u32,
    pub helpful_rating_sum: u32,
    pub helpful_rating_count: u32,
}

impl ReviewOutcomes {
    /// Accepted share of resolved reviews, as a percentage.
    pub fn acceptance_rate(&self) -> f64 {
        let resolved = self.accepted + self.rejected;
        if resolved == 0 {
            return 0.0;
        }
        f64::from(self.accepted) * 100.0 / f64::from(resolved)
    }

    pub fn helpful_average(&self) -> f64 {
        if self.helpful_rating_count == 0 {
            return 0.0;
        }
        f64::from(self.helpful_rating_sum) / f64::from(self.helpful_rating_count)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserTierStatus {
    pub user_id: Uuid,
    /// Effective tier, advanced only by promotion entries
    pub tier: Tier,
    /// Advisory tier implied by karma alone
    pub karma_tier: Tier,
    pub karma: i64,
    pub total_reviews: u32,
    pub acceptance_rate: f64,
    pub helpful_rating: f64,
    pub current_streak: u32,
    pub longest_streak: u32,
    pub benefits: TierBenefits,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequirementCheck {
    pub karma: bool,
    pub reviews: bool,
    pub acceptance_rate: bool,
    pub helpful_rating: bool,
    /// `None` when the target tier has no streak gate
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub streak: Option<bool>,
}

impl RequirementCheck {
    pub fn all_met(&self) -> bool {
        self.karma
            && self.reviews
            && self.acceptance_rate
            && self.helpful_rating
            && self.streak.unwrap_or(true)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TierProgress {
    pub current: Tier,
    pub next: Tier,
    /// Position inside the karma band towards `next`, 0-100
    pub percent: f64,
    pub karma_to_next: i64,
    pub requirements: RequirementCheck,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct Streaks {
    current: u32,
    longest: u32,
}

fn submission_days(history: &[KarmaTransaction]) -> BTreeSet<NaiveDate> {
    history
        .iter()
        .filter(|tx| tx.action == KarmaAction::Submitted)
        .map(|tx| tx.created_at.date_naive())
        .collect()
}

/// Run of consecutive days ending at `last`.
fn run_ending_at(days: &BTreeSet<NaiveDate>, last: NaiveDate) -> u32 {
    let mut run = 0;
    let mut day = last;
    while days.contains(&day) {
        run += 1;
        day -= Duration::days(1);
    }
    run
}

/// A streak is current while its last day is today or yesterday.
fn streaks(days: &BTreeSet<NaiveDate>, today: NaiveDate) -> Streaks {
    let mut longest = 0;
    let mut run = 0;
    let mut prev: Option<NaiveDate> = None;
    for day in days {
        run = match prev {
            Some(p) if p + Duration::days(1) == *day => run + 1,
            _ => 1,
        };
        longest = longest.max(run);
        prev = Some(*day);
    }

    let current = match prev {
        Some(last) if last == today || last + Duration::days(1) == today => run,
        _ => 0,
    };
    Streaks { current, longest }
}

fn effective_tier(history: &[KarmaTransaction]) -> Tier {
    history
        .iter()
        .rev()
        .find(|tx| tx.action == KarmaAction::Promotion)
        .and_then(|tx| tx.metadata.new_tier)
        .unwrap_or(Tier::Novice)
}

/// Single forward fold over the user's ledger plus the outcome aggregates.
fn fold_status(
    user_id: Uuid,
    history: &[KarmaTransaction],
    outcomes: &ReviewOutcomes,
    today: NaiveDate,
) -> UserTierStatus {
    let mut karma = 0;
    let mut tier = Tier::Novice;
    for tx in history {
        karma += tx.points;
        if tx.action == KarmaAction::Promotion {
            if let Some(new_tier) = tx.metadata.new_tier {
                tier = new_tier;
            }
        }
    }
    let streak = streaks(&submission_days(history), today);

    UserTierStatus {
        user_id,
        tier,
        karma_tier: tier_for_karma(karma),
        karma,
        total_reviews: outcomes.submitted,
        acceptance_rate: outcomes.acceptance_rate(),
        helpful_rating: outcomes.helpful_average(),
        current_streak: streak.current,
        longest_streak: streak.longest,
        benefits: tier.benefits(),
    }
}

fn earned_entry(
    tier: Tier,
    action: KarmaAction,
    reason: String,
    metadata: KarmaMetadata,
    at: DateTime<Utc>,
) -> KarmaEntry {
    let base = action.base_points().unwrap_or(0);
    let points = if action.is_earned() {
        tier.benefits().scale(base)
    } else {
        base
    };
    KarmaEntry {
        action,
        points,
        reason,
        metadata,
        created_at: at,
    }
}

pub struct ReputationEngine {
    ledger: KarmaLedger,
    clock: Arc<dyn Clock>,
    events: EventBus,
}

impl ReputationEngine {
    pub fn new(clock: Arc<dyn Clock>, events: EventBus) -> Self {
        Self {
            ledger: KarmaLedger::new(),
            clock,
            events,
        }
    }

    pub fn ledger(&self) -> &KarmaLedger {
        &self.ledger
    }

    fn publish(&self, transactions: &[KarmaTransaction]) {
        for tx in transactions {
            info!(
                user_id = %tx.user_id,
                action = %tx.action,
                points = tx.points,
                "Karma recorded"
            );
            self.events.publish(MarketEvent::KarmaRecorded {
                transaction: tx.clone(),
            });
        }
    }

    async fn append(
        &self,
        user_id: Uuid,
        build: impl FnOnce(&[KarmaTransaction]) -> Vec<KarmaEntry>,
    ) -> Vec<KarmaTransaction> {
        let appended = self.ledger.append_with(user_id, build).await;
        self.publish(&appended);
        appended
    }

    /// Append a point-valued event at its schedule value, scaled by tier when earned.
    ///
    /// Manual adjustments go through [`Self::adjust`] and promotions through
    /// [`Self::promote_to`].
    pub async fn record(
        &self,
        user_id: Uuid,
        action: KarmaAction,
        reason: impl Into<String>,
        metadata: KarmaMetadata,
    ) -> Result<KarmaTransaction> {
        if matches!(action, KarmaAction::Manual | KarmaAction::Promotion) {
            return Err(MarketError::Validation(format!(
                "{} entries cannot be recorded at schedule value",
                action
            )));
        }
        let reason = reason.into();
        let now = self.clock.now();
        self.append(user_id, |history| {
            vec![earned_entry(
                effective_tier(history),
                action,
                reason,
                metadata,
                now,
            )]
        })
        .await
        .pop()
        .ok_or_else(|| MarketError::Validation("nothing appended".to_string()))
    }

    /// Manual correction with an explicit signed delta.
    pub async fn adjust(
        &self,
        user_id: Uuid,
        delta: i64,
        reason: impl Into<String>,
    ) -> Result<KarmaTransaction> {
        let reason = reason.into();
        if delta == 0 {
            return Err(MarketError::Validation(
                "manual adjustment must be non-zero".to_string(),
            ));
        }
        if reason.trim().is_empty() {
            return Err(MarketError::Validation(
                "manual adjustment requires a reason".to_string(),
            ));
        }
        let now = self.clock.now();
        self.append(user_id, |_| {
            vec![KarmaEntry {
                action: KarmaAction::Manual,
                points: delta,
                reason,
                metadata: KarmaMetadata::default(),
                created_at: now,
            }]
        })
        .await
        .pop()
        .ok_or_else(|| MarketError::Validation("nothing appended".to_string()))
    }

    /// Append a promotion entry moving the user to `new_tier`.
    pub async fn promote_to(
        &self,
        user_id: Uuid,
        new_tier: Tier,
        reason: impl Into<String>,
    ) -> Result<KarmaTransaction> {
        let reason = reason.into();
        let now = self.clock.now();
        let mut current = Tier::Novice;
        let appended = self
            .append(user_id, |history| {
                current = effective_tier(history);
                if current == new_tier {
                    return Vec::new();
                }
                vec![KarmaEntry {
                    action: KarmaAction::Promotion,
                    points: 0,
                    reason,
                    metadata: KarmaMetadata {
                        old_tier: Some(current),
                        new_tier: Some(new_tier),
                        ..Default::default()
                    },
                    created_at: now,
                }]
            })
            .await;

        appended.into_iter().next().ok_or_else(|| {
            MarketError::Validation(format!("user {} already holds tier {}", user_id, current))
        })
    }

    /// Promote one tier if every gate of the next tier is met.
    ///
    /// The check and the append happen under the same ledger lock, so two racing
    /// callers cannot both promote.
    pub async fn try_promote(
        &self,
        user_id: Uuid,
        outcomes: &ReviewOutcomes,
    ) -> Option<KarmaTransaction> {
        let now = self.clock.now();
        let appended = self
            .append(user_id, |history| {
                let status = fold_status(user_id, history, outcomes, now.date_naive());
                match Self::progress_to_next_tier(&status) {
                    Some(progress) if progress.requirements.all_met() => vec![KarmaEntry {
                        action: KarmaAction::Promotion,
                        points: 0,
                        reason: format!("Promoted from {} to {}", status.tier, progress.next),
                        metadata: KarmaMetadata {
                            old_tier: Some(status.tier),
                            new_tier: Some(progress.next),
                            ..Default::default()
                        },
                        created_at: now,
                    }],
                    _ => Vec::new(),
                }
            })
            .await;
        appended.into_iter().next()
    }

    pub async fn effective_tier(&self, user_id: Uuid) -> Tier {
        self.ledger.with_history(user_id, effective_tier).await
    }

    pub async fn compute_status(&self, user_id: Uuid, outcomes: &ReviewOutcomes) -> UserTierStatus {
        let today = self.clock.now().date_naive();
        self.ledger
            .with_history(user_id, |history| {
                fold_status(user_id, history, outcomes, today)
            })
            .await
    }

    /// Progress towards the tier above the effective one. `None` at the top.
    pub fn progress_to_next_tier(status: &UserTierStatus) -> Option<TierProgress> {
        let next = status.tier.next()?;
        let current_req = status.tier.requirements();
        let next_req = next.requirements();

        let band = (next_req.min_karma - current_req.min_karma).max(1);
        let percent =
            ((status.karma - current_req.min_karma) as f64 * 100.0 / band as f64).clamp(0.0, 100.0);

        let requirements = RequirementCheck {
            karma: status.karma >= next_req.min_karma,
            reviews: status.total_reviews >= next_req.min_reviews,
            acceptance_rate: status.acceptance_rate >= next_req.min_acceptance_rate,
            helpful_rating: status.helpful_rating >= next_req.min_helpful_rating,
            streak: next_req
                .min_streak
                .map(|min| status.current_streak >= min),
        };

        Some(TierProgress {
            current: status.tier,
            next,
            percent,
            karma_to_next: (next_req.min_karma - status.karma).max(0),
            requirements,
        })
    }

    /// Every gate of the next tier must hold; karma alone is not enough.
    pub fn can_promote(status: &UserTierStatus) -> bool {
        Self::progress_to_next_tier(status)
            .map(|progress| progress.requirements.all_met())
            .unwrap_or(false)
    }

    /// Karma for a submitted review plus any streak bonus or streak break it causes.
    pub async fn after_submission(
        &self,
        user_id: Uuid,
        metadata: KarmaMetadata,
    ) -> Vec<KarmaTransaction> {
        let now = self.clock.now();
        let today = now.date_naive();
        self.append(user_id, |history| {
            let tier = effective_tier(history);
            let mut days = submission_days(history);
            let first_today = !days.contains(&today);
            let mut entries = Vec::new();

            if first_today {
                if let Some(last) = days.iter().next_back().copied() {
                    let previous_run = run_ending_at(&days, last);
                    if last + Duration::days(1) < today && previous_run >= STREAK_BONUS_EVERY {
                        entries.push(KarmaEntry {
                            action: KarmaAction::StreakBroken,
                            points: KarmaAction::StreakBroken.base_points().unwrap_or(0),
                            reason: format!("{}-day streak ended", previous_run),
                            metadata: KarmaMetadata {
                                streak_days: Some(previous_run),
                                ..Default::default()
                            },
                            created_at: now,
                        });
                    }
                }
            }

            entries.push(earned_entry(
                tier,
                KarmaAction::Submitted,
                "Review submitted".to_string(),
                metadata.clone(),
                now,
            ));

            days.insert(today);
            let streak = streaks(&days, today).current;
            if first_today && streak > 0 && streak % STREAK_BONUS_EVERY == 0 {
                entries.push(earned_entry(
                    tier,
                    KarmaAction::StreakBonus,
                    format!("{}-day review streak", streak),
                    KarmaMetadata {
                        streak_days: Some(streak),
                        ..metadata
                    },
                    now,
                ));
            }
            entries
        })
        .await
    }

    /// Karma for an accepted review: base, helpfulness bonus and milestones.
    pub async fn after_acceptance(
        &self,
        user_id: Uuid,
        helpful_rating: Option<u8>,
        accepted_total: u32,
        metadata: KarmaMetadata,
    ) -> Vec<KarmaTransaction> {
        let now = self.clock.now();
        self.append(user_id, |history| {
            let tier = effective_tier(history);
            let mut entries = vec![earned_entry(
                tier,
                KarmaAction::Accepted,
                "Review accepted".to_string(),
                metadata.clone(),
                now,
            )];

            match helpful_rating {
                Some(5) => entries.push(earned_entry(
                    tier,
                    KarmaAction::VeryHelpful,
                    "Rated very helpful".to_string(),
                    metadata.clone(),
                    now,
                )),
                Some(4) => entries.push(earned_entry(
                    tier,
                    KarmaAction::Helpful,
                    "Rated helpful".to_string(),
                    metadata.clone(),
                    now,
                )),
                _ => {}
            }

            let already_awarded = history.iter().any(|tx| {
                tx.action == KarmaAction::Milestone && tx.metadata.milestone == Some(accepted_total)
            });
            if MILESTONES.contains(&accepted_total) && !already_awarded {
                entries.push(earned_entry(
                    tier,
                    KarmaAction::Milestone,
                    format!("{} accepted reviews", accepted_total),
                    KarmaMetadata {
                        milestone: Some(accepted_total),
                        ..Default::default()
                    },
                    now,
                ));
            }
            entries
        })
        .await
    }

    pub async fn after_rejection(
        &self,
        user_id: Uuid,
        reason: &str,
        metadata: KarmaMetadata,
    ) -> Vec<KarmaTransaction> {
        let now = self.clock.now();
        let reason = format!("Review rejected: {}", reason);
        self.append(user_id, |history| {
            vec![earned_entry(
                effective_tier(history),
                KarmaAction::Rejected,
                reason,
                metadata,
                now,
            )]
        })
        .await
    }

    pub async fn history(&self, user_id: Uuid) -> Vec<KarmaTransaction> {
        self.ledger.history(user_id).await
    }

    pub async fn history_between(
        &self,
        user_id: Uuid,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Vec<KarmaTransaction> {
        self.ledger.history_between(user_id, from, to).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use chrono::TimeZone;

    fn engine() -> (ReputationEngine, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2024, 6, 1, 9, 0, 0).unwrap(),
        ));
        (ReputationEngine::new(clock.clone(), EventBus::new()), clock)
    }

    fn status(tier: Tier, karma: i64, reviews: u32, acceptance: f64, rating: f64) -> UserTierStatus {
        UserTierStatus {
            user_id: Uuid::new_v4(),
            tier,
            karma_tier: tier_for_karma(karma),
            karma,
            total_reviews: reviews,
            acceptance_rate: acceptance,
            helpful_rating: rating,
            current_streak: 0,
            longest_streak: 0,
            benefits: tier.benefits(),
        }
    }

    #[test]
    fn test_rating_gate_blocks_promotion_to_skilled() {
        let status = status(Tier::Contributor, 600, 25, 76.0, 3.6);
        let progress = ReputationEngine::progress_to_next_tier(&status).unwrap();

        assert_eq!(progress.next, Tier::Skilled);
        assert!(progress.requirements.karma);
        assert!(progress.requirements.reviews);
        assert!(progress.requirements.acceptance_rate);
        assert!(!progress.requirements.helpful_rating);
        assert_eq!(progress.requirements.streak, None);
        assert!(!ReputationEngine::can_promote(&status));
    }

    #[test]
    fn test_any_single_failing_gate_blocks_promotion() {
        let passing = status(Tier::Contributor, 600, 25, 76.0, 4.2);
        assert!(ReputationEngine::can_promote(&passing));

        let mut low_karma = passing.clone();
        low_karma.karma = 499;
        let mut few_reviews = passing.clone();
        few_reviews.total_reviews = 19;
        let mut low_acceptance = passing.clone();
        low_acceptance.acceptance_rate = 74.9;
        let mut low_rating = passing.clone();
        low_rating.helpful_rating = 3.99;

        for blocked in [low_karma, few_reviews, low_acceptance, low_rating] {
            assert!(!ReputationEngine::can_promote(&blocked));
        }
    }

    #[test]
    fn test_streak_gate_applies_from_trusted_advisor() {
        let mut status = status(Tier::Skilled, 2_000, 60, 90.0, 4.8);
        status.current_streak = 6;
        let progress = ReputationEngine::progress_to_next_tier(&status).unwrap();
        assert_eq!(progress.requirements.streak, Some(false));
        assert!(!ReputationEngine::can_promote(&status));

        status.current_streak = 7;
        assert!(ReputationEngine::can_promote(&status));
    }

    #[test]
    fn test_no_progress_past_master() {
        let status = status(Tier::Master, 50_000, 900, 99.0, 5.0);
        assert!(ReputationEngine::progress_to_next_tier(&status).is_none());
        assert!(!ReputationEngine::can_promote(&status));
    }

    #[test]
    fn test_progress_percent_within_band() {
        let status = status(Tier::Novice, 50, 0, 0.0, 0.0);
        let progress = ReputationEngine::progress_to_next_tier(&status).unwrap();
        assert_eq!(progress.percent, 50.0);
        assert_eq!(progress.karma_to_next, 50);

        let overshoot = self::status(Tier::Novice, 700, 0, 0.0, 0.0);
        let progress = ReputationEngine::progress_to_next_tier(&overshoot).unwrap();
        assert_eq!(progress.percent, 100.0);
        assert_eq!(progress.karma_to_next, 0);
    }

    #[tokio::test]
    async fn test_karma_total_equals_ledger_sum() {
        let (engine, _) = engine();
        let user = Uuid::new_v4();

        engine
            .after_submission(user, KarmaMetadata::default())
            .await;
        engine
            .after_acceptance(user, Some(5), 1, KarmaMetadata::default())
            .await;
        engine
            .after_rejection(user, "off topic", KarmaMetadata::default())
            .await;
        engine.adjust(user, -7, "duplicate account cleanup").await.unwrap();
        engine
            .record(user, KarmaAction::Referral, "invited a friend", KarmaMetadata::default())
            .await
            .unwrap();

        let sum: i64 = engine.history(user).await.iter().map(|tx| tx.points).sum();
        let status = engine.compute_status(user, &ReviewOutcomes::default()).await;
        assert_eq!(status.karma, sum);
        assert_eq!(sum, 5 + 20 + 25 - 15 - 7 + 25);
    }

    #[tokio::test]
    async fn test_karma_alone_does_not_change_effective_tier() {
        let (engine, _) = engine();
        let user = Uuid::new_v4();
        engine.adjust(user, 800, "migrated reputation").await.unwrap();

        let status = engine.compute_status(user, &ReviewOutcomes::default()).await;
        assert_eq!(status.karma_tier, Tier::Skilled);
        assert_eq!(status.tier, Tier::Novice);
    }

    #[tokio::test]
    async fn test_try_promote_advances_one_tier() {
        let (engine, _) = engine();
        let user = Uuid::new_v4();
        engine.adjust(user, 800, "migrated reputation").await.unwrap();
        let outcomes = ReviewOutcomes {
            submitted: 30,
            accepted: 27,
            rejected: 3,
            helpful_rating_sum: 120,
            helpful_rating_count: 27,
        };

        let promotion = engine.try_promote(user, &outcomes).await.unwrap();
        assert_eq!(promotion.action, KarmaAction::Promotion);
        assert_eq!(promotion.metadata.old_tier, Some(Tier::Novice));
        assert_eq!(promotion.metadata.new_tier, Some(Tier::Contributor));
        assert_eq!(promotion.points, 0);

        engine.try_promote(user, &outcomes).await.unwrap();
        let status = engine.compute_status(user, &outcomes).await;
        assert_eq!(status.tier, Tier::Skilled);
        assert_eq!(status.karma, 800);

        // TRUSTED_ADVISOR needs 1500 karma and a streak
        assert!(engine.try_promote(user, &outcomes).await.is_none());
    }

    #[tokio::test]
    async fn test_earned_points_scale_with_tier() {
        let (engine, _) = engine();
        let user = Uuid::new_v4();
        engine.promote_to(user, Tier::Master, "seeded").await.unwrap();

        let txs = engine
            .after_acceptance(user, None, 1, KarmaMetadata::default())
            .await;
        assert_eq!(txs[0].points, 40);

        let rejected = engine
            .after_rejection(user, "spam", KarmaMetadata::default())
            .await;
        assert_eq!(rejected[0].points, -15);
    }

    #[tokio::test]
    async fn test_promote_to_same_tier_is_rejected() {
        let (engine, _) = engine();
        let user = Uuid::new_v4();
        assert!(engine.promote_to(user, Tier::Novice, "noop").await.is_err());
    }

    #[tokio::test]
    async fn test_record_refuses_manual_and_promotion() {
        let (engine, _) = engine();
        let user = Uuid::new_v4();
        for action in [KarmaAction::Manual, KarmaAction::Promotion] {
            let err = engine
                .record(user, action, "x", KarmaMetadata::default())
                .await
                .unwrap_err();
            assert!(matches!(err, MarketError::Validation(_)));
        }
        assert!(engine.history(user).await.is_empty());
    }

    #[tokio::test]
    async fn test_streak_bonus_on_seventh_day() {
        let (engine, clock) = engine();
        let user = Uuid::new_v4();

        for _ in 0..6 {
            let txs = engine.after_submission(user, KarmaMetadata::default()).await;
            assert_eq!(txs.len(), 1);
            clock.advance(Duration::days(1));
        }
        let txs = engine.after_submission(user, KarmaMetadata::default()).await;
        assert_eq!(txs.len(), 2);
        assert_eq!(txs[1].action, KarmaAction::StreakBonus);
        assert_eq!(txs[1].metadata.streak_days, Some(7));

        // a second submission the same day does not pay again
        let txs = engine.after_submission(user, KarmaMetadata::default()).await;
        assert_eq!(txs.len(), 1);

        let status = engine.compute_status(user, &ReviewOutcomes::default()).await;
        assert_eq!(status.current_streak, 7);
        assert_eq!(status.longest_streak, 7);
    }

    #[tokio::test]
    async fn test_streak_break_recorded_when_long_streak_lapses() {
        let (engine, clock) = engine();
        let user = Uuid::new_v4();

        for _ in 0..7 {
            engine.after_submission(user, KarmaMetadata::default()).await;
            clock.advance(Duration::days(1));
        }
        clock.advance(Duration::days(3));

        let txs = engine.after_submission(user, KarmaMetadata::default()).await;
        assert_eq!(txs[0].action, KarmaAction::StreakBroken);
        assert_eq!(txs[0].metadata.streak_days, Some(7));
        assert_eq!(txs[1].action, KarmaAction::Submitted);

        let status = engine.compute_status(user, &ReviewOutcomes::default()).await;
        assert_eq!(status.current_streak, 1);
        assert_eq!(status.longest_streak, 7);
    }

    #[tokio::test]
    async fn test_milestone_awarded_once() {
        let (engine, _) = engine();
        let user = Uuid::new_v4();

        let txs = engine
            .after_acceptance(user, None, 10, KarmaMetadata::default())
            .await;
        assert!(txs.iter().any(|tx| tx.action == KarmaAction::Milestone));

        let txs = engine
            .after_acceptance(user, None, 10, KarmaMetadata::default())
            .await;
        assert!(!txs.iter().any(|tx| tx.action == KarmaAction::Milestone));
    }

    #[test]
    fn test_streak_goes_stale_after_a_missed_day() {
        let day = NaiveDate::from_ymd_opt(2024, 6, 10).unwrap();
        let days: BTreeSet<NaiveDate> =
            (0..3).map(|i| day - Duration::days(i)).collect();

        assert_eq!(streaks(&days, day).current, 3);
        assert_eq!(streaks(&days, day + Duration::days(1)).current, 3);
        assert_eq!(streaks(&days, day + Duration::days(2)).current, 0);
        assert_eq!(streaks(&days, day + Duration::days(2)).longest, 3);
    }
}
