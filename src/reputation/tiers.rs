use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Tier {
    Novice,
    Contributor,
    Skilled,
    TrustedAdvisor,
    Expert,
    Master,
}

impl Tier {
    pub const ALL: [Tier; 6] = [
        Tier::Novice,
        Tier::Contributor,
        Tier::Skilled,
        Tier::TrustedAdvisor,
        Tier::Expert,
        Tier::Master,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Novice => "NOVICE",
            Tier::Contributor => "CONTRIBUTOR",
            Tier::Skilled => "SKILLED",
            Tier::TrustedAdvisor => "TRUSTED_ADVISOR",
            Tier::Expert => "EXPERT",
            Tier::Master => "MASTER",
        }
    }

    pub fn next(&self) -> Option<Tier> {
        match self {
            Tier::Novice => Some(Tier::Contributor),
            Tier::Contributor => Some(Tier::Skilled),
            Tier::Skilled => Some(Tier::TrustedAdvisor),
            Tier::TrustedAdvisor => Some(Tier::Expert),
            Tier::Expert => Some(Tier::Master),
            Tier::Master => None,
        }
    }

    pub fn requirements(&self) -> &'static TierRequirements {
        &TIER_REQUIREMENTS[*self as usize]
    }

    pub fn benefits(&self) -> TierBenefits {
        match self {
            Tier::Novice => TierBenefits {
                max_review_price_cents: Some(25_00),
                karma_multiplier: 1.0,
                verified_badge: false,
                priority_queue: false,
            },
            Tier::Contributor => TierBenefits {
                max_review_price_cents: Some(50_00),
                karma_multiplier: 1.1,
                verified_badge: false,
                priority_queue: false,
            },
            Tier::Skilled => TierBenefits {
                max_review_price_cents: Some(100_00),
                karma_multiplier: 1.25,
                verified_badge: false,
                priority_queue: false,
            },
            Tier::TrustedAdvisor => TierBenefits {
                max_review_price_cents: Some(250_00),
                karma_multiplier: 1.5,
                verified_badge: true,
                priority_queue: false,
            },
            Tier::Expert => TierBenefits {
                max_review_price_cents: Some(500_00),
                karma_multiplier: 1.75,
                verified_badge: true,
                priority_queue: true,
            },
            Tier::Master => TierBenefits {
                max_review_price_cents: None,
                karma_multiplier: 2.0,
                verified_badge: true,
                priority_queue: true,
            },
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Tier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Tier::ALL
            .iter()
            .find(|t| t.as_str().eq_ignore_ascii_case(s))
            .copied()
            .ok_or_else(|| format!("unknown tier: {}", s))
    }
}

/// Karma band and secondary gates a user must meet to hold a tier.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TierRequirements {
    pub tier: Tier,
    pub min_karma: i64,
    /// Exclusive upper bound; `None` for the top tier
    pub max_karma: Option<i64>,
    pub min_reviews: u32,
    /// Percentage, 0-100
    pub min_acceptance_rate: f64,
    pub min_helpful_rating: f64,
    pub min_streak: Option<u32>,
}

static TIER_REQUIREMENTS: [TierRequirements; 6] = [
    TierRequirements {
        tier: Tier::Novice,
        min_karma: 0,
        max_karma: Some(100),
        min_reviews: 0,
        min_acceptance_rate: 0.0,
        min_helpful_rating: 0.0,
        min_streak: None,
    },
    TierRequirements {
        tier: Tier::Contributor,
        min_karma: 100,
        max_karma: Some(500),
        min_reviews: 5,
        min_acceptance_rate: 60.0,
        min_helpful_rating: 3.0,
        min_streak: None,
    },
    TierRequirements {
        tier: Tier::Skilled,
        min_karma: 500,
        max_karma: Some(1_500),
        min_reviews: 20,
        min_acceptance_rate: 75.0,
        min_helpful_rating: 4.0,
        min_streak: None,
    },
    TierRequirements {
        tier: Tier::TrustedAdvisor,
        min_karma: 1_500,
        max_karma: Some(5_000),
        min_reviews: 50,
        min_acceptance_rate: 80.0,
        min_helpful_rating: 4.3,
        min_streak: Some(7),
    },
    TierRequirements {
        tier: Tier::Expert,
        min_karma: 5_000,
        max_karma: Some(15_000),
        min_reviews: 100,
        min_acceptance_rate: 85.0,
        min_helpful_rating: 4.5,
        min_streak: Some(14),
    },
    TierRequirements {
        tier: Tier::Master,
        min_karma: 15_000,
        max_karma: None,
        min_reviews: 250,
        min_acceptance_rate: 90.0,
        min_helpful_rating: 4.7,
        min_streak: Some(30),
    },
];

/// Marketplace privileges unlocked by a tier.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TierBenefits {
    /// `None` means no cap
    pub max_review_price_cents: Option<i64>,
    pub karma_multiplier: f64,
    pub verified_badge: bool,
    pub priority_queue: bool,
}

impl TierBenefits {
    /// Free reviews are open to every tier.
    pub fn can_claim_budget(&self, budget_cents: Option<i64>) -> bool {
        match (budget_cents, self.max_review_price_cents) {
            (None, _) | (_, None) => true,
            (Some(budget), Some(max)) => budget <= max,
        }
    }

    pub fn scale(&self, base_points: i64) -> i64 {
        (base_points as f64 * self.karma_multiplier).round() as i64
    }
}

/// Karma-only tier lookup. Advisory: the effective tier comes from promotions.
pub fn tier_for_karma(karma: i64) -> Tier {
    TIER_REQUIREMENTS
        .iter()
        .rev()
        .find(|req| karma >= req.min_karma)
        .map(|req| req.tier)
        .unwrap_or(Tier::Novice)
}
