use chrono::Duration;
use std::str::FromStr;

use crate::lifecycle::LifecyclePolicy;
use crate::pricing::Pricing;

#[derive(Debug, Clone)]
pub struct Config {
    /// Postgres projection is disabled when unset
    pub database_url: Option<String>,
    pub host: String,
    pub port: u16,
    pub policy: LifecyclePolicy,
    pub pricing: Pricing,
    pub sweep_interval: std::time::Duration,
}

/// Read and parse an env var, keeping `default` when it is unset or malformed.
fn env_or<T: FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|value| value.trim().parse().ok())
        .unwrap_or(default)
}

impl Config {
    pub fn from_env() -> Result<Self, Box<dyn std::error::Error + Send + Sync>> {
        dotenvy::dotenv().ok();

        let database_url = std::env::var("DATABASE_URL")
            .ok()
            .filter(|url| !url.trim().is_empty());

        let host = std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
        let port: u16 = env_or("PORT", 5001);

        let defaults = LifecyclePolicy::default();
        let policy = LifecyclePolicy {
            claim_window: Duration::hours(
                env_or("CLAIM_WINDOW_HOURS", defaults.claim_window.num_hours()).max(1),
            ),
            auto_accept_grace: Duration::days(
                env_or("AUTO_ACCEPT_DAYS", defaults.auto_accept_grace.num_days()).max(1),
            ),
            max_elaborations: env_or("MAX_ELABORATIONS", defaults.max_elaborations),
            elaboration_response_window: Duration::hours(env_or(
                "ELABORATION_RESPONSE_HOURS",
                defaults.elaboration_response_window.num_hours(),
            )),
            min_review_length: env_or("MIN_REVIEW_LENGTH", defaults.min_review_length),
            min_elaboration_length: env_or(
                "MIN_ELABORATION_LENGTH",
                defaults.min_elaboration_length,
            ),
            max_active_claims: env_or("MAX_ACTIVE_CLAIMS", defaults.max_active_claims),
            reopen_on_reject: env_or("REOPEN_ON_REJECT", defaults.reopen_on_reject),
            ..defaults
        };

        let pricing = Pricing {
            platform_fee_percent: env_or(
                "PLATFORM_FEE_PERCENT",
                Pricing::default().platform_fee_percent,
            ),
        };

        let sweep_interval =
            std::time::Duration::from_secs(env_or("SWEEP_INTERVAL_SECS", 60u64).max(1));

        Ok(Self {
            database_url,
            host,
            port,
            policy,
            pricing,
            sweep_interval,
        })
    }
}
