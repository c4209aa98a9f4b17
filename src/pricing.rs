/// Platform fee schedule applied to paid reviews before funds are escrowed.
#[derive(Debug, Clone, Copy)]
pub struct Pricing {
    pub platform_fee_percent: u32,
}

impl Default for Pricing {
    fn default() -> Self {
        Self {
            platform_fee_percent: 10,
        }
    }
}

impl Pricing {
    /// Fee in cents, rounded down. Never exceeds `amount_cents`.
    pub fn platform_fee(&self, amount_cents: i64) -> i64 {
        let percent = i128::from(self.platform_fee_percent.min(100));
        let fee = i128::from(amount_cents) * percent / 100;
        i64::try_from(fee).unwrap_or(amount_cents)
    }

    pub fn reviewer_payout(&self, amount_cents: i64) -> i64 {
        amount_cents - self.platform_fee(amount_cents)
    }
}
