use serde::Serialize;

/// Default total supply, in coins.
pub const TOTAL_COINS: f64 = 100_000_000.0;
/// Share of the supply minted to investors in the genesis reward.
pub const INVEST_PERCENT: f64 = 0.16;
/// Years over which the remaining supply is emitted.
pub const EMISSION_YEARS: u64 = 10;
/// Number of halving stages across `EMISSION_YEARS`.
pub const HALVING_STAGES: u32 = 5;
/// Target seconds per block.
pub const BLOCK_INTERVAL_SECS: u64 = 10;

const SECONDS_PER_YEAR: u64 = 365 * 24 * 3600;

/// Deterministic coin-emission schedule: block index -> minted reward.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct EmissionSchedule {
    pub total_coins: f64,
    pub invest_percent: f64,
    pub years: u64,
    pub halvings: u32,
    pub block_interval_secs: u64,
}

impl Default for EmissionSchedule {
    fn default() -> Self {
        Self {
            total_coins: TOTAL_COINS,
            invest_percent: INVEST_PERCENT,
            years: EMISSION_YEARS,
            halvings: HALVING_STAGES,
            block_interval_secs: BLOCK_INTERVAL_SECS,
        }
    }
}

impl EmissionSchedule {
    pub fn blocks_per_year(&self) -> u64 {
        SECONDS_PER_YEAR / self.block_interval_secs.max(1)
    }

    pub fn blocks_per_stage(&self) -> u64 {
        (self.blocks_per_year().saturating_mul(self.years) / u64::from(self.halvings.max(1))).max(1)
    }

    /// Reward of the first stage, chosen so the halving stages sum to the
    /// non-investor share of the supply.
    pub fn initial_reward(&self) -> f64 {
        let remaining = self.total_coins * (1.0 - self.invest_percent);
        let geometric = (1.0 - 0.5f64.powi(self.halvings as i32)) / 0.5;
        remaining / (self.blocks_per_stage() as f64 * geometric)
    }

    /// Minted amount for `block_index`. Block 0 carries the whole investor
    /// share; afterwards the reward halves once per stage.
    pub fn reward(&self, block_index: u64) -> f64 {
        if block_index == 0 {
            return self.total_coins * self.invest_percent;
        }
        let stage = block_index / self.blocks_per_stage();
        // 0.5^stage underflows to 0 long before i32 overflow matters
        let stage = i32::try_from(stage).unwrap_or(i32::MAX);
        self.initial_reward() * 0.5f64.powi(stage)
    }
}
