use log::warn;
use std::env;
use std::str::FromStr;

use crate::blockchain::{DEFAULT_MAX_ORPHANS, MAX_TXS_PER_BLOCK};
use crate::consensus::{DEFAULT_DELEGATE_COUNT, EmissionSchedule};
use crate::transaction::DEFAULT_MAX_PENDING;

/// Node settings, built once at startup and passed to whatever needs them.
#[derive(Debug, Clone)]
pub struct NodeConfig {
    pub host: String,
    pub port: u16,
    /// Hex secret key of the local signing identity, if any.
    pub secret_key: Option<String>,
    pub schedule: EmissionSchedule,
    pub delegate_count: usize,
    pub max_orphans: usize,
    pub max_txs_per_block: usize,
    /// Bound on the pending transaction pool.
    pub max_pending: usize,
    /// Public keys seeded into the delegate roster.
    pub delegates: Vec<String>,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            secret_key: None,
            schedule: EmissionSchedule::default(),
            delegate_count: DEFAULT_DELEGATE_COUNT,
            max_orphans: DEFAULT_MAX_ORPHANS,
            max_txs_per_block: MAX_TXS_PER_BLOCK,
            max_pending: DEFAULT_MAX_PENDING,
            delegates: Vec::new(),
        }
    }
}

impl NodeConfig {
    /// Read settings from the process environment (call `dotenvy::dotenv()` first).
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from any key lookup. Missing keys take defaults; unparseable
    /// values are logged and also take defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let d = Self::default();
        let schedule = EmissionSchedule {
            total_coins: parsed(&lookup, "TOTAL_COINS", d.schedule.total_coins),
            invest_percent: parsed(&lookup, "INVEST_PERCENT", d.schedule.invest_percent),
            years: parsed(&lookup, "EMISSION_YEARS", d.schedule.years),
            halvings: parsed(&lookup, "HALVING_STAGES", d.schedule.halvings),
            block_interval_secs: parsed(&lookup, "BLOCK_INTERVAL_SECS", d.schedule.block_interval_secs),
        };
        Self {
            host: lookup("HOST").unwrap_or(d.host),
            port: parsed(&lookup, "PORT", d.port),
            secret_key: lookup("NODE_SECRET_KEY").filter(|s| !s.trim().is_empty()),
            schedule,
            delegate_count: parsed(&lookup, "DELEGATE_COUNT", d.delegate_count),
            max_orphans: parsed(&lookup, "MAX_ORPHANS", d.max_orphans),
            max_txs_per_block: parsed(&lookup, "MAX_TXS_PER_BLOCK", d.max_txs_per_block),
            max_pending: parsed(&lookup, "MAX_PENDING", d.max_pending),
            delegates: lookup("DELEGATES")
                .map(|v| {
                    v.split(',')
                        .map(str::trim)
                        .filter(|s| !s.is_empty())
                        .map(String::from)
                        .collect()
                })
                .unwrap_or_default(),
        }
    }
}

fn parsed<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> T {
    match lookup(key) {
        Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
            warn!("CONFIG - ignoring unparseable {key}={raw:?}");
            default
        }),
        None => default,
    }
}
