use serde::{Deserialize, Serialize};

use crate::blockchain::Block;
use crate::consensus::DelegateEntry;
use crate::node::SharedCoordinator;
use crate::reputation::RankedAccount;

/// Shared application state: the node's coordinator, read through its lock.
pub struct AppState {
    pub node: SharedCoordinator,
}

/* ---------- Chain API Models ---------- */

#[derive(Deserialize)]
pub struct ChainQuery {
    pub from: Option<String>,
}

#[derive(Serialize)]
pub struct ChainResponse<'a> {
    pub length: usize,
    pub head: Option<&'a str>,
    pub chain: Vec<&'a Block>,
}

/* ---------- Ledger API Models ---------- */

#[derive(Serialize)]
pub struct BalanceResponse {
    pub address: String,
    pub wallet: f64,
    pub stake: f64,
}

#[derive(Serialize)]
pub struct DelegatesResponse<'a> {
    pub size: usize,
    pub delegates: &'a [DelegateEntry],
}

#[derive(Serialize)]
pub struct ReputationResponse {
    pub accounts: Vec<RankedAccount>,
}

#[derive(Serialize)]
pub struct StatsResponse {
    pub blocks: usize,
    pub height: Option<u64>,
    pub head: Option<String>,
    pub cumulative_weight: Option<f64>,
    pub leaves: usize,
    pub orphans: usize,
    pub pending_transactions: usize,
    pub block_interval_secs: u64,
}
