//! Per-address activity scoring over the canonical chain.
//!
//! Scores only ever grow (or shrink via UNSTAKE) when blocks are folded in;
//! idleness is charged at read time in `ranking`, never by mutating records.

use log::debug;
use serde::Serialize;
use std::cmp::Ordering;
use std::collections::HashMap;

use crate::blockchain::Block;
use crate::transaction::{TxStatus, TxType};

pub const REWARD_WEIGHT: f64 = 1.0;
pub const TRANSACTION_WEIGHT: f64 = 1.0;
pub const SMART_CONTRACT_WEIGHT: f64 = 2.0;
pub const CONTRACT_TRANSACTION_WEIGHT: f64 = 1.5;
pub const VALIDATOR_WEIGHT: f64 = 0.5;
/// STAKE/UNSTAKE credit is this fraction of the moved amount.
pub const STAKE_FACTOR: f64 = 0.1;
/// Score lost per idle minute when ranking.
pub const IDLE_PENALTY_PER_MINUTE: f64 = 1.0 / 60.0;

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct ActivityRecord {
    pub score: f64,
    pub last_active: i64, // Unix millis of the latest block crediting this address
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankedAccount {
    pub address: String,
    pub score: f64,
    pub effective_score: f64,
    pub last_active: i64,
}

#[derive(Debug, Default, Clone)]
pub struct ActivityLedger {
    records: HashMap<String, ActivityRecord>,
}

impl ActivityLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Score a chain from scratch, root first.
    pub fn from_chain<'a>(blocks: impl IntoIterator<Item = &'a Block>) -> Self {
        let mut ledger = Self::new();
        for b in blocks {
            ledger.record_block(b);
        }
        ledger
    }

    fn credit(&mut self, address: &str, points: f64, at: i64) {
        if address.is_empty() {
            return;
        }
        let rec = self.records.entry(address.to_string()).or_default();
        rec.score += points;
        rec.last_active = rec.last_active.max(at);
    }

    /// Fold one canonical block into the scores.
    pub fn record_block(&mut self, block: &Block) {
        let at = block.timestamp;
        if let Some(receiver) = block.reward.receiver.as_deref() {
            self.credit(receiver, REWARD_WEIGHT, at);
        }
        for tx in &block.transactions {
            if tx.status == TxStatus::Reject {
                continue;
            }
            let points = match tx.tx_type {
                TxType::Transfer => 1.0,
                TxType::Stake => STAKE_FACTOR * tx.amount,
                TxType::Unstake => -STAKE_FACTOR * tx.amount,
                TxType::Reward => 0.0,
            };
            self.credit(&tx.sender, points * TRANSACTION_WEIGHT, at);
        }
        for sc in &block.smart_contracts {
            self.credit(&sc.owner, SMART_CONTRACT_WEIGHT, at);
        }
        for ct in &block.contract_transactions {
            self.credit(&ct.sender, CONTRACT_TRANSACTION_WEIGHT, at);
        }
        for att in &block.validators {
            self.credit(&att.public_key, VALIDATOR_WEIGHT, at);
        }
        debug!("REPUTATION - folded #{} ({} accounts)", block.index, self.records.len());
    }

    /// Credit attestations that reached an already folded block.
    pub fn record_attestations<'a>(&mut self, attestors: impl IntoIterator<Item = &'a str>, at: i64) {
        for pk in attestors {
            self.credit(pk, VALIDATOR_WEIGHT, at);
        }
    }

    pub fn get(&self, address: &str) -> Option<&ActivityRecord> {
        self.records.get(address)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Accounts ordered by score minus an idle penalty measured in whole
    /// minutes between `now` and the last activity. Best first.
    pub fn ranking(&self, now: i64) -> Vec<RankedAccount> {
        let now_minute = now / 60_000;
        let mut out: Vec<RankedAccount> = self
            .records
            .iter()
            .map(|(address, rec)| {
                let idle = (now_minute - rec.last_active / 60_000).max(0);
                RankedAccount {
                    address: address.clone(),
                    score: rec.score,
                    effective_score: rec.score - idle as f64 * IDLE_PENALTY_PER_MINUTE,
                    last_active: rec.last_active,
                }
            })
            .collect();
        out.sort_by(|a, b| {
            b.effective_score
                .partial_cmp(&a.effective_score)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.address.cmp(&b.address))
        });
        out
    }
}
