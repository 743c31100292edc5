use log::debug;
use std::collections::{HashSet, VecDeque};

use super::model::{Transaction, TxType};
use crate::error::ValidationError;

/// Default bound on pending transactions.
pub const DEFAULT_MAX_PENDING: usize = 5_000;

/// Pending (not yet sealed) transactions, in arrival order, deduplicated by hash.
/// Bounded; the oldest entry is evicted first.
#[derive(Debug)]
pub struct TransactionPool {
    txs: VecDeque<Transaction>,
    seen: HashSet<String>,
    capacity: usize,
}

impl Default for TransactionPool {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_MAX_PENDING)
    }
}

impl TransactionPool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            txs: VecDeque::new(),
            seen: HashSet::new(),
            capacity,
        }
    }

    /// Validate and append. Returns `Ok(false)` for a duplicate or when the
    /// pool has zero capacity. REWARD transactions only ever live in a
    /// block's reward slot and are refused here.
    pub fn add(&mut self, tx: Transaction) -> Result<bool, ValidationError> {
        if tx.tx_type == TxType::Reward {
            return Err(ValidationError::StrayReward(tx.hash));
        }
        tx.validate()?;
        if self.capacity == 0 || self.seen.contains(&tx.hash) {
            debug!("POOL - tx {} ignored", tx.hash);
            return Ok(false);
        }
        while self.txs.len() >= self.capacity {
            if let Some(old) = self.txs.pop_front() {
                self.seen.remove(&old.hash);
                debug!("POOL - full, evicted {}", old.hash);
            }
        }
        self.seen.insert(tx.hash.clone());
        self.txs.push_back(tx);
        Ok(true)
    }

    /// Oldest-first copy of up to `limit` pending transactions.
    pub fn take_for_block(&self, limit: usize) -> Vec<Transaction> {
        self.txs.iter().take(limit).cloned().collect()
    }

    /// Drop every pending transaction whose hash is in `sealed`.
    pub fn prune<'a>(&mut self, sealed: impl IntoIterator<Item = &'a str>) {
        let sealed: HashSet<&str> = sealed.into_iter().collect();
        if sealed.is_empty() {
            return;
        }
        let before = self.txs.len();
        self.txs.retain(|t| !sealed.contains(t.hash.as_str()));
        self.seen.retain(|h| !sealed.contains(h.as_str()));
        debug!(
            "POOL - pruned {} -> {} (removed {})",
            before,
            self.txs.len(),
            before.saturating_sub(self.txs.len())
        );
    }

    pub fn contains(&self, hash: &str) -> bool {
        self.seen.contains(hash)
    }

    pub fn len(&self) -> usize {
        self.txs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.txs.is_empty()
    }
}
