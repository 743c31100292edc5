use log::debug;
use serde::Serialize;
use std::collections::{HashMap, HashSet};

use super::Block;
use crate::transaction::{Transaction, TxStatus, TxType};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BalanceKind {
    Wallet,
    Stake,
}

/// Per-block balance entries for the addresses a block touches.
///
/// Each entry is the address's balance right after this block, so the
/// balance at any block is found by the nearest ancestor carrying an entry
/// for that address. Untouched addresses have no entry.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BlockBalances {
    pub wallet: HashMap<String, f64>,
    pub stake: HashMap<String, f64>,
}

impl BlockBalances {
    pub fn get(&self, address: &str, kind: BalanceKind) -> Option<f64> {
        match kind {
            BalanceKind::Wallet => self.wallet.get(address).copied(),
            BalanceKind::Stake => self.stake.get(address).copied(),
        }
    }

    fn set(&mut self, address: &str, kind: BalanceKind, value: f64) {
        let map = match kind {
            BalanceKind::Wallet => &mut self.wallet,
            BalanceKind::Stake => &mut self.stake,
        };
        map.insert(address.to_string(), value);
    }

    pub fn is_empty(&self) -> bool {
        self.wallet.is_empty() && self.stake.is_empty()
    }
}

/// Fold a block's own transactions into its balance entries.
///
/// `pre_block` resolves an address's balance just before this block and
/// `sealed_before` tells whether a transaction hash was already applied by
/// an ancestor. The reward is credited first. A TRANSFER, STAKE or UNSTAKE
/// whose source balance is insufficient, or which was already applied
/// (earlier in the ancestry or earlier in this block), leaves no entry and
/// is marked REJECT; every other transaction is marked COMPLETE. The block
/// itself stays valid.
pub fn fold_block(
    block: &mut Block,
    pre_block: impl Fn(&str, BalanceKind) -> f64,
    sealed_before: impl Fn(&str) -> bool,
) -> BlockBalances {
    let mut out = BlockBalances::default();
    let current = |out: &BlockBalances, addr: &str, kind: BalanceKind| {
        out.get(addr, kind).unwrap_or_else(|| pre_block(addr, kind))
    };

    let reward = &mut block.reward;
    if let Some(receiver) = reward.receiver.clone() {
        let bal = current(&out, &receiver, BalanceKind::Wallet);
        out.set(&receiver, BalanceKind::Wallet, bal + reward.amount);
        reward.status = TxStatus::Complete;
    }

    let mut applied_here: HashSet<String> = HashSet::new();
    for tx in &mut block.transactions {
        if sealed_before(&tx.hash) || applied_here.contains(&tx.hash) {
            debug!("BALANCE - tx {} rejected: already applied", tx.hash);
            tx.status = TxStatus::Reject;
            continue;
        }
        let applied = apply_transaction(&mut out, tx, &current);
        tx.status = if applied { TxStatus::Complete } else { TxStatus::Reject };
        if applied {
            applied_here.insert(tx.hash.clone());
        } else {
            debug!(
                "BALANCE - tx {} ({}) rejected: insufficient balance for {}",
                tx.hash,
                tx.tx_type.as_str(),
                tx.sender
            );
        }
    }
    out
}

fn apply_transaction(
    out: &mut BlockBalances,
    tx: &Transaction,
    current: &impl Fn(&BlockBalances, &str, BalanceKind) -> f64,
) -> bool {
    let (from, to) = match tx.tx_type {
        TxType::Transfer => (BalanceKind::Wallet, BalanceKind::Wallet),
        TxType::Stake => (BalanceKind::Wallet, BalanceKind::Stake),
        TxType::Unstake => (BalanceKind::Stake, BalanceKind::Wallet),
        TxType::Reward => {
            // Only reachable for a stray reward; block validation rejects those.
            return false;
        }
    };
    let target = match tx.tx_type {
        TxType::Transfer => match tx.receiver.as_deref() {
            Some(r) => r.to_string(),
            None => return false,
        },
        _ => tx.sender.clone(),
    };

    let source_bal = current(&*out, &tx.sender, from);
    if source_bal < tx.amount {
        return false;
    }
    out.set(&tx.sender, from, source_bal - tx.amount);
    let target_bal = current(&*out, &target, to);
    out.set(&target, to, target_bal + tx.amount);
    true
}

/// Absolute balances along the canonical chain, updated on every head change.
#[derive(Debug, Default, Clone, Serialize)]
pub struct BalanceView {
    wallet: HashMap<String, f64>,
    stake: HashMap<String, f64>,
}

impl BalanceView {
    /// Overwrite the touched addresses with the block's post-block values.
    pub fn apply(&mut self, balances: &BlockBalances) {
        for (addr, v) in &balances.wallet {
            self.wallet.insert(addr.clone(), *v);
        }
        for (addr, v) in &balances.stake {
            self.stake.insert(addr.clone(), *v);
        }
    }

    pub fn clear(&mut self) {
        self.wallet.clear();
        self.stake.clear();
    }

    pub fn get(&self, address: &str, kind: BalanceKind) -> f64 {
        let map = match kind {
            BalanceKind::Wallet => &self.wallet,
            BalanceKind::Stake => &self.stake,
        };
        map.get(address).copied().unwrap_or(0.0)
    }
}
