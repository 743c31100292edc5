use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::consensus::Attestation;
use crate::crypto::sha256_hex;
use crate::error::ValidationError;
use crate::transaction::{ContractTransaction, SmartContract, Transaction, TxType};

/// A node of the block tree. Identity is the hash over index, parent,
/// timestamp and every carried element; attestations and weights are
/// outside the hash and may be attached after the fact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Block {
    pub index: u64,
    pub parent_hash: String, // empty for genesis
    pub timestamp: i64,      // Unix millis (UTC)
    pub reward: Transaction,
    #[serde(default)]
    pub transactions: Vec<Transaction>,
    #[serde(default)]
    pub smart_contracts: Vec<SmartContract>,
    #[serde(default)]
    pub contract_transactions: Vec<ContractTransaction>,
    pub hash: String,
    #[serde(default)]
    pub validators: Vec<Attestation>,
    /// Derived by the tree on insert; whatever a peer sends is ignored.
    #[serde(default)]
    pub weight: f64,
    #[serde(default)]
    pub cumulative_weight: f64,
}

impl Block {
    /// Build a block, compute its hash and stamp that hash on every
    /// carried transaction and contract.
    pub fn new(
        index: u64,
        parent_hash: String,
        timestamp: i64,
        reward: Transaction,
        transactions: Vec<Transaction>,
        smart_contracts: Vec<SmartContract>,
        contract_transactions: Vec<ContractTransaction>,
    ) -> Self {
        let mut block = Self {
            index,
            parent_hash,
            timestamp,
            reward,
            transactions,
            smart_contracts,
            contract_transactions,
            hash: String::new(),
            validators: Vec::new(),
            weight: 0.0,
            cumulative_weight: 0.0,
        };
        block.hash = block.compute_hash();
        block.stamp_children();
        block
    }

    /// Genesis block: index 0, empty parent, only a reward.
    pub fn genesis(reward: Transaction, timestamp: i64) -> Self {
        Self::new(0, String::new(), timestamp, reward, Vec::new(), Vec::new(), Vec::new())
    }

    pub fn is_genesis(&self) -> bool {
        self.index == 0 && self.parent_hash.is_empty()
    }

    fn stamp_children(&mut self) {
        let hash = Some(self.hash.clone());
        self.reward.block_hash = hash.clone();
        for tx in &mut self.transactions {
            tx.block_hash = hash.clone();
        }
        for sc in &mut self.smart_contracts {
            sc.block_hash = hash.clone();
        }
        for ct in &mut self.contract_transactions {
            ct.block_hash = hash.clone();
        }
    }

    /// SHA-256 over `index:parent:timestamp:reward:txs:contracts:calls`, each
    /// element in its stable JSON projection.
    pub fn compute_hash(&self) -> String {
        let txs = Value::Array(self.transactions.iter().map(Transaction::hash_material).collect());
        let scs = Value::Array(self.smart_contracts.iter().map(SmartContract::hash_material).collect());
        let cts = Value::Array(
            self.contract_transactions
                .iter()
                .map(ContractTransaction::hash_material)
                .collect(),
        );
        let preimage = format!(
            "{}:{}:{}:{}:{}:{}:{}",
            self.index,
            self.parent_hash,
            self.timestamp,
            self.reward.hash_material(),
            txs,
            scs,
            cts
        );
        sha256_hex(preimage.as_bytes())
    }

    /// Structural validity, all-or-nothing. Does NOT check linkage,
    /// balances or the emission amount; the tree does those.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.index == 0 && !self.parent_hash.is_empty() {
            return Err(ValidationError::GenesisWithParent);
        }
        if self.index > 0 && self.parent_hash.is_empty() {
            return Err(ValidationError::MissingParentHash(self.index));
        }

        let computed = self.compute_hash();
        if computed != self.hash {
            return Err(ValidationError::HashMismatch {
                stored: self.hash.clone(),
                computed,
            });
        }

        if self.reward.tx_type != TxType::Reward {
            return Err(ValidationError::BadRewardType(self.reward.tx_type.as_str().into()));
        }
        self.reward.validate()?;

        for tx in &self.transactions {
            if tx.tx_type == TxType::Reward {
                return Err(ValidationError::StrayReward(tx.hash.clone()));
            }
            tx.validate()?;
        }
        for sc in &self.smart_contracts {
            sc.validate()?;
        }
        for ct in &self.contract_transactions {
            ct.validate()?;
        }
        Ok(())
    }

    /// Hashes of the ordinary transactions sealed here.
    pub fn transaction_hashes(&self) -> impl Iterator<Item = &str> {
        self.transactions.iter().map(|t| t.hash.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::Block;
    use crate::crypto::Identity;
    use crate::error::ValidationError;
    use crate::transaction::{SmartContract, Transaction, TxType};

    fn child_of(parent: &Block, producer: &Identity) -> Block {
        let reward = Transaction::reward(producer, 10.0, parent.timestamp + 1);
        let tx = Transaction::signed(producer, None, 1.0, TxType::Stake, parent.timestamp + 1);
        let sc = SmartContract::signed(producer, "noop".into(), parent.timestamp + 1);
        Block::new(
            parent.index + 1,
            parent.hash.clone(),
            parent.timestamp + 1,
            reward,
            vec![tx],
            vec![sc],
            Vec::new(),
        )
    }

    #[test]
    fn genesis_has_valid_hash() {
        let id = Identity::generate();
        let b = Block::genesis(Transaction::reward(&id, 16.0, 1), 1);
        assert_eq!(b.hash, b.compute_hash());
        assert!(b.is_genesis());
        assert_eq!(b.validate(), Ok(()));
    }

    #[test]
    fn children_are_stamped_with_block_hash() {
        let id = Identity::generate();
        let g = Block::genesis(Transaction::reward(&id, 16.0, 1), 1);
        let b = child_of(&g, &id);
        assert_eq!(b.reward.block_hash.as_deref(), Some(b.hash.as_str()));
        assert_eq!(b.transactions[0].block_hash.as_deref(), Some(b.hash.as_str()));
        assert_eq!(b.smart_contracts[0].block_hash.as_deref(), Some(b.hash.as_str()));
        assert_eq!(b.validate(), Ok(()));
    }

    #[test]
    fn invalid_when_mutated() {
        let id = Identity::generate();
        let g = Block::genesis(Transaction::reward(&id, 16.0, 1), 1);
        let mut b = child_of(&g, &id);
        let extra = Transaction::signed(&id, None, 2.0, TxType::Stake, 99);
        b.transactions.push(extra);
        assert!(matches!(b.validate(), Err(ValidationError::HashMismatch { .. })));
    }

    #[test]
    fn non_genesis_needs_parent_hash() {
        let id = Identity::generate();
        let b = Block::new(
            4,
            String::new(),
            1,
            Transaction::reward(&id, 1.0, 1),
            Vec::new(),
            Vec::new(),
            Vec::new(),
        );
        assert_eq!(b.validate(), Err(ValidationError::MissingParentHash(4)));
    }

    #[test]
    fn one_bad_transaction_invalidates_the_block() {
        let id = Identity::generate();
        let g = Block::genesis(Transaction::reward(&id, 16.0, 1), 1);
        let mut zero = Transaction::signed(&id, None, 1.0, TxType::Stake, 5);
        zero.amount = 0.0;
        let b = Block::new(
            1,
            g.hash.clone(),
            2,
            Transaction::reward(&id, 1.0, 2),
            vec![zero],
            Vec::new(),
            Vec::new(),
        );
        assert_eq!(b.validate(), Err(ValidationError::NonPositiveAmount(0.0)));
    }

    #[test]
    fn json_round_trip_preserves_hash() {
        let id = Identity::generate();
        let g = Block::genesis(Transaction::reward(&id, 16.0, 1), 1);
        let b = child_of(&g, &id);
        let wire = serde_json::to_string(&b).unwrap();
        let back: Block = serde_json::from_str(&wire).unwrap();
        assert_eq!(back.compute_hash(), b.hash);
        assert_eq!(back.validate(), Ok(()));
    }
}
