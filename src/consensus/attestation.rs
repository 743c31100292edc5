use log::debug;
use serde::{Deserialize, Serialize};

use crate::blockchain::Block;
use crate::crypto::{Identity, is_canonical_pubkey, verify_signature_hex};
use crate::error::ValidationError;

/// A validator's signature vouching for one block.
/// The signed message is `index:hash:publicKey`; the timestamp is
/// informational and not signed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attestation {
    pub block_index: u64,
    pub block_hash: String,
    pub public_key: String,
    pub signature: String,
    #[serde(default)]
    pub timestamp: i64,
}

impl Attestation {
    pub fn new(identity: &Identity, block_index: u64, block_hash: &str, timestamp: i64) -> Self {
        let public_key = identity.public_key().to_string();
        let signature = identity.sign(Self::message(block_index, block_hash, &public_key).as_bytes());
        Self {
            block_index,
            block_hash: block_hash.to_string(),
            public_key,
            signature,
            timestamp,
        }
    }

    pub fn for_block(identity: &Identity, block: &Block, timestamp: i64) -> Self {
        Self::new(identity, block.index, &block.hash, timestamp)
    }

    fn message(index: u64, hash: &str, public_key: &str) -> String {
        format!("{index}:{hash}:{public_key}")
    }

    pub fn verify(&self) -> Result<(), ValidationError> {
        if self.public_key.is_empty() {
            return Err(ValidationError::MissingField("public_key"));
        }
        if !is_canonical_pubkey(&self.public_key) {
            return Err(ValidationError::NonCanonicalKey(self.public_key.clone()));
        }
        let msg = Self::message(self.block_index, &self.block_hash, &self.public_key);
        match verify_signature_hex(&self.public_key, &self.signature, msg.as_bytes()) {
            Ok(true) => Ok(()),
            _ => Err(ValidationError::BadSignature(format!(
                "attestation by {} on {}",
                self.public_key, self.block_hash
            ))),
        }
    }

    /// Whether this attestation refers to `block` (hash and index).
    pub fn targets(&self, block: &Block) -> bool {
        self.block_hash == block.hash && self.block_index == block.index
    }
}

/// Merge `att` into `list`, keeping at most one entry per public key.
/// Returns true when the list grew.
pub fn merge_attestation(list: &mut Vec<Attestation>, att: Attestation) -> bool {
    if list.iter().any(|a| a.public_key == att.public_key) {
        debug!(
            "ATTEST - {} already attested {}, keeping first",
            att.public_key, att.block_hash
        );
        return false;
    }
    list.push(att);
    true
}

/// weight(block) = stake(reward sender) + Σ stake(attestor), every stake
/// resolved by `stake_of` at the block's position in the tree.
pub fn block_weight(block: &Block, mut stake_of: impl FnMut(&str) -> f64) -> f64 {
    let producer = stake_of(&block.reward.sender);
    block
        .validators
        .iter()
        .fold(producer, |acc, att| acc + stake_of(&att.public_key))
}
