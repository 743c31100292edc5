use serde::{Deserialize, Serialize};

use crate::crypto::{Identity, is_canonical_pubkey, sha256_hex, verify_signature_hex};
use crate::error::ValidationError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TxType {
    Transfer,
    Stake,
    Unstake,
    Reward,
}

impl TxType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TxType::Transfer => "TRANSFER",
            TxType::Stake => "STAKE",
            TxType::Unstake => "UNSTAKE",
            TxType::Reward => "REWARD",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TxStatus {
    #[default]
    Pending,
    Complete,
    Reject,
}

/// A value transfer authored by `sender`. Identity is the content hash over
/// (sender, receiver, amount, timestamp); `block_hash` and `status` are
/// bookkeeping and never part of any hash.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub hash: String,
    #[serde(default)]
    pub block_hash: Option<String>,
    pub sender: String,
    #[serde(default)]
    pub receiver: Option<String>,
    pub amount: f64,
    #[serde(rename = "type")]
    pub tx_type: TxType,
    pub timestamp: i64, // Unix millis (UTC)
    pub signature: String,
    #[serde(default)]
    pub status: TxStatus,
}

impl Transaction {
    /// Build an unsigned transaction; the hash is computed immediately.
    pub fn new(
        sender: String,
        receiver: Option<String>,
        amount: f64,
        tx_type: TxType,
        timestamp: i64,
    ) -> Self {
        let mut tx = Self {
            hash: String::new(),
            block_hash: None,
            sender,
            receiver,
            amount,
            tx_type,
            timestamp,
            signature: String::new(),
            status: TxStatus::Pending,
        };
        tx.hash = tx.compute_hash();
        tx
    }

    /// Build and sign a transaction authored by `identity`.
    pub fn signed(
        identity: &Identity,
        receiver: Option<String>,
        amount: f64,
        tx_type: TxType,
        timestamp: i64,
    ) -> Self {
        let mut tx = Self::new(
            identity.public_key().to_string(),
            receiver,
            amount,
            tx_type,
            timestamp,
        );
        tx.signature = identity.sign(tx.canonical_payload().as_bytes());
        tx
    }

    /// Minting transaction paying `amount` to the producer itself.
    pub fn reward(identity: &Identity, amount: f64, timestamp: i64) -> Self {
        let receiver = Some(identity.public_key().to_string());
        Self::signed(identity, receiver, amount, TxType::Reward, timestamp)
    }

    /// Canonical signing payload: `sender:receiver:amount:timestamp`.
    pub fn canonical_payload(&self) -> String {
        format!(
            "{}:{}:{}:{}",
            self.sender,
            self.receiver.as_deref().unwrap_or(""),
            self.amount,
            self.timestamp
        )
    }

    pub fn compute_hash(&self) -> String {
        sha256_hex(self.canonical_payload().as_bytes())
    }

    /// Stable projection used inside block hash preimages.
    pub fn hash_material(&self) -> serde_json::Value {
        serde_json::json!({
            "hash": self.hash,
            "sender": self.sender,
            "receiver": self.receiver,
            "amount": self.amount,
            "type": self.tx_type.as_str(),
            "timestamp": self.timestamp,
            "signature": self.signature,
        })
    }

    /// Structural validity: required fields, positive amount, hash integrity
    /// and a signature by `sender` over the canonical payload. Balances are
    /// not checked here.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.sender.is_empty() {
            return Err(ValidationError::MissingField("sender"));
        }
        if self.hash.is_empty() {
            return Err(ValidationError::MissingField("hash"));
        }
        if self.signature.is_empty() {
            return Err(ValidationError::MissingField("signature"));
        }
        let needs_receiver = matches!(self.tx_type, TxType::Transfer | TxType::Reward);
        if needs_receiver && self.receiver.as_deref().is_none_or(str::is_empty) {
            return Err(ValidationError::MissingField("receiver"));
        }
        // NaN fails this too
        if !(self.amount > 0.0) || !self.amount.is_finite() {
            return Err(ValidationError::NonPositiveAmount(self.amount));
        }
        // keys double as balance addresses, so only one spelling is accepted
        if !is_canonical_pubkey(&self.sender) {
            return Err(ValidationError::NonCanonicalKey(self.sender.clone()));
        }
        if let Some(receiver) = self.receiver.as_deref().filter(|r| !is_canonical_pubkey(r)) {
            return Err(ValidationError::NonCanonicalKey(receiver.to_string()));
        }

        let computed = self.compute_hash();
        if computed != self.hash {
            return Err(ValidationError::HashMismatch {
                stored: self.hash.clone(),
                computed,
            });
        }

        match verify_signature_hex(&self.sender, &self.signature, self.canonical_payload().as_bytes()) {
            Ok(true) => Ok(()),
            _ => Err(ValidationError::BadSignature(self.hash.clone())),
        }
    }
}
