use serde::{Deserialize, Serialize};

use crate::crypto::{Identity, sha256_hex, verify_signature_hex};
use crate::error::ValidationError;

/// Contract deployment. Carries no execution semantics in the ledger core;
/// only its identity and authorship are checked.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SmartContract {
    pub hash: String,
    #[serde(default)]
    pub block_hash: Option<String>,
    pub owner: String,
    pub payload: String,
    pub timestamp: i64,
    pub signature: String,
}

/// Call against a deployed contract.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContractTransaction {
    pub hash: String,
    #[serde(default)]
    pub block_hash: Option<String>,
    pub sender: String,
    pub contract_hash: String,
    pub payload: String,
    pub timestamp: i64,
    pub signature: String,
}

fn check_signed(
    author: &str,
    hash: &str,
    signature: &str,
    payload: &str,
) -> Result<(), ValidationError> {
    if author.is_empty() {
        return Err(ValidationError::MissingField("author"));
    }
    if signature.is_empty() {
        return Err(ValidationError::MissingField("signature"));
    }
    let computed = sha256_hex(payload.as_bytes());
    if computed != hash {
        return Err(ValidationError::HashMismatch {
            stored: hash.to_string(),
            computed,
        });
    }
    match verify_signature_hex(author, signature, payload.as_bytes()) {
        Ok(true) => Ok(()),
        _ => Err(ValidationError::BadSignature(hash.to_string())),
    }
}

impl SmartContract {
    pub fn signed(identity: &Identity, payload: String, timestamp: i64) -> Self {
        let mut sc = Self {
            hash: String::new(),
            block_hash: None,
            owner: identity.public_key().to_string(),
            payload,
            timestamp,
            signature: String::new(),
        };
        let canonical = sc.canonical_payload();
        sc.hash = sha256_hex(canonical.as_bytes());
        sc.signature = identity.sign(canonical.as_bytes());
        sc
    }

    pub fn canonical_payload(&self) -> String {
        format!("{}:{}:{}", self.owner, self.payload, self.timestamp)
    }

    pub fn hash_material(&self) -> serde_json::Value {
        serde_json::json!({
            "hash": self.hash,
            "owner": self.owner,
            "payload": self.payload,
            "timestamp": self.timestamp,
            "signature": self.signature,
        })
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        check_signed(&self.owner, &self.hash, &self.signature, &self.canonical_payload())
    }
}

impl ContractTransaction {
    pub fn signed(identity: &Identity, contract_hash: String, payload: String, timestamp: i64) -> Self {
        let mut ct = Self {
            hash: String::new(),
            block_hash: None,
            sender: identity.public_key().to_string(),
            contract_hash,
            payload,
            timestamp,
            signature: String::new(),
        };
        let canonical = ct.canonical_payload();
        ct.hash = sha256_hex(canonical.as_bytes());
        ct.signature = identity.sign(canonical.as_bytes());
        ct
    }

    pub fn canonical_payload(&self) -> String {
        format!(
            "{}:{}:{}:{}",
            self.sender, self.contract_hash, self.payload, self.timestamp
        )
    }

    pub fn hash_material(&self) -> serde_json::Value {
        serde_json::json!({
            "hash": self.hash,
            "sender": self.sender,
            "contractHash": self.contract_hash,
            "payload": self.payload,
            "timestamp": self.timestamp,
            "signature": self.signature,
        })
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.contract_hash.is_empty() {
            return Err(ValidationError::MissingField("contract_hash"));
        }
        check_signed(&self.sender, &self.hash, &self.signature, &self.canonical_payload())
    }
}
