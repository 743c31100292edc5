use thiserror::Error;

/// Structural problems with a transaction, contract or block.
/// Any of these makes the whole enclosing block invalid.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("missing required field `{0}`")]
    MissingField(&'static str),
    #[error("amount must be > 0 (got {0})")]
    NonPositiveAmount(f64),
    #[error("hash mismatch: stored {stored}, computed {computed}")]
    HashMismatch { stored: String, computed: String },
    #[error("key {0} is not lowercase compressed hex")]
    NonCanonicalKey(String),
    #[error("signature does not verify for {0}")]
    BadSignature(String),
    #[error("reward transaction has type {0}, expected REWARD")]
    BadRewardType(String),
    #[error("ordinary transaction {0} has type REWARD")]
    StrayReward(String),
    #[error("reward {found} does not match schedule {expected} for block #{index}")]
    RewardAmount { index: u64, expected: f64, found: f64 },
    #[error("non-genesis block #{0} has an empty parent hash")]
    MissingParentHash(u64),
    #[error("genesis block must have an empty parent hash")]
    GenesisWithParent,
    #[error("child index {child} does not follow parent index {parent}")]
    IndexMismatch { parent: u64, child: u64 },
}

/// Outcome of a failed `BlockTree::insert`.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum InsertError {
    #[error("invalid block: {0}")]
    Invalid(#[from] ValidationError),
    #[error("unknown parent {0}")]
    UnknownParent(String),
    #[error("a genesis block is already present")]
    SecondGenesis,
}

/// Inbound message could not be decoded or is otherwise malformed.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("undecodable message: {0}")]
    Decode(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("block store unavailable: {0}")]
    Unavailable(String),
}

/// Block production refused.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ProposeError {
    #[error("no local signing identity")]
    NoIdentity,
    #[error("tree has no head yet")]
    NoHead,
    #[error("local key is not scheduled for this slot")]
    NotScheduled,
    #[error("produced block was rejected: {0}")]
    Rejected(#[from] InsertError),
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum KeyError {
    #[error("invalid hex")]
    Hex,
    #[error("invalid key bytes")]
    Key,
    #[error("invalid DER signature")]
    Signature,
}
