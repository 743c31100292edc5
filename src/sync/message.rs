use serde::{Deserialize, Serialize};

use crate::blockchain::Block;
use crate::consensus::Attestation;
use crate::error::ProtocolError;
use crate::transaction::Transaction;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageKind {
    Block,
    BlockValidate,
    Transaction,
    RequestChain,
    Chain,
    HeadBlockHash,
}

/// Typed message body.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Block(Block),
    BlockValidate(Attestation),
    Transaction(Transaction),
    /// Hash of the block being asked for.
    RequestChain(String),
    /// Reply to `RequestChain`; handled exactly like `Block`.
    Chain(Block),
    /// Sender's current head, announced on connect.
    HeadBlockHash(String),
}

impl Payload {
    pub fn kind(&self) -> MessageKind {
        match self {
            Payload::Block(_) => MessageKind::Block,
            Payload::BlockValidate(_) => MessageKind::BlockValidate,
            Payload::Transaction(_) => MessageKind::Transaction,
            Payload::RequestChain(_) => MessageKind::RequestChain,
            Payload::Chain(_) => MessageKind::Chain,
            Payload::HeadBlockHash(_) => MessageKind::HeadBlockHash,
        }
    }
}

/// A message delivered by the network layer, tagged with the peer it came from.
#[derive(Debug, Clone, PartialEq)]
pub struct Inbound {
    pub payload: Payload,
    pub sender_id: String,
}

impl Inbound {
    pub fn new(payload: Payload, sender_id: impl Into<String>) -> Self {
        Self {
            payload,
            sender_id: sender_id.into(),
        }
    }
}

/// What the core hands back to the network layer.
#[derive(Debug, Clone, PartialEq)]
pub enum Outbound {
    /// Deliver to every connected peer.
    Broadcast(Payload),
    /// Deliver to one peer only.
    Direct { peer_id: String, payload: Payload },
}

/// JSON envelope `{kind, value, senderId}` as it crosses the network boundary.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    pub kind: MessageKind,
    pub value: serde_json::Value,
    #[serde(default)]
    pub sender_id: String,
}

impl Envelope {
    pub fn decode(bytes: &[u8]) -> Result<Self, ProtocolError> {
        Ok(serde_json::from_slice(bytes)?)
    }

    pub fn encode(&self) -> Result<Vec<u8>, ProtocolError> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn from_payload(payload: &Payload, sender_id: impl Into<String>) -> Result<Self, ProtocolError> {
        let value = match payload {
            Payload::Block(b) | Payload::Chain(b) => serde_json::to_value(b)?,
            Payload::BlockValidate(a) => serde_json::to_value(a)?,
            Payload::Transaction(t) => serde_json::to_value(t)?,
            Payload::RequestChain(h) | Payload::HeadBlockHash(h) => serde_json::Value::String(h.clone()),
        };
        Ok(Self {
            kind: payload.kind(),
            value,
            sender_id: sender_id.into(),
        })
    }

    /// Decode `value` according to `kind`.
    pub fn into_inbound(self) -> Result<Inbound, ProtocolError> {
        let payload = match self.kind {
            MessageKind::Block => Payload::Block(serde_json::from_value(self.value)?),
            MessageKind::BlockValidate => Payload::BlockValidate(serde_json::from_value(self.value)?),
            MessageKind::Transaction => Payload::Transaction(serde_json::from_value(self.value)?),
            MessageKind::RequestChain => Payload::RequestChain(serde_json::from_value(self.value)?),
            MessageKind::Chain => Payload::Chain(serde_json::from_value(self.value)?),
            MessageKind::HeadBlockHash => Payload::HeadBlockHash(serde_json::from_value(self.value)?),
        };
        Ok(Inbound {
            payload,
            sender_id: self.sender_id,
        })
    }
}
