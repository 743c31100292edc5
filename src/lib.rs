//! Core of a weighted-attestation ledger node: a block tree with
//! heaviest-leaf fork choice, balances resolved along ancestry, an
//! emission schedule, keyed-hash delegate selection and an activity
//! ledger, all driven by a message-in/message-out sync coordinator.

pub mod api;
pub mod blockchain;
pub mod config;
pub mod consensus;
pub mod crypto;
pub mod error;
pub mod node;
pub mod reputation;
pub mod storage;
pub mod sync;
pub mod transaction;
