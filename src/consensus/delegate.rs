use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::crypto::keyed_digest;

/// How many delegates `select` returns by default.
pub const DEFAULT_DELEGATE_COUNT: usize = 5;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DelegateEntry {
    pub sender_identity: String,
    pub public_key: String,
    pub joined_at: i64,
    #[serde(default)]
    pub last_selected_at: Option<i64>,
}

impl DelegateEntry {
    pub fn new(public_key: String, joined_at: i64) -> Self {
        Self {
            sender_identity: public_key.clone(),
            public_key,
            joined_at,
            last_selected_at: None,
        }
    }
}

/// Deterministic delegate selection: every candidate is scored by a keyed
/// hash of `prev_block_hash ++ current_time` keyed with its public key, the
/// candidates are sorted by digest and the first `k` returned.
///
/// Given identical inputs every peer computes the same subset. The candidate
/// set is trusted; an attacker able to add keys can grind for good digests.
pub fn select<'a>(
    prev_block_hash: &str,
    current_time: i64,
    candidates: &'a [DelegateEntry],
    k: usize,
) -> Vec<&'a DelegateEntry> {
    let message = format!("{prev_block_hash}{current_time}");
    let mut scored: Vec<([u8; 32], &DelegateEntry)> = candidates
        .iter()
        .map(|c| (keyed_digest(c.public_key.as_bytes(), message.as_bytes()), c))
        .collect();
    scored.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.public_key.cmp(&b.1.public_key)));
    scored.into_iter().take(k).map(|(_, c)| c).collect()
}

/// Registered delegates, in join order.
#[derive(Debug, Default, Clone)]
pub struct DelegateRoster {
    entries: Vec<DelegateEntry>,
}

impl DelegateRoster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a delegate. Re-registering a known key is a no-op.
    pub fn register(&mut self, entry: DelegateEntry) -> bool {
        if self.contains(&entry.public_key) {
            return false;
        }
        info!("DELEGATES - registered {}", entry.public_key);
        self.entries.push(entry);
        true
    }

    pub fn remove(&mut self, public_key: &str) -> bool {
        let before = self.entries.len();
        self.entries.retain(|e| e.public_key != public_key);
        before != self.entries.len()
    }

    pub fn contains(&self, public_key: &str) -> bool {
        self.entries.iter().any(|e| e.public_key == public_key)
    }

    pub fn entries(&self) -> &[DelegateEntry] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Run `select` over the roster and stamp `last_selected_at` on the
    /// winners. Returns the winners' public keys in rank order.
    pub fn select_round(&mut self, prev_block_hash: &str, current_time: i64, k: usize) -> Vec<String> {
        let winners: Vec<String> = select(prev_block_hash, current_time, &self.entries, k)
            .into_iter()
            .map(|e| e.public_key.clone())
            .collect();
        for e in &mut self.entries {
            if winners.contains(&e.public_key) {
                e.last_selected_at = Some(current_time);
            }
        }
        debug!(
            "DELEGATES - round {}@{} picked {}/{}",
            prev_block_hash,
            current_time,
            winners.len(),
            self.entries.len()
        );
        winners
    }
}
