use chrono::Utc;
use log::{debug, info, warn};
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};

use super::balance::{BalanceKind, BalanceView, BlockBalances, fold_block};
use super::orphans::OrphanPool;
use super::Block;
use crate::consensus::{Attestation, EmissionSchedule, block_weight, merge_attestation};
use crate::crypto::Identity;
use crate::error::{InsertError, ValidationError};
use crate::transaction::TxStatus;

/// Conditions raised by tree mutations. The tree never talks to the
/// network; whoever owns it drains these and decides what to send.
#[derive(Debug, Clone, PartialEq)]
pub enum TreeEvent {
    /// A block arrived whose parent is unknown.
    NeedParent(String),
    /// A new block was linked into the tree.
    BlockInserted(Block),
    /// The head moved. `extends_previous` is true when the new head is a
    /// direct child of the old one.
    NewHead { hash: String, extends_previous: bool },
    /// The local identity attested the new head.
    NewAttestation(Attestation),
    /// Attestations by `public_keys` were merged into an already linked
    /// block. `on_canonical_chain` reflects the chain before any head change
    /// the merge causes.
    AttestationsMerged {
        hash: String,
        public_keys: Vec<String>,
        on_canonical_chain: bool,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted,
    /// Block already known; its attestations were merged.
    Merged { added: usize },
}

#[derive(Debug)]
struct TreeNode {
    block: Block,
    balances: BlockBalances,
    children: Vec<String>,
    seq: u64, // first-seen order
}

/// Every known block, keyed by hash, linked parent -> children, with a
/// heaviest-leaf head.
#[derive(Debug)]
pub struct BlockTree {
    nodes: HashMap<String, TreeNode>,
    leaves: HashSet<String>,
    root: Option<String>,
    head: Option<String>,
    next_seq: u64,
    orphans: OrphanPool,
    schedule: EmissionSchedule,
    identity: Option<Identity>,
    view: BalanceView,
    /// tx hash -> blocks that applied it
    sealed: HashMap<String, Vec<String>>,
    events: Vec<TreeEvent>,
}

impl BlockTree {
    pub fn new(schedule: EmissionSchedule, max_orphans: usize) -> Self {
        Self {
            nodes: HashMap::new(),
            leaves: HashSet::new(),
            root: None,
            head: None,
            next_seq: 0,
            orphans: OrphanPool::new(max_orphans),
            schedule,
            identity: None,
            view: BalanceView::default(),
            sealed: HashMap::new(),
            events: Vec::new(),
        }
    }

    /// Replace the local signing identity (or drop it with `None`).
    pub fn set_identity(&mut self, identity: Option<Identity>) {
        self.identity = identity;
    }

    pub fn identity(&self) -> Option<&Identity> {
        self.identity.as_ref()
    }

    pub fn schedule(&self) -> &EmissionSchedule {
        &self.schedule
    }

    /// Validate and link `block`.
    ///
    /// A block whose parent is unknown is buffered, a `NeedParent` event is
    /// raised and `UnknownParent` returned; it is linked automatically once
    /// the parent arrives. Re-inserting a known hash merges attestations.
    pub fn insert(&mut self, block: Block) -> Result<InsertOutcome, InsertError> {
        if let Err(e) = block.validate() {
            warn!("TREE - rejected block #{} {}: {}", block.index, block.hash, e);
            return Err(e.into());
        }

        if self.nodes.contains_key(&block.hash) {
            let hash = block.hash.clone();
            let added = self.merge_attestations(&hash, block.validators);
            return Ok(InsertOutcome::Merged { added });
        }

        let hash = self.link(block)?;
        self.replay_orphans(hash);
        self.recompute_head();
        Ok(InsertOutcome::Inserted)
    }

    fn link(&mut self, mut block: Block) -> Result<String, InsertError> {
        let parent = if block.is_genesis() {
            if self.root.is_some() {
                warn!("TREE - refusing second genesis {}", block.hash);
                return Err(InsertError::SecondGenesis);
            }
            None
        } else {
            match self.nodes.get(&block.parent_hash) {
                Some(p) => Some((p.block.index, p.block.cumulative_weight)),
                None => {
                    let missing = block.parent_hash.clone();
                    debug!("TREE - orphan #{} {} needs {}", block.index, block.hash, missing);
                    self.orphans.buffer(block);
                    self.events.push(TreeEvent::NeedParent(missing.clone()));
                    return Err(InsertError::UnknownParent(missing));
                }
            }
        };

        if let Some((parent_index, _)) = parent {
            if block.index != parent_index + 1 {
                let e = ValidationError::IndexMismatch {
                    parent: parent_index,
                    child: block.index,
                };
                warn!("TREE - rejected block {}: {}", block.hash, e);
                return Err(e.into());
            }
        }

        let expected = self.schedule.reward(block.index);
        if (block.reward.amount - expected).abs() > expected.abs() * 1e-9 {
            let e = ValidationError::RewardAmount {
                index: block.index,
                expected,
                found: block.reward.amount,
            };
            warn!("TREE - rejected block {}: {}", block.hash, e);
            return Err(e.into());
        }

        let incoming = std::mem::take(&mut block.validators);
        for att in incoming {
            if att.targets(&block) && att.verify().is_ok() {
                merge_attestation(&mut block.validators, att);
            } else {
                debug!("TREE - dropped bad attestation by {} on {}", att.public_key, block.hash);
            }
        }

        let parent_hash = (!block.parent_hash.is_empty()).then(|| block.parent_hash.clone());
        let start = parent_hash.as_deref();
        let balances = fold_block(
            &mut block,
            |addr, kind| self.resolve(start, addr, kind),
            |tx_hash| self.sealed_from(start, tx_hash),
        );
        block.weight = block_weight(&block, |pk| self.resolve(start, pk, BalanceKind::Stake));
        block.cumulative_weight = block.weight + parent.map_or(0.0, |(_, cw)| cw);

        let hash = block.hash.clone();
        for tx in block.transactions.iter().filter(|t| t.status == TxStatus::Complete) {
            self.sealed.entry(tx.hash.clone()).or_default().push(hash.clone());
        }
        debug!(
            "TREE - linked #{} {} (w={}, cw={})",
            block.index, hash, block.weight, block.cumulative_weight
        );
        self.events.push(TreeEvent::BlockInserted(block.clone()));

        let seq = self.next_seq;
        self.next_seq += 1;
        self.nodes.insert(
            hash.clone(),
            TreeNode {
                block,
                balances,
                children: Vec::new(),
                seq,
            },
        );
        self.leaves.insert(hash.clone());
        match parent_hash {
            Some(p) => {
                if let Some(parent_node) = self.nodes.get_mut(&p) {
                    parent_node.children.push(hash.clone());
                }
                self.leaves.remove(&p);
            }
            None => self.root = Some(hash.clone()),
        }
        Ok(hash)
    }

    fn replay_orphans(&mut self, linked: String) {
        let mut ready = vec![linked];
        while let Some(parent) = ready.pop() {
            for child in self.orphans.take_children(&parent) {
                if self.nodes.contains_key(&child.hash) {
                    continue;
                }
                let child_hash = child.hash.clone();
                match self.link(child) {
                    Ok(h) => {
                        info!("TREE - replayed orphan {h}");
                        ready.push(h);
                    }
                    Err(e) => warn!("TREE - buffered orphan {child_hash} failed: {e}"),
                }
            }
        }
    }

    /// Nearest-ancestor lookup starting at `start` (inclusive) and walking
    /// toward the root. Addresses never touched resolve to 0.
    fn resolve(&self, start: Option<&str>, address: &str, kind: BalanceKind) -> f64 {
        let mut cur = start;
        while let Some(h) = cur {
            let Some(node) = self.nodes.get(h) else {
                break;
            };
            if let Some(v) = node.balances.get(address, kind) {
                return v;
            }
            cur = (!node.block.parent_hash.is_empty()).then_some(node.block.parent_hash.as_str());
        }
        0.0
    }

    /// Whether `ancestor` is `from` itself or lies on the path from `from`
    /// to the root.
    fn is_ancestor_or_self(&self, ancestor: &str, from: Option<&str>) -> bool {
        let Some(target) = self.nodes.get(ancestor) else {
            return false;
        };
        let mut cur = from;
        while let Some(h) = cur {
            if h == ancestor {
                return true;
            }
            let Some(node) = self.nodes.get(h) else {
                break;
            };
            if node.block.index <= target.block.index {
                break;
            }
            cur = (!node.block.parent_hash.is_empty()).then_some(node.block.parent_hash.as_str());
        }
        false
    }

    /// Whether `tx_hash` was applied by `start` (inclusive) or one of its ancestors.
    fn sealed_from(&self, start: Option<&str>, tx_hash: &str) -> bool {
        self.sealed
            .get(tx_hash)
            .is_some_and(|blocks| blocks.iter().any(|b| self.is_ancestor_or_self(b, start)))
    }

    /// Whether `tx_hash` is already applied on the canonical chain.
    pub fn is_sealed(&self, tx_hash: &str) -> bool {
        self.head.is_some() && self.sealed_from(self.head.as_deref(), tx_hash)
    }

    /// Whether `hash` is on the root-to-head path.
    pub fn is_canonical(&self, hash: &str) -> bool {
        self.head.is_some() && self.is_ancestor_or_self(hash, self.head.as_deref())
    }

    /// Balance of `address` as seen by block `hash`, i.e. before its own
    /// transactions apply (walk starts at the parent).
    pub fn balance_at(&self, hash: &str, address: &str, kind: BalanceKind) -> Option<f64> {
        let node = self.nodes.get(hash)?;
        let start = (!node.block.parent_hash.is_empty()).then_some(node.block.parent_hash.as_str());
        Some(self.resolve(start, address, kind))
    }

    /// Balance of `address` after block `hash` applied.
    pub fn balance_after(&self, hash: &str, address: &str, kind: BalanceKind) -> Option<f64> {
        self.nodes.get(hash)?;
        Some(self.resolve(Some(hash), address, kind))
    }

    /// Attach one attestation to a known block. Returns true if the block's
    /// weight may have changed; unknown blocks and bad signatures are dropped.
    pub fn add_attestation(&mut self, att: Attestation) -> bool {
        if !self.nodes.contains_key(&att.block_hash) {
            debug!("TREE - attestation for unknown block {} dropped", att.block_hash);
            return false;
        }
        let hash = att.block_hash.clone();
        self.merge_attestations(&hash, vec![att]) > 0
    }

    fn merge_attestations(&mut self, hash: &str, atts: Vec<Attestation>) -> usize {
        let Some(node) = self.nodes.get_mut(hash) else {
            return 0;
        };
        let mut merged = Vec::new();
        for att in atts {
            if !att.targets(&node.block) {
                continue;
            }
            if let Err(e) = att.verify() {
                warn!("TREE - {e}");
                continue;
            }
            let key = att.public_key.clone();
            if merge_attestation(&mut node.block.validators, att) {
                merged.push(key);
            }
        }
        let added = merged.len();
        if added > 0 {
            let on_canonical_chain = self.is_canonical(hash);
            self.events.push(TreeEvent::AttestationsMerged {
                hash: hash.to_string(),
                public_keys: merged,
                on_canonical_chain,
            });
            self.reweigh(hash);
            self.recompute_head();
        }
        added
    }

    /// Recompute `hash`'s weight by a fresh ancestor walk and push the
    /// cumulative weight down its subtree.
    fn reweigh(&mut self, hash: &str) {
        let Some(node) = self.nodes.get(hash) else {
            return;
        };
        let parent = (!node.block.parent_hash.is_empty()).then_some(node.block.parent_hash.as_str());
        let weight = block_weight(&node.block, |pk| self.resolve(parent, pk, BalanceKind::Stake));
        let parent_cw = parent
            .and_then(|p| self.nodes.get(p))
            .map_or(0.0, |p| p.block.cumulative_weight);

        if let Some(node) = self.nodes.get_mut(hash) {
            node.block.weight = weight;
        }
        let mut stack = vec![(hash.to_string(), parent_cw)];
        while let Some((h, pcw)) = stack.pop() {
            let Some(node) = self.nodes.get_mut(&h) else {
                continue;
            };
            node.block.cumulative_weight = node.block.weight + pcw;
            let cw = node.block.cumulative_weight;
            stack.extend(node.children.iter().map(|c| (c.clone(), cw)));
        }
    }

    /// Pick the leaf with maximal cumulative weight, earliest seen on ties.
    fn recompute_head(&mut self) {
        let best = self
            .leaves
            .iter()
            .filter_map(|h| self.nodes.get(h).map(|n| (h, n)))
            .max_by(|a, b| {
                a.1.block
                    .cumulative_weight
                    .partial_cmp(&b.1.block.cumulative_weight)
                    .unwrap_or(Ordering::Equal)
                    .then_with(|| b.1.seq.cmp(&a.1.seq))
            })
            .map(|(h, _)| h.clone());

        if let Some(best) = best {
            if self.head.as_deref() != Some(best.as_str()) {
                self.on_new_head(best);
            }
        }
    }

    fn on_new_head(&mut self, hash: String) {
        let previous = self.head.replace(hash.clone());
        let Some(node) = self.nodes.get(&hash) else {
            return;
        };
        let extends_previous = previous.as_deref() == Some(node.block.parent_hash.as_str());
        if extends_previous {
            self.view.apply(&node.balances);
        } else {
            self.view.clear();
            let mut path = Vec::new();
            let mut cur = Some(hash.as_str());
            while let Some(h) = cur {
                let Some(n) = self.nodes.get(h) else {
                    break;
                };
                path.push(&n.balances);
                cur = (!n.block.parent_hash.is_empty()).then_some(n.block.parent_hash.as_str());
            }
            for balances in path.into_iter().rev() {
                self.view.apply(balances);
            }
        }
        info!(
            "TREE - new head #{} {} (cw={})",
            node.block.index, hash, node.block.cumulative_weight
        );
        self.events.push(TreeEvent::NewHead {
            hash: hash.clone(),
            extends_previous,
        });
        self.attest_head(&hash);
    }

    fn attest_head(&mut self, hash: &str) {
        let Some(identity) = self.identity.clone() else {
            return;
        };
        let Some(node) = self.nodes.get_mut(hash) else {
            return;
        };
        if node.block.validators.iter().any(|a| a.public_key == identity.public_key()) {
            return;
        }
        let att = Attestation::for_block(&identity, &node.block, Utc::now().timestamp_millis());
        node.block.validators.push(att.clone());
        // Only the head's own subtree grows, so it stays the head.
        self.reweigh(hash);
        debug!("TREE - attested head {hash}");
        self.events.push(TreeEvent::NewAttestation(att));
    }

    /// Take every event raised since the last drain, oldest first.
    pub fn drain_events(&mut self) -> Vec<TreeEvent> {
        std::mem::take(&mut self.events)
    }

    /* -------------------- Read-only views -------------------- */

    pub fn get_block(&self, hash: &str) -> Option<&Block> {
        self.nodes.get(hash).map(|n| &n.block)
    }

    pub fn contains(&self, hash: &str) -> bool {
        self.nodes.contains_key(hash)
    }

    pub fn head(&self) -> Option<&Block> {
        self.head.as_deref().and_then(|h| self.get_block(h))
    }

    pub fn root(&self) -> Option<&Block> {
        self.root.as_deref().and_then(|h| self.get_block(h))
    }

    pub fn block_balances(&self, hash: &str) -> Option<&BlockBalances> {
        self.nodes.get(hash).map(|n| &n.balances)
    }

    /// Blocks from the root down to `hash`, inclusive.
    pub fn chain_from_hash(&self, hash: &str) -> Option<Vec<&Block>> {
        let mut chain = Vec::new();
        let mut cur = self.nodes.get(hash)?;
        loop {
            chain.push(&cur.block);
            if cur.block.parent_hash.is_empty() {
                break;
            }
            match self.nodes.get(&cur.block.parent_hash) {
                Some(p) => cur = p,
                None => break,
            }
        }
        chain.reverse();
        Some(chain)
    }

    /// Root to head.
    pub fn canonical_chain(&self) -> Vec<&Block> {
        self.head
            .as_deref()
            .and_then(|h| self.chain_from_hash(h))
            .unwrap_or_default()
    }

    /// Balance on the canonical chain (the long-lived view).
    pub fn balance(&self, address: &str, kind: BalanceKind) -> f64 {
        self.view.get(address, kind)
    }

    pub fn leaf_count(&self) -> usize {
        self.leaves.len()
    }

    pub fn orphan_count(&self) -> usize {
        self.orphans.len()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transaction::{Transaction, TxStatus, TxType};

    const STAKE: f64 = 1_000.0;

    fn tree() -> BlockTree {
        BlockTree::new(EmissionSchedule::default(), 16)
    }

    /// Genesis paying the investor share to `investor`, who stakes STAKE of it.
    fn genesis(investor: &Identity) -> Block {
        let s = EmissionSchedule::default();
        let stake = Transaction::signed(investor, None, STAKE, TxType::Stake, 1);
        Block::new(
            0,
            String::new(),
            1,
            Transaction::reward(investor, s.reward(0), 1),
            vec![stake],
            Vec::new(),
            Vec::new(),
        )
    }

    fn child(parent: &Block, producer: &Identity, txs: Vec<Transaction>, ts: i64) -> Block {
        let index = parent.index + 1;
        let reward = Transaction::reward(producer, EmissionSchedule::default().reward(index), ts);
        Block::new(index, parent.hash.clone(), ts, reward, txs, Vec::new(), Vec::new())
    }

    #[test]
    fn attested_child_becomes_head_with_cumulative_weight() {
        let investor = Identity::generate();
        let producer = Identity::generate();
        let mut t = tree();
        let g = genesis(&investor);
        assert_eq!(t.insert(g.clone()), Ok(InsertOutcome::Inserted));
        assert_eq!(t.head().map(|b| b.hash.clone()), Some(g.hash.clone()));

        let mut c = child(&g, &producer, Vec::new(), 2);
        c.validators.push(Attestation::for_block(&investor, &c, 3));
        assert_eq!(t.insert(c.clone()), Ok(InsertOutcome::Inserted));

        let head = t.head().unwrap();
        assert_eq!(head.hash, c.hash);
        assert_eq!(head.weight, STAKE);
        let parent_cw = t.get_block(&g.hash).unwrap().cumulative_weight;
        assert_eq!(head.cumulative_weight, head.weight + parent_cw);
    }

    #[test]
    fn fork_tie_keeps_first_seen_then_follows_weight() {
        let investor = Identity::generate();
        let p1 = Identity::generate();
        let p2 = Identity::generate();
        let mut t = tree();
        let g = genesis(&investor);
        t.insert(g.clone()).unwrap();

        let a = child(&g, &p1, Vec::new(), 2);
        let b = child(&g, &p2, Vec::new(), 3);
        t.insert(a.clone()).unwrap();
        t.insert(b.clone()).unwrap();
        assert_eq!(t.leaf_count(), 2);
        assert_eq!(t.head().unwrap().hash, a.hash);

        assert!(t.add_attestation(Attestation::for_block(&investor, &b, 4)));
        assert_eq!(t.head().unwrap().hash, b.hash);
        assert_eq!(t.head().unwrap().cumulative_weight, STAKE);
    }

    #[test]
    fn orphan_is_not_linked_and_asks_for_parent() {
        let investor = Identity::generate();
        let mut t = tree();
        let g = genesis(&investor);
        t.insert(g.clone()).unwrap();
        t.drain_events();

        let c1 = child(&g, &investor, Vec::new(), 2);
        let c2 = child(&c1, &investor, Vec::new(), 3);
        assert_eq!(t.insert(c2.clone()), Err(InsertError::UnknownParent(c1.hash.clone())));
        assert_eq!(t.len(), 1);
        assert_eq!(t.drain_events(), vec![TreeEvent::NeedParent(c1.hash.clone())]);
        assert_eq!(t.orphan_count(), 1);

        // parent arrives: the buffered child is linked right after it
        t.insert(c1.clone()).unwrap();
        assert_eq!(t.len(), 3);
        assert_eq!(t.orphan_count(), 0);
        assert_eq!(t.head().unwrap().hash, c2.hash);
    }

    #[test]
    fn reinsert_merges_attestations_without_duplicates() {
        let investor = Identity::generate();
        let other = Identity::generate();
        let mut t = tree();
        let g = genesis(&investor);
        t.insert(g.clone()).unwrap();

        let mut c = child(&g, &other, Vec::new(), 2);
        c.validators.push(Attestation::for_block(&investor, &c, 3));
        t.insert(c.clone()).unwrap();

        let mut again = c.clone();
        again.validators[0].timestamp = 99;
        again.validators.push(Attestation::for_block(&other, &c, 4));
        assert_eq!(t.insert(again), Ok(InsertOutcome::Merged { added: 1 }));
        assert_eq!(t.len(), 2);
        let stored = t.get_block(&c.hash).unwrap();
        assert_eq!(stored.validators.len(), 2);
        assert_eq!(stored.validators[0].timestamp, 3);
    }

    #[test]
    fn structurally_invalid_blocks_are_rejected() {
        let investor = Identity::generate();
        let mut t = tree();
        let mut g = genesis(&investor);
        g.timestamp += 1;
        assert!(matches!(
            t.insert(g),
            Err(InsertError::Invalid(ValidationError::HashMismatch { .. }))
        ));
        assert!(t.is_empty());
    }

    #[test]
    fn wrong_index_and_wrong_reward_are_rejected() {
        let investor = Identity::generate();
        let mut t = tree();
        let g = genesis(&investor);
        t.insert(g.clone()).unwrap();

        let reward = Transaction::reward(&investor, EmissionSchedule::default().reward(2), 2);
        let skip = Block::new(2, g.hash.clone(), 2, reward, Vec::new(), Vec::new(), Vec::new());
        assert!(matches!(
            t.insert(skip),
            Err(InsertError::Invalid(ValidationError::IndexMismatch { .. }))
        ));

        let greedy = Transaction::reward(&investor, 1_000_000.0, 2);
        let b = Block::new(1, g.hash.clone(), 2, greedy, Vec::new(), Vec::new(), Vec::new());
        assert!(matches!(
            t.insert(b),
            Err(InsertError::Invalid(ValidationError::RewardAmount { .. }))
        ));
        assert_eq!(t.len(), 1);
    }

    #[test]
    fn balances_resolve_from_nearest_ancestor() {
        let investor = Identity::generate();
        let bob = Identity::generate();
        let mut t = tree();
        let g = genesis(&investor);
        t.insert(g.clone()).unwrap();

        let pay = Transaction::signed(&investor, Some(bob.public_key().into()), 40.0, TxType::Transfer, 2);
        let c1 = child(&g, &investor, vec![pay], 2);
        t.insert(c1.clone()).unwrap();
        // c2 does not touch bob; his balance still comes from c1
        let c2 = child(&c1, &investor, Vec::new(), 3);
        t.insert(c2.clone()).unwrap();

        assert_eq!(t.balance_after(&c2.hash, bob.public_key(), BalanceKind::Wallet), Some(40.0));
        assert_eq!(t.balance_at(&c1.hash, bob.public_key(), BalanceKind::Wallet), Some(0.0));
        assert_eq!(t.balance(bob.public_key(), BalanceKind::Wallet), 40.0);
        assert_eq!(t.balance(investor.public_key(), BalanceKind::Stake), STAKE);
    }

    #[test]
    fn overdraft_in_block_is_rejected_but_block_kept() {
        let investor = Identity::generate();
        let bob = Identity::generate();
        let mut t = tree();
        let g = genesis(&investor);
        t.insert(g.clone()).unwrap();

        let pay = Transaction::signed(&bob, Some(investor.public_key().into()), 5.0, TxType::Transfer, 2);
        let c = child(&g, &investor, vec![pay], 2);
        assert_eq!(t.insert(c.clone()), Ok(InsertOutcome::Inserted));
        let stored = t.get_block(&c.hash).unwrap();
        assert_eq!(stored.transactions[0].status, TxStatus::Reject);
        assert_eq!(
            t.block_balances(&c.hash).unwrap().get(bob.public_key(), BalanceKind::Wallet),
            None
        );
    }

    #[test]
    fn transaction_sealed_by_an_ancestor_is_not_applied_again() {
        let investor = Identity::generate();
        let bob = Identity::generate();
        let mut t = tree();
        let g = genesis(&investor);
        t.insert(g.clone()).unwrap();

        let pay = Transaction::signed(&investor, Some(bob.public_key().into()), 40.0, TxType::Transfer, 2);
        let c1 = child(&g, &investor, vec![pay.clone()], 2);
        t.insert(c1.clone()).unwrap();
        assert!(t.is_sealed(&pay.hash));

        let c2 = child(&c1, &investor, vec![pay.clone()], 3);
        t.insert(c2.clone()).unwrap();
        assert_eq!(t.get_block(&c2.hash).unwrap().transactions[0].status, TxStatus::Reject);
        assert_eq!(t.balance(bob.public_key(), BalanceKind::Wallet), 40.0);

        // a sibling branch never saw it, so there it still applies
        let side = child(&g, &bob, vec![pay.clone()], 4);
        t.insert(side.clone()).unwrap();
        assert_eq!(t.get_block(&side.hash).unwrap().transactions[0].status, TxStatus::Complete);
    }

    #[test]
    fn late_attestation_reports_whether_block_was_canonical() {
        let investor = Identity::generate();
        let mut t = tree();
        let g = genesis(&investor);
        t.insert(g.clone()).unwrap();
        let a = child(&g, &Identity::generate(), Vec::new(), 2);
        let b = child(&g, &Identity::generate(), Vec::new(), 3);
        t.insert(a.clone()).unwrap();
        t.insert(b.clone()).unwrap();
        assert!(t.is_canonical(&g.hash));
        assert!(t.is_canonical(&a.hash));
        assert!(!t.is_canonical(&b.hash));
        t.drain_events();

        let late = Identity::generate();
        assert!(t.add_attestation(Attestation::for_block(&late, &g, 5)));
        assert!(t.add_attestation(Attestation::for_block(&late, &b, 6)));
        let merged: Vec<_> = t
            .drain_events()
            .into_iter()
            .filter_map(|e| match e {
                TreeEvent::AttestationsMerged {
                    hash,
                    public_keys,
                    on_canonical_chain,
                } => Some((hash, public_keys, on_canonical_chain)),
                _ => None,
            })
            .collect();
        assert_eq!(
            merged,
            vec![
                (g.hash.clone(), vec![late.public_key().to_string()], true),
                (b.hash.clone(), vec![late.public_key().to_string()], false),
            ]
        );
    }

    #[test]
    fn chain_from_hash_is_root_first() {
        let investor = Identity::generate();
        let mut t = tree();
        let g = genesis(&investor);
        let c1 = child(&g, &investor, Vec::new(), 2);
        let c2 = child(&c1, &investor, Vec::new(), 3);
        for b in [&g, &c1, &c2] {
            t.insert(b.clone()).unwrap();
        }
        let chain: Vec<_> = t.chain_from_hash(&c2.hash).unwrap().iter().map(|b| b.index).collect();
        assert_eq!(chain, vec![0, 1, 2]);
        assert!(t.chain_from_hash("nope").is_none());
        assert_eq!(t.canonical_chain().len(), 3);
    }

    #[test]
    fn local_identity_attests_each_new_head() {
        let investor = Identity::generate();
        let mut t = tree();
        t.set_identity(Some(investor.clone()));
        let g = genesis(&investor);
        t.insert(g.clone()).unwrap();
        let c = child(&g, &investor, Vec::new(), 2);
        t.insert(c.clone()).unwrap();

        let events = t.drain_events();
        let attested: Vec<_> = events
            .iter()
            .filter_map(|e| match e {
                TreeEvent::NewAttestation(a) => Some(a.block_hash.clone()),
                _ => None,
            })
            .collect();
        assert_eq!(attested, vec![g.hash.clone(), c.hash.clone()]);
        // investor stake backs both the producer share and the attestation
        assert_eq!(t.head().unwrap().weight, 2.0 * STAKE);
    }

    #[test]
    fn branch_switch_rebuilds_balance_view() {
        let investor = Identity::generate();
        let bob = Identity::generate();
        let carol = Identity::generate();
        let mut t = tree();
        let g = genesis(&investor);
        t.insert(g.clone()).unwrap();

        let to_bob = Transaction::signed(&investor, Some(bob.public_key().into()), 7.0, TxType::Transfer, 2);
        let a = child(&g, &bob, vec![to_bob], 2);
        t.insert(a.clone()).unwrap();
        assert_eq!(t.balance(bob.public_key(), BalanceKind::Wallet), 7.0 + a.reward.amount);

        let b = child(&g, &carol, Vec::new(), 3);
        t.insert(b.clone()).unwrap();
        t.add_attestation(Attestation::for_block(&investor, &b, 4));
        assert_eq!(t.head().unwrap().hash, b.hash);
        assert_eq!(t.balance(bob.public_key(), BalanceKind::Wallet), 0.0);
        assert_eq!(t.balance(carol.public_key(), BalanceKind::Wallet), b.reward.amount);
    }
}
