use chrono::Utc;
use log::{debug, info, warn};
use tokio::sync::mpsc::UnboundedSender;

use super::message::{Envelope, Inbound, Outbound, Payload};
use crate::blockchain::{BalanceKind, Block, BlockTree, InsertOutcome, TreeEvent};
use crate::config::NodeConfig;
use crate::consensus::{Attestation, DelegateEntry, DelegateRoster};
use crate::crypto::{Identity, normalize_pubkey_hex};
use crate::error::{InsertError, ProposeError, StoreError, ValidationError};
use crate::reputation::{ActivityLedger, RankedAccount};
use crate::storage::BlockStore;
use crate::transaction::{Transaction, TransactionPool};

/// Single owner of the tree, the pending pool and the auxiliary ledgers.
///
/// Each inbound message is handled to completion (validate, mutate, pick
/// head, emit) before the next one; callers sharing a coordinator across
/// tasks must hold one lock for the whole call.
pub struct Coordinator {
    config: NodeConfig,
    tree: BlockTree,
    pool: TransactionPool,
    roster: DelegateRoster,
    activity: ActivityLedger,
    store: Box<dyn BlockStore>,
    outbound: UnboundedSender<Outbound>,
}

impl Coordinator {
    pub fn new(config: NodeConfig, store: Box<dyn BlockStore>, outbound: UnboundedSender<Outbound>) -> Self {
        let mut tree = BlockTree::new(config.schedule, config.max_orphans);
        if let Some(secret) = config.secret_key.as_deref() {
            match Identity::from_secret_hex(secret) {
                Ok(id) => {
                    info!("SYNC - local identity {}", id.public_key());
                    tree.set_identity(Some(id));
                }
                Err(e) => warn!("SYNC - NODE_SECRET_KEY unusable ({e}); running without identity"),
            }
        }

        let mut roster = DelegateRoster::new();
        let now = Utc::now().timestamp_millis();
        for key in &config.delegates {
            match normalize_pubkey_hex(key) {
                Ok(pk) => {
                    roster.register(DelegateEntry::new(pk, now));
                }
                Err(e) => warn!("SYNC - skipping delegate {key}: {e}"),
            }
        }

        let pool = TransactionPool::with_capacity(config.max_pending);
        Self {
            config,
            tree,
            pool,
            roster,
            activity: ActivityLedger::new(),
            store,
            outbound,
        }
    }

    /// Re-insert everything the store holds (index-ascending). Nothing is
    /// broadcast or re-saved while replaying. Returns how many were linked.
    pub fn rebuild_from_store(&mut self) -> Result<usize, StoreError> {
        let blocks = self.store.load_all_blocks()?;
        let total = blocks.len();
        let mut linked = 0;
        for block in blocks {
            match self.tree.insert(block) {
                Ok(InsertOutcome::Inserted) => linked += 1,
                Ok(InsertOutcome::Merged { .. }) => {}
                Err(e) => warn!("SYNC - stored block skipped: {e}"),
            }
            // one insert per flush, so ledger updates see each head in turn
            self.flush_events(false);
        }
        info!("SYNC - rebuilt {linked}/{total} blocks from store");
        Ok(linked)
    }

    /// Create and insert a genesis block paid to the local identity, if the
    /// tree is still empty.
    pub fn bootstrap_genesis(&mut self, now: i64) -> Result<Option<Block>, ProposeError> {
        if !self.tree.is_empty() {
            return Ok(None);
        }
        let identity = self.tree.identity().cloned().ok_or(ProposeError::NoIdentity)?;
        let reward = Transaction::reward(&identity, self.tree.schedule().reward(0), now);
        let genesis = Block::genesis(reward, now);
        let hash = genesis.hash.clone();
        self.tree.insert(genesis)?;
        self.flush_events(true);
        info!("SYNC - bootstrapped genesis {hash}");
        Ok(self.tree.get_block(&hash).cloned())
    }

    /// Swap the local signing identity. Later heads are attested with it.
    pub fn set_identity(&mut self, identity: Option<Identity>) {
        match &identity {
            Some(id) => info!("SYNC - identity set to {}", id.public_key()),
            None => info!("SYNC - identity cleared"),
        }
        self.tree.set_identity(identity);
    }

    /// Decode a wire envelope and handle it; undecodable input is dropped.
    /// The transport's `sender_id` wins over the one claimed in the
    /// envelope, which is only used when the transport has none.
    pub fn submit_raw(&mut self, bytes: &[u8], sender_id: &str) {
        match Envelope::decode(bytes).and_then(Envelope::into_inbound) {
            Ok(mut inbound) => {
                if !sender_id.is_empty() {
                    inbound.sender_id = sender_id.to_string();
                }
                self.submit_inbound(inbound);
            }
            Err(e) => warn!("SYNC - dropped message from {sender_id}: {e}"),
        }
    }

    /// Handle one message to completion.
    pub fn submit_inbound(&mut self, msg: Inbound) {
        let Inbound { payload, sender_id } = msg;
        debug!("SYNC - {:?} from {}", payload.kind(), sender_id);
        match payload {
            Payload::Block(block) | Payload::Chain(block) => self.handle_block(block, &sender_id),
            Payload::BlockValidate(att) => self.handle_attestation(att),
            Payload::Transaction(tx) => {
                if self.tree.is_sealed(&tx.hash) {
                    debug!("SYNC - tx {} from {sender_id} already sealed", tx.hash);
                } else if let Err(e) = self.pool.add(tx) {
                    debug!("SYNC - tx from {sender_id} rejected: {e}");
                }
            }
            Payload::RequestChain(hash) => match self.tree.get_block(&hash) {
                Some(block) => self.send(Outbound::Direct {
                    peer_id: sender_id,
                    payload: Payload::Chain(block.clone()),
                }),
                None => debug!("SYNC - {sender_id} asked for unknown {hash}"),
            },
            Payload::HeadBlockHash(hash) => {
                if !self.tree.contains(&hash) {
                    info!("SYNC - peer {sender_id} is on unknown head {hash}, requesting it");
                    self.send(Outbound::Broadcast(Payload::RequestChain(hash)));
                }
            }
        }
        self.flush_events(true);
    }

    fn handle_block(&mut self, block: Block, sender_id: &str) {
        let hash = block.hash.clone();
        match self.tree.insert(block) {
            Ok(InsertOutcome::Inserted) => debug!("SYNC - block {hash} from {sender_id} linked"),
            Ok(InsertOutcome::Merged { added }) => {
                debug!("SYNC - block {hash} from {sender_id} known, {added} attestations merged")
            }
            Err(InsertError::UnknownParent(parent)) => {
                debug!("SYNC - block {hash} from {sender_id} waits for {parent}")
            }
            Err(e) => warn!("SYNC - block {hash} from {sender_id} rejected: {e}"),
        }
    }

    fn handle_attestation(&mut self, att: Attestation) {
        if !self.tree.add_attestation(att) {
            debug!("SYNC - attestation dropped or already known");
        }
    }

    /// Send our head to a freshly connected peer.
    pub fn announce_head(&self, peer_id: &str) {
        if let Some(head) = self.tree.head() {
            self.send(Outbound::Direct {
                peer_id: peer_id.to_string(),
                payload: Payload::HeadBlockHash(head.hash.clone()),
            });
        }
    }

    /// Pool a locally authored transaction and gossip it.
    pub fn submit_transaction(&mut self, tx: Transaction) -> Result<bool, ValidationError> {
        if self.tree.is_sealed(&tx.hash) {
            debug!("SYNC - local tx {} already sealed", tx.hash);
            return Ok(false);
        }
        let added = self.pool.add(tx.clone())?;
        if added {
            self.send(Outbound::Broadcast(Payload::Transaction(tx)));
        }
        Ok(added)
    }

    /// Build a block on the current head from pending transactions, insert it
    /// and broadcast it.
    ///
    /// With a non-empty delegate roster the local key must be among the
    /// delegates selected for (head hash, current slot).
    pub fn propose_block(&mut self, now: i64) -> Result<Block, ProposeError> {
        let identity = self.tree.identity().cloned().ok_or(ProposeError::NoIdentity)?;
        let (head_hash, head_index) = {
            let head = self.tree.head().ok_or(ProposeError::NoHead)?;
            (head.hash.clone(), head.index)
        };

        if !self.roster.is_empty() {
            let interval_ms = (self.config.schedule.block_interval_secs.max(1) * 1000) as i64;
            let slot = now - now.rem_euclid(interval_ms);
            let winners = self.roster.select_round(&head_hash, slot, self.config.delegate_count);
            if !winners.iter().any(|w| w == identity.public_key()) {
                return Err(ProposeError::NotScheduled);
            }
        }

        let index = head_index + 1;
        let reward = Transaction::reward(&identity, self.tree.schedule().reward(index), now);
        let txs = self.pool.take_for_block(self.config.max_txs_per_block);
        let block = Block::new(index, head_hash, now, reward, txs, Vec::new(), Vec::new());
        let hash = block.hash.clone();

        self.tree.insert(block)?;
        self.flush_events(true);
        info!("SYNC - produced block #{index} {hash}");
        self.tree
            .get_block(&hash)
            .cloned()
            .ok_or(ProposeError::Rejected(InsertError::UnknownParent(hash)))
    }

    /// Turn tree events into persistence calls, ledger updates and outbound
    /// messages. `live` is false while replaying from the store.
    fn flush_events(&mut self, live: bool) {
        for event in self.tree.drain_events() {
            match event {
                TreeEvent::NeedParent(parent) => {
                    if live {
                        self.send(Outbound::Broadcast(Payload::RequestChain(parent)));
                    }
                }
                TreeEvent::BlockInserted(block) => {
                    if live {
                        if let Err(e) = self.store.save_block(&block) {
                            warn!("SYNC - could not persist {}: {e}", block.hash);
                        }
                        self.send(Outbound::Broadcast(Payload::Block(block)));
                    }
                }
                TreeEvent::NewHead { hash, extends_previous } => self.on_new_head(&hash, extends_previous),
                TreeEvent::NewAttestation(att) => {
                    if live {
                        self.send(Outbound::Broadcast(Payload::BlockValidate(att)));
                    }
                }
                TreeEvent::AttestationsMerged {
                    hash,
                    public_keys,
                    on_canonical_chain,
                } => {
                    // blocks off the canonical chain are scored when they join it
                    if on_canonical_chain {
                        if let Some(block) = self.tree.get_block(&hash) {
                            self.activity
                                .record_attestations(public_keys.iter().map(String::as_str), block.timestamp);
                        }
                    }
                }
            }
        }
    }

    fn on_new_head(&mut self, hash: &str, extends_previous: bool) {
        if extends_previous {
            if let Some(head) = self.tree.get_block(hash) {
                self.activity.record_block(head);
                self.pool.prune(head.transaction_hashes());
            }
        } else {
            let chain = self.tree.chain_from_hash(hash).unwrap_or_default();
            self.activity = ActivityLedger::from_chain(chain.iter().copied());
            self.pool.prune(chain.iter().flat_map(|b| b.transaction_hashes()));
        }
    }

    fn send(&self, msg: Outbound) {
        // fire-and-forget: a closed channel only means the transport is gone
        if self.outbound.send(msg).is_err() {
            debug!("SYNC - outbound channel closed, message dropped");
        }
    }

    /* -------------------- Read-only views -------------------- */

    /// Root to `from` (or to the head when `None`).
    pub fn get_chain(&self, from: Option<&str>) -> Vec<&Block> {
        match from {
            Some(hash) => self.tree.chain_from_hash(hash).unwrap_or_default(),
            None => self.tree.canonical_chain(),
        }
    }

    pub fn get_block(&self, hash: &str) -> Option<&Block> {
        self.tree.get_block(hash)
    }

    pub fn get_head(&self) -> Option<&Block> {
        self.tree.head()
    }

    pub fn get_delegate_roster(&self) -> &[DelegateEntry] {
        self.roster.entries()
    }

    pub fn register_delegate(&mut self, entry: DelegateEntry) -> bool {
        self.roster.register(entry)
    }

    pub fn balance(&self, address: &str) -> (f64, f64) {
        (
            self.tree.balance(address, BalanceKind::Wallet),
            self.tree.balance(address, BalanceKind::Stake),
        )
    }

    pub fn reputation(&self, now: i64) -> Vec<RankedAccount> {
        self.activity.ranking(now)
    }

    pub fn pending_len(&self) -> usize {
        self.pool.len()
    }

    pub fn tree(&self) -> &BlockTree {
        &self.tree
    }

    pub fn config(&self) -> &NodeConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consensus::EmissionSchedule;
    use crate::reputation::{REWARD_WEIGHT, VALIDATOR_WEIGHT};
    use crate::storage::MemoryStore;
    use crate::transaction::TxType;
    use tokio::sync::mpsc::{UnboundedReceiver, unbounded_channel};

    fn coordinator(identity: Option<&Identity>) -> (Coordinator, UnboundedReceiver<Outbound>) {
        let (tx, rx) = unbounded_channel();
        let mut c = Coordinator::new(NodeConfig::default(), Box::new(MemoryStore::new()), tx);
        c.set_identity(identity.cloned());
        (c, rx)
    }

    fn drain(rx: &mut UnboundedReceiver<Outbound>) -> Vec<Outbound> {
        let mut out = Vec::new();
        while let Ok(m) = rx.try_recv() {
            out.push(m);
        }
        out
    }

    fn child(parent: &Block, producer: &Identity, ts: i64) -> Block {
        let index = parent.index + 1;
        let reward = Transaction::reward(producer, EmissionSchedule::default().reward(index), ts);
        Block::new(index, parent.hash.clone(), ts, reward, Vec::new(), Vec::new(), Vec::new())
    }

    #[test]
    fn request_chain_is_answered_directly() {
        let me = Identity::generate();
        let (mut c, mut rx) = coordinator(Some(&me));
        let g = c.bootstrap_genesis(1).unwrap().unwrap();
        drain(&mut rx);

        c.submit_inbound(Inbound::new(Payload::RequestChain(g.hash.clone()), "peer-7"));
        let out = drain(&mut rx);
        assert_eq!(out.len(), 1);
        match &out[0] {
            Outbound::Direct { peer_id, payload: Payload::Chain(b) } => {
                assert_eq!(peer_id, "peer-7");
                assert_eq!(b.hash, g.hash);
            }
            other => panic!("unexpected {other:?}"),
        }

        c.submit_inbound(Inbound::new(Payload::RequestChain("unknown".into()), "peer-7"));
        assert!(drain(&mut rx).is_empty());
    }

    #[test]
    fn chain_reply_backfills_and_links_buffered_child() {
        let me = Identity::generate();
        let other = Identity::generate();
        let (mut c, mut rx) = coordinator(Some(&me));
        let g = c.bootstrap_genesis(1).unwrap().unwrap();
        let b1 = child(&g, &other, 2);
        let b2 = child(&b1, &other, 3);
        drain(&mut rx);

        c.submit_inbound(Inbound::new(Payload::Block(b2.clone()), "p"));
        let out = drain(&mut rx);
        assert_eq!(out, vec![Outbound::Broadcast(Payload::RequestChain(b1.hash.clone()))]);

        c.submit_inbound(Inbound::new(Payload::Chain(b1.clone()), "p"));
        assert_eq!(c.get_head().unwrap().hash, b2.hash);
        assert_eq!(c.get_chain(None).len(), 3);
    }

    #[test]
    fn transactions_are_pooled_then_sealed() {
        let me = Identity::generate();
        let (mut c, mut rx) = coordinator(Some(&me));
        c.bootstrap_genesis(1).unwrap();

        let stake = Transaction::signed(&me, None, 100.0, TxType::Stake, 2);
        c.submit_inbound(Inbound::new(Payload::Transaction(stake.clone()), "p"));
        let mut bad = stake.clone();
        bad.amount = 0.0;
        c.submit_inbound(Inbound::new(Payload::Transaction(bad), "p"));
        assert_eq!(c.pending_len(), 1);

        let block = c.propose_block(3).unwrap();
        assert_eq!(block.transactions.len(), 1);
        assert_eq!(c.pending_len(), 0);
        assert_eq!(c.balance(me.public_key()).1, 100.0);

        let out = drain(&mut rx);
        // inbound transactions are pooled, not re-gossiped
        assert!(!out.iter().any(|m| matches!(m, Outbound::Broadcast(Payload::Transaction(_)))));
        assert!(out.iter().any(|m| matches!(m, Outbound::Broadcast(Payload::Block(b)) if b.hash == block.hash)));
    }

    #[test]
    fn reward_gossip_cannot_stall_production() {
        let me = Identity::generate();
        let outsider = Identity::generate();
        let (mut c, _rx) = coordinator(Some(&me));
        c.bootstrap_genesis(1).unwrap();

        let stray = Transaction::reward(&outsider, 1.0, 2);
        c.submit_inbound(Inbound::new(Payload::Transaction(stray), "p"));
        assert_eq!(c.pending_len(), 0);
        assert_eq!(c.propose_block(10_000).unwrap().index, 1);
        assert_eq!(c.propose_block(20_000).unwrap().index, 2);
    }

    #[test]
    fn sealed_transfer_is_not_pooled_or_applied_twice() {
        let me = Identity::generate();
        let bob = Identity::generate();
        let (mut c, _rx) = coordinator(Some(&me));
        c.bootstrap_genesis(1).unwrap();

        let pay = Transaction::signed(&me, Some(bob.public_key().into()), 100.0, TxType::Transfer, 2);
        assert_eq!(c.submit_transaction(pay.clone()), Ok(true));
        c.propose_block(10_000).unwrap();
        assert_eq!(c.balance(bob.public_key()), (100.0, 0.0));

        c.submit_inbound(Inbound::new(Payload::Transaction(pay.clone()), "p"));
        assert_eq!(c.pending_len(), 0);
        assert_eq!(c.submit_transaction(pay), Ok(false));
        c.propose_block(20_000).unwrap();
        assert_eq!(c.balance(bob.public_key()), (100.0, 0.0));
    }

    #[test]
    fn late_attestation_on_head_is_credited() {
        let me = Identity::generate();
        let other = Identity::generate();
        let (mut c, _rx) = coordinator(Some(&me));
        let g = c.bootstrap_genesis(1).unwrap().unwrap();

        c.submit_inbound(Inbound::new(Payload::BlockValidate(Attestation::for_block(&other, &g, 5)), "p"));
        assert_eq!(c.get_head().unwrap().validators.len(), 2);
        let ranked = c.reputation(1);
        let score_of = |pk: &str| ranked.iter().find(|r| r.address == pk).map(|r| r.score);
        assert_eq!(score_of(other.public_key()), Some(VALIDATOR_WEIGHT));
        // reward plus own attestation, counted once
        assert_eq!(score_of(me.public_key()), Some(REWARD_WEIGHT + VALIDATOR_WEIGHT));
    }

    #[test]
    fn transport_sender_id_wins_over_envelope_claim() {
        let me = Identity::generate();
        let (mut c, mut rx) = coordinator(Some(&me));
        let g = c.bootstrap_genesis(1).unwrap().unwrap();
        drain(&mut rx);

        let env = Envelope::from_payload(&Payload::RequestChain(g.hash.clone()), "victim").unwrap();
        let bytes = env.encode().unwrap();
        c.submit_raw(&bytes, "peer-3");
        c.submit_raw(&bytes, "");
        let peers: Vec<_> = drain(&mut rx)
            .into_iter()
            .filter_map(|m| match m {
                Outbound::Direct { peer_id, .. } => Some(peer_id),
                _ => None,
            })
            .collect();
        assert_eq!(peers, vec!["peer-3".to_string(), "victim".to_string()]);
    }

    #[test]
    fn garbage_is_dropped_without_side_effects() {
        let me = Identity::generate();
        let (mut c, mut rx) = coordinator(Some(&me));
        c.bootstrap_genesis(1).unwrap();
        drain(&mut rx);
        let len = c.tree().len();
        c.submit_raw(b"{not json", "p");
        c.submit_raw(br#"{"kind":"CHAIN","value":42}"#, "p");
        assert_eq!(c.tree().len(), len);
        assert!(drain(&mut rx).is_empty());
    }

    #[test]
    fn propose_needs_identity_and_schedule() {
        let (mut c, _rx) = coordinator(None);
        assert_eq!(c.propose_block(1).unwrap_err(), ProposeError::NoIdentity);

        let me = Identity::generate();
        c.set_identity(Some(me.clone()));
        assert_eq!(c.propose_block(1).unwrap_err(), ProposeError::NoHead);
        c.bootstrap_genesis(1).unwrap();

        // a roster that does not contain us
        let outsider = Identity::generate();
        c.register_delegate(DelegateEntry::new(outsider.public_key().into(), 0));
        assert_eq!(c.propose_block(20_000).unwrap_err(), ProposeError::NotScheduled);

        c.register_delegate(DelegateEntry::new(me.public_key().into(), 0));
        assert!(c.propose_block(20_000).is_ok());
    }

    #[test]
    fn rebuild_replays_store_quietly() {
        let me = Identity::generate();
        let (tx, mut rx) = unbounded_channel();
        let mut store = MemoryStore::new();
        let g = Block::genesis(Transaction::reward(&me, EmissionSchedule::default().reward(0), 1), 1);
        let b1 = child(&g, &me, 2);
        store.save_block(&b1).unwrap();
        store.save_block(&g).unwrap();

        let mut c = Coordinator::new(NodeConfig::default(), Box::new(store), tx);
        assert_eq!(c.rebuild_from_store().unwrap(), 2);
        assert_eq!(c.get_head().unwrap().hash, b1.hash);
        assert!(drain(&mut rx).is_empty());
        assert_eq!(c.reputation(2)[0].address, me.public_key());
    }
}
