use chrono::Utc;
use log::{debug, info, warn};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::mpsc::{self, UnboundedSender};
use tokio::task::JoinHandle;

use crate::error::ProposeError;
use crate::sync::{Coordinator, Inbound};

/// The coordinator behind one lock. Every mutation holds the lock for the
/// whole insert + head-selection + emission sequence.
pub type SharedCoordinator = Arc<Mutex<Coordinator>>;

/// Lock the coordinator, recovering the guard if a previous holder panicked.
pub fn lock(shared: &SharedCoordinator) -> MutexGuard<'_, Coordinator> {
    shared.lock().unwrap_or_else(PoisonError::into_inner)
}

/// What the transport and the API hold on to.
#[derive(Clone)]
pub struct NodeHandle {
    pub coordinator: SharedCoordinator,
    inbound: UnboundedSender<Inbound>,
}

impl NodeHandle {
    /// Queue a message for the node. Returns false once the node stopped.
    pub fn submit_inbound(&self, msg: Inbound) -> bool {
        self.inbound.send(msg).is_ok()
    }
}

/// Move `coordinator` behind a lock and spawn the task that feeds it
/// inbound messages strictly one at a time.
pub fn spawn(coordinator: Coordinator) -> (NodeHandle, JoinHandle<()>) {
    let shared = Arc::new(Mutex::new(coordinator));
    let (tx, mut rx) = mpsc::unbounded_channel::<Inbound>();
    let worker = Arc::clone(&shared);
    let task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            lock(&worker).submit_inbound(msg);
        }
        info!("NODE - inbound channel closed, stopping");
    });
    (
        NodeHandle {
            coordinator: shared,
            inbound: tx,
        },
        task,
    )
}

/// Try to produce a block every `every`.
pub fn spawn_producer(shared: SharedCoordinator, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        loop {
            ticker.tick().await;
            let now = Utc::now().timestamp_millis();
            let result = lock(&shared).propose_block(now);
            match result {
                Ok(block) => debug!("NODE - proposed #{} {}", block.index, block.hash),
                Err(ProposeError::NotScheduled) => debug!("NODE - not scheduled this slot"),
                Err(ProposeError::NoIdentity) => {
                    debug!("NODE - no identity, producer idle")
                }
                Err(e) => warn!("NODE - block production failed: {e}"),
            }
        }
    })
}
