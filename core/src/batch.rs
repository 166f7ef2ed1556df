//! Merkle batch worker.
//!
//! On every tick, checkpoints that have stayed unsealed for at least one
//! window are batched into a single tree: waiting a window lets entries be
//! joined by siblings from other paths, giving wider trees and shorter
//! proofs instead of a flurry of singletons. Collection and sealing are
//! plain functions over `(journal, now, window)` so tests can drive them
//! with a synthetic clock.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{Duration, NaiveDateTime};
use tokio::time::MissedTickBehavior;

use crate::journal::{Journal, JournalHandle};
use crate::merkle::MerkleTree;
use crate::registry::RegistryPublisher;
use crate::ts;

/// One history entry due for batching.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DueCheckpoint {
    /// Journal key of the owning log file.
    pub path: String,
    /// Index into that path's history.
    pub index: usize,
    /// Decoded leaf bytes (the entry's keccak digest).
    pub leaf: Vec<u8>,
}

/// Collect every rootless history entry whose `to_date` is more than one
/// window in the past, in journal walk order.
pub fn collect_due(journal: &Journal, now: NaiveDateTime, window: Duration) -> Vec<DueCheckpoint> {
    let mut due = Vec::new();
    for (path, state) in &journal.paths {
        for (index, entry) in state.history.iter().enumerate() {
            if entry.root_hash.is_some() {
                continue;
            }
            if now - entry.to_date <= window {
                continue;
            }
            match hex::decode(&entry.hash) {
                Ok(leaf) => due.push(DueCheckpoint {
                    path: path.clone(),
                    index,
                    leaf,
                }),
                Err(err) => tracing::warn!(
                    path = %path,
                    index,
                    error = %err,
                    "skipping checkpoint with undecodable hash"
                ),
            }
        }
    }
    due
}

/// Build one Merkle tree over all due checkpoints and stamp each entry with
/// the shared root and its proof. Returns the new root's hex, or `None`
/// when nothing was due.
pub fn seal_batch(
    journal: &mut Journal,
    now: NaiveDateTime,
    window: Duration,
) -> Option<String> {
    let due = collect_due(journal, now, window);
    if due.is_empty() {
        return None;
    }

    let tree = MerkleTree::build(due.iter().map(|d| d.leaf.clone()).collect());
    let root_hex = hex::encode(tree.root());
    for (leaf_index, item) in due.iter().enumerate() {
        let Some(proof) = tree.proof_for_index(leaf_index) else {
            continue;
        };
        if let Some(entry) = journal
            .paths
            .get_mut(&item.path)
            .and_then(|state| state.history.get_mut(item.index))
        {
            entry.root_hash = Some(root_hex.clone());
            entry.proofs = Some(proof.iter().map(hex::encode).collect());
        }
    }
    journal.roots.insert(root_hex.clone());
    tracing::info!(root = %root_hex, leaves = due.len(), "sealed checkpoint batch");
    Some(root_hex)
}

/// Long-running worker: seals due batches on a fixed tick and offers every
/// unacknowledged root to the registry.
pub struct BatchWorker {
    handle: Arc<JournalHandle>,
    window: Duration,
    publisher: Arc<dyn RegistryPublisher>,
    acknowledged: HashSet<String>,
}

impl BatchWorker {
    /// Create a worker ticking at the checkpoint window period.
    pub fn new(
        handle: Arc<JournalHandle>,
        window: Duration,
        publisher: Arc<dyn RegistryPublisher>,
    ) -> Self {
        Self {
            handle,
            window,
            publisher,
            acknowledged: HashSet::new(),
        }
    }

    /// Tick forever; period equals the checkpoint window.
    pub async fn run(mut self) {
        let period = self
            .window
            .to_std()
            .unwrap_or_else(|_| std::time::Duration::from_secs(3));
        let mut tick = tokio::time::interval(period);
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tick.tick().await;
            self.tick_once().await;
        }
    }

    /// One pass: seal under the mutex, save, then publish outside it.
    ///
    /// A failed save or publish abandons the affected work until the next
    /// tick; local state is never rolled back. A restart re-offers every
    /// root in the journal, which an idempotent registry absorbs.
    pub async fn tick_once(&mut self) {
        let unpublished: Vec<String> = {
            let mut journal = self.handle.lock();
            if seal_batch(&mut journal, ts::now(), self.window).is_some() {
                if let Err(err) = self.handle.save_locked(&journal) {
                    tracing::error!(error = %err, "failed to save journal after batch seal");
                }
            }
            journal
                .roots
                .iter()
                .filter(|root| !self.acknowledged.contains(*root))
                .cloned()
                .collect()
        };

        for root_hex in unpublished {
            let root = match hex::decode(&root_hex) {
                Ok(root) => root,
                Err(err) => {
                    tracing::warn!(root = %root_hex, error = %err, "unpublishable root hex");
                    self.acknowledged.insert(root_hex);
                    continue;
                }
            };
            match self.publisher.publish(&root).await {
                Ok(stamp) => {
                    tracing::info!(
                        root = %root_hex,
                        timestamp = %ts::format_micros(&stamp),
                        "root registered"
                    );
                    self.acknowledged.insert(root_hex);
                }
                Err(err) => {
                    tracing::warn!(root = %root_hex, error = %err, "registry publish failed, will retry");
                }
            }
        }
    }
}
