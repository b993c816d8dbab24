//! The blockchain synchronizer (C7): a finite state machine driving pool and chain sync against
//! the remote node, delivering discovered blocks and pool deltas to the transfers consumer.
//!
//! Modeled as a tokio actor in the idiom of `lexe-app-lexe-public`'s `InactivityTimer`: an
//! `mpsc::Receiver` per inbound signal (notifications, stop, periodic tick), `tokio::select!` to
//! prioritize among them, and the owning struct holding the `JoinHandle`.

use std::sync::Arc;

use tokio::sync::{mpsc, Mutex};
use tracing::{debug, info, instrument};

use crate::config::WalletConfig;
use crate::consumer::TransfersConsumer;
use crate::mempool::MempoolCleaner;
use crate::node::Node;
use crate::subwallet::SubwalletRegistry;
use crate::transfers::TransfersContainer;

/// The synchronizer's finite-state machine states, in priority order (higher preempts lower).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum SyncState {
  /// No work queued; waiting for a tick or notification.
  Idle = 0,
  /// Computing the symmetric difference of the local and node mempool.
  PoolSync = 1,
  /// Fetching and delivering blocks to consumers.
  BlockchainSync = 2,
  /// Evicting pool transactions older than the configured lifetime.
  DeleteOldTxs = 3,
  /// Terminal: the synchronizer has shut down.
  Stopped = 4,
}

/// A notification the synchronizer reacts to, mirroring the node observer callbacks.
#[derive(Debug, Clone)]
pub enum SyncSignal {
  /// The node's local chain advanced.
  LocalBlockchainUpdated,
  /// The node's view of the network's best-known height changed.
  LastKnownBlockHeightUpdated,
  /// The node's mempool changed.
  PoolChanged,
  /// The periodic tick fired.
  Tick,
}

/// Construct the sparse block-id chain sent as `knownBlockIds`: every height for the first 10
/// blocks below the tip, then geometrically increasing spacing, always ending at genesis (height
/// 0). `block_hash_at` resolves a height to its known hash; heights this wallet hasn't recorded
/// are skipped.
pub fn sparse_chain(top_height: u64, block_hash_at: impl Fn(u64) -> Option<[u8; 32]>) -> Vec<[u8; 32]> {
  let mut heights = Vec::new();
  let mut h = top_height;
  let mut dense_remaining = 10u64;
  let mut step = 1u64;
  loop {
    heights.push(h);
    if h == 0 {
      break;
    }
    if dense_remaining > 0 {
      dense_remaining -= 1;
      h = h.saturating_sub(1);
    } else {
      step *= 2;
      h = h.saturating_sub(step);
    }
  }
  heights.into_iter().filter_map(block_hash_at).collect()
}

/// Shared wallet state the synchronizer mutates. `cn-wallet` coarsens this to a single mutex,
/// matching the spec's "protected by a single coarse mutex" concurrency model.
pub struct SynchronizerState {
  /// The registry of subwallets this synchronizer's consumer scans for.
  pub registry: SubwalletRegistry,
  /// The transfers container every discovered output and spend is recorded into.
  pub transfers: TransfersContainer,
  /// The consumer performing per-block output discovery.
  pub consumer: TransfersConsumer,
  /// Known block hashes by height, used to build the sparse chain.
  pub known_block_hashes: std::collections::HashMap<u64, [u8; 32]>,
  /// Hashes of pool transactions currently believed present.
  pub known_pool_tx_ids: Vec<[u8; 32]>,
  /// The last chain tip hash this wallet has synced to.
  pub last_known_block_hash: [u8; 32],
  /// Transactions tracked for mempool-cleaner purposes.
  pub tracked_pool_txs: std::collections::HashMap<[u8; 32], crate::mempool::TrackedTransaction>,
  /// The mempool cleaner, holding its "recently deleted" memory across sync cycles.
  pub mempool_cleaner: MempoolCleaner,
}

impl SynchronizerState {
  /// Construct fresh, empty synchronizer-owned state around a subwallet registry.
  pub fn new(registry: SubwalletRegistry) -> Self {
    SynchronizerState {
      registry,
      transfers: TransfersContainer::new(),
      consumer: TransfersConsumer::new(),
      known_block_hashes: std::collections::HashMap::new(),
      known_pool_tx_ids: Vec::new(),
      last_known_block_hash: [0; 32],
      tracked_pool_txs: std::collections::HashMap::new(),
      mempool_cleaner: MempoolCleaner::new(),
    }
  }
}

/// An event the synchronizer emits for the wallet's public event queue.
#[derive(Debug, Clone)]
pub enum SyncEvent {
  /// New blocks were applied, advancing the tip to this height.
  SyncProgress {
    /// The new chain tip height.
    height: u64,
  },
  /// A reorg detached every block at or above this height.
  BlockchainDetached {
    /// The lowest height that was detached.
    height: u64,
  },
  /// Pool transactions were added or removed.
  PoolUpdated {
    /// The number of pool transactions added.
    added: usize,
    /// The number of pool transactions removed.
    deleted: usize,
  },
  /// The mempool cleaner evicted these transactions.
  TransactionsEvicted {
    /// The hashes of the evicted transactions.
    hashes: Vec<[u8; 32]>,
  },
}

/// Handle to a running synchronizer task.
pub struct Synchronizer {
  signal_tx: mpsc::Sender<SyncSignal>,
  stop_tx: mpsc::Sender<()>,
  handle: Option<tokio::task::JoinHandle<()>>,
}

impl Synchronizer {
  /// Spawn the synchronizer's background task, driving `state` against `node` forever until
  /// stopped. Events are pushed onto `events`.
  pub fn spawn(
    state: Arc<Mutex<SynchronizerState>>,
    node: Arc<dyn Node>,
    config: WalletConfig,
    events: mpsc::UnboundedSender<SyncEvent>,
  ) -> Self {
    let (signal_tx, mut signal_rx) = mpsc::channel::<SyncSignal>(64);
    let (stop_tx, mut stop_rx) = mpsc::channel::<()>(1);

    let tick_signal_tx = signal_tx.clone();
    let tick_interval = config.sync_tick_interval;
    tokio::spawn(async move {
      let mut ticker = tokio::time::interval(tick_interval);
      loop {
        ticker.tick().await;
        if tick_signal_tx.send(SyncSignal::Tick).await.is_err() {
          break;
        }
      }
    });

    let handle = tokio::spawn(async move {
      loop {
        tokio::select! {
          biased;
          _ = stop_rx.recv() => {
            info!(target: "sync", state = ?SyncState::Stopped, "synchronizer stopping");
            break;
          }
          signal = signal_rx.recv() => {
            let Some(signal) = signal else { break };
            debug!(target: "sync", ?signal, "synchronizer signal");
            run_cycle(&state, node.as_ref(), &config, &events).await;
          }
        }
      }
    });

    Synchronizer { signal_tx, stop_tx, handle: Some(handle) }
  }

  /// Notify the synchronizer of an externally-observed event.
  pub async fn notify(&self, signal: SyncSignal) {
    let _ = self.signal_tx.send(signal).await;
  }

  /// Stop the synchronizer and wait for its task to exit cleanly.
  pub async fn stop(&mut self) {
    let _ = self.stop_tx.send(()).await;
    if let Some(handle) = self.handle.take() {
      let _ = handle.await;
    }
  }
}

#[instrument(skip_all)]
async fn run_cycle(
  state: &Arc<Mutex<SynchronizerState>>,
  node: &dyn Node,
  config: &WalletConfig,
  events: &mpsc::UnboundedSender<SyncEvent>,
) {
  chain_sync(state, node, events).await;
  pool_sync(state, node, config, events).await;
  delete_old_txs(state, config, events).await;
}

async fn chain_sync(state: &Arc<Mutex<SynchronizerState>>, node: &dyn Node, events: &mpsc::UnboundedSender<SyncEvent>) {
  let known_ids = {
    let guard = state.lock().await;
    let top = guard.known_block_hashes.keys().copied().max().unwrap_or(0);
    sparse_chain(top, |h| guard.known_block_hashes.get(&h).copied())
  };

  let Ok(range) = node.get_wallet_sync_data(&known_ids, 0, 0).await else { return };
  if range.blocks.is_empty() {
    return;
  }

  let mut guard = state.lock().await;
  let local_top = guard.known_block_hashes.keys().copied().max().unwrap_or(0);
  if range.start_height < local_top {
    let detached = guard.transfers.detach(range.start_height);
    if !detached.is_empty() {
      let _ = events.send(SyncEvent::BlockchainDetached { height: range.start_height });
    }
    guard.known_block_hashes.retain(|&h, _| h < range.start_height);
  }

  let start_height = range.blocks.first().map(|b| b.height).unwrap_or(0);
  let end_height = range.blocks.last().map(|b| b.height + 1).unwrap_or(start_height);
  let global_indexes = node.get_global_indexes_for_range(start_height, end_height).await.unwrap_or_default();

  for block in &range.blocks {
    guard.known_block_hashes.insert(block.height, block.block_hash);
    guard.last_known_block_hash = block.block_hash;
  }
  // Disjoint field borrows through one `&mut` deref: the borrow checker tracks these separately.
  let SynchronizerState { registry, transfers, consumer, .. } = &mut *guard;
  consumer.on_new_blocks(registry, transfers, &range.blocks, &global_indexes);

  let _ = events.send(SyncEvent::SyncProgress { height: end_height.saturating_sub(1) });
}

async fn pool_sync(
  state: &Arc<Mutex<SynchronizerState>>,
  node: &dyn Node,
  config: &WalletConfig,
  events: &mpsc::UnboundedSender<SyncEvent>,
) {
  let (tail, known_tx_ids) = {
    let guard = state.lock().await;
    (guard.last_known_block_hash, guard.known_pool_tx_ids.clone())
  };
  let Ok(changes) = node.get_pool_changes_lite(tail, &known_tx_ids).await else { return };
  if !changes.tail_block_actual {
    // The block set is the truth; loop back to chain sync without touching the pool.
    chain_sync(state, node, events).await;
    return;
  }

  let mut guard = state.lock().await;
  let added_count = changes.added.len();
  let deleted_count = changes.deleted.len();
  // Every added hash is acknowledged to the node regardless of filtering below, so a transaction
  // we're deliberately suppressing doesn't keep reappearing in the next diff.
  for tx in &changes.added {
    guard.known_pool_tx_ids.push(tx.hash());
  }
  guard.known_pool_tx_ids.retain(|h| !changes.deleted.contains(h));

  let now = std::time::SystemTime::now().duration_since(std::time::UNIX_EPOCH).map(|d| d.as_secs()).unwrap_or(0);
  let admitted: Vec<_> = changes
    .added
    .iter()
    .filter(|tx| !guard.mempool_cleaner.is_recently_deleted(&tx.hash(), now, config.recently_deleted_timeout))
    .cloned()
    .collect();

  let SynchronizerState { registry, transfers, consumer, tracked_pool_txs, .. } = &mut *guard;
  consumer.on_pool_updated(registry, transfers, &admitted, &changes.deleted);
  for tx in &admitted {
    tracked_pool_txs
      .insert(tx.hash(), crate::mempool::TrackedTransaction { transaction: tx.clone(), receive_time: now });
  }
  for hash in &changes.deleted {
    tracked_pool_txs.remove(hash);
  }

  if added_count > 0 || deleted_count > 0 {
    let _ = events.send(SyncEvent::PoolUpdated { added: added_count, deleted: deleted_count });
  }
}

async fn delete_old_txs(state: &Arc<Mutex<SynchronizerState>>, config: &WalletConfig, events: &mpsc::UnboundedSender<SyncEvent>) {
  let mut guard = state.lock().await;
  let height = guard.known_block_hashes.keys().copied().max().unwrap_or(0);
  let now = std::time::SystemTime::now().duration_since(std::time::UNIX_EPOCH).map(|d| d.as_secs()).unwrap_or(0);
  let SynchronizerState { tracked_pool_txs, mempool_cleaner, transfers, .. } = &mut *guard;
  let evicted = mempool_cleaner.clean(tracked_pool_txs, config, height, now);
  for hash in &evicted {
    tracked_pool_txs.remove(hash);
    transfers.delete_unconfirmed_transaction(*hash);
    transfers.set_wallet_transaction_state(hash, crate::history::WalletTransactionState::Deleted);
  }
  if !evicted.is_empty() {
    let _ = events.send(SyncEvent::TransactionsEvicted { hashes: evicted });
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn sparse_chain_always_includes_genesis() {
    let present: std::collections::HashMap<u64, [u8; 32]> = (0..=1000).map(|h| (h, [h as u8; 32])).collect();
    let chain = sparse_chain(1000, |h| present.get(&h).copied());
    assert!(chain.contains(&[0; 32]));
    assert!(chain.len() < 100);
  }

  #[test]
  fn sparse_chain_handles_zero_height() {
    let chain = sparse_chain(0, |h| if h == 0 { Some([0; 32]) } else { None });
    assert_eq!(chain, vec![[0; 32]]);
  }
}
