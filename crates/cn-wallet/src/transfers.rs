//! The transfers container (C5): a per-wallet index of every output the wallet has ever scanned,
//! tracked through unconfirmed, available, and spent states.
//!
//! The donor codebase keeps four `boost::multi_index_container`s (transactions,
//! unconfirmed/available/spent transfers) each indexed several ways. This is reproduced here as a
//! single append-only `Vec<OwnedOutput>` plus secondary `HashMap` indices — one per lookup key —
//! that every mutating method keeps in sync. A key image never appears twice among outputs that
//! are simultaneously visible; colliding key images are resolved by hiding all but one entry.

use std::collections::HashMap;

use cn_curve::CompressedPoint;

use crate::error::TransfersError;

/// Where an owned output currently sits in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferState {
  /// Seen in a pool (unconfirmed) transaction only.
  Unconfirmed,
  /// Confirmed in a block, not yet known spent.
  Available,
  /// Confirmed in a block and later consumed by a confirmed spending transaction.
  Spent,
}

/// Block context a transaction was (or wasn't, for pool transactions) confirmed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockInfo {
  /// The block's height.
  pub height: u64,
  /// The block's timestamp.
  pub timestamp: u64,
}

/// Bitflags selecting which outputs [`TransfersContainer::balance`] sums over.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BalanceFlags {
  /// Include AVAILABLE outputs whose unlock constraint and spendable-age are satisfied.
  pub unlocked: bool,
  /// Include AVAILABLE outputs not yet satisfying the above.
  pub locked: bool,
}

impl BalanceFlags {
  /// Both locked and unlocked available outputs.
  pub const ALL: BalanceFlags = BalanceFlags { unlocked: true, locked: true };
  /// Only unlocked (immediately spendable) outputs.
  pub const UNLOCKED: BalanceFlags = BalanceFlags { unlocked: true, locked: false };
  /// Only locked outputs.
  pub const LOCKED: BalanceFlags = BalanceFlags { unlocked: false, locked: true };
}

/// One output this wallet owns, at any point in its lifecycle.
#[derive(Debug, Clone)]
pub struct OwnedOutput {
  /// The transaction this output was created in.
  pub transaction_hash: [u8; 32],
  /// This output's index within that transaction.
  pub index_in_transaction: usize,
  /// The owning subwallet's spend public key.
  pub spend_public: CompressedPoint,
  /// This output's derived one-time public key.
  pub one_time_key: CompressedPoint,
  /// The transaction public key `R` this output's one-time key was derived from. Needed to
  /// recover the one-time secret key at spend time without re-scanning the owning transaction.
  pub tx_public_key: CompressedPoint,
  /// This output's key image — `None` for a view-only subwallet's output, since computing it
  /// requires the spend secret key.
  pub key_image: Option<CompressedPoint>,
  /// The amount this output carries.
  pub amount: u64,
  /// This transaction's `unlockTime`, raw (undecoded height-vs-timestamp form).
  pub unlock_time: u64,
  /// This output's global index, assigned once the transaction is confirmed.
  pub global_index: Option<u64>,
  /// Confirmation context, `None` while unconfirmed.
  pub block: Option<BlockInfo>,
  /// Current lifecycle state.
  pub state: TransferState,
  /// The confirmed transaction that spent this output, once known.
  pub spending_transaction_hash: Option<[u8; 32]>,
  /// Whether this output counts toward balance/enumeration. Exactly one output per colliding key
  /// image is visible at a time.
  pub visible: bool,
  /// Whether this output was first recorded unconfirmed (via the pool) before being confirmed,
  /// as opposed to being added directly from a block. Distinguishes a `detach` reverting the
  /// output to `Unconfirmed` from removing it entirely.
  pub seen_unconfirmed_first: bool,
}

/// One input of a just-added transaction spending a previously recorded output, identified by key
/// image.
#[derive(Debug, Clone, Copy)]
pub struct SpentInput {
  /// The key image the input presents.
  pub key_image: CompressedPoint,
}

#[derive(Default)]
struct Indices {
  by_key_image: HashMap<CompressedPoint, usize>,
  by_transaction: HashMap<[u8; 32], Vec<usize>>,
  /// A transaction's own confirmation block, recorded independently of its owned-output list so
  /// a transaction with zero owned outputs (e.g. a full-balance send with no change) still has a
  /// known height for `detach`'s spend-reverting pass.
  transaction_block: HashMap<[u8; 32], Option<BlockInfo>>,
}

/// The transfers container for one wallet (spanning every registered subwallet).
#[derive(Default)]
pub struct TransfersContainer {
  outputs: Vec<OwnedOutput>,
  indices: Indices,
  top_height: u64,
  /// This wallet's own transaction history, keyed by hash, independent of the owned-output
  /// bookkeeping above.
  history: HashMap<[u8; 32], crate::history::WalletTransaction>,
}

impl TransfersContainer {
  /// Construct an empty container.
  pub fn new() -> Self {
    Self::default()
  }

  /// Record a transaction's owned outputs and any inputs it spends. `block` is `None` for a pool
  /// (unconfirmed) transaction. Idempotent per `(block.is_some(), transaction_hash)`: calling
  /// again with the same confirmation status is a no-op; calling again with a different status
  /// fails with [`TransfersError::ConflictingTransactionState`] (use
  /// [`Self::mark_transaction_confirmed`] to promote a transaction instead).
  pub fn add_transaction(
    &mut self,
    transaction_hash: [u8; 32],
    block: Option<BlockInfo>,
    owned: Vec<OwnedOutput>,
    spent_inputs: &[SpentInput],
  ) -> Result<(), TransfersError> {
    if let Some(&first) = self.indices.by_transaction.get(&transaction_hash).and_then(|v| v.first()) {
      let existing_confirmed = self.outputs[first].block.is_some();
      if existing_confirmed != block.is_some() {
        return Err(TransfersError::ConflictingTransactionState);
      }
      return Ok(());
    }

    let mut indices = Vec::with_capacity(owned.len());
    for mut output in owned {
      output.transaction_hash = transaction_hash;
      output.block = block;
      output.state = if block.is_some() { TransferState::Available } else { TransferState::Unconfirmed };
      output.visible = true;
      output.seen_unconfirmed_first = block.is_none();

      let idx = self.outputs.len();
      if let Some(key_image) = output.key_image {
        if let Some(&colliding) = self.indices.by_key_image.get(&key_image) {
          self.outputs[colliding].visible = false;
        }
        self.indices.by_key_image.insert(key_image, idx);
      }
      indices.push(idx);
      self.outputs.push(output);
    }
    self.indices.by_transaction.insert(transaction_hash, indices);
    self.indices.transaction_block.insert(transaction_hash, block);

    for input in spent_inputs {
      if let Some(&idx) = self.indices.by_key_image.get(&input.key_image) {
        self.outputs[idx].state = TransferState::Spent;
        self.outputs[idx].spending_transaction_hash = Some(transaction_hash);
      }
    }
    Ok(())
  }

  /// Remove a transaction and all its outputs, but only while unconfirmed. A confirmed
  /// transaction is untouched.
  pub fn delete_unconfirmed_transaction(&mut self, transaction_hash: [u8; 32]) {
    let Some(indices) = self.indices.by_transaction.get(&transaction_hash).cloned() else { return };
    if indices.iter().any(|&i| self.outputs[i].block.is_some()) {
      return;
    }
    for &idx in &indices {
      if let Some(key_image) = self.outputs[idx].key_image {
        self.indices.by_key_image.remove(&key_image);
      }
    }
    self.indices.by_transaction.remove(&transaction_hash);
    self.indices.transaction_block.remove(&transaction_hash);
    self.retain_outputs(&indices);
  }

  /// Promote every output of `transaction_hash` from unconfirmed to available, assigning each its
  /// global index in output order.
  pub fn mark_transaction_confirmed(
    &mut self,
    transaction_hash: [u8; 32],
    block: BlockInfo,
    global_indices: &[u64],
  ) -> Result<(), TransfersError> {
    let indices = self
      .indices
      .by_transaction
      .get(&transaction_hash)
      .cloned()
      .ok_or(TransfersError::UnknownTransaction)?;
    if indices.len() != global_indices.len() {
      return Err(TransfersError::GlobalIndexCountMismatch);
    }
    for (&idx, &global_index) in indices.iter().zip(global_indices) {
      let output = &mut self.outputs[idx];
      output.block = Some(block);
      output.global_index = Some(global_index);
      if output.state == TransferState::Unconfirmed {
        output.state = TransferState::Available;
      }
    }
    self.indices.transaction_block.insert(transaction_hash, Some(block));
    Ok(())
  }

  /// Roll back every state change caused by blocks at `height` or above. Returns the hashes of
  /// transactions that became entirely absent (those whose outputs were created directly in a
  /// detached block, as opposed to having been seen unconfirmed first).
  ///
  /// Idempotent: calling `detach(h)` twice in a row has the same effect as once, since the second
  /// call finds nothing left confirmed at or above `h`.
  pub fn detach(&mut self, height: u64) -> Vec<[u8; 32]> {
    // Pass 1: undo spends whose spending transaction was confirmed at or above `height`. Looked
    // up via `transaction_block`, not a spending transaction's own owned-output list, since a
    // transaction that only spends (no change, no other owned output) has an empty entry there.
    let spending_heights: HashMap<[u8; 32], Option<u64>> = self
      .indices
      .transaction_block
      .iter()
      .map(|(&hash, block)| (hash, block.map(|b| b.height)))
      .collect();
    for output in self.outputs.iter_mut() {
      if output.state != TransferState::Spent {
        continue;
      }
      let Some(spending_hash) = output.spending_transaction_hash else { continue };
      if spending_heights.get(&spending_hash).copied().flatten().is_some_and(|h| h >= height) {
        output.state = TransferState::Available;
        output.spending_transaction_hash = None;
      }
    }

    // Pass 2: revert or remove outputs confirmed at or above `height`.
    let mut to_remove = Vec::new();
    for (idx, output) in self.outputs.iter_mut().enumerate() {
      let Some(block) = output.block else { continue };
      if block.height < height {
        continue;
      }
      if output.seen_unconfirmed_first {
        output.block = None;
        output.global_index = None;
        output.state = TransferState::Unconfirmed;
      } else {
        to_remove.push(idx);
      }
    }

    let mut removed_transactions = Vec::new();
    if !to_remove.is_empty() {
      let to_remove_set: std::collections::HashSet<usize> = to_remove.iter().copied().collect();
      for (&hash, idxs) in &self.indices.by_transaction {
        if !idxs.is_empty() && idxs.iter().all(|i| to_remove_set.contains(i)) {
          removed_transactions.push(hash);
        }
      }
      for hash in &removed_transactions {
        self.indices.by_transaction.remove(hash);
        self.indices.transaction_block.remove(hash);
      }
      for &idx in &to_remove {
        if let Some(key_image) = self.outputs[idx].key_image {
          self.indices.by_key_image.remove(&key_image);
        }
      }
      self.retain_outputs(&to_remove);
    }

    // A transaction that was reverted to unconfirmed above (or that had no owned outputs at all,
    // e.g. a pure spend) still needs its own `transaction_block` entry rolled back so the next
    // `detach` call's Pass 1 doesn't keep treating it as confirmed at the old height.
    for block in self.indices.transaction_block.values_mut() {
      if block.is_some_and(|b| b.height >= height) {
        *block = None;
      }
    }

    if height <= self.top_height {
      self.top_height = height.saturating_sub(1);
    }
    removed_transactions
  }

  /// Record the chain's new top height.
  pub fn advance_height(&mut self, height: u64) {
    self.top_height = height;
  }

  /// Sum the amount of every visible output matching `flags`, given `spendable_age` and the
  /// current time for unlock evaluation.
  pub fn balance(&self, flags: BalanceFlags, spendable_age: u64, now_unix_time: u64) -> u64 {
    self
      .outputs
      .iter()
      .filter(|o| o.visible && matches!(o.state, TransferState::Available | TransferState::Unconfirmed))
      .filter(|o| {
        // `is_spendable` is false for an unconfirmed output (no confirmation block yet), so it
        // always lands in the locked bucket here rather than the unlocked one.
        let unlocked = self.is_spendable(o, spendable_age, now_unix_time);
        (unlocked && flags.unlocked) || (!unlocked && flags.locked)
      })
      .map(|o| o.amount)
      .sum()
  }

  fn is_spendable(&self, output: &OwnedOutput, spendable_age: u64, now_unix_time: u64) -> bool {
    let Some(block) = output.block else { return false };
    let confirmations = self.top_height.saturating_sub(block.height) + 1;
    let timelock = cn_core::transaction::Timelock::from_raw(output.unlock_time);
    confirmations >= spendable_age && timelock.is_unlocked(self.top_height, now_unix_time)
  }

  /// Every visible output currently in a given state.
  pub fn outputs_in_state(&self, state: TransferState) -> impl Iterator<Item = &OwnedOutput> {
    self.outputs.iter().filter(move |o| o.visible && o.state == state)
  }

  /// Whether a key image matches a previously-recorded owned output, i.e. whether a transaction
  /// presenting it as an input is actually spending one of ours.
  pub fn has_known_key_image(&self, key_image: &CompressedPoint) -> bool {
    self.indices.by_key_image.contains_key(key_image)
  }

  /// Record a wallet-level history entry for one of this wallet's own transactions.
  pub fn record_wallet_transaction(&mut self, entry: crate::history::WalletTransaction) {
    self.history.insert(entry.hash, entry);
  }

  /// Look up a wallet-level history entry by hash.
  pub fn wallet_transaction(&self, hash: &[u8; 32]) -> Option<&crate::history::WalletTransaction> {
    self.history.get(hash)
  }

  /// Every wallet-level history entry, in no particular order.
  pub fn wallet_transactions(&self) -> impl Iterator<Item = &crate::history::WalletTransaction> {
    self.history.values()
  }

  /// Update a history entry's state in place, a no-op if no entry exists for `hash`.
  pub fn set_wallet_transaction_state(&mut self, hash: &[u8; 32], state: crate::history::WalletTransactionState) {
    if let Some(entry) = self.history.get_mut(hash) {
      entry.state = state;
    }
  }

  /// Visible, AVAILABLE outputs that satisfy the spendable-age and unlock-time constraints —
  /// exactly the candidate pool the transaction builder selects inputs from.
  pub fn spendable_outputs(&self, spendable_age: u64, now_unix_time: u64) -> impl Iterator<Item = &OwnedOutput> {
    self
      .outputs
      .iter()
      .filter(|o| o.visible && o.state == TransferState::Available)
      .filter(move |o| self.is_spendable(o, spendable_age, now_unix_time))
  }

  /// Every output ever recorded for a transaction hash, visible or not.
  pub fn outputs_for_transaction(&self, transaction_hash: &[u8; 32]) -> Vec<&OwnedOutput> {
    self
      .indices
      .by_transaction
      .get(transaction_hash)
      .map(|idxs| idxs.iter().map(|&i| &self.outputs[i]).collect())
      .unwrap_or_default()
  }

  /// Drop every output owned by `spend_public`, used when a subwallet is deleted.
  pub fn evict_subwallet(&mut self, spend_public: &CompressedPoint) {
    let drop_indices: Vec<usize> = self
      .outputs
      .iter()
      .enumerate()
      .filter(|(_, o)| o.spend_public == *spend_public)
      .map(|(i, _)| i)
      .collect();
    for &idx in &drop_indices {
      if let Some(key_image) = self.outputs[idx].key_image {
        self.indices.by_key_image.remove(&key_image);
      }
    }
    self.retain_outputs(&drop_indices);
  }

  fn retain_outputs(&mut self, drop_indices: &[usize]) {
    let drop: std::collections::HashSet<usize> = drop_indices.iter().copied().collect();
    let old_outputs = std::mem::take(&mut self.outputs);
    let mut remap = HashMap::new();
    for (old_idx, output) in old_outputs.into_iter().enumerate() {
      if drop.contains(&old_idx) {
        continue;
      }
      remap.insert(old_idx, self.outputs.len());
      self.outputs.push(output);
    }
    for idx in self.indices.by_key_image.values_mut() {
      if let Some(&new_idx) = remap.get(idx) {
        *idx = new_idx;
      }
    }
    for idxs in self.indices.by_transaction.values_mut() {
      idxs.retain(|i| remap.contains_key(i));
      for i in idxs.iter_mut() {
        *i = remap[i];
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn sample_output(tx_hash: [u8; 32], key_image: CompressedPoint, amount: u64) -> OwnedOutput {
    OwnedOutput {
      transaction_hash: tx_hash,
      index_in_transaction: 0,
      spend_public: CompressedPoint::G,
      one_time_key: CompressedPoint::G,
      tx_public_key: CompressedPoint::G,
      key_image: Some(key_image),
      amount,
      unlock_time: 0,
      global_index: None,
      block: None,
      state: TransferState::Unconfirmed,
      spending_transaction_hash: None,
      visible: true,
      seen_unconfirmed_first: true,
    }
  }

  #[test]
  fn add_confirm_and_balance() {
    let mut container = TransfersContainer::new();
    let key_image = CompressedPoint::from([7u8; 32]);
    container.add_transaction([1; 32], None, vec![sample_output([1; 32], key_image, 100)], &[]).unwrap();
    // Still unconfirmed: counts as locked, not unlocked.
    assert_eq!(container.balance(BalanceFlags::LOCKED, 10, 0), 100);
    assert_eq!(container.balance(BalanceFlags::UNLOCKED, 10, 0), 0);

    container.mark_transaction_confirmed([1; 32], BlockInfo { height: 1000, timestamp: 0 }, &[5]).unwrap();
    container.advance_height(1000);
    assert_eq!(container.balance(BalanceFlags::LOCKED, 10, 0), 100);
    assert_eq!(container.balance(BalanceFlags::UNLOCKED, 10, 0), 0);

    container.advance_height(1010);
    assert_eq!(container.balance(BalanceFlags::UNLOCKED, 10, 0), 100);
  }

  #[test]
  fn unconfirmed_change_counts_as_locked_immediately() {
    // Mirrors sending away most of a balance: the change output is recorded unconfirmed the
    // moment the transaction is relayed, before the node has confirmed it in a block, and must
    // already show up as locked.
    let mut container = TransfersContainer::new();
    let key_image = CompressedPoint::from([3u8; 32]);
    container.add_transaction([9; 32], None, vec![sample_output([9; 32], key_image, 39)], &[]).unwrap();
    assert_eq!(container.balance(BalanceFlags::LOCKED, 10, 0), 39);
    assert_eq!(container.balance(BalanceFlags::ALL, 10, 0), 39);
  }

  #[test]
  fn detach_is_idempotent_and_reverts_confirmation() {
    let mut container = TransfersContainer::new();
    let key_image = CompressedPoint::from([7u8; 32]);
    container.add_transaction([1; 32], None, vec![sample_output([1; 32], key_image, 100)], &[]).unwrap();
    container.mark_transaction_confirmed([1; 32], BlockInfo { height: 1000, timestamp: 0 }, &[5]).unwrap();
    container.advance_height(1010);
    assert_eq!(container.balance(BalanceFlags::ALL, 10, 0), 100);

    let removed_once = container.detach(1000);
    // Reverted to unconfirmed, not removed (it was seen unconfirmed first) — still counts toward
    // balance, but only as locked.
    assert_eq!(container.balance(BalanceFlags::UNLOCKED, 10, 0), 0);
    assert_eq!(container.balance(BalanceFlags::LOCKED, 10, 0), 100);
    let removed_twice = container.detach(1000);
    assert!(removed_twice.is_empty() || removed_twice == removed_once);
  }

  #[test]
  fn colliding_key_images_hide_the_older_output() {
    let mut container = TransfersContainer::new();
    let key_image = CompressedPoint::from([9u8; 32]);
    container.add_transaction([1; 32], None, vec![sample_output([1; 32], key_image, 50)], &[]).unwrap();
    container.add_transaction(
      [2; 32],
      Some(BlockInfo { height: 10, timestamp: 0 }),
      vec![sample_output([2; 32], key_image, 50)],
      &[],
    ).unwrap();
    assert_eq!(container.outputs_in_state(TransferState::Unconfirmed).count(), 0);
    assert_eq!(container.outputs_in_state(TransferState::Available).count(), 1);
  }
}
