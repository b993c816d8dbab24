//! The transfers consumer (C6): turns a stream of blocks/pool transactions into owned-output
//! records, driven by one view secret key and the set of subwallets sharing it.

use std::collections::{HashMap, HashSet};

use cn_core::primitives::{derivation_to_scalar, derive_public_key, generate_key_derivation, generate_key_image};
use cn_core::transaction::{Input, Transaction};
use cn_curve::{CompressedPoint, Point, Scalar};

use crate::node::WalletBlockInfo;
use crate::subwallet::SubwalletRegistry;
use crate::transfers::{BlockInfo, OwnedOutput, SpentInput, TransfersContainer};

/// Extract the first transaction public key `R` from a transaction's `extra` field.
///
/// `extra` is a sequence of `tag | length-or-fixed-size | payload` tlv-ish entries; tag `0x01` is
/// a single 32-byte public key. Anything else is skipped byte-by-byte until a `0x01` tag is found
/// or `extra` is exhausted.
pub fn extract_tx_public_key(extra: &[u8]) -> Option<CompressedPoint> {
  let mut i = 0;
  while i < extra.len() {
    match extra[i] {
      0x01 => {
        let bytes = extra.get(i + 1..i + 33)?;
        return Some(CompressedPoint::from(<[u8; 32]>::try_from(bytes).ok()?));
      }
      0x00 => i += 1,
      0x02 => {
        let len = *extra.get(i + 1)? as usize;
        i += 2 + len;
      }
      _ => i += 1,
    }
  }
  None
}

/// Scans blocks and pool transactions for outputs owned by a fixed set of subwallets, and feeds
/// discovered outputs and detected spends into a [`TransfersContainer`].
pub struct TransfersConsumer {
  /// Deduplicates `(transaction_hash, output_public_key)` pairs already processed, so a
  /// transaction observed through both the pool and a block during a reorg window is only scanned
  /// once.
  seen_outputs: HashSet<([u8; 32], CompressedPoint)>,
}

impl Default for TransfersConsumer {
  fn default() -> Self {
    Self::new()
  }
}

impl TransfersConsumer {
  /// Construct an empty consumer.
  pub fn new() -> Self {
    TransfersConsumer { seen_outputs: HashSet::new() }
  }

  /// Scan one transaction for outputs owned by any subwallet in `registry`, and any key images it
  /// presents that are known to the container.
  fn scan_transaction(
    &mut self,
    registry: &SubwalletRegistry,
    container: &TransfersContainer,
    tx: &Transaction,
    tx_hash: [u8; 32],
  ) -> (Vec<OwnedOutput>, Vec<SpentInput>) {
    let mut owned = Vec::new();
    if let Some(r) = extract_tx_public_key(&tx.extra) {
      if let Some(r_point) = r.decompress() {
        let derivation = generate_key_derivation(&r_point, registry.view_secret());
        for (i, output) in tx.outputs.iter().enumerate() {
          if !self.seen_outputs.insert((tx_hash, output.key)) {
            continue;
          }
          let Some(candidate) = derive_spend_candidate(&derivation, i as u64, &output.key) else { continue };
          let Some(subwallet) = registry.get(&candidate) else { continue };

          let key_image = subwallet.spend_secret.as_deref().and_then(|spend_secret| {
            let offset = derivation_to_scalar(&derivation, i as u64);
            let one_time_secret = spend_secret.add(&offset);
            generate_key_image(&output.key, &one_time_secret)
          });

          owned.push(OwnedOutput {
            transaction_hash: tx_hash,
            index_in_transaction: i,
            spend_public: candidate,
            one_time_key: output.key,
            tx_public_key: r,
            key_image,
            amount: output.amount,
            unlock_time: match tx.unlock_time {
              cn_core::transaction::Timelock::None => 0,
              cn_core::transaction::Timelock::Block(h) => h,
              cn_core::transaction::Timelock::Time(t) => t,
            },
            global_index: None,
            block: None,
            state: crate::transfers::TransferState::Unconfirmed,
            spending_transaction_hash: None,
            visible: true,
            seen_unconfirmed_first: true,
          });
        }
      }
    }

    let mut spent = Vec::new();
    for input in &tx.inputs {
      if let Input::ToKey { key_image, .. } = input {
        if container.has_known_key_image(key_image) {
          spent.push(SpentInput { key_image: *key_image });
        }
      }
    }
    (owned, spent)
  }

  /// Process a contiguous range of newly-delivered blocks, in ascending height order.
  pub fn on_new_blocks(
    &mut self,
    registry: &SubwalletRegistry,
    container: &mut TransfersContainer,
    blocks: &[WalletBlockInfo],
    global_indexes: &HashMap<[u8; 32], Vec<u64>>,
  ) {
    for block in blocks {
      let block_info = BlockInfo { height: block.height, timestamp: block.timestamp };
      for tx in &block.transactions {
        let tx_hash = tx.hash();
        let (owned, spent) = self.scan_transaction(registry, container, tx, tx_hash);
        if owned.is_empty() && spent.is_empty() && !container.outputs_for_transaction(&tx_hash).is_empty() {
          if let Some(indices) = global_indexes.get(&tx_hash) {
            let _ = container.mark_transaction_confirmed(tx_hash, block_info, indices);
          }
          continue;
        }
        if !owned.is_empty() || !spent.is_empty() {
          let _ = container.add_transaction(tx_hash, Some(block_info), owned, &spent);
          if let Some(indices) = global_indexes.get(&tx_hash) {
            let _ = container.mark_transaction_confirmed(tx_hash, block_info, indices);
          }
        }
      }
      container.advance_height(block.height);
    }
  }

  /// Process a pool delta: newly added transactions are scanned and recorded unconfirmed; deleted
  /// ones are dropped from the unconfirmed set.
  pub fn on_pool_updated(
    &mut self,
    registry: &SubwalletRegistry,
    container: &mut TransfersContainer,
    added: &[Transaction],
    deleted: &[[u8; 32]],
  ) {
    for tx in added {
      let tx_hash = tx.hash();
      let (owned, spent) = self.scan_transaction(registry, container, tx, tx_hash);
      if !owned.is_empty() || !spent.is_empty() {
        let _ = container.add_transaction(tx_hash, None, owned, &spent);
      }
    }
    for &tx_hash in deleted {
      container.delete_unconfirmed_transaction(tx_hash);
    }
  }

  /// Delegate a chain reorg to the container.
  pub fn on_blockchain_detach(&mut self, container: &mut TransfersContainer, height: u64) -> Vec<[u8; 32]> {
    container.detach(height)
  }
}

/// `B' = output_key - Hs(D‖i)·G`; returns it so the caller can check it against a known spend
/// public key.
fn derive_spend_candidate(derivation: &Point, index: u64, output_key: &CompressedPoint) -> Option<CompressedPoint> {
  let offset_scalar = derivation_to_scalar(derivation, index);
  let offset_point = Point::mul_base(&offset_scalar);
  let output_point = output_key.decompress()?;
  Some(output_point.sub(&offset_point).compress())
}

#[cfg(test)]
mod tests {
  use super::*;
  use cn_core::transaction::{Output, Timelock};
  use rand_chacha::{rand_core::SeedableRng, ChaCha8Rng};

  fn build_tx_to(spend_public: CompressedPoint, view_public: CompressedPoint, amount: u64) -> Transaction {
    let mut rng = ChaCha8Rng::seed_from_u64(42);
    let r = Scalar::random(&mut rng);
    let r_point = Point::mul_base(&r).compress();
    let view_point = view_public.decompress().unwrap();
    let derivation = Point::mul(&view_point, &r);
    let one_time_key = derive_public_key(&derivation, 0, &spend_public.decompress().unwrap());

    let mut extra = vec![0x01];
    extra.extend_from_slice(&r_point.to_bytes());

    Transaction {
      unlock_time: Timelock::None,
      inputs: vec![Input::Gen(1000)],
      outputs: vec![Output { amount, key: one_time_key.compress() }],
      extra,
      signatures: vec![],
    }
  }

  #[test]
  fn discovers_owned_output() {
    let view_secret = Scalar::hash(b"view");
    let mut registry = SubwalletRegistry::new(18, view_secret);
    let spend_secret = Scalar::hash(b"spend");
    let spend_public = Point::mul_base(&spend_secret).compress();
    registry.add_subwallet(Some(spend_secret), spend_public, 0, 0, true).unwrap();

    let tx = build_tx_to(spend_public, registry.view_public(), 500);
    let mut consumer = TransfersConsumer::new();
    let mut container = TransfersContainer::new();
    let block = WalletBlockInfo {
      block_hash: [1; 32],
      height: 1000,
      header: cn_core::block::BlockHeader {
        major_version: 1,
        minor_version: 0,
        timestamp: 0,
        prev_block_hash: [0; 32],
        nonce: 0,
      },
      timestamp: 0,
      transactions: vec![tx],
    };
    consumer.on_new_blocks(&registry, &mut container, &[block], &HashMap::new());
    assert_eq!(container.outputs_in_state(crate::transfers::TransferState::Available).count(), 1);
  }

  #[test]
  fn extracts_tx_public_key() {
    let key = CompressedPoint::G;
    let mut extra = vec![0x01];
    extra.extend_from_slice(&key.to_bytes());
    extra.push(0x02);
    extra.push(3);
    extra.extend_from_slice(&[9, 9, 9]);
    assert_eq!(extract_tx_public_key(&extra), Some(key));
  }
}
