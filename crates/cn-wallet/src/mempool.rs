//! The mempool cleaner (C9): evicts pool transactions this wallet tracks once they're stale,
//! oversized, or violate the current mixin policy, remembering what it deleted so a deleted
//! transaction can't be immediately re-pushed.

use std::collections::HashMap;
use std::time::Duration;

use cn_core::transaction::Transaction;

use crate::config::WalletConfig;

/// One pool transaction this wallet is tracking for cleanup purposes.
#[derive(Debug, Clone)]
pub struct TrackedTransaction {
  /// The transaction itself.
  pub transaction: Transaction,
  /// When this wallet first observed it in the pool, in seconds since the epoch.
  pub receive_time: u64,
}

/// Attempt to parse a "boxed" timestamp out of a transaction's `extra` field: skip a fixed-length
/// prefix (the transaction public key tag, if present) and look for an embedded `"t":<number>`
/// token in the remainder, treated as best-effort application payload. Never fails outward —
/// unparseable `extra` yields `0`, exactly as a transaction with no boxed timestamp would.
fn parse_boxed_age(extra: &[u8], now: u64) -> i64 {
  const PREFIX_SKIP: usize = 33; // tag byte + 32-byte public key, if present
  let search_region = if extra.len() > PREFIX_SKIP { &extra[PREFIX_SKIP..] } else { extra };

  let Ok(text) = std::str::from_utf8(search_region) else { return 0 };
  let Some(key_pos) = text.find("\"t\":") else { return 0 };
  let digits_start = key_pos + 4;
  let digits: String = text[digits_start..].chars().take_while(|c| c.is_ascii_digit()).collect();
  let Ok(boxed_timestamp) = digits.parse::<i64>() else { return 0 };

  now as i64 - boxed_timestamp
}

/// The mempool cleaner's state: the "recently deleted" memory preventing an evicted transaction
/// from being immediately re-pushed.
#[derive(Default)]
pub struct MempoolCleaner {
  recently_deleted: HashMap<[u8; 32], u64>,
}

impl MempoolCleaner {
  /// Construct an empty cleaner.
  pub fn new() -> Self {
    Self::default()
  }

  /// Whether `tx_hash` is still within its re-push cooldown.
  pub fn is_recently_deleted(&self, tx_hash: &[u8; 32], now: u64, timeout: Duration) -> bool {
    self
      .recently_deleted
      .get(tx_hash)
      .is_some_and(|&deleted_at| now.saturating_sub(deleted_at) < timeout.as_secs())
  }

  /// Run one cleaning pass over `tracked`, returning the hashes evicted this cycle.
  ///
  /// A transaction is evicted when its age exceeds the pool lifetime, its `extra` field is
  /// oversized, its boxed age (a best-effort parse of an application-layer timestamp embedded in
  /// `extra`) exceeds the pool lifetime or is negative, or it no longer satisfies the mixin policy
  /// at `current_height`.
  pub fn clean(
    &mut self,
    tracked: &HashMap<[u8; 32], TrackedTransaction>,
    config: &WalletConfig,
    current_height: u64,
    now: u64,
  ) -> Vec<[u8; 32]> {
    let mut evicted = Vec::new();
    for (hash, entry) in tracked {
      let age = now.saturating_sub(entry.receive_time);
      let boxed_age = parse_boxed_age(&entry.transaction.extra, now);

      let stale = age >= config.pool_lifetime.as_secs();
      let oversized = entry.transaction.extra.len() > config.max_extra_size;
      let boxed_stale = boxed_age >= config.pool_lifetime.as_secs() as i64;
      // Inherited from the original pool cleaner: a negative boxed age evicts the transaction.
      // The original guards against future-dated transactions but documents no intentional
      // policy beyond that; preserved verbatim rather than second-guessed.
      let boxed_future_dated = boxed_age < 0;
      let fails_mixin = !mixin_policy_satisfied(&entry.transaction, config, current_height);

      if stale || oversized || boxed_stale || boxed_future_dated || fails_mixin {
        evicted.push(*hash);
        self.recently_deleted.insert(*hash, now);
      }
    }
    evicted
  }
}

fn mixin_policy_satisfied(tx: &Transaction, config: &WalletConfig, height: u64) -> bool {
  let range = config.mixin_range_at(height);
  tx.inputs.iter().all(|input| {
    let ring_size = input.ring_size();
    if ring_size == 0 {
      return true; // coinbase
    }
    let mixin = (ring_size - 1) as u64;
    mixin >= range.min && mixin <= range.max
  })
}

#[cfg(test)]
mod tests {
  use super::*;
  use cn_core::transaction::{Input, Output, Timelock};
  use cn_curve::{Point, Scalar};

  fn sample_tx(extra: Vec<u8>) -> Transaction {
    Transaction {
      unlock_time: Timelock::None,
      inputs: vec![Input::ToKey { amount: 100, key_offsets: vec![1, 2, 3, 4], key_image: cn_curve::CompressedPoint::G }],
      outputs: vec![Output { amount: 99, key: Point::mul_base(&Scalar::hash(b"x")).compress() }],
      extra,
      signatures: vec![],
    }
  }

  #[test]
  fn evicts_stale_transactions() {
    let config = WalletConfig::default();
    let mut tracked = HashMap::new();
    let hash = [1; 32];
    tracked.insert(hash, TrackedTransaction { transaction: sample_tx(vec![]), receive_time: 0 });

    let mut cleaner = MempoolCleaner::new();
    let evicted = cleaner.clean(&tracked, &config, 0, config.pool_lifetime.as_secs() + 1);
    assert_eq!(evicted, vec![hash]);
    assert!(cleaner.is_recently_deleted(&hash, config.pool_lifetime.as_secs() + 1, config.recently_deleted_timeout));
  }

  #[test]
  fn keeps_fresh_transactions() {
    let config = WalletConfig::default();
    let mut tracked = HashMap::new();
    let hash = [2; 32];
    tracked.insert(hash, TrackedTransaction { transaction: sample_tx(vec![]), receive_time: 100 });

    let mut cleaner = MempoolCleaner::new();
    let evicted = cleaner.clean(&tracked, &config, 0, 101);
    assert!(evicted.is_empty());
  }

  #[test]
  fn negative_boxed_age_evicts() {
    let config = WalletConfig::default();
    let mut tracked = HashMap::new();
    let hash = [3; 32];
    let mut extra = vec![0x01];
    extra.extend_from_slice(&[0u8; 32]);
    extra.extend_from_slice(br#"{"t":99999999999}"#);
    tracked.insert(hash, TrackedTransaction { transaction: sample_tx(extra), receive_time: 100 });

    let mut cleaner = MempoolCleaner::new();
    let evicted = cleaner.clean(&tracked, &config, 0, 101);
    assert_eq!(evicted, vec![hash]);
  }
}
