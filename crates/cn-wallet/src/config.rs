//! Tunable constants the rest of the wallet is parameterized over.

use std::time::Duration;

/// A mixin (ring-size minus one) range tied to a protocol height threshold.
#[derive(Debug, Clone, Copy)]
pub struct MixinRange {
  /// The height at or above which this range applies.
  pub height_threshold: u64,
  /// Smallest allowed mixin at this height.
  pub min: u64,
  /// Largest allowed mixin at this height (`u64::MAX` for "no upper bound").
  pub max: u64,
  /// Mixin used by the builder when the caller doesn't specify one.
  pub default: u64,
}

/// Runtime configuration for a [`crate::wallet::Wallet`].
#[derive(Debug, Clone)]
pub struct WalletConfig {
  /// PBKDF2 iteration count for the container cipher. Fixed at container-creation time; an
  /// existing container's own iteration count (stored alongside it, not hardcoded here) always
  /// wins on load — this is only used when creating a brand new container.
  pub pbkdf2_iterations: u32,
  /// How many confirmations an available output needs before it's spendable.
  pub transaction_spendable_age: u64,
  /// How often the synchronizer's idle timer fires to check for new work.
  pub sync_tick_interval: Duration,
  /// How long an unconfirmed pool transaction may sit before the mempool cleaner evicts it.
  pub pool_lifetime: Duration,
  /// How long a hash stays in the "recently deleted" set, rejecting re-insertion.
  pub recently_deleted_timeout: Duration,
  /// Largest allowed `extra` field size before the mempool cleaner evicts a transaction.
  pub max_extra_size: usize,
  /// Mixin ranges in descending height order; the first entry whose `height_threshold` the
  /// current height meets or exceeds applies.
  pub mixin_table: Vec<MixinRange>,
  /// Timeout for `init`'s first node-info round trip before it returns `TIMEOUT` and continues
  /// initializing in the background.
  pub init_timeout: Duration,
}

impl Default for WalletConfig {
  fn default() -> Self {
    WalletConfig {
      pbkdf2_iterations: 500_000,
      transaction_spendable_age: 10,
      sync_tick_interval: Duration::from_secs(5),
      pool_lifetime: Duration::from_secs(24 * 60 * 60),
      recently_deleted_timeout: Duration::from_secs(60 * 60),
      max_extra_size: 1060,
      mixin_table: vec![
        MixinRange { height_threshold: 0, min: 0, max: u64::MAX, default: 3 },
      ],
      init_timeout: Duration::from_secs(10),
    }
  }
}

impl WalletConfig {
  /// Look up the mixin range applying at `height`.
  pub fn mixin_range_at(&self, height: u64) -> MixinRange {
    self
      .mixin_table
      .iter()
      .filter(|range| height >= range.height_threshold)
      .max_by_key(|range| range.height_threshold)
      .copied()
      .unwrap_or(MixinRange { height_threshold: 0, min: 0, max: u64::MAX, default: 3 })
  }

  /// Whether a block-height-unlock-style `unlockTime` (below the timestamp/height split point)
  /// or a unix-timestamp-style one is satisfied.
  pub fn is_unlocked(&self, unlock_time: u64, height: u64, now: u64) -> bool {
    cn_core::transaction::Timelock::from_raw(unlock_time).is_unlocked(height, now)
  }
}
