//! Wallet transaction history (§3): the per-relay record the wallet's own callers query back,
//! distinct from the owned-output bookkeeping in [`crate::transfers`].

/// Lifecycle state of one of this wallet's own transactions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WalletTransactionState {
  /// Relayed and accepted.
  Succeeded,
  /// Relay or confirmation failed.
  Failed,
  /// Cancelled before being relayed.
  Cancelled,
  /// Built but not yet relayed (a delayed transaction).
  Created,
  /// Evicted from the pool without ever confirming.
  Deleted,
}

/// The role one transfer within a [`WalletTransaction`] plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferType {
  /// A plain payment to a destination.
  Usual,
  /// A payment tagged as a donation.
  Donation,
  /// Change returned to one of the sender's own subwallets.
  Change,
}

/// One address/amount leg of a [`WalletTransaction`].
#[derive(Debug, Clone)]
pub struct WalletTransfer {
  /// The recipient's address.
  pub address: String,
  /// The amount sent to it.
  pub amount: u64,
  /// What role this leg plays in the transaction.
  pub transfer_type: TransferType,
}

/// Sentinel `block_height` for a transaction that hasn't confirmed yet.
pub const UNCONFIRMED_HEIGHT: u64 = u64::MAX;

/// A wallet-level history record for one of this wallet's own transactions.
#[derive(Debug, Clone)]
pub struct WalletTransaction {
  /// The transaction's hash.
  pub hash: [u8; 32],
  /// Its current lifecycle state.
  pub state: WalletTransactionState,
  /// Confirmation height, or [`UNCONFIRMED_HEIGHT`] while unconfirmed.
  pub block_height: u64,
  /// Unix timestamp this record was created or last updated at.
  pub timestamp: u64,
  /// Net effect on this wallet's balance: negative for an outgoing transaction.
  pub total_amount: i64,
  /// Fee paid.
  pub fee: u64,
  /// The transaction's raw `unlockTime`.
  pub unlock_time: u64,
  /// The transaction's raw `extra` field.
  pub extra: Vec<u8>,
  /// Whether this is a coinbase transaction.
  pub is_base: bool,
  /// Ordered list of address/amount legs.
  pub transfers: Vec<WalletTransfer>,
}
