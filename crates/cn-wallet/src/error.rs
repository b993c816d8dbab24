//! The wallet's error taxonomy: one leaf enum per subsystem, composed into a single
//! `WalletError` the public API returns.

use thiserror::Error;

use cn_core::address::AddressError;
use cn_core::container_crypto::ContainerCryptoError;

/// Errors raised while parsing or validating addresses, payment ids, and related wire formats.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FormatError {
  /// The address string wasn't valid base58.
  #[error("address is not valid base58")]
  AddressNotBase58,
  /// The address decoded but carried an unexpected network prefix.
  #[error("address has the wrong network prefix")]
  AddressWrongPrefix,
  /// The decoded address had the wrong byte length for a plain or integrated address.
  #[error("address has the wrong length")]
  AddressWrongLength,
  /// The address failed its checksum or otherwise isn't a valid address.
  #[error("address is not valid")]
  AddressNotValid,
  /// A hex-encoded key had the wrong length or wasn't valid hex.
  #[error("key is not in the expected format")]
  WrongKeyFormat,
  /// A hex-encoded payment id had the wrong length or wasn't valid hex.
  #[error("payment id is not in the expected format")]
  WrongPaymentIdFormat,
  /// A hex-encoded hash had the wrong length or wasn't valid hex.
  #[error("hash is not in the expected format")]
  WrongHashFormat,
  /// The transaction's `extra` field couldn't be parsed as expected.
  #[error("transaction extra field is malformed")]
  BadTransactionExtra,
  /// A supplied mnemonic seed phrase didn't validate.
  #[error("mnemonic seed phrase is invalid")]
  InvalidMnemonic,
  /// More than one destination carried a distinct payment id, or the explicit payment id
  /// conflicted with one decoded from an integrated address.
  #[error("transaction destinations carry conflicting payment ids")]
  ConflictingPaymentIds,
}

impl From<AddressError> for FormatError {
  fn from(e: AddressError) -> Self {
    match e {
      AddressError::NotBase58 => FormatError::AddressNotBase58,
      AddressError::WrongLength => FormatError::AddressWrongLength,
      AddressError::ChecksumMismatch => FormatError::AddressNotValid,
    }
  }
}

/// Errors raised by the encrypted container (C3).
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerError {
  /// The container file doesn't exist or couldn't be read/written.
  #[error("container I/O failed")]
  Io,
  /// The container failed to decrypt: wrong password, corrupt file, or unsupported format.
  #[error(transparent)]
  Crypto(#[from] ContainerCryptoError),
  /// The decrypted JSON body didn't parse into the expected structure.
  #[error("container body is not valid JSON")]
  MalformedBody,
  /// The container declared a format version this build doesn't understand.
  #[error("unsupported container format version")]
  UnsupportedVersion,
}

/// Errors raised by the subwallet registry (C4).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SubwalletError {
  /// `addSubwallet` was called with a spend public key already present in the registry.
  #[error("a subwallet with this spend key already exists")]
  KeyAlreadyExists,
  /// `isNew` was true alongside a nonzero `scanHeight`, or vice versa — they're mutually
  /// exclusive.
  #[error("isNew and an explicit scan height are mutually exclusive")]
  ConflictingSyncStart,
  /// The address named by a subwallet operation isn't registered.
  #[error("no subwallet is registered for this address")]
  UnknownSubwallet,
  /// The operation requires a spend secret key, but this is a view-only subwallet.
  #[error("subwallet is view-only")]
  ViewOnly,
}

/// Errors raised by the transfers container (C5).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransfersError {
  /// `addTransaction` was called for a transaction already present with a different
  /// confirmation status.
  #[error("transaction already recorded with a conflicting confirmation status")]
  ConflictingTransactionState,
  /// `markTransactionConfirmed` was given a different number of global indices than the
  /// transaction has outputs.
  #[error("global index count does not match output count")]
  GlobalIndexCountMismatch,
  /// The named transaction isn't present in the container.
  #[error("transaction not found")]
  UnknownTransaction,
}

/// Errors raised by the transaction builder (C8).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BuildError {
  /// One or more destination addresses failed to parse.
  #[error(transparent)]
  Format(#[from] FormatError),
  /// The requested ring size (`mixIn + 1`) fell outside the allowed range for the current
  /// height.
  #[error("mixin is outside the allowed range for the current height")]
  MixinOutOfRange,
  /// There weren't enough spendable outputs to cover the requested amount and fee.
  #[error("insufficient spendable balance")]
  InsufficientBalance,
  /// The node didn't return enough distinct decoy outputs to fill a ring.
  #[error("not enough decoy outputs available")]
  NotEnoughDecoys,
  /// A destination amount was zero, or the total of all destinations plus fee overflowed.
  #[error("invalid transaction amount")]
  InvalidAmount,
  /// A node request needed to assemble or relay the transaction (decoys, global indices, relay)
  /// failed.
  #[error(transparent)]
  Node(#[from] NodeError),
}

/// Errors raised by the node abstraction (C7's RPC surface).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NodeError {
  /// The node's transport (whatever it is — HTTP, IPC, in-process mock) failed.
  #[error("node request failed: {0}")]
  Transport(String),
  /// The node's response couldn't be understood.
  #[error("node returned a malformed response")]
  MalformedResponse,
}

/// The wallet's single public error type, composing every subsystem's leaf errors.
#[derive(Error, Debug)]
pub enum WalletError {
  /// See [`FormatError`].
  #[error(transparent)]
  Format(#[from] FormatError),
  /// See [`ContainerError`].
  #[error(transparent)]
  Container(#[from] ContainerError),
  /// See [`SubwalletError`].
  #[error(transparent)]
  Subwallet(#[from] SubwalletError),
  /// See [`TransfersError`].
  #[error(transparent)]
  Transfers(#[from] TransfersError),
  /// See [`BuildError`].
  #[error(transparent)]
  Build(#[from] BuildError),
  /// See [`NodeError`].
  #[error(transparent)]
  Node(#[from] NodeError),
  /// The wallet is shutting down or its dispatcher thread is gone.
  #[error("wallet dispatcher is no longer running")]
  DispatcherStopped,
}
