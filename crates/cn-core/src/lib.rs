#![deny(missing_docs)]
//! The CryptoNote wire codec and cryptographic building blocks shared by every wallet subsystem:
//! CN-hash and key-derivation primitives, classic ring signatures, transaction and block
//! serialization, the base58 address codec, and the container file's password-based cipher.

pub mod address;
pub mod base58;
pub mod block;
pub mod container_crypto;
pub mod merkle;
pub mod primitives;
pub mod ring_signatures;
pub mod transaction;

pub use primitives::{
  cn_hash, derivation_to_scalar, derive_public_key, derive_secret_key, generate_key_derivation,
  generate_key_image, hash_to_scalar,
};
pub use ring_signatures::{generate_ring_signature, RingSignature};
