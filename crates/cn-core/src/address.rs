//! CryptoNote addresses: a network-prefixed, checksummed base58 encoding of a subwallet's public
//! key pair, optionally extended with a payment id to form an integrated address.

use std::io::Write;

use thiserror::Error;

use cn_curve::CompressedPoint;
use cn_io::VarInt;

use crate::base58::{self, Base58Error};
use crate::primitives::cn_hash;

const CHECKSUM_SIZE: usize = 4;
/// The size of a payment id, as carried by an integrated address.
pub const PAYMENT_ID_SIZE: usize = 32;

/// A decoded CryptoNote address.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct DecodedAddress {
  /// The network/address-format prefix this address was encoded under.
  pub prefix: u64,
  /// The subwallet's spend public key.
  pub spend_public: CompressedPoint,
  /// The subwallet's view public key.
  pub view_public: CompressedPoint,
  /// The embedded payment id, present only for an integrated address.
  pub payment_id: Option<[u8; PAYMENT_ID_SIZE]>,
}

/// An error decoding an address string.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressError {
  /// The string wasn't valid CryptoNote base58.
  #[error("address is not valid base58")]
  NotBase58,
  /// The decoded blob's length doesn't match a plain or integrated address.
  #[error("address has the wrong length")]
  WrongLength,
  /// The trailing 4-byte checksum didn't match.
  #[error("address checksum mismatch")]
  ChecksumMismatch,
}

impl From<Base58Error> for AddressError {
  fn from(_: Base58Error) -> Self {
    AddressError::NotBase58
  }
}

fn checksum(body: &[u8]) -> [u8; CHECKSUM_SIZE] {
  let mut out = [0u8; CHECKSUM_SIZE];
  out.copy_from_slice(&cn_hash(body)[..CHECKSUM_SIZE]);
  out
}

/// Encode a plain address: `prefix || spend_public || view_public || checksum`.
pub fn encode_address(prefix: u64, spend_public: &CompressedPoint, view_public: &CompressedPoint) -> String {
  encode(prefix, spend_public, view_public, None)
}

/// Encode an integrated address: `prefix || spend_public || view_public || payment_id || checksum`.
pub fn encode_integrated_address(
  prefix: u64,
  spend_public: &CompressedPoint,
  view_public: &CompressedPoint,
  payment_id: [u8; PAYMENT_ID_SIZE],
) -> String {
  encode(prefix, spend_public, view_public, Some(payment_id))
}

fn encode(
  prefix: u64,
  spend_public: &CompressedPoint,
  view_public: &CompressedPoint,
  payment_id: Option<[u8; PAYMENT_ID_SIZE]>,
) -> String {
  let mut body = Vec::with_capacity(1 + 32 + 32 + PAYMENT_ID_SIZE);
  VarInt::write(&prefix, &mut body).expect("writing to a Vec cannot fail");
  body.write_all(&spend_public.to_bytes()).expect("writing to a Vec cannot fail");
  body.write_all(&view_public.to_bytes()).expect("writing to a Vec cannot fail");
  if let Some(payment_id) = payment_id {
    body.write_all(&payment_id).expect("writing to a Vec cannot fail");
  }

  let mut full = body.clone();
  full.extend_from_slice(&checksum(&body));
  base58::encode(&full)
}

/// Decode an address, plain or integrated, verifying its checksum.
pub fn decode_address(s: &str) -> Result<DecodedAddress, AddressError> {
  let full = base58::decode(s)?;
  if full.len() < CHECKSUM_SIZE {
    return Err(AddressError::WrongLength);
  }
  let (body, trailer) = full.split_at(full.len() - CHECKSUM_SIZE);
  if trailer != checksum(body) {
    return Err(AddressError::ChecksumMismatch);
  }

  let mut cursor = &body[..];
  let prefix: u64 = VarInt::read(&mut cursor).map_err(|_| AddressError::WrongLength)?;

  let payment_id = match cursor.len() {
    64 => None,
    n if n == 64 + PAYMENT_ID_SIZE => {
      let mut id = [0u8; PAYMENT_ID_SIZE];
      id.copy_from_slice(&cursor[64..]);
      Some(id)
    }
    _ => return Err(AddressError::WrongLength),
  };

  let spend_public = CompressedPoint::from(<[u8; 32]>::try_from(&cursor[..32]).unwrap());
  let view_public = CompressedPoint::from(<[u8; 32]>::try_from(&cursor[32..64]).unwrap());

  Ok(DecodedAddress { prefix, spend_public, view_public, payment_id })
}

#[cfg(test)]
mod tests {
  use super::*;
  use cn_curve::{Point, Scalar};

  fn keys() -> (CompressedPoint, CompressedPoint) {
    (
      Point::mul_base(&Scalar::hash(b"spend")).compress(),
      Point::mul_base(&Scalar::hash(b"view")).compress(),
    )
  }

  #[test]
  fn plain_address_round_trips() {
    let (spend, view) = keys();
    let encoded = encode_address(18, &spend, &view);
    let decoded = decode_address(&encoded).unwrap();
    assert_eq!(decoded.prefix, 18);
    assert_eq!(decoded.spend_public, spend);
    assert_eq!(decoded.view_public, view);
    assert_eq!(decoded.payment_id, None);
  }

  #[test]
  fn integrated_address_round_trips() {
    let (spend, view) = keys();
    let payment_id = [9u8; PAYMENT_ID_SIZE];
    let encoded = encode_integrated_address(19, &spend, &view, payment_id);
    let decoded = decode_address(&encoded).unwrap();
    assert_eq!(decoded.payment_id, Some(payment_id));
  }

  #[test]
  fn corrupted_byte_fails_checksum() {
    let (spend, view) = keys();
    let encoded = encode_address(18, &spend, &view);
    let mut chars: Vec<char> = encoded.chars().collect();
    let last = chars.len() - 1;
    chars[last] = if chars[last] == '1' { '2' } else { '1' };
    let corrupted: String = chars.into_iter().collect();
    assert!(matches!(
      decode_address(&corrupted),
      Err(AddressError::ChecksumMismatch) | Err(AddressError::NotBase58)
    ));
  }
}
