//! The CryptoNote variant of base58: fixed-size 8-byte blocks encode to fixed-size 11-character
//! blocks (a final short block uses a shorter target length), rather than standard Bitcoin-style
//! base58's single leading-zero-preserving integer encoding.

use thiserror::Error;

const ALPHABET: &[u8; 58] = b"123456789ABCDEFGHJKLMNPQRSTUVWXYZabcdefghijkmnopqrstuvwxyz";
const FULL_BLOCK_SIZE: usize = 8;
const FULL_ENCODED_BLOCK_SIZE: usize = 11;

/// For a partial final block of `n` input bytes (`1..=7`), the number of base58 characters it
/// encodes to. Index `0` is unused; there is no zero-byte partial block.
const ENCODED_BLOCK_SIZES: [usize; 8] = [0, 2, 3, 5, 6, 7, 9, 10];

/// An error decoding a CryptoNote base58 string.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Base58Error {
  /// A character outside the 58-character alphabet was encountered.
  #[error("invalid base58 character")]
  InvalidCharacter,
  /// The final block's length didn't match any entry in the encoded-block-size table.
  #[error("invalid base58 block length")]
  InvalidBlockLength,
  /// A block decoded to a value too large to fit the expected byte width (non-canonical padding).
  #[error("base58 block overflowed its byte width")]
  BlockOverflow,
}

fn alphabet_index(c: u8) -> Result<u64, Base58Error> {
  ALPHABET.iter().position(|&a| a == c).map(|p| p as u64).ok_or(Base58Error::InvalidCharacter)
}

fn encode_block(block: &[u8], encoded_size: usize) -> Vec<u8> {
  let mut num = 0u128;
  for &byte in block {
    num = (num << 8) | u128::from(byte);
  }

  let mut out = vec![ALPHABET[0]; encoded_size];
  for slot in out.iter_mut().rev() {
    *slot = ALPHABET[(num % 58) as usize];
    num /= 58;
  }
  out
}

fn decode_block(block: &[u8], byte_size: usize) -> Result<Vec<u8>, Base58Error> {
  let mut num: u128 = 0;
  for &c in block {
    num = num.checked_mul(58).ok_or(Base58Error::BlockOverflow)?;
    num = num.checked_add(u128::from(alphabet_index(c)?)).ok_or(Base58Error::BlockOverflow)?;
  }

  let bytes = num.to_be_bytes();
  if bytes[..bytes.len() - byte_size].iter().any(|&b| b != 0) {
    return Err(Base58Error::BlockOverflow);
  }
  Ok(bytes[bytes.len() - byte_size..].to_vec())
}

/// Encode `data` as CryptoNote base58.
pub fn encode(data: &[u8]) -> String {
  let mut out = Vec::with_capacity((data.len() / FULL_BLOCK_SIZE + 1) * FULL_ENCODED_BLOCK_SIZE);

  let mut chunks = data.chunks_exact(FULL_BLOCK_SIZE);
  for chunk in &mut chunks {
    out.extend(encode_block(chunk, FULL_ENCODED_BLOCK_SIZE));
  }
  let remainder = chunks.remainder();
  if !remainder.is_empty() {
    out.extend(encode_block(remainder, ENCODED_BLOCK_SIZES[remainder.len()]));
  }

  String::from_utf8(out).expect("base58 alphabet is pure ASCII")
}

/// Decode a CryptoNote base58 string.
pub fn decode(s: &str) -> Result<Vec<u8>, Base58Error> {
  let bytes = s.as_bytes();

  let mut out = Vec::with_capacity((bytes.len() / FULL_ENCODED_BLOCK_SIZE + 1) * FULL_BLOCK_SIZE);

  let mut chunks = bytes.chunks_exact(FULL_ENCODED_BLOCK_SIZE);
  for chunk in &mut chunks {
    out.extend(decode_block(chunk, FULL_BLOCK_SIZE)?);
  }
  let remainder = chunks.remainder();
  if !remainder.is_empty() {
    let byte_size = ENCODED_BLOCK_SIZES
      .iter()
      .position(|&size| size == remainder.len())
      .ok_or(Base58Error::InvalidBlockLength)?;
    out.extend(decode_block(remainder, byte_size)?);
  }

  Ok(out)
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn round_trips_full_blocks() {
    let data = [7u8; 32];
    assert_eq!(decode(&encode(&data)).unwrap(), data);
  }

  #[test]
  fn round_trips_partial_block() {
    for len in 1..=40 {
      let data: Vec<u8> = (0..len).map(|i| i as u8).collect();
      assert_eq!(decode(&encode(&data)).unwrap(), data, "len={len}");
    }
  }

  #[test]
  fn rejects_bad_characters() {
    assert_eq!(decode("0OIl"), Err(Base58Error::InvalidCharacter));
  }

  #[test]
  fn rejects_wrong_final_block_length() {
    // Valid alphabet characters, but 4 isn't one of the table's encoded block sizes.
    assert_eq!(decode("1111"), Err(Base58Error::InvalidBlockLength));
  }
}
