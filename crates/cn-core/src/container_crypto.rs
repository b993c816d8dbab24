//! Password-based encryption for the wallet container file: PBKDF2-HMAC-SHA256 key derivation
//! over AES-128-CBC with PKCS#7 padding.
//!
//! This format carries no MAC. A wrong password is reported uniformly: a PKCS7 unpadding failure
//! and a mismatched inner magic both map to the same [`ContainerCryptoError::WrongPassword`], so
//! neither is distinguishable from the other by an observer.
//!
//! A future format version should move to an authenticated cipher rather than patching this one.

use aes::cipher::{block_padding::Pkcs7, generic_array::GenericArray, BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use hmac::Hmac;
use pbkdf2::pbkdf2;
use sha2::Sha256;
use thiserror::Error;
use zeroize::Zeroizing;

type Aes128CbcEnc = cbc::Encryptor<aes::Aes128>;
type Aes128CbcDec = cbc::Decryptor<aes::Aes128>;

/// The fixed byte string prefixed to every container file, identifying it as this format.
pub const OUTER_MAGIC: &[u8] = b"CNWLT001";
/// The fixed byte string the plaintext must begin with, letting a wrong password be detected.
pub const INNER_MAGIC: &[u8] = b"CNWLTBODY";

const SALT_SIZE: usize = 16;
const KEY_SIZE: usize = 16;
const IV_SIZE: usize = 16;
const BLOCK_SIZE: usize = 16;

/// An error loading an encrypted container.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerCryptoError {
  /// The file was too short to contain the outer magic, salt, and IV.
  #[error("container file is truncated")]
  Truncated,
  /// The outer magic bytes didn't match.
  #[error("not a recognized wallet container file")]
  WrongOuterMagic,
  /// The ciphertext's length wasn't a multiple of the block size.
  #[error("container ciphertext is malformed")]
  MalformedCiphertext,
  /// Decryption failed, either at the padding step or the inner magic check.
  #[error("wrong password")]
  WrongPassword,
}

/// Derive the AES-128 key for `password` and `salt` via PBKDF2-HMAC-SHA256.
fn derive_key(password: &[u8], salt: &[u8; SALT_SIZE], iterations: u32) -> Zeroizing<[u8; KEY_SIZE]> {
  let mut key = Zeroizing::new([0u8; KEY_SIZE]);
  pbkdf2::<Hmac<Sha256>>(password, salt, iterations, key.as_mut())
    .expect("PBKDF2-HMAC-SHA256 output length is a fixed valid size");
  key
}

/// Encrypt `body` (the container's JSON payload) into a complete container file, generating a
/// fresh salt and IV. The inner magic is prefixed ahead of `body` before PKCS7-padded encryption.
pub fn encrypt(
  rng: &mut (impl rand_core::RngCore + rand_core::CryptoRng),
  password: &[u8],
  iterations: u32,
  body: &[u8],
) -> Vec<u8> {
  let mut salt = [0u8; SALT_SIZE];
  rng.fill_bytes(&mut salt);
  let mut iv = [0u8; IV_SIZE];
  rng.fill_bytes(&mut iv);

  let mut plaintext = Vec::with_capacity(INNER_MAGIC.len() + body.len());
  plaintext.extend_from_slice(INNER_MAGIC);
  plaintext.extend_from_slice(body);

  let key = derive_key(password, &salt, iterations);
  let ciphertext = Aes128CbcEnc::new(GenericArray::from_slice(key.as_ref()), GenericArray::from_slice(&iv))
    .encrypt_padded_vec_mut::<Pkcs7>(&plaintext);

  let mut out = Vec::with_capacity(OUTER_MAGIC.len() + SALT_SIZE + IV_SIZE + ciphertext.len());
  out.extend_from_slice(OUTER_MAGIC);
  out.extend_from_slice(&salt);
  out.extend_from_slice(&iv);
  out.extend_from_slice(&ciphertext);
  out
}

/// Decrypt a container file, verifying the outer magic and deriving the key from `password`.
///
/// Returns the JSON body, or an error identifying which load step (per §4.3 of the container
/// design) failed. A padding failure and an inner-magic mismatch are reported identically as
/// [`ContainerCryptoError::WrongPassword`] so neither leaks which step actually failed.
pub fn decrypt(password: &[u8], iterations: u32, data: &[u8]) -> Result<Vec<u8>, ContainerCryptoError> {
  let header_len = OUTER_MAGIC.len() + SALT_SIZE + IV_SIZE;
  if data.len() < header_len {
    return Err(ContainerCryptoError::Truncated);
  }
  let (outer_magic, rest) = data.split_at(OUTER_MAGIC.len());
  if outer_magic != OUTER_MAGIC {
    return Err(ContainerCryptoError::WrongOuterMagic);
  }

  let (salt, rest) = rest.split_at(SALT_SIZE);
  let (iv, ciphertext) = rest.split_at(IV_SIZE);
  let salt: [u8; SALT_SIZE] = salt.try_into().unwrap();

  if ciphertext.is_empty() || (ciphertext.len() % BLOCK_SIZE != 0) {
    return Err(ContainerCryptoError::MalformedCiphertext);
  }

  let key = derive_key(password, &salt, iterations);
  let plaintext = Aes128CbcDec::new(GenericArray::from_slice(key.as_ref()), GenericArray::from_slice(iv))
    .decrypt_padded_vec_mut::<Pkcs7>(ciphertext)
    .map_err(|_| ContainerCryptoError::WrongPassword)?;

  if !plaintext.starts_with(INNER_MAGIC) {
    return Err(ContainerCryptoError::WrongPassword);
  }

  Ok(plaintext[INNER_MAGIC.len()..].to_vec())
}

#[cfg(test)]
mod tests {
  use super::*;
  use rand_chacha::{rand_core::SeedableRng, ChaCha8Rng};

  #[test]
  fn round_trips_with_correct_password() {
    let mut rng = ChaCha8Rng::seed_from_u64(5);
    let body = br#"{"version":1}"#;
    let container = encrypt(&mut rng, b"hunter2", 1000, body);
    let recovered = decrypt(b"hunter2", 1000, &container).unwrap();
    assert_eq!(recovered, body);
  }

  #[test]
  fn wrong_password_is_detected() {
    let mut rng = ChaCha8Rng::seed_from_u64(5);
    let container = encrypt(&mut rng, b"hunter2", 1000, br#"{"version":1}"#);
    assert_eq!(decrypt(b"wrong", 1000, &container), Err(ContainerCryptoError::WrongPassword));
  }

  #[test]
  fn truncated_file_is_rejected() {
    assert_eq!(decrypt(b"hunter2", 1000, b"short"), Err(ContainerCryptoError::Truncated));
  }

  #[test]
  fn wrong_outer_magic_is_rejected() {
    let mut rng = ChaCha8Rng::seed_from_u64(5);
    let mut container = encrypt(&mut rng, b"hunter2", 1000, br#"{"version":1}"#);
    container[0] ^= 0xff;
    assert_eq!(decrypt(b"hunter2", 1000, &container), Err(ContainerCryptoError::WrongOuterMagic));
  }

  #[test]
  fn body_spanning_multiple_blocks_round_trips() {
    let mut rng = ChaCha8Rng::seed_from_u64(6);
    let body = vec![7u8; 500];
    let container = encrypt(&mut rng, b"hunter2", 1000, &body);
    assert_eq!(decrypt(b"hunter2", 1000, &container).unwrap(), body);
  }
}
