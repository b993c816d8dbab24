//! CN-hash and the key-derivation relations shared by output scanning, address generation, and
//! transaction signing.

use sha3::{Digest, Keccak256};

use cn_curve::{CompressedPoint, Point, Scalar};

/// The CryptoNote hash function: Keccak-256 over an arbitrary byte string.
pub fn cn_hash(data: impl AsRef<[u8]>) -> [u8; 32] {
  Keccak256::digest(data.as_ref()).into()
}

/// `H_s(data) = keccak256(data) mod l`, used wherever the protocol hashes to a scalar.
pub fn hash_to_scalar(data: impl AsRef<[u8]>) -> Scalar {
  Scalar::hash(data)
}

/// `D = v * R`: the shared-secret ECDH performed between a recipient's view key and a
/// transaction's ephemeral public key.
pub fn generate_key_derivation(tx_public_key: &Point, view_secret: &Scalar) -> Point {
  tx_public_key.mul(view_secret)
}

/// `H_s(D || varint(output_index))`, the per-output scalar derived from a key derivation.
pub fn derivation_to_scalar(derivation: &Point, output_index: u64) -> Scalar {
  let mut buf = Vec::with_capacity(32 + 9);
  buf.extend_from_slice(&derivation.compress().to_bytes());
  cn_io::VarInt::write(&output_index, &mut buf).expect("writing to a Vec cannot fail");
  hash_to_scalar(buf)
}

/// `B + H_s(D || i) * G`: derive the one-time output public key owned by spend public key `B`.
pub fn derive_public_key(derivation: &Point, output_index: u64, spend_public: &Point) -> Point {
  let scalar = derivation_to_scalar(derivation, output_index);
  spend_public.add(&Point::mul_base(&scalar))
}

/// `b + H_s(D || i)`: derive the one-time output secret key from spend secret key `b`.
pub fn derive_secret_key(derivation: &Point, output_index: u64, spend_secret: &Scalar) -> Scalar {
  let scalar = derivation_to_scalar(derivation, output_index);
  spend_secret.add(&scalar)
}

/// `I = x * H_p(P)`: the key image uniquely identifying a one-time output's secret `x`, regardless
/// of which ring it's later spent through.
///
/// Returns `None` if `P` decompresses to the identity or a torsioned point (an output that can
/// never be validly spent).
pub fn generate_key_image(one_time_public_key: &CompressedPoint, one_time_secret: &Scalar) -> Option<CompressedPoint> {
  let p = one_time_public_key.decompress()?;
  let hashed = Point::hash_to_point(p.compress().to_bytes());
  Some(hashed.mul(one_time_secret).compress())
}

#[cfg(test)]
mod tests {
  use super::*;
  use cn_curve::Scalar;

  #[test]
  fn derivation_round_trips_key_relation() {
    let view_secret = Scalar::hash(b"view");
    let view_public = Point::mul_base(&view_secret);
    let tx_secret = Scalar::hash(b"tx");
    let tx_public = Point::mul_base(&tx_secret);

    let derivation_recipient = generate_key_derivation(&tx_public, &view_secret);
    let derivation_sender = view_public.mul(&tx_secret);
    assert_eq!(derivation_recipient, derivation_sender);

    let spend_secret = Scalar::hash(b"spend");
    let spend_public = Point::mul_base(&spend_secret);

    let one_time_public = derive_public_key(&derivation_recipient, 0, &spend_public);
    let one_time_secret = derive_secret_key(&derivation_recipient, 0, &spend_secret);
    assert_eq!(Point::mul_base(&one_time_secret), one_time_public);
  }

  #[test]
  fn key_image_is_deterministic() {
    let secret = Scalar::hash(b"secret");
    let public = Point::mul_base(&secret).compress();
    let a = generate_key_image(&public, &secret).unwrap();
    let b = generate_key_image(&public, &secret).unwrap();
    assert_eq!(a, b);
  }

  #[test]
  fn distinct_outputs_yield_distinct_key_images() {
    let s1 = Scalar::hash(b"1");
    let s2 = Scalar::hash(b"2");
    let i1 = generate_key_image(&Point::mul_base(&s1).compress(), &s1).unwrap();
    let i2 = generate_key_image(&Point::mul_base(&s2).compress(), &s2).unwrap();
    assert_ne!(i1, i2);
  }
}
