//! Traceable ring signatures, CryptoNote's pre-RingCT signature scheme.
//!
//! A ring signature proves knowledge of the discrete log of exactly one member of a public-key
//! ring without revealing which, while a key image computed from that same secret lets the
//! network detect whether the underlying output has already been spent.

use std::io::{self, Read, Write};

use rand_core::{CryptoRng, RngCore};
use zeroize::Zeroize;

use cn_curve::{CompressedPoint, Point, Scalar};

/// One `(c, s)` pair within a ring signature, one per ring member.
#[derive(Clone, PartialEq, Eq, Debug, Zeroize)]
pub(crate) struct Signature {
  c: Scalar,
  s: Scalar,
}

impl Signature {
  fn write<W: Write>(&self, w: &mut W) -> io::Result<()> {
    self.c.write(w)?;
    self.s.write(w)
  }

  fn read<R: Read>(r: &mut R) -> io::Result<Signature> {
    Ok(Signature { c: Scalar::read(r)?, s: Scalar::read(r)? })
  }
}

/// A complete ring signature: one `Signature` per ring member, in ring order.
#[derive(Clone, PartialEq, Eq, Debug, Zeroize)]
pub struct RingSignature {
  sigs: Vec<Signature>,
}

impl RingSignature {
  /// Write this ring signature.
  pub fn write<W: Write>(&self, w: &mut W) -> io::Result<()> {
    for sig in &self.sigs {
      sig.write(w)?;
    }
    Ok(())
  }

  /// Read a ring signature of the given member count.
  pub fn read<R: Read>(members: usize, r: &mut R) -> io::Result<RingSignature> {
    Ok(RingSignature { sigs: cn_io::read_raw_vec(Signature::read, members, r)? })
  }

  /// Verify this ring signature against the given message hash, ring, and key image.
  ///
  /// `msg_hash` must be the same prefix hash the signature was generated over; misuse here (e.g.
  /// verifying against the wrong hash) silently accepts forgeries for a different message.
  pub fn verify(&self, msg_hash: &[u8; 32], ring: &[CompressedPoint], key_image: &CompressedPoint) -> bool {
    if ring.len() != self.sigs.len() || ring.is_empty() {
      return false;
    }

    let Some(key_image) = key_image.decompress() else { return false };
    let Some(key_image) = key_image.as_key_image() else { return false };

    let mut buf = Vec::with_capacity(32 + (2 * 32 * ring.len()));
    buf.extend_from_slice(msg_hash);

    let mut sum = cn_curve::Scalar::ZERO;
    for (ring_member, sig) in ring.iter().zip(&self.sigs) {
      let Some(decompressed) = ring_member.decompress() else { return false };

      // L_i = c_i * P_i + s_i * G
      let l = decompressed.mul(&sig.c).add(&Point::mul_base(&sig.s));
      buf.extend_from_slice(&l.compress().to_bytes());

      // R_i = s_i * H_p(P_i) + c_i * I
      let r = Point::hash_to_point(ring_member.to_bytes()).mul(&sig.s).add(&key_image.mul(&sig.c));
      buf.extend_from_slice(&r.compress().to_bytes());

      sum = sum.add(&sig.c);
    }

    sum == Scalar::hash(buf)
  }
}

/// Generate a ring signature proving knowledge of `secret` (the discrete log of
/// `ring[real_index]`) without revealing `real_index`, binding the key image to `msg_hash`.
///
/// `key_image` must equal `generate_key_image(&ring[real_index], &secret)`; this is not
/// re-derived here since callers generally already have it cached.
pub fn generate_ring_signature(
  rng: &mut (impl RngCore + CryptoRng),
  msg_hash: &[u8; 32],
  ring: &[CompressedPoint],
  key_image: &CompressedPoint,
  secret: &Scalar,
  real_index: usize,
) -> Option<RingSignature> {
  if real_index >= ring.len() {
    return None;
  }
  let decompressed_key_image = key_image.decompress()?.as_key_image()?;

  let mut l = vec![Point::mul_base(&Scalar::ZERO); ring.len()];
  let mut r = vec![Point::mul_base(&Scalar::ZERO); ring.len()];
  let mut c = vec![Scalar::ZERO; ring.len()];
  let mut s = vec![Scalar::ZERO; ring.len()];

  let mut sum_of_decoy_challenges = Scalar::ZERO;
  for i in 0..ring.len() {
    if i == real_index {
      continue;
    }
    let decompressed = ring[i].decompress()?;

    let s_i = Scalar::random(rng);
    let c_i = Scalar::random(rng);

    l[i] = decompressed.mul(&c_i).add(&Point::mul_base(&s_i));
    r[i] = Point::hash_to_point(ring[i].to_bytes()).mul(&s_i).add(&decompressed_key_image.mul(&c_i));

    s[i] = s_i;
    c[i] = c_i;
    sum_of_decoy_challenges = sum_of_decoy_challenges.add(&c_i);
  }

  let k = Scalar::random(rng);
  l[real_index] = Point::mul_base(&k);
  r[real_index] = Point::hash_to_point(ring[real_index].to_bytes()).mul(&k);

  let mut buf = Vec::with_capacity(32 + (2 * 32 * ring.len()));
  buf.extend_from_slice(msg_hash);
  for i in 0..ring.len() {
    buf.extend_from_slice(&l[i].compress().to_bytes());
    buf.extend_from_slice(&r[i].compress().to_bytes());
  }
  let total_challenge = Scalar::hash(buf);

  let real_challenge = total_challenge.sub(&sum_of_decoy_challenges);
  let real_response = k.sub(&real_challenge.mul(secret));

  c[real_index] = real_challenge;
  s[real_index] = real_response;

  Some(RingSignature {
    sigs: c.into_iter().zip(s).map(|(c, s)| Signature { c, s }).collect(),
  })
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::primitives::generate_key_image;
  use rand_chacha::{rand_core::SeedableRng, ChaCha8Rng};

  fn rng() -> ChaCha8Rng {
    ChaCha8Rng::seed_from_u64(42)
  }

  #[test]
  fn signs_and_verifies() {
    let mut rng = rng();
    let secret = Scalar::random(&mut rng);
    let public = Point::mul_base(&secret).compress();
    let key_image = generate_key_image(&public, &secret).unwrap();

    let decoy_a = Point::mul_base(&Scalar::random(&mut rng)).compress();
    let decoy_b = Point::mul_base(&Scalar::random(&mut rng)).compress();
    let ring = vec![decoy_a, public, decoy_b];
    let real_index = 1;

    let msg_hash = [7u8; 32];
    let sig =
      generate_ring_signature(&mut rng, &msg_hash, &ring, &key_image, &secret, real_index).unwrap();

    assert!(sig.verify(&msg_hash, &ring, &key_image));
  }

  #[test]
  fn rejects_wrong_message() {
    let mut rng = rng();
    let secret = Scalar::random(&mut rng);
    let public = Point::mul_base(&secret).compress();
    let key_image = generate_key_image(&public, &secret).unwrap();
    let ring = vec![public];

    let msg_hash = [1u8; 32];
    let sig = generate_ring_signature(&mut rng, &msg_hash, &ring, &key_image, &secret, 0).unwrap();

    let other_hash = [2u8; 32];
    assert!(!sig.verify(&other_hash, &ring, &key_image));
  }

  #[test]
  fn rejects_flipped_ring_member() {
    let mut rng = rng();
    let secret = Scalar::random(&mut rng);
    let public = Point::mul_base(&secret).compress();
    let key_image = generate_key_image(&public, &secret).unwrap();
    let decoy = Point::mul_base(&Scalar::random(&mut rng)).compress();
    let mut ring = vec![public, decoy];

    let msg_hash = [3u8; 32];
    let sig = generate_ring_signature(&mut rng, &msg_hash, &ring, &key_image, &secret, 0).unwrap();
    assert!(sig.verify(&msg_hash, &ring, &key_image));

    ring[1] = Point::mul_base(&Scalar::random(&mut rng)).compress();
    assert!(!sig.verify(&msg_hash, &ring, &key_image));
  }
}
