use core::ops::DerefMut;
use std::io::{self, Read, Write};

use subtle::{Choice, ConstantTimeEq};
use zeroize::{Zeroize, Zeroizing};

use rand_core::{RngCore, CryptoRng};

use sha3::{Digest, Keccak256};

use cn_io::*;

/// A scalar modulo the Ed25519 group order `l`, canonically reduced.
#[derive(Clone, Copy, Eq, Debug, Zeroize)]
pub struct Scalar([u8; 32]);

impl ConstantTimeEq for Scalar {
  fn ct_eq(&self, other: &Self) -> Choice {
    self.0.ct_eq(&other.0)
  }
}
impl PartialEq for Scalar {
  /// Defers to `ConstantTimeEq::ct_eq`.
  fn eq(&self, other: &Self) -> bool {
    bool::from(self.ct_eq(other))
  }
}

impl Scalar {
  /// The additive identity.
  pub const ZERO: Self = Self([0; 32]);
  /// The multiplicative identity.
  #[rustfmt::skip]
  pub const ONE: Self = Self([
    1, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0,
    0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0,
  ]);

  /// Write this scalar's canonical byte encoding.
  ///
  /// This may run in variable time.
  pub fn write<W: Write>(&self, w: &mut W) -> io::Result<()> {
    w.write_all(&self.0)
  }

  /// Read a canonically-encoded scalar.
  ///
  /// This rejects non-canonical (unreduced) encodings; callers who need to accept the handful of
  /// legacy non-canonical scalars some CryptoNote-family chains produced should read raw bytes
  /// instead and only convert to `Scalar` once reduction is known to be safe.
  ///
  /// This may run in variable time.
  pub fn read<R: Read>(r: &mut R) -> io::Result<Scalar> {
    let bytes = read_bytes(r)?;
    Option::<curve25519_dalek::Scalar>::from(curve25519_dalek::Scalar::from_canonical_bytes(bytes))
      .ok_or_else(|| io::Error::other("unreduced scalar"))?;
    Ok(Self(bytes))
  }

  /// Construct a `Scalar` from a `curve25519_dalek::Scalar`.
  ///
  /// Hidden as it's not part of the API commitment of this type; downstream code should not
  /// depend on `curve25519_dalek` directly.
  #[doc(hidden)]
  pub fn from(scalar: curve25519_dalek::Scalar) -> Self {
    Self(scalar.to_bytes())
  }

  /// Obtain a `curve25519_dalek::Scalar` from a `Scalar`.
  ///
  /// Hidden as it's not part of the API commitment of this type.
  #[doc(hidden)]
  pub fn into(self) -> curve25519_dalek::Scalar {
    curve25519_dalek::Scalar::from_canonical_bytes(self.0)
      .expect("Scalar instantiated with invalid contents")
  }

  /// Sample a uniform scalar via a wide reduction.
  pub fn random(rng: &mut (impl RngCore + CryptoRng)) -> Self {
    let mut raw = Zeroizing::new([0; 64]);
    rng.fill_bytes(raw.deref_mut());
    Self(Zeroizing::new(curve25519_dalek::Scalar::from_bytes_mod_order_wide(&raw)).to_bytes())
  }

  /// Hash arbitrary data to a scalar: `keccak256(data) % l`.
  ///
  /// This is not a wide reduction. Panics if the digest happens to be a multiple of `l`, an event
  /// of negligible probability; propagating this as an error would just push the same judgment
  /// call one layer up.
  pub fn hash(data: impl AsRef<[u8]>) -> Self {
    let scalar =
      curve25519_dalek::Scalar::from_bytes_mod_order(Keccak256::digest(data.as_ref()).into());

    assert!(
      scalar != curve25519_dalek::Scalar::ZERO,
      "keccak256(preimage) was congruent to 0 mod l"
    );

    Self::from(scalar)
  }

  /// `self + other`.
  pub fn add(&self, other: &Self) -> Self {
    Self::from(self.clone().into() + other.clone().into())
  }

  /// `self - other`.
  pub fn sub(&self, other: &Self) -> Self {
    Self::from(self.clone().into() - other.clone().into())
  }

  /// `self * other`.
  pub fn mul(&self, other: &Self) -> Self {
    Self::from(self.clone().into() * other.clone().into())
  }
}

impl From<Scalar> for [u8; 32] {
  fn from(scalar: Scalar) -> [u8; 32] {
    scalar.0
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn zero_and_one_round_trip() {
    let mut buf = vec![];
    Scalar::ZERO.write(&mut buf).unwrap();
    assert_eq!(Scalar::read(&mut &buf[..]).unwrap(), Scalar::ZERO);

    let mut buf = vec![];
    Scalar::ONE.write(&mut buf).unwrap();
    assert_eq!(Scalar::read(&mut &buf[..]).unwrap(), Scalar::ONE);
  }

  #[test]
  fn hash_is_deterministic() {
    assert_eq!(Scalar::hash(b"abc"), Scalar::hash(b"abc"));
    assert_ne!(Scalar::hash(b"abc"), Scalar::hash(b"abd"));
  }

  #[test]
  fn arithmetic() {
    let a = Scalar::hash(b"a");
    let b = Scalar::hash(b"b");
    assert_eq!(a.add(&b).sub(&b), a);
  }
}
