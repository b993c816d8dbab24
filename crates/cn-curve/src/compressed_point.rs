use core::cmp::Ordering;
use core::hash::{Hash, Hasher};
use std::io::{self, Read, Write};

use subtle::{Choice, ConstantTimeEq};
use zeroize::Zeroize;

use cn_io::read_bytes;

use crate::Point;

/// A compressed Ed25519 point.
///
/// [`curve25519_dalek::edwards::CompressedEdwardsY::decompress`] does not check that the point is
/// canonically encoded. [`CompressedPoint::decompress`] does.
///
/// The `PartialOrd`/`Ord`/`Hash` impls are not guaranteed to run in constant time.
#[derive(Clone, Copy, Eq, Debug, Zeroize)]
pub struct CompressedPoint([u8; 32]);

impl ConstantTimeEq for CompressedPoint {
  fn ct_eq(&self, other: &Self) -> Choice {
    self.0.ct_eq(&other.0)
  }
}
impl PartialEq for CompressedPoint {
  /// Defers to `ConstantTimeEq::ct_eq`.
  fn eq(&self, other: &Self) -> bool {
    bool::from(self.ct_eq(other))
  }
}

impl PartialOrd for CompressedPoint {
  /// Runs in variable time.
  fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
    Some(self.cmp(other))
  }
}
impl Ord for CompressedPoint {
  /// Runs in variable time.
  fn cmp(&self, other: &Self) -> Ordering {
    self.0.cmp(&other.0)
  }
}
impl Hash for CompressedPoint {
  /// Runs in variable time.
  fn hash<H: Hasher>(&self, hasher: &mut H) {
    self.0.hash(hasher)
  }
}

impl CompressedPoint {
  /// The encoding of the identity point.
  #[rustfmt::skip]
  pub const IDENTITY: Self = Self([
    1, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0,
  ]);
  /// The `G` base point.
  pub const G: Self = Self(curve25519_dalek::constants::ED25519_BASEPOINT_COMPRESSED.to_bytes());

  /// Read a compressed point (does not check it decompresses).
  ///
  /// This may run in variable time.
  pub fn read<R: Read>(r: &mut R) -> io::Result<CompressedPoint> {
    Ok(CompressedPoint(read_bytes(r)?))
  }

  /// Write a compressed point.
  ///
  /// This may run in variable time.
  pub fn write<W: Write>(&self, w: &mut W) -> io::Result<()> {
    w.write_all(&self.0)
  }

  /// The raw bytes of this compressed point.
  ///
  /// No guarantee is made that these bytes decompress to a valid point.
  pub fn to_bytes(&self) -> [u8; 32] {
    self.0
  }

  /// Decompress a canonically-encoded Ed25519 point.
  ///
  /// The curve's group order is `8 * l`; this rejects unreduced field elements and non-canonical
  /// representations (e.g. `-0`) so that a given point never has two valid encodings.
  ///
  /// This does not check for membership in the prime-order subgroup.
  pub fn decompress(&self) -> Option<Point> {
    curve25519_dalek::edwards::CompressedEdwardsY(self.0)
      .decompress()
      .filter(|point| point.compress().to_bytes() == self.0)
      .map(Point::from)
  }
}

impl From<[u8; 32]> for CompressedPoint {
  fn from(value: [u8; 32]) -> Self {
    Self(value)
  }
}

// Deliberately no `From<CompressedPoint> for [u8; 32]`: `CompressedPoint::to_bytes`'s
// documentation (no validity guarantee) is the canonical statement of that conversion's contract.

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn identity_decompresses() {
    assert!(CompressedPoint::IDENTITY.decompress().is_some());
  }

  #[test]
  fn generator_round_trips() {
    let mut buf = vec![];
    CompressedPoint::G.write(&mut buf).unwrap();
    let read = CompressedPoint::read(&mut &buf[..]).unwrap();
    assert_eq!(read, CompressedPoint::G);
    assert!(read.decompress().is_some());
  }
}
