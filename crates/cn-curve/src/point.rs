use subtle::{Choice, ConstantTimeEq, ConditionallySelectable};
use zeroize::Zeroize;

use sha3::{Digest, Keccak256};

use crate::CompressedPoint;

/// A decompressed point on the Ed25519 elliptic curve.
#[derive(Clone, Copy, Eq, Debug, Zeroize)]
pub struct Point(curve25519_dalek::EdwardsPoint);

impl ConstantTimeEq for Point {
  fn ct_eq(&self, other: &Self) -> Choice {
    self.0.ct_eq(&other.0)
  }
}
impl ConditionallySelectable for Point {
  fn conditional_select(a: &Self, b: &Self, choice: Choice) -> Self {
    Self(<_>::conditional_select(&a.0, &b.0, choice))
  }
}
impl PartialEq for Point {
  /// Defers to `ConstantTimeEq::ct_eq`.
  fn eq(&self, other: &Self) -> bool {
    bool::from(self.ct_eq(other))
  }
}

impl Point {
  /// Hash arbitrary bytes to a point on the curve (`H_p`, CryptoNote's `hash_to_ec`).
  ///
  /// This inlines `ge_fromfe_frombytes_vartime` from the reference implementation
  /// (<https://github.com/monero-project/monero/blob/389e3ba1df4a6df4c8f9d116aa239d4c00f5bc78
  /// /src/crypto/crypto-ops.c#L2309>) and runs in constant time.
  ///
  /// This implements Elligator 2 (<https://eprint.iacr.org/2013/325>, section 5.5) over
  /// Curve25519, then birationally maps the result onto Ed25519. Applying Elligator 2 once limits
  /// the image to a biased subset of points, but the yielded points retain uniform relations to
  /// each other, which is what key-image derivation actually needs.
  pub fn hash_to_point(bytes: [u8; 32]) -> Self {
    use crypto_bigint::{Encoding, modular::constant_mod::*, U256, impl_modulus, const_residue};

    const MODULUS_STR: &str = "7fffffffffffffffffffffffffffffffffffffffffffffffffffffffffffffed";
    impl_modulus!(Two25519, U256, MODULUS_STR);

    type Two25519Residue = Residue<Two25519, { U256::LIMBS }>;

    // Curve25519: v^2 = u^3 + 486662 u^2 + u. A point (u, v) maps to Ed25519 (x, y) via
    // (sqrt(-(A + 2)) u / v, (u - 1) / (u + 1)).
    const A_U256: U256 = U256::from_u64(486662);
    const A: Two25519Residue = const_residue!(A_U256, Two25519);
    const NEGATIVE_A: Two25519Residue = A.neg();

    // Not a wide reduction; the resulting bias is negligible given the shape of the prime.
    let r = Two25519Residue::new(&U256::from_le_bytes(Keccak256::digest(bytes).into()));

    let r_square = r.square();
    let ur_square = r_square + r_square;

    let one_plus_ur_square = Two25519Residue::ONE + ur_square;
    let (one_plus_ur_square_inv, _value_was_zero) = one_plus_ur_square.invert();
    let upsilon = NEGATIVE_A * one_plus_ur_square_inv;
    let other_candidate = -upsilon - A;

    fn is_quadratic_residue_8_mod_5(value: &Two25519Residue) -> Choice {
      const SQRT_EXP: U256 = Two25519::MODULUS.shr_vartime(3).wrapping_add(&U256::ONE);
      const Z: Two25519Residue =
        Two25519Residue::ONE.add(&Two25519Residue::ONE).pow(&Two25519::MODULUS.shr_vartime(2));
      let y = value.pow(&SQRT_EXP);
      let other_candidate = y * Z;
      y.square().ct_eq(value) | other_candidate.square().ct_eq(value)
    }

    let epsilon = is_quadratic_residue_8_mod_5(&(((upsilon + A) * upsilon.square()) + upsilon));
    let u = Two25519Residue::conditional_select(&other_candidate, &upsilon, epsilon);

    let res = curve25519_dalek::MontgomeryPoint(u.retrieve().to_le_bytes())
      .to_edwards(epsilon.unwrap_u8())
      .expect("neither Elligator 2 candidate was a square");

    // Clear cofactor so the result lies in the prime-order subgroup.
    Self::from(res.mul_by_cofactor())
  }

  /// Compress this point.
  pub fn compress(self) -> CompressedPoint {
    CompressedPoint::from(self.0.compress().to_bytes())
  }

  /// Construct a `Point` from a `curve25519_dalek::EdwardsPoint`.
  ///
  /// Hidden as it's not part of this type's API commitment.
  #[doc(hidden)]
  pub fn from(point: curve25519_dalek::EdwardsPoint) -> Self {
    Self(point)
  }

  /// Obtain the underlying `curve25519_dalek::EdwardsPoint`.
  ///
  /// Hidden as it's not part of this type's API commitment.
  #[doc(hidden)]
  pub fn into(self) -> curve25519_dalek::EdwardsPoint {
    self.0
  }

  /// Interpret this point as a key image, rejecting the identity and torsioned points.
  pub fn as_key_image(self) -> Option<Self> {
    use curve25519_dalek::traits::IsIdentity;
    if self.0.is_identity() || (!self.0.is_torsion_free()) {
      return None;
    }
    Some(self)
  }

  /// `self + other`.
  pub fn add(&self, other: &Self) -> Self {
    Self(self.0 + other.0)
  }

  /// `self - other`.
  pub fn sub(&self, other: &Self) -> Self {
    Self(self.0 - other.0)
  }

  /// `scalar * G`.
  pub fn mul_base(scalar: &crate::Scalar) -> Self {
    Self(curve25519_dalek::EdwardsPoint::mul_base(&(*scalar).into()))
  }

  /// `scalar * self`.
  pub fn mul(&self, scalar: &crate::Scalar) -> Self {
    Self(self.0 * (*scalar).into())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::Scalar;

  #[test]
  fn hash_to_point_is_deterministic_and_on_curve() {
    let a = Point::hash_to_point([1; 32]);
    let b = Point::hash_to_point([1; 32]);
    assert_eq!(a, b);
    assert!(a.as_key_image().is_some());
  }

  #[test]
  fn base_point_multiplication() {
    let g_via_mul = Point::mul_base(&Scalar::ONE);
    assert_eq!(g_via_mul.compress(), CompressedPoint::G);
  }
}
