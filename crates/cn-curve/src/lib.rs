#![deny(missing_docs)]
//! Ed25519 scalar and point arithmetic underlying every CryptoNote-family key and signature
//! operation: one-time key derivation, key images, and ring signatures all reduce to these two
//! types plus `Point::hash_to_point` for the `H_p` hash-to-curve mapping.

mod scalar;
pub use scalar::Scalar;

mod compressed_point;
pub use compressed_point::CompressedPoint;

mod point;
pub use point::Point;
