//! Variable-length integer encoding used throughout the wire codec.
//!
//! Base-128, little-endian, high-bit-continuation varints, matching the encoding CryptoNote-family
//! daemons use for every length prefix and several scalar fields (amounts, unlock times, heights).
//!
//! Reference: <https://github.com/monero-project/monero/blob/master/src/common/varint.h>

use std::io::{self, Read, Write};

use crate::{read_byte, write_byte};

const VARINT_CONTINUATION_FLAG: u8 = 0b1000_0000;
const VARINT_VALUE_MASK: u8 = !VARINT_CONTINUATION_FLAG;

mod sealed {
  pub trait Sealed {
    fn into_u64(self) -> u64;
  }
}

const fn upper_bound(bits: u32) -> usize {
  assert!(bits <= 256, "defining a number exceeding u256 as a VarInt");
  ((bits + (7 - 1)) / 7) as usize
}

/// A value which may be read and written as a canonical varint. Sealed to primitive integers.
pub trait VarInt: TryFrom<u64> + Copy + sealed::Sealed {
  /// The minimum amount of bytes a varint of this type may take.
  const LOWER_BOUND: usize;
  /// The maximum amount of bytes a varint of this type may take.
  const UPPER_BOUND: usize;

  /// The length of this value's canonical varint encoding, in bytes.
  fn varint_len(self) -> usize {
    let varint_u64 = self.into_u64();
    usize::try_from(u64::BITS - varint_u64.leading_zeros()).expect("64 > usize::MAX?").div_ceil(7)
  }

  /// Read a canonical varint, rejecting non-minimal encodings and values which overflow `Self`.
  fn read<R: Read>(r: &mut R) -> io::Result<Self> {
    let mut bits = 0;
    let mut res: u64 = 0;
    while {
      let b = read_byte(r)?;
      if (bits != 0) && (b == 0) {
        Err(io::Error::other("non-canonical varint"))?;
      }

      #[allow(non_snake_case)]
      let U_BITS = core::mem::size_of::<Self>() * 8;
      if ((bits + 7) >= U_BITS) && (b >= (1 << (U_BITS - bits))) {
        Err(io::Error::other("varint overflow"))?;
      }

      res += u64::from(b & VARINT_VALUE_MASK) << bits;
      bits += 7;
      (b & VARINT_CONTINUATION_FLAG) == VARINT_CONTINUATION_FLAG
    } {}
    res.try_into().map_err(|_| io::Error::other("varint does not fit into integer type"))
  }

  /// Write a value as a canonical varint.
  fn write<W: Write>(varint: &Self, w: &mut W) -> io::Result<()> {
    let mut varint: u64 = varint.into_u64();

    while {
      let mut b = u8::try_from(varint & u64::from(VARINT_VALUE_MASK))
        .expect("& 0b0111_1111 left more than 8 bits set");
      varint >>= 7;

      if varint != 0 {
        b |= VARINT_CONTINUATION_FLAG;
      }

      write_byte(&b, w)?;

      varint != 0
    } {}

    Ok(())
  }
}

impl sealed::Sealed for u8 {
  fn into_u64(self) -> u64 {
    self.into()
  }
}
impl VarInt for u8 {
  const LOWER_BOUND: usize = 1;
  const UPPER_BOUND: usize = upper_bound(Self::BITS);
}

impl sealed::Sealed for u32 {
  fn into_u64(self) -> u64 {
    self.into()
  }
}
impl VarInt for u32 {
  const LOWER_BOUND: usize = 1;
  const UPPER_BOUND: usize = upper_bound(Self::BITS);
}

impl sealed::Sealed for u64 {
  fn into_u64(self) -> u64 {
    self
  }
}
impl VarInt for u64 {
  const LOWER_BOUND: usize = 1;
  const UPPER_BOUND: usize = upper_bound(Self::BITS);
}

impl sealed::Sealed for usize {
  fn into_u64(self) -> u64 {
    const _NO_128_BIT_PLATFORMS: [(); (u64::BITS - usize::BITS) as usize] =
      [(); (u64::BITS - usize::BITS) as usize];
    self.try_into().expect("compiling on a platform with a >64-bit usize")
  }
}
impl VarInt for usize {
  const LOWER_BOUND: usize = 1;
  const UPPER_BOUND: usize = upper_bound(Self::BITS);
}

#[cfg(test)]
mod tests {
  use super::*;

  fn round_trip<T: VarInt + PartialEq + std::fmt::Debug>(value: T) {
    let mut buf = vec![];
    VarInt::write(&value, &mut buf).unwrap();
    let mut cursor = &buf[..];
    let read: T = VarInt::read(&mut cursor).unwrap();
    assert_eq!(value, read);
    assert!(cursor.is_empty());
  }

  #[test]
  fn round_trips() {
    for v in [0u64, 1, 127, 128, 16383, 16384, u64::MAX] {
      round_trip(v);
    }
    round_trip(0u8);
    round_trip(255u8);
  }

  #[test]
  fn rejects_non_canonical() {
    // A zero byte with the continuation flag set, followed by a zero terminal byte, encodes zero
    // non-minimally.
    let buf = [0x80, 0x00];
    let mut cursor = &buf[..];
    assert!(<u64 as VarInt>::read(&mut cursor).is_err());
  }
}
