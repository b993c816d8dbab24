#![deny(missing_docs)]
//! Low-level binary I/O primitives shared by the wire codec, the curve primitives, and the
//! wallet's non-protocol serializations (wallet file JSON escrow, decoy/ring scratch buffers).
//!
//! This is a plain `std::io`-based crate; the daemon this workspace builds always has `std` and a
//! `tokio` runtime available, so there is no `no_std` shim layer here.

use std::fmt::Debug;
use std::io::{self, Read, Write};

mod varint;
pub use varint::*;

/// Write a single byte.
pub fn write_byte<W: Write>(byte: &u8, w: &mut W) -> io::Result<()> {
  w.write_all(&[*byte])
}

/// Write a sequence of values with no length prefix.
pub fn write_raw_vec<T, W: Write, F: FnMut(&T, &mut W) -> io::Result<()>>(
  mut f: F,
  values: &[T],
  w: &mut W,
) -> io::Result<()> {
  for value in values {
    f(value, w)?;
  }
  Ok(())
}

/// Write a sequence of values prefixed by its varint-encoded length.
pub fn write_vec<T, W: Write, F: FnMut(&T, &mut W) -> io::Result<()>>(
  f: F,
  values: &[T],
  w: &mut W,
) -> io::Result<()> {
  VarInt::write(&values.len(), w)?;
  write_raw_vec(f, values, w)
}

/// Read a fixed amount of bytes.
pub fn read_bytes<R: Read, const N: usize>(r: &mut R) -> io::Result<[u8; N]> {
  let mut res = [0; N];
  r.read_exact(&mut res)?;
  Ok(res)
}

/// Read a single byte.
pub fn read_byte<R: Read>(r: &mut R) -> io::Result<u8> {
  Ok(read_bytes::<_, 1>(r)?[0])
}

/// Read a little-endian `u16`.
pub fn read_u16<R: Read>(r: &mut R) -> io::Result<u16> {
  read_bytes(r).map(u16::from_le_bytes)
}

/// Read a little-endian `u32`.
pub fn read_u32<R: Read>(r: &mut R) -> io::Result<u32> {
  read_bytes(r).map(u32::from_le_bytes)
}

/// Read a little-endian `u64`.
pub fn read_u64<R: Read>(r: &mut R) -> io::Result<u64> {
  read_bytes(r).map(u64::from_le_bytes)
}

/// Read a known amount of values with no length prefix.
pub fn read_raw_vec<R: Read, T, F: FnMut(&mut R) -> io::Result<T>>(
  mut f: F,
  len: usize,
  r: &mut R,
) -> io::Result<Vec<T>> {
  let mut res = vec![];
  for _ in 0..len {
    res.push(f(r)?);
  }
  Ok(res)
}

/// Read a fixed-size array (by reading a `Vec` of the same length and converting).
pub fn read_array<R: Read, T: Debug, F: FnMut(&mut R) -> io::Result<T>, const N: usize>(
  f: F,
  r: &mut R,
) -> io::Result<[T; N]> {
  read_raw_vec(f, N, r)
    .map(|vec| vec.try_into().expect("read a vector of the requested length yet couldn't convert"))
}

/// Read a varint-length-prefixed sequence of values, optionally bounding the declared length.
pub fn read_vec<R: Read, T, F: FnMut(&mut R) -> io::Result<T>>(
  f: F,
  length_bound: Option<usize>,
  r: &mut R,
) -> io::Result<Vec<T>> {
  let declared_length: usize = VarInt::read(r)?;
  if let Some(length_bound) = length_bound {
    if declared_length > length_bound {
      Err(io::Error::other("vector exceeds bound on length"))?;
    }
  }
  read_raw_vec(f, declared_length, r)
}
