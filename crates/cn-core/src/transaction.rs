//! Classic (pre-RingCT) CryptoNote transactions: plain amounts, key-offset ring references, and a
//! ring signature per key input.

use std::io::{self, Read, Write};

use cn_curve::CompressedPoint;
use cn_io::{read_byte, read_vec, write_vec, VarInt};

use crate::primitives::cn_hash;
use crate::ring_signatures::RingSignature;

/// An input spent by a transaction.
#[derive(Clone, PartialEq, Eq, Debug)]
pub enum Input {
  /// The coinbase input of a miner transaction, carrying the height it was mined at.
  Gen(u64),
  /// An input spending a prior output through a ring signature.
  ToKey {
    /// The amount pool this input draws from.
    amount: u64,
    /// Ring member indices, each relative to the previous (the first is absolute).
    key_offsets: Vec<u64>,
    /// The key image of the spent output, preventing double-spends.
    key_image: CompressedPoint,
  },
}

impl Input {
  fn write<W: Write>(&self, w: &mut W) -> io::Result<()> {
    match self {
      Input::Gen(height) => {
        w.write_all(&[255])?;
        VarInt::write(height, w)
      }
      Input::ToKey { amount, key_offsets, key_image } => {
        w.write_all(&[2])?;
        VarInt::write(amount, w)?;
        write_vec(VarInt::write, key_offsets, w)?;
        key_image.write(w)
      }
    }
  }

  fn read<R: Read>(r: &mut R) -> io::Result<Input> {
    Ok(match read_byte(r)? {
      255 => Input::Gen(VarInt::read(r)?),
      2 => Input::ToKey {
        amount: VarInt::read(r)?,
        key_offsets: read_vec(VarInt::read, Some(1_000_000), r)?,
        key_image: CompressedPoint::read(r)?,
      },
      _ => Err(io::Error::other("unknown input discriminator"))?,
    })
  }

  /// The number of ring members this input references, or `0` for a coinbase input.
  pub fn ring_size(&self) -> usize {
    match self {
      Input::Gen(_) => 0,
      Input::ToKey { key_offsets, .. } => key_offsets.len(),
    }
  }

  /// Recover the absolute global indices a `ToKey` input's ring spans from its relative offsets.
  ///
  /// Returns `None` for a coinbase input.
  pub fn absolute_offsets(&self) -> Option<Vec<u64>> {
    let Input::ToKey { key_offsets, .. } = self else { return None };
    let mut absolute = Vec::with_capacity(key_offsets.len());
    let mut running = 0u64;
    for (i, offset) in key_offsets.iter().enumerate() {
      running = if i == 0 { *offset } else { running + offset };
      absolute.push(running);
    }
    Some(absolute)
  }

  /// Encode absolute global indices as the relative-offset form the wire format requires.
  pub fn relative_offsets(absolute: &[u64]) -> Vec<u64> {
    let mut relative = Vec::with_capacity(absolute.len());
    let mut prev = 0u64;
    for (i, &index) in absolute.iter().enumerate() {
      relative.push(if i == 0 { index } else { index - prev });
      prev = index;
    }
    relative
  }
}

/// An output created by a transaction.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Output {
  /// The amount this output carries, in the chain's atomic unit.
  pub amount: u64,
  /// The one-time public key spendable by whoever can derive its matching secret.
  pub key: CompressedPoint,
}

impl Output {
  fn write<W: Write>(&self, w: &mut W) -> io::Result<()> {
    VarInt::write(&self.amount, w)?;
    w.write_all(&[2])?;
    w.write_all(&self.key.to_bytes())
  }

  fn read<R: Read>(r: &mut R) -> io::Result<Output> {
    let amount = VarInt::read(r)?;
    match read_byte(r)? {
      2 => {}
      _ => Err(io::Error::other("unknown output discriminator"))?,
    }
    Ok(Output { amount, key: CompressedPoint::read(r)? })
  }
}

/// A transaction's additional unlock constraint, on top of the chain's default spendable depth.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Timelock {
  /// No additional constraint.
  None,
  /// Locked until the chain reaches this height.
  Block(u64),
  /// Locked until this many seconds have passed since the epoch.
  Time(u64),
}

impl Timelock {
  const BLOCK_TIME_THRESHOLD: u64 = 500_000_000;

  fn write<W: Write>(&self, w: &mut W) -> io::Result<()> {
    let raw = match self {
      Timelock::None => 0,
      Timelock::Block(height) => *height,
      Timelock::Time(time) => *time,
    };
    VarInt::write(&raw, w)
  }

  fn read<R: Read>(r: &mut R) -> io::Result<Timelock> {
    let raw: u64 = VarInt::read(r)?;
    Ok(Self::from_raw(raw))
  }

  /// Interpret a raw `unlockTime` value: `0` means unlocked, a value below the block/time
  /// threshold is a height, anything at or above it is a unix timestamp.
  pub fn from_raw(raw: u64) -> Timelock {
    if raw == 0 {
      Timelock::None
    } else if raw < Self::BLOCK_TIME_THRESHOLD {
      Timelock::Block(raw)
    } else {
      Timelock::Time(raw)
    }
  }

  /// Whether this timelock is satisfied given the chain's current height and wall-clock time.
  pub fn is_unlocked(&self, current_height: u64, current_unix_time: u64) -> bool {
    match self {
      Timelock::None => true,
      Timelock::Block(height) => current_height >= *height,
      Timelock::Time(time) => current_unix_time >= *time,
    }
  }
}

/// A complete, signed CryptoNote transaction: version `1`, plain amounts, classic ring signatures.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Transaction {
  /// This transaction's additional timelock.
  pub unlock_time: Timelock,
  /// The inputs this transaction spends.
  pub inputs: Vec<Input>,
  /// The outputs this transaction creates.
  pub outputs: Vec<Output>,
  /// Opaque additional data: transaction public key(s), payment ID, and any application payload.
  pub extra: Vec<u8>,
  /// One ring signature per `ToKey` input, in input order. Empty for a coinbase transaction.
  pub signatures: Vec<RingSignature>,
}

const VERSION: u64 = 1;

impl Transaction {
  fn write_prefix<W: Write>(&self, w: &mut W) -> io::Result<()> {
    VarInt::write(&VERSION, w)?;
    self.unlock_time.write(w)?;
    write_vec(Input::write, &self.inputs, w)?;
    write_vec(Output::write, &self.outputs, w)?;
    VarInt::write(&self.extra.len(), w)?;
    w.write_all(&self.extra)
  }

  /// Write this transaction's complete wire encoding, prefix followed by ring signatures.
  pub fn write<W: Write>(&self, w: &mut W) -> io::Result<()> {
    self.write_prefix(w)?;
    for sig in &self.signatures {
      sig.write(w)?;
    }
    Ok(())
  }

  /// Serialize this transaction to a fresh buffer.
  pub fn serialize(&self) -> Vec<u8> {
    let mut buf = Vec::with_capacity(512);
    self.write(&mut buf).expect("writing to a Vec cannot fail");
    buf
  }

  /// Read a transaction from its wire encoding.
  pub fn read<R: Read>(r: &mut R) -> io::Result<Transaction> {
    let version: u64 = VarInt::read(r)?;
    if version != VERSION {
      Err(io::Error::other("unsupported transaction version"))?;
    }

    let unlock_time = Timelock::read(r)?;
    let inputs: Vec<Input> = read_vec(Input::read, Some(1_000_000), r)?;
    if inputs.is_empty() {
      Err(io::Error::other("transaction has no inputs"))?;
    }
    let outputs = read_vec(Output::read, Some(1_000_000), r)?;
    let extra = read_vec(read_byte, Some(Transaction::MAX_SIZE), r)?;

    let is_coinbase = matches!(inputs[0], Input::Gen(_));
    let mut signatures = Vec::with_capacity(inputs.len());
    if !is_coinbase {
      for input in &inputs {
        signatures.push(RingSignature::read(input.ring_size(), r)?);
      }
    }

    Ok(Transaction { unlock_time, inputs, outputs, extra, signatures })
  }

  /// The maximum size, in bytes, of a non-coinbase transaction.
  pub const MAX_SIZE: usize = 1_000_000;

  /// Whether this is a coinbase (miner reward) transaction.
  pub fn is_coinbase(&self) -> bool {
    matches!(self.inputs.first(), Some(Input::Gen(_)))
  }

  /// This transaction's prefix hash: `cn_hash` of its fields excluding signatures.
  ///
  /// This is the message every `ToKey` input's ring signature is generated and verified over.
  pub fn prefix_hash(&self) -> [u8; 32] {
    let mut buf = Vec::with_capacity(512);
    self.write_prefix(&mut buf).expect("writing to a Vec cannot fail");
    cn_hash(buf)
  }

  /// This transaction's hash, as referenced by blocks and the network.
  pub fn hash(&self) -> [u8; 32] {
    cn_hash(self.serialize())
  }

  /// The total amount this transaction's outputs create.
  pub fn outputs_amount(&self) -> u64 {
    self.outputs.iter().map(|o| o.amount).sum()
  }

  /// The total amount this transaction's key inputs spend, or `0` for a coinbase transaction.
  pub fn inputs_amount(&self) -> u64 {
    self
      .inputs
      .iter()
      .map(|i| match i {
        Input::Gen(_) => 0,
        Input::ToKey { amount, .. } => *amount,
      })
      .sum()
  }

  /// The implied transaction fee: `inputs_amount - outputs_amount`.
  ///
  /// Returns `None` if outputs exceed inputs, which can never happen in a valid transaction.
  pub fn fee(&self) -> Option<u64> {
    self.inputs_amount().checked_sub(self.outputs_amount())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use cn_curve::{Point, Scalar};
  use rand_chacha::{rand_core::SeedableRng, ChaCha8Rng};

  fn sample_key() -> CompressedPoint {
    Point::mul_base(&Scalar::hash(b"sample")).compress()
  }

  #[test]
  fn coinbase_round_trips() {
    let tx = Transaction {
      unlock_time: Timelock::Block(100),
      inputs: vec![Input::Gen(99)],
      outputs: vec![Output { amount: 1_000, key: sample_key() }],
      extra: vec![1, 2, 3],
      signatures: vec![],
    };
    assert!(tx.is_coinbase());

    let serialized = tx.serialize();
    let read_back = Transaction::read(&mut &serialized[..]).unwrap();
    assert_eq!(tx, read_back);
  }

  #[test]
  fn key_input_round_trips_with_signature() {
    let mut rng = ChaCha8Rng::seed_from_u64(1);
    let secret = Scalar::hash(b"one-time");
    let public = Point::mul_base(&secret).compress();
    let key_image = crate::primitives::generate_key_image(&public, &secret).unwrap();

    let decoy = Point::mul_base(&Scalar::hash(b"decoy")).compress();
    let ring = vec![decoy, public];

    let tx = Transaction {
      unlock_time: Timelock::None,
      inputs: vec![Input::ToKey {
        amount: 10_000,
        key_offsets: Input::relative_offsets(&[5, 12]),
        key_image,
      }],
      outputs: vec![Output { amount: 9_000, key: sample_key() }],
      extra: vec![],
      signatures: vec![crate::ring_signatures::generate_ring_signature(
        &mut rng,
        &[0u8; 32],
        &ring,
        &key_image,
        &secret,
        1,
      )
      .unwrap()],
    };

    let serialized = tx.serialize();
    let read_back = Transaction::read(&mut &serialized[..]).unwrap();
    assert_eq!(tx, read_back);
    assert_eq!(tx.inputs[0].absolute_offsets().unwrap(), vec![5, 17]);
    assert_eq!(tx.fee(), Some(1_000));
  }
}
