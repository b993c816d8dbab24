//! Block headers and templates: what the synchronizer fetches from the node and what the
//! transaction hash list's Merkle root binds.

use std::io::{self, Read, Write};

use cn_io::{read_bytes, VarInt};

use crate::merkle::merkle_root;
use crate::primitives::cn_hash;
use crate::transaction::{Input, Transaction};

/// A block header: consensus version, proof-of-work nonce, and chain linkage.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct BlockHeader {
  /// The hard-fork major version this block was produced under.
  pub major_version: u8,
  /// The hard-fork minor version, used to signal an upcoming fork.
  pub minor_version: u8,
  /// Seconds since the epoch, as claimed by the miner.
  pub timestamp: u64,
  /// The hash of the block this one extends.
  pub prev_block_hash: [u8; 32],
  /// The proof-of-work nonce.
  pub nonce: u32,
}

impl BlockHeader {
  /// Write the header.
  pub fn write<W: Write>(&self, w: &mut W) -> io::Result<()> {
    VarInt::write(&self.major_version, w)?;
    VarInt::write(&self.minor_version, w)?;
    VarInt::write(&self.timestamp, w)?;
    w.write_all(&self.prev_block_hash)?;
    w.write_all(&self.nonce.to_le_bytes())
  }

  /// Serialize the header to a fresh buffer.
  pub fn serialize(&self) -> Vec<u8> {
    let mut buf = vec![];
    self.write(&mut buf).expect("writing to a Vec cannot fail");
    buf
  }

  /// Read a header.
  pub fn read<R: Read>(r: &mut R) -> io::Result<BlockHeader> {
    Ok(BlockHeader {
      major_version: VarInt::read(r)?,
      minor_version: VarInt::read(r)?,
      timestamp: VarInt::read(r)?,
      prev_block_hash: read_bytes(r)?,
      nonce: read_bytes(r).map(u32::from_le_bytes)?,
    })
  }
}

/// A full block: header, coinbase transaction, and the hashes of every other transaction it
/// includes.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Block {
  /// The block's header.
  pub header: BlockHeader,
  coinbase_transaction: Transaction,
  /// The hashes of this block's non-coinbase transactions, in template order.
  pub transactions: Vec<[u8; 32]>,
}

impl Block {
  /// The maximum number of transactions (including the coinbase) a block may hold.
  pub const MAX_TRANSACTIONS: usize = 0x10_000_000;

  /// Construct a block, rejecting a coinbase transaction that isn't actually coinbase-shaped.
  pub fn new(
    header: BlockHeader,
    coinbase_transaction: Transaction,
    transactions: Vec<[u8; 32]>,
  ) -> Option<Block> {
    if !coinbase_transaction.is_coinbase() {
      return None;
    }
    Some(Block { header, coinbase_transaction, transactions })
  }

  /// This block's height, as carried by its coinbase input.
  pub fn height(&self) -> u64 {
    match self.coinbase_transaction.inputs.first() {
      Some(Input::Gen(height)) => *height,
      _ => panic!("block held a non-coinbase coinbase transaction"),
    }
  }

  /// The block's coinbase transaction.
  pub fn coinbase_transaction(&self) -> &Transaction {
    &self.coinbase_transaction
  }

  /// Write the block.
  pub fn write<W: Write>(&self, w: &mut W) -> io::Result<()> {
    self.header.write(w)?;
    self.coinbase_transaction.write(w)?;
    VarInt::write(&self.transactions.len(), w)?;
    for tx in &self.transactions {
      w.write_all(tx)?;
    }
    Ok(())
  }

  /// Serialize the block to a fresh buffer.
  pub fn serialize(&self) -> Vec<u8> {
    let mut buf = vec![];
    self.write(&mut buf).expect("writing to a Vec cannot fail");
    buf
  }

  /// Serialize the block as required for the proof-of-work hash: header followed by the
  /// transaction-tree Merkle root and transaction count, excluding any signature/proof data.
  pub fn serialize_pow_hash(&self) -> Vec<u8> {
    let mut blob = self.header.serialize();

    let mut leaves = Vec::with_capacity(self.transactions.len() + 1);
    leaves.push(self.coinbase_transaction.hash());
    leaves.extend_from_slice(&self.transactions);

    blob.extend_from_slice(
      &merkle_root(leaves).expect("the coinbase transaction is always present"),
    );
    VarInt::write(&(1 + self.transactions.len()), &mut blob).expect("writing to a Vec cannot fail");
    blob
  }

  /// This block's hash: `cn_hash` of a varint-length-prefixed proof-of-work preimage.
  pub fn hash(&self) -> [u8; 32] {
    let hashable = self.serialize_pow_hash();

    let mut hashing_blob =
      Vec::with_capacity(<usize as VarInt>::UPPER_BOUND + hashable.len());
    VarInt::write(
      &u64::try_from(hashable.len()).expect("block preimage length exceeded u64::MAX"),
      &mut hashing_blob,
    )
    .expect("writing to a Vec cannot fail");
    hashing_blob.extend_from_slice(&hashable);

    cn_hash(hashing_blob)
  }

  /// Read a block.
  pub fn read<R: Read>(r: &mut R) -> io::Result<Block> {
    let header = BlockHeader::read(r)?;
    let coinbase_transaction = Transaction::read(r)?;

    let transaction_count: usize = VarInt::read(r)?;
    if transaction_count >= Self::MAX_TRANSACTIONS {
      Err(io::Error::other("transaction count exceeds block limit"))?;
    }
    let transactions =
      (0..transaction_count).map(|_| read_bytes(r)).collect::<Result<_, _>>()?;

    Block::new(header, coinbase_transaction, transactions)
      .ok_or_else(|| io::Error::other("block's coinbase transaction failed sanity checks"))
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::transaction::{Output, Timelock};
  use cn_curve::{Point, Scalar};

  fn coinbase(height: u64) -> Transaction {
    Transaction {
      unlock_time: Timelock::None,
      inputs: vec![Input::Gen(height)],
      outputs: vec![Output {
        amount: 1_000_000,
        key: Point::mul_base(&Scalar::hash(b"miner")).compress(),
      }],
      extra: vec![],
      signatures: vec![],
    }
  }

  fn header() -> BlockHeader {
    BlockHeader { major_version: 1, minor_version: 0, timestamp: 1_700_000_000, prev_block_hash: [0; 32], nonce: 42 }
  }

  #[test]
  fn round_trips_and_reports_height() {
    let block = Block::new(header(), coinbase(512), vec![[1; 32], [2; 32]]).unwrap();
    assert_eq!(block.height(), 512);

    let serialized = block.serialize();
    let read_back = Block::read(&mut &serialized[..]).unwrap();
    assert_eq!(block, read_back);
  }

  #[test]
  fn rejects_non_coinbase_miner_transaction() {
    let mut not_coinbase = coinbase(1);
    not_coinbase.inputs = vec![];
    not_coinbase.outputs = vec![];
    assert!(Block::new(header(), not_coinbase, vec![]).is_none());
  }

  #[test]
  fn hash_is_deterministic() {
    let block = Block::new(header(), coinbase(1), vec![]).unwrap();
    assert_eq!(block.hash(), block.hash());
  }
}
