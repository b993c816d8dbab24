//! The node abstraction: the wallet core depends only on these eight operations, never on a
//! concrete transport. Production callers implement [`Node`] over whatever RPC binding the
//! remote daemon speaks; tests implement it over an in-memory fixture.

use async_trait::async_trait;

use cn_core::block::BlockHeader;
use cn_core::transaction::Transaction;
use cn_curve::CompressedPoint;

use crate::error::NodeError;

/// Coarse chain/network status, as returned by `getInfo`.
#[derive(Debug, Clone, Default)]
pub struct NodeInfo {
  /// The node's current local chain height.
  pub height: u64,
  /// The height the node believes the network has reached (may exceed `height` while syncing).
  pub network_height: u64,
  /// Connected peer count.
  pub peer_count: u64,
  /// Height the node's consensus rules next change, if known.
  pub upgrade_heights: Vec<u64>,
}

/// One block's worth of wallet-relevant sync data, as returned by `getWalletSyncData`.
#[derive(Debug, Clone)]
pub struct WalletBlockInfo {
  /// This block's hash.
  pub block_hash: [u8; 32],
  /// This block's height.
  pub height: u64,
  /// This block's header.
  pub header: BlockHeader,
  /// This block's timestamp (duplicated from `header` for convenience).
  pub timestamp: u64,
  /// Every transaction in the block, coinbase first.
  pub transactions: Vec<Transaction>,
}

/// The result of a `queryBlocksLite`/`getWalletSyncData` call: the height the node matched one of
/// our known block ids at, plus the blocks following it.
#[derive(Debug, Clone)]
pub struct BlockRange {
  /// The highest height among `knownBlockIds` the node recognized.
  pub start_height: u64,
  /// Blocks following `start_height`, in ascending height order.
  pub blocks: Vec<WalletBlockInfo>,
}

/// The result of a `getPoolChangesLite` call.
#[derive(Debug, Clone, Default)]
pub struct PoolChanges {
  /// Whether `tailBlockId` is still the node's chain tip. If false, the pool diff is stale and
  /// the caller should resync the chain instead of trusting it.
  pub tail_block_actual: bool,
  /// Transactions newly present in the pool.
  pub added: Vec<Transaction>,
  /// Hashes of transactions no longer in the pool.
  pub deleted: Vec<[u8; 32]>,
}

/// One candidate decoy output for ring construction.
#[derive(Debug, Clone, Copy)]
pub struct RandomOutput {
  /// The output's global index within its amount's output set.
  pub global_index: u64,
  /// The output's one-time public key.
  pub key: CompressedPoint,
}

/// The node's current fee policy, as returned by `getFeeInfo`.
#[derive(Debug, Clone, Default)]
pub struct FeeInfo {
  /// An address the node wants an additional fee sent to, if any.
  pub address: Option<String>,
  /// The amount to send there.
  pub amount: u64,
}

/// The eight RPC operations the wallet core needs from a remote node. Every other node
/// capability (peer management, mining, admin) is out of scope.
#[async_trait]
pub trait Node: Send + Sync {
  /// `getLastBlockHeader`.
  async fn get_last_block_header(&self) -> Result<BlockHeader, NodeError>;

  /// `getInfo`.
  async fn get_info(&self) -> Result<NodeInfo, NodeError>;

  /// `getWalletSyncData`: request blocks following any of `known_block_ids`, starting no earlier
  /// than `start_height`/`start_timestamp`.
  async fn get_wallet_sync_data(
    &self,
    known_block_ids: &[[u8; 32]],
    start_height: u64,
    start_timestamp: u64,
  ) -> Result<BlockRange, NodeError>;

  /// `getPoolChangesLite`: the pool delta relative to `known_tx_ids`, valid as of `tail_block_id`.
  async fn get_pool_changes_lite(
    &self,
    tail_block_id: [u8; 32],
    known_tx_ids: &[[u8; 32]],
  ) -> Result<PoolChanges, NodeError>;

  /// `getRandomOutsForAmounts`: `count` decoy outputs for each of `amounts`, indexed the same way
  /// in the returned outer vector.
  async fn get_random_outs_for_amounts(
    &self,
    amounts: &[u64],
    count: u64,
  ) -> Result<Vec<Vec<RandomOutput>>, NodeError>;

  /// `getGlobalIndexesForRange`: the global output indices assigned to every transaction's
  /// outputs across `[start_height, end_height)`.
  async fn get_global_indexes_for_range(
    &self,
    start_height: u64,
    end_height: u64,
  ) -> Result<std::collections::HashMap<[u8; 32], Vec<u64>>, NodeError>;

  /// `sendRawTransaction`.
  async fn send_raw_transaction(&self, tx: &Transaction) -> Result<(), NodeError>;

  /// `getFeeInfo`.
  async fn get_fee_info(&self) -> Result<FeeInfo, NodeError>;
}
