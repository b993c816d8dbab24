//! The encrypted wallet container (C3): the on-disk keys+cache file, saved atomically and
//! round-tripped through [`cn_core::container_crypto`].

use std::path::Path;

use cn_curve::{CompressedPoint, Scalar};
use rand_core::{CryptoRng, RngCore};
use serde::{Deserialize, Serialize};

use crate::config::WalletConfig;
use crate::error::ContainerError;
use crate::subwallet::{Subwallet, SubwalletRegistry};

/// The container body's format version this build writes and the oldest it still reads.
pub const FORMAT_VERSION: u32 = 1;

#[derive(Serialize, Deserialize)]
struct SubwalletRecord {
  spend_public: [u8; 32],
  spend_secret: Option<[u8; 32]>,
  scan_height: u64,
  scan_timestamp: u64,
}

#[derive(Serialize, Deserialize)]
struct SynchronizerRecord {
  known_block_hashes: Vec<(u64, [u8; 32])>,
  last_known_block_hash: [u8; 32],
}

/// The container's plaintext JSON body, mirroring the wallet file format in the external
/// interfaces design: a format version, the subwallet set, and the synchronizer's resume point.
#[derive(Serialize, Deserialize)]
struct ContainerBody {
  wallet_file_format_version: u32,
  address_prefix: u64,
  view_secret: [u8; 32],
  sub_wallets: Vec<SubwalletRecord>,
  wallet_synchronizer: SynchronizerRecord,
}

/// The deserialized state a container load hands back to the wallet to rebuild its runtime
/// components.
#[derive(Debug)]
pub struct LoadedContainer {
  /// The subwallet registry, fully populated.
  pub registry: SubwalletRegistry,
  /// Known block hashes by height, seeding the synchronizer's sparse-chain state.
  pub known_block_hashes: std::collections::HashMap<u64, [u8; 32]>,
  /// The last synced chain tip hash.
  pub last_known_block_hash: [u8; 32],
}

/// Serialize `registry` and the synchronizer's resume state into an encrypted container file at
/// `path`, writing to a temporary file first and renaming over the destination so a crash or
/// power loss during the write can never leave a half-written container.
pub fn save(
  rng: &mut (impl RngCore + CryptoRng),
  path: &Path,
  password: &[u8],
  config: &WalletConfig,
  registry: &SubwalletRegistry,
  known_block_hashes: &std::collections::HashMap<u64, [u8; 32]>,
  last_known_block_hash: [u8; 32],
) -> Result<(), ContainerError> {
  let body = ContainerBody {
    wallet_file_format_version: FORMAT_VERSION,
    address_prefix: registry.address_prefix(),
    view_secret: <[u8; 32]>::from(*registry.view_secret()),
    sub_wallets: registry
      .spend_public_keys()
      .filter_map(|key| registry.get(key))
      .map(subwallet_to_record)
      .collect(),
    wallet_synchronizer: SynchronizerRecord {
      known_block_hashes: known_block_hashes.iter().map(|(&h, &id)| (h, id)).collect(),
      last_known_block_hash,
    },
  };

  let json = serde_json::to_vec(&body).map_err(|_| ContainerError::MalformedBody)?;
  let encrypted = cn_core::container_crypto::encrypt(rng, password, config.pbkdf2_iterations, &json);

  let tmp_path = path.with_extension("tmp");
  std::fs::write(&tmp_path, &encrypted).map_err(|_| ContainerError::Io)?;
  std::fs::rename(&tmp_path, path).map_err(|_| ContainerError::Io)?;
  Ok(())
}

/// Load and decrypt a container file at `path`, rebuilding a [`SubwalletRegistry`] and
/// synchronizer resume state from its body.
pub fn load(path: &Path, password: &[u8], config: &WalletConfig) -> Result<LoadedContainer, ContainerError> {
  let encrypted = std::fs::read(path).map_err(|_| ContainerError::Io)?;
  let json = cn_core::container_crypto::decrypt(password, config.pbkdf2_iterations, &encrypted)?;
  let body: ContainerBody = serde_json::from_slice(&json).map_err(|_| ContainerError::MalformedBody)?;

  if body.wallet_file_format_version > FORMAT_VERSION {
    return Err(ContainerError::UnsupportedVersion);
  }

  let view_secret = Scalar::read(&mut &body.view_secret[..]).map_err(|_| ContainerError::MalformedBody)?;
  let mut registry = SubwalletRegistry::new(body.address_prefix, view_secret);
  for record in &body.sub_wallets {
    let spend_public = CompressedPoint::from(record.spend_public);
    let spend_secret = record
      .spend_secret
      .map(|bytes| Scalar::read(&mut &bytes[..]))
      .transpose()
      .map_err(|_| ContainerError::MalformedBody)?;
    registry
      .add_subwallet(spend_secret, spend_public, record.scan_height, record.scan_timestamp, false)
      .map_err(|_| ContainerError::MalformedBody)?;
  }

  Ok(LoadedContainer {
    registry,
    known_block_hashes: body.wallet_synchronizer.known_block_hashes.into_iter().collect(),
    last_known_block_hash: body.wallet_synchronizer.last_known_block_hash,
  })
}

fn subwallet_to_record(subwallet: &Subwallet) -> SubwalletRecord {
  SubwalletRecord {
    spend_public: subwallet.spend_public.to_bytes(),
    spend_secret: subwallet.spend_secret.as_deref().map(|s| <[u8; 32]>::from(*s)),
    scan_height: subwallet.scan_height,
    scan_timestamp: subwallet.scan_timestamp,
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use rand_chacha::{rand_core::SeedableRng, ChaCha8Rng};

  #[test]
  fn round_trips_through_disk() {
    let dir = std::env::temp_dir().join(format!("cn-wallet-container-test-{}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join("wallet.keys");

    let mut rng = ChaCha8Rng::seed_from_u64(1);
    let config = WalletConfig::default();
    let view_secret = Scalar::hash(b"view");
    let mut registry = SubwalletRegistry::new(18, view_secret);
    let spend_secret = Scalar::hash(b"spend");
    let spend_public = cn_curve::Point::mul_base(&spend_secret).compress();
    registry.add_subwallet(Some(spend_secret), spend_public, 0, 0, true).unwrap();

    let mut known = std::collections::HashMap::new();
    known.insert(100u64, [9u8; 32]);
    save(&mut rng, &path, b"hunter2", &config, &registry, &known, [9u8; 32]).unwrap();

    let loaded = load(&path, b"hunter2", &config).unwrap();
    assert_eq!(loaded.registry.view_public(), registry.view_public());
    assert!(loaded.registry.get(&spend_public).is_some());
    assert_eq!(loaded.known_block_hashes.get(&100), Some(&[9u8; 32]));

    std::fs::remove_dir_all(&dir).ok();
  }

  #[test]
  fn wrong_password_is_rejected() {
    let dir = std::env::temp_dir().join(format!("cn-wallet-container-test-wrong-{}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join("wallet.keys");

    let mut rng = ChaCha8Rng::seed_from_u64(2);
    let config = WalletConfig::default();
    let registry = SubwalletRegistry::new(18, Scalar::hash(b"view"));
    save(&mut rng, &path, b"hunter2", &config, &registry, &std::collections::HashMap::new(), [0; 32]).unwrap();

    let err = load(&path, b"wrong", &config).unwrap_err();
    assert!(matches!(err, ContainerError::Crypto(_)));

    std::fs::remove_dir_all(&dir).ok();
  }
}
