//! The subwallet registry (C4): a wallet's one view key shared across any number of spend-key
//! records, plus the address codec tying them to base58 strings.

use std::collections::HashMap;

use cn_core::address::{self, DecodedAddress};
use cn_curve::{CompressedPoint, Point, Scalar};
use zeroize::Zeroizing;

use crate::error::{FormatError, SubwalletError};

/// One spend-key record sharing the registry's view secret.
#[derive(Clone, Debug)]
pub struct Subwallet {
  /// The spend public key `S`.
  pub spend_public: CompressedPoint,
  /// The spend secret key `s`, absent for a view-only subwallet.
  pub spend_secret: Option<Zeroizing<Scalar>>,
  /// Height the synchronizer should start scanning from for this subwallet.
  pub scan_height: u64,
  /// Unix timestamp the synchronizer should start scanning from, used when `scan_height` is
  /// unknown at creation time.
  pub scan_timestamp: u64,
}

impl Subwallet {
  /// Whether this subwallet can sign (has a spend secret) as opposed to only observing.
  pub fn is_view_only(&self) -> bool {
    self.spend_secret.is_none()
  }
}

/// The set of subwallets sharing one view key, keyed by spend public key.
#[derive(Debug)]
pub struct SubwalletRegistry {
  address_prefix: u64,
  view_secret: Zeroizing<Scalar>,
  view_public: CompressedPoint,
  subwallets: HashMap<CompressedPoint, Subwallet>,
  /// The first subwallet ever added; used for deterministic-wallet mnemonic export and as the
  /// default change destination.
  primary: Option<CompressedPoint>,
}

impl SubwalletRegistry {
  /// Create a registry around a fixed view secret key and network address prefix.
  pub fn new(address_prefix: u64, view_secret: Scalar) -> Self {
    let view_public = Point::mul_base(&view_secret).compress();
    SubwalletRegistry {
      address_prefix,
      view_secret: Zeroizing::new(view_secret),
      view_public,
      subwallets: HashMap::new(),
      primary: None,
    }
  }

  /// The view secret key, shared by every subwallet in this registry.
  pub fn view_secret(&self) -> &Scalar {
    &self.view_secret
  }

  /// The view public key `V = vG`.
  pub fn view_public(&self) -> CompressedPoint {
    self.view_public
  }

  /// The network/address-format prefix every subwallet in this registry shares.
  pub fn address_prefix(&self) -> u64 {
    self.address_prefix
  }

  /// Register a subwallet. Fails with [`SubwalletError::KeyAlreadyExists`] if `spend_public` is
  /// already present. `is_new` and an explicit nonzero `scan_height` are mutually exclusive.
  pub fn add_subwallet(
    &mut self,
    spend_secret: Option<Scalar>,
    spend_public: CompressedPoint,
    scan_height: u64,
    scan_timestamp: u64,
    is_new: bool,
  ) -> Result<(), SubwalletError> {
    if self.subwallets.contains_key(&spend_public) {
      return Err(SubwalletError::KeyAlreadyExists);
    }
    if is_new && scan_height != 0 {
      return Err(SubwalletError::ConflictingSyncStart);
    }
    let first = self.subwallets.is_empty();
    self.subwallets.insert(
      spend_public,
      Subwallet { spend_public, spend_secret: spend_secret.map(Zeroizing::new), scan_height, scan_timestamp },
    );
    if first {
      self.primary = Some(spend_public);
    }
    Ok(())
  }

  /// Remove a subwallet by its address. Returns the removed record's spend public key so the
  /// caller can evict its outputs from the transfers container.
  pub fn delete_subwallet(&mut self, address: &str) -> Result<CompressedPoint, SubwalletError> {
    let decoded = self.decode_own_address(address).map_err(|_| SubwalletError::UnknownSubwallet)?;
    if self.subwallets.remove(&decoded.spend_public).is_none() {
      return Err(SubwalletError::UnknownSubwallet);
    }
    if self.primary == Some(decoded.spend_public) {
      self.primary = self.subwallets.keys().next().copied();
    }
    Ok(decoded.spend_public)
  }

  /// Look up a subwallet's spend secret key. Fails with [`SubwalletError::ViewOnly`] when the
  /// subwallet has none.
  pub fn get_private_spend_key(&self, spend_public: &CompressedPoint) -> Result<Scalar, SubwalletError> {
    let subwallet = self.subwallets.get(spend_public).ok_or(SubwalletError::UnknownSubwallet)?;
    subwallet.spend_secret.as_deref().copied().ok_or(SubwalletError::ViewOnly)
  }

  /// The minimum `(scanHeight, scanTimestamp)` across every subwallet — the floor the
  /// synchronizer uses to decide where to start fetching blocks.
  pub fn get_min_initial_sync_start(&self) -> (u64, u64) {
    self
      .subwallets
      .values()
      .map(|s| (s.scan_height, s.scan_timestamp))
      .min()
      .unwrap_or((0, 0))
  }

  /// Every registered subwallet's spend public key.
  pub fn spend_public_keys(&self) -> impl Iterator<Item = &CompressedPoint> {
    self.subwallets.keys()
  }

  /// Look up a subwallet record by its spend public key.
  pub fn get(&self, spend_public: &CompressedPoint) -> Option<&Subwallet> {
    self.subwallets.get(spend_public)
  }

  /// Whether the deterministic relation `v = Hs(s)` holds for the primary subwallet, i.e. whether
  /// a mnemonic seed can be derived purely from its spend secret.
  pub fn is_deterministic(&self) -> bool {
    let Some(primary) = self.primary.and_then(|p| self.subwallets.get(&p)) else { return false };
    let Some(spend_secret) = &primary.spend_secret else { return false };
    Scalar::hash(&<[u8; 32]>::from(**spend_secret)) == *self.view_secret
  }

  /// Encode the address for one of this registry's own subwallets.
  pub fn encode_address(&self, spend_public: &CompressedPoint) -> Result<String, SubwalletError> {
    if !self.subwallets.contains_key(spend_public) {
      return Err(SubwalletError::UnknownSubwallet);
    }
    Ok(address::encode_address(self.address_prefix, spend_public, &self.view_public))
  }

  /// Decode an address string and confirm it names one of this registry's own subwallets.
  fn decode_own_address(&self, address: &str) -> Result<DecodedAddress, FormatError> {
    let decoded = address::decode_address(address).map_err(FormatError::from)?;
    if decoded.prefix != self.address_prefix {
      return Err(FormatError::AddressWrongPrefix);
    }
    Ok(decoded)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn sample_registry() -> (SubwalletRegistry, CompressedPoint, Scalar) {
    let view_secret = Scalar::hash(b"view");
    let mut registry = SubwalletRegistry::new(18, view_secret);
    let spend_secret = Scalar::hash(b"spend");
    let spend_public = Point::mul_base(&spend_secret).compress();
    registry.add_subwallet(Some(spend_secret), spend_public, 0, 0, true).unwrap();
    (registry, spend_public, spend_secret)
  }

  #[test]
  fn rejects_duplicate_spend_key() {
    let (mut registry, spend_public, _) = sample_registry();
    let err = registry.add_subwallet(None, spend_public, 0, 0, false).unwrap_err();
    assert_eq!(err, SubwalletError::KeyAlreadyExists);
  }

  #[test]
  fn rejects_conflicting_sync_start() {
    let view_secret = Scalar::hash(b"view");
    let mut registry = SubwalletRegistry::new(18, view_secret);
    let spend_public = Point::mul_base(&Scalar::hash(b"spend")).compress();
    let err = registry.add_subwallet(None, spend_public, 100, 0, true).unwrap_err();
    assert_eq!(err, SubwalletError::ConflictingSyncStart);
  }

  #[test]
  fn view_only_subwallet_has_no_spend_key() {
    let view_secret = Scalar::hash(b"view");
    let mut registry = SubwalletRegistry::new(18, view_secret);
    let spend_public = Point::mul_base(&Scalar::hash(b"spend")).compress();
    registry.add_subwallet(None, spend_public, 0, 0, false).unwrap();
    assert_eq!(registry.get_private_spend_key(&spend_public), Err(SubwalletError::ViewOnly));
  }

  #[test]
  fn address_round_trips() {
    let (registry, spend_public, _) = sample_registry();
    let addr = registry.encode_address(&spend_public).unwrap();
    let decoded = address::decode_address(&addr).unwrap();
    assert_eq!(decoded.spend_public, spend_public);
    assert_eq!(decoded.view_public, registry.view_public());
  }

  #[test]
  fn delete_evicts_and_reassigns_primary() {
    let (mut registry, spend_public, _) = sample_registry();
    let addr = registry.encode_address(&spend_public).unwrap();
    let removed = registry.delete_subwallet(&addr).unwrap();
    assert_eq!(removed, spend_public);
    assert!(registry.get(&spend_public).is_none());
  }
}
