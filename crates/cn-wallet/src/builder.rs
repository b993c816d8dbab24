//! The transaction builder (C8): input selection, output decomposition, decoy/ring construction,
//! and classic ring-signature signing, ending in a relay to the node.

use std::collections::HashSet;

use cn_core::address::{self, DecodedAddress};
use cn_core::primitives::{derive_public_key, derive_secret_key, generate_key_derivation, generate_key_image};
use cn_core::transaction::{Input, Output, Timelock, Transaction};
use cn_curve::{CompressedPoint, Point, Scalar};
use rand_core::{CryptoRng, RngCore};

use crate::config::WalletConfig;
use crate::error::{BuildError, FormatError};
use crate::node::Node;
use crate::subwallet::SubwalletRegistry;
use crate::transfers::{OwnedOutput, TransfersContainer};

/// One requested payment.
#[derive(Debug, Clone)]
pub struct Destination {
  /// The recipient's address (plain or integrated).
  pub address: String,
  /// The amount to send.
  pub amount: u64,
}

/// Parameters for [`build_transfer`].
#[derive(Debug, Clone)]
pub struct TransferParams {
  /// Payments to make.
  pub destinations: Vec<Destination>,
  /// Which subwallets' outputs may be spent; empty means all.
  pub source_spend_keys: Vec<CompressedPoint>,
  /// An explicit payment id, if the caller wants one independent of any integrated address.
  pub payment_id: Option<[u8; cn_core::address::PAYMENT_ID_SIZE]>,
  /// An explicit change address; defaults to the single unambiguous source address.
  pub change_address: Option<String>,
  /// Ring size minus one.
  pub mixin: u64,
  /// Flat fee to pay.
  pub fee: u64,
}

/// The product of a successful build: a signed transaction plus the per-destination transfer
/// records the wallet records into its history.
pub struct BuiltTransaction {
  /// The signed transaction, ready to relay.
  pub transaction: Transaction,
  /// Key images of every output it spends, so the caller can mark them spent in the container.
  pub spent_key_images: Vec<CompressedPoint>,
  /// This transaction's change output(s), owned by one of our own subwallets and ready to be
  /// recorded into the transfers container as unconfirmed. Empty when there was no change or the
  /// change address isn't one of ours (e.g. an explicit external `change_address`).
  pub change_outputs: Vec<OwnedOutput>,
}

/// Resolve destinations, checking for conflicting payment ids (§4.8 step 1).
fn resolve_payment_id(
  destinations: &[Destination],
  explicit: Option<[u8; cn_core::address::PAYMENT_ID_SIZE]>,
) -> Result<Option<[u8; cn_core::address::PAYMENT_ID_SIZE]>, BuildError> {
  let mut decoded_ids = HashSet::new();
  for destination in destinations {
    let decoded = address::decode_address(&destination.address).map_err(FormatError::from)?;
    if let Some(id) = decoded.payment_id {
      decoded_ids.insert(id);
    }
  }
  if decoded_ids.len() > 1 {
    return Err(FormatError::ConflictingPaymentIds.into());
  }
  let from_addresses = decoded_ids.into_iter().next();
  match (from_addresses, explicit) {
    (Some(a), Some(b)) if a != b => Err(FormatError::ConflictingPaymentIds.into()),
    (Some(a), _) => Ok(Some(a)),
    (None, explicit) => Ok(explicit),
  }
}

/// Split `amount` into "pretty" denominations: digits 1-9 times a power of ten.
pub fn decompose_amount(mut amount: u64) -> Vec<u64> {
  let mut out = Vec::new();
  let mut scale = 1u64;
  while amount > 0 {
    let digit = amount % 10;
    if digit != 0 {
      out.push(digit * scale);
    }
    amount /= 10;
    scale *= 10;
  }
  if out.is_empty() {
    out.push(0);
  }
  out
}

/// Recompute the one-time secret key `x = Hs(D‖i) + s` for a stored output, using the recorded
/// transaction public key rather than re-scanning the owning transaction.
fn recover_one_time_secret(view_secret: &Scalar, spend_secret: &Scalar, output: &OwnedOutput) -> Option<Scalar> {
  let tx_public = output.tx_public_key.decompress()?;
  let derivation = generate_key_derivation(&tx_public, view_secret);
  Some(derive_secret_key(&derivation, output.index_in_transaction as u64, spend_secret))
}

/// Select AVAILABLE, spendable outputs from `transfers` summing to at least `needed`, greedily
/// preferring larger outputs first so fewer inputs are used.
fn select_sources(
  transfers: &TransfersContainer,
  source_spend_keys: &[CompressedPoint],
  needed: u64,
  spendable_age: u64,
  now: u64,
) -> Result<Vec<OwnedOutput>, BuildError> {
  let mut candidates: Vec<OwnedOutput> = transfers
    .spendable_outputs(spendable_age, now)
    .filter(|o| source_spend_keys.is_empty() || source_spend_keys.contains(&o.spend_public))
    .filter(|o| o.key_image.is_some() && o.global_index.is_some())
    .cloned()
    .collect();
  candidates.sort_by(|a, b| b.amount.cmp(&a.amount));

  let mut selected = Vec::new();
  let mut total = 0u64;
  for candidate in candidates {
    if total >= needed {
      break;
    }
    total += candidate.amount;
    selected.push(candidate);
  }
  if total < needed {
    return Err(BuildError::InsufficientBalance);
  }
  Ok(selected)
}

/// Build, sign, and return a transaction satisfying `params`. Does not touch the transfers
/// container or relay to the node — the caller does both once this returns successfully, per the
/// pause-synchronizer discipline around mutating wallet state.
pub async fn build_transfer(
  rng: &mut (impl RngCore + CryptoRng),
  node: &dyn Node,
  config: &WalletConfig,
  registry: &SubwalletRegistry,
  transfers: &TransfersContainer,
  current_height: u64,
  now: u64,
  params: &TransferParams,
) -> Result<BuiltTransaction, BuildError> {
  if params.destinations.is_empty() || params.destinations.iter().any(|d| d.amount == 0) {
    return Err(BuildError::InvalidAmount);
  }

  let range = config.mixin_range_at(current_height);
  if params.mixin < range.min || params.mixin > range.max {
    return Err(BuildError::MixinOutOfRange);
  }

  let payment_id = resolve_payment_id(&params.destinations, params.payment_id)?;

  let decoded_destinations: Vec<DecodedAddress> = params
    .destinations
    .iter()
    .map(|d| address::decode_address(&d.address).map_err(FormatError::from).map_err(BuildError::from))
    .collect::<Result<_, _>>()?;

  let destination_total: u64 =
    params.destinations.iter().map(|d| d.amount).try_fold(0u64, |acc, a| acc.checked_add(a)).ok_or(BuildError::InvalidAmount)?;
  let needed = destination_total.checked_add(params.fee).ok_or(BuildError::InvalidAmount)?;

  let sources = select_sources(transfers, &params.source_spend_keys, needed, config.transaction_spendable_age, now)?;
  let input_total: u64 = sources.iter().map(|o| o.amount).sum();
  let change = input_total - needed;

  let change_decoded = if change > 0 {
    let addr = params
      .change_address
      .clone()
      .or_else(|| sources.first().and_then(|s| registry.encode_address(&s.spend_public).ok()))
      .ok_or(BuildError::InvalidAmount)?;
    Some(address::decode_address(&addr).map_err(FormatError::from)?)
  } else {
    None
  };

  // One ephemeral transaction keypair shared by every output.
  let tx_secret = Scalar::random(rng);
  let tx_public = Point::mul_base(&tx_secret);

  let mut outputs = Vec::new();
  let mut output_index = 0u64;
  for (destination, decoded) in params.destinations.iter().zip(&decoded_destinations) {
    for amount in decompose_amount(destination.amount) {
      let derivation = generate_key_derivation(&decoded.view_public.decompress().ok_or(BuildError::InvalidAmount)?, &tx_secret);
      let key = derive_public_key(&derivation, output_index, &decoded.spend_public.decompress().ok_or(BuildError::InvalidAmount)?);
      outputs.push(Output { amount, key: key.compress() });
      output_index += 1;
    }
  }
  // (index, amount) of every change output, so the wallet's own change can be recorded as an
  // owned output below once the transaction hash is known.
  let mut change_indices = Vec::new();
  if let Some(change_decoded) = &change_decoded {
    for amount in decompose_amount(change) {
      let derivation = generate_key_derivation(&change_decoded.view_public.decompress().ok_or(BuildError::InvalidAmount)?, &tx_secret);
      let key = derive_public_key(&derivation, output_index, &change_decoded.spend_public.decompress().ok_or(BuildError::InvalidAmount)?);
      outputs.push(Output { amount, key: key.compress() });
      change_indices.push((output_index, amount));
      output_index += 1;
    }
  }

  let mut extra = vec![0x01];
  extra.extend_from_slice(&tx_public.compress().to_bytes());
  if let Some(id) = payment_id {
    extra.push(0x02);
    extra.push(id.len() as u8);
    extra.extend_from_slice(&id);
  }

  let mut inputs = Vec::with_capacity(sources.len());
  let mut spent_key_images = Vec::with_capacity(sources.len());
  let mut one_time_secrets = Vec::with_capacity(sources.len());
  let mut rings = Vec::with_capacity(sources.len());

  let amounts: Vec<u64> = sources.iter().map(|s| s.amount).collect();
  let decoy_sets = node.get_random_outs_for_amounts(&amounts, params.mixin).await?;

  for (source, decoys) in sources.iter().zip(decoy_sets.iter()) {
    if decoys.len() < params.mixin as usize {
      return Err(BuildError::NotEnoughDecoys);
    }

    let subwallet_spend_secret =
      registry.get_private_spend_key(&source.spend_public).map_err(|_| BuildError::InvalidAmount)?;
    let one_time_secret =
      recover_one_time_secret(registry.view_secret(), &subwallet_spend_secret, source).ok_or(BuildError::InvalidAmount)?;

    // Ring members must be ordered by ascending global index, since `Input::relative_offsets`
    // encodes deltas between successive absolute indices and a verifier reconstructs the ring in
    // that same order.
    let mut members: Vec<(u64, CompressedPoint)> =
      decoys.iter().take(params.mixin as usize).map(|d| (d.global_index, d.key)).collect();
    members.push((source.global_index.ok_or(BuildError::InvalidAmount)?, source.one_time_key));
    members.sort_unstable_by_key(|(index, _)| *index);
    members.dedup_by_key(|(index, _)| *index);

    let absolute: Vec<u64> = members.iter().map(|(index, _)| *index).collect();
    let ring: Vec<CompressedPoint> = members.iter().map(|(_, key)| *key).collect();

    let key_image = source.key_image.ok_or(BuildError::InvalidAmount)?;
    spent_key_images.push(key_image);
    inputs.push(Input::ToKey {
      amount: source.amount,
      key_offsets: Input::relative_offsets(&absolute),
      key_image,
    });
    one_time_secrets.push(one_time_secret);
    rings.push(ring);
  }

  let mut tx = Transaction { unlock_time: Timelock::None, inputs, outputs, extra, signatures: vec![] };
  let prefix_hash = tx.prefix_hash();

  for ((secret, ring), input) in one_time_secrets.iter().zip(&rings).zip(&tx.inputs) {
    let Input::ToKey { key_image, .. } = input else { unreachable!() };
    let real_index = ring.iter().position(|k| {
      let derived = Point::mul_base(secret).compress();
      *k == derived
    }).unwrap_or(0);
    let signature = cn_core::generate_ring_signature(rng, &prefix_hash, ring, key_image, secret, real_index)
      .ok_or(BuildError::InvalidAmount)?;
    tx.signatures.push(signature);
  }

  node.send_raw_transaction(&tx).await?;

  // Record our own change as an owned output, if the change address belongs to one of our
  // subwallets — the common case, since `change_decoded` defaults to a source's own address.
  let mut change_outputs = Vec::new();
  if let Some(change_decoded) = &change_decoded {
    if let Some(subwallet) = registry.get(&change_decoded.spend_public) {
      let view_point = change_decoded.view_public.decompress().ok_or(BuildError::InvalidAmount)?;
      let derivation = generate_key_derivation(&view_point, &tx_secret);
      let tx_hash = tx.hash();
      for (index, amount) in change_indices {
        let output_key = tx.outputs[index as usize].key;
        let key_image = subwallet.spend_secret.as_deref().and_then(|spend_secret| {
          let one_time_secret = derive_secret_key(&derivation, index, spend_secret);
          generate_key_image(&output_key, &one_time_secret)
        });
        change_outputs.push(OwnedOutput {
          transaction_hash: tx_hash,
          index_in_transaction: index as usize,
          spend_public: change_decoded.spend_public,
          one_time_key: output_key,
          tx_public_key: tx_public.compress(),
          key_image,
          amount,
          unlock_time: 0,
          global_index: None,
          block: None,
          state: crate::transfers::TransferState::Unconfirmed,
          spending_transaction_hash: None,
          visible: true,
          seen_unconfirmed_first: true,
        });
      }
    }
  }

  Ok(BuiltTransaction { transaction: tx, spent_key_images, change_outputs })
}

/// Build a fusion transaction: consolidate `inputs` (many small available outputs) into a single
/// self-addressed output, with zero fee.
pub async fn build_fusion(
  rng: &mut (impl RngCore + CryptoRng),
  node: &dyn Node,
  config: &WalletConfig,
  registry: &SubwalletRegistry,
  sources: Vec<OwnedOutput>,
  mixin: u64,
  current_height: u64,
  now: u64,
) -> Result<BuiltTransaction, BuildError> {
  if sources.is_empty() {
    return Err(BuildError::InsufficientBalance);
  }
  let spend_public = sources[0].spend_public;
  let address = registry.encode_address(&spend_public).map_err(|_| BuildError::InvalidAmount)?;
  let total: u64 = sources.iter().map(|s| s.amount).sum();

  let params = TransferParams {
    destinations: vec![Destination { address, amount: total }],
    source_spend_keys: vec![spend_public],
    payment_id: None,
    change_address: None,
    mixin,
    fee: 0,
  };

  // A throwaway container holding exactly `sources`, advanced to the real chain height so
  // `select_sources`'s confirmation-count check against `current_height` evaluates the same way
  // it would against the real container.
  let mut fake_container = TransfersContainer::new();
  for source in &sources {
    fake_container.add_transaction(source.transaction_hash, source.block, vec![source.clone()], &[]).ok();
  }
  fake_container.advance_height(current_height);
  build_transfer(rng, node, config, registry, &fake_container, current_height, now, &params).await
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn decomposes_into_pretty_denominations() {
    assert_eq!(decompose_amount(1234), vec![4, 30, 200, 1000]);
    assert_eq!(decompose_amount(0), vec![0]);
    assert_eq!(decompose_amount(50), vec![50]);
  }
}
