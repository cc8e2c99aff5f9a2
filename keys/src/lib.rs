use bip39::Mnemonic;
use blst::min_pk::{AggregatePublicKey, PublicKey, SecretKey};
use dg_miner_core::blockchain::proof_of_space::{calculate_plot_id, PlotType, PoolKeyOrHash};
use dg_miner_core::blockchain::sized_bytes::{Bytes32, Bytes48};
use dg_miner_core::traits::KeyEngine;
use dg_miner_core::utils::hash_256;
use hkdf::Hkdf;
use log::debug;
use sha2::Sha256;
use std::collections::HashMap;
use std::io::{Error, ErrorKind};
use std::str::FromStr;

fn _version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
fn _pkg_name() -> &'static str {
    env!("CARGO_PKG_NAME")
}

#[must_use]
pub fn version() -> String {
    format!("{}: {}", _pkg_name(), _version())
}

#[test]
fn test_version() {
    println!("{}", version());
}

pub const BLS_SPEC_NUMBER: u32 = 12381;
pub const BLOCKCHAIN_NUMBER: u32 = 8444;
pub const FARMER_PATH: u32 = 0;
pub const POOL_PATH: u32 = 1;
pub const WALLET_PATH: u32 = 2;
pub const LOCAL_PATH: u32 = 3;

fn invalid<E: std::fmt::Debug>(e: E) -> Error {
    Error::new(ErrorKind::InvalidInput, format!("{e:?}"))
}

fn hmac_extract_expand(length: usize, key: &[u8], salt: &[u8]) -> Result<Vec<u8>, Error> {
    let hk = Hkdf::<Sha256>::new(Some(salt), key);
    let mut out = vec![0u8; length];
    hk.expand(&[], &mut out).map_err(invalid)?;
    Ok(out)
}

/// EIP-2333 compressed lamport public key of the parent, used as child ikm.
fn parent_sk_to_lamport_pk(parent_sk: &SecretKey, index: u32) -> Result<[u8; 32], Error> {
    let salt = index.to_be_bytes();
    let ikm = parent_sk.to_bytes();
    let not_ikm: Vec<u8> = ikm.iter().map(|e| e ^ 0xFF).collect();
    let lamport0 = hmac_extract_expand(32 * 255, &ikm, &salt)?;
    let lamport1 = hmac_extract_expand(32 * 255, &not_ikm, &salt)?;
    let mut lamport_pk = Vec::with_capacity(32 * 255 * 2);
    for chunk in lamport0.chunks(32).chain(lamport1.chunks(32)) {
        lamport_pk.extend_from_slice(&hash_256(chunk));
    }
    Ok(hash_256(&lamport_pk))
}

fn derive_child_sk(key: &SecretKey, index: u32) -> Result<SecretKey, Error> {
    let lamport_pk = parent_sk_to_lamport_pk(key, index)?;
    SecretKey::key_gen_v3(&lamport_pk, &[]).map_err(invalid)
}

pub fn derive_path(key: &SecretKey, paths: &[u32]) -> Result<SecretKey, Error> {
    let mut key = key.clone();
    for index in paths {
        key = derive_child_sk(&key, *index)?;
    }
    Ok(key)
}

pub fn master_sk_to_farmer_sk(key: &SecretKey) -> Result<SecretKey, Error> {
    derive_path(key, &[BLS_SPEC_NUMBER, BLOCKCHAIN_NUMBER, FARMER_PATH, 0])
}

pub fn master_sk_to_local_sk(key: &SecretKey) -> Result<SecretKey, Error> {
    derive_path(key, &[BLS_SPEC_NUMBER, BLOCKCHAIN_NUMBER, LOCAL_PATH, 0])
}

pub fn key_from_mnemonic_str(mnemonic: &str) -> Result<SecretKey, Error> {
    let mnemonic = Mnemonic::from_str(mnemonic.trim()).map_err(invalid)?;
    let seed = mnemonic.to_seed("");
    SecretKey::key_gen_v3(&seed, &[]).map_err(invalid)
}

pub fn secret_key_from_bytes(bytes: &Bytes32) -> Result<SecretKey, Error> {
    SecretKey::from_bytes(bytes.as_ref()).map_err(invalid)
}

pub fn public_key_from_bytes(bytes: &Bytes48) -> Result<PublicKey, Error> {
    PublicKey::from_bytes(bytes.as_ref()).map_err(invalid)
}

pub fn aggregate_public_keys(keys: &[&PublicKey]) -> Result<PublicKey, Error> {
    AggregatePublicKey::aggregate(keys, false)
        .map(|agg| agg.to_public_key())
        .map_err(invalid)
}

pub fn generate_taproot_sk(local_pk: &PublicKey, farmer_pk: &PublicKey) -> Result<SecretKey, Error> {
    let aggregated = aggregate_public_keys(&[local_pk, farmer_pk])?;
    let mut taproot_message = Vec::with_capacity(48 * 3);
    taproot_message.extend(aggregated.to_bytes());
    taproot_message.extend(local_pk.to_bytes());
    taproot_message.extend(farmer_pk.to_bytes());
    SecretKey::key_gen_v3(&hash_256(&taproot_message), &[]).map_err(invalid)
}

/// OG plots commit to `local + farmer`, pooled plots add a taproot key on top.
pub fn generate_plot_public_key(
    local_pk: &PublicKey,
    farmer_pk: &PublicKey,
    plot_type: PlotType,
) -> Result<PublicKey, Error> {
    match plot_type {
        PlotType::OgPlot => aggregate_public_keys(&[local_pk, farmer_pk]),
        PlotType::PooledPlot => {
            let taproot_pk = generate_taproot_sk(local_pk, farmer_pk)?.sk_to_pk();
            aggregate_public_keys(&[local_pk, farmer_pk, &taproot_pk])
        }
    }
}

/// Farmer public to secret key for every mnemonic the miner is configured with.
pub fn farmer_keys_from_seeds(seeds: &[String]) -> Result<HashMap<Bytes48, Bytes32>, Error> {
    let mut keys = HashMap::new();
    for seed in seeds {
        let master = key_from_mnemonic_str(seed)?;
        let farmer_sk = master_sk_to_farmer_sk(&master)?;
        let farmer_pk = Bytes48::from(farmer_sk.sk_to_pk().to_bytes());
        debug!("Loaded farmer key {farmer_pk}");
        keys.insert(farmer_pk, Bytes32::from(farmer_sk.to_bytes()));
    }
    Ok(keys)
}

#[derive(Debug, Default, Copy, Clone)]
pub struct BlsKeyEngine;

impl KeyEngine for BlsKeyEngine {
    fn local_public_key(&self, local_master_sk: &Bytes32) -> Result<Bytes48, Error> {
        let master = secret_key_from_bytes(local_master_sk)?;
        let local_sk = master_sk_to_local_sk(&master)?;
        Ok(Bytes48::from(local_sk.sk_to_pk().to_bytes()))
    }

    fn plot_id(
        &self,
        local_pk: &Bytes48,
        farmer_pk: &Bytes48,
        pool_key_or_hash: &PoolKeyOrHash,
    ) -> Result<Bytes32, Error> {
        let plot_pk = generate_plot_public_key(
            &public_key_from_bytes(local_pk)?,
            &public_key_from_bytes(farmer_pk)?,
            pool_key_or_hash.plot_type(),
        )?;
        Ok(calculate_plot_id(
            pool_key_or_hash,
            &Bytes48::from(plot_pk.to_bytes()),
        ))
    }
}
