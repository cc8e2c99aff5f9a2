use crate::blockchain::sized_bytes::{Bytes32, Bytes48, UnsizedBytes};
use crate::plots::PlotMemo;
use crate::utils::hash_256;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PlotType {
    OgPlot = 0,
    PooledPlot = 1,
}

/// OG plots commit to a pool public key, pooled plots to a pool contract puzzle hash.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum PoolKeyOrHash {
    PublicKey(Bytes48),
    PuzzleHash(Bytes32),
}
impl PoolKeyOrHash {
    pub fn plot_type(&self) -> PlotType {
        match self {
            PoolKeyOrHash::PublicKey(_) => PlotType::OgPlot,
            PoolKeyOrHash::PuzzleHash(_) => PlotType::PooledPlot,
        }
    }
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            PoolKeyOrHash::PublicKey(pk) => pk.as_ref(),
            PoolKeyOrHash::PuzzleHash(ph) => ph.as_ref(),
        }
    }
}
impl fmt::Display for PoolKeyOrHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.as_bytes()))
    }
}

/// One raw answer read from a plot for a challenge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PosCandidate {
    pub plot_path: PathBuf,
    pub plot_id: Bytes32,
    pub index: usize,
    pub k: u8,
    pub quality_string: UnsizedBytes,
    pub memo: PlotMemo,
}

/// The selected proof of space, ready to be paired with a VDF.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PosProof {
    pub challenge: Bytes32,
    pub k: u8,
    pub plot_id: Bytes32,
    pub pool_pk_or_hash: PoolKeyOrHash,
    pub local_pk: Bytes48,
    pub proof: UnsizedBytes,
    pub mixed_quality_string: Bytes32,
    pub iters: u64,
}

pub fn calculate_plot_id(pool_pk_or_hash: &PoolKeyOrHash, plot_public_key: &Bytes48) -> Bytes32 {
    let mut to_hash: Vec<u8> = Vec::with_capacity(96);
    to_hash.extend_from_slice(pool_pk_or_hash.as_bytes());
    to_hash.extend_from_slice(plot_public_key.as_ref());
    Bytes32::from(hash_256(&to_hash))
}

/// A plot takes part in a round only when the leading `filter_bits` bits of
/// `sha256(plot_id || challenge)`, both in word order, are zero.
pub fn passes_plot_filter(filter_bits: u8, plot_id: &Bytes32, challenge: &Bytes32) -> bool {
    if filter_bits == 0 {
        return true;
    }
    let mut to_hash: Vec<u8> = Vec::with_capacity(64);
    to_hash.extend_from_slice(&plot_id.to_word_order());
    to_hash.extend_from_slice(&challenge.to_word_order());
    let hashed = hash_256(&to_hash);
    let bits = u32::from(filter_bits.min(255));
    let full_bytes = (bits / 8) as usize;
    if hashed[..full_bytes].iter().any(|b| *b != 0) {
        return false;
    }
    let rem = bits % 8;
    rem == 0 || hashed[full_bytes] >> (8 - rem) == 0
}
