use crate::blockchain::sized_bytes::Bytes32;
use crate::blockchain::vdf_proof::VdfProof;
use serde::{Deserialize, Serialize};

/// One consensus round as reported by the node's `querychallenge`.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Challenge {
    pub challenge: Bytes32,
    pub difficulty: u64,
    pub prev_block_hash: Bytes32,
    pub prev_block_height: u32,
    pub prev_vdf_iters: u64,
    pub prev_vdf_duration: u64,
    pub target_height: u32,
    pub target_duration: u64,
    pub filter_bits: u8,
    pub base_iters: u64,
    #[serde(default)]
    pub vdf_proofs: Vec<VdfProof>,
}
impl Challenge {
    /// Iterations the previous block needed per second, scaled to a full day.
    /// Used as the wait target when no local proof qualifies this round.
    pub fn one_day_iters(&self) -> u64 {
        self.prev_vdf_iters / self.prev_vdf_duration.max(1) * 60 * 60 * 24
    }

    /// First node-reported VDF proof for this challenge covering `iters`.
    pub fn find_vdf_proof(&self, iters: u64) -> Option<&VdfProof> {
        self.vdf_proofs
            .iter()
            .find(|p| p.challenge == self.challenge && p.iters >= iters)
    }
}
