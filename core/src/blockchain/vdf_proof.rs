use crate::blockchain::sized_bytes::{Bytes32, UnsizedBytes};
use serde::{Deserialize, Serialize};

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VdfProof {
    pub challenge: Bytes32,
    pub y: UnsizedBytes,
    pub proof: UnsizedBytes,
    pub witness_type: u8,
    pub iters: u64,
    pub duration: u64,
}

/// A VDF result delivered by a timelord, stored in the proof cache.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProofDetail {
    pub y: UnsizedBytes,
    pub proof: UnsizedBytes,
    pub witness_type: u8,
    pub iters: u64,
    pub duration: u64,
}
impl ProofDetail {
    pub fn into_vdf_proof(self, challenge: Bytes32) -> VdfProof {
        VdfProof {
            challenge,
            y: self.y,
            proof: self.proof,
            witness_type: self.witness_type,
            iters: self.iters,
            duration: self.duration.max(1),
        }
    }
}
