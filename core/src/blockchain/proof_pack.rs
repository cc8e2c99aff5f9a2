use crate::blockchain::proof_of_space::PosProof;
use crate::blockchain::sized_bytes::Bytes32;
use crate::blockchain::vdf_proof::VdfProof;
use std::io::{Error, ErrorKind};

/// Everything the node needs to accept a block for one challenge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProofPack {
    pub prev_block_hash: Bytes32,
    pub prev_block_height: u32,
    pub pos: PosProof,
    pub vdf: VdfProof,
    pub farmer_sk: Bytes32,
    pub reward_dest: String,
}
impl ProofPack {
    pub fn validate(&self) -> Result<(), Error> {
        if self.vdf.challenge != self.pos.challenge {
            Err(Error::new(
                ErrorKind::InvalidInput,
                format!(
                    "VDF challenge {} does not match PoS challenge {}",
                    self.vdf.challenge, self.pos.challenge
                ),
            ))
        } else if self.vdf.iters < self.pos.iters {
            Err(Error::new(
                ErrorKind::InvalidInput,
                format!(
                    "VDF iters {} below required {}",
                    self.vdf.iters, self.pos.iters
                ),
            ))
        } else {
            Ok(())
        }
    }
}
