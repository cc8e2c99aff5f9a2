use crate::blockchain::proof_of_space::PoolKeyOrHash;
use crate::blockchain::sized_bytes::{Bytes32, Bytes48};
use crate::blockchain::vdf_proof::VdfProof;
use std::io::Error;

/// BLS operations the miner needs to check plot ownership.
pub trait KeyEngine: Send + Sync {
    fn local_public_key(&self, local_master_sk: &Bytes32) -> Result<Bytes48, Error>;
    fn plot_id(
        &self,
        local_pk: &Bytes48,
        farmer_pk: &Bytes48,
        pool_key_or_hash: &PoolKeyOrHash,
    ) -> Result<Bytes32, Error>;
}

/// Local VDF verification, only used for diagnostics. The node decides validity.
pub trait VdfVerifier: Send + Sync {
    fn verify(&self, proof: &VdfProof) -> bool;
}
