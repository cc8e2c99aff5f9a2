use async_trait::async_trait;
use dg_miner_core::blockchain::challenge::Challenge;
use dg_miner_core::blockchain::proof_pack::ProofPack;
use dg_miner_core::blockchain::sized_bytes::Bytes32;
use std::io::Error;

/// Calls the miner makes against its node. Transport failures and errors
/// reported by the node come back as `NodeError` wrapped in `io::Error`.
#[async_trait]
pub trait NodeAPI: Send + Sync {
    async fn check_ready(&self) -> Result<bool, Error>;
    async fn query_challenge(&self) -> Result<Challenge, Error>;
    async fn submit_vdf_request(&self, challenge: &Bytes32, iters: u64) -> Result<bool, Error>;
    async fn submit_proof(&self, proof_pack: &ProofPack) -> Result<(), Error>;
    /// Re-reads credentials from the cookie file. Returns false when the
    /// client is not cookie based.
    fn reload_cookie(&self) -> Result<bool, Error> {
        Ok(false)
    }
}
