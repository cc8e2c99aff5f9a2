use async_trait::async_trait;
use dg_miner_core::blockchain::pledge::{BindRecord, DepositTerm, MiningRequirement, PledgeParams};
use dg_miner_core::blockchain::sized_bytes::Bytes32;
use std::io::Error;

/// Wallet-side node calls for plotter binding and pledges. The mining loop
/// does not use them.
#[async_trait]
pub trait PledgeAPI {
    async fn query_netspace(&self) -> Result<PledgeParams, Error>;
    async fn bind_plotter(
        &self,
        address: &str,
        farmer_sk: &Bytes32,
        spend_height: u32,
    ) -> Result<Bytes32, Error>;
    async fn list_bind_plotters(
        &self,
        address: &str,
        count: u32,
        skip: u32,
        include_watchonly: bool,
        include_invalid: bool,
    ) -> Result<Vec<BindRecord>, Error>;
    async fn send_pledge_to_address(
        &self,
        address: &str,
        amount: u64,
        term: DepositTerm,
    ) -> Result<Bytes32, Error>;
    async fn withdraw_pledge(&self, tx_id: &Bytes32) -> Result<Bytes32, Error>;
    async fn retarget_pledge(&self, tx_id: &Bytes32, address: &str) -> Result<Bytes32, Error>;
    async fn query_mining_requirement(&self, address: &str) -> Result<MiningRequirement, Error>;
    async fn generate_burst_blocks(&self, count: u32) -> Result<bool, Error>;
}
