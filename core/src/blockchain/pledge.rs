use crate::blockchain::sized_bytes::Bytes32;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lock-up period of a pledge deposit.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DepositTerm {
    #[default]
    NoTerm,
    Term1,
    Term2,
    Term3,
}
impl fmt::Display for DepositTerm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DepositTerm::NoTerm => "noterm",
            DepositTerm::Term1 => "term1",
            DepositTerm::Term2 => "term2",
            DepositTerm::Term3 => "term3",
        };
        f.write_str(name)
    }
}

/// Answer of `querynetspace`.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PledgeParams {
    #[serde(rename = "netCapacityTB")]
    pub net_capacity_tb: u64,
    #[serde(rename = "calculatedOnHeight")]
    pub calculated_on_height: u32,
    pub supplied: u64,
}

/// A plotter binding transaction listed by `listbindplotters`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BindRecord {
    #[serde(rename = "txid")]
    pub tx_id: Bytes32,
    pub address: String,
    #[serde(rename = "plotterId")]
    pub farmer_pk: String,
    #[serde(rename = "blockhash", default)]
    pub block_hash: Option<Bytes32>,
    #[serde(rename = "blockheight", default)]
    pub block_height: u32,
    pub active: bool,
    #[serde(default)]
    pub valid: bool,
}

/// Pledge summary of an address, the `summary` object of `queryminingrequirement`.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MiningRequirement {
    pub address: String,
    #[serde(rename = "require")]
    pub required: i64,
    #[serde(rename = "mined")]
    pub mined_count: u32,
    #[serde(rename = "count")]
    pub total_count: u32,
    pub burned: i64,
    pub supplied: i64,
    pub accumulate: i64,
    pub height: u32,
    #[serde(rename = "calc-height", default)]
    pub calc_height: u32,
}
