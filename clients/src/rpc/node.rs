use crate::api::node::NodeAPI;
use crate::api::pledge::PledgeAPI;
use crate::rpc::{get_client, read_cookie, rpc_call, Credentials};
use async_trait::async_trait;
use dg_miner_core::blockchain::challenge::Challenge;
use dg_miner_core::blockchain::pledge::{BindRecord, DepositTerm, MiningRequirement, PledgeParams};
use dg_miner_core::blockchain::proof_of_space::PosProof;
use dg_miner_core::blockchain::proof_pack::ProofPack;
use dg_miner_core::blockchain::sized_bytes::Bytes32;
use dg_miner_core::blockchain::vdf_proof::VdfProof;
use dg_miner_core::config::RpcConfig;
use log::info;
use parking_lot::RwLock;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use std::io::{Error, ErrorKind};
use std::path::PathBuf;

pub struct NodeClient {
    client: Client,
    url: String,
    cookie_path: Option<PathBuf>,
    credentials: RwLock<Credentials>,
}

impl NodeClient {
    /// Uses the configured user and password when both are set, otherwise
    /// reads them from `cookie_path`.
    pub fn new(
        rpc: &RpcConfig,
        no_proxy: bool,
        cookie_path: Option<PathBuf>,
    ) -> Result<Self, Error> {
        let (credentials, cookie_path) = if !rpc.user.is_empty() && !rpc.password.is_empty() {
            (
                Credentials {
                    user: rpc.user.clone(),
                    password: rpc.password.clone(),
                },
                None,
            )
        } else {
            let path = cookie_path.ok_or_else(|| {
                Error::new(
                    ErrorKind::InvalidInput,
                    "cookie is empty, cannot connect to the node",
                )
            })?;
            (read_cookie(&path)?, Some(path))
        };
        let url = if rpc.wallet.is_empty() {
            rpc.host.clone()
        } else {
            format!("{}/wallet/{}", rpc.host.trim_end_matches('/'), rpc.wallet)
        };
        Ok(NodeClient {
            client: get_client(no_proxy)?,
            url,
            cookie_path,
            credentials: RwLock::new(credentials),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn cookie_path(&self) -> Option<&PathBuf> {
        self.cookie_path.as_ref()
    }

    async fn call<T: serde::de::DeserializeOwned>(
        &self,
        method: &str,
        params: Vec<Value>,
    ) -> Result<T, Error> {
        let credentials = self.credentials.read().clone();
        rpc_call(&self.client, &self.url, &credentials, method, params).await
    }
}

pub fn pos_params(pos: &PosProof) -> Value {
    json!({
        "challenge": pos.challenge.to_string(),
        "k": pos.k,
        "pool_pk_or_hash": pos.pool_pk_or_hash.to_string(),
        "plot_type": pos.pool_pk_or_hash.plot_type() as u8,
        "local_pk": pos.local_pk.to_string(),
        "proof": pos.proof.to_string(),
    })
}

pub fn vdf_params(vdf: &VdfProof) -> Value {
    json!({
        "challenge": vdf.challenge.to_string(),
        "y": vdf.y.to_string(),
        "proof": vdf.proof.to_string(),
        "iters": vdf.iters,
        "witness_type": vdf.witness_type,
        "duration": vdf.duration,
    })
}

pub fn submit_proof_params(proof_pack: &ProofPack) -> Vec<Value> {
    vec![
        json!(proof_pack.prev_block_hash.to_string()),
        json!(proof_pack.prev_block_height),
        json!(proof_pack.pos.challenge.to_string()),
        pos_params(&proof_pack.pos),
        json!(proof_pack.farmer_sk.to_string()),
        vdf_params(&proof_pack.vdf),
        json!(proof_pack.reward_dest),
    ]
}

#[async_trait]
impl NodeAPI for NodeClient {
    async fn check_ready(&self) -> Result<bool, Error> {
        self.call("checkchiapos", vec![]).await
    }

    async fn query_challenge(&self) -> Result<Challenge, Error> {
        self.call("querychallenge", vec![]).await
    }

    async fn submit_vdf_request(&self, challenge: &Bytes32, iters: u64) -> Result<bool, Error> {
        self.call(
            "submitvdfrequest",
            vec![json!(challenge.to_string()), json!(iters)],
        )
        .await
    }

    async fn submit_proof(&self, proof_pack: &ProofPack) -> Result<(), Error> {
        let _: Value = self
            .call("submitproof", submit_proof_params(proof_pack))
            .await?;
        Ok(())
    }

    fn reload_cookie(&self) -> Result<bool, Error> {
        match &self.cookie_path {
            Some(path) if path.exists() => {
                *self.credentials.write() = read_cookie(path)?;
                info!("cookie is reloaded from {}", path.display());
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

#[derive(Deserialize)]
struct MiningRequirementReply {
    summary: MiningRequirement,
}

#[async_trait]
impl PledgeAPI for NodeClient {
    async fn query_netspace(&self) -> Result<PledgeParams, Error> {
        self.call("querynetspace", vec![]).await
    }

    async fn bind_plotter(
        &self,
        address: &str,
        farmer_sk: &Bytes32,
        spend_height: u32,
    ) -> Result<Bytes32, Error> {
        self.call(
            "bindchiaplotter",
            vec![
                json!(address),
                json!(farmer_sk.to_string()),
                json!(spend_height.to_string()),
            ],
        )
        .await
    }

    async fn list_bind_plotters(
        &self,
        address: &str,
        count: u32,
        skip: u32,
        include_watchonly: bool,
        include_invalid: bool,
    ) -> Result<Vec<BindRecord>, Error> {
        self.call(
            "listbindplotters",
            vec![
                json!(count),
                json!(skip),
                json!(include_watchonly),
                json!(include_invalid),
                json!(address),
            ],
        )
        .await
    }

    async fn send_pledge_to_address(
        &self,
        address: &str,
        amount: u64,
        term: DepositTerm,
    ) -> Result<Bytes32, Error> {
        self.call(
            "sendpledgetoaddress",
            vec![
                json!(address),
                json!(amount),
                json!("no comment"),
                json!("no comment"),
                json!(false),
                json!(false),
                json!(1),
                json!("UNSET"),
                json!(term),
            ],
        )
        .await
    }

    async fn withdraw_pledge(&self, tx_id: &Bytes32) -> Result<Bytes32, Error> {
        self.call("withdrawpledge", vec![json!(tx_id.to_string())])
            .await
    }

    async fn retarget_pledge(&self, tx_id: &Bytes32, address: &str) -> Result<Bytes32, Error> {
        self.call(
            "retargetpledge",
            vec![json!(tx_id.to_string()), json!(address)],
        )
        .await
    }

    async fn query_mining_requirement(&self, address: &str) -> Result<MiningRequirement, Error> {
        let reply: MiningRequirementReply = self
            .call("queryminingrequirement", vec![json!(address)])
            .await?;
        Ok(reply.summary)
    }

    async fn generate_burst_blocks(&self, count: u32) -> Result<bool, Error> {
        self.call("generateburstblocks", vec![json!(count)]).await
    }
}
