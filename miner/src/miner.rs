use crate::context::MinerContext;
use dg_miner_clients::api::node::NodeAPI;
use dg_miner_clients::timelord::fleet::TimelordFleet;
use dg_miner_core::blockchain::challenge::Challenge;
use dg_miner_core::blockchain::proof_of_space::PosProof;
use dg_miner_core::blockchain::proof_pack::ProofPack;
use dg_miner_core::blockchain::sized_bytes::Bytes32;
use dg_miner_core::blockchain::vdf_proof::VdfProof;
use dg_miner_core::consensus::difficulty::calculate_network_space;
use dg_miner_core::consensus::quality::select_best;
use dg_miner_core::constants::{CHECKING_VDF_INTERVAL_SECS, DEFAULT_VDF_SPEED};
use dg_miner_core::errors::{classify_error, ErrorClass};
use dg_miner_core::plots::PlotStore;
use dg_miner_core::proof_cache::ProofCache;
use dg_miner_core::traits::{KeyEngine, VdfVerifier};
use dg_miner_core::utils::format_time;
use log::{debug, error, info, warn};
use std::collections::HashSet;
use std::fmt;
use std::io::Error;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, Instant};

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum MinerState {
    RequireChallenge,
    FindPoS,
    WaitVDF,
    ProcessVDF,
    SubmitProofs,
}
impl fmt::Display for MinerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MinerState::RequireChallenge => "RequireChallenge",
            MinerState::FindPoS => "FindPoS",
            MinerState::WaitVDF => "WaitVDF",
            MinerState::ProcessVDF => "ProcessVDF",
            MinerState::SubmitProofs => "SubmitProofs",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BreakReason {
    ChallengeIsChanged,
    VDFIsAcquired(VdfProof),
    Timeout,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MinerExit {
    Stopped,
    PlotIdMismatch { plot_path: PathBuf },
}
impl MinerExit {
    pub fn code(&self) -> i32 {
        match self {
            MinerExit::Stopped => 0,
            MinerExit::PlotIdMismatch { .. } => 1,
        }
    }
}

pub struct Miner<N: NodeAPI, S: PlotStore, K: KeyEngine> {
    node: Arc<N>,
    plots: Arc<S>,
    keys: K,
    cache: Arc<ProofCache>,
    fleet: Option<TimelordFleet>,
    verifier: Option<Arc<dyn VdfVerifier>>,
    context: MinerContext,
    run: Arc<AtomicBool>,
    state: MinerState,
    queried_challenge: Challenge,
    current_challenge: Option<Bytes32>,
    current_iters: u64,
    pos: Option<PosProof>,
    vdf: Option<VdfProof>,
    farmer_sk: Option<Bytes32>,
    vdf_speed: u64,
    submit_history: HashSet<Bytes32>,
}

impl<N: NodeAPI, S: PlotStore, K: KeyEngine> Miner<N, S, K> {
    pub fn new(
        node: Arc<N>,
        plots: Arc<S>,
        keys: K,
        cache: Arc<ProofCache>,
        context: MinerContext,
        run: Arc<AtomicBool>,
    ) -> Self {
        Miner {
            node,
            plots,
            keys,
            cache,
            fleet: None,
            verifier: None,
            context,
            run,
            state: MinerState::RequireChallenge,
            queried_challenge: Challenge::default(),
            current_challenge: None,
            current_iters: 0,
            pos: None,
            vdf: None,
            farmer_sk: None,
            vdf_speed: DEFAULT_VDF_SPEED,
            submit_history: HashSet::new(),
        }
    }

    pub fn with_fleet(mut self, fleet: TimelordFleet) -> Self {
        self.fleet = Some(fleet);
        self
    }

    pub fn with_verifier(mut self, verifier: Arc<dyn VdfVerifier>) -> Self {
        self.verifier = Some(verifier);
        self
    }

    pub fn state(&self) -> MinerState {
        self.state
    }

    pub fn current_challenge(&self) -> Option<Bytes32> {
        self.current_challenge
    }

    pub fn current_iters(&self) -> u64 {
        self.current_iters
    }

    pub fn pos(&self) -> Option<&PosProof> {
        self.pos.as_ref()
    }

    pub fn vdf(&self) -> Option<&VdfProof> {
        self.vdf.as_ref()
    }

    pub fn vdf_speed(&self) -> u64 {
        self.vdf_speed
    }

    pub fn is_submitted(&self, challenge: &Bytes32) -> bool {
        self.submit_history.contains(challenge)
    }

    /// Runs until the run flag is cleared or a fatal error occurs. Recoverable
    /// errors are logged and retried after a backoff.
    pub async fn run(&mut self) -> MinerExit {
        while self.run.load(Ordering::Relaxed) {
            info!("==== Status: {} ====", self.state);
            match self.step().await {
                Ok(Some(exit)) => return exit,
                Ok(None) => {}
                Err(e) => self.recover(e).await,
            }
        }
        MinerExit::Stopped
    }

    async fn recover(&self, e: Error) {
        match classify_error(&e) {
            ErrorClass::Net => {
                error!("{e}");
                match self.node.reload_cookie() {
                    Ok(true) => debug!("credentials reloaded"),
                    Ok(false) => {}
                    Err(e) => error!("Failed to reload cookie: {e}"),
                }
            }
            ErrorClass::Rpc => error!("{e}"),
            ErrorClass::Other => error!("Mining error: {e}"),
        }
        sleep(self.context.timings.error_backoff).await;
    }

    /// Executes the current state once and moves to the next one.
    pub async fn step(&mut self) -> Result<Option<MinerExit>, Error> {
        match self.state {
            MinerState::RequireChallenge => self.require_challenge().await?,
            MinerState::FindPoS => return Ok(self.find_pos().await),
            MinerState::WaitVDF => self.wait_vdf().await,
            MinerState::ProcessVDF => {
                if self.pos.is_some() {
                    info!("all proofs are ready to submit");
                    self.state = MinerState::SubmitProofs;
                } else {
                    info!("no valid PoS, trying to find another one");
                    self.state = MinerState::FindPoS;
                }
            }
            MinerState::SubmitProofs => self.submit_proofs().await,
        }
        Ok(None)
    }

    async fn require_challenge(&mut self) -> Result<(), Error> {
        if !self.node.check_ready().await? {
            error!("chiapos is not ready!");
            sleep(self.context.timings.not_ready_wait).await;
            return Ok(());
        }
        info!("chia pos is ready");
        self.pos = None;
        self.vdf = None;
        self.farmer_sk = None;
        self.current_challenge = None;
        self.current_iters = 0;
        if let Some(fleet) = &self.fleet {
            fleet.clear_active();
        }
        let challenge = self.node.query_challenge().await?;
        if self.submit_history.contains(&challenge.challenge) {
            info!("proof is already submitted, waiting for next challenge...");
            self.queried_challenge = challenge;
            sleep(self.context.timings.duplicate_wait).await;
            return Ok(());
        }
        info!(
            "challenge is ready: {}, target height: {}, filter_bits: {}, difficulty: {}, base_iters: {}",
            challenge.challenge,
            challenge.target_height,
            challenge.filter_bits,
            challenge.difficulty,
            challenge.base_iters
        );
        info!(
            "estimated network space: {}",
            calculate_network_space(
                challenge.difficulty,
                challenge.prev_vdf_iters,
                self.context.dcf_bits
            )
        );
        self.cache.retain_only(&challenge.challenge);
        self.current_challenge = Some(challenge.challenge);
        self.queried_challenge = challenge;
        self.state = MinerState::FindPoS;
        Ok(())
    }

    /// Without a usable PoS the miner still waits a day's worth of iterations
    /// so a challenge change is noticed.
    fn wait_without_pos(&mut self, challenge: &Challenge) {
        self.current_iters = challenge.one_day_iters();
        self.state = MinerState::WaitVDF;
    }

    async fn find_pos(&mut self) -> Option<MinerExit> {
        let challenge = self.queried_challenge.clone();
        info!(
            "finding PoS for challenge: {}, dcf_bits: {}, filter_bits: {}",
            challenge.challenge, self.context.dcf_bits, challenge.filter_bits
        );
        let candidates = match self
            .plots
            .candidates_for(&challenge.challenge, challenge.filter_bits)
            .await
        {
            Ok(candidates) => candidates,
            Err(e) => {
                error!("cannot query qualities: {e}");
                vec![]
            }
        };
        let best = if candidates.is_empty() {
            None
        } else {
            match select_best(
                &candidates,
                &challenge.challenge,
                challenge.difficulty,
                challenge.filter_bits,
                self.context.dcf_bits,
                challenge.base_iters,
            ) {
                Ok(best) => Some(best),
                Err(e) => {
                    warn!("{e}");
                    None
                }
            }
        };
        let Some(best) = best else {
            info!("PoS cannot be found");
            self.wait_without_pos(&challenge);
            return None;
        };
        let candidate = best.candidate;
        let memo = &candidate.memo;
        let farmer_pk = memo.farmer_public_key;
        let Some(farmer_sk) = self.context.farmer_keys.get(&farmer_pk).copied() else {
            let removed = self.plots.revoke_by_farmer_key(&farmer_pk);
            error!(
                "No corresponding secret key can be found for farmer public-key: {farmer_pk}, \
                 {removed} related plot(s) are removed, total {} plot(s) remain",
                self.plots.plot_count()
            );
            self.state = MinerState::FindPoS;
            return None;
        };
        let derived = self
            .keys
            .local_public_key(&memo.local_master_secret_key)
            .and_then(|local_pk| {
                self.keys
                    .plot_id(&local_pk, &farmer_pk, &memo.pool_key_or_hash)
                    .map(|plot_id| (local_pk, plot_id))
            });
        let (local_pk, plot_id) = match derived {
            Ok(derived) => derived,
            Err(e) => {
                error!(
                    "cannot derive plot id for {}: {e}",
                    candidate.plot_path.display()
                );
                self.wait_without_pos(&challenge);
                return None;
            }
        };
        if plot_id != candidate.plot_id {
            error!(
                "!!! Invalid mnemonic! Please check and fix your configure file! Plot path: {}",
                candidate.plot_path.display()
            );
            return Some(MinerExit::PlotIdMismatch {
                plot_path: candidate.plot_path.clone(),
            });
        }
        let proof = match self
            .plots
            .full_proof(&candidate.plot_path, &challenge.challenge, candidate.index)
            .await
        {
            Ok(proof) => proof,
            Err(e) => {
                error!(
                    "cannot read full proof from {}: {e}",
                    candidate.plot_path.display()
                );
                self.wait_without_pos(&challenge);
                return None;
            }
        };
        info!(
            "calculated, iters={}, with k={}, difficulty={}, dcf_bits={}, farmer-pk: {farmer_pk}",
            best.iters, candidate.k, challenge.difficulty, self.context.dcf_bits
        );
        self.current_iters = best.iters;
        self.farmer_sk = Some(farmer_sk);
        self.pos = Some(PosProof {
            challenge: challenge.challenge,
            k: candidate.k,
            plot_id: candidate.plot_id,
            pool_pk_or_hash: memo.pool_key_or_hash,
            local_pk,
            proof,
            mixed_quality_string: best.mixed_quality_string,
            iters: best.iters,
        });
        self.state = MinerState::WaitVDF;
        None
    }

    async fn wait_vdf(&mut self) {
        let estimate = self.current_iters / self.vdf_speed.max(1);
        info!(
            "request VDF proof for challenge: {}, iters: {}",
            self.queried_challenge.challenge, self.current_iters
        );
        info!(
            "estimate time: {estimate} seconds ({}), vdf speed={} ips, waiting for VDF proof...",
            format_time(estimate),
            self.vdf_speed
        );
        let timeout = Duration::from_secs_f64(
            self.queried_challenge.target_duration as f64 * self.context.timings.vdf_timeout_factor,
        );
        match self.check_and_break(timeout).await {
            BreakReason::ChallengeIsChanged => {
                info!("!!!!! Challenge is changed !!!!!");
                self.state = MinerState::RequireChallenge;
            }
            BreakReason::VDFIsAcquired(vdf) => {
                info!("a VDF proof has been received");
                if vdf.duration >= 3 {
                    self.vdf_speed = vdf.iters / vdf.duration;
                    info!("vdf speed is updated to {} ips", self.vdf_speed);
                }
                if let Some(verifier) = &self.verifier {
                    if !verifier.verify(&vdf) {
                        warn!("VDF proof for {} failed local verification", vdf.challenge);
                    }
                }
                self.vdf = Some(vdf);
                self.state = MinerState::ProcessVDF;
            }
            BreakReason::Timeout => {
                info!("VDF wait timed out, requesting again");
                self.state = MinerState::WaitVDF;
            }
            BreakReason::Error => self.state = MinerState::RequireChallenge,
        }
    }

    /// Requests the VDF from the node and every timelord, then polls until a
    /// proof covers `current_iters`, the challenge moves on or `timeout` elapses.
    pub async fn check_and_break(&self, timeout: Duration) -> BreakReason {
        let challenge = self.queried_challenge.challenge;
        let iters = self.current_iters;
        if let Err(e) = self.node.submit_vdf_request(&challenge, iters).await {
            debug!("Ignored error message from rpc 'vdf request' -> {e}");
        }
        if let Some(fleet) = &self.fleet {
            debug!("request proof from timelord");
            fleet.broadcast(
                challenge,
                iters,
                self.plots.group_hash(),
                self.plots.total_size(),
                CHECKING_VDF_INTERVAL_SECS,
            );
        }
        let start = Instant::now();
        while self.run.load(Ordering::Relaxed) {
            if start.elapsed() >= timeout {
                return BreakReason::Timeout;
            }
            match self.node.query_challenge().await {
                Ok(ch) => {
                    if ch.challenge != challenge {
                        return BreakReason::ChallengeIsChanged;
                    }
                    if let Some(vdf) = ch.find_vdf_proof(iters) {
                        return BreakReason::VDFIsAcquired(vdf.clone());
                    }
                    if let Some(detail) = self.cache.best_at_least(&challenge, iters) {
                        info!("queried vdf proof from timelord");
                        return BreakReason::VDFIsAcquired(detail.into_vdf_proof(challenge));
                    }
                    sleep(self.context.timings.poll_tick).await;
                }
                Err(e) => match classify_error(&e) {
                    ErrorClass::Net => {
                        error!("{e}");
                        return BreakReason::Error;
                    }
                    ErrorClass::Rpc => {
                        debug!("{e}");
                        sleep(self.context.timings.rpc_error_wait).await;
                    }
                    ErrorClass::Other => {
                        error!("unknown error: {e}");
                        return BreakReason::Error;
                    }
                },
            }
        }
        BreakReason::Error
    }

    async fn submit_proofs(&mut self) {
        info!("preparing proofs");
        let (Some(pos), Some(vdf), Some(farmer_sk)) =
            (self.pos.clone(), self.vdf.clone(), self.farmer_sk)
        else {
            error!("proofs are incomplete, dropping this round");
            self.state = MinerState::RequireChallenge;
            return;
        };
        let proof_pack = ProofPack {
            prev_block_hash: self.queried_challenge.prev_block_hash,
            prev_block_height: self.queried_challenge.prev_block_height,
            pos,
            vdf,
            farmer_sk,
            reward_dest: self.context.reward_dest.clone(),
        };
        let submitted = match proof_pack.validate() {
            Ok(()) => self.node.submit_proof(&proof_pack).await,
            Err(e) => Err(e),
        };
        match submitted {
            Ok(()) => {
                self.submit_history.insert(self.queried_challenge.challenge);
                info!("$$$$$ Proofs have been submitted $$$$$");
            }
            Err(e) => error!("SubmitProof failed: {e}"),
        }
        self.state = MinerState::RequireChallenge;
    }
}
