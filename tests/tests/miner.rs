use dg_miner::context::{MinerContext, MinerTimings};
use dg_miner::miner::{Miner, MinerExit, MinerState};
use dg_miner_core::blockchain::sized_bytes::{Bytes32, Bytes48};
use dg_miner_core::blockchain::vdf_proof::{ProofDetail, VdfProof};
use dg_miner_clients::timelord::fleet::TimelordFleet;
use dg_miner_core::errors::NodeError;
use dg_miner_core::proof_cache::ProofCache;
use dg_miner_tests::mocks::{
    candidate, challenge, MockKeys, MockNode, MockPlots, MockVerifier, FARMER_PK, FARMER_SK,
    LOCAL_PK,
};
use dg_miner_tests::{init_logging, wait_until};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio::net::TcpListener;

fn fast_timings() -> MinerTimings {
    MinerTimings {
        error_backoff: Duration::from_millis(10),
        not_ready_wait: Duration::from_millis(10),
        duplicate_wait: Duration::from_millis(10),
        poll_tick: Duration::from_millis(5),
        rpc_error_wait: Duration::from_millis(5),
        vdf_timeout_factor: 1.5,
    }
}

fn context() -> MinerContext {
    let mut keys = HashMap::new();
    keys.insert(Bytes48::from(FARMER_PK), Bytes32::from(FARMER_SK));
    MinerContext::new("reward-address", keys).with_timings(fast_timings())
}

fn miner(
    node: Arc<MockNode>,
    plots: Arc<MockPlots>,
    keys: MockKeys,
    cache: Arc<ProofCache>,
    context: MinerContext,
) -> Miner<MockNode, MockPlots, MockKeys> {
    Miner::new(
        node,
        plots,
        keys,
        cache,
        context,
        Arc::new(AtomicBool::new(true)),
    )
}

fn proof(iters: u64, duration: u64) -> ProofDetail {
    ProofDetail {
        y: vec![1, 2, 3].into(),
        proof: vec![4, 5].into(),
        witness_type: 0,
        iters,
        duration,
    }
}

#[tokio::test]
async fn test_challenge_change_aborts_wait() {
    init_logging();
    let c1 = challenge(1);
    let node = Arc::new(MockNode::new(vec![Ok(c1.clone()), Ok(challenge(2))]));
    let plots = Arc::new(MockPlots::new(vec![candidate("/plots/a.plot", 3)]));
    let cache = Arc::new(ProofCache::new());
    cache.record(c1.challenge, proof(u64::MAX, 10));
    let mut miner = miner(node.clone(), plots, MockKeys::default(), cache, context());

    miner.step().await.unwrap();
    assert_eq!(miner.state(), MinerState::FindPoS);
    assert_eq!(miner.current_challenge(), Some(c1.challenge));
    miner.step().await.unwrap();
    assert_eq!(miner.state(), MinerState::WaitVDF);
    assert!(miner.pos().is_some());
    miner.step().await.unwrap();
    assert_eq!(miner.state(), MinerState::RequireChallenge);
    assert!(miner.vdf().is_none());
    assert!(node.submitted.lock().is_empty());
    assert_eq!(node.vdf_requests.lock().len(), 1);
}

#[tokio::test]
async fn test_full_cycle_and_duplicate_suppression() {
    init_logging();
    let c1 = challenge(1);
    let node = Arc::new(MockNode::new(vec![Ok(c1.clone())]));
    let plots = Arc::new(MockPlots::new(vec![
        candidate("/plots/a.plot", 3),
        candidate("/plots/b.plot", 9),
    ]));
    let cache = Arc::new(ProofCache::new());
    cache.record(c1.challenge, proof(5000, 5));
    let mut miner = miner(node.clone(), plots, MockKeys::default(), cache, context());

    let expected = [
        MinerState::FindPoS,
        MinerState::WaitVDF,
        MinerState::ProcessVDF,
        MinerState::SubmitProofs,
        MinerState::RequireChallenge,
    ];
    for state in expected {
        assert_eq!(miner.step().await.unwrap(), None);
        assert_eq!(miner.state(), state);
    }
    assert_eq!(miner.vdf_speed(), 1000);
    assert!(miner.is_submitted(&c1.challenge));
    {
        let submitted = node.submitted.lock();
        assert_eq!(submitted.len(), 1);
        let pack = &submitted[0];
        assert_eq!(pack.pos.challenge, c1.challenge);
        assert_eq!(pack.vdf.challenge, c1.challenge);
        assert!(pack.vdf.iters >= pack.pos.iters);
        assert_eq!(pack.pos.local_pk, Bytes48::from(LOCAL_PK));
        assert_eq!(pack.farmer_sk, Bytes32::from(FARMER_SK));
        assert_eq!(pack.reward_dest, "reward-address");
        assert_eq!(pack.prev_block_height, c1.prev_block_height);
    }

    for _ in 0..3 {
        miner.step().await.unwrap();
        assert_eq!(miner.state(), MinerState::RequireChallenge);
        assert_eq!(miner.current_challenge(), None);
    }
    assert_eq!(node.submitted.lock().len(), 1);
}

#[tokio::test]
async fn test_node_reported_vdf_wins_over_cache() {
    init_logging();
    let mut c1 = challenge(1);
    c1.vdf_proofs.push(VdfProof {
        challenge: c1.challenge,
        y: vec![9].into(),
        proof: vec![9].into(),
        witness_type: 1,
        iters: u64::MAX,
        duration: 2,
    });
    let node = Arc::new(MockNode::new(vec![Ok(c1.clone())]));
    let plots = Arc::new(MockPlots::new(vec![candidate("/plots/a.plot", 3)]));
    let cache = Arc::new(ProofCache::new());
    cache.record(c1.challenge, proof(u64::MAX, 10));
    let mut miner = miner(node, plots, MockKeys::default(), cache, context());
    for _ in 0..3 {
        miner.step().await.unwrap();
    }
    assert_eq!(miner.state(), MinerState::ProcessVDF);
    assert_eq!(miner.vdf().map(|v| v.witness_type), Some(1));
    // short proofs do not move the speed estimate
    assert_eq!(miner.vdf_speed(), 100_000);
}

#[tokio::test]
async fn test_plot_id_mismatch_is_fatal() {
    init_logging();
    let node = Arc::new(MockNode::new(vec![Ok(challenge(1))]));
    let plots = Arc::new(MockPlots::new(vec![candidate("/plots/bad.plot", 3)]));
    let keys = MockKeys {
        plot_id: Bytes32::from([0x77; 32]),
        ..Default::default()
    };
    let mut miner = miner(
        node,
        plots,
        keys,
        Arc::new(ProofCache::new()),
        context(),
    );
    let exit = miner.run().await;
    assert_eq!(
        exit,
        MinerExit::PlotIdMismatch {
            plot_path: "/plots/bad.plot".into()
        }
    );
    assert_eq!(exit.code(), 1);
}

#[tokio::test]
async fn test_missing_farmer_key_revokes_plots() {
    init_logging();
    let c1 = challenge(1);
    let node = Arc::new(MockNode::new(vec![Ok(c1.clone())]));
    let plots = Arc::new(MockPlots::new(vec![candidate("/plots/a.plot", 3)]));
    let context = MinerContext::new("reward-address", HashMap::new()).with_timings(fast_timings());
    let mut miner = miner(
        node,
        plots.clone(),
        MockKeys::default(),
        Arc::new(ProofCache::new()),
        context,
    );
    miner.step().await.unwrap();
    miner.step().await.unwrap();
    assert_eq!(miner.state(), MinerState::FindPoS);
    assert!(plots.candidates.lock().is_empty());
    miner.step().await.unwrap();
    assert_eq!(miner.state(), MinerState::WaitVDF);
    assert!(miner.pos().is_none());
    assert_eq!(miner.current_iters(), c1.one_day_iters());
    assert_eq!(miner.current_iters(), 1_000_000 / 10 * 86_400);
}

#[tokio::test]
async fn test_wait_vdf_error_policy() {
    init_logging();
    let c1 = challenge(1);
    let node = Arc::new(MockNode::new(vec![
        Ok(c1.clone()),
        Err(NodeError::Net("timeout".to_string())),
        Ok(c1.clone()),
        Err(NodeError::Rpc {
            code: -28,
            message: "warming up".to_string(),
        }),
        Ok(c1.clone()),
    ]));
    let plots = Arc::new(MockPlots::new(vec![candidate("/plots/a.plot", 3)]));
    let cache = Arc::new(ProofCache::new());
    let mut miner = miner(node, plots, MockKeys::default(), cache.clone(), context());
    miner.step().await.unwrap();
    miner.step().await.unwrap();
    // transport failure while polling forces a fresh readiness check
    miner.step().await.unwrap();
    assert_eq!(miner.state(), MinerState::RequireChallenge);

    miner.step().await.unwrap();
    miner.step().await.unwrap();
    assert_eq!(miner.state(), MinerState::WaitVDF);
    cache.record(c1.challenge, proof(u64::MAX, 4));
    // node errors are retried within the same wait
    miner.step().await.unwrap();
    assert_eq!(miner.state(), MinerState::ProcessVDF);
}

#[tokio::test]
async fn test_wait_vdf_times_out() {
    init_logging();
    let mut c1 = challenge(1);
    c1.target_duration = 0;
    let node = Arc::new(MockNode::new(vec![Ok(c1)]));
    let plots = Arc::new(MockPlots::new(vec![candidate("/plots/a.plot", 3)]));
    let mut miner = miner(
        node,
        plots,
        MockKeys::default(),
        Arc::new(ProofCache::new()),
        context(),
    );
    for _ in 0..3 {
        miner.step().await.unwrap();
    }
    assert_eq!(miner.state(), MinerState::WaitVDF);
}

#[tokio::test]
async fn test_net_errors_reload_cookie_and_retry() {
    init_logging();
    let node = Arc::new(MockNode::new(vec![Ok(challenge(1))]));
    node.ready_error.store(true, Ordering::Relaxed);
    let plots = Arc::new(MockPlots::new(vec![]));
    let run = Arc::new(AtomicBool::new(true));
    let mut miner = Miner::new(
        node.clone(),
        plots,
        MockKeys::default(),
        Arc::new(ProofCache::new()),
        context(),
        run.clone(),
    );
    let handle = tokio::spawn(async move { miner.run().await });
    let reloaded = wait_until(Duration::from_secs(2), || {
        let node = node.clone();
        async move { node.cookie_reloads.load(Ordering::Relaxed) >= 2 }
    })
    .await;
    run.store(false, Ordering::Relaxed);
    assert!(reloaded);
    assert_eq!(handle.await.unwrap(), MinerExit::Stopped);
}

#[tokio::test]
async fn test_unreadable_full_proof_still_follows_the_chain() {
    init_logging();
    let c1 = challenge(1);
    let c2 = challenge(2);
    let node = Arc::new(MockNode::new(vec![Ok(c1.clone()), Ok(c2.clone())]));
    let plots = Arc::new(MockPlots::new(vec![candidate("/plots/corrupt.plot", 3)]));
    plots.proof_error.store(true, Ordering::Relaxed);
    let mut miner = miner(
        node,
        plots,
        MockKeys::default(),
        Arc::new(ProofCache::new()),
        context(),
    );
    miner.step().await.unwrap();
    assert_eq!(miner.step().await.unwrap(), None);
    assert_eq!(miner.state(), MinerState::WaitVDF);
    assert!(miner.pos().is_none());
    assert_eq!(miner.current_iters(), c1.one_day_iters());
    miner.step().await.unwrap();
    assert_eq!(miner.state(), MinerState::RequireChallenge);
    miner.step().await.unwrap();
    assert_eq!(miner.state(), MinerState::FindPoS);
    assert_eq!(miner.current_challenge(), Some(c2.challenge));
}

#[tokio::test]
async fn test_key_failure_falls_back_to_a_day_of_iterations() {
    init_logging();
    let c1 = challenge(1);
    let node = Arc::new(MockNode::new(vec![Ok(c1.clone())]));
    let plots = Arc::new(MockPlots::new(vec![candidate("/plots/a.plot", 3)]));
    let keys = MockKeys {
        broken: true,
        ..Default::default()
    };
    let mut miner = miner(node, plots, keys, Arc::new(ProofCache::new()), context());
    miner.step().await.unwrap();
    assert_eq!(miner.step().await.unwrap(), None);
    assert_eq!(miner.state(), MinerState::WaitVDF);
    assert!(miner.pos().is_none());
    assert_eq!(miner.current_iters(), c1.one_day_iters());
}

#[tokio::test]
async fn test_rejected_proof_is_not_recorded() {
    init_logging();
    let c1 = challenge(1);
    let node = Arc::new(MockNode::new(vec![Ok(c1.clone())]));
    node.reject_proofs.store(true, Ordering::Relaxed);
    let plots = Arc::new(MockPlots::new(vec![candidate("/plots/a.plot", 3)]));
    let cache = Arc::new(ProofCache::new());
    cache.record(c1.challenge, proof(5000, 5));
    let mut miner = miner(node.clone(), plots, MockKeys::default(), cache, context());
    for _ in 0..5 {
        miner.step().await.unwrap();
    }
    assert_eq!(miner.state(), MinerState::RequireChallenge);
    assert_eq!(node.submit_attempts.load(Ordering::Relaxed), 1);
    assert!(node.submitted.lock().is_empty());
    assert!(!miner.is_submitted(&c1.challenge));
    // the same challenge is mined again
    miner.step().await.unwrap();
    assert_eq!(miner.state(), MinerState::FindPoS);
    assert_eq!(miner.current_challenge(), Some(c1.challenge));
}

#[tokio::test]
async fn test_not_ready_node_is_checked_again() {
    init_logging();
    let node = Arc::new(MockNode::new(vec![Ok(challenge(1))]));
    node.not_ready.store(true, Ordering::Relaxed);
    let plots = Arc::new(MockPlots::new(vec![candidate("/plots/a.plot", 3)]));
    let mut miner = miner(
        node.clone(),
        plots,
        MockKeys::default(),
        Arc::new(ProofCache::new()),
        context(),
    );
    for checks in 1..=2 {
        assert_eq!(miner.step().await.unwrap(), None);
        assert_eq!(miner.state(), MinerState::RequireChallenge);
        assert_eq!(miner.current_challenge(), None);
        assert_eq!(node.ready_checks.load(Ordering::Relaxed), checks);
    }
    node.not_ready.store(false, Ordering::Relaxed);
    miner.step().await.unwrap();
    assert_eq!(miner.state(), MinerState::FindPoS);
}

#[tokio::test]
async fn test_verifier_sees_acquired_vdf() {
    init_logging();
    let c1 = challenge(1);
    let node = Arc::new(MockNode::new(vec![Ok(c1.clone())]));
    let plots = Arc::new(MockPlots::new(vec![candidate("/plots/a.plot", 3)]));
    let cache = Arc::new(ProofCache::new());
    cache.record(c1.challenge, proof(5000, 5));
    let verifier = Arc::new(MockVerifier::default());
    let mut miner = miner(node.clone(), plots, MockKeys::default(), cache, context())
        .with_verifier(verifier.clone());
    for _ in 0..3 {
        miner.step().await.unwrap();
    }
    assert_eq!(miner.state(), MinerState::ProcessVDF);
    {
        let seen = verifier.seen.lock();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].challenge, c1.challenge);
        assert_eq!(seen[0].iters, 5000);
    }
    // a failed local check does not block submission
    miner.step().await.unwrap();
    miner.step().await.unwrap();
    assert_eq!(node.submitted.lock().len(), 1);
}

#[tokio::test]
async fn test_new_round_clears_the_fleet_challenge() {
    init_logging();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let fleet = TimelordFleet::new(Arc::new(ProofCache::new()));
    fleet.broadcast(Bytes32::from([0x0d; 32]), 900, Bytes32::default(), 0, 22);
    let node = Arc::new(MockNode::new(vec![Ok(challenge(1))]));
    let plots = Arc::new(MockPlots::new(vec![]));
    let mut miner = miner(
        node.clone(),
        plots,
        MockKeys::default(),
        Arc::new(ProofCache::new()),
        context(),
    )
    .with_fleet(fleet.clone());
    miner.step().await.unwrap();
    assert_eq!(miner.state(), MinerState::FindPoS);
    fleet.start_all(&[format!("127.0.0.1:{port}")], 19191);
    let (mut stream, _) = listener.accept().await.unwrap();
    let mut buf = [0u8; 64];
    let read = tokio::time::timeout(Duration::from_millis(300), stream.read(&mut buf)).await;
    assert!(read.is_err(), "no CALC expected on connect");
    fleet.shutdown();
}
