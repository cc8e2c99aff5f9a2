use dg_miner_clients::timelord::fleet::{FleetTimings, TimelordFleet};
use dg_miner_clients::timelord::link::{
    LinkErrorKind, LinkEvents, LinkState, LinkTimings, TimelordLink,
};
use dg_miner_clients::timelord::EndpointDescriptor;
use dg_miner_core::blockchain::sized_bytes::Bytes32;
use dg_miner_core::proof_cache::ProofCache;
use dg_miner_core::protocols::timelord::{CalcReply, ProofMessage, TimelordMessage, MESSAGE_DELIMITER};
use dg_miner_tests::mocks::RecordingEvents;
use dg_miner_tests::{init_logging, wait_until};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};

#[derive(Clone, Copy, PartialEq, Eq)]
enum Behaviour {
    /// Answers PING with PONG and CALC with a PROOF.
    Prove,
    /// Answers PING with PONG and CALC with a deferred CALC_REPLY.
    Defer,
    /// Reads everything, answers nothing.
    Silent,
    /// Like `Prove`, but greets with a message id the client does not know.
    Chatty,
}

#[derive(Default)]
struct FakeTimelord {
    accepted: AtomicUsize,
    received: Mutex<Vec<TimelordMessage>>,
}

impl FakeTimelord {
    async fn start(behaviour: Behaviour) -> (Arc<Self>, EndpointDescriptor) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let fake = Arc::new(FakeTimelord::default());
        let server = fake.clone();
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                server.accepted.fetch_add(1, Ordering::SeqCst);
                tokio::spawn(server.clone().serve(stream, behaviour));
            }
        });
        (fake, EndpointDescriptor::new("127.0.0.1", port))
    }

    async fn serve(self: Arc<Self>, stream: TcpStream, behaviour: Behaviour) {
        let (read_half, mut write_half) = stream.into_split();
        let mut reader = BufReader::new(read_half);
        let mut buf = vec![];
        if behaviour == Behaviour::Chatty
            && write_half
                .write_all(b"{\"id\":1050,\"note\":\"hello\"}\0")
                .await
                .is_err()
        {
            return;
        }
        loop {
            buf.clear();
            match reader.read_until(MESSAGE_DELIMITER, &mut buf).await {
                Ok(0) | Err(_) => return,
                Ok(_) => {}
            }
            let Ok(msg) = TimelordMessage::from_frame(&buf) else {
                return;
            };
            self.received.lock().push(msg.clone());
            let reply = match (behaviour, msg) {
                (Behaviour::Silent, _) => None,
                (_, TimelordMessage::Ping) => Some(TimelordMessage::Pong),
                (Behaviour::Prove | Behaviour::Chatty, TimelordMessage::Calc(calc)) => {
                    Some(TimelordMessage::Proof(ProofMessage {
                        challenge: calc.challenge,
                        y: vec![0x01, 0x02].into(),
                        proof: vec![0x03].into(),
                        witness_type: 0,
                        iters: calc.iters + 10,
                        duration: 4,
                    }))
                }
                (Behaviour::Defer, TimelordMessage::Calc(calc)) => {
                    Some(TimelordMessage::CalcReply(CalcReply {
                        challenge: calc.challenge,
                        calculating: true,
                        y: None,
                        proof: None,
                        witness_type: None,
                        iters: None,
                        duration: None,
                    }))
                }
                _ => None,
            };
            if let Some(reply) = reply {
                if write_half
                    .write_all(&reply.to_frame().unwrap())
                    .await
                    .is_err()
                {
                    return;
                }
            }
        }
    }

    fn calcs(&self) -> usize {
        self.received
            .lock()
            .iter()
            .filter(|m| matches!(m, TimelordMessage::Calc(_)))
            .count()
    }

    fn pings(&self) -> usize {
        self.received
            .lock()
            .iter()
            .filter(|m| matches!(m, TimelordMessage::Ping))
            .count()
    }
}

fn fast_link() -> LinkTimings {
    LinkTimings {
        ping_interval: Duration::from_millis(50),
        pong_timeout: Duration::from_millis(200),
    }
}

#[tokio::test]
async fn test_link_heartbeat_and_proof() {
    init_logging();
    let (fake, endpoint) = FakeTimelord::start(Behaviour::Prove).await;
    let events = Arc::new(RecordingEvents::default());
    let link = TimelordLink::new(endpoint, events.clone(), fast_link());
    assert_eq!(link.state(), LinkState::Ready);
    link.exit();
    assert_eq!(link.state(), LinkState::Ready);
    let challenge = Bytes32::from([0x42; 32]);
    link.start();
    link.calc(challenge, 1000, Bytes32::from([1; 32]), 4096, 0);
    assert!(
        wait_until(Duration::from_secs(2), || {
            let events = events.clone();
            async move { !events.proofs.lock().is_empty() }
        })
        .await
    );
    assert_eq!(link.state(), LinkState::Connected);
    {
        let proofs = events.proofs.lock();
        assert_eq!(proofs[0].0, challenge);
        assert_eq!(proofs[0].1.iters, 1010);
        assert_eq!(proofs[0].1.duration, 4);
    }
    // several heartbeats pass without a timeout
    tokio::time::sleep(Duration::from_millis(400)).await;
    assert!(fake.pings() >= 3);
    assert!(events.errors.lock().is_empty());
    assert_eq!(events.connected.lock().as_slice(), &[link.id()]);
    link.exit();
    assert_eq!(link.state(), LinkState::Closed);
    link.exit();
    assert_eq!(link.state(), LinkState::Closed);
}

#[tokio::test]
async fn test_unknown_message_id_keeps_the_link() {
    init_logging();
    let (fake, endpoint) = FakeTimelord::start(Behaviour::Chatty).await;
    let events = Arc::new(RecordingEvents::default());
    let link = TimelordLink::new(endpoint, events.clone(), fast_link());
    link.start();
    let challenge = Bytes32::from([0x17; 32]);
    link.calc(challenge, 300, Bytes32::default(), 0, 0);
    assert!(
        wait_until(Duration::from_secs(2), || {
            let events = events.clone();
            async move { !events.proofs.lock().is_empty() }
        })
        .await
    );
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(events.errors.lock().is_empty());
    assert_eq!(link.state(), LinkState::Connected);
    assert_eq!(events.proofs.lock()[0].0, challenge);
    assert_eq!(fake.accepted.load(Ordering::SeqCst), 1);
    link.exit();
}

#[tokio::test]
async fn test_missing_pong_is_a_read_error() {
    init_logging();
    let (_fake, endpoint) = FakeTimelord::start(Behaviour::Silent).await;
    let events = Arc::new(RecordingEvents::default());
    let link = TimelordLink::new(endpoint, events.clone(), fast_link());
    link.start();
    assert!(
        wait_until(Duration::from_secs(2), || {
            let events = events.clone();
            async move { !events.errors.lock().is_empty() }
        })
        .await
    );
    let errors = events.errors.lock();
    assert_eq!(errors[0].0, LinkErrorKind::Read);
    assert_eq!(errors[0].1, "PING/PONG timeout");
    assert_eq!(link.state(), LinkState::Closed);
}

#[tokio::test]
async fn test_refused_connection_is_reported() {
    init_logging();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);
    let events = Arc::new(RecordingEvents::default());
    let link = TimelordLink::new(
        EndpointDescriptor::new("127.0.0.1", port),
        events.clone(),
        LinkTimings::default(),
    );
    link.start();
    assert!(
        wait_until(Duration::from_secs(2), || {
            let events = events.clone();
            async move { !events.errors.lock().is_empty() }
        })
        .await
    );
    assert_eq!(events.errors.lock()[0].0, LinkErrorKind::Connection);
    assert_eq!(link.state(), LinkState::Closed);
    assert!(events.connected.lock().is_empty());
}

#[tokio::test]
async fn test_calc_is_resent_on_interval() {
    init_logging();
    let (fake, endpoint) = FakeTimelord::start(Behaviour::Defer).await;
    let events = Arc::new(RecordingEvents::default());
    let link = TimelordLink::new(endpoint, events.clone(), LinkTimings::default());
    link.start();
    link.calc(Bytes32::from([7; 32]), 50, Bytes32::default(), 0, 1);
    assert!(
        wait_until(Duration::from_secs(4), || {
            let fake = fake.clone();
            async move { fake.calcs() >= 3 }
        })
        .await
    );
    // deferred replies carry nothing for the cache
    assert!(events.proofs.lock().is_empty());
    link.exit();
}

#[tokio::test]
async fn test_fleet_sends_active_challenge_on_connect() {
    init_logging();
    let (fake, endpoint) = FakeTimelord::start(Behaviour::Prove).await;
    let cache = Arc::new(ProofCache::new());
    let fleet = TimelordFleet::new(cache.clone());
    let challenge = Bytes32::from([0x5c; 32]);
    fleet.broadcast(challenge, 777, Bytes32::default(), 1 << 30, 22);
    assert_eq!(fleet.start_all(&[endpoint.to_string()], 19191), 1);
    assert!(
        wait_until(Duration::from_secs(2), || {
            let cache = cache.clone();
            async move { cache.best_at_least(&challenge, 777).is_some() }
        })
        .await
    );
    assert_eq!(fake.calcs(), 1);
    assert_eq!(fleet.link_state(&endpoint), Some(LinkState::Connected));
    fleet.shutdown();
    assert_eq!(fleet.link_state(&endpoint), Some(LinkState::Closed));
}

#[tokio::test]
async fn test_cleared_challenge_is_not_sent_on_connect() {
    init_logging();
    let (fake, endpoint) = FakeTimelord::start(Behaviour::Prove).await;
    let fleet = TimelordFleet::new(Arc::new(ProofCache::new()));
    fleet.broadcast(Bytes32::from([0x6d; 32]), 500, Bytes32::default(), 0, 22);
    fleet.clear_active();
    fleet.start_all(&[endpoint.to_string()], 19191);
    assert!(
        wait_until(Duration::from_secs(2), || {
            let fleet = fleet.clone();
            let endpoint = endpoint.clone();
            async move { fleet.link_state(&endpoint) == Some(LinkState::Connected) }
        })
        .await
    );
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(fake.calcs(), 0);
    fleet.shutdown();
}

#[tokio::test]
async fn test_concurrent_errors_schedule_one_reconnect() {
    init_logging();
    let (fake, endpoint) = FakeTimelord::start(Behaviour::Prove).await;
    let fleet = TimelordFleet::with_timings(
        Arc::new(ProofCache::new()),
        FleetTimings {
            reconnect_delay: Duration::from_millis(200),
            link: LinkTimings::default(),
        },
    );
    fleet.start_all(&[endpoint.to_string()], 19191);
    assert!(
        wait_until(Duration::from_secs(2), || {
            let fleet = fleet.clone();
            let endpoint = endpoint.clone();
            async move { fleet.link_state(&endpoint) == Some(LinkState::Connected) }
        })
        .await
    );
    let first_id = fleet.link_id(&endpoint).unwrap();
    let events = fleet.events();
    tokio::join!(
        events.on_error(first_id, &endpoint, LinkErrorKind::Read, "reset".to_string()),
        events.on_error(first_id, &endpoint, LinkErrorKind::Write, "broken pipe".to_string()),
    );
    assert!(fleet.is_reconnecting(&endpoint));
    assert_eq!(fleet.link_state(&endpoint), Some(LinkState::Closed));
    assert!(
        wait_until(Duration::from_secs(2), || {
            let fleet = fleet.clone();
            let endpoint = endpoint.clone();
            async move { fleet.link_state(&endpoint) == Some(LinkState::Connected) }
        })
        .await
    );
    let second_id = fleet.link_id(&endpoint).unwrap();
    assert_ne!(first_id, second_id);
    assert!(!fleet.is_reconnecting(&endpoint));
    // a late error from the replaced link is ignored
    events
        .on_error(first_id, &endpoint, LinkErrorKind::Read, "late".to_string())
        .await;
    assert!(!fleet.is_reconnecting(&endpoint));
    tokio::time::sleep(Duration::from_millis(400)).await;
    assert_eq!(fake.accepted.load(Ordering::SeqCst), 2);
    assert_eq!(fleet.link_id(&endpoint), Some(second_id));
    fleet.shutdown();
}

#[tokio::test]
async fn test_no_reconnect_after_shutdown() {
    init_logging();
    let (fake, endpoint) = FakeTimelord::start(Behaviour::Prove).await;
    let fleet = TimelordFleet::with_timings(
        Arc::new(ProofCache::new()),
        FleetTimings {
            reconnect_delay: Duration::from_millis(50),
            link: LinkTimings::default(),
        },
    );
    fleet.start_all(&[endpoint.to_string()], 19191);
    assert!(
        wait_until(Duration::from_secs(2), || {
            let fake = fake.clone();
            async move { fake.accepted.load(Ordering::SeqCst) == 1 }
        })
        .await
    );
    let id = fleet.link_id(&endpoint).unwrap();
    fleet.shutdown();
    fleet
        .events()
        .on_error(id, &endpoint, LinkErrorKind::Read, "closed".to_string())
        .await;
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(fake.accepted.load(Ordering::SeqCst), 1);
    assert_eq!(fleet.link_id(&endpoint), Some(id));
}
