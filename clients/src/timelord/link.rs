use crate::timelord::EndpointDescriptor;
use async_trait::async_trait;
use dg_miner_core::blockchain::sized_bytes::Bytes32;
use dg_miner_core::blockchain::vdf_proof::ProofDetail;
use dg_miner_core::protocols::timelord::{Calc, Netspace, TimelordMessage, MESSAGE_DELIMITER};
use log::{debug, error, info, warn};
use parking_lot::Mutex;
use std::fmt;
use std::future::pending;
use std::io::{Error, ErrorKind};
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{lookup_host, TcpStream};
use tokio::select;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, sleep, Instant, Interval, MissedTickBehavior, Sleep};
use uuid::Uuid;

pub const PING_INTERVAL: Duration = Duration::from_secs(60);
pub const PONG_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum LinkState {
    Ready,
    Connecting,
    Connected,
    Closed,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum LinkErrorKind {
    Connection,
    Read,
    Write,
}
impl fmt::Display for LinkErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LinkErrorKind::Connection => f.write_str("CONN"),
            LinkErrorKind::Read => f.write_str("READ"),
            LinkErrorKind::Write => f.write_str("WRITE"),
        }
    }
}

#[derive(Debug, Copy, Clone)]
pub struct LinkTimings {
    pub ping_interval: Duration,
    pub pong_timeout: Duration,
}
impl Default for LinkTimings {
    fn default() -> Self {
        LinkTimings {
            ping_interval: PING_INTERVAL,
            pong_timeout: PONG_TIMEOUT,
        }
    }
}

/// Callbacks fired from a link's task. `link_id` tells apart successive links
/// to the same endpoint.
#[async_trait]
pub trait LinkEvents: Send + Sync + 'static {
    async fn on_connected(&self, link_id: Uuid, endpoint: &EndpointDescriptor);
    async fn on_proof(&self, endpoint: &EndpointDescriptor, challenge: Bytes32, detail: ProofDetail);
    async fn on_error(
        &self,
        link_id: Uuid,
        endpoint: &EndpointDescriptor,
        kind: LinkErrorKind,
        message: String,
    );
}

enum LinkCommand {
    Calc { frame: Vec<u8>, interval: Duration },
    Exit,
}

/// One TCP session with a timelord.
pub struct TimelordLink {
    id: Uuid,
    endpoint: EndpointDescriptor,
    state: Arc<Mutex<LinkState>>,
    commands: UnboundedSender<LinkCommand>,
    receiver: Mutex<Option<UnboundedReceiver<LinkCommand>>>,
    events: Arc<dyn LinkEvents>,
    timings: LinkTimings,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl TimelordLink {
    pub fn new(
        endpoint: EndpointDescriptor,
        events: Arc<dyn LinkEvents>,
        timings: LinkTimings,
    ) -> Self {
        let (commands, receiver) = unbounded_channel();
        TimelordLink {
            id: Uuid::new_v4(),
            endpoint,
            state: Arc::new(Mutex::new(LinkState::Ready)),
            commands,
            receiver: Mutex::new(Some(receiver)),
            events,
            timings,
            task: Mutex::new(None),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn endpoint(&self) -> &EndpointDescriptor {
        &self.endpoint
    }

    pub fn state(&self) -> LinkState {
        *self.state.lock()
    }

    /// Resolves and connects in the background. Only the first call has an effect.
    pub fn start(&self) {
        let Some(receiver) = self.receiver.lock().take() else {
            return;
        };
        *self.state.lock() = LinkState::Connecting;
        let session = Session {
            id: self.id,
            endpoint: self.endpoint.clone(),
            state: self.state.clone(),
            events: self.events.clone(),
            timings: self.timings,
        };
        *self.task.lock() = Some(tokio::spawn(session.run(receiver)));
    }

    /// Asks the timelord to compute `iters` on `challenge`. A non-zero
    /// `interval_secs` replaces the resend timer so the request repeats.
    pub fn calc(
        &self,
        challenge: Bytes32,
        iters: u64,
        group_hash: Bytes32,
        total_size: u64,
        interval_secs: u64,
    ) {
        if self.state() == LinkState::Closed {
            debug!("Dropping CALC for closed timelord {}", self.endpoint);
            return;
        }
        let msg = TimelordMessage::Calc(Calc {
            challenge,
            iters,
            netspace: Netspace {
                group_hash,
                total_size,
            },
        });
        match msg.to_frame() {
            Ok(frame) => {
                if self
                    .commands
                    .send(LinkCommand::Calc {
                        frame,
                        interval: Duration::from_secs(interval_secs),
                    })
                    .is_err()
                {
                    debug!("Timelord {} task is gone, CALC dropped", self.endpoint);
                }
            }
            Err(e) => error!("Failed to encode CALC: {e}"),
        }
    }

    /// Stops timers and shuts the session down. No-op unless connecting or connected.
    pub fn exit(&self) {
        let mut state = self.state.lock();
        match *state {
            LinkState::Ready | LinkState::Closed => {}
            LinkState::Connecting | LinkState::Connected => {
                *state = LinkState::Closed;
                if self.commands.send(LinkCommand::Exit).is_err() {
                    debug!("Timelord {} task already stopped", self.endpoint);
                }
            }
        }
    }
}

impl Drop for TimelordLink {
    fn drop(&mut self) {
        if let Some(task) = self.task.lock().take() {
            task.abort();
        }
    }
}

struct Session {
    id: Uuid,
    endpoint: EndpointDescriptor,
    state: Arc<Mutex<LinkState>>,
    events: Arc<dyn LinkEvents>,
    timings: LinkTimings,
}

impl Session {
    async fn run(self, mut commands: UnboundedReceiver<LinkCommand>) {
        let mut queued = vec![];
        let connect = connect(&self.endpoint);
        tokio::pin!(connect);
        let stream = loop {
            select! {
                res = &mut connect => match res {
                    Ok(stream) => break stream,
                    Err(e) => {
                        *self.state.lock() = LinkState::Closed;
                        self.events
                            .on_error(self.id, &self.endpoint, LinkErrorKind::Connection, e.to_string())
                            .await;
                        return;
                    }
                },
                cmd = commands.recv() => match cmd {
                    Some(LinkCommand::Exit) | None => {
                        *self.state.lock() = LinkState::Closed;
                        return;
                    }
                    Some(cmd) => queued.push(cmd),
                }
            }
        };
        {
            let mut state = self.state.lock();
            if *state == LinkState::Closed {
                return;
            }
            *state = LinkState::Connected;
        }
        info!("Connected to timelord {}", self.endpoint);
        self.events.on_connected(self.id, &self.endpoint).await;
        let (read_half, write_half) = stream.into_split();
        let (outbound, outbound_rx) = unbounded_channel();
        let (inbound_tx, mut inbound) = unbounded_channel();
        let reader = tokio::spawn(read_frames(read_half, inbound_tx));
        let mut writer = tokio::spawn(write_frames(write_half, outbound_rx));
        let mut ping = interval_at(
            Instant::now() + self.timings.ping_interval,
            self.timings.ping_interval,
        );
        ping.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut pong_deadline: Option<Pin<Box<Sleep>>> = None;
        let mut resend: Option<(Interval, Vec<u8>)> = None;
        for cmd in queued {
            self.apply(cmd, &outbound, &mut resend);
        }
        let failure = loop {
            select! {
                cmd = commands.recv() => match cmd {
                    Some(LinkCommand::Exit) | None => break None,
                    Some(cmd) => self.apply(cmd, &outbound, &mut resend),
                },
                incoming = inbound.recv() => match incoming {
                    Some(Ok(msg)) => {
                        if matches!(msg, TimelordMessage::Pong) {
                            pong_deadline = None;
                        }
                        self.handle(msg).await;
                    }
                    Some(Err(e)) => break Some((LinkErrorKind::Read, e.to_string())),
                    None => break Some((LinkErrorKind::Read, "reader stopped".to_string())),
                },
                _ = ping.tick() => {
                    match TimelordMessage::Ping.to_frame() {
                        Ok(frame) => {
                            if outbound.send(frame).is_err() {
                                debug!("Timelord {} writer is gone, PING dropped", self.endpoint);
                            }
                            // the deadline runs from the oldest unanswered PING
                            if pong_deadline.is_none() {
                                pong_deadline = Some(Box::pin(sleep(self.timings.pong_timeout)));
                            }
                        }
                        Err(e) => error!("Failed to encode PING: {e}"),
                    }
                },
                _ = sleep_opt(&mut pong_deadline) => {
                    break Some((LinkErrorKind::Read, "PING/PONG timeout".to_string()));
                },
                _ = tick_opt(&mut resend) => {
                    if let Some((_, frame)) = &resend {
                        debug!("Resending CALC to {}", self.endpoint);
                        if outbound.send(frame.clone()).is_err() {
                            debug!("Timelord {} writer is gone, CALC resend dropped", self.endpoint);
                        }
                    }
                },
                res = &mut writer => {
                    let msg = match res {
                        Ok(Ok(())) => "writer stopped".to_string(),
                        Ok(Err(e)) => e.to_string(),
                        Err(e) => e.to_string(),
                    };
                    break Some((LinkErrorKind::Write, msg));
                }
            }
        };
        reader.abort();
        writer.abort();
        *self.state.lock() = LinkState::Closed;
        match failure {
            Some((kind, message)) => {
                self.events
                    .on_error(self.id, &self.endpoint, kind, message)
                    .await
            }
            None => info!("Timelord link {} closed", self.endpoint),
        }
    }

    fn apply(
        &self,
        cmd: LinkCommand,
        outbound: &UnboundedSender<Vec<u8>>,
        resend: &mut Option<(Interval, Vec<u8>)>,
    ) {
        if let LinkCommand::Calc { frame, interval } = cmd {
            if !interval.is_zero() {
                let mut timer = interval_at(Instant::now() + interval, interval);
                timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
                *resend = Some((timer, frame.clone()));
            }
            if outbound.send(frame).is_err() {
                debug!("Timelord {} writer is gone, CALC dropped", self.endpoint);
            }
        }
    }

    async fn handle(&self, msg: TimelordMessage) {
        match msg {
            TimelordMessage::Pong => debug!("PONG from {}", self.endpoint),
            TimelordMessage::Proof(proof) => {
                info!(
                    "Proof from {}: challenge={}, iters={}, duration={}",
                    self.endpoint, proof.challenge, proof.iters, proof.duration
                );
                self.events
                    .on_proof(&self.endpoint, proof.challenge, proof.detail())
                    .await;
            }
            TimelordMessage::CalcReply(reply) => match reply.detail() {
                Some(detail) => {
                    info!(
                        "Proof is ready from {}: challenge={}, iters={}",
                        self.endpoint, reply.challenge, detail.iters
                    );
                    self.events
                        .on_proof(&self.endpoint, reply.challenge, detail)
                        .await;
                }
                None if reply.calculating => {
                    debug!("{} is calculating {}", self.endpoint, reply.challenge)
                }
                None => error!(
                    "Timelord {} does not calculate, delay challenge {}",
                    self.endpoint, reply.challenge
                ),
            },
            TimelordMessage::Ready(value) => info!("Timelord {} is ready: {value}", self.endpoint),
            TimelordMessage::Speed(value) => info!("Timelord {} speed: {value}", self.endpoint),
            TimelordMessage::Unknown { id, .. } => {
                debug!("Ignoring message id {id} from timelord {}", self.endpoint)
            }
            other => warn!(
                "Unexpected message id {} from timelord {}",
                other.id(),
                self.endpoint
            ),
        }
    }
}

async fn connect(endpoint: &EndpointDescriptor) -> Result<TcpStream, Error> {
    let addrs: Vec<_> = lookup_host((endpoint.host.as_str(), endpoint.port))
        .await
        .map_err(|e| {
            Error::new(
                ErrorKind::NotFound,
                format!("failed to resolve {endpoint}: {e}"),
            )
        })?
        .collect();
    let mut last_err = Error::new(
        ErrorKind::NotFound,
        format!("no address resolved for {endpoint}"),
    );
    for addr in addrs {
        match TcpStream::connect(addr).await {
            Ok(stream) => {
                if let Err(e) = stream.set_nodelay(true) {
                    debug!("Failed to set TCP_NODELAY on {addr}: {e}");
                }
                return Ok(stream);
            }
            Err(e) => {
                last_err = Error::new(e.kind(), format!("failed to connect {addr}: {e}"));
            }
        }
    }
    Err(last_err)
}

async fn read_frames(
    read_half: OwnedReadHalf,
    inbound: UnboundedSender<Result<TimelordMessage, Error>>,
) {
    let mut reader = BufReader::new(read_half);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        let msg = match reader.read_until(MESSAGE_DELIMITER, &mut buf).await {
            Ok(0) => Err(Error::new(
                ErrorKind::UnexpectedEof,
                "connection closed by timelord",
            )),
            Ok(_) => TimelordMessage::from_frame(&buf),
            Err(e) => Err(e),
        };
        let stop = msg.is_err();
        if inbound.send(msg).is_err() || stop {
            return;
        }
    }
}

async fn write_frames(
    mut write_half: OwnedWriteHalf,
    mut outbound: UnboundedReceiver<Vec<u8>>,
) -> Result<(), Error> {
    while let Some(frame) = outbound.recv().await {
        write_half.write_all(&frame).await?;
    }
    write_half.shutdown().await
}

async fn sleep_opt(deadline: &mut Option<Pin<Box<Sleep>>>) {
    match deadline {
        Some(d) => d.as_mut().await,
        None => pending().await,
    }
}

async fn tick_opt(resend: &mut Option<(Interval, Vec<u8>)>) {
    match resend {
        Some((timer, _)) => {
            timer.tick().await;
        }
        None => pending().await,
    }
}
