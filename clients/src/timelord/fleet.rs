use crate::timelord::link::{LinkErrorKind, LinkEvents, LinkState, LinkTimings, TimelordLink};
use crate::timelord::EndpointDescriptor;
use async_trait::async_trait;
use dashmap::DashMap;
use dg_miner_core::blockchain::sized_bytes::Bytes32;
use dg_miner_core::blockchain::vdf_proof::ProofDetail;
use dg_miner_core::constants::CHECKING_VDF_INTERVAL_SECS;
use dg_miner_core::proof_cache::ProofCache;
use dg_miner_core::protocols::timelord::{Calc, Netspace};
use log::{debug, error, info, warn};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use uuid::Uuid;

pub const RECONNECT_DELAY: Duration = Duration::from_secs(3);

#[derive(Debug, Copy, Clone)]
pub struct FleetTimings {
    pub reconnect_delay: Duration,
    pub link: LinkTimings,
}
impl Default for FleetTimings {
    fn default() -> Self {
        FleetTimings {
            reconnect_delay: RECONNECT_DELAY,
            link: LinkTimings::default(),
        }
    }
}

struct FleetEntry {
    reconnecting: bool,
    link: Arc<TimelordLink>,
}

struct FleetInner {
    links: DashMap<EndpointDescriptor, FleetEntry>,
    cache: Arc<ProofCache>,
    current: Mutex<Option<Calc>>,
    shutting_down: AtomicBool,
    timings: FleetTimings,
}

impl FleetInner {
    fn new_link(self: &Arc<Self>, endpoint: EndpointDescriptor) -> Arc<TimelordLink> {
        let events: Arc<dyn LinkEvents> = Arc::new(FleetEvents {
            fleet: Arc::downgrade(self),
        });
        Arc::new(TimelordLink::new(endpoint, events, self.timings.link))
    }

    fn connect(self: &Arc<Self>, endpoint: EndpointDescriptor) {
        let link = self.new_link(endpoint.clone());
        info!("Connecting to timelord {endpoint}");
        self.links.insert(
            endpoint,
            FleetEntry {
                reconnecting: false,
                link: link.clone(),
            },
        );
        link.start();
    }

    fn current_link(&self, endpoint: &EndpointDescriptor, link_id: Uuid) -> Option<Arc<TimelordLink>> {
        self.links
            .get(endpoint)
            .filter(|e| e.link.id() == link_id)
            .map(|e| e.link.clone())
    }
}

/// Routes link callbacks back into the fleet without keeping it alive.
#[derive(Clone)]
pub struct FleetEvents {
    fleet: Weak<FleetInner>,
}

#[async_trait]
impl LinkEvents for FleetEvents {
    async fn on_connected(&self, link_id: Uuid, endpoint: &EndpointDescriptor) {
        let Some(fleet) = self.fleet.upgrade() else {
            return;
        };
        let Some(link) = fleet.current_link(endpoint, link_id) else {
            return;
        };
        let current = fleet.current.lock().clone();
        if let Some(calc) = current {
            info!(
                "Timelord {endpoint} connected, sending challenge {} iters {}",
                calc.challenge, calc.iters
            );
            link.calc(
                calc.challenge,
                calc.iters,
                calc.netspace.group_hash,
                calc.netspace.total_size,
                CHECKING_VDF_INTERVAL_SECS,
            );
        }
    }

    async fn on_proof(&self, endpoint: &EndpointDescriptor, challenge: Bytes32, detail: ProofDetail) {
        if let Some(fleet) = self.fleet.upgrade() {
            debug!(
                "Recording proof from {endpoint}: challenge={challenge}, iters={}",
                detail.iters
            );
            fleet.cache.record(challenge, detail);
        }
    }

    async fn on_error(
        &self,
        link_id: Uuid,
        endpoint: &EndpointDescriptor,
        kind: LinkErrorKind,
        message: String,
    ) {
        let Some(fleet) = self.fleet.upgrade() else {
            return;
        };
        error!("Timelord {endpoint} error({kind}): {message}");
        let link = {
            let Some(mut entry) = fleet.links.get_mut(endpoint) else {
                return;
            };
            if entry.link.id() != link_id || entry.reconnecting {
                return;
            }
            entry.reconnecting = true;
            entry.link.clone()
        };
        link.exit();
        if fleet.shutting_down.load(Ordering::Relaxed) {
            return;
        }
        let weak = self.fleet.clone();
        let endpoint = endpoint.clone();
        let delay = fleet.timings.reconnect_delay;
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let Some(fleet) = weak.upgrade() else {
                return;
            };
            if fleet.shutting_down.load(Ordering::Relaxed) {
                return;
            }
            info!("Reconnecting to timelord {endpoint}");
            fleet.connect(endpoint);
        });
    }
}

/// Every configured timelord, with automatic reconnects.
#[derive(Clone)]
pub struct TimelordFleet {
    inner: Arc<FleetInner>,
}

impl TimelordFleet {
    pub fn new(cache: Arc<ProofCache>) -> Self {
        Self::with_timings(cache, FleetTimings::default())
    }

    pub fn with_timings(cache: Arc<ProofCache>, timings: FleetTimings) -> Self {
        TimelordFleet {
            inner: Arc::new(FleetInner {
                links: DashMap::new(),
                cache,
                current: Mutex::new(None),
                shutting_down: AtomicBool::new(false),
                timings,
            }),
        }
    }

    /// Parses and connects every endpoint. Bad entries are logged and
    /// skipped, duplicates collapse to one link.
    pub fn start_all(&self, endpoints: &[String], default_port: u16) -> usize {
        for endpoint in endpoints {
            match EndpointDescriptor::parse(endpoint, default_port) {
                Ok(endpoint) => {
                    if self.inner.links.contains_key(&endpoint) {
                        warn!("Duplicate timelord endpoint {endpoint}");
                        continue;
                    }
                    self.inner.connect(endpoint);
                }
                Err(e) => error!("Skipping timelord `{endpoint}`: {e}"),
            }
        }
        self.inner.links.len()
    }

    /// Remembers the challenge for links connecting later and sends CALC on
    /// every link that is not waiting to reconnect.
    pub fn broadcast(
        &self,
        challenge: Bytes32,
        iters: u64,
        group_hash: Bytes32,
        total_size: u64,
        interval_secs: u64,
    ) {
        *self.inner.current.lock() = Some(Calc {
            challenge,
            iters,
            netspace: Netspace {
                group_hash,
                total_size,
            },
        });
        let links: Vec<Arc<TimelordLink>> = self
            .inner
            .links
            .iter()
            .filter(|e| !e.reconnecting)
            .map(|e| e.link.clone())
            .collect();
        for link in links {
            link.calc(challenge, iters, group_hash, total_size, interval_secs);
        }
    }

    /// Forgets the active challenge so links connecting later stay idle.
    pub fn clear_active(&self) {
        *self.inner.current.lock() = None;
    }

    pub fn shutdown(&self) {
        self.inner.shutting_down.store(true, Ordering::Relaxed);
        let links: Vec<Arc<TimelordLink>> =
            self.inner.links.iter().map(|e| e.link.clone()).collect();
        for link in links {
            link.exit();
        }
    }

    pub fn events(&self) -> FleetEvents {
        FleetEvents {
            fleet: Arc::downgrade(&self.inner),
        }
    }

    pub fn cache(&self) -> &Arc<ProofCache> {
        &self.inner.cache
    }

    pub fn len(&self) -> usize {
        self.inner.links.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.links.is_empty()
    }

    pub fn link_id(&self, endpoint: &EndpointDescriptor) -> Option<Uuid> {
        self.inner.links.get(endpoint).map(|e| e.link.id())
    }

    pub fn link_state(&self, endpoint: &EndpointDescriptor) -> Option<LinkState> {
        self.inner.links.get(endpoint).map(|e| e.link.state())
    }

    pub fn is_reconnecting(&self, endpoint: &EndpointDescriptor) -> bool {
        self.inner
            .links
            .get(endpoint)
            .map(|e| e.reconnecting)
            .unwrap_or_default()
    }
}
