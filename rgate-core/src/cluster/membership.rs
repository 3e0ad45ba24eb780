//! Push-pull gossip membership over the brokers' HTTP surface.
//!
//! Every round a member:
//! - bumps its own heartbeat
//! - pushes its view to up to `fanout` random peers (`POST /cluster/gossip`)
//! - merges the view each peer answers with
//! - drops members whose heartbeat has not moved for `suspect_timeout`
//!
//! A dropped member leaves a tombstone at its last heartbeat so stale views
//! still circulating cannot resurrect it; it comes back once it gossips a
//! newer heartbeat.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use rand::seq::IndexedRandom;
use reqwest::Client;
use rgate_sdk::client::{ClientError, GatewayClient};
use rgate_sdk::objects::{GossipDigest, MemberInfo, MemberMeta, MemberState};
use thiserror::Error;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use url::Url;

use super::ClusterView;
use crate::config::ClusterConfig;

#[derive(Debug, Error)]
pub enum MembershipError {
    #[error("failed to reach {peer}: {source}")]
    Unreachable {
        peer: String,
        #[source]
        source: ClientError,
    },

    #[error("invalid gossip address {addr}: {source}")]
    InvalidAddress {
        addr: String,
        #[source]
        source: url::ParseError,
    },

    #[error("no seed could be joined")]
    NoSeedReachable,
}

/// A change in the membership view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MembershipEvent {
    Join(MemberInfo),
    Leave(String),
    Update(MemberInfo),
}

struct MemberEntry {
    state: MemberState,
    last_seen: Instant,
}

#[derive(Default)]
struct MembershipState {
    heartbeat: u64,
    members: HashMap<String, MemberEntry>,
    tombstones: HashMap<String, u64>,
}

// ---------------------------------------------------------------------------
// GossipMembership
// ---------------------------------------------------------------------------

pub struct GossipMembership {
    config: ClusterConfig,
    local: MemberInfo,
    http: Client,
    state: Mutex<MembershipState>,
}

impl GossipMembership {
    pub fn new(config: ClusterConfig) -> Self {
        let local = MemberInfo {
            name: config.name.clone(),
            addr: config.advertise.to_string(),
            meta: MemberMeta {
                api_endpoint: config.advertise.to_string(),
            },
        };
        Self {
            config,
            local,
            http: Client::new(),
            state: Mutex::new(MembershipState::default()),
        }
    }

    fn state(&self) -> MutexGuard<'_, MembershipState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Our current view, including ourselves.
    pub fn digest(&self) -> GossipDigest {
        let state = self.state();
        let mut members = vec![MemberState {
            info: self.local.clone(),
            heartbeat: state.heartbeat,
        }];
        members.extend(state.members.values().map(|entry| entry.state.clone()));
        GossipDigest {
            from: self.local.name.clone(),
            members,
        }
    }

    /// Fold a peer's view into ours, keeping the highest heartbeat per member.
    pub fn merge(&self, digest: &GossipDigest) -> Vec<MembershipEvent> {
        let now = Instant::now();
        let mut state = self.state();
        let mut events = Vec::new();

        for incoming in &digest.members {
            let name = &incoming.info.name;
            if *name == self.local.name {
                continue;
            }
            if state
                .tombstones
                .get(name)
                .is_some_and(|dead_at| incoming.heartbeat <= *dead_at)
            {
                continue;
            }
            state.tombstones.remove(name);

            match state.members.get_mut(name) {
                Some(entry) if incoming.heartbeat > entry.state.heartbeat => {
                    if entry.state.info != incoming.info {
                        events.push(MembershipEvent::Update(incoming.info.clone()));
                    }
                    entry.state = incoming.clone();
                    entry.last_seen = now;
                }
                Some(_) => {}
                None => {
                    events.push(MembershipEvent::Join(incoming.info.clone()));
                    state.members.insert(
                        name.clone(),
                        MemberEntry {
                            state: incoming.clone(),
                            last_seen: now,
                        },
                    );
                }
            }
        }
        drop(state);

        log_events(&events);
        events
    }

    /// Drop members whose heartbeat has not advanced within the suspect
    /// timeout.
    pub fn expire(&self) -> Vec<MembershipEvent> {
        let timeout = self.config.suspect_timeout;
        let mut state = self.state();
        let dead: Vec<(String, u64)> = state
            .members
            .iter()
            .filter(|(_, entry)| entry.last_seen.elapsed() > timeout)
            .map(|(name, entry)| (name.clone(), entry.state.heartbeat))
            .collect();

        let mut events = Vec::with_capacity(dead.len());
        for (name, heartbeat) in dead {
            state.members.remove(&name);
            state.tombstones.insert(name.clone(), heartbeat);
            events.push(MembershipEvent::Leave(name));
        }
        drop(state);

        log_events(&events);
        events
    }

    fn client(&self, addr: &str) -> Result<GatewayClient, MembershipError> {
        let url = Url::parse(addr).map_err(|source| MembershipError::InvalidAddress {
            addr: addr.to_owned(),
            source,
        })?;
        let client = GatewayClient::from_client(self.http.clone(), url);
        match &self.config.peer_token {
            Some(token) => client
                .with_token(token)
                .map_err(|source| MembershipError::Unreachable {
                    peer: addr.to_owned(),
                    source,
                }),
            None => Ok(client),
        }
    }

    /// Exchange views with the member gossiping on `addr`.
    async fn exchange(&self, addr: &str) -> Result<Vec<MembershipEvent>, MembershipError> {
        let client = self.client(addr)?;
        let reply = client
            .gossip(&self.digest())
            .await
            .map_err(|source| MembershipError::Unreachable {
                peer: addr.to_owned(),
                source,
            })?;
        Ok(self.merge(&reply))
    }

    /// Join the cluster through any one of `seeds`.
    pub async fn join(&self, seeds: &[Url]) -> Result<(), MembershipError> {
        for seed in seeds {
            match self.exchange(seed.as_str()).await {
                Ok(events) => {
                    info!(seed = %seed, learned = events.len(), "joined cluster");
                    return Ok(());
                }
                Err(e) => warn!(seed = %seed, error = %e, "seed unreachable"),
            }
        }
        Err(MembershipError::NoSeedReachable)
    }

    /// One gossip round.
    pub async fn gossip_round(&self) {
        let targets: Vec<String> = {
            let mut state = self.state();
            state.heartbeat += 1;
            let addrs: Vec<String> = state
                .members
                .values()
                .map(|entry| entry.state.info.addr.clone())
                .collect();
            addrs
                .choose_multiple(&mut rand::rng(), self.config.fanout)
                .cloned()
                .collect()
        };

        for addr in targets {
            if let Err(e) = self.exchange(&addr).await {
                debug!(peer = %addr, error = %e, "gossip exchange failed");
            }
        }
        self.expire();
    }

    /// One scheduled round.
    ///
    /// With seeds configured and nobody left in the view, the seeds are
    /// contacted again first, so a node cut off for longer than the suspect
    /// timeout finds its way back.
    pub async fn tick(&self) {
        let isolated = self.state().members.is_empty();
        if isolated && !self.config.seeds.is_empty() {
            match self.join(&self.config.seeds).await {
                Ok(()) => {}
                Err(e) => debug!(error = %e, "still isolated from the cluster"),
            }
        }
        self.gossip_round().await;
    }

    /// Gossip until `shutdown` is cancelled.
    pub async fn run(self: Arc<Self>, shutdown: CancellationToken) {
        let mut ticker = tokio::time::interval(self.config.gossip_interval);
        info!(
            name = %self.local.name,
            advertise = %self.local.addr,
            seeds = self.config.seeds.len(),
            "gossip membership started"
        );

        loop {
            tokio::select! {
                biased;

                _ = shutdown.cancelled() => {
                    info!("gossip membership received shutdown signal");
                    break;
                }

                _ = ticker.tick() => self.tick().await,
            }
        }
    }
}

impl ClusterView for GossipMembership {
    fn local_member(&self) -> MemberInfo {
        self.local.clone()
    }

    fn peers(&self) -> Vec<MemberInfo> {
        let mut peers: Vec<MemberInfo> = self
            .state()
            .members
            .values()
            .map(|entry| entry.state.info.clone())
            .collect();
        peers.sort_by(|a, b| a.name.cmp(&b.name));
        peers
    }
}

fn log_events(events: &[MembershipEvent]) {
    for event in events {
        match event {
            MembershipEvent::Join(info) => {
                info!(member = %info.name, endpoint = %info.meta.api_endpoint, "member joined")
            }
            MembershipEvent::Update(info) => {
                info!(member = %info.name, endpoint = %info.meta.api_endpoint, "member updated")
            }
            MembershipEvent::Leave(name) => info!(member = %name, "member left"),
        }
    }
}
