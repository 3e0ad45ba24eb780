//! Cluster membership configuration.

use std::time::Duration;
use url::Url;

/// How this broker joins and gossips with its siblings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterConfig {
    /// Unique member name.
    pub name: String,
    /// Base URL siblings use both for gossip and for the public RPC surface.
    pub advertise: Url,
    /// Any known members to join through.
    pub seeds: Vec<Url>,
    /// Bearer token presented to siblings.
    pub peer_token: Option<String>,
    pub gossip_interval: Duration,
    /// A member not refreshed within this window is dropped.
    pub suspect_timeout: Duration,
    /// Peers contacted per gossip round.
    pub fanout: usize,
}

impl ClusterConfig {
    pub fn new(name: impl Into<String>, advertise: Url) -> Self {
        Self {
            name: name.into(),
            advertise,
            seeds: Vec::new(),
            peer_token: None,
            gossip_interval: Duration::from_secs(1),
            suspect_timeout: Duration::from_secs(10),
            fanout: 3,
        }
    }
}
