//! TOML file configuration structures.
//!
//! These structs directly map to the `rgate.toml` file format.

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use url::Url;

/// Root configuration structure as read from the TOML file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileConfig {
    pub server: ServerConfig,
    #[serde(default)]
    pub request: RequestConfig,
    /// Absent when the broker runs standalone.
    pub cluster: Option<ClusterConfig>,
    #[serde(default)]
    pub tokens: Vec<TokenConfig>,
}

/// Server configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// The address and port to listen on (e.g., "0.0.0.0:45132").
    #[serde(default = "default_listen_addr")]
    pub listen: SocketAddr,
    /// Base URL siblings and callers reach this broker at.
    pub public_endpoint: Url,
}

fn default_listen_addr() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 45132))
}

/// Request dispatch section, shared by all three event streams.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestConfig {
    #[serde(default = "default_queue_size")]
    pub queue_size: usize,
    #[serde(default = "default_five_minutes")]
    pub timeout_secs: u64,
    #[serde(default = "default_five_minutes")]
    pub clear_interval_secs: u64,
}

impl Default for RequestConfig {
    fn default() -> Self {
        Self {
            queue_size: default_queue_size(),
            timeout_secs: default_five_minutes(),
            clear_interval_secs: default_five_minutes(),
        }
    }
}

fn default_queue_size() -> usize {
    30
}

fn default_five_minutes() -> u64 {
    300
}

/// Cluster membership section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterConfig {
    /// Unique member name.
    pub name: String,
    #[serde(default)]
    pub seeds: Vec<Url>,
    /// Token this broker presents to its siblings. It must map to an
    /// `admin` entry in their `[[tokens]]`.
    pub peer_token: Option<String>,
    #[serde(default = "default_gossip_interval")]
    pub gossip_interval_secs: u64,
    #[serde(default = "default_suspect_timeout")]
    pub suspect_timeout_secs: u64,
    #[serde(default = "default_fanout")]
    pub fanout: usize,
}

fn default_gossip_interval() -> u64 {
    1
}

fn default_suspect_timeout() -> u64 {
    10
}

fn default_fanout() -> usize {
    3
}

/// What a bearer token may do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Permission {
    Read,
    Write,
    Sign,
    Admin,
}

/// One accepted bearer token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenConfig {
    pub token: String,
    pub account: String,
    pub permission: Permission,
    /// Miners this token may register workers for; `"*"` allows any.
    #[serde(default)]
    pub miners: Vec<String>,
}
