//! Cluster membership payloads.

use serde::{Deserialize, Serialize};

/// Metadata a broker advertises to its siblings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemberMeta {
    /// Externally reachable base URL of the member's public RPC surface.
    pub api_endpoint: String,
}

/// A gossip-visible broker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemberInfo {
    pub name: String,
    /// Address the member gossips on.
    pub addr: String,
    pub meta: MemberMeta,
}

/// A member entry as carried in a gossip digest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemberState {
    pub info: MemberInfo,
    /// Monotonic counter bumped by the owning member every gossip round.
    pub heartbeat: u64,
}

/// Body of `POST /cluster/gossip`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GossipDigest {
    pub from: String,
    pub members: Vec<MemberState>,
}
