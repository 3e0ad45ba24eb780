//! Read-only connection snapshots returned by the listing APIs.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One registered channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionInfo {
    pub channel_id: Uuid,
    pub ip: String,
    /// Requests dispatched on this channel that are still awaiting a reply.
    pub request_count: usize,
    pub create_time: time::OffsetDateTime,
}

/// All channels registered for one identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionStates {
    pub connections: Vec<ConnectionInfo>,
    pub connection_count: usize,
}

impl ConnectionStates {
    pub fn new(connections: Vec<ConnectionInfo>) -> Self {
        Self {
            connection_count: connections.len(),
            connections,
        }
    }
}

/// Market connection state of one miner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarketConnectionState {
    pub addr: String,
    pub conn: ConnectionStates,
}
