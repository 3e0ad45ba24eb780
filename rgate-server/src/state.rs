//! Application state shared across all request handlers.

use crate::config::tokens::TokenTable;
use rgate_core::GatewayApi;
use rgate_core::cluster::GossipMembership;
use std::sync::Arc;

/// Application state that is shared across all request handlers.
///
/// This is cloneable and cheap to pass around (everything is behind Arc).
#[derive(Clone)]
pub struct AppState {
    /// Local streams plus the cluster fallback.
    pub api: GatewayApi,
    /// Gossip membership; `None` when running standalone.
    pub membership: Option<Arc<GossipMembership>>,
    pub tokens: Arc<TokenTable>,
}

impl AppState {
    pub fn new(
        api: GatewayApi,
        membership: Option<Arc<GossipMembership>>,
        tokens: Arc<TokenTable>,
    ) -> Self {
        Self {
            api,
            membership,
            tokens,
        }
    }
}
