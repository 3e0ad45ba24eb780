//! Cluster-wide visibility across sibling brokers.
//!
//! A worker is connected to exactly one broker, so a call for an identity
//! that has no local channel is re-issued to every other member of the
//! cluster. The pieces:
//!
//! - [`ClusterView`]: who the members are (backed by [`GossipMembership`])
//! - [`PeerConnector`]/[`PeerRpc`]: how to call a member (backed by
//!   [`HttpPeerConnector`])
//! - [`ClusterBroadcaster`]: the aggregation rules
//!
//! Every call a broker sends to a sibling carries the broadcast-prevention
//! flag, so a broadcast is always a single hop.

mod broadcaster;
mod http_peer;
mod membership;

pub use broadcaster::ClusterBroadcaster;
pub use http_peer::HttpPeerConnector;
pub use membership::{GossipMembership, MembershipError, MembershipEvent};

use std::sync::Arc;

use async_trait::async_trait;
use rgate_sdk::objects::{
    ComputeProofParams, MemberInfo, PoStProof, Signature, UnsealParams, WalletSignParams,
};

use crate::context::CallContext;
use crate::error::GatewayError;

/// Read-only view of the cluster membership.
pub trait ClusterView: Send + Sync {
    fn local_member(&self) -> MemberInfo;

    /// Every live member except the local one.
    fn peers(&self) -> Vec<MemberInfo>;
}

/// The domain calls a broker can forward to a sibling.
#[async_trait]
pub trait PeerRpc: Send + Sync {
    async fn wallet_has(
        &self,
        cx: &CallContext,
        support_account: &str,
        addr: &str,
    ) -> Result<bool, GatewayError>;

    async fn wallet_sign(
        &self,
        cx: &CallContext,
        params: &WalletSignParams,
    ) -> Result<Signature, GatewayError>;

    async fn compute_proof(
        &self,
        cx: &CallContext,
        params: &ComputeProofParams,
    ) -> Result<Vec<PoStProof>, GatewayError>;

    async fn sectors_unseal_piece(
        &self,
        cx: &CallContext,
        params: &UnsealParams,
    ) -> Result<(), GatewayError>;
}

/// Resolves a member to something that can be called.
pub trait PeerConnector: Send + Sync {
    fn connect(&self, member: &MemberInfo) -> Result<Arc<dyn PeerRpc>, GatewayError>;
}
