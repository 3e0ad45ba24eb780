//! Node-level entry point.
//!
//! [`GatewayApi`] answers from the local streams first. When the local
//! answer is a no-connection error and the call did not arrive from a
//! sibling, the call is re-issued to the cluster.

use rgate_sdk::objects::{
    ComputeProofParams, IsUnsealedParams, MemberInfo, PoStProof, Signature, UnsealParams,
    WalletSignParams,
};
use tracing::debug;

use crate::cluster::ClusterBroadcaster;
use crate::context::CallContext;
use crate::error::GatewayError;
use crate::streams::{MarketEventStream, ProofEventStream, WalletEventStream};

#[derive(Clone)]
pub struct GatewayApi {
    proof: ProofEventStream,
    wallet: WalletEventStream,
    market: MarketEventStream,
    cluster: Option<ClusterBroadcaster>,
}

impl GatewayApi {
    pub fn new(
        proof: ProofEventStream,
        wallet: WalletEventStream,
        market: MarketEventStream,
    ) -> Self {
        Self {
            proof,
            wallet,
            market,
            cluster: None,
        }
    }

    pub fn with_cluster(mut self, cluster: ClusterBroadcaster) -> Self {
        self.cluster = Some(cluster);
        self
    }

    pub fn proof(&self) -> &ProofEventStream {
        &self.proof
    }

    pub fn wallet(&self) -> &WalletEventStream {
        &self.wallet
    }

    pub fn market(&self) -> &MarketEventStream {
        &self.market
    }

    /// The broadcaster to fall back to, unless the call came from a sibling.
    fn fallback(&self, cx: &CallContext, err: &GatewayError) -> Option<&ClusterBroadcaster> {
        if !err.is_no_connection() || cx.no_broadcast() {
            return None;
        }
        self.cluster.as_ref()
    }

    pub async fn compute_proof(
        &self,
        cx: &CallContext,
        params: &ComputeProofParams,
    ) -> Result<Vec<PoStProof>, GatewayError> {
        match self
            .proof
            .compute_proof(cx, &params.miner, &params.request)
            .await
        {
            Err(e) => match self.fallback(cx, &e) {
                Some(cluster) => {
                    debug!(miner = %params.miner, "miner not local, asking cluster");
                    cluster.compute_proof(cx, params).await
                }
                None => Err(e),
            },
            ok => ok,
        }
    }

    pub async fn wallet_has(
        &self,
        cx: &CallContext,
        support_account: &str,
        addr: &str,
    ) -> Result<bool, GatewayError> {
        if self.wallet.wallet_has(support_account, addr) {
            return Ok(true);
        }
        match &self.cluster {
            Some(cluster) if !cx.no_broadcast() => {
                cluster.wallet_has(cx, support_account, addr).await
            }
            _ => Ok(false),
        }
    }

    pub async fn wallet_sign(
        &self,
        cx: &CallContext,
        params: &WalletSignParams,
    ) -> Result<Signature, GatewayError> {
        match self
            .wallet
            .wallet_sign(
                cx,
                &params.support_account,
                &params.addr,
                &params.to_sign,
                params.meta.clone(),
            )
            .await
        {
            Err(e) => match self.fallback(cx, &e) {
                Some(cluster) => {
                    debug!(addr = %params.addr, "wallet not local, asking cluster");
                    cluster.wallet_sign(cx, params).await
                }
                None => Err(e),
            },
            ok => ok,
        }
    }

    /// Answered by the local market stream only.
    pub async fn is_unsealed(
        &self,
        cx: &CallContext,
        params: &IsUnsealedParams,
    ) -> Result<bool, GatewayError> {
        self.market
            .is_unsealed(cx, &params.miner, &params.request)
            .await
    }

    pub async fn sectors_unseal_piece(
        &self,
        cx: &CallContext,
        params: &UnsealParams,
    ) -> Result<(), GatewayError> {
        match self
            .market
            .sectors_unseal_piece(cx, &params.miner, &params.request)
            .await
        {
            Err(e) => match self.fallback(cx, &e) {
                Some(cluster) => {
                    debug!(miner = %params.miner, "market agent not local, asking cluster");
                    cluster.sectors_unseal_piece(cx, params).await
                }
                None => Err(e),
            },
            ok => ok,
        }
    }

    /// Cluster members, local first; empty when running standalone.
    pub fn member_infos(&self) -> Vec<MemberInfo> {
        self.cluster
            .as_ref()
            .map(ClusterBroadcaster::member_infos)
            .unwrap_or_default()
    }
}
