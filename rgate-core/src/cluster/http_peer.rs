//! Sibling brokers reached over their public RPC surface.

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Client;
use rgate_sdk::client::{ClientError, GatewayClient};
use rgate_sdk::objects::{
    ComputeProofParams, ErrorCode, MemberInfo, PoStProof, Signature, UnsealParams,
    WalletSignParams,
};
use url::Url;

use super::{PeerConnector, PeerRpc};
use crate::context::CallContext;
use crate::error::GatewayError;

/// Connects to members through the endpoint they advertise in their
/// metadata, sharing one HTTP connection pool.
#[derive(Clone)]
pub struct HttpPeerConnector {
    http: Client,
    token: Option<String>,
}

impl HttpPeerConnector {
    pub fn new(token: Option<String>) -> Self {
        Self {
            http: Client::new(),
            token,
        }
    }
}

impl PeerConnector for HttpPeerConnector {
    fn connect(&self, member: &MemberInfo) -> Result<Arc<dyn PeerRpc>, GatewayError> {
        let unreachable = |reason: String| GatewayError::Peer {
            peer: member.name.clone(),
            reason,
        };
        let url = Url::parse(&member.meta.api_endpoint).map_err(|e| unreachable(e.to_string()))?;
        let mut client = GatewayClient::from_client(self.http.clone(), url);
        if let Some(token) = &self.token {
            client = client
                .with_token(token)
                .map_err(|e| unreachable(e.to_string()))?;
        }
        Ok(Arc::new(HttpPeer {
            name: member.name.clone(),
            client,
        }))
    }
}

struct HttpPeer {
    name: String,
    client: GatewayClient,
}

impl HttpPeer {
    fn client(&self, cx: &CallContext) -> GatewayClient {
        if cx.no_broadcast() {
            self.client.clone().without_broadcast()
        } else {
            self.client.clone()
        }
    }

    /// Recover the broker-side error class across the hop.
    fn map_err(&self, err: ClientError) -> GatewayError {
        match err {
            ClientError::Gateway { code, message, .. } => match code {
                ErrorCode::NoConnection => GatewayError::NoConnection(message),
                ErrorCode::NoGatewayHasIdentity => GatewayError::NoGatewayHasIdentity(message),
                ErrorCode::Unauthorized | ErrorCode::Forbidden | ErrorCode::Internal => {
                    GatewayError::Peer {
                        peer: self.name.clone(),
                        reason: message,
                    }
                }
                _ => GatewayError::Remote(message),
            },
            other => GatewayError::Peer {
                peer: self.name.clone(),
                reason: other.to_string(),
            },
        }
    }
}

#[async_trait]
impl PeerRpc for HttpPeer {
    async fn wallet_has(
        &self,
        cx: &CallContext,
        support_account: &str,
        addr: &str,
    ) -> Result<bool, GatewayError> {
        self.client(cx)
            .wallet_has(support_account, addr)
            .await
            .map_err(|e| self.map_err(e))
    }

    async fn wallet_sign(
        &self,
        cx: &CallContext,
        params: &WalletSignParams,
    ) -> Result<Signature, GatewayError> {
        self.client(cx)
            .wallet_sign(params)
            .await
            .map_err(|e| self.map_err(e))
    }

    async fn compute_proof(
        &self,
        cx: &CallContext,
        params: &ComputeProofParams,
    ) -> Result<Vec<PoStProof>, GatewayError> {
        self.client(cx)
            .compute_proof(params)
            .await
            .map_err(|e| self.map_err(e))
    }

    async fn sectors_unseal_piece(
        &self,
        cx: &CallContext,
        params: &UnsealParams,
    ) -> Result<(), GatewayError> {
        self.client(cx)
            .sectors_unseal_piece(params)
            .await
            .map_err(|e| self.map_err(e))
    }
}
