//! Public RPC client (callers and sibling brokers → rgate).

use reqwest::Client;
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue};
use serde::Serialize;
use serde::de::DeserializeOwned;
use url::Url;
use uuid::Uuid;

use super::{ClientError, parse_response};
use crate::NO_BROADCAST_HEADER;
use crate::objects::proof::ComputeProofParams;
use crate::objects::{
    AddressesRequest, ConnectionStates, GossipDigest, IsUnsealedParams, MarketConnectionState,
    MemberInfo, PoStProof, Signature, SupportAccountRequest, UnsealParams, WalletDetail,
    WalletHasRequest, WalletSignParams,
};

/// Typed HTTP client for the rgate **public RPC surface**.
///
/// Brokers use it with [`without_broadcast`](Self::without_broadcast) to
/// query their siblings; the flag makes the receiving broker answer from its
/// local registry only.
#[derive(Debug, Clone)]
pub struct GatewayClient {
    http: Client,
    base_url: Url,
    headers: HeaderMap,
}

impl GatewayClient {
    /// Create a new `GatewayClient` for the broker at `base_url`.
    pub fn new(base_url: Url) -> Self {
        Self::from_client(Client::new(), base_url)
    }

    /// Create a client sharing an existing connection pool.
    pub fn from_client(http: Client, base_url: Url) -> Self {
        Self {
            http,
            base_url,
            headers: HeaderMap::new(),
        }
    }

    /// Authenticate every request with a bearer token.
    pub fn with_token(mut self, token: &str) -> Result<Self, ClientError> {
        let value = HeaderValue::from_str(&format!("Bearer {token}"))
            .map_err(|_| ClientError::InvalidToken)?;
        self.headers.insert(AUTHORIZATION, value);
        Ok(self)
    }

    /// Mark every request with the broadcast-prevention flag.
    pub fn without_broadcast(mut self) -> Self {
        self.headers
            .insert(NO_BROADCAST_HEADER, HeaderValue::from_static("1"));
        self
    }

    /// Replace the default `reqwest::Client` with a custom one (e.g. to
    /// configure timeouts).
    pub fn with_http_client(mut self, client: Client) -> Self {
        self.http = client;
        self
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    async fn post<B: Serialize, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, ClientError> {
        let url = self.base_url.join(path)?;
        let resp = self
            .http
            .post(url)
            .headers(self.headers.clone())
            .json(body)
            .send()
            .await?;
        parse_response(resp).await
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, ClientError> {
        let url = self.base_url.join(path)?;
        let resp = self
            .http
            .get(url)
            .headers(self.headers.clone())
            .send()
            .await?;
        parse_response(resp).await
    }

    // -- proof --------------------------------------------------------------

    /// `POST /rpc/v0/proof/compute`
    pub async fn compute_proof(
        &self,
        params: &ComputeProofParams,
    ) -> Result<Vec<PoStProof>, ClientError> {
        self.post("/rpc/v0/proof/compute", params).await
    }

    /// `GET /rpc/v0/proof/miners`
    pub async fn list_connected_miners(&self) -> Result<Vec<String>, ClientError> {
        self.get("/rpc/v0/proof/miners").await
    }

    /// `GET /rpc/v0/proof/miners/{miner}`
    pub async fn list_miner_connection(&self, miner: &str) -> Result<ConnectionStates, ClientError> {
        self.get(&format!("/rpc/v0/proof/miners/{miner}")).await
    }

    // -- wallet -------------------------------------------------------------

    /// `POST /rpc/v0/wallet/has`
    pub async fn wallet_has(&self, support_account: &str, addr: &str) -> Result<bool, ClientError> {
        let body = WalletHasRequest {
            support_account: support_account.to_owned(),
            addr: addr.to_owned(),
        };
        self.post("/rpc/v0/wallet/has", &body).await
    }

    /// `POST /rpc/v0/wallet/sign`
    pub async fn wallet_sign(&self, params: &WalletSignParams) -> Result<Signature, ClientError> {
        self.post("/rpc/v0/wallet/sign", params).await
    }

    /// `POST /rpc/v0/wallet/add-address`
    pub async fn add_new_address(
        &self,
        channel_id: Uuid,
        addrs: Vec<String>,
    ) -> Result<(), ClientError> {
        let body = AddressesRequest { channel_id, addrs };
        self.post("/rpc/v0/wallet/add-address", &body).await
    }

    /// `POST /rpc/v0/wallet/remove-address`
    pub async fn remove_address(
        &self,
        channel_id: Uuid,
        addrs: Vec<String>,
    ) -> Result<(), ClientError> {
        let body = AddressesRequest { channel_id, addrs };
        self.post("/rpc/v0/wallet/remove-address", &body).await
    }

    /// `POST /rpc/v0/wallet/support-account`
    pub async fn support_account(&self, support_account: &str) -> Result<(), ClientError> {
        let body = SupportAccountRequest {
            support_account: support_account.to_owned(),
        };
        self.post("/rpc/v0/wallet/support-account", &body).await
    }

    /// `GET /rpc/v0/wallet/list`
    pub async fn list_wallet_info(&self) -> Result<Vec<WalletDetail>, ClientError> {
        self.get("/rpc/v0/wallet/list").await
    }

    /// `GET /rpc/v0/wallet/list/{account}`
    pub async fn list_wallet_info_by_wallet(
        &self,
        account: &str,
    ) -> Result<WalletDetail, ClientError> {
        self.get(&format!("/rpc/v0/wallet/list/{account}")).await
    }

    // -- market -------------------------------------------------------------

    /// `POST /rpc/v0/market/is-unsealed`
    pub async fn is_unsealed(&self, params: &IsUnsealedParams) -> Result<bool, ClientError> {
        self.post("/rpc/v0/market/is-unsealed", params).await
    }

    /// `POST /rpc/v0/market/unseal-piece`
    pub async fn sectors_unseal_piece(&self, params: &UnsealParams) -> Result<(), ClientError> {
        self.post("/rpc/v0/market/unseal-piece", params).await
    }

    /// `GET /rpc/v0/market/connections`
    pub async fn list_market_connections_state(
        &self,
    ) -> Result<Vec<MarketConnectionState>, ClientError> {
        self.get("/rpc/v0/market/connections").await
    }

    // -- cluster ------------------------------------------------------------

    /// `GET /cluster/members`
    pub async fn member_infos(&self) -> Result<Vec<MemberInfo>, ClientError> {
        self.get("/cluster/members").await
    }

    /// `POST /cluster/gossip` – push our digest, receive the peer's view.
    pub async fn gossip(&self, digest: &GossipDigest) -> Result<GossipDigest, ClientError> {
        self.post("/cluster/gossip", digest).await
    }
}
