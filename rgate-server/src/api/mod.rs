//! HTTP and websocket surface of the broker.
//!
//! # Endpoints
//!
//! - `GET  /ws/{proof,wallet,market}`         – worker registration (write)
//! - `POST /rpc/v0/proof/compute`             – compute a PoSt proof (write)
//! - `GET  /rpc/v0/proof/miners[/{miner}]`    – proof connections (read)
//! - `POST /rpc/v0/wallet/has`                – wallet lookup (read)
//! - `POST /rpc/v0/wallet/sign`               – sign with a wallet (sign)
//! - `POST /rpc/v0/wallet/{add,remove}-address`, `support-account` (write)
//! - `GET  /rpc/v0/wallet/list[/{account}]`   – wallet connections (read)
//! - `POST /rpc/v0/market/is-unsealed`        – unseal check (read)
//! - `POST /rpc/v0/market/unseal-piece`       – unseal a piece (write)
//! - `GET  /rpc/v0/market/connections`        – market connections (read)
//! - `GET  /cluster/members`                  – membership (read)
//! - `POST /cluster/gossip`                   – gossip exchange (admin)

use axum::{
    Json, Router,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use rgate_core::GatewayError;
use rgate_sdk::objects::{ApiErrorBody, ErrorCode};

use crate::config::file::Permission;
use crate::state::AppState;

mod cluster;
pub(crate) mod extractors;
mod market;
mod proof;
mod wallet;
mod ws;

/// Build the API router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/ws/proof", get(ws::proof_ws))
        .route("/ws/wallet", get(ws::wallet_ws))
        .route("/ws/market", get(ws::market_ws))
        .route("/rpc/v0/proof/compute", post(proof::compute_proof))
        .route("/rpc/v0/proof/miners", get(proof::list_connected_miners))
        .route(
            "/rpc/v0/proof/miners/{miner}",
            get(proof::list_miner_connection),
        )
        .route("/rpc/v0/wallet/has", post(wallet::wallet_has))
        .route("/rpc/v0/wallet/sign", post(wallet::wallet_sign))
        .route("/rpc/v0/wallet/add-address", post(wallet::add_new_address))
        .route("/rpc/v0/wallet/remove-address", post(wallet::remove_address))
        .route("/rpc/v0/wallet/support-account", post(wallet::support_account))
        .route("/rpc/v0/wallet/list", get(wallet::list_wallet_info))
        .route(
            "/rpc/v0/wallet/list/{account}",
            get(wallet::list_wallet_info_by_wallet),
        )
        .route("/rpc/v0/market/is-unsealed", post(market::is_unsealed))
        .route("/rpc/v0/market/unseal-piece", post(market::sectors_unseal_piece))
        .route(
            "/rpc/v0/market/connections",
            get(market::list_market_connections_state),
        )
        .route("/cluster/members", get(cluster::members))
        .route("/cluster/gossip", post(cluster::gossip))
}

// ---------------------------------------------------------------------------
// Shared error type
// ---------------------------------------------------------------------------

/// Errors returned by every handler, rendered as [`ApiErrorBody`].
#[derive(Debug)]
pub(crate) enum ApiError {
    Gateway(GatewayError),
    Unauthorized,
    Forbidden(Permission),
    ClusterDisabled,
}

impl From<GatewayError> for ApiError {
    fn from(err: GatewayError) -> Self {
        ApiError::Gateway(err)
    }
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::ClusterDisabled => StatusCode::NOT_FOUND,
            ApiError::Gateway(e) => match e {
                GatewayError::ValidationFailed { .. } => StatusCode::FORBIDDEN,
                GatewayError::IdentityNotPresent => StatusCode::UNAUTHORIZED,
                GatewayError::NoConnection(_)
                | GatewayError::NoGatewayHasIdentity(_)
                | GatewayError::ChannelNotFound(_) => StatusCode::NOT_FOUND,
                GatewayError::Cancelled | GatewayError::ChannelClosed(_) => {
                    StatusCode::SERVICE_UNAVAILABLE
                }
                GatewayError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
                GatewayError::Remote(_)
                | GatewayError::MalformedPayload(_)
                | GatewayError::Peer { .. } => StatusCode::BAD_GATEWAY,
            },
        }
    }

    fn body(&self) -> ApiErrorBody {
        let (code, message) = match self {
            ApiError::Gateway(e) => (e.code(), e.to_string()),
            ApiError::Unauthorized => (ErrorCode::Unauthorized, "invalid bearer token".to_owned()),
            ApiError::Forbidden(needed) => (
                ErrorCode::Forbidden,
                format!("token lacks {needed:?} permission"),
            ),
            ApiError::ClusterDisabled => (
                ErrorCode::Internal,
                "this broker is not part of a cluster".to_owned(),
            ),
        };
        ApiErrorBody { code, message }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = self.body();
        if status.is_server_error() {
            tracing::warn!(code = ?body.code, message = %body.message, "API request failed");
        } else {
            tracing::debug!(code = ?body.code, message = %body.message, "API request rejected");
        }
        (status, Json(body)).into_response()
    }
}
