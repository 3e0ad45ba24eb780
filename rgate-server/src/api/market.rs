use axum::{Json, extract::State};
use rgate_sdk::objects::{IsUnsealedParams, MarketConnectionState, UnsealParams};

use super::ApiError;
use super::extractors::Caller;
use crate::config::file::Permission;
use crate::state::AppState;

/// `POST /rpc/v0/market/is-unsealed`
pub(super) async fn is_unsealed(
    State(state): State<AppState>,
    caller: Caller,
    Json(params): Json<IsUnsealedParams>,
) -> Result<Json<bool>, ApiError> {
    caller.require(Permission::Read)?;
    Ok(Json(state.api.is_unsealed(caller.context(), &params).await?))
}

/// `POST /rpc/v0/market/unseal-piece`
pub(super) async fn sectors_unseal_piece(
    State(state): State<AppState>,
    caller: Caller,
    Json(params): Json<UnsealParams>,
) -> Result<Json<()>, ApiError> {
    caller.require(Permission::Write)?;
    state
        .api
        .sectors_unseal_piece(caller.context(), &params)
        .await?;
    Ok(Json(()))
}

/// `GET /rpc/v0/market/connections`
pub(super) async fn list_market_connections_state(
    State(state): State<AppState>,
    caller: Caller,
) -> Result<Json<Vec<MarketConnectionState>>, ApiError> {
    caller.require(Permission::Read)?;
    Ok(Json(state.api.market().list_market_connections_state()))
}
