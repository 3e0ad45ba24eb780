use axum::{
    Json,
    extract::{Path, State},
};
use rgate_sdk::objects::{
    AddressesRequest, Signature, SupportAccountRequest, WalletDetail, WalletHasRequest,
    WalletSignParams,
};

use super::ApiError;
use super::extractors::Caller;
use crate::config::file::Permission;
use crate::state::AppState;

/// `POST /rpc/v0/wallet/has`
pub(super) async fn wallet_has(
    State(state): State<AppState>,
    caller: Caller,
    Json(body): Json<WalletHasRequest>,
) -> Result<Json<bool>, ApiError> {
    caller.require(Permission::Read)?;
    let has = state
        .api
        .wallet_has(caller.context(), &body.support_account, &body.addr)
        .await?;
    Ok(Json(has))
}

/// `POST /rpc/v0/wallet/sign`
pub(super) async fn wallet_sign(
    State(state): State<AppState>,
    caller: Caller,
    Json(params): Json<WalletSignParams>,
) -> Result<Json<Signature>, ApiError> {
    caller.require(Permission::Sign)?;
    let signature = state.api.wallet_sign(caller.context(), &params).await?;
    Ok(Json(signature))
}

/// `POST /rpc/v0/wallet/add-address`
///
/// Only the wallet account owning the channel may change its addresses.
pub(super) async fn add_new_address(
    State(state): State<AppState>,
    caller: Caller,
    Json(body): Json<AddressesRequest>,
) -> Result<Json<()>, ApiError> {
    caller.require(Permission::Write)?;
    state
        .api
        .wallet()
        .add_new_address(caller.context(), body.channel_id, body.addrs)?;
    Ok(Json(()))
}

/// `POST /rpc/v0/wallet/remove-address`
pub(super) async fn remove_address(
    State(state): State<AppState>,
    caller: Caller,
    Json(body): Json<AddressesRequest>,
) -> Result<Json<()>, ApiError> {
    caller.require(Permission::Write)?;
    state
        .api
        .wallet()
        .remove_address(caller.context(), body.channel_id, body.addrs)?;
    Ok(Json(()))
}

/// `POST /rpc/v0/wallet/support-account`
pub(super) async fn support_account(
    State(state): State<AppState>,
    caller: Caller,
    Json(body): Json<SupportAccountRequest>,
) -> Result<Json<()>, ApiError> {
    caller.require(Permission::Write)?;
    state
        .api
        .wallet()
        .support_account(caller.context(), &body.support_account)?;
    Ok(Json(()))
}

/// `GET /rpc/v0/wallet/list`
pub(super) async fn list_wallet_info(
    State(state): State<AppState>,
    caller: Caller,
) -> Result<Json<Vec<WalletDetail>>, ApiError> {
    caller.require(Permission::Read)?;
    Ok(Json(state.api.wallet().list_wallet_info()))
}

/// `GET /rpc/v0/wallet/list/{account}`
pub(super) async fn list_wallet_info_by_wallet(
    State(state): State<AppState>,
    caller: Caller,
    Path(account): Path<String>,
) -> Result<Json<WalletDetail>, ApiError> {
    caller.require(Permission::Read)?;
    Ok(Json(state.api.wallet().list_wallet_info_by_wallet(&account)?))
}
