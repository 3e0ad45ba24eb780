use axum::{
    Json,
    extract::{Path, State},
};
use rgate_sdk::objects::{ComputeProofParams, ConnectionStates, PoStProof};

use super::ApiError;
use super::extractors::Caller;
use crate::config::file::Permission;
use crate::state::AppState;

/// `POST /rpc/v0/proof/compute`
pub(super) async fn compute_proof(
    State(state): State<AppState>,
    caller: Caller,
    Json(params): Json<ComputeProofParams>,
) -> Result<Json<Vec<PoStProof>>, ApiError> {
    caller.require(Permission::Write)?;
    let proofs = state.api.compute_proof(caller.context(), &params).await?;
    Ok(Json(proofs))
}

/// `GET /rpc/v0/proof/miners`
pub(super) async fn list_connected_miners(
    State(state): State<AppState>,
    caller: Caller,
) -> Result<Json<Vec<String>>, ApiError> {
    caller.require(Permission::Read)?;
    Ok(Json(state.api.proof().list_connected_miners()))
}

/// `GET /rpc/v0/proof/miners/{miner}`
pub(super) async fn list_miner_connection(
    State(state): State<AppState>,
    caller: Caller,
    Path(miner): Path<String>,
) -> Result<Json<ConnectionStates>, ApiError> {
    caller.require(Permission::Read)?;
    Ok(Json(state.api.proof().list_miner_connection(&miner)?))
}
