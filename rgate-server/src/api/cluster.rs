use axum::{Json, extract::State};
use rgate_sdk::objects::{GossipDigest, MemberInfo};

use super::ApiError;
use super::extractors::Caller;
use crate::config::file::Permission;
use crate::state::AppState;

/// `GET /cluster/members` – this broker first, then its live peers.
pub(super) async fn members(
    State(state): State<AppState>,
    caller: Caller,
) -> Result<Json<Vec<MemberInfo>>, ApiError> {
    caller.require(Permission::Read)?;
    Ok(Json(state.api.member_infos()))
}

/// `POST /cluster/gossip` – merge the sender's view and answer with ours.
pub(super) async fn gossip(
    State(state): State<AppState>,
    caller: Caller,
    Json(digest): Json<GossipDigest>,
) -> Result<Json<GossipDigest>, ApiError> {
    caller.require(Permission::Admin)?;
    let membership = state.membership.as_ref().ok_or(ApiError::ClusterDisabled)?;
    tracing::trace!(from = %digest.from, members = digest.members.len(), "gossip received");
    membership.merge(&digest);
    Ok(Json(membership.digest()))
}
