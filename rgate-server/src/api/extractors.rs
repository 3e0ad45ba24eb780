//! Custom Axum extractor for request authentication.
//!
//! [`Caller`] resolves the `Authorization: Bearer <token>` header against the
//! token table and builds the [`CallContext`] the broker core runs the
//! request under:
//! - the token's account becomes the ambient identity
//! - the peer address becomes the connection IP
//! - `Rgate-No-Broadcast: 1` sets the broadcast-prevention flag
//!
//! The context is cancelled when the handler future is dropped, so a caller
//! that hangs up stops waiting on its worker.

use std::net::SocketAddr;

use axum::{
    extract::{ConnectInfo, FromRequestParts},
    http::{header::AUTHORIZATION, request::Parts},
};
use rgate_core::CallContext;
use rgate_sdk::NO_BROADCAST_HEADER;
use tokio_util::sync::{CancellationToken, DropGuard};

use super::ApiError;
use crate::config::file::Permission;
use crate::config::tokens::Principal;
use crate::state::AppState;

pub(crate) struct Caller {
    pub principal: Principal,
    cx: CallContext,
    _guard: DropGuard,
}

impl Caller {
    /// Reject the request unless the token carries at least `needed`.
    pub fn require(&self, needed: Permission) -> Result<(), ApiError> {
        if self.principal.permission >= needed {
            Ok(())
        } else {
            Err(ApiError::Forbidden(needed))
        }
    }

    /// Context of this HTTP request.
    pub fn context(&self) -> &CallContext {
        &self.cx
    }

    /// A context for a registration that outlives the upgrade request.
    ///
    /// It carries the same identity but its own token, cancelled by the
    /// websocket task when the socket closes.
    pub fn session_context(&self) -> CallContext {
        let mut cx =
            CallContext::new(CancellationToken::new()).with_account(&self.principal.account);
        if let Some(ip) = self.cx.ip() {
            cx = cx.with_ip(ip);
        }
        cx
    }
}

impl FromRequestParts<AppState> for Caller {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .ok_or(ApiError::Unauthorized)?;
        let principal = state
            .tokens
            .authenticate(token)
            .cloned()
            .ok_or(ApiError::Unauthorized)?;

        let cancel = CancellationToken::new();
        let mut cx = CallContext::new(cancel.clone()).with_account(&principal.account);
        if let Some(ConnectInfo(addr)) = parts.extensions.get::<ConnectInfo<SocketAddr>>() {
            cx = cx.with_ip(addr.ip());
        }
        if parts
            .headers
            .get(NO_BROADCAST_HEADER)
            .is_some_and(|v| v == "1")
        {
            cx = cx.without_broadcast();
        }

        Ok(Caller {
            principal,
            cx,
            _guard: cancel.drop_guard(),
        })
    }
}
