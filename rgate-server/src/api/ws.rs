//! Worker registration over websockets.
//!
//! 1. The worker's first text frame is its JSON registration policy.
//! 2. The broker registers a channel and relays every `RequestEvent` queued
//!    on it as a text frame.
//! 3. Text frames from the worker are `ResponseEvent`s, resolved on the
//!    stream the worker registered with.
//! 4. When the socket closes the registration context is cancelled and the
//!    channel is removed.
//!
//! A rejected registration is closed with a policy-violation frame carrying
//! the reason.

use std::time::Duration;

use axum::{
    extract::{
        State,
        ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade, close_code},
    },
    response::{IntoResponse, Response},
};
use rgate_core::{CallContext, GatewayError};
use rgate_core::events::ChannelHandle;
use rgate_sdk::objects::{
    MarketRegisterPolicy, ProofRegisterPolicy, RequestEvent, ResponseEvent, WalletRegisterPolicy,
};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::ApiError;
use super::extractors::Caller;
use crate::config::file::Permission;
use crate::state::AppState;

/// How long a worker has to send its policy after the upgrade.
const POLICY_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy)]
enum Domain {
    Proof,
    Wallet,
    Market,
}

impl Domain {
    fn name(self) -> &'static str {
        match self {
            Domain::Proof => "proof",
            Domain::Wallet => "wallet",
            Domain::Market => "market",
        }
    }

    async fn register(
        self,
        state: &AppState,
        cx: &CallContext,
        policy: &str,
    ) -> Result<ChannelHandle, GatewayError> {
        match self {
            Domain::Proof => {
                let policy: ProofRegisterPolicy = serde_json::from_str(policy)?;
                state.api.proof().listen_proof_event(cx, &policy).await
            }
            Domain::Wallet => {
                let policy: WalletRegisterPolicy = serde_json::from_str(policy)?;
                state.api.wallet().listen_wallet_event(cx, &policy).await
            }
            Domain::Market => {
                let policy: MarketRegisterPolicy = serde_json::from_str(policy)?;
                state.api.market().listen_market_event(cx, &policy).await
            }
        }
    }

    fn resolve(self, state: &AppState, response: ResponseEvent) {
        match self {
            Domain::Proof => state.api.proof().response_event(response),
            Domain::Wallet => state.api.wallet().response_event(response),
            Domain::Market => state.api.market().response_event(response),
        }
    }

    fn reject(self, state: &AppState, id: Uuid, err: GatewayError) {
        match self {
            Domain::Proof => state.api.proof().reject_response(id, err),
            Domain::Wallet => state.api.wallet().reject_response(id, err),
            Domain::Market => state.api.market().reject_response(id, err),
        }
    }
}

/// `GET /ws/proof`
pub(super) async fn proof_ws(
    state: State<AppState>,
    caller: Caller,
    ws: WebSocketUpgrade,
) -> Result<Response, ApiError> {
    upgrade(state.0, caller, ws, Domain::Proof)
}

/// `GET /ws/wallet`
pub(super) async fn wallet_ws(
    state: State<AppState>,
    caller: Caller,
    ws: WebSocketUpgrade,
) -> Result<Response, ApiError> {
    upgrade(state.0, caller, ws, Domain::Wallet)
}

/// `GET /ws/market`
pub(super) async fn market_ws(
    state: State<AppState>,
    caller: Caller,
    ws: WebSocketUpgrade,
) -> Result<Response, ApiError> {
    upgrade(state.0, caller, ws, Domain::Market)
}

fn upgrade(
    state: AppState,
    caller: Caller,
    ws: WebSocketUpgrade,
    domain: Domain,
) -> Result<Response, ApiError> {
    caller.require(Permission::Write)?;
    let cx = caller.session_context();
    Ok(ws
        .on_upgrade(move |socket| serve_channel(socket, state, cx, domain))
        .into_response())
}

async fn read_policy(socket: &mut WebSocket) -> Option<String> {
    loop {
        let frame = tokio::time::timeout(POLICY_TIMEOUT, socket.recv())
            .await
            .ok()??;
        match frame {
            Ok(Message::Text(text)) => return Some(text.as_str().to_owned()),
            Ok(Message::Close(_)) | Err(_) => return None,
            Ok(_) => continue,
        }
    }
}

async fn close_with(socket: &mut WebSocket, code: u16, reason: String) {
    let frame = CloseFrame {
        code,
        reason: reason.into(),
    };
    let _ = socket.send(Message::Close(Some(frame))).await;
}

/// Background task that drives a single registration.
async fn serve_channel(mut socket: WebSocket, state: AppState, cx: CallContext, domain: Domain) {
    let Some(policy) = read_policy(&mut socket).await else {
        debug!(domain = domain.name(), "worker left before sending a policy");
        return;
    };

    let handle = match domain.register(&state, &cx, &policy).await {
        Ok(handle) => handle,
        Err(e) => {
            warn!(domain = domain.name(), ip = %cx.ip_string(), error = %e, "registration rejected");
            close_with(&mut socket, close_code::POLICY, e.to_string()).await;
            return;
        }
    };
    let channel_id = handle.channel_id;
    let mut events = handle.events;
    info!(domain = domain.name(), %channel_id, ip = %cx.ip_string(), "worker connected");

    loop {
        tokio::select! {
            event = events.recv() => {
                let Some(event) = event else {
                    // the broker dropped the channel
                    close_with(&mut socket, close_code::NORMAL, "channel closed".to_owned()).await;
                    break;
                };
                if let Err(e) = send_event(&mut socket, &event).await {
                    debug!(%channel_id, error = %e, "failed to forward request");
                    break;
                }
            }

            frame = socket.recv() => {
                match frame {
                    Some(Ok(Message::Text(text))) => handle_response(&state, domain, text.as_str()),
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        debug!(%channel_id, error = %e, "websocket error");
                        break;
                    }
                }
            }
        }
    }

    cx.cancel_token().cancel();
    info!(domain = domain.name(), %channel_id, "worker disconnected");
}

/// Resolve a worker's response frame.
///
/// A frame that does not decode but still names a request id fails that
/// request with `MalformedPayload`.
fn handle_response(state: &AppState, domain: Domain, text: &str) {
    match serde_json::from_str::<ResponseEvent>(text) {
        Ok(response) => domain.resolve(state, response),
        Err(e) => match response_id(text) {
            Some(id) => {
                warn!(domain = domain.name(), %id, error = %e, "malformed response frame");
                domain.reject(state, id, GatewayError::MalformedPayload(e));
            }
            None => warn!(domain = domain.name(), error = %e, "dropping unattributable frame"),
        },
    }
}

fn response_id(text: &str) -> Option<Uuid> {
    let value: serde_json::Value = serde_json::from_str(text).ok()?;
    value.get("id")?.as_str()?.parse().ok()
}

async fn send_event(socket: &mut WebSocket, event: &RequestEvent) -> Result<(), axum::Error> {
    let json = serde_json::to_string(event).map_err(axum::Error::new)?;
    socket.send(Message::Text(json.into())).await
}
