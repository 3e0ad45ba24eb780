//! Request and response events exchanged over a registered channel.
//!
//! The broker pushes [`RequestEvent`] frames to the worker; the worker
//! answers each one (except `InitConnect`) with a [`ResponseEvent`]
//! carrying the same id.
//!
//! ```json
//! {"id":"…","method":"ComputeProof","payload":"eyJ…","createTime":"…"}
//! {"id":"…","payload":"W3si…","error":""}
//! ```

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::bytes_b64;

/// Wire-level method names.
pub struct Method;

impl Method {
    pub const INIT_CONNECT: &'static str = "InitConnect";
    pub const COMPUTE_PROOF: &'static str = "ComputeProof";
    pub const WALLET_LIST: &'static str = "WalletList";
    pub const WALLET_SIGN: &'static str = "WalletSign";
    pub const IS_UNSEALED: &'static str = "IsUnsealed";
    pub const SECTORS_UNSEAL_PIECE: &'static str = "SectorsUnsealPiece";
}

/// A request pushed from the broker to a registered worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestEvent {
    pub id: Uuid,
    pub method: String,
    #[serde(with = "bytes_b64")]
    pub payload: Vec<u8>,
    pub create_time: time::OffsetDateTime,
}

impl RequestEvent {
    /// Build a request with a fresh id stamped with the current time.
    pub fn new(method: impl Into<String>, payload: Vec<u8>) -> Self {
        Self {
            id: Uuid::new_v4(),
            method: method.into(),
            payload,
            create_time: time::OffsetDateTime::now_utc(),
        }
    }
}

/// A worker's answer to a [`RequestEvent`].
///
/// An empty `error` means success.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseEvent {
    pub id: Uuid,
    #[serde(default, with = "bytes_b64::option")]
    pub payload: Option<Vec<u8>>,
    #[serde(default)]
    pub error: String,
}

impl ResponseEvent {
    pub fn success(id: Uuid, payload: Vec<u8>) -> Self {
        Self {
            id,
            payload: Some(payload),
            error: String::new(),
        }
    }

    pub fn failure(id: Uuid, error: impl Into<String>) -> Self {
        Self {
            id,
            payload: None,
            error: error.into(),
        }
    }

    pub fn is_error(&self) -> bool {
        !self.error.is_empty()
    }
}

/// Payload of the `InitConnect` notification sent on every new channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectedCompleted {
    pub channel_id: Uuid,
}
