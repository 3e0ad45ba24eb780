//! Error taxonomy shared by every broker component.

use rgate_sdk::objects::ErrorCode;
use thiserror::Error;
use uuid::Uuid;

/// Errors surfaced synchronously to the caller of a broker operation.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// The identity is not authorized or not bound to the caller.
    #[error("validation failed for {identity}: {reason}")]
    ValidationFailed { identity: String, reason: String },

    /// No live channel for the identity on this node.
    #[error("no connections for this identity: {0}")]
    NoConnection(String),

    /// No channel for the identity on any cluster member.
    #[error("no gateway node has identity {0}")]
    NoGatewayHasIdentity(String),

    /// The caller's context ended before a result was available.
    #[error("request cancelled")]
    Cancelled,

    /// The pending request was reaped before a response arrived.
    #[error("request {0} timed out")]
    Timeout(Uuid),

    /// The worker reported failure in the response's `error` field.
    #[error("remote error: {0}")]
    Remote(String),

    /// A payload could not be (de)serialized.
    #[error("malformed payload: {0}")]
    MalformedPayload(#[from] serde_json::Error),

    /// The call context carries no authenticated account.
    #[error("identity not present in call context")]
    IdentityNotPresent,

    /// The channel's outbound queue is closed.
    #[error("channel {0} closed")]
    ChannelClosed(Uuid),

    /// No channel with this id is owned by the caller.
    #[error("channel {0} not found")]
    ChannelNotFound(Uuid),

    /// A sibling broker could not be reached or answered garbage.
    #[error("peer {peer} failed: {reason}")]
    Peer { peer: String, reason: String },
}

impl GatewayError {
    /// Whether the error means "nobody here holds the identity".
    ///
    /// Cluster aggregation keeps trying other members on these.
    pub fn is_no_connection(&self) -> bool {
        matches!(
            self,
            GatewayError::NoConnection(_) | GatewayError::NoGatewayHasIdentity(_)
        )
    }

    /// Wire error class.
    pub fn code(&self) -> ErrorCode {
        match self {
            GatewayError::ValidationFailed { .. } => ErrorCode::ValidationFailed,
            GatewayError::NoConnection(_) => ErrorCode::NoConnection,
            GatewayError::NoGatewayHasIdentity(_) => ErrorCode::NoGatewayHasIdentity,
            GatewayError::Cancelled => ErrorCode::Cancelled,
            GatewayError::Timeout(_) => ErrorCode::Timeout,
            GatewayError::Remote(_) => ErrorCode::Remote,
            GatewayError::MalformedPayload(_) => ErrorCode::MalformedPayload,
            GatewayError::IdentityNotPresent => ErrorCode::IdentityNotPresent,
            GatewayError::ChannelClosed(_) => ErrorCode::ChannelClosed,
            GatewayError::ChannelNotFound(_) => ErrorCode::ChannelNotFound,
            GatewayError::Peer { .. } => ErrorCode::Peer,
        }
    }
}
