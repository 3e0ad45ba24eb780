//! Error body returned by every public endpoint.
//!
//! The `code` field lets a client (and a sibling broker) recover the error
//! class across the HTTP hop, which matters for cluster aggregation: a
//! `no_connection` answer means "try the next member".

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    ValidationFailed,
    NoConnection,
    NoGatewayHasIdentity,
    Cancelled,
    Timeout,
    Remote,
    MalformedPayload,
    IdentityNotPresent,
    ChannelClosed,
    ChannelNotFound,
    Peer,
    Unauthorized,
    Forbidden,
    Internal,
}

impl ErrorCode {
    /// Whether this code means "nobody here holds the identity".
    pub fn is_no_connection(self) -> bool {
        matches!(self, ErrorCode::NoConnection | ErrorCode::NoGatewayHasIdentity)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiErrorBody {
    pub code: ErrorCode,
    pub message: String,
}
