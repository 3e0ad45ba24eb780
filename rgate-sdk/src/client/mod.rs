//! Clients for the rgate broker.
//!
//! Gated behind the `client` cargo feature so downstream crates that only
//! need the wire types do not pull in `reqwest` and `tokio-tungstenite`.

mod gateway;
mod worker;

pub use gateway::GatewayClient;
pub use worker::{RequestHandler, WorkerClient, dispatch_request};

use reqwest::StatusCode;

use crate::objects::{ApiErrorBody, ErrorCode};

/// Errors produced by the SDK clients.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// Transport-level failure (DNS, TLS, connection reset, …).
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// Websocket handshake or stream failure.
    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// The broker answered with a structured error body.
    #[error("gateway error ({code:?}, status {status}): {message}")]
    Gateway {
        status: StatusCode,
        code: ErrorCode,
        message: String,
    },

    /// The server returned a non-2xx status code without an error body.
    #[error("api error: status {status}, body: {body}")]
    Api { status: StatusCode, body: String },

    /// Body could not be (de)serialized.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// The base URL could not be joined with the endpoint path.
    #[error("invalid url: {0}")]
    Url(#[from] url::ParseError),

    /// An auth token could not be carried as a header value.
    #[error("invalid auth token")]
    InvalidToken,

    /// The broker closed the registration channel.
    #[error("channel closed by gateway")]
    Closed,
}

impl ClientError {
    /// The broker-side error class, if the broker produced one.
    pub fn code(&self) -> Option<ErrorCode> {
        match self {
            ClientError::Gateway { code, .. } => Some(*code),
            _ => None,
        }
    }
}

async fn parse_response<T: serde::de::DeserializeOwned>(
    resp: reqwest::Response,
) -> Result<T, ClientError> {
    let status = resp.status();
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        return Err(match serde_json::from_str::<ApiErrorBody>(&body) {
            Ok(err) => ClientError::Gateway {
                status,
                code: err.code,
                message: err.message,
            },
            Err(_) => ClientError::Api { status, body },
        });
    }
    let bytes = resp.bytes().await?;
    serde_json::from_slice(&bytes).map_err(ClientError::Json)
}
