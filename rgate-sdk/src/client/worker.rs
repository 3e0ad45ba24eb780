//! Worker-side registration client (miner / wallet / market agent → rgate).
//!
//! A worker dials the broker's websocket endpoint, sends its registration
//! policy as the first frame, and then serves [`RequestEvent`]s until the
//! socket drops. [`WorkerClient::run`] reconnects with a fixed backoff until
//! its cancellation token fires.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use serde::Serialize;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use url::Url;
use uuid::Uuid;

use super::ClientError;
use crate::objects::{ConnectedCompleted, Method, RequestEvent, ResponseEvent};

/// Default delay between registration attempts.
pub const DEFAULT_RECONNECT_BACKOFF: Duration = Duration::from_secs(5);

/// Serves requests forwarded by the broker.
#[async_trait]
pub trait RequestHandler: Send + Sync + 'static {
    /// Called when the broker confirms the channel with `InitConnect`.
    async fn on_connected(&self, channel_id: Uuid) {
        debug!(%channel_id, "channel ready");
    }

    /// Handle one request. `Err` is reported back as a remote error.
    async fn handle(&self, method: &str, payload: &[u8]) -> Result<Vec<u8>, String>;
}

/// Turn one request into its response.
///
/// Returns `None` for notifications that take no answer (`InitConnect`).
pub async fn dispatch_request<H: RequestHandler + ?Sized>(
    handler: &H,
    request: RequestEvent,
) -> Option<ResponseEvent> {
    if request.method == Method::INIT_CONNECT {
        match serde_json::from_slice::<ConnectedCompleted>(&request.payload) {
            Ok(done) => handler.on_connected(done.channel_id).await,
            Err(e) => warn!(error = %e, "malformed InitConnect payload"),
        }
        return None;
    }

    let response = match handler.handle(&request.method, &request.payload).await {
        Ok(payload) => ResponseEvent::success(request.id, payload),
        Err(e) => ResponseEvent::failure(request.id, e),
    };
    Some(response)
}

/// Long-lived registration client for one worker channel.
#[derive(Debug, Clone)]
pub struct WorkerClient {
    url: Url,
    token: Option<String>,
    policy: String,
    backoff: Duration,
}

impl WorkerClient {
    /// * `url` – websocket endpoint, e.g. `ws://gw:45132/ws/proof`.
    /// * `policy` – the registration policy sent as the first frame.
    pub fn new(url: Url, policy: &impl Serialize) -> Result<Self, ClientError> {
        Ok(Self {
            url,
            token: None,
            policy: serde_json::to_string(policy)?,
            backoff: DEFAULT_RECONNECT_BACKOFF,
        })
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    pub fn with_backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }

    /// Register and serve until `cancel` fires, reconnecting after every
    /// failure.
    pub async fn run<H: RequestHandler>(&self, handler: Arc<H>, cancel: CancellationToken) {
        loop {
            match self.connect_once(handler.clone(), cancel.clone()).await {
                Ok(()) if cancel.is_cancelled() => break,
                Ok(()) => warn!(url = %self.url, "gateway closed the channel"),
                Err(e) => warn!(url = %self.url, error = %e, "registration failed"),
            }

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(self.backoff) => {
                    info!(url = %self.url, "reconnecting to gateway");
                }
            }
        }
        info!(url = %self.url, "worker client stopped");
    }

    /// One registration session; returns when the socket closes.
    pub async fn connect_once<H: RequestHandler>(
        &self,
        handler: Arc<H>,
        cancel: CancellationToken,
    ) -> Result<(), ClientError> {
        let mut request = self.url.as_str().into_client_request()?;
        if let Some(token) = &self.token {
            let value = HeaderValue::from_str(&format!("Bearer {token}"))
                .map_err(|_| ClientError::InvalidToken)?;
            request.headers_mut().insert("Authorization", value);
        }

        let (socket, _) = tokio_tungstenite::connect_async(request).await?;
        let (mut sink, mut stream) = socket.split();
        sink.send(Message::Text(self.policy.clone())).await?;

        let (response_tx, mut response_rx) = mpsc::channel::<ResponseEvent>(32);

        loop {
            tokio::select! {
                biased;

                _ = cancel.cancelled() => {
                    let _ = sink.send(Message::Close(None)).await;
                    return Ok(());
                }

                Some(response) = response_rx.recv() => {
                    let json = serde_json::to_string(&response)?;
                    sink.send(Message::Text(json)).await?;
                }

                frame = stream.next() => {
                    let text = match frame {
                        Some(Ok(Message::Text(text))) => text,
                        Some(Ok(Message::Close(_))) | None => return Ok(()),
                        Some(Ok(_)) => continue,
                        Some(Err(e)) => return Err(e.into()),
                    };
                    let request: RequestEvent = match serde_json::from_str(&text) {
                        Ok(r) => r,
                        Err(e) => {
                            warn!(error = %e, "dropping malformed request frame");
                            continue;
                        }
                    };
                    debug!(id = %request.id, method = %request.method, "received request");

                    let handler = handler.clone();
                    let response_tx = response_tx.clone();
                    tokio::spawn(async move {
                        if let Some(response) = dispatch_request(handler.as_ref(), request).await {
                            let _ = response_tx.send(response).await;
                        }
                    });
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};

    struct Echo {
        connected: AtomicBool,
    }

    #[async_trait]
    impl RequestHandler for Echo {
        async fn on_connected(&self, _channel_id: Uuid) {
            self.connected.store(true, Ordering::SeqCst);
        }

        async fn handle(&self, method: &str, payload: &[u8]) -> Result<Vec<u8>, String> {
            match method {
                "Echo" => Ok(payload.to_vec()),
                other => Err(format!("unsupported method {other}")),
            }
        }
    }

    #[tokio::test]
    async fn test_dispatch_init_connect_has_no_reply() {
        let handler = Echo {
            connected: AtomicBool::new(false),
        };
        let payload = serde_json::to_vec(&ConnectedCompleted {
            channel_id: Uuid::new_v4(),
        })
        .unwrap();
        let reply = dispatch_request(&handler, RequestEvent::new(Method::INIT_CONNECT, payload)).await;
        assert!(reply.is_none());
        assert!(handler.connected.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_dispatch_reports_handler_errors() {
        let handler = Echo {
            connected: AtomicBool::new(false),
        };
        let ok = RequestEvent::new("Echo", vec![7]);
        let ok_id = ok.id;
        let reply = dispatch_request(&handler, ok).await.unwrap();
        assert_eq!(reply.id, ok_id);
        assert_eq!(reply.payload, Some(vec![7]));

        let bad = dispatch_request(&handler, RequestEvent::new("Nope", vec![]))
            .await
            .unwrap();
        assert!(bad.is_error());
        assert!(bad.error.contains("Nope"));
    }
}
