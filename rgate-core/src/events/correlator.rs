//! Request dispatch and response correlation.
//!
//! The Correlator is responsible for:
//! - Allocating a request id and a single-slot result slot per call
//! - Pushing the request onto a channel's outbound queue
//! - Matching an out-of-band `ResponseEvent` back to its waiter by id
//! - Racing redundant channels when the first one fails
//! - Reaping pending requests older than the configured timeout
//!
//! The pending table lock is never held across an await.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures_util::future::select_all;
use rgate_sdk::objects::{RequestEvent, ResponseEvent};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};
use uuid::Uuid;

use super::channel::Channel;
use crate::config::RequestConfig;
use crate::context::CallContext;
use crate::error::GatewayError;

type ResultSlot = oneshot::Sender<Result<ResponseEvent, GatewayError>>;

struct PendingRequest {
    method: String,
    create_time: time::OffsetDateTime,
    result: ResultSlot,
}

struct CorrelatorInner {
    domain: &'static str,
    config: RequestConfig,
    pending: Mutex<HashMap<Uuid, PendingRequest>>,
}

impl CorrelatorInner {
    fn pending(&self) -> MutexGuard<'_, HashMap<Uuid, PendingRequest>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Removes a request's pending entry when its waiter goes away, so a late
/// response for an abandoned attempt is discarded by id.
struct PendingGuard<'a> {
    inner: &'a CorrelatorInner,
    channel: &'a Channel,
    id: Uuid,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.channel.end_request();
        if self.inner.pending().remove(&self.id).is_some() {
            trace!(domain = self.inner.domain, id = %self.id, "discarded abandoned request");
        }
    }
}

/// Generic request–response correlator, one per event stream.
#[derive(Clone)]
pub struct Correlator {
    inner: Arc<CorrelatorInner>,
}

impl Correlator {
    /// Create a correlator and spawn its reaper, which runs until `shutdown`
    /// is cancelled.
    pub fn new(domain: &'static str, config: RequestConfig, shutdown: CancellationToken) -> Self {
        let correlator = Self {
            inner: Arc::new(CorrelatorInner {
                domain,
                config,
                pending: Mutex::new(HashMap::new()),
            }),
        };
        correlator.spawn_reaper(shutdown);
        correlator
    }

    pub fn config(&self) -> &RequestConfig {
        &self.inner.config
    }

    /// Number of requests awaiting a response.
    pub fn pending_count(&self) -> usize {
        self.inner.pending().len()
    }

    /// Send one request on one channel and wait for its response.
    pub async fn send_once(
        &self,
        cx: &CallContext,
        channel: &Channel,
        method: &str,
        payload: Vec<u8>,
    ) -> Result<ResponseEvent, GatewayError> {
        let request = RequestEvent::new(method, payload);
        let id = request.id;
        let (tx, rx) = oneshot::channel();

        self.inner.pending().insert(
            id,
            PendingRequest {
                method: method.to_owned(),
                create_time: request.create_time,
                result: tx,
            },
        );
        channel.begin_request();
        let _guard = PendingGuard {
            inner: &self.inner,
            channel,
            id,
        };

        trace!(
            domain = self.inner.domain,
            %id,
            method,
            channel_id = %channel.id(),
            "dispatching request"
        );

        tokio::select! {
            biased;
            _ = cx.cancelled() => return Err(GatewayError::Cancelled),
            sent = channel.enqueue(request) => sent?,
        }

        tokio::select! {
            biased;
            _ = cx.cancelled() => Err(GatewayError::Cancelled),
            result = rx => result.unwrap_or(Err(GatewayError::Timeout(id))),
        }
    }

    /// Send a request to the channels registered for one identity.
    ///
    /// The first channel is tried alone. If it fails before producing a
    /// response, the remaining channels are raced and the first attempt to
    /// settle wins. A response carrying an error is surfaced as
    /// [`GatewayError::Remote`].
    pub async fn send_request(
        &self,
        cx: &CallContext,
        channels: &[Arc<Channel>],
        method: &str,
        payload: Vec<u8>,
    ) -> Result<ResponseEvent, GatewayError> {
        let Some((first, rest)) = channels.split_first() else {
            return Err(GatewayError::NoConnection("no channel available".to_owned()));
        };

        let response = match self.send_once(cx, first, method, payload.clone()).await {
            Ok(response) => response,
            Err(GatewayError::Cancelled) => return Err(GatewayError::Cancelled),
            Err(e) if rest.is_empty() => return Err(e),
            Err(e) => {
                warn!(
                    domain = self.inner.domain,
                    method,
                    channel_id = %first.id(),
                    error = %e,
                    fallback = rest.len(),
                    "first channel failed, racing remaining channels"
                );
                self.race(cx, rest, method, &payload).await?
            }
        };

        if response.is_error() {
            return Err(GatewayError::Remote(response.error));
        }
        Ok(response)
    }

    /// Race `channels`; the first attempt to settle wins, losers are dropped.
    async fn race(
        &self,
        cx: &CallContext,
        channels: &[Arc<Channel>],
        method: &str,
        payload: &[u8],
    ) -> Result<ResponseEvent, GatewayError> {
        let attempts: Vec<_> = channels
            .iter()
            .map(|channel| Box::pin(self.send_once(cx, channel, method, payload.to_vec())))
            .collect();
        let (result, index, _losers) = select_all(attempts).await;
        debug!(
            domain = self.inner.domain,
            method,
            winner = %channels[index].id(),
            ok = result.is_ok(),
            "fan-out settled"
        );
        result
    }

    /// [`send_request`](Self::send_request) with JSON encoding of `params`
    /// and decoding of the response payload into `T`.
    pub async fn call<P, T>(
        &self,
        cx: &CallContext,
        channels: &[Arc<Channel>],
        method: &str,
        params: &P,
    ) -> Result<T, GatewayError>
    where
        P: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let payload = serde_json::to_vec(params)?;
        let response = self.send_request(cx, channels, method, payload).await?;
        let bytes = response.payload.unwrap_or_default();
        if bytes.is_empty() {
            return Ok(serde_json::from_slice(b"null")?);
        }
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// Deliver a worker's response to its waiter.
    ///
    /// Unknown or duplicate ids are logged and ignored.
    pub fn resolve_response(&self, response: ResponseEvent) {
        let entry = self.inner.pending().remove(&response.id);
        match entry {
            Some(pending) => {
                trace!(
                    domain = self.inner.domain,
                    id = %response.id,
                    method = %pending.method,
                    "resolved request"
                );
                if pending.result.send(Ok(response)).is_err() {
                    debug!(domain = self.inner.domain, "waiter gone before response");
                }
            }
            None => {
                debug!(
                    domain = self.inner.domain,
                    id = %response.id,
                    "response for unknown or already resolved request"
                );
            }
        }
    }

    /// Fail the waiter of `id` with `err`, for a response that arrived but
    /// could not be decoded.
    pub fn reject_response(&self, id: Uuid, err: GatewayError) {
        let entry = self.inner.pending().remove(&id);
        match entry {
            Some(pending) => {
                debug!(domain = self.inner.domain, %id, error = %err, "rejecting request");
                let _ = pending.result.send(Err(err));
            }
            None => {
                debug!(domain = self.inner.domain, %id, "rejection for unknown request");
            }
        }
    }

    /// Fail every pending request older than the configured timeout.
    ///
    /// Returns the number of reaped entries. Waiters are woken with
    /// [`GatewayError::Timeout`].
    pub fn reap_expired(&self) -> usize {
        let now = time::OffsetDateTime::now_utc();
        let timeout = self.inner.config.request_timeout;

        let expired: Vec<(Uuid, PendingRequest)> = {
            let mut pending = self.inner.pending();
            let ids: Vec<Uuid> = pending
                .iter()
                .filter(|(_, p)| now - p.create_time > timeout)
                .map(|(id, _)| *id)
                .collect();
            ids.into_iter()
                .filter_map(|id| pending.remove(&id).map(|p| (id, p)))
                .collect()
        };

        let count = expired.len();
        for (id, pending) in expired {
            debug!(domain = self.inner.domain, %id, method = %pending.method, "reaping request");
            let _ = pending.result.send(Err(GatewayError::Timeout(id)));
        }
        count
    }

    fn spawn_reaper(&self, shutdown: CancellationToken) {
        let correlator = self.clone();
        let period = self.inner.config.clear_interval;
        tokio::spawn(async move {
            let mut ticker =
                tokio::time::interval_at(tokio::time::Instant::now() + period, period);
            loop {
                tokio::select! {
                    biased;
                    _ = shutdown.cancelled() => break,
                    _ = ticker.tick() => {
                        let reaped = correlator.reap_expired();
                        if reaped > 0 {
                            info!(domain = correlator.inner.domain, reaped, "reaped expired requests");
                        }
                    }
                }
            }
            debug!(domain = correlator.inner.domain, "reaper stopped");
        });
    }

    #[cfg(test)]
    pub(crate) fn insert_stale(
        &self,
        age: std::time::Duration,
    ) -> oneshot::Receiver<Result<ResponseEvent, GatewayError>> {
        let (tx, rx) = oneshot::channel();
        self.inner.pending().insert(
            Uuid::new_v4(),
            PendingRequest {
                method: "Stale".to_owned(),
                create_time: time::OffsetDateTime::now_utc() - age,
                result: tx,
            },
        );
        rx
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rgate_sdk::objects::Method;
    use std::time::Duration;

    fn config() -> RequestConfig {
        RequestConfig {
            queue_size: 8,
            request_timeout: Duration::from_secs(60),
            clear_interval: Duration::from_secs(30),
        }
    }

    /// Answer every non-InitConnect request on `events` with `payload`.
    fn spawn_worker(
        correlator: Correlator,
        mut events: super::super::RequestEventReceiver,
        payload: Vec<u8>,
    ) {
        tokio::spawn(async move {
            while let Some(req) = events.recv().await {
                correlator.resolve_response(ResponseEvent::success(req.id, payload.clone()));
            }
        });
    }

    #[tokio::test]
    async fn test_send_request_without_channels() {
        let correlator = Correlator::new("test", config(), CancellationToken::new());
        let err = correlator
            .send_request(&CallContext::background(), &[], Method::COMPUTE_PROOF, vec![])
            .await
            .unwrap_err();
        assert!(err.is_no_connection());
    }

    #[tokio::test]
    async fn test_call_decodes_payload() {
        let correlator = Correlator::new("test", config(), CancellationToken::new());
        let (channel, events) = Channel::open("f010", "127.0.0.1", 8);
        spawn_worker(correlator.clone(), events, b"[\"a\",\"b\"]".to_vec());

        let addrs: Vec<String> = correlator
            .call(&CallContext::background(), &[channel.clone()], Method::WALLET_LIST, &())
            .await
            .unwrap();
        assert_eq!(addrs, vec!["a".to_owned(), "b".to_owned()]);
        assert_eq!(correlator.pending_count(), 0);
        assert_eq!(channel.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_remote_error_is_surfaced() {
        let correlator = Correlator::new("test", config(), CancellationToken::new());
        let (channel, mut events) = Channel::open("f010", "127.0.0.1", 8);
        let worker = correlator.clone();
        tokio::spawn(async move {
            let req = events.recv().await.unwrap();
            worker.resolve_response(ResponseEvent::failure(req.id, "disk on fire"));
        });

        let err = correlator
            .send_request(&CallContext::background(), &[channel], Method::COMPUTE_PROOF, vec![])
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::Remote(msg) if msg == "disk on fire"));
    }

    #[tokio::test]
    async fn test_undecodable_response_fails_waiter() {
        let correlator = Correlator::new("test", config(), CancellationToken::new());
        let (channel, mut events) = Channel::open("f010", "127.0.0.1", 8);
        let worker = correlator.clone();
        tokio::spawn(async move {
            let req = events.recv().await.unwrap();
            let err = serde_json::from_str::<ResponseEvent>("{\"id\":1}").unwrap_err();
            worker.reject_response(req.id, GatewayError::MalformedPayload(err));
            // a late valid answer for the same id is ignored
            worker.resolve_response(ResponseEvent::success(req.id, b"1".to_vec()));
        });

        let err = correlator
            .send_request(&CallContext::background(), &[channel], Method::COMPUTE_PROOF, vec![])
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::MalformedPayload(_)));
        assert_eq!(correlator.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_duplicate_response_resolves_once() {
        let correlator = Correlator::new("test", config(), CancellationToken::new());
        let (channel, mut events) = Channel::open("f010", "127.0.0.1", 8);
        let worker = correlator.clone();
        tokio::spawn(async move {
            let req = events.recv().await.unwrap();
            worker.resolve_response(ResponseEvent::success(req.id, b"1".to_vec()));
            worker.resolve_response(ResponseEvent::success(req.id, b"2".to_vec()));
        });

        let value: u32 = correlator
            .call(&CallContext::background(), &[channel], Method::COMPUTE_PROOF, &())
            .await
            .unwrap();
        assert_eq!(value, 1);
        assert_eq!(correlator.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_unknown_response_is_ignored() {
        let correlator = Correlator::new("test", config(), CancellationToken::new());
        correlator.resolve_response(ResponseEvent::success(Uuid::new_v4(), vec![]));
        assert_eq!(correlator.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_cancel_while_waiting() {
        let correlator = Correlator::new("test", config(), CancellationToken::new());
        let (channel, _events) = Channel::open("f010", "127.0.0.1", 8);
        let cx = CallContext::background();
        let cancel = cx.cancel_token().clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            cancel.cancel();
        });

        let err = correlator
            .send_request(&cx, &[channel], Method::COMPUTE_PROOF, vec![])
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::Cancelled));
        assert_eq!(correlator.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_cancel_while_queue_full() {
        let correlator = Correlator::new("test", config(), CancellationToken::new());
        let (channel, _events) = Channel::open("f010", "127.0.0.1", 1);
        channel.notify_connected();

        let cx = CallContext::background();
        cx.cancel_token().cancel();
        let err = correlator
            .send_once(&cx, &channel, Method::COMPUTE_PROOF, vec![])
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::Cancelled));
    }

    #[tokio::test]
    async fn test_fallback_after_closed_first_channel() {
        let correlator = Correlator::new("test", config(), CancellationToken::new());
        let (dead, dead_events) = Channel::open("f010", "10.0.0.1", 8);
        drop(dead_events);
        let (silent, _silent_events) = Channel::open("f010", "10.0.0.2", 8);
        let (live, live_events) = Channel::open("f010", "10.0.0.3", 8);
        spawn_worker(correlator.clone(), live_events, b"true".to_vec());

        let ok: bool = correlator
            .call(
                &CallContext::background(),
                &[dead, silent.clone(), live],
                Method::IS_UNSEALED,
                &(),
            )
            .await
            .unwrap();
        assert!(ok);
        // the silent loser's entry is discarded with it
        assert_eq!(correlator.pending_count(), 0);
        assert_eq!(silent.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_reap_expired_wakes_waiters() {
        let correlator = Correlator::new("test", config(), CancellationToken::new());
        let waiters: Vec<_> = (0..10)
            .map(|_| correlator.insert_stale(Duration::from_secs(61)))
            .collect();
        let fresh = correlator.insert_stale(Duration::from_secs(1));

        assert_eq!(correlator.reap_expired(), 10);
        assert_eq!(correlator.pending_count(), 1);
        for waiter in waiters {
            assert!(matches!(waiter.await.unwrap(), Err(GatewayError::Timeout(_))));
        }
        drop(fresh);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reaper_sweeps_on_interval() {
        let correlator = Correlator::new("test", config(), CancellationToken::new());
        let _waiters: Vec<_> = (0..10)
            .map(|_| correlator.insert_stale(Duration::from_secs(120)))
            .collect();
        assert_eq!(correlator.pending_count(), 10);

        tokio::time::sleep(config().clear_interval + Duration::from_millis(1)).await;
        for _ in 0..4 {
            tokio::task::yield_now().await;
        }
        assert_eq!(correlator.pending_count(), 0);
    }
}
