//! A registered duplex channel and its lifecycle.

use std::sync::Arc;
use std::sync::atomic::{AtomicU8, AtomicUsize, Ordering};

use rgate_sdk::objects::{ConnectedCompleted, ConnectionInfo, Method, RequestEvent};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::GatewayError;

/// Sender half of a channel's outbound queue.
pub type RequestEventSender = mpsc::Sender<RequestEvent>;
/// Receiver half of a channel's outbound queue, drained by the transport.
pub type RequestEventReceiver = mpsc::Receiver<RequestEvent>;

/// Create a bounded outbound queue.
///
/// A zero capacity is bumped to one; a channel must hold at least its
/// `InitConnect` notification.
pub fn request_event_channel(capacity: usize) -> (RequestEventSender, RequestEventReceiver) {
    mpsc::channel(capacity.max(1))
}

/// Lifecycle of a channel. Transitions only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ChannelState {
    Active = 0,
    Removing = 1,
    Removed = 2,
}

impl ChannelState {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => ChannelState::Active,
            1 => ChannelState::Removing,
            _ => ChannelState::Removed,
        }
    }
}

/// What the transport gets back from a successful registration.
#[derive(Debug)]
pub struct ChannelHandle {
    pub channel_id: Uuid,
    /// Requests to forward to the remote worker. Yields `None` once the
    /// broker drops the channel.
    pub events: RequestEventReceiver,
}

/// A registered connection to a remote worker.
#[derive(Debug)]
pub struct Channel {
    id: Uuid,
    identity: String,
    ip: String,
    create_time: time::OffsetDateTime,
    outbound: RequestEventSender,
    in_flight: AtomicUsize,
    state: AtomicU8,
}

impl Channel {
    /// Open a channel for `identity`, returning it with the receiver the
    /// transport drains.
    pub fn open(
        identity: impl Into<String>,
        ip: impl Into<String>,
        capacity: usize,
    ) -> (Arc<Self>, RequestEventReceiver) {
        let (outbound, events) = request_event_channel(capacity);
        let channel = Arc::new(Self {
            id: Uuid::new_v4(),
            identity: identity.into(),
            ip: ip.into(),
            create_time: time::OffsetDateTime::now_utc(),
            outbound,
            in_flight: AtomicUsize::new(0),
            state: AtomicU8::new(ChannelState::Active as u8),
        });
        (channel, events)
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn identity(&self) -> &str {
        &self.identity
    }

    pub fn ip(&self) -> &str {
        &self.ip
    }

    pub fn state(&self) -> ChannelState {
        ChannelState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Requests dispatched on this channel still awaiting a response.
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::Relaxed)
    }

    pub(crate) fn begin_request(&self) {
        self.in_flight.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn end_request(&self) {
        self.in_flight.fetch_sub(1, Ordering::Relaxed);
    }

    /// Move from `from` to `to`; returns false if the channel was not in
    /// `from`.
    pub(crate) fn transition(&self, from: ChannelState, to: ChannelState) -> bool {
        self.state
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Push a request, waiting for queue space.
    pub async fn enqueue(&self, request: RequestEvent) -> Result<(), GatewayError> {
        self.outbound
            .send(request)
            .await
            .map_err(|_| GatewayError::ChannelClosed(self.id))
    }

    /// Queue the `InitConnect` notification carrying this channel's id.
    ///
    /// Must run before the channel is visible to callers so it is the first
    /// frame the worker sees.
    pub(crate) fn notify_connected(&self) {
        let payload = match serde_json::to_vec(&ConnectedCompleted { channel_id: self.id }) {
            Ok(p) => p,
            Err(e) => {
                warn!(channel_id = %self.id, error = %e, "failed to encode InitConnect");
                return;
            }
        };
        if let Err(e) = self
            .outbound
            .try_send(RequestEvent::new(Method::INIT_CONNECT, payload))
        {
            warn!(channel_id = %self.id, error = %e, "failed to queue InitConnect");
        }
    }

    pub fn info(&self) -> ConnectionInfo {
        ConnectionInfo {
            channel_id: self.id,
            ip: self.ip.clone(),
            request_count: self.in_flight(),
            create_time: self.create_time,
        }
    }
}

/// Own the channel until `cancel` fires, then remove it exactly once.
///
/// `remove` runs between the `Removing` and `Removed` transitions and must
/// take the registry lock for its whole check-then-act sequence.
pub(crate) fn spawn_lifecycle<F>(channel: Arc<Channel>, cancel: CancellationToken, remove: F)
where
    F: FnOnce(&Channel) + Send + 'static,
{
    tokio::spawn(async move {
        cancel.cancelled().await;
        if !channel.transition(ChannelState::Active, ChannelState::Removing) {
            return;
        }
        remove(&channel);
        channel.transition(ChannelState::Removing, ChannelState::Removed);
        debug!(channel_id = %channel.id(), identity = %channel.identity(), "channel removed");
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_init_connect_is_first_frame() {
        let (channel, mut events) = Channel::open("f010", "127.0.0.1", 4);
        channel.notify_connected();
        let first = events.recv().await.unwrap();
        assert_eq!(first.method, Method::INIT_CONNECT);
        let done: ConnectedCompleted = serde_json::from_slice(&first.payload).unwrap();
        assert_eq!(done.channel_id, channel.id());
    }

    #[tokio::test]
    async fn test_enqueue_after_receiver_dropped() {
        let (channel, events) = Channel::open("f010", "127.0.0.1", 1);
        drop(events);
        let err = channel
            .enqueue(RequestEvent::new(Method::COMPUTE_PROOF, vec![]))
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::ChannelClosed(id) if id == channel.id()));
    }

    #[test]
    fn test_transitions_move_forward_once() {
        let (channel, _events) = Channel::open("f010", "127.0.0.1", 1);
        assert!(channel.transition(ChannelState::Active, ChannelState::Removing));
        assert!(!channel.transition(ChannelState::Active, ChannelState::Removing));
        assert!(channel.transition(ChannelState::Removing, ChannelState::Removed));
        assert_eq!(channel.state(), ChannelState::Removed);
    }
}
